//! DictZip: a gzip variant whose `FEXTRA` subfield carries a chunk table,
//! allowing O(1) seek into an otherwise sequential deflate stream.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Error, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const DICTZIP_MAGIC: [u8; 2] = *b"RA";

const GZ_FLAG_FHCRC: u8 = 0b0000_0010;
const GZ_FLAG_FEXTRA: u8 = 0b0000_0100;
const GZ_FLAG_FNAME: u8 = 0b0000_1000;
const GZ_FLAG_FCOMMENT: u8 = 0b0001_0000;

const GZ_XLEN: u32 = 10;
const NAME_COMMENT_MAX: usize = 10240;
const CHUNK_SCRATCH_SIZE: usize = 60_000;

/// Per-file dictzip layout, parsed once at load time and then read-only.
#[derive(Debug, Clone, Default)]
pub struct DictFileData {
	pub is_dictzip: bool,
	pub header_length: u32,
	pub chunk_length: u16,
	pub chunk_count: i16,
	pub chunks: Vec<u16>,
	pub offsets: Vec<u64>,
}

/// Parses the dictzip header of `file`, leaving `file`'s cursor at the start
/// of the compressed payload (`header_length + 1`).
pub fn initialize(file: &mut File) -> Result<DictFileData> {
	file.seek(SeekFrom::Start(0))?;

	let mut magic = [0u8; 2];
	file.read_exact(&mut magic)?;
	if magic != GZIP_MAGIC {
		return Err(Error::HeaderInvalid("not a gzip stream"));
	}

	let mut skip1 = [0u8; 1];
	file.read_exact(&mut skip1)?; // compression method

	let mut flags = [0u8; 1];
	file.read_exact(&mut flags)?;
	let flags = flags[0];
	if flags & GZ_FLAG_FEXTRA == 0 {
		return Err(Error::HeaderInvalid("FEXTRA flag not set, not a dictzip file"));
	}

	let mut skip6 = [0u8; 6];
	file.read_exact(&mut skip6)?; // mtime, xfl, os

	let extra_length = file.read_i16::<LittleEndian>()?;
	let mut header_length: u32 = (GZ_XLEN - 1) + extra_length as u32 + 2;

	let mut sub_magic = [0u8; 2];
	file.read_exact(&mut sub_magic)?;
	if sub_magic != DICTZIP_MAGIC {
		return Err(Error::HeaderInvalid("no RA subfield, not a dictzip file"));
	}

	let mut skip4 = [0u8; 4];
	file.read_exact(&mut skip4)?; // subfield length, version

	let chunk_length = file.read_u16::<LittleEndian>()?;
	let chunk_count = file.read_i16::<LittleEndian>()?;
	if chunk_count <= 0 {
		return Err(Error::HeaderInvalid("broken dictzip file (no chunks)"));
	}

	let mut chunks = Vec::with_capacity(chunk_count as usize);
	for _ in 0..chunk_count {
		chunks.push(file.read_u16::<LittleEndian>()?);
	}

	if flags & GZ_FLAG_FNAME != 0 {
		header_length += skip_nul_terminated(file)?;
	}
	if flags & GZ_FLAG_FCOMMENT != 0 {
		header_length += skip_nul_terminated(file)?;
	}
	if flags & GZ_FLAG_FHCRC != 0 {
		file.seek(SeekFrom::Current(2))?;
		header_length += 2;
	}

	let pos = file.stream_position()?;
	if pos != (header_length as u64 + 1) {
		return Err(Error::HeaderInvalid("file position does not match header length"));
	}

	let mut offsets = Vec::with_capacity(chunk_count as usize);
	let mut offset = header_length as u64 + 1;
	for &chunk in &chunks {
		offsets.push(offset);
		offset += chunk as u64;
	}

	Ok(DictFileData {
		is_dictzip: true,
		header_length,
		chunk_length,
		chunk_count,
		chunks,
		offsets,
	})
}

/// Reads bytes until (and including) a NUL, up to [`NAME_COMMENT_MAX`],
/// returning the number of bytes consumed.
fn skip_nul_terminated(file: &mut File) -> Result<u32> {
	let mut byte = [0u8; 1];
	let mut consumed: u32 = 0;
	loop {
		if consumed as usize >= NAME_COMMENT_MAX {
			return Err(Error::HeaderInvalid("name/comment field exceeds maximum length"));
		}
		file.read_exact(&mut byte)?;
		consumed += 1;
		if byte[0] == 0 {
			return Ok(consumed);
		}
	}
}

/// Random-access read of `size` uncompressed bytes starting at `start`.
///
/// Any chunk I/O short read, inflate error, or incomplete input consumption
/// aborts the read and returns an empty buffer: no partial data is ever
/// handed back to callers.
pub fn read(file: &mut File, data: &DictFileData, start: u64, size: u32) -> Result<Vec<u8>> {
	if !data.is_dictzip {
		file.seek(SeekFrom::Start(start))?;
		let mut buf = vec![0u8; size as usize];
		file.read_exact(&mut buf)?;
		return Ok(buf);
	}

	let chunk_length = data.chunk_length as u64;
	let end = start + size as u64;
	let first_chunk = (start / chunk_length) as usize;
	let first_offset = (start % chunk_length) as usize;
	let mut last_chunk = (end / chunk_length) as usize;
	let mut last_offset = (end % chunk_length) as usize;

	// A read ending exactly on a chunk boundary lands one chunk past the one
	// that actually holds the last byte (last_offset == 0); that trailing
	// chunk would only ever contribute the empty slice [0..0), so fold it
	// back into the previous chunk instead of indexing past the table.
	if last_offset == 0 && end > start {
		last_chunk -= 1;
		last_offset = chunk_length as usize;
	}

	if last_chunk >= data.chunks.len() {
		return Err(Error::FormatMalformed("read range exceeds chunk table".into()));
	}

	let mut decoder = Decompress::new(false);
	let mut result = Vec::with_capacity(size as usize);

	for i in first_chunk..=last_chunk {
		let chunk_size = data.chunks[i] as usize;
		file.seek(SeekFrom::Start(data.offsets[i]))?;
		let mut compressed = vec![0u8; chunk_size];
		if file.read_exact(&mut compressed).is_err() {
			log::warn!("dictzip: chunk {i} read error");
			return Ok(Vec::new());
		}

		// Decode into a fixed scratch buffer and use the total_out delta to
		// find how much this call produced: a single flate2::Decompress kept
		// alive across chunks, fed one chunk's worth of compressed bytes at a
		// time with a sync flush after each.
		let mut out_buf = vec![0u8; CHUNK_SCRATCH_SIZE];
		let before_in = decoder.total_in();
		let before_out = decoder.total_out();
		let status = decoder.decompress(&compressed, &mut out_buf, FlushDecompress::Sync);
		let consumed = (decoder.total_in() - before_in) as usize;
		let produced = (decoder.total_out() - before_out) as usize;

		match status {
			Ok(Status::Ok) | Ok(Status::BufError) | Ok(Status::StreamEnd) => {}
			Err(e) => {
				log::warn!("dictzip: zlib inflate error in chunk {i}: {e}");
				return Ok(Vec::new());
			}
		}
		if consumed != chunk_size {
			log::warn!("dictzip: inflate did not consume chunk {i} fully ({consumed}/{chunk_size})");
			return Ok(Vec::new());
		}

		let chunk_out = &out_buf[..produced];
		if i == first_chunk && i == last_chunk {
			result.extend_from_slice(&chunk_out[first_offset..last_offset]);
		} else if i == first_chunk {
			result.extend_from_slice(&chunk_out[first_offset..]);
		} else if i == last_chunk {
			result.extend_from_slice(&chunk_out[..last_offset]);
		} else {
			result.extend_from_slice(chunk_out);
		}
	}

	Ok(result)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	/// Builds a minimal, valid dictzip file from plaintext, using fixed-size
	/// chunks compressed independently with a full flush between them (the
	/// property random access depends on).
	fn build_dictzip(plain: &[u8], chunk_length: u16) -> Vec<u8> {
		let mut chunks: Vec<Vec<u8>> = Vec::new();
		for window in plain.chunks(chunk_length as usize) {
			let mut compressor = flate2::Compress::new(flate2::Compression::default(), false);
			let mut out = vec![0u8; window.len() * 2 + 64];
			compressor
				.compress(window, &mut out, flate2::FlushCompress::Full)
				.unwrap();
			let n = compressor.total_out() as usize;
			out.truncate(n);
			chunks.push(out);
		}

		let chunk_count = chunks.len() as u16;
		let mut extra = Vec::new();
		extra.extend_from_slice(&DICTZIP_MAGIC);
		let sub_len = (4 + 2 * chunk_count) as u16;
		extra.extend_from_slice(&sub_len.to_le_bytes());
		extra.extend_from_slice(&1u16.to_le_bytes()); // version
		extra.extend_from_slice(&chunk_length.to_le_bytes());
		extra.extend_from_slice(&chunk_count.to_le_bytes());
		for c in &chunks {
			extra.extend_from_slice(&(c.len() as u16).to_le_bytes());
		}

		let mut out = Vec::new();
		out.extend_from_slice(&GZIP_MAGIC);
		out.push(0x08); // deflate
		out.push(GZ_FLAG_FEXTRA);
		out.extend_from_slice(&[0u8; 6]); // mtime, xfl, os
		out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
		out.extend_from_slice(&extra);
		for c in &chunks {
			out.extend_from_slice(c);
		}
		out
	}

	#[test]
	fn parses_header_and_computes_offsets() {
		let plain = b"the quick brown fox jumps over the lazy dog, again and again!!".repeat(4);
		let bytes = build_dictzip(&plain, 16);
		let mut tmp = NamedTempFile::new().unwrap();
		tmp.write_all(&bytes).unwrap();
		let mut file = tmp.reopen().unwrap();

		let data = initialize(&mut file).unwrap();
		assert!(data.is_dictzip);
		assert_eq!(data.offsets[0], data.header_length as u64 + 1);
		for i in 0..data.chunks.len() - 1 {
			assert_eq!(data.offsets[i + 1] - data.offsets[i], data.chunks[i] as u64);
		}
	}

	#[test]
	fn rejects_non_gzip_file() {
		let mut tmp = NamedTempFile::new().unwrap();
		tmp.write_all(b"not a gzip file at all").unwrap();
		let mut file = tmp.reopen().unwrap();
		assert!(initialize(&mut file).is_err());
	}

	#[test]
	fn random_access_read_matches_plaintext() {
		let plain = b"able was i ere i saw elba, and so on and so forth forevermore.".repeat(8);
		let bytes = build_dictzip(&plain, 20);
		let mut tmp = NamedTempFile::new().unwrap();
		tmp.write_all(&bytes).unwrap();
		let mut file = tmp.reopen().unwrap();
		let data = initialize(&mut file).unwrap();

		let got = read(&mut file, &data, 10, 15).unwrap();
		assert_eq!(got, &plain[10..25]);
	}

	#[test]
	fn chunk_boundary_read_has_no_gap_or_overlap() {
		let plain = b"0123456789abcdef0123456789abcdef0123456789abcdef".to_vec();
		let bytes = build_dictzip(&plain, 10);
		let mut tmp = NamedTempFile::new().unwrap();
		tmp.write_all(&bytes).unwrap();
		let mut file = tmp.reopen().unwrap();
		let data = initialize(&mut file).unwrap();

		let got = read(&mut file, &data, 10, 10).unwrap();
		assert_eq!(got, &plain[10..20]);
	}

	#[test]
	fn read_ending_exactly_at_final_chunk_boundary_succeeds() {
		let plain = b"0123456789abcdef0123456789abcdef0123456789abcdef".to_vec(); // 50 bytes, 5 chunks of 10
		let bytes = build_dictzip(&plain, 10);
		let mut tmp = NamedTempFile::new().unwrap();
		tmp.write_all(&bytes).unwrap();
		let mut file = tmp.reopen().unwrap();
		let data = initialize(&mut file).unwrap();

		let got = read(&mut file, &data, 40, 10).unwrap();
		assert_eq!(got, &plain[40..50]);
		assert_eq!(got.len(), 10);
	}
}
