//! `.ifo` metadata parsing (C3 IfoParser).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

const SIGNATURE: &str = "StarDict's dict ifo file";

/// Parsed `.ifo` fields relevant to lookup and article rendering.
///
/// `idx_offset_bits` is `64` only when the file says so explicitly;
/// everything else defaults to the StarDict 2.4.2 32-bit layout.
#[derive(Clone, Debug)]
pub struct IfoRecord {
	pub bookname: String,
	pub word_count: i32,
	pub description: String,
	pub same_type_sequence: Option<String>,
	pub idx_offset_bits: u8,
	pub idx_file_size: u64,
}

/// Parses an `.ifo` file at `path`.
///
/// The first non-blank line must equal [`SIGNATURE`] exactly; everything
/// after is `key=value`, one per line, unknown keys ignored. `bookname`,
/// a non-negative `wordcount`, and a nonzero `idxfilesize` are mandatory.
pub fn parse(path: &Path) -> Result<IfoRecord> {
	let file = File::open(path)?;
	let mut lines = BufReader::new(file).lines();

	let mut signature_line = None;
	for line in &mut lines {
		let line = line?;
		let trimmed = line.trim();
		if !trimmed.is_empty() {
			signature_line = Some(trimmed.to_string());
			break;
		}
	}
	match signature_line {
		Some(line) if line == SIGNATURE => {}
		_ => return Err(Error::HeaderInvalid("ifo signature not found")),
	}

	let mut bookname = String::new();
	let mut description = String::new();
	let mut same_type_sequence = None;
	let mut idx_offset_bits: u8 = 32;
	let mut idx_file_size: u64 = 0;
	let mut word_count: i32 = -1;

	for line in lines {
		let line = line?;
		let trimmed = line.trim();
		let Some(eq) = trimmed.find('=') else {
			continue;
		};
		let name = trimmed[..eq].trim().to_lowercase();
		let value = &trimmed[eq + 1..];

		match name.as_str() {
			"wordcount" => {
				if let Ok(wc) = value.parse() {
					word_count = wc;
				}
			}
			"bookname" => bookname = value.to_string(),
			"description" => description = value.to_string(),
			"sametypesequence" => same_type_sequence = Some(value.to_string()),
			"idxoffsetbits" => idx_offset_bits = if value == "64" { 64 } else { 32 },
			"idxfilesize" => idx_file_size = value.parse().unwrap_or(0),
			_ => {}
		}
	}

	if bookname.is_empty() || word_count < 0 || idx_file_size == 0 {
		return Err(Error::HeaderInvalid("incomplete ifo file"));
	}

	Ok(IfoRecord {
		bookname,
		word_count,
		description,
		same_type_sequence,
		idx_offset_bits,
		idx_file_size,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	fn write_ifo(contents: &str) -> NamedTempFile {
		let mut tmp = NamedTempFile::new().unwrap();
		tmp.write_all(contents.as_bytes()).unwrap();
		tmp
	}

	#[test]
	fn parses_a_well_formed_file() {
		let tmp = write_ifo(
			"StarDict's dict ifo file\nversion=2.4.2\nbookname=Test Dictionary\nwordcount=42\nidxfilesize=1000\nsametypesequence=m\n",
		);
		let rec = parse(tmp.path()).unwrap();
		assert_eq!(rec.bookname, "Test Dictionary");
		assert_eq!(rec.word_count, 42);
		assert_eq!(rec.idx_file_size, 1000);
		assert_eq!(rec.same_type_sequence.as_deref(), Some("m"));
		assert_eq!(rec.idx_offset_bits, 32);
	}

	#[test]
	fn rejects_missing_signature() {
		let tmp = write_ifo("bookname=Test\nwordcount=1\nidxfilesize=10\n");
		assert!(parse(tmp.path()).is_err());
	}

	#[test]
	fn rejects_incomplete_fields() {
		let tmp = write_ifo("StarDict's dict ifo file\nbookname=Test\n");
		assert!(parse(tmp.path()).is_err());
	}

	#[test]
	fn recognizes_64_bit_offsets() {
		let tmp = write_ifo(
			"StarDict's dict ifo file\nbookname=Big\nwordcount=1\nidxfilesize=10\nidxoffsetbits=64\n",
		);
		let rec = parse(tmp.path()).unwrap();
		assert_eq!(rec.idx_offset_bits, 64);
	}
}
