//! Binary `.idx`/`.idx.gz` parsing and prefix lookup (C4 IndexLoader).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use byteorder::{BigEndian, ByteOrder};
use regex::Regex;

use crate::error::{Error, Result};
use crate::gzip;

/// One binary index record: the byte offset and length of an article inside
/// the `.dict`/`.dict.dz` file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
	pub offset: u64,
	pub size: u32,
}

/// An ordered multimap from lookup key to the article locations it names.
///
/// Keys are a mix of whitespace/punctuation-split tokens (lowercased) and,
/// for multi-token headwords, the headword itself in its original case -
/// matching the two ways a StarDict entry can be found.
pub struct Index {
	entries: BTreeMap<String, Vec<IndexEntry>>,
	pub word_count: i32,
}

fn splitter() -> &'static Regex {
	static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
	RE.get_or_init(|| Regex::new(r"[\s\p{P}]+").unwrap())
}

/// Locates the sibling `.idx` or `.idx.gz` file next to `ifo_path`.
pub fn locate(ifo_path: &Path) -> Result<PathBuf> {
	let stem = ifo_path
		.file_stem()
		.ok_or(Error::HeaderInvalid("ifo path has no file stem"))?;
	let dir = ifo_path.parent().unwrap_or_else(|| Path::new("."));

	let plain = dir.join(stem).with_extension("idx");
	if plain.exists() {
		return Ok(plain);
	}
	let gz = dir.join(format!("{}.idx.gz", stem.to_string_lossy()));
	if gz.exists() {
		return Ok(gz);
	}
	Err(Error::HeaderInvalid("idx file not found"))
}

/// Loads and parses the index file located next to `ifo_path`.
///
/// `expected_size` is the `idxfilesize` field from the `.ifo` file: the
/// decompressed index must match it exactly or the file is rejected.
pub fn load(ifo_path: &Path, idx_offset_bits: u8, expected_size: u64, declared_word_count: i32) -> Result<Index> {
	let idx_path = locate(ifo_path)?;
	let raw = fs::read(&idx_path)?;
	let bytes = if idx_path.extension().and_then(|e| e.to_str()) == Some("gz") {
		gzip::inflate_whole(&raw)
	} else {
		raw
	};

	if bytes.len() as u64 != expected_size {
		return Err(Error::IndexMismatch {
			expected: expected_size,
			actual: bytes.len() as u64,
		});
	}

	let mut entries: BTreeMap<String, Vec<IndexEntry>> = BTreeMap::new();
	let offset_width = if idx_offset_bits == 64 { 8 } else { 4 };
	let splitter = splitter();

	let mut pos = 0usize;
	let mut word_counter = 0;
	while pos < bytes.len() {
		let Some(nul) = bytes[pos..].iter().position(|&b| b == 0) else {
			return Err(Error::FormatMalformed("index entry missing NUL terminator".into()));
		};
		let word_len = nul;
		let tail = word_len + 1 + offset_width + 4;
		if pos + tail > bytes.len() {
			// The headword itself terminated properly; there just isn't room
			// left for its offset+size. Treat as a legitimate end of a
			// declared-size buffer rather than a malformed record.
			log::warn!("index: final record truncated before its offset/size, stopping early");
			break;
		}

		let word = String::from_utf8_lossy(&bytes[pos..pos + word_len]).into_owned();
		pos += word_len + 1;

		let offset = if offset_width == 8 {
			BigEndian::read_u64(&bytes[pos..pos + 8])
		} else {
			BigEndian::read_u32(&bytes[pos..pos + 4]) as u64
		};
		pos += offset_width;

		let size = BigEndian::read_u32(&bytes[pos..pos + 4]);
		pos += 4;

		let entry = IndexEntry { offset, size };
		let tokens: Vec<&str> = splitter.split(&word).filter(|s| !s.is_empty()).collect();
		for token in &tokens {
			entries.entry(token.to_lowercase()).or_default().push(entry);
		}
		if tokens.len() > 1 {
			entries.entry(word).or_default().push(entry);
		}

		word_counter += 1;
	}

	if word_counter != declared_word_count {
		log::warn!(
			"index: word count mismatch, ifo declared {declared_word_count}, found {word_counter}"
		);
	}

	Ok(Index {
		entries,
		word_count: word_counter,
	})
}

/// Walks the ordered map from the first key with `word` as a prefix,
/// collecting matching headwords up to `max_results`.
///
/// When `suppress_multiforms` is set, headwords whose first article offset
/// has already been emitted are skipped, so one article doesn't surface
/// under several of its split-token keys.
pub fn lookup(
	index: &Index,
	word: &str,
	suppress_multiforms: bool,
	max_results: usize,
	cancel: &AtomicBool,
) -> Vec<String> {
	let mut results = Vec::new();
	if cancel.load(Ordering::Relaxed) {
		return results;
	}

	let mut used_offsets = std::collections::HashSet::new();
	for (key, entries) in index.entries.range(word.to_string()..) {
		if cancel.load(Ordering::Relaxed) || results.len() >= max_results {
			break;
		}
		if !key.starts_with(word) {
			break;
		}
		let first_offset = entries[0].offset;
		if suppress_multiforms && used_offsets.contains(&first_offset) {
			continue;
		}
		results.push(key.clone());
		if suppress_multiforms {
			used_offsets.insert(first_offset);
		}
	}
	results
}

/// Returns the index entries stored for an exact headword.
pub fn entries_for(index: &Index, word: &str) -> &[IndexEntry] {
	index.entries.get(word).map(|v| v.as_slice()).unwrap_or(&[])
}
