//! `Dictionary` trait and the StarDict implementation composing C2-C5
//! (C6 StardictDictionary).

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::article;
use crate::config::EngineConfig;
use crate::dictzip::{self, DictFileData};
use crate::error::Result;
use crate::ifo::{self, IfoRecord};
use crate::index::{self, Index};

/// Contract a loaded dictionary offers the controller. Kept minimal so
/// formats other than StarDict could implement it later.
pub trait Dictionary: Send + Sync {
	fn name(&self) -> &str;
	fn description(&self) -> &str;
	fn word_count(&self) -> i32;
	fn lookup(&self, word: &str, suppress_multiforms: bool, max_results: usize) -> Vec<String>;
	fn article(&self, word: &str) -> String;
	fn cancel(&self);
	fn reset_cancel(&self);
}

struct DictFile {
	file: File,
	data: DictFileData,
}

/// One loaded `.ifo`/`.idx`/`.dict` trio.
///
/// The open dict file handle is behind a [`Mutex`] since reads seek before
/// reading: concurrent lookups on the same dictionary serialize on I/O, but
/// different dictionaries (and the index scan itself) don't contend with
/// each other.
pub struct StardictDictionary {
	ifo: IfoRecord,
	index: Index,
	dict: Mutex<DictFile>,
	cancel_flag: AtomicBool,
	config: EngineConfig,
}

impl StardictDictionary {
	/// Loads a dictionary given the path to its `.ifo` file.
	pub fn load(ifo_path: &Path, config: EngineConfig) -> Result<Self> {
		let ifo = ifo::parse(ifo_path)?;
		let index = index::load(ifo_path, ifo.idx_offset_bits, ifo.idx_file_size, ifo.word_count)?;
		let dict = open_dict_file(ifo_path)?;

		Ok(StardictDictionary {
			ifo,
			index,
			dict: Mutex::new(dict),
			cancel_flag: AtomicBool::new(false),
			config,
		})
	}

	fn read_article_blob(&self, offset: u64, size: u32) -> Vec<u8> {
		let mut guard = self.dict.lock().unwrap_or_else(|e| e.into_inner());
		let DictFile { file, data } = &mut *guard;
		match dictzip::read(file, data, offset, size) {
			Ok(bytes) => bytes,
			Err(e) => {
				log::warn!("dictionary {}: failed to read article blob: {e}", self.ifo.bookname);
				Vec::new()
			}
		}
	}
}

fn open_dict_file(ifo_path: &Path) -> Result<DictFile> {
	let stem = ifo_path.file_stem().unwrap_or_default();
	let dir = ifo_path.parent().unwrap_or_else(|| Path::new("."));

	let plain = dir.join(stem).with_extension("dict");
	if plain.exists() {
		let file = File::open(&plain)?;
		return Ok(DictFile {
			file,
			data: DictFileData::default(),
		});
	}

	let dz = dir.join(format!("{}.dict.dz", stem.to_string_lossy()));
	let mut file = File::open(&dz)?;
	let data = dictzip::initialize(&mut file)?;
	Ok(DictFile { file, data })
}

impl Dictionary for StardictDictionary {
	fn name(&self) -> &str {
		&self.ifo.bookname
	}

	fn description(&self) -> &str {
		&self.ifo.description
	}

	fn word_count(&self) -> i32 {
		self.ifo.word_count
	}

	fn lookup(&self, word: &str, suppress_multiforms: bool, max_results: usize) -> Vec<String> {
		index::lookup(&self.index, word, suppress_multiforms, max_results, &self.cancel_flag)
	}

	fn article(&self, word: &str) -> String {
		let mut res = String::new();
		for entry in index::entries_for(&self.index, word) {
			if self.cancel_flag.load(Ordering::Relaxed) {
				return res;
			}
			if !res.is_empty() {
				res.push_str(&format!("<br/><b>{word}</b>"));
			}
			let blob = self.read_article_blob(entry.offset, entry.size);
			res.push_str(&article::render_article(
				&blob,
				self.ifo.same_type_sequence.as_deref(),
				self.config.xdxf_renderer.as_ref(),
				self.config.locale_encoding,
			));
		}
		res
	}

	fn cancel(&self) {
		self.cancel_flag.store(true, Ordering::Release);
	}

	fn reset_cancel(&self) {
		self.cancel_flag.store(false, Ordering::Release);
	}
}

/// Used by the controller to remember where a discovered dictionary lives,
/// before `load` has actually opened its files.
pub fn is_ifo_file(path: &Path) -> bool {
	path.extension()
		.and_then(|e| e.to_str())
		.map(|e| e.eq_ignore_ascii_case("ifo"))
		.unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use std::path::PathBuf;
	use tempfile::tempdir;

	fn write_dict_entry(buf: &mut Vec<u8>, word: &str, offset: u32, size: u32) {
		buf.extend_from_slice(word.as_bytes());
		buf.push(0);
		buf.extend_from_slice(&offset.to_be_bytes());
		buf.extend_from_slice(&size.to_be_bytes());
	}

	fn build_dictionary(dir: &Path, words: &[(&str, &str)]) -> PathBuf {
		let mut dict_bytes = Vec::new();
		let mut idx_bytes = Vec::new();
		for (word, article) in words {
			let offset = dict_bytes.len() as u32;
			let mut blob = Vec::new();
			blob.push(b'm');
			blob.extend_from_slice(article.as_bytes());
			blob.push(0);
			dict_bytes.extend_from_slice(&blob);
			write_dict_entry(&mut idx_bytes, word, offset, blob.len() as u32);
		}

		std::fs::write(dir.join("test.dict"), &dict_bytes).unwrap();
		std::fs::write(dir.join("test.idx"), &idx_bytes).unwrap();

		let ifo_path = dir.join("test.ifo");
		let mut f = std::fs::File::create(&ifo_path).unwrap();
		writeln!(f, "StarDict's dict ifo file").unwrap();
		writeln!(f, "bookname=Test").unwrap();
		writeln!(f, "wordcount={}", words.len()).unwrap();
		writeln!(f, "idxfilesize={}", idx_bytes.len()).unwrap();
		ifo_path
	}

	#[test]
	fn loads_and_renders_an_article() {
		let dir = tempdir().unwrap();
		let ifo_path = build_dictionary(dir.path(), &[("apple", "a red fruit")]);

		let dict = StardictDictionary::load(&ifo_path, EngineConfig::default()).unwrap();
		assert_eq!(dict.name(), "Test");
		assert_eq!(dict.word_count(), 1);

		let hits = dict.lookup("app", false, 10);
		assert_eq!(hits, vec!["apple".to_string()]);

		let article = dict.article("apple");
		assert_eq!(article, "a red fruit");
	}

	#[test]
	fn cancel_stops_article_assembly() {
		let dir = tempdir().unwrap();
		let ifo_path = build_dictionary(dir.path(), &[("apple", "a red fruit")]);
		let dict = StardictDictionary::load(&ifo_path, EngineConfig::default()).unwrap();
		dict.cancel();
		assert_eq!(dict.article("apple"), "");
		dict.reset_cancel();
		assert_eq!(dict.article("apple"), "a red fruit");
	}
}
