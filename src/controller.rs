//! Multi-dictionary fan-out and the async event bus (C7 Controller).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};
use rayon::prelude::*;
use regex::Regex;
use walkdir::WalkDir;

use crate::config::EngineConfig;
use crate::dictionary::{is_ifo_file, Dictionary, StardictDictionary};

/// Results delivered over the controller's channel for the `_async` methods,
/// taking the place of Qt's cross-thread signal/slot connections.
#[derive(Debug, Clone)]
pub enum Event {
	DictionariesLoaded { count: usize, word_count: i64 },
	WordListComplete(Vec<String>),
	ArticleComplete(String),
}

fn lookup_splitter() -> &'static Regex {
	static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\s.*$").unwrap())
}

fn lookup_non_word() -> &'static Regex {
	static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
	RE.get_or_init(|| Regex::new(r"[^\w]+").unwrap())
}

fn article_disambiguation_suffix() -> &'static Regex {
	static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\s+\[.*\]$").unwrap())
}

fn normalize_for_lookup(word: &str) -> String {
	let lower = word.to_lowercase();
	let truncated = lookup_splitter().replace(&lower, "");
	lookup_non_word().replace_all(&truncated, "").into_owned()
}

fn normalize_for_article(word: &str) -> String {
	let lower = word.to_lowercase();
	article_disambiguation_suffix().replace(&lower, "").into_owned()
}

/// Owns the set of loaded dictionaries and fans lookups/articles out across
/// them. Load, lookup and article all have synchronous and `_async` forms;
/// the async forms run on their own thread and report back through
/// [`Controller::events`].
pub struct Controller {
	dictionaries: Mutex<Vec<Arc<dyn Dictionary>>>,
	loaded: AtomicBool,
	config: EngineConfig,
	events_tx: Sender<Event>,
	events_rx: Receiver<Event>,
}

impl Controller {
	pub fn new(config: EngineConfig) -> Arc<Self> {
		let (events_tx, events_rx) = unbounded();
		Arc::new(Controller {
			dictionaries: Mutex::new(Vec::new()),
			loaded: AtomicBool::new(false),
			config,
			events_tx,
			events_rx,
		})
	}

	/// Clone of the event receiver; every clone sees every event.
	pub fn events(&self) -> Receiver<Event> {
		self.events_rx.clone()
	}

	/// Recursively walks `paths`, loads every `.ifo` file found in parallel,
	/// and swaps in the resulting dictionary set. Runs on a background
	/// thread; emits [`Event::DictionariesLoaded`] when done.
	pub fn load_dictionaries(self: &Arc<Self>, paths: Vec<PathBuf>) {
		let this = Arc::clone(self);
		std::thread::spawn(move || {
			let files: Vec<PathBuf> = paths
				.iter()
				.flat_map(|root| {
					WalkDir::new(root)
						.into_iter()
						.filter_map(|entry| entry.ok())
						.filter(|entry| entry.file_type().is_file())
						.map(|entry| entry.into_path())
				})
				.filter(|path| is_ifo_file(path))
				.collect();

			let loaded: Vec<Arc<dyn Dictionary>> = files
				.par_iter()
				.filter_map(|path| match StardictDictionary::load(path, this.config.clone()) {
					Ok(dict) => {
						log::info!("dictionary loaded: {} ({} words)", dict.name(), dict.word_count());
						Some(Arc::new(dict) as Arc<dyn Dictionary>)
					}
					Err(e) => {
						log::warn!("failed to load dictionary at {}: {e}", path.display());
						None
					}
				})
				.collect();

			let word_count: i64 = loaded.iter().map(|d| d.word_count() as i64).sum();
			let count = loaded.len();
			log::info!("dictionaries loading complete, {count} dictionaries loaded");

			*this.dictionaries.lock().unwrap_or_else(|e| e.into_inner()) = loaded;
			this.loaded.store(true, Ordering::Release);
			let _ = this.events_tx.send(Event::DictionariesLoaded { count, word_count });
		});
	}

	/// Fans a lookup out across every loaded dictionary in parallel, then
	/// sorts, deduplicates and caps the merged result.
	pub fn lookup(&self, word: &str, suppress_multiforms: bool, max_lookup_words: usize) -> Vec<String> {
		if !self.loaded.load(Ordering::Acquire) || word.is_empty() {
			return Vec::new();
		}
		let max = max_lookup_words.min(self.config.max_lookup_words);
		let normalized = normalize_for_lookup(word);

		let dicts = self.dictionaries.lock().unwrap_or_else(|e| e.into_inner());
		let mut results: Vec<String> = dicts
			.par_iter()
			.flat_map(|dict| {
				dict.reset_cancel();
				dict.lookup(&normalized, suppress_multiforms, max)
			})
			.collect();

		results.par_sort_unstable();
		results.dedup();
		results.truncate(max);
		results
	}

	/// Runs [`Controller::lookup`] on a background thread and emits
	/// [`Event::WordListComplete`] with the result.
	pub fn lookup_async(self: &Arc<Self>, word: String, suppress_multiforms: bool, max_lookup_words: usize) {
		let this = Arc::clone(self);
		std::thread::spawn(move || {
			let res = this.lookup(&word, suppress_multiforms, max_lookup_words);
			let _ = this.events_tx.send(Event::WordListComplete(res));
		});
	}

	/// Concatenates the rendered article for `word` from every dictionary
	/// that has one, separated by `<hr/>` and optionally a dictionary-name
	/// heading.
	pub fn article(&self, word: &str) -> String {
		if !self.loaded.load(Ordering::Acquire) {
			return String::new();
		}
		let normalized = normalize_for_article(word);

		let dicts = self.dictionaries.lock().unwrap_or_else(|e| e.into_inner());
		let mut res = String::new();
		for dict in dicts.iter() {
			dict.reset_cancel();
			let article = dict.article(&normalized);
			if article.is_empty() {
				continue;
			}
			if !res.is_empty() {
				res.push_str("<hr/>");
			}
			if self.config.add_dictionary_name {
				res.push_str(&format!("<h4>{}:</h4>", dict.name()));
			}
			res.push_str(&article);
		}
		res
	}

	/// Runs [`Controller::article`] on a background thread and emits
	/// [`Event::ArticleComplete`] with the result.
	pub fn article_async(self: &Arc<Self>, word: String) {
		let this = Arc::clone(self);
		std::thread::spawn(move || {
			let res = this.article(&word);
			let _ = this.events_tx.send(Event::ArticleComplete(res));
		});
	}

	/// Requests that every loaded dictionary abandon its current lookup or
	/// article assembly at its next cancellation check point.
	pub fn cancel_active_work(&self) {
		for dict in self.dictionaries.lock().unwrap_or_else(|e| e.into_inner()).iter() {
			dict.cancel();
		}
	}

	/// `"{name} ({word_count})"` for every loaded dictionary, or empty before
	/// loading completes.
	pub fn loaded_dictionaries(&self) -> Vec<String> {
		if !self.loaded.load(Ordering::Acquire) {
			return Vec::new();
		}
		self.dictionaries
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.iter()
			.map(|dict| format!("{} ({})", dict.name(), dict.word_count()))
			.collect()
	}
}
