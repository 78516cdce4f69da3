//! Injectable engine configuration (C8 EngineConfig).

use std::sync::Arc;

use crate::article::{DefaultXdxfRenderer, XdxfRenderer};

/// Default cap on how many headwords a single lookup call returns.
pub const DEFAULT_MAX_LOOKUP_WORDS: usize = 10_000;

/// Everything the controller and its dictionaries need that would otherwise
/// come from process-wide globals: lookup limits, article formatting
/// choices, the XDXF renderer, and the locale used for type-`l` entries.
#[derive(Clone)]
pub struct EngineConfig {
	pub max_lookup_words: usize,
	pub add_dictionary_name: bool,
	pub xdxf_renderer: Arc<dyn XdxfRenderer>,
	pub locale_encoding: &'static encoding_rs::Encoding,
}

impl Default for EngineConfig {
	fn default() -> Self {
		EngineConfig {
			max_lookup_words: DEFAULT_MAX_LOOKUP_WORDS,
			add_dictionary_name: true,
			xdxf_renderer: Arc::new(DefaultXdxfRenderer::default()),
			locale_encoding: encoding_rs::UTF_8,
		}
	}
}
