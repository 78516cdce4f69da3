use thiserror::Error;

/// The error taxonomy produced by this crate.
///
/// Load-time and query-time callers are expected to degrade gracefully on
/// these (see [`crate::controller::Controller`]): only [`Error::Cancelled`]
/// isn't really a failure, it's cooperative-cancellation control flow
/// threaded through the same `Result` so call sites don't need a second
/// channel for it.
#[derive(Debug, Error)]
pub enum Error {
	#[error("I/O failure: {0}")]
	IoFailure(#[from] std::io::Error),

	#[error("header invalid: {0}")]
	HeaderInvalid(&'static str),

	#[error("decompression failed: {0}")]
	DecompressFailure(String),

	#[error("index size mismatch: expected {expected} bytes, got {actual}")]
	IndexMismatch { expected: u64, actual: u64 },

	#[error("article framing malformed: {0}")]
	FormatMalformed(String),

	#[error("operation cancelled")]
	Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
