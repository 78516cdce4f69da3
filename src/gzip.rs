//! Whole-buffer gzip decompression, used only for `.idx.gz` index files.

use std::io::Read;

use flate2::read::MultiGzDecoder;

/// Inflate a complete gzip stream.
///
/// Mirrors a streaming `inflateInit2(15+32)` / fixed-size-buffer loop: on any
/// decode error the partial output is discarded and an empty buffer is
/// returned, since callers (the index loader) treat an empty result as
/// failure rather than as "no index data".
pub fn inflate_whole(bytes: &[u8]) -> Vec<u8> {
	let mut decoder = MultiGzDecoder::new(bytes);
	let mut out = Vec::with_capacity(bytes.len() * 3);
	match decoder.read_to_end(&mut out) {
		Ok(_) => out,
		Err(e) => {
			log::warn!("gzip: failed to inflate buffer: {e}");
			Vec::new()
		}
	}
}
