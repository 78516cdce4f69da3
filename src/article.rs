//! Article entry framing and per-type rendering (C5 ArticleRenderer).

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use regex::Regex;

/// Converts an XDXF fragment to HTML.
///
/// Rendering is pluggable: [`DefaultXdxfRenderer`] reproduces the tag table
/// below with regex substitution rather than a full XML parse, but callers
/// needing exact XDXF-spec fidelity can supply their own.
pub trait XdxfRenderer: Send + Sync {
	fn render(&self, xdxf: &str) -> String;
}

/// Regex-based XDXF renderer covering the common tag set: examples, keys,
/// cross-references, abbreviations, translations, colored text, editorial
/// comments, transcriptions and hidden resource references.
pub struct DefaultXdxfRenderer {
	ex: Regex,
	key: Regex,
	kref: Regex,
	abr: Regex,
	dtrn: Regex,
	c_with_attr: Regex,
	c_plain: Regex,
	co: Regex,
	tr: Regex,
	rref: Regex,
}

impl Default for DefaultXdxfRenderer {
	fn default() -> Self {
		DefaultXdxfRenderer {
			ex: Regex::new(r"(?s)<ex>(.*?)</ex>").unwrap(),
			key: Regex::new(r"(?s)<k>(.*?)</k>").unwrap(),
			kref: Regex::new(r"(?s)<kref>(.*?)</kref>").unwrap(),
			abr: Regex::new(r"(?s)<abr>(.*?)</abr>").unwrap(),
			dtrn: Regex::new(r"(?s)<dtrn>(.*?)</dtrn>").unwrap(),
			c_with_attr: Regex::new(r#"(?s)<c c="([^"]*)">(.*?)</c>"#).unwrap(),
			c_plain: Regex::new(r"(?s)<c>(.*?)</c>").unwrap(),
			co: Regex::new(r"(?s)<co>(.*?)</co>").unwrap(),
			tr: Regex::new(r"(?s)<tr>(.*?)</tr>").unwrap(),
			rref: Regex::new(r"(?s)<rref>(.*?)</rref>").unwrap(),
		}
	}
}

impl XdxfRenderer for DefaultXdxfRenderer {
	fn render(&self, xdxf: &str) -> String {
		let mut out = xdxf.replace('\n', "<br/>");

		out = self
			.ex
			.replace_all(&out, r#"<span style="color:#808080;">$1</span>"#)
			.into_owned();
		out = self
			.key
			.replace_all(&out, r#"<span style="font-weight:bold;">$1</span>"#)
			.into_owned();
		out = self
			.kref
			.replace_all(&out, |caps: &regex::Captures| {
				let text = &caps[1];
				format!(
					"<a href=\"zdict?word={}\">{text}</a>",
					utf8_percent_encode(text, NON_ALPHANUMERIC)
				)
			})
			.into_owned();
		out = self
			.abr
			.replace_all(&out, r#"<span style="font-style:italic;color:#2E8B57;">$1</span>"#)
			.into_owned();
		out = self
			.dtrn
			.replace_all(&out, r#"<span style="font-weight:bold;color:#400000;">$1</span>"#)
			.into_owned();
		out = self
			.c_with_attr
			.replace_all(&out, r#"<font color="$1">$2</font>"#)
			.into_owned();
		out = self.c_plain.replace_all(&out, "<font>$1</font>").into_owned();
		out = self
			.co
			.replace_all(&out, r#"<span style="font-style:italic;color:#483D8B;">$1</span>"#)
			.into_owned();
		out = self
			.tr
			.replace_all(&out, r#"<span style="font-weight:bold;">$1</span>"#)
			.into_owned();
		out = self
			.rref
			.replace_all(&out, r#"<span style="display:none;">$1</span>"#)
			.into_owned();

		out
	}
}

/// Escapes `&`, `<`, `>`, `"` and `'` for safe inclusion in HTML text.
pub fn html_escape(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for c in s.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			_ => out.push(c),
		}
	}
	out
}

/// Escapes `s` and converts tabs/newlines to their HTML preformat equivalents.
pub fn html_preformat(s: &str) -> String {
	let escaped = html_escape(s);
	let mut out = String::with_capacity(escaped.len());
	for c in escaped.chars() {
		match c {
			'\t' => out.push_str("&emsp;"),
			'\n' => out.push_str("<br/>"),
			'\r' => {}
			_ => out.push(c),
		}
	}
	out
}

/// Decodes a single typed entry's bytes into HTML, per §4.5's type table.
pub fn render_entry(
	entry_type: u8,
	data: &[u8],
	renderer: &dyn XdxfRenderer,
	locale: &'static encoding_rs::Encoding,
) -> String {
	match entry_type {
		b'x' => renderer.render(&String::from_utf8_lossy(data)),
		b'h' | b'g' => String::from_utf8_lossy(data).into_owned(),
		b'm' => html_preformat(&String::from_utf8_lossy(data)),
		b'l' => {
			let (decoded, _, _) = locale.decode(data);
			html_preformat(&decoded)
		}
		t if t.is_ascii_lowercase() => format!(
			"<b>Unsupported textual entry type '{}': {}.</b><br>",
			t as char,
			html_escape(&String::from_utf8_lossy(data))
		),
		t => format!("<b>Unsupported blob entry type '{}'.</b><br>", t as char),
	}
}

/// Renders a whole article blob, splitting it into typed entries per
/// `same_type_sequence` (when the ifo file declared one) or per inline type
/// bytes (when it didn't).
///
/// Stops and returns whatever has been rendered so far on any framing
/// underflow, logging a warning rather than failing the whole lookup.
pub fn render_article(
	blob: &[u8],
	same_type_sequence: Option<&str>,
	renderer: &dyn XdxfRenderer,
	locale: &'static encoding_rs::Encoding,
) -> String {
	let mut out = String::new();
	let mut it = blob;

	if let Some(sequence) = same_type_sequence {
		let types: Vec<u8> = sequence.bytes().collect();
		for (seq, &entry_type) in types.iter().enumerate() {
			let entry_size_known = seq == types.len() - 1;

			if entry_type.is_ascii_lowercase() {
				let size = if entry_size_known {
					it.len()
				} else {
					match it.iter().position(|&b| b == 0) {
						Some(n) => n,
						None => {
							log::warn!("article: short entry for the word encountered");
							break;
						}
					}
				};
				if it.len() < size {
					log::warn!("article: malformed entry for the word encountered");
					break;
				}
				out.push_str(&render_entry(entry_type, &it[..size], renderer, locale));
				let consumed = if entry_size_known { size } else { size + 1 };
				if it.len() < consumed {
					break;
				}
				it = &it[consumed..];
			} else if entry_type.is_ascii_uppercase() {
				let size = if entry_size_known {
					it.len()
				} else {
					if it.len() < 4 {
						log::warn!("article: malformed entry for the word encountered");
						break;
					}
					let size = u32::from_be_bytes([it[0], it[1], it[2], it[3]]) as usize;
					it = &it[4..];
					size
				};
				if it.len() < size {
					log::warn!("article: malformed entry for the word encountered");
					break;
				}
				out.push_str(&render_entry(entry_type, &it[..size], renderer, locale));
				it = &it[size..];
			} else {
				log::warn!("article: non-alpha entry type encountered");
				break;
			}
		}
	} else {
		while !it.is_empty() {
			let entry_type = it[0];
			if entry_type.is_ascii_lowercase() {
				let Some(len) = it[1..].iter().position(|&b| b == 0) else {
					log::warn!("article: malformed entry for the word encountered");
					break;
				};
				if it.len() < len + 2 {
					log::warn!("article: malformed entry for the word encountered");
					break;
				}
				out.push_str(&render_entry(entry_type, &it[1..1 + len], renderer, locale));
				it = &it[len + 2..];
			} else if entry_type.is_ascii_uppercase() {
				if it.len() < 5 {
					log::warn!("article: malformed entry for the word encountered");
					break;
				}
				let size = u32::from_be_bytes([it[1], it[2], it[3], it[4]]) as usize;
				if it.len() < 5 + size {
					log::warn!("article: malformed entry for the word encountered");
					break;
				}
				out.push_str(&render_entry(entry_type, &it[5..5 + size], renderer, locale));
				it = &it[5 + size..];
			} else {
				log::warn!("article: non-alpha entry type encountered");
				break;
			}
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn html_preformat_escapes_and_converts_whitespace() {
		let s = "a < b\tc\r\nd";
		assert_eq!(html_preformat(s), "a &lt; b&emsp;c<br/>d");
	}

	#[test]
	fn default_renderer_wraps_key_and_example_tags() {
		let r = DefaultXdxfRenderer::default();
		let out = r.render("<k>run</k> <ex>to move fast</ex>");
		assert!(out.contains(r#"<span style="font-weight:bold;">run</span>"#));
		assert!(out.contains(r#"<span style="color:#808080;">to move fast</span>"#));
	}

	#[test]
	fn default_renderer_turns_kref_into_a_link() {
		let r = DefaultXdxfRenderer::default();
		let out = r.render("<kref>sprint</kref>");
		assert!(out.contains("href=\"zdict?word=sprint\""));
	}

	#[test]
	fn render_article_without_sequence_reads_inline_types() {
		let r = DefaultXdxfRenderer::default();
		let mut blob = Vec::new();
		blob.push(b'm');
		blob.extend_from_slice(b"hello\0");
		let out = render_article(&blob, None, &r, encoding_rs::UTF_8);
		assert_eq!(out, "hello");
	}

	#[test]
	fn render_article_with_sequence_splits_by_type_order() {
		let r = DefaultXdxfRenderer::default();
		let mut blob = Vec::new();
		blob.extend_from_slice(b"first\0");
		blob.extend_from_slice(b"second");
		let out = render_article(&blob, Some("mm"), &r, encoding_rs::UTF_8);
		assert_eq!(out, "firstsecond");
	}

	#[test]
	fn render_article_stops_cleanly_on_underflow() {
		let r = DefaultXdxfRenderer::default();
		let blob = b"m".to_vec(); // type byte with no data, no NUL
		let out = render_article(&blob, None, &r, encoding_rs::UTF_8);
		assert_eq!(out, "");
	}
}
