use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8};
use regex::bytes::Regex;
use scraper::{ElementRef, Html};
use tracing::debug;

/// Hard cap on the excerpt handed to the model, in characters.
pub const MAX_CHARS: usize = 15_000;

/// Elements dropped with their whole subtree before text is collected.
const SKIPPED: [&str; 5] = ["script", "style", "nav", "footer", "header"];

/// How far into the body a `<meta charset>` declaration is looked for.
const META_SNIFF_BYTES: usize = 1024;

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)<meta[^>]+charset\s*=\s*["']?\s*([A-Za-z0-9_:.-]+)"#).unwrap()
});

/// Decode a fetched page body and reduce it to a flat, bounded text excerpt.
/// `charset` is the one declared by the Content-Type header, if any.
pub fn extract_text(body: &[u8], charset: Option<&str>) -> String {
    visible_text(&decode(body, charset))
}

/// Decode a page body. A byte order mark wins, then the header charset, then
/// a `<meta charset>` near the top, then UTF-8. Malformed sequences become
/// U+FFFD instead of failing.
pub fn decode(body: &[u8], charset: Option<&str>) -> String {
    let encoding = charset
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
        .or_else(|| sniff_meta_charset(body))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        debug!("Replaced malformed {} sequences in page body", used.name());
    }
    text.into_owned()
}

fn sniff_meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(META_SNIFF_BYTES)];
    let label = META_CHARSET.captures(head)?.get(1)?;
    // A document that could be read as ASCII to find its meta tag is not UTF-16.
    Encoding::for_label(label.as_bytes()).map(Encoding::output_encoding)
}

/// Visible text of an HTML document, normalized and truncated to `MAX_CHARS`.
pub fn visible_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut raw = String::new();
    collect_text(doc.root_element(), &mut raw);
    normalize(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(el) = ElementRef::wrap(child) {
            if !SKIPPED.contains(&el.value().name()) {
                collect_text(el, out);
            }
        }
    }
}

/// Trim every line, split each on double spaces, drop empty fragments and
/// join the rest with single spaces.
pub fn normalize(raw: &str) -> String {
    let joined = raw
        .split(is_line_break)
        .map(str::trim)
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    truncate_chars(joined, MAX_CHARS)
}

// Same set of separators as a universal-newline line split.
fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{0b}' | '\u{0c}' | '\u{1c}' | '\u{1d}' | '\u{1e}' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

fn truncate_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s,
    }
}
