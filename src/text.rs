// Slug derivation and markdown rendering for titles and lesson bodies.

use pulldown_cmark::{html, Parser};
use unicode_normalization::UnicodeNormalization;

/// Lowercase ASCII slug: accents are decomposed and dropped, anything that
/// is not a word character, space or hyphen is removed, and runs of spaces
/// and hyphens collapse to a single `-`.
pub fn slugify(value: &str) -> String {
    let ascii: String = value
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_ascii_whitespace())
        .collect();

    let mut out = String::with_capacity(ascii.len());
    let mut pending_sep = false;
    for c in ascii.chars() {
        if c == '-' || c.is_ascii_whitespace() {
            pending_sep = true;
            continue;
        }
        if pending_sep {
            out.push('-');
            pending_sep = false;
        }
        out.push(c);
    }
    if pending_sep {
        out.push('-');
    }
    out.trim_matches(|c| c == '-' || c == '_').to_string()
}

pub fn render_markdown(src: &str) -> String {
    let mut out = String::with_capacity(src.len() * 3 / 2);
    html::push_html(&mut out, Parser::new(src));
    out
}
