//! String literals.

use rand::Rng;
use rand::seq::IndexedRandom;

/// Code points that stress string representations: surrogate halves, BOM,
/// line/paragraph separators, zero-width and combining characters, and the
/// extremes of the Unicode range.
pub const UNICODE_EDGE_CHARACTERS: &[&str] = &[
    "\\u0000", "\\u0001", "\\u001F", "\\u007F", "\\u0080", "\\u00A0", "\\u00FF", "\\u0100",
    "\\u0085", "\\u200B", "\\u200D", "\\u2028", "\\u2029", "\\u202E", "\\uFEFF", "\\uFFFD",
    "\\uFFFE", "\\uFFFF", "\\uD800", "\\uDBFF", "\\uDC00", "\\uDFFF", "\\uD83D\\uDE00",
    "\\u0301", "\\u{10FFFF}", "\\u{1F600}", "\\x00", "\\xFF",
];

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_$!#%&()*+,-./:;<=>?@[]^{|}~";

const WHITESPACE: &[&str] = &[" ", "\\t", "\\n", "\\r", "\\v", "\\f"];

/// Escapes `text` for use between single quotes.
pub fn escape_single_quoted(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c.is_control() || c == '\u{2028}' || c == '\u{2029}' => {
                escaped.push_str(&format!("\\u{{{:x}}}", c as u32));
            }
            c => escaped.push(c),
        }
    }
    escaped
}

/// A quoted string literal of random length.
///
/// Characters come from a printable alphabet, with occasional Unicode edge
/// cases and, if `include_whitespace` is set, whitespace escapes.
pub fn random_string<R: Rng + ?Sized>(rng: &mut R, include_whitespace: bool) -> String {
    let length = match rng.random_range(0..10) {
        0 => 0,
        1..=6 => rng.random_range(1..8),
        7 | 8 => rng.random_range(8..64),
        _ => rng.random_range(64..300),
    };
    let mut literal = String::from("'");
    for _ in 0..length {
        match rng.random_range(0..20) {
            0 => literal.push_str(UNICODE_EDGE_CHARACTERS.choose(rng).copied().unwrap_or("")),
            1 if include_whitespace => literal.push_str(WHITESPACE.choose(rng).copied().unwrap_or(" ")),
            _ => {
                let byte = ALPHABET[rng.random_range(0..ALPHABET.len())];
                literal.push(char::from(byte));
            }
        }
    }
    literal.push('\'');
    literal
}

/// A string literal taken from the big list of naughty strings.
pub fn naughty_string<R: Rng + ?Sized>(rng: &mut R) -> String {
    let strings = naughty_strings::BLNS;
    if strings.is_empty() {
        return "''".to_string();
    }
    let text = strings[rng.random_range(0..strings.len())];
    format!("'{}'", escape_single_quoted(text))
}

/// Any string literal.
pub fn random_string_literal<R: Rng + ?Sized>(rng: &mut R) -> String {
    match rng.random_range(0..10) {
        0..=2 => naughty_string(rng),
        3 => format!("'{}'", "A".repeat(rng.random_range(1000..70000))),
        _ => {
            let include_whitespace = rng.random_bool(0.3);
            random_string(rng, include_whitespace)
        }
    }
}
