//! Lexical position scanning over JavaScript source text.
//!
//! The engine never builds an AST. Everything it knows about the structure of a
//! testcase comes from these scans, which only need to get three things right:
//! where string, template, regexp and comment contents are (so nothing inside
//! them is mistaken for code), where brackets balance, and where literals and
//! normalized identifiers (`var_1_`, `func_2_`, `cl_3_`) sit.
//!
//! All offsets are byte offsets. Every delimiter the scanner cares about is
//! ASCII, so UTF-8 continuation bytes can never be confused with one.

use std::ops::Range;

use crate::constants::{CLASS_PREFIX, FUNCTION_PREFIX, VARIABLE_PREFIX};

/// The kind of a non-code region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    SingleQuoted,
    DoubleQuoted,
    /// A template string; `interpolated` is set when it contains `${...}`.
    Template { interpolated: bool },
    RegExp,
    LineComment,
    BlockComment,
}

impl LiteralKind {
    pub fn is_comment(self) -> bool {
        matches!(self, LiteralKind::LineComment | LiteralKind::BlockComment)
    }

    /// Plain string values that can be replaced by another string literal.
    pub fn is_plain_string(self) -> bool {
        matches!(
            self,
            LiteralKind::SingleQuoted
                | LiteralKind::DoubleQuoted
                | LiteralKind::Template { interpolated: false }
        )
    }
}

/// One step of a walk over source text: either a single code byte or a whole
/// literal/comment region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece {
    Code(usize, u8),
    Literal(Range<usize>, LiteralKind),
}

pub(crate) fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// Bytes after which a `/` starts a regular expression rather than a division.
fn slash_starts_regexp(previous: Option<u8>) -> bool {
    match previous {
        None => true,
        Some(b) => b"(,=:[!&|?{};+-*%<>~^".contains(&b),
    }
}

fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            // Unterminated string: the line ends it.
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_template(bytes: &[u8], start: usize) -> (usize, bool) {
    let mut interpolated = false;
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return (i + 1, interpolated),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                interpolated = true;
                match matching_close(bytes, i + 1) {
                    Some(close) => i = close + 1,
                    None => return (bytes.len(), interpolated),
                }
            }
            _ => i += 1,
        }
    }
    (bytes.len(), interpolated)
}

fn skip_regexp(bytes: &[u8], start: usize) -> Option<usize> {
    let mut in_class = false;
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b'[' => {
                in_class = true;
                i += 1;
            }
            b']' => {
                in_class = false;
                i += 1;
            }
            b'/' if !in_class => {
                i += 1;
                while i < bytes.len() && is_identifier_byte(bytes[i]) {
                    i += 1;
                }
                return Some(i);
            }
            _ => i += 1,
        }
    }
    None
}

/// If a literal or comment starts at `i`, returns its end and kind.
fn literal_at(bytes: &[u8], i: usize, previous: Option<u8>) -> Option<(usize, LiteralKind)> {
    match bytes[i] {
        b'\'' => Some((skip_quoted(bytes, i, b'\''), LiteralKind::SingleQuoted)),
        b'"' => Some((skip_quoted(bytes, i, b'"'), LiteralKind::DoubleQuoted)),
        b'`' => {
            let (end, interpolated) = skip_template(bytes, i);
            Some((end, LiteralKind::Template { interpolated }))
        }
        b'/' => match bytes.get(i + 1) {
            Some(b'/') => {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p);
                Some((end, LiteralKind::LineComment))
            }
            Some(b'*') => {
                let end = bytes[i + 2..]
                    .windows(2)
                    .position(|w| w == b"*/")
                    .map_or(bytes.len(), |p| i + 2 + p + 2);
                Some((end, LiteralKind::BlockComment))
            }
            _ if slash_starts_regexp(previous) => {
                skip_regexp(bytes, i).map(|end| (end, LiteralKind::RegExp))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Walks source text piece by piece.
pub(crate) struct Pieces<'a> {
    bytes: &'a [u8],
    pos: usize,
    previous: Option<u8>,
}

impl<'a> Pieces<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self::starting_at(bytes, 0)
    }

    pub(crate) fn starting_at(bytes: &'a [u8], pos: usize) -> Self {
        Self {
            bytes,
            pos,
            previous: None,
        }
    }

    /// The last significant byte seen. Literals count as an operand.
    pub(crate) fn previous(&self) -> Option<u8> {
        self.previous
    }
}

impl Iterator for Pieces<'_> {
    type Item = Piece;

    fn next(&mut self) -> Option<Piece> {
        let i = self.pos;
        if i >= self.bytes.len() {
            return None;
        }
        if let Some((end, kind)) = literal_at(self.bytes, i, self.previous) {
            self.pos = end.max(i + 1).min(self.bytes.len());
            if !kind.is_comment() {
                self.previous = Some(b'"');
            }
            return Some(Piece::Literal(i..self.pos, kind));
        }
        let b = self.bytes[i];
        self.pos += 1;
        if !b.is_ascii_whitespace() {
            self.previous = Some(b);
        }
        Some(Piece::Code(i, b))
    }
}

/// Iterates over code bytes only, skipping literal and comment contents.
pub(crate) fn code_bytes(bytes: &[u8], start: usize) -> impl Iterator<Item = (usize, u8)> + '_ {
    Pieces::starting_at(bytes, start).filter_map(|piece| match piece {
        Piece::Code(i, b) => Some((i, b)),
        Piece::Literal(..) => None,
    })
}

fn closing_of(open: u8) -> Option<u8> {
    match open {
        b'(' => Some(b')'),
        b'[' => Some(b']'),
        b'{' => Some(b'}'),
        _ => None,
    }
}

fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    closing_of(*bytes.get(open)?)?;
    let mut expected = Vec::new();
    for (i, b) in code_bytes(bytes, open) {
        match b {
            b'(' | b'[' | b'{' => expected.push(closing_of(b)?),
            b')' | b']' | b'}' => {
                if expected.pop() != Some(b) {
                    return None;
                }
                if expected.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Returns the offset of the bracket closing the one at `open`.
///
/// Returns `None` if `open` is not an opening bracket or the brackets do not
/// balance.
pub fn find_matching_bracket(content: &str, open: usize) -> Option<usize> {
    matching_close(content.as_bytes(), open)
}

/// Returns the offset of the next `target` byte at or after `start` that is
/// neither inside a literal/comment nor inside a bracket construct opened after
/// `start`. The search stops when the construct enclosing `start` closes.
pub fn find_next(content: &str, target: u8, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in code_bytes(content.as_bytes(), start) {
        if depth == 0 && b == target {
            return Some(i);
        }
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.checked_sub(1)?,
            _ => {}
        }
    }
    None
}

/// Line count of `content`: newlines plus one.
pub fn count_lines(content: &str) -> usize {
    content.bytes().filter(|&b| b == b'\n').count() + 1
}

/// Byte offset at which every line starts.
pub fn line_starts(content: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(
            content
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        )
        .collect()
}

/// The line containing byte `offset`, given the result of [`line_starts`].
pub fn line_of_offset(starts: &[usize], offset: usize) -> usize {
    starts.partition_point(|&s| s <= offset).saturating_sub(1)
}

/// The byte range of line `line`, excluding its newline.
pub fn line_range(content: &str, line: usize) -> Option<Range<usize>> {
    let starts = line_starts(content);
    let start = *starts.get(line)?;
    let end = starts.get(line + 1).map_or(content.len(), |&next| next - 1);
    Some(start..end)
}

/// The identifier ending right before `offset`, skipping whitespace.
pub(crate) fn preceding_word(bytes: &[u8], offset: usize) -> Option<&str> {
    let mut end = offset;
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    let mut start = end;
    while start > 0 && is_identifier_byte(bytes[start - 1]) {
        start -= 1;
    }
    if start == end {
        return None;
    }
    std::str::from_utf8(&bytes[start..end]).ok()
}

/// The last non-whitespace byte before `offset`.
fn preceding_significant(bytes: &[u8], offset: usize) -> Option<u8> {
    bytes[..offset]
        .iter()
        .rev()
        .find(|b| !b.is_ascii_whitespace())
        .copied()
}

pub(crate) fn identifier_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && is_identifier_byte(bytes[i]) {
        i += 1;
    }
    i
}

fn scan_number(bytes: &[u8], start: usize) -> usize {
    let at = |i: usize| bytes.get(i).copied();
    let digits = |mut i: usize, radix_hex: bool| {
        while matches!(at(i), Some(b) if b == b'_' || if radix_hex { b.is_ascii_hexdigit() } else { b.is_ascii_digit() })
        {
            i += 1;
        }
        i
    };

    let mut i = start;
    if at(i) == Some(b'0') && matches!(at(i + 1), Some(b'x' | b'X' | b'o' | b'O' | b'b' | b'B')) {
        i = digits(i + 2, true);
    } else {
        i = digits(i, false);
        if at(i) == Some(b'.') {
            i = digits(i + 1, false);
        }
        if matches!(at(i), Some(b'e' | b'E')) {
            let mut j = i + 1;
            if matches!(at(j), Some(b'+' | b'-')) {
                j += 1;
            }
            if matches!(at(j), Some(b) if b.is_ascii_digit()) {
                i = digits(j, false);
            }
        }
    }
    if at(i) == Some(b'n') {
        i += 1;
    }
    i
}

const UNARY_CONTEXT_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "in", "of", "void", "yield", "await", "delete", "throw", "else",
];

/// Whether a `-` at `minus` is a unary minus belonging to the number after it.
fn is_unary_minus(bytes: &[u8], minus: usize) -> bool {
    match preceding_significant(bytes, minus) {
        None => true,
        Some(b) if is_identifier_byte(b) => preceding_word(bytes, minus)
            .is_some_and(|word| UNARY_CONTEXT_KEYWORDS.contains(&word)),
        Some(b')' | b']' | b'\'' | b'"' | b'`' | b'.') => false,
        Some(_) => true,
    }
}

/// Spans of every number literal in code, including a leading unary minus.
///
/// Handles hex/octal/binary prefixes, fractions, exponents, numeric separators
/// and BigInt suffixes. Digits inside identifiers are not numbers.
pub fn number_positions(content: &str) -> Vec<Range<usize>> {
    let bytes = content.as_bytes();
    let mut positions = Vec::new();
    let mut skip_until = 0;
    for (i, b) in code_bytes(bytes, 0) {
        if i < skip_until {
            continue;
        }
        let starts_number = b.is_ascii_digit()
            || (b == b'.'
                && matches!(bytes.get(i + 1), Some(d) if d.is_ascii_digit())
                && !matches!(preceding_significant(bytes, i), Some(p) if is_identifier_byte(p) || p == b')' || p == b']'));
        if starts_number {
            let end = scan_number(bytes, i);
            let start = if i > 0 && bytes[i - 1] == b'-' && is_unary_minus(bytes, i - 1) {
                i - 1
            } else {
                i
            };
            positions.push(start..end);
            skip_until = end;
        } else if is_identifier_byte(b) {
            skip_until = identifier_end(bytes, i);
        }
    }
    positions
}

/// Spans (including quotes) of every plain string literal: single and double
/// quoted strings and template strings without interpolation.
pub fn string_positions(content: &str) -> Vec<Range<usize>> {
    Pieces::new(content.as_bytes())
        .filter_map(|piece| match piece {
            Piece::Literal(span, kind) if kind.is_plain_string() && span.len() >= 2 => Some(span),
            _ => None,
        })
        .collect()
}

/// All literal and comment regions of `content`.
pub fn literal_spans(content: &str) -> Vec<(Range<usize>, LiteralKind)> {
    Pieces::new(content.as_bytes())
        .filter_map(|piece| match piece {
            Piece::Literal(span, kind) => Some((span, kind)),
            Piece::Code(..) => None,
        })
        .collect()
}

/// The family a normalized identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentifierKind {
    Variable,
    Function,
    Class,
}

impl IdentifierKind {
    pub const ALL: [IdentifierKind; 3] = [
        IdentifierKind::Variable,
        IdentifierKind::Function,
        IdentifierKind::Class,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            IdentifierKind::Variable => VARIABLE_PREFIX,
            IdentifierKind::Function => FUNCTION_PREFIX,
            IdentifierKind::Class => CLASS_PREFIX,
        }
    }

    /// The normalized name with the given index, e.g. `var_3_`.
    pub fn name(self, index: u32) -> String {
        format!("{}{index}_", self.prefix())
    }
}

/// An occurrence of a normalized identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedIdentifier {
    pub span: Range<usize>,
    pub kind: IdentifierKind,
    pub index: u32,
}

/// Parses `var_<N>_`, `func_<N>_` or `cl_<N>_`.
pub fn parse_numbered_identifier(word: &str) -> Option<(IdentifierKind, u32)> {
    IdentifierKind::ALL.into_iter().find_map(|kind| {
        let digits = word.strip_prefix(kind.prefix())?.strip_suffix('_')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(|index| (kind, index))
    })
}

/// Every normalized identifier in `content`, including occurrences inside
/// strings and comments (code passed to `eval` refers to the same names).
pub fn numbered_identifiers(content: &str) -> Vec<NumberedIdentifier> {
    let bytes = content.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if is_identifier_byte(bytes[i]) {
            let end = identifier_end(bytes, i);
            if let Some((kind, index)) = parse_numbered_identifier(&content[i..end]) {
                found.push(NumberedIdentifier {
                    span: i..end,
                    kind,
                    index,
                });
            }
            i = end;
        } else {
            i += 1;
        }
    }
    found
}

/// Rewrites every normalized identifier through `renumber`, in one pass, so
/// a renamed token is never renamed again.
pub fn renumber_identifiers(content: &str, mut renumber: impl FnMut(IdentifierKind, u32) -> u32) -> String {
    let mut renamed = String::with_capacity(content.len() + 16);
    let mut copied = 0;
    for identifier in numbered_identifiers(content) {
        renamed.push_str(&content[copied..identifier.span.start]);
        renamed.push_str(&identifier.kind.name(renumber(identifier.kind, identifier.index)));
        copied = identifier.span.end;
    }
    renamed.push_str(&content[copied..]);
    renamed
}

/// Replaces every whole-word occurrence of the identifier `from` with `to`.
pub fn replace_identifier(content: &str, from: &str, to: &str) -> String {
    let bytes = content.as_bytes();
    let mut replaced = String::with_capacity(content.len());
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        if is_identifier_byte(bytes[i]) {
            let end = identifier_end(bytes, i);
            if &content[i..end] == from {
                replaced.push_str(&content[copied..i]);
                replaced.push_str(to);
                copied = end;
            }
            i = end;
        } else {
            i += 1;
        }
    }
    replaced.push_str(&content[copied..]);
    replaced
}

/// Whether the identifier at `span` is the target of a declaration or a plain
/// assignment.
fn is_assignment_target(bytes: &[u8], span: &Range<usize>) -> bool {
    if preceding_word(bytes, span.start).is_some_and(|word| matches!(word, "var" | "let" | "const")) {
        return true;
    }
    let mut i = span.end;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    bytes.get(i) == Some(&b'=') && !matches!(bytes.get(i + 1), Some(b'=' | b'>'))
}

/// Code occurrences of normalized identifiers of the given kind. With
/// `exclude_assignment_targets`, declarations and left-hand sides of plain
/// assignments are left out.
pub fn identifier_positions(
    content: &str,
    kind: IdentifierKind,
    exclude_assignment_targets: bool,
) -> Vec<NumberedIdentifier> {
    let bytes = content.as_bytes();
    let mut found = Vec::new();
    let mut skip_until = 0;
    for (i, b) in code_bytes(bytes, 0) {
        if i < skip_until || !is_identifier_byte(b) {
            continue;
        }
        let end = identifier_end(bytes, i);
        skip_until = end;
        let Some((found_kind, index)) = parse_numbered_identifier(&content[i..end]) else {
            continue;
        };
        let span = i..end;
        if found_kind != kind
            || (i > 0 && bytes[i - 1] == b'.')
            || (exclude_assignment_targets && is_assignment_target(bytes, &span))
        {
            continue;
        }
        found.push(NumberedIdentifier {
            span,
            kind,
            index,
        });
    }
    found
}

/// Code occurrences of `var_<N>_` variables.
pub fn variable_positions(content: &str, exclude_assignment_targets: bool) -> Vec<NumberedIdentifier> {
    identifier_positions(content, IdentifierKind::Variable, exclude_assignment_targets)
}

/// Every balanced `{ ... }` pair as (open offset, close offset), sorted by the
/// open offset.
pub fn curly_bracket_pairs(content: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut pairs = Vec::new();
    for (i, b) in code_bytes(content.as_bytes(), 0) {
        match b {
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    pairs.push((start, i));
                }
            }
            _ => {}
        }
    }
    pairs.sort_unstable();
    pairs
}

/// The curly bracket pairs mapped to (open line, close line).
pub fn block_line_spans(content: &str) -> Vec<(usize, usize)> {
    let starts = line_starts(content);
    curly_bracket_pairs(content)
        .into_iter()
        .map(|(open, close)| (line_of_offset(&starts, open), line_of_offset(&starts, close)))
        .collect()
}

/// Whether the text after a `}` continues the same statement.
fn continues_after_block(bytes: &[u8], after: usize, starts_with_do: bool) -> bool {
    let rest = &bytes[after.min(bytes.len())..];
    let Some(first) = rest.iter().position(|b| !b.is_ascii_whitespace()) else {
        return false;
    };
    let rest = &rest[first..];
    let word_end = rest.iter().position(|&b| !is_identifier_byte(b)).unwrap_or(rest.len());
    match &rest[..word_end] {
        b"else" | b"catch" | b"finally" => true,
        b"while" => starts_with_do,
        b"" => matches!(
            rest[0],
            b';' | b'.' | b'(' | b')' | b',' | b'[' | b'?' | b':' | b'+' | b'-' | b'*' | b'%'
                | b'&' | b'|' | b'^' | b'=' | b'<' | b'>'
        ),
        _ => false,
    }
}

fn rest_of_line_is_empty(bytes: &[u8], from: usize) -> bool {
    let rest = &bytes[from.min(bytes.len())..];
    let line = rest.split(|&b| b == b'\n').next().unwrap_or_default();
    let trimmed = line.trim_ascii();
    trimmed.is_empty() || trimmed.starts_with(b"//")
}

/// Determines the line span of the instruction starting at `line`.
///
/// The instruction ends at the first `;` outside any bracket, at the `}` that
/// closes a statement block (unless `else`, `catch`, `finally` or an expression
/// continues after it) or at a line break where automatic semicolon insertion
/// applies. Returns `None` when the instruction does not end at the end of a
/// line, closes a bracket it did not open, or never ends.
pub fn parse_one_instruction(content: &str, line: usize) -> Option<Range<usize>> {
    let bytes = content.as_bytes();
    let starts = line_starts(content);
    let start = *starts.get(line)?;
    let starts_with_do = content[start..].trim_start().starts_with("do")
        && preceding_word(bytes, start + content[start..].find("do")? + 2) == Some("do");

    let mut depth = 0usize;
    let mut saw_code = false;
    let mut last_significant: Option<u8> = None;
    let mut pieces = Pieces::starting_at(bytes, start);
    let mut end = None;
    while let Some(piece) = pieces.next() {
        let (i, b) = match piece {
            Piece::Code(i, b) => (i, b),
            Piece::Literal(_, kind) => {
                if !kind.is_comment() {
                    saw_code = true;
                    last_significant = Some(b'"');
                }
                continue;
            }
        };
        if b == b'\n' {
            if depth == 0 && saw_code && ends_statement_at_newline(bytes, i, last_significant) {
                end = Some(i.saturating_sub(1));
                break;
            }
            continue;
        }
        if b.is_ascii_whitespace() {
            continue;
        }
        saw_code = true;
        last_significant = Some(b);
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' => depth = depth.checked_sub(1)?,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 && !continues_after_block(bytes, i + 1, starts_with_do) {
                    end = Some(i);
                    break;
                }
            }
            b';' if depth == 0 => {
                end = Some(i);
                break;
            }
            _ => {}
        }
    }

    let end = match end {
        Some(end) => end,
        None if saw_code && depth == 0 => bytes.len().saturating_sub(1),
        None => return None,
    };
    if !rest_of_line_is_empty(bytes, end + 1) {
        return None;
    }
    let end_line = line_of_offset(&starts, end.max(start));
    Some(line..end_line + 1)
}

fn ends_statement_at_newline(bytes: &[u8], newline: usize, last_significant: Option<u8>) -> bool {
    let ends_operand = matches!(
        last_significant,
        Some(b) if is_identifier_byte(b) || matches!(b, b')' | b']' | b'"')
    );
    if !ends_operand {
        return false;
    }
    let next = bytes[newline + 1..]
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .copied();
    !matches!(
        next,
        Some(
            b'.' | b'?' | b':' | b'+' | b'-' | b'*' | b'/' | b'%' | b'&' | b'|' | b'^' | b'='
                | b'<' | b'>' | b',' | b'(' | b'['
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts<'a>(content: &'a str, spans: &[Range<usize>]) -> Vec<&'a str> {
        spans.iter().map(|span| &content[span.clone()]).collect()
    }

    #[test]
    fn negative_number_is_one_span() {
        let content = "var_1_ = -123;";
        let spans = number_positions(content);
        assert_eq!(texts(content, &spans), vec!["-123"]);
    }

    #[test]
    fn numbers_in_every_notation() {
        let content = "f(0x1F, 0b101, 1.5e-3, .25, 10n, 1_000, a - 2, var_12_);";
        let spans = number_positions(content);
        assert_eq!(
            texts(content, &spans),
            vec!["0x1F", "0b101", "1.5e-3", ".25", "10n", "1_000", "2"]
        );
    }

    #[test]
    fn numbers_inside_strings_and_comments_are_ignored() {
        let content = "var a = '12'; // 34\nvar b = `5${6}`; /* 7 */ var c = 8;";
        let spans = number_positions(content);
        assert_eq!(texts(content, &spans), vec!["6", "8"]);
    }

    #[test]
    fn return_minus_is_unary() {
        let content = "return -1;";
        assert_eq!(texts(content, &number_positions(content)), vec!["-1"]);
    }

    #[test]
    fn string_positions_skip_interpolated_templates() {
        let content = r#"var a = "x\"y"; var b = 'z'; var c = `t`; var d = `${a}`;"#;
        let spans = string_positions(content);
        assert_eq!(texts(content, &spans), vec![r#""x\"y""#, "'z'", "`t`"]);
    }

    #[test]
    fn regexp_contents_are_not_code() {
        let content = "var r = /[)}\"]/g; f(1);";
        assert_eq!(find_next(content, b';', 0), Some(16));
        assert_eq!(texts(content, &number_positions(content)), vec!["1"]);
    }

    #[test]
    fn division_is_not_a_regexp() {
        let content = "var a = b / 2 / c;";
        assert_eq!(texts(content, &number_positions(content)), vec!["2"]);
    }

    #[test]
    fn matching_bracket_skips_strings() {
        let content = "f(\")\", [1, (2)], '(');";
        assert_eq!(find_matching_bracket(content, 1), Some(content.len() - 2));
        assert_eq!(find_matching_bracket(content, 0), None);
    }

    #[test]
    fn find_next_skips_nested_constructs() {
        let content = "a(1, 2), b;";
        assert_eq!(find_next(content, b',', 0), Some(7));
        assert_eq!(find_next(content, b',', 2), Some(3));
        // The construct enclosing the start closes before any ';'.
        assert_eq!(find_next(content, b';', 2), None);
    }

    #[test]
    fn numbered_identifiers_are_exact() {
        let content = "var_1_ + func_2_() + new cl_3_() + var_4_x + myvar_5_ + var_TARGET_";
        let found: Vec<_> = numbered_identifiers(content)
            .into_iter()
            .map(|id| (id.kind, id.index))
            .collect();
        assert_eq!(
            found,
            vec![
                (IdentifierKind::Variable, 1),
                (IdentifierKind::Function, 2),
                (IdentifierKind::Class, 3),
            ]
        );
    }

    #[test]
    fn renumbering_is_a_single_pass() {
        // Shifting by one must not cascade var_1_ -> var_2_ -> var_3_.
        let renamed = renumber_identifiers("var_1_ = var_2_ + func_1_(cl_1_);", |kind, index| match kind {
            IdentifierKind::Variable => index + 1,
            _ => index + 10,
        });
        assert_eq!(renamed, "var_2_ = var_3_ + func_11_(cl_11_);");
    }

    #[test]
    fn identifier_replacement_respects_word_boundaries() {
        let replaced = replace_identifier("var_TARGET_.x + var_TARGET_s + 'var_TARGET_'", "var_TARGET_", "var_4_");
        assert_eq!(replaced, "var_4_.x + var_TARGET_s + 'var_4_'");
    }

    #[test]
    fn variable_positions_can_skip_assignment_targets() {
        let content = "var var_1_ = 1;\nvar_2_ = var_1_;\nvar_2_ == var_1_;\n'var_1_';";
        assert_eq!(variable_positions(content, false).len(), 5);
        let reads: Vec<_> = variable_positions(content, true)
            .into_iter()
            .map(|id| &content[id.span])
            .collect();
        assert_eq!(reads, vec!["var_1_", "var_2_", "var_1_"]);
    }

    #[test]
    fn curly_pairs_and_lines() {
        let content = "if (a) {\n  b = { c: 1 };\n}";
        let pairs = curly_bracket_pairs(content);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, 7);
        assert_eq!(block_line_spans(content), vec![(0, 2), (1, 1)]);
    }

    #[test]
    fn instruction_spans() {
        let content = "var a = 1;\nif (a) {\n  a++;\n} else {\n  a--;\n}\nfoo(1,\n  2);\nbar()\nbaz();";
        assert_eq!(parse_one_instruction(content, 0), Some(0..1));
        assert_eq!(parse_one_instruction(content, 1), Some(1..6));
        assert_eq!(parse_one_instruction(content, 6), Some(6..8));
        assert_eq!(parse_one_instruction(content, 8), Some(8..9));
        assert_eq!(parse_one_instruction(content, 9), Some(9..10));
        // Line 2 is inside the if block; its instruction is `a++;`.
        assert_eq!(parse_one_instruction(content, 2), Some(2..3));
        // Line 3 starts with the closing bracket of an enclosing block.
        assert_eq!(parse_one_instruction(content, 3), None);
    }

    #[test]
    fn instruction_sharing_a_line_is_rejected() {
        assert_eq!(parse_one_instruction("a(); b();", 0), None);
    }

    #[test]
    fn line_helpers() {
        let content = "ab\ncd\n";
        assert_eq!(count_lines(content), 3);
        assert_eq!(line_starts(content), vec![0, 3, 6]);
        assert_eq!(line_of_offset(&line_starts(content), 4), 1);
        assert_eq!(line_range(content, 1), Some(3..5));
        assert_eq!(line_range(content, 2), Some(6..6));
        assert_eq!(line_range(content, 3), None);
    }
}
