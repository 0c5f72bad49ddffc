//! Classification of lines by how a statement inserted before them has to be
//! punctuated.
//!
//! A single walk keeps a stack of open brackets, each tagged with what it opens
//! (statement block, object literal, call arguments, ...). The context at the
//! start of every line, the innermost bracket plus the last significant byte
//! before the line, decides the category.

use std::collections::BTreeSet;

use crate::scanner::{self, Piece, Pieces, identifier_end, is_identifier_byte, preceding_word};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Block,
    SwitchBody,
    ClassBody,
    ObjectLiteral,
    Condition { switch: bool },
    Parameters,
    Arguments,
    Array,
}

#[derive(Debug, Clone, Copy)]
struct LineContext {
    /// Innermost open bracket and its offset.
    top: Option<(Frame, usize)>,
    /// Last significant byte before the line and its offset.
    last: Option<(u8, usize)>,
}

/// The three disjoint insertion-line categories of a testcase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineClassification {
    /// Lines before which a `;`-terminated statement can be inserted. Includes
    /// the append point (the line count) when every bracket is closed.
    pub code: BTreeSet<usize>,
    /// Lines inside a multi-line list where the inserted item needs a trailing `,`.
    pub coma: BTreeSet<usize>,
    /// Lines inside a multi-line list where the inserted item needs a leading `,`.
    pub start_coma: BTreeSet<usize>,
}

fn word_before(bytes: &[u8], offset: usize) -> Option<&str> {
    let word = preceding_word(bytes, offset)?;
    let mut end = offset;
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    preceding_word(bytes, end - word.len())
}

fn open_paren_frame(bytes: &[u8], at: usize, enclosing: Option<(Frame, usize)>) -> Frame {
    match preceding_word(bytes, at) {
        Some("if" | "while" | "for" | "with" | "catch") => Frame::Condition { switch: false },
        Some("switch") => Frame::Condition { switch: true },
        Some("function") => Frame::Parameters,
        Some(_) if word_before(bytes, at) == Some("function") => Frame::Parameters,
        Some(_) if matches!(enclosing, Some((Frame::ClassBody, _))) => Frame::Parameters,
        _ => Frame::Arguments,
    }
}

fn open_curly_frame(
    bytes: &[u8],
    at: usize,
    last: Option<(u8, usize)>,
    last_closed: Option<Frame>,
    enclosing: Option<(Frame, usize)>,
) -> Frame {
    match last {
        None | Some((b';' | b'{' | b'}', _)) => Frame::Block,
        Some((b')', _)) => match last_closed {
            Some(Frame::Condition { switch: true }) => Frame::SwitchBody,
            _ => Frame::Block,
        },
        Some((b'>', i)) if i > 0 && bytes[i - 1] == b'=' => Frame::Block,
        Some((b':', _)) if matches!(enclosing, Some((Frame::SwitchBody, _))) => Frame::Block,
        Some((b, _)) if is_identifier_byte(b) => match preceding_word(bytes, at) {
            Some("else" | "try" | "finally" | "do" | "catch") => Frame::Block,
            _ => Frame::ObjectLiteral,
        },
        _ => Frame::ObjectLiteral,
    }
}

fn closing_of(frame: Frame) -> u8 {
    match frame {
        Frame::Array => b']',
        Frame::Condition { .. } | Frame::Parameters | Frame::Arguments => b')',
        _ => b'}',
    }
}

fn starts_with_word(text: &str, word: &str) -> bool {
    text.strip_prefix(word)
        .is_some_and(|rest| !rest.bytes().next().is_some_and(is_identifier_byte))
}

/// Lines that continue the statement before them.
fn continues_previous(line: &str) -> bool {
    line.starts_with('.')
        || line.starts_with("?.")
        || ["else", "catch", "finally"]
            .iter()
            .any(|word| starts_with_word(line, word))
}

fn line_contexts(content: &str) -> (Vec<Option<LineContext>>, bool) {
    let bytes = content.as_bytes();
    let mut contexts = vec![Some(LineContext {
        top: None,
        last: None,
    })];
    let mut stack: Vec<(Frame, usize)> = Vec::new();
    let mut last = None;
    let mut last_closed = None;
    let mut pending_class = false;
    let mut skip_until = 0;

    for piece in Pieces::new(bytes) {
        let (i, b) = match piece {
            Piece::Literal(span, kind) => {
                let newlines = bytes[span.clone()].iter().filter(|&&b| b == b'\n').count();
                contexts.extend(std::iter::repeat_n(None, newlines));
                if !kind.is_comment() {
                    last = Some((b'"', span.start));
                }
                continue;
            }
            Piece::Code(i, b) => (i, b),
        };
        if b == b'\n' {
            contexts.push(Some(LineContext {
                top: stack.last().copied(),
                last,
            }));
            continue;
        }
        if b.is_ascii_whitespace() {
            continue;
        }
        if i >= skip_until && is_identifier_byte(b) {
            skip_until = identifier_end(bytes, i);
            if &bytes[i..skip_until] == b"class" {
                pending_class = true;
            }
        }
        match b {
            b'{' => {
                let frame = if pending_class {
                    Frame::ClassBody
                } else {
                    open_curly_frame(bytes, i, last, last_closed, stack.last().copied())
                };
                pending_class = false;
                stack.push((frame, i));
            }
            b'(' => stack.push((open_paren_frame(bytes, i, stack.last().copied()), i)),
            b'[' => stack.push((Frame::Array, i)),
            b')' | b']' | b'}' => last_closed = stack.pop().map(|(frame, _)| frame),
            _ => {}
        }
        last = Some((b, i));
    }
    (contexts, stack.is_empty())
}

/// Derives the insertion-line categories of `content`.
pub fn classify_lines(content: &str) -> LineClassification {
    let (contexts, balanced) = line_contexts(content);
    let starts = scanner::line_starts(content);
    let number_of_lines = starts.len();
    let mut classification = LineClassification::default();

    for (line, context) in contexts.iter().enumerate() {
        let Some(context) = context else { continue };
        let end = starts.get(line + 1).map_or(content.len(), |&next| next - 1);
        let text = content[starts[line]..end].trim();
        let last_byte = context.last.map(|(b, _)| b);
        match context.top {
            None | Some((Frame::Block, _)) => {
                let at_boundary = matches!(last_byte, None | Some(b';' | b'{' | b'}'));
                // A trailing blank line at the top level defaults to statement context.
                let trailing_blank =
                    context.top.is_none() && text.is_empty() && line + 1 == number_of_lines;
                if (at_boundary && !continues_previous(text)) || trailing_blank {
                    classification.code.insert(line);
                }
            }
            Some((Frame::SwitchBody, _)) => {
                if matches!(last_byte, Some(b':' | b';' | b'}')) && !continues_previous(text) {
                    classification.code.insert(line);
                }
            }
            Some((frame @ (Frame::Arguments | Frame::Array), open)) => {
                let after_open = context.last.is_some_and(|(_, at)| at == open);
                if last_byte == Some(b',') || after_open {
                    classification.coma.insert(line);
                } else if text.starts_with(',') || text.as_bytes().first() == Some(&closing_of(frame)) {
                    classification.start_coma.insert(line);
                }
            }
            Some(_) => {}
        }
    }

    let ends_in_code = contexts.last().is_some_and(Option::is_some);
    if balanced && ends_in_code {
        classification.code.insert(number_of_lines);
    }
    classification
}
