//! Errors raised by the mutation engine.
//!
//! Every variant is a contract violation: the caller computed something against
//! stale or inconsistent state. "Nothing to mutate" is never an error, mutators
//! report it as [`libafl::mutators::MutationResult::Skipped`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("line {line} is out of range for a testcase with {number_of_lines} lines")]
    LineOutOfRange { line: usize, number_of_lines: usize },

    #[error("content length mismatch: state expects {expected} bytes, content has {actual}")]
    ContentLengthMismatch { expected: usize, actual: usize },

    #[error("edit changed the line count by {actual} but the edited text spans {expected} lines")]
    InconsistentEdit { expected: usize, actual: isize },

    #[error("edit of {start}..{end} crosses a line boundary")]
    MultiLineSpan { start: usize, end: usize },

    #[error("no fact recorded for `{name}` at line {line}")]
    MissingFact { name: String, line: usize },

    #[error("invalid fragment: {0}")]
    InvalidFragment(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_cbor::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
