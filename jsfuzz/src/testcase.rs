//! A testcase: program text plus the state describing it.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::{EngineError, Result};
use crate::libafl::corpus::CorpusId;
use crate::libafl::inputs::Input;
use crate::libafl_bolts::generic_hash_std;
use crate::scanner;
use crate::state::TestcaseState;

/// Program source and its [`TestcaseState`], owned together.
///
/// Every edit goes through the methods below so the state never drifts from
/// the content. Copy-on-attempt is [`Clone`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Testcase {
    pub content: String,
    pub state: TestcaseState,
}

impl Testcase {
    pub fn new(content: impl Into<String>, state: TestcaseState) -> Self {
        Self {
            content: content.into(),
            state,
        }
    }

    /// A testcase whose state is derived from `content` alone.
    pub fn analyze(content: impl Into<String>) -> Self {
        let content = content.into();
        let state = TestcaseState::analyze(&content);
        Self { content, state }
    }

    pub fn lines(&self) -> Vec<&str> {
        self.content.split('\n').collect()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.content.split('\n').nth(index)
    }

    pub fn number_of_lines(&self) -> usize {
        self.state.testcase_number_of_lines
    }

    fn line_start(&self, index: usize) -> Result<usize> {
        scanner::line_starts(&self.content)
            .get(index)
            .copied()
            .ok_or(EngineError::LineOutOfRange {
                line: index,
                number_of_lines: self.number_of_lines(),
            })
    }

    /// Inserts `code` (one or more lines, without a trailing newline) before
    /// line `index`. `index == number_of_lines()` appends.
    pub fn insert_line(&mut self, index: usize, code: &str) -> Result<()> {
        let number_of_lines = self.number_of_lines();
        let inserted = if index == number_of_lines {
            let inserted = format!("\n{code}");
            self.content.push_str(&inserted);
            inserted
        } else {
            let at = self.line_start(index)?;
            let inserted = format!("{code}\n");
            self.content.insert_str(at, &inserted);
            inserted
        };
        self.state.insert_line(index, &self.content, &inserted)
    }

    /// Removes `count` lines starting at `start` and returns the removed text.
    pub fn remove_lines(&mut self, start: usize, count: usize) -> Result<String> {
        if count == 0 {
            return Ok(String::new());
        }
        let number_of_lines = self.number_of_lines();
        if start + count > number_of_lines {
            return Err(EngineError::LineOutOfRange {
                line: start + count - 1,
                number_of_lines,
            });
        }
        if count == number_of_lines {
            return Err(EngineError::InvalidFragment(
                "a testcase cannot lose every line".to_string(),
            ));
        }
        let range = if start + count == number_of_lines {
            // The newline ending the previous line goes with the removed tail.
            self.line_start(start)? - 1..self.content.len()
        } else {
            self.line_start(start)?..self.line_start(start + count)?
        };
        let removed: String = self.content.drain(range).collect();
        self.state.remove_lines(start, count, &self.content)?;
        Ok(removed)
    }

    /// Replaces bytes `span` with `replacement`; both must stay within a line.
    pub fn replace_span(&mut self, span: Range<usize>, replacement: &str) -> Result<()> {
        let crosses_line = self
            .content
            .get(span.clone())
            .is_none_or(|text| text.contains('\n'));
        if crosses_line || replacement.contains('\n') {
            return Err(EngineError::MultiLineSpan {
                start: span.start,
                end: span.end,
            });
        }
        let delta = replacement.len() as isize - span.len() as isize;
        self.content.replace_range(span, replacement);
        self.state.update_content_length(delta, &self.content)
    }

    /// Replaces the text of line `index`.
    pub fn replace_line(&mut self, index: usize, text: &str) -> Result<()> {
        let range = scanner::line_range(&self.content, index).ok_or(EngineError::LineOutOfRange {
            line: index,
            number_of_lines: self.number_of_lines(),
        })?;
        self.replace_span(range, text)
    }

    /// Reserves a fresh `var_<N>_` name.
    pub fn fresh_variable_name(&mut self) -> String {
        self.state.fresh_variable_name()
    }

    /// Re-derives the syntactic tables and counters after an edit that
    /// bypassed the structural primitives.
    pub fn refresh(&mut self) {
        self.state.refresh_syntax(&self.content);
        self.state.recalculate_unused_variables(&self.content);
    }

    pub fn validate(&self) -> Result<()> {
        self.state.validate(&self.content)
    }
}

impl Input for Testcase {
    fn generate_name(&self, _id: Option<CorpusId>) -> String {
        format!("testcase_{:016x}", generic_hash_std(self))
    }
}
