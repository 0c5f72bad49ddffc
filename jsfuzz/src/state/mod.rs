//! The per-line state model of a testcase.
//!
//! [`TestcaseState`] records, per line, which names exist and what they hold,
//! and which lines accept an inserted statement. Structural edits go through
//! [`TestcaseState::insert_line`], [`TestcaseState::remove_lines`] and
//! [`TestcaseState::update_content_length`], which renumber every table so the
//! state keeps describing the edited content.

mod facts;
pub mod infer;
mod lines;

pub use facts::{Fact, FactTable, facts_at_line};
pub use lines::{LineClassification, classify_lines};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use crate::error::{EngineError, Result};
use crate::scanner::{self, IdentifierKind};
use crate::types::JsType;

/// Everything the engine knows about one testcase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TestcaseState {
    pub variable_types: FactTable<JsType>,
    pub array_lengths: FactTable<Vec<usize>>,
    /// Keyed by accessors such as `var_1_[0]` or `var_1_.foo`.
    pub array_items_or_properties: FactTable<JsType>,
    /// Function name to number of declared parameters.
    pub function_arguments: BTreeMap<String, usize>,

    pub lines_where_code_can_be_inserted: BTreeSet<usize>,
    pub lines_where_code_with_coma_can_be_inserted: BTreeSet<usize>,
    pub lines_where_code_with_start_coma_can_be_inserted: BTreeSet<usize>,
    pub lines_which_are_not_executed: BTreeSet<usize>,
    pub curly_brackets_list: Vec<(usize, usize)>,

    pub number_variables: u32,
    pub number_functions: u32,
    pub number_classes: u32,
    pub testcase_size: usize,
    pub testcase_number_of_lines: usize,

    pub runtime_length_in_ms: u64,
    pub number_of_executions: u64,
    pub number_of_success_executions: u64,
    pub number_of_exception_executions: u64,
    pub number_of_timeout_executions: u64,
    pub number_of_crash_executions: u64,
}

/// How an inserted statement has to be punctuated at a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertionKind {
    /// A statement terminated by `;`.
    Statement,
    /// A list item followed by `,`.
    TrailingComa,
    /// A list item preceded by `,`.
    LeadingComa,
}

/// Facts copied out of a line range, with lines relative to its start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactSnapshot {
    pub variable_types: FactTable<JsType>,
    pub array_lengths: FactTable<Vec<usize>>,
    pub array_items_or_properties: FactTable<JsType>,
}

/// The base variable of an accessor key: `var_1_` for `var_1_[3]` or `var_1_.x`.
pub fn accessor_base(accessor: &str) -> &str {
    let end = accessor.find(['[', '.']).unwrap_or(accessor.len());
    &accessor[..end]
}

fn available<T: Clone + PartialEq>(
    table: &FactTable<T>,
    line: usize,
    exclude_undefined: bool,
    ty: impl Fn(&T) -> JsType,
) -> BTreeMap<String, BTreeSet<JsType>> {
    table
        .iter()
        .filter_map(|(name, facts)| {
            let current = facts_at_line(facts, line);
            if current.is_empty() {
                return None;
            }
            let mut types: BTreeSet<JsType> = current.iter().map(|fact| ty(&fact.value)).collect();
            if exclude_undefined {
                // Available unless every value at the line is undefined.
                if types.iter().all(|ty| *ty == JsType::Undefined) {
                    return None;
                }
                types.remove(&JsType::Undefined);
            }
            Some((name.to_string(), types))
        })
        .collect()
}

impl TestcaseState {
    /// Derives the syntactic tables of `content` and the facts readable from
    /// its declarations.
    pub fn analyze(content: &str) -> Self {
        let mut state = TestcaseState::default();
        state.refresh_syntax(content);
        state.recalculate_unused_variables(content);
        infer::infer_declaration_facts(&mut state, content);
        state
    }

    /// Every variable with facts at `line`, with the types it may hold there.
    pub fn available_variables_with_types(
        &self,
        line: usize,
        exclude_undefined: bool,
    ) -> BTreeMap<String, BTreeSet<JsType>> {
        available(&self.variable_types, line, exclude_undefined, |ty| *ty)
    }

    pub fn available_array_items_or_properties(
        &self,
        line: usize,
        exclude_undefined: bool,
    ) -> BTreeMap<String, BTreeSet<JsType>> {
        available(&self.array_items_or_properties, line, exclude_undefined, |ty| *ty)
    }

    /// Variables that certainly hold a value of `ty` at `line`.
    pub fn variables_of_type(&self, line: usize, ty: JsType) -> Vec<String> {
        self.available_variables_with_types(line, true)
            .into_iter()
            .filter(|(_, types)| types.len() == 1 && types.contains(&ty))
            .map(|(name, _)| name)
            .collect()
    }

    pub fn variable_types_in_line(&self, name: &str, line: usize) -> Option<BTreeSet<JsType>> {
        let facts = self.variable_types.at_line(name, line);
        (!facts.is_empty()).then(|| facts.iter().map(|fact| fact.value).collect())
    }

    /// The indexes `name[index]` known at `line`, as written in the accessor.
    pub fn used_array_indexes_in_line(&self, name: &str, line: usize) -> Vec<String> {
        self.array_items_or_properties
            .iter()
            .filter(|(accessor, facts)| {
                accessor_base(accessor) == name && !facts_at_line(facts, line).is_empty()
            })
            .filter_map(|(accessor, _)| {
                accessor[name.len()..]
                    .strip_prefix('[')
                    .and_then(|rest| rest.strip_suffix(']'))
                    .map(str::to_string)
            })
            .collect()
    }

    pub fn array_lengths_in_line(&self, name: &str, line: usize) -> Vec<usize> {
        let mut lengths: Vec<usize> = self
            .array_lengths
            .at_line(name, line)
            .iter()
            .flat_map(|fact| fact.value.iter().copied())
            .collect();
        lengths.sort_unstable();
        lengths.dedup();
        lengths
    }

    /// Functions callable at `line` with their arity. Functions without type
    /// facts are treated as hoisted.
    pub fn available_functions(&self, line: usize) -> Vec<(String, usize)> {
        self.function_arguments
            .iter()
            .filter(|(name, _)| {
                !self.variable_types.contains(name)
                    || self
                        .variable_types_in_line(name, line)
                        .is_some_and(|types| types.iter().any(|ty| *ty != JsType::Undefined))
            })
            .map(|(name, arity)| (name.clone(), *arity))
            .collect()
    }

    pub fn insertion_lines(&self, kind: InsertionKind) -> &BTreeSet<usize> {
        match kind {
            InsertionKind::Statement => &self.lines_where_code_can_be_inserted,
            InsertionKind::TrailingComa => &self.lines_where_code_with_coma_can_be_inserted,
            InsertionKind::LeadingComa => &self.lines_where_code_with_start_coma_can_be_inserted,
        }
    }

    /// The insertion category of `line`, if any.
    pub fn insertion_kind(&self, line: usize) -> Option<InsertionKind> {
        [
            InsertionKind::Statement,
            InsertionKind::TrailingComa,
            InsertionKind::LeadingComa,
        ]
        .into_iter()
        .find(|kind| self.insertion_lines(*kind).contains(&line))
    }

    /// Insertion lines of every category that are executed.
    pub fn executed_insertion_lines(&self) -> Vec<(usize, InsertionKind)> {
        let mut lines: Vec<(usize, InsertionKind)> = [
            InsertionKind::Statement,
            InsertionKind::TrailingComa,
            InsertionKind::LeadingComa,
        ]
        .into_iter()
        .flat_map(|kind| self.insertion_lines(kind).iter().map(move |line| (*line, kind)))
        .filter(|(line, _)| !self.lines_which_are_not_executed.contains(line))
        .collect();
        lines.sort_unstable_by_key(|(line, _)| *line);
        lines
    }

    fn check_line(&self, line: usize, inclusive: bool) -> Result<()> {
        let limit = self.testcase_number_of_lines + usize::from(inclusive);
        if line < limit {
            Ok(())
        } else {
            Err(EngineError::LineOutOfRange {
                line,
                number_of_lines: self.testcase_number_of_lines,
            })
        }
    }

    fn shift_facts_from(&mut self, from: usize, delta: isize) {
        self.variable_types.shift_from(from, delta);
        self.array_lengths.shift_from(from, delta);
        self.array_items_or_properties.shift_from(from, delta);
    }

    /// Makes room for `added` lines before `index`. Facts from `index` onward
    /// move down with their lines, and the facts holding at `index` also hold
    /// on the opened lines.
    pub(crate) fn open_lines(&mut self, index: usize, added: usize) {
        let holding = self.extract_facts(index..index + 1);
        self.shift_facts_from(index, added as isize);
        self.restore_facts(&holding, index);
    }

    fn shift_dead_lines(&mut self, from: usize, delta: isize, dropped: Range<usize>) {
        self.lines_which_are_not_executed = std::mem::take(&mut self.lines_which_are_not_executed)
            .into_iter()
            .filter(|line| !dropped.contains(line))
            .map(|line| {
                if line >= from {
                    line.saturating_add_signed(delta)
                } else {
                    line
                }
            })
            .collect();
    }

    /// Accounts for `inserted_text` having been inserted at the start of line
    /// `index`; `new_content` is the full content after the insertion.
    pub fn insert_line(&mut self, index: usize, new_content: &str, inserted_text: &str) -> Result<()> {
        self.check_line(index, true)?;
        let added = scanner::count_lines(inserted_text) - 1;
        let actual = scanner::count_lines(new_content) as isize - self.testcase_number_of_lines as isize;
        if actual != added as isize {
            return Err(EngineError::InconsistentEdit { expected: added, actual });
        }

        let surrounded_by_dead_code = index > 0
            && self.lines_which_are_not_executed.contains(&(index - 1))
            && self.lines_which_are_not_executed.contains(&index);
        self.open_lines(index, added);
        self.shift_dead_lines(index, added as isize, 0..0);
        if surrounded_by_dead_code {
            self.lines_which_are_not_executed.extend(index..index + added);
        }
        self.refresh_syntax(new_content);
        Ok(())
    }

    /// Accounts for `count` lines starting at `start` having been removed.
    /// Facts produced by the removed lines are dropped, facts holding at
    /// `start` stay where they are.
    pub fn remove_lines(&mut self, start: usize, count: usize, new_content: &str) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.check_line(start + count - 1, false)?;
        let actual = scanner::count_lines(new_content) as isize - self.testcase_number_of_lines as isize;
        if actual != -(count as isize) {
            return Err(EngineError::InconsistentEdit {
                expected: count,
                actual,
            });
        }

        let produced = start + 1..start + count + 1;
        self.variable_types.remove_range(produced.clone());
        self.array_lengths.remove_range(produced.clone());
        self.array_items_or_properties.remove_range(produced.clone());
        self.shift_facts_from(produced.end, -(count as isize));
        let removed = start..start + count;
        self.shift_dead_lines(removed.end, -(count as isize), removed);
        self.refresh_syntax(new_content);
        Ok(())
    }

    /// Accounts for a same-line edit that changed the content length by `delta`.
    pub fn update_content_length(&mut self, delta: isize, new_content: &str) -> Result<()> {
        let expected = self.testcase_size.saturating_add_signed(delta);
        if expected != new_content.len() {
            return Err(EngineError::ContentLengthMismatch {
                expected,
                actual: new_content.len(),
            });
        }
        let lines = scanner::count_lines(new_content);
        if lines != self.testcase_number_of_lines {
            return Err(EngineError::InconsistentEdit {
                expected: 0,
                actual: lines as isize - self.testcase_number_of_lines as isize,
            });
        }
        self.testcase_size = new_content.len();
        self.curly_brackets_list = scanner::curly_bracket_pairs(new_content);
        Ok(())
    }

    /// Re-derives the line categories, brackets, size and line count.
    pub fn refresh_syntax(&mut self, content: &str) {
        let classification = classify_lines(content);
        self.lines_where_code_can_be_inserted = classification.code;
        self.lines_where_code_with_coma_can_be_inserted = classification.coma;
        self.lines_where_code_with_start_coma_can_be_inserted = classification.start_coma;
        self.curly_brackets_list = scanner::curly_bracket_pairs(content);
        self.testcase_size = content.len();
        self.testcase_number_of_lines = scanner::count_lines(content);
        let lines = self.testcase_number_of_lines;
        self.lines_which_are_not_executed.retain(|line| *line < lines);
    }

    /// Sets the identifier counters to the highest index present in `content`.
    pub fn recalculate_unused_variables(&mut self, content: &str) {
        let (mut variables, mut functions, mut classes) = (0, 0, 0);
        for identifier in scanner::numbered_identifiers(content) {
            let counter = match identifier.kind {
                IdentifierKind::Variable => &mut variables,
                IdentifierKind::Function => &mut functions,
                IdentifierKind::Class => &mut classes,
            };
            *counter = (*counter).max(identifier.index);
        }
        self.number_variables = variables;
        self.number_functions = functions;
        self.number_classes = classes;
    }

    pub fn counter(&self, kind: IdentifierKind) -> u32 {
        match kind {
            IdentifierKind::Variable => self.number_variables,
            IdentifierKind::Function => self.number_functions,
            IdentifierKind::Class => self.number_classes,
        }
    }

    /// The name [`TestcaseState::fresh_name`] would reserve next, left
    /// unreserved.
    pub fn next_name(&self, kind: IdentifierKind) -> String {
        kind.name(self.counter(kind) + 1)
    }

    /// Reserves the next unused name of `kind`.
    pub fn fresh_name(&mut self, kind: IdentifierKind) -> String {
        let counter = match kind {
            IdentifierKind::Variable => &mut self.number_variables,
            IdentifierKind::Function => &mut self.number_functions,
            IdentifierKind::Class => &mut self.number_classes,
        };
        *counter += 1;
        kind.name(*counter)
    }

    pub fn fresh_variable_name(&mut self) -> String {
        self.fresh_name(IdentifierKind::Variable)
    }

    /// Copies the facts located on `lines`.
    pub fn extract_facts(&self, lines: Range<usize>) -> FactSnapshot {
        FactSnapshot {
            variable_types: self.variable_types.extract_range(lines.clone()),
            array_lengths: self.array_lengths.extract_range(lines.clone()),
            array_items_or_properties: self.array_items_or_properties.extract_range(lines),
        }
    }

    /// Re-inserts facts taken with [`TestcaseState::extract_facts`] at `line`.
    pub fn restore_facts(&mut self, snapshot: &FactSnapshot, line: usize) {
        self.variable_types.merge_shifted(&snapshot.variable_types, line);
        self.array_lengths.merge_shifted(&snapshot.array_lengths, line);
        self.array_items_or_properties
            .merge_shifted(&snapshot.array_items_or_properties, line);
    }

    /// Checks the bookkeeping of the state against `content`.
    pub fn validate(&self, content: &str) -> Result<()> {
        if self.testcase_size != content.len() {
            return Err(EngineError::ContentLengthMismatch {
                expected: self.testcase_size,
                actual: content.len(),
            });
        }
        let lines = scanner::count_lines(content);
        if lines != self.testcase_number_of_lines {
            return Err(EngineError::InconsistentEdit {
                expected: self.testcase_number_of_lines,
                actual: lines as isize,
            });
        }
        let max_line = [
            self.variable_types.max_line(),
            self.array_lengths.max_line(),
            self.array_items_or_properties.max_line(),
        ]
        .into_iter()
        .flatten()
        .max();
        match max_line {
            Some(line) if line > lines => Err(EngineError::LineOutOfRange {
                line,
                number_of_lines: lines,
            }),
            _ => Ok(()),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(serde_cbor::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn state_with_facts() -> (String, TestcaseState) {
        let content = "var var_1_ = 1;\nvar var_2_ = 'a';\nvar_1_;".to_string();
        let mut state = TestcaseState::analyze(&content);
        state.variable_types.insert("var_2_", 2, JsType::Undefined);
        (content, state)
    }

    #[test]
    fn analyze_counts_and_lines() {
        let (content, state) = state_with_facts();
        assert_eq!(state.testcase_number_of_lines, 3);
        assert_eq!(state.testcase_size, content.len());
        assert_eq!(state.number_variables, 2);
        assert!(state.validate(&content).is_ok());
    }

    #[test]
    fn availability_ignores_undefined_only_when_asked() {
        let (_, state) = state_with_facts();
        let available = state.available_variables_with_types(2, true);
        assert_eq!(available["var_1_"], BTreeSet::from([JsType::RealNumber]));
        assert_eq!(available["var_2_"], BTreeSet::from([JsType::String]));
        let all = state.available_variables_with_types(1, false);
        assert_eq!(all["var_2_"], BTreeSet::from([JsType::Undefined]));
        assert!(!state.available_variables_with_types(1, true).contains_key("var_2_"));
        assert_eq!(state.variables_of_type(2, JsType::String), vec!["var_2_".to_string()]);
    }

    #[test]
    fn insert_keeps_facts_visible_on_the_new_line() {
        let (_, mut state) = state_with_facts();
        let content = "var var_1_ = 1;\nfoo();\nvar var_2_ = 'a';\nvar_1_;";
        state.insert_line(1, content, "foo();\n").unwrap();
        assert_eq!(state.testcase_number_of_lines, 4);
        let lines: Vec<usize> = state.variable_types.facts("var_1_").iter().map(|fact| fact.line).collect();
        assert_eq!(lines, vec![1, 2]);
        assert_eq!(state.variable_types.facts("var_2_").last().map(|fact| fact.line), Some(3));
        assert!(state.validate(content).is_ok());
    }

    #[test]
    fn insert_rejects_inconsistent_content() {
        let (content, mut state) = state_with_facts();
        assert_matches!(
            state.insert_line(1, &content, "foo();\n"),
            Err(EngineError::InconsistentEdit { expected: 1, actual: 0 })
        );
        assert_matches!(
            state.insert_line(7, &content, "foo();\n"),
            Err(EngineError::LineOutOfRange { line: 7, .. })
        );
    }

    #[test]
    fn remove_drops_facts_produced_by_removed_lines() {
        let (_, mut state) = state_with_facts();
        state.remove_lines(1, 1, "var var_1_ = 1;\nvar_1_;").unwrap();
        assert_eq!(state.testcase_number_of_lines, 2);
        assert_eq!(state.variable_types.facts("var_1_")[0].line, 1);
        let var_2: Vec<(usize, JsType)> = state
            .variable_types
            .facts("var_2_")
            .iter()
            .map(|fact| (fact.line, fact.value))
            .collect();
        assert_eq!(var_2, vec![(0, JsType::Undefined)]);
        state.remove_lines(0, 0, "ignored").unwrap();
        assert_eq!(state.testcase_number_of_lines, 2);
    }

    #[test]
    fn dead_lines_follow_edits() {
        let content = "a;\nb;\nc;";
        let mut state = TestcaseState::analyze(content);
        state.lines_which_are_not_executed.extend([1, 2]);
        state.insert_line(2, "a;\nb;\nx;\nc;", "x;\n").unwrap();
        assert_eq!(state.lines_which_are_not_executed, BTreeSet::from([1, 2, 3]));
        state.remove_lines(0, 1, "b;\nx;\nc;").unwrap();
        assert_eq!(state.lines_which_are_not_executed, BTreeSet::from([0, 1, 2]));
    }

    #[test]
    fn content_length_updates_are_checked() {
        let (content, mut state) = state_with_facts();
        let edited = content.replace("= 1", "= 100");
        state.update_content_length(2, &edited).unwrap();
        assert_eq!(state.testcase_size, edited.len());
        assert_matches!(
            state.update_content_length(5, &edited),
            Err(EngineError::ContentLengthMismatch { .. })
        );
    }

    #[test]
    fn counters_tolerate_gaps() {
        let mut state = TestcaseState::default();
        state.recalculate_unused_variables("var_3_ + func_7_() + var_1_");
        assert_eq!(state.number_variables, 3);
        assert_eq!(state.number_functions, 7);
        assert_eq!(state.number_classes, 0);
        assert_eq!(state.fresh_variable_name(), "var_4_");
    }

    #[test]
    fn array_queries() {
        let mut state = TestcaseState::default();
        state.array_items_or_properties.insert("var_1_[0]", 1, JsType::String);
        state.array_items_or_properties.insert("var_1_.x", 1, JsType::RealNumber);
        state.array_items_or_properties.insert("var_10_[2]", 1, JsType::String);
        state.array_lengths.insert("var_1_", 1, vec![3, 1]);
        assert_eq!(state.used_array_indexes_in_line("var_1_", 2), vec!["0".to_string()]);
        assert!(state.used_array_indexes_in_line("var_1_", 0).is_empty());
        assert_eq!(state.array_lengths_in_line("var_1_", 1), vec![1, 3]);
    }

    #[test]
    fn serialization_round_trip() {
        let (_, state) = state_with_facts();
        let bytes = state.serialize().unwrap();
        assert_eq!(TestcaseState::deserialize(&bytes).unwrap(), state);
        assert_matches!(
            TestcaseState::deserialize(b"not cbor"),
            Err(EngineError::Serialization(_))
        );
    }
}
