//! Splicing a testcase or an operation fragment into another testcase.
//!
//! The receiving testcase is taken by value and the donor by reference, so a
//! testcase can only be merged with itself through an explicit clone.

use rand::Rng;
use rand::seq::IteratorRandom;

use crate::constants::PLACEHOLDER_TOKEN;
use crate::database::Operation;
use crate::error::{EngineError, Result};
use crate::scanner;
use crate::state::{FactTable, TestcaseState};
use crate::testcase::Testcase;

/// Shifts every normalized identifier of `text` above the indices in use in
/// `base`, so the two name spaces cannot collide.
fn renumber_above(text: &str, base: &TestcaseState) -> String {
    scanner::renumber_identifiers(text, |kind, index| index + base.counter(kind))
}

/// The donor with every identifier renumbered above those of `base`, both in
/// the text and in the keys of its state tables.
fn renumbered_donor(base: &TestcaseState, content: &str, state: &TestcaseState) -> Testcase {
    let mut state = state.clone();
    state.variable_types.rename_keys(|key| renumber_above(key, base));
    state.array_lengths.rename_keys(|key| renumber_above(key, base));
    state
        .array_items_or_properties
        .rename_keys(|key| renumber_above(key, base));
    state.function_arguments = std::mem::take(&mut state.function_arguments)
        .into_iter()
        .map(|(name, arity)| (renumber_above(&name, base), arity))
        .collect();
    Testcase::new(renumber_above(content, base), state)
}

fn substitute_placeholder(donor: &mut Testcase, target: &str) {
    donor.content = scanner::replace_identifier(&donor.content, PLACEHOLDER_TOKEN, target);
    let rename = |key: &str| scanner::replace_identifier(key, PLACEHOLDER_TOKEN, target);
    donor.state.variable_types.rename_keys(rename);
    donor.state.array_lengths.rename_keys(rename);
    donor.state.array_items_or_properties.rename_keys(rename);
}

/// Places `donor` facts at `line` onward, and makes the facts holding at the
/// donor's end hold again right after it.
fn splice_facts<T: Clone + PartialEq>(table: &mut FactTable<T>, donor: &FactTable<T>, line: usize, donor_lines: usize) {
    table.merge_shifted(donor, line);
    table.import_at_line(donor, donor_lines, line + donor_lines);
}

/// Splices an already renumbered donor in before `line` of `base`.
fn splice(base: Testcase, donor: Testcase, line: usize) -> Result<Testcase> {
    let Testcase {
        content: base_content,
        mut state,
    } = base;
    let base_lines = state.testcase_number_of_lines;
    if line > base_lines {
        return Err(EngineError::LineOutOfRange {
            line,
            number_of_lines: base_lines,
        });
    }
    let donor_lines = scanner::count_lines(&donor.content);

    let content = if line == base_lines {
        format!("{base_content}\n{}", donor.content)
    } else {
        let at = *scanner::line_starts(&base_content)
            .get(line)
            .ok_or(EngineError::LineOutOfRange {
                line,
                number_of_lines: base_lines,
            })?;
        let mut content = String::with_capacity(base_content.len() + donor.content.len() + 1);
        content.push_str(&base_content[..at]);
        content.push_str(&donor.content);
        content.push('\n');
        content.push_str(&base_content[at..]);
        content
    };

    state.open_lines(line, donor_lines);
    splice_facts(&mut state.variable_types, &donor.state.variable_types, line, donor_lines);
    splice_facts(&mut state.array_lengths, &donor.state.array_lengths, line, donor_lines);
    splice_facts(
        &mut state.array_items_or_properties,
        &donor.state.array_items_or_properties,
        line,
        donor_lines,
    );
    state.function_arguments.extend(donor.state.function_arguments);

    let dead = std::mem::take(&mut state.lines_which_are_not_executed);
    let donor_is_dead = line > 0 && dead.contains(&(line - 1)) && dead.contains(&line);
    state.lines_which_are_not_executed = dead
        .into_iter()
        .map(|l| if l >= line { l + donor_lines } else { l })
        .chain(donor.state.lines_which_are_not_executed.iter().map(|l| l + line))
        .collect();
    if donor_is_dead {
        state.lines_which_are_not_executed.extend(line..line + donor_lines);
    }

    state.refresh_syntax(&content);
    state.recalculate_unused_variables(&content);
    Ok(Testcase { content, state })
}

/// Inserts `donor` before `line` of `base`. `line == number_of_lines` appends.
///
/// The donor's identifiers are renumbered above those of `base`; its facts are
/// shifted to their new lines and the facts of `base` after the insertion
/// point move down by the donor's line count.
pub fn merge_testcases(base: Testcase, donor: &Testcase, line: usize) -> Result<Testcase> {
    let donor = renumbered_donor(&base.state, &donor.content, &donor.state);
    splice(base, donor, line)
}

/// Appends `donor` after the last line of `base`.
pub fn append_testcase(base: Testcase, donor: &Testcase) -> Result<Testcase> {
    let line = base.state.testcase_number_of_lines;
    merge_testcases(base, donor, line)
}

/// Inserts a database operation before `line`, substituting its placeholder
/// with `target`. Renumbering happens first so the substituted name is not
/// renumbered with the fragment's own names.
pub fn insert_operation(base: Testcase, operation: &Operation, line: usize, target: Option<&str>) -> Result<Testcase> {
    let mut donor = renumbered_donor(&base.state, &operation.code, &operation.state);
    if let Some(target) = target {
        substitute_placeholder(&mut donor, target);
    } else if donor.content.contains(PLACEHOLDER_TOKEN) {
        return Err(EngineError::InvalidFragment(format!(
            "`{}` needs a target variable",
            operation.code
        )));
    }
    splice(base, donor, line)
}

/// A line to merge at: an executed statement line, or the append point.
pub fn random_merge_line<R: Rng + ?Sized>(rng: &mut R, state: &TestcaseState) -> usize {
    state
        .lines_where_code_can_be_inserted
        .iter()
        .filter(|line| !state.lines_which_are_not_executed.contains(line))
        .choose(rng)
        .copied()
        .unwrap_or(state.testcase_number_of_lines)
}
