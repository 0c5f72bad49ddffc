use libafl::mutators::MutationResult;
use rand::seq::IndexedRandom;
use std::collections::BTreeSet;
use std::ops::Range;

use super::MutationContext;
use crate::constants::DECLARATION_KEYWORDS;
use crate::database::OperationSource;
use crate::error::Result;
use crate::merge;
use crate::scanner::{self, preceding_word};
use crate::tagging::*;
use crate::testcase::Testcase;

pub(super) fn insert_random_operation(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some((line, kind)) = ctx.insertion_point(&testcase.state) else {
        return ctx.skipped(MUTATION_INSERT_RANDOM_OPERATION_NO_CANDIDATE);
    };
    let database = ctx.database;
    let Some(selected) = database.random_operation_at_line(ctx.rng, &testcase.state, line, kind) else {
        return ctx.skipped(MUTATION_INSERT_RANDOM_OPERATION_NO_CANDIDATE);
    };
    match selected.source {
        OperationSource::Reduced => ctx.tag(MUTATION_INSERT_RANDOM_OPERATION_REDUCED),
        OperationSource::GenericFallback => ctx.tag(MUTATION_INSERT_RANDOM_OPERATION_FALLBACK),
        OperationSource::Primary | OperationSource::Generic => {}
    }
    if selected.guarded {
        ctx.tag(MUTATION_INSERT_RANDOM_OPERATION_GUARDED);
    }
    *testcase = merge::insert_operation(testcase.clone(), &selected.operation, line, selected.target.as_deref())?;
    ctx.mutated(MUTATION_INSERT_RANDOM_OPERATION)
}

pub(super) fn insert_generic_operation(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some((line, kind)) = ctx.insertion_point(&testcase.state) else {
        return ctx.skipped(MUTATION_INSERT_GENERIC_OPERATION_NO_CANDIDATE);
    };
    let database = ctx.database;
    let operation = database
        .random_generic_operation(ctx.rng, kind)
        .filter(|operation| !operation.uses_placeholder());
    let Some(operation) = operation else {
        return ctx.skipped(MUTATION_INSERT_GENERIC_OPERATION_NO_CANDIDATE);
    };
    *testcase = merge::insert_operation(testcase.clone(), &operation, line, None)?;
    ctx.mutated(MUTATION_INSERT_GENERIC_OPERATION)
}

/// The innermost block enclosing line `line`, as a line span.
fn enclosing_block(spans: &[(usize, usize)], line: usize) -> Option<(usize, usize)> {
    // Sorted by open offset, so the last enclosing span is the innermost.
    spans
        .iter()
        .copied()
        .filter(|&(open, close)| open < line && line <= close)
        .next_back()
}

/// Line spans of `try` blocks.
fn try_blocks(content: &str) -> Vec<(usize, usize)> {
    let bytes = content.as_bytes();
    let starts = scanner::line_starts(content);
    scanner::curly_bracket_pairs(content)
        .into_iter()
        .filter(|&(open, _)| preceding_word(bytes, open) == Some("try"))
        .map(|(open, close)| {
            (
                scanner::line_of_offset(&starts, open),
                scanner::line_of_offset(&starts, close),
            )
        })
        .collect()
}

fn is_declaration(text: &str) -> bool {
    DECLARATION_KEYWORDS
        .iter()
        .chain(&["function", "class", "async"])
        .any(|keyword| {
            text.strip_prefix(keyword)
                .is_some_and(|rest| rest.starts_with([' ', '*', '(']))
        })
}

/// An instruction that can be moved, and the lines it can be moved before.
struct Movable {
    lines: Range<usize>,
    destinations: Vec<usize>,
}

fn destinations(testcase: &Testcase, lines: &Range<usize>, blocks: &[(usize, usize)], tries: &[(usize, usize)]) -> Vec<usize> {
    let state = &testcase.state;
    let text = testcase.lines()[lines.clone()].join("\n");
    let referenced: BTreeSet<String> = scanner::variable_positions(&text, false)
        .into_iter()
        .map(|identifier| text[identifier.span].to_string())
        .collect();
    let block = enclosing_block(blocks, lines.start);

    state
        .lines_where_code_can_be_inserted
        .iter()
        .copied()
        .filter(|&line| line < lines.start || line > lines.end)
        .filter(|line| !state.lines_which_are_not_executed.contains(line))
        .filter(|&line| enclosing_block(blocks, line) == block)
        .filter(|&line| !tries.iter().any(|&(open, close)| open < line && line <= close))
        .filter(|&line| {
            let available = state.available_variables_with_types(line, true);
            referenced.iter().all(|name| available.contains_key(name))
        })
        .collect()
}

fn movable_instructions(testcase: &Testcase) -> Vec<Movable> {
    let state = &testcase.state;
    let blocks = scanner::block_line_spans(&testcase.content);
    let tries = try_blocks(&testcase.content);
    let number_of_lines = testcase.number_of_lines();

    state
        .lines_where_code_can_be_inserted
        .iter()
        .copied()
        .filter(|&line| line < number_of_lines)
        .filter(|&line| {
            testcase.line(line).is_some_and(|text| {
                let text = text.trim();
                !text.is_empty() && !text.starts_with("//") && !text.starts_with('}') && !is_declaration(text)
            })
        })
        .filter_map(|line| scanner::parse_one_instruction(&testcase.content, line))
        .filter(|lines| !lines.is_empty() && lines.end <= number_of_lines)
        .map(|lines| {
            let destinations = destinations(testcase, &lines, &blocks, &tries);
            Movable { lines, destinations }
        })
        .collect()
}

/// Moves a complete instruction to another line of the same block where
/// every variable it references is already defined.
pub(super) fn move_operation_around(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let instructions = movable_instructions(testcase);
    if instructions.is_empty() {
        return ctx.skipped(MUTATION_MOVE_OPERATION_AROUND_NO_CANDIDATE);
    }
    let instructions: Vec<&Movable> = instructions
        .iter()
        .filter(|instruction| !instruction.destinations.is_empty())
        .collect();
    let Some(instruction) = instructions.choose(ctx.rng) else {
        return ctx.skipped(MUTATION_MOVE_OPERATION_AROUND_NO_DESTINATION);
    };
    let Some(&destination) = instruction.destinations.choose(ctx.rng) else {
        return ctx.skipped(MUTATION_MOVE_OPERATION_AROUND_NO_DESTINATION);
    };

    let Range { start, end } = instruction.lines.clone();
    let count = end - start;
    let code = testcase.lines()[start..end].join("\n");
    let produced = testcase.state.extract_facts(start + 1..end + 1);
    testcase.remove_lines(start, count)?;
    let target = if destination > start {
        destination - count
    } else {
        destination
    };
    testcase.insert_line(target, &code)?;
    testcase.state.restore_facts(&produced, target + 1);
    ctx.mutated(MUTATION_MOVE_OPERATION_AROUND)
}
