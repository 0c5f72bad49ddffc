use libafl::mutators::MutationResult;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::BTreeSet;

use super::{MutationContext, insert_statement};
use crate::error::Result;
use crate::tagging::*;
use crate::testcase::Testcase;
use crate::types::JsType;
use crate::values::random_value_of_other_type;

/// Lengths at the edges of the engine's array representations: empty, the
/// small preallocated sizes, the fast-elements limit and the index limit.
const INTERESTING_LENGTHS: &[usize] = &[0, 1, 2, 7, 8, 16, 17, 100, 1000, 1024, 65535, 65536, 100000, 4294967295];

const OUT_OF_BOUNDS_OFFSETS: &[usize] = &[0, 1, 2, 8, 100, 1000, 100000];

fn is_array(types: &BTreeSet<JsType>) -> bool {
    types.len() == 1 && types.contains(&JsType::Array)
}

fn is_array_like(types: &BTreeSet<JsType>) -> bool {
    !types.is_empty() && types.iter().all(|ty| ty.is_array_like())
}

pub(super) fn modify_array_length(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some((line, name, _)) = ctx.variable_at_statement_line(&testcase.state, |_, types| is_array(types)) else {
        return ctx.skipped(MUTATION_MODIFY_ARRAY_LENGTH_NO_CANDIDATE);
    };
    let known = testcase.state.array_lengths_in_line(&name, line);
    let length = match known.choose(ctx.rng) {
        Some(&current) if ctx.rng.random_bool(0.5) => {
            if current > 0 && ctx.rng.random_bool(0.5) {
                current - 1
            } else {
                current + 1
            }
        }
        _ => INTERESTING_LENGTHS.choose(ctx.rng).copied().unwrap_or(0),
    };
    insert_statement(testcase, line, &format!("{name}.length = {length};"))?;
    testcase.state.array_lengths.set(name, line + 1, vec![length]);
    ctx.mutated(MUTATION_MODIFY_ARRAY_LENGTH)
}

/// Reads or writes an index at or past the known end of an array.
pub(super) fn array_access_out_of_bounds(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some((line, name, _)) = ctx.variable_at_statement_line(&testcase.state, |_, types| is_array_like(types))
    else {
        return ctx.skipped(MUTATION_ARRAY_ACCESS_OUT_OF_BOUNDS_NO_CANDIDATE);
    };
    let end = testcase
        .state
        .array_lengths_in_line(&name, line)
        .into_iter()
        .max()
        .unwrap_or(0);
    let offset = OUT_OF_BOUNDS_OFFSETS.choose(ctx.rng).copied().unwrap_or(0);
    let index = end + offset;
    let accessor = format!("{name}[{index}]");
    if ctx.rng.random_bool(0.5) {
        insert_statement(testcase, line, &format!("{accessor};"))?;
    } else {
        let (value, ty) = random_value_of_other_type(ctx.rng, JsType::Undefined);
        insert_statement(testcase, line, &format!("{accessor} = {value};"))?;
        testcase.state.array_items_or_properties.set(accessor, line + 1, ty);
    }
    ctx.mutated(MUTATION_ARRAY_ACCESS_OUT_OF_BOUNDS)
}

/// Stores a value of a different type into an existing array slot.
pub(super) fn change_array_item_type(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let state = &testcase.state;
    let Some((line, name, _)) = ctx.variable_at_statement_line(state, |_, types| is_array_like(types)) else {
        return ctx.skipped(MUTATION_CHANGE_ARRAY_ITEM_TYPE_NO_CANDIDATE);
    };
    let mut indexes = state.used_array_indexes_in_line(&name, line);
    if let Some(&length) = state.array_lengths_in_line(&name, line).iter().max() {
        indexes.extend((0..length.min(16)).map(|index| index.to_string()));
    }
    if indexes.is_empty() {
        indexes.push("0".to_string());
    }
    let Some(index) = indexes.choose(ctx.rng).cloned() else {
        return ctx.skipped(MUTATION_CHANGE_ARRAY_ITEM_TYPE_NO_CANDIDATE);
    };
    let accessor = format!("{name}[{index}]");
    let current = state
        .available_array_items_or_properties(line, true)
        .get(&accessor)
        .and_then(|types| types.first().copied())
        .unwrap_or(JsType::RealNumber);
    let (value, ty) = random_value_of_other_type(ctx.rng, current);
    insert_statement(testcase, line, &format!("{accessor} = {value};"))?;
    testcase.state.array_items_or_properties.set(accessor, line + 1, ty);
    ctx.mutated(MUTATION_CHANGE_ARRAY_ITEM_TYPE)
}

#[cfg(test)]
mod tests {
    use super::super::Mutation;
    use super::super::test_support::*;
    use super::*;

    fn array_testcase() -> Testcase {
        Testcase::analyze("var var_1_ = [1, 2, 3];\nvar_1_;")
    }

    fn inserted_line(result: &Testcase, prefix: &str) -> usize {
        result
            .lines()
            .iter()
            .position(|line| line.starts_with(prefix))
            .unwrap()
    }

    #[test]
    fn strings_are_not_arrays() {
        let testcase = Testcase::analyze("var var_1_ = 'abc';\nvar_1_;");
        for mutation in [
            Mutation::ModifyArrayLength,
            Mutation::ArrayAccessOutOfBounds,
            Mutation::ChangeArrayItemType,
        ] {
            assert!(mutated_results(mutation, &testcase, 10).is_empty(), "{}", mutation.name());
        }
    }

    #[test]
    fn new_lengths_are_recorded() {
        let results = mutated_results(Mutation::ModifyArrayLength, &array_testcase(), 20);
        assert_eq!(results.len(), 20);
        for result in results {
            let line = inserted_line(&result, "var_1_.length = ");
            let length: usize = result.lines()[line]
                .trim_start_matches("var_1_.length = ")
                .trim_end_matches(';')
                .parse()
                .unwrap();
            assert_eq!(result.state.array_lengths_in_line("var_1_", line + 1), vec![length]);
        }
    }

    #[test]
    fn accesses_start_at_the_known_end() {
        for result in mutated_results(Mutation::ArrayAccessOutOfBounds, &array_testcase(), 20) {
            let line = result.lines()[inserted_line(&result, "var_1_[")].to_string();
            let index: usize = line["var_1_[".len()..line.find(']').unwrap()].parse().unwrap();
            assert!(index >= 3, "{line}");
            assert!(result.validate().is_ok());
        }
    }

    #[test]
    fn item_types_change() {
        let results = mutated_results(Mutation::ChangeArrayItemType, &array_testcase(), 20);
        assert_eq!(results.len(), 20);
        for result in results {
            let line = inserted_line(&result, "var_1_[");
            let text = result.lines()[line].to_string();
            let accessor = &text[..text.find(" = ").unwrap()];
            let types = result.state.available_array_items_or_properties(line + 1, true);
            assert!(!types[accessor].contains(&JsType::RealNumber), "{text}");
        }
    }
}
