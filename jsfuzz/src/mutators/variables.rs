use libafl::mutators::MutationResult;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use super::{MutationContext, insert_statement, record_declaration};
use crate::error::Result;
use crate::scanner;
use crate::state::{TestcaseState, accessor_base, facts_at_line, infer};
use crate::tagging::*;
use crate::testcase::Testcase;
use crate::types::JsType;
use crate::values::numbers::{random_integer, random_special_value};
use crate::values::{code_to_create_random_variable_with_datatype, random_array, random_datatype, random_value};

/// Values that are not numbers but still tend to surprise type feedback.
const SPECIAL_OBJECT_VALUES: &[&str] = &[
    "[]",
    "{}",
    "''",
    "true",
    "false",
    "function() {}",
    "Symbol.iterator",
    "new Proxy({}, {})",
    "Object.create(null)",
];

const PROPERTY_NAMES: &[&str] = &[
    "a", "b", "c", "x", "y", "p0", "p1", "constructor", "valueOf", "toString", "length", "then", "prototype",
];

fn holds_objects(types: &BTreeSet<JsType>) -> bool {
    !types.is_empty() && types.iter().all(|ty| !ty.is_primitive())
}

pub(super) fn add_variable(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some(line) = ctx.statement_line(&testcase.state) else {
        return ctx.skipped(MUTATION_ADD_VARIABLE_NO_CANDIDATE);
    };
    let ty = random_datatype(ctx.rng);
    let (value, length) = if ty == JsType::Array {
        let array = random_array(ctx.rng);
        (array.code, array.length)
    } else {
        (code_to_create_random_variable_with_datatype(ctx.rng, ty), None)
    };
    let name = testcase.fresh_variable_name();
    insert_statement(testcase, line, &format!("var {name} = {value};"))?;
    record_declaration(&mut testcase.state, &name, line, ty);
    if let Some(length) = length {
        testcase.state.array_lengths.insert(name.as_str(), line + 1, vec![length]);
    }
    ctx.mutated(MUTATION_ADD_VARIABLE)
}

/// Replaces one read of a variable with another variable holding exactly the
/// same types at that line.
pub(super) fn change_two_variables_of_same_type(
    testcase: &mut Testcase,
    ctx: &mut MutationContext,
) -> Result<MutationResult> {
    let content = &testcase.content;
    let starts = scanner::line_starts(content);
    let mut available_at: BTreeMap<usize, BTreeMap<String, BTreeSet<JsType>>> = BTreeMap::new();
    let mut candidates: Vec<(Range<usize>, String)> = Vec::new();
    for position in scanner::variable_positions(content, true) {
        let name = &content[position.span.clone()];
        let line = scanner::line_of_offset(&starts, position.span.start);
        let available = available_at
            .entry(line)
            .or_insert_with(|| testcase.state.available_variables_with_types(line, true));
        let Some(types) = available.get(name) else {
            continue;
        };
        candidates.extend(
            available
                .iter()
                .filter(|(other, other_types)| other.as_str() != name && *other_types == types)
                .map(|(other, _)| (position.span.clone(), other.clone())),
        );
    }
    let Some((span, other)) = candidates.choose(ctx.rng).cloned() else {
        return ctx.skipped(MUTATION_CHANGE_TWO_VARIABLES_OF_SAME_TYPE_NO_CANDIDATE);
    };
    testcase.replace_span(span, &other)?;
    ctx.mutated(MUTATION_CHANGE_TWO_VARIABLES_OF_SAME_TYPE)
}

pub(super) fn change_prototype(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some((line, name, types)) = ctx.variable_at_statement_line(&testcase.state, |_, types| holds_objects(types))
    else {
        return ctx.skipped(MUTATION_CHANGE_PROTOTYPE_NO_CANDIDATE);
    };
    let prototypes: Vec<String> = JsType::instantiable()
        .filter(|ty| !types.contains(ty))
        .filter_map(|ty| ctx.registry.prototype_expression(ty))
        .collect();
    let Some(prototype) = prototypes.choose(ctx.rng) else {
        return ctx.skipped(MUTATION_CHANGE_PROTOTYPE_NO_CANDIDATE);
    };
    let code = if ctx.rng.random_bool(0.5) {
        format!("Object.setPrototypeOf({name}, {prototype});")
    } else {
        format!("{name}.__proto__ = {prototype};")
    };
    insert_statement(testcase, line, &code)?;
    ctx.mutated(MUTATION_CHANGE_PROTOTYPE)
}

pub(super) fn assign_special_value(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some((line, name, _)) = ctx.variable_at_statement_line(&testcase.state, |_, _| true) else {
        return ctx.skipped(MUTATION_ASSIGN_SPECIAL_VALUE_NO_CANDIDATE);
    };
    let value = if ctx.rng.random_bool(0.6) {
        random_special_value(ctx.rng)
    } else {
        SPECIAL_OBJECT_VALUES.choose(ctx.rng).copied().unwrap_or("null")
    };
    insert_statement(testcase, line, &format!("{name} = {value};"))?;

    let state = &mut testcase.state;
    let ty = infer::literal_type(value).unwrap_or(JsType::RealNumber);
    state.variable_types.set(name.as_str(), line + 1, ty);
    if !state.array_lengths_in_line(&name, line + 1).is_empty() {
        state.array_lengths.set(name.as_str(), line + 1, Vec::new());
    }
    ctx.mutated(MUTATION_ASSIGN_SPECIAL_VALUE)
}

pub(super) fn add_property(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some((line, name, types)) = ctx.variable_at_statement_line(&testcase.state, |_, types| holds_objects(types))
    else {
        return ctx.skipped(MUTATION_ADD_PROPERTY_NO_CANDIDATE);
    };
    let known: Vec<&str> = types
        .iter()
        .flat_map(|ty| ctx.registry.properties(*ty).iter().copied())
        .collect();
    let accessor = match ctx.rng.random_range(0..4) {
        0 => format!("{name}[{}]", random_integer(ctx.rng)),
        1 if !known.is_empty() => format!("{name}.{}", known.choose(ctx.rng).copied().unwrap_or("a")),
        _ => format!("{name}.{}", PROPERTY_NAMES.choose(ctx.rng).copied().unwrap_or("a")),
    };
    let (value, ty) = random_value(ctx.rng);
    let code = match accessor.strip_prefix(name.as_str()).and_then(|rest| rest.strip_prefix('.')) {
        Some(property) if ctx.rng.random_bool(0.25) => {
            let writable = ctx.rng.random_bool(0.5);
            format!(
                "Object.defineProperty({name}, '{property}', {{value: {value}, writable: {writable}, configurable: true}});"
            )
        }
        _ => format!("{accessor} = {value};"),
    };
    insert_statement(testcase, line, &code)?;
    testcase.state.array_items_or_properties.set(accessor, line + 1, ty);
    ctx.mutated(MUTATION_ADD_PROPERTY)
}

/// Recorded properties and array items, by line, whose base variable is
/// available.
fn recorded_accessors(state: &TestcaseState) -> Vec<(usize, String)> {
    super::executed_statement_lines(state)
        .into_iter()
        .flat_map(|line| {
            let available = state.available_variables_with_types(line, true);
            state
                .array_items_or_properties
                .iter()
                .filter(|(accessor, facts)| {
                    available.contains_key(accessor_base(accessor)) && !facts_at_line(facts, line).is_empty()
                })
                .map(|(accessor, _)| (line, accessor.to_string()))
                .collect::<Vec<_>>()
        })
        .collect()
}

pub(super) fn delete_property(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let recorded = recorded_accessors(&testcase.state);
    let (line, accessor, known) = if let Some((line, accessor)) = recorded.choose(ctx.rng).cloned() {
        (line, accessor, true)
    } else {
        let Some((line, name, types)) =
            ctx.variable_at_statement_line(&testcase.state, |_, types| holds_objects(types))
        else {
            return ctx.skipped(MUTATION_DELETE_PROPERTY_NO_CANDIDATE);
        };
        let properties: Vec<&str> = types
            .iter()
            .flat_map(|ty| ctx.registry.properties(*ty).iter().copied())
            .collect();
        let Some(property) = properties.choose(ctx.rng) else {
            return ctx.skipped(MUTATION_DELETE_PROPERTY_NO_CANDIDATE);
        };
        (line, format!("{name}.{property}"), false)
    };
    insert_statement(testcase, line, &format!("delete {accessor};"))?;
    if known {
        testcase
            .state
            .array_items_or_properties
            .set(accessor, line + 1, JsType::Undefined);
    }
    ctx.mutated(MUTATION_DELETE_PROPERTY)
}

#[cfg(test)]
mod tests {
    use super::super::Mutation;
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn new_variables_are_declared_and_typed() {
        let testcase = Testcase::analyze("1;");
        let results = mutated_results(Mutation::AddVariable, &testcase, 20);
        assert_eq!(results.len(), 20);
        for result in results {
            assert!(result.content.contains("var var_1_ = "), "{}", result.content);
            assert!(result.state.variable_types.contains("var_1_"));
            assert_eq!(result.state.number_variables, 1);
            assert!(result.validate().is_ok());
        }
    }

    #[test]
    fn a_single_variable_is_never_swapped() {
        let testcase = Testcase::analyze("var var_1_ = [1];\nvar_1_.push(2);");
        assert!(mutated_results(Mutation::ChangeTwoVariablesOfSameType, &testcase, 20).is_empty());
    }

    #[test]
    fn swapped_variables_share_their_types() {
        let testcase = Testcase::analyze("var var_1_ = [1];\nvar var_2_ = [2];\nvar var_3_ = 'a';\nvar_1_.push(3);");
        let results = mutated_results(Mutation::ChangeTwoVariablesOfSameType, &testcase, 10);
        assert_eq!(results.len(), 10);
        for result in results {
            assert_eq!(
                result.content,
                "var var_1_ = [1];\nvar var_2_ = [2];\nvar var_3_ = 'a';\nvar_2_.push(3);"
            );
        }
    }

    #[test]
    fn primitives_keep_their_prototype() {
        let testcase = Testcase::analyze("var var_1_ = 1;\nvar_1_;");
        assert!(mutated_results(Mutation::ChangePrototype, &testcase, 20).is_empty());
        assert!(mutated_results(Mutation::AddProperty, &testcase, 20).is_empty());
    }

    #[test]
    fn prototypes_come_from_other_types() {
        let testcase = Testcase::analyze("var var_1_ = [];\nvar_1_;");
        let results = mutated_results(Mutation::ChangePrototype, &testcase, 20);
        assert_eq!(results.len(), 20);
        for result in results {
            assert!(
                result.content.contains("Object.setPrototypeOf(var_1_, ") || result.content.contains("var_1_.__proto__ = "),
                "{}",
                result.content
            );
            assert!(!result.content.contains(", Array.prototype)"));
            assert!(!result.content.contains("= Array.prototype;"));
        }
    }

    #[test]
    fn special_values_update_the_type() {
        let testcase = Testcase::analyze("var var_1_ = [1, 2];\nvar_1_;");
        for result in mutated_results(Mutation::AssignSpecialValue, &testcase, 20) {
            let lines = result.lines();
            let assignment = lines
                .iter()
                .position(|line| line.starts_with("var_1_ = "))
                .unwrap();
            assert!(assignment >= 1, "{}", result.content);
            let value = lines[assignment].trim_start_matches("var_1_ = ");
            let expected = infer::literal_type(value).unwrap_or(JsType::RealNumber);
            let types = result.state.variable_types_in_line("var_1_", assignment + 1).unwrap();
            assert_eq!(types, BTreeSet::from([expected]));
            assert!(result.state.array_lengths_in_line("var_1_", assignment + 1).is_empty());
            assert!(result.validate().is_ok());
        }
    }

    #[test]
    fn recorded_properties_are_deleted_first() {
        let mut testcase = Testcase::analyze("var var_1_ = {a: 1};\nvar_1_.a;");
        testcase
            .state
            .array_items_or_properties
            .insert("var_1_.a", 1, JsType::RealNumber);
        let results = mutated_results(Mutation::DeleteProperty, &testcase, 10);
        assert_eq!(results.len(), 10);
        for result in results {
            assert!(result.content.contains("delete var_1_.a;"), "{}", result.content);
        }
    }
}
