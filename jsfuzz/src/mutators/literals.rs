use libafl::mutators::MutationResult;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::ops::Range;

use super::{MutationContext, insert_statement, record_declaration};
use crate::error::Result;
use crate::scanner::{self, IdentifierKind};
use crate::tagging::*;
use crate::testcase::Testcase;
use crate::types::JsType;
use crate::values::numbers::{random_bigint, random_operator};
use crate::values::strings::random_string;
use crate::values::{decompose_number, random_number, random_string_literal};

/// `expression` in a form that can stand next to any operator.
fn as_operand(expression: &str) -> String {
    if expression
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_')
    {
        expression.to_string()
    } else {
        format!("({expression})")
    }
}

/// Plain strings on a single line that are not object keys.
fn string_candidates(content: &str) -> Vec<Range<usize>> {
    scanner::string_positions(content)
        .into_iter()
        .filter(|span| {
            let after = content[span.end..].trim_start();
            !content[span.clone()].contains('\n') && !after.starts_with(':')
        })
        .collect()
}

fn pick_span(ctx: &mut MutationContext, spans: &[Range<usize>]) -> Option<Range<usize>> {
    spans.choose(ctx.rng).cloned()
}

pub(super) fn replace_number(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let positions = scanner::number_positions(&testcase.content);
    let Some(span) = pick_span(ctx, &positions) else {
        return ctx.skipped(MUTATION_REPLACE_NUMBER_NO_CANDIDATE);
    };
    let literal = &testcase.content[span.clone()];
    if literal.ends_with('n') {
        let replacement = random_bigint(ctx.rng);
        testcase.replace_span(span, &as_operand(&replacement))?;
        return ctx.mutated(MUTATION_REPLACE_NUMBER);
    }

    let replacement = random_number(ctx.rng);
    if !ctx.rng.random_bool(0.3) {
        testcase.replace_span(span, &as_operand(&replacement))?;
        return ctx.mutated(MUTATION_REPLACE_NUMBER);
    }

    ctx.tag(MUTATION_REPLACE_NUMBER_DECOMPOSED);
    let line = scanner::line_of_offset(&scanner::line_starts(&testcase.content), span.start);
    // The helper name is only reserved if the decomposition declares it.
    let helper = testcase
        .state
        .lines_where_code_can_be_inserted
        .contains(&line)
        .then(|| testcase.state.next_name(IdentifierKind::Variable));
    let decomposed = decompose_number(ctx.rng, &replacement, helper.as_deref());
    testcase.replace_span(span, &as_operand(&decomposed.expression))?;
    if let (Some(prefix), Some(helper)) = (decomposed.prefix, helper) {
        testcase.fresh_variable_name();
        insert_statement(testcase, line, &prefix)?;
        record_declaration(&mut testcase.state, &helper, line, JsType::RealNumber);
    }
    ctx.mutated(MUTATION_REPLACE_NUMBER)
}

/// Combines a number with a random value so the original literal stays in
/// the text.
pub(super) fn modify_number(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let positions = scanner::number_positions(&testcase.content);
    let Some(span) = pick_span(ctx, &positions) else {
        return ctx.skipped(MUTATION_MODIFY_NUMBER_NO_CANDIDATE);
    };
    let literal = as_operand(&testcase.content[span.clone()]);
    let (value, operator) = if literal.ends_with('n') {
        // `>>>` throws for BigInt operands.
        let operator = match random_operator(ctx.rng) {
            ">>>" => "+",
            operator => operator,
        };
        (random_bigint(ctx.rng), operator)
    } else {
        (random_number(ctx.rng), random_operator(ctx.rng))
    };
    let value = as_operand(&value);
    let expression = if ctx.rng.random_bool(0.5) {
        ctx.tag(MUTATION_MODIFY_NUMBER_PREPEND);
        format!("({value} {operator} {literal})")
    } else {
        ctx.tag(MUTATION_MODIFY_NUMBER_APPEND);
        format!("({literal} {operator} {value})")
    };
    testcase.replace_span(span, &expression)?;
    ctx.mutated(MUTATION_MODIFY_NUMBER)
}

pub(super) fn replace_string(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let positions = string_candidates(&testcase.content);
    let Some(span) = pick_span(ctx, &positions) else {
        return ctx.skipped(MUTATION_REPLACE_STRING_NO_CANDIDATE);
    };
    let replacement = random_string_literal(ctx.rng);
    testcase.replace_span(span, &replacement)?;
    ctx.mutated(MUTATION_REPLACE_STRING)
}

pub(super) fn modify_string(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let positions = string_candidates(&testcase.content);
    let Some(span) = pick_span(ctx, &positions) else {
        return ctx.skipped(MUTATION_MODIFY_STRING_NO_CANDIDATE);
    };
    let literal = testcase.content[span.clone()].to_string();
    let include_whitespace = ctx.rng.random_bool(0.2);
    let other = random_string(ctx.rng, include_whitespace);
    let expression = match ctx.rng.random_range(0..3) {
        0 => format!("({other} + {literal})"),
        1 => format!("({literal} + {other})"),
        _ => format!("{literal}.concat({other})"),
    };
    testcase.replace_span(span, &expression)?;
    ctx.mutated(MUTATION_MODIFY_STRING)
}

/// Returns a literal through a function call instead of writing it inline.
pub(super) fn wrap_value_in_function(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let mut positions = scanner::number_positions(&testcase.content);
    positions.extend(string_candidates(&testcase.content));
    let Some(span) = pick_span(ctx, &positions) else {
        return ctx.skipped(MUTATION_WRAP_VALUE_IN_FUNCTION_NO_CANDIDATE);
    };
    let value = testcase.content[span.clone()].to_string();
    let wrapped = match ctx.rng.random_range(0..3) {
        0 => format!("(function() {{ return {value}; }})()"),
        1 => format!("(() => {value})()"),
        _ => format!("((x) => x)({value})"),
    };
    testcase.replace_span(span, &wrapped)?;
    ctx.mutated(MUTATION_WRAP_VALUE_IN_FUNCTION)
}

#[cfg(test)]
mod tests {
    use super::super::Mutation;
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn testcases_without_numbers_are_left_alone() {
        let testcase = Testcase::analyze("var var_1_ = 'abc';\nvar_1_.length;");
        assert!(mutated_results(Mutation::ReplaceNumber, &testcase, 20).is_empty());
        assert!(mutated_results(Mutation::ModifyNumber, &testcase, 20).is_empty());
    }

    #[test]
    fn modified_numbers_keep_the_original_literal() {
        let testcase = Testcase::analyze("var var_1_ = 83;");
        let results = mutated_results(Mutation::ModifyNumber, &testcase, 20);
        assert_eq!(results.len(), 20);
        for result in results {
            assert!(result.content.contains("83"), "{}", result.content);
            assert!(result.content.starts_with("var var_1_ = ("));
        }
    }

    #[test]
    fn decomposition_helpers_are_declared_before_use() {
        let testcase = Testcase::analyze("var var_1_ = 5;\nvar_1_ + 1;");
        for result in mutated_results(Mutation::ReplaceNumber, &testcase, 200) {
            if result.number_of_lines() == 3 {
                let lines = result.lines();
                let declaration = lines
                    .iter()
                    .position(|line| line.starts_with("var var_2_ = "))
                    .unwrap();
                assert!(lines[declaration + 1].contains("var_2_"), "{}", result.content);
                assert!(result.state.variable_types.contains("var_2_"));
            }
        }
    }

    #[test]
    fn unused_helpers_leave_the_numbering_alone() {
        let testcase = Testcase::analyze("var var_1_ = 5;\nvar_1_ + 1;");
        let results = mutated_results(Mutation::ReplaceNumber, &testcase, 200);
        assert!(results.iter().any(|result| result.number_of_lines() == 2));
        for result in results {
            let declared_helper = result.number_of_lines() == 3;
            let expected = if declared_helper { 2 } else { 1 };
            assert_eq!(result.state.number_variables, expected, "{}", result.content);
            assert_eq!(result.state.next_name(IdentifierKind::Variable), format!("var_{}_", expected + 1));
        }
    }

    #[test]
    fn object_keys_are_not_strings_to_replace() {
        let testcase = Testcase::analyze("var var_1_ = {'a': 1};");
        let results = mutated_results(Mutation::ReplaceString, &testcase, 20);
        assert!(results.is_empty());
    }

    #[test]
    fn operands_are_parenthesized_when_needed() {
        assert_eq!(as_operand("12"), "12");
        assert_eq!(as_operand("NaN"), "NaN");
        assert_eq!(as_operand("-0"), "(-0)");
        assert_eq!(as_operand("2**53"), "(2**53)");
    }
}
