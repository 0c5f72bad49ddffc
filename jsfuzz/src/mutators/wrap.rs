use libafl::mutators::MutationResult;
use rand::Rng;
use rand::seq::IndexedRandom;

use super::{MutationContext, contains_word, indentation};
use crate::constants::STRUCTURAL_KEYWORDS;
use crate::error::Result;
use crate::tagging::*;
use crate::testcase::Testcase;

const LOOP_ITERATIONS: &[u32] = &[1, 2, 7, 100, 1000, 10000];

/// One-line statements that can be wrapped without breaking the nesting.
fn wrappable_lines(testcase: &Testcase, allow_declarations: bool) -> Vec<usize> {
    let code = &testcase.state.lines_where_code_can_be_inserted;
    testcase
        .lines()
        .iter()
        .enumerate()
        .filter(|(line, text)| {
            let text = text.trim();
            code.contains(line)
                && code.contains(&(line + 1))
                && !text.is_empty()
                && !text.starts_with("//")
                && !text.contains(['{', '}'])
                && !STRUCTURAL_KEYWORDS.iter().any(|keyword| contains_word(text, keyword))
                && (allow_declarations || !text.starts_with("var "))
        })
        .map(|(line, _)| line)
        .collect()
}

/// Rewrites a wrappable line through `wrap`, which receives the trimmed
/// statement and returns its replacement.
fn wrap_line(
    testcase: &mut Testcase,
    ctx: &mut MutationContext,
    allow_declarations: bool,
    tag: Tag,
    wrap: impl FnOnce(&mut Testcase, &mut MutationContext, &str) -> String,
) -> Result<MutationResult> {
    let candidates = wrappable_lines(testcase, allow_declarations);
    let Some(&line) = candidates.choose(ctx.rng) else {
        return ctx.skipped(MUTATION_WRAP_LINE_NO_CANDIDATE);
    };
    let Some(text) = testcase.line(line).map(str::to_string) else {
        return ctx.skipped(MUTATION_WRAP_LINE_NO_CANDIDATE);
    };
    let wrapped = wrap(testcase, ctx, text.trim());
    testcase.replace_line(line, &format!("{}{wrapped}", indentation(&text)))?;
    ctx.mutated(tag)
}

pub(super) fn wrap_line_in_if(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    wrap_line(testcase, ctx, true, MUTATION_WRAP_LINE_IN_IF, |_, ctx, statement| {
        let condition = ["true", "1", "!false", "[]", "{}", "'a'", "-1"]
            .choose(ctx.rng)
            .copied()
            .unwrap_or("true");
        format!("if ({condition}) {{ {statement} }}")
    })
}

pub(super) fn wrap_line_in_for(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    wrap_line(testcase, ctx, true, MUTATION_WRAP_LINE_IN_FOR, |testcase, ctx, statement| {
        let counter = testcase.fresh_variable_name();
        let iterations = LOOP_ITERATIONS.choose(ctx.rng).copied().unwrap_or(2);
        format!("for (let {counter} = 0; {counter} < {iterations}; {counter}++) {{ {statement} }}")
    })
}

pub(super) fn wrap_line_in_while(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    wrap_line(testcase, ctx, true, MUTATION_WRAP_LINE_IN_WHILE, |testcase, ctx, statement| {
        let counter = testcase.fresh_variable_name();
        let iterations = LOOP_ITERATIONS.choose(ctx.rng).copied().unwrap_or(2);
        if ctx.rng.random_bool(0.5) {
            format!("{{ let {counter} = 0; while ({counter}++ < {iterations}) {{ {statement} }} }}")
        } else {
            format!("{{ let {counter} = 0; do {{ {statement} }} while ({counter}++ < {iterations}); }}")
        }
    })
}

pub(super) fn wrap_line_in_try_catch(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    wrap_line(testcase, ctx, true, MUTATION_WRAP_LINE_IN_TRY_CATCH, |_, ctx, statement| {
        if ctx.rng.random_bool(0.8) {
            format!("try {{ {statement} }} catch {{}}")
        } else {
            format!("try {{ {statement} }} finally {{}}")
        }
    })
}

/// Moves a statement into a function that is called right away. Declarations
/// stay out, their name would no longer be visible after the line.
pub(super) fn wrap_line_in_iife(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    wrap_line(testcase, ctx, false, MUTATION_WRAP_LINE_IN_IIFE, |_, ctx, statement| {
        match ctx.rng.random_range(0..3) {
            0 => format!("(function() {{ {statement} }})();"),
            1 => format!("(() => {{ {statement} }})();"),
            _ => format!("(function() {{ 'use strict'; {statement} }})();"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::super::Mutation;
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn wraps_keep_the_line_count() {
        let testcase = Testcase::analyze("var var_1_ = [];\nvar_1_.push(1);\nvar_1_.pop();");
        for mutation in [
            Mutation::WrapLineInIf,
            Mutation::WrapLineInFor,
            Mutation::WrapLineInWhile,
            Mutation::WrapLineInTryCatch,
            Mutation::WrapLineInIife,
        ] {
            let results = mutated_results(mutation, &testcase, 10);
            assert_eq!(results.len(), 10, "{}", mutation.name());
            for result in results {
                assert_eq!(result.number_of_lines(), 3);
                assert!(result.content.contains("var_1_.p"));
            }
        }
    }

    #[test]
    fn structural_lines_are_not_wrapped() {
        let testcase = Testcase::analyze("function func_1_() {\n  return 1;\n}");
        assert!(mutated_results(Mutation::WrapLineInIf, &testcase, 20).is_empty());
    }

    #[test]
    fn declarations_stay_out_of_functions() {
        let testcase = Testcase::analyze("var var_1_ = 1;");
        assert!(mutated_results(Mutation::WrapLineInIife, &testcase, 20).is_empty());
        assert_eq!(mutated_results(Mutation::WrapLineInIf, &testcase, 5).len(), 5);
    }
}
