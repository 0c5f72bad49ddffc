use libafl::mutators::MutationResult;
use rand::Rng;
use rand::seq::IndexedRandom;

use super::{MutationContext, contains_word, indentation};
use crate::constants::{
    ALLOW_BLOCK_KEYWORD_LINES_PROBABILITY, ALLOW_BRACKET_LINES_PROBABILITY, ALLOW_DECLARATION_LINES_PROBABILITY,
    BLOCK_KEYWORDS, DECLARATION_KEYWORDS,
};
use crate::error::Result;
use crate::tagging::*;
use crate::testcase::Testcase;

/// Lines that may be removed or duplicated on their own.
///
/// Lines with curly brackets, block keywords or declarations are left out
/// most of the time; which of them are allowed is decided once per call.
fn candidate_lines(testcase: &Testcase, ctx: &mut MutationContext) -> Vec<usize> {
    let allow_brackets = ctx.rng.random_bool(ALLOW_BRACKET_LINES_PROBABILITY);
    let allow_block_keywords = ctx.rng.random_bool(ALLOW_BLOCK_KEYWORD_LINES_PROBABILITY);
    let allow_declarations = ctx.rng.random_bool(ALLOW_DECLARATION_LINES_PROBABILITY);
    if allow_brackets {
        ctx.tag(LINE_SELECTION_ALLOWED_BRACKET_LINE);
    }
    if allow_block_keywords {
        ctx.tag(LINE_SELECTION_ALLOWED_BLOCK_KEYWORD);
    }
    if allow_declarations {
        ctx.tag(LINE_SELECTION_ALLOWED_DECLARATION);
    }

    testcase
        .lines()
        .iter()
        .enumerate()
        .filter(|(_, text)| {
            let text = text.trim();
            if text.is_empty() || text.starts_with("//") {
                return false;
            }
            if !allow_brackets && text.contains(['{', '}']) {
                return false;
            }
            if !allow_block_keywords && BLOCK_KEYWORDS.iter().any(|keyword| contains_word(text, keyword)) {
                return false;
            }
            allow_declarations
                || !DECLARATION_KEYWORDS
                    .iter()
                    .any(|keyword| text.strip_prefix(keyword).is_some_and(|rest| rest.starts_with(' ')))
        })
        .map(|(line, _)| line)
        .collect()
}

pub(super) fn remove_line(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    if testcase.number_of_lines() < 2 {
        return ctx.skipped(MUTATION_REMOVE_LINE_NO_CANDIDATE);
    }
    let candidates = candidate_lines(testcase, ctx);
    let Some(&line) = candidates.choose(ctx.rng) else {
        return ctx.skipped(MUTATION_REMOVE_LINE_NO_CANDIDATE);
    };
    testcase.remove_lines(line, 1)?;
    ctx.mutated(MUTATION_REMOVE_LINE)
}

/// Duplicates a complete one-line statement right after itself.
pub(super) fn duplicate_line(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let state = &testcase.state;
    let candidates: Vec<usize> = candidate_lines(testcase, ctx)
        .into_iter()
        .filter(|line| {
            state.lines_where_code_can_be_inserted.contains(line)
                && state.lines_where_code_can_be_inserted.contains(&(line + 1))
        })
        .collect();
    let Some(&line) = candidates.choose(ctx.rng) else {
        return ctx.skipped(MUTATION_DUPLICATE_LINE_NO_CANDIDATE);
    };
    let Some(text) = testcase.line(line).map(str::to_string) else {
        return ctx.skipped(MUTATION_DUPLICATE_LINE_NO_CANDIDATE);
    };
    let duplicate = if ctx.rng.random_bool(0.5) {
        ctx.tag(MUTATION_DUPLICATE_LINE_WRAPPED_IN_TRY);
        format!("{}try {{ {} }} catch {{}}", indentation(&text), text.trim())
    } else {
        text
    };
    testcase.insert_line(line + 1, &duplicate)?;
    ctx.mutated(MUTATION_DUPLICATE_LINE)
}

#[cfg(test)]
mod tests {
    use super::super::Mutation;
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn removing_the_last_line_leaves_the_declaration() {
        let testcase = Testcase::analyze("var var_1_ = 1;\nvar_1_;");
        let results = mutated_results(Mutation::RemoveLine, &testcase, 40);
        let removed_use: Vec<&Testcase> = results
            .iter()
            .filter(|result| result.content == "var var_1_ = 1;")
            .collect();
        assert!(!removed_use.is_empty());
        for result in removed_use {
            assert_eq!(result.state.testcase_number_of_lines, 1);
        }
    }

    #[test]
    fn a_single_line_is_never_removed() {
        let testcase = Testcase::analyze("foo();");
        assert!(mutated_results(Mutation::RemoveLine, &testcase, 20).is_empty());
    }

    #[test]
    fn duplicates_follow_the_original() {
        let testcase = Testcase::analyze("a();\nb();");
        let results = mutated_results(Mutation::DuplicateLine, &testcase, 30);
        assert!(!results.is_empty());
        for result in results {
            let lines = result.lines();
            assert_eq!(lines.len(), 3);
            assert!(
                lines[1].contains(lines[0]) || lines[2].contains(lines[1]),
                "{}",
                result.content
            );
        }
    }
}
