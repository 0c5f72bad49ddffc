//! Identical operation histories on several variables of one type.
//!
//! Engines share hidden-class transitions between objects that went through
//! the same sequence of shape changes. Applying one operation sequence to a
//! group of same-typed variables, interleaved in a random order, exercises the
//! code that decides when those transitions can be reused.

use libafl::mutators::MutationResult;
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};

use super::{MutationContext, insert_statement, record_declaration};
use crate::database::Operation;
use crate::error::Result;
use crate::merge;
use crate::scanner;
use crate::state::InsertionKind;
use crate::tagging::*;
use crate::testcase::Testcase;
use crate::types::JsType;
use crate::values::code_to_create_random_variable_with_datatype;

const MIN_GROUP_SIZE: usize = 2;
const MAX_GROUP_SIZE: usize = 5;
const MAX_OPERATIONS: usize = 4;
const EXTRA_OPERATION_PROBABILITY: f64 = 0.3;

/// Types with database operations that are either already held by a
/// variable at `line` or can be created.
fn candidate_types(testcase: &Testcase, ctx: &MutationContext, line: usize) -> Vec<JsType> {
    ctx.database
        .types()
        .into_iter()
        .filter(|ty| ty.is_instantiable() || testcase.state.variables_of_type(line, *ty).len() >= MIN_GROUP_SIZE)
        .collect()
}

fn insert_for(testcase: &mut Testcase, operation: &Operation, line: usize, target: &str) -> Result<usize> {
    *testcase = merge::insert_operation(testcase.clone(), operation, line, Some(target))?;
    Ok(line + scanner::count_lines(&operation.code))
}

pub(super) fn stresstest_transition_tree(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some(mut line) = ctx.statement_line(&testcase.state) else {
        return ctx.skipped(MUTATION_STRESSTEST_TRANSITION_TREE_NO_CANDIDATE);
    };
    let types = candidate_types(testcase, ctx, line);
    let Some(&ty) = types.choose(ctx.rng) else {
        return ctx.skipped(MUTATION_STRESSTEST_TRANSITION_TREE_NO_CANDIDATE);
    };

    let database = ctx.database;
    let number_of_operations = ctx.rng.random_range(1..=MAX_OPERATIONS);
    let operations: Vec<Operation> = (0..number_of_operations)
        .filter_map(|_| database.random_operation_for_type(ctx.rng, ty, InsertionKind::Statement))
        .map(|(operation, _)| operation)
        .collect();
    if operations.is_empty() {
        return ctx.skipped(MUTATION_STRESSTEST_TRANSITION_TREE_NO_CANDIDATE);
    }

    let group_size = ctx.rng.random_range(MIN_GROUP_SIZE..=MAX_GROUP_SIZE);
    let mut group = testcase.state.variables_of_type(line, ty);
    group.shuffle(ctx.rng);
    group.truncate(group_size);
    if group.len() < group_size && ty.is_instantiable() {
        ctx.tag(MUTATION_STRESSTEST_TRANSITION_TREE_CREATED_VARIABLES);
        while group.len() < group_size {
            let name = testcase.fresh_variable_name();
            let value = code_to_create_random_variable_with_datatype(ctx.rng, ty);
            insert_statement(testcase, line, &format!("var {name} = {value};"))?;
            record_declaration(&mut testcase.state, &name, line, ty);
            line += 1;
            group.push(name);
        }
    }
    if group.len() < MIN_GROUP_SIZE {
        return ctx.skipped(MUTATION_STRESSTEST_TRANSITION_TREE_NO_CANDIDATE);
    }

    // Every variable runs through the operations in order; which variable
    // advances next is random.
    let mut progress = vec![0usize; group.len()];
    loop {
        let pending: Vec<usize> = (0..group.len())
            .filter(|&member| progress[member] < operations.len())
            .collect();
        let Some(&member) = pending.choose(ctx.rng) else {
            break;
        };
        line = insert_for(testcase, &operations[progress[member]], line, &group[member])?;
        progress[member] += 1;
    }

    if ctx.rng.random_bool(EXTRA_OPERATION_PROBABILITY) {
        let extra = database.random_operation_for_type(ctx.rng, ty, InsertionKind::Statement);
        if let (Some((operation, _)), Some(member)) = (extra, group.choose(ctx.rng)) {
            ctx.tag(MUTATION_STRESSTEST_TRANSITION_TREE_EXTRA_OPERATION);
            insert_for(testcase, &operation, line, member)?;
        }
    }
    ctx.mutated(MUTATION_STRESSTEST_TRANSITION_TREE)
}

#[cfg(test)]
mod tests {
    use super::super::Mutation;
    use super::super::test_support::*;
    use super::*;
    use crate::database::OperationDatabase;
    use std::collections::BTreeSet;

    fn database() -> OperationDatabase {
        OperationDatabase::from_fragments([
            (Some(JsType::Object), "var_TARGET_.a = 1;"),
            (Some(JsType::Object), "delete var_TARGET_.a;"),
            (Some(JsType::Object), "var_TARGET_.b = 'x';"),
        ])
    }

    #[test]
    fn every_member_gets_the_same_history() {
        let mut testcase = Testcase::analyze("var var_1_ = {};\nvar_1_;");
        testcase.state.variable_types.set("var_1_", 1, JsType::Object);
        let results = mutated_results_with(Mutation::StresstestTransitionTree, &testcase, 20, database);
        assert_eq!(results.len(), 20);
        for result in results {
            assert!(result.validate().is_ok(), "{}", result.content);
            let targets: BTreeSet<&str> = result
                .lines()
                .into_iter()
                .filter(|line| line.contains(".a = 1;") || line.contains(".a;") || line.contains(".b = 'x';"))
                .filter_map(|line| line.split(['.', ' ']).find(|word| word.starts_with("var_")))
                .collect();
            assert!(targets.len() >= MIN_GROUP_SIZE, "{}", result.content);
        }
    }

    #[test]
    fn nothing_happens_without_operations() {
        let testcase = Testcase::analyze("var var_1_ = {};\nvar_1_;");
        assert!(mutated_results(Mutation::StresstestTransitionTree, &testcase, 10).is_empty());
    }
}
