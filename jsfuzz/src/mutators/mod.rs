//! The mutation strategies.
//!
//! Every strategy transforms a [`Testcase`] in place and reports
//! [`MutationResult::Skipped`] when it finds nothing to work on. Strategies run
//! on a copy through [`Mutation::apply`], so a skipped or failed attempt never
//! touches the caller's testcase.

mod arrays;
mod engine;
mod lines;
mod literals;
mod operations;
mod transition_tree;
mod variables;
mod wrap;

use libafl::mutators::MutationResult;
use rand::RngCore;
use rand::seq::IndexedRandom;
use std::collections::BTreeSet;

use crate::database::OperationDatabase;
use crate::error::Result;
use crate::registry::{EngineIntrinsics, TypeRegistry};
use crate::state::{InsertionKind, TestcaseState};
use crate::tagging::Tag;
use crate::testcase::Testcase;
use crate::types::JsType;

/// What a mutation strategy may draw on, plus the tags it records.
pub struct MutationContext<'a> {
    pub rng: &'a mut dyn RngCore,
    pub registry: &'a TypeRegistry,
    pub database: &'a OperationDatabase,
    pub intrinsics: &'a EngineIntrinsics,
    pub tags: Vec<Tag>,
}

impl<'a> MutationContext<'a> {
    pub fn new(
        rng: &'a mut dyn RngCore,
        registry: &'a TypeRegistry,
        database: &'a OperationDatabase,
        intrinsics: &'a EngineIntrinsics,
    ) -> Self {
        Self {
            rng,
            registry,
            database,
            intrinsics,
            tags: Vec::new(),
        }
    }

    pub fn tag(&mut self, tag: Tag) {
        self.tags.push(tag);
    }

    pub fn take_tags(&mut self) -> Vec<Tag> {
        std::mem::take(&mut self.tags)
    }

    fn skipped(&mut self, tag: Tag) -> Result<MutationResult> {
        self.tag(tag);
        Ok(MutationResult::Skipped)
    }

    fn mutated(&mut self, tag: Tag) -> Result<MutationResult> {
        self.tag(tag);
        Ok(MutationResult::Mutated)
    }

    /// An executed line accepting a `;`-terminated statement.
    fn statement_line(&mut self, state: &TestcaseState) -> Option<usize> {
        executed_statement_lines(state).choose(self.rng).copied()
    }

    /// An executed statement line together with a variable available there,
    /// among those `accept` admits.
    fn variable_at_statement_line(
        &mut self,
        state: &TestcaseState,
        accept: impl Fn(&str, &BTreeSet<JsType>) -> bool,
    ) -> Option<(usize, String, BTreeSet<JsType>)> {
        let accept = &accept;
        let candidates: Vec<(usize, String, BTreeSet<JsType>)> = executed_statement_lines(state)
            .into_iter()
            .flat_map(|line| {
                state
                    .available_variables_with_types(line, true)
                    .into_iter()
                    .filter(move |(name, types)| accept(name, types))
                    .map(move |(name, types)| (line, name, types))
            })
            .collect();
        candidates.choose(self.rng).cloned()
    }

    /// An executed insertion line of any category.
    fn insertion_point(&mut self, state: &TestcaseState) -> Option<(usize, InsertionKind)> {
        state.executed_insertion_lines().choose(self.rng).copied()
    }
}

type Strategy = fn(&mut Testcase, &mut MutationContext) -> Result<MutationResult>;

/// The catalog of mutation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mutation {
    RemoveLine,
    DuplicateLine,
    ReplaceNumber,
    ModifyNumber,
    ReplaceString,
    ModifyString,
    WrapValueInFunction,
    WrapLineInIf,
    WrapLineInFor,
    WrapLineInWhile,
    WrapLineInTryCatch,
    WrapLineInIife,
    InsertRandomOperation,
    InsertGenericOperation,
    MoveOperationAround,
    StresstestTransitionTree,
    AddVariable,
    ChangeTwoVariablesOfSameType,
    ChangePrototype,
    AssignSpecialValue,
    AddProperty,
    DeleteProperty,
    ModifyArrayLength,
    ArrayAccessOutOfBounds,
    ChangeArrayItemType,
    OptimizeFunction,
    EnforceCallNode,
    InsertGarbageCollection,
    CallBuiltinMethod,
}

impl Mutation {
    pub const ALL: &'static [Mutation] = &[
        Mutation::RemoveLine,
        Mutation::DuplicateLine,
        Mutation::ReplaceNumber,
        Mutation::ModifyNumber,
        Mutation::ReplaceString,
        Mutation::ModifyString,
        Mutation::WrapValueInFunction,
        Mutation::WrapLineInIf,
        Mutation::WrapLineInFor,
        Mutation::WrapLineInWhile,
        Mutation::WrapLineInTryCatch,
        Mutation::WrapLineInIife,
        Mutation::InsertRandomOperation,
        Mutation::InsertGenericOperation,
        Mutation::MoveOperationAround,
        Mutation::StresstestTransitionTree,
        Mutation::AddVariable,
        Mutation::ChangeTwoVariablesOfSameType,
        Mutation::ChangePrototype,
        Mutation::AssignSpecialValue,
        Mutation::AddProperty,
        Mutation::DeleteProperty,
        Mutation::ModifyArrayLength,
        Mutation::ArrayAccessOutOfBounds,
        Mutation::ChangeArrayItemType,
        Mutation::OptimizeFunction,
        Mutation::EnforceCallNode,
        Mutation::InsertGarbageCollection,
        Mutation::CallBuiltinMethod,
    ];

    /// Strategies that grow the testcase; applied once before merging.
    pub const EARLY: &'static [Mutation] = &[
        Mutation::InsertRandomOperation,
        Mutation::InsertGenericOperation,
        Mutation::StresstestTransitionTree,
        Mutation::AddVariable,
        Mutation::DuplicateLine,
        Mutation::MoveOperationAround,
        Mutation::OptimizeFunction,
        Mutation::EnforceCallNode,
        Mutation::CallBuiltinMethod,
    ];

    /// Strategies applied after merging.
    pub const LATE: &'static [Mutation] = Mutation::ALL;

    pub fn name(self) -> &'static str {
        match self {
            Mutation::RemoveLine => "remove_line",
            Mutation::DuplicateLine => "duplicate_line",
            Mutation::ReplaceNumber => "replace_number",
            Mutation::ModifyNumber => "modify_number",
            Mutation::ReplaceString => "replace_string",
            Mutation::ModifyString => "modify_string",
            Mutation::WrapValueInFunction => "wrap_value_in_function",
            Mutation::WrapLineInIf => "wrap_line_in_if",
            Mutation::WrapLineInFor => "wrap_line_in_for",
            Mutation::WrapLineInWhile => "wrap_line_in_while",
            Mutation::WrapLineInTryCatch => "wrap_line_in_try_catch",
            Mutation::WrapLineInIife => "wrap_line_in_iife",
            Mutation::InsertRandomOperation => "insert_random_operation",
            Mutation::InsertGenericOperation => "insert_generic_operation",
            Mutation::MoveOperationAround => "move_operation_around",
            Mutation::StresstestTransitionTree => "stresstest_transition_tree",
            Mutation::AddVariable => "add_variable",
            Mutation::ChangeTwoVariablesOfSameType => "change_two_variables_of_same_type",
            Mutation::ChangePrototype => "change_prototype",
            Mutation::AssignSpecialValue => "assign_special_value",
            Mutation::AddProperty => "add_property",
            Mutation::DeleteProperty => "delete_property",
            Mutation::ModifyArrayLength => "modify_array_length",
            Mutation::ArrayAccessOutOfBounds => "array_access_out_of_bounds",
            Mutation::ChangeArrayItemType => "change_array_item_type",
            Mutation::OptimizeFunction => "optimize_function",
            Mutation::EnforceCallNode => "enforce_call_node",
            Mutation::InsertGarbageCollection => "insert_garbage_collection",
            Mutation::CallBuiltinMethod => "call_builtin_method",
        }
    }

    fn strategy(self) -> Strategy {
        match self {
            Mutation::RemoveLine => lines::remove_line,
            Mutation::DuplicateLine => lines::duplicate_line,
            Mutation::ReplaceNumber => literals::replace_number,
            Mutation::ModifyNumber => literals::modify_number,
            Mutation::ReplaceString => literals::replace_string,
            Mutation::ModifyString => literals::modify_string,
            Mutation::WrapValueInFunction => literals::wrap_value_in_function,
            Mutation::WrapLineInIf => wrap::wrap_line_in_if,
            Mutation::WrapLineInFor => wrap::wrap_line_in_for,
            Mutation::WrapLineInWhile => wrap::wrap_line_in_while,
            Mutation::WrapLineInTryCatch => wrap::wrap_line_in_try_catch,
            Mutation::WrapLineInIife => wrap::wrap_line_in_iife,
            Mutation::InsertRandomOperation => operations::insert_random_operation,
            Mutation::InsertGenericOperation => operations::insert_generic_operation,
            Mutation::MoveOperationAround => operations::move_operation_around,
            Mutation::StresstestTransitionTree => transition_tree::stresstest_transition_tree,
            Mutation::AddVariable => variables::add_variable,
            Mutation::ChangeTwoVariablesOfSameType => variables::change_two_variables_of_same_type,
            Mutation::ChangePrototype => variables::change_prototype,
            Mutation::AssignSpecialValue => variables::assign_special_value,
            Mutation::AddProperty => variables::add_property,
            Mutation::DeleteProperty => variables::delete_property,
            Mutation::ModifyArrayLength => arrays::modify_array_length,
            Mutation::ArrayAccessOutOfBounds => arrays::array_access_out_of_bounds,
            Mutation::ChangeArrayItemType => arrays::change_array_item_type,
            Mutation::OptimizeFunction => engine::optimize_function,
            Mutation::EnforceCallNode => engine::enforce_call_node,
            Mutation::InsertGarbageCollection => engine::insert_garbage_collection,
            Mutation::CallBuiltinMethod => engine::call_builtin_method,
        }
    }

    /// Runs the strategy on a copy of `testcase` and keeps the copy only when
    /// it was mutated. Errors leave `testcase` untouched as well.
    pub fn apply(self, testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
        let mut candidate = testcase.clone();
        let result = (self.strategy())(&mut candidate, ctx)?;
        if result == MutationResult::Mutated {
            *testcase = candidate;
        }
        Ok(result)
    }

    /// A strategy drawn uniformly from `pool`.
    pub fn random(rng: &mut dyn RngCore, pool: &[Mutation]) -> Mutation {
        pool.choose(rng).copied().unwrap_or(Mutation::AddVariable)
    }
}

fn executed_statement_lines(state: &TestcaseState) -> Vec<usize> {
    state
        .lines_where_code_can_be_inserted
        .iter()
        .copied()
        .filter(|line| !state.lines_which_are_not_executed.contains(line))
        .collect()
}

/// Leading whitespace of `text`.
fn indentation(text: &str) -> &str {
    &text[..text.len() - text.trim_start().len()]
}

/// Whether `word` occurs in `text` as a whole identifier.
fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
        .any(|candidate| candidate == word)
}

/// Inserts `code` before `line`, every line of it indented like the line it
/// is inserted before.
fn insert_statement(testcase: &mut Testcase, line: usize, code: &str) -> Result<()> {
    let indent = testcase
        .line(line)
        .map(|text| indentation(text).to_string())
        .unwrap_or_default();
    let indented: Vec<String> = code.split('\n').map(|text| format!("{indent}{text}")).collect();
    testcase.insert_line(line, &indented.join("\n"))
}

/// Records the facts of `var name = <value of ty>;` written on `line`.
fn record_declaration(state: &mut TestcaseState, name: &str, line: usize, ty: JsType) {
    if line > 0 {
        state.variable_types.insert(name, 0, JsType::Undefined);
    }
    state.variable_types.insert(name, line + 1, ty);
}
