//! Decision tags and the telemetry interface.
//!
//! Mutators push a [`Tag`] for every decision they take onto the mutation
//! context. After the execution of a testcase the session hands the collected
//! tags and the outcome to a [`TelemetrySink`], which lets an offline analysis
//! compute which decisions tend to produce valid or interesting testcases.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::util::ExecutionStatus;

pub type Tag = &'static str;

pub const MUTATION_REMOVE_LINE: Tag = "MUTATION_REMOVE_LINE";
pub const MUTATION_REMOVE_LINE_NO_CANDIDATE: Tag = "MUTATION_REMOVE_LINE_NO_CANDIDATE";
pub const MUTATION_DUPLICATE_LINE: Tag = "MUTATION_DUPLICATE_LINE";
pub const MUTATION_DUPLICATE_LINE_WRAPPED_IN_TRY: Tag = "MUTATION_DUPLICATE_LINE_WRAPPED_IN_TRY";
pub const MUTATION_DUPLICATE_LINE_NO_CANDIDATE: Tag = "MUTATION_DUPLICATE_LINE_NO_CANDIDATE";
pub const LINE_SELECTION_ALLOWED_BRACKET_LINE: Tag = "LINE_SELECTION_ALLOWED_BRACKET_LINE";
pub const LINE_SELECTION_ALLOWED_BLOCK_KEYWORD: Tag = "LINE_SELECTION_ALLOWED_BLOCK_KEYWORD";
pub const LINE_SELECTION_ALLOWED_DECLARATION: Tag = "LINE_SELECTION_ALLOWED_DECLARATION";

pub const MUTATION_REPLACE_NUMBER: Tag = "MUTATION_REPLACE_NUMBER";
pub const MUTATION_REPLACE_NUMBER_DECOMPOSED: Tag = "MUTATION_REPLACE_NUMBER_DECOMPOSED";
pub const MUTATION_REPLACE_NUMBER_NO_CANDIDATE: Tag = "MUTATION_REPLACE_NUMBER_NO_CANDIDATE";
pub const MUTATION_MODIFY_NUMBER: Tag = "MUTATION_MODIFY_NUMBER";
pub const MUTATION_MODIFY_NUMBER_PREPEND: Tag = "MUTATION_MODIFY_NUMBER_PREPEND";
pub const MUTATION_MODIFY_NUMBER_APPEND: Tag = "MUTATION_MODIFY_NUMBER_APPEND";
pub const MUTATION_MODIFY_NUMBER_NO_CANDIDATE: Tag = "MUTATION_MODIFY_NUMBER_NO_CANDIDATE";
pub const MUTATION_REPLACE_STRING: Tag = "MUTATION_REPLACE_STRING";
pub const MUTATION_REPLACE_STRING_NO_CANDIDATE: Tag = "MUTATION_REPLACE_STRING_NO_CANDIDATE";
pub const MUTATION_MODIFY_STRING: Tag = "MUTATION_MODIFY_STRING";
pub const MUTATION_MODIFY_STRING_NO_CANDIDATE: Tag = "MUTATION_MODIFY_STRING_NO_CANDIDATE";
pub const MUTATION_WRAP_VALUE_IN_FUNCTION: Tag = "MUTATION_WRAP_VALUE_IN_FUNCTION";
pub const MUTATION_WRAP_VALUE_IN_FUNCTION_NO_CANDIDATE: Tag = "MUTATION_WRAP_VALUE_IN_FUNCTION_NO_CANDIDATE";

pub const MUTATION_WRAP_LINE_IN_IF: Tag = "MUTATION_WRAP_LINE_IN_IF";
pub const MUTATION_WRAP_LINE_IN_FOR: Tag = "MUTATION_WRAP_LINE_IN_FOR";
pub const MUTATION_WRAP_LINE_IN_WHILE: Tag = "MUTATION_WRAP_LINE_IN_WHILE";
pub const MUTATION_WRAP_LINE_IN_TRY_CATCH: Tag = "MUTATION_WRAP_LINE_IN_TRY_CATCH";
pub const MUTATION_WRAP_LINE_IN_IIFE: Tag = "MUTATION_WRAP_LINE_IN_IIFE";
pub const MUTATION_WRAP_LINE_NO_CANDIDATE: Tag = "MUTATION_WRAP_LINE_NO_CANDIDATE";

pub const MUTATION_INSERT_RANDOM_OPERATION: Tag = "MUTATION_INSERT_RANDOM_OPERATION";
pub const MUTATION_INSERT_RANDOM_OPERATION_GUARDED: Tag = "MUTATION_INSERT_RANDOM_OPERATION_GUARDED";
pub const MUTATION_INSERT_RANDOM_OPERATION_REDUCED: Tag = "MUTATION_INSERT_RANDOM_OPERATION_REDUCED";
pub const MUTATION_INSERT_RANDOM_OPERATION_FALLBACK: Tag = "MUTATION_INSERT_RANDOM_OPERATION_FALLBACK";
pub const MUTATION_INSERT_RANDOM_OPERATION_NO_CANDIDATE: Tag = "MUTATION_INSERT_RANDOM_OPERATION_NO_CANDIDATE";
pub const MUTATION_INSERT_GENERIC_OPERATION: Tag = "MUTATION_INSERT_GENERIC_OPERATION";
pub const MUTATION_INSERT_GENERIC_OPERATION_NO_CANDIDATE: Tag = "MUTATION_INSERT_GENERIC_OPERATION_NO_CANDIDATE";
pub const MUTATION_MOVE_OPERATION_AROUND: Tag = "MUTATION_MOVE_OPERATION_AROUND";
pub const MUTATION_MOVE_OPERATION_AROUND_NO_CANDIDATE: Tag = "MUTATION_MOVE_OPERATION_AROUND_NO_CANDIDATE";
pub const MUTATION_MOVE_OPERATION_AROUND_NO_DESTINATION: Tag = "MUTATION_MOVE_OPERATION_AROUND_NO_DESTINATION";

pub const MUTATION_STRESSTEST_TRANSITION_TREE: Tag = "MUTATION_STRESSTEST_TRANSITION_TREE";
pub const MUTATION_STRESSTEST_TRANSITION_TREE_CREATED_VARIABLES: Tag =
    "MUTATION_STRESSTEST_TRANSITION_TREE_CREATED_VARIABLES";
pub const MUTATION_STRESSTEST_TRANSITION_TREE_EXTRA_OPERATION: Tag =
    "MUTATION_STRESSTEST_TRANSITION_TREE_EXTRA_OPERATION";
pub const MUTATION_STRESSTEST_TRANSITION_TREE_NO_CANDIDATE: Tag = "MUTATION_STRESSTEST_TRANSITION_TREE_NO_CANDIDATE";

pub const MUTATION_ADD_VARIABLE: Tag = "MUTATION_ADD_VARIABLE";
pub const MUTATION_ADD_VARIABLE_NO_CANDIDATE: Tag = "MUTATION_ADD_VARIABLE_NO_CANDIDATE";
pub const MUTATION_CHANGE_TWO_VARIABLES_OF_SAME_TYPE: Tag = "MUTATION_CHANGE_TWO_VARIABLES_OF_SAME_TYPE";
pub const MUTATION_CHANGE_TWO_VARIABLES_OF_SAME_TYPE_NO_CANDIDATE: Tag =
    "MUTATION_CHANGE_TWO_VARIABLES_OF_SAME_TYPE_NO_CANDIDATE";
pub const MUTATION_CHANGE_PROTOTYPE: Tag = "MUTATION_CHANGE_PROTOTYPE";
pub const MUTATION_CHANGE_PROTOTYPE_NO_CANDIDATE: Tag = "MUTATION_CHANGE_PROTOTYPE_NO_CANDIDATE";
pub const MUTATION_ASSIGN_SPECIAL_VALUE: Tag = "MUTATION_ASSIGN_SPECIAL_VALUE";
pub const MUTATION_ASSIGN_SPECIAL_VALUE_NO_CANDIDATE: Tag = "MUTATION_ASSIGN_SPECIAL_VALUE_NO_CANDIDATE";
pub const MUTATION_ADD_PROPERTY: Tag = "MUTATION_ADD_PROPERTY";
pub const MUTATION_ADD_PROPERTY_NO_CANDIDATE: Tag = "MUTATION_ADD_PROPERTY_NO_CANDIDATE";
pub const MUTATION_DELETE_PROPERTY: Tag = "MUTATION_DELETE_PROPERTY";
pub const MUTATION_DELETE_PROPERTY_NO_CANDIDATE: Tag = "MUTATION_DELETE_PROPERTY_NO_CANDIDATE";

pub const MUTATION_MODIFY_ARRAY_LENGTH: Tag = "MUTATION_MODIFY_ARRAY_LENGTH";
pub const MUTATION_MODIFY_ARRAY_LENGTH_NO_CANDIDATE: Tag = "MUTATION_MODIFY_ARRAY_LENGTH_NO_CANDIDATE";
pub const MUTATION_ARRAY_ACCESS_OUT_OF_BOUNDS: Tag = "MUTATION_ARRAY_ACCESS_OUT_OF_BOUNDS";
pub const MUTATION_ARRAY_ACCESS_OUT_OF_BOUNDS_NO_CANDIDATE: Tag = "MUTATION_ARRAY_ACCESS_OUT_OF_BOUNDS_NO_CANDIDATE";
pub const MUTATION_CHANGE_ARRAY_ITEM_TYPE: Tag = "MUTATION_CHANGE_ARRAY_ITEM_TYPE";
pub const MUTATION_CHANGE_ARRAY_ITEM_TYPE_NO_CANDIDATE: Tag = "MUTATION_CHANGE_ARRAY_ITEM_TYPE_NO_CANDIDATE";

pub const MUTATION_OPTIMIZE_FUNCTION: Tag = "MUTATION_OPTIMIZE_FUNCTION";
pub const MUTATION_OPTIMIZE_FUNCTION_HOT_LOOP: Tag = "MUTATION_OPTIMIZE_FUNCTION_HOT_LOOP";
pub const MUTATION_OPTIMIZE_FUNCTION_NEVER: Tag = "MUTATION_OPTIMIZE_FUNCTION_NEVER";
pub const MUTATION_OPTIMIZE_FUNCTION_NO_CANDIDATE: Tag = "MUTATION_OPTIMIZE_FUNCTION_NO_CANDIDATE";
pub const MUTATION_ENFORCE_CALL_NODE: Tag = "MUTATION_ENFORCE_CALL_NODE";
pub const MUTATION_ENFORCE_CALL_NODE_NO_CANDIDATE: Tag = "MUTATION_ENFORCE_CALL_NODE_NO_CANDIDATE";
pub const MUTATION_INSERT_GARBAGE_COLLECTION: Tag = "MUTATION_INSERT_GARBAGE_COLLECTION";
pub const MUTATION_INSERT_GARBAGE_COLLECTION_NO_CANDIDATE: Tag = "MUTATION_INSERT_GARBAGE_COLLECTION_NO_CANDIDATE";
pub const MUTATION_CALL_BUILTIN_METHOD: Tag = "MUTATION_CALL_BUILTIN_METHOD";
pub const MUTATION_CALL_BUILTIN_METHOD_NO_CANDIDATE: Tag = "MUTATION_CALL_BUILTIN_METHOD_NO_CANDIDATE";

pub const SESSION_MERGED_TESTCASE: Tag = "SESSION_MERGED_TESTCASE";
pub const SESSION_MERGE_FAILED: Tag = "SESSION_MERGE_FAILED";
pub const SESSION_CONTRACT_VIOLATION: Tag = "SESSION_CONTRACT_VIOLATION";

/// Receives the decisions taken for one execution and its outcome.
pub trait TelemetrySink {
    fn record(&mut self, tags: &[Tag], status: ExecutionStatus);
}

/// Drops everything it is given.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn record(&mut self, _tags: &[Tag], _status: ExecutionStatus) {}
}

/// A sink shared with the code that reads it, e.g. a [`TagStatistics`]
/// inspected while the session runs.
impl<T: TelemetrySink + ?Sized> TelemetrySink for Arc<Mutex<T>> {
    fn record(&mut self, tags: &[Tag], status: ExecutionStatus) {
        if let Ok(mut sink) = self.lock() {
            sink.record(tags, status);
        }
    }
}

/// Number of runs per outcome for one tag.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TagCounters {
    pub success: u64,
    pub new_coverage: u64,
    pub exception: u64,
    pub timeout: u64,
    pub crash: u64,
}

impl TagCounters {
    pub fn total(&self) -> u64 {
        self.success + self.new_coverage + self.exception + self.timeout + self.crash
    }

    fn count(&mut self, status: ExecutionStatus) {
        let counter = match status {
            ExecutionStatus::Success => &mut self.success,
            ExecutionStatus::NewCoverage => &mut self.new_coverage,
            ExecutionStatus::Exception => &mut self.exception,
            ExecutionStatus::Timeout => &mut self.timeout,
            ExecutionStatus::Crash => &mut self.crash,
        };
        *counter += 1;
    }
}

/// In-memory aggregation of tags per outcome.
///
/// A tag recorded several times for one run counts once.
#[derive(Debug, Default, Clone)]
pub struct TagStatistics {
    counters: BTreeMap<Tag, TagCounters>,
    runs: u64,
}

impl TagStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn counters(&self, tag: Tag) -> Option<&TagCounters> {
        self.counters.get(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &TagCounters)> {
        self.counters.iter().map(|(tag, counters)| (*tag, counters))
    }

    /// The share of runs with `tag` that executed without an exception,
    /// timeout or crash. `None` when the tag was never recorded.
    pub fn success_rate(&self, tag: Tag) -> Option<f64> {
        let counters = self.counters.get(tag)?;
        let total = counters.total();
        (total > 0).then(|| (counters.success + counters.new_coverage) as f64 / total as f64)
    }
}

impl TelemetrySink for TagStatistics {
    fn record(&mut self, tags: &[Tag], status: ExecutionStatus) {
        self.runs += 1;
        let mut seen: Vec<Tag> = tags.to_vec();
        seen.sort_unstable();
        seen.dedup();
        for tag in seen {
            self.counters.entry(tag).or_default().count(status);
        }
    }
}
