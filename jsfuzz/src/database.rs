//! The operation database: code fragments mined from a corpus, keyed by the
//! type of the variable they operate on.
//!
//! A fragment refers to its target variable through
//! [`PLACEHOLDER_TOKEN`](crate::constants::PLACEHOLDER_TOKEN). Fragments that need no
//! target live in the generic bucket. Each type has a primary bucket and a
//! reduced bucket (minimized, deduplicated fragments); small primary buckets
//! are complemented with the reduced one so rare types are not dominated by a
//! handful of fragments.

use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::constants::{DECLARATION_KEYWORDS, MEDIUM_BUCKET_LIMIT, PLACEHOLDER_TOKEN, SMALL_BUCKET_LIMIT};
use crate::error::Result;
use crate::scanner;
use crate::state::{InsertionKind, TestcaseState};
use crate::testcase::Testcase;
use crate::types::JsType;

/// A fragment and the state describing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub code: String,
    pub state: TestcaseState,
}

impl Operation {
    pub fn new(code: impl Into<String>, state: TestcaseState) -> Self {
        Self {
            code: code.into(),
            state,
        }
    }

    /// An operation whose state is derived from the code alone.
    pub fn analyze(code: impl Into<String>) -> Self {
        let code = code.into();
        let state = TestcaseState::analyze(&code);
        Self { code, state }
    }

    pub fn uses_placeholder(&self) -> bool {
        self.code.contains(PLACEHOLDER_TOKEN)
    }

    /// A single `;`-terminated expression statement on one line, which can
    /// also stand as a list item once the `;` is dropped.
    pub fn is_single_statement(&self) -> bool {
        let code = self.code.trim();
        !code.contains('\n')
            && code.ends_with(';')
            && scanner::find_next(code, b';', 0) == Some(code.len() - 1)
            && !DECLARATION_KEYWORDS
                .iter()
                .chain(&["function", "class", "if", "for", "while", "do", "try", "switch", "return"])
                .any(|keyword| {
                    code.strip_prefix(keyword)
                        .is_some_and(|rest| rest.starts_with([' ', '(', '{']))
                })
    }

    pub fn into_testcase(self) -> Testcase {
        Testcase::new(self.code, self.state)
    }

    /// Re-punctuates a single-statement operation for `kind`.
    fn punctuate(mut self, kind: InsertionKind) -> Self {
        let statement = self.code.trim().trim_end_matches(';').to_string();
        self.code = match kind {
            InsertionKind::Statement => return self,
            InsertionKind::TrailingComa => format!("{statement},"),
            InsertionKind::LeadingComa => format!(", {statement}"),
        };
        self.state.refresh_syntax(&self.code);
        self
    }

    /// Guards the operation against throwing, for targets whose type is ambiguous.
    fn guard(mut self, kind: InsertionKind) -> Self {
        self.code = match kind {
            InsertionKind::Statement => format!("try {{ {} }} catch {{}}", self.code),
            // Lists need an expression: an immediately invoked arrow function.
            InsertionKind::TrailingComa | InsertionKind::LeadingComa => {
                format!("(() => {{ try {{ {} }} catch {{}} }})();", self.code.trim())
            }
        };
        self.state.refresh_syntax(&self.code);
        self
    }
}

/// Where a selected operation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationSource {
    Primary,
    Reduced,
    Generic,
    /// The generic bucket, because nothing matched the requested type.
    GenericFallback,
}

/// An operation chosen for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedOperation {
    /// Punctuated for the insertion line; the placeholder is still in place.
    pub operation: Operation,
    /// The variable the placeholder stands for.
    pub target: Option<String>,
    /// The concrete type the operation was chosen for.
    pub chosen_type: Option<JsType>,
    /// Set when the target's type was ambiguous and the operation is guarded.
    pub guarded: bool,
    pub source: OperationSource,
}

#[derive(Debug, Clone, Default)]
struct SingleStatementView {
    variable: BTreeMap<JsType, Vec<usize>>,
    reduced: BTreeMap<JsType, Vec<usize>>,
    generic: Vec<usize>,
}

fn single_statement_indexes(operations: &[Operation]) -> Vec<usize> {
    operations
        .iter()
        .enumerate()
        .filter(|(_, operation)| operation.is_single_statement())
        .map(|(i, _)| i)
        .collect()
}

/// Every known fragment, by target type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationDatabase {
    variable_operations: BTreeMap<JsType, Vec<Operation>>,
    reduced_operations: BTreeMap<JsType, Vec<Operation>>,
    generic_operations: Vec<Operation>,
    #[serde(skip)]
    single_statement: SingleStatementView,
}

impl OperationDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operation(&mut self, ty: JsType, operation: Operation) {
        self.variable_operations.entry(ty).or_default().push(operation);
        self.rebuild_views();
    }

    pub fn add_reduced_operation(&mut self, ty: JsType, operation: Operation) {
        self.reduced_operations.entry(ty).or_default().push(operation);
        self.rebuild_views();
    }

    pub fn add_generic_operation(&mut self, operation: Operation) {
        self.generic_operations.push(operation);
        self.rebuild_views();
    }

    /// Builds a database from `(type, code)` pairs; `None` marks generic fragments.
    pub fn from_fragments<'a>(fragments: impl IntoIterator<Item = (Option<JsType>, &'a str)>) -> Self {
        let mut database = Self::new();
        for (ty, code) in fragments {
            let operation = Operation::analyze(code);
            match ty {
                Some(ty) => database.variable_operations.entry(ty).or_default().push(operation),
                None => database.generic_operations.push(operation),
            }
        }
        database.rebuild_views();
        database
    }

    fn rebuild_views(&mut self) {
        let by_type = |buckets: &BTreeMap<JsType, Vec<Operation>>| -> BTreeMap<JsType, Vec<usize>> {
            buckets
                .iter()
                .map(|(ty, operations)| (*ty, single_statement_indexes(operations)))
                .filter(|(_, indexes)| !indexes.is_empty())
                .collect()
        };
        self.single_statement = SingleStatementView {
            variable: by_type(&self.variable_operations),
            reduced: by_type(&self.reduced_operations),
            generic: single_statement_indexes(&self.generic_operations),
        };
    }

    pub fn types(&self) -> BTreeSet<JsType> {
        self.variable_operations
            .keys()
            .chain(self.reduced_operations.keys())
            .copied()
            .collect()
    }

    pub fn number_of_operations(&self) -> usize {
        self.variable_operations.values().map(Vec::len).sum::<usize>()
            + self.reduced_operations.values().map(Vec::len).sum::<usize>()
            + self.generic_operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.number_of_operations() == 0
    }

    fn pick<R: Rng + ?Sized>(
        rng: &mut R,
        operations: Option<&Vec<Operation>>,
        single: Option<&Vec<usize>>,
        kind: InsertionKind,
    ) -> Option<Operation> {
        let operations = operations?;
        match kind {
            InsertionKind::Statement => operations.choose(rng).cloned(),
            _ => single?
                .choose(rng)
                .and_then(|i| operations.get(*i))
                .cloned(),
        }
    }

    fn primary_size(&self, ty: JsType, kind: InsertionKind) -> usize {
        match kind {
            InsertionKind::Statement => self.variable_operations.get(&ty).map_or(0, Vec::len),
            _ => self.single_statement.variable.get(&ty).map_or(0, Vec::len),
        }
    }

    fn select_for_type<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        ty: JsType,
        kind: InsertionKind,
    ) -> Option<(Operation, OperationSource)> {
        let size = self.primary_size(ty, kind);
        let prefer_reduced = if size <= SMALL_BUCKET_LIMIT {
            rng.random_bool(0.9)
        } else if size <= MEDIUM_BUCKET_LIMIT {
            rng.random_bool(0.7)
        } else {
            rng.random_bool(0.1)
        };
        let primary = |rng: &mut R| {
            Self::pick(
                rng,
                self.variable_operations.get(&ty),
                self.single_statement.variable.get(&ty),
                kind,
            )
            .map(|operation| (operation, OperationSource::Primary))
        };
        let reduced = |rng: &mut R| {
            Self::pick(
                rng,
                self.reduced_operations.get(&ty),
                self.single_statement.reduced.get(&ty),
                kind,
            )
            .map(|operation| (operation, OperationSource::Reduced))
        };
        if prefer_reduced {
            reduced(rng).or_else(|| primary(rng))
        } else {
            primary(rng).or_else(|| reduced(rng))
        }
    }

    /// An operation for a variable of type `ty`, usable at a line of `kind`.
    ///
    /// Returns `None` when no bucket holds `ty`; unlike
    /// [`OperationDatabase::random_operation_for_variable`] it does not fall
    /// back to a generic operation.
    pub fn random_operation_for_type<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        ty: JsType,
        kind: InsertionKind,
    ) -> Option<(Operation, OperationSource)> {
        self.select_for_type(rng, ty, kind)
            .map(|(operation, source)| (operation.punctuate(kind), source))
    }

    /// An operation that needs no target variable.
    pub fn random_generic_operation<R: Rng + ?Sized>(&self, rng: &mut R, kind: InsertionKind) -> Option<Operation> {
        Self::pick(
            rng,
            Some(&self.generic_operations),
            Some(&self.single_statement.generic),
            kind,
        )
        .map(|operation| operation.punctuate(kind))
    }

    fn generic_fallback<R: Rng + ?Sized>(&self, rng: &mut R, kind: InsertionKind) -> Option<SelectedOperation> {
        self.random_generic_operation(rng, kind)
            .map(|operation| SelectedOperation {
                operation,
                target: None,
                chosen_type: None,
                guarded: false,
                source: OperationSource::GenericFallback,
            })
    }

    /// An operation on `variable` as it is at `line` of `state`.
    ///
    /// Falls back to a generic operation when the variable has no concrete
    /// type at the line or no bucket serves its type. When the variable may
    /// hold several types, one is chosen and the operation is guarded.
    pub fn random_operation_for_variable<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        state: &TestcaseState,
        line: usize,
        variable: &str,
        kind: InsertionKind,
    ) -> Option<SelectedOperation> {
        let mut types = state.variable_types_in_line(variable, line).unwrap_or_default();
        types.remove(&JsType::Undefined);
        let candidates: Vec<JsType> = types.iter().copied().collect();
        let Some(&ty) = candidates.choose(rng) else {
            return self.generic_fallback(rng, kind);
        };
        let Some((operation, source)) = self.select_for_type(rng, ty, kind) else {
            return self.generic_fallback(rng, kind);
        };
        let guarded = candidates.len() > 1;
        let operation = if guarded { operation.guard(kind) } else { operation };
        let operation = operation.punctuate(kind);
        Some(SelectedOperation {
            operation,
            target: Some(variable.to_string()),
            chosen_type: Some(ty),
            guarded,
            source,
        })
    }

    /// An operation for `line`: on a random available variable most of the
    /// time, otherwise generic.
    pub fn random_operation_at_line<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        state: &TestcaseState,
        line: usize,
        kind: InsertionKind,
    ) -> Option<SelectedOperation> {
        let variables: Vec<String> = state.available_variables_with_types(line, true).into_keys().collect();
        match variables.choose(rng) {
            Some(variable) if rng.random_bool(0.7) => {
                self.random_operation_for_variable(rng, state, line, variable, kind)
            }
            _ => self.generic_fallback(rng, kind).map(|selected| SelectedOperation {
                source: OperationSource::Generic,
                ..selected
            }),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_cbor::to_vec(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut database: Self = serde_cbor::from_slice(bytes)?;
        database.rebuild_views();
        Ok(database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn database() -> OperationDatabase {
        OperationDatabase::from_fragments([
            (Some(JsType::Array), "var_TARGET_.push(1);"),
            (Some(JsType::Array), "for (var var_1_ of var_TARGET_) {\n  var_1_;\n}"),
            (Some(JsType::String), "var_TARGET_.charAt(0);"),
            (None, "gc();"),
        ])
    }

    #[test]
    fn single_statement_detection() {
        assert!(Operation::analyze("var_TARGET_.push(1);").is_single_statement());
        assert!(!Operation::analyze("var var_1_ = 1;").is_single_statement());
        assert!(!Operation::analyze("a(); b();").is_single_statement());
        assert!(!Operation::analyze("if (a) { b(); }").is_single_statement());
    }

    #[test]
    fn comma_context_uses_single_statements() {
        let database = database();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (operation, _) = database
                .random_operation_for_type(&mut rng, JsType::Array, InsertionKind::TrailingComa)
                .unwrap();
            assert_eq!(operation.code, "var_TARGET_.push(1),");
            let (operation, _) = database
                .random_operation_for_type(&mut rng, JsType::Array, InsertionKind::LeadingComa)
                .unwrap();
            assert_eq!(operation.code, ", var_TARGET_.push(1)");
        }
    }

    #[test]
    fn missing_bucket_falls_back_to_generic() {
        let database = database();
        let mut state = TestcaseState::analyze("var var_1_ = new Map();\n");
        state.variable_types.insert("var_1_", 1, JsType::Map);
        let mut rng = StdRng::seed_from_u64(1);
        let selected = database
            .random_operation_for_variable(&mut rng, &state, 1, "var_1_", InsertionKind::Statement)
            .unwrap();
        assert_eq!(selected.source, OperationSource::GenericFallback);
        assert_eq!(selected.operation.code, "gc();");
        assert_eq!(selected.target, None);
    }

    #[test]
    fn typed_lookups_do_not_fall_back() {
        let database = database();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(
            database
                .random_operation_for_type(&mut rng, JsType::Map, InsertionKind::Statement)
                .is_none()
        );
    }

    #[test]
    fn ambiguous_types_are_guarded() {
        let database = database();
        let mut state = TestcaseState::analyze("x;\ny;");
        state.variable_types.insert("var_1_", 1, JsType::Array);
        state.variable_types.insert("var_1_", 1, JsType::String);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selected = database
                .random_operation_for_variable(&mut rng, &state, 1, "var_1_", InsertionKind::Statement)
                .unwrap();
            assert!(selected.guarded);
            assert!(selected.operation.code.starts_with("try { "));
            assert!(selected.operation.code.ends_with(" } catch {}"));
            assert_eq!(selected.target.as_deref(), Some("var_1_"));
            assert_eq!(
                selected.operation.state.testcase_number_of_lines,
                scanner::count_lines(&selected.operation.code)
            );
        }
    }

    #[test]
    fn round_trip_rebuilds_views() {
        let database = database();
        let bytes = database.serialize().unwrap();
        let loaded = OperationDatabase::deserialize(&bytes).unwrap();
        assert_eq!(loaded.number_of_operations(), 4);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(
            loaded
                .random_operation_for_type(&mut rng, JsType::String, InsertionKind::TrailingComa)
                .is_some()
        );
    }
}
