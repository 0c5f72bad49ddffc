use assert_matches::assert_matches;
use difference::Changeset;
use jsfuzz::database::OperationDatabase;
use jsfuzz::libafl::mutators::MutationResult;
use jsfuzz::merge;
use jsfuzz::mutators::{Mutation, MutationContext};
use jsfuzz::registry::{EngineIntrinsics, TypeRegistry};
use jsfuzz::scanner;
use jsfuzz::testcase::Testcase;
use jsfuzz::types::JsType;
use jsfuzz::values::code_to_create_random_variable_with_datatype;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Applies `mutation` once per seed in `0..seeds` and returns what each seed
/// produced.
fn outcomes(mutation: Mutation, testcase: &Testcase, seeds: u64) -> Vec<(MutationResult, Testcase)> {
    let registry = TypeRegistry::builtin();
    let database = OperationDatabase::new();
    let intrinsics = EngineIntrinsics::v8();
    (0..seeds)
        .map(|seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut ctx = MutationContext::new(&mut rng, &registry, &database, &intrinsics);
            let mut copy = testcase.clone();
            let result = mutation.apply(&mut copy, &mut ctx).unwrap();
            (result, copy)
        })
        .collect()
}

fn assert_same_content(actual: &str, expected: &str) {
    if actual != expected {
        panic!("content differs:\n{}", Changeset::new(expected, actual, "\n"));
    }
}

#[test]
fn removing_the_use_of_a_variable() {
    let testcase = Testcase::analyze("var var_1_ = 1;\nvar_1_;");
    assert_eq!(
        testcase.state.variable_types.at_line("var_1_", 1)[0].value,
        JsType::RealNumber
    );

    let removed_use: Vec<Testcase> = outcomes(Mutation::RemoveLine, &testcase, 64)
        .into_iter()
        .filter(|(result, _)| *result == MutationResult::Mutated)
        .map(|(_, testcase)| testcase)
        .filter(|testcase| !testcase.content.starts_with("var_1_"))
        .collect();
    assert!(!removed_use.is_empty());
    for result in removed_use {
        assert_same_content(&result.content, "var var_1_ = 1;");
        assert_eq!(result.state.testcase_number_of_lines, 1);
        assert!(result.validate().is_ok());
    }
}

#[test]
fn negative_numbers_are_one_span() {
    let content = "var_1_ = -123;";
    let positions = scanner::number_positions(content);
    assert_eq!(positions.len(), 1);
    assert_eq!(&content[positions[0].clone()], "-123");
}

#[test]
fn merged_variables_are_renamed() {
    let first = Testcase::analyze("var var_1_ = 1;");
    let second = Testcase::analyze("var var_1_ = 2;");
    let merged = merge::append_testcase(first, &second).unwrap();
    assert_same_content(&merged.content, "var var_1_ = 1;\nvar var_2_ = 2;");
    assert_eq!(merged.state.number_variables, 2);
    assert_eq!(
        merged.state.variable_types.at_line("var_2_", 2)[0].value,
        JsType::RealNumber
    );
    assert!(merged.validate().is_ok());
}

#[test]
fn array_buffers_take_an_integer_length() {
    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let code = code_to_create_random_variable_with_datatype(&mut rng, "arraybuffer".parse().unwrap());
        let length = code
            .strip_prefix("new ArrayBuffer(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or_else(|| panic!("unexpected constructor: {code}"));
        assert!(length.parse::<u64>().is_ok(), "{code}");
    }
}

#[test]
fn replacing_numbers_without_numbers_is_a_no_op() {
    let testcase = Testcase::analyze("var var_1_ = 'abc';\nvar_1_.toUpperCase();");
    for (result, after) in outcomes(Mutation::ReplaceNumber, &testcase, 20) {
        assert_matches!(result, MutationResult::Skipped);
        assert_eq!(after, testcase);
    }
}

#[test]
fn swapping_needs_two_variables() {
    let testcase = Testcase::analyze("var var_1_ = 1;\nvar_1_ += 1;\nvar_1_;");
    for (result, after) in outcomes(Mutation::ChangeTwoVariablesOfSameType, &testcase, 20) {
        assert_matches!(result, MutationResult::Skipped);
        assert_eq!(after, testcase);
    }
}
