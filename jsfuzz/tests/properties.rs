use jsfuzz::database::OperationDatabase;
use jsfuzz::libafl::mutators::MutationResult;
use jsfuzz::merge;
use jsfuzz::mutators::{Mutation, MutationContext};
use jsfuzz::registry::{EngineIntrinsics, TypeRegistry};
use jsfuzz::scanner;
use jsfuzz::testcase::Testcase;
use jsfuzz::types::JsType;
use jsfuzz::values::decompose_number;
use jsfuzz::values::numbers::NEGATIVE_ZERO_ENCODINGS;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SAMPLE: &str = "var var_1_ = [1, 2, 3];
var var_2_ = 'abc';
function func_1_(a) {
  return a + var_1_.length;
}
for (var var_3_ = 0; var_3_ < 3; var_3_++) {
  var_1_.push(func_1_(var_3_));
}
var_2_ = var_2_ + var_1_[0];";

fn assert_consistent(testcase: &Testcase) {
    assert_eq!(
        testcase.state.testcase_number_of_lines,
        testcase.content.split('\n').count(),
        "{}",
        testcase.content
    );
    assert!(testcase.validate().is_ok(), "{}", testcase.content);
    assert!(testcase.state.variable_types.is_sorted());
    assert!(testcase.state.array_lengths.is_sorted());
    assert!(testcase.state.array_items_or_properties.is_sorted());
}

#[test]
fn line_count_survives_random_edits() {
    for seed in 0..30 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut testcase = Testcase::analyze(SAMPLE);
        for step in 0..40 {
            let lines = testcase.number_of_lines();
            if lines > 2 && rng.random_bool(0.5) {
                let start = rng.random_range(0..lines - 1);
                let count = rng.random_range(1..=(lines - start).min(3));
                let count = count.min(lines - 1);
                testcase.remove_lines(start, count).unwrap();
            } else {
                let index = rng.random_range(0..=lines);
                let code = if rng.random_bool(0.3) {
                    format!("if (true) {{\n  f({step});\n}}")
                } else {
                    format!("f({step});")
                };
                testcase.insert_line(index, &code).unwrap();
            }
            assert_consistent(&testcase);
        }
    }
}

#[test]
fn insert_then_remove_is_the_identity() {
    let original = Testcase::analyze(SAMPLE);
    for index in 0..=original.number_of_lines() {
        for code in ["gc();", "try {\n  var_1_.pop();\n} catch {}"] {
            let mut testcase = original.clone();
            testcase.insert_line(index, code).unwrap();
            testcase.remove_lines(index, scanner::count_lines(code)).unwrap();
            assert_eq!(testcase, original, "inserting at {index}");
        }
    }
}

#[test]
fn sequential_merges_add_up_the_variables() {
    let a = Testcase::analyze("var var_1_ = 1;\nvar var_2_ = [var_1_];");
    let b = Testcase::analyze("var var_1_ = 'x';");
    let c = Testcase::analyze("var var_1_ = {};\nvar var_2_ = 2;\nvar var_3_ = var_1_;");

    let left = merge::append_testcase(merge::append_testcase(a.clone(), &b).unwrap(), &c).unwrap();
    let right = merge::append_testcase(a.clone(), &merge::append_testcase(b.clone(), &c).unwrap()).unwrap();

    let total = a.state.number_variables + b.state.number_variables + c.state.number_variables;
    assert_eq!(total, 6);
    assert_eq!(left.state.number_variables, total);
    assert_eq!(right.state.number_variables, total);
    assert_eq!(left.content, right.content);
    assert_consistent(&left);
}

#[test]
fn every_mutation_keeps_the_model_consistent() {
    let registry = TypeRegistry::builtin();
    let database = OperationDatabase::from_fragments([
        (Some(JsType::Array), "var_TARGET_.reverse();"),
        (Some(JsType::String), "var_TARGET_.charAt(0);"),
        (None, "gc();"),
    ]);
    let intrinsics = EngineIntrinsics::v8();
    let original = Testcase::analyze(SAMPLE);

    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut testcase = original.clone();
        for _ in 0..15 {
            let mut ctx = MutationContext::new(&mut rng, &registry, &database, &intrinsics);
            let mutation = Mutation::random(ctx.rng, Mutation::ALL);
            let before = testcase.clone();
            let result = mutation.apply(&mut testcase, &mut ctx).unwrap();
            if result == MutationResult::Skipped {
                assert_eq!(testcase, before, "{} skipped but changed the testcase", mutation.name());
            }
            assert_consistent(&testcase);
        }
    }
}

/// Evaluates the arithmetic produced by number decomposition: literals,
/// `+ - * / % **`, parentheses and unary minus. Rejects a unary minus directly
/// before `**`, which JavaScript does not parse.
struct Arithmetic<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl Arithmetic<'_> {
    fn evaluate(text: &str) -> f64 {
        let mut parser = Arithmetic {
            bytes: text.as_bytes(),
            at: 0,
        };
        let value = parser.sum();
        parser.skip_spaces();
        assert_eq!(parser.at, parser.bytes.len(), "trailing input in {text}");
        value
    }

    fn skip_spaces(&mut self) {
        while self.bytes.get(self.at) == Some(&b' ') {
            self.at += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_spaces();
        self.bytes.get(self.at).copied()
    }

    fn sum(&mut self) -> f64 {
        let mut value = self.product();
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.at += 1;
            let rhs = self.product();
            value = if op == b'+' { value + rhs } else { value - rhs };
        }
        value
    }

    fn at_power(&mut self) -> bool {
        self.peek() == Some(b'*') && self.bytes.get(self.at + 1) == Some(&b'*')
    }

    fn product(&mut self) -> f64 {
        let mut value = self.power();
        while let Some(op @ (b'*' | b'/' | b'%')) = self.peek() {
            if self.at_power() {
                break;
            }
            self.at += 1;
            let rhs = self.power();
            value = match op {
                b'*' => value * rhs,
                b'/' => value / rhs,
                _ => value % rhs,
            };
        }
        value
    }

    fn power(&mut self) -> f64 {
        if self.peek() == Some(b'-') {
            let value = self.unary();
            assert!(!self.at_power(), "unary minus before `**` at {}", self.at);
            return value;
        }
        let base = self.primary();
        if self.at_power() {
            self.at += 2;
            return base.powf(self.power());
        }
        base
    }

    fn unary(&mut self) -> f64 {
        if self.peek() == Some(b'-') {
            self.at += 1;
            return -self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> f64 {
        match self.peek() {
            Some(b'(') => {
                self.at += 1;
                let value = self.sum();
                assert_eq!(self.peek(), Some(b')'));
                self.at += 1;
                value
            }
            _ => {
                let start = self.at;
                while let Some(&b) = self.bytes.get(self.at) {
                    let exponent_sign = matches!(b, b'-' | b'+') && self.at > start && self.bytes[self.at - 1] == b'e';
                    if !(b.is_ascii_digit() || b == b'.' || b == b'e' || exponent_sign) {
                        break;
                    }
                    self.at += 1;
                }
                let literal = std::str::from_utf8(&self.bytes[start..self.at]).unwrap();
                literal.parse().unwrap_or_else(|_| panic!("not a number: {literal}"))
            }
        }
    }
}

#[test]
fn decomposition_preserves_the_value() {
    for literal in ["5", "0", "1", "255", "65536", "-7", "2.5", "-0.75"] {
        let expected: f64 = literal.parse().unwrap();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let decomposed = decompose_number(&mut rng, literal, None);
            assert_eq!(decomposed.prefix, None);
            // `x % m` with m > x is the identity for the non-negative integers
            // produced here.
            let value = Arithmetic::evaluate(&decomposed.expression);
            assert_eq!(value, expected, "{literal} became {}", decomposed.expression);
        }
    }
}

#[test]
fn arithmetic_negative_zero_encodings_evaluate_to_negative_zero() {
    let arithmetic: Vec<&str> = NEGATIVE_ZERO_ENCODINGS
        .iter()
        .copied()
        .filter(|encoding| encoding.bytes().all(|b| b"0123456789.e+-*/%() ".contains(&b)))
        .collect();
    assert!(arithmetic.len() >= 5, "{arithmetic:?}");
    for encoding in arithmetic {
        let value = Arithmetic::evaluate(encoding);
        assert!(value == 0.0 && value.is_sign_negative(), "{encoding} evaluated to {value}");
    }
}

#[test]
#[should_panic(expected = "unary minus before `**`")]
fn unary_minus_cannot_be_raised_to_a_power() {
    Arithmetic::evaluate("-0 ** 1");
}
