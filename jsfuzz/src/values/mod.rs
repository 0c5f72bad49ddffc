//! Generators for literals and value expressions.
//!
//! Every generator is a pure function of its arguments and the RNG it is
//! handed. None of them touch a testcase state: callers splice the produced
//! text through the structural edit primitives.

pub mod arrays;
pub mod builtins;
pub mod numbers;
pub mod strings;

pub use arrays::{ArrayValue, random_array};
pub use builtins::code_to_create_random_variable_with_datatype;
pub use numbers::{Decomposed, decompose_number, random_number};
pub use strings::random_string_literal;

use rand::Rng;
use rand::seq::IteratorRandom;

use crate::types::JsType;

/// A random instantiable type.
pub fn random_datatype<R: Rng + ?Sized>(rng: &mut R) -> JsType {
    JsType::instantiable().choose(rng).unwrap_or(JsType::Object)
}

/// A value of a random type, with the type it has.
pub fn random_value<R: Rng + ?Sized>(rng: &mut R) -> (String, JsType) {
    let ty = random_datatype(rng);
    (code_to_create_random_variable_with_datatype(rng, ty), ty)
}

/// A value of a different type than `ty`, used to change the type a slot holds.
pub fn random_value_of_other_type<R: Rng + ?Sized>(rng: &mut R, ty: JsType) -> (String, JsType) {
    let other = JsType::instantiable()
        .filter(|candidate| *candidate != ty)
        .choose(rng)
        .unwrap_or(JsType::Object);
    (code_to_create_random_variable_with_datatype(rng, other), other)
}
