//! Adapters plugging the mutation engine into libafl fuzzers.

pub mod testcase_mutator;
