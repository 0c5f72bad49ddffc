//! A coverage-guided, grammar-aware mutation engine for fuzzing JavaScript
//! engines.
//!
//! Testcases are JavaScript programs paired with a per-line state model
//! recording which variables exist at every line and which types they may
//! hold. Mutation strategies use that model to produce programs that stay
//! semantically plausible, and the merge engine splices testcases and
//! operation fragments together while keeping the model in step with the
//! text. The engine is built on `libafl`.
//!
//! ## Getting Started
//!
//! To create a fuzzer, implement the [`orchestrator::FuzzerOrchestrator`]
//! trait. It runs a testcase in the engine under test; the provided methods
//! drive the mutation loop around it.
//!
//! ```no_run
//! use jsfuzz::fuzzer::{FuzzerBuilder, FuzzingSession};
//! use jsfuzz::orchestrator::FuzzerOrchestrator;
//! use jsfuzz::util::ExecutionStatus;
//!
//! // 1. Define a struct for your fuzzer and derive FuzzerSession.
//! // Note: Requires the "derive" feature enabled for jsfuzz.
//! #[cfg_attr(feature = "derive", derive(jsfuzz::FuzzerSession))]
//! struct MyFuzzer(FuzzingSession);
//!
//! // Manual implementation if "derive" feature is not used:
//! #[cfg(not(feature = "derive"))]
//! impl AsRef<FuzzingSession> for MyFuzzer {
//!     fn as_ref(&self) -> &FuzzingSession { &self.0 }
//! }
//! #[cfg(not(feature = "derive"))]
//! impl AsMut<FuzzingSession> for MyFuzzer {
//!     fn as_mut(&mut self) -> &mut FuzzingSession { &mut self.0 }
//! }
//!
//! // 2. Run a testcase in the engine under test.
//! impl FuzzerOrchestrator for MyFuzzer {
//!     fn execute(&mut self, content: &str) -> ExecutionStatus {
//!         println!("Executing testcase:\n{content}");
//!         ExecutionStatus::Success
//!     }
//! }
//!
//! // 3. Set up and run the fuzzer.
//! fn main() -> anyhow::Result<()> {
//!     let session = FuzzerBuilder::new()
//!         .name("my_fuzzer")
//!         .corpus_dir("./corpus")
//!         .output_dir("./artifacts")
//!         .build()?;
//!
//!     let mut fuzzer = MyFuzzer(session);
//!     fuzzer.run()
//! }
//! ```
pub mod constants;
pub mod corpus;
pub mod database;
pub mod error;
pub mod fuzzer;
pub mod merge;
pub mod mutators;
pub mod orchestrator;
pub mod registry;
pub mod scanner;
pub mod state;
pub mod tagging;
pub mod testcase;
pub mod types;
pub mod util;
pub mod values;

pub mod custom;

pub use error::{EngineError, Result};

// re-export libAFL and libAFL_bolts
pub use libafl;
pub use libafl_bolts;

#[cfg(feature = "derive")]
pub use jsfuzz_derive::FuzzerSession;
