//! The fuzzing loop.
//!
//! Implement [`FuzzerOrchestrator`] for a type wrapping a
//! [`FuzzingSession`] and supply [`FuzzerOrchestrator::execute`], which runs
//! one JavaScript testcase in the engine under test and classifies the
//! outcome. The provided methods drive the session around it.

use anyhow::bail;
use slog::{debug, info};
use std::time::Instant;

use crate::fuzzer::FuzzingSession;
use crate::libafl::executors::ExitKind;
use crate::testcase::Testcase;
use crate::util::ExecutionStatus;

pub trait FuzzerOrchestrator: AsRef<FuzzingSession> + AsMut<FuzzingSession> {
    /// Prepares the engine under test. The default loads the configured
    /// corpus directory into the session.
    fn init(&mut self) -> anyhow::Result<()> {
        self.as_mut().load_corpus()?;
        Ok(())
    }

    /// Runs `content` in the engine under test.
    fn execute(&mut self, content: &str) -> ExecutionStatus;

    /// [`FuzzerOrchestrator::execute`] as a libafl harness outcome.
    fn execute_input(&mut self, input: &Testcase) -> ExitKind {
        self.execute(&input.content).into()
    }

    /// One iteration: mutate, execute, book the outcome. Returns `None` when
    /// nothing was executed.
    fn fuzz_one(&mut self) -> anyhow::Result<Option<ExecutionStatus>> {
        let Some(candidate) = self.as_mut().next_candidate() else {
            return Ok(None);
        };
        if !self.as_ref().within_limits(&candidate.testcase) {
            debug!(self.as_ref().logger(), "testcase exceeds the size limits";
                "bytes" => candidate.testcase.content.len(),
                "lines" => candidate.testcase.number_of_lines());
            return Ok(None);
        }
        let started = Instant::now();
        let status = self.execute(&candidate.testcase.content);
        let runtime = started.elapsed();
        self.as_mut().record_execution(candidate, status, runtime)?;
        Ok(Some(status))
    }

    /// Initializes the engine, then fuzzes until the configured number of
    /// iterations is reached, or forever if there is none.
    fn run(&mut self) -> anyhow::Result<()> {
        self.init()?;
        let session = self.as_ref();
        if session.corpus().is_empty() {
            bail!("the corpus of {} is empty", session.name());
        }
        info!(session.logger(), "fuzzing"; "name" => session.name(), "corpus_size" => session.corpus().len());

        let limit = session.config().max_iterations;
        while limit.is_none_or(|limit| self.as_ref().iterations() < limit) {
            self.fuzz_one()?;
        }
        info!(self.as_ref().logger(), "done"; "iterations" => self.as_ref().iterations());
        Ok(())
    }

    /// Executes a single testcase, e.g. to reproduce a crash.
    fn test_one_input(&mut self, content: &str) -> anyhow::Result<ExecutionStatus> {
        self.init()?;
        let status = self.execute(content);
        info!(self.as_ref().logger(), "execution result"; "status" => ?status);
        Ok(status)
    }
}
