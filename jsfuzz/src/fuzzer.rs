use anyhow::bail;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use slog::{Logger, debug, error, info, o};
use std::path::PathBuf;
use std::time::Duration;

use crate::corpus::Corpus;
use crate::database::OperationDatabase;
use crate::error::Result;
use crate::merge;
use crate::mutators::{Mutation, MutationContext};
use crate::registry::{EngineIntrinsics, TypeRegistry};
use crate::state::TestcaseState;
use crate::tagging::{NullTelemetry, SESSION_CONTRACT_VIOLATION, SESSION_MERGE_FAILED, SESSION_MERGED_TESTCASE, Tag, TelemetrySink};
use crate::testcase::Testcase;
use crate::util::{ExecutionStatus, hex};

/// The tunables of a fuzzing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzerConfig {
    /// Names the session's artifact directory when no output directory is set.
    pub name: String,
    pub seed: u64,
    /// Late mutations per iteration are drawn from `1..=max_late_mutations`.
    pub max_late_mutations: usize,
    pub merge_probability: f64,
    pub max_testcase_size: usize,
    pub max_number_of_lines: usize,
    /// Stop after this many iterations. `None` runs until interrupted.
    pub max_iterations: Option<u64>,
    pub intrinsics: EngineIntrinsics,
    pub corpus_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            name: "jsfuzz".to_string(),
            seed: 0,
            max_late_mutations: 3,
            merge_probability: 0.2,
            max_testcase_size: 100_000,
            max_number_of_lines: 1_000,
            max_iterations: None,
            intrinsics: EngineIntrinsics::default(),
            corpus_dir: None,
            output_dir: None,
        }
    }
}

impl FuzzerConfig {
    /// Rejects tunables the mutation loop cannot draw from.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.merge_probability) {
            bail!("merge probability must lie in [0, 1], got {}", self.merge_probability);
        }
        Ok(())
    }
}

/// A testcase produced by one iteration, waiting to be executed.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Index of the corpus entry it was derived from.
    pub base: usize,
    pub testcase: Testcase,
    pub tags: Vec<Tag>,
}

/// Everything a fuzzing campaign owns: the corpus, the operation database,
/// the type registry, the random number generator and the sinks for logs and
/// decision tags.
pub struct FuzzingSession {
    config: FuzzerConfig,
    rng: StdRng,
    registry: TypeRegistry,
    database: OperationDatabase,
    corpus: Corpus,
    telemetry: Box<dyn TelemetrySink>,
    logger: Logger,
    iterations: u64,
}

impl FuzzingSession {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &FuzzerConfig {
        &self.config
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn corpus_mut(&mut self) -> &mut Corpus {
        &mut self.corpus
    }

    pub fn database(&self) -> &OperationDatabase {
        &self.database
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Restarts the random number generator from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.config.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Where crashes and new corpus entries are written.
    pub fn output_dir(&self) -> PathBuf {
        self.config
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.config.name))
    }

    pub fn crashes_dir(&self) -> PathBuf {
        self.output_dir().join("crashes")
    }

    /// Adds the testcases of the configured corpus directory. Returns how
    /// many were loaded.
    pub fn load_corpus(&mut self) -> anyhow::Result<usize> {
        let Some(dir) = self.config.corpus_dir.clone() else {
            return Ok(0);
        };
        let corpus = Corpus::load_dir(&dir)?;
        let loaded = corpus.len();
        self.corpus.extend(corpus);
        info!(self.logger, "loaded corpus"; "dir" => %dir.display(), "testcases" => loaded);
        Ok(loaded)
    }

    /// Whether `testcase` is small enough to be executed and kept.
    pub fn within_limits(&self, testcase: &Testcase) -> bool {
        testcase.content.len() <= self.config.max_testcase_size
            && testcase.number_of_lines() <= self.config.max_number_of_lines
    }

    /// Runs the mutation pipeline once on a uniformly drawn corpus entry.
    ///
    /// Returns `None` when the corpus is empty or when a mutation broke a
    /// state invariant. The latter is logged with the state of the testcase
    /// and only aborts this iteration.
    pub fn next_candidate(&mut self) -> Option<Candidate> {
        self.iterations += 1;
        let base = self.corpus.random_index(&mut self.rng)?;
        let entry = self.corpus.get(base)?;
        let mut testcase = entry.testcase.clone();

        let mut ctx = MutationContext::new(&mut self.rng, &self.registry, &self.database, &self.config.intrinsics);
        let outcome = mutate(&mut testcase, &mut ctx, &self.corpus, &self.config);
        let mut tags = ctx.take_tags();

        if let Err(violation) = outcome {
            tags.push(SESSION_CONTRACT_VIOLATION);
            let state = testcase.state.serialize().map(|bytes| hex(&bytes)).unwrap_or_default();
            error!(self.logger, "contract violation, iteration aborted";
                "iteration" => self.iterations,
                "base" => &entry.name,
                "error" => %violation,
                "tags" => ?tags,
                "content" => &testcase.content,
                "state" => state);
            return None;
        }
        debug!(self.logger, "mutated testcase";
            "iteration" => self.iterations,
            "base" => &entry.name,
            "lines" => testcase.number_of_lines(),
            "tags" => ?tags);
        Some(Candidate { base, testcase, tags })
    }

    /// Books the outcome of executing `candidate`: the counters of its corpus
    /// entry, the telemetry sink, and the corpus or crash directory.
    pub fn record_execution(
        &mut self,
        candidate: Candidate,
        status: ExecutionStatus,
        runtime: Duration,
    ) -> anyhow::Result<()> {
        let runtime_ms = u64::try_from(runtime.as_millis()).unwrap_or(u64::MAX);
        if let Some(entry) = self.corpus.get_mut(candidate.base) {
            count_execution(&mut entry.testcase.state, status, runtime_ms);
        }
        self.telemetry.record(&candidate.tags, status);

        let Candidate { mut testcase, .. } = candidate;
        match status {
            ExecutionStatus::NewCoverage => {
                let name = format!("{}_{:08}", self.config.name, self.iterations);
                reset_execution_counters(&mut testcase.state);
                count_execution(&mut testcase.state, status, runtime_ms);
                if let Some(dir) = &self.config.output_dir {
                    Corpus::persist(&dir.join("corpus"), &name, &testcase)?;
                }
                info!(self.logger, "new coverage";
                    "iteration" => self.iterations,
                    "name" => &name,
                    "corpus_size" => self.corpus.len() + 1);
                self.corpus.add(name, testcase);
            }
            ExecutionStatus::Crash => {
                let name = format!("crash_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S_%6f"));
                let path = Corpus::persist(&self.crashes_dir(), &name, &testcase)?;
                info!(self.logger, "crash"; "iteration" => self.iterations, "path" => %path.display());
            }
            ExecutionStatus::Success | ExecutionStatus::Exception | ExecutionStatus::Timeout => {}
        }
        Ok(())
    }
}

/// One early mutation, an optional merge with another corpus entry, then
/// `1..=max_late_mutations` late mutations.
fn mutate(testcase: &mut Testcase, ctx: &mut MutationContext, corpus: &Corpus, config: &FuzzerConfig) -> Result<()> {
    let early = Mutation::random(ctx.rng, Mutation::EARLY);
    early.apply(testcase, ctx)?;

    if ctx.rng.random_bool(config.merge_probability.clamp(0.0, 1.0)) {
        let donor = corpus.random_index(ctx.rng).and_then(|index| corpus.get(index));
        if let Some(donor) = donor {
            let line = merge::random_merge_line(ctx.rng, &testcase.state);
            match merge::merge_testcases(testcase.clone(), &donor.testcase, line) {
                Ok(merged) => {
                    *testcase = merged;
                    ctx.tag(SESSION_MERGED_TESTCASE);
                }
                Err(_) => ctx.tag(SESSION_MERGE_FAILED),
            }
        }
    }

    let late = ctx.rng.random_range(1..=config.max_late_mutations.max(1));
    for _ in 0..late {
        Mutation::random(ctx.rng, Mutation::LATE).apply(testcase, ctx)?;
    }
    Ok(())
}

fn count_execution(state: &mut TestcaseState, status: ExecutionStatus, runtime_ms: u64) {
    state.number_of_executions += 1;
    state.runtime_length_in_ms = state.runtime_length_in_ms.saturating_add(runtime_ms);
    let counter = match status {
        ExecutionStatus::Success | ExecutionStatus::NewCoverage => &mut state.number_of_success_executions,
        ExecutionStatus::Exception => &mut state.number_of_exception_executions,
        ExecutionStatus::Timeout => &mut state.number_of_timeout_executions,
        ExecutionStatus::Crash => &mut state.number_of_crash_executions,
    };
    *counter += 1;
}

fn reset_execution_counters(state: &mut TestcaseState) {
    state.runtime_length_in_ms = 0;
    state.number_of_executions = 0;
    state.number_of_success_executions = 0;
    state.number_of_exception_executions = 0;
    state.number_of_timeout_executions = 0;
    state.number_of_crash_executions = 0;
}

/// Builds a [`FuzzingSession`].
///
/// ```
/// use jsfuzz::fuzzer::FuzzerBuilder;
///
/// let session = FuzzerBuilder::new()
///     .name("array_fuzzer")
///     .seed(42)
///     .max_late_mutations(5)
///     .build()?;
/// assert_eq!(session.name(), "array_fuzzer");
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Default)]
pub struct FuzzerBuilder {
    config: FuzzerConfig,
    registry: Option<TypeRegistry>,
    database: Option<OperationDatabase>,
    corpus: Option<Corpus>,
    telemetry: Option<Box<dyn TelemetrySink>>,
    logger: Option<Logger>,
}

impl FuzzerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: FuzzerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn corpus_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.corpus_dir = Some(dir.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn max_late_mutations(mut self, max: usize) -> Self {
        self.config.max_late_mutations = max;
        self
    }

    pub fn merge_probability(mut self, probability: f64) -> Self {
        self.config.merge_probability = probability;
        self
    }

    pub fn max_iterations(mut self, iterations: u64) -> Self {
        self.config.max_iterations = Some(iterations);
        self
    }

    pub fn intrinsics(mut self, intrinsics: EngineIntrinsics) -> Self {
        self.config.intrinsics = intrinsics;
        self
    }

    pub fn database(mut self, database: OperationDatabase) -> Self {
        self.database = Some(database);
        self
    }

    pub fn registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Testcases to start from, in addition to the corpus directory.
    pub fn corpus(mut self, corpus: Corpus) -> Self {
        self.corpus = Some(corpus);
        self
    }

    pub fn telemetry(mut self, telemetry: impl TelemetrySink + 'static) -> Self {
        self.telemetry = Some(Box::new(telemetry));
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Fails when the configuration does not validate, e.g. a merge
    /// probability that is NaN or outside `[0, 1]`.
    pub fn build(self) -> anyhow::Result<FuzzingSession> {
        self.config.validate()?;
        Ok(FuzzingSession {
            rng: StdRng::seed_from_u64(self.config.seed),
            registry: self.registry.unwrap_or_default(),
            database: self.database.unwrap_or_default(),
            corpus: self.corpus.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_else(|| Box::new(NullTelemetry)),
            logger: self.logger.unwrap_or_else(|| Logger::root(slog::Discard, o!())),
            iterations: 0,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagging::TagStatistics;
    use std::sync::{Arc, Mutex};

    fn session_with(contents: &[&str]) -> FuzzingSession {
        let mut corpus = Corpus::new();
        for (index, content) in contents.iter().enumerate() {
            corpus.add(format!("seed_{index}"), Testcase::analyze(*content));
        }
        FuzzerBuilder::new().seed(7).corpus(corpus).build().unwrap()
    }

    #[test]
    fn candidates_come_from_the_corpus() {
        let mut session = session_with(&["var var_1_ = [1, 2];\nvar_1_.push(3);", "var var_1_ = 'a';\nvar_1_;"]);
        for _ in 0..50 {
            if let Some(candidate) = session.next_candidate() {
                assert!(candidate.base < 2);
                assert!(candidate.testcase.validate().is_ok(), "{}", candidate.testcase.content);
                assert!(!candidate.tags.is_empty());
            }
        }
        assert_eq!(session.iterations(), 50);
    }

    #[test]
    fn merge_probabilities_outside_the_unit_interval_are_rejected() {
        for probability in [f64::NAN, f64::INFINITY, -0.5, 1.5] {
            let error = FuzzerBuilder::new().merge_probability(probability).build().err();
            assert!(error.is_some(), "{probability} was accepted");
        }
        let config = FuzzerConfig {
            merge_probability: f64::NAN,
            ..FuzzerConfig::default()
        };
        assert!(FuzzerBuilder::from_config(config).build().is_err());
        assert!(FuzzerBuilder::new().merge_probability(1.0).build().is_ok());
    }

    #[test]
    fn empty_corpus_yields_nothing() {
        let mut session = FuzzerBuilder::new().build().unwrap();
        assert!(session.next_candidate().is_none());
    }

    #[test]
    fn reseeding_replays_the_same_candidates() {
        let mut session = session_with(&["var var_1_ = 1;\nvar var_2_ = [var_1_];\nvar_2_.pop();"]);
        session.reseed(3);
        let first: Vec<String> = (0..5)
            .filter_map(|_| session.next_candidate())
            .map(|candidate| candidate.testcase.content)
            .collect();
        session.reseed(3);
        let second: Vec<String> = (0..5)
            .filter_map(|_| session.next_candidate())
            .map(|candidate| candidate.testcase.content)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn executions_are_booked() {
        let statistics = Arc::new(Mutex::new(TagStatistics::new()));
        let mut corpus = Corpus::new();
        corpus.add("seed", Testcase::analyze("var var_1_ = 1;\nvar_1_ += 1;"));
        let mut session = FuzzerBuilder::new()
            .corpus(corpus)
            .telemetry(statistics.clone())
            .build().unwrap();

        let candidate = session.next_candidate().unwrap();
        session
            .record_execution(candidate, ExecutionStatus::Exception, Duration::from_millis(12))
            .unwrap();
        let state = &session.corpus().get(0).unwrap().testcase.state;
        assert_eq!(state.number_of_executions, 1);
        assert_eq!(state.number_of_exception_executions, 1);
        assert_eq!(state.runtime_length_in_ms, 12);
        assert_eq!(statistics.lock().unwrap().runs(), 1);

        let candidate = session.next_candidate().unwrap();
        session
            .record_execution(candidate, ExecutionStatus::NewCoverage, Duration::from_millis(1))
            .unwrap();
        assert_eq!(session.corpus().len(), 2);
        let added = &session.corpus().get(1).unwrap().testcase.state;
        assert_eq!(added.number_of_executions, 1);
        assert_eq!(added.number_of_success_executions, 1);
    }

    #[test]
    fn crashes_are_written_to_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut corpus = Corpus::new();
        corpus.add("seed", Testcase::analyze("a();"));
        let mut session = FuzzerBuilder::new().corpus(corpus).output_dir(dir.path()).build().unwrap();

        let candidate = session.next_candidate().unwrap();
        let content = candidate.testcase.content.clone();
        session
            .record_execution(candidate, ExecutionStatus::Crash, Duration::ZERO)
            .unwrap();
        let crashes = Corpus::load_dir(&session.crashes_dir()).unwrap();
        assert_eq!(crashes.len(), 1);
        assert_eq!(crashes.get(0).unwrap().testcase.content, content);
        assert_eq!(session.corpus().len(), 1);
    }

    #[test]
    fn limits_reject_large_testcases() {
        let session = FuzzerBuilder::from_config(FuzzerConfig {
            max_number_of_lines: 2,
            ..FuzzerConfig::default()
        })
        .build().unwrap();
        assert!(session.within_limits(&Testcase::analyze("a();\nb();")));
        assert!(!session.within_limits(&Testcase::analyze("a();\nb();\nc();")));
    }
}
