use libafl::{
    Error,
    corpus::CorpusId,
    mutators::{MutationResult, Mutator},
    state::HasRand,
};
use libafl_bolts::Named;
use libafl_bolts::rands::Rand;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::borrow::Cow;

use crate::database::OperationDatabase;
use crate::mutators::{Mutation, MutationContext};
use crate::registry::{EngineIntrinsics, TypeRegistry};
use crate::tagging::Tag;
use crate::testcase::Testcase;

/// Applies one strategy of the catalog to a [`Testcase`] input, so the engine
/// can be stacked into libafl mutational stages.
pub struct TestcaseMutator {
    registry: TypeRegistry,
    database: OperationDatabase,
    intrinsics: EngineIntrinsics,
    pool: &'static [Mutation],
    last_tags: Vec<Tag>,
}

impl TestcaseMutator {
    pub fn new(registry: TypeRegistry, database: OperationDatabase, intrinsics: EngineIntrinsics) -> Self {
        Self {
            registry,
            database,
            intrinsics,
            pool: Mutation::ALL,
            last_tags: Vec::new(),
        }
    }

    /// Restricts the strategies drawn from, e.g. to [`Mutation::EARLY`].
    pub fn with_pool(mut self, pool: &'static [Mutation]) -> Self {
        self.pool = pool;
        self
    }

    /// Tags recorded by the last call to [`Mutator::mutate`].
    pub fn last_tags(&self) -> &[Tag] {
        &self.last_tags
    }

    fn mutate_with_seed(&mut self, seed: u64, input: &mut Testcase) -> Result<MutationResult, Error> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ctx = MutationContext::new(&mut rng, &self.registry, &self.database, &self.intrinsics);
        let mutation = Mutation::random(ctx.rng, self.pool);
        let result = mutation
            .apply(input, &mut ctx)
            .map_err(|error| Error::illegal_state(format!("{}: {error}", mutation.name())));
        self.last_tags = ctx.take_tags();
        result
    }
}

impl Named for TestcaseMutator {
    fn name(&self) -> &Cow<'static, str> {
        static NAME: Cow<'static, str> = Cow::Borrowed("TestcaseMutator");
        &NAME
    }
}

impl<S> Mutator<Testcase, S> for TestcaseMutator
where
    S: HasRand,
{
    fn mutate(&mut self, state: &mut S, input: &mut Testcase) -> Result<MutationResult, Error> {
        let seed = state.rand_mut().next();
        self.mutate_with_seed(seed, input)
    }

    fn post_exec(&mut self, _state: &mut S, _new_corpus_id: Option<CorpusId>) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutator() -> TestcaseMutator {
        TestcaseMutator::new(TypeRegistry::builtin(), OperationDatabase::new(), EngineIntrinsics::v8())
    }

    #[test]
    fn mutations_keep_the_input_consistent() {
        let mut mutator = mutator();
        let original = Testcase::analyze("var var_1_ = [1, 2];\nvar_1_.push(3);\nvar_1_;");
        let mut mutated = 0;
        for seed in 0..40 {
            let mut input = original.clone();
            match mutator.mutate_with_seed(seed, &mut input).unwrap() {
                MutationResult::Mutated => {
                    mutated += 1;
                    assert!(input.validate().is_ok(), "{}", input.content);
                }
                MutationResult::Skipped => assert_eq!(input, original),
            }
            assert!(!mutator.last_tags().is_empty());
        }
        assert!(mutated > 0);
    }

    #[test]
    fn the_pool_limits_the_strategies() {
        let mut mutator = mutator().with_pool(&[Mutation::RemoveLine]);
        let mut input = Testcase::analyze("a();\nb();");
        mutator.mutate_with_seed(1, &mut input).unwrap();
        assert!(
            mutator
                .last_tags()
                .iter()
                .all(|tag| tag.starts_with("MUTATION_REMOVE_LINE") || tag.starts_with("LINE_SELECTION"))
        );
    }
}
