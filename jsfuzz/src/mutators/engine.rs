//! Mutations steering the engine's tiers: forced optimization, forced calls
//! and garbage collection at arbitrary points.

use libafl::mutators::MutationResult;
use rand::Rng;
use rand::seq::IndexedRandom;

use super::{MutationContext, executed_statement_lines, insert_statement};
use crate::error::Result;
use crate::scanner;
use crate::tagging::*;
use crate::testcase::Testcase;
use crate::values::random_value;

const HOT_LOOP_ITERATIONS: &[u32] = &[1000, 10000, 100000];
const WARMUP_CALLS: usize = 2;
const NEVER_OPTIMIZE_PROBABILITY: f64 = 0.1;

/// Line span of the body of `function name(...) {`.
fn function_body(content: &str, name: &str) -> Option<(usize, usize)> {
    let declaration = format!("function {name}(");
    let line = content.split('\n').position(|text| text.contains(&declaration))?;
    scanner::block_line_spans(content)
        .into_iter()
        .find(|&(open, _)| open == line)
}

/// An executed statement line and a function that can be called there
/// without recursing into itself.
fn callable_function(testcase: &Testcase, ctx: &mut MutationContext) -> Option<(usize, String, usize)> {
    let state = &testcase.state;
    let candidates: Vec<(usize, String, usize)> = executed_statement_lines(state)
        .into_iter()
        .flat_map(|line| {
            state
                .available_functions(line)
                .into_iter()
                .filter(move |(name, _)| {
                    function_body(&testcase.content, name).is_none_or(|(open, close)| line <= open || line > close)
                })
                .map(move |(name, arity)| (line, name, arity))
        })
        .collect();
    candidates.choose(ctx.rng).cloned()
}

fn arguments(ctx: &mut MutationContext, arity: usize) -> String {
    (0..arity)
        .map(|_| random_value(ctx.rng).0)
        .collect::<Vec<_>>()
        .join(", ")
}

fn call(ctx: &mut MutationContext, name: &str, arguments: &str) -> String {
    if ctx.rng.random_bool(0.5) {
        format!("try {{ {name}({arguments}); }} catch {{}}")
    } else {
        format!("{name}({arguments});")
    }
}

/// Warms a function up and has it optimized through the engine intrinsics,
/// or calls it in a hot loop when the engine exposes none.
pub(super) fn optimize_function(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some((line, name, arity)) = callable_function(testcase, ctx) else {
        return ctx.skipped(MUTATION_OPTIMIZE_FUNCTION_NO_CANDIDATE);
    };
    let arguments = arguments(ctx, arity);
    let intrinsics = ctx.intrinsics;

    let mut code = Vec::new();
    let never_optimize = intrinsics
        .never_optimize
        .as_ref()
        .filter(|_| ctx.rng.random_bool(NEVER_OPTIMIZE_PROBABILITY));
    match (&intrinsics.prepare_for_optimization, &intrinsics.optimize_on_next_call) {
        _ if never_optimize.is_some() => {
            // Pins the function to the interpreter while it keeps being called.
            ctx.tag(MUTATION_OPTIMIZE_FUNCTION_NEVER);
            if let Some(never) = never_optimize {
                code.push(format!("{never}({name});"));
            }
            for _ in 0..=WARMUP_CALLS {
                code.push(call(ctx, &name, &arguments));
            }
        }
        (Some(prepare), Some(optimize)) => {
            code.push(format!("{prepare}({name});"));
            for _ in 0..WARMUP_CALLS {
                code.push(call(ctx, &name, &arguments));
            }
            code.push(format!("{optimize}({name});"));
            code.push(call(ctx, &name, &arguments));
            if let Some(deoptimize) = intrinsics.deoptimize.as_ref().filter(|_| ctx.rng.random_bool(0.2)) {
                code.push(format!("{deoptimize}({name});"));
                code.push(call(ctx, &name, &arguments));
            }
        }
        _ => {
            ctx.tag(MUTATION_OPTIMIZE_FUNCTION_HOT_LOOP);
            let counter = testcase.fresh_variable_name();
            let iterations = HOT_LOOP_ITERATIONS.choose(ctx.rng).copied().unwrap_or(10000);
            let body = call(ctx, &name, &arguments);
            code.push(format!(
                "for (let {counter} = 0; {counter} < {iterations}; {counter}++) {{ {body} }}"
            ));
        }
    }
    insert_statement(testcase, line, &code.join("\n"))?;
    ctx.mutated(MUTATION_OPTIMIZE_FUNCTION)
}

/// Inserts a call to a function, so the call site exists for the engine to
/// inline or specialize.
pub(super) fn enforce_call_node(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some((line, name, arity)) = callable_function(testcase, ctx) else {
        return ctx.skipped(MUTATION_ENFORCE_CALL_NODE_NO_CANDIDATE);
    };
    let arguments = arguments(ctx, arity);
    let code = call(ctx, &name, &arguments);
    insert_statement(testcase, line, &code)?;
    ctx.mutated(MUTATION_ENFORCE_CALL_NODE)
}

pub(super) fn insert_garbage_collection(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let Some(line) = ctx.statement_line(&testcase.state) else {
        return ctx.skipped(MUTATION_INSERT_GARBAGE_COLLECTION_NO_CANDIDATE);
    };
    let code = match &ctx.intrinsics.garbage_collect {
        Some(collect) => format!("{collect}();"),
        None => {
            // Allocation pressure triggers a scavenge without the intrinsic.
            let counter = testcase.fresh_variable_name();
            format!("for (let {counter} = 0; {counter} < 100000; {counter}++) {{ new Array(16); }}")
        }
    };
    insert_statement(testcase, line, &code)?;
    ctx.mutated(MUTATION_INSERT_GARBAGE_COLLECTION)
}

/// Calls a builtin method of a variable's type with random arguments.
pub(super) fn call_builtin_method(testcase: &mut Testcase, ctx: &mut MutationContext) -> Result<MutationResult> {
    let registry = ctx.registry;
    let Some((line, name, types)) = ctx.variable_at_statement_line(&testcase.state, |_, types| {
        types.iter().any(|ty| !registry.methods(*ty).is_empty())
    }) else {
        return ctx.skipped(MUTATION_CALL_BUILTIN_METHOD_NO_CANDIDATE);
    };
    let methods: Vec<_> = types.iter().flat_map(|ty| registry.methods(*ty)).collect();
    let Some(method) = methods.choose(ctx.rng).copied() else {
        return ctx.skipped(MUTATION_CALL_BUILTIN_METHOD_NO_CANDIDATE);
    };
    let arguments = arguments(ctx, method.arity);
    let invocation = format!("{name}.{}({arguments});", method.name);
    // The method may not exist on every type the variable can hold.
    let code = if types.len() > 1 {
        format!("try {{ {invocation} }} catch {{}}")
    } else {
        invocation
    };
    insert_statement(testcase, line, &code)?;
    ctx.mutated(MUTATION_CALL_BUILTIN_METHOD)
}

#[cfg(test)]
mod tests {
    use super::super::Mutation;
    use super::super::test_support::*;
    use super::*;
    use crate::registry::EngineIntrinsics;

    const FUNCTION: &str = "function func_1_(a) {\n  return a + 1;\n}\nfunc_1_(1);";

    #[test]
    fn optimization_happens_outside_the_function() {
        let testcase = Testcase::analyze(FUNCTION);
        let results = mutated_results(Mutation::OptimizeFunction, &testcase, 20);
        assert_eq!(results.len(), 20);
        for result in results {
            let lines = result.lines();
            let first_intrinsic = lines.iter().position(|line| line.starts_with('%')).unwrap();
            let (open, close) = function_body(&result.content, "func_1_").unwrap();
            assert!(first_intrinsic < open || first_intrinsic > close, "{}", result.content);
            assert!(
                result.content.contains("%OptimizeFunctionOnNextCall(func_1_);")
                    || result.content.contains("%NeverOptimizeFunction(func_1_);"),
                "{}",
                result.content
            );
            assert!(result.validate().is_ok());
        }
    }

    #[test]
    fn engines_without_intrinsics_get_a_hot_loop() {
        let testcase = Testcase::analyze(FUNCTION);
        for seed in 0..10 {
            let mut fixture = Fixture::new(seed);
            fixture.intrinsics = EngineIntrinsics::none();
            let mut ctx = fixture.context();
            let mut copy = testcase.clone();
            assert_eq!(
                Mutation::OptimizeFunction.apply(&mut copy, &mut ctx).unwrap(),
                MutationResult::Mutated
            );
            assert!(copy.content.contains("for (let var_1_ = 0; var_1_ < "), "{}", copy.content);
            assert!(!copy.content.contains('%'));
            assert!(ctx.tags.contains(&MUTATION_OPTIMIZE_FUNCTION_HOT_LOOP));
        }
    }

    #[test]
    fn no_function_no_call() {
        let testcase = Testcase::analyze("var var_1_ = 1;");
        assert!(mutated_results(Mutation::OptimizeFunction, &testcase, 10).is_empty());
        assert!(mutated_results(Mutation::EnforceCallNode, &testcase, 10).is_empty());
    }

    #[test]
    fn calls_pass_one_argument_per_parameter() {
        let testcase = Testcase::analyze(FUNCTION);
        let results = mutated_results(Mutation::EnforceCallNode, &testcase, 20);
        assert_eq!(results.len(), 20);
        for result in results {
            let calls: Vec<&str> = result
                .lines()
                .into_iter()
                .filter(|line| line.contains("func_1_(") && !line.starts_with("function"))
                .collect();
            assert_eq!(calls.len(), 2, "{}", result.content);
            assert!(calls.iter().all(|call| !call.contains("func_1_()")), "{}", result.content);
        }
    }

    #[test]
    fn garbage_collection_uses_the_intrinsic() {
        let testcase = Testcase::analyze("a();");
        let results = mutated_results(Mutation::InsertGarbageCollection, &testcase, 5);
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|result| result.content.contains("gc();")));
    }

    #[test]
    fn builtin_methods_come_from_the_registry() {
        let testcase = Testcase::analyze("var var_1_ = [1];\nvar_1_;");
        let registry = crate::registry::TypeRegistry::builtin();
        let names: Vec<&str> = registry
            .methods(crate::types::JsType::Array)
            .iter()
            .map(|method| method.name)
            .collect();
        let results = mutated_results(Mutation::CallBuiltinMethod, &testcase, 20);
        assert_eq!(results.len(), 20);
        for result in results {
            let call = result
                .lines()
                .into_iter()
                .find(|line| line.starts_with("var_1_."))
                .map(str::to_string)
                .unwrap();
            let method = &call["var_1_.".len()..call.find('(').unwrap()];
            assert!(names.contains(&method), "{call}");
        }
    }
}
