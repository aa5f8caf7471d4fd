//! TestHarness: declarative scenarios driven against a real `Kernel`, scored against a rubric.

mod runner;
mod seeds;
mod spec;

pub use runner::{run_test, TestResult};
pub use seeds::{all_seed_tests, seed_test};
pub use spec::{EvaluationKind, Injection, InjectionTrigger, RubricCategory, RubricCriterion, TestSpec};
