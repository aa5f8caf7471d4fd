//! TaskExecutor: the single-method capability the kernel dispatches task bodies to.

use async_trait::async_trait;

use crate::artifact::Artifact;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub output: String,
    pub tokens_used: u32,
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, thiserror::Error)]
#[error("task execution failed: {0}")]
pub struct ExecutionError(pub String);

/// Given a task and a context string, produce output or raise an error the kernel catches.
/// Must be deterministic for replay fidelity if deterministic replay is required.
#[async_trait]
pub trait TaskExecutor {
    async fn execute(&self, task: &Task, context: &str) -> Result<ExecutionOutput, ExecutionError>;
}

/// The kernel's default executor: a bounded, deterministic templated output referencing the
/// task title, prompt prefix, context length, and criterion count. Byte-stable across replays.
pub struct SimulatedExecutor;

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, task: &Task, context: &str) -> Result<ExecutionOutput, ExecutionError> {
        let prompt_prefix: String = task.prompt.chars().take(60).collect();
        let output = format!(
            "Simulated completion of '{}': addressed \"{prompt_prefix}\" using {} chars of context across {} criteria.",
            task.title,
            context.len(),
            task.acceptance_criteria.len(),
        );
        let tokens_used = (output.split_whitespace().count() as u32).max(1);
        Ok(ExecutionOutput {
            output,
            tokens_used,
            artifacts: Vec::new(),
        })
    }
}
