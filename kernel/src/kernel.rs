//! Kernel: owns every component for one run and drives the single-threaded cooperative loop.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifact::Artifact;
use crate::context::{ContextManager, ItemKind, TierName};
use crate::context::ContextItem;
use crate::event::types::{Event, ErrorKind, EventType, SnapshotTrigger};
use crate::event::{EventBundle, EventStore};
use crate::executor::{SimulatedExecutor, TaskExecutor};
use crate::governor::{AutonomyGovernor, Budgets, Mode, RiskPolicy};
use crate::ids::generate_id;
use crate::snapshot::Snapshot;
use crate::task::{NewTask, Task, TaskQueue, TaskResult, TaskStatus};
use crate::verify::{Auditor, Verifier, generate_fix_task};

/// Run-scoped configuration: identity, mode, budgets, and policy for one kernel instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: String,
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub mode: Mode,
    pub budgets: Budgets,
    pub checkpoint_interval: u32,
    pub risk_policy: RiskPolicy,
    pub created_at: DateTime<Utc>,
}

impl RunConfig {
    pub fn new(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        let project_id = project_id.into();
        let name = name.into();
        Self {
            run_id: generate_id("run", &name),
            project_id,
            name,
            description: String::new(),
            mode: Mode::default(),
            budgets: Budgets::default(),
            checkpoint_interval: 5,
            risk_policy: RiskPolicy::default(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Initializing,
    Running,
    Paused,
    Stopped,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub current_task_id: Option<String>,
    pub iteration: u32,
    pub stop_reason: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            status: RunStatus::Initializing,
            current_task_id: None,
            iteration: 0,
            stop_reason: None,
        }
    }
}

/// The persisted record produced by `Kernel::export_bundle` / consumed by `Kernel::from_bundle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub config: RunConfig,
    pub run_id: String,
    pub events: Vec<Event>,
    pub snapshots: Vec<Snapshot>,
    pub exported_at: DateTime<Utc>,
    pub final_snapshot: Snapshot,
}

pub struct Kernel {
    pub config: RunConfig,
    pub state: RunState,
    pub store: EventStore,
    pub queue: TaskQueue,
    pub context: ContextManager,
    pub governor: AutonomyGovernor,
    pub auditor: Auditor,
    pub artifacts: HashMap<String, Artifact>,
    executor: Box<dyn TaskExecutor>,
    actions_since_checkpoint: u32,
    checkpoint_callback: Option<Box<dyn FnMut(&Snapshot)>>,
}

impl Kernel {
    pub fn new(config: RunConfig, executor: Box<dyn TaskExecutor>) -> Self {
        let governor = AutonomyGovernor::new(config.budgets, config.mode, config.risk_policy.clone());
        let store = EventStore::new(&config.run_id);
        Self {
            config,
            state: RunState::default(),
            store,
            queue: TaskQueue::new(),
            context: ContextManager::new(),
            governor,
            auditor: Auditor::new(),
            artifacts: HashMap::new(),
            executor,
            actions_since_checkpoint: 0,
            checkpoint_callback: None,
        }
    }

    pub fn with_default_executor(config: RunConfig) -> Self {
        Self::new(config, Box::new(SimulatedExecutor))
    }

    pub fn on_checkpoint(&mut self, callback: Box<dyn FnMut(&Snapshot)>) {
        self.checkpoint_callback = Some(callback);
    }

    pub async fn start(&mut self) {
        self.store.append(EventType::RunStarted, serde_json::json!({"run_id": self.config.run_id}));
        self.state.status = RunStatus::Running;
        info!(run_id = %self.config.run_id, "kernel run started");
        self.run_loop().await;
    }

    async fn run_loop(&mut self) {
        loop {
            self.governor.check_wall_time(&mut self.store);
            let (can_proceed, reason) = self.governor.can_proceed();
            if !can_proceed {
                self.stop(reason.unwrap_or_else(|| "Stopped".to_string()));
                break;
            }

            let next_task_id = self.queue.next_task().map(|t| t.id.clone());
            let Some(task_id) = next_task_id else {
                let stats = self.queue.stats();
                if stats.active == 0 && stats.blocked == 0 {
                    self.store.append(EventType::RunCompleted, serde_json::json!({"stats": stats}));
                    self.state.status = RunStatus::Completed;
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                continue;
            };

            self.execute_task(&task_id).await;
            self.state.iteration += 1;
            self.actions_since_checkpoint += 1;

            if self.actions_since_checkpoint >= self.config.checkpoint_interval || self.governor.should_checkpoint() {
                self.create_checkpoint(SnapshotTrigger::Periodic);
                self.actions_since_checkpoint = 0;
            }

            if !self.governor.consume_iteration(&mut self.store) {
                self.stop("Iteration budget exhausted".to_string());
                break;
            }
        }
    }

    async fn execute_task(&mut self, task_id: &str) {
        let start = Instant::now();
        self.queue.set_task_status(task_id, TaskStatus::Active, "Task started", &mut self.store);
        self.state.current_task_id = Some(task_id.to_string());
        self.store.append(
            EventType::PlanCreated,
            serde_json::json!({"task_id": task_id, "steps": ["select_context", "execute", "verify", "audit"]}),
        );

        let Some(task) = self.queue.get(task_id).cloned() else {
            debug!(task_id, "execute_task: task vanished before dispatch");
            return;
        };

        let context_items = self.context.select_context(&task.prompt, 4000);
        let context_str: String = context_items.iter().map(|i| i.content.clone()).collect::<Vec<_>>().join("\n\n---\n\n");

        let conflicts = self.context.detect_contradictions(&task.prompt, &mut self.store);
        if !conflicts.is_empty() {
            self.auditor.record_context_conflict(&conflicts, &mut self.store);
        }

        let execution = match self.executor.execute(&task, &context_str).await {
            Ok(output) => output,
            Err(err) => {
                self.store.append(
                    EventType::ErrorRaised,
                    serde_json::json!({"kind": ErrorKind::ExecutionError, "task_id": task_id, "message": err.0}),
                );
                self.queue.mark_task_failed(task_id, &err.0, &mut self.store);
                return;
            }
        };

        self.store.append(
            EventType::ActionExecuted,
            serde_json::json!({"task_id": task_id, "tokens_used": execution.tokens_used, "output_len": execution.output.len()}),
        );
        if !self.governor.consume_tokens(execution.tokens_used as u64, &mut self.store) {
            self.stop("Token budget exhausted".to_string());
            return;
        }

        for artifact in &execution.artifacts {
            self.artifacts.insert(artifact.id.clone(), artifact.clone());
        }
        let artifact_ids: Vec<String> = execution.artifacts.iter().map(|a| a.id.clone()).collect();

        let verified = Verifier::verify_all(&task.acceptance_criteria, &execution.output, &execution.artifacts, &mut self.store);
        let duration_ms = start.elapsed().as_millis() as u64;

        if verified.all_passed {
            let passed_count = verified.results.iter().filter(|r| r.passed).count() as u32;
            self.auditor
                .check_acceptance_meaningful(passed_count, task.acceptance_criteria.len() as u32, &execution.output, &mut self.store);

            let result = TaskResult {
                success: true,
                output: execution.output.clone(),
                artifact_ids,
                verification_results: verified.results,
                tokens_used: execution.tokens_used,
                duration_ms,
            };
            self.queue.mark_task_done(task_id, result, &mut self.store);

            let summary: String = execution.output.chars().take(500).collect();
            let item = ContextItem::new(summary, ItemKind::Summary, task_id, 40);
            self.context.add_item(TierName::Working, item, &mut self.store);
        } else {
            let fix_spec = generate_fix_task(&task, &verified.results.iter().filter(|r| !r.passed).cloned().collect::<Vec<_>>());
            self.queue.add_task(fix_spec, &mut self.store);

            self.queue.set_task_status(task_id, TaskStatus::Failed, "Verification failed", &mut self.store);

            let failed_task = self.queue.get(task_id).cloned().unwrap();
            let queued = self.queue.tasks_with_status(TaskStatus::Queued);
            self.auditor.check_follow_up_created(&failed_task, &queued, &mut self.store);
        }
    }

    /// Materialises a Snapshot via the EventStore, then summarises context; fires the external
    /// observer callback if one is registered.
    pub fn create_checkpoint(&mut self, trigger: SnapshotTrigger) {
        let dag = self.queue.get_dag_state();
        let artifacts: Vec<Artifact> = self.artifacts.values().cloned().collect();
        self.store.create_snapshot(&self.queue, dag, &self.context, &self.governor.budgets, &artifacts, trigger);
        self.context.summarize_context(self.actions_since_checkpoint, &mut self.store);
        if let Some(callback) = self.checkpoint_callback.as_mut() {
            callback(self.store.snapshots().last().unwrap());
        }
    }

    /// governor.requestStop; one final snapshot with trigger=stop; RUN_STOPPED emitted last.
    /// Returns the stop snapshot.
    pub fn stop(&mut self, reason: String) -> Snapshot {
        self.governor.request_stop(&reason, &mut self.store);
        self.create_checkpoint(SnapshotTrigger::Stop);
        self.state.status = RunStatus::Stopped;
        self.state.stop_reason = Some(reason.clone());
        self.store.append(EventType::RunStopped, serde_json::json!({"reason": reason}));
        self.store.snapshots().last().unwrap().clone()
    }

    /// Executes exactly one task; intended for manual mode. Returns false if the queue is empty.
    pub async fn step(&mut self) -> bool {
        let Some(task_id) = self.queue.next_task().map(|t| t.id.clone()) else {
            return false;
        };
        self.execute_task(&task_id).await;
        true
    }

    pub fn export_bundle(&mut self) -> Bundle {
        let dag = self.queue.get_dag_state();
        let artifacts: Vec<Artifact> = self.artifacts.values().cloned().collect();
        let final_snapshot = self
            .store
            .create_snapshot(&self.queue, dag, &self.context, &self.governor.budgets, &artifacts, SnapshotTrigger::Manual)
            .clone();
        let EventBundle { run_id, events, snapshots, exported_at } = self.store.export_bundle();
        Bundle {
            config: self.config.clone(),
            run_id,
            events,
            snapshots,
            exported_at,
            final_snapshot,
        }
    }

    /// Constructs a fresh kernel from config, restoring queue/context/budgets from the final
    /// snapshot, restoring artifacts, and resetting start time so `used_wall_time` is preserved.
    pub fn from_bundle(bundle: Bundle, executor: Box<dyn TaskExecutor>) -> Self {
        let event_bundle = EventBundle {
            run_id: bundle.run_id,
            events: bundle.events,
            snapshots: bundle.snapshots,
            exported_at: bundle.exported_at,
        };
        let store = EventStore::from_bundle(event_bundle);
        let snapshot = bundle.final_snapshot;

        let mut governor = AutonomyGovernor::new(snapshot.budgets, bundle.config.mode, bundle.config.risk_policy.clone());
        governor.reset_start_time();

        let artifacts = snapshot.artifacts.iter().map(|a| (a.id.clone(), a.clone())).collect();

        Self {
            config: bundle.config,
            state: RunState::default(),
            store,
            queue: snapshot.queue,
            context: snapshot.context,
            governor,
            auditor: Auditor::new(),
            artifacts,
            executor,
            actions_since_checkpoint: 0,
            checkpoint_callback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::NewTask;

    fn config() -> RunConfig {
        let mut cfg = RunConfig::new("proj-1", "test run");
        cfg.checkpoint_interval = 100;
        cfg.mode = Mode::Autonomous;
        cfg
    }

    #[tokio::test]
    async fn start_runs_to_completion_with_no_tasks() {
        let mut kernel = Kernel::with_default_executor(config());
        kernel.start().await;
        assert_eq!(kernel.state.status, RunStatus::Completed);
        assert!(kernel.store.query(Some(&[EventType::RunCompleted]), None, None, None).len() == 1);
    }

    #[tokio::test]
    async fn executing_a_passing_task_marks_it_done() {
        let mut kernel = Kernel::with_default_executor(config());
        kernel.queue.add_task(
            NewTask {
                title: "Say hello".into(),
                prompt: "Say hello to the user".into(),
                ..Default::default()
            },
            &mut kernel.store,
        );
        kernel.start().await;
        let stats = kernel.queue.stats();
        assert_eq!(stats.done, 1);
        assert_eq!(kernel.state.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn failing_verification_spawns_a_fix_task() {
        let mut kernel = Kernel::with_default_executor(config());
        let mut spec = NewTask {
            title: "Structured output".into(),
            prompt: "produce structured data".into(),
            ..Default::default()
        };
        spec.acceptance_criteria.push(crate::task::AcceptanceCriterion::new(
            crate::task::CriterionKind::Schema,
            "must be an object with a name",
            serde_json::json!({"type": "object", "required": ["name"]}),
        ));
        kernel.queue.add_task(spec, &mut kernel.store);
        kernel.start().await;

        let stats = kernel.queue.stats();
        assert_eq!(stats.failed, 1);
        assert!(kernel.queue.tasks_with_status(TaskStatus::Queued).iter().any(|t| t.tags.contains("fix")));
    }

    #[tokio::test]
    async fn stop_emits_run_stopped_last() {
        let mut kernel = Kernel::with_default_executor(config());
        kernel.stop("manual stop".to_string());
        let types: Vec<EventType> = kernel.store.events().iter().map(|e| e.event_type).collect();
        assert_eq!(*types.last().unwrap(), EventType::RunStopped);
        assert!(types.contains(&EventType::StopRequested));
    }

    #[tokio::test]
    async fn stop_returns_the_snapshot_it_just_created() {
        let mut kernel = Kernel::with_default_executor(config());
        let snapshot = kernel.stop("manual stop".to_string());
        assert_eq!(snapshot.trigger, SnapshotTrigger::Stop);
        assert_eq!(snapshot.checksum, kernel.store.snapshots().last().unwrap().checksum);
    }

    #[tokio::test]
    async fn export_then_from_bundle_preserves_queue_state() {
        let mut kernel = Kernel::with_default_executor(config());
        kernel.queue.add_task(
            NewTask {
                title: "Task A".into(),
                prompt: "do thing A".into(),
                ..Default::default()
            },
            &mut kernel.store,
        );
        kernel.start().await;

        let bundle = kernel.export_bundle();
        let expected_queue = bundle.final_snapshot.queue.clone();
        let expected_budgets = bundle.final_snapshot.budgets;

        let restored = Kernel::from_bundle(bundle, Box::new(SimulatedExecutor));
        assert_eq!(restored.queue, expected_queue);
        assert_eq!(restored.governor.budgets, expected_budgets);
    }
}
