//! Task domain types: status, acceptance criteria, history, results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::ids::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Active,
    Blocked,
    Done,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed | TaskStatus::Canceled)
    }
}

/// The closed set of acceptance-criterion kinds the Verifier understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    Schema,
    Contains,
    NotContains,
    WordLimit,
    Lint,
    Test,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub id: String,
    pub kind: CriterionKind,
    pub description: String,
    pub config: serde_json::Value,
    pub passed: Option<bool>,
    pub evidence: Option<String>,
}

impl AcceptanceCriterion {
    pub fn new(kind: CriterionKind, description: impl Into<String>, config: serde_json::Value) -> Self {
        let description = description.into();
        Self {
            id: generate_id("criterion", &description),
            kind,
            description,
            config,
            passed: None,
            evidence: None,
        }
    }
}

/// The outcome of evaluating one acceptance criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub criterion_id: String,
    pub passed: bool,
    pub message: String,
    pub evidence: Option<String>,
}

/// One entry in a task's field-transition history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub field: String,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub reason: String,
}

/// The outcome of running a task's body through a `TaskExecutor` and the Verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub output: String,
    pub artifact_ids: Vec<String>,
    pub verification_results: Vec<VerificationResult>,
    pub tokens_used: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub prompt: String,
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    pub dependencies: Vec<String>,
    pub priority: u8,
    pub status: TaskStatus,
    pub context_refs: Vec<String>,
    pub history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub parent_id: Option<String>,
    pub subtask_ids: Vec<String>,
    pub tags: BTreeSet<String>,
    pub estimated_tokens: u32,
    pub actual_tokens: u32,
}

/// Parameters accepted by `TaskQueue::add_task`.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub prompt: String,
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    pub dependencies: Vec<String>,
    pub priority: Option<u8>,
    pub context_refs: Vec<String>,
    pub tags: BTreeSet<String>,
    pub parent: Option<String>,
    pub estimated_tokens: u32,
}

impl Task {
    pub fn from_new(new: NewTask, status: TaskStatus) -> Self {
        let now = Utc::now();
        let id = generate_id("task", &new.title);
        Self {
            id,
            title: new.title,
            prompt: new.prompt,
            acceptance_criteria: new.acceptance_criteria,
            dependencies: new.dependencies,
            priority: new.priority.unwrap_or(50),
            status,
            context_refs: new.context_refs,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            retry_count: 0,
            max_retries: 3,
            parent_id: new.parent,
            subtask_ids: Vec::new(),
            tags: new.tags,
            estimated_tokens: new.estimated_tokens,
            actual_tokens: 0,
        }
    }

    pub fn is_ready(&self, done_ids: &std::collections::HashSet<String>) -> bool {
        self.dependencies.iter().all(|dep| done_ids.contains(dep))
    }

    pub fn record_history(&mut self, field: &str, old_value: serde_json::Value, new_value: serde_json::Value, reason: &str) {
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            field: field.to_string(),
            old_value,
            new_value,
            reason: reason.to_string(),
        });
        self.updated_at = Utc::now();
    }
}

/// Free-form config maps stored per indexed field, used by the snapshot/DAG accounting.
pub type Tags = HashMap<String, serde_json::Value>;
