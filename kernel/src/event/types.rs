//! Event and related closed-enumeration types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of event types the kernel can append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RunStarted,
    RunStopped,
    RunCompleted,
    PlanCreated,
    ActionExecuted,
    ToolCalled,
    ToolResult,
    VerificationRun,
    VerificationPassed,
    VerificationFailed,
    AuditNote,
    CheckpointCreated,
    QueueMutation,
    SnapshotCreated,
    BudgetTick,
    BudgetExhausted,
    ErrorRaised,
    ContextUpdated,
    ContradictionDetected,
    StopRequested,
}

/// Payload kinds carried inside an `ErrorRaised` event. Distinct from [`crate::error::KernelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CircularDependency,
    ContextOverflow,
    ExecutionError,
    Crash,
    SubscriberError,
}

/// What caused a snapshot to be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotTrigger {
    Periodic,
    Checkpoint,
    Stop,
    BudgetWarning,
    Manual,
}

/// One immutable, hash-linked entry in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub hash_prev: String,
    pub hash_self: String,
    pub sequence_number: u64,
}

/// The fixed sentinel that seeds the chain for sequence number 0.
pub const CHAIN_SENTINEL: &str = "00000000";

/// A read-side, non-persisted human summary of an event.
pub fn summarize_event(event: &Event) -> String {
    format!(
        "[{}] #{} {:?}: {}",
        event.timestamp.to_rfc3339(),
        event.sequence_number,
        event.event_type,
        event.payload
    )
}
