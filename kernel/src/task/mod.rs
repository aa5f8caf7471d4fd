//! Task queue: CRUD, dependency DAG, blocking, split/merge, prioritised selection.

mod queue;
mod types;

pub use queue::{DagEdge, DagEdgeType, DagNode, DagState, QueueStats, TaskQueue, TaskUpdate};
pub use types::{
    AcceptanceCriterion, CriterionKind, HistoryEntry, NewTask, Task, TaskResult, TaskStatus, VerificationResult,
};
