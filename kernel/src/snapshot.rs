//! Snapshot: a deep-cloned, checksummed materialisation of run state at a point in the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifact::Artifact;
use crate::context::ContextManager;
use crate::event::types::SnapshotTrigger;
use crate::governor::Budgets;
use crate::task::{DagState, TaskQueue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub sequence_number: u64,
    pub queue: TaskQueue,
    pub dag: DagState,
    pub context: ContextManager,
    pub budgets: Budgets,
    pub artifacts: Vec<Artifact>,
    pub trigger: SnapshotTrigger,
    pub checksum: String,
}

impl Snapshot {
    /// `sequence_number` is the sequence of the prefix the snapshot represents — strictly
    /// before the `SNAPSHOT_CREATED` event that records it.
    pub fn capture(
        run_id: &str,
        sequence_number: u64,
        queue: TaskQueue,
        dag: DagState,
        context: ContextManager,
        budgets: Budgets,
        artifacts: Vec<Artifact>,
        trigger: SnapshotTrigger,
    ) -> Self {
        let id = crate::ids::generate_id("snapshot", run_id);
        let timestamp = Utc::now();

        #[derive(Serialize)]
        struct ChecksumInput<'a> {
            run_id: &'a str,
            sequence_number: u64,
            queue: &'a TaskQueue,
            dag: &'a DagState,
            context: &'a ContextManager,
            budgets: &'a Budgets,
            artifacts: &'a [Artifact],
            trigger: SnapshotTrigger,
        }
        let input = ChecksumInput {
            run_id,
            sequence_number,
            queue: &queue,
            dag: &dag,
            context: &context,
            budgets: &budgets,
            artifacts: &artifacts,
            trigger,
        };
        let bytes = serde_json::to_vec(&input).expect("snapshot contents are always serializable");
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let checksum = crate::ids::to_hex(&hasher.finalize());

        Self {
            id,
            run_id: run_id.to_string(),
            timestamp,
            sequence_number,
            queue,
            dag,
            context,
            budgets,
            artifacts,
            trigger,
            checksum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::DagState;

    fn empty_dag() -> DagState {
        DagState {
            nodes: Vec::new(),
            edges: Vec::new(),
            execution_order: Vec::new(),
            completed: Vec::new(),
            blocked: Vec::new(),
        }
    }

    #[test]
    fn capture_computes_a_stable_nonempty_checksum() {
        let snapshot = Snapshot::capture(
            "run-1",
            0,
            TaskQueue::new(),
            empty_dag(),
            ContextManager::new(),
            Budgets::default(),
            Vec::new(),
            SnapshotTrigger::Manual,
        );
        assert_eq!(snapshot.checksum.len(), 64);
        assert_eq!(snapshot.sequence_number, 0);
    }

    #[test]
    fn identical_state_produces_identical_checksum() {
        let a = Snapshot::capture(
            "run-1",
            3,
            TaskQueue::new(),
            empty_dag(),
            ContextManager::new(),
            Budgets::default(),
            Vec::new(),
            SnapshotTrigger::Periodic,
        );
        let b = Snapshot::capture(
            "run-1",
            3,
            TaskQueue::new(),
            empty_dag(),
            ContextManager::new(),
            Budgets::default(),
            Vec::new(),
            SnapshotTrigger::Periodic,
        );
        assert_eq!(a.checksum, b.checksum);
    }
}
