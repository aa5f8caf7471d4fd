//! Auditor: meta-checks over acceptance quality, cross-decision contradictions, and follow-up
//! discipline. Distinct from `ContextManager::detect_contradictions`, which checks new content
//! against pinned constraints rather than decisions against each other.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EventStore;
use crate::event::types::EventType;
use crate::ids::generate_id;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditType {
    Decision,
    Contradiction,
    Risk,
    Quality,
    Process,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub audit_type: AuditType,
    pub description: String,
    pub evidence: Option<String>,
    pub severity: AuditSeverity,
    pub resolved: bool,
    pub resolution: Option<String>,
}

impl AuditEntry {
    fn new(audit_type: AuditType, description: impl Into<String>, evidence: Option<String>, severity: AuditSeverity) -> Self {
        let description = description.into();
        Self {
            id: generate_id("audit", &description),
            timestamp: Utc::now(),
            audit_type,
            description,
            evidence,
            severity,
            resolved: false,
            resolution: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Auditor {
    pub entries: Vec<AuditEntry>,
}

impl Auditor {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, entry: AuditEntry, store: &mut EventStore) -> &AuditEntry {
        store.append(
            EventType::AuditNote,
            serde_json::json!({"audit_type": entry.audit_type, "severity": entry.severity, "description": entry.description}),
        );
        self.entries.push(entry);
        self.entries.last().unwrap()
    }

    /// If none of `passed_count` out of `total_criteria` passed yet the output is substantial
    /// (> 100 chars), the acceptance criteria likely don't actually constrain this task.
    pub fn check_acceptance_meaningful(&mut self, passed_count: u32, total_criteria: u32, output: &str, store: &mut EventStore) -> Option<&AuditEntry> {
        if passed_count == 0 && total_criteria > 0 && output.len() > 100 {
            let entry = AuditEntry::new(
                AuditType::Quality,
                format!("0 of {total_criteria} criteria passed despite a {}-char output", output.len()),
                Some(output.chars().take(200).collect()),
                AuditSeverity::Warning,
            );
            Some(self.record(entry, store))
        } else {
            None
        }
    }

    /// Pairwise scan: `current_decision` against each of `previous_decisions`. A conflict is one
    /// containing "should not" and the other "should" (not negated), applied to subjects whose
    /// word-level Jaccard similarity exceeds 0.7.
    pub fn check_contradiction(&mut self, previous_decisions: &[String], current_decision: &str, store: &mut EventStore) -> Vec<&AuditEntry> {
        let mut recorded_indices = Vec::new();
        for previous in previous_decisions {
            let prev_lower = previous.to_lowercase();
            let curr_lower = current_decision.to_lowercase();
            let prev_negated = prev_lower.contains("should not");
            let curr_negated = curr_lower.contains("should not");
            let prev_affirms = prev_lower.contains("should") && !prev_negated;
            let curr_affirms = curr_lower.contains("should") && !curr_negated;

            let opposed = (prev_negated && curr_affirms) || (curr_negated && prev_affirms);
            if !opposed {
                continue;
            }

            let similarity = jaccard_similarity(previous, current_decision);
            if similarity > 0.7 {
                let entry = AuditEntry::new(
                    AuditType::Contradiction,
                    format!("'{previous}' conflicts with '{current_decision}' (similarity {similarity:.2})"),
                    Some(current_decision.to_string()),
                    AuditSeverity::Warning,
                );
                self.record(entry, store);
                recorded_indices.push(self.entries.len() - 1);
            }
        }
        recorded_indices.into_iter().map(|idx| &self.entries[idx]).collect()
    }

    /// Record one `Contradiction` entry for a batch of conflicts surfaced by
    /// `ContextManager::detect_contradictions` against a task's own prompt.
    pub fn record_context_conflict(&mut self, conflicts: &[String], store: &mut EventStore) -> &AuditEntry {
        let entry = AuditEntry::new(
            AuditType::Contradiction,
            format!("{} constraint conflict(s) detected against task prompt", conflicts.len()),
            Some(conflicts.join("; ")),
            AuditSeverity::Warning,
        );
        self.record(entry, store)
    }

    /// If no queued task depends on `failed_task` and carries a `fix` tag or "fix" in its title,
    /// the failure has no remediation path queued up.
    pub fn check_follow_up_created(&mut self, failed_task: &Task, queued_tasks: &[Task], store: &mut EventStore) -> Option<&AuditEntry> {
        let has_follow_up = queued_tasks.iter().any(|t| {
            t.dependencies.contains(&failed_task.id) && (t.tags.contains("fix") || t.title.to_lowercase().contains("fix"))
        });
        if has_follow_up {
            return None;
        }
        let entry = AuditEntry::new(
            AuditType::Process,
            format!("failed task '{}' ({}) has no queued follow-up", failed_task.title, failed_task.id),
            None,
            AuditSeverity::Error,
        );
        Some(self.record(entry, store))
    }
}

fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = a.split_whitespace().map(|w| w.to_lowercase()).collect();
    let words_b: HashSet<String> = b.split_whitespace().map(|w| w.to_lowercase()).collect();
    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    if union == 0 { 0.0 } else { intersection as f64 / union as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{NewTask, TaskStatus};

    #[test]
    fn check_acceptance_meaningful_flags_zero_pass_long_output() {
        let mut auditor = Auditor::new();
        let mut store = EventStore::new("run-1");
        let long_output = "x".repeat(150);
        let entry = auditor.check_acceptance_meaningful(0, 3, &long_output, &mut store);
        assert!(entry.is_some());
    }

    #[test]
    fn check_acceptance_meaningful_silent_when_some_passed() {
        let mut auditor = Auditor::new();
        let mut store = EventStore::new("run-1");
        let long_output = "x".repeat(150);
        let entry = auditor.check_acceptance_meaningful(1, 3, &long_output, &mut store);
        assert!(entry.is_none());
    }

    #[test]
    fn check_contradiction_flags_opposed_similar_sentences() {
        let mut auditor = Auditor::new();
        let mut store = EventStore::new("run-1");
        let previous = vec!["The API should return JSON responses".to_string()];
        let entries = auditor.check_contradiction(&previous, "The API should not return JSON responses", &mut store);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn check_contradiction_silent_on_unrelated_sentences() {
        let mut auditor = Auditor::new();
        let mut store = EventStore::new("run-1");
        let previous = vec!["The API should return JSON responses".to_string()];
        let entries = auditor.check_contradiction(&previous, "Coffee should not be served cold", &mut store);
        assert!(entries.is_empty());
    }

    #[test]
    fn check_follow_up_created_flags_missing_fix_task() {
        let mut auditor = Auditor::new();
        let mut store = EventStore::new("run-1");
        let failed = Task::from_new(
            NewTask {
                title: "Write docs".into(),
                ..Default::default()
            },
            TaskStatus::Failed,
        );
        let entry = auditor.check_follow_up_created(&failed, &[], &mut store);
        assert!(entry.is_some());
    }

    #[test]
    fn check_follow_up_created_silent_when_fix_task_queued() {
        let mut auditor = Auditor::new();
        let mut store = EventStore::new("run-1");
        let failed = Task::from_new(
            NewTask {
                title: "Write docs".into(),
                ..Default::default()
            },
            TaskStatus::Failed,
        );
        let mut fix_spec = NewTask {
            title: "Fix: Write docs".into(),
            dependencies: vec![failed.id.clone()],
            ..Default::default()
        };
        fix_spec.tags.insert("fix".to_string());
        let fix = Task::from_new(fix_spec, TaskStatus::Queued);

        let entry = auditor.check_follow_up_created(&failed, &[fix], &mut store);
        assert!(entry.is_none());
    }
}
