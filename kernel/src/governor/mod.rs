//! AutonomyGovernor: budget accounting, STOP semantics, risk-gated approval, mode switching.

mod budget;
mod policy;

pub use budget::{BudgetCounter, BudgetKind, Budgets};
pub use policy::{Mode, PendingApproval, PermissionDecision, RiskPolicy};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::event::EventStore;
use crate::event::types::EventType;
use crate::ids::generate_id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomyGovernor {
    pub budgets: Budgets,
    pub mode: Mode,
    pub risk_policy: RiskPolicy,
    pub stopped: bool,
    pub stop_reason: Option<String>,
    pub pending_approvals: Vec<PendingApproval>,
    #[serde(skip, default = "Utc::now")]
    start_time: chrono::DateTime<Utc>,
}

impl Default for AutonomyGovernor {
    fn default() -> Self {
        Self {
            budgets: Budgets::default(),
            mode: Mode::default(),
            risk_policy: RiskPolicy::default(),
            stopped: false,
            stop_reason: None,
            pending_approvals: Vec::new(),
            start_time: Utc::now(),
        }
    }
}

impl AutonomyGovernor {
    pub fn new(budgets: Budgets, mode: Mode, risk_policy: RiskPolicy) -> Self {
        Self {
            budgets,
            mode,
            risk_policy,
            stopped: false,
            stop_reason: None,
            pending_approvals: Vec::new(),
            start_time: Utc::now(),
        }
    }

    /// Reset the wall-clock start time, used when resuming from a replayed bundle so that
    /// `used_wall_time` at the point of replay is preserved rather than restarted from zero.
    pub fn reset_start_time(&mut self) {
        self.start_time = Utc::now();
    }

    fn consume(&mut self, kind: BudgetKind, delta: u64, store: &mut EventStore) -> bool {
        if self.stopped {
            return false;
        }
        let counter = self.budgets.counter(kind);
        if counter.would_exceed(delta) {
            let (used, max) = (counter.used, counter.max);
            store.append(EventType::BudgetExhausted, serde_json::json!({"kind": kind, "used": used, "max": max}));
            self.request_stop(&format!("Budget exhausted: {kind:?}"), store);
            return false;
        }
        self.budgets.counter_mut(kind).used += delta;
        store.append(EventType::BudgetTick, serde_json::json!({"max_fraction": self.budgets.max_fraction()}));
        true
    }

    pub fn consume_tokens(&mut self, n: u64, store: &mut EventStore) -> bool {
        self.consume(BudgetKind::Tokens, n, store)
    }

    pub fn consume_tool_call(&mut self, store: &mut EventStore) -> bool {
        self.consume(BudgetKind::ToolCalls, 1, store)
    }

    pub fn consume_iteration(&mut self, store: &mut EventStore) -> bool {
        self.consume(BudgetKind::Iterations, 1, store)
    }

    pub fn consume_risk_action(&mut self, store: &mut EventStore) -> bool {
        self.consume(BudgetKind::RiskActions, 1, store)
    }

    /// Called once per loop iteration; sets `used` to wall-clock elapsed since start and
    /// applies the same exceed-then-stop logic as the delta-based consumers.
    pub fn check_wall_time(&mut self, store: &mut EventStore) -> bool {
        if self.stopped {
            return false;
        }
        let elapsed_ms = (Utc::now() - self.start_time).num_milliseconds().max(0) as u64;
        self.budgets.wall_time_ms.used = elapsed_ms;
        if self.budgets.wall_time_ms.used > self.budgets.wall_time_ms.max {
            let (used, max) = (self.budgets.wall_time_ms.used, self.budgets.wall_time_ms.max);
            store.append(EventType::BudgetExhausted, serde_json::json!({"kind": BudgetKind::WallTime, "used": used, "max": max}));
            self.request_stop("Budget exhausted: WallTime", store);
            return false;
        }
        true
    }

    pub fn request_stop(&mut self, reason: &str, store: &mut EventStore) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.stop_reason = Some(reason.to_string());
        store.append(
            EventType::StopRequested,
            serde_json::json!({"reason": reason, "budgets": self.budgets}),
        );
    }

    pub fn set_mode(&mut self, mode: Mode, store: &mut EventStore) {
        let old = self.mode;
        self.mode = mode;
        store.append(EventType::ContextUpdated, serde_json::json!({"mode_change": {"from": old, "to": mode}}));
    }

    /// `(can_proceed, reason_if_not)`.
    pub fn can_proceed(&self) -> (bool, Option<String>) {
        if self.stopped {
            return (false, self.stop_reason.clone());
        }
        if self.budgets.wall_time_ms.exhausted() {
            return (false, Some("Wall time exhausted".to_string()));
        }
        if self.budgets.any_exhausted() {
            return (false, Some("Budget exhausted".to_string()));
        }
        (true, None)
    }

    pub fn should_checkpoint(&self) -> bool {
        self.stopped || self.budgets.max_fraction() >= self.budgets.warning_threshold
    }

    pub fn check_action_permission(&mut self, action_type: &str, risk: f64, description: &str) -> PermissionDecision {
        if self.risk_policy.blocked_tools.iter().any(|t| t == action_type) {
            return PermissionDecision::Deny;
        }
        if risk > self.risk_policy.max_risk_per_action {
            return PermissionDecision::Deny;
        }
        if self.mode == Mode::Autonomous && risk <= self.risk_policy.auto_approve_below_risk {
            return PermissionDecision::Allow;
        }
        if self.risk_policy.requires_approval(action_type) || self.mode == Mode::Manual {
            let id = generate_id("approval", description);
            self.pending_approvals.push(PendingApproval {
                id: id.clone(),
                action: action_type.to_string(),
                risk_level: risk,
            });
            return PermissionDecision::RequiresApproval(id);
        }
        if self.mode == Mode::Supervised {
            return PermissionDecision::Allow;
        }
        PermissionDecision::Allow
    }

    pub fn pending_approvals(&self) -> &[PendingApproval] {
        &self.pending_approvals
    }

    pub fn approve_action(&mut self, id: &str, approved: bool) -> Option<bool> {
        let idx = self.pending_approvals.iter().position(|a| a.id == id)?;
        self.pending_approvals.remove(idx);
        Some(approved)
    }
}
