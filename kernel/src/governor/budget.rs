//! Budget counters: monotonic usage against a hard ceiling.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    WallTime,
    Tokens,
    ToolCalls,
    Iterations,
    RiskActions,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetCounter {
    pub max: u64,
    pub used: u64,
}

impl BudgetCounter {
    pub fn new(max: u64) -> Self {
        Self { max, used: 0 }
    }

    pub fn fraction(&self) -> f64 {
        if self.max == 0 {
            1.0
        } else {
            self.used as f64 / self.max as f64
        }
    }

    pub fn would_exceed(&self, delta: u64) -> bool {
        self.used.saturating_add(delta) > self.max
    }

    pub fn exhausted(&self) -> bool {
        self.used >= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budgets {
    pub wall_time_ms: BudgetCounter,
    pub output_tokens: BudgetCounter,
    pub tool_calls: BudgetCounter,
    pub iterations: BudgetCounter,
    pub risk_actions: BudgetCounter,
    pub warning_threshold: f64,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            wall_time_ms: BudgetCounter::new(3_600_000),
            output_tokens: BudgetCounter::new(100_000),
            tool_calls: BudgetCounter::new(500),
            iterations: BudgetCounter::new(1000),
            risk_actions: BudgetCounter::new(50),
            warning_threshold: 0.8,
        }
    }
}

impl Budgets {
    pub fn counter(&self, kind: BudgetKind) -> &BudgetCounter {
        match kind {
            BudgetKind::WallTime => &self.wall_time_ms,
            BudgetKind::Tokens => &self.output_tokens,
            BudgetKind::ToolCalls => &self.tool_calls,
            BudgetKind::Iterations => &self.iterations,
            BudgetKind::RiskActions => &self.risk_actions,
        }
    }

    pub fn counter_mut(&mut self, kind: BudgetKind) -> &mut BudgetCounter {
        match kind {
            BudgetKind::WallTime => &mut self.wall_time_ms,
            BudgetKind::Tokens => &mut self.output_tokens,
            BudgetKind::ToolCalls => &mut self.tool_calls,
            BudgetKind::Iterations => &mut self.iterations,
            BudgetKind::RiskActions => &mut self.risk_actions,
        }
    }

    pub fn max_fraction(&self) -> f64 {
        [
            self.wall_time_ms.fraction(),
            self.output_tokens.fraction(),
            self.tool_calls.fraction(),
            self.iterations.fraction(),
            self.risk_actions.fraction(),
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }

    pub fn any_exhausted(&self) -> bool {
        self.wall_time_ms.exhausted()
            || self.output_tokens.exhausted()
            || self.tool_calls.exhausted()
            || self.iterations.exhausted()
            || self.risk_actions.exhausted()
    }
}
