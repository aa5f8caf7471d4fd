//! Declarative test specification: the shape a seed test (or a future user-authored test) fills in.

use crate::event::types::EventType;
use crate::governor::Budgets;
use crate::task::{NewTask, TaskUpdate};

#[derive(Debug, Clone, PartialEq)]
pub enum InjectionTrigger {
    ActionCount(u32),
    TimeElapsed(u64),
    /// Matched by task *title* rather than id: ids are randomly prefixed at `add_task` time,
    /// so a declarative spec can only name a task the way a human would.
    TaskCompleted(String),
    EventType(EventType),
}

/// One scripted perturbation fired once its trigger condition is first observed true.
/// `ModifyTask`/`CancelTask` target tasks by title, resolved against the live queue at apply time.
#[derive(Debug, Clone)]
pub enum Injection {
    AddTask { trigger: InjectionTrigger, spec: NewTask },
    ModifyTask { trigger: InjectionTrigger, title: String, update: TaskUpdate },
    CancelTask { trigger: InjectionTrigger, title: String },
    AddConstraint { trigger: InjectionTrigger, content: String, priority: u8 },
    TriggerStop { trigger: InjectionTrigger, reason: String },
}

impl Injection {
    pub fn trigger(&self) -> &InjectionTrigger {
        match self {
            Injection::AddTask { trigger, .. }
            | Injection::ModifyTask { trigger, .. }
            | Injection::CancelTask { trigger, .. }
            | Injection::AddConstraint { trigger, .. }
            | Injection::TriggerStop { trigger, .. } => trigger,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvaluationKind {
    Deterministic,
    Rubric,
}

#[derive(Debug, Clone)]
pub struct RubricCriterion {
    pub description: String,
    pub points: f64,
    pub evaluation: EvaluationKind,
}

impl RubricCriterion {
    pub fn deterministic(description: impl Into<String>, points: f64) -> Self {
        Self {
            description: description.into(),
            points,
            evaluation: EvaluationKind::Deterministic,
        }
    }

    pub fn rubric(description: impl Into<String>, points: f64) -> Self {
        Self {
            description: description.into(),
            points,
            evaluation: EvaluationKind::Rubric,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RubricCategory {
    pub name: String,
    pub weight: f64,
    pub criteria: Vec<RubricCriterion>,
}

/// A declarative scenario: seed data, scripted injections, and a pass/fail + scoring rubric.
#[derive(Debug, Clone)]
pub struct TestSpec {
    pub id: String,
    pub category: String,
    pub difficulty: u8,
    pub description: String,
    pub initial_pinned: Vec<(String, u8)>,
    pub initial_working: Vec<(String, u8)>,
    pub initial_tasks: Vec<NewTask>,
    pub injections: Vec<Injection>,
    pub budgets: Budgets,
    pub must_do: Vec<String>,
    pub must_not_do: Vec<String>,
    pub rubric: Vec<RubricCategory>,
}
