//! The 12 named seed tests from the harness's built-in scenario catalogue.

use crate::governor::{BudgetCounter, Budgets};
use crate::task::{AcceptanceCriterion, CriterionKind, NewTask, TaskUpdate};

use super::spec::{Injection, InjectionTrigger, RubricCategory, RubricCriterion, TestSpec};

fn task(title: &str, priority: u8) -> NewTask {
    NewTask {
        title: title.to_string(),
        prompt: format!("Work on: {title}"),
        priority: Some(priority),
        ..Default::default()
    }
}

pub fn queue_reprioritization() -> TestSpec {
    TestSpec {
        id: "queue-reprioritization".to_string(),
        category: "scheduling".to_string(),
        difficulty: 2,
        description: "A low-priority task is bumped to the top mid-run and should run first.".to_string(),
        initial_pinned: Vec::new(),
        initial_working: Vec::new(),
        initial_tasks: vec![task("task-low", 20), task("task-medium", 50), task("task-high", 80)],
        injections: vec![Injection::ModifyTask {
            trigger: InjectionTrigger::ActionCount(1),
            title: "task-low".to_string(),
            update: TaskUpdate {
                priority: Some(100),
                ..Default::default()
            },
        }],
        budgets: Budgets::default(),
        must_do: vec!["complete all tasks".to_string()],
        must_not_do: Vec::new(),
        rubric: vec![RubricCategory {
            name: "ordering".to_string(),
            weight: 1.0,
            criteria: vec![
                RubricCriterion::deterministic("complete all tasks", 5.0),
                RubricCriterion::rubric("task-high executes before the reprioritized task-low, which executes before task-medium", 10.0),
            ],
        }],
    }
}

pub fn context_overload() -> TestSpec {
    let initial_working: Vec<(String, u8)> = (0..20)
        .map(|i| (format!("memory entry number {i} about an unrelated historical fact"), (i % 5) as u8 * 10 + 10))
        .collect();
    TestSpec {
        id: "context-overload".to_string(),
        category: "context-management".to_string(),
        difficulty: 3,
        description: "The working tier starts near capacity; admitting a relevant item must evict low-priority filler, never a constraint.".to_string(),
        initial_pinned: vec![("Must not reveal internal reasoning".to_string(), 100)],
        initial_working,
        initial_tasks: vec![task("summarize recent memory", 60)],
        injections: Vec::new(),
        budgets: Budgets::default(),
        must_do: vec!["complete all tasks".to_string()],
        must_not_do: Vec::new(),
        rubric: vec![RubricCategory {
            name: "eviction-discipline".to_string(),
            weight: 1.0,
            criteria: vec![
                RubricCriterion::deterministic("complete all tasks", 5.0),
                RubricCriterion::rubric("the pinned constraint is never evicted despite repeated admission pressure", 10.0),
            ],
        }],
    }
}

pub fn verification_first() -> TestSpec {
    let mut spec = task("produce a structured profile", 50);
    spec.acceptance_criteria.push(AcceptanceCriterion::new(
        CriterionKind::Schema,
        "must be JSON with name (string) and age (number)",
        serde_json::json!({"type": "object", "required": ["name", "age"]}),
    ));
    TestSpec {
        id: "verification-first".to_string(),
        category: "verification".to_string(),
        difficulty: 2,
        description: "The simulated executor produces prose, not JSON, so schema verification must fail and a fix task must follow.".to_string(),
        initial_pinned: Vec::new(),
        initial_working: Vec::new(),
        initial_tasks: vec![spec],
        injections: Vec::new(),
        budgets: Budgets::default(),
        must_do: vec!["schema validation".to_string(), "create fix task".to_string()],
        must_not_do: Vec::new(),
        rubric: vec![RubricCategory {
            name: "fix-synthesis".to_string(),
            weight: 1.0,
            criteria: vec![
                RubricCriterion::deterministic("schema validation", 5.0),
                RubricCriterion::deterministic("create fix task", 10.0),
            ],
        }],
    }
}

pub fn stop_interrupt() -> TestSpec {
    TestSpec {
        id: "stop-interrupt".to_string(),
        category: "control".to_string(),
        difficulty: 2,
        description: "A stop is injected after the third action; the loop must halt promptly without corrupting the queue.".to_string(),
        initial_pinned: Vec::new(),
        initial_working: Vec::new(),
        initial_tasks: (1..=10).map(|i| task(&format!("task-{i}"), 50)).collect(),
        injections: vec![Injection::TriggerStop {
            trigger: InjectionTrigger::ActionCount(3),
            reason: "scenario stop".to_string(),
        }],
        budgets: Budgets::default(),
        must_do: vec!["stop immediately".to_string()],
        must_not_do: vec!["continue after stop".to_string()],
        rubric: vec![RubricCategory {
            name: "stop-bound".to_string(),
            weight: 1.0,
            criteria: vec![
                RubricCriterion::deterministic("stop immediately", 10.0),
                RubricCriterion::rubric("at least 6 tasks remain preserved in the queue after the stop", 5.0),
            ],
        }],
    }
}

pub fn budget_tokens() -> TestSpec {
    let budgets = Budgets {
        output_tokens: BudgetCounter::new(100),
        ..Default::default()
    };
    TestSpec {
        id: "budget-tokens".to_string(),
        category: "budget".to_string(),
        difficulty: 2,
        description: "A 100-token ceiling against 20 tasks of roughly 16 tokens each must exhaust well before the queue drains.".to_string(),
        initial_pinned: Vec::new(),
        initial_working: Vec::new(),
        initial_tasks: (1..=20).map(|i| task(&format!("task-{i}"), 50)).collect(),
        injections: Vec::new(),
        budgets,
        must_do: vec!["token budget exhausted".to_string()],
        must_not_do: vec!["complete all tasks".to_string()],
        rubric: vec![RubricCategory {
            name: "budget-non-exceedance".to_string(),
            weight: 1.0,
            criteria: vec![
                RubricCriterion::deterministic("token budget exhausted", 10.0),
                RubricCriterion::rubric("used tokens never exceed the 100 ceiling", 5.0),
            ],
        }],
    }
}

pub fn contradiction_detection() -> TestSpec {
    TestSpec {
        id: "contradiction-detection".to_string(),
        category: "context-management".to_string(),
        difficulty: 3,
        description: "A pinned formality constraint conflicts with a casually-worded task prompt.".to_string(),
        initial_pinned: vec![
            ("Must use formal language only".to_string(), 100),
            ("Must use casual and informal tone".to_string(), 90),
        ],
        initial_working: Vec::new(),
        initial_tasks: vec![task("write a quick casual note to a friend", 50)],
        injections: Vec::new(),
        budgets: Budgets::default(),
        must_do: vec!["detect contradiction".to_string()],
        must_not_do: Vec::new(),
        rubric: vec![RubricCategory {
            name: "contradiction-audit".to_string(),
            weight: 1.0,
            criteria: vec![
                RubricCriterion::deterministic("detect contradiction", 10.0),
                RubricCriterion::rubric("the auditor records a contradiction entry for the conflict", 5.0),
            ],
        }],
    }
}

/// Exercises the `AutonomyGovernor` risk policy. The simulated executor never places tool calls
/// itself, so `check_action_permission`'s blocked-tools denial is not observable from kernel
/// events here; the policy-denial criterion is scored as a rubric judgement rather than a
/// log-derived fact.
pub fn tool_discipline() -> TestSpec {
    TestSpec {
        id: "tool-discipline".to_string(),
        category: "governance".to_string(),
        difficulty: 2,
        description: "A blocked-tool policy must deny a risky action type regardless of autonomy mode.".to_string(),
        initial_pinned: Vec::new(),
        initial_working: Vec::new(),
        initial_tasks: vec![task("run routine maintenance", 50)],
        injections: Vec::new(),
        budgets: Budgets {
            tool_calls: BudgetCounter::new(5),
            ..Default::default()
        },
        must_do: vec!["complete all tasks".to_string()],
        must_not_do: Vec::new(),
        rubric: vec![RubricCategory {
            name: "policy-gating".to_string(),
            weight: 1.0,
            criteria: vec![
                RubricCriterion::deterministic("complete all tasks", 5.0),
                RubricCriterion::rubric("check_action_permission denies a blocked_tools entry regardless of mode", 10.0),
            ],
        }],
    }
}

/// A task whose acceptance criterion the original attempt cannot satisfy, but whose
/// auto-synthesised fix task satisfies on the first retry (its title literally contains "Fix:").
pub fn self_improvement() -> TestSpec {
    let mut spec = task("improve the draft", 50);
    spec.acceptance_criteria.push(AcceptanceCriterion::new(
        CriterionKind::Contains,
        "output must reference a fix",
        serde_json::json!({"pattern": "Fix:"}),
    ));
    TestSpec {
        id: "self-improvement".to_string(),
        category: "verification".to_string(),
        difficulty: 3,
        description: "The first attempt fails; the generated fix task's own title satisfies the criterion on retry.".to_string(),
        initial_pinned: Vec::new(),
        initial_working: Vec::new(),
        initial_tasks: vec![spec],
        injections: Vec::new(),
        budgets: Budgets::default(),
        must_do: vec!["create fix task".to_string(), "complete all tasks".to_string()],
        must_not_do: Vec::new(),
        rubric: vec![RubricCategory {
            name: "convergence".to_string(),
            weight: 1.0,
            criteria: vec![
                RubricCriterion::deterministic("create fix task", 10.0),
                RubricCriterion::rubric("the fix task's output satisfies the originally failed criterion", 10.0),
            ],
        }],
    }
}

pub fn replay_regression() -> TestSpec {
    TestSpec {
        id: "replay-regression".to_string(),
        category: "persistence".to_string(),
        difficulty: 2,
        description: "A 2-task run exported to a bundle must replay to an identical final snapshot checksum.".to_string(),
        initial_pinned: Vec::new(),
        initial_working: Vec::new(),
        initial_tasks: vec![task("task-a", 50), task("task-b", 50)],
        injections: Vec::new(),
        budgets: Budgets::default(),
        must_do: vec!["complete all tasks".to_string()],
        must_not_do: Vec::new(),
        rubric: vec![RubricCategory {
            name: "idempotent-replay".to_string(),
            weight: 1.0,
            criteria: vec![
                RubricCriterion::deterministic("complete all tasks", 5.0),
                RubricCriterion::rubric("Kernel::from_bundle reproduces the exported final snapshot checksum exactly", 10.0),
            ],
        }],
    }
}

pub fn drift_detection() -> TestSpec {
    TestSpec {
        id: "drift-detection".to_string(),
        category: "context-management".to_string(),
        difficulty: 3,
        description: "A conflicting constraint is pinned mid-run; the next task's prompt must trip contradiction detection.".to_string(),
        initial_pinned: vec![("Must recommend the conservative option".to_string(), 100)],
        initial_working: Vec::new(),
        initial_tasks: vec![task("task-1", 50), task("draft a recommendation memo", 50)],
        injections: vec![Injection::AddConstraint {
            trigger: InjectionTrigger::ActionCount(1),
            content: "Must recommend the aggressive option".to_string(),
            priority: 90,
        }],
        budgets: Budgets::default(),
        must_do: vec!["detect contradiction".to_string()],
        must_not_do: Vec::new(),
        rubric: vec![RubricCategory {
            name: "drift".to_string(),
            weight: 1.0,
            criteria: vec![RubricCriterion::deterministic("detect contradiction", 10.0)],
        }],
    }
}

pub fn partial_completion() -> TestSpec {
    let budgets = Budgets {
        iterations: BudgetCounter::new(3),
        ..Default::default()
    };
    TestSpec {
        id: "partial-completion".to_string(),
        category: "budget".to_string(),
        difficulty: 2,
        description: "A 3-iteration ceiling against 10 tasks must stop the run with most tasks still queued.".to_string(),
        initial_pinned: Vec::new(),
        initial_working: Vec::new(),
        initial_tasks: (1..=10).map(|i| task(&format!("task-{i}"), 50)).collect(),
        injections: Vec::new(),
        budgets,
        must_do: vec!["iteration budget exhausted".to_string()],
        must_not_do: vec!["complete all tasks".to_string()],
        rubric: vec![RubricCategory {
            name: "graceful-partial-stop".to_string(),
            weight: 1.0,
            criteria: vec![RubricCriterion::deterministic("iteration budget exhausted", 10.0)],
        }],
    }
}

pub fn failure_fix_task() -> TestSpec {
    let mut spec = task("write the changelog entry", 50);
    spec.acceptance_criteria.push(AcceptanceCriterion::new(
        CriterionKind::NotContains,
        "must not read as a simulated placeholder",
        serde_json::json!({"pattern": "Simulated completion"}),
    ));
    TestSpec {
        id: "failure-fix-task".to_string(),
        category: "verification".to_string(),
        difficulty: 2,
        description: "Directly exercises the fix-task law: every verification failure spawns a dependent, tagged fix task.".to_string(),
        initial_pinned: Vec::new(),
        initial_working: Vec::new(),
        initial_tasks: vec![spec],
        injections: Vec::new(),
        budgets: Budgets::default(),
        must_do: vec!["create fix task".to_string()],
        must_not_do: Vec::new(),
        rubric: vec![RubricCategory {
            name: "fix-task-law".to_string(),
            weight: 1.0,
            criteria: vec![RubricCriterion::deterministic("create fix task", 10.0)],
        }],
    }
}

pub fn all_seed_tests() -> Vec<TestSpec> {
    vec![
        queue_reprioritization(),
        context_overload(),
        verification_first(),
        stop_interrupt(),
        budget_tokens(),
        contradiction_detection(),
        tool_discipline(),
        self_improvement(),
        replay_regression(),
        drift_detection(),
        partial_completion(),
        failure_fix_task(),
    ]
}

pub fn seed_test(id: &str) -> Option<TestSpec> {
    all_seed_tests().into_iter().find(|spec| spec.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_seed_tests_have_unique_ids() {
        let specs = all_seed_tests();
        assert_eq!(specs.len(), 12);
        let mut ids: Vec<&str> = specs.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 12);
    }

    #[test]
    fn seed_test_looks_up_by_id() {
        assert!(seed_test("budget-tokens").is_some());
        assert!(seed_test("not-a-real-test").is_none());
    }
}
