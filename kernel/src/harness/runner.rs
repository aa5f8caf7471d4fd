//! Drives a kernel through a TestSpec: seeds state, applies scripted injections on schedule,
//! then classifies must_do/must_not_do strings and scores the rubric against the resulting log.

use std::time::{Duration, Instant};

use crate::context::{ContextItem, ItemKind, TierName};
use crate::event::types::EventType;
use crate::governor::Mode;
use crate::kernel::{Kernel, RunConfig};
use crate::task::TaskStatus;

use super::spec::{EvaluationKind, Injection, InjectionTrigger, TestSpec};

#[derive(Debug, Clone)]
pub struct TestResult {
    pub test_id: String,
    pub passed: bool,
    pub score: f64,
    pub breakdown: Vec<(String, f64)>,
    pub duration_ms: u64,
    pub event_count: usize,
    pub error: Option<String>,
}

pub async fn run_test(spec: &TestSpec) -> TestResult {
    let start = Instant::now();

    let mut config = RunConfig::new("harness", &spec.id);
    config.mode = Mode::Autonomous;
    config.budgets = spec.budgets;
    config.checkpoint_interval = 5;
    let mut kernel = Kernel::with_default_executor(config);

    for (content, priority) in &spec.initial_pinned {
        let item = ContextItem::new(content.clone(), ItemKind::Constraint, "test_spec", *priority);
        kernel.context.add_item(TierName::Pinned, item, &mut kernel.store);
    }
    for (content, priority) in &spec.initial_working {
        let item = ContextItem::new(content.clone(), ItemKind::Memory, "test_spec", *priority);
        kernel.context.add_item(TierName::Working, item, &mut kernel.store);
    }
    for task_spec in &spec.initial_tasks {
        kernel.queue.add_task(task_spec.clone(), &mut kernel.store);
    }

    let mut pending = spec.injections.clone();
    let mut action_count = 0u32;
    let error = drive_loop(&mut kernel, &mut pending, &mut action_count, start).await;

    let must_do_met = spec.must_do.iter().all(|s| classify(s, &kernel));
    let must_not_violated = spec.must_not_do.iter().any(|s| classify(s, &kernel));
    let passed = error.is_none() && must_do_met && !must_not_violated;

    let (score, breakdown) = score_rubric(spec, &kernel);

    TestResult {
        test_id: spec.id.clone(),
        passed,
        score,
        breakdown,
        duration_ms: start.elapsed().as_millis() as u64,
        event_count: kernel.store.len(),
        error,
    }
}

/// Replicates `Kernel::run_loop`, with injection application interleaved after each iteration,
/// since injection triggers are evaluated "after each loop iteration" per the harness contract.
async fn drive_loop(kernel: &mut Kernel, pending: &mut Vec<Injection>, action_count: &mut u32, start: Instant) -> Option<String> {
    let max_iterations = 10_000;
    let mut iterations = 0u32;

    loop {
        iterations += 1;
        if iterations > max_iterations {
            return Some(format!("harness aborted after {max_iterations} iterations without reaching a terminal state"));
        }

        kernel.governor.check_wall_time(&mut kernel.store);
        let (can_proceed, reason) = kernel.governor.can_proceed();
        if !can_proceed {
            kernel.stop(reason.unwrap_or_else(|| "Stopped".to_string()));
            return None;
        }

        let stats = kernel.queue.stats();
        if stats.queued == 0 {
            if stats.active == 0 && stats.blocked == 0 {
                kernel.store.append(EventType::RunCompleted, serde_json::json!({"stats": stats}));
                return None;
            }
            apply_due_injections(kernel, pending, *action_count, start.elapsed());
            if !kernel.governor.consume_iteration(&mut kernel.store) {
                kernel.stop("Iteration budget exhausted".to_string());
                return None;
            }
            continue;
        }

        kernel.step().await;
        *action_count += 1;
        apply_due_injections(kernel, pending, *action_count, start.elapsed());

        if !kernel.governor.consume_iteration(&mut kernel.store) {
            kernel.stop("Iteration budget exhausted".to_string());
            return None;
        }
    }
}

fn trigger_satisfied(trigger: &InjectionTrigger, action_count: u32, elapsed: Duration, kernel: &Kernel) -> bool {
    match trigger {
        InjectionTrigger::ActionCount(value) => action_count >= *value,
        InjectionTrigger::TimeElapsed(value) => elapsed.as_millis() as u64 >= *value,
        InjectionTrigger::TaskCompleted(title) => kernel.queue.tasks_with_status(TaskStatus::Done).iter().any(|t| &t.title == title),
        InjectionTrigger::EventType(event_type) => kernel.store.events().iter().any(|e| e.event_type == *event_type),
    }
}

/// Resolve a declarative `title` reference to the live task id, searching every status.
fn task_id_by_title(kernel: &Kernel, title: &str) -> Option<String> {
    use TaskStatus::*;
    [Queued, Active, Blocked, Done, Failed, Canceled]
        .into_iter()
        .find_map(|status| kernel.queue.tasks_with_status(status).into_iter().find(|t| t.title == title).map(|t| t.id))
}

fn apply_due_injections(kernel: &mut Kernel, pending: &mut Vec<Injection>, action_count: u32, elapsed: Duration) {
    let mut idx = 0;
    while idx < pending.len() {
        if trigger_satisfied(pending[idx].trigger(), action_count, elapsed, kernel) {
            let injection = pending.remove(idx);
            apply_injection(kernel, injection);
        } else {
            idx += 1;
        }
    }
}

fn apply_injection(kernel: &mut Kernel, injection: Injection) {
    match injection {
        Injection::AddTask { spec, .. } => {
            kernel.queue.add_task(spec, &mut kernel.store);
        }
        Injection::ModifyTask { title, update, .. } => {
            if let Some(id) = task_id_by_title(kernel, &title) {
                kernel.queue.update_task(&id, update, "test injection", &mut kernel.store);
            }
        }
        Injection::CancelTask { title, .. } => {
            if let Some(id) = task_id_by_title(kernel, &title) {
                kernel.queue.set_task_status(&id, TaskStatus::Canceled, "test injection", &mut kernel.store);
            }
        }
        Injection::AddConstraint { content, priority, .. } => {
            let item = ContextItem::new(content, ItemKind::Constraint, "injection", priority);
            kernel.context.add_item(TierName::Pinned, item, &mut kernel.store);
        }
        Injection::TriggerStop { reason, .. } => {
            kernel.stop(reason);
        }
    }
}

fn has_fix_task(kernel: &Kernel) -> bool {
    use TaskStatus::*;
    [Queued, Active, Blocked, Done, Failed, Canceled]
        .iter()
        .any(|&status| kernel.queue.tasks_with_status(status).iter().any(|t| t.tags.contains("fix") || t.title.to_lowercase().contains("fix")))
}

fn action_executed_after_stop(kernel: &Kernel) -> bool {
    let events = kernel.store.events();
    match events.iter().position(|e| e.event_type == EventType::StopRequested) {
        Some(idx) => events[idx + 1..].iter().any(|e| e.event_type == EventType::ActionExecuted),
        None => false,
    }
}

/// Classify a must_do / must_not_do statement by keyword pattern against the resulting run.
fn classify(statement: &str, kernel: &Kernel) -> bool {
    let lower = statement.to_lowercase();

    if lower.contains("complete all tasks") {
        let stats = kernel.queue.stats();
        return stats.done + stats.failed + stats.canceled == stats.total;
    }
    if lower.contains("stop immediately") || lower.contains("stopped") {
        return kernel.store.events().iter().any(|e| e.event_type == EventType::StopRequested);
    }
    if lower.contains("fix task") || lower.contains("create fix") {
        return has_fix_task(kernel);
    }
    if lower.contains("contradiction") {
        return kernel.store.events().iter().any(|e| e.event_type == EventType::ContradictionDetected);
    }
    if lower.contains("schema validation") || lower.contains("verification") {
        return kernel.store.events().iter().any(|e| e.event_type == EventType::VerificationRun);
    }
    if lower.contains("exceed") && (lower.contains("token") || lower.contains("tool")) {
        return kernel.governor.budgets.output_tokens.exhausted() || kernel.governor.budgets.tool_calls.exhausted();
    }
    if lower.contains("budget") && (lower.contains("exhaust") || lower.contains("stop")) {
        return kernel.governor.budgets.any_exhausted();
    }
    if lower.contains("continue after stop") {
        return action_executed_after_stop(kernel);
    }
    false
}

fn score_rubric(spec: &TestSpec, kernel: &Kernel) -> (f64, Vec<(String, f64)>) {
    let mut breakdown = Vec::new();
    let mut total = 0.0;

    for category in &spec.rubric {
        let mut earned = 0.0;
        let mut max_points = 0.0;
        for criterion in &category.criteria {
            max_points += criterion.points;
            earned += match criterion.evaluation {
                EvaluationKind::Rubric => criterion.points,
                EvaluationKind::Deterministic => {
                    if classify(&criterion.description, kernel) {
                        criterion.points
                    } else {
                        0.0
                    }
                }
            };
        }
        let category_score = if max_points > 0.0 { earned / max_points } else { 1.0 };
        let weighted = category_score * category.weight;
        total += weighted;
        breakdown.push((category.name.clone(), weighted));
    }

    (total, breakdown)
}
