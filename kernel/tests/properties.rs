//! Property-based tests for the universal invariants: chain integrity, sequence
//! monotonicity, DAG acyclicity, the blocked invariant, budget non-exceedance,
//! context token accounting, and priority ordering.

use proptest::prelude::*;

use taskkernel::governor::BudgetCounter;
use taskkernel::{
    AutonomyGovernor, Budgets, ContextItem, ContextManager, EventStore, EventType, ItemKind, Mode, NewTask, RiskPolicy, TaskQueue, TaskStatus, TierName,
};

fn event_type_strategy() -> impl Strategy<Value = EventType> {
    prop_oneof![
        Just(EventType::RunStarted),
        Just(EventType::ActionExecuted),
        Just(EventType::BudgetTick),
        Just(EventType::QueueMutation),
        Just(EventType::ContextUpdated),
        Just(EventType::ErrorRaised),
        Just(EventType::VerificationRun),
    ]
}

proptest! {
    /// Properties 1 and 2: `verifyChainIntegrity` holds and sequence numbers are contiguous,
    /// no matter which event types were appended or in what order.
    #[test]
    fn chain_stays_intact_and_sequence_numbers_are_contiguous(
        events in prop::collection::vec((event_type_strategy(), any::<u32>()), 0..80)
    ) {
        let mut store = EventStore::new("prop-chain");
        for (event_type, seed) in events {
            store.append(event_type, serde_json::json!({"seed": seed}));
        }

        let (valid, errors) = store.verify_chain_integrity();
        prop_assert!(valid, "chain integrity violated: {errors:?}");

        for (idx, event) in store.events().iter().enumerate() {
            prop_assert_eq!(event.sequence_number, idx as u64);
        }
    }
}

#[derive(Debug, Clone)]
enum QueueOp {
    AddTask { dep_idx: Option<u8> },
    AddDependency { task_idx: u8, dep_idx: u8 },
    MarkDone { idx: u8 },
}

fn queue_op_strategy() -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        prop::option::of(any::<u8>()).prop_map(|dep_idx| QueueOp::AddTask { dep_idx }),
        (any::<u8>(), any::<u8>()).prop_map(|(task_idx, dep_idx)| QueueOp::AddDependency { task_idx, dep_idx }),
        any::<u8>().prop_map(|idx| QueueOp::MarkDone { idx }),
    ]
}

proptest! {
    /// Properties 3 and 4: after any sequence of `addTask`/`addDependency`/terminal
    /// transitions, the dependency graph has no cycle, and a task is `blocked` if and
    /// only if it has a dependency that is not yet `done`.
    #[test]
    fn dag_stays_acyclic_and_blocked_matches_unfinished_dependencies(ops in prop::collection::vec(queue_op_strategy(), 0..50)) {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("prop-dag");
        let mut ids: Vec<String> = Vec::new();

        for op in ops {
            match op {
                QueueOp::AddTask { dep_idx } => {
                    let mut spec = NewTask {
                        title: format!("task-{}", ids.len()),
                        prompt: "do work".into(),
                        ..Default::default()
                    };
                    if let (Some(raw), false) = (dep_idx, ids.is_empty()) {
                        spec.dependencies.push(ids[raw as usize % ids.len()].clone());
                    }
                    let task = queue.add_task(spec, &mut store);
                    ids.push(task.id);
                }
                QueueOp::AddDependency { task_idx, dep_idx } => {
                    if ids.len() >= 2 {
                        let a = ids[task_idx as usize % ids.len()].clone();
                        let b = ids[dep_idx as usize % ids.len()].clone();
                        if a != b {
                            queue.add_dependency(&a, &b, "prop add_dependency", &mut store);
                        }
                    }
                }
                QueueOp::MarkDone { idx } => {
                    if !ids.is_empty() {
                        let id = ids[idx as usize % ids.len()].clone();
                        if queue.get(&id).map(|t| t.status) == Some(TaskStatus::Queued) {
                            queue.set_task_status(&id, TaskStatus::Active, "prop start", &mut store);
                            queue.set_task_status(&id, TaskStatus::Done, "prop done", &mut store);
                        }
                    }
                }
            }

            let dag = queue.get_dag_state();
            prop_assert_eq!(dag.execution_order.len(), dag.nodes.len(), "cycle: topological sort did not cover every task");

            for node in &dag.nodes {
                let task = queue.get(&node.task_id).unwrap();
                let has_unfinished_dep = task
                    .dependencies
                    .iter()
                    .any(|d| queue.get(d).map(|t| t.status) != Some(TaskStatus::Done));
                prop_assert_eq!(
                    task.status == TaskStatus::Blocked,
                    has_unfinished_dep,
                    "blocked invariant violated for {}",
                    task.id
                );
            }
        }
    }
}

#[derive(Debug, Clone)]
enum BudgetOp {
    Tokens(u16),
    ToolCall,
    Iteration,
    RiskAction,
}

fn budget_op_strategy() -> impl Strategy<Value = BudgetOp> {
    prop_oneof![
        any::<u16>().prop_map(BudgetOp::Tokens),
        Just(BudgetOp::ToolCall),
        Just(BudgetOp::Iteration),
        Just(BudgetOp::RiskAction),
    ]
}

proptest! {
    /// Property 5: every budget counter's `used` stays at or below its `max`, no matter
    /// how many consume calls are thrown at it.
    #[test]
    fn budgets_never_exceed_their_ceiling(
        token_ceiling in 1u64..300,
        ops in prop::collection::vec(budget_op_strategy(), 0..80),
    ) {
        let mut budgets = Budgets::default();
        budgets.output_tokens = BudgetCounter::new(token_ceiling);
        budgets.tool_calls = BudgetCounter::new(10);
        budgets.iterations = BudgetCounter::new(10);
        budgets.risk_actions = BudgetCounter::new(10);

        let mut governor = AutonomyGovernor::new(budgets, Mode::Autonomous, RiskPolicy::default());
        let mut store = EventStore::new("prop-budget");

        for op in ops {
            match op {
                BudgetOp::Tokens(n) => {
                    governor.consume_tokens(n as u64, &mut store);
                }
                BudgetOp::ToolCall => {
                    governor.consume_tool_call(&mut store);
                }
                BudgetOp::Iteration => {
                    governor.consume_iteration(&mut store);
                }
                BudgetOp::RiskAction => {
                    governor.consume_risk_action(&mut store);
                }
            }
        }

        prop_assert!(governor.budgets.output_tokens.used <= governor.budgets.output_tokens.max);
        prop_assert!(governor.budgets.tool_calls.used <= governor.budgets.tool_calls.max);
        prop_assert!(governor.budgets.iterations.used <= governor.budgets.iterations.max);
        prop_assert!(governor.budgets.risk_actions.used <= governor.budgets.risk_actions.max);
    }
}

fn tier_strategy() -> impl Strategy<Value = TierName> {
    prop_oneof![Just(TierName::Pinned), Just(TierName::Working), Just(TierName::Longterm)]
}

proptest! {
    /// Property 6: per tier, the sum of item token counts equals `current_tokens` and
    /// never exceeds `max_tokens`; constraint items, once admitted, are never evicted.
    #[test]
    fn context_tier_accounting_stays_consistent_and_constraints_survive(
        items in prop::collection::vec((tier_strategy(), 1u32..400, any::<u8>(), any::<bool>()), 0..40)
    ) {
        let mut context = ContextManager::new();
        let mut store = EventStore::new("prop-context");
        let mut admitted_constraints: Vec<(TierName, String)> = Vec::new();

        for (tier, tokens, priority, is_constraint) in items {
            let kind = if is_constraint { ItemKind::Constraint } else { ItemKind::Memory };
            let mut item = ContextItem::new("filler content", kind, "prop", priority);
            item.tokens = tokens;
            let id = item.id.clone();
            if context.add_item(tier, item, &mut store) && is_constraint {
                admitted_constraints.push((tier, id));
            }
        }

        for (tier_name, id) in &admitted_constraints {
            let tier = context.tier(*tier_name);
            prop_assert!(tier.items.iter().any(|i| &i.id == id), "constraint {id} was evicted from {tier_name:?}");
        }

        for tier in [&context.pinned, &context.working, &context.longterm] {
            let sum: u32 = tier.items.iter().map(|i| i.tokens).sum();
            prop_assert_eq!(sum, tier.current_tokens);
            prop_assert!(tier.current_tokens <= tier.max_tokens);
        }
    }
}

proptest! {
    /// Property 10: among tasks that become queueable at once with no shared dependencies,
    /// `nextTask()` returns the highest-priority one.
    #[test]
    fn next_task_picks_the_highest_priority_task(priorities in prop::collection::hash_set(any::<u8>(), 1..15)) {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("prop-priority");
        let mut ids_by_priority: Vec<(u8, String)> = Vec::new();

        for priority in priorities {
            let task = queue.add_task(
                NewTask {
                    title: format!("task-p{priority}"),
                    prompt: "do work".into(),
                    priority: Some(priority),
                    ..Default::default()
                },
                &mut store,
            );
            ids_by_priority.push((priority, task.id));
        }

        let max_priority = ids_by_priority.iter().map(|(p, _)| *p).max().unwrap();
        let expected_id = ids_by_priority.iter().find(|(p, _)| *p == max_priority).unwrap().1.clone();

        let next = queue.next_task().unwrap();
        prop_assert_eq!(next.priority, max_priority);
        prop_assert_eq!(&next.id, &expected_id);
    }
}
