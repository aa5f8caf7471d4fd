//! TaskQueue: CRUD, dependency DAG, blocking, split/merge, prioritised selection.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::event::EventStore;
use crate::event::types::{ErrorKind, EventType};
use crate::ids::generate_id;

use super::types::{NewTask, Task, TaskResult, TaskStatus};

/// Partial update accepted by `update_task`; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub priority: Option<u8>,
    pub prompt: Option<String>,
    pub dependencies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagEdgeType {
    Dependency,
    Spawned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagNode {
    pub task_id: String,
    pub status: TaskStatus,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagEdge {
    pub from: String,
    pub to: String,
    pub edge_type: DagEdgeType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagState {
    pub nodes: Vec<DagNode>,
    pub edges: Vec<DagEdge>,
    pub execution_order: Vec<String>,
    pub completed: Vec<String>,
    pub blocked: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: u32,
    pub active: u32,
    pub blocked: u32,
    pub done: u32,
    pub failed: u32,
    pub canceled: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskQueue {
    tasks: HashMap<String, Task>,
    /// Insertion order, used as a stable fallback and to drive deterministic iteration.
    order: Vec<String>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn done_ids(&self) -> HashSet<String> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn add_task(&mut self, new: NewTask, store: &mut EventStore) -> Task {
        let done = self.done_ids();
        let is_blocked = new.dependencies.iter().any(|d| !done.contains(d));
        let parent = new.parent.clone();
        let status = if is_blocked { TaskStatus::Blocked } else { TaskStatus::Queued };
        let task = Task::from_new(new, status);

        if let Some(parent_id) = &parent {
            if let Some(parent_task) = self.tasks.get_mut(parent_id) {
                parent_task.subtask_ids.push(task.id.clone());
            }
        }

        self.order.push(task.id.clone());
        self.tasks.insert(task.id.clone(), task.clone());

        store.append(
            EventType::QueueMutation,
            serde_json::json!({"op": "add", "task_id": task.id, "status": task.status}),
        );
        task
    }

    pub fn update_task(&mut self, id: &str, update: TaskUpdate, reason: &str, store: &mut EventStore) -> bool {
        let Some(task) = self.tasks.get_mut(id) else { return false };

        if let Some(status) = update.status {
            if status != task.status {
                task.record_history("status", serde_json::json!(task.status), serde_json::json!(status), reason);
                task.status = status;
            }
        }
        if let Some(priority) = update.priority {
            if priority != task.priority {
                task.record_history("priority", serde_json::json!(task.priority), serde_json::json!(priority), reason);
                task.priority = priority;
            }
        }
        if let Some(prompt) = update.prompt {
            if prompt != task.prompt {
                task.record_history("prompt", serde_json::json!(task.prompt), serde_json::json!(prompt), reason);
                task.prompt = prompt;
            }
        }
        if let Some(deps) = update.dependencies {
            if deps != task.dependencies {
                task.record_history("dependencies", serde_json::json!(task.dependencies), serde_json::json!(deps), reason);
                task.dependencies = deps;
            }
        }

        store.append(EventType::QueueMutation, serde_json::json!({"op": "update", "task_id": id, "reason": reason}));
        true
    }

    pub fn set_task_status(&mut self, id: &str, status: TaskStatus, reason: &str, store: &mut EventStore) -> bool {
        let Some(task) = self.tasks.get_mut(id) else { return false };
        let old = task.status;
        if old == status {
            return true;
        }
        task.record_history("status", serde_json::json!(old), serde_json::json!(status), reason);
        task.status = status;

        if status == TaskStatus::Active && task.started_at.is_none() {
            task.started_at = Some(chrono::Utc::now());
        }
        if status.is_terminal() {
            task.completed_at = Some(chrono::Utc::now());
        }

        store.append(
            EventType::QueueMutation,
            serde_json::json!({"op": "status", "task_id": id, "from": old, "to": status, "reason": reason}),
        );

        if status.is_terminal() {
            self.reevaluate_blocked(store);
        }
        true
    }

    pub fn mark_task_done(&mut self, id: &str, result: TaskResult, store: &mut EventStore) -> bool {
        let Some(task) = self.tasks.get_mut(id) else { return false };
        task.result = Some(result);
        self.set_task_status(id, TaskStatus::Done, "Task completed", store)
    }

    pub fn mark_task_failed(&mut self, id: &str, error: &str, store: &mut EventStore) -> bool {
        let Some(task) = self.tasks.get_mut(id) else { return false };
        task.retry_count += 1;
        if task.retry_count < task.max_retries {
            let ordinal = task.retry_count;
            let reason = format!("Retry {ordinal} after failure: {error}");
            self.set_task_status(id, TaskStatus::Queued, &reason, store)
        } else {
            let reason = format!("Failed permanently after {} retries: {error}", task.retry_count);
            self.set_task_status(id, TaskStatus::Failed, &reason, store)
        }
    }

    fn creates_cycle(&self, id: &str, dep_id: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![dep_id.to_string()];
        while let Some(current) = stack.pop() {
            if current == id {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(task) = self.tasks.get(&current) {
                stack.extend(task.dependencies.iter().cloned());
            }
        }
        false
    }

    pub fn add_dependency(&mut self, id: &str, dep_id: &str, reason: &str, store: &mut EventStore) -> bool {
        if !self.tasks.contains_key(id) || !self.tasks.contains_key(dep_id) {
            return false;
        }
        if self.creates_cycle(id, dep_id) {
            store.append(
                EventType::ErrorRaised,
                serde_json::json!({"kind": ErrorKind::CircularDependency, "task_id": id, "dep_id": dep_id}),
            );
            return false;
        }

        let dep_done = self.tasks.get(dep_id).map(|t| t.status == TaskStatus::Done).unwrap_or(false);
        let task = self.tasks.get_mut(id).unwrap();
        let old = task.dependencies.clone();
        task.dependencies.push(dep_id.to_string());
        task.record_history("dependencies", serde_json::json!(old), serde_json::json!(task.dependencies), reason);

        if !dep_done && task.status != TaskStatus::Blocked {
            let old = task.status;
            task.status = TaskStatus::Blocked;
            task.record_history("status", serde_json::json!(old), serde_json::json!(TaskStatus::Blocked), "New dependency not yet done");
        }

        store.append(EventType::QueueMutation, serde_json::json!({"op": "add_dependency", "task_id": id, "dep_id": dep_id}));
        true
    }

    pub fn split_task(&mut self, id: &str, subtask_specs: Vec<NewTask>, reason: &str, store: &mut EventStore) -> Vec<Task> {
        if !self.tasks.contains_key(id) {
            return Vec::new();
        }
        let mut spawned = Vec::new();
        let mut previous: Option<String> = None;
        for mut spec in subtask_specs {
            spec.parent = Some(id.to_string());
            if let Some(prev_id) = &previous {
                spec.dependencies.push(prev_id.clone());
            }
            let task = self.add_task(spec, store);
            previous = Some(task.id.clone());
            spawned.push(task);
        }

        if let Some(parent) = self.tasks.get_mut(id) {
            let old = parent.dependencies.clone();
            parent.dependencies.extend(spawned.iter().map(|t| t.id.clone()));
            parent.record_history("dependencies", serde_json::json!(old), serde_json::json!(parent.dependencies), reason);
        }

        self.set_task_status(id, TaskStatus::Blocked, reason, store);
        store.append(
            EventType::QueueMutation,
            serde_json::json!({"op": "split", "task_id": id, "subtask_ids": spawned.iter().map(|t| t.id.clone()).collect::<Vec<_>>()}),
        );
        spawned
    }

    pub fn merge_tasks(&mut self, ids: &[String], title: &str, reason: &str, store: &mut EventStore) -> Option<Task> {
        if ids.is_empty() {
            return None;
        }
        let mut prompt = String::new();
        let mut deps = BTreeSet::new();
        let mut context_refs = BTreeSet::new();
        let mut tags = BTreeSet::new();
        let mut priority = 0u8;

        for id in ids {
            let task = self.tasks.get(id)?;
            if !prompt.is_empty() {
                prompt.push_str("\n\n---\n\n");
            }
            prompt.push_str(&task.prompt);
            deps.extend(task.dependencies.iter().cloned());
            context_refs.extend(task.context_refs.iter().cloned());
            tags.extend(task.tags.iter().cloned());
            priority = priority.max(task.priority);
        }
        for id in ids {
            deps.remove(id);
        }

        let new = NewTask {
            title: title.to_string(),
            prompt,
            dependencies: deps.into_iter().collect(),
            priority: Some(priority),
            context_refs: context_refs.into_iter().collect(),
            tags,
            ..Default::default()
        };
        let merged = self.add_task(new, store);

        for id in ids {
            self.set_task_status(id, TaskStatus::Canceled, reason, store);
        }

        store.append(
            EventType::QueueMutation,
            serde_json::json!({"op": "merge", "source_ids": ids, "merged_id": merged.id}),
        );
        Some(merged)
    }

    pub fn reprioritize(&mut self, id: &str, new_priority: u8, reason: &str, store: &mut EventStore) -> bool {
        self.update_task(
            id,
            TaskUpdate {
                priority: Some(new_priority),
                ..Default::default()
            },
            reason,
            store,
        )
    }

    pub fn batch_reprioritize(&mut self, updates: &[(String, u8)], reason: &str, store: &mut EventStore) {
        for (id, priority) in updates {
            self.reprioritize(id, *priority, reason, store);
        }
    }

    /// Re-evaluate every `blocked` task; unblock any whose dependencies are all done.
    fn reevaluate_blocked(&mut self, store: &mut EventStore) {
        let done = self.done_ids();
        let to_unblock: Vec<String> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Blocked && t.dependencies.iter().all(|d| done.contains(d)))
            .map(|t| t.id.clone())
            .collect();
        for id in to_unblock {
            if let Some(task) = self.tasks.get_mut(&id) {
                task.record_history(
                    "status",
                    serde_json::json!(TaskStatus::Blocked),
                    serde_json::json!(TaskStatus::Queued),
                    "Dependencies resolved",
                );
                task.status = TaskStatus::Queued;
            }
            store.append(EventType::QueueMutation, serde_json::json!({"op": "unblock", "task_id": id}));
        }
    }

    /// Highest-priority `queued` task, ties broken by older `created_at`.
    pub fn next_task(&self) -> Option<&Task> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .max_by(|a, b| a.priority.cmp(&b.priority).then(b.created_at.cmp(&a.created_at)))
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<Task> {
        self.tasks.values().filter(|t| t.status == status).cloned().collect()
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for task in self.tasks.values() {
            stats.total += 1;
            match task.status {
                TaskStatus::Queued => stats.queued += 1,
                TaskStatus::Active => stats.active += 1,
                TaskStatus::Blocked => stats.blocked += 1,
                TaskStatus::Done => stats.done += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Canceled => stats.canceled += 1,
            }
        }
        stats
    }

    fn depth_of(&self, id: &str, memo: &mut HashMap<String, u32>) -> u32 {
        if let Some(&d) = memo.get(id) {
            return d;
        }
        let task = match self.tasks.get(id) {
            Some(t) => t,
            None => return 0,
        };
        if task.dependencies.is_empty() {
            memo.insert(id.to_string(), 0);
            return 0;
        }
        let depth = 1 + task.dependencies.iter().map(|d| self.depth_of(d, memo)).max().unwrap_or(0);
        memo.insert(id.to_string(), depth);
        depth
    }

    pub fn get_dag_state(&self) -> DagState {
        let mut memo = HashMap::new();
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut in_degree: HashMap<String, u32> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for id in &self.order {
            let Some(task) = self.tasks.get(id) else { continue };
            let depth = self.depth_of(id, &mut memo);
            nodes.push(DagNode {
                task_id: id.clone(),
                status: task.status,
                depth,
            });
            in_degree.entry(id.clone()).or_insert(0);
            for dep in &task.dependencies {
                edges.push(DagEdge {
                    from: id.clone(),
                    to: dep.clone(),
                    edge_type: DagEdgeType::Dependency,
                });
                *in_degree.entry(id.clone()).or_insert(0) += 1;
                dependents.entry(dep.clone()).or_default().push(id.clone());
            }
            if let Some(parent) = &task.parent_id {
                edges.push(DagEdge {
                    from: parent.clone(),
                    to: id.clone(),
                    edge_type: DagEdgeType::Spawned,
                });
            }
        }

        let execution_order = self.kahn_order(&mut in_degree.clone(), &dependents);

        let completed = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Done)
            .map(|t| t.id.clone())
            .collect();
        let blocked = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Blocked)
            .map(|t| t.id.clone())
            .collect();

        DagState {
            nodes,
            edges,
            execution_order,
            completed,
            blocked,
        }
    }

    /// Iterative Kahn's-algorithm topological sort over the dependency graph, with a
    /// priority-sorted ready set (highest priority, then oldest `created_at`, first).
    fn kahn_order(&self, in_degree: &mut HashMap<String, u32>, dependents: &HashMap<String, Vec<String>>) -> Vec<String> {
        let mut order = Vec::new();
        let mut ready: Vec<String> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(id, _)| id.clone()).collect();

        loop {
            ready.sort_by(|a, b| {
                let ta = self.tasks.get(a);
                let tb = self.tasks.get(b);
                match (ta, tb) {
                    (Some(ta), Some(tb)) => tb.priority.cmp(&ta.priority).then(ta.created_at.cmp(&tb.created_at)),
                    _ => std::cmp::Ordering::Equal,
                }
            });
            let Some(next) = ready.first().cloned() else { break };
            ready.retain(|id| id != &next);
            order.push(next.clone());

            if let Some(deps) = dependents.get(&next) {
                for dependent in deps {
                    if let Some(count) = in_degree.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push(dependent.clone());
                        }
                    }
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::types::NewTask;

    fn new_task(title: &str, priority: u8) -> NewTask {
        NewTask {
            title: title.to_string(),
            prompt: title.to_string(),
            priority: Some(priority),
            ..Default::default()
        }
    }

    #[test]
    fn add_task_is_queued_without_deps() {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("run-1");
        let task = queue.add_task(new_task("a", 50), &mut store);
        assert_eq!(task.status, TaskStatus::Queued);
    }

    #[test]
    fn add_task_is_blocked_with_unfinished_dep() {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("run-1");
        let dep = queue.add_task(new_task("dep", 50), &mut store);
        let mut spec = new_task("dependent", 50);
        spec.dependencies.push(dep.id.clone());
        let task = queue.add_task(spec, &mut store);
        assert_eq!(task.status, TaskStatus::Blocked);
    }

    #[test]
    fn terminal_transition_unblocks_dependents() {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("run-1");
        let dep = queue.add_task(new_task("dep", 50), &mut store);
        let mut spec = new_task("dependent", 50);
        spec.dependencies.push(dep.id.clone());
        let dependent = queue.add_task(spec, &mut store);

        queue.set_task_status(&dep.id, TaskStatus::Active, "start", &mut store);
        queue.set_task_status(&dep.id, TaskStatus::Done, "done", &mut store);

        assert_eq!(queue.get(&dependent.id).unwrap().status, TaskStatus::Queued);
    }

    #[test]
    fn add_dependency_rejects_cycle() {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("run-1");
        let a = queue.add_task(new_task("a", 50), &mut store);
        let b = queue.add_task(new_task("b", 50), &mut store);
        assert!(queue.add_dependency(&b.id, &a.id, "b depends on a", &mut store));
        assert!(!queue.add_dependency(&a.id, &b.id, "would cycle", &mut store));
    }

    #[test]
    fn next_task_picks_highest_priority_then_oldest() {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("run-1");
        queue.add_task(new_task("low", 20), &mut store);
        queue.add_task(new_task("high", 80), &mut store);
        queue.add_task(new_task("medium", 50), &mut store);
        let next = queue.next_task().unwrap();
        assert_eq!(next.title, "high");
    }

    #[test]
    fn mark_task_failed_retries_then_fails() {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("run-1");
        let task = queue.add_task(new_task("flaky", 50), &mut store);
        queue.set_task_status(&task.id, TaskStatus::Active, "start", &mut store);
        queue.mark_task_failed(&task.id, "boom", &mut store);
        assert_eq!(queue.get(&task.id).unwrap().status, TaskStatus::Queued);
        assert_eq!(queue.get(&task.id).unwrap().retry_count, 1);

        for _ in 0..2 {
            queue.set_task_status(&task.id, TaskStatus::Active, "retry", &mut store);
            queue.mark_task_failed(&task.id, "boom again", &mut store);
        }
        assert_eq!(queue.get(&task.id).unwrap().status, TaskStatus::Failed);
        assert_eq!(queue.get(&task.id).unwrap().retry_count, 3);
    }

    #[test]
    fn split_task_creates_serial_chain_and_blocks_parent() {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("run-1");
        let parent = queue.add_task(new_task("parent", 50), &mut store);
        let subs = queue.split_task(
            &parent.id,
            vec![new_task("sub-1", 50), new_task("sub-2", 50)],
            "splitting",
            &mut store,
        );
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].dependencies, vec![subs[0].id.clone()]);
        assert_eq!(queue.get(&parent.id).unwrap().status, TaskStatus::Blocked);
        let parent_deps = &queue.get(&parent.id).unwrap().dependencies;
        assert!(parent_deps.contains(&subs[0].id));
        assert!(parent_deps.contains(&subs[1].id));
    }

    #[test]
    fn split_parent_stays_blocked_until_its_own_subtasks_finish() {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("run-1");
        let unrelated = queue.add_task(new_task("unrelated", 50), &mut store);
        let parent = queue.add_task(new_task("parent", 50), &mut store);
        let subs = queue.split_task(&parent.id, vec![new_task("sub-1", 50), new_task("sub-2", 50)], "splitting", &mut store);

        queue.set_task_status(&unrelated.id, TaskStatus::Active, "start", &mut store);
        queue.set_task_status(&unrelated.id, TaskStatus::Done, "done", &mut store);
        assert_eq!(queue.get(&parent.id).unwrap().status, TaskStatus::Blocked);

        queue.set_task_status(&subs[0].id, TaskStatus::Active, "start", &mut store);
        queue.set_task_status(&subs[0].id, TaskStatus::Done, "done", &mut store);
        assert_eq!(queue.get(&parent.id).unwrap().status, TaskStatus::Blocked);

        queue.set_task_status(&subs[1].id, TaskStatus::Active, "start", &mut store);
        queue.set_task_status(&subs[1].id, TaskStatus::Done, "done", &mut store);
        assert_eq!(queue.get(&parent.id).unwrap().status, TaskStatus::Queued);
    }

    #[test]
    fn merge_tasks_cancels_originals_and_unions_fields() {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("run-1");
        let a = queue.add_task(new_task("a", 30), &mut store);
        let b = queue.add_task(new_task("b", 60), &mut store);
        let merged = queue
            .merge_tasks(&[a.id.clone(), b.id.clone()], "merged", "combine", &mut store)
            .unwrap();
        assert_eq!(merged.priority, 60);
        assert_eq!(queue.get(&a.id).unwrap().status, TaskStatus::Canceled);
        assert_eq!(queue.get(&b.id).unwrap().status, TaskStatus::Canceled);
    }

    #[test]
    fn dag_state_computes_depth_and_execution_order() {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("run-1");
        let a = queue.add_task(new_task("a", 50), &mut store);
        let mut spec_b = new_task("b", 50);
        spec_b.dependencies.push(a.id.clone());
        let b = queue.add_task(spec_b, &mut store);

        let dag = queue.get_dag_state();
        let node_b = dag.nodes.iter().find(|n| n.task_id == b.id).unwrap();
        assert_eq!(node_b.depth, 1);
        let pos_a = dag.execution_order.iter().position(|id| id == &a.id).unwrap();
        let pos_b = dag.execution_order.iter().position(|id| id == &b.id).unwrap();
        assert!(pos_a < pos_b);
    }

    #[test]
    fn stats_count_each_status() {
        let mut queue = TaskQueue::new();
        let mut store = EventStore::new("run-1");
        queue.add_task(new_task("a", 50), &mut store);
        queue.add_task(new_task("b", 50), &mut store);
        let stats = queue.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.queued, 2);
    }
}
