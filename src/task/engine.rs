#![forbid(unsafe_code)]

//! Task lifecycle: creation, assignment, status transitions and cleanup.
//!
//! Every public mutation either applies completely or not at all. Lookups of
//! unknown ids and requests that would break an invariant are answered with
//! `false`/`None` and a warning, never with an error.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::context::TickContext;
use crate::task::fsm::{FsmState, TaskFsm};
use crate::task::model::{
    AssignmentType, Lifetime, Task, TaskId, TaskSpec, TaskStatus, TaskType, priority,
};
use crate::task::registry::{RoomTasks, TaskCounters, TaskRegistry};
use crate::world::{RoomName, WorkerId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TaskEvent {
    TaskCreated {
        task_id: TaskId,
        room: RoomName,
        task_type: TaskType,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub purged: Vec<TaskId>,
    pub recycled: Vec<TaskId>,
    pub orphaned_workers: Vec<WorkerId>,
    pub expired: Vec<TaskId>,
}

impl CleanupReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.purged.is_empty()
            && self.recycled.is_empty()
            && self.orphaned_workers.is_empty()
            && self.expired.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoomStats {
    pub counters: TaskCounters,
    pub pending: usize,
    pub assigned: usize,
    pub in_progress: usize,
    pub awaiting_cleanup: usize,
    pub busy_workers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub rooms: BTreeMap<RoomName, RoomStats>,
    pub totals: TaskCounters,
}

#[derive(Debug)]
pub struct TaskEngine {
    registry: TaskRegistry,
    config: EngineConfig,
    events: Vec<TaskEvent>,
}

impl TaskEngine {
    #[must_use]
    pub fn new(registry: TaskRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    #[must_use]
    pub fn into_registry(self) -> TaskRegistry {
        self.registry
    }

    pub fn drain_events(&mut self) -> Vec<TaskEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn create_task(&mut self, ctx: &TickContext<'_>, spec: TaskSpec) -> TaskId {
        let task_type = spec.params.task_type();
        let defaults = task_type.defaults();

        let max_assignees = match (defaults.assignment, spec.max_assignees) {
            (AssignmentType::Exclusive, Some(n)) if n != 1 => {
                warn!(%task_type, requested = n, "exclusive tasks take exactly one worker");
                1
            }
            (_, Some(0)) => {
                warn!(%task_type, "ignoring max_assignees override of 0");
                defaults.max_assignees
            }
            (_, Some(n)) => n,
            (_, None) => defaults.max_assignees,
        };

        let id = Task::new_id();
        let task = Task {
            id: id.clone(),
            task_type,
            status: TaskStatus::Pending,
            assignment: defaults.assignment,
            lifetime: defaults.lifetime,
            max_assignees,
            assigned_creeps: Vec::new(),
            base_priority: spec.base_priority.unwrap_or(priority::NORMAL),
            room: spec.room.clone(),
            params: spec.params,
            created_at: ctx.tick,
            updated_at: ctx.tick,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: defaults.max_retries,
            last_error: None,
            fsm: TaskFsm::new(task_type, spec.group_id),
        };

        let room = self.registry.room_entry(&spec.room);
        room.tasks.insert(id.clone(), task);
        room.counters.tasks_created += 1;

        debug!(tick = ctx.tick, room = %spec.room, task_id = %id, %task_type, "task created");
        self.events.push(TaskEvent::TaskCreated {
            task_id: id.clone(),
            room: spec.room,
            task_type,
        });
        id
    }

    pub fn assign_task(&mut self, ctx: &TickContext<'_>, task_id: &str, worker: &str) -> bool {
        if let Some((_, current)) = self.registry.worker_entry(worker)
            && current != task_id
        {
            warn!(task_id, worker, current = %current, "worker already holds another task");
            return false;
        }
        let Some(room) = self.room_of_mut(task_id) else {
            warn!(task_id, worker, "assign: unknown task");
            return false;
        };
        let Some(task) = room.tasks.get_mut(task_id) else {
            return false;
        };

        if !task.accepts_assignment() {
            debug!(task_id, worker, status = %task.status, "assign: status not assignable");
            return false;
        }
        if task.is_full() {
            debug!(task_id, worker, max = task.max_assignees, "assign: task is full");
            return false;
        }
        if task.is_assigned_to(worker) {
            debug!(task_id, worker, "assign: worker already assigned");
            return false;
        }

        task.assigned_creeps.push(worker.to_owned());
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::Assigned;
        }
        task.updated_at = ctx.tick;
        task.fsm.enter(worker);
        room.link(task_id, worker);

        debug!(tick = ctx.tick, task_id, worker, "task assigned");
        true
    }

    pub fn unassign_creep(&mut self, ctx: &TickContext<'_>, worker: &str) -> bool {
        let Some((room_name, task_id)) = self
            .registry
            .worker_entry(worker)
            .map(|(r, t)| (r.clone(), t.clone()))
        else {
            debug!(worker, "unassign: worker has no task");
            return false;
        };
        let Some(room) = self.registry.room_mut(&room_name) else {
            return false;
        };

        room.unlink(&task_id, worker);
        let Some(task) = room.tasks.get_mut(&task_id) else {
            warn!(worker, task_id = %task_id, "unassign: index pointed at a missing task");
            return false;
        };
        detach(task, worker, ctx.tick);

        debug!(tick = ctx.tick, task_id = %task_id, worker, status = %task.status, "worker unassigned");
        true
    }

    /// Reconciles a worker that no longer exists. Same effect as
    /// [`TaskEngine::unassign_creep`] regardless of the task's status.
    pub fn worker_died(&mut self, ctx: &TickContext<'_>, worker: &str) -> bool {
        let released = self.unassign_creep(ctx, worker);
        if released {
            info!(tick = ctx.tick, worker, "released task of dead worker");
        }
        released
    }

    pub fn update_task_status(
        &mut self,
        ctx: &TickContext<'_>,
        task_id: &str,
        status: TaskStatus,
    ) -> bool {
        let Some(room) = self.room_of_mut(task_id) else {
            warn!(task_id, %status, "status update: unknown task");
            return false;
        };
        let Some(task) = room.tasks.get_mut(task_id) else {
            return false;
        };

        let current = task.status;
        if current == status {
            return true;
        }
        if !transition_allowed(current, status, task.assigned_creeps.is_empty()) {
            warn!(task_id, from = %current, to = %status, "rejected status transition");
            return false;
        }

        task.status = status;
        task.updated_at = ctx.tick;
        if status == TaskStatus::InProgress && task.started_at.is_none() {
            task.started_at = Some(ctx.tick);
        }
        if status.is_terminal() {
            task.completed_at = Some(ctx.tick);
            task.assigned_creeps.clear();
            task.fsm.creep_states.clear();
            room.unlink_task(task_id);
            if status == TaskStatus::Completed {
                room.counters.tasks_completed += 1;
            } else {
                room.counters.tasks_failed += 1;
            }
            room.queue_for_removal(task_id);
        }

        debug!(tick = ctx.tick, task_id, from = %current, to = %status, "task status changed");
        true
    }

    /// Gives a task back after its workers could not finish it.
    ///
    /// Every assignee is released and the retry counter grows; once the
    /// budget is spent the task fails instead of returning to the pool.
    pub fn release_for_retry(&mut self, ctx: &TickContext<'_>, task_id: &str, reason: &str) -> bool {
        let Some(room) = self.room_of_mut(task_id) else {
            warn!(task_id, "retry: unknown task");
            return false;
        };
        let Some(task) = room.tasks.get_mut(task_id) else {
            return false;
        };
        if task.status.is_terminal() {
            return false;
        }

        task.retry_count += 1;
        task.last_error = Some(reason.to_owned());
        let exhausted = task.retry_count > task.max_retries;
        if !exhausted {
            for worker in std::mem::take(&mut task.assigned_creeps) {
                task.fsm.leave(&worker);
            }
            task.status = TaskStatus::Pending;
            task.updated_at = ctx.tick;
            let retry = task.retry_count;
            room.unlink_task(task_id);
            info!(tick = ctx.tick, task_id, retry, reason, "task released for retry");
            return true;
        }

        warn!(tick = ctx.tick, task_id, reason, "retry budget exhausted");
        self.update_task_status(ctx, task_id, TaskStatus::Failed)
    }

    pub fn set_task_state(&mut self, task_id: &str, state: FsmState) -> bool {
        let Some(task) = self.task_mut(task_id) else {
            warn!(task_id, "fsm: unknown task");
            return false;
        };
        let ok = task.fsm.set_task_state(state);
        if !ok {
            warn!(task_id, %state, kind = %task.task_type, "fsm: state of another kind");
        }
        ok
    }

    pub fn set_creep_state(&mut self, task_id: &str, worker: &str, state: FsmState) -> bool {
        let Some(task) = self.task_mut(task_id) else {
            warn!(task_id, "fsm: unknown task");
            return false;
        };
        let ok = task.fsm.set_creep_state(worker, state);
        if !ok {
            warn!(task_id, worker, %state, "fsm: rejected worker state");
        }
        ok
    }

    /// Runs [`TaskEngine::cleanup`] when the configured interval has passed.
    pub fn cleanup_if_due(&mut self, ctx: &TickContext<'_>) -> Option<CleanupReport> {
        if let Some(last) = self.registry.last_cleanup
            && ctx.tick < last.saturating_add(self.config.cleanup_interval)
        {
            return None;
        }
        Some(self.cleanup(ctx))
    }

    pub fn cleanup(&mut self, ctx: &TickContext<'_>) -> CleanupReport {
        let mut report = CleanupReport::default();
        let expiry = self.config.task_expiry_ticks;

        for (room_name, room) in &mut self.registry.rooms {
            // Terminal tasks queued by status updates.
            for task_id in std::mem::take(&mut room.completed) {
                let Some(task) = room.tasks.get_mut(&task_id) else {
                    continue;
                };
                if !task.status.is_terminal() {
                    continue;
                }
                if task.lifetime == Lifetime::Persistent && task.status == TaskStatus::Completed {
                    recycle(task, ctx.tick);
                    report.recycled.push(task_id);
                } else {
                    room.remove_task(&task_id);
                    report.purged.push(task_id);
                }
            }

            // Index entries of workers that no longer exist.
            let dead: Vec<(WorkerId, TaskId)> = room
                .creep_tasks
                .iter()
                .filter(|(worker, _)| !ctx.world.object_exists(worker))
                .map(|(w, t)| (w.clone(), t.clone()))
                .collect();
            for (worker, task_id) in dead {
                room.unlink(&task_id, &worker);
                if let Some(task) = room.tasks.get_mut(&task_id) {
                    detach(task, &worker, ctx.tick);
                }
                warn!(room = %room_name, worker = %worker, task_id = %task_id, "removed orphaned worker");
                report.orphaned_workers.push(worker);
            }

            // Abandoned tasks.
            let stale: Vec<TaskId> = room
                .tasks
                .values()
                .filter(|t| t.age(ctx.tick) > expiry)
                .map(|t| t.id.clone())
                .collect();
            for task_id in stale {
                if let Some(task) = room.remove_task(&task_id) {
                    info!(room = %room_name, task_id = %task_id, status = %task.status, "expired task");
                }
                report.expired.push(task_id);
            }
        }

        self.registry.last_cleanup = Some(ctx.tick);
        if !report.is_empty() {
            info!(
                tick = ctx.tick,
                purged = report.purged.len(),
                recycled = report.recycled.len(),
                orphaned = report.orphaned_workers.len(),
                expired = report.expired.len(),
                "task cleanup"
            );
        }
        report
    }

    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.registry.task(task_id)
    }

    /// Task the worker is currently indexed against.
    #[must_use]
    pub fn creep_task(&self, worker: &str) -> Option<&Task> {
        let (room, task_id) = self.registry.worker_entry(worker)?;
        self.registry.room(room)?.tasks.get(task_id)
    }

    #[must_use]
    pub fn pending_tasks(&self) -> Vec<&Task> {
        self.registry
            .tasks()
            .filter(|t| t.status == TaskStatus::Pending)
            .collect()
    }

    #[must_use]
    pub fn active_tasks(&self) -> Vec<&Task> {
        self.registry
            .tasks()
            .filter(|t| matches!(t.status, TaskStatus::Assigned | TaskStatus::InProgress))
            .collect()
    }

    #[must_use]
    pub fn tasks_by_room(&self, room: &str) -> Vec<&Task> {
        self.registry
            .room(room)
            .map(|r| r.tasks.values().collect())
            .unwrap_or_default()
    }

    /// Tasks in `room` that could take one more worker, best first.
    #[must_use]
    pub fn assignable_tasks(&self, room: &str) -> Vec<&Task> {
        let mut out: Vec<&Task> = self
            .tasks_by_room(room)
            .into_iter()
            .filter(|t| t.accepts_assignment() && !t.is_full())
            .collect();
        out.sort_by(|a, b| {
            b.base_priority
                .cmp(&a.base_priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    #[must_use]
    pub fn stats(&self) -> TaskStats {
        let rooms = self
            .registry
            .rooms
            .iter()
            .map(|(name, r)| {
                let stats = RoomStats {
                    counters: r.counters,
                    pending: r.count_by_status(TaskStatus::Pending),
                    assigned: r.count_by_status(TaskStatus::Assigned),
                    in_progress: r.count_by_status(TaskStatus::InProgress),
                    awaiting_cleanup: r.completed.len(),
                    busy_workers: r.creep_tasks.len(),
                };
                (name.clone(), stats)
            })
            .collect();
        TaskStats {
            rooms,
            totals: self.registry.totals(),
        }
    }

    fn room_of_mut(&mut self, task_id: &str) -> Option<&mut RoomTasks> {
        let room = self.registry.locate(task_id)?.clone();
        self.registry.room_mut(&room)
    }

    fn task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.room_of_mut(task_id)?.tasks.get_mut(task_id)
    }
}

/// Removes a worker from a task, dropping back to pending once nobody is left.
fn detach(task: &mut Task, worker: &str, tick: u64) {
    task.assigned_creeps.retain(|w| w != worker);
    task.fsm.leave(worker);
    task.updated_at = tick;
    if task.assigned_creeps.is_empty() && !task.status.is_terminal() {
        task.status = TaskStatus::Pending;
    }
}

/// Puts a finished persistent task back in the pool as if it were new.
/// The expiry window counts from the recycle tick.
fn recycle(task: &mut Task, tick: u64) {
    task.status = TaskStatus::Pending;
    task.created_at = tick;
    task.assigned_creeps.clear();
    task.started_at = None;
    task.completed_at = None;
    task.retry_count = 0;
    task.last_error = None;
    task.updated_at = tick;
    task.fsm.reset();
}

fn transition_allowed(from: TaskStatus, to: TaskStatus, unassigned: bool) -> bool {
    use TaskStatus::{Assigned, Completed, Failed, InProgress, Pending};
    match (from, to) {
        (Completed | Failed, _) => false,
        (_, Failed) => true,
        (Assigned, InProgress) => !unassigned,
        (InProgress, Completed) => true,
        (Pending | Assigned | InProgress, _) => false,
    }
}
