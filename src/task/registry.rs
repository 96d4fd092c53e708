#![forbid(unsafe_code)]

//! Durable per-room task store and the two assignment indexes.
//!
//! Only the engine mutates this. Every field is persisted verbatim between
//! ticks, so the indexes must always agree with `Task::assigned_creeps`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::task::model::{Task, TaskId, TaskStatus};
use crate::world::{RoomName, WorkerId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskCounters {
    pub tasks_created: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

impl TaskCounters {
    pub fn absorb(&mut self, other: &TaskCounters) {
        self.tasks_created += other.tasks_created;
        self.tasks_completed += other.tasks_completed;
        self.tasks_failed += other.tasks_failed;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomTasks {
    pub tasks: BTreeMap<TaskId, Task>,
    pub creep_tasks: BTreeMap<WorkerId, TaskId>,
    pub task_assignees: BTreeMap<TaskId, Vec<WorkerId>>,
    /// Terminal tasks waiting for the next cleanup pass.
    pub completed: Vec<TaskId>,
    pub counters: TaskCounters,
}

impl RoomTasks {
    pub fn link(&mut self, task_id: &str, worker: &str) {
        self.creep_tasks
            .insert(worker.to_owned(), task_id.to_owned());
        let assignees = self.task_assignees.entry(task_id.to_owned()).or_default();
        if !assignees.iter().any(|w| w == worker) {
            assignees.push(worker.to_owned());
        }
    }

    pub fn unlink(&mut self, task_id: &str, worker: &str) {
        if self.creep_tasks.get(worker).is_some_and(|t| t == task_id) {
            self.creep_tasks.remove(worker);
        }
        if let Some(assignees) = self.task_assignees.get_mut(task_id) {
            assignees.retain(|w| w != worker);
            if assignees.is_empty() {
                self.task_assignees.remove(task_id);
            }
        }
    }

    /// Clears every index entry that points at `task_id`.
    pub fn unlink_task(&mut self, task_id: &str) {
        self.creep_tasks.retain(|_, t| t != task_id);
        self.task_assignees.remove(task_id);
    }

    pub fn queue_for_removal(&mut self, task_id: &str) {
        if !self.completed.iter().any(|t| t == task_id) {
            self.completed.push(task_id.to_owned());
        }
    }

    pub fn remove_task(&mut self, task_id: &str) -> Option<Task> {
        self.unlink_task(task_id);
        self.completed.retain(|t| t != task_id);
        self.tasks.remove(task_id)
    }

    #[must_use]
    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|t| t.status == status).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskRegistry {
    pub rooms: BTreeMap<RoomName, RoomTasks>,
    pub last_cleanup: Option<u64>,
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn room(&self, room: &str) -> Option<&RoomTasks> {
        self.rooms.get(room)
    }

    pub fn room_mut(&mut self, room: &str) -> Option<&mut RoomTasks> {
        self.rooms.get_mut(room)
    }

    pub fn room_entry(&mut self, room: &str) -> &mut RoomTasks {
        self.rooms.entry(room.to_owned()).or_default()
    }

    /// Room that owns `task_id`.
    #[must_use]
    pub fn locate(&self, task_id: &str) -> Option<&RoomName> {
        self.rooms
            .iter()
            .find(|(_, r)| r.tasks.contains_key(task_id))
            .map(|(name, _)| name)
    }

    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.rooms.values().find_map(|r| r.tasks.get(task_id))
    }

    /// Room and task id a worker is currently indexed against.
    #[must_use]
    pub fn worker_entry(&self, worker: &str) -> Option<(&RoomName, &TaskId)> {
        self.rooms
            .iter()
            .find_map(|(name, r)| r.creep_tasks.get(worker).map(|t| (name, t)))
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.rooms.values().flat_map(|r| r.tasks.values())
    }

    #[must_use]
    pub fn totals(&self) -> TaskCounters {
        let mut out = TaskCounters::default();
        for r in self.rooms.values() {
            out.absorb(&r.counters);
        }
        out
    }
}
