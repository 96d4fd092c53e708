#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::fsm::TaskFsm;
use crate::world::{ObjectId, Position, ResourceType, RoomName, StructureKind, WorkerId};

pub type TaskId = String;

pub mod priority {
    pub const CRITICAL: u8 = 100;
    pub const HIGH: u8 = 75;
    pub const NORMAL: u8 = 50;
    pub const LOW: u8 = 25;
    pub const IDLE: u8 = 0;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Harvest,
    Transport,
    Build,
    Repair,
    Upgrade,
    Attack,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        Self::Harvest,
        Self::Transport,
        Self::Build,
        Self::Repair,
        Self::Upgrade,
        Self::Attack,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Harvest => "harvest",
            Self::Transport => "transport",
            Self::Build => "build",
            Self::Repair => "repair",
            Self::Upgrade => "upgrade",
            Self::Attack => "attack",
        }
    }

    /// Assignment semantics, assignee cap, lifetime and retry budget for new tasks.
    #[must_use]
    pub fn defaults(self) -> TaskDefaults {
        let (assignment, max_assignees, lifetime, max_retries) = match self {
            Self::Harvest => (AssignmentType::Shared, 3, Lifetime::Persistent, 3),
            Self::Transport => (AssignmentType::Exclusive, 1, Lifetime::Once, 2),
            Self::Build => (AssignmentType::Shared, 5, Lifetime::Once, 3),
            Self::Repair => (AssignmentType::Shared, 2, Lifetime::Once, 3),
            Self::Upgrade => (AssignmentType::Shared, 4, Lifetime::Persistent, 3),
            Self::Attack => (AssignmentType::Shared, 10, Lifetime::Once, 3),
        };
        TaskDefaults {
            assignment,
            max_assignees,
            lifetime,
            max_retries,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDefaults {
    pub assignment: AssignmentType,
    pub max_assignees: usize,
    pub lifetime: Lifetime,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentType {
    Exclusive,
    Shared,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    Once,
    Persistent,
}

/// Kind-specific payload. The variant decides the task type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskParams {
    Harvest {
        source_id: ObjectId,
        source_pos: Position,
        #[serde(default)]
        container_id: Option<ObjectId>,
    },
    Transport {
        #[serde(default)]
        source_id: Option<ObjectId>,
        source_pos: Position,
        target_id: ObjectId,
        target_pos: Position,
        resource: ResourceType,
        amount: u32,
        #[serde(default)]
        matched_at: Option<u64>,
    },
    Build {
        site_id: ObjectId,
        pos: Position,
        structure: StructureKind,
    },
    Repair {
        target_id: ObjectId,
        pos: Position,
    },
    Upgrade {
        controller_id: ObjectId,
        pos: Position,
    },
    Attack {
        target_room: RoomName,
        #[serde(default)]
        target_id: Option<ObjectId>,
        #[serde(default)]
        rally_pos: Option<Position>,
    },
}

impl TaskParams {
    #[must_use]
    pub fn task_type(&self) -> TaskType {
        match self {
            Self::Harvest { .. } => TaskType::Harvest,
            Self::Transport { .. } => TaskType::Transport,
            Self::Build { .. } => TaskType::Build,
            Self::Repair { .. } => TaskType::Repair,
            Self::Upgrade { .. } => TaskType::Upgrade,
            Self::Attack { .. } => TaskType::Attack,
        }
    }

    /// World object the task works against, if it has one.
    #[must_use]
    pub fn target_id(&self) -> Option<&str> {
        match self {
            Self::Harvest { source_id, .. } => Some(source_id),
            Self::Transport { target_id, .. } => Some(target_id),
            Self::Build { site_id, .. } => Some(site_id),
            Self::Repair { target_id, .. } => Some(target_id),
            Self::Upgrade { controller_id, .. } => Some(controller_id),
            Self::Attack { target_id, .. } => target_id.as_deref(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Harvest { source_id, .. } => format!("harvest {source_id}"),
            Self::Transport {
                source_id,
                source_pos,
                target_id,
                resource,
                amount,
                ..
            } => {
                let from = source_id
                    .clone()
                    .unwrap_or_else(|| source_pos.to_string());
                format!("{amount} {resource} {from} -> {target_id}")
            }
            Self::Build {
                site_id, structure, ..
            } => format!("build {structure} {site_id}"),
            Self::Repair { target_id, .. } => format!("repair {target_id}"),
            Self::Upgrade { controller_id, .. } => format!("upgrade {controller_id}"),
            Self::Attack { target_room, .. } => format!("attack {target_room}"),
        }
    }
}

/// Creation request handed to the engine by planners or the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub room: RoomName,
    pub params: TaskParams,
    #[serde(default)]
    pub base_priority: Option<u8>,
    #[serde(default)]
    pub max_assignees: Option<usize>,
    #[serde(default)]
    pub group_id: Option<String>,
}

impl TaskSpec {
    #[must_use]
    pub fn new(room: impl Into<RoomName>, params: TaskParams) -> Self {
        Self {
            room: room.into(),
            params,
            base_priority: None,
            max_assignees: None,
            group_id: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.base_priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_max_assignees(mut self, max: usize) -> Self {
        self.max_assignees = Some(max);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub assignment: AssignmentType,
    pub lifetime: Lifetime,
    pub max_assignees: usize,
    pub assigned_creeps: Vec<WorkerId>,
    pub base_priority: u8,
    pub room: RoomName,
    pub params: TaskParams,

    pub created_at: u64,
    pub updated_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default)]
    pub last_error: Option<String>,

    pub fsm: TaskFsm,
}

impl Task {
    #[must_use]
    pub fn new_id() -> TaskId {
        Uuid::new_v4().simple().to_string()
    }

    #[must_use]
    pub fn is_assigned_to(&self, worker: &str) -> bool {
        self.assigned_creeps.iter().any(|w| w == worker)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.assigned_creeps.len() >= self.max_assignees
    }

    /// Whether the status alone allows another worker to join.
    #[must_use]
    pub fn accepts_assignment(&self) -> bool {
        match self.assignment {
            AssignmentType::Exclusive => self.status == TaskStatus::Pending,
            AssignmentType::Shared => matches!(
                self.status,
                TaskStatus::Pending | TaskStatus::Assigned | TaskStatus::InProgress
            ),
        }
    }

    #[must_use]
    pub fn age(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_defaults_are_exclusive_single_once() {
        let d = TaskType::Transport.defaults();
        assert_eq!(d.assignment, AssignmentType::Exclusive);
        assert_eq!(d.max_assignees, 1);
        assert_eq!(d.lifetime, Lifetime::Once);
        assert_eq!(d.max_retries, 2);
    }

    #[test]
    fn shared_defaults_match_table() {
        assert_eq!(TaskType::Harvest.defaults().max_assignees, 3);
        assert_eq!(TaskType::Build.defaults().max_assignees, 5);
        assert_eq!(TaskType::Upgrade.defaults().max_assignees, 4);
        assert_eq!(TaskType::Attack.defaults().max_assignees, 10);
        assert_eq!(TaskType::Harvest.defaults().lifetime, Lifetime::Persistent);
        assert_eq!(TaskType::Upgrade.defaults().lifetime, Lifetime::Persistent);
    }

    #[test]
    fn params_decide_task_type() {
        let params = TaskParams::Upgrade {
            controller_id: "ctrl".to_owned(),
            pos: Position::new(20, 20, "W1N1"),
        };
        assert_eq!(params.task_type(), TaskType::Upgrade);
        assert_eq!(params.target_id(), Some("ctrl"));
    }

    #[test]
    fn unknown_task_type_fails_to_deserialize() {
        let raw = r#"{"type":"dance","target_id":"x"}"#;
        assert!(serde_json::from_str::<TaskParams>(raw).is_err());
    }

    #[test]
    fn task_ids_are_unique() {
        let a = Task::new_id();
        let b = Task::new_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
    }
}
