#![forbid(unsafe_code)]

//! Per-kind state tables.
//!
//! The engine only initialises and stores these. Moving a worker from one
//! state to the next is the job of whoever executes the task.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::task::model::TaskType;
use crate::world::WorkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestState {
    #[default]
    Init,
    MovingToSource,
    Harvesting,
    Delivering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    #[default]
    Init,
    MovingToSource,
    Withdrawing,
    MovingToTarget,
    Transferring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    #[default]
    Init,
    Collecting,
    MovingToSite,
    Building,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    #[default]
    Init,
    Collecting,
    MovingToTarget,
    Repairing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeState {
    #[default]
    Init,
    Collecting,
    MovingToController,
    Upgrading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackState {
    #[default]
    Init,
    Rallying,
    Engaging,
    Retreating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "state", rename_all = "lowercase")]
pub enum FsmState {
    Harvest(HarvestState),
    Transport(TransportState),
    Build(BuildState),
    Repair(RepairState),
    Upgrade(UpgradeState),
    Attack(AttackState),
}

impl FsmState {
    /// Entry state of every task kind.
    #[must_use]
    pub fn initial(kind: TaskType) -> Self {
        match kind {
            TaskType::Harvest => Self::Harvest(HarvestState::Init),
            TaskType::Transport => Self::Transport(TransportState::Init),
            TaskType::Build => Self::Build(BuildState::Init),
            TaskType::Repair => Self::Repair(RepairState::Init),
            TaskType::Upgrade => Self::Upgrade(UpgradeState::Init),
            TaskType::Attack => Self::Attack(AttackState::Init),
        }
    }

    #[must_use]
    pub fn kind(self) -> TaskType {
        match self {
            Self::Harvest(_) => TaskType::Harvest,
            Self::Transport(_) => TaskType::Transport,
            Self::Build(_) => TaskType::Build,
            Self::Repair(_) => TaskType::Repair,
            Self::Upgrade(_) => TaskType::Upgrade,
            Self::Attack(_) => TaskType::Attack,
        }
    }

    #[must_use]
    pub fn is_initial(self) -> bool {
        self == Self::initial(self.kind())
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Harvest(s) => write!(f, "harvest:{s:?}"),
            Self::Transport(s) => write!(f, "transport:{s:?}"),
            Self::Build(s) => write!(f, "build:{s:?}"),
            Self::Repair(s) => write!(f, "repair:{s:?}"),
            Self::Upgrade(s) => write!(f, "upgrade:{s:?}"),
            Self::Attack(s) => write!(f, "attack:{s:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFsm {
    pub kind: TaskType,
    pub task_state: FsmState,
    #[serde(default)]
    pub creep_states: BTreeMap<WorkerId, FsmState>,
    #[serde(default)]
    pub group_id: Option<String>,
}

impl TaskFsm {
    #[must_use]
    pub fn new(kind: TaskType, group_id: Option<String>) -> Self {
        Self {
            kind,
            task_state: FsmState::initial(kind),
            creep_states: BTreeMap::new(),
            group_id,
        }
    }

    pub fn enter(&mut self, worker: &str) {
        self.creep_states
            .insert(worker.to_owned(), FsmState::initial(self.kind));
    }

    pub fn leave(&mut self, worker: &str) {
        self.creep_states.remove(worker);
    }

    /// Returns false when `state` belongs to another task kind.
    pub fn set_task_state(&mut self, state: FsmState) -> bool {
        if state.kind() != self.kind {
            return false;
        }
        self.task_state = state;
        true
    }

    /// Returns false for a worker that never entered or a state of another kind.
    pub fn set_creep_state(&mut self, worker: &str, state: FsmState) -> bool {
        if state.kind() != self.kind {
            return false;
        }
        match self.creep_states.get_mut(worker) {
            Some(slot) => {
                *slot = state;
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.task_state = FsmState::initial(self.kind);
        self.creep_states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_starts_at_init() {
        for kind in TaskType::ALL {
            let fsm = TaskFsm::new(kind, None);
            assert_eq!(fsm.task_state.kind(), kind);
            assert!(fsm.task_state.is_initial());
        }
    }

    #[test]
    fn states_of_another_kind_are_rejected() {
        let mut fsm = TaskFsm::new(TaskType::Transport, None);
        fsm.enter("w1");
        assert!(!fsm.set_task_state(FsmState::Build(BuildState::Building)));
        assert!(!fsm.set_creep_state("w1", FsmState::Harvest(HarvestState::Harvesting)));
        assert!(fsm.set_creep_state("w1", FsmState::Transport(TransportState::Withdrawing)));
        assert!(!fsm.set_creep_state("ghost", FsmState::Transport(TransportState::Withdrawing)));
    }

    #[test]
    fn leaving_drops_worker_state() {
        let mut fsm = TaskFsm::new(TaskType::Harvest, Some("g1".to_owned()));
        fsm.enter("w1");
        fsm.leave("w1");
        assert!(fsm.creep_states.is_empty());
    }
}
