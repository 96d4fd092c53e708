#![forbid(unsafe_code)]

//! Scenario files and the demo worker used by `colony run`.
//!
//! Workers act through intents: [`SimExecutor::execute`] decides what every
//! worker does this tick and reports status to the engine, then
//! [`SimExecutor::resolve`] applies the intents to the world once the tick's
//! pipeline is over.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::colony::{Colony, Notification, TickReport, WorkerExecutor};
use crate::context::TickContext;
use crate::error::ColonyError;
use crate::logistics::{ConsumerInfo, ConsumerKind, LogisticsRole, ProviderInfo, ProviderKind, ProviderStatus};
use crate::task::engine::TaskEngine;
use crate::task::fsm::{AttackState, BuildState, FsmState, HarvestState, RepairState, TransportState, UpgradeState};
use crate::task::model::{Task, TaskId, TaskParams, TaskSpec, TaskStatus};
use crate::world::{
    ObjectId, ObjectKind, Position, ResourceType, RoomName, SimObject, SimWorld, Store, StructureKind, WorkerId, World,
};

pub const HARVEST_PER_TICK: u32 = 10;
pub const WORK_TICKS: u32 = 3;
const DEFAULT_CARRY: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub pos: Position,
    #[serde(default)]
    pub capacity: Option<u32>,
    /// Restricts the capacity to one resource.
    #[serde(default)]
    pub accepts: Option<ResourceType>,
    #[serde(default)]
    pub resources: BTreeMap<ResourceType, u32>,
}

impl ObjectSpec {
    fn store(&self) -> Option<Store> {
        let base = match (self.capacity, self.accepts) {
            (Some(c), Some(r)) => Store::single(r, c),
            (Some(c), None) => Store::shared(c),
            (None, _) if self.resources.is_empty() => return None,
            (None, _) => Store::default(),
        };
        Some(
            self.resources
                .iter()
                .fold(base, |store, (r, amount)| store.with(*r, *amount)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub id: WorkerId,
    pub pos: Position,
    #[serde(default = "default_carry")]
    pub carry: u32,
}

fn default_carry() -> u32 {
    DEFAULT_CARRY
}

fn default_resource() -> ResourceType {
    ResourceType::Energy
}

/// Explicit logistics registration of a scenario object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogisticsEntry {
    pub id: ObjectId,
    pub role: LogisticsRole,
    #[serde(default = "default_resource")]
    pub resource: ResourceType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioAction {
    KillWorker {
        worker: WorkerId,
    },
    CompleteSite {
        site_id: ObjectId,
        new_id: ObjectId,
    },
    DropResource {
        id: ObjectId,
        pos: Position,
        resource: ResourceType,
        amount: u32,
    },
    CreateTask {
        spec: TaskSpec,
    },
    PlanStructure {
        structure: StructureKind,
        pos: Position,
        role: LogisticsRole,
        #[serde(default = "default_resource")]
        resource: ResourceType,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Applied right before this tick runs.
    pub at: u64,
    pub action: ScenarioAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: Option<String>,
    pub rooms: Vec<RoomName>,
    pub objects: Vec<ObjectSpec>,
    pub blocked: Vec<Position>,
    pub workers: Vec<WorkerSpec>,
    pub logistics: Vec<LogisticsEntry>,
    pub tasks: Vec<TaskSpec>,
    pub events: Vec<ScheduledEvent>,
}

impl Scenario {
    pub fn from_yaml(raw: &str) -> Result<Self, ColonyError> {
        let scenario: Self =
            serde_yaml::from_str(raw).map_err(|e| ColonyError::Scenario(e.to_string()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("failed to load scenario {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ColonyError> {
        let mut ids = BTreeSet::new();
        for id in self
            .objects
            .iter()
            .map(|o| &o.id)
            .chain(self.workers.iter().map(|w| &w.id))
        {
            if !ids.insert(id.as_str()) {
                return Err(ColonyError::Scenario(format!("duplicate object id '{id}'")));
            }
        }
        for entry in &self.logistics {
            let Some(obj) = self.objects.iter().find(|o| o.id == entry.id) else {
                return Err(ColonyError::Scenario(format!(
                    "logistics entry '{}' does not name an object",
                    entry.id
                )));
            };
            let usable = match entry.role {
                LogisticsRole::Provider => ProviderKind::from_object(obj.kind).is_some(),
                LogisticsRole::Consumer => ConsumerKind::from_object(obj.kind).is_some(),
            };
            if !usable {
                return Err(ColonyError::Scenario(format!(
                    "{} '{}' cannot act as {:?}",
                    obj.kind, obj.id, entry.role
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn world(&self) -> SimWorld {
        let mut world = SimWorld::new();
        for spec in &self.objects {
            let mut obj = SimObject::new(spec.id.clone(), spec.kind, spec.pos.clone());
            obj.store = spec.store();
            world.insert(obj);
        }
        for w in &self.workers {
            world.insert(
                SimObject::new(w.id.clone(), ObjectKind::Creep, w.pos.clone())
                    .with_store(Store::shared(w.carry)),
            );
        }
        for pos in &self.blocked {
            world.block(pos.clone());
        }
        world
    }

    /// Registers the scenario's rooms, logistics entries and initial tasks.
    pub fn seed(&self, colony: &mut Colony) {
        for room in &self.rooms {
            colony.watch_room(room);
        }
        for entry in &self.logistics {
            let Some(obj) = self.objects.iter().find(|o| o.id == entry.id) else {
                continue;
            };
            let under_construction = matches!(obj.kind, ObjectKind::ConstructionSite(_));
            match entry.role {
                LogisticsRole::Provider => {
                    if let Some(kind) = ProviderKind::from_object(obj.kind) {
                        let status = if under_construction {
                            ProviderStatus::UnderConstruction
                        } else {
                            ProviderStatus::Ready
                        };
                        colony.logistics_mut().set_provider(
                            &obj.pos.room,
                            ProviderInfo::new(obj.id.clone(), kind, obj.pos.clone(), entry.resource)
                                .with_status(status),
                        );
                    }
                }
                LogisticsRole::Consumer => {
                    if let Some(kind) = ConsumerKind::from_object(obj.kind) {
                        colony.logistics_mut().set_consumer(
                            &obj.pos.room,
                            ConsumerInfo::new(obj.id.clone(), kind, obj.pos.clone(), entry.resource),
                        );
                    }
                }
            }
        }
        for spec in &self.tasks {
            colony.notify(Notification::CreateTask(spec.clone()));
        }
    }

    #[must_use]
    pub fn into_simulation(self, colony: &mut Colony) -> Simulation {
        self.seed(colony);
        let world = self.world();
        let executor = SimExecutor::new(self.workers.iter().map(|w| w.id.clone()));
        let mut events = self.events;
        events.sort_by_key(|e| e.at);
        Simulation {
            world,
            executor,
            events,
        }
    }
}

/// A scenario in motion: the world, its workers and the scripted events left.
#[derive(Debug)]
pub struct Simulation {
    pub world: SimWorld,
    pub executor: SimExecutor,
    events: Vec<ScheduledEvent>,
}

impl Simulation {
    pub fn step(&mut self, colony: &mut Colony) -> TickReport {
        let next = colony.tick() + 1;
        let due = self.events.partition_point(|e| e.at <= next);
        for event in self.events.drain(..due).collect::<Vec<_>>() {
            self.apply(event.action, colony);
        }

        let report = colony.run_tick(&self.world, &mut self.executor);
        for notification in self.executor.resolve(&mut self.world) {
            colony.notify(notification);
        }
        report
    }

    #[must_use]
    pub fn remaining_events(&self) -> usize {
        self.events.len()
    }

    fn apply(&mut self, action: ScenarioAction, colony: &mut Colony) {
        match action {
            ScenarioAction::KillWorker { worker } => {
                if self.world.remove(&worker).is_some() {
                    info!(worker = %worker, "worker died");
                    colony.notify(Notification::WorkerDied { worker });
                }
            }
            ScenarioAction::CompleteSite { site_id, new_id } => {
                let Some(site) = self.world.get(&site_id).cloned() else {
                    return;
                };
                let ObjectKind::ConstructionSite(structure) = site.kind else {
                    return;
                };
                if self
                    .world
                    .complete_site(&site_id, new_id, default_store(structure))
                {
                    colony.notify(Notification::ConstructionCompleted {
                        pos: site.pos,
                        structure,
                        old_id: site_id,
                    });
                }
            }
            ScenarioAction::DropResource {
                id,
                pos,
                resource,
                amount,
            } => {
                self.world.insert(
                    SimObject::new(id, ObjectKind::DroppedResource, pos)
                        .with_store(Store::pile(resource, amount)),
                );
            }
            ScenarioAction::CreateTask { spec } => colony.notify(Notification::CreateTask(spec)),
            ScenarioAction::PlanStructure {
                structure,
                pos,
                role,
                resource,
            } => colony.notify(Notification::ConstructionPlanUpdated {
                room: pos.room.clone(),
                structure,
                pos,
                role,
                resource,
            }),
        }
    }
}

/// Inventory a freshly finished structure starts with.
#[must_use]
pub fn default_store(kind: StructureKind) -> Option<Store> {
    let energy = |c| Some(Store::single(ResourceType::Energy, c));
    match kind {
        StructureKind::Spawn => energy(300),
        StructureKind::Extension => energy(50),
        StructureKind::Tower => energy(1000),
        StructureKind::Link => energy(800),
        StructureKind::Lab => energy(2000),
        StructureKind::PowerSpawn => energy(5000),
        StructureKind::Nuker => energy(300_000),
        StructureKind::Container => Some(Store::shared(2000)),
        StructureKind::Storage => Some(Store::shared(1_000_000)),
        StructureKind::Terminal => Some(Store::shared(300_000)),
        StructureKind::Factory => Some(Store::shared(50_000)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Move {
        worker: WorkerId,
        to: Position,
    },
    Transfer {
        from: ObjectId,
        to: ObjectId,
        resource: ResourceType,
        amount: u32,
    },
    Drop {
        worker: WorkerId,
        resource: ResourceType,
    },
    CompleteSite {
        site_id: ObjectId,
        structure: StructureKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Stay,
    Enter(FsmState),
    Complete,
    Fail(String),
    GiveUp(String),
}

/// Demo worker: walks one tile per tick, moves goods with transfers and
/// finishes stationary work after [`WORK_TICKS`] ticks on site.
#[derive(Debug, Default)]
pub struct SimExecutor {
    workers: Vec<WorkerId>,
    progress: BTreeMap<WorkerId, (TaskId, u32)>,
    intents: Vec<Intent>,
    drops: u64,
}

impl SimExecutor {
    pub fn new(workers: impl IntoIterator<Item = WorkerId>) -> Self {
        Self {
            workers: workers.into_iter().collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn pending_intents(&self) -> &[Intent] {
        &self.intents
    }

    /// Applies this tick's intents; returns what the colony should hear about.
    pub fn resolve(&mut self, world: &mut SimWorld) -> Vec<Notification> {
        let mut out = Vec::new();
        for intent in std::mem::take(&mut self.intents) {
            match intent {
                Intent::Move { worker, to } => {
                    world.set_position(&worker, to);
                }
                Intent::Transfer {
                    from,
                    to,
                    resource,
                    amount,
                } => {
                    let moved = world.transfer(&from, &to, resource, amount);
                    debug!(from = %from, to = %to, %resource, moved, "transfer");
                }
                Intent::Drop { worker, resource } => {
                    self.drops += 1;
                    let pile = format!("drop-{worker}-{}", self.drops);
                    world.drop_resource(&worker, resource, pile);
                }
                Intent::CompleteSite { site_id, structure } => {
                    let Some(pos) = world.get(&site_id).map(|o| o.pos.clone()) else {
                        continue;
                    };
                    let new_id = format!("{structure}-{site_id}");
                    if world.complete_site(&site_id, new_id, default_store(structure)) {
                        out.push(Notification::ConstructionCompleted {
                            pos,
                            structure,
                            old_id: site_id,
                        });
                    }
                }
            }
        }
        out
    }

    fn pick_task(&self, ctx: &TickContext<'_>, engine: &mut TaskEngine, worker: &str, room: &str) -> bool {
        let candidates: Vec<TaskId> = engine
            .assignable_tasks(room)
            .iter()
            .map(|t| t.id.clone())
            .collect();
        candidates.iter().any(|id| engine.assign_task(ctx, id, worker))
    }

    fn advance(&mut self, ctx: &TickContext<'_>, worker: &str, at: &Position, task: &Task) -> Step {
        let state = task
            .fsm
            .creep_states
            .get(worker)
            .copied()
            .unwrap_or(task.fsm.task_state);
        let world = ctx.world;
        let store = world.object_store(worker).unwrap_or_default();

        match (&task.params, state) {
            (
                TaskParams::Transport {
                    source_id,
                    source_pos,
                    target_id,
                    target_pos,
                    resource,
                    amount,
                    ..
                },
                FsmState::Transport(s),
            ) => {
                let carried = store.used(*resource);
                if !world.object_exists(target_id) {
                    return Step::Fail("delivery target is gone".to_owned());
                }
                match s {
                    TransportState::Init | TransportState::MovingToSource => {
                        let source_gone = source_id.as_deref().is_some_and(|id| !world.object_exists(id));
                        if carried >= *amount || (source_gone && carried > 0) {
                            Step::Enter(FsmState::Transport(TransportState::MovingToTarget))
                        } else if source_gone {
                            Step::GiveUp("source is gone".to_owned())
                        } else {
                            self.approach(
                                worker,
                                at,
                                source_pos,
                                FsmState::Transport(TransportState::MovingToSource),
                                FsmState::Transport(TransportState::Withdrawing),
                            )
                        }
                    }
                    TransportState::Withdrawing => {
                        let Some(source) = source_id else {
                            return Step::GiveUp("nothing to withdraw from".to_owned());
                        };
                        self.intents.push(Intent::Transfer {
                            from: source.clone(),
                            to: worker.to_owned(),
                            resource: *resource,
                            amount: amount.saturating_sub(carried),
                        });
                        Step::Enter(FsmState::Transport(TransportState::MovingToTarget))
                    }
                    TransportState::MovingToTarget => self.approach(
                        worker,
                        at,
                        target_pos,
                        FsmState::Transport(TransportState::MovingToTarget),
                        FsmState::Transport(TransportState::Transferring),
                    ),
                    TransportState::Transferring => {
                        if carried == 0 {
                            return Step::GiveUp("arrived empty-handed".to_owned());
                        }
                        self.intents.push(Intent::Transfer {
                            from: worker.to_owned(),
                            to: target_id.clone(),
                            resource: *resource,
                            amount: carried,
                        });
                        Step::Complete
                    }
                }
            }
            (
                TaskParams::Harvest {
                    source_id,
                    source_pos,
                    container_id,
                },
                FsmState::Harvest(s),
            ) => {
                if !world.object_exists(source_id) {
                    return Step::Fail("source is gone".to_owned());
                }
                match s {
                    HarvestState::Init | HarvestState::MovingToSource => self.approach(
                        worker,
                        at,
                        source_pos,
                        FsmState::Harvest(HarvestState::MovingToSource),
                        FsmState::Harvest(HarvestState::Harvesting),
                    ),
                    HarvestState::Harvesting => {
                        let free = store.free(ResourceType::Energy);
                        let left = world
                            .object_store(source_id)
                            .map_or(0, |s| s.used(ResourceType::Energy));
                        if free == 0 || left == 0 {
                            return Step::Enter(FsmState::Harvest(HarvestState::Delivering));
                        }
                        self.intents.push(Intent::Transfer {
                            from: source_id.clone(),
                            to: worker.to_owned(),
                            resource: ResourceType::Energy,
                            amount: free.min(HARVEST_PER_TICK),
                        });
                        Step::Enter(FsmState::Harvest(HarvestState::Harvesting))
                    }
                    HarvestState::Delivering => {
                        let carried = store.used(ResourceType::Energy);
                        let container = container_id
                            .as_ref()
                            .and_then(|id| world.object_position(id).map(|p| (id, p)));
                        match container {
                            Some((id, pos)) => {
                                if at.range_to(&pos).is_none_or(|d| d > 1) {
                                    return self.approach(
                                        worker,
                                        at,
                                        &pos,
                                        FsmState::Harvest(HarvestState::Delivering),
                                        FsmState::Harvest(HarvestState::Delivering),
                                    );
                                }
                                self.intents.push(Intent::Transfer {
                                    from: worker.to_owned(),
                                    to: id.clone(),
                                    resource: ResourceType::Energy,
                                    amount: carried,
                                });
                            }
                            None if carried > 0 => self.intents.push(Intent::Drop {
                                worker: worker.to_owned(),
                                resource: ResourceType::Energy,
                            }),
                            None => {}
                        }
                        Step::Complete
                    }
                }
            }
            (TaskParams::Build { site_id, pos, structure }, FsmState::Build(s)) => {
                if !world.object_exists(site_id) {
                    return Step::Complete;
                }
                match s {
                    BuildState::Building => {
                        if self.work(worker, &task.id) {
                            self.intents.push(Intent::CompleteSite {
                                site_id: site_id.clone(),
                                structure: *structure,
                            });
                            Step::Complete
                        } else {
                            Step::Stay
                        }
                    }
                    _ => self.approach(
                        worker,
                        at,
                        pos,
                        FsmState::Build(BuildState::MovingToSite),
                        FsmState::Build(BuildState::Building),
                    ),
                }
            }
            (TaskParams::Repair { target_id, pos }, FsmState::Repair(s)) => {
                if !world.object_exists(target_id) {
                    return Step::Fail("repair target is gone".to_owned());
                }
                match s {
                    RepairState::Repairing => self.finish_work(worker, &task.id),
                    _ => self.approach(
                        worker,
                        at,
                        pos,
                        FsmState::Repair(RepairState::MovingToTarget),
                        FsmState::Repair(RepairState::Repairing),
                    ),
                }
            }
            (TaskParams::Upgrade { controller_id, pos }, FsmState::Upgrade(s)) => {
                if !world.object_exists(controller_id) {
                    return Step::Fail("controller is gone".to_owned());
                }
                match s {
                    UpgradeState::Upgrading => self.finish_work(worker, &task.id),
                    _ => self.approach(
                        worker,
                        at,
                        pos,
                        FsmState::Upgrade(UpgradeState::MovingToController),
                        FsmState::Upgrade(UpgradeState::Upgrading),
                    ),
                }
            }
            (
                TaskParams::Attack {
                    target_room,
                    target_id,
                    rally_pos,
                },
                FsmState::Attack(s),
            ) => {
                if *target_room != at.room {
                    return Step::GiveUp(format!("{target_room} is out of reach"));
                }
                if target_id.as_deref().is_some_and(|id| !world.object_exists(id)) {
                    return Step::Complete;
                }
                match (s, rally_pos) {
                    (AttackState::Init | AttackState::Rallying, Some(rally)) => self.approach(
                        worker,
                        at,
                        rally,
                        FsmState::Attack(AttackState::Rallying),
                        FsmState::Attack(AttackState::Engaging),
                    ),
                    (AttackState::Engaging, _) => self.finish_work(worker, &task.id),
                    (AttackState::Retreating, _) => Step::GiveUp("retreated".to_owned()),
                    _ => Step::Enter(FsmState::Attack(AttackState::Engaging)),
                }
            }
            _ => Step::Fail(format!("worker state {state} does not fit a {} task", task.task_type)),
        }
    }

    fn approach(
        &mut self,
        worker: &str,
        at: &Position,
        target: &Position,
        moving: FsmState,
        arrived: FsmState,
    ) -> Step {
        match at.range_to(target) {
            None => Step::GiveUp(format!("{target} is in another room")),
            Some(d) if d <= 1 => Step::Enter(arrived),
            Some(_) => {
                self.intents.push(Intent::Move {
                    worker: worker.to_owned(),
                    to: step_toward(at, target),
                });
                Step::Enter(moving)
            }
        }
    }

    /// Counts one tick of on-site work; true once the work is done.
    fn work(&mut self, worker: &str, task_id: &str) -> bool {
        let entry = self
            .progress
            .entry(worker.to_owned())
            .or_insert_with(|| (task_id.to_owned(), 0));
        if entry.0 != task_id {
            *entry = (task_id.to_owned(), 0);
        }
        entry.1 += 1;
        if entry.1 >= WORK_TICKS {
            self.progress.remove(worker);
            return true;
        }
        false
    }

    fn finish_work(&mut self, worker: &str, task_id: &str) -> Step {
        if self.work(worker, task_id) {
            Step::Complete
        } else {
            Step::Stay
        }
    }
}

fn step_toward(from: &Position, to: &Position) -> Position {
    let step = |a: u8, b: u8| match a.cmp(&b) {
        std::cmp::Ordering::Less => a + 1,
        std::cmp::Ordering::Greater => a - 1,
        std::cmp::Ordering::Equal => a,
    };
    Position::new(step(from.x, to.x), step(from.y, to.y), from.room.clone())
}

impl WorkerExecutor for SimExecutor {
    fn execute(&mut self, ctx: &TickContext<'_>, engine: &mut TaskEngine) {
        for worker in self.workers.clone() {
            let Some(at) = ctx.world.object_position(&worker) else {
                continue;
            };
            if engine.creep_task(&worker).is_none() && !self.pick_task(ctx, engine, &worker, &at.room) {
                continue;
            }
            let Some(task) = engine.creep_task(&worker).cloned() else {
                continue;
            };

            match self.advance(ctx, &worker, &at, &task) {
                Step::Stay => {}
                Step::Enter(state) => {
                    if task.status == TaskStatus::Assigned {
                        engine.update_task_status(ctx, &task.id, TaskStatus::InProgress);
                    }
                    engine.set_creep_state(&task.id, &worker, state);
                }
                Step::Complete => {
                    if task.status == TaskStatus::Assigned {
                        engine.update_task_status(ctx, &task.id, TaskStatus::InProgress);
                    }
                    engine.update_task_status(ctx, &task.id, TaskStatus::Completed);
                }
                Step::Fail(reason) => {
                    info!(tick = ctx.tick, task_id = %task.id, worker = %worker, %reason, "task failed");
                    engine.update_task_status(ctx, &task.id, TaskStatus::Failed);
                }
                Step::GiveUp(reason) => {
                    engine.release_for_retry(ctx, &task.id, &reason);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const DEMO: &str = include_str!("../scenarios/supply.yaml");

    #[test]
    fn demo_scenario_parses_and_builds_a_world() {
        let scenario = Scenario::from_yaml(DEMO).unwrap();
        let world = scenario.world();
        assert!(world.object_exists("spawn1"));
        assert!(world.object_exists("hauler1"));
        let spawn = world.object_store("spawn1").unwrap();
        assert_eq!(spawn.free(ResourceType::Energy), 300);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let raw = r"
objects:
  - id: a
    kind: { kind: source }
    pos: { x: 1, y: 1, room: W1N1 }
workers:
  - id: a
    pos: { x: 2, y: 2, room: W1N1 }
";
        assert!(matches!(Scenario::from_yaml(raw), Err(ColonyError::Scenario(_))));
    }

    #[test]
    fn logistics_entries_must_name_objects() {
        let raw = r"
logistics:
  - id: ghost
    role: provider
";
        assert!(Scenario::from_yaml(raw).is_err());
    }

    #[test]
    fn unknown_task_type_is_a_load_error() {
        let raw = r"
tasks:
  - room: W1N1
    params: { type: juggle, target_id: x }
";
        assert!(Scenario::from_yaml(raw).is_err());
    }

    #[test]
    fn hauler_fills_the_spawn() {
        let scenario = Scenario::from_yaml(DEMO).unwrap();
        let mut colony = Colony::new(Config::default());
        let mut sim = scenario.into_simulation(&mut colony);

        for _ in 0..60 {
            sim.step(&mut colony);
        }
        let spawn = sim.world.object_store("spawn1").unwrap();
        assert_eq!(spawn.used(ResourceType::Energy), 300);
        assert!(colony.engine().registry().totals().tasks_completed > 0);
    }

    #[test]
    fn work_needs_several_ticks_on_site() {
        let mut exec = SimExecutor::new(["w".to_owned()]);
        assert!(!exec.work("w", "t1"));
        assert!(!exec.work("w", "t1"));
        assert!(exec.work("w", "t1"));
        assert!(!exec.work("w", "t2"));
    }

    #[test]
    fn steps_move_diagonally() {
        let from = Position::new(5, 5, "W1N1");
        let to = Position::new(9, 2, "W1N1");
        assert_eq!(step_toward(&from, &to), Position::new(6, 4, "W1N1"));
    }
}
