#![forbid(unsafe_code)]

//! Greedy nearest-provider matching of unmet consumer needs.
//!
//! Requests are served in descending `importance * urgency`; each request
//! drains the nearest reachable provider first and moves on to the next
//! nearest until the need is met or nothing of that resource is left. The
//! result is a best-effort plan for one pass, re-derived from live stores on
//! every call.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::MatcherConfig;
use crate::context::TickContext;
use crate::logistics::network::{ConsumerKind, LogisticsNetwork, ProviderKind, ProviderStatus};
use crate::task::fsm::{FsmState, TransportState};
use crate::task::model::{Task, TaskParams, TaskSpec, priority};
use crate::world::{ObjectId, Position, ResourceType, RoomName, StructureKind, World};

/// Amounts already promised to transport tasks that have not finished yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservations {
    inbound: BTreeMap<(ObjectId, ResourceType), u32>,
    outbound: BTreeMap<(ObjectId, ResourceType), u32>,
}

impl Reservations {
    /// Collects reservations from every live transport task.
    ///
    /// A provider stops being reserved once a worker has withdrawn, since the
    /// store already reflects the pickup. Stranded tasks reserve nothing.
    pub fn from_tasks<'a>(world: &dyn World, tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut out = Self::default();
        for task in tasks {
            if task.status.is_terminal() || is_stranded(task, world) {
                continue;
            }
            let TaskParams::Transport {
                source_id,
                target_id,
                resource,
                amount,
                ..
            } = &task.params
            else {
                continue;
            };
            *out
                .inbound
                .entry((target_id.clone(), *resource))
                .or_insert(0) += amount;

            if let Some(source) = source_id
                && !picked_up(task)
            {
                *out.outbound.entry((source.clone(), *resource)).or_insert(0) += amount;
            }
        }
        out
    }

    #[must_use]
    pub fn inbound(&self, consumer: &str, resource: ResourceType) -> u32 {
        self.inbound
            .get(&(consumer.to_owned(), resource))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn outbound(&self, provider: &str, resource: ResourceType) -> u32 {
        self.outbound
            .get(&(provider.to_owned(), resource))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inbound.is_empty() && self.outbound.is_empty()
    }
}

/// A live transport task nobody has loaded yet whose source object is gone.
/// It can never be carried out as planned.
#[must_use]
pub fn is_stranded(task: &Task, world: &dyn World) -> bool {
    if task.status.is_terminal() {
        return false;
    }
    let TaskParams::Transport {
        source_id: Some(source),
        ..
    } = &task.params
    else {
        return false;
    };
    !picked_up(task) && !world.object_exists(source)
}

fn picked_up(task: &Task) -> bool {
    task.fsm.creep_states.values().any(|s| {
        matches!(
            s,
            FsmState::Transport(TransportState::MovingToTarget | TransportState::Transferring)
        )
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenRequest {
    pub consumer_id: ObjectId,
    pub kind: ConsumerKind,
    pub pos: Position,
    pub resource: ResourceType,
    pub needs: u32,
    pub capacity: u32,
    pub priority: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableSource {
    pub provider_id: ObjectId,
    pub kind: ProviderKind,
    pub pos: Position,
    pub resource: ResourceType,
    pub amount: u32,
}

/// One planned delivery. Turned into a TRANSPORT task by [`TransportTask::into_spec`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportTask {
    pub room: RoomName,
    pub source_id: ObjectId,
    pub source_pos: Position,
    pub target_id: ObjectId,
    pub target_pos: Position,
    pub resource: ResourceType,
    pub amount: u32,
    pub consumer_priority: f64,
    pub matched_at: u64,
}

impl TransportTask {
    #[must_use]
    pub fn into_spec(self) -> TaskSpec {
        TaskSpec::new(
            self.room,
            TaskParams::Transport {
                source_id: Some(self.source_id),
                source_pos: self.source_pos,
                target_id: self.target_id,
                target_pos: self.target_pos,
                resource: self.resource,
                amount: self.amount,
                matched_at: Some(self.matched_at),
            },
        )
        .with_priority(priority::NORMAL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandMatcher {
    unknown_importance: f64,
}

impl Default for DemandMatcher {
    fn default() -> Self {
        Self::new(&MatcherConfig::default())
    }
}

impl DemandMatcher {
    #[must_use]
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            unknown_importance: config.unknown_importance,
        }
    }

    #[must_use]
    pub fn importance(&self, kind: ConsumerKind) -> f64 {
        match kind {
            ConsumerKind::Creep => 0.4,
            ConsumerKind::Structure(s) => match s {
                StructureKind::Spawn | StructureKind::Extension => 1.0,
                StructureKind::Tower => 0.8,
                StructureKind::PowerSpawn => 0.7,
                StructureKind::Link => 0.6,
                StructureKind::Container => 0.5,
                StructureKind::Lab => 0.4,
                StructureKind::Storage | StructureKind::Terminal => 0.2,
                _ => self.unknown_importance,
            },
        }
    }

    /// Consumers with free capacity left after reservations, best first.
    /// Equal priorities are ordered by consumer id.
    #[must_use]
    pub fn open_requests(
        &self,
        ctx: &TickContext<'_>,
        network: &LogisticsNetwork,
        reservations: &Reservations,
    ) -> Vec<OpenRequest> {
        let mut requests: Vec<OpenRequest> = network
            .consumers
            .values()
            .filter_map(|c| {
                let store = ctx.world.object_store(&c.id)?;
                let free = store.free(c.resource);
                let needs = free.saturating_sub(reservations.inbound(&c.id, c.resource));
                if needs == 0 {
                    return None;
                }
                let capacity = store.capacity(c.resource).unwrap_or(0);
                let urgency = if capacity == 0 {
                    0.0
                } else {
                    f64::from(needs) / f64::from(capacity)
                };
                Some(OpenRequest {
                    consumer_id: c.id.clone(),
                    kind: c.kind,
                    pos: c.pos.clone(),
                    resource: c.resource,
                    needs,
                    capacity,
                    priority: self.importance(c.kind) * urgency,
                })
            })
            .collect();
        requests.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.consumer_id.cmp(&b.consumer_id))
        });
        requests
    }

    /// Ready providers whose object still exists and still holds something.
    #[must_use]
    pub fn available_sources(
        &self,
        ctx: &TickContext<'_>,
        network: &LogisticsNetwork,
        reservations: &Reservations,
    ) -> Vec<AvailableSource> {
        network
            .providers
            .values()
            .filter(|p| p.status == ProviderStatus::Ready)
            .filter_map(|p| {
                let store = ctx.world.object_store(&p.id)?;
                let amount = store
                    .used(p.resource)
                    .saturating_sub(reservations.outbound(&p.id, p.resource));
                (amount > 0).then(|| AvailableSource {
                    provider_id: p.id.clone(),
                    kind: p.kind,
                    pos: p.pos.clone(),
                    resource: p.resource,
                    amount,
                })
            })
            .collect()
    }

    pub fn generate_transport_tasks(
        &self,
        ctx: &TickContext<'_>,
        room: &str,
        network: &LogisticsNetwork,
        reservations: &Reservations,
    ) -> Vec<TransportTask> {
        let requests = self.open_requests(ctx, network, reservations);
        let mut sources = self.available_sources(ctx, network, reservations);
        if requests.is_empty() || sources.is_empty() {
            trace!(
                tick = ctx.tick,
                room,
                requests = requests.len(),
                sources = sources.len(),
                "nothing to match"
            );
            return Vec::new();
        }

        let mut out = Vec::new();
        for req in &requests {
            let mut need = req.needs;
            let mut unreachable: BTreeSet<usize> = BTreeSet::new();

            while need > 0 {
                let mut best: Option<(u32, usize)> = None;
                for (i, src) in sources.iter().enumerate() {
                    if src.resource != req.resource
                        || src.amount == 0
                        || src.provider_id == req.consumer_id
                        || unreachable.contains(&i)
                    {
                        continue;
                    }
                    let Some(dist) = ctx.world.path_distance(&src.pos, &req.pos) else {
                        debug!(provider = %src.provider_id, consumer = %req.consumer_id, "no path, skipping provider");
                        unreachable.insert(i);
                        continue;
                    };
                    let closer = best.is_none_or(|(d, j)| {
                        dist < d || (dist == d && src.provider_id < sources[j].provider_id)
                    });
                    if closer {
                        best = Some((dist, i));
                    }
                }
                let Some((_, i)) = best else {
                    break;
                };

                let src = &mut sources[i];
                let amount = need.min(src.amount);
                src.amount -= amount;
                need -= amount;
                out.push(TransportTask {
                    room: room.to_owned(),
                    source_id: src.provider_id.clone(),
                    source_pos: src.pos.clone(),
                    target_id: req.consumer_id.clone(),
                    target_pos: req.pos.clone(),
                    resource: req.resource,
                    amount,
                    consumer_priority: req.priority,
                    matched_at: ctx.tick,
                });
            }
        }

        debug!(tick = ctx.tick, room, requests = requests.len(), planned = out.len(), "matching pass");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logistics::network::{ConsumerInfo, ProviderInfo};
    use crate::task::fsm::TaskFsm;
    use crate::task::model::{AssignmentType, Lifetime, TaskStatus, TaskType};
    use crate::world::{ObjectKind, SimObject, SimWorld, Store};

    const ROOM: &str = "W1N1";

    fn pos(x: u8, y: u8) -> Position {
        Position::new(x, y, ROOM)
    }

    fn container(id: &str, at: Position, energy: u32) -> SimObject {
        SimObject::new(id, ObjectKind::Structure(StructureKind::Container), at)
            .with_store(Store::shared(2000).with(ResourceType::Energy, energy))
    }

    fn sink(id: &str, kind: StructureKind, at: Position, capacity: u32, used: u32) -> SimObject {
        SimObject::new(id, ObjectKind::Structure(kind), at)
            .with_store(Store::single(ResourceType::Energy, capacity).with(ResourceType::Energy, used))
    }

    fn network_for(world: &SimWorld) -> LogisticsNetwork {
        let mut net = LogisticsNetwork::default();
        for obj in world.objects() {
            let ObjectKind::Structure(kind) = obj.kind else {
                continue;
            };
            if kind == StructureKind::Container {
                net.set_provider(ProviderInfo::new(
                    obj.id.clone(),
                    ProviderKind::Structure(kind),
                    obj.pos.clone(),
                    ResourceType::Energy,
                ));
            } else {
                net.set_consumer(ConsumerInfo::new(
                    obj.id.clone(),
                    ConsumerKind::Structure(kind),
                    obj.pos.clone(),
                    ResourceType::Energy,
                ));
            }
        }
        net
    }

    fn plan(world: &SimWorld) -> Vec<(String, String, u32)> {
        let net = network_for(world);
        let ctx = TickContext::new(1, world);
        DemandMatcher::default()
            .generate_transport_tasks(&ctx, ROOM, &net, &Reservations::default())
            .into_iter()
            .map(|t| (t.source_id, t.target_id, t.amount))
            .collect()
    }

    #[test]
    fn nearest_provider_is_drained_first() {
        let world = SimWorld::from_objects([
            sink("spawn", StructureKind::Spawn, pos(10, 10), 100, 0),
            container("far", pos(15, 10), 60),
            container("near", pos(12, 10), 60),
            sink("store", StructureKind::Storage, pos(10, 12), 50, 0),
        ]);
        let tasks = plan(&world);
        assert_eq!(
            tasks,
            vec![
                ("near".to_owned(), "spawn".to_owned(), 60),
                ("far".to_owned(), "spawn".to_owned(), 40),
                ("far".to_owned(), "store".to_owned(), 20),
            ]
        );
    }

    #[test]
    fn urgent_consumer_is_served_first() {
        let world = SimWorld::from_objects([
            sink("a-ext", StructureKind::Extension, pos(10, 10), 50, 49),
            sink("b-ext", StructureKind::Extension, pos(30, 30), 50, 0),
            container("box", pos(10, 11), 20),
        ]);
        assert_eq!(plan(&world), vec![("box".to_owned(), "b-ext".to_owned(), 20)]);
    }

    #[test]
    fn full_consumer_is_not_an_open_request() {
        let world = SimWorld::from_objects([
            sink("ext", StructureKind::Extension, pos(10, 10), 50, 50),
            container("box", pos(10, 11), 20),
        ]);
        let net = network_for(&world);
        let ctx = TickContext::new(1, &world);
        let matcher = DemandMatcher::default();
        assert!(matcher.open_requests(&ctx, &net, &Reservations::default()).is_empty());
        assert!(plan(&world).is_empty());
    }

    #[test]
    fn vanished_provider_is_ignored() {
        let mut world = SimWorld::from_objects([
            sink("ext", StructureKind::Extension, pos(10, 10), 50, 0),
            container("box", pos(10, 11), 20),
            container("other", pos(10, 20), 20),
        ]);
        let net = network_for(&world);
        world.remove("box");

        let ctx = TickContext::new(1, &world);
        let matcher = DemandMatcher::default();
        let sources = matcher.available_sources(&ctx, &net, &Reservations::default());
        assert_eq!(sources.len(), 1);
        let tasks = matcher.generate_transport_tasks(&ctx, ROOM, &net, &Reservations::default());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].source_id, "other");
    }

    #[test]
    fn unreachable_provider_is_skipped() {
        let mut world = SimWorld::from_objects([
            sink("ext", StructureKind::Extension, pos(10, 10), 50, 0),
            container("walled", pos(10, 11), 50),
            container("open", pos(10, 30), 50),
        ]);
        world.block(pos(10, 11));
        assert_eq!(plan(&world), vec![("open".to_owned(), "ext".to_owned(), 50)]);
    }

    #[test]
    fn equal_priority_ties_break_on_ids() {
        let world = SimWorld::from_objects([
            sink("ext-b", StructureKind::Extension, pos(10, 10), 50, 0),
            sink("ext-a", StructureKind::Extension, pos(10, 10), 50, 0),
            container("box-2", pos(10, 12), 50),
            container("box-1", pos(10, 8), 50),
        ]);
        assert_eq!(
            plan(&world),
            vec![
                ("box-1".to_owned(), "ext-a".to_owned(), 50),
                ("box-2".to_owned(), "ext-b".to_owned(), 50),
            ]
        );
    }

    #[test]
    fn no_requests_or_no_sources_yield_nothing() {
        let only_sink = SimWorld::from_objects([sink("ext", StructureKind::Extension, pos(1, 1), 50, 0)]);
        assert!(plan(&only_sink).is_empty());
        let only_box = SimWorld::from_objects([container("box", pos(1, 1), 50)]);
        assert!(plan(&only_box).is_empty());
    }

    #[test]
    fn importance_table() {
        let m = DemandMatcher::default();
        assert!((m.importance(ConsumerKind::Structure(StructureKind::Spawn)) - 1.0).abs() < f64::EPSILON);
        assert!((m.importance(ConsumerKind::Structure(StructureKind::Tower)) - 0.8).abs() < f64::EPSILON);
        assert!((m.importance(ConsumerKind::Creep) - 0.4).abs() < f64::EPSILON);
        assert!((m.importance(ConsumerKind::Structure(StructureKind::Nuker)) - 0.1).abs() < f64::EPSILON);
    }

    fn transport_task(target: &str, source: &str, amount: u32) -> Task {
        Task {
            id: Task::new_id(),
            task_type: TaskType::Transport,
            status: TaskStatus::Assigned,
            assignment: AssignmentType::Exclusive,
            lifetime: Lifetime::Once,
            max_assignees: 1,
            assigned_creeps: vec!["w".to_owned()],
            base_priority: priority::NORMAL,
            room: ROOM.to_owned(),
            params: TaskParams::Transport {
                source_id: Some(source.to_owned()),
                source_pos: pos(10, 11),
                target_id: target.to_owned(),
                target_pos: pos(10, 10),
                resource: ResourceType::Energy,
                amount,
                matched_at: Some(1),
            },
            created_at: 1,
            updated_at: 1,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: 2,
            last_error: None,
            fsm: TaskFsm::new(TaskType::Transport, None),
        }
    }

    #[test]
    fn in_flight_deliveries_are_not_planned_twice() {
        let world = SimWorld::from_objects([
            sink("ext", StructureKind::Extension, pos(10, 10), 50, 0),
            container("box", pos(10, 11), 100),
        ]);
        let net = network_for(&world);
        let ctx = TickContext::new(2, &world);
        let matcher = DemandMatcher::default();

        let in_flight = [transport_task("ext", "box", 30)];
        let reservations = Reservations::from_tasks(&world, &in_flight);
        assert_eq!(reservations.inbound("ext", ResourceType::Energy), 30);
        assert_eq!(reservations.outbound("box", ResourceType::Energy), 30);

        let tasks = matcher.generate_transport_tasks(&ctx, ROOM, &net, &reservations);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].amount, 20);

        let mut done = transport_task("ext", "box", 50);
        done.status = TaskStatus::Completed;
        assert!(Reservations::from_tasks(&world, [&done]).is_empty());
    }

    #[test]
    fn tasks_whose_source_vanished_reserve_nothing() {
        let world = SimWorld::from_objects([
            sink("ext", StructureKind::Extension, pos(10, 10), 50, 0),
            container("box", pos(10, 11), 100),
        ]);
        let stale = transport_task("ext", "pile", 30);
        assert!(is_stranded(&stale, &world));
        assert!(Reservations::from_tasks(&world, [&stale]).is_empty());

        let net = network_for(&world);
        let ctx = TickContext::new(3, &world);
        let tasks = DemandMatcher::default().generate_transport_tasks(
            &ctx,
            ROOM,
            &net,
            &Reservations::from_tasks(&world, [&stale]),
        );
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].source_id, "box");
        assert_eq!(tasks[0].amount, 50);
    }

    #[test]
    fn picked_up_load_no_longer_reserves_the_provider() {
        let mut task = transport_task("ext", "box", 30);
        task.fsm.enter("w");
        assert!(task.fsm.set_creep_state("w", FsmState::Transport(TransportState::MovingToTarget)));
        let world = SimWorld::new();
        assert!(!is_stranded(&task, &world));
        let reservations = Reservations::from_tasks(&world, [&task]);
        assert_eq!(reservations.inbound("ext", ResourceType::Energy), 30);
        assert_eq!(reservations.outbound("box", ResourceType::Energy), 0);
    }

    #[test]
    fn transport_spec_uses_explicit_fields() {
        let task = TransportTask {
            room: ROOM.to_owned(),
            source_id: "box".to_owned(),
            source_pos: pos(1, 1),
            target_id: "spawn".to_owned(),
            target_pos: pos(2, 2),
            resource: ResourceType::Energy,
            amount: 40,
            consumer_priority: 1.0,
            matched_at: 7,
        };
        let spec = task.into_spec();
        assert_eq!(spec.params.task_type(), TaskType::Transport);
        assert_eq!(spec.base_priority, Some(priority::NORMAL));
        assert_eq!(spec.params.target_id(), Some("spawn"));
    }
}
