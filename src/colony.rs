#![forbid(unsafe_code)]

//! Per-tick orchestration.
//!
//! A tick runs a fixed pipeline: inbound notifications, logistics scan and
//! GC, matching, worker execution, cleanup. Matching, full GC and cleanup
//! only run on their configured cadence.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::TickContext;
use crate::logistics::matcher::is_stranded;
use crate::logistics::{DemandMatcher, LogisticsRegistry, LogisticsRole, Reservations};
use crate::task::engine::{CleanupReport, TaskEngine, TaskEvent};
use crate::task::model::{TaskSpec, TaskStatus};
use crate::task::registry::TaskRegistry;
use crate::world::{ObjectId, Position, ResourceType, RoomName, StructureKind, World, WorkerId};

/// Everything that survives between ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColonyState {
    pub tick: u64,
    pub tasks: TaskRegistry,
    pub logistics: LogisticsRegistry,
    pub last_match: Option<u64>,
}

/// Inbound messages, consumed in arrival order at the start of the next tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notification", rename_all = "snake_case")]
pub enum Notification {
    CreateTask(TaskSpec),
    WorkerDied {
        worker: WorkerId,
    },
    ConstructionPlanUpdated {
        room: RoomName,
        structure: StructureKind,
        pos: Position,
        role: LogisticsRole,
        resource: ResourceType,
    },
    ConstructionCompleted {
        pos: Position,
        structure: StructureKind,
        old_id: ObjectId,
    },
}

/// Runs the workers for one tick: picks up tasks, advances them and
/// reports status back through the engine.
pub trait WorkerExecutor {
    fn execute(&mut self, ctx: &TickContext<'_>, engine: &mut TaskEngine);
}

impl WorkerExecutor for () {
    fn execute(&mut self, _ctx: &TickContext<'_>, _engine: &mut TaskEngine) {}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub notifications: usize,
    pub workers_released: usize,
    pub ephemeral_added: usize,
    pub gc_removed: usize,
    pub matched: bool,
    /// Transport tasks failed because their source vanished before pickup.
    pub stranded: usize,
    pub transport_tasks: usize,
    pub cleanup: Option<CleanupReport>,
    pub created: Vec<TaskEvent>,
}

#[derive(Debug)]
pub struct Colony {
    tick: u64,
    engine: TaskEngine,
    logistics: LogisticsRegistry,
    matcher: DemandMatcher,
    config: Config,
    inbox: VecDeque<Notification>,
    last_match: Option<u64>,
}

impl Colony {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::from_state(ColonyState::default(), config)
    }

    /// Restores a colony from persisted state. An invalid config is logged;
    /// zero intervals then mean "every tick".
    #[must_use]
    pub fn from_state(state: ColonyState, config: Config) -> Self {
        if let Err(e) = config.validate() {
            warn!(error = %e, "colony started with an invalid config");
        }
        Self {
            tick: state.tick,
            engine: TaskEngine::new(state.tasks, config.engine),
            logistics: state.logistics,
            matcher: DemandMatcher::new(&config.matcher),
            config,
            inbox: VecDeque::new(),
            last_match: state.last_match,
        }
    }

    #[must_use]
    pub fn state(&self) -> ColonyState {
        ColonyState {
            tick: self.tick,
            tasks: self.engine.registry().clone(),
            logistics: self.logistics.clone(),
            last_match: self.last_match,
        }
    }

    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    #[must_use]
    pub fn engine(&self) -> &TaskEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut TaskEngine {
        &mut self.engine
    }

    #[must_use]
    pub fn logistics(&self) -> &LogisticsRegistry {
        &self.logistics
    }

    pub fn logistics_mut(&mut self) -> &mut LogisticsRegistry {
        &mut self.logistics
    }

    #[must_use]
    pub fn matcher(&self) -> &DemandMatcher {
        &self.matcher
    }

    pub fn notify(&mut self, notification: Notification) {
        self.inbox.push_back(notification);
    }

    #[must_use]
    pub fn pending_notifications(&self) -> usize {
        self.inbox.len()
    }

    /// Makes sure the room gets scanned even before anything is registered in it.
    pub fn watch_room(&mut self, room: &str) {
        self.logistics.network_mut(room);
    }

    /// Rooms with either tasks or a logistics network.
    #[must_use]
    pub fn rooms(&self) -> BTreeSet<RoomName> {
        self.logistics
            .rooms
            .keys()
            .chain(self.engine.registry().rooms.keys())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn reservations(&self, world: &dyn World) -> Reservations {
        if self.config.matcher.reserve_in_flight {
            Reservations::from_tasks(world, self.engine.registry().tasks())
        } else {
            Reservations::default()
        }
    }

    pub fn run_tick(&mut self, world: &dyn World, executor: &mut dyn WorkerExecutor) -> TickReport {
        self.tick += 1;
        let ctx = TickContext::new(self.tick, world);
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        while let Some(notification) = self.inbox.pop_front() {
            report.notifications += 1;
            self.handle(&ctx, notification, &mut report);
        }

        self.refresh_networks(&ctx, &mut report);

        if self.match_due() {
            self.match_rooms(&ctx, &mut report);
        }

        executor.execute(&ctx, &mut self.engine);

        report.cleanup = self.engine.cleanup_if_due(&ctx);
        report.created = self.engine.drain_events();

        debug!(
            tick = self.tick,
            created = report.created.len(),
            transport = report.transport_tasks,
            "tick done"
        );
        report
    }

    fn handle(&mut self, ctx: &TickContext<'_>, notification: Notification, report: &mut TickReport) {
        match notification {
            Notification::CreateTask(spec) => {
                self.engine.create_task(ctx, spec);
            }
            Notification::WorkerDied { worker } => {
                if self.engine.worker_died(ctx, &worker) {
                    report.workers_released += 1;
                }
            }
            Notification::ConstructionPlanUpdated {
                room,
                structure,
                pos,
                role,
                resource,
            } => {
                self.logistics
                    .register_plan(ctx.world, &room, structure, &pos, role, resource);
            }
            Notification::ConstructionCompleted {
                pos,
                structure,
                old_id,
            } => {
                self.logistics
                    .construction_completed(ctx.world, &pos, structure, &old_id);
            }
        }
    }

    fn refresh_networks(&mut self, ctx: &TickContext<'_>, report: &mut TickReport) {
        let full = ctx
            .tick
            .checked_rem(self.config.logistics.full_gc_interval)
            .is_none_or(|r| r == 0);
        for room in self.rooms() {
            let network = self.logistics.network_mut(&room);
            if self.config.logistics.scan_ephemeral {
                report.ephemeral_added += network.scan_ephemeral(ctx.world, &room, ctx.tick);
            }
            report.gc_removed += network.gc(ctx.world, full);
            network.refresh(ctx.world);
        }
        if full && report.gc_removed > 0 {
            info!(tick = ctx.tick, removed = report.gc_removed, "full logistics gc");
        }
    }

    fn match_due(&self) -> bool {
        self.last_match
            .is_none_or(|last| self.tick >= last.saturating_add(self.config.matcher.match_interval))
    }

    fn fail_stranded(&mut self, ctx: &TickContext<'_>, report: &mut TickReport) {
        let stranded: Vec<String> = self
            .engine
            .registry()
            .tasks()
            .filter(|t| is_stranded(t, ctx.world))
            .map(|t| t.id.clone())
            .collect();
        for task_id in stranded {
            info!(tick = ctx.tick, task_id = %task_id, "transport source vanished before pickup");
            if self.engine.update_task_status(ctx, &task_id, TaskStatus::Failed) {
                report.stranded += 1;
            }
        }
    }

    fn match_rooms(&mut self, ctx: &TickContext<'_>, report: &mut TickReport) {
        self.fail_stranded(ctx, report);
        let reservations = self.reservations(ctx.world);
        for (room, network) in &self.logistics.rooms {
            let planned = self
                .matcher
                .generate_transport_tasks(ctx, room, network, &reservations);
            for transport in planned {
                self.engine.create_task(ctx, transport.into_spec());
                report.transport_tasks += 1;
            }
        }
        self.last_match = Some(ctx.tick);
        report.matched = true;
    }
}
