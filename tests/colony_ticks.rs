use colony::colony::{Colony, Notification, WorkerExecutor};
use colony::config::Config;
use colony::context::TickContext;
use colony::logistics::{ConsumerInfo, ConsumerKind, LogisticsRole, ProviderInfo, ProviderKind};
use colony::sim::{Scenario, default_store};
use colony::task::engine::TaskEngine;
use colony::task::model::{TaskParams, TaskStatus, TaskType};
use colony::task::storage::StateStorage;
use colony::world::{ObjectKind, Position, ResourceType, SimObject, SimWorld, Store, StructureKind, World};

const ROOM: &str = "W1N1";

fn pos(x: u8, y: u8) -> Position {
    Position::new(x, y, ROOM)
}

/// Empty spawn fed by a container holding 500 energy.
fn supply_world() -> (SimWorld, Colony) {
    let world = SimWorld::from_objects([
        SimObject::new("spawn1", ObjectKind::Structure(StructureKind::Spawn), pos(10, 10))
            .with_store(Store::single(ResourceType::Energy, 300)),
        SimObject::new("box1", ObjectKind::Structure(StructureKind::Container), pos(15, 10))
            .with_store(Store::shared(2000).with(ResourceType::Energy, 500)),
        SimObject::new("hauler", ObjectKind::Creep, pos(14, 10)).with_store(Store::shared(100)),
    ]);

    let mut colony = Colony::new(Config::default());
    colony.logistics_mut().set_consumer(
        ROOM,
        ConsumerInfo::new(
            "spawn1",
            ConsumerKind::Structure(StructureKind::Spawn),
            pos(10, 10),
            ResourceType::Energy,
        ),
    );
    colony.logistics_mut().set_provider(
        ROOM,
        ProviderInfo::new(
            "box1",
            ProviderKind::Structure(StructureKind::Container),
            pos(15, 10),
            ResourceType::Energy,
        ),
    );
    (world, colony)
}

/// Takes the best open task for one worker while that worker is alive.
struct Grab {
    worker: String,
}

impl WorkerExecutor for Grab {
    fn execute(&mut self, ctx: &TickContext<'_>, engine: &mut TaskEngine) {
        if !ctx.world.object_exists(&self.worker) || engine.creep_task(&self.worker).is_some() {
            return;
        }
        let Some(id) = engine.assignable_tasks(ROOM).first().map(|t| t.id.clone()) else {
            return;
        };
        engine.assign_task(ctx, &id, &self.worker);
    }
}

#[test]
fn matching_creates_one_delivery_and_never_duplicates_it() {
    let (world, mut colony) = supply_world();

    let first = colony.run_tick(&world, &mut ());
    assert!(first.matched);
    assert_eq!(first.transport_tasks, 1);
    assert_eq!(first.created.len(), 1);

    let pending = colony.engine().pending_tasks();
    assert_eq!(pending.len(), 1);
    match &pending[0].params {
        TaskParams::Transport {
            source_id,
            target_id,
            amount,
            matched_at,
            ..
        } => {
            assert_eq!(source_id.as_deref(), Some("box1"));
            assert_eq!(target_id, "spawn1");
            assert_eq!(*amount, 300);
            assert_eq!(*matched_at, Some(1));
        }
        other => panic!("expected a transport task, got {other:?}"),
    }

    for tick in 2..=6 {
        let report = colony.run_tick(&world, &mut ());
        assert_eq!(report.matched, tick == 6, "tick {tick}");
        assert_eq!(report.transport_tasks, 0, "tick {tick}");
    }
    assert_eq!(colony.engine().registry().totals().tasks_created, 1);
}

#[test]
fn dead_worker_hands_its_task_back() {
    let (mut world, mut colony) = supply_world();
    let mut exec = Grab {
        worker: "hauler".to_owned(),
    };

    colony.run_tick(&world, &mut exec);
    let task = colony.engine().creep_task("hauler").expect("hauler got a task");
    assert_eq!(task.status, TaskStatus::Assigned);
    assert_eq!(task.task_type, TaskType::Transport);
    let task_id = task.id.clone();

    world.remove("hauler");
    colony.notify(Notification::WorkerDied {
        worker: "hauler".to_owned(),
    });
    let report = colony.run_tick(&world, &mut exec);

    assert_eq!(report.workers_released, 1);
    assert!(colony.engine().creep_task("hauler").is_none());
    let task = colony.engine().task(&task_id).expect("task survives its worker");
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.assigned_creeps.is_empty());
    assert!(task.fsm.creep_states.is_empty());
}

#[test]
fn finished_site_keeps_its_consumer_entry() {
    let mut world = SimWorld::from_objects([
        SimObject::new(
            "site1",
            ObjectKind::ConstructionSite(StructureKind::Extension),
            pos(14, 14),
        ),
        SimObject::new("box1", ObjectKind::Structure(StructureKind::Container), pos(15, 10))
            .with_store(Store::shared(2000).with(ResourceType::Energy, 500)),
    ]);
    let mut colony = Colony::new(Config::default());
    colony.logistics_mut().set_provider(
        ROOM,
        ProviderInfo::new(
            "box1",
            ProviderKind::Structure(StructureKind::Container),
            pos(15, 10),
            ResourceType::Energy,
        ),
    );

    colony.notify(Notification::ConstructionPlanUpdated {
        room: ROOM.to_owned(),
        structure: StructureKind::Extension,
        pos: pos(14, 14),
        role: LogisticsRole::Consumer,
        resource: ResourceType::Energy,
    });
    let report = colony.run_tick(&world, &mut ());
    assert_eq!(report.transport_tasks, 0);
    let consumers = colony.logistics().consumers(ROOM);
    assert_eq!(consumers.len(), 1);
    assert_eq!(consumers[0].id, "site1");

    assert!(world.complete_site("site1", "ext1", default_store(StructureKind::Extension)));
    colony.notify(Notification::ConstructionCompleted {
        pos: pos(14, 14),
        structure: StructureKind::Extension,
        old_id: "site1".to_owned(),
    });
    colony.run_tick(&world, &mut ());
    let consumers = colony.logistics().consumers(ROOM);
    assert_eq!(consumers.len(), 1);
    assert_eq!(consumers[0].id, "ext1");
    assert_eq!(
        consumers[0].kind,
        ConsumerKind::Structure(StructureKind::Extension)
    );

    let mut transports = 0;
    for _ in 3..=6 {
        transports += colony.run_tick(&world, &mut ()).transport_tasks;
    }
    assert_eq!(transports, 1);
    let pending = colony.engine().pending_tasks();
    assert!(matches!(
        &pending[0].params,
        TaskParams::Transport { target_id, amount: 50, .. } if target_id == "ext1"
    ));
}

#[test]
fn state_survives_a_restart() {
    let (world, mut colony) = supply_world();
    let mut exec = Grab {
        worker: "hauler".to_owned(),
    };
    for _ in 0..3 {
        colony.run_tick(&world, &mut exec);
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let storage = StateStorage::new(dir.path().join("state.json"));
    storage.save(&colony.state()).unwrap();

    let restored = Colony::from_state(storage.load().unwrap(), Config::default());
    assert_eq!(restored.tick(), 3);
    assert_eq!(restored.state().tasks, colony.state().tasks);
    assert_eq!(restored.state().last_match, Some(1));
    let task = restored.engine().creep_task("hauler").expect("index restored");
    assert!(task.is_assigned_to("hauler"));
    assert_eq!(restored.logistics().providers(ROOM).len(), 1);
}

#[test]
fn demo_scenario_runs_to_completion() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join("supply.yaml");
    let scenario = Scenario::load(&path).unwrap();
    let mut colony = Colony::new(Config::default());
    let mut sim = scenario.into_simulation(&mut colony);

    for _ in 0..60 {
        sim.step(&mut colony);
    }

    assert_eq!(sim.remaining_events(), 0);
    assert!(!sim.world.object_exists("worker1"));
    assert!(colony.engine().creep_task("worker1").is_none());
    let spawn = sim.world.object_store("spawn1").unwrap();
    assert_eq!(spawn.used(ResourceType::Energy), 300);
}
