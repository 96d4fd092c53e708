#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::{CommandFactory as _, Parser, Subcommand};
use tracing::{info, warn};

use crate::colony::{Colony, TickReport};
use crate::config::{self, Config};
use crate::context::TickContext;
use crate::error::ColonyError;
use crate::logging;
use crate::logistics::{LogisticsNetwork, TransportTask};
use crate::output::table::Table;
use crate::sim::Scenario;
use crate::task::engine::TaskEngine;
use crate::task::model::{Task, TaskStatus};
use crate::task::storage::StateStorage;

#[derive(Debug, Parser)]
#[command(
    name = "colony",
    version,
    about = "Task lifecycle engine and logistics matcher for a tick-based colony"
)]
pub struct Cli {
    /// Config file (defaults to ~/.config/colony/config.toml)
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// State file, overrides storage.state_file
    #[arg(long = "state", global = true)]
    pub state: Option<PathBuf>,
    /// Log level, overrides log.level (RUST_LOG still wins)
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Run(RunArgs),
    Tasks(TasksArgs),
    Logistics(LogisticsArgs),
    Match(MatchArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
    Version,
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Scenario file (YAML)
    #[arg(short = 's', long = "scenario")]
    pub scenario: PathBuf,
    /// Number of ticks to simulate
    #[arg(short = 'n', long = "ticks", default_value_t = 100)]
    pub ticks: u64,
    /// Milliseconds between ticks (0 runs as fast as possible)
    #[arg(short = 'i', long = "interval", default_value_t = 0)]
    pub interval_ms: u64,
    /// Print every tick report as a JSON line
    #[arg(long = "json")]
    pub json: bool,
    /// Do not write the final state
    #[arg(long = "no-save")]
    pub no_save: bool,
}

#[derive(Debug, Parser)]
pub struct TasksArgs {
    #[command(subcommand)]
    pub cmd: TasksCmd,
}

#[derive(Debug, Subcommand)]
pub enum TasksCmd {
    List(TasksListArgs),
    Show(TasksShowArgs),
    Stats(TasksStatsArgs),
}

#[derive(Debug, Parser)]
pub struct TasksListArgs {
    #[arg(short = 'r', long = "room")]
    pub room: Option<String>,
    /// pending, assigned, in_progress, completed or failed
    #[arg(long = "status")]
    pub status: Option<String>,
    #[arg(long = "json")]
    pub json: bool,
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct TasksShowArgs {
    /// Task id or unique id prefix
    pub id: String,
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct TasksStatsArgs {
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct LogisticsArgs {
    #[arg(short = 'r', long = "room")]
    pub room: Option<String>,
    #[arg(long = "json")]
    pub json: bool,
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct MatchArgs {
    /// Scenario file (YAML)
    #[arg(short = 's', long = "scenario")]
    pub scenario: PathBuf,
    #[arg(short = 'r', long = "room")]
    pub room: Option<String>,
    #[arg(long = "json")]
    pub json: bool,
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Set(ConfigSetArgs),
    Get(ConfigGetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.cmd {
        Commands::Completion(args) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "colony", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Version => Ok(cmd_version()),
        Commands::Config(args) => cmd_config(cli.config.as_deref(), args),
        cmd => {
            let (cfg, _paths) = load_cfg(cli.config.clone()).await?;
            let level = cli.log_level.as_deref().unwrap_or(&cfg.log.level);
            logging::init_tracing(level);
            let storage = StateStorage::new(state_path(&cfg, cli.state.as_deref())?);

            match cmd {
                Commands::Run(args) => cmd_run(&cfg, &storage, args).await,
                Commands::Tasks(args) => cmd_tasks(&cfg, &storage, args),
                Commands::Logistics(args) => cmd_logistics(&storage, &args),
                Commands::Match(args) => cmd_match(&cfg, &args),
                Commands::Completion(_) | Commands::Version | Commands::Config(_) => {
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
    }
}

async fn load_cfg(path: Option<PathBuf>) -> anyhow::Result<(Config, config::ConfigPaths)> {
    tokio::task::spawn_blocking(move || config::load(path.as_deref())).await?
}

fn state_path(cfg: &Config, cli_override: Option<&Path>) -> anyhow::Result<PathBuf> {
    match cli_override {
        Some(p) => Ok(p.to_path_buf()),
        None => config::expand_path(&cfg.storage.state_file),
    }
}

fn config_file(cli_override: Option<&Path>) -> anyhow::Result<PathBuf> {
    match cli_override {
        Some(p) => Ok(p.to_path_buf()),
        None => Ok(config::default_paths()?.config_file),
    }
}

fn cmd_config(path: Option<&Path>, args: ConfigArgs) -> anyhow::Result<ExitCode> {
    let file = config_file(path)?;
    match args.cmd {
        ConfigCmd::List => {
            print!("{}", config::list_resolved_toml(&file)?);
            Ok(ExitCode::SUCCESS)
        }
        ConfigCmd::Set(set) => {
            config::set_value_string_at_path(&file, &set.key, &set.value)?;
            println!("Set {} = {}", set.key, set.value);
            Ok(ExitCode::SUCCESS)
        }
        ConfigCmd::Get(get) => match config::get_value_string_at_path(&file, &get.key)? {
            Some(v) => {
                println!("{v}");
                Ok(ExitCode::SUCCESS)
            }
            None => anyhow::bail!(
                "configuration key '{}' not found - use 'colony config list' to see available keys",
                get.key
            ),
        },
    }
}

async fn cmd_run(cfg: &Config, storage: &StateStorage, args: RunArgs) -> anyhow::Result<ExitCode> {
    let scenario = Scenario::load(&args.scenario)?;
    let name = scenario
        .name
        .clone()
        .unwrap_or_else(|| args.scenario.display().to_string());
    info!(scenario = %name, ticks = args.ticks, "starting run");

    let mut colony = Colony::new(cfg.clone());
    let mut sim = scenario.into_simulation(&mut colony);

    let mut ticker = (args.interval_ms > 0)
        .then(|| tokio::time::interval(Duration::from_millis(args.interval_ms)));

    let mut ran = 0u64;
    while ran < args.ticks {
        if let Some(ticker) = ticker.as_mut() {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    warn!(tick = colony.tick(), "interrupted");
                    break;
                }
                _ = ticker.tick() => {}
            }
        }

        let report = sim.step(&mut colony);
        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else if let Some(line) = describe_report(&report) {
            println!("{line}");
        }
        ran += 1;
    }

    if !args.json {
        println!();
        print_stats_table(&colony.engine().stats().rooms)?;
    }

    if cfg.storage.autosave && !args.no_save {
        storage
            .save(&colony.state())
            .with_context(|| format!("failed to save state to {}", storage.path().display()))?;
        info!(path = %storage.path().display(), tick = colony.tick(), "state saved");
    }
    Ok(ExitCode::SUCCESS)
}

fn describe_report(report: &TickReport) -> Option<String> {
    let mut parts = Vec::new();
    if !report.created.is_empty() {
        parts.push(format!("{} created", report.created.len()));
    }
    if report.transport_tasks > 0 {
        parts.push(format!("{} transport", report.transport_tasks));
    }
    if report.stranded > 0 {
        parts.push(format!("{} stranded", report.stranded));
    }
    if report.ephemeral_added > 0 {
        parts.push(format!("{} new pickups", report.ephemeral_added));
    }
    if report.gc_removed > 0 {
        parts.push(format!("{} gc", report.gc_removed));
    }
    if report.workers_released > 0 {
        parts.push(format!("{} workers released", report.workers_released));
    }
    if let Some(c) = report.cleanup.as_ref().filter(|c| !c.is_empty()) {
        parts.push(format!(
            "cleanup: {} purged, {} recycled, {} orphans, {} expired",
            c.purged.len(),
            c.recycled.len(),
            c.orphaned_workers.len(),
            c.expired.len()
        ));
    }
    if parts.is_empty() {
        return None;
    }
    Some(format!("tick {:>5}  {}", report.tick, parts.join(", ")))
}

fn load_state(storage: &StateStorage) -> anyhow::Result<crate::colony::ColonyState> {
    storage.load().with_context(|| {
        format!(
            "failed to load state - run 'colony run --scenario <file>' first (state: {})",
            storage.path().display()
        )
    })
}

fn cmd_tasks(cfg: &Config, storage: &StateStorage, args: TasksArgs) -> anyhow::Result<ExitCode> {
    let state = load_state(storage)?;
    let engine = TaskEngine::new(state.tasks, cfg.engine);
    match args.cmd {
        TasksCmd::List(args) => tasks_list(&engine, &args)?,
        TasksCmd::Show(args) => tasks_show(&engine, &args)?,
        TasksCmd::Stats(args) => {
            let stats = engine.stats();
            if args.json {
                print_json(&stats)?;
            } else {
                print_stats_table(&stats.rooms)?;
                println!();
                println!(
                    "total: {} created, {} completed, {} failed",
                    stats.totals.tasks_created, stats.totals.tasks_completed, stats.totals.tasks_failed
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn parse_status(raw: &str) -> anyhow::Result<TaskStatus> {
    let wanted = raw.trim().to_ascii_lowercase().replace('-', "_");
    [
        TaskStatus::Pending,
        TaskStatus::Assigned,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ]
    .into_iter()
    .find(|s| s.as_str() == wanted)
    .with_context(|| format!("unknown task status '{raw}'"))
}

fn tasks_list(engine: &TaskEngine, args: &TasksListArgs) -> anyhow::Result<()> {
    let status = args.status.as_deref().map(parse_status).transpose()?;
    let mut tasks: Vec<&Task> = match args.room.as_deref() {
        Some(room) => engine.tasks_by_room(room),
        None => engine.registry().tasks().collect(),
    };
    tasks.retain(|t| status.is_none_or(|s| t.status == s));
    tasks.sort_by(|a, b| {
        a.room
            .cmp(&b.room)
            .then_with(|| b.base_priority.cmp(&a.base_priority))
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    if args.json {
        return print_json(&tasks);
    }

    let headers = ["TASK", "ROOM", "TYPE", "STATUS", "PRIORITY", "WORKERS", "RETRIES", "TARGET"];
    if args.csv {
        let mut t = Table::new(headers.map(str::to_ascii_lowercase));
        for task in &tasks {
            t.row(task_row(task, task.id.clone()));
        }
        t.write_csv()?;
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }
    let mut t = Table::new(headers);
    for task in &tasks {
        t.row(task_row(task, short_id(&task.id)));
    }
    t.print()?;
    Ok(())
}

fn task_row(task: &Task, id: String) -> [String; 8] {
    [
        id,
        task.room.clone(),
        task.task_type.to_string(),
        task.status.to_string(),
        task.base_priority.to_string(),
        format!("{}/{}", task.assigned_creeps.len(), task.max_assignees),
        format!("{}/{}", task.retry_count, task.max_retries),
        task.params.summary(),
    ]
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn find_task<'a>(engine: &'a TaskEngine, pattern: &str) -> anyhow::Result<&'a Task> {
    if let Some(task) = engine.task(pattern) {
        return Ok(task);
    }
    let mut matches = engine
        .registry()
        .tasks()
        .filter(|t| t.id.starts_with(pattern));
    match (matches.next(), matches.next()) {
        (Some(task), None) => Ok(task),
        (Some(_), Some(_)) => anyhow::bail!("task id prefix '{pattern}' is ambiguous"),
        (None, _) => Err(ColonyError::TaskNotFound(pattern.to_owned()).into()),
    }
}

fn tasks_show(engine: &TaskEngine, args: &TasksShowArgs) -> anyhow::Result<()> {
    let task = find_task(engine, &args.id)?;
    if args.json {
        return print_json(task);
    }

    println!("Task: {}", task.id);
    println!("Room: {}", task.room);
    println!("Type: {}", task.task_type);
    println!("Status: {}", task.status);
    println!("Priority: {}", task.base_priority);
    println!("Target: {}", task.params.summary());
    println!(
        "Assignment: {:?}, {:?}, {}/{} workers",
        task.assignment,
        task.lifetime,
        task.assigned_creeps.len(),
        task.max_assignees
    );
    println!("Created: tick {}", task.created_at);
    println!("Updated: tick {}", task.updated_at);
    if let Some(t) = task.started_at {
        println!("Started: tick {t}");
    }
    if let Some(t) = task.completed_at {
        println!("Finished: tick {t}");
    }
    println!("Retries: {}/{}", task.retry_count, task.max_retries);
    if let Some(err) = task.last_error.as_deref() {
        println!("Last error: {err}");
    }
    if let Some(group) = task.fsm.group_id.as_deref() {
        println!("Group: {group}");
    }
    println!("State: {}", task.fsm.task_state);
    if !task.fsm.creep_states.is_empty() {
        println!();
        let mut t = Table::new(["WORKER", "STATE"]);
        for (worker, state) in &task.fsm.creep_states {
            t.row([worker.clone(), state.to_string()]);
        }
        t.print()?;
    }
    Ok(())
}

fn print_stats_table(
    rooms: &std::collections::BTreeMap<String, crate::task::engine::RoomStats>,
) -> anyhow::Result<()> {
    if rooms.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }
    let mut t = Table::new([
        "ROOM",
        "CREATED",
        "COMPLETED",
        "FAILED",
        "PENDING",
        "ASSIGNED",
        "IN_PROGRESS",
        "CLEANUP",
        "BUSY",
    ]);
    for (room, s) in rooms {
        t.row([
            room.clone(),
            s.counters.tasks_created.to_string(),
            s.counters.tasks_completed.to_string(),
            s.counters.tasks_failed.to_string(),
            s.pending.to_string(),
            s.assigned.to_string(),
            s.in_progress.to_string(),
            s.awaiting_cleanup.to_string(),
            s.busy_workers.to_string(),
        ]);
    }
    t.print()?;
    Ok(())
}

fn cmd_logistics(storage: &StateStorage, args: &LogisticsArgs) -> anyhow::Result<ExitCode> {
    let state = load_state(storage)?;
    let rooms: Vec<(&String, &LogisticsNetwork)> = state
        .logistics
        .rooms
        .iter()
        .filter(|(room, _)| args.room.as_deref().is_none_or(|r| r == room.as_str()))
        .collect();

    if args.json {
        print_json(&rooms.iter().copied().collect::<std::collections::BTreeMap<_, _>>())?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut t = Table::new(["ROOM", "ID", "ROLE", "KIND", "POS", "RESOURCE", "STATUS"]);
    for (room, network) in &rooms {
        for p in network.providers.values() {
            t.row([
                (*room).clone(),
                p.id.clone(),
                "provider".to_owned(),
                p.kind.to_string(),
                p.pos.to_string(),
                p.resource.to_string(),
                p.status.to_string(),
            ]);
        }
        for c in network.consumers.values() {
            t.row([
                (*room).clone(),
                c.id.clone(),
                "consumer".to_owned(),
                c.kind.to_string(),
                c.pos.to_string(),
                c.resource.to_string(),
                "-".to_owned(),
            ]);
        }
    }
    if args.csv {
        t.write_csv()?;
    } else if rooms.iter().all(|(_, n)| n.providers.is_empty() && n.consumers.is_empty()) {
        println!("No logistics entries found.");
    } else {
        t.print()?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Matches the scenario's starting world once, without creating tasks.
fn cmd_match(cfg: &Config, args: &MatchArgs) -> anyhow::Result<ExitCode> {
    let scenario = Scenario::load(&args.scenario)?;
    let world = scenario.world();
    let mut colony = Colony::new(cfg.clone());
    scenario.seed(&mut colony);

    let ctx = TickContext::new(colony.tick() + 1, &world);
    let matcher = *colony.matcher();
    let reservations = colony.reservations(&world);
    let mut planned: Vec<TransportTask> = Vec::new();
    for room in colony.rooms() {
        if args.room.as_deref().is_some_and(|r| r != room) {
            continue;
        }
        let network = colony.logistics_mut().network_mut(&room);
        if cfg.logistics.scan_ephemeral {
            network.scan_ephemeral(&world, &room, ctx.tick);
        }
        network.refresh(&world);
        planned.extend(matcher.generate_transport_tasks(&ctx, &room, network, &reservations));
    }

    if args.json {
        return print_json(&planned).map(|()| ExitCode::SUCCESS);
    }
    let mut t = Table::new(["ROOM", "SOURCE", "TARGET", "RESOURCE", "AMOUNT", "PRIORITY"]);
    for task in &planned {
        t.row([
            task.room.clone(),
            task.source_id.clone(),
            task.target_id.clone(),
            task.resource.to_string(),
            task.amount.to_string(),
            format!("{:.3}", task.consumer_priority),
        ]);
    }
    if args.csv {
        t.write_csv()?;
    } else if planned.is_empty() {
        println!("Nothing to deliver.");
    } else {
        t.print()?;
    }
    Ok(ExitCode::SUCCESS)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    let mut s = serde_json::to_string_pretty(value)?;
    s.push('\n');
    print!("{s}");
    Ok(())
}

fn cmd_version() -> ExitCode {
    println!("colony version {}", env!("CARGO_PKG_VERSION"));
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    ExitCode::SUCCESS
}
