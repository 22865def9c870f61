//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "binary"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Binary entrypoint for the maintenance agent daemon."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mtce_common::time::monotonic_now;
use mtce_common::{init_tracing, MtceConfig, Network};
use mtce_heartbeat::PulseFlags;
use mtce_metrics::{new_registry, spawn_http_server, AgentMetrics, MaintenanceMetrics, Readiness};
use mtce_node::{HostInfo, Maintenance, PulseResponse};
use mtce_persistence::JournalWriter;
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

mod services;

#[derive(Debug, Parser)]
#[command(author, version, about = "Node maintenance agent", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        help = "JSON array of hosts to provision at startup"
    )]
    inventory: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = 86_400,
        help = "Uptime in seconds reported by simulated hosts"
    )]
    simulated_uptime: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the maintenance agent")]
    Run,
    #[command(about = "Validate the configuration and print it with defaults applied")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("/etc/mtce/mtcagent.toml"));
    candidates.push(PathBuf::from("configs/mtcagent.toml"));

    let load_started = Instant::now();
    let loaded = MtceConfig::load_with_source(&candidates)?;
    let load_duration = load_started.elapsed();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            let rendered =
                toml::to_string_pretty(&loaded.config).context("failed to render configuration")?;
            println!("# source: {}\n{rendered}", loaded.source.display());
            Ok(())
        }
        Commands::Run => {
            init_tracing("mtcagent", &loaded.config.logging)?;
            info!(config_path = %loaded.source.display(), "configuration loaded");
            let inventory = match &cli.inventory {
                Some(path) => read_inventory(path)?,
                None => Vec::new(),
            };
            run_agent(loaded.config, inventory, cli.simulated_uptime, load_duration).await
        }
    }
}

fn read_inventory(path: &Path) -> Result<Vec<HostInfo>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("unable to read inventory {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse inventory {}", path.display()))
}

async fn run_agent(
    config: MtceConfig,
    inventory: Vec<HostInfo>,
    simulated_uptime: u64,
    config_load: Duration,
) -> Result<()> {
    let registry = new_registry();
    let agent_metrics = AgentMetrics::new(&registry)?;
    agent_metrics.inc_start();
    agent_metrics.observe_config_load(config_load);
    agent_metrics.set_build_info(
        env!("CARGO_PKG_VERSION"),
        if cfg!(debug_assertions) { "debug" } else { "release" },
    );
    let maintenance_metrics = MaintenanceMetrics::new(&registry)?;

    let readiness = Readiness::default();
    let metrics_server = if config.metrics.enabled {
        Some(spawn_http_server(registry.clone(), readiness.clone(), config.metrics.listen).await?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let (services, outbox) = services::standalone(simulated_uptime);
    let dispatch_tick = config.agent.dispatch_tick;
    let pulse_period = config.heartbeat.period;
    let journal_path = config.agent.journal.clone();

    let mut mtce = Maintenance::new(config, services, monotonic_now()).with_metrics(maintenance_metrics);
    if let Some(path) = journal_path {
        let journal = JournalWriter::open(&path)
            .with_context(|| format!("failed to open customer log journal {}", path.display()))?;
        mtce = mtce.with_journal(journal);
    }
    for host in inventory {
        let hostname = host.hostname.clone();
        if let Err(err) = mtce.add_host(host) {
            warn!(host = %hostname, error = %err, "inventory host rejected");
        }
    }
    readiness.set(true);
    info!(hosts = mtce.registry().len(), "maintenance agent running; waiting for termination signal");

    let mut dispatch = interval(dispatch_tick);
    dispatch.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pulse = interval(pulse_period);
    pulse.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = dispatch.tick() => {
                for event in outbox.drain() {
                    mtce.post(event);
                }
                let started = monotonic_now();
                mtce.tick(started);
                agent_metrics.observe_tick(started.elapsed());
            }
            _ = pulse.tick() => pulse_cycle(&mut mtce),
            result = &mut shutdown => {
                result.context("failed to listen for ctrl-c")?;
                info!("ctrl-c received; shutting down");
                readiness.set(false);
                break;
            }
        }
    }

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

/// One heartbeat period in which every monitored host answers on management.
fn pulse_cycle(mtce: &mut Maintenance) {
    let expected = mtce.start_pulse_period(Network::Mgmnt);
    let responses: Vec<PulseResponse> = mtce
        .registry()
        .iter()
        .filter(|(_, host)| host.hbs.net[Network::Mgmnt].monitored)
        .map(|(_, host)| PulseResponse::new(host.hostname.as_str(), host.hbs.rri, PulseFlags::PMOND))
        .collect();
    for response in &responses {
        if let Err(err) = mtce.pulse_response(Network::Mgmnt, response) {
            warn!(host = %response.hostname, error = %err, "pulse response rejected");
        }
    }
    let missed = mtce.end_pulse_period(Network::Mgmnt);
    if missed > 0 {
        warn!(expected, missed, "heartbeat period closed with misses");
    }
}
