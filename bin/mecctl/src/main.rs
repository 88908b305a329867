//! Single entry point (C8 Bootstrap, §4.8 + SPEC_FULL.md §4.8): opens the store,
//! seeds it from `--profile_file`, connects the bus, wires handlers to the
//! orchestrator dispatcher, and runs until SIGTERM/SIGINT.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use mecctl_bus::{publish_json, LastWill, MessageBus, MqttBus};
use mecctl_config::{logging, Args, PlannerArg, TopologyProfile};
use mecctl_handlers::Handlers;
use mecctl_orchestrator::{OrchestratorService, PlannerKind};
use mecctl_planner::{CloudPlanner, NearestPlanner, RandomPlanner};
use mecctl_store::Store;
use mecctl_types::message::UpdatedEntry;

const BROKER_PORT: u16 = mecctl_bus::mqtt::BROKER_PORT;
const CLIENT_ID: &str = "centralizedcontroller";

const SUBSCRIBE_PATTERNS: &[&str] = &[
    "register",
    "monitor/#",
    "discover",
    "allocated/+",
    "migrated/+",
    "pre_migrated/+",
    "handovered/+",
    "LWT/#",
    "migrate_report/+/+",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::install(args.log.as_deref(), args.log_level, args.verbose)?;
    info!("starting mecctl");

    let store = match Store::open(&args.database_file.display().to_string()) {
        Ok(store) => store,
        Err(err) => {
            error!(%err, "failed to open store");
            std::process::exit(1);
        }
    };

    if let Some(profile_path) = args.profile_file.as_deref() {
        let profile = match TopologyProfile::load(profile_path) {
            Ok(profile) => profile,
            Err(err) => {
                error!(%err, "failed to load profile file");
                std::process::exit(1);
            }
        };
        for server in profile.servers() {
            store.upsert_server(&server)?;
        }
        for bts in profile.base_stations() {
            store.upsert_bts(&bts)?;
        }
        info!(path = %profile_path.display(), "seeded store from topology profile");
    }

    let all_bts = store.all_bts()?;
    let updated: Vec<UpdatedEntry> = store
        .all_servers()?
        .into_iter()
        .map(|server| {
            let bs = all_bts
                .iter()
                .find(|b| b.server_name.as_deref() == Some(server.name.as_str()))
                .map(|b| b.name.clone());
            UpdatedEntry { server_name: server.name, ip: server.ip, distance: server.distance_tier, bs }
        })
        .collect();

    let planner = match args.planner {
        PlannerArg::Nearest => PlannerKind::Simple(Box::new(NearestPlanner)),
        PlannerArg::Random => PlannerKind::Simple(Box::new(RandomPlanner)),
        PlannerArg::Cloud => PlannerKind::Simple(Box::new(CloudPlanner)),
        PlannerArg::Optimization => PlannerKind::Optimised,
    };

    let last_will = LastWill { topic: "LWT/centre".to_string(), payload: b"offline".to_vec() };
    let (bus, mut inbound) = match MqttBus::connect(&args.broker_host, BROKER_PORT, CLIENT_ID, last_will).await {
        Ok(pair) => pair,
        Err(err) => {
            error!(%err, "failed to connect to message bus");
            std::process::exit(1);
        }
    };

    for pattern in SUBSCRIBE_PATTERNS {
        bus.subscribe(pattern).await?;
    }

    let bus_dyn: Arc<dyn MessageBus> = bus.clone();
    let orchestrator = OrchestratorService::start(store, bus_dyn, planner);
    let handlers = Arc::new(Handlers { orchestrator, migrate_method: args.migrate_method.into() });

    publish_json(bus.as_ref(), "updated", &updated).await?;
    info!(count = updated.len(), "published initial server list");

    let mut shutdown = std::pin::pin!(shutdown_signal());
    let mut inflight = tokio::task::JoinSet::new();

    loop {
        tokio::select! {
            msg = inbound.recv() => {
                match msg {
                    Some(msg) => {
                        let handlers = handlers.clone();
                        inflight.spawn(async move { handlers.dispatch(msg).await });
                    }
                    None => {
                        info!("bus channel closed, shutting down");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, draining in-flight work");
                break;
            }
            Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
        }
    }

    while inflight.join_next().await.is_some() {}
    info!("mecctl shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
