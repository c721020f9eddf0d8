//! podlingd: the Podling control plane daemon.
//!
//! Single binary that assembles the control plane:
//! - State store (in-memory or redb)
//! - Scheduler + workload dispatch
//! - ClusterIP allocator + endpoint controller
//! - Node membership + liveness monitor
//! - REST API
//!
//! # Usage
//!
//! ```text
//! podlingd --config /etc/podling/podling.toml --listen 0.0.0.0:8080
//! podlingd --backend redb --data-dir /var/lib/podling
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use podling_api::{ApiState, build_router};
use podling_cluster::LivenessMonitor;
use podling_endpoints::{EndpointController, Ipv4Cidr};
use podling_scheduler::{HttpDispatcher, Placer, Scheduler};
use podling_state::{MemoryStore, RedbStore, SharedStore};

use crate::config::{Backend, PodlingConfig};

#[derive(Parser)]
#[command(name = "podlingd", about = "Podling control plane daemon")]
struct Cli {
    /// Path to a podling.toml file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to serve the API on.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Data directory for persistent state.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// State store backend.
    #[arg(long, value_enum)]
    backend: Option<Backend>,
}

impl Cli {
    /// Load the config file (if any) and apply flag overrides.
    fn resolve(self) -> anyhow::Result<PodlingConfig> {
        let mut config = match &self.config {
            Some(path) => PodlingConfig::from_file(path)?,
            None => PodlingConfig::default(),
        };
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(data_dir) = self.data_dir {
            config.storage.path = data_dir;
        }
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,podlingd=debug,podling=debug")),
        )
        .init();

    let config = Cli::parse().resolve()?;
    run(config).await
}

fn open_store(config: &PodlingConfig) -> anyhow::Result<SharedStore> {
    let store: SharedStore = match config.storage.backend {
        Backend::Memory => {
            info!("using in-memory state store");
            Arc::new(MemoryStore::new())
        }
        Backend::Redb => {
            std::fs::create_dir_all(&config.storage.path)?;
            let path = config.storage.db_file();
            let store = RedbStore::open(&path)?;
            info!(path = ?path, "state store opened");
            Arc::new(store)
        }
    };
    Ok(store)
}

async fn run(config: PodlingConfig) -> anyhow::Result<()> {
    info!("Podling control plane starting");

    // ── Initialize subsystems ──────────────────────────────────

    let store = open_store(&config)?;

    let cidr = Ipv4Cidr::from_cidr(&config.endpoints.cluster_cidr)?;
    let endpoints = Arc::new(EndpointController::new(
        store.clone(),
        cidr,
        config.endpoints.sync_interval(),
    ));
    let restored = endpoints.restore_allocations()?;
    info!(%cidr, restored, "endpoint controller initialized");

    let mut placer = Placer::new(store.clone(), Arc::new(Scheduler::new()));
    if config.dispatch.enabled {
        placer = placer.with_dispatcher(Arc::new(HttpDispatcher::new(config.dispatch.timeout())));
    }
    info!(dispatch = config.dispatch.enabled, "scheduler initialized");

    let liveness = LivenessMonitor::new(store.clone())
        .with_timeout(config.liveness.timeout())
        .with_interval(config.liveness.interval());

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let endpoints_shutdown = shutdown_rx.clone();
    let liveness_shutdown = shutdown_rx;

    // ── Start background tasks ─────────────────────────────────

    let endpoints_handle = tokio::spawn({
        let endpoints = Arc::clone(&endpoints);
        async move { endpoints.run(endpoints_shutdown).await }
    });

    let liveness_handle = tokio::spawn(async move {
        liveness.run(liveness_shutdown).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState::new(store, Arc::new(placer), endpoints));
    let addr = config.server.listen;

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install CTRL+C handler");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = endpoints_handle.await;
    let _ = liveness_handle.await;

    info!("Podling control plane stopped");
    Ok(())
}
