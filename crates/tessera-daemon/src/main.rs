// crates/tessera-daemon/src/main.rs
//
// Binary entrypoint for the Tessera validator daemon.
//
// Initializes tracing, parses CLI arguments, loads configuration, opens and
// verifies the archive, restores the registry and recent history, wires the
// HTTP collaborators into the SlotCoordinator, starts the RPC server and
// runs the slot scheduler until ctrl-c.

mod config;
mod dendrite;
mod evaluator;
mod gossip;
mod ledger;
mod peers;
mod scheduler;
mod shared;
mod state;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tokio::sync::RwLock;

use tessera_consensus::{Collaborators, SlotCoordinator};
use tessera_core::crypto::Keypair;
use tessera_core::error::TesseraError;
use tessera_core::traits::{LedgerSink, SlotArchive, TaskEvaluator};
use tessera_core::types::Uid;
use tessera_rpc::{RpcConfig, TesseraRpcServer};
use tessera_store::RocksStore;

use config::{decode_key, DaemonConfig};
use dendrite::HttpDispatcher;
use evaluator::{HttpEvaluator, NeutralEvaluator};
use gossip::GossipExchange;
use ledger::{HttpLedgerSink, LogLedgerSink};
use peers::PeerRegistry;
use scheduler::{SlotClock, SlotScheduler};
use shared::DaemonSharedState;
use state::{NodeState, NodeStateMachine};

/// Tessera daemon: runs one validator of the slot consensus network.
#[derive(Parser, Debug)]
#[command(name = "tessera-daemon", version = "0.1.0", about = "Tessera validator daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.tessera/config.toml")]
    config: String,

    /// Validator uid; overrides the config file value.
    #[arg(long)]
    uid: Option<Uid>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config_path = expand_tilde(&args.config);

    let mut daemon_config = match DaemonConfig::load(&config_path) {
        Ok(cfg) => {
            tracing::info!("Loaded configuration from {}", config_path);
            cfg
        }
        Err(e) => {
            tracing::warn!(
                "Could not load config from {}: {}. Using defaults.",
                config_path,
                e
            );
            DaemonConfig::default()
        }
    };
    if let Some(uid) = args.uid {
        daemon_config.uid = uid;
    }

    tracing::info!("Tessera Daemon v0.1.0");
    tracing::info!("Validator uid: {}", daemon_config.uid);
    tracing::info!("Data directory: {}", daemon_config.data_dir);
    tracing::info!(
        "RPC endpoint: {}:{}",
        daemon_config.rpc_host,
        daemon_config.rpc_port
    );

    let mut node_state = NodeStateMachine::new();
    node_state.transition(NodeState::Loading)?;

    // ---------------------------------------------------------------
    // Archive: open and verify before anything reads from it.
    // ---------------------------------------------------------------
    let data_dir = expand_tilde(&daemon_config.data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let archive_path = format!("{}/archive", data_dir);
    let store = Arc::new(RocksStore::open(&archive_path)?);

    match store.verify_all() {
        Ok(records) => tracing::info!("Archive {} verified ({} records)", archive_path, records),
        Err(e) => {
            tracing::error!("Refusing to start: {}", e);
            node_state.transition(NodeState::Halted)?;
            return Err(e.into());
        }
    }

    let clock = SlotClock::new(
        daemon_config.genesis_unix_ms,
        daemon_config.consensus.slot_duration_ms,
    )?;
    let current_slot = clock.slot_at(Utc::now().timestamp_millis());

    let registry = match store.load_registry().await? {
        Some(registry) => {
            tracing::info!("Restored registry with {} participants", registry.len());
            registry
        }
        None => {
            let registry = daemon_config.bootstrap_registry(current_slot)?;
            store.save_registry(&registry).await?;
            tracing::info!(
                "Bootstrapped registry with {} participants at slot {}",
                registry.len(),
                current_slot
            );
            registry
        }
    };

    let schedule = daemon_config.param_schedule(store.load_schedule().await?, current_slot)?;
    store.save_schedule(&schedule).await?;
    tracing::info!(
        "Parameter schedule has {} versions; v{} governs slot {}",
        schedule.version_count(),
        schedule.for_slot(current_slot).version,
        current_slot
    );

    let keypair = load_hotkey(&daemon_config);
    match registry.get(daemon_config.uid) {
        Some(me) if me.is_validator() && me.hotkey == keypair.public_key() => {}
        Some(me) if me.is_validator() => tracing::warn!(
            "Hotkey does not match registry entry for uid {}; peers will reject our scores",
            me.uid
        ),
        _ => tracing::warn!(
            "uid {} is not a registered validator; local scores will carry no trust",
            daemon_config.uid
        ),
    }

    let peers = Arc::new(PeerRegistry::resolve(
        daemon_config.self_url.clone(),
        &daemon_config.peers,
        &registry,
        daemon_config.uid,
        Duration::from_millis(daemon_config.http_timeout_ms),
    ));
    tracing::info!(
        "Gossiping to {} peers (self: {})",
        peers.peer_count(),
        peers.self_url.as_deref().unwrap_or("unset")
    );

    // ---------------------------------------------------------------
    // Coordinator wiring.
    // ---------------------------------------------------------------
    let client = peers.http_client().clone();
    let evaluator: Arc<dyn TaskEvaluator> = match &daemon_config.evaluator_url {
        Some(url) => {
            tracing::info!("Scoring answers with evaluator at {}", url);
            Arc::new(HttpEvaluator::new(url.clone(), client.clone()))
        }
        None => Arc::new(NeutralEvaluator),
    };
    let ledger: Arc<dyn LedgerSink> = match &daemon_config.ledger_url {
        Some(url) => {
            tracing::info!("Committing slots to ledger at {}", url);
            Arc::new(HttpLedgerSink::new(url.clone(), client.clone()))
        }
        None => Arc::new(LogLedgerSink),
    };
    let collaborators = Collaborators {
        dispatcher: Arc::new(HttpDispatcher::new(client)),
        evaluator,
        exchange: Arc::new(GossipExchange::new(peers.clone())),
        ledger,
    };

    let history_window = schedule.for_slot(current_slot).history_window;
    let coordinator = Arc::new(
        SlotCoordinator::new(
            daemon_config.uid,
            keypair,
            schedule,
            Arc::new(RwLock::new(registry)),
            collaborators,
        )
        .with_archive(store.clone() as Arc<dyn SlotArchive>),
    );

    let restore_from = current_slot.saturating_sub(history_window);
    let restored = coordinator
        .restore_history(store.commits_from(restore_from)?)
        .await;
    tracing::info!("Restored {} commits from slot {}", restored, restore_from);

    node_state.transition(NodeState::Ready)?;
    let shared = DaemonSharedState::new(coordinator.clone(), peers.clone(), node_state);

    // ---------------------------------------------------------------
    // RPC server.
    // ---------------------------------------------------------------
    let rpc_config = RpcConfig {
        host: daemon_config.rpc_host.clone(),
        port: daemon_config.rpc_port,
    };
    let rpc_server = TesseraRpcServer::new(rpc_config, coordinator)
        .with_peer_count(shared.peers.peer_count())
        .with_start_time(shared.start_time);
    tokio::spawn(async move {
        if let Err(e) = rpc_server.start().await {
            tracing::error!("RPC server error: {}", e);
        }
    });

    // ---------------------------------------------------------------
    // Slot scheduling until ctrl-c.
    // ---------------------------------------------------------------
    shared.node_state.write().await.transition(NodeState::Running)?;
    let scheduler = SlotScheduler::new(shared.clone(), clock);
    scheduler.run().await?;

    shared
        .node_state
        .write()
        .await
        .transition(NodeState::ShuttingDown)?;
    tracing::info!("Tessera daemon stopped");
    Ok(())
}

/// Load the hotkey secret from `hotkey_path`, or fall back to an ephemeral key.
fn load_hotkey(config: &DaemonConfig) -> Keypair {
    let path = expand_tilde(&config.hotkey_path);
    let secret = std::fs::read_to_string(&path)
        .map_err(|e| TesseraError::NotFound(format!("{}: {}", path, e)))
        .and_then(|text| {
            decode_key(&text).ok_or_else(|| {
                TesseraError::Crypto(format!("{} is not a 32-byte hex key", path))
            })
        });

    match secret {
        Ok(secret) => Keypair::from_secret(&secret),
        Err(e) => {
            tracing::warn!("Using an ephemeral hotkey: {}", e);
            Keypair::generate()
        }
    }
}

/// Expand `~` at the start of a path to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}
