//! Committee Election Node
//!
//! Main entry point for running a single election node: it drives the
//! logical clock, runs the system contracts and serves election state over
//! JSON-RPC.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use elect_core::config::NodeConfig;
use elect_core::context::TickOutcome;
use elect_core::crypto::ConsensusKeypair;
use elect_core::election::StaticConsensusBootstrap;
use elect_core::rpc::{start_rpc_server, RpcState};
use elect_core::runtime::NodeRuntime;
use elect_core::standby::{RegistrationRecord, RoleType};
use elect_core::storage::db::PropertyDb;
use elect_core::types::{NetworkId, NodeType};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Stake credited to each simulated candidate, scaled by its index
const SIMULATED_BASE_STAKE: u64 = 1_000;
const SIMULATED_PROGRAM_VERSION: &str = "1.0.0";

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = NodeConfig::load(config_path.as_deref())?;
    let params = config.governance_params()?;
    let network_id = NetworkId(config.network_id);
    info!(
        network = network_id.0,
        auditors = params.auditor_group_count,
        validators = params.validator_group_count,
        "Starting election node"
    );

    let db = PropertyDb::open(&config.data_dir)?;
    let fresh = db.is_fresh();
    let mut runtime = NodeRuntime::new(network_id, params.clone(), db.clone(), db.clone());
    if let Some(static_config) = &config.static_consensus {
        runtime = runtime.with_static_bootstrap(StaticConsensusBootstrap::new(static_config, wall_clock_ms())?);
    }

    if fresh {
        runtime.setup(&config.seed_nodes)?;
        for index in 0..config.simulated_nodes {
            let key = ConsensusKeypair::generate().public_key();
            let stake = SIMULATED_BASE_STAKE * (index as u64 + 1);
            let record = RegistrationRecord {
                role: RoleType::Advance,
                consensus_public_key: key.clone(),
                network_ids: [network_id].into_iter().collect(),
                stakes: NodeType::ALL.iter().map(|t| (*t, stake)).collect(),
                account_mortgage: stake,
                required_min_deposit: 0,
                is_genesis_node: false,
            };
            runtime.register_candidate(&key.node_id(), &record, SIMULATED_PROGRAM_VERSION)?;
        }
        info!(
            seeds = config.seed_nodes.len(),
            simulated = config.simulated_nodes,
            "Standby pool initialized"
        );
    } else {
        info!(logic_time = runtime.logic_time()?, "Resuming from existing data");
    }

    let rpc_state = Arc::new(RpcState {
        db: db.clone(),
        network_id,
        params,
    });
    let rpc_port = config.rpc_port;
    tokio::spawn(async move {
        if let Err(e) = start_rpc_server(rpc_state, rpc_port).await {
            error!(error = %e, "RPC server stopped");
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_millis));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match runtime.tick(wall_clock_ms()) {
                    Ok(report) => {
                        for outcome in &report.elections {
                            match outcome {
                                TickOutcome::Committed(election) => info!(
                                    round = report.round,
                                    rotated = ?election.rotated_groups(),
                                    failed = ?election.failed,
                                    genesis_completed = election.genesis_completed,
                                    "Election tick committed"
                                ),
                                TickOutcome::Skipped(reason) => info!(round = report.round, ?reason, "Election tick skipped"),
                            }
                        }
                        if report.failed > 0 {
                            warn!(round = report.round, failed = report.failed, "Contract calls failed");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Timer tick failed");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Stopping node...");
                break;
            }
        }
    }

    db.flush()?;
    Ok(())
}
