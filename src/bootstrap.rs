use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    chain::{ChainGateway, HttpChainGateway, RpcConfig, SenderIdentity},
    config::KeeperConfig,
    deployment::Deployment,
    error::KeeperResult,
    history::{ChainLogHistory, IndexerHistory, PositionHistory},
    settlement::{
        BlockScheduler, InsolvencyScanner, OrchestratorConfig, SessionStore, SettlementOrchestrator,
        SettlementSession,
    },
};

/// Everything `main` needs to run the keeper
pub struct Keeper {
    pub scheduler: BlockScheduler,
    pub session: SettlementSession,
}

pub async fn initialize_keeper(config: &KeeperConfig) -> KeeperResult<Keeper> {
    info!("Initializing keeper components ...");

    let deployment = Arc::new(Deployment::load(
        config.gf_deployment_file.as_deref(),
        &config.deployments_dir,
        &config.network,
    )?);
    info!(
        "✅ Deployment loaded with collateral types {:?}",
        deployment.collateral_names()
    );

    let our_address = config.sender_address()?;
    let gas = config.gas_strategy();
    let gas_station = gas.gas_station();

    let rpc_config = RpcConfig {
        endpoint: config.rpc_endpoint(),
        timeout: config.rpc_timeout(),
        ..RpcConfig::default()
    };
    let sender = SenderIdentity {
        address: our_address,
        keys: config.eth_key.clone(),
    };
    let gateway: Arc<dyn ChainGateway> = Arc::new(HttpChainGateway::new(
        rpc_config,
        deployment.clone(),
        sender,
        gas_station,
    )?);
    info!("✅ Chain gateway connected to {}", config.rpc_endpoint());

    let history = initialize_history(config, gateway.clone())?;
    let scanner = InsolvencyScanner::new(gateway.clone(), history, config.scan_concurrency);

    // Durable progress
    let store = SessionStore::new(config.state_file.clone());
    let persisted = store.load().await?;
    if persisted.facilitated && !config.previous_settlement {
        warn!(
            "⚠️  {} records a facilitated processing period (block {:?}), resuming from it",
            config.state_file.display(),
            persisted.facilitated_at_block
        );
    }
    let session = SettlementSession::resume(config.previous_settlement, &persisted);

    let orchestrator = Arc::new(SettlementOrchestrator::new(
        gateway.clone(),
        deployment,
        scanner,
        store,
        gas,
        our_address,
        OrchestratorConfig {
            max_errors: config.max_errors,
            halt_after_finalization: config.halt_after_finalization(),
        },
    ));

    let scheduler = BlockScheduler::new(gateway, orchestrator, config.block_poll_interval());
    info!("✅ Keeper ready on {}", config.network);

    Ok(Keeper { scheduler, session })
}

fn initialize_history(
    config: &KeeperConfig,
    gateway: Arc<dyn ChainGateway>,
) -> KeeperResult<Arc<dyn PositionHistory>> {
    match &config.vulcanize_endpoint {
        Some(endpoint) => {
            info!("📚 Position history from indexer {}", endpoint);
            Ok(Arc::new(IndexerHistory::new(
                endpoint.clone(),
                config.vulcanize_key.clone(),
                config.rpc_timeout(),
            )?))
        }
        None => {
            info!(
                "📚 Position history from chain logs since block {}",
                config.safe_engine_deployment_block
            );
            Ok(Arc::new(ChainLogHistory::new(
                gateway,
                config.safe_engine_deployment_block,
            )))
        }
    }
}
