use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::chain::gateway::ChainGateway;
use crate::chain::models::Position;
use crate::error::KeeperResult;
use crate::history::PositionHistory;

/// Rebuilds positions from safe-engine modification logs through the
/// chain gateway. Slow on long histories; prefer the indexer when available.
pub struct ChainLogHistory {
    gateway: Arc<dyn ChainGateway>,
    deployment_block: u64,
}

impl ChainLogHistory {
    pub fn new(gateway: Arc<dyn ChainGateway>, deployment_block: u64) -> Self {
        Self {
            gateway,
            deployment_block,
        }
    }
}

#[async_trait]
impl PositionHistory for ChainLogHistory {
    async fn positions_for_market(&self, market: &str, as_of_block: u64) -> KeeperResult<Vec<Position>> {
        debug!(
            "Scanning {} modification logs from block {} to {}",
            market, self.deployment_block, as_of_block
        );

        self.gateway
            .modified_positions(market, self.deployment_block, as_of_block)
            .await
    }
}
