use std::sync::Arc;
use tracing::info;

use crate::chain::gateway::ChainGateway;
use crate::chain::models::Market;
use crate::deployment::Deployment;
use crate::error::KeeperResult;

/// Enumerates the configured collateral types that still carry debt
pub struct MarketCatalog {
    gateway: Arc<dyn ChainGateway>,
    deployment: Arc<Deployment>,
}

impl MarketCatalog {
    pub fn new(gateway: Arc<dyn ChainGateway>, deployment: Arc<Deployment>) -> Self {
        Self {
            gateway,
            deployment,
        }
    }

    /// Fresh read of every configured market, keeping those with debt > 0.
    /// Debt moves every block, so nothing is cached between calls.
    pub async fn relevant_markets(&self) -> KeeperResult<Vec<Market>> {
        let mut relevant = Vec::with_capacity(self.deployment.collaterals.len());

        for collateral in &self.deployment.collaterals {
            let market = self.gateway.market(&collateral.name).await?;
            if market.has_debt() {
                relevant.push(market);
            }
        }

        let names: Vec<&str> = relevant.iter().map(|m| m.name.as_str()).collect();
        info!("📋 Collateral types to check: {:?}", names);

        Ok(relevant)
    }
}
