use std::sync::Arc;
use tracing::{debug, info};

use crate::chain::gateway::{AuctionHouseView, ChainAuctionHouse, ChainGateway};
use crate::chain::models::{AuctionHouse, Bid};
use crate::deployment::Deployment;
use crate::error::KeeperResult;

/// Bids of one house that shutdown rules allow to be terminated early,
/// in ascending auction id order
pub async fn terminable_bids(house: &dyn AuctionHouseView) -> KeeperResult<Vec<Bid>> {
    let kind = house.kind();
    let auction_count = house.auctions_started().await?;

    let mut terminable = Vec::new();
    for id in 1..=auction_count {
        let bid = house.bid_at(id).await?;
        if kind.is_terminable(&bid) {
            terminable.push(bid);
        }
    }

    debug!(
        "{} auction house: {} of {} auctions terminable",
        kind,
        terminable.len(),
        auction_count
    );

    Ok(terminable)
}

/// Terminable bids across every auction house of the deployment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuctionSnapshot {
    /// Per collateral type, in descriptor order
    pub collateral: Vec<(String, Vec<Bid>)>,
    pub surplus: Vec<Bid>,
    pub debt: Vec<Bid>,
}

impl AuctionSnapshot {
    pub fn total(&self) -> usize {
        self.collateral.iter().map(|(_, bids)| bids.len()).sum::<usize>()
            + self.surplus.len()
            + self.debt.len()
    }
}

/// Walks all auction houses looking for auctions to unwind
pub struct AuctionSurveyor {
    gateway: Arc<dyn ChainGateway>,
    deployment: Arc<Deployment>,
}

impl AuctionSurveyor {
    pub fn new(gateway: Arc<dyn ChainGateway>, deployment: Arc<Deployment>) -> Self {
        Self {
            gateway,
            deployment,
        }
    }

    fn view(&self, house: AuctionHouse) -> ChainAuctionHouse {
        ChainAuctionHouse::new(self.gateway.clone(), house)
    }

    pub async fn survey_all(&self) -> KeeperResult<AuctionSnapshot> {
        let mut collateral = Vec::with_capacity(self.deployment.collaterals.len());

        // Every collateral type has its own collateral auction house
        for config in &self.deployment.collaterals {
            let bids = terminable_bids(&self.view(config.auction_house())).await?;
            collateral.push((config.name.clone(), bids));
        }

        let surplus = terminable_bids(&self.view(self.deployment.surplus_house())).await?;
        let debt = terminable_bids(&self.view(self.deployment.debt_house())).await?;

        let snapshot = AuctionSnapshot {
            collateral,
            surplus,
            debt,
        };

        info!(
            "🔨 Auctions to unwind: {} collateral, {} surplus, {} debt",
            snapshot.total() - snapshot.surplus.len() - snapshot.debt.len(),
            snapshot.surplus.len(),
            snapshot.debt.len()
        );

        Ok(snapshot)
    }
}
