use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::chain::gas::GasStrategy;
use crate::chain::models::*;
use crate::error::KeeperResult;

/// Chain gateway - reads protocol state and submits settlement calls
///
/// Implementations own contract addressing and unit scaling: every amount
/// crossing this boundary is already a human-unit decimal.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Latest block number
    async fn block_number(&self) -> KeeperResult<u64>;

    /// Unix timestamp of a block
    async fn block_timestamp(&self, block: u64) -> KeeperResult<i64>;

    /// `GlobalSettlement.contractEnabled`
    async fn contract_enabled(&self) -> KeeperResult<bool>;

    /// `GlobalSettlement.shutdownTime`
    async fn shutdown_time(&self) -> KeeperResult<DateTime<Utc>>;

    /// `GlobalSettlement.shutdownCooldown` in seconds
    async fn shutdown_cooldown(&self) -> KeeperResult<u64>;

    /// Current safe-engine view of a collateral type
    async fn market(&self, name: &str) -> KeeperResult<Market>;

    /// Oracle relayer safety collateralization ratio for a collateral type
    async fn safety_c_ratio(&self, name: &str) -> KeeperResult<Decimal>;

    /// Internal system-coin balance held in the safe engine
    async fn coin_balance(&self, holder: Address) -> KeeperResult<Decimal>;

    /// Native token balance, used for the startup report
    async fn native_balance(&self, holder: Address) -> KeeperResult<Decimal>;

    async fn auctions_started(&self, house: &AuctionHouse) -> KeeperResult<u64>;

    async fn bid(&self, house: &AuctionHouse, id: u64) -> KeeperResult<Bid>;

    /// Positions of a collateral type rebuilt from safe-engine modification
    /// logs between two blocks (inclusive)
    async fn modified_positions(
        &self,
        market: &str,
        from_block: u64,
        to_block: u64,
    ) -> KeeperResult<Vec<Position>>;

    /// Submit a call and wait for it to be mined
    async fn submit(&self, call: &SettlementCall, gas: &GasStrategy) -> KeeperResult<TxReceipt>;
}

/// Read surface shared by every auction house flavour
#[async_trait]
pub trait AuctionHouseView: Send + Sync {
    fn kind(&self) -> AuctionHouseKind;

    async fn auctions_started(&self) -> KeeperResult<u64>;

    async fn bid_at(&self, id: u64) -> KeeperResult<Bid>;
}

/// An auction house read through the chain gateway
pub struct ChainAuctionHouse {
    gateway: Arc<dyn ChainGateway>,
    house: AuctionHouse,
}

impl ChainAuctionHouse {
    pub fn new(gateway: Arc<dyn ChainGateway>, house: AuctionHouse) -> Self {
        Self { gateway, house }
    }
}

#[async_trait]
impl AuctionHouseView for ChainAuctionHouse {
    fn kind(&self) -> AuctionHouseKind {
        self.house.kind
    }

    async fn auctions_started(&self) -> KeeperResult<u64> {
        self.gateway.auctions_started(&self.house).await
    }

    async fn bid_at(&self, id: u64) -> KeeperResult<Bid> {
        self.gateway.bid(&self.house, id).await
    }
}
