// Position history sources for the insolvency scan
pub mod chain_logs;
pub mod indexer;

use async_trait::async_trait;

use crate::chain::models::Position;
use crate::error::KeeperResult;

pub use chain_logs::ChainLogHistory;
pub use indexer::IndexerHistory;

/// Returns every known position of a collateral type
#[async_trait]
pub trait PositionHistory: Send + Sync {
    async fn positions_for_market(&self, market: &str, as_of_block: u64) -> KeeperResult<Vec<Position>>;
}
