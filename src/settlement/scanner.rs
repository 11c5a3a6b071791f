use futures::stream::{self, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::chain::gateway::ChainGateway;
use crate::chain::models::{Market, Position};
use crate::error::{KeeperError, KeeperResult};
use crate::history::PositionHistory;

/// Progress is logged every this many positions
const PROGRESS_EVERY: usize = 100;

/// `generated_debt × accumulated_rate`
pub fn debt_value(position: &Position, market: &Market) -> Option<Decimal> {
    position.generated_debt.checked_mul(market.accumulated_rate)
}

/// `locked_collateral × safety_price ÷ safety_c_ratio`
pub fn collateral_value(position: &Position, market: &Market, safety_c_ratio: Decimal) -> Option<Decimal> {
    position
        .locked_collateral
        .checked_mul(market.safety_price)?
        .checked_div(safety_c_ratio)
}

/// A position is underwater when its debt strictly exceeds the
/// ratio-adjusted collateral value. Equality is not underwater.
pub fn is_underwater(position: &Position, market: &Market, safety_c_ratio: Decimal) -> KeeperResult<bool> {
    if safety_c_ratio <= Decimal::ZERO {
        return Err(KeeperError::Arithmetic(format!(
            "non-positive safety ratio {} for {}",
            safety_c_ratio, market.name
        )));
    }

    let debt = debt_value(position, market).ok_or_else(|| {
        KeeperError::Arithmetic(format!("debt overflow for {} in {}", position.owner, market.name))
    })?;
    let collateral = collateral_value(position, market, safety_c_ratio).ok_or_else(|| {
        KeeperError::Arithmetic(format!(
            "collateral overflow for {} in {}",
            position.owner, market.name
        ))
    })?;

    Ok(debt > collateral)
}

/// Surveys every position of the given markets for insolvency
pub struct InsolvencyScanner {
    gateway: Arc<dyn ChainGateway>,
    history: Arc<dyn PositionHistory>,
    /// Markets scanned at once; results are merged in market order
    concurrency: usize,
}

impl InsolvencyScanner {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        history: Arc<dyn PositionHistory>,
        concurrency: usize,
    ) -> Self {
        Self {
            gateway,
            history,
            concurrency: concurrency.max(1),
        }
    }

    /// Underwater positions, grouped by market in input order and ordered
    /// by owner within a market
    pub async fn underwater_positions(&self, markets: &[Market], as_of_block: u64) -> KeeperResult<Vec<Position>> {
        let per_market: Vec<Vec<Position>> = stream::iter(markets)
            .map(|market| self.scan_market(market, as_of_block))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let underwater: Vec<Position> = per_market.into_iter().flatten().collect();
        info!("🌊 Found {} underwater safes", underwater.len());

        Ok(underwater)
    }

    async fn scan_market(&self, market: &Market, as_of_block: u64) -> KeeperResult<Vec<Position>> {
        let mut positions = self
            .history
            .positions_for_market(&market.name, as_of_block)
            .await?;
        positions.sort_by(|a, b| a.owner.cmp(&b.owner));

        info!("Collected {} safes from {}", positions.len(), market.name);

        let mut underwater = Vec::new();

        for (index, position) in positions.into_iter().enumerate() {
            // Rates and prices drift between history capture and now
            let current = self.gateway.market(&market.name).await?;
            let safety_c_ratio = self.gateway.safety_c_ratio(&market.name).await?;

            if is_underwater(&position, &current, safety_c_ratio)? {
                underwater.push(position);
            }

            if (index + 1) % PROGRESS_EVERY == 0 {
                info!("Processed {} safes of {}", index + 1, market.name);
            }
        }

        Ok(underwater)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{market, position, MockGateway};
    use crate::chain::models::Address;
    use rust_decimal_macros::dec;

    fn scanner(gateway: &Arc<MockGateway>, concurrency: usize) -> InsolvencyScanner {
        InsolvencyScanner::new(gateway.clone(), gateway.clone(), concurrency)
    }

    #[test]
    fn test_underwater_scenario() {
        let eth = market("ETH-A", dec!(100), dec!(1.0), dec!(1000));

        // 10 * 100 / 1.5 = 666.67
        let deep = position(1, "ETH-A", dec!(10), dec!(800));
        let safe = position(2, "ETH-A", dec!(10), dec!(600));

        assert!(is_underwater(&deep, &eth, dec!(1.5)).unwrap());
        assert!(!is_underwater(&safe, &eth, dec!(1.5)).unwrap());
    }

    #[test]
    fn test_equality_is_not_underwater() {
        let eth = market("ETH-A", dec!(150), dec!(2), dec!(1000));
        // debt = 500 * 2 = 1000, collateral = 10 * 150 / 1.5 = 1000
        let edge = position(1, "ETH-A", dec!(10), dec!(500));

        assert!(!is_underwater(&edge, &eth, dec!(1.5)).unwrap());
    }

    #[test]
    fn test_ratio_lowers_the_collateral_side() {
        let eth = market("ETH-A", dec!(100), dec!(1), dec!(1000));
        // collateral 1000 undivided, 500 at ratio 2
        let p = position(1, "ETH-A", dec!(10), dec!(700));

        assert!(!is_underwater(&p, &eth, dec!(1)).unwrap());
        assert!(is_underwater(&p, &eth, dec!(2)).unwrap());
    }

    #[test]
    fn test_zero_ratio_is_rejected() {
        let eth = market("ETH-A", dec!(100), dec!(1), dec!(1000));
        let p = position(1, "ETH-A", dec!(10), dec!(700));

        assert!(matches!(
            is_underwater(&p, &eth, Decimal::ZERO),
            Err(KeeperError::Arithmetic(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_returns_exact_underwater_subset() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_market(market("ETH-A", dec!(100), dec!(1.0), dec!(5000)), dec!(1.5));
        gateway.set_market(market("ETH-B", dec!(10), dec!(1.1), dec!(5000)), dec!(2));
        gateway.set_positions(
            "ETH-A",
            vec![
                position(9, "ETH-A", dec!(10), dec!(800)),
                position(3, "ETH-A", dec!(10), dec!(600)),
                position(5, "ETH-A", dec!(1), dec!(67)),
            ],
        );
        // 100 * 10 / 2 = 500 vs 460 * 1.1 = 506
        gateway.set_positions(
            "ETH-B",
            vec![
                position(1, "ETH-B", dec!(100), dec!(460)),
                position(2, "ETH-B", dec!(100), dec!(450)),
            ],
        );

        let markets = vec![
            market("ETH-A", dec!(100), dec!(1.0), dec!(5000)),
            market("ETH-B", dec!(10), dec!(1.1), dec!(5000)),
        ];

        for concurrency in [1, 4] {
            let underwater = scanner(&gateway, concurrency)
                .underwater_positions(&markets, 42)
                .await
                .unwrap();
            let owners: Vec<Address> = underwater.iter().map(|p| p.owner).collect();

            assert_eq!(
                owners,
                vec![
                    Address::new([5u8; 20]),
                    Address::new([9u8; 20]),
                    Address::new([1u8; 20]),
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_uses_fresh_market_parameters() {
        let gateway = Arc::new(MockGateway::new());
        // Snapshot handed in says healthy, chain says the rate has doubled
        let stale = market("ETH-A", dec!(100), dec!(1.0), dec!(5000));
        gateway.set_market(market("ETH-A", dec!(100), dec!(2.0), dec!(5000)), dec!(1.5));
        gateway.set_positions("ETH-A", vec![position(1, "ETH-A", dec!(10), dec!(600))]);

        let underwater = scanner(&gateway, 1)
            .underwater_positions(&[stale], 7)
            .await
            .unwrap();

        assert_eq!(underwater.len(), 1);
        assert_eq!(gateway.state.lock().market_reads, 1);
        assert_eq!(
            gateway.state.lock().history_requests,
            vec![("ETH-A".to_string(), 7)]
        );
    }
}
