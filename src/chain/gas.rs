use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::{debug, warn};

const GAS_STATION_URL: &str = "https://ethgasstation.info/api/ethgasAPI.json";

/// Seconds a transaction may stay pending before the dynamic price is bumped
const REPRICE_EVERY_SECS: u64 = 30;

/// Reactive pricing tuned by the gas-station feed
#[derive(Debug, Clone)]
pub struct DynamicGasConfig {
    pub api_key: String,
    pub initial_multiplier: Decimal,
    pub reactive_multiplier: Decimal,
    /// Ceiling in gwei
    pub maximum_gwei: Decimal,
}

/// How transaction gas prices are chosen
#[derive(Debug, Clone)]
pub enum GasStrategy {
    /// Let the node pick
    Node,
    Fixed { price_gwei: Decimal },
    Dynamic(DynamicGasConfig),
}

impl GasStrategy {
    /// Gas price in gwei for a transaction that has been pending for
    /// `elapsed_secs`. `None` leaves pricing to the node.
    pub fn price_for(&self, base_price_gwei: Decimal, elapsed_secs: u64) -> Option<Decimal> {
        match self {
            GasStrategy::Node => None,
            GasStrategy::Fixed { price_gwei } => Some(*price_gwei),
            GasStrategy::Dynamic(config) => {
                let steps = elapsed_secs / REPRICE_EVERY_SECS;
                let mut price = base_price_gwei.checked_mul(config.initial_multiplier);

                for _ in 0..steps {
                    match price {
                        Some(current) if current < config.maximum_gwei => {
                            price = current.checked_mul(config.reactive_multiplier);
                        }
                        _ => break,
                    }
                }

                // Overflow saturates at the ceiling
                Some(price.map_or(config.maximum_gwei, |p| p.min(config.maximum_gwei)))
            }
        }
    }

    /// Fast-price feed backing the dynamic strategy
    pub fn gas_station(&self) -> Option<GasStationClient> {
        match self {
            GasStrategy::Dynamic(config) => Some(GasStationClient::new(config.api_key.clone())),
            GasStrategy::Node | GasStrategy::Fixed { .. } => None,
        }
    }

    /// Whether the price can change while a transaction is pending
    pub fn is_reactive(&self) -> bool {
        matches!(self, GasStrategy::Dynamic(_))
    }
}

#[derive(Debug, Deserialize)]
struct GasStationResponse {
    /// Reported in tenths of a gwei
    fast: Decimal,
}

/// Client for the gas-station "fast" price feed
pub struct GasStationClient {
    client: Client,
    api_key: String,
}

impl GasStationClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }

    /// Fast price in gwei, or `None` when the feed is unavailable
    pub async fn fast_price_gwei(&self) -> Option<Decimal> {
        let url = format!("{}?api-key={}", GAS_STATION_URL, self.api_key);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("⚠️ Gas station unreachable, falling back to node price: {:?}", e);
                return None;
            }
        };

        match response.json::<GasStationResponse>().await {
            Ok(body) => {
                let price = body.fast / dec!(10);
                debug!("⛽ Gas station fast price: {} gwei", price);
                Some(price)
            }
            Err(e) => {
                warn!("⚠️ Malformed gas station response: {:?}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamic() -> GasStrategy {
        GasStrategy::Dynamic(DynamicGasConfig {
            api_key: "key".to_string(),
            initial_multiplier: dec!(1.0),
            reactive_multiplier: dec!(2.25),
            maximum_gwei: dec!(5000),
        })
    }

    #[test]
    fn test_fixed_and_node_prices() {
        assert_eq!(GasStrategy::Node.price_for(dec!(20), 600), None);

        let fixed = GasStrategy::Fixed { price_gwei: dec!(42) };
        assert_eq!(fixed.price_for(dec!(20), 0), Some(dec!(42)));
        assert_eq!(fixed.price_for(dec!(20), 600), Some(dec!(42)));
    }

    #[test]
    fn test_dynamic_price_grows_every_interval() {
        let strategy = dynamic();

        assert_eq!(strategy.price_for(dec!(20), 0), Some(dec!(20)));
        assert_eq!(strategy.price_for(dec!(20), 29), Some(dec!(20)));
        assert_eq!(strategy.price_for(dec!(20), 30), Some(dec!(45)));
        assert_eq!(strategy.price_for(dec!(20), 60), Some(dec!(101.25)));
    }

    #[test]
    fn test_dynamic_price_saturates_instead_of_overflowing() {
        let strategy = GasStrategy::Dynamic(DynamicGasConfig {
            api_key: "key".to_string(),
            initial_multiplier: dec!(1.0),
            reactive_multiplier: dec!(1000000000),
            maximum_gwei: Decimal::MAX,
        });

        assert_eq!(strategy.price_for(dec!(20), 3600), Some(Decimal::MAX));
        assert_eq!(
            GasStrategy::Dynamic(DynamicGasConfig {
                api_key: "key".to_string(),
                initial_multiplier: Decimal::MAX,
                reactive_multiplier: dec!(2),
                maximum_gwei: dec!(5000),
            })
            .price_for(dec!(20), 0),
            Some(dec!(5000))
        );
    }

    #[test]
    fn test_only_dynamic_gas_uses_the_station() {
        let station = dynamic().gas_station().unwrap();
        assert_eq!(station.api_key, "key");

        assert!(GasStrategy::Node.gas_station().is_none());
        assert!(GasStrategy::Fixed { price_gwei: dec!(1) }.gas_station().is_none());
    }

    #[test]
    fn test_dynamic_price_is_capped() {
        let strategy = dynamic();
        assert_eq!(strategy.price_for(dec!(20), 3600), Some(dec!(5000)));
        assert_eq!(strategy.price_for(dec!(9000), 0), Some(dec!(5000)));
    }
}
