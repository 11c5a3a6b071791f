use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::chain::gas::{DynamicGasConfig, GasStrategy};
use crate::chain::models::Address;
use crate::error::{KeeperError, KeeperResult};

const ENV_PREFIX: &str = "KEEPER";

fn default_rpc_scheme() -> String {
    "https".to_string()
}

fn default_rpc_host() -> String {
    "localhost".to_string()
}

fn default_rpc_port() -> u16 {
    8545
}

fn default_rpc_timeout() -> u64 {
    1200
}

fn default_deployments_dir() -> PathBuf {
    PathBuf::from("deployments")
}

fn default_max_errors() -> u32 {
    100
}

fn default_gas_initial_multiplier() -> Decimal {
    dec!(1.0)
}

fn default_gas_reactive_multiplier() -> Decimal {
    dec!(2.25)
}

fn default_gas_maximum() -> Decimal {
    dec!(5000)
}

fn default_state_file() -> PathBuf {
    PathBuf::from("settlement-keeper-state.json")
}

fn default_block_poll_interval_ms() -> u64 {
    1000
}

fn default_scan_concurrency() -> usize {
    1
}

/// Keeper settings, read from `KEEPER_*` environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct KeeperConfig {
    #[serde(default = "default_rpc_scheme")]
    pub rpc_scheme: String,
    #[serde(default = "default_rpc_host")]
    pub rpc_host: String,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    /// Seconds
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout: u64,

    /// `mainnet`, `kovan`, `testnet`, ...
    pub network: String,
    /// This keeper already facilitated the processing period
    #[serde(default)]
    pub previous_settlement: bool,

    pub eth_from: String,
    /// Space separated key descriptors
    #[serde(default)]
    pub eth_key: Vec<String>,

    pub gf_deployment_file: Option<PathBuf>,
    #[serde(default = "default_deployments_dir")]
    pub deployments_dir: PathBuf,
    #[serde(default)]
    pub safe_engine_deployment_block: u64,

    pub vulcanize_endpoint: Option<String>,
    pub vulcanize_key: Option<String>,

    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
    #[serde(default)]
    pub debug: bool,

    pub ethgasstation_api_key: Option<String>,
    /// Gwei; ignored when the gas station is configured
    pub fixed_gas_price: Option<Decimal>,
    #[serde(default = "default_gas_initial_multiplier")]
    pub gas_initial_multiplier: Decimal,
    #[serde(default = "default_gas_reactive_multiplier")]
    pub gas_reactive_multiplier: Decimal,
    /// Gwei
    #[serde(default = "default_gas_maximum")]
    pub gas_maximum: Decimal,

    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_block_poll_interval_ms")]
    pub block_poll_interval_ms: u64,
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
}

impl KeeperConfig {
    pub fn from_env() -> KeeperResult<Self> {
        Self::load(None)
    }

    /// `vars` replaces the process environment, keyed like `KEEPER_NETWORK`
    pub fn load(vars: Option<HashMap<String, String>>) -> KeeperResult<Self> {
        let environment = config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(" ")
            .with_list_parse_key("eth_key")
            .source(vars);

        let settings = config::Config::builder().add_source(environment).build()?;
        let config: KeeperConfig = settings.try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> KeeperResult<()> {
        if self.network.trim().is_empty() {
            return Err(KeeperError::Config("KEEPER_NETWORK must be set".to_string()));
        }

        self.sender_address()?;

        if self.max_errors == 0 {
            return Err(KeeperError::Config(
                "KEEPER_MAX_ERRORS must be at least 1".to_string(),
            ));
        }

        if self.gas_initial_multiplier <= Decimal::ZERO
            || self.gas_reactive_multiplier < Decimal::ONE
            || self.gas_maximum <= Decimal::ZERO
        {
            return Err(KeeperError::Config(format!(
                "Invalid gas tuning: initial {}, reactive {}, maximum {}",
                self.gas_initial_multiplier, self.gas_reactive_multiplier, self.gas_maximum
            )));
        }

        if self.vulcanize_endpoint.is_none() && self.vulcanize_key.is_some() {
            return Err(KeeperError::Config(
                "KEEPER_VULCANIZE_KEY given without KEEPER_VULCANIZE_ENDPOINT".to_string(),
            ));
        }

        Ok(())
    }

    pub fn sender_address(&self) -> KeeperResult<Address> {
        self.eth_from
            .parse()
            .map_err(|e| KeeperError::Config(format!("KEEPER_ETH_FROM: {}", e)))
    }

    pub fn rpc_endpoint(&self) -> String {
        format!("{}://{}:{}", self.rpc_scheme, self.rpc_host, self.rpc_port)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout)
    }

    pub fn block_poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms)
    }

    pub fn gas_strategy(&self) -> GasStrategy {
        if let Some(api_key) = &self.ethgasstation_api_key {
            GasStrategy::Dynamic(DynamicGasConfig {
                api_key: api_key.clone(),
                initial_multiplier: self.gas_initial_multiplier,
                reactive_multiplier: self.gas_reactive_multiplier,
                maximum_gwei: self.gas_maximum,
            })
        } else if let Some(price_gwei) = self.fixed_gas_price {
            GasStrategy::Fixed { price_gwei }
        } else {
            GasStrategy::Node
        }
    }

    /// Testnet keepers keep running after the supply is fixed
    pub fn halt_after_finalization(&self) -> bool {
        self.network != "testnet"
    }

    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}
