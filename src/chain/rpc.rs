use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::chain::gas::{GasStationClient, GasStrategy};
use crate::chain::gateway::ChainGateway;
use crate::chain::models::*;
use crate::deployment::Deployment;
use crate::error::{GatewayError, KeeperResult, SubmissionError};

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub endpoint: String,
    /// Per-request timeout, also the longest a submission is awaited
    pub timeout: Duration,
    pub receipt_poll_interval: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8545".to_string(),
            timeout: Duration::from_secs(1200),
            receipt_poll_interval: Duration::from_secs(5),
        }
    }
}

/// Signing identity forwarded to the gateway's signer
#[derive(Debug, Clone)]
pub struct SenderIdentity {
    pub address: Address,
    /// Key descriptors such as `key_file=...,pass_file=...`
    pub keys: Vec<String>,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Decimal quantities travel as strings to keep full precision
#[derive(Deserialize)]
struct DecimalString(#[serde(with = "rust_decimal::serde::str")] Decimal);

/// JSON-RPC client for the settlement gateway node
///
/// The node exposes the protocol's contract reads under the `keeper_`
/// namespace and signs transactions for the configured sender.
pub struct HttpChainGateway {
    client: Client,
    config: RpcConfig,
    deployment: Arc<Deployment>,
    sender: SenderIdentity,
    gas_station: Option<GasStationClient>,
    request_id: AtomicU64,
}

impl HttpChainGateway {
    pub fn new(
        config: RpcConfig,
        deployment: Arc<Deployment>,
        sender: SenderIdentity,
        gas_station: Option<GasStationClient>,
    ) -> KeeperResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            deployment,
            sender,
            gas_station,
            request_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, GatewayError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Transport(format!(
                "{} returned HTTP {}: {}",
                method, status, body
            )));
        }

        let body: RpcResponse = response.json().await.map_err(|e| GatewayError::Decode {
            method: method.to_string(),
            message: e.to_string(),
        })?;

        if let Some(error) = body.error {
            return Err(GatewayError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        // A null result is meaningful for optional lookups such as receipts
        serde_json::from_value(body.result).map_err(|e| GatewayError::Decode {
            method: method.to_string(),
            message: e.to_string(),
        })
    }

    async fn call_decimal(&self, method: &str, params: Value) -> Result<Decimal, GatewayError> {
        let DecimalString(value) = self.call(method, params).await?;
        Ok(value)
    }

    fn market_params(&self, name: &str) -> Result<Value, GatewayError> {
        if self.deployment.collateral(name).is_none() {
            return Err(GatewayError::UnknownMarket(name.to_string()));
        }
        Ok(json!({
            "safeEngine": self.deployment.safe_engine,
            "oracleRelayer": self.deployment.oracle_relayer,
            "collateralType": name,
        }))
    }

    async fn base_gas_price(&self) -> Result<Decimal, GatewayError> {
        if let Some(gas_station) = &self.gas_station {
            if let Some(price) = gas_station.fast_price_gwei().await {
                return Ok(price);
            }
        }
        self.call_decimal("keeper_gasPriceGwei", json!([])).await
    }

    async fn send(
        &self,
        call: &SettlementCall,
        gas_price: Option<Decimal>,
    ) -> Result<String, SubmissionError> {
        let params = json!({
            "from": self.sender.address,
            "keys": self.sender.keys,
            "deployment": {
                "globalSettlement": self.deployment.global_settlement,
                "accountingEngine": self.deployment.accounting_engine,
                "safeEngine": self.deployment.safe_engine,
            },
            "collateralAuctionHouse": self.collateral_house_for(call),
            "transaction": call,
            "gasPriceGwei": gas_price.map(|p| p.to_string()),
        });

        self.call::<String>("keeper_sendTransaction", params)
            .await
            .map_err(|e| classify_rejection(call, e))
    }

    async fn replace(
        &self,
        call: &SettlementCall,
        transaction_hash: &str,
        gas_price: Decimal,
    ) -> Result<String, SubmissionError> {
        let params = json!({
            "from": self.sender.address,
            "transactionHash": transaction_hash,
            "gasPriceGwei": gas_price.to_string(),
        });

        self.call::<String>("keeper_replaceTransaction", params)
            .await
            .map_err(|e| classify_rejection(call, e))
    }

    fn collateral_house_for(&self, call: &SettlementCall) -> Option<Address> {
        match call {
            SettlementCall::FastTrackAuction { market, .. } => self
                .deployment
                .collateral(market)
                .map(|c| c.collateral_auction_house),
            _ => None,
        }
    }
}

fn classify_rejection(call: &SettlementCall, error: GatewayError) -> SubmissionError {
    let message = error.to_string();
    if message.to_lowercase().contains("underpriced") {
        SubmissionError::Underpriced {
            call: call.clone(),
            message,
        }
    } else {
        SubmissionError::Rejected {
            call: call.clone(),
            message,
        }
    }
}

#[async_trait]
impl ChainGateway for HttpChainGateway {
    async fn block_number(&self) -> KeeperResult<u64> {
        Ok(self.call("keeper_blockNumber", json!([])).await?)
    }

    async fn block_timestamp(&self, block: u64) -> KeeperResult<i64> {
        let timestamp: Option<i64> = self.call("keeper_blockTimestamp", json!([block])).await?;
        Ok(timestamp.ok_or(GatewayError::BlockNotFound(block))?)
    }

    async fn contract_enabled(&self) -> KeeperResult<bool> {
        Ok(self
            .call(
                "keeper_contractEnabled",
                json!([self.deployment.global_settlement]),
            )
            .await?)
    }

    async fn shutdown_time(&self) -> KeeperResult<DateTime<Utc>> {
        let seconds: i64 = self
            .call("keeper_shutdownTime", json!([self.deployment.global_settlement]))
            .await?;

        Utc.timestamp_opt(seconds, 0).single().ok_or_else(|| {
            GatewayError::Decode {
                method: "keeper_shutdownTime".to_string(),
                message: format!("timestamp out of range: {}", seconds),
            }
            .into()
        })
    }

    async fn shutdown_cooldown(&self) -> KeeperResult<u64> {
        Ok(self
            .call(
                "keeper_shutdownCooldown",
                json!([self.deployment.global_settlement]),
            )
            .await?)
    }

    async fn market(&self, name: &str) -> KeeperResult<Market> {
        let params = self.market_params(name)?;
        Ok(self.call("keeper_collateralType", params).await?)
    }

    async fn safety_c_ratio(&self, name: &str) -> KeeperResult<Decimal> {
        let params = self.market_params(name)?;
        Ok(self.call_decimal("keeper_safetyCRatio", params).await?)
    }

    async fn coin_balance(&self, holder: Address) -> KeeperResult<Decimal> {
        Ok(self
            .call_decimal(
                "keeper_coinBalance",
                json!([self.deployment.safe_engine, holder]),
            )
            .await?)
    }

    async fn native_balance(&self, holder: Address) -> KeeperResult<Decimal> {
        Ok(self.call_decimal("keeper_nativeBalance", json!([holder])).await?)
    }

    async fn auctions_started(&self, house: &AuctionHouse) -> KeeperResult<u64> {
        Ok(self
            .call("keeper_auctionsStarted", json!([house.address, house.kind]))
            .await?)
    }

    async fn bid(&self, house: &AuctionHouse, id: u64) -> KeeperResult<Bid> {
        Ok(self
            .call("keeper_bid", json!([house.address, house.kind, id]))
            .await?)
    }

    async fn modified_positions(
        &self,
        market: &str,
        from_block: u64,
        to_block: u64,
    ) -> KeeperResult<Vec<Position>> {
        let mut params = self.market_params(market)?;
        params["fromBlock"] = json!(from_block);
        params["toBlock"] = json!(to_block);
        Ok(self.call("keeper_modifiedSafes", params).await?)
    }

    #[instrument(skip(self, call, gas), fields(call = %call))]
    async fn submit(&self, call: &SettlementCall, gas: &GasStrategy) -> KeeperResult<TxReceipt> {
        let base_price = if matches!(gas, GasStrategy::Node) {
            Decimal::ZERO
        } else {
            self.base_gas_price().await?
        };

        let mut gas_price = gas.price_for(base_price, 0);
        let mut transaction_hash = self.send(call, gas_price).await?;
        info!("📤 Sent {} (tx: {}, gas: {:?} gwei)", call, transaction_hash, gas_price);

        let started = Instant::now();

        loop {
            tokio::time::sleep(self.config.receipt_poll_interval).await;

            let receipt: Option<TxReceipt> = self
                .call("keeper_getTransactionReceipt", json!([transaction_hash]))
                .await?;

            match receipt {
                Some(receipt) if receipt.status == TxStatus::Confirmed => {
                    info!(
                        "✓ {} mined in block {:?} (tx: {})",
                        call, receipt.block_number, receipt.transaction_hash
                    );
                    return Ok(receipt);
                }
                Some(receipt) if receipt.status == TxStatus::Reverted => {
                    return Err(SubmissionError::Reverted {
                        call: call.clone(),
                        transaction_hash: receipt.transaction_hash,
                    }
                    .into());
                }
                _ => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.timeout {
                return Err(SubmissionError::Timeout {
                    call: call.clone(),
                    transaction_hash,
                    waited_secs: elapsed.as_secs(),
                }
                .into());
            }

            if gas.is_reactive() {
                let repriced = gas.price_for(base_price, elapsed.as_secs());
                if let (Some(new_price), Some(current)) = (repriced, gas_price) {
                    if new_price > current {
                        debug!("⛽ Repricing {} from {} to {} gwei", call, current, new_price);
                        match self.replace(call, &transaction_hash, new_price).await {
                            Ok(replacement) => {
                                transaction_hash = replacement;
                                gas_price = Some(new_price);
                            }
                            Err(e) => warn!("⚠️ Replacement for {} failed: {}", call, e),
                        }
                    }
                }
            }
        }
    }
}
