use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::info;

use crate::chain::models::{Address, Position};
use crate::error::{HistoryError, KeeperResult};
use crate::history::PositionHistory;

const SAFES_QUERY: &str = r#"
query SafesByCollateralType($collateralType: String!, $blockHeight: BigInt!) {
  safesByCollateralType(collateralType: $collateralType, blockHeight: $blockHeight) {
    nodes {
      safeAddress
      lockedCollateral
      generatedDebt
    }
  }
}
"#;

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<SafesData>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafesData {
    safes_by_collateral_type: SafeConnection,
}

#[derive(Deserialize)]
struct SafeConnection {
    nodes: Vec<SafeNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafeNode {
    safe_address: String,
    #[serde(with = "rust_decimal::serde::str")]
    locked_collateral: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    generated_debt: Decimal,
}

/// GraphQL client for the position indexing service
pub struct IndexerHistory {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl IndexerHistory {
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> KeeperResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HistoryError::from)?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

fn into_positions(market: &str, nodes: Vec<SafeNode>) -> Result<Vec<Position>, HistoryError> {
    nodes
        .into_iter()
        .map(|node| {
            let owner: Address = node
                .safe_address
                .parse()
                .map_err(|e| HistoryError::Decode(format!("{}", e)))?;

            Ok(Position {
                owner,
                market: market.to_string(),
                locked_collateral: node.locked_collateral,
                generated_debt: node.generated_debt,
            })
        })
        .collect()
}

#[async_trait]
impl PositionHistory for IndexerHistory {
    async fn positions_for_market(&self, market: &str, as_of_block: u64) -> KeeperResult<Vec<Position>> {
        let request = GraphQlRequest {
            query: SAFES_QUERY,
            variables: json!({
                "collateralType": market,
                "blockHeight": as_of_block.to_string(),
            }),
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Basic {}", key));
        }

        let response = builder.send().await.map_err(HistoryError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HistoryError::Request(format!("HTTP {}: {}", status, body)).into());
        }

        let body: GraphQlResponse = response.json().await.map_err(HistoryError::from)?;

        if let Some(errors) = body.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(HistoryError::Query(messages.join("; ")).into());
        }

        let data = body
            .data
            .ok_or_else(|| HistoryError::Decode("response without data".to_string()))?;

        let positions = into_positions(market, data.safes_by_collateral_type.nodes)?;
        info!("🗂️ Indexer returned {} safes for {}", positions.len(), market);
        Ok(positions)
    }
}
