use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::chain::models::{Address, AuctionHouse, AuctionHouseKind};
use crate::error::{KeeperError, KeeperResult};

fn default_collateral_auction_kind() -> AuctionHouseKind {
    AuctionHouseKind::EnglishCollateral
}

/// A collateral type and the auction house that liquidates it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralConfig {
    pub name: String,
    pub collateral_auction_house: Address,
    #[serde(default = "default_collateral_auction_kind")]
    pub auction_kind: AuctionHouseKind,
}

impl CollateralConfig {
    pub fn auction_house(&self) -> AuctionHouse {
        AuctionHouse {
            kind: self.auction_kind,
            address: self.collateral_auction_house,
        }
    }
}

/// System contract addresses for one protocol deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub safe_engine: Address,
    pub accounting_engine: Address,
    pub surplus_auction_house: Address,
    pub debt_auction_house: Address,
    pub tax_collector: Address,
    pub global_settlement: Address,
    pub oracle_relayer: Address,
    /// Order here is the order markets are evaluated in
    #[serde(default)]
    pub collaterals: Vec<CollateralConfig>,
}

impl Deployment {
    pub fn from_json(raw: &str) -> KeeperResult<Self> {
        let deployment: Deployment = serde_json::from_str(raw)
            .map_err(|e| KeeperError::Deployment(format!("Malformed descriptor: {}", e)))?;

        deployment.validate()?;
        Ok(deployment)
    }

    pub fn from_file(path: &Path) -> KeeperResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            KeeperError::Deployment(format!("Cannot read {}: {}", path.display(), e))
        })?;

        let deployment = Self::from_json(&raw)?;
        info!(
            "📄 Loaded deployment from {} ({} collateral types)",
            path.display(),
            deployment.collaterals.len()
        );
        Ok(deployment)
    }

    /// Explicit descriptor file if given, otherwise the network default
    pub fn load(
        explicit_file: Option<&Path>,
        deployments_dir: &Path,
        network: &str,
    ) -> KeeperResult<Self> {
        match explicit_file {
            Some(path) => Self::from_file(path),
            None => Self::from_file(&Self::network_default_path(deployments_dir, network)),
        }
    }

    pub fn network_default_path(deployments_dir: &Path, network: &str) -> PathBuf {
        deployments_dir.join(format!("{}.json", network))
    }

    pub fn surplus_house(&self) -> AuctionHouse {
        AuctionHouse {
            kind: AuctionHouseKind::Surplus,
            address: self.surplus_auction_house,
        }
    }

    pub fn debt_house(&self) -> AuctionHouse {
        AuctionHouse {
            kind: AuctionHouseKind::Debt,
            address: self.debt_auction_house,
        }
    }

    pub fn collateral(&self, name: &str) -> Option<&CollateralConfig> {
        self.collaterals.iter().find(|c| c.name == name)
    }

    pub fn collateral_names(&self) -> Vec<&str> {
        self.collaterals.iter().map(|c| c.name.as_str()).collect()
    }

    fn validate(&self) -> KeeperResult<()> {
        let mut seen = HashSet::new();

        for collateral in &self.collaterals {
            if collateral.name.trim().is_empty() {
                return Err(KeeperError::Deployment(
                    "Collateral type with empty name".to_string(),
                ));
            }

            if !seen.insert(collateral.name.as_str()) {
                return Err(KeeperError::Deployment(format!(
                    "Duplicate collateral type: {}",
                    collateral.name
                )));
            }

            if !collateral.auction_kind.is_collateral() {
                return Err(KeeperError::Deployment(format!(
                    "{} uses a {} auction house, expected a collateral auction house",
                    collateral.name, collateral.auction_kind
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_deployment(markets: &[(&str, AuctionHouseKind)]) -> Deployment {
    let address = |byte: u8| Address::new([byte; 20]);

    Deployment {
        safe_engine: address(1),
        accounting_engine: address(2),
        surplus_auction_house: address(3),
        debt_auction_house: address(4),
        tax_collector: address(5),
        global_settlement: address(6),
        oracle_relayer: address(7),
        collaterals: markets
            .iter()
            .enumerate()
            .map(|(i, (name, kind))| CollateralConfig {
                name: name.to_string(),
                collateral_auction_house: address(0x10 + i as u8),
                auction_kind: *kind,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"{
        "safe_engine": "0x1111111111111111111111111111111111111111",
        "accounting_engine": "0x2222222222222222222222222222222222222222",
        "surplus_auction_house": "0x3333333333333333333333333333333333333333",
        "debt_auction_house": "0x4444444444444444444444444444444444444444",
        "tax_collector": "0x5555555555555555555555555555555555555555",
        "global_settlement": "0x6666666666666666666666666666666666666666",
        "oracle_relayer": "0x7777777777777777777777777777777777777777",
        "collaterals": [
            { "name": "ETH-A", "collateral_auction_house": "0x8888888888888888888888888888888888888888" },
            { "name": "ETH-B", "collateral_auction_house": "0x9999999999999999999999999999999999999999",
              "auction_kind": "fixed_discount_collateral" }
        ]
    }"#;

    #[test]
    fn test_parse_descriptor() {
        let deployment = Deployment::from_json(DESCRIPTOR).unwrap();

        assert_eq!(deployment.collateral_names(), vec!["ETH-A", "ETH-B"]);
        assert_eq!(
            deployment.collateral("ETH-A").unwrap().auction_kind,
            AuctionHouseKind::EnglishCollateral
        );
        assert_eq!(
            deployment.collateral("ETH-B").unwrap().auction_kind,
            AuctionHouseKind::FixedDiscountCollateral
        );
        assert_eq!(deployment.surplus_house().kind, AuctionHouseKind::Surplus);
        assert_eq!(deployment.debt_house().kind, AuctionHouseKind::Debt);
    }

    #[test]
    fn test_rejects_malformed_descriptor() {
        let error = Deployment::from_json("{ \"safe_engine\": \"0x12\" }").unwrap_err();
        assert!(error.is_fatal());
    }

    #[test]
    fn test_rejects_duplicate_and_misfiled_collaterals() {
        let duplicated = DESCRIPTOR.replace("ETH-B", "ETH-A");
        assert!(matches!(
            Deployment::from_json(&duplicated),
            Err(KeeperError::Deployment(_))
        ));

        let misfiled = DESCRIPTOR.replace("fixed_discount_collateral", "surplus");
        assert!(matches!(
            Deployment::from_json(&misfiled),
            Err(KeeperError::Deployment(_))
        ));
    }

    #[test]
    fn test_network_default_path() {
        let path = Deployment::network_default_path(Path::new("deployments"), "kovan");
        assert_eq!(path, PathBuf::from("deployments/kovan.json"));
    }
}
