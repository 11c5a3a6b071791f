use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::KeeperError;

/// 20-byte account / contract address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    #[cfg(test)]
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(digits)
            .map_err(|e| KeeperError::InvalidAddress(format!("{}: {}", s, e)))?;

        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| KeeperError::InvalidAddress(format!("{}: expected 20 bytes", s)))?;

        Ok(Self(array))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// Collateral type snapshot as seen by the safe engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub safety_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub accumulated_rate: Decimal,
    /// Total normalized debt outstanding for the collateral type
    #[serde(with = "rust_decimal::serde::str")]
    pub debt_amount: Decimal,
}

impl Market {
    pub fn has_debt(&self) -> bool {
        self.debt_amount > Decimal::ZERO
    }
}

/// A single debt position (SAFE) inside a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub owner: Address,
    pub market: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub locked_collateral: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub generated_debt: Decimal,
}

/// Auction lot as stored by an auction house
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub id: u64,
    pub high_bidder: Address,
    #[serde(with = "rust_decimal::serde::str")]
    pub bid_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount_to_sell: Decimal,
    /// Zero for houses without a raise ceiling
    #[serde(with = "rust_decimal::serde::str")]
    pub amount_to_raise: Decimal,
    pub bid_expiry: i64,
    pub auction_deadline: i64,
}

impl Bid {
    pub fn has_bidder(&self) -> bool {
        !self.high_bidder.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionHouseKind {
    /// Ascending-price collateral auction
    EnglishCollateral,
    FixedDiscountCollateral,
    Surplus,
    Debt,
}

impl AuctionHouseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionHouseKind::EnglishCollateral => "english_collateral",
            AuctionHouseKind::FixedDiscountCollateral => "fixed_discount_collateral",
            AuctionHouseKind::Surplus => "surplus",
            AuctionHouseKind::Debt => "debt",
        }
    }

    pub fn is_collateral(&self) -> bool {
        matches!(
            self,
            AuctionHouseKind::EnglishCollateral | AuctionHouseKind::FixedDiscountCollateral
        )
    }

    /// Whether a bid may be terminated (or fast-tracked) after shutdown.
    /// Bids nobody has bid on are inert.
    pub fn is_terminable(&self, bid: &Bid) -> bool {
        if !bid.has_bidder() {
            return false;
        }

        match self {
            AuctionHouseKind::EnglishCollateral => bid.bid_amount < bid.amount_to_raise,
            AuctionHouseKind::FixedDiscountCollateral
            | AuctionHouseKind::Surplus
            | AuctionHouseKind::Debt => true,
        }
    }
}

impl fmt::Display for AuctionHouseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Address and flavour of an auction house contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionHouse {
    pub kind: AuctionHouseKind,
    pub address: Address,
}

/// State-changing calls the keeper issues during settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum SettlementCall {
    FreezeCollateralType {
        market: String,
    },
    FastTrackAuction {
        market: String,
        auction_id: u64,
    },
    TerminateAuctionPrematurely {
        house: AuctionHouse,
        auction_id: u64,
    },
    ProcessSafe {
        market: String,
        owner: Address,
    },
    SettleDebt {
        #[serde(with = "rust_decimal::serde::str")]
        amount: Decimal,
    },
    SetOutstandingCoinSupply,
    CalculateCashPrice {
        market: String,
    },
}

impl SettlementCall {
    pub fn name(&self) -> &'static str {
        match self {
            SettlementCall::FreezeCollateralType { .. } => "freezeCollateralType",
            SettlementCall::FastTrackAuction { .. } => "fastTrackAuction",
            SettlementCall::TerminateAuctionPrematurely { .. } => "terminateAuctionPrematurely",
            SettlementCall::ProcessSafe { .. } => "processSAFE",
            SettlementCall::SettleDebt { .. } => "settleDebt",
            SettlementCall::SetOutstandingCoinSupply => "setOutstandingCoinSupply",
            SettlementCall::CalculateCashPrice { .. } => "calculateCashPrice",
        }
    }
}

impl fmt::Display for SettlementCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettlementCall::FreezeCollateralType { market } => {
                write!(f, "{}({})", self.name(), market)
            }
            SettlementCall::FastTrackAuction { market, auction_id } => {
                write!(f, "{}({}, {})", self.name(), market, auction_id)
            }
            SettlementCall::TerminateAuctionPrematurely { house, auction_id } => {
                write!(f, "{}[{}]({})", self.name(), house.kind, auction_id)
            }
            SettlementCall::ProcessSafe { market, owner } => {
                write!(f, "{}({}, {})", self.name(), market, owner)
            }
            SettlementCall::SettleDebt { amount } => write!(f, "{}({})", self.name(), amount),
            SettlementCall::SetOutstandingCoinSupply => write!(f, "{}()", self.name()),
            SettlementCall::CalculateCashPrice { market } => {
                write!(f, "{}({})", self.name(), market)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Reverted,
}

/// Outcome of a submitted transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub status: TxStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bid(bidder: Address, bid_amount: Decimal, amount_to_raise: Decimal) -> Bid {
        Bid {
            id: 1,
            high_bidder: bidder,
            bid_amount,
            amount_to_sell: dec!(10),
            amount_to_raise,
            bid_expiry: 0,
            auction_deadline: 0,
        }
    }

    #[test]
    fn test_address_parse_and_display() {
        let address: Address = "0x00000000000000000000000000000000000000Ab".parse().unwrap();
        assert_eq!(
            address.to_string(),
            "0x00000000000000000000000000000000000000ab"
        );
        assert!(!address.is_zero());

        assert!("0x1234".parse::<Address>().is_err());
        assert!("not-hex".parse::<Address>().is_err());
    }

    #[test]
    fn test_english_auction_requires_uncovered_bid() {
        let bidder = Address::new([7u8; 20]);
        let kind = AuctionHouseKind::EnglishCollateral;

        assert!(kind.is_terminable(&bid(bidder, dec!(99), dec!(100))));
        assert!(!kind.is_terminable(&bid(bidder, dec!(100), dec!(100))));
        assert!(!kind.is_terminable(&bid(Address::ZERO, dec!(1), dec!(100))));
    }

    #[test]
    fn test_other_auctions_only_need_a_bidder() {
        let bidder = Address::new([7u8; 20]);

        for kind in [
            AuctionHouseKind::FixedDiscountCollateral,
            AuctionHouseKind::Surplus,
            AuctionHouseKind::Debt,
        ] {
            assert!(kind.is_terminable(&bid(bidder, dec!(500), dec!(100))));
            assert!(kind.is_terminable(&bid(bidder, dec!(100), dec!(100))));
            assert!(!kind.is_terminable(&bid(Address::ZERO, dec!(1), dec!(100))));
        }
    }

    #[test]
    fn test_settlement_call_wire_format() {
        let call = SettlementCall::SettleDebt { amount: dec!(12.5) };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["call"], "settle_debt");
        assert_eq!(json["amount"], "12.5");
    }
}
