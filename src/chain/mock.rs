//! In-memory gateway used by the unit tests

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::chain::gas::GasStrategy;
use crate::chain::gateway::ChainGateway;
use crate::chain::models::*;
use crate::error::{GatewayError, KeeperResult, SubmissionError};
use crate::history::PositionHistory;

#[derive(Default)]
pub struct MockState {
    pub block_number: u64,
    /// Every block-number read observes a new block
    pub auto_advance: bool,
    pub block_timestamp: i64,
    pub contract_enabled: bool,
    pub shutdown_time: i64,
    pub shutdown_cooldown: u64,
    pub markets: HashMap<String, Market>,
    pub safety_c_ratios: HashMap<String, Decimal>,
    pub coin_balances: HashMap<Address, Decimal>,
    pub bids: HashMap<Address, Vec<Bid>>,
    pub positions: HashMap<String, Vec<Position>>,
    pub submitted: Vec<SettlementCall>,
    pub reverting: Option<String>,
    pub offline: bool,
    pub market_reads: usize,
    pub history_requests: Vec<(String, u64)>,
}

#[derive(Default)]
pub struct MockGateway {
    pub state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                contract_enabled: true,
                ..Default::default()
            }),
        }
    }

    pub fn set_market(&self, market: Market, safety_c_ratio: Decimal) {
        let mut state = self.state.lock();
        state.safety_c_ratios.insert(market.name.clone(), safety_c_ratio);
        state.markets.insert(market.name.clone(), market);
    }

    pub fn set_bids(&self, house: Address, bids: Vec<Bid>) {
        self.state.lock().bids.insert(house, bids);
    }

    pub fn set_positions(&self, market: &str, positions: Vec<Position>) {
        self.state.lock().positions.insert(market.to_string(), positions);
    }

    pub fn submitted(&self) -> Vec<SettlementCall> {
        self.state.lock().submitted.clone()
    }

    pub fn clear_submitted(&self) {
        self.state.lock().submitted.clear();
    }

    fn check_online(&self) -> Result<(), GatewayError> {
        if self.state.lock().offline {
            return Err(GatewayError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

pub fn market(name: &str, safety_price: Decimal, accumulated_rate: Decimal, debt: Decimal) -> Market {
    Market {
        name: name.to_string(),
        safety_price,
        accumulated_rate,
        debt_amount: debt,
    }
}

pub fn bid(id: u64, bidder: u8, bid_amount: Decimal, amount_to_raise: Decimal) -> Bid {
    Bid {
        id,
        high_bidder: Address::new([bidder; 20]),
        bid_amount,
        amount_to_sell: Decimal::ONE,
        amount_to_raise,
        bid_expiry: 0,
        auction_deadline: 0,
    }
}

pub fn position(owner: u8, market: &str, locked_collateral: Decimal, generated_debt: Decimal) -> Position {
    Position {
        owner: Address::new([owner; 20]),
        market: market.to_string(),
        locked_collateral,
        generated_debt,
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn block_number(&self) -> KeeperResult<u64> {
        self.check_online()?;
        let mut state = self.state.lock();
        if state.auto_advance {
            state.block_number += 1;
        }
        Ok(state.block_number)
    }

    async fn block_timestamp(&self, _block: u64) -> KeeperResult<i64> {
        self.check_online()?;
        Ok(self.state.lock().block_timestamp)
    }

    async fn contract_enabled(&self) -> KeeperResult<bool> {
        self.check_online()?;
        Ok(self.state.lock().contract_enabled)
    }

    async fn shutdown_time(&self) -> KeeperResult<DateTime<Utc>> {
        self.check_online()?;
        let seconds = self.state.lock().shutdown_time;
        Ok(Utc.timestamp_opt(seconds, 0).unwrap())
    }

    async fn shutdown_cooldown(&self) -> KeeperResult<u64> {
        self.check_online()?;
        Ok(self.state.lock().shutdown_cooldown)
    }

    async fn market(&self, name: &str) -> KeeperResult<Market> {
        self.check_online()?;
        let mut state = self.state.lock();
        state.market_reads += 1;
        state
            .markets
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownMarket(name.to_string()).into())
    }

    async fn safety_c_ratio(&self, name: &str) -> KeeperResult<Decimal> {
        self.check_online()?;
        self.state
            .lock()
            .safety_c_ratios
            .get(name)
            .copied()
            .ok_or_else(|| GatewayError::UnknownMarket(name.to_string()).into())
    }

    async fn coin_balance(&self, holder: Address) -> KeeperResult<Decimal> {
        self.check_online()?;
        Ok(self
            .state
            .lock()
            .coin_balances
            .get(&holder)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn native_balance(&self, _holder: Address) -> KeeperResult<Decimal> {
        self.check_online()?;
        Ok(Decimal::ONE)
    }

    async fn auctions_started(&self, house: &AuctionHouse) -> KeeperResult<u64> {
        self.check_online()?;
        Ok(self
            .state
            .lock()
            .bids
            .get(&house.address)
            .map(|bids| bids.len() as u64)
            .unwrap_or(0))
    }

    async fn bid(&self, house: &AuctionHouse, id: u64) -> KeeperResult<Bid> {
        self.check_online()?;
        let state = self.state.lock();
        let bid = state
            .bids
            .get(&house.address)
            .and_then(|bids| bids.iter().find(|b| b.id == id))
            .cloned()
            .unwrap_or(Bid {
                id,
                high_bidder: Address::ZERO,
                bid_amount: Decimal::ZERO,
                amount_to_sell: Decimal::ZERO,
                amount_to_raise: Decimal::ZERO,
                bid_expiry: 0,
                auction_deadline: 0,
            });
        Ok(bid)
    }

    async fn modified_positions(
        &self,
        market: &str,
        _from_block: u64,
        _to_block: u64,
    ) -> KeeperResult<Vec<Position>> {
        self.check_online()?;
        Ok(self
            .state
            .lock()
            .positions
            .get(market)
            .cloned()
            .unwrap_or_default())
    }

    async fn submit(&self, call: &SettlementCall, _gas: &GasStrategy) -> KeeperResult<TxReceipt> {
        self.check_online()?;
        let mut state = self.state.lock();

        if state.reverting.as_deref() == Some(call.name()) {
            return Err(SubmissionError::Reverted {
                call: call.clone(),
                transaction_hash: "0xdead".to_string(),
            }
            .into());
        }

        state.submitted.push(call.clone());
        Ok(TxReceipt {
            transaction_hash: format!("0x{:04x}", state.submitted.len()),
            block_number: Some(state.block_number),
            status: TxStatus::Confirmed,
        })
    }
}

#[async_trait]
impl PositionHistory for MockGateway {
    async fn positions_for_market(&self, market: &str, as_of_block: u64) -> KeeperResult<Vec<Position>> {
        self.check_online()?;
        let mut state = self.state.lock();
        state.history_requests.push((market.to_string(), as_of_block));
        Ok(state.positions.get(market).cloned().unwrap_or_default())
    }
}
