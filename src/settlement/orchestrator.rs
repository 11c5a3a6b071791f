use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::chain::gas::GasStrategy;
use crate::chain::gateway::ChainGateway;
use crate::chain::models::{Address, Bid, SettlementCall, TxReceipt};
use crate::deployment::Deployment;
use crate::error::{GatewayError, KeeperError, KeeperResult};
use crate::settlement::catalog::MarketCatalog;
use crate::settlement::scanner::InsolvencyScanner;
use crate::settlement::session::{PersistedSession, SessionStore, SettlementSession};
use crate::settlement::surveyor::AuctionSurveyor;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Errors tolerated before the keeper asks to be stopped
    pub max_errors: u32,
    /// Stop once the outstanding supply is fixed. Off on testnet.
    pub halt_after_finalization: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_errors: 100,
            halt_after_finalization: true,
        }
    }
}

/// What the process shell should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Terminate,
}

/// Drives emergency shutdown from confirmation through finalization
pub struct SettlementOrchestrator {
    gateway: Arc<dyn ChainGateway>,
    deployment: Arc<Deployment>,
    catalog: MarketCatalog,
    scanner: InsolvencyScanner,
    surveyor: AuctionSurveyor,
    store: SessionStore,
    gas: GasStrategy,
    our_address: Address,
    config: OrchestratorConfig,
}

impl SettlementOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        deployment: Arc<Deployment>,
        scanner: InsolvencyScanner,
        store: SessionStore,
        gas: GasStrategy,
        our_address: Address,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            catalog: MarketCatalog::new(gateway.clone(), deployment.clone()),
            surveyor: AuctionSurveyor::new(gateway.clone(), deployment.clone()),
            gateway,
            deployment,
            scanner,
            store,
            gas,
            our_address,
            config,
        }
    }

    /// Log the deployment so the operator can confirm it before anything is sent
    pub async fn run_startup_check(&self, session: &SettlementSession) -> KeeperResult<()> {
        let balance = self.gateway.native_balance(self.our_address).await?;

        info!("");
        info!("Please confirm the deployment details");
        info!("Keeper Address: {}", self.our_address);
        info!("Keeper Balance: {} ETH", balance);
        info!("SAFE Engine: {}", self.deployment.safe_engine);
        info!("Accounting Engine: {}", self.deployment.accounting_engine);
        info!("Surplus Auction House: {}", self.deployment.surplus_auction_house);
        info!("Debt Auction House: {}", self.deployment.debt_auction_house);
        info!("Tax Collector: {}", self.deployment.tax_collector);
        info!("Global Settlement: {}", self.deployment.global_settlement);
        info!("Oracle Relayer: {}", self.deployment.oracle_relayer);
        for collateral in &self.deployment.collaterals {
            info!(
                "Collateral Auction House [{}] ({}): {}",
                collateral.name, collateral.auction_kind, collateral.collateral_auction_house
            );
        }
        info!("Session: {:?}", session.phase());
        info!("");

        Ok(())
    }

    /// Tick entry point, called once per new block. Errors are counted on
    /// the session; the tick after the limit is reached asks to terminate.
    #[instrument(skip(self, session), fields(confirmations = session.confirmations))]
    pub async fn on_new_block(&self, session: &mut SettlementSession, block: u64) -> TickOutcome {
        if self.limit_reached(session) {
            return TickOutcome::Terminate;
        }

        match self.check_settlement(session, block).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_error(session, &e);
                TickOutcome::Continue
            }
        }
    }

    /// Whether the error budget is spent and the keeper should stop
    pub fn limit_reached(&self, session: &SettlementSession) -> bool {
        if session.errors < self.config.max_errors {
            return false;
        }

        error!(
            "🛑 {} errors reached the limit of {}, terminating keeper",
            session.errors, self.config.max_errors
        );
        true
    }

    /// Count a failure that happened on behalf of a tick
    pub fn record_error(&self, session: &mut SettlementSession, error: &KeeperError) {
        session.errors += 1;
        error!(
            "❌ Settlement tick failed ({}/{} errors): {}",
            session.errors, self.config.max_errors, error
        );
    }

    async fn check_settlement(&self, session: &mut SettlementSession, block: u64) -> KeeperResult<TickOutcome> {
        info!("Checking settlement on block {}", block);

        let contract_enabled = self.gateway.contract_enabled().await?;
        session.contract_enabled = contract_enabled;

        if contract_enabled {
            if session.confirmations > 0 {
                warn!(
                    "⚠️ Global settlement re-enabled after {} confirmations, back to watching",
                    session.confirmations
                );
                session.confirmations = 0;
            }
            return Ok(TickOutcome::Continue);
        }

        if !session.is_confirmed() {
            session.confirmations += 1;
            info!(
                "======== System has been settled ( {} confirmations) ========",
                session.confirmations
            );
            if !session.is_confirmed() {
                return Ok(TickOutcome::Continue);
            }
        }

        info!("======== System has been settled ========");

        let shutdown_time = self.gateway.shutdown_time().await?;
        let shutdown_cooldown = self.gateway.shutdown_cooldown().await?;
        session.shutdown_time = Some(shutdown_time);
        session.shutdown_cooldown = Some(shutdown_cooldown);

        if !session.facilitated {
            self.facilitate(session, block).await?;
            return Ok(TickOutcome::Continue);
        }

        if session.finalized {
            return Ok(TickOutcome::Continue);
        }

        let now = self.gateway.block_timestamp(block).await?;
        let now = Utc
            .timestamp_opt(now, 0)
            .single()
            .ok_or(GatewayError::Decode {
                method: "block_timestamp".to_string(),
                message: format!("timestamp out of range: {}", now),
            })?;

        let deadline = session.cooldown_deadline().ok_or_else(|| {
            KeeperError::Arithmetic(format!(
                "cooldown of {}s overflows shutdown time {}",
                shutdown_cooldown, shutdown_time
            ))
        })?;

        if now < deadline {
            info!("");
            info!(
                "settlement has been processed and outstanding coin supply will be set on {} UTC",
                deadline.format("%m/%d/%Y, %H:%M:%S")
            );
            info!("");
            return Ok(TickOutcome::Continue);
        }

        debug!("Session phase: {:?}", session.phase_at(now));
        self.finalize(session, block).await?;

        if self.config.halt_after_finalization {
            info!("🏁 Settlement finalized, terminating keeper");
            Ok(TickOutcome::Terminate)
        } else {
            Ok(TickOutcome::Continue)
        }
    }

    /// Processing period: runs at most once per session. The flag is set and
    /// persisted before any transaction goes out, so a crash part-way never
    /// replays the phase.
    pub async fn facilitate(&self, session: &mut SettlementSession, block: u64) -> KeeperResult<()> {
        if session.facilitated {
            return Ok(());
        }

        // The flag only flips once it is on disk
        let persisted = PersistedSession {
            facilitated: true,
            ..session.persisted(Some(block))
        };
        self.store.save(&persisted).await?;
        session.facilitated = true;

        self.facilitate_processing_period(block).await
    }

    async fn facilitate_processing_period(&self, block: u64) -> KeeperResult<()> {
        info!("");
        info!("======== Facilitating Settlement ========");
        info!("");

        let markets = self.catalog.relevant_markets().await?;
        let auctions = self.surveyor.survey_all().await?;

        self.terminate_auctions_prematurely(&auctions.surplus, &auctions.debt)
            .await?;

        for market in &markets {
            self.transact(SettlementCall::FreezeCollateralType {
                market: market.name.clone(),
            })
            .await?;
        }

        // Collateral auctions are fast-tracked rather than terminated
        for (market, bids) in &auctions.collateral {
            for bid in bids {
                self.transact(SettlementCall::FastTrackAuction {
                    market: market.clone(),
                    auction_id: bid.id,
                })
                .await?;
            }
        }

        let safes = self.scanner.underwater_positions(&markets, block).await?;
        for safe in safes {
            self.transact(SettlementCall::ProcessSafe {
                market: safe.market,
                owner: safe.owner,
            })
            .await?;
        }

        info!("✓ Processing period facilitated");
        Ok(())
    }

    async fn terminate_auctions_prematurely(&self, surplus_bids: &[Bid], debt_bids: &[Bid]) -> KeeperResult<()> {
        let surplus_house = self.deployment.surplus_house();
        for bid in surplus_bids {
            self.transact(SettlementCall::TerminateAuctionPrematurely {
                house: surplus_house,
                auction_id: bid.id,
            })
            .await?;
        }

        let debt_house = self.deployment.debt_house();
        for bid in debt_bids {
            self.transact(SettlementCall::TerminateAuctionPrematurely {
                house: debt_house,
                auction_id: bid.id,
            })
            .await?;
        }

        Ok(())
    }

    /// Once the cooldown is over: annihilate lingering system coin in the
    /// accounting engine, fix the outstanding supply, then every cash price.
    /// Each step depends on the previous one being mined.
    pub async fn finalize(&self, session: &mut SettlementSession, block: u64) -> KeeperResult<()> {
        if session.finalized {
            return Ok(());
        }

        info!("");
        info!("======== Setting outstanding coin supply ========");
        info!("");

        let markets = self.catalog.relevant_markets().await?;

        let system_coin = self
            .gateway
            .coin_balance(self.deployment.accounting_engine)
            .await?;
        if system_coin > Decimal::ZERO {
            self.transact(SettlementCall::SettleDebt { amount: system_coin })
                .await?;
        }

        self.transact(SettlementCall::SetOutstandingCoinSupply).await?;

        for market in &markets {
            self.transact(SettlementCall::CalculateCashPrice {
                market: market.name.clone(),
            })
            .await?;
        }

        session.finalized = true;
        self.store.save(&session.persisted(Some(block))).await?;

        info!("✓ Outstanding coin supply set for {} collateral types", markets.len());
        Ok(())
    }

    async fn transact(&self, call: SettlementCall) -> KeeperResult<TxReceipt> {
        self.gateway.submit(&call, &self.gas).await
    }
}
