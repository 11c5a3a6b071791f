// Block scheduler - turns new blocks into orchestrator ticks
//
// - Polls the gateway for the latest block number
// - Runs exactly one tick per unseen block, never two at once
// - SIGINT / SIGTERM let the in-flight tick finish, then stop

use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::chain::gateway::ChainGateway;
use crate::settlement::orchestrator::{SettlementOrchestrator, TickOutcome};
use crate::settlement::session::SettlementSession;

/// Why the scheduler stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The orchestrator asked to terminate
    Terminated,
    /// Interrupted from outside
    Signal,
}

pub struct BlockScheduler {
    gateway: Arc<dyn ChainGateway>,
    orchestrator: Arc<SettlementOrchestrator>,
    poll_interval: Duration,
}

impl BlockScheduler {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        orchestrator: Arc<SettlementOrchestrator>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            gateway,
            orchestrator,
            poll_interval,
        }
    }

    /// Run until the orchestrator terminates or a signal arrives
    pub async fn run(&self, session: &mut SettlementSession) -> StopReason {
        if let Err(e) = self.orchestrator.run_startup_check(session).await {
            warn!("⚠️ Startup check failed: {}", e);
        }

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_block: Option<u64> = None;

        info!("⏰ Watching for new blocks every {:?}", self.poll_interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("👋 Termination signal received, stopping keeper");
                    return StopReason::Signal;
                }
                _ = ticker.tick() => {
                    let block = match self.gateway.block_number().await {
                        Ok(block) => block,
                        Err(e) => {
                            self.orchestrator.record_error(session, &e);
                            if self.orchestrator.limit_reached(session) {
                                return StopReason::Terminated;
                            }
                            continue;
                        }
                    };

                    if last_block.is_some_and(|last| block <= last) {
                        debug!("No new block since {}", block);
                        continue;
                    }
                    last_block = Some(block);

                    if self.orchestrator.on_new_block(session, block).await == TickOutcome::Terminate {
                        info!("✓ Keeper terminated at block {}", block);
                        return StopReason::Terminated;
                    }
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
