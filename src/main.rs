mod bootstrap;
mod chain;
mod config;
mod deployment;
mod error;
mod history;
mod settlement;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::KeeperConfig;
use crate::settlement::StopReason;

// Initialize logging and tracing
fn init_tracing(keeper_level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("info,settlement_keeper={}", keeper_level)),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let config = match KeeperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            error!("❌ {}", e);
            return Err(e.into());
        }
    };

    init_tracing(config.log_filter());

    info!("🚀 Starting settlement keeper on {}", config.network);

    let bootstrap::Keeper {
        scheduler,
        mut session,
    } = match bootstrap::initialize_keeper(&config).await {
        Ok(keeper) => keeper,
        Err(e) => {
            if e.is_fatal() {
                error!("❌ Cannot start keeper: {}", e);
            } else {
                error!("❌ Keeper initialization failed: {}", e);
            }
            return Err(e.into());
        }
    };

    match scheduler.run(&mut session).await {
        StopReason::Terminated => info!("🏁 Keeper terminated"),
        StopReason::Signal => info!("🛑 Keeper stopped by signal"),
    }

    Ok(())
}
