// Emergency shutdown orchestration
pub mod catalog;
pub mod orchestrator;
pub mod scanner;
pub mod scheduler;
pub mod session;
pub mod surveyor;

pub use orchestrator::{OrchestratorConfig, SettlementOrchestrator};
pub use scanner::InsolvencyScanner;
pub use scheduler::{BlockScheduler, StopReason};
pub use session::{SessionStore, SettlementSession};
