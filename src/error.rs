use thiserror::Error;

use crate::chain::models::SettlementCall;

/// Top-level error type for the keeper
#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("Chain gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Position history error: {0}")]
    History(#[from] HistoryError),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Deployment descriptor error: {0}")]
    Deployment(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Session store error: {0}")]
    SessionStore(String),

    #[error("Arithmetic error: {0}")]
    Arithmetic(String),
}

impl KeeperError {
    /// Errors that must stop the keeper before it starts ticking
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            KeeperError::Config(_) | KeeperError::Deployment(_) | KeeperError::InvalidAddress(_)
        )
    }
}

/// Read / connectivity failures against the chain gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed response for {method}: {message}")]
    Decode { method: String, message: String },

    #[error("Unknown collateral type: {0}")]
    UnknownMarket(String),

    #[error("Block {0} not found")]
    BlockNotFound(u64),
}

/// Position history / indexing service failures
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Indexer request failed: {0}")]
    Request(String),

    #[error("Indexer returned errors: {0}")]
    Query(String),

    #[error("Malformed indexer record: {0}")]
    Decode(String),
}

/// Transaction submission failures
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("{call} reverted (tx: {transaction_hash})")]
    Reverted {
        call: SettlementCall,
        transaction_hash: String,
    },

    #[error("{call} underpriced: {message}")]
    Underpriced { call: SettlementCall, message: String },

    #[error("{call} not mined after {waited_secs}s (tx: {transaction_hash})")]
    Timeout {
        call: SettlementCall,
        transaction_hash: String,
        waited_secs: u64,
    },

    #[error("{call} rejected: {message}")]
    Rejected { call: SettlementCall, message: String },
}

impl From<reqwest::Error> for GatewayError {
    fn from(error: reqwest::Error) -> Self {
        GatewayError::Transport(format!("HTTP request error: {:?}", error))
    }
}

impl From<reqwest::Error> for KeeperError {
    fn from(error: reqwest::Error) -> Self {
        KeeperError::Gateway(error.into())
    }
}

impl From<reqwest::Error> for HistoryError {
    fn from(error: reqwest::Error) -> Self {
        HistoryError::Request(format!("HTTP request error: {:?}", error))
    }
}

impl From<config::ConfigError> for KeeperError {
    fn from(error: config::ConfigError) -> Self {
        KeeperError::Config(error.to_string())
    }
}

impl From<std::io::Error> for KeeperError {
    fn from(error: std::io::Error) -> Self {
        KeeperError::SessionStore(format!("IO error: {:?}", error))
    }
}

/// Result type alias for the keeper
pub type KeeperResult<T> = Result<T, KeeperError>;
