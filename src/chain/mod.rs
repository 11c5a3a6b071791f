pub mod gas;
pub mod gateway;
pub mod models;
pub mod rpc;

#[cfg(test)]
pub mod mock;

pub use gateway::ChainGateway;
pub use rpc::{HttpChainGateway, RpcConfig, SenderIdentity};
