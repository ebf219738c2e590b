use alloy::{
    primitives::{Address, B256},
    rpc::types::Log,
    transports::TransportError,
};
use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

/// A log as returned by the node, with its block and transaction context.
pub type RawLog = Log;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("rpc transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("rpc call timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid rpc url: {0}")]
    InvalidUrl(String),
}

/// Read-only view of a chain node. Implementations hold no sync state and
/// never retry; failures go straight back to the caller.
#[async_trait]
pub trait ChainReader: Send + Sync + Debug {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn current_height(&self) -> Result<u64, ChainError>;

    /// Logs emitted by `contract` whose first topic is `signature`, for the
    /// inclusive range `from_block..=to_block`. An inverted range yields an
    /// empty result without contacting the node.
    async fn get_logs(
        &self,
        contract: Address,
        signature: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError>;
}
