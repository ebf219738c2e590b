use crate::chains::traits::{ChainError, ChainReader, RawLog};
use alloy::{
    primitives::{Address, B256, Log as PrimitiveLog, LogData},
    rpc::types::Log,
    transports::TransportErrorKind,
};
use async_trait::async_trait;
use std::{
    collections::HashSet,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};
use tokio::sync::Mutex;

/// In-memory chain used by orchestrator tests.
#[derive(Debug, Default)]
pub struct MockChain {
    height: AtomicU64,
    logs: Mutex<Vec<RawLog>>,
    failing: Mutex<HashSet<Address>>,
    log_requests: AtomicUsize,
    latency_ms: AtomicU64,
}

impl MockChain {
    pub fn new(height: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
            ..Default::default()
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub async fn push(&self, log: RawLog) {
        self.logs.lock().await.push(log);
    }

    pub async fn fail_contract(&self, contract: Address) {
        self.failing.lock().await.insert(contract);
    }

    pub async fn heal_contract(&self, contract: Address) {
        self.failing.lock().await.remove(&contract);
    }

    /// Delays every height query, to keep a pass in flight.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn log_requests(&self) -> usize {
        self.log_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(31337)
    }

    async fn current_height(&self) -> Result<u64, ChainError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn get_logs(
        &self,
        contract: Address,
        signature: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        if from_block > to_block {
            return Ok(Vec::new());
        }
        self.log_requests.fetch_add(1, Ordering::SeqCst);

        if self.failing.lock().await.contains(&contract) {
            return Err(ChainError::Transport(TransportErrorKind::custom_str(
                "node unavailable",
            )));
        }

        let logs = self.logs.lock().await;
        Ok(logs
            .iter()
            .filter(|log| log.address() == contract)
            .filter(|log| log.topics().first() == Some(&signature))
            .filter(|log| {
                log.block_number
                    .is_some_and(|block| block >= from_block && block <= to_block)
            })
            .cloned()
            .collect())
    }
}

/// Wraps encoded event data into a node-style log.
pub fn rpc_log(
    contract: Address,
    data: LogData,
    block_number: u64,
    log_index: u64,
    transaction_hash: B256,
) -> RawLog {
    Log {
        inner: PrimitiveLog {
            address: contract,
            data,
        },
        block_number: Some(block_number),
        log_index: Some(log_index),
        transaction_hash: Some(transaction_hash),
        ..Default::default()
    }
}
