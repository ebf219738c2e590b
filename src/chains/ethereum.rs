use crate::chains::traits::{ChainError, ChainReader, RawLog};
use alloy::{
    network::Ethereum,
    primitives::{Address, B256},
    providers::{Provider as EthereumProvider, RootProvider},
    rpc::{client::RpcClient, types::Filter},
    transports::http::{Http, reqwest::Url},
};
use async_trait::async_trait;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::debug;

/// `eth_getLogs` range cap used when none is configured.
pub const MAX_BLOCK_SPAN: u64 = 2000;

/// HTTP JSON-RPC reader for an EVM node.
#[derive(Debug, Clone)]
pub struct EthereumReader {
    client: Arc<RootProvider<Ethereum>>,
    rpc_timeout: Duration,
    max_block_span: u64,
}

impl EthereumReader {
    pub fn new(
        rpc_url: &str,
        rpc_timeout: Duration,
        max_block_span: u64,
    ) -> Result<Self, ChainError> {
        let url: Url = rpc_url
            .parse()
            .map_err(|_| ChainError::InvalidUrl(rpc_url.to_string()))?;
        let transport = Http::new(url);
        let provider = RootProvider::new(RpcClient::new(transport, false));

        Ok(Self {
            client: Arc::new(provider),
            rpc_timeout,
            max_block_span: max_block_span.max(1),
        })
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, alloy::transports::TransportError>>,
    {
        match timeout(self.rpc_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ChainError::Timeout(self.rpc_timeout)),
        }
    }
}

#[async_trait]
impl ChainReader for EthereumReader {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.bounded(async { self.client.get_chain_id().await })
            .await
    }

    async fn current_height(&self) -> Result<u64, ChainError> {
        self.bounded(async { self.client.get_block_number().await })
            .await
    }

    async fn get_logs(
        &self,
        contract: Address,
        signature: B256,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        let mut logs = Vec::new();

        for (start, end) in block_chunks(from_block, to_block, self.max_block_span) {
            let filter = Filter::new()
                .address(contract)
                .event_signature(signature)
                .from_block(start)
                .to_block(end);

            let chunk = self
                .bounded(async { self.client.get_logs(&filter).await })
                .await?;

            debug!(
                contract = %contract,
                from_block = start,
                to_block = end,
                count = chunk.len(),
                "Fetched logs"
            );
            logs.extend(chunk);
        }

        Ok(logs)
    }
}

/// Splits the inclusive range `from..=to` into consecutive inclusive chunks of
/// at most `span` blocks. Empty when `from > to`.
pub fn block_chunks(from: u64, to: u64, span: u64) -> Vec<(u64, u64)> {
    let span = span.max(1);
    let mut chunks = Vec::new();
    let mut start = from;

    while start <= to {
        let end = start.saturating_add(span - 1).min(to);
        chunks.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_chunks_splits_inclusive_range() {
        assert_eq!(block_chunks(0, 100, 2000), vec![(0, 100)]);
        assert_eq!(
            block_chunks(0, 4500, 2000),
            vec![(0, 1999), (2000, 3999), (4000, 4500)]
        );
        assert_eq!(block_chunks(7, 7, 10), vec![(7, 7)]);
    }

    #[test]
    fn test_block_chunks_degenerate_range() {
        assert!(block_chunks(101, 100, 2000).is_empty());
    }

    #[test]
    fn test_rejects_invalid_url() {
        let err = EthereumReader::new("not a url", Duration::from_secs(1), 10).unwrap_err();
        assert!(matches!(err, ChainError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_silent_node_times_out() -> anyhow::Result<()> {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let rpc_timeout = Duration::from_millis(100);
        let reader = EthereumReader::new(&format!("http://{addr}"), rpc_timeout, 2000)?;

        let err = reader.current_height().await.unwrap_err();
        assert!(matches!(err, ChainError::Timeout(t) if t == rpc_timeout));

        server.abort();
        Ok(())
    }

    #[tokio::test]
    async fn test_inverted_range_skips_network() -> anyhow::Result<()> {
        // Nothing listens on this port: any RPC attempt would fail.
        let reader = EthereumReader::new("http://127.0.0.1:9", Duration::from_secs(1), 2000)?;

        let logs = reader
            .get_logs(Address::ZERO, B256::ZERO, 101, 100)
            .await?;

        assert!(logs.is_empty());
        Ok(())
    }
}
