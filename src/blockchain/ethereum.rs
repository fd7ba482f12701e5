use async_trait::async_trait;
use ethers::{
    prelude::JsonRpcClient,
    providers::{Http, Middleware, Provider},
    types::{Address, BlockId, BlockNumber, Filter, Log, H256, U64},
};
use std::{collections::HashMap, time::Duration};
use tracing::{debug, info};

use super::decoder::LogDecoder;
use super::traits::ChainReader;
use crate::ice_phishing::errors::{DetectorError, Result};
use crate::ice_phishing::events::{BlockEvent, TransactionEvent};

#[derive(Clone)]
pub struct EthereumClient<P: JsonRpcClient + Clone = Http> {
    provider: Provider<P>,
    network_name: String,
    chain_id: u64,
    decoder: LogDecoder,
}

fn network_name(chain_id: u64) -> String {
    match chain_id {
        1 => "ethereum".to_string(),
        11155111 => "sepolia".to_string(),
        137 => "polygon".to_string(),
        56 => "bsc".to_string(),
        97 => "bsctestnet".to_string(),
        _ => format!("ethereum-{}", chain_id),
    }
}

impl EthereumClient<Http> {
    pub async fn new(rpc_url: &str) -> Result<Self> {
        let rpc_url_clean = rpc_url.trim();
        let parsed_url = reqwest::Url::parse(rpc_url_clean).map_err(|e| {
            DetectorError::Configuration(format!(
                "Invalid Ethereum RPC URL '{}': {}",
                rpc_url_clean, e
            ))
        })?;

        info!("Connecting to Ethereum network: {}", parsed_url);
        // Short timeout; honor proxy environment vars.
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(10));
        if let Ok(proxy) = std::env::var("HTTPS_PROXY").or_else(|_| std::env::var("HTTP_PROXY")) {
            if let Ok(p) = reqwest::Proxy::all(proxy) {
                builder = builder.proxy(p);
            }
        }
        let client = builder.build().map_err(|e| {
            DetectorError::collaborator("rpc", format!("Failed to build HTTP client: {}", e))
        })?;

        let provider = Provider::new(Http::new_with_client(parsed_url.clone(), client));

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| {
                DetectorError::collaborator(
                    "rpc",
                    format!("Failed to get chain ID from {}: {}", parsed_url, e),
                )
            })?
            .as_u64();

        let network_name = network_name(chain_id);
        info!("Connected to {} (Chain ID: {})", network_name, chain_id);

        Ok(Self {
            provider,
            network_name,
            chain_id,
            decoder: LogDecoder::new(),
        })
    }
}

impl<P> EthereumClient<P>
where
    P: JsonRpcClient + Clone + Send + Sync,
{
    /// Wrap an existing provider, e.g. a `MockProvider` in tests.
    pub fn new_with_provider(provider: Provider<P>) -> EthereumClient<P> {
        EthereumClient {
            provider,
            network_name: "test".to_string(),
            chain_id: 1,
            decoder: LogDecoder::new(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub async fn block_number(&self) -> Result<u64> {
        let number = self.provider.get_block_number().await.map_err(|e| {
            DetectorError::collaborator("rpc", format!("Failed to get block number: {}", e))
        })?;
        Ok(number.as_u64())
    }

    /// Decoded token events of every transaction in a block that emitted logs,
    /// in block order, plus the block boundary itself.
    pub async fn fetch_block_events(
        &self,
        block_number: u64,
    ) -> Result<(BlockEvent, Vec<TransactionEvent>)> {
        let block = self
            .provider
            .get_block_with_txs(block_id(block_number))
            .await
            .map_err(|e| {
                DetectorError::collaborator(
                    "rpc",
                    format!("Failed to get block {}: {}", block_number, e),
                )
            })?
            .ok_or_else(|| {
                DetectorError::collaborator("rpc", format!("Block {} not found", block_number))
            })?;

        let boundary = BlockEvent {
            number: block_number,
            timestamp: block.timestamp.low_u64(),
        };

        let filter = Filter::new().select(BlockNumber::Number(U64::from(block_number)));
        let logs = self.provider.get_logs(&filter).await.map_err(|e| {
            DetectorError::collaborator(
                "rpc",
                format!("Failed to get logs for block {}: {}", block_number, e),
            )
        })?;

        let mut by_tx: HashMap<H256, Vec<Log>> = HashMap::new();
        for log in logs {
            if let Some(hash) = log.transaction_hash {
                by_tx.entry(hash).or_default().push(log);
            }
        }

        let events: Vec<TransactionEvent> = block
            .transactions
            .iter()
            .filter_map(|tx| {
                let logs = by_tx.get(&tx.hash)?;
                Some(self.decoder.decode_transaction(
                    tx.hash,
                    tx.from,
                    block_number,
                    boundary.timestamp,
                    logs,
                ))
            })
            .filter(|event| !event.approvals.is_empty() || !event.transfers.is_empty())
            .collect();

        debug!(block = block_number, transactions = events.len(), "Fetched block events");
        Ok((boundary, events))
    }
}

fn block_id(block_number: u64) -> BlockId {
    BlockId::Number(BlockNumber::Number(U64::from(block_number)))
}

fn at_block(block_number: u64) -> Option<BlockId> {
    Some(block_id(block_number))
}

#[async_trait]
impl<P> ChainReader for EthereumClient<P>
where
    P: JsonRpcClient + Clone + 'static + Send + Sync,
{
    async fn has_code(&self, address: Address, block_number: u64) -> Result<bool> {
        let code = self.provider.get_code(address, at_block(block_number)).await.map_err(|e| {
            DetectorError::collaborator(
                "rpc",
                format!("eth_getCode failed for {:?}: {}", address, e),
            )
        })?;
        Ok(!code.is_empty())
    }

    async fn transaction_count(&self, address: Address, block_number: u64) -> Result<u64> {
        let nonce = self
            .provider
            .get_transaction_count(address, at_block(block_number))
            .await
            .map_err(|e| {
                DetectorError::collaborator(
                    "rpc",
                    format!("eth_getTransactionCount failed for {:?}: {}", address, e),
                )
            })?;
        debug!(address = ?address, nonce = %nonce, "Transaction count");
        Ok(nonce.low_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{MockProvider, MockResponse};
    use serde_json::json;

    fn mock_client(response: serde_json::Value) -> EthereumClient<MockProvider> {
        let mock_provider = MockProvider::new();
        mock_provider.push_response(MockResponse::Value(response));
        EthereumClient::new_with_provider(Provider::new(mock_provider))
    }

    #[tokio::test]
    async fn test_has_code_empty_is_eoa() {
        let client = mock_client(json!("0x"));
        assert!(!client.has_code(Address::repeat_byte(1), 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_code_with_bytecode() {
        let client = mock_client(json!("0x6080604052"));
        assert!(client.has_code(Address::repeat_byte(1), 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_transaction_count() {
        let client = mock_client(json!("0x65"));
        assert_eq!(client.transaction_count(Address::repeat_byte(1), 100).await.unwrap(), 101);
    }

    #[tokio::test]
    async fn test_rpc_error_is_collaborator_error() {
        let mock_provider = MockProvider::new();
        let client = EthereumClient::new_with_provider(Provider::new(mock_provider));
        // no queued response
        let err = client.has_code(Address::repeat_byte(1), 100).await.unwrap_err();
        assert!(matches!(err, DetectorError::Collaborator { collaborator: "rpc", .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = EthereumClient::new("not a url").await.err().unwrap();
        assert!(err.is_critical());
    }
}
