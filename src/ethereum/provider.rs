use crate::config::NetworkConfig;
use crate::error::{AdapterError, AdapterResult};
use alloy::{
    network::ReceiptResponse,
    primitives::{Address, Bytes, TxHash, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::TransactionRequest,
    transports::http::{Client, Http},
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use super::utils;

/// The subset of a mined receipt the execution engine looks at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub transaction_hash: String,
    pub status: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Read access to one chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> AdapterResult<u64>;

    async fn code_at(&self, address: Address) -> AdapterResult<Bytes>;

    async fn storage_at(&self, address: Address, slot: U256) -> AdapterResult<U256>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> AdapterResult<Bytes>;

    /// `Ok(None)` while the transaction is still pending.
    async fn transaction_receipt(&self, tx_hash: &str) -> AdapterResult<Option<ReceiptSummary>>;
}

#[derive(Debug, Clone)]
pub struct RpcChainClient {
    provider: RootProvider<Http<Client>>,
}

impl RpcChainClient {
    pub fn new(provider: RootProvider<Http<Client>>) -> Self {
        Self { provider }
    }
}

fn rpc_error(e: impl std::fmt::Display) -> AdapterError {
    tracing::debug!("RPC error details: {}", e);
    AdapterError::Network(utils::interpret_rpc_error(&e.to_string()))
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> AdapterResult<u64> {
        self.provider.get_chain_id().await.map_err(rpc_error)
    }

    async fn code_at(&self, address: Address) -> AdapterResult<Bytes> {
        self.provider.get_code_at(address).await.map_err(rpc_error)
    }

    async fn storage_at(&self, address: Address, slot: U256) -> AdapterResult<U256> {
        self.provider
            .get_storage_at(address, slot)
            .await
            .map_err(rpc_error)
    }

    async fn call(&self, to: Address, data: Bytes) -> AdapterResult<Bytes> {
        let request = TransactionRequest::default().to(to).input(data.into());
        self.provider.call(&request).await.map_err(rpc_error)
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> AdapterResult<Option<ReceiptSummary>> {
        let hash = TxHash::from_str(tx_hash)
            .map_err(|e| AdapterError::Network(format!("invalid transaction hash '{}': {}", tx_hash, e)))?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(rpc_error)?;

        Ok(receipt.map(|receipt| ReceiptSummary {
            transaction_hash: format!("0x{:x}", receipt.transaction_hash),
            status: receipt.status(),
            block_number: receipt.block_number,
            gas_used: receipt.gas_used as u64,
        }))
    }
}

/// Hands out HTTP providers, one per RPC endpoint.
#[derive(Debug, Default)]
pub struct ProviderManager {
    providers: HashMap<String, RootProvider<Http<Client>>>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_provider(network_config: &NetworkConfig) -> Result<RootProvider<Http<Client>>> {
        let url = network_config
            .rpc_url
            .parse()
            .map_err(|e| anyhow!("Invalid RPC URL '{}': {}", network_config.rpc_url, e))?;
        let provider = ProviderBuilder::new().on_http(url);

        Ok(provider)
    }

    pub fn get_provider(&mut self, network_config: &NetworkConfig) -> Result<RootProvider<Http<Client>>> {
        if let Some(provider) = self.providers.get(&network_config.rpc_url) {
            return Ok(provider.clone());
        }
        let provider = Self::create_provider(network_config)?;
        self.providers
            .insert(network_config.rpc_url.clone(), provider.clone());
        Ok(provider)
    }

    pub fn chain_client(&mut self, network_config: &NetworkConfig) -> Result<RpcChainClient> {
        Ok(RpcChainClient::new(self.get_provider(network_config)?))
    }

    /// Validates network connectivity with detailed error information
    pub async fn validate_network_connection(
        &mut self,
        network_name: &str,
        network_config: &NetworkConfig,
    ) -> Result<()> {
        let provider = self.get_provider(network_config)?;

        match provider.get_chain_id().await {
            Ok(chain_id) if chain_id == network_config.chain_id => Ok(()),
            Ok(chain_id) => Err(anyhow!(
                "RPC endpoint for network '{}' reports chain id {}, expected {}",
                network_name,
                chain_id,
                network_config.chain_id
            )),
            Err(e) => Err(anyhow!(
                "Cannot connect to network '{}': {}. Please check your RPC endpoint configuration and network connectivity.",
                network_name,
                utils::interpret_rpc_error(&e.to_string())
            )),
        }
    }
}
