use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    providers::{Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;
use std::str::FromStr;
use tracing::{info, warn};

use super::PreparedCall;
use crate::config::NetworkConfig;
use crate::ethereum::utils::{self, SubmissionFailure};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("no account connected")]
    NotConnected,
    #[error("cannot switch to chain {0}")]
    UnsupportedNetwork(u64),
    #[error("{0}")]
    Other(String),
}

impl WalletError {
    /// Sorts a signer or node error message into the wallet taxonomy.
    pub fn from_submission(message: impl Into<String>) -> Self {
        let message = message.into();
        match utils::classify_submission_error(&message) {
            SubmissionFailure::Rejected => WalletError::Rejected(message),
            SubmissionFailure::InsufficientFunds => WalletError::InsufficientFunds(message),
            SubmissionFailure::Reverted | SubmissionFailure::Other => {
                WalletError::Other(utils::interpret_rpc_error(&message))
            }
        }
    }
}

/// The narrow surface of a connected wallet. Keys never cross it.
#[async_trait]
pub trait WalletCapability: Send + Sync {
    async fn active_account(&self) -> Result<Option<String>, WalletError>;

    async fn active_chain_id(&self) -> Result<u64, WalletError>;

    async fn switch_network(&self, chain_id: u64) -> Result<(), WalletError>;

    /// Signs and broadcasts, returning the transaction hash.
    async fn sign_and_broadcast(&self, call: &PreparedCall) -> Result<String, WalletError>;
}

/// A wallet backed by a local private key and one RPC endpoint.
pub struct LocalWallet {
    signer: PrivateKeySigner,
    network: NetworkConfig,
}

impl LocalWallet {
    pub fn new(private_key: &str, network: NetworkConfig) -> Result<Self, WalletError> {
        let private_key = private_key.trim();
        let private_key = private_key.strip_prefix("0x").unwrap_or(private_key);

        let signer = PrivateKeySigner::from_str(private_key)
            .map_err(|e| WalletError::Other(format!("Invalid private key: {}", e)))?;

        Ok(Self { signer, network })
    }

    pub fn address(&self) -> String {
        self.signer.address().to_checksum(None)
    }
}

#[async_trait]
impl WalletCapability for LocalWallet {
    async fn active_account(&self) -> Result<Option<String>, WalletError> {
        Ok(Some(self.address()))
    }

    async fn active_chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.network.chain_id)
    }

    async fn switch_network(&self, chain_id: u64) -> Result<(), WalletError> {
        if chain_id == self.network.chain_id {
            Ok(())
        } else {
            Err(WalletError::UnsupportedNetwork(chain_id))
        }
    }

    async fn sign_and_broadcast(&self, call: &PreparedCall) -> Result<String, WalletError> {
        let to = call
            .to_address()
            .map_err(|e| WalletError::Other(e.to_string()))?;
        let data = call
            .data_bytes()
            .map_err(|e| WalletError::Other(e.to_string()))?;
        let value = call
            .value_wei()
            .map_err(|e| WalletError::Other(e.to_string()))?;

        let url = self.network.rpc_url.parse().map_err(|e| {
            WalletError::Other(format!("Invalid RPC URL '{}': {}", self.network.rpc_url, e))
        })?;

        let from_address = self.signer.address();
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(url);

        let mut tx_request = TransactionRequest::default()
            .to(to)
            .input(data.into())
            .value(value);

        match call.gas_limit {
            Some(gas) => tx_request = tx_request.with_gas_limit(gas),
            None => match provider
                .estimate_gas(&tx_request.clone().from(from_address))
                .await
            {
                Ok(estimated_gas) => tx_request = tx_request.with_gas_limit(estimated_gas),
                Err(e) => {
                    let message = e.to_string();
                    if utils::classify_submission_error(&message) == SubmissionFailure::InsufficientFunds {
                        return Err(WalletError::InsufficientFunds(message));
                    }
                    warn!("Gas estimation failed, using default: {}", e);
                    tx_request = tx_request.with_gas_limit(self.network.gas.default_gas_limit);
                }
            },
        }

        if let Some(max_gas_price) = self.network.gas.max_gas_price {
            tx_request = tx_request.with_gas_price(max_gas_price as u128);
        }

        info!("Sending transaction from address: {:?}", from_address);
        let pending_tx = provider
            .send_transaction(tx_request)
            .await
            .map_err(|e| WalletError::from_submission(e.to_string()))?;

        Ok(format!("0x{:x}", pending_tx.tx_hash()))
    }
}
