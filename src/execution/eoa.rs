use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::wallet::{WalletCapability, WalletError};
use super::{ExecutionError, ExecutionStrategy, ExecutionTiming, PreparedCall, StatusTracker, TxStatus};
use crate::ethereum::provider::ChainClient;

/// Signs with the user's own wallet and waits for the receipt on chain.
pub struct EoaStrategy<'a> {
    pub wallet: &'a dyn WalletCapability,
    pub chain: &'a dyn ChainClient,
    pub allow_any: bool,
    pub specific_address: Option<String>,
    pub timing: ExecutionTiming,
}

impl From<WalletError> for ExecutionError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::Rejected(reason) => ExecutionError::SignatureRejected(reason),
            WalletError::InsufficientFunds(reason) => ExecutionError::InsufficientFunds(reason),
            WalletError::NotConnected => {
                ExecutionError::WalletUnavailable("no account connected".to_string())
            }
            WalletError::UnsupportedNetwork(chain_id) => ExecutionError::WalletUnavailable(
                format!("wallet cannot switch to chain {}", chain_id),
            ),
            WalletError::Other(reason) => ExecutionError::Network(reason),
        }
    }
}

impl EoaStrategy<'_> {
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<(), ExecutionError> {
        let deadline = Instant::now() + self.timing.confirmation_timeout;
        loop {
            match self.chain.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.status => {
                    info!(
                        "Transaction {} confirmed in block {:?}",
                        tx_hash, receipt.block_number
                    );
                    return Ok(());
                }
                Ok(Some(_)) => {
                    return Err(ExecutionError::ExecutionReverted {
                        tx_id: tx_hash.to_string(),
                    })
                }
                Ok(None) => debug!("Transaction {} still pending", tx_hash),
                Err(e) => warn!("Receipt lookup for {} failed, retrying: {}", tx_hash, e),
            }

            if Instant::now() >= deadline {
                return Err(ExecutionError::ConfirmationTimeout {
                    tx_id: tx_hash.to_string(),
                });
            }
            sleep(self.timing.poll_interval).await;
        }
    }
}

#[async_trait]
impl ExecutionStrategy for EoaStrategy<'_> {
    async fn validate(&self, call: &PreparedCall) -> Result<(), ExecutionError> {
        call.to_address()?;
        call.data_bytes()?;
        call.value_wei()?;

        let account = self
            .wallet
            .active_account()
            .await?
            .ok_or_else(|| ExecutionError::WalletUnavailable("no account connected".to_string()))?;

        if !self.allow_any {
            if let Some(expected) = &self.specific_address {
                if !expected.eq_ignore_ascii_case(&account) {
                    return Err(ExecutionError::WalletMismatch {
                        expected: expected.clone(),
                        actual: account,
                    });
                }
            }
        }

        let active_chain = self.wallet.active_chain_id().await?;
        if active_chain != call.chain_id {
            info!(
                "Switching wallet from chain {} to chain {}",
                active_chain, call.chain_id
            );
            self.wallet.switch_network(call.chain_id).await?;
        }
        Ok(())
    }

    async fn submit(
        &self,
        call: &PreparedCall,
        tracker: &mut StatusTracker<'_>,
    ) -> Result<String, ExecutionError> {
        tracker.advance(TxStatus::PendingSignature, None)?;

        let tx_hash = self.wallet.sign_and_broadcast(call).await?;
        info!("Transaction sent with hash: {}", tx_hash);
        tracker.advance(TxStatus::PendingConfirmation, Some(tx_hash.clone()))?;

        self.wait_for_receipt(&tx_hash).await?;
        Ok(tx_hash)
    }
}
