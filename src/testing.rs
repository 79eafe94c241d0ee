//! In-memory stand-ins for the chain, registries, wallets and relayers.

use alloy::primitives::{Address, Bytes, B256, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::AdapterResult;
use crate::ethereum::abi::{DefinitionProvider, RawDefinition};
use crate::ethereum::codec::selector;
use crate::ethereum::provider::{ChainClient, ReceiptSummary};
use crate::execution::relayer::{
    RelayerApi, RelayerApiError, RelayerDetails, RelayerStatus, RelayerTransaction,
    RelayerTransactionRequest, RelayerTxStatus,
};
use crate::execution::wallet::{WalletCapability, WalletError};
use crate::execution::{ExecutionTiming, PreparedCall};

pub const ACCOUNT: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

pub fn timing() -> ExecutionTiming {
    ExecutionTiming {
        confirmation_timeout: Duration::from_millis(60),
        poll_interval: Duration::from_millis(5),
    }
}

pub fn prepared_call() -> PreparedCall {
    PreparedCall {
        chain_id: 1,
        to: "0x0000000000000000000000000000000000000bee".to_string(),
        data: "0xa9059cbb".to_string(),
        value: "0".to_string(),
        function_id: "transfer(address,uint256)".to_string(),
        gas_limit: None,
    }
}

#[derive(Default)]
pub struct MockChain {
    code: HashMap<Address, Bytes>,
    storage: HashMap<(Address, U256), U256>,
    calls: HashMap<(Address, [u8; 4]), Bytes>,
    receipts: Mutex<HashMap<String, VecDeque<Option<bool>>>>,
}

impl MockChain {
    pub fn with_code(mut self, address: Address, code: Vec<u8>) -> Self {
        self.code.insert(address, code.into());
        self
    }

    pub fn with_storage(mut self, address: Address, slot: B256, value: U256) -> Self {
        self.storage
            .insert((address, U256::from_be_bytes(slot.0)), value);
        self
    }

    /// Answers calls to `signature` on `address` with `ret`.
    pub fn with_call(mut self, address: Address, signature: &str, ret: Vec<u8>) -> Self {
        self.calls.insert((address, selector(signature)), ret.into());
        self
    }

    /// Receipt lookups for `hash` return these in order, the last repeating.
    /// `None` means still pending, `Some(status)` a mined receipt.
    pub fn with_receipts(self, hash: &str, receipts: Vec<Option<bool>>) -> Self {
        if let Ok(mut map) = self.receipts.lock() {
            map.insert(hash.to_string(), receipts.into());
        }
        self
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> AdapterResult<u64> {
        Ok(1)
    }

    async fn code_at(&self, address: Address) -> AdapterResult<Bytes> {
        Ok(self.code.get(&address).cloned().unwrap_or_default())
    }

    async fn storage_at(&self, address: Address, slot: U256) -> AdapterResult<U256> {
        Ok(self
            .storage
            .get(&(address, slot))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn call(&self, to: Address, data: Bytes) -> AdapterResult<Bytes> {
        let mut sel = [0u8; 4];
        if data.len() >= 4 {
            sel.copy_from_slice(&data[..4]);
        }
        Ok(self.calls.get(&(to, sel)).cloned().unwrap_or_default())
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> AdapterResult<Option<ReceiptSummary>> {
        let mut map = self.receipts.lock().unwrap();
        let Some(queue) = map.get_mut(tx_hash) else {
            return Ok(None);
        };
        let next = if queue.len() > 1 {
            queue.pop_front().flatten()
        } else {
            queue.front().copied().flatten()
        };
        Ok(next.map(|status| ReceiptSummary {
            transaction_hash: tx_hash.to_string(),
            status,
            block_number: Some(100),
            gas_used: 21_000,
        }))
    }
}

/// A registry holding fixed definitions, or failing with a fixed reason.
pub struct MockProvider {
    name: String,
    definitions: HashMap<Address, RawDefinition>,
    failure: Option<String>,
    fetches: Mutex<Vec<Address>>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            definitions: HashMap::new(),
            failure: None,
            fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &str, reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::new(name)
        }
    }

    pub fn with_abi(mut self, address: Address, contract_name: &str, abi: &str) -> Self {
        self.definitions.insert(
            address,
            RawDefinition {
                abi: abi.to_string(),
                name: Some(contract_name.to_string()),
                provider: self.name.clone(),
                verification: None,
            },
        );
        self
    }

    pub fn fetches(&self) -> Vec<Address> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl DefinitionProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, address: Address, _network: &NetworkConfig) -> Result<RawDefinition> {
        self.fetches.lock().unwrap().push(address);
        if let Some(reason) = &self.failure {
            return Err(anyhow!("{}", reason));
        }
        self.definitions
            .get(&address)
            .cloned()
            .ok_or_else(|| anyhow!("Contract source code not verified"))
    }
}

enum Broadcast {
    Hash(String),
    Reject,
}

pub struct MockWallet {
    account: String,
    chain_id: Mutex<u64>,
    broadcast: Broadcast,
    broadcasts: Mutex<usize>,
}

impl MockWallet {
    pub fn new(account: &str, chain_id: u64) -> Self {
        Self {
            account: account.to_string(),
            chain_id: Mutex::new(chain_id),
            broadcast: Broadcast::Reject,
            broadcasts: Mutex::new(0),
        }
    }

    pub fn broadcasting(mut self, hash: &str) -> Self {
        self.broadcast = Broadcast::Hash(hash.to_string());
        self
    }

    pub fn rejecting(mut self) -> Self {
        self.broadcast = Broadcast::Reject;
        self
    }

    pub fn broadcasts(&self) -> usize {
        *self.broadcasts.lock().unwrap()
    }

    pub fn chain_id(&self) -> u64 {
        *self.chain_id.lock().unwrap()
    }
}

#[async_trait]
impl WalletCapability for MockWallet {
    async fn active_account(&self) -> Result<Option<String>, WalletError> {
        Ok(Some(self.account.clone()))
    }

    async fn active_chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.chain_id())
    }

    async fn switch_network(&self, chain_id: u64) -> Result<(), WalletError> {
        *self.chain_id.lock().unwrap() = chain_id;
        Ok(())
    }

    async fn sign_and_broadcast(&self, _call: &PreparedCall) -> Result<String, WalletError> {
        *self.broadcasts.lock().unwrap() += 1;
        match &self.broadcast {
            Broadcast::Hash(hash) => Ok(hash.clone()),
            Broadcast::Reject => Err(WalletError::Rejected("user rejected the request".to_string())),
        }
    }
}

pub struct MockRelayer {
    transaction_id: Option<String>,
    statuses: Mutex<VecDeque<RelayerTxStatus>>,
    submissions: Mutex<Vec<RelayerTransactionRequest>>,
}

impl MockRelayer {
    pub fn accepting(transaction_id: &str) -> Self {
        Self {
            transaction_id: Some(transaction_id.to_string()),
            statuses: Mutex::new(VecDeque::from(vec![RelayerTxStatus::Mined])),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            transaction_id: None,
            ..Self::accepting("")
        }
    }

    /// Status lookups return these in order, the last repeating.
    pub fn with_statuses(self, statuses: Vec<RelayerTxStatus>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn submissions(&self) -> Vec<RelayerTransactionRequest> {
        self.submissions.lock().unwrap().clone()
    }

    fn details(id: &str) -> RelayerDetails {
        RelayerDetails {
            relayer_id: id.to_string(),
            name: Some(format!("Relayer {}", id)),
            address: Some(ACCOUNT.to_string()),
            network: Some("sepolia".to_string()),
            paused: false,
        }
    }
}

#[async_trait]
impl RelayerApi for MockRelayer {
    async fn list_relayers(&self) -> Result<Vec<RelayerDetails>, RelayerApiError> {
        Ok(vec![Self::details("sepolia-1"), Self::details("sepolia-2")])
    }

    async fn get_relayer(&self, relayer_id: &str) -> Result<RelayerDetails, RelayerApiError> {
        Ok(Self::details(relayer_id))
    }

    async fn get_relayer_status(&self, _relayer_id: &str) -> Result<RelayerStatus, RelayerApiError> {
        Ok(RelayerStatus {
            balance: "1000".to_string(),
            nonce: "3".to_string(),
            pending_transactions_count: 0,
            paused: false,
        })
    }

    async fn send_transaction(
        &self,
        _relayer_id: &str,
        request: &RelayerTransactionRequest,
    ) -> Result<RelayerTransaction, RelayerApiError> {
        let Some(id) = &self.transaction_id else {
            return Err(RelayerApiError::Unavailable("connection refused".to_string()));
        };
        self.submissions.lock().unwrap().push(request.clone());
        Ok(RelayerTransaction {
            id: id.clone(),
            hash: None,
            status: RelayerTxStatus::Pending,
            status_reason: None,
        })
    }

    async fn get_transaction(
        &self,
        _relayer_id: &str,
        transaction_id: &str,
    ) -> Result<RelayerTransaction, RelayerApiError> {
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().copied()
        }
        .unwrap_or(RelayerTxStatus::Pending);
        let mined = matches!(status, RelayerTxStatus::Mined | RelayerTxStatus::Confirmed);
        Ok(RelayerTransaction {
            id: transaction_id.to_string(),
            hash: mined.then(|| "0xhash".to_string()),
            status,
            status_reason: None,
        })
    }
}
