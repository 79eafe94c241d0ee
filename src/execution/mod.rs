//! Submission of prepared calls through pluggable execution strategies.
//!
//! Every submission walks the same status machine:
//!
//! ```text
//! idle -> pendingSignature -> pendingConfirmation | pendingRelayer -> success
//!                 \______________________\______________________\--> error
//! ```
//!
//! Errors found before anything is signed (a wrong account, a paused
//! relayer, an unsupported method) are returned without emitting a status.

pub mod eoa;
pub mod relayer;
pub mod wallet;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::ethereum::provider::ChainClient;
use eoa::EoaStrategy;
use relayer::{HttpRelayerClient, RelayerApi, RelayerDetails, RelayerStrategy, RelayerTransactionOptions};
use wallet::WalletCapability;

/// How a state-changing call is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum ExecutionConfig {
    /// Signed and broadcast by the connected wallet.
    #[serde(rename_all = "camelCase")]
    Eoa {
        #[serde(default)]
        allow_any: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        specific_address: Option<String>,
    },
    /// Submitted to a relayer service that signs with its own key.
    #[serde(rename_all = "camelCase")]
    Relayer {
        service_url: String,
        relayer: RelayerDetails,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transaction_options: Option<RelayerTransactionOptions>,
    },
    #[serde(rename_all = "camelCase")]
    Multisig {
        safe_address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service_url: Option<String>,
    },
}

impl ExecutionConfig {
    pub fn method(&self) -> &'static str {
        match self {
            ExecutionConfig::Eoa { .. } => "eoa",
            ExecutionConfig::Relayer { .. } => "relayer",
            ExecutionConfig::Multisig { .. } => "multisig",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TxStatus {
    Idle,
    PendingSignature,
    PendingConfirmation,
    PendingRelayer,
    Success,
    Error,
}

impl TxStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxStatus::Success | TxStatus::Error)
    }

    pub fn can_transition_to(self, next: TxStatus) -> bool {
        use TxStatus::*;
        match (self, next) {
            (Idle, PendingSignature) => true,
            (PendingSignature, PendingConfirmation | PendingRelayer) => true,
            (PendingConfirmation | PendingRelayer, Success) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxStatus::Idle => "idle",
            TxStatus::PendingSignature => "pendingSignature",
            TxStatus::PendingConfirmation => "pendingConfirmation",
            TxStatus::PendingRelayer => "pendingRelayer",
            TxStatus::Success => "success",
            TxStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// An encoded call ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedCall {
    pub chain_id: u64,
    pub to: String,
    /// `0x`-prefixed calldata.
    pub data: String,
    /// Native value in wei, decimal.
    pub value: String,
    pub function_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

impl PreparedCall {
    pub fn to_address(&self) -> Result<Address, ExecutionError> {
        Address::from_str(&self.to)
            .map_err(|e| ExecutionError::InvalidCall(format!("invalid target '{}': {}", self.to, e)))
    }

    pub fn data_bytes(&self) -> Result<Bytes, ExecutionError> {
        Bytes::from_str(&self.data)
            .map_err(|e| ExecutionError::InvalidCall(format!("invalid calldata: {}", e)))
    }

    pub fn value_wei(&self) -> Result<U256, ExecutionError> {
        if self.value.is_empty() {
            return Ok(U256::ZERO);
        }
        U256::from_str_radix(&self.value, 10)
            .map_err(|e| ExecutionError::InvalidCall(format!("invalid value '{}': {}", self.value, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("signature rejected: {0}")]
    SignatureRejected(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("transaction {tx_id} reverted")]
    ExecutionReverted { tx_id: String },
    #[error("relayer unavailable: {0}")]
    RelayerUnavailable(String),
    #[error("relayer rejected the transaction: {0}")]
    RelayerRejected(String),
    #[error("transaction {tx_id} was not confirmed in time; it may still settle later")]
    ConfirmationTimeout { tx_id: String },
    #[error("connected account {actual} does not match required account {expected}")]
    WalletMismatch { expected: String, actual: String },
    #[error("wallet unavailable: {0}")]
    WalletUnavailable(String),
    #[error("execution method '{0}' is not supported")]
    UnsupportedExecutionMethod(String),
    #[error("invalid call: {0}")]
    InvalidCall(String),
    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: TxStatus, to: TxStatus },
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub tx_id: String,
    pub final_status: TxStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    /// Last status reached before the error.
    pub last_status: TxStatus,
    pub error: ExecutionError,
    pub tx_id: Option<String>,
}

pub type StatusCallback<'a> = dyn FnMut(&StatusUpdate) + Send + 'a;

/// Enforces the status machine and forwards each transition to the caller.
pub struct StatusTracker<'a> {
    current: TxStatus,
    tx_id: Option<String>,
    on_status: &'a mut StatusCallback<'a>,
}

impl<'a> StatusTracker<'a> {
    pub fn new(on_status: &'a mut StatusCallback<'a>) -> Self {
        Self {
            current: TxStatus::Idle,
            tx_id: None,
            on_status,
        }
    }

    pub fn current(&self) -> TxStatus {
        self.current
    }

    pub fn tx_id(&self) -> Option<&str> {
        self.tx_id.as_deref()
    }

    pub fn advance(&mut self, next: TxStatus, tx_id: Option<String>) -> Result<(), ExecutionError> {
        if !self.current.can_transition_to(next) {
            return Err(ExecutionError::InvalidStatusTransition {
                from: self.current,
                to: next,
            });
        }
        if tx_id.is_some() {
            self.tx_id = tx_id;
        }
        self.current = next;
        (self.on_status)(&StatusUpdate {
            status: next,
            tx_id: self.tx_id.clone(),
            message: None,
        });
        Ok(())
    }

    /// Moves to `error` and builds the failure. Nothing is emitted when no
    /// status was reached yet.
    pub fn fail(&mut self, error: ExecutionError) -> ExecutionFailure {
        let last_status = self.current;
        if last_status != TxStatus::Idle && !last_status.is_terminal() {
            self.current = TxStatus::Error;
            (self.on_status)(&StatusUpdate {
                status: TxStatus::Error,
                tx_id: self.tx_id.clone(),
                message: Some(error.to_string()),
            });
        }
        ExecutionFailure {
            last_status,
            error,
            tx_id: self.tx_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionTiming {
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

/// Collaborators a strategy may need. Fields a method does not use may be
/// left empty.
pub struct ExecutionContext<'a> {
    pub chain: &'a dyn ChainClient,
    pub wallet: Option<&'a dyn WalletCapability>,
    /// Overrides the HTTP relayer client built from the config.
    pub relayer: Option<&'a dyn RelayerApi>,
    pub timing: ExecutionTiming,
    pub default_gas_limit: u64,
}

#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    /// Checks that can fail before anything is signed.
    async fn validate(&self, call: &PreparedCall) -> Result<(), ExecutionError>;

    /// Drives the submission to a terminal state, returning the tx id.
    async fn submit(
        &self,
        call: &PreparedCall,
        tracker: &mut StatusTracker<'_>,
    ) -> Result<String, ExecutionError>;
}

async fn run(
    strategy: &dyn ExecutionStrategy,
    call: &PreparedCall,
    tracker: &mut StatusTracker<'_>,
) -> Result<ExecutionOutcome, ExecutionFailure> {
    if let Err(e) = strategy.validate(call).await {
        return Err(tracker.fail(e));
    }
    match strategy.submit(call, tracker).await {
        Ok(tx_id) => match tracker.advance(TxStatus::Success, Some(tx_id.clone())) {
            Ok(()) => Ok(ExecutionOutcome {
                tx_id,
                final_status: TxStatus::Success,
            }),
            Err(e) => Err(tracker.fail(e)),
        },
        Err(e) => Err(tracker.fail(e)),
    }
}

/// Executes `call` with the strategy selected by `config`.
///
/// `runtime_secret` is the relayer API key; it is used for one submission
/// and never stored.
pub async fn execute(
    call: &PreparedCall,
    config: &ExecutionConfig,
    context: &ExecutionContext<'_>,
    on_status: &mut StatusCallback<'_>,
    runtime_secret: Option<&str>,
) -> Result<ExecutionOutcome, ExecutionFailure> {
    let mut tracker = StatusTracker::new(on_status);
    info!(
        "Executing {} on {} via {}",
        call.function_id,
        call.to,
        config.method()
    );

    match config {
        ExecutionConfig::Eoa {
            allow_any,
            specific_address,
        } => {
            let Some(wallet) = context.wallet else {
                return Err(tracker.fail(ExecutionError::WalletUnavailable(
                    "no wallet connected".to_string(),
                )));
            };
            let strategy = EoaStrategy {
                wallet,
                chain: context.chain,
                allow_any: *allow_any,
                specific_address: specific_address.clone(),
                timing: context.timing,
            };
            run(&strategy, call, &mut tracker).await
        }
        ExecutionConfig::Relayer {
            service_url,
            relayer,
            transaction_options,
        } => {
            let http_client;
            let api: &dyn RelayerApi = match context.relayer {
                Some(api) => api,
                None => {
                    let Some(api_key) = runtime_secret else {
                        return Err(tracker.fail(ExecutionError::RelayerUnavailable(
                            "no relayer API key supplied".to_string(),
                        )));
                    };
                    http_client = HttpRelayerClient::new(service_url, api_key);
                    &http_client
                }
            };
            let strategy = RelayerStrategy {
                api,
                relayer: relayer.clone(),
                options: transaction_options.clone().unwrap_or_default(),
                default_gas_limit: context.default_gas_limit,
                timing: context.timing,
            };
            run(&strategy, call, &mut tracker).await
        }
        ExecutionConfig::Multisig { .. } => Err(tracker.fail(
            ExecutionError::UnsupportedExecutionMethod(config.method().to_string()),
        )),
    }
}
