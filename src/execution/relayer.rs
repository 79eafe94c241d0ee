//! Relayer-service execution and directory queries.
//!
//! The wire format follows the OpenZeppelin Relayer REST API: every response
//! is wrapped in `{ success, data, error }` and authenticated with a bearer
//! API key.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{ExecutionError, ExecutionStrategy, ExecutionTiming, PreparedCall, StatusTracker, TxStatus};

/// The relayer selected in an execution config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerDetails {
    pub relayer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Speed {
    SafeLow,
    Average,
    Fast,
    Fastest,
}

/// Gas pricing and limits for a relayed transaction. Explicit prices take
/// precedence over `speed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerTransactionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<Speed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayerTransactionRequest {
    pub to: String,
    pub data: String,
    pub value: u128,
    pub gas_limit: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<Speed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
}

impl RelayerTransactionRequest {
    pub fn new(
        call: &PreparedCall,
        options: &RelayerTransactionOptions,
        default_gas_limit: u64,
    ) -> Result<Self, ExecutionError> {
        call.to_address()?;
        call.data_bytes()?;
        let value: u128 = call.value_wei()?.try_into().map_err(|_| {
            ExecutionError::InvalidCall(format!("value {} is too large to relay", call.value))
        })?;

        let explicit_price = options.gas_price.is_some() || options.max_fee_per_gas.is_some();
        let (max_fee_per_gas, max_priority_fee_per_gas) = match options.gas_price {
            Some(_) => (None, None),
            None => (options.max_fee_per_gas, options.max_priority_fee_per_gas),
        };

        Ok(Self {
            to: call.to.clone(),
            data: call.data.clone(),
            value,
            gas_limit: call
                .gas_limit
                .or(options.gas_limit)
                .unwrap_or(default_gas_limit),
            speed: if explicit_price {
                None
            } else {
                Some(options.speed.unwrap_or(Speed::Fast))
            },
            gas_price: options.gas_price,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            valid_until: options.valid_until.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayerTxStatus {
    Pending,
    Sent,
    Submitted,
    Mined,
    Confirmed,
    Failed,
    Canceled,
    Expired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerTransaction {
    pub id: String,
    #[serde(default)]
    pub hash: Option<String>,
    pub status: RelayerTxStatus,
    #[serde(default)]
    pub status_reason: Option<String>,
}

/// Balance and queue state of one relayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayerStatus {
    #[serde(default, deserialize_with = "string_or_number")]
    pub balance: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub nonce: String,
    #[serde(default)]
    pub pending_transactions_count: u64,
    #[serde(default)]
    pub paused: bool,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct RelayerResponse {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    paused: bool,
}

impl From<RelayerResponse> for RelayerDetails {
    fn from(r: RelayerResponse) -> Self {
        RelayerDetails {
            relayer_id: r.id,
            name: r.name,
            address: r.address,
            network: r.network,
            paused: r.paused,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayerApiError {
    /// The service could not be reached or failed internally.
    #[error("{0}")]
    Unavailable(String),
    /// The service understood the request and refused it.
    #[error("{0}")]
    Rejected(String),
}

impl From<RelayerApiError> for ExecutionError {
    fn from(e: RelayerApiError) -> Self {
        match e {
            RelayerApiError::Unavailable(reason) => ExecutionError::RelayerUnavailable(reason),
            RelayerApiError::Rejected(reason) => ExecutionError::RelayerRejected(reason),
        }
    }
}

#[async_trait]
pub trait RelayerApi: Send + Sync {
    async fn list_relayers(&self) -> Result<Vec<RelayerDetails>, RelayerApiError>;

    async fn get_relayer(&self, relayer_id: &str) -> Result<RelayerDetails, RelayerApiError>;

    async fn get_relayer_status(&self, relayer_id: &str) -> Result<RelayerStatus, RelayerApiError>;

    async fn send_transaction(
        &self,
        relayer_id: &str,
        request: &RelayerTransactionRequest,
    ) -> Result<RelayerTransaction, RelayerApiError>;

    async fn get_transaction(
        &self,
        relayer_id: &str,
        transaction_id: &str,
    ) -> Result<RelayerTransaction, RelayerApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpRelayerClient {
    client: Client,
    service_url: String,
    api_key: String,
}

impl HttpRelayerClient {
    pub fn new(service_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            service_url: service_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/relayers{}", self.service_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RelayerApiError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| RelayerApiError::Unavailable(format!("Failed to reach relayer: {}", e)))?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            RelayerApiError::Unavailable(format!("Failed to parse relayer response: {}", e))
        })?;
        debug!("Relayer responded with HTTP {}", status);

        let parsed: ApiResponse<T> = serde_json::from_value(body).map_err(|e| {
            RelayerApiError::Unavailable(format!("Unexpected relayer response: {}", e))
        })?;

        let error = || {
            parsed
                .error
                .clone()
                .unwrap_or_else(|| format!("HTTP {}", status))
        };
        if status.is_server_error() {
            return Err(RelayerApiError::Unavailable(error()));
        }
        if !status.is_success() || !parsed.success {
            return Err(RelayerApiError::Rejected(error()));
        }
        parsed
            .data
            .ok_or_else(|| RelayerApiError::Unavailable("Relayer response has no data".to_string()))
    }
}

#[async_trait]
impl RelayerApi for HttpRelayerClient {
    async fn list_relayers(&self) -> Result<Vec<RelayerDetails>, RelayerApiError> {
        let relayers: Vec<RelayerResponse> = self.send(self.client.get(self.url(""))).await?;
        Ok(relayers.into_iter().map(RelayerDetails::from).collect())
    }

    async fn get_relayer(&self, relayer_id: &str) -> Result<RelayerDetails, RelayerApiError> {
        let relayer: RelayerResponse = self
            .send(self.client.get(self.url(&format!("/{}", relayer_id))))
            .await?;
        Ok(relayer.into())
    }

    async fn get_relayer_status(&self, relayer_id: &str) -> Result<RelayerStatus, RelayerApiError> {
        self.send(self.client.get(self.url(&format!("/{}/status", relayer_id))))
            .await
    }

    async fn send_transaction(
        &self,
        relayer_id: &str,
        request: &RelayerTransactionRequest,
    ) -> Result<RelayerTransaction, RelayerApiError> {
        self.send(
            self.client
                .post(self.url(&format!("/{}/transactions", relayer_id)))
                .json(request),
        )
        .await
    }

    async fn get_transaction(
        &self,
        relayer_id: &str,
        transaction_id: &str,
    ) -> Result<RelayerTransaction, RelayerApiError> {
        self.send(self.client.get(self.url(&format!(
            "/{}/transactions/{}",
            relayer_id, transaction_id
        ))))
        .await
    }
}

/// Hands the call to a relayer and follows it until it is mined.
pub struct RelayerStrategy<'a> {
    pub api: &'a dyn RelayerApi,
    pub relayer: RelayerDetails,
    pub options: RelayerTransactionOptions,
    pub default_gas_limit: u64,
    pub timing: ExecutionTiming,
}

impl RelayerStrategy<'_> {
    async fn wait_for_mined(&self, transaction_id: &str) -> Result<String, ExecutionError> {
        let relayer_id = &self.relayer.relayer_id;
        let deadline = Instant::now() + self.timing.confirmation_timeout;
        loop {
            match self.api.get_transaction(relayer_id, transaction_id).await {
                Ok(tx) => match tx.status {
                    RelayerTxStatus::Mined | RelayerTxStatus::Confirmed => {
                        info!("Relayer transaction {} {:?}", transaction_id, tx.status);
                        return Ok(tx.hash.unwrap_or_else(|| transaction_id.to_string()));
                    }
                    RelayerTxStatus::Failed | RelayerTxStatus::Canceled | RelayerTxStatus::Expired => {
                        let reason = tx.status_reason.unwrap_or_else(|| "no reason given".to_string());
                        return Err(ExecutionError::RelayerRejected(format!(
                            "transaction {} ended as {:?}: {}",
                            transaction_id, tx.status, reason
                        )));
                    }
                    status => debug!("Relayer transaction {} is {:?}", transaction_id, status),
                },
                Err(RelayerApiError::Unavailable(e)) => {
                    warn!("Relayer status lookup for {} failed, retrying: {}", transaction_id, e)
                }
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Err(ExecutionError::ConfirmationTimeout {
                    tx_id: transaction_id.to_string(),
                });
            }
            sleep(self.timing.poll_interval).await;
        }
    }
}

#[async_trait]
impl ExecutionStrategy for RelayerStrategy<'_> {
    async fn validate(&self, call: &PreparedCall) -> Result<(), ExecutionError> {
        if self.relayer.paused {
            return Err(ExecutionError::RelayerRejected(format!(
                "relayer {} is paused",
                self.relayer.relayer_id
            )));
        }
        RelayerTransactionRequest::new(call, &self.options, self.default_gas_limit).map(|_| ())
    }

    async fn submit(
        &self,
        call: &PreparedCall,
        tracker: &mut StatusTracker<'_>,
    ) -> Result<String, ExecutionError> {
        tracker.advance(TxStatus::PendingSignature, None)?;

        let request = RelayerTransactionRequest::new(call, &self.options, self.default_gas_limit)?;
        let submitted = self
            .api
            .send_transaction(&self.relayer.relayer_id, &request)
            .await?;
        info!(
            "Relayer {} accepted transaction {}",
            self.relayer.relayer_id, submitted.id
        );
        tracker.advance(TxStatus::PendingRelayer, Some(submitted.id.clone()))?;

        self.wait_for_mined(&submitted.id).await
    }
}
