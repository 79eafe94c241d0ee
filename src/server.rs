use anyhow::{anyhow, Result};
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    config::{Config, NetworkOverride, TimingOverride},
    ethereum::{
        contract::ContractManager,
        provider::ProviderManager,
        resolver::{ContractArtifacts, ResolveOptions, StoredFormTarget},
    },
    execution::{
        relayer::{HttpRelayerClient, RelayerApi},
        wallet::{LocalWallet, WalletCapability},
        ExecutionConfig,
    },
    forms::FieldOverrides,
};

#[derive(Clone)]
pub struct ContractFormServer {
    contract_manager: Arc<tokio::sync::Mutex<ContractManager>>,
    config: Arc<Config>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ResolveContractRequest {
    address: String,
    network: Option<String>,
    rpc_url: Option<String>,
    /// JSON ABI text; skips the registries when given
    abi: Option<String>,
    skip_proxy_detection: Option<bool>,
    treat_as_implementation: Option<bool>,
    force_refresh: Option<bool>,
    max_proxy_depth: Option<u32>,
    /// Registries to try in order, e.g. ["sourcify", "etherscan"]
    providers: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct DescribeFunctionRequest {
    contract_address: String,
    function_id: String,
    network: Option<String>,
    rpc_url: Option<String>,
    /// Field overrides keyed by field id: {"amount": {"hidden": true, "hardcodedValue": "1"}}
    overrides: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ViewFunctionRequest {
    contract_address: String,
    function_id: String,
    parameters: Value,
    network: Option<String>,
    rpc_url: Option<String>,
    overrides: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct ExecuteFunctionRequest {
    contract_address: String,
    function_id: String,
    parameters: Value,
    /// Native value in wei, decimal or 0x hex
    value: Option<String>,
    gas_limit: Option<u64>,
    network: Option<String>,
    rpc_url: Option<String>,
    overrides: Option<Value>,
    /// {"method": "eoa", "allowAny": true} or {"method": "relayer", ...}
    execution: Value,
    /// Signing key for the eoa method
    private_key: Option<String>,
    /// API key for the relayer method, used for this submission only
    relayer_api_key: Option<String>,
    confirm: Option<bool>,
    /// Replaces `[execution] confirmation_timeout_secs` for this call
    confirmation_timeout_secs: Option<u64>,
    /// Replaces `[execution] poll_interval_ms` for this call
    poll_interval_ms: Option<u64>,
}

impl ExecuteFunctionRequest {
    fn timing(&self) -> TimingOverride {
        TimingOverride {
            confirmation_timeout_secs: self.confirmation_timeout_secs,
            poll_interval_ms: self.poll_interval_ms,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct RelayerServiceRequest {
    service_url: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct GetRelayerRequest {
    relayer_id: String,
    service_url: Option<String>,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct CheckFormTargetRequest {
    /// {"contractAddress", "functionId", "ecosystem", "networkId", "cachedDefinition"?, "cachedDefinitionHash"?, "cachedSchemaHash"?}
    target: Value,
    refresh: Option<bool>,
    rpc_url: Option<String>,
}

fn endpoints(rpc_url: &Option<String>) -> NetworkOverride {
    NetworkOverride {
        rpc_url: rpc_url.clone(),
        ..Default::default()
    }
}

fn overrides(value: &Option<Value>) -> Result<FieldOverrides> {
    match value {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| anyhow!("Invalid field overrides: {}", e)),
        None => Ok(FieldOverrides::default()),
    }
}

fn render<T: Serialize>(result: Result<T>, action: &str) -> String {
    match result {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| "Failed to serialize result".to_string()),
        Err(e) => {
            error!("Failed to {}: {}", action, e);
            format!("Error: {}", e)
        }
    }
}

impl ContractFormServer {
    pub fn new(config: Config) -> Result<Self> {
        let contract_manager = Arc::new(tokio::sync::Mutex::new(ContractManager::new(
            config.clone(),
            ProviderManager::new(),
        )));
        let config = Arc::new(config);

        Ok(Self {
            contract_manager,
            config,
        })
    }

    pub async fn run(&self) -> Result<()> {
        info!("Starting Contract Form MCP Server");

        if let Some(network) = self.config.networks.get(&self.config.default_network) {
            if let Err(e) = ProviderManager::new()
                .validate_network_connection(&self.config.default_network, network)
                .await
            {
                warn!("{}", e);
            }
        }

        let service = self.clone().serve(stdio()).await?;

        info!("Contract Form MCP Server started successfully");
        let _ = service.waiting().await;
        Ok(())
    }

    fn relayer_client(
        &self,
        service_url: &Option<String>,
        api_key: &Option<String>,
    ) -> Result<HttpRelayerClient> {
        let service_url = service_url
            .clone()
            .or_else(|| self.config.relayer.service_url.clone())
            .ok_or_else(|| anyhow!("No relayer service URL given or configured"))?;
        let api_key = api_key
            .clone()
            .or_else(|| self.config.relayer.api_key.clone())
            .ok_or_else(|| anyhow!("No relayer API key given. Set RELAYER_API_KEY or pass api_key."))?;
        Ok(HttpRelayerClient::new(&service_url, &api_key))
    }

    async fn execute(&self, request: ExecuteFunctionRequest) -> Result<Value> {
        let execution: ExecutionConfig = serde_json::from_value(request.execution.clone())
            .map_err(|e| anyhow!("Invalid execution config: {}", e))?;
        let overrides = overrides(&request.overrides)?;
        let user = endpoints(&request.rpc_url);

        let mut manager = self.contract_manager.lock().await;
        let (network_config, call) = manager
            .prepare_call(
                &request.contract_address,
                &request.function_id,
                &request.parameters,
                request.value.as_deref(),
                request.gas_limit,
                request.network.as_deref(),
                &user,
                &overrides,
            )
            .await?;

        if self.config.security.require_confirmation && !request.confirm.unwrap_or(false) {
            info!("Returning prepared call for confirmation: {}", call.function_id);
            return Ok(serde_json::json!({
                "confirmationRequired": true,
                "preparedCall": call,
            }));
        }

        let wallet = match (&execution, &request.private_key) {
            (ExecutionConfig::Eoa { .. }, Some(key)) => {
                Some(LocalWallet::new(key, network_config.clone())?)
            }
            _ => None,
        };
        let runtime_secret = request
            .relayer_api_key
            .clone()
            .or_else(|| self.config.relayer.api_key.clone());

        let report = manager
            .execute_function(
                &call,
                &network_config,
                &execution,
                wallet.as_ref().map(|w| w as &dyn WalletCapability),
                runtime_secret.as_deref(),
                &request.timing(),
            )
            .await?;
        if !report.success {
            warn!(
                "Execution of {} ended in error: {}",
                call.function_id,
                report.error.as_deref().unwrap_or("unknown")
            );
        }
        Ok(serde_json::to_value(report)?)
    }
}

#[tool(tool_box)]
impl ContractFormServer {
    #[tool(description = "Resolve a contract into a normalized schema, following proxies to their implementation")]
    async fn resolve_contract(&self, #[tool(aggr)] request: ResolveContractRequest) -> String {
        let artifacts = ContractArtifacts {
            address: request.address.clone(),
            manual_definition: request.abi.clone(),
        };
        let options = ResolveOptions {
            skip_proxy_detection: request.skip_proxy_detection.unwrap_or(false),
            treat_as_implementation: request.treat_as_implementation.unwrap_or(false),
            force_refresh: request.force_refresh.unwrap_or(false),
            max_proxy_depth: request.max_proxy_depth,
            providers: request.providers.clone(),
        };

        let mut manager = self.contract_manager.lock().await;
        let result = manager
            .resolve_contract(
                &artifacts,
                request.network.as_deref(),
                &endpoints(&request.rpc_url),
                &options,
            )
            .await;
        render(result, "resolve contract")
    }

    #[tool(description = "Describe a contract function as form fields")]
    async fn describe_function(&self, #[tool(aggr)] request: DescribeFunctionRequest) -> String {
        let overrides = match overrides(&request.overrides) {
            Ok(overrides) => overrides,
            Err(e) => return format!("Error: {}", e),
        };

        let mut manager = self.contract_manager.lock().await;
        let result = manager
            .describe_function(
                &request.contract_address,
                &request.function_id,
                request.network.as_deref(),
                &endpoints(&request.rpc_url),
                &overrides,
            )
            .await;
        render(result, "describe function")
    }

    #[tool(description = "Call a read-only contract function with form values")]
    async fn call_view_function(&self, #[tool(aggr)] request: ViewFunctionRequest) -> String {
        let overrides = match overrides(&request.overrides) {
            Ok(overrides) => overrides,
            Err(e) => return format!("Error: {}", e),
        };

        let mut manager = self.contract_manager.lock().await;
        let result = manager
            .call_view_function(
                &request.contract_address,
                &request.function_id,
                &request.parameters,
                request.network.as_deref(),
                &endpoints(&request.rpc_url),
                &overrides,
            )
            .await;
        render(result, "call view function")
    }

    #[tool(description = "Execute a state-changing contract function through an EOA wallet or a relayer")]
    async fn execute_function(&self, #[tool(aggr)] request: ExecuteFunctionRequest) -> String {
        if !self.config.security.allow_write_operations {
            return "Error: Write operations are disabled. Use --allow-writes flag to enable transaction sending.".to_string();
        }
        render(self.execute(request).await, "execute function")
    }

    #[tool(description = "List the relayers available on a relayer service")]
    async fn list_relayers(&self, #[tool(aggr)] request: RelayerServiceRequest) -> String {
        let result = match self.relayer_client(&request.service_url, &request.api_key) {
            Ok(client) => client.list_relayers().await.map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        render(result, "list relayers")
    }

    #[tool(description = "Get a relayer's details and current status")]
    async fn get_relayer(&self, #[tool(aggr)] request: GetRelayerRequest) -> String {
        let result = async {
            let client = self.relayer_client(&request.service_url, &request.api_key)?;
            let details = client.get_relayer(&request.relayer_id).await?;
            let status = client.get_relayer_status(&request.relayer_id).await?;
            Ok::<_, anyhow::Error>(serde_json::json!({ "relayer": details, "status": status }))
        }
        .await;
        render(result, "get relayer")
    }

    #[tool(description = "Check whether a saved form's contract needs a re-fetch and whether its schema changed")]
    async fn check_form_target(&self, #[tool(aggr)] request: CheckFormTargetRequest) -> String {
        let target: StoredFormTarget = match serde_json::from_value(request.target.clone()) {
            Ok(target) => target,
            Err(e) => return format!("Error: Invalid form target: {}", e),
        };

        let mut manager = self.contract_manager.lock().await;
        let result = manager
            .check_form_target(
                &target,
                &endpoints(&request.rpc_url),
                request.refresh.unwrap_or(false),
            )
            .await;
        render(result, "check form target")
    }
}

#[tool(tool_box)]
impl ServerHandler for ContractFormServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("MCP server that turns smart contracts into forms. Resolves contracts (following proxies), describes functions as typed form fields, runs read calls from form values, and executes state-changing calls through an EOA wallet or a relayer with status tracking.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
