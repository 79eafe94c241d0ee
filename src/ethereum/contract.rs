use alloy::primitives::U256;
use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::abi::DefinitionCache;
use super::codec;
use super::provider::{ChainClient, ProviderManager};
use super::resolver::{
    ContractArtifacts, FormTargetCheck, ResolveOptions, ResolvedContract, SchemaResolver,
    StoredFormTarget,
};
use super::utils;
use crate::config::{Config, NetworkConfig, NetworkOverride, TimingOverride};
use crate::error::{AdapterError, AdapterResult, TransformErrors};
use crate::execution::wallet::WalletCapability;
use crate::execution::{
    execute, ExecutionConfig, ExecutionContext, ExecutionTiming, PreparedCall, StatusUpdate,
    TxStatus,
};
use crate::forms::{format_output, map_function, parse_inputs, FieldDescriptor, FieldOverrides};
use crate::schema::{ContractFunction, ContractSchema, Ecosystem};

/// A function rendered as form fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionForm {
    pub function_id: String,
    pub name: String,
    pub display_name: String,
    pub modifies_state: bool,
    pub payable: bool,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewCallResult {
    pub function_id: String,
    /// Decoded return values in the shape a form submits them.
    pub result: Value,
    pub raw_result: String,
}

/// Outcome of one execution, with every status the submission reached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub success: bool,
    pub final_status: TxStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    /// Last status before the failure, when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<TxStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub statuses: Vec<StatusUpdate>,
}

pub fn find_function<'a>(
    schema: &'a ContractSchema,
    function_id: &str,
) -> AdapterResult<&'a ContractFunction> {
    schema.function(function_id).ok_or_else(|| {
        let available = schema.function_ids();
        AdapterError::FunctionNotFound {
            function: function_id.to_string(),
            available: if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            },
        }
    })
}

pub fn describe(
    schema: &ContractSchema,
    function_id: &str,
    overrides: &FieldOverrides,
) -> AdapterResult<FunctionForm> {
    let function = find_function(schema, function_id)?;
    Ok(FunctionForm {
        function_id: function.id.clone(),
        name: function.name.clone(),
        display_name: function.display_name.clone(),
        modifies_state: function.modifies_state,
        payable: function.is_payable(),
        fields: map_function(function, schema.ecosystem, overrides),
    })
}

fn contract_address(schema: &ContractSchema) -> AdapterResult<alloy::primitives::Address> {
    let address = schema
        .address
        .as_deref()
        .ok_or_else(|| AdapterError::InvalidAddress("schema has no contract address".to_string()))?;
    utils::validate_address(address).map_err(|e| AdapterError::InvalidAddress(e.to_string()))
}

fn require_evm(schema: &ContractSchema) -> AdapterResult<()> {
    if schema.ecosystem == Ecosystem::Evm {
        Ok(())
    } else {
        Err(AdapterError::UnsupportedEcosystem(schema.ecosystem.to_string()))
    }
}

/// Parses form values, performs the read call and formats what came back.
pub async fn query(
    chain: &dyn ChainClient,
    schema: &ContractSchema,
    function_id: &str,
    values: &Value,
    overrides: &FieldOverrides,
) -> AdapterResult<ViewCallResult> {
    require_evm(schema)?;
    let function = find_function(schema, function_id)?;
    if function.modifies_state {
        return Err(AdapterError::StateChangingFunction(function.id.clone()));
    }
    let address = contract_address(schema)?;

    let args = parse_inputs(function, values, schema.ecosystem, overrides)?;
    let calldata = codec::encode_call(function, &args)?;
    debug!("Calling {} on 0x{:x}", function.id, address);

    let raw = chain.call(address, calldata).await?;
    let decoded = codec::decode_output(function, &raw)?;
    let display = format_output(&decoded, function)?;

    Ok(ViewCallResult {
        function_id: function.id.clone(),
        result: display.to_form_value(),
        raw_result: format!("0x{}", hex::encode(&raw)),
    })
}

/// Encodes a state-changing call for the execution engine.
pub fn prepare(
    schema: &ContractSchema,
    chain_id: u64,
    function_id: &str,
    values: &Value,
    value: Option<&str>,
    gas_limit: Option<u64>,
    overrides: &FieldOverrides,
) -> AdapterResult<PreparedCall> {
    require_evm(schema)?;
    let function = find_function(schema, function_id)?;
    if !function.modifies_state {
        return Err(AdapterError::ReadOnlyFunction(function.id.clone()));
    }
    let address = contract_address(schema)?;

    let mut errors = TransformErrors::default();
    let args = match parse_inputs(function, values, schema.ecosystem, overrides) {
        Ok(args) => Some(args),
        Err(e) => {
            errors.extend(e);
            None
        }
    };
    let wei = match utils::parse_wei(value.unwrap_or("0")) {
        Ok(wei) if wei > U256::ZERO && !function.is_payable() => {
            errors.extend(TransformErrors::single(
                "value",
                format!("'{}' is not payable", function.name),
            ));
            wei
        }
        Ok(wei) => wei,
        Err(e) => {
            errors.extend(TransformErrors::single("value", e.to_string()));
            U256::ZERO
        }
    };
    let Some(args) = args.filter(|_| errors.is_empty()) else {
        return Err(errors.into());
    };

    let data = codec::encode_call(function, &args)?;
    Ok(PreparedCall {
        chain_id,
        to: address.to_checksum(None),
        data: format!("0x{}", hex::encode(&data)),
        value: wei.to_string(),
        function_id: function.id.clone(),
        gas_limit,
    })
}

/// Owns the resolver and the schemas resolved so far, keyed by network and
/// address. A re-resolution replaces the stored entry.
pub struct ContractManager {
    config: Config,
    provider_manager: ProviderManager,
    resolver: SchemaResolver,
    resolved: HashMap<String, ResolvedContract>,
}

impl ContractManager {
    pub fn new(config: Config, provider_manager: ProviderManager) -> Self {
        let cache = DefinitionCache::new(config.cache_dir());
        let resolver = SchemaResolver::with_registries(&config.resolver, cache);
        Self {
            config,
            provider_manager,
            resolver,
            resolved: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn network(
        &self,
        network: Option<&str>,
        user: &NetworkOverride,
    ) -> Result<(String, NetworkConfig)> {
        self.config.resolve_network(network, user)
    }

    fn key(network_name: &str, address: &str) -> String {
        format!("{}_{}", network_name, address.trim().to_lowercase())
    }

    pub async fn resolve_contract(
        &mut self,
        artifacts: &ContractArtifacts,
        network: Option<&str>,
        user: &NetworkOverride,
        options: &ResolveOptions,
    ) -> Result<ResolvedContract> {
        let (network_name, network_config) = self.network(network, user)?;
        let chain = self.provider_manager.chain_client(&network_config)?;

        let resolved = self
            .resolver
            .resolve(&chain, &network_name, &network_config, artifacts, options)
            .await?;

        self.resolved.insert(
            Self::key(&network_name, &artifacts.address),
            resolved.clone(),
        );
        Ok(resolved)
    }

    /// The stored schema for `address`, resolving it on first use.
    async fn schema(
        &mut self,
        address: &str,
        network: Option<&str>,
        user: &NetworkOverride,
    ) -> Result<(NetworkConfig, Arc<ContractSchema>)> {
        let (network_name, network_config) = self.network(network, user)?;
        if let Some(resolved) = self.resolved.get(&Self::key(&network_name, address)) {
            return Ok((network_config, resolved.schema.clone()));
        }

        let artifacts = ContractArtifacts {
            address: address.to_string(),
            manual_definition: None,
        };
        let resolved = self
            .resolve_contract(&artifacts, Some(&network_name), user, &ResolveOptions::default())
            .await?;
        Ok((network_config, resolved.schema))
    }

    pub async fn describe_function(
        &mut self,
        address: &str,
        function_id: &str,
        network: Option<&str>,
        user: &NetworkOverride,
        overrides: &FieldOverrides,
    ) -> Result<FunctionForm> {
        let (_, schema) = self.schema(address, network, user).await?;
        Ok(describe(&schema, function_id, overrides)?)
    }

    pub async fn call_view_function(
        &mut self,
        address: &str,
        function_id: &str,
        values: &Value,
        network: Option<&str>,
        user: &NetworkOverride,
        overrides: &FieldOverrides,
    ) -> Result<ViewCallResult> {
        let (network_config, schema) = self.schema(address, network, user).await?;
        let chain = self.provider_manager.chain_client(&network_config)?;
        Ok(query(&chain, &schema, function_id, values, overrides).await?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn prepare_call(
        &mut self,
        address: &str,
        function_id: &str,
        values: &Value,
        value: Option<&str>,
        gas_limit: Option<u64>,
        network: Option<&str>,
        user: &NetworkOverride,
        overrides: &FieldOverrides,
    ) -> Result<(NetworkConfig, PreparedCall)> {
        let (network_config, schema) = self.schema(address, network, user).await?;
        let call = prepare(
            &schema,
            network_config.chain_id,
            function_id,
            values,
            value,
            gas_limit,
            overrides,
        )?;

        if let Some(max) = &self.config.security.max_transaction_value {
            let max = utils::parse_wei(max)
                .map_err(|e| anyhow!("Invalid max_transaction_value setting: {}", e))?;
            let requested = utils::parse_wei(&call.value)?;
            if requested > max {
                return Err(anyhow!(
                    "Transaction value {} wei exceeds the configured maximum of {} wei",
                    requested,
                    max
                ));
            }
        }
        Ok((network_config, call))
    }

    /// Runs `call` through the strategy `config` selects.
    pub async fn execute_function(
        &mut self,
        call: &PreparedCall,
        network_config: &NetworkConfig,
        config: &ExecutionConfig,
        wallet: Option<&dyn WalletCapability>,
        runtime_secret: Option<&str>,
        timing: &TimingOverride,
    ) -> Result<ExecutionReport> {
        let chain = self.provider_manager.chain_client(network_config)?;
        let context = ExecutionContext {
            chain: &chain,
            wallet,
            relayer: None,
            timing: ExecutionTiming {
                confirmation_timeout: self.config.confirmation_timeout(timing),
                poll_interval: self.config.poll_interval(timing),
            },
            default_gas_limit: network_config.gas.default_gas_limit,
        };

        let mut statuses = Vec::new();
        let mut record = |update: &StatusUpdate| {
            info!("{} -> {}", call.function_id, update.status);
            statuses.push(update.clone());
        };
        let result = execute(call, config, &context, &mut record, runtime_secret).await;

        Ok(match result {
            Ok(outcome) => ExecutionReport {
                success: true,
                final_status: outcome.final_status,
                tx_id: Some(outcome.tx_id),
                last_status: None,
                error: None,
                statuses,
            },
            Err(failure) => ExecutionReport {
                success: false,
                final_status: statuses.last().map(|s| s.status).unwrap_or(TxStatus::Idle),
                tx_id: failure.tx_id,
                last_status: Some(failure.last_status),
                error: Some(failure.error.to_string()),
                statuses,
            },
        })
    }

    /// Checks a saved form's target against the live contract.
    pub async fn check_form_target(
        &mut self,
        target: &StoredFormTarget,
        user: &NetworkOverride,
        refresh: bool,
    ) -> Result<FormTargetCheck> {
        let (network_name, network_config) = self.network(Some(&target.network_id), user)?;
        let chain = self.provider_manager.chain_client(&network_config)?;

        let check = self
            .resolver
            .resolve_for_form(&chain, &network_config, target, refresh)
            .await?;
        self.resolved.insert(
            Self::key(&network_name, &target.contract_address),
            check.resolved.clone(),
        );
        Ok(check)
    }

    pub async fn clear_cache(&mut self) -> Result<()> {
        self.resolved.clear();
        self.resolver.cache_mut().clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::schema::{parse_definition, to_schema};
    use crate::forms::FieldOverride;
    use crate::testing::MockChain;
    use alloy::primitives::Address;
    use serde_json::json;

    const VAULT_ABI: &str = r#"[
        {"type":"function","name":"balanceOf","inputs":[{"name":"owner","type":"address"}],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"function","name":"position","inputs":[{"name":"id","type":"uint256"}],"outputs":[{"name":"owner","type":"address"},{"name":"amount","type":"uint128"}],"stateMutability":"view"},
        {"type":"function","name":"deposit","inputs":[{"name":"receiver","type":"address"}],"outputs":[],"stateMutability":"payable"},
        {"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"nonpayable"}
    ]"#;

    const HOLDER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn vault() -> Address {
        Address::repeat_byte(0x44)
    }

    fn schema() -> ContractSchema {
        let abi = parse_definition(VAULT_ABI).unwrap();
        to_schema(&abi, Some("Vault".to_string()), Some(vault().to_checksum(None)))
    }

    fn word(n: u64) -> Vec<u8> {
        U256::from(n).to_be_bytes::<32>().to_vec()
    }

    #[test]
    fn test_describe_lists_available_functions_on_miss() {
        let form = describe(&schema(), "transfer", &FieldOverrides::default()).unwrap();
        assert_eq!(form.function_id, "transfer(address,uint256)");
        assert_eq!(form.fields.len(), 2);
        assert!(form.modifies_state);

        let err = describe(&schema(), "approve", &FieldOverrides::default()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("approve"));
        assert!(message.contains("balanceOf(address)"));
    }

    #[tokio::test]
    async fn test_query_decodes_single_output() {
        let chain = MockChain::default().with_call(vault(), "balanceOf(address)", word(1000));
        let result = query(
            &chain,
            &schema(),
            "balanceOf",
            &json!({ "owner": HOLDER }),
            &FieldOverrides::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.result, json!("1000"));
        assert!(result.raw_result.starts_with("0x"));
    }

    #[tokio::test]
    async fn test_query_formats_named_outputs_as_record() {
        let holder = utils::validate_address(HOLDER).unwrap();
        let mut ret = holder.into_word().to_vec();
        ret.extend(word(5));
        let chain = MockChain::default().with_call(vault(), "position(uint256)", ret);

        let result = query(&chain, &schema(), "position", &json!(["7"]), &FieldOverrides::default())
            .await
            .unwrap();
        assert_eq!(result.result, json!({ "owner": HOLDER, "amount": "5" }));
    }

    #[tokio::test]
    async fn test_query_refuses_state_changing_function() {
        let err = query(
            &MockChain::default(),
            &schema(),
            "transfer",
            &json!([HOLDER, "1"]),
            &FieldOverrides::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AdapterError::StateChangingFunction(_)));
    }

    #[test]
    fn test_prepare_encodes_transfer() {
        let call = prepare(
            &schema(),
            1,
            "transfer(address,uint256)",
            &json!({ "to": HOLDER, "amount": "1000000000000000000000" }),
            None,
            None,
            &FieldOverrides::default(),
        )
        .unwrap();
        assert!(call.data.starts_with("0xa9059cbb"));
        assert_eq!(call.data.len(), 2 + 8 + 64 * 2);
        assert_eq!(call.value, "0");
        assert_eq!(call.to, vault().to_checksum(None));
    }

    #[test]
    fn test_prepare_reports_every_invalid_field() {
        let err = prepare(
            &schema(),
            1,
            "transfer",
            &json!({ "to": "0x1234", "amount": "-5" }),
            Some("10"),
            None,
            &FieldOverrides::default(),
        )
        .unwrap_err();
        let AdapterError::ValueTransformInvalid(errors) = err else {
            panic!("expected field errors, got {:?}", err);
        };
        assert!(errors.for_path("to").is_some());
        assert!(errors.for_path("amount").is_some());
        assert!(errors.for_path("value").is_some());
    }

    #[test]
    fn test_prepare_uses_hardcoded_override_and_value() {
        let mut overrides = FieldOverrides::default();
        overrides.0.insert(
            "receiver".to_string(),
            FieldOverride {
                hidden: true,
                hardcoded_value: Some(json!(HOLDER)),
                ..Default::default()
            },
        );
        let call = prepare(&schema(), 5, "deposit", &json!({}), Some("0x10"), Some(90_000), &overrides)
            .unwrap();
        assert_eq!(call.value, "16");
        assert_eq!(call.chain_id, 5);
        assert_eq!(call.gas_limit, Some(90_000));

        let err = prepare(&schema(), 1, "balanceOf", &json!([HOLDER]), None, None, &overrides)
            .unwrap_err();
        assert!(matches!(err, AdapterError::ReadOnlyFunction(_)));
    }
}
