//! Contract identity + network to a normalized [`ContractSchema`].
//!
//! Definitions come from a manual ABI, the definition cache, or the ordered
//! provider chain. Proxy detection runs before any implementation fetch and
//! follows at most `max_proxy_depth` hops.

use alloy::{json_abi::JsonAbi, primitives::Address};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::abi::{DefinitionCache, DefinitionProvider, EtherscanProvider, RawDefinition, SourcifyProvider};
use super::provider::ChainClient;
use super::schema::{merge, parse_definition, to_schema};
use super::{proxy, utils};
use crate::config::{NetworkConfig, ResolverConfig};
use crate::error::{AdapterError, AdapterResult, ProviderFailure};
use crate::schema::{sha256_hex, Confidence, ContractSchema, Ecosystem, ProxyInfo};

pub const MANUAL_SOURCE: &str = "manual";
pub const CACHE_SOURCE: &str = "cache";

/// What the caller knows about the contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifacts {
    pub address: String,
    /// JSON ABI text; when present no registry is consulted.
    #[serde(default)]
    pub manual_definition: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveOptions {
    pub skip_proxy_detection: bool,
    /// The address is already an implementation; do not look for a proxy.
    pub treat_as_implementation: bool,
    pub force_refresh: bool,
    pub max_proxy_depth: Option<u32>,
    /// Provider names to try, in order, instead of the configured list.
    pub providers: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAttempt {
    pub provider: String,
    pub outcome: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionMetadata {
    pub source: String,
    pub provider_attempts: Vec<ProviderAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    /// SHA-256 of the raw definition text of the addressed contract.
    pub definition_hash: String,
    pub schema_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedContract {
    pub schema: Arc<ContractSchema>,
    pub source: String,
    pub metadata: ResolutionMetadata,
    /// Only set when a proxy was detected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_info: Option<ProxyInfo>,
    /// Raw definition text, suitable for storing with a saved form.
    #[serde(skip)]
    pub definition: String,
}

struct LoadedDefinition {
    raw: RawDefinition,
    source: String,
    attempts: Vec<ProviderAttempt>,
}

pub struct SchemaResolver {
    providers: Vec<Arc<dyn DefinitionProvider>>,
    provider_order: Vec<String>,
    provider_timeout: Duration,
    max_proxy_depth: u32,
    cache: DefinitionCache,
}

impl SchemaResolver {
    pub fn new(
        providers: Vec<Arc<dyn DefinitionProvider>>,
        cache: DefinitionCache,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            providers,
            provider_order: config.providers.clone(),
            provider_timeout: config.provider_timeout(),
            max_proxy_depth: config.max_proxy_depth,
            cache,
        }
    }

    /// Resolver backed by the public Etherscan and Sourcify registries.
    pub fn with_registries(config: &ResolverConfig, cache: DefinitionCache) -> Self {
        let providers: Vec<Arc<dyn DefinitionProvider>> = vec![
            Arc::new(EtherscanProvider::new()),
            Arc::new(SourcifyProvider::new()),
        ];
        Self::new(providers, cache, config)
    }

    pub fn cache_mut(&mut self) -> &mut DefinitionCache {
        &mut self.cache
    }

    pub async fn resolve(
        &mut self,
        chain: &dyn ChainClient,
        network_name: &str,
        network: &NetworkConfig,
        artifacts: &ContractArtifacts,
        options: &ResolveOptions,
    ) -> AdapterResult<ResolvedContract> {
        if network.ecosystem != Ecosystem::Evm {
            return Err(AdapterError::UnsupportedEcosystem(network.ecosystem.to_string()));
        }
        let address = utils::validate_address(&artifacts.address)
            .map_err(|e| AdapterError::InvalidAddress(e.to_string()))?;

        let loaded = match &artifacts.manual_definition {
            Some(text) => LoadedDefinition {
                raw: RawDefinition {
                    abi: text.clone(),
                    name: None,
                    provider: MANUAL_SOURCE.to_string(),
                    verification: None,
                },
                source: MANUAL_SOURCE.to_string(),
                attempts: Vec::new(),
            },
            None => self.load(network_name, network, address, options).await?,
        };

        let abi = parse_definition(&loaded.raw.abi)?;
        let own_schema = to_schema(
            &abi,
            loaded.raw.name.clone(),
            Some(address.to_checksum(None)),
        );

        let (schema, proxy_info) = if options.skip_proxy_detection || options.treat_as_implementation {
            (own_schema, None)
        } else {
            self.follow_proxy(chain, network_name, network, address, &abi, own_schema, options)
                .await
        };

        let schema_hash = schema.content_hash();
        info!(
            "Resolved 0x{:x} from {} with {} functions",
            address,
            loaded.source,
            schema.functions.len()
        );

        Ok(ResolvedContract {
            metadata: ResolutionMetadata {
                source: loaded.source.clone(),
                provider_attempts: loaded.attempts,
                contract_name: schema.name.clone(),
                definition_hash: sha256_hex(loaded.raw.abi.as_bytes()),
                schema_hash,
                verification: loaded.raw.verification.clone(),
            },
            schema: Arc::new(schema),
            source: loaded.source,
            proxy_info,
            definition: loaded.raw.abi,
        })
    }

    /// Detects a proxy at `address` and merges in up to `max_proxy_depth`
    /// implementation definitions.
    #[allow(clippy::too_many_arguments)]
    async fn follow_proxy(
        &mut self,
        chain: &dyn ChainClient,
        network_name: &str,
        network: &NetworkConfig,
        address: Address,
        abi: &JsonAbi,
        own_schema: ContractSchema,
        options: &ResolveOptions,
    ) -> (ContractSchema, Option<ProxyInfo>) {
        let mut info = proxy::detect(chain, address, Some(abi)).await;
        if !info.is_proxy {
            return (own_schema, None);
        }

        let max_depth = options.max_proxy_depth.unwrap_or(self.max_proxy_depth);
        let mut merged = own_schema;
        let mut visited = vec![address];
        let mut next = parse_target(&info);

        while let Some(target) = next {
            if visited.contains(&target) {
                mark_ambiguous(&mut info, address, "implementation chain loops back on itself");
                break;
            }
            if info.depth >= max_depth {
                mark_ambiguous(
                    &mut info,
                    address,
                    &format!(
                        "0x{:x} is itself a proxy; stopped after {} hop(s)",
                        visited[visited.len() - 1],
                        max_depth
                    ),
                );
                break;
            }

            let implementation = match self.load(network_name, network, target, options).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    mark_ambiguous(
                        &mut info,
                        address,
                        &format!("kept the proxy definition, implementation unavailable: {}", e),
                    );
                    break;
                }
            };
            let implementation_abi = match parse_definition(&implementation.raw.abi) {
                Ok(abi) => abi,
                Err(e) => {
                    mark_ambiguous(
                        &mut info,
                        address,
                        &format!(
                            "kept the proxy definition, 0x{:x} has an unusable definition: {}",
                            target, e
                        ),
                    );
                    break;
                }
            };

            let implementation_schema = to_schema(
                &implementation_abi,
                implementation.raw.name.clone(),
                Some(target.to_checksum(None)),
            );
            merged = merge(&merged, &implementation_schema);
            info.depth += 1;
            info.implementation_address = Some(target.to_checksum(None));
            visited.push(target);
            debug!("Merged implementation 0x{:x} at depth {}", target, info.depth);

            // Only an address-yielding detection continues the chain.
            let probe = proxy::detect(chain, target, Some(&implementation_abi)).await;
            next = if probe.is_proxy { parse_target(&probe) } else { None };
            if probe.is_proxy && next.is_none() {
                mark_ambiguous(
                    &mut info,
                    address,
                    &format!(
                        "0x{:x} looks like a proxy but exposes no implementation address",
                        target
                    ),
                );
            }
        }

        (merged, Some(info))
    }

    /// Cache, then providers in order. The first success is cached.
    async fn load(
        &mut self,
        network_name: &str,
        network: &NetworkConfig,
        address: Address,
        options: &ResolveOptions,
    ) -> AdapterResult<LoadedDefinition> {
        if !options.force_refresh {
            if let Some(raw) = self.cache.get(network_name, address).await {
                return Ok(LoadedDefinition {
                    raw,
                    source: CACHE_SOURCE.to_string(),
                    attempts: Vec::new(),
                });
            }
        }

        let order = options
            .providers
            .clone()
            .unwrap_or_else(|| self.provider_order.clone());
        let display_address = address.to_checksum(None);
        let mut attempts = Vec::new();
        let mut causes = Vec::new();

        for name in &order {
            let Some(provider) = self.providers.iter().find(|p| p.name() == name).cloned() else {
                let reason = format!("unknown provider '{}'", name);
                attempts.push(ProviderAttempt {
                    provider: name.clone(),
                    outcome: reason.clone(),
                });
                causes.push(ProviderFailure {
                    provider: name.clone(),
                    reason,
                });
                continue;
            };

            debug!("Fetching definition of {} from {}", display_address, name);
            let outcome = match timeout(self.provider_timeout, provider.fetch(address, network)).await {
                Ok(Ok(raw)) => match parse_definition(&raw.abi) {
                    Ok(_) => Ok(raw),
                    Err(e) => Err(e.to_string()),
                },
                Ok(Err(e)) => Err(utils::interpret_definition_error(
                    name,
                    &e.to_string(),
                    &display_address,
                )),
                Err(_) => Err(format!(
                    "timed out after {}s",
                    self.provider_timeout.as_secs_f64()
                )),
            };

            match outcome {
                Ok(raw) => {
                    attempts.push(ProviderAttempt {
                        provider: name.clone(),
                        outcome: "success".to_string(),
                    });
                    if let Err(e) = self.cache.put(network_name, address, &raw).await {
                        warn!("Failed to cache definition of {}: {}", display_address, e);
                    }
                    return Ok(LoadedDefinition {
                        raw,
                        source: name.clone(),
                        attempts,
                    });
                }
                Err(reason) => {
                    debug!("{} could not provide {}: {}", name, display_address, reason);
                    attempts.push(ProviderAttempt {
                        provider: name.clone(),
                        outcome: reason.clone(),
                    });
                    causes.push(ProviderFailure {
                        provider: name.clone(),
                        reason,
                    });
                }
            }
        }

        Err(AdapterError::DefinitionUnavailable {
            address: display_address,
            causes,
        })
    }

    /// Loads the contract behind a saved form, re-fetching only when needed.
    pub async fn resolve_for_form(
        &mut self,
        chain: &dyn ChainClient,
        network: &NetworkConfig,
        target: &StoredFormTarget,
        refresh: bool,
    ) -> AdapterResult<FormTargetCheck> {
        if target.ecosystem != Ecosystem::Evm {
            return Err(AdapterError::UnsupportedEcosystem(target.ecosystem.to_string()));
        }

        let plan = plan_load(target, refresh);
        let (artifacts, options) = match &plan {
            LoadPlan::UseCached(definition) => (
                ContractArtifacts {
                    address: target.contract_address.clone(),
                    manual_definition: Some(definition.clone()),
                },
                ResolveOptions::default(),
            ),
            LoadPlan::Fetch(reason) => {
                debug!("Re-fetching {}: {:?}", target.contract_address, reason);
                (
                    ContractArtifacts {
                        address: target.contract_address.clone(),
                        manual_definition: None,
                    },
                    ResolveOptions {
                        force_refresh: true,
                        ..Default::default()
                    },
                )
            }
        };

        let resolved = self
            .resolve(chain, &target.network_id, network, &artifacts, &options)
            .await?;
        let schema_changed = target
            .cached_schema_hash
            .as_deref()
            .is_some_and(|stored| stored != resolved.metadata.schema_hash);
        let function_present = resolved.schema.function(&target.function_id).is_some();
        if schema_changed {
            info!("Schema of {} changed since the form was saved", target.contract_address);
        }

        Ok(FormTargetCheck {
            plan,
            schema_changed,
            function_present,
            resolved,
        })
    }
}

fn parse_target(info: &ProxyInfo) -> Option<Address> {
    info.implementation_address
        .as_deref()
        .and_then(|a| utils::validate_address(a).ok())
}

fn mark_ambiguous(info: &mut ProxyInfo, address: Address, reason: &str) {
    info.ambiguous = true;
    info.confidence = Confidence::Low;
    warn!(
        "{}",
        AdapterError::ProxyResolutionAmbiguous {
            address: address.to_checksum(None),
            reason: reason.to_string(),
        }
    );
}

/// The persisted identity of a saved form's target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFormTarget {
    pub contract_address: String,
    pub function_id: String,
    #[serde(default)]
    pub ecosystem: Ecosystem,
    pub network_id: String,
    #[serde(default)]
    pub cached_definition: Option<String>,
    #[serde(default)]
    pub cached_definition_hash: Option<String>,
    #[serde(default)]
    pub cached_schema_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchReason {
    NoCachedDefinition,
    Refresh,
    HashMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadPlan {
    Fetch(FetchReason),
    UseCached(String),
}

pub fn plan_load(target: &StoredFormTarget, refresh: bool) -> LoadPlan {
    if refresh {
        return LoadPlan::Fetch(FetchReason::Refresh);
    }
    let Some(definition) = &target.cached_definition else {
        return LoadPlan::Fetch(FetchReason::NoCachedDefinition);
    };
    match &target.cached_definition_hash {
        Some(stored) if *stored != sha256_hex(definition.as_bytes()) => {
            LoadPlan::Fetch(FetchReason::HashMismatch)
        }
        _ => LoadPlan::UseCached(definition.clone()),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormTargetCheck {
    pub plan: LoadPlan,
    pub schema_changed: bool,
    pub function_present: bool,
    pub resolved: ResolvedContract,
}
