use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::schema::Ecosystem;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub networks: HashMap<String, NetworkConfig>,
    pub default_network: String,
    pub security: SecurityConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub execution: ExecutionConfigSection,
    #[serde(default)]
    pub relayer: RelayerConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub ecosystem: Ecosystem,
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_url: Option<String>,
    #[serde(default)]
    pub explorer_api_url: Option<String>,
    #[serde(default)]
    pub explorer_api_key: Option<String>,
    #[serde(default)]
    pub sourcify_url: Option<String>,
    pub gas: GasConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasConfig {
    pub default_gas_limit: u64,
    pub max_gas_price: Option<u64>,
    pub priority_fee: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub allow_write_operations: bool,
    pub require_confirmation: bool,
    pub max_transaction_value: Option<String>,
}

/// Definition lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Providers tried in order until one returns a definition.
    pub providers: Vec<String>,
    pub provider_timeout_secs: u64,
    pub max_proxy_depth: u32,
    pub cache_dir: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            providers: vec!["etherscan".to_string(), "sourcify".to_string()],
            provider_timeout_secs: 10,
            max_proxy_depth: 1,
            cache_dir: None,
        }
    }
}

impl ResolverConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfigSection {
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for ExecutionConfigSection {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: 120,
            poll_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayerConfig {
    pub service_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub transport: String,
    pub stdio: StdioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdioConfig {
    pub buffer_size: Option<usize>,
}

/// Per-call replacements for the `[execution]` timing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingOverride {
    pub confirmation_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

/// Per-operation endpoint overrides supplied by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkOverride {
    pub rpc_url: Option<String>,
    pub explorer_api_url: Option<String>,
    pub explorer_api_key: Option<String>,
}

impl NetworkOverride {
    pub fn is_empty(&self) -> bool {
        self.rpc_url.is_none() && self.explorer_api_url.is_none() && self.explorer_api_key.is_none()
    }
}

impl NetworkConfig {
    /// Fills unset optional fields from `base`.
    fn layered_over(&self, base: &NetworkConfig) -> NetworkConfig {
        NetworkConfig {
            ecosystem: self.ecosystem,
            rpc_url: self.rpc_url.clone(),
            chain_id: self.chain_id,
            explorer_url: self.explorer_url.clone().or_else(|| base.explorer_url.clone()),
            explorer_api_url: self
                .explorer_api_url
                .clone()
                .or_else(|| base.explorer_api_url.clone()),
            explorer_api_key: self
                .explorer_api_key
                .clone()
                .or_else(|| base.explorer_api_key.clone()),
            sourcify_url: self.sourcify_url.clone().or_else(|| base.sourcify_url.clone()),
            gas: self.gas.clone(),
        }
    }

    fn with_override(mut self, user: &NetworkOverride) -> NetworkConfig {
        if let Some(url) = &user.rpc_url {
            self.rpc_url = url.clone();
        }
        if let Some(url) = &user.explorer_api_url {
            self.explorer_api_url = Some(url.clone());
        }
        if let Some(key) = &user.explorer_api_key {
            self.explorer_api_key = Some(key.clone());
        }
        self
    }
}

fn evm_network(
    rpc_url: &str,
    chain_id: u64,
    explorer_url: &str,
    max_gas_price: u64,
    priority_fee: u64,
) -> NetworkConfig {
    NetworkConfig {
        ecosystem: Ecosystem::Evm,
        rpc_url: rpc_url.to_string(),
        chain_id,
        explorer_url: Some(explorer_url.to_string()),
        explorer_api_url: Some("https://api.etherscan.io/v2/api".to_string()),
        explorer_api_key: None,
        sourcify_url: Some("https://sourcify.dev/server".to_string()),
        gas: GasConfig {
            default_gas_limit: 100000,
            max_gas_price: Some(max_gas_price),
            priority_fee: Some(priority_fee),
        },
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            networks: Self::builtin_networks(),
            default_network: "ethereum".to_string(),
            security: SecurityConfig {
                allow_write_operations: false,
                require_confirmation: true,
                max_transaction_value: None,
            },
            resolver: ResolverConfig::default(),
            execution: ExecutionConfigSection::default(),
            relayer: RelayerConfig::default(),
            server: ServerConfig {
                transport: "stdio".to_string(),
                stdio: StdioConfig {
                    buffer_size: Some(1024 * 1024), // 1MB buffer
                },
            },
        }
    }
}

impl Config {
    /// Networks known without any configuration file.
    pub fn builtin_networks() -> HashMap<String, NetworkConfig> {
        let mut networks = HashMap::new();
        networks.insert(
            "ethereum".to_string(),
            evm_network(
                "https://eth-mainnet.g.alchemy.com/v2/demo",
                1,
                "https://etherscan.io",
                50_000_000_000, // 50 Gwei
                2_000_000_000,  // 2 Gwei
            ),
        );
        networks.insert(
            "sepolia".to_string(),
            evm_network(
                "https://eth-sepolia.g.alchemy.com/v2/demo",
                11155111,
                "https://sepolia.etherscan.io",
                20_000_000_000,
                1_000_000_000,
            ),
        );
        networks.insert(
            "polygon".to_string(),
            evm_network(
                "https://polygon-mainnet.g.alchemy.com/v2/demo",
                137,
                "https://polygonscan.com",
                500_000_000_000,
                30_000_000_000,
            ),
        );
        networks.insert(
            "arbitrum".to_string(),
            evm_network(
                "https://arb-mainnet.g.alchemy.com/v2/demo",
                42161,
                "https://arbiscan.io",
                5_000_000_000,
                100_000_000, // 0.1 Gwei
            ),
        );
        networks
    }

    /// Resolves the endpoints for one operation.
    ///
    /// Priority, highest first: `user` override, this configuration, the
    /// built-in default for the network name.
    pub fn resolve_network(
        &self,
        network: Option<&str>,
        user: &NetworkOverride,
    ) -> Result<(String, NetworkConfig)> {
        let name = network.unwrap_or(&self.default_network).to_string();
        let builtin = Self::builtin_networks().remove(&name);
        let layered = match (self.networks.get(&name), builtin) {
            (Some(app), Some(builtin)) => app.layered_over(&builtin),
            (Some(app), None) => app.clone(),
            (None, Some(builtin)) => builtin,
            (None, None) => {
                let mut available: Vec<&String> = self.networks.keys().collect();
                available.sort();
                return Err(anyhow!(
                    "Network '{}' not configured. Available networks: {}",
                    name,
                    available
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        };
        Ok((name, layered.with_override(user)))
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    /// Apply environment variable substitutions to configuration
    fn apply_env_vars(&mut self) {
        if let Ok(api_key) = std::env::var("ALCHEMY_API_KEY") {
            tracing::info!("Using ALCHEMY_API_KEY environment variable for RPC URLs");

            for (network_name, network_config) in &mut self.networks {
                if network_config.rpc_url.contains("alchemy.com/v2/demo") {
                    network_config.rpc_url = network_config
                        .rpc_url
                        .replace("/demo", &format!("/{}", api_key));
                    tracing::debug!("Updated {} RPC URL with API key", network_name);
                } else if network_config.rpc_url.contains("YOUR_API_KEY_HERE") {
                    network_config.rpc_url = network_config
                        .rpc_url
                        .replace("YOUR_API_KEY_HERE", &api_key);
                    tracing::debug!("Updated {} RPC URL with API key", network_name);
                }
            }
        } else {
            for (network_name, network_config) in &self.networks {
                if network_config.rpc_url.contains("/demo") {
                    tracing::warn!("Using demo RPC endpoint for {}, set ALCHEMY_API_KEY environment variable for better reliability", network_name);
                }
            }
        }

        if let Ok(etherscan_key) = std::env::var("ETHERSCAN_API_KEY") {
            tracing::debug!("ETHERSCAN_API_KEY found, will be used for definition lookups");
            for network_config in self.networks.values_mut() {
                if network_config.explorer_api_key.is_none() {
                    network_config.explorer_api_key = Some(etherscan_key.clone());
                }
            }
        }

        if let Ok(relayer_key) = std::env::var("RELAYER_API_KEY") {
            tracing::debug!("RELAYER_API_KEY found, will be used for relayer execution");
            self.relayer.api_key = Some(relayer_key);
        }
    }

    pub fn confirmation_timeout(&self, per_call: &TimingOverride) -> Duration {
        Duration::from_secs(
            per_call
                .confirmation_timeout_secs
                .unwrap_or(self.execution.confirmation_timeout_secs),
        )
    }

    /// A zero per-call interval is ignored.
    pub fn poll_interval(&self, per_call: &TimingOverride) -> Duration {
        Duration::from_millis(
            per_call
                .poll_interval_ms
                .filter(|ms| *ms > 0)
                .unwrap_or(self.execution.poll_interval_ms),
        )
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.resolver.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("contract-form-mcp")
                .join("definition-cache")
        })
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("contract-form-mcp").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# Contract Form MCP Server Configuration File
# Networks, definition lookup, execution and server behavior

# Default network to use when none is specified
default_network = "ethereum"

[networks.ethereum]
ecosystem = "evm"
rpc_url = "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 1
explorer_url = "https://etherscan.io"
explorer_api_url = "https://api.etherscan.io/v2/api"
sourcify_url = "https://sourcify.dev/server"

[networks.ethereum.gas]
default_gas_limit = 100000
max_gas_price = 50_000_000_000  # 50 Gwei
priority_fee = 2_000_000_000    # 2 Gwei

[networks.sepolia]
ecosystem = "evm"
rpc_url = "https://eth-sepolia.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 11155111
explorer_url = "https://sepolia.etherscan.io"

[networks.sepolia.gas]
default_gas_limit = 100000
max_gas_price = 20_000_000_000  # 20 Gwei
priority_fee = 1_000_000_000    # 1 Gwei

# Security settings
[security]
allow_write_operations = false
require_confirmation = true
# max_transaction_value = "1000000000000000000"  # 1 ETH in wei

# Contract definition lookup
[resolver]
providers = ["etherscan", "sourcify"]
provider_timeout_secs = 10
max_proxy_depth = 1

# Transaction confirmation tracking
[execution]
confirmation_timeout_secs = 120
poll_interval_ms = 2000

# Relay service used by the relayer execution method
[relayer]
# service_url = "https://relayer.example.com"

# Server configuration
[server]
transport = "stdio"

[server.stdio]
buffer_size = 1048576  # 1MB

# Environment variables that can be used:
# ETHERSCAN_API_KEY - Etherscan API key for definition lookups
# ALCHEMY_API_KEY - Your Alchemy API key (replace YOUR_API_KEY_HERE above)
# RELAYER_API_KEY - API key for the relay service
"#;
        sample_config.to_string()
    }
}
