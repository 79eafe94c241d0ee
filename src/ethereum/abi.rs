use alloy::primitives::Address;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

use crate::config::NetworkConfig;

const DEFAULT_ETHERSCAN_API: &str = "https://api.etherscan.io/v2/api";
const DEFAULT_SOURCIFY_API: &str = "https://sourcify.dev/server";

/// A contract definition as returned by a registry, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDefinition {
    /// JSON ABI text.
    pub abi: String,
    pub name: Option<String>,
    /// Registry that produced the definition.
    pub provider: String,
    /// Registry-specific verification level, e.g. `exact_match`.
    pub verification: Option<String>,
}

/// A registry that can return the interface of a deployed contract.
#[async_trait]
pub trait DefinitionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, address: Address, network: &NetworkConfig) -> Result<RawDefinition>;
}

/// Verified-source registry, Etherscan v2 multichain API
#[derive(Debug, Clone, Default)]
pub struct EtherscanProvider {
    client: Client,
}

impl EtherscanProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionProvider for EtherscanProvider {
    fn name(&self) -> &str {
        "etherscan"
    }

    async fn fetch(&self, address: Address, network: &NetworkConfig) -> Result<RawDefinition> {
        let base_url = network
            .explorer_api_url
            .as_deref()
            .unwrap_or(DEFAULT_ETHERSCAN_API);

        let mut url = format!(
            "{}?chainid={}&module=contract&action=getsourcecode&address=0x{:x}",
            base_url, network.chain_id, address
        );

        if let Some(api_key) = &network.explorer_api_key {
            url.push_str(&format!("&apikey={}", api_key));
        }

        let response: Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to fetch from Etherscan: {}", e))?
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse Etherscan response: {}", e))?;

        if response["status"] != "1" {
            let message = response["result"]
                .as_str()
                .or_else(|| response["message"].as_str())
                .unwrap_or("Unknown error");
            return Err(anyhow!("Etherscan API error: {}", message));
        }

        let entry = response["result"]
            .get(0)
            .ok_or_else(|| anyhow!("No source entry found in response"))?;

        let abi = entry["ABI"]
            .as_str()
            .ok_or_else(|| anyhow!("No ABI found in response"))?;

        if abi == "Contract source code not verified" {
            return Err(anyhow!("Contract source code not verified"));
        }

        let name = entry["ContractName"]
            .as_str()
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Ok(RawDefinition {
            abi: abi.to_string(),
            name,
            provider: self.name().to_string(),
            verification: Some("verified".to_string()),
        })
    }
}

/// Bytecode-matching registry, Sourcify v2 API
#[derive(Debug, Clone, Default)]
pub struct SourcifyProvider {
    client: Client,
}

impl SourcifyProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DefinitionProvider for SourcifyProvider {
    fn name(&self) -> &str {
        "sourcify"
    }

    async fn fetch(&self, address: Address, network: &NetworkConfig) -> Result<RawDefinition> {
        let base_url = network
            .sourcify_url
            .as_deref()
            .unwrap_or(DEFAULT_SOURCIFY_API)
            .trim_end_matches('/');

        let url = format!(
            "{}/v2/contract/{}/0x{:x}?fields=abi,compilation",
            base_url, network.chain_id, address
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to fetch from Sourcify: {}", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(anyhow!("Contract not found on Sourcify (404)"));
        }
        if !response.status().is_success() {
            return Err(anyhow!("Sourcify API error: HTTP {}", response.status()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse Sourcify response: {}", e))?;

        let abi = body
            .get("abi")
            .filter(|abi| abi.is_array())
            .ok_or_else(|| anyhow!("No ABI found in response"))?;

        Ok(RawDefinition {
            abi: serde_json::to_string(abi)?,
            name: body["compilation"]["name"].as_str().map(str::to_string),
            provider: self.name().to_string(),
            verification: body["match"].as_str().map(str::to_string),
        })
    }
}

/// Memory and disk cache of raw definitions, keyed by network and address.
#[derive(Debug)]
pub struct DefinitionCache {
    cache_dir: PathBuf,
    memory_cache: HashMap<String, RawDefinition>,
}

impl DefinitionCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            memory_cache: HashMap::new(),
        }
    }

    fn cache_key(network: &str, address: Address) -> String {
        format!("{}_0x{:x}", network, address)
    }

    pub async fn get(&mut self, network: &str, address: Address) -> Option<RawDefinition> {
        let cache_key = Self::cache_key(network, address);

        if let Some(definition) = self.memory_cache.get(&cache_key) {
            debug!("Definition cache hit for 0x{:x}", address);
            return Some(definition.clone());
        }

        match self.load_cached(&cache_key).await {
            Ok(definition) => {
                debug!("Definition disk cache hit for 0x{:x}", address);
                self.memory_cache.insert(cache_key, definition.clone());
                Some(definition)
            }
            Err(e) => {
                debug!("No cached definition for 0x{:x}: {}", address, e);
                None
            }
        }
    }

    pub async fn put(
        &mut self,
        network: &str,
        address: Address,
        definition: &RawDefinition,
    ) -> Result<()> {
        let cache_key = Self::cache_key(network, address);
        self.memory_cache.insert(cache_key.clone(), definition.clone());
        self.store(&cache_key, definition).await
    }

    async fn load_cached(&self, cache_key: &str) -> Result<RawDefinition> {
        let cache_path = self.cache_dir.join(format!("{}.json", cache_key));

        if !cache_path.exists() {
            return Err(anyhow!("Cache file does not exist"));
        }

        let content = fs::read_to_string(&cache_path)
            .await
            .map_err(|e| anyhow!("Failed to read cache file: {}", e))?;

        serde_json::from_str(&content).map_err(|e| anyhow!("Failed to parse cached definition: {}", e))
    }

    async fn store(&self, cache_key: &str, definition: &RawDefinition) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir)
                .await
                .map_err(|e| anyhow!("Failed to create cache directory: {}", e))?;
        }

        let cache_path = self.cache_dir.join(format!("{}.json", cache_key));
        let content = serde_json::to_string_pretty(definition)
            .map_err(|e| anyhow!("Failed to serialize definition: {}", e))?;

        fs::write(&cache_path, content)
            .await
            .map_err(|e| anyhow!("Failed to write cache file: {}", e))?;

        debug!("Cached definition to {:?}", cache_path);
        Ok(())
    }

    /// Clear all cached definitions
    pub async fn clear(&mut self) -> Result<()> {
        self.memory_cache.clear();

        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)
                .await
                .map_err(|e| anyhow!("Failed to clear cache directory: {}", e))?;
        }

        info!("Cleared definition cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn definition() -> RawDefinition {
        RawDefinition {
            abi: "[]".to_string(),
            name: Some("Token".to_string()),
            provider: "sourcify".to_string(),
            verification: Some("exact_match".to_string()),
        }
    }

    #[tokio::test]
    async fn test_cache_round_trips_through_disk() {
        let temp_dir = tempdir().unwrap();
        let address = Address::repeat_byte(0xab);

        let mut cache = DefinitionCache::new(temp_dir.path().to_path_buf());
        assert!(cache.get("ethereum", address).await.is_none());
        cache.put("ethereum", address, &definition()).await.unwrap();

        let mut fresh = DefinitionCache::new(temp_dir.path().to_path_buf());
        assert_eq!(fresh.get("ethereum", address).await, Some(definition()));
        assert!(fresh.get("sepolia", address).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let temp_dir = tempdir().unwrap();
        let cache_dir = temp_dir.path().join("definitions");
        let address = Address::repeat_byte(0x01);

        let mut cache = DefinitionCache::new(cache_dir.clone());
        cache.put("ethereum", address, &definition()).await.unwrap();
        assert!(cache_dir.exists());

        cache.clear().await.unwrap();
        assert!(!cache_dir.exists());
        assert!(cache.get("ethereum", address).await.is_none());
    }
}
