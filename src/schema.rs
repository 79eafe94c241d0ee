//! Normalized, chain-agnostic description of a contract's callable surface.
//!
//! A [`ContractSchema`] is produced once by the resolver and treated as
//! read-only afterwards. A re-fetch builds a new schema; nothing here is
//! mutated in place.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Evm,
    Stellar,
    Solana,
    Midnight,
}

impl Default for Ecosystem {
    fn default() -> Self {
        Ecosystem::Evm
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Ecosystem::Evm => "evm",
            Ecosystem::Stellar => "stellar",
            Ecosystem::Solana => "solana",
            Ecosystem::Midnight => "midnight",
        };
        f.write_str(name)
    }
}

impl FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evm" | "ethereum" => Ok(Ecosystem::Evm),
            "stellar" | "soroban" => Ok(Ecosystem::Stellar),
            "solana" => Ok(Ecosystem::Solana),
            "midnight" => Ok(Ecosystem::Midnight),
            other => Err(format!("unknown ecosystem '{}'", other)),
        }
    }
}

/// One parameter of a function, event or composite type.
///
/// `components` is only populated for composite types: tuple members, map
/// key/value pairs and enum variants. For an enum variant component, `name`
/// is the variant tag and `type` is `void`, an integer type carrying a
/// `discriminant`, or `tuple` with the payload in its own `components`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionParameter {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<FunctionParameter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminant: Option<u32>,
}

impl FunctionParameter {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            display_name: None,
            description: None,
            components: None,
            discriminant: None,
        }
    }

    pub fn with_components(mut self, components: Vec<FunctionParameter>) -> Self {
        self.components = Some(components);
        self
    }

    pub fn with_discriminant(mut self, discriminant: u32) -> Self {
        self.discriminant = Some(discriminant);
        self
    }

    pub fn components(&self) -> &[FunctionParameter] {
        self.components.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    Pure,
    View,
    Nonpayable,
    Payable,
}

impl StateMutability {
    pub fn modifies_state(self) -> bool {
        matches!(self, StateMutability::Nonpayable | StateMutability::Payable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractFunction {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub inputs: Vec<FunctionParameter>,
    #[serde(default)]
    pub outputs: Vec<FunctionParameter>,
    pub state_mutability: StateMutability,
    pub modifies_state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContractFunction {
    pub fn is_payable(&self) -> bool {
        self.state_mutability == StateMutability::Payable
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub indexed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<FunctionParameter>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEvent {
    pub id: String,
    pub name: String,
    pub inputs: Vec<EventParameter>,
    pub anonymous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub ecosystem: Ecosystem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub functions: Vec<ContractFunction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<ContractEvent>>,
}

impl ContractSchema {
    pub fn function(&self, id_or_name: &str) -> Option<&ContractFunction> {
        self.functions
            .iter()
            .find(|f| f.id == id_or_name)
            .or_else(|| self.functions.iter().find(|f| f.name == id_or_name))
    }

    pub fn function_ids(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.id.clone()).collect()
    }

    /// SHA-256 over the canonical JSON form, hex encoded.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        sha256_hex(&canonical)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyType {
    Eip1967,
    Eip1967Beacon,
    Eip1822,
    OpenzeppelinLegacy,
    Eip1167,
    Transparent,
    Uups,
    Beacon,
    Diamond,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    StorageSlot,
    Bytecode,
    AbiPattern,
    ImplementationCall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInfo {
    pub is_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_type: Option<ProxyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_method: Option<DetectionMethod>,
    pub confidence: Confidence,
    /// Number of proxy hops actually resolved.
    #[serde(default)]
    pub depth: u32,
    /// Set when the chain continues past the resolved hops or the
    /// implementation could not be loaded.
    #[serde(default)]
    pub ambiguous: bool,
}

impl ProxyInfo {
    pub fn not_proxy() -> Self {
        Self {
            is_proxy: false,
            proxy_type: None,
            implementation_address: None,
            admin_address: None,
            detection_method: None,
            confidence: Confidence::High,
            depth: 0,
            ambiguous: false,
        }
    }
}
