//! Proxy detection.
//!
//! Storage-slot and bytecode evidence is read from the chain; ABI
//! fingerprints only raise suspicion. The strongest evidence wins.

use alloy::{
    json_abi::{JsonAbi, StateMutability},
    primitives::{b256, Address, Bytes, B256, U256},
};
use tracing::{debug, warn};

use super::codec::selector;
use super::provider::ChainClient;
use crate::schema::{Confidence, DetectionMethod, ProxyInfo, ProxyType};

/// `bytes32(uint256(keccak256("eip1967.proxy.implementation")) - 1)`
pub const EIP1967_IMPLEMENTATION_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");
/// `bytes32(uint256(keccak256("eip1967.proxy.admin")) - 1)`
pub const EIP1967_ADMIN_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");
/// `bytes32(uint256(keccak256("eip1967.proxy.beacon")) - 1)`
pub const EIP1967_BEACON_SLOT: B256 =
    b256!("a3f0ad74e5423aebfd80d3ef4346578335a9a72aeaee59ff6cb3582b35133d50");
/// `keccak256("PROXIABLE")`
pub const EIP1822_PROXIABLE_SLOT: B256 =
    b256!("c5f16f0fcc639fa48a6947836d9850f504798523bf8c9a3a87d5876cf622bcf7");
/// `keccak256("org.zeppelinos.proxy.implementation")`
pub const OZ_LEGACY_IMPLEMENTATION_SLOT: B256 =
    b256!("7050c9e0f4ca769c69bd3a8ef740bc37934f8e2c036e5a723fd8ee048ed3f8c3");

const EIP1167_PREFIX: [u8; 10] = [0x36, 0x3d, 0x3d, 0x37, 0x3d, 0x3d, 0x3d, 0x36, 0x3d, 0x73];
const EIP1167_SUFFIX: [u8; 15] = [
    0x5a, 0xf4, 0x3d, 0x82, 0x80, 0x3e, 0x90, 0x3d, 0x91, 0x60, 0x2b, 0x57, 0xfd, 0x5b, 0xf3,
];

/// Extracts the target of an EIP-1167 minimal proxy from runtime bytecode.
pub fn minimal_proxy_target(code: &[u8]) -> Option<Address> {
    if code.len() != EIP1167_PREFIX.len() + 20 + EIP1167_SUFFIX.len() {
        return None;
    }
    let (prefix, rest) = code.split_at(EIP1167_PREFIX.len());
    let (target, suffix) = rest.split_at(20);
    (prefix == EIP1167_PREFIX && suffix == EIP1167_SUFFIX).then(|| Address::from_slice(target))
}

/// Address stored in the low 20 bytes of a slot, if non-zero.
fn slot_address(value: U256) -> Option<Address> {
    let word = B256::from(value.to_be_bytes::<32>());
    let address = Address::from_word(word);
    (!address.is_zero()).then_some(address)
}

/// Which proxy pattern an ABI looks like, judged by function names alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fingerprint {
    Transparent,
    Uups,
    Beacon,
    Diamond,
    /// Fallback-only interface: nothing callable but the delegating fallback.
    Delegating,
}

impl Fingerprint {
    fn proxy_type(self) -> ProxyType {
        match self {
            Fingerprint::Transparent => ProxyType::Transparent,
            Fingerprint::Uups => ProxyType::Uups,
            Fingerprint::Beacon => ProxyType::Beacon,
            Fingerprint::Diamond => ProxyType::Diamond,
            Fingerprint::Delegating => ProxyType::Generic,
        }
    }
}

pub fn fingerprint(abi: &JsonAbi) -> Option<Fingerprint> {
    let has = |name: &str| abi.functions().any(|f| f.name == name);

    if has("facets") || has("facetAddresses") || has("diamondCut") {
        return Some(Fingerprint::Diamond);
    }
    if has("upgradeTo") || has("upgradeToAndCall") {
        if has("admin") || has("changeAdmin") {
            return Some(Fingerprint::Transparent);
        }
        if has("proxiableUUID") {
            return Some(Fingerprint::Uups);
        }
        return Some(Fingerprint::Transparent);
    }
    if has("beacon") && has("implementation") {
        return Some(Fingerprint::Beacon);
    }
    if has("implementation") && (has("admin") || has("proxyType")) {
        return Some(Fingerprint::Transparent);
    }

    let state_changing = abi
        .functions()
        .any(|f| !matches!(f.state_mutability, StateMutability::View | StateMutability::Pure));
    if abi.fallback.is_some() && !state_changing {
        return Some(Fingerprint::Delegating);
    }
    None
}

fn exposes_implementation_getter(abi: &JsonAbi) -> bool {
    abi.functions()
        .any(|f| f.name == "implementation" && f.inputs.is_empty())
}

/// Probes storage slots and bytecode, then the ABI, for a proxy at `address`.
///
/// Chain read failures are logged and treated as absent evidence.
pub async fn detect(chain: &dyn ChainClient, address: Address, abi: Option<&JsonAbi>) -> ProxyInfo {
    if let Some(info) = detect_on_chain(chain, address).await {
        return info;
    }

    let Some(abi) = abi else {
        return ProxyInfo::not_proxy();
    };
    let Some(print) = fingerprint(abi) else {
        return ProxyInfo::not_proxy();
    };
    debug!("ABI of 0x{:x} matches {:?} proxy fingerprint", address, print);

    if exposes_implementation_getter(abi) {
        if let Some(implementation) = call_implementation(chain, address).await {
            return ProxyInfo {
                is_proxy: true,
                proxy_type: Some(print.proxy_type()),
                implementation_address: Some(implementation.to_checksum(None)),
                admin_address: None,
                detection_method: Some(DetectionMethod::ImplementationCall),
                confidence: Confidence::Medium,
                depth: 0,
                ambiguous: false,
            };
        }
    }

    ProxyInfo {
        is_proxy: true,
        proxy_type: Some(print.proxy_type()),
        implementation_address: None,
        admin_address: None,
        detection_method: Some(DetectionMethod::AbiPattern),
        confidence: Confidence::Low,
        depth: 0,
        ambiguous: false,
    }
}

async fn detect_on_chain(chain: &dyn ChainClient, address: Address) -> Option<ProxyInfo> {
    let found = |proxy_type, implementation: Address, method| ProxyInfo {
        is_proxy: true,
        proxy_type: Some(proxy_type),
        implementation_address: Some(implementation.to_checksum(None)),
        admin_address: None,
        detection_method: Some(method),
        confidence: Confidence::High,
        depth: 0,
        ambiguous: false,
    };

    match chain.code_at(address).await {
        Ok(code) => {
            if let Some(target) = minimal_proxy_target(&code) {
                return Some(found(ProxyType::Eip1167, target, DetectionMethod::Bytecode));
            }
        }
        Err(e) => warn!("Failed to read bytecode of 0x{:x}: {}", address, e),
    }

    if let Some(implementation) = read_slot(chain, address, EIP1967_IMPLEMENTATION_SLOT).await {
        let mut info = found(ProxyType::Eip1967, implementation, DetectionMethod::StorageSlot);
        info.admin_address = read_slot(chain, address, EIP1967_ADMIN_SLOT)
            .await
            .map(|admin| admin.to_checksum(None));
        return Some(info);
    }

    if let Some(beacon) = read_slot(chain, address, EIP1967_BEACON_SLOT).await {
        match call_implementation(chain, beacon).await {
            Some(implementation) => {
                return Some(found(
                    ProxyType::Eip1967Beacon,
                    implementation,
                    DetectionMethod::StorageSlot,
                ))
            }
            None => warn!(
                "Beacon 0x{:x} of proxy 0x{:x} did not return an implementation",
                beacon, address
            ),
        }
    }

    if let Some(implementation) = read_slot(chain, address, EIP1822_PROXIABLE_SLOT).await {
        return Some(found(ProxyType::Eip1822, implementation, DetectionMethod::StorageSlot));
    }

    if let Some(implementation) = read_slot(chain, address, OZ_LEGACY_IMPLEMENTATION_SLOT).await {
        return Some(found(
            ProxyType::OpenzeppelinLegacy,
            implementation,
            DetectionMethod::StorageSlot,
        ));
    }

    None
}

async fn read_slot(chain: &dyn ChainClient, address: Address, slot: B256) -> Option<Address> {
    match chain.storage_at(address, U256::from_be_bytes(slot.0)).await {
        Ok(value) => slot_address(value),
        Err(e) => {
            warn!("Failed to read storage slot {} of 0x{:x}: {}", slot, address, e);
            None
        }
    }
}

/// Calls `implementation()` and reads the returned address.
async fn call_implementation(chain: &dyn ChainClient, target: Address) -> Option<Address> {
    let data = Bytes::from(selector("implementation()").to_vec());
    match chain.call(target, data).await {
        Ok(ret) if ret.len() >= 32 => {
            let address = Address::from_word(B256::from_slice(&ret[..32]));
            (!address.is_zero()).then_some(address)
        }
        Ok(_) => None,
        Err(e) => {
            debug!("implementation() call on 0x{:x} failed: {}", target, e);
            None
        }
    }
}
