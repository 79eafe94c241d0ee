use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Validates and normalizes an Ethereum address
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Address cannot be empty"));
    }

    let Some(hex_part) = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
    else {
        return Err(anyhow!(
            "Invalid address format: '{}'. Ethereum addresses must start with '0x'",
            address
        ));
    };

    if hex_part.len() != 40 {
        return Err(anyhow!(
            "Invalid address length: '{}'. Ethereum addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        ));
    }

    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        ));
    }

    Address::from_str(hex_part)
        .map_err(|e| anyhow!("Invalid Ethereum address: '{}'. Error: {}", address, e))
}

/// Parses a native-token amount in wei, decimal or `0x` hex.
pub fn parse_wei(value_str: &str) -> Result<U256> {
    let value_str = value_str.trim();
    if value_str.is_empty() {
        return Ok(U256::ZERO);
    }

    match value_str
        .strip_prefix("0x")
        .or_else(|| value_str.strip_prefix("0X"))
    {
        Some(hex) => U256::from_str_radix(hex, 16)
            .map_err(|_| anyhow!("Invalid hexadecimal value: '{}'", value_str)),
        None => U256::from_str_radix(value_str, 10).map_err(|_| {
            anyhow!(
                "Invalid numeric value: '{}'. Use decimal format or '0x' prefixed hex",
                value_str
            )
        }),
    }
}

/// Rough category of a failed signing or broadcast attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionFailure {
    Rejected,
    InsufficientFunds,
    Reverted,
    Other,
}

pub fn classify_submission_error(error: &str) -> SubmissionFailure {
    let error = error.to_lowercase();
    if error.contains("user rejected")
        || error.contains("user denied")
        || error.contains("rejected by user")
        || error.contains("signature rejected")
    {
        SubmissionFailure::Rejected
    } else if error.contains("insufficient funds") || error.contains("insufficient balance") {
        SubmissionFailure::InsufficientFunds
    } else if error.contains("execution reverted") {
        SubmissionFailure::Reverted
    } else {
        SubmissionFailure::Other
    }
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("execution reverted") {
        "Transaction failed: The contract function reverted execution. This usually means the function's requirements were not met or an assertion failed.".to_string()
    } else if error.contains("insufficient funds") {
        "Transaction failed: Insufficient funds to cover gas costs. Make sure your account has enough native tokens for gas fees.".to_string()
    } else if error.contains("gas required exceeds allowance") {
        "Transaction failed: Gas limit too low. Try increasing the gas limit for this transaction."
            .to_string()
    } else if error.contains("nonce too low") {
        "Transaction failed: Nonce too low. This usually means another transaction was already mined with this nonce.".to_string()
    } else if error.contains("replacement transaction underpriced") {
        "Transaction failed: Gas price too low to replace pending transaction. Increase the gas price.".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Network error: Cannot connect to RPC endpoint. Check your internet connection and RPC URL configuration.".to_string()
    } else if error.contains("timeout") {
        "Network error: Request timed out. The RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if error.contains("rate limit") {
        "Rate limit error: Too many requests to the RPC endpoint. Try again in a few moments or use a different endpoint.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}

/// Creates user-friendly error messages for definition lookup failures
pub fn interpret_definition_error(provider: &str, error: &str, contract_address: &str) -> String {
    if error.contains("not verified") || error.contains("404") || error.contains("not found") {
        format!(
            "The contract at {} is not verified on {}. Supply the ABI manually for unverified contracts.",
            contract_address, provider
        )
    } else if error.contains("rate limit") || error.contains("429") {
        format!(
            "{} rate limit reached. Try again in a few moments or configure an API key.",
            provider
        )
    } else if error.contains("invalid API key") || error.contains("Invalid API Key") || error.contains("403") {
        format!("{} rejected the API key. Check the explorer_api_key setting.", provider)
    } else if error.contains("timed out") || error.contains("timeout") {
        format!("Request to {} timed out.", provider)
    } else if error.contains("connection") || error.contains("dns") {
        format!("Cannot connect to {}. Check your internet connection.", provider)
    } else {
        format!("{} lookup failed: {}", provider, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_address() {
        assert!(validate_address("0x742D35cc6435C9c1c72C5e7b18bAb7E1DB7A5D6E").is_ok());
        assert!(validate_address("0x0000000000000000000000000000000000000000").is_ok());

        assert!(validate_address("").is_err());
        assert!(validate_address("not_an_address").is_err());
        assert!(validate_address("0x123").is_err());
        assert!(validate_address("742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err());
        assert!(validate_address("0xgg2d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err());
    }

    #[test]
    fn test_parse_wei() {
        assert_eq!(parse_wei("").unwrap(), U256::ZERO);
        assert_eq!(parse_wei("1000").unwrap(), U256::from(1000u64));
        assert_eq!(parse_wei("0x10").unwrap(), U256::from(16u64));
        assert!(parse_wei("1.5").is_err());
    }

    #[test]
    fn test_classify_submission_error() {
        assert_eq!(
            classify_submission_error("MetaMask: User rejected the request"),
            SubmissionFailure::Rejected
        );
        assert_eq!(
            classify_submission_error("insufficient funds for gas * price + value"),
            SubmissionFailure::InsufficientFunds
        );
        assert_eq!(
            classify_submission_error("server returned: execution reverted: paused"),
            SubmissionFailure::Reverted
        );
        assert_eq!(classify_submission_error("boom"), SubmissionFailure::Other);
    }
}
