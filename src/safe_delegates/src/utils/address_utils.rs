//! Address normalization and input validation
//!
//! Addresses arrive as free-form strings from the wallet session and from
//! user input. These helpers turn them into the forms the transaction service
//! expects.
//!
//! # Example
//!
//! ```rust
//! use safe_delegates::utils::address_utils::normalize_address;
//!
//! assert_eq!(normalize_address("abc"), "0xabc");
//! assert_eq!(normalize_address("0xabc"), "0xabc");
//! ```

use alloy_primitives::Address;

use crate::errors::DelegateError;

/// Length of an address in hex digits, without prefix
const ADDRESS_HEX_LEN: usize = 40;

/// Returns the address with exactly one `0x` prefix.
///
/// Any number of leading `0x`/`0X` prefixes is collapsed, so the result never
/// carries a doubled prefix.
pub fn normalize_address(address: &str) -> String {
    let mut rest = address.trim();
    while let Some(stripped) = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
    {
        rest = stripped;
    }
    format!("0x{rest}")
}

/// Validates a user-supplied address and parses it.
///
/// The input must be non-empty and consist of 40 hex digits after
/// normalization. Mixed case is accepted without checksum enforcement.
pub fn parse_address_input(field: &str, input: &str) -> Result<Address, DelegateError> {
    if input.trim().is_empty() {
        return Err(DelegateError::ValidationError(format!("{field} is empty")));
    }

    let normalized = normalize_address(input);
    let digits = &normalized[2..];
    if digits.len() != ADDRESS_HEX_LEN || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DelegateError::ValidationError(format!(
            "{field} is not a 20-byte hex address: {input}"
        )));
    }

    normalized
        .parse()
        .map_err(|e| DelegateError::ValidationError(format!("{field} is invalid: {e}")))
}

/// Parses a Safe address, reporting malformed input as a missing Safe.
///
/// A string that is not an address cannot name a deployed Safe on any chain.
pub fn parse_safe_address(safe: &str) -> Result<Address, DelegateError> {
    parse_address_input("Safe address", safe)
        .map_err(|_| DelegateError::SafeNotFound(safe.to_string()))
}

/// Validates a delegate label, returning it trimmed.
pub fn validate_label(label: &str) -> Result<String, DelegateError> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(DelegateError::ValidationError("label is empty".to_string()));
    }
    Ok(trimmed.to_string())
}
