#![forbid(unsafe_code)]
//! Textual encoding of physical addresses.
//!
//! Failure payloads carry the missing address as a hex string, sometimes bare
//! (`deadbeef`) and sometimes `0x`-prefixed. Live objects expose their address
//! as a raw 8-byte integer. Both sides are brought to the same textual form,
//! `0x` followed by at least eight lowercase hex digits, before being compared.

use thiserror::Error;

use crate::types::Address;

/// Minimum number of hex digits in an encoded address.
pub const MIN_HEX_DIGITS: usize = 8;

/// Error returned when a failure payload is not a hex address.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum AddressParseError {
    /// Payload was empty after trimming and prefix removal.
    #[error("empty address payload")]
    Empty,
    /// Payload contained a non-hex character.
    #[error("address payload '{0}' is not hexadecimal")]
    NotHex(String),
    /// Payload does not fit in eight bytes.
    #[error("address payload '{0}' exceeds 64 bits")]
    Overflow(String),
}

/// Encodes a raw address as `0x` plus zero-padded lowercase hex.
pub fn encode_address(address: Address) -> String {
    format!("0x{:0width$x}", address.0, width = MIN_HEX_DIGITS)
}

/// Decodes the address carried by a failure payload.
pub fn decode_failure_address(detail: &str) -> Result<Address, AddressParseError> {
    let digits = strip_prefix(detail);
    if digits.is_empty() {
        return Err(AddressParseError::Empty);
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AddressParseError::NotHex(detail.to_string()));
    }
    u64::from_str_radix(digits, 16)
        .map(Address)
        .map_err(|_| AddressParseError::Overflow(detail.to_string()))
}

/// Normalizes a hex string without going through an integer.
///
/// Strips an optional `0x` prefix, lowercases, drops leading zeros and pads
/// back to [`MIN_HEX_DIGITS`]. Agrees with
/// `encode_address(decode_failure_address(s)?)` for every well-formed `s`.
pub fn normalize_hex(raw: &str) -> Result<String, AddressParseError> {
    let digits = strip_prefix(raw);
    if digits.is_empty() {
        return Err(AddressParseError::Empty);
    }
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AddressParseError::NotHex(raw.to_string()));
    }
    let significant = digits.trim_start_matches('0').to_ascii_lowercase();
    if significant.len() > 16 {
        return Err(AddressParseError::Overflow(raw.to_string()));
    }
    Ok(format!("0x{significant:0>width$}", width = MIN_HEX_DIGITS))
}

/// True when the address in a failure payload names `live`.
///
/// Both sides are compared in their encoded textual form.
pub fn addresses_match(detail: &str, live: Address) -> Result<bool, AddressParseError> {
    let failed = decode_failure_address(detail)?;
    Ok(encode_address(failed) == encode_address(live))
}

fn strip_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
}
