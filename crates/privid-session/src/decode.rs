//! Decoding of decrypted values into booleans.
//!
//! The coprocessor reports cleartexts in whatever representation its
//! transport produced: a native boolean, an integer, or a numeric string.
//! Anything that cannot be read unambiguously as a boolean is rejected
//! rather than guessed at.

use std::fmt;

use privid_types::{PrivIdError, Result};
use serde::{Deserialize, Serialize};

/// A decrypted value as delivered by the coprocessor.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ClearValue {
    Bool(bool),
    Integer(u128),
    Text(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for ClearValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

/// Decodes a decrypted value as a boolean.
///
/// - `Bool(b)` is `b`.
/// - `Integer(n)` is `n != 0`.
/// - `Text` accepts `"true"`, `"false"`, a decimal number, or a
///   `0x`-prefixed hex number; numbers are `true` when non-zero.
///
/// # Errors
///
/// [`PrivIdError::InvalidClearValue`] for empty or non-numeric text and
/// for raw bytes.
pub fn decode_clear_bool(value: &ClearValue) -> Result<bool> {
    match value {
        ClearValue::Bool(b) => Ok(*b),
        ClearValue::Integer(n) => Ok(*n != 0),
        ClearValue::Text(text) => decode_text(text),
        ClearValue::Bytes(bytes) => Err(PrivIdError::InvalidClearValue {
            reason: format!("raw bytes ({} bytes) are not a boolean", bytes.len()),
        }),
    }
}

fn decode_text(text: &str) -> Result<bool> {
    let trimmed = text.trim();
    match trimmed {
        "true" => return Ok(true),
        "false" => return Ok(false),
        _ => {}
    }

    let (digits, radix_ok): (&str, fn(char) -> bool) =
        match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            Some(hex_digits) => (hex_digits, |c: char| c.is_ascii_hexdigit()),
            None => (trimmed, |c: char| c.is_ascii_digit()),
        };

    if digits.is_empty() || !digits.chars().all(radix_ok) {
        return Err(PrivIdError::InvalidClearValue {
            reason: format!("text {text:?} is not a boolean or number"),
        });
    }
    // Magnitude is irrelevant, only zero versus non-zero.
    Ok(digits.chars().any(|c| c != '0'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
