//! Keccak-256 hashing.
//!
//! Everything the chain sees (addresses, EIP-712 digests, cache keys for
//! contract sets) is hashed with the pre-standard Keccak-256 padding that
//! Ethereum uses.

use privid_types::EvmAddress;
use sha3::{Digest, Keccak256};

/// Computes the Keccak-256 hash of arbitrary data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Computes Keccak-256 over the concatenation of `parts` without
/// allocating an intermediate buffer.
pub fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Hashes an ordered address list as the tight concatenation of the raw
/// 20-byte addresses.
///
/// Callers normalize (sort, dedupe) the list first when the hash must be
/// order-independent.
pub fn address_set_digest(addresses: &[EvmAddress]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for address in addresses {
        hasher.update(address.as_bytes());
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
