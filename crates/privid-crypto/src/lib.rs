//! Cryptographic primitives for the PrivID client.
//!
//! Every hash, signature and cipher call in the workspace goes through
//! this crate.
//!
//! # Modules
//!
//! - [`hash`]: Keccak-256 and SHA3-256
//! - [`signing`]: secp256k1 EVM keypairs, recoverable signatures, addresses
//! - [`typed_data`]: EIP-712 digests for decryption authorizations
//! - [`aead`]: XChaCha20-Poly1305 sealing of stored records
//! - [`mac`]: HMAC-SHA256 record tags
//! - [`hkdf`]: HKDF-SHA256 subkey derivation

pub mod aead;
pub mod hash;
pub mod hkdf;
pub mod mac;
pub mod signing;
pub mod typed_data;
