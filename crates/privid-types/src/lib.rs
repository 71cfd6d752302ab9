//! Core shared types for the PrivID encrypted-attribute client.
//!
//! This crate defines the data model shared by every other crate in the
//! workspace: EVM addresses, ciphertext handles, the attribute and
//! access-flag records tracked by a session, decryption grants, and the
//! central [`PrivIdError`] type.

pub mod config;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of seconds in one grant-validity day.
pub const SECONDS_PER_DAY: u64 = 86_400;

// ---------------------------------------------------------------------------
// Hex helpers
// ---------------------------------------------------------------------------

/// Decodes an optionally `0x`-prefixed hex string into a fixed-size array.
fn decode_fixed_hex<const N: usize>(s: &str) -> std::result::Result<[u8; N], String> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|_| "invalid hex encoding".to_string())?;
    if bytes.len() != N {
        return Err(format!("expected {N} bytes, got {}", bytes.len()));
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Serde adapter storing byte vectors as `0x`-prefixed hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// EvmAddress
// ---------------------------------------------------------------------------

/// 20-byte EVM account or contract address.
///
/// Ordering is byte-wise, which is what the authorization cache relies on
/// when it normalizes a contract-address set.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EvmAddress([u8; 20]);

impl EvmAddress {
    /// The fixed byte length of an address.
    pub const LEN: usize = 20;

    /// The all-zero address, used by deployment tables for "not deployed".
    pub const ZERO: Self = Self([0u8; 20]);

    /// Creates a new `EvmAddress` from raw bytes.
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns `true` for the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Left-pads the address to a 32-byte ABI word.
    pub fn to_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl From<[u8; 20]> for EvmAddress {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for EvmAddress {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for EvmAddress {
    type Err = PrivIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        decode_fixed_hex::<20>(s)
            .map(Self)
            .map_err(|reason| PrivIdError::InvalidAddress { reason })
    }
}

impl Serialize for EvmAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EvmAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// EncryptedHandle
// ---------------------------------------------------------------------------

/// Opaque 32-byte reference to a ciphertext held by the contract.
///
/// Handles cannot be decoded client-side without a [`DecryptionGrant`].
/// They are immutable once issued; a new submission produces new handles
/// rather than mutating old ones.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EncryptedHandle([u8; 32]);

impl EncryptedHandle {
    /// The fixed byte length of a handle.
    pub const LEN: usize = 32;

    /// The zero handle, returned by the contract for unset slots.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Creates a new `EncryptedHandle` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns `true` if this is the zero (unset) handle.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl From<[u8; 32]> for EncryptedHandle {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for EncryptedHandle {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for EncryptedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for EncryptedHandle {
    type Err = PrivIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        decode_fixed_hex::<32>(s)
            .map(Self)
            .map_err(|reason| PrivIdError::InvalidHandle { reason })
    }
}

impl Serialize for EncryptedHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EncryptedHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// TxHash
// ---------------------------------------------------------------------------

/// Hash of a submitted transaction, used to await its confirmation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TxHash([u8; 32]);

impl TxHash {
    /// Creates a new `TxHash` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// ChainId
// ---------------------------------------------------------------------------

/// Numeric EVM chain identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(u64);

impl ChainId {
    /// Creates a `ChainId` from its numeric value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Parses the hex form wallets deliver in `eth_chainId` replies and
    /// `chainChanged` events (e.g. `"0x7a69"`).
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| PrivIdError::ConfigError {
                reason: format!("chain id '{trimmed}' is not 0x-prefixed"),
            })?;
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|e| PrivIdError::ConfigError {
                reason: format!("invalid chain id '{trimmed}': {e}"),
            })
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AttributeSet
// ---------------------------------------------------------------------------

/// The three attribute handles currently stored on-chain for a user.
///
/// Becomes stale as soon as a new submission is mined; the session
/// manager refreshes it explicitly after every confirmed submission.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    /// Handle of the encrypted age (`euint8`).
    pub age: EncryptedHandle,
    /// Handle of the encrypted region code (`euint8`).
    pub region: EncryptedHandle,
    /// Handle of the encrypted KYC status (`ebool`).
    pub kyc: EncryptedHandle,
}

impl AttributeSet {
    /// Builds an `AttributeSet` from the contract accessor's tuple.
    ///
    /// Returns `None` when any slot is the zero handle, which is how the
    /// contract reports a user with no stored attributes.
    pub fn from_handles(handles: [EncryptedHandle; 3]) -> Option<Self> {
        if handles.iter().any(EncryptedHandle::is_zero) {
            return None;
        }
        Some(Self {
            age: handles[0],
            region: handles[1],
            kyc: handles[2],
        })
    }

    /// Returns the handles in contract order (age, region, kyc).
    pub fn handles(&self) -> [EncryptedHandle; 3] {
        [self.age, self.region, self.kyc]
    }
}

// ---------------------------------------------------------------------------
// AccessFlagPair / ClearResult / AccessFlags
// ---------------------------------------------------------------------------

/// Pair of encrypted booleans produced by the on-chain access computation.
///
/// The contract keeps only the most recent pair per caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccessFlagPair {
    /// `accessA`: the user is an adult.
    pub access_a: EncryptedHandle,
    /// `accessB`: the user's region matches the comparison input.
    pub access_b: EncryptedHandle,
}

impl AccessFlagPair {
    /// Builds a pair from the contract accessor's tuple, or `None` if the
    /// caller has never run the computation.
    pub fn from_handles(handles: [EncryptedHandle; 2]) -> Option<Self> {
        if handles.iter().any(EncryptedHandle::is_zero) {
            return None;
        }
        Some(Self {
            access_a: handles[0],
            access_b: handles[1],
        })
    }
}

/// A decrypted boolean together with the handle it was decrypted from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClearResult {
    /// Ciphertext handle the value came from.
    pub handle: EncryptedHandle,
    /// Decoded cleartext.
    pub value: bool,
}

/// Decrypted access flags for the last computation.
///
/// Always replaced as a unit; a session never holds a new `is_adult`
/// alongside a stale `is_region`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccessFlags {
    /// The encrypted pair that was decrypted.
    pub pair: AccessFlagPair,
    /// Decrypted `accessA`.
    pub is_adult: ClearResult,
    /// Decrypted `accessB`.
    pub is_region: ClearResult,
}

// ---------------------------------------------------------------------------
// DecryptionGrant
// ---------------------------------------------------------------------------

/// Private half of the ephemeral decryption key pair.
///
/// Zeroized on drop and never printed.
#[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct GrantSecret(Vec<u8>);

impl GrantSecret {
    /// Wraps raw key bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for GrantSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GrantSecret(<redacted>)")
    }
}

impl Serialize for GrantSecret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        hex_bytes::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for GrantSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        hex_bytes::deserialize(deserializer).map(Self)
    }
}

/// Time-boxed, signed capability authorizing decryption of ciphertexts
/// held by a specific contract set, for a specific user.
///
/// `contract_addresses` is always sorted and deduplicated. The grant is
/// valid while `start_timestamp <= now < start_timestamp + duration`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DecryptionGrant {
    /// Ephemeral private key the coprocessor re-encrypts results for.
    pub private_key: GrantSecret,
    /// Ephemeral public key, covered by the signature.
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// The user's signature over the EIP-712 authorization payload.
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    /// Contracts whose ciphertexts may be decrypted.
    pub contract_addresses: Vec<EvmAddress>,
    /// Account that signed the authorization.
    pub user_address: EvmAddress,
    /// Window start, unix seconds.
    pub start_timestamp: u64,
    /// Window length in days.
    pub duration_days: u32,
}

impl DecryptionGrant {
    /// Unix second at which the grant stops being valid.
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(u64::from(self.duration_days).saturating_mul(SECONDS_PER_DAY))
    }

    /// Returns `true` if `now` falls inside the validity window.
    pub fn is_valid_at(&self, now: u64) -> bool {
        now >= self.start_timestamp && now < self.expires_at()
    }

    /// Returns `true` if `contract` is in the authorized set.
    pub fn authorizes(&self, contract: &EvmAddress) -> bool {
        self.contract_addresses.contains(contract)
    }
}

// ---------------------------------------------------------------------------
// SessionPhase / StatusMessage
// ---------------------------------------------------------------------------

/// State of a session manager's single-operation state machine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No operation in flight; gated operations are accepted.
    #[default]
    Idle,
    /// An attribute submission is in flight.
    Submitting,
    /// An access-flag computation and decryption is in flight.
    ComputingAndDecrypting,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Submitting => write!(f, "submitting"),
            Self::ComputingAndDecrypting => write!(f, "computing_and_decrypting"),
        }
    }
}

/// Severity of a status line shown to the user.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    /// Neutral progress information.
    Info,
    /// An operation completed.
    Success,
    /// An operation could not start (missing signer, no attributes, ...).
    Warning,
    /// An operation failed part-way.
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Human-readable status published by the session for the UI.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Severity.
    pub kind: StatusKind,
    /// Message text.
    pub text: String,
}

impl StatusMessage {
    /// Creates a status line.
    pub fn new(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// PrivIdError
// ---------------------------------------------------------------------------

/// Central error type for the PrivID client.
///
/// Every variant is a local, recoverable condition. The session manager
/// turns each into a status line and returns to idle.
#[derive(Debug, Error)]
pub enum PrivIdError {
    /// The FHE capability instance (or the signer feeding it) is absent.
    #[error("FHE capability unavailable")]
    NoCapability,

    /// No authenticated wallet account can sign or send transactions.
    #[error("no signer available: connect a wallet account first")]
    NoSigner,

    /// Decryption was requested before any attributes were submitted.
    #[error("no attributes on-chain yet: submit attributes first")]
    NoAttributes,

    /// The user rejected the signature prompt or the signing RPC failed.
    #[error("signature denied: {reason}")]
    SignatureDenied {
        /// Human-readable description of the rejection.
        reason: String,
    },

    /// A decryption grant could not be obtained or does not cover the
    /// requested contract.
    #[error("decryption authorization denied: {reason}")]
    AuthorizationDenied {
        /// Human-readable description of the authorization failure.
        reason: String,
    },

    /// Ciphertext or validity-proof construction failed.
    #[error("proof construction failed: {reason}")]
    ProofConstructionFailed {
        /// Human-readable description of the encryption failure.
        reason: String,
    },

    /// The chain rejected or reverted a transaction, or the confirmation
    /// wait failed.
    #[error("transaction failed: {reason}")]
    TransactionFailed {
        /// Human-readable description of the transaction failure.
        reason: String,
    },

    /// The coprocessor refused or failed an authorized decryption.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Human-readable description of the decryption failure.
        reason: String,
    },

    /// A decrypted value had a representation that cannot be read as a
    /// boolean.
    #[error("invalid clear value: {reason}")]
    InvalidClearValue {
        /// Human-readable description of the offending value.
        reason: String,
    },

    /// An address is malformed or an address list is unusable.
    #[error("invalid address: {reason}")]
    InvalidAddress {
        /// Human-readable description of why the address is invalid.
        reason: String,
    },

    /// A ciphertext handle is malformed.
    #[error("invalid handle: {reason}")]
    InvalidHandle {
        /// Human-readable description of why the handle is invalid.
        reason: String,
    },

    /// No contract deployment is known for the connected chain.
    #[error("contract not deployed on chain {chain_id}")]
    NotDeployed {
        /// The chain that has no deployment.
        chain_id: ChainId,
    },

    /// A cryptographic primitive failed.
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// A grant store operation failed.
    #[error("storage error: {reason}")]
    StorageError {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`PrivIdError`].
pub type Result<T> = std::result::Result<T, PrivIdError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
