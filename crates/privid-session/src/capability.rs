//! FHE capability boundary: ciphertext construction and authorized
//! decryption.
//!
//! The homomorphic scheme itself is opaque to the client. What the client
//! needs is an [`EncryptedInput`] builder whose values are bound to one
//! contract and one user, and a way to decrypt handles under a
//! [`DecryptionGrant`].

use std::collections::HashMap;

use privid_crypto::typed_data::Eip712Domain;
use privid_types::{DecryptionGrant, EncryptedHandle, EvmAddress, GrantSecret, Result};

use crate::decode::ClearValue;
use crate::BoxFuture;

// ---------------------------------------------------------------------------
// EncryptedInput
// ---------------------------------------------------------------------------

/// A cleartext value queued for encryption.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlainValue {
    /// 8-bit unsigned integer (`euint8`).
    U8(u8),
    /// Boolean (`ebool`).
    Bool(bool),
}

/// Builder for a batch of values encrypted together under one proof.
///
/// The proof binds every handle to `contract` and `user`; the contract
/// rejects the batch if it is submitted by anyone else. Values keep the
/// order in which they were added, which is the order the contract
/// expects its arguments in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedInput {
    contract: EvmAddress,
    user: EvmAddress,
    values: Vec<PlainValue>,
}

impl EncryptedInput {
    /// Starts an empty input bound to `contract` and `user`.
    pub fn new(contract: EvmAddress, user: EvmAddress) -> Self {
        Self {
            contract,
            user,
            values: Vec::new(),
        }
    }

    /// Appends an 8-bit value.
    pub fn add8(&mut self, value: u8) -> &mut Self {
        self.values.push(PlainValue::U8(value));
        self
    }

    /// Appends a boolean.
    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        self.values.push(PlainValue::Bool(value));
        self
    }

    /// Contract the input is bound to.
    pub fn contract(&self) -> EvmAddress {
        self.contract
    }

    /// User the input is bound to.
    pub fn user(&self) -> EvmAddress {
        self.user
    }

    /// Queued values in insertion order.
    pub fn values(&self) -> &[PlainValue] {
        &self.values
    }

    /// Number of queued values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of encrypting an [`EncryptedInput`]: one handle per value, in
/// order, plus the validity proof the contract checks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptedBundle {
    pub handles: Vec<EncryptedHandle>,
    pub input_proof: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Decryption
// ---------------------------------------------------------------------------

/// Ephemeral key pair a decryption grant is issued for.
#[derive(Clone, Debug)]
pub struct EphemeralKeypair {
    pub private_key: GrantSecret,
    pub public_key: Vec<u8>,
}

/// A handle together with the contract that holds it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct HandleContractPair {
    pub handle: EncryptedHandle,
    pub contract: EvmAddress,
}

/// Request to decrypt a set of handles for the grant's user.
#[derive(Clone, Debug)]
pub struct UserDecryptRequest {
    pub handles: Vec<HandleContractPair>,
    pub grant: DecryptionGrant,
}

// ---------------------------------------------------------------------------
// FheCapability
// ---------------------------------------------------------------------------

/// Client-side access to the FHE coprocessor.
pub trait FheCapability: Send + Sync {
    /// EIP-712 domain decryption grants are signed under.
    fn eip712_domain(&self) -> Eip712Domain;

    /// Generates a fresh ephemeral key pair for a decryption grant.
    ///
    /// # Errors
    ///
    /// [`privid_types::PrivIdError::CryptoError`] if key generation fails.
    fn generate_keypair(&self) -> Result<EphemeralKeypair>;

    /// Encrypts `input` and produces its validity proof.
    ///
    /// # Errors
    ///
    /// [`privid_types::PrivIdError::ProofConstructionFailed`] if the
    /// ciphertexts or the proof cannot be built.
    fn encrypt(&self, input: EncryptedInput) -> BoxFuture<'_, Result<EncryptedBundle>>;

    /// Decrypts every handle in `request` under its grant.
    ///
    /// # Errors
    ///
    /// [`privid_types::PrivIdError::DecryptionFailed`] if the grant is
    /// rejected or a handle is not decryptable by the grant's user.
    fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> BoxFuture<'_, Result<HashMap<EncryptedHandle, ClearValue>>>;
}
