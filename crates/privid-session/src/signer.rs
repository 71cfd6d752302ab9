//! Wallet signing boundary.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use privid_crypto::signing::EvmKeypair;
use privid_crypto::typed_data::{DecryptRequest, Eip712Domain};
use privid_types::{EvmAddress, PrivIdError, Result};

use crate::BoxFuture;

/// An authenticated wallet account able to sign typed data.
pub trait Signer: Send + Sync {
    /// Address of the account.
    fn address(&self) -> EvmAddress;

    /// Presents `message` to the user for an EIP-712 signature and
    /// returns the 65-byte `r || s || v` signature.
    ///
    /// # Errors
    ///
    /// [`PrivIdError::SignatureDenied`] if the user rejects the prompt or
    /// the signing call fails.
    fn sign_typed_data<'a>(
        &'a self,
        domain: &'a Eip712Domain,
        message: &'a DecryptRequest,
    ) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Signer holding its key in process.
///
/// Every call to [`Signer::sign_typed_data`] counts as one signature
/// prompt. Prompts are approved unless approval has been switched off,
/// in which case they fail the way a wallet rejection does.
pub struct LocalSigner {
    keypair: EvmKeypair,
    address: EvmAddress,
    prompts: AtomicUsize,
    approve: AtomicBool,
}

impl LocalSigner {
    /// Wraps an existing keypair.
    pub fn new(keypair: EvmKeypair) -> Result<Self> {
        let address = keypair.address()?;
        Ok(Self {
            keypair,
            address,
            prompts: AtomicUsize::new(0),
            approve: AtomicBool::new(true),
        })
    }

    /// Creates a signer with a fresh random key.
    pub fn random() -> Result<Self> {
        Self::new(EvmKeypair::generate())
    }

    /// Creates a signer from a hex-encoded secret key.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let digits = secret.trim().trim_start_matches("0x");
        let bytes = hex::decode(digits).map_err(|e| PrivIdError::CryptoError {
            reason: format!("invalid secret key hex: {e}"),
        })?;
        Self::new(EvmKeypair::from_bytes(&bytes)?)
    }

    /// Number of signature prompts presented so far.
    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Sets whether future prompts are approved.
    pub fn set_approve(&self, approve: bool) {
        self.approve.store(approve, Ordering::SeqCst);
    }
}

impl Signer for LocalSigner {
    fn address(&self) -> EvmAddress {
        self.address
    }

    fn sign_typed_data<'a>(
        &'a self,
        domain: &'a Eip712Domain,
        message: &'a DecryptRequest,
    ) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            if !self.approve.load(Ordering::SeqCst) {
                tracing::info!(address = %self.address, "signature prompt rejected");
                return Err(PrivIdError::SignatureDenied {
                    reason: "user rejected the request".into(),
                });
            }
            let digest = message.signing_digest(domain);
            let signature = self
                .keypair
                .sign_prehash(&digest)
                .map_err(|e| PrivIdError::SignatureDenied {
                    reason: e.to_string(),
                })?;
            Ok(signature.to_vec())
        })
    }
}
