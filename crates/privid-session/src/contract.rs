//! Typed surface of the on-chain PrivID contract.

use privid_types::{EncryptedHandle, EvmAddress, Result, TxHash};

use crate::BoxFuture;

/// Outcome of a mined transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    /// `false` if the transaction was mined but reverted.
    pub success: bool,
    pub block_number: u64,
}

/// Read/write binding to a deployed PrivID contract.
///
/// A binding is *writable* when it is connected to an account that can
/// send transactions; read-only bindings reject the transaction methods
/// with [`privid_types::PrivIdError::NoSigner`].
pub trait ContractBinding: Send + Sync {
    /// Address the binding talks to.
    fn address(&self) -> EvmAddress;

    /// Whether transactions can be sent through this binding.
    fn is_writable(&self) -> bool;

    /// `getMyAttributes()` as seen by `caller`: handles of age, region
    /// and KYC, all zero if nothing was submitted.
    fn get_my_attributes(&self, caller: EvmAddress) -> BoxFuture<'_, Result<[EncryptedHandle; 3]>>;

    /// `hasData(user)`.
    fn has_data(&self, user: EvmAddress) -> BoxFuture<'_, Result<bool>>;

    /// Sends `submitAttributes(age, region, kyc, inputProof)`.
    fn submit_attributes(
        &self,
        caller: EvmAddress,
        handles: [EncryptedHandle; 3],
        input_proof: Vec<u8>,
    ) -> BoxFuture<'_, Result<TxHash>>;

    /// Sends `computeAccessFlagsEnc(allowedRegion, inputProof)`.
    fn compute_access_flags(
        &self,
        caller: EvmAddress,
        allowed_region: EncryptedHandle,
        input_proof: Vec<u8>,
    ) -> BoxFuture<'_, Result<TxHash>>;

    /// `getMyLastFlagsEnc()` as seen by `caller`: the most recent
    /// `(accessA, accessB)` pair, all zero if none was computed.
    fn last_access_flags(&self, caller: EvmAddress) -> BoxFuture<'_, Result<[EncryptedHandle; 2]>>;

    /// Waits until `tx` is mined and returns its receipt.
    fn wait_for_confirmation(&self, tx: TxHash) -> BoxFuture<'_, Result<TxReceipt>>;
}
