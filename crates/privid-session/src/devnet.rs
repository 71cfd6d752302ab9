//! In-process development network.
//!
//! [`Devnet`] simulates the PrivID contract and the FHE coprocessor in
//! memory. Ciphertexts are opaque handles backed by a table of clear
//! values; every handle carries an access list, and decryption requires
//! a grant whose EIP-712 signature recovers to the requesting user.
//!
//! Test hooks let callers hold confirmations, revert the next
//! transaction, fail the next encryption, and choose how cleartexts are
//! encoded in decryption responses.
//!
//! Ciphertexts superseded by a later submission or computation are
//! dropped. Receipts are kept for the life of the devnet.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use privid_crypto::hash::keccak256_concat;
use privid_crypto::signing::{recover_address, EvmKeypair};
use privid_crypto::typed_data::{DecryptRequest, Eip712Domain};
use privid_types::{ChainId, EncryptedHandle, EvmAddress, GrantSecret, PrivIdError, Result, TxHash};
use tokio::sync::watch;

use crate::authorization::{Clock, SystemClock};
use crate::capability::{
    EncryptedBundle, EncryptedInput, EphemeralKeypair, FheCapability, PlainValue,
    UserDecryptRequest,
};
use crate::contract::{ContractBinding, TxReceipt};
use crate::decode::ClearValue;
use crate::deployments::Deployment;
use crate::BoxFuture;

/// Adult threshold evaluated by the contract.
pub const ADULT_AGE: u8 = 18;

/// EIP-712 domain name of the simulated decryption verifier.
pub const DOMAIN_NAME: &str = "Decryption";

/// EIP-712 domain version of the simulated decryption verifier.
pub const DOMAIN_VERSION: &str = "1";

fn derive_address(label: &[u8], chain: ChainId) -> EvmAddress {
    let digest = keccak256_concat(&[label, &chain.value().to_be_bytes()]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    EvmAddress::new(address)
}

fn reverted(reason: &str) -> PrivIdError {
    PrivIdError::TransactionFailed {
        reason: format!("execution reverted: {reason}"),
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Representation used for cleartexts in decryption responses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ClearEncoding {
    #[default]
    Bool,
    Integer,
    /// Decimal string.
    Text,
    /// Single raw byte; not decodable as a boolean.
    Bytes,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum CipherKind {
    U8,
    Bool,
}

#[derive(Clone, Debug)]
struct Ciphertext {
    kind: CipherKind,
    value: u8,
    /// `(contract, user)` an input ciphertext was encrypted for.
    origin: Option<(EvmAddress, EvmAddress)>,
    allowed: BTreeSet<EvmAddress>,
}

#[derive(Default)]
struct DevnetState {
    ciphertexts: HashMap<EncryptedHandle, Ciphertext>,
    attributes: HashMap<EvmAddress, [EncryptedHandle; 3]>,
    last_flags: HashMap<EvmAddress, [EncryptedHandle; 2]>,
    receipts: HashMap<TxHash, TxReceipt>,
    nonce: u64,
    block_number: u64,
    transactions_sent: usize,
    decrypt_requests: usize,
    revert_next: bool,
    fail_next_encryption: bool,
    clear_encoding: ClearEncoding,
}

impl DevnetState {
    fn next_nonce(&mut self) -> u64 {
        self.nonce += 1;
        self.nonce
    }

    fn new_handle(&mut self, chain: ChainId) -> EncryptedHandle {
        let nonce = self.next_nonce();
        EncryptedHandle::new(keccak256_concat(&[
            b"privid-devnet-handle",
            &chain.value().to_be_bytes(),
            &nonce.to_be_bytes(),
        ]))
    }

    fn new_tx_hash(&mut self, chain: ChainId) -> TxHash {
        let nonce = self.next_nonce();
        TxHash::new(keccak256_concat(&[
            b"privid-devnet-tx",
            &chain.value().to_be_bytes(),
            &nonce.to_be_bytes(),
        ]))
    }

    /// Drops ciphertexts that a later transaction superseded.
    fn forget(&mut self, handles: &[EncryptedHandle]) {
        for handle in handles {
            self.ciphertexts.remove(handle);
        }
    }

    fn value_of(&self, handle: &EncryptedHandle) -> Result<u8> {
        self.ciphertexts
            .get(handle)
            .map(|ct| ct.value)
            .ok_or_else(|| reverted("unknown ciphertext"))
    }

    /// Checks that `handles` were encrypted together for `(contract,
    /// caller)` with the expected kinds and that `proof` attests to them.
    fn verify_input(
        &self,
        contract: EvmAddress,
        caller: EvmAddress,
        handles: &[EncryptedHandle],
        kinds: &[CipherKind],
        proof: &[u8],
    ) -> Result<()> {
        if proof != input_proof(contract, caller, handles).as_slice() {
            return Err(reverted("invalid input proof"));
        }
        for (handle, kind) in handles.iter().zip(kinds) {
            let ct = self
                .ciphertexts
                .get(handle)
                .ok_or_else(|| reverted("unknown input handle"))?;
            if ct.origin != Some((contract, caller)) {
                return Err(reverted("input not bound to caller"));
            }
            if ct.kind != *kind {
                return Err(reverted("input type mismatch"));
            }
        }
        Ok(())
    }

    fn allow(&mut self, handle: &EncryptedHandle, accounts: &[EvmAddress]) {
        if let Some(ct) = self.ciphertexts.get_mut(handle) {
            ct.allowed.extend(accounts.iter().copied());
        }
    }

    /// Records a mined transaction. Returns `false` if it reverted.
    fn mine(&mut self, tx_hash: TxHash) -> bool {
        self.transactions_sent += 1;
        self.block_number += 1;
        let success = !std::mem::take(&mut self.revert_next);
        self.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                success,
                block_number: self.block_number,
            },
        );
        success
    }
}

fn input_proof(contract: EvmAddress, user: EvmAddress, handles: &[EncryptedHandle]) -> Vec<u8> {
    let mut parts: Vec<&[u8]> = vec![
        b"privid-devnet-input-proof".as_slice(),
        contract.as_bytes().as_slice(),
        user.as_bytes().as_slice(),
    ];
    parts.extend(handles.iter().map(|h| h.as_bytes().as_slice()));
    keccak256_concat(&parts).to_vec()
}

// ---------------------------------------------------------------------------
// Devnet
// ---------------------------------------------------------------------------

/// Simulated chain hosting one PrivID contract and its coprocessor.
pub struct Devnet {
    chain_id: ChainId,
    contract_address: EvmAddress,
    verifier_address: EvmAddress,
    clock: Arc<dyn Clock>,
    state: Mutex<DevnetState>,
    hold_tx: watch::Sender<bool>,
}

impl Devnet {
    /// Creates a devnet on `chain_id` using wall-clock time.
    pub fn new(chain_id: ChainId) -> Arc<Self> {
        Self::with_clock(chain_id, Arc::new(SystemClock))
    }

    /// Creates a devnet whose grant checks use `clock`.
    pub fn with_clock(chain_id: ChainId, clock: Arc<dyn Clock>) -> Arc<Self> {
        let (hold_tx, _) = watch::channel(false);
        let devnet = Self {
            chain_id,
            contract_address: derive_address(b"privid-devnet-contract", chain_id),
            verifier_address: derive_address(b"privid-devnet-decryption", chain_id),
            clock,
            state: Mutex::new(DevnetState::default()),
            hold_tx,
        };
        tracing::debug!(
            %chain_id,
            contract = %devnet.contract_address,
            "devnet started"
        );
        Arc::new(devnet)
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Address of the simulated PrivID contract.
    pub fn contract_address(&self) -> EvmAddress {
        self.contract_address
    }

    /// Deployment record for the simulated contract.
    pub fn deployment(&self) -> Deployment {
        Deployment {
            address: self.contract_address,
            chain_id: self.chain_id,
            chain_name: "devnet".into(),
        }
    }

    /// FHE capability backed by this devnet.
    pub fn capability(self: &Arc<Self>) -> DevnetCapability {
        DevnetCapability {
            devnet: Arc::clone(self),
        }
    }

    /// Contract binding able to send transactions.
    pub fn contract(self: &Arc<Self>) -> DevnetContract {
        DevnetContract {
            devnet: Arc::clone(self),
            writable: true,
        }
    }

    /// Contract binding limited to reads.
    pub fn read_only_contract(self: &Arc<Self>) -> DevnetContract {
        DevnetContract {
            devnet: Arc::clone(self),
            writable: false,
        }
    }

    // -- Test hooks -------------------------------------------------------

    /// Number of transactions mined so far, reverted ones included.
    pub fn transactions_sent(&self) -> usize {
        self.lock().transactions_sent
    }

    /// Number of decryption requests received.
    pub fn decrypt_requests(&self) -> usize {
        self.lock().decrypt_requests
    }

    /// Makes the next transaction revert.
    pub fn revert_next_transaction(&self) {
        self.lock().revert_next = true;
    }

    /// Makes the next encryption fail.
    pub fn fail_next_encryption(&self) {
        self.lock().fail_next_encryption = true;
    }

    pub fn set_clear_encoding(&self, encoding: ClearEncoding) {
        self.lock().clear_encoding = encoding;
    }

    /// Holds all confirmations until [`release_confirmations`](Self::release_confirmations).
    pub fn hold_confirmations(&self) {
        self.hold_tx.send_replace(true);
    }

    pub fn release_confirmations(&self) {
        self.hold_tx.send_replace(false);
    }

    // -- Internal ---------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, DevnetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn domain(&self) -> Eip712Domain {
        Eip712Domain {
            name: DOMAIN_NAME.into(),
            version: DOMAIN_VERSION.into(),
            chain_id: self.chain_id,
            verifying_contract: self.verifier_address,
        }
    }

    fn encrypt_input(&self, input: &EncryptedInput) -> Result<EncryptedBundle> {
        let mut state = self.lock();
        if std::mem::take(&mut state.fail_next_encryption) {
            return Err(PrivIdError::ProofConstructionFailed {
                reason: "coprocessor rejected the input".into(),
            });
        }
        if input.is_empty() {
            return Err(PrivIdError::ProofConstructionFailed {
                reason: "input has no values".into(),
            });
        }
        if input.contract().is_zero() || input.user().is_zero() {
            return Err(PrivIdError::ProofConstructionFailed {
                reason: "input must be bound to a contract and a user".into(),
            });
        }

        let origin = Some((input.contract(), input.user()));
        let mut handles = Vec::with_capacity(input.len());
        for value in input.values() {
            let (kind, value) = match *value {
                PlainValue::U8(v) => (CipherKind::U8, v),
                PlainValue::Bool(b) => (CipherKind::Bool, u8::from(b)),
            };
            let handle = state.new_handle(self.chain_id);
            state.ciphertexts.insert(
                handle,
                Ciphertext {
                    kind,
                    value,
                    origin,
                    allowed: BTreeSet::new(),
                },
            );
            handles.push(handle);
        }

        let input_proof = input_proof(input.contract(), input.user(), &handles);
        tracing::debug!(count = handles.len(), user = %input.user(), "devnet encrypted input");
        Ok(EncryptedBundle {
            handles,
            input_proof,
        })
    }

    fn decrypt(&self, request: &UserDecryptRequest) -> Result<HashMap<EncryptedHandle, ClearValue>> {
        let grant = &request.grant;
        let mut state = self.lock();
        state.decrypt_requests += 1;

        if !grant.is_valid_at(self.clock.now()) {
            return Err(PrivIdError::DecryptionFailed {
                reason: "grant is outside its validity window".into(),
            });
        }

        let signed = DecryptRequest {
            public_key: grant.public_key.clone(),
            contract_addresses: grant.contract_addresses.clone(),
            start_timestamp: grant.start_timestamp,
            duration_days: grant.duration_days,
        };
        let digest = signed.signing_digest(&self.domain());
        let signer = recover_address(&digest, &grant.signature).map_err(|e| {
            PrivIdError::DecryptionFailed {
                reason: format!("grant signature invalid: {e}"),
            }
        })?;
        if signer != grant.user_address {
            return Err(PrivIdError::DecryptionFailed {
                reason: format!("grant signed by {signer}, not {}", grant.user_address),
            });
        }

        let ephemeral = EvmKeypair::from_bytes(grant.private_key.as_bytes())?;
        if ephemeral.public_key_compressed() != grant.public_key {
            return Err(PrivIdError::DecryptionFailed {
                reason: "grant key pair does not match".into(),
            });
        }

        let mut out = HashMap::with_capacity(request.handles.len());
        for pair in &request.handles {
            if !grant.authorizes(&pair.contract) {
                return Err(PrivIdError::DecryptionFailed {
                    reason: format!("grant does not cover contract {}", pair.contract),
                });
            }
            let ct = state
                .ciphertexts
                .get(&pair.handle)
                .ok_or_else(|| PrivIdError::DecryptionFailed {
                    reason: format!("unknown handle {}", pair.handle),
                })?;
            if !ct.allowed.contains(&grant.user_address) || !ct.allowed.contains(&pair.contract) {
                return Err(PrivIdError::DecryptionFailed {
                    reason: format!("handle {} is not decryptable by {}", pair.handle, grant.user_address),
                });
            }
            let clear = match state.clear_encoding {
                ClearEncoding::Bool => ClearValue::Bool(ct.value != 0),
                ClearEncoding::Integer => ClearValue::Integer(u128::from(ct.value)),
                ClearEncoding::Text => ClearValue::Text(ct.value.to_string()),
                ClearEncoding::Bytes => ClearValue::Bytes(vec![ct.value]),
            };
            out.insert(pair.handle, clear);
        }
        Ok(out)
    }

    fn submit(
        &self,
        caller: EvmAddress,
        handles: [EncryptedHandle; 3],
        proof: &[u8],
    ) -> Result<TxHash> {
        let contract = self.contract_address;
        let mut state = self.lock();
        state.verify_input(
            contract,
            caller,
            &handles,
            &[CipherKind::U8, CipherKind::U8, CipherKind::Bool],
            proof,
        )?;

        let tx_hash = state.new_tx_hash(self.chain_id);
        if state.mine(tx_hash) {
            for handle in &handles {
                state.allow(handle, &[contract, caller]);
            }
            if let Some(previous) = state.attributes.insert(caller, handles) {
                state.forget(&previous);
            }
            tracing::debug!(%caller, %tx_hash, "devnet stored attributes");
        } else {
            tracing::debug!(%caller, %tx_hash, "devnet reverted submission");
        }
        Ok(tx_hash)
    }

    fn compute(
        &self,
        caller: EvmAddress,
        allowed_region: EncryptedHandle,
        proof: &[u8],
    ) -> Result<TxHash> {
        let contract = self.contract_address;
        let mut state = self.lock();
        state.verify_input(contract, caller, &[allowed_region], &[CipherKind::U8], proof)?;
        let [age, region, _kyc] = *state
            .attributes
            .get(&caller)
            .ok_or_else(|| reverted("no data for caller"))?;

        let is_adult = state.value_of(&age)? >= ADULT_AGE;
        let in_region = state.value_of(&region)? == state.value_of(&allowed_region)?;

        let tx_hash = state.new_tx_hash(self.chain_id);
        if !state.mine(tx_hash) {
            tracing::debug!(%caller, %tx_hash, "devnet reverted computation");
            return Ok(tx_hash);
        }

        let mut flags = [EncryptedHandle::ZERO; 2];
        for (slot, value) in flags.iter_mut().zip([is_adult, in_region]) {
            let handle = state.new_handle(self.chain_id);
            state.ciphertexts.insert(
                handle,
                Ciphertext {
                    kind: CipherKind::Bool,
                    value: u8::from(value),
                    origin: None,
                    allowed: [contract, caller].into_iter().collect(),
                },
            );
            *slot = handle;
        }
        state.forget(&[allowed_region]);
        if let Some(previous) = state.last_flags.insert(caller, flags) {
            state.forget(&previous);
        }
        tracing::debug!(%caller, %tx_hash, "devnet computed access flags");
        Ok(tx_hash)
    }

    fn receipt(&self, tx_hash: TxHash) -> Result<TxReceipt> {
        self.lock()
            .receipts
            .get(&tx_hash)
            .copied()
            .ok_or_else(|| PrivIdError::TransactionFailed {
                reason: format!("unknown transaction {tx_hash}"),
            })
    }
}

// ---------------------------------------------------------------------------
// DevnetCapability
// ---------------------------------------------------------------------------

/// [`FheCapability`] backed by a [`Devnet`].
#[derive(Clone)]
pub struct DevnetCapability {
    devnet: Arc<Devnet>,
}

impl FheCapability for DevnetCapability {
    fn eip712_domain(&self) -> Eip712Domain {
        self.devnet.domain()
    }

    fn generate_keypair(&self) -> Result<EphemeralKeypair> {
        let keypair = EvmKeypair::generate();
        Ok(EphemeralKeypair {
            private_key: GrantSecret::new(keypair.secret_bytes()),
            public_key: keypair.public_key_compressed(),
        })
    }

    fn encrypt(&self, input: EncryptedInput) -> BoxFuture<'_, Result<EncryptedBundle>> {
        Box::pin(async move { self.devnet.encrypt_input(&input) })
    }

    fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> BoxFuture<'_, Result<HashMap<EncryptedHandle, ClearValue>>> {
        Box::pin(async move { self.devnet.decrypt(&request) })
    }
}

// ---------------------------------------------------------------------------
// DevnetContract
// ---------------------------------------------------------------------------

/// [`ContractBinding`] to the contract hosted by a [`Devnet`].
#[derive(Clone)]
pub struct DevnetContract {
    devnet: Arc<Devnet>,
    writable: bool,
}

impl DevnetContract {
    fn ensure_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(PrivIdError::NoSigner)
        }
    }
}

impl ContractBinding for DevnetContract {
    fn address(&self) -> EvmAddress {
        self.devnet.contract_address
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn get_my_attributes(&self, caller: EvmAddress) -> BoxFuture<'_, Result<[EncryptedHandle; 3]>> {
        Box::pin(async move {
            Ok(self
                .devnet
                .lock()
                .attributes
                .get(&caller)
                .copied()
                .unwrap_or([EncryptedHandle::ZERO; 3]))
        })
    }

    fn has_data(&self, user: EvmAddress) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move { Ok(self.devnet.lock().attributes.contains_key(&user)) })
    }

    fn submit_attributes(
        &self,
        caller: EvmAddress,
        handles: [EncryptedHandle; 3],
        input_proof: Vec<u8>,
    ) -> BoxFuture<'_, Result<TxHash>> {
        Box::pin(async move {
            self.ensure_writable()?;
            self.devnet.submit(caller, handles, &input_proof)
        })
    }

    fn compute_access_flags(
        &self,
        caller: EvmAddress,
        allowed_region: EncryptedHandle,
        input_proof: Vec<u8>,
    ) -> BoxFuture<'_, Result<TxHash>> {
        Box::pin(async move {
            self.ensure_writable()?;
            self.devnet.compute(caller, allowed_region, &input_proof)
        })
    }

    fn last_access_flags(&self, caller: EvmAddress) -> BoxFuture<'_, Result<[EncryptedHandle; 2]>> {
        Box::pin(async move {
            Ok(self
                .devnet
                .lock()
                .last_flags
                .get(&caller)
                .copied()
                .unwrap_or([EncryptedHandle::ZERO; 2]))
        })
    }

    fn wait_for_confirmation(&self, tx: TxHash) -> BoxFuture<'_, Result<TxReceipt>> {
        let mut held = self.devnet.hold_tx.subscribe();
        Box::pin(async move {
            held.wait_for(|h| !*h)
                .await
                .map(|_| ())
                .map_err(|_| PrivIdError::TransactionFailed {
                    reason: "devnet stopped".into(),
                })?;
            self.devnet.receipt(tx)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use privid_types::{DecryptionGrant, SECONDS_PER_DAY};

    use super::*;
    use crate::authorization::ManualClock;
    use crate::capability::HandleContractPair;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    const T0: u64 = 1_700_000_000;

    fn user() -> EvmAddress {
        EvmAddress::new([0x42; 20])
    }

    async fn submit(devnet: &Arc<Devnet>, age: u8, region: u8, kyc: bool) -> Result<TxHash> {
        let cap = devnet.capability();
        let contract = devnet.contract();
        let mut input = EncryptedInput::new(devnet.contract_address(), user());
        input.add8(age).add8(region).add_bool(kyc);
        let bundle = cap.encrypt(input).await?;
        let handles = [bundle.handles[0], bundle.handles[1], bundle.handles[2]];
        contract
            .submit_attributes(user(), handles, bundle.input_proof)
            .await
    }

    fn signed_grant(devnet: &Devnet, signer: &EvmKeypair, now: u64) -> Result<DecryptionGrant> {
        let ephemeral = EvmKeypair::generate();
        let request = DecryptRequest {
            public_key: ephemeral.public_key_compressed(),
            contract_addresses: vec![devnet.contract_address()],
            start_timestamp: now,
            duration_days: 1,
        };
        let signature = signer.sign_prehash(&request.signing_digest(&devnet.domain()))?;
        Ok(DecryptionGrant {
            private_key: GrantSecret::new(ephemeral.secret_bytes()),
            public_key: request.public_key,
            signature: signature.to_vec(),
            contract_addresses: request.contract_addresses,
            user_address: signer.address()?,
            start_timestamp: now,
            duration_days: 1,
        })
    }

    #[test]
    fn addresses_are_stable_per_chain() {
        let a = Devnet::new(ChainId::new(31337));
        let b = Devnet::new(ChainId::new(31337));
        let c = Devnet::new(ChainId::new(1));
        assert_eq!(a.contract_address(), b.contract_address());
        assert_ne!(a.contract_address(), c.contract_address());
        assert!(!a.contract_address().is_zero());
        assert_eq!(a.deployment().chain_id, ChainId::new(31337));
    }

    #[tokio::test]
    async fn submission_stores_attributes() -> TestResult {
        let devnet = Devnet::new(ChainId::new(31337));
        let contract = devnet.contract();
        assert!(!contract.has_data(user()).await?);

        let tx = submit(&devnet, 25, 2, true).await?;
        assert!(contract.wait_for_confirmation(tx).await?.success);
        assert!(contract.has_data(user()).await?);
        assert!(contract.get_my_attributes(user()).await?.iter().all(|h| !h.is_zero()));
        assert_eq!(devnet.transactions_sent(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn proof_bound_to_user() -> TestResult {
        let devnet = Devnet::new(ChainId::new(31337));
        let cap = devnet.capability();
        let mut input = EncryptedInput::new(devnet.contract_address(), user());
        input.add8(30).add8(1).add_bool(false);
        let bundle = cap.encrypt(input).await?;
        let handles = [bundle.handles[0], bundle.handles[1], bundle.handles[2]];

        let other = EvmAddress::new([0x43; 20]);
        let result = devnet
            .contract()
            .submit_attributes(other, handles, bundle.input_proof)
            .await;
        assert!(matches!(result, Err(PrivIdError::TransactionFailed { .. })));
        assert_eq!(devnet.transactions_sent(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn read_only_binding_cannot_send() -> TestResult {
        let devnet = Devnet::new(ChainId::new(31337));
        let result = devnet
            .read_only_contract()
            .submit_attributes(user(), [EncryptedHandle::ZERO; 3], Vec::new())
            .await;
        assert!(matches!(result, Err(PrivIdError::NoSigner)));
        Ok(())
    }

    #[tokio::test]
    async fn reverted_submission_changes_nothing() -> TestResult {
        let devnet = Devnet::new(ChainId::new(31337));
        devnet.revert_next_transaction();
        let tx = submit(&devnet, 25, 2, true).await?;
        assert!(!devnet.contract().wait_for_confirmation(tx).await?.success);
        assert!(!devnet.contract().has_data(user()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn compute_without_data_reverts() -> TestResult {
        let devnet = Devnet::new(ChainId::new(31337));
        let mut input = EncryptedInput::new(devnet.contract_address(), user());
        input.add8(2);
        let bundle = devnet.capability().encrypt(input).await?;
        let result = devnet
            .contract()
            .compute_access_flags(user(), bundle.handles[0], bundle.input_proof)
            .await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn failed_encryption_is_one_shot() -> TestResult {
        let devnet = Devnet::new(ChainId::new(31337));
        devnet.fail_next_encryption();
        let mut input = EncryptedInput::new(devnet.contract_address(), user());
        input.add8(1);
        let cap = devnet.capability();
        assert!(matches!(
            cap.encrypt(input.clone()).await,
            Err(PrivIdError::ProofConstructionFailed { .. })
        ));
        assert_eq!(cap.encrypt(input).await?.handles.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn decrypt_checks_signature_window_and_acl() -> TestResult {
        let clock = Arc::new(ManualClock::new(T0));
        let devnet = Devnet::with_clock(ChainId::new(31337), clock.clone());
        let cap = devnet.capability();
        let user_key = EvmKeypair::generate();
        let user = user_key.address()?;

        let mut input = EncryptedInput::new(devnet.contract_address(), user);
        input.add8(20).add8(3).add_bool(true);
        let bundle = cap.encrypt(input).await?;
        let handles = [bundle.handles[0], bundle.handles[1], bundle.handles[2]];
        devnet
            .contract()
            .submit_attributes(user, handles, bundle.input_proof)
            .await?;

        let mut input = EncryptedInput::new(devnet.contract_address(), user);
        input.add8(3);
        let bundle = cap.encrypt(input).await?;
        devnet
            .contract()
            .compute_access_flags(user, bundle.handles[0], bundle.input_proof)
            .await?;
        let [a, b] = devnet.contract().last_access_flags(user).await?;

        let pairs = vec![
            HandleContractPair {
                handle: a,
                contract: devnet.contract_address(),
            },
            HandleContractPair {
                handle: b,
                contract: devnet.contract_address(),
            },
        ];
        let grant = signed_grant(&devnet, &user_key, T0)?;

        let clear = cap
            .user_decrypt(UserDecryptRequest {
                handles: pairs.clone(),
                grant: grant.clone(),
            })
            .await?;
        assert_eq!(clear.get(&a), Some(&ClearValue::Bool(true)));
        assert_eq!(clear.get(&b), Some(&ClearValue::Bool(true)));

        let forged = DecryptionGrant {
            user_address: EvmAddress::new([0x99; 20]),
            ..grant.clone()
        };
        assert!(cap
            .user_decrypt(UserDecryptRequest {
                handles: pairs.clone(),
                grant: forged,
            })
            .await
            .is_err());

        let stranger = signed_grant(&devnet, &EvmKeypair::generate(), T0)?;
        assert!(cap
            .user_decrypt(UserDecryptRequest {
                handles: pairs.clone(),
                grant: stranger,
            })
            .await
            .is_err());

        clock.advance(SECONDS_PER_DAY);
        assert!(cap
            .user_decrypt(UserDecryptRequest {
                handles: pairs,
                grant,
            })
            .await
            .is_err());
        assert_eq!(devnet.decrypt_requests(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn superseded_ciphertexts_are_dropped() -> TestResult {
        let devnet = Devnet::new(ChainId::new(31337));
        let contract = devnet.contract();
        let cap = devnet.capability();

        submit(&devnet, 25, 2, true).await?;
        let first = contract.get_my_attributes(user()).await?;
        submit(&devnet, 30, 4, false).await?;
        assert!(devnet.lock().value_of(&first[0]).is_err());
        assert_eq!(devnet.lock().ciphertexts.len(), 3);

        let mut flags = Vec::new();
        for region in [4, 2] {
            let mut input = EncryptedInput::new(devnet.contract_address(), user());
            input.add8(region);
            let bundle = cap.encrypt(input).await?;
            contract
                .compute_access_flags(user(), bundle.handles[0], bundle.input_proof)
                .await?;
            flags.push(contract.last_access_flags(user()).await?);
        }
        assert!(devnet.lock().value_of(&flags[0][0]).is_err());
        assert_eq!(devnet.lock().value_of(&flags[1][1])?, 0);
        assert_eq!(devnet.lock().ciphertexts.len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn held_confirmation_waits_for_release() -> TestResult {
        let devnet = Devnet::new(ChainId::new(31337));
        devnet.hold_confirmations();
        let tx = submit(&devnet, 25, 2, true).await?;
        let contract = devnet.contract();

        let waiting = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            contract.wait_for_confirmation(tx),
        )
        .await;
        assert!(waiting.is_err());

        devnet.release_confirmations();
        assert!(contract.wait_for_confirmation(tx).await?.success);
        Ok(())
    }
}
