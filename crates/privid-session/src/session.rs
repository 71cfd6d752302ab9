//! Encrypted session manager.
//!
//! The [`SessionManager`] owns one user's view of the contract: the
//! current attribute handles, the last decrypted access flags, and a
//! status line. It runs at most one gated operation at a time.
//!
//! # State machine
//!
//! ```text
//! Idle ──submit_attributes()──────────────▶ Submitting ──────────────▶ Idle
//! Idle ──compute_and_decrypt_access_flags()──▶ ComputingAndDecrypting ──▶ Idle
//! ```
//!
//! A gated call made while another is in flight returns `Ok(None)`
//! without side effects. The phase is released on every exit path,
//! including when the caller drops the future.
//!
//! Readers observe state through [`SessionManager::subscribe`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use privid_storage::GrantStore;
use privid_types::config::AppConfig;
use privid_types::{
    AccessFlagPair, AccessFlags, AttributeSet, ClearResult, EncryptedHandle, EvmAddress,
    PrivIdError, Result, SessionPhase, StatusKind, StatusMessage, TxHash,
};
use tokio::sync::watch;

use crate::authorization::{load_or_sign, Clock, GrantPolicy};
use crate::capability::{EncryptedInput, FheCapability, HandleContractPair, UserDecryptRequest};
use crate::contract::{ContractBinding, TxReceipt};
use crate::decode::decode_clear_bool;
use crate::signer::Signer;

/// Status text after a confirmed submission.
pub const SUBMIT_COMPLETED: &str = "Submit completed";

/// Status text after a successful decryption.
pub const DECRYPTION_COMPLETED: &str = "Decryption completed";

// ---------------------------------------------------------------------------
// Phase encoding
// ---------------------------------------------------------------------------

const PHASE_IDLE: u8 = 0;
const PHASE_SUBMITTING: u8 = 1;
const PHASE_COMPUTING: u8 = 2;

fn phase_code(phase: SessionPhase) -> u8 {
    match phase {
        SessionPhase::Idle => PHASE_IDLE,
        SessionPhase::Submitting => PHASE_SUBMITTING,
        SessionPhase::ComputingAndDecrypting => PHASE_COMPUTING,
    }
}

fn phase_from_code(code: u8) -> SessionPhase {
    match code {
        PHASE_SUBMITTING => SessionPhase::Submitting,
        PHASE_COMPUTING => SessionPhase::ComputingAndDecrypting,
        _ => SessionPhase::Idle,
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of a session, published on every change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    /// `None` until a refresh finds attributes on-chain.
    pub attributes: Option<AttributeSet>,
    /// `None` until the first successful decryption.
    pub access_flags: Option<AccessFlags>,
    pub status: Option<StatusMessage>,
}

/// Result of a confirmed attribute submission.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubmitOutcome {
    pub tx_hash: TxHash,
    /// Attributes read back after confirmation.
    pub attributes: Option<AttributeSet>,
}

// ---------------------------------------------------------------------------
// PhaseGuard
// ---------------------------------------------------------------------------

/// Holds the session phase while a gated operation runs and resets it
/// to `Idle` on drop.
struct PhaseGuard<'a> {
    session: &'a SessionManager,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.session.phase.store(PHASE_IDLE, Ordering::SeqCst);
        self.session
            .state_tx
            .send_modify(|s| s.phase = SessionPhase::Idle);
    }
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Orchestrates submission, access computation and decryption for one
/// user against one contract.
pub struct SessionManager {
    contract: Arc<dyn ContractBinding>,
    capability: Option<Arc<dyn FheCapability>>,
    signer: Option<Arc<dyn Signer>>,
    store: Arc<dyn GrantStore>,
    policy: GrantPolicy,
    confirmation_timeout: Option<Duration>,
    phase: AtomicU8,
    state_tx: watch::Sender<SessionSnapshot>,
}

impl SessionManager {
    /// Creates a session over `contract`, caching grants in `store`.
    ///
    /// The session starts without a capability or a signer; attach them
    /// with [`with_capability`](Self::with_capability) and
    /// [`with_signer`](Self::with_signer) once available.
    ///
    /// # Errors
    ///
    /// [`PrivIdError::ConfigError`] if `config` fails validation.
    pub fn new(
        contract: Arc<dyn ContractBinding>,
        store: Arc<dyn GrantStore>,
        config: &AppConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(SessionSnapshot::default());
        Ok(Self {
            contract,
            capability: None,
            signer: None,
            store,
            policy: GrantPolicy::from_config(config)?,
            confirmation_timeout: config.confirmation_timeout(),
            phase: AtomicU8::new(PHASE_IDLE),
            state_tx,
        })
    }

    /// Attaches the FHE capability instance.
    pub fn with_capability(mut self, capability: Arc<dyn FheCapability>) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Attaches the wallet signer.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Replaces the clock used for grant validity.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.policy = self.policy.with_clock(clock);
        self
    }

    /// Overrides how long to wait for a transaction receipt. `None`
    /// waits indefinitely.
    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    // -- Accessors --------------------------------------------------------

    /// Address of the bound contract.
    pub fn contract_address(&self) -> EvmAddress {
        self.contract.address()
    }

    /// Address of the signer, if one is attached.
    pub fn user_address(&self) -> Option<EvmAddress> {
        self.signer.as_ref().map(|s| s.address())
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        phase_from_code(self.phase.load(Ordering::SeqCst))
    }

    /// Returns `true` while a gated operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.phase() != SessionPhase::Idle
    }

    /// Cached attribute handles.
    pub fn attributes(&self) -> Option<AttributeSet> {
        self.state_tx.borrow().attributes
    }

    /// Last decrypted access flags.
    pub fn access_flags(&self) -> Option<AccessFlags> {
        self.state_tx.borrow().access_flags
    }

    /// Clones the current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_tx.borrow().clone()
    }

    /// Subscribes to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }

    /// Grant policy used for decryption authorizations.
    pub fn grant_policy(&self) -> &GrantPolicy {
        &self.policy
    }

    // -- Operations -------------------------------------------------------

    /// Reads the signer's attribute handles from the contract and
    /// replaces the cached set. Not gated; safe to call at any time.
    ///
    /// Returns `None` when the contract holds no attributes for the user.
    ///
    /// # Errors
    ///
    /// - [`PrivIdError::NoSigner`] if no signer is attached.
    /// - Any error of the contract read.
    pub async fn refresh_attributes(&self) -> Result<Option<AttributeSet>> {
        let user = self.user_address().ok_or(PrivIdError::NoSigner)?;
        let handles = self.contract.get_my_attributes(user).await?;
        let attributes = AttributeSet::from_handles(handles);
        self.state_tx.send_modify(|s| s.attributes = attributes);
        tracing::debug!(%user, present = attributes.is_some(), "attributes refreshed");
        Ok(attributes)
    }

    /// Encrypts and submits `(age, region, kyc)`, waits for confirmation,
    /// then refreshes the cached attributes.
    ///
    /// Returns `Ok(None)` without doing anything if another operation is
    /// in flight.
    ///
    /// # Errors
    ///
    /// - [`PrivIdError::NoCapability`] if the capability or the signer is
    ///   missing.
    /// - [`PrivIdError::NoSigner`] if the contract binding cannot send
    ///   transactions.
    /// - [`PrivIdError::ProofConstructionFailed`] if encryption fails.
    /// - [`PrivIdError::TransactionFailed`] if the transaction is
    ///   rejected, reverts, or is not confirmed in time.
    pub async fn submit_attributes(
        &self,
        age: u8,
        region: u8,
        kyc: bool,
    ) -> Result<Option<SubmitOutcome>> {
        let Some(_guard) = self.try_enter(SessionPhase::Submitting) else {
            tracing::debug!("submit ignored: session busy");
            return Ok(None);
        };
        self.publish_status(StatusKind::Info, "Submitting encrypted attributes");

        match self.run_submit(age, region, kyc).await {
            Ok(outcome) => {
                self.publish_status(StatusKind::Success, SUBMIT_COMPLETED);
                Ok(Some(outcome))
            }
            Err(e) => {
                self.publish_error(&e);
                Err(e)
            }
        }
    }

    /// Runs the on-chain access computation against `target_region`,
    /// then decrypts both resulting flags under a cached grant.
    ///
    /// Returns `Ok(None)` without doing anything if another operation is
    /// in flight.
    ///
    /// # Errors
    ///
    /// - [`PrivIdError::NoCapability`] if the capability is missing.
    /// - [`PrivIdError::NoSigner`] if no signer is attached or the
    ///   binding cannot send transactions.
    /// - [`PrivIdError::NoAttributes`] if no attributes are cached; no
    ///   transaction is sent.
    /// - [`PrivIdError::AuthorizationDenied`] if no grant covering the
    ///   contract can be obtained.
    /// - [`PrivIdError::ProofConstructionFailed`],
    ///   [`PrivIdError::TransactionFailed`],
    ///   [`PrivIdError::DecryptionFailed`],
    ///   [`PrivIdError::InvalidClearValue`] from the respective steps.
    pub async fn compute_and_decrypt_access_flags(
        &self,
        target_region: u8,
    ) -> Result<Option<AccessFlags>> {
        let Some(_guard) = self.try_enter(SessionPhase::ComputingAndDecrypting) else {
            tracing::debug!("compute ignored: session busy");
            return Ok(None);
        };
        self.publish_status(StatusKind::Info, "Computing and decrypting access flags");

        match self.run_compute(target_region).await {
            Ok(flags) => {
                self.publish_status(StatusKind::Success, DECRYPTION_COMPLETED);
                Ok(Some(flags))
            }
            Err(e) => {
                self.publish_error(&e);
                Err(e)
            }
        }
    }

    // -- Internal ---------------------------------------------------------

    fn try_enter(&self, phase: SessionPhase) -> Option<PhaseGuard<'_>> {
        self.phase
            .compare_exchange(PHASE_IDLE, phase_code(phase), Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        self.state_tx.send_modify(|s| s.phase = phase);
        Some(PhaseGuard { session: self })
    }

    fn publish_status(&self, kind: StatusKind, text: &str) {
        let status = StatusMessage::new(kind, text);
        self.state_tx.send_modify(|s| s.status = Some(status));
    }

    fn publish_error(&self, error: &PrivIdError) {
        let kind = match error {
            PrivIdError::NoCapability | PrivIdError::NoSigner | PrivIdError::NoAttributes => {
                tracing::warn!(error = %error, "operation precondition not met");
                StatusKind::Warning
            }
            _ => {
                tracing::error!(error = %error, "operation failed");
                StatusKind::Error
            }
        };
        self.publish_status(kind, &error.to_string());
    }

    async fn run_submit(&self, age: u8, region: u8, kyc: bool) -> Result<SubmitOutcome> {
        let capability = self.capability.as_ref().ok_or(PrivIdError::NoCapability)?;
        let signer = self.signer.as_ref().ok_or(PrivIdError::NoCapability)?;
        if !self.contract.is_writable() {
            return Err(PrivIdError::NoSigner);
        }
        let user = signer.address();
        let contract = self.contract.address();

        let mut input = EncryptedInput::new(contract, user);
        input.add8(age).add8(region).add_bool(kyc);
        let bundle = capability.encrypt(input).await.map_err(as_proof_error)?;
        let handles: [_; 3] = bundle.handles.as_slice().try_into().map_err(|_| {
            PrivIdError::ProofConstructionFailed {
                reason: format!("expected 3 handles, got {}", bundle.handles.len()),
            }
        })?;

        let tx_hash = self
            .contract
            .submit_attributes(user, handles, bundle.input_proof)
            .await
            .map_err(as_transaction_error)?;
        tracing::info!(%user, %tx_hash, "attributes submitted; awaiting confirmation");
        self.await_confirmation(tx_hash).await?;

        let attributes = self.refresh_attributes().await?;
        Ok(SubmitOutcome {
            tx_hash,
            attributes,
        })
    }

    async fn run_compute(&self, target_region: u8) -> Result<AccessFlags> {
        let capability = self.capability.as_ref().ok_or(PrivIdError::NoCapability)?;
        let signer = self.signer.as_ref().ok_or(PrivIdError::NoSigner)?;
        if !self.contract.is_writable() {
            return Err(PrivIdError::NoSigner);
        }
        if self.attributes().is_none() {
            return Err(PrivIdError::NoAttributes);
        }
        let user = signer.address();
        let contract = self.contract.address();

        let grant = load_or_sign(
            capability.as_ref(),
            &[contract],
            signer.as_ref(),
            self.store.as_ref(),
            &self.policy,
        )
        .await
        .map_err(|e| match e {
            PrivIdError::AuthorizationDenied { .. } => e,
            other => PrivIdError::AuthorizationDenied {
                reason: other.to_string(),
            },
        })?;
        if !grant.authorizes(&contract) {
            return Err(PrivIdError::AuthorizationDenied {
                reason: format!("grant does not cover contract {contract}"),
            });
        }

        let mut input = EncryptedInput::new(contract, user);
        input.add8(target_region);
        let bundle = capability.encrypt(input).await.map_err(as_proof_error)?;
        let [allowed_region]: [_; 1] = bundle.handles.as_slice().try_into().map_err(|_| {
            PrivIdError::ProofConstructionFailed {
                reason: format!("expected 1 handle, got {}", bundle.handles.len()),
            }
        })?;

        let tx_hash = self
            .contract
            .compute_access_flags(user, allowed_region, bundle.input_proof)
            .await
            .map_err(as_transaction_error)?;
        tracing::info!(%user, %tx_hash, target_region, "access computation sent");
        self.await_confirmation(tx_hash).await?;

        let pair = AccessFlagPair::from_handles(self.contract.last_access_flags(user).await?)
            .ok_or_else(|| PrivIdError::DecryptionFailed {
                reason: "contract returned no access flags".into(),
            })?;

        let request = UserDecryptRequest {
            handles: vec![
                HandleContractPair {
                    handle: pair.access_a,
                    contract,
                },
                HandleContractPair {
                    handle: pair.access_b,
                    contract,
                },
            ],
            grant,
        };
        let clear = capability.user_decrypt(request).await.map_err(|e| match e {
            PrivIdError::DecryptionFailed { .. } => e,
            other => PrivIdError::DecryptionFailed {
                reason: other.to_string(),
            },
        })?;

        let decode = |handle: EncryptedHandle| -> Result<ClearResult> {
            let value = clear.get(&handle).ok_or_else(|| PrivIdError::DecryptionFailed {
                reason: format!("no cleartext returned for handle {handle}"),
            })?;
            Ok(ClearResult {
                handle,
                value: decode_clear_bool(value)?,
            })
        };
        let flags = AccessFlags {
            pair,
            is_adult: decode(pair.access_a)?,
            is_region: decode(pair.access_b)?,
        };

        self.state_tx.send_modify(|s| s.access_flags = Some(flags));
        tracing::info!(
            %user,
            is_adult = flags.is_adult.value,
            is_region = flags.is_region.value,
            "access flags decrypted"
        );
        Ok(flags)
    }

    async fn await_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt> {
        let wait = self.contract.wait_for_confirmation(tx_hash);
        let receipt = match self.confirmation_timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                PrivIdError::TransactionFailed {
                    reason: format!("transaction {tx_hash} not confirmed within {}s", limit.as_secs()),
                }
            })?,
            None => wait.await,
        }
        .map_err(as_transaction_error)?;

        if !receipt.success {
            return Err(PrivIdError::TransactionFailed {
                reason: format!("transaction {tx_hash} reverted"),
            });
        }
        tracing::debug!(%tx_hash, block = receipt.block_number, "transaction confirmed");
        Ok(receipt)
    }
}

fn as_proof_error(e: PrivIdError) -> PrivIdError {
    match e {
        PrivIdError::ProofConstructionFailed { .. } => e,
        other => PrivIdError::ProofConstructionFailed {
            reason: other.to_string(),
        },
    }
}

fn as_transaction_error(e: PrivIdError) -> PrivIdError {
    match e {
        PrivIdError::TransactionFailed { .. } | PrivIdError::NoSigner => e,
        other => PrivIdError::TransactionFailed {
            reason: other.to_string(),
        },
    }
}
