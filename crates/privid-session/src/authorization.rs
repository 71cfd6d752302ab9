//! Decryption authorization cache.
//!
//! Decrypting a handle requires a grant signed by the user over an
//! ephemeral public key, a contract set, and a validity window. Signing
//! is an interactive wallet prompt, so grants are cached per
//! `(user, contract set)` and reused until they expire.
//!
//! # Cache key
//!
//! ```text
//! <user address>:<hex keccak256(sorted, deduplicated contract addresses)>
//! ```
//!
//! Normalizing the set first means the order in which callers list the
//! contracts never causes a second prompt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use privid_crypto::hash::address_set_digest;
use privid_crypto::typed_data::DecryptRequest;
use privid_storage::GrantStore;
use privid_types::config::AppConfig;
use privid_types::{DecryptionGrant, EvmAddress, PrivIdError, Result};

use crate::capability::FheCapability;
use crate::signer::Signer;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current unix time in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
    }
}

/// Manually driven clock for deterministic tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    /// Moves the clock forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// GrantPolicy
// ---------------------------------------------------------------------------

/// How long new grants last and what time it is.
#[derive(Clone)]
pub struct GrantPolicy {
    duration_days: u32,
    clock: Arc<dyn Clock>,
}

impl GrantPolicy {
    /// Creates a policy issuing grants of `duration_days`.
    ///
    /// # Errors
    ///
    /// [`PrivIdError::ConfigError`] if `duration_days` is zero.
    pub fn new(duration_days: u32, clock: Arc<dyn Clock>) -> Result<Self> {
        if duration_days == 0 {
            return Err(PrivIdError::ConfigError {
                reason: "grant duration must be at least one day".into(),
            });
        }
        Ok(Self {
            duration_days,
            clock,
        })
    }

    /// Policy from the application config, on wall-clock time.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(config.grant_duration_days, Arc::new(SystemClock))
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validity of newly signed grants, in days.
    pub fn duration_days(&self) -> u32 {
        self.duration_days
    }

    /// Current unix time according to the policy clock.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }
}

impl std::fmt::Debug for GrantPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantPolicy")
            .field("duration_days", &self.duration_days)
            .field("now", &self.clock.now())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Sorts and deduplicates a contract set.
///
/// # Errors
///
/// [`PrivIdError::InvalidAddress`] if the list is empty or contains the
/// zero address.
pub fn normalize_contracts(contracts: &[EvmAddress]) -> Result<Vec<EvmAddress>> {
    if contracts.is_empty() {
        return Err(PrivIdError::InvalidAddress {
            reason: "contract address list must not be empty".into(),
        });
    }
    if contracts.iter().any(EvmAddress::is_zero) {
        return Err(PrivIdError::InvalidAddress {
            reason: "contract address list contains the zero address".into(),
        });
    }
    let mut normalized = contracts.to_vec();
    normalized.sort_unstable();
    normalized.dedup();
    Ok(normalized)
}

/// Builds the cache key for a user and an already-normalized set.
pub fn cache_key(user: &EvmAddress, normalized: &[EvmAddress]) -> String {
    format!("{user}:{}", hex::encode(address_set_digest(normalized)))
}

// ---------------------------------------------------------------------------
// load_or_sign
// ---------------------------------------------------------------------------

/// Returns a valid grant for `(signer, contract_addresses)`, prompting
/// for a signature only when no usable grant is cached.
///
/// A cached grant is reused when it is inside its validity window and
/// was signed by the same user over exactly the same contract set.
/// Expired grants are removed before re-signing. A store read failure is
/// logged and treated as a miss.
///
/// # Errors
///
/// - [`PrivIdError::InvalidAddress`] for an empty contract list.
/// - [`PrivIdError::SignatureDenied`] if the user rejects the prompt or
///   signing fails. Nothing is persisted in that case.
/// - [`PrivIdError::CryptoError`] if the ephemeral key pair cannot be
///   generated.
/// - [`PrivIdError::StorageError`] if a freshly signed grant cannot be
///   persisted.
pub async fn load_or_sign(
    capability: &dyn FheCapability,
    contract_addresses: &[EvmAddress],
    signer: &dyn Signer,
    store: &dyn GrantStore,
    policy: &GrantPolicy,
) -> Result<DecryptionGrant> {
    let contracts = normalize_contracts(contract_addresses)?;
    let user = signer.address();
    let key = cache_key(&user, &contracts);
    let now = policy.now();

    match store.get(&key) {
        Ok(Some(grant)) if grant.user_address != user || grant.contract_addresses != contracts => {
            tracing::warn!(%key, "cached grant does not match its key; re-signing");
        }
        Ok(Some(grant)) if grant.is_valid_at(now) => {
            tracing::debug!(%key, expires_at = grant.expires_at(), "decryption grant cache hit");
            return Ok(grant);
        }
        Ok(Some(grant)) => {
            tracing::info!(%key, expired_at = grant.expires_at(), "decryption grant expired");
            if let Err(e) = store.remove(&key) {
                tracing::warn!(%key, error = %e, "failed to remove expired grant");
            }
        }
        Ok(None) => {
            tracing::debug!(%key, "decryption grant cache miss");
        }
        Err(e) => {
            tracing::warn!(%key, error = %e, "grant store read failed; treating as miss");
        }
    }

    let keypair = capability.generate_keypair()?;
    let request = DecryptRequest {
        public_key: keypair.public_key.clone(),
        contract_addresses: contracts.clone(),
        start_timestamp: now,
        duration_days: policy.duration_days(),
    };
    let domain = capability.eip712_domain();

    let signature = signer
        .sign_typed_data(&domain, &request)
        .await
        .map_err(|e| match e {
            PrivIdError::SignatureDenied { .. } => e,
            other => PrivIdError::SignatureDenied {
                reason: other.to_string(),
            },
        })?;

    let grant = DecryptionGrant {
        private_key: keypair.private_key,
        public_key: keypair.public_key,
        signature,
        contract_addresses: contracts,
        user_address: user,
        start_timestamp: now,
        duration_days: policy.duration_days(),
    };

    store.put(&key, &grant)?;
    tracing::info!(
        %key,
        %user,
        contracts = grant.contract_addresses.len(),
        expires_at = grant.expires_at(),
        "decryption grant signed"
    );
    Ok(grant)
}

/// Removes every grant that is no longer valid at the policy's current
/// time. Records that fail to load are skipped and left for `clear`.
///
/// Returns the number of grants removed.
pub fn purge_expired(store: &dyn GrantStore, policy: &GrantPolicy) -> Result<usize> {
    let now = policy.now();
    let mut removed = 0;
    for (key, grant) in store.entries()? {
        if !grant.is_valid_at(now) && store.remove(&key)? {
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::info!(removed, "purged expired decryption grants");
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use privid_storage::memory::MemoryGrantStore;
    use privid_types::{ChainId, SECONDS_PER_DAY};

    use super::*;
    use crate::devnet::Devnet;
    use crate::signer::LocalSigner;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    const T0: u64 = 1_700_000_000;

    fn contract(b: u8) -> EvmAddress {
        EvmAddress::new([b; 20])
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        devnet: Arc<Devnet>,
        signer: LocalSigner,
        store: MemoryGrantStore,
        policy: GrantPolicy,
    }

    fn fixture() -> std::result::Result<Fixture, PrivIdError> {
        let clock = Arc::new(ManualClock::new(T0));
        let devnet = Devnet::with_clock(ChainId::new(31337), clock.clone());
        let policy = GrantPolicy::new(1, clock.clone())?;
        Ok(Fixture {
            clock,
            devnet,
            signer: LocalSigner::random()?,
            store: MemoryGrantStore::new(),
            policy,
        })
    }

    #[test]
    fn normalize_sorts_and_dedupes() -> std::result::Result<(), PrivIdError> {
        let normalized = normalize_contracts(&[contract(3), contract(1), contract(3)])?;
        assert_eq!(normalized, vec![contract(1), contract(3)]);
        Ok(())
    }

    #[test]
    fn normalize_rejects_empty_and_zero() {
        assert!(normalize_contracts(&[]).is_err());
        assert!(normalize_contracts(&[EvmAddress::ZERO]).is_err());
    }

    #[test]
    fn cache_key_is_order_independent() -> std::result::Result<(), PrivIdError> {
        let user = contract(9);
        let a = cache_key(&user, &normalize_contracts(&[contract(1), contract(2)])?);
        let b = cache_key(&user, &normalize_contracts(&[contract(2), contract(1)])?);
        assert_eq!(a, b);
        assert!(a.starts_with(&user.to_string()));
        let other_user = cache_key(&contract(8), &normalize_contracts(&[contract(1), contract(2)])?);
        assert_ne!(a, other_user);
        Ok(())
    }

    #[test]
    fn zero_duration_policy_rejected() {
        assert!(GrantPolicy::new(0, Arc::new(SystemClock)).is_err());
    }

    #[tokio::test]
    async fn second_call_hits_cache() -> TestResult {
        let f = fixture()?;
        let cap = f.devnet.capability();
        let first = load_or_sign(&cap, &[contract(1)], &f.signer, &f.store, &f.policy).await?;
        let second = load_or_sign(&cap, &[contract(1)], &f.signer, &f.store, &f.policy).await?;
        assert_eq!(first, second);
        assert_eq!(f.signer.prompts(), 1);
        assert_eq!(first.start_timestamp, T0);
        assert_eq!(first.user_address, f.signer.address());
        Ok(())
    }

    #[tokio::test]
    async fn different_order_same_set_hits_cache() -> TestResult {
        let f = fixture()?;
        let cap = f.devnet.capability();
        load_or_sign(&cap, &[contract(1), contract(2)], &f.signer, &f.store, &f.policy).await?;
        load_or_sign(&cap, &[contract(2), contract(1), contract(2)], &f.signer, &f.store, &f.policy)
            .await?;
        assert_eq!(f.signer.prompts(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn different_set_is_a_miss() -> TestResult {
        let f = fixture()?;
        let cap = f.devnet.capability();
        load_or_sign(&cap, &[contract(1)], &f.signer, &f.store, &f.policy).await?;
        let wider =
            load_or_sign(&cap, &[contract(1), contract(2)], &f.signer, &f.store, &f.policy).await?;
        assert_eq!(f.signer.prompts(), 2);
        assert_eq!(wider.contract_addresses, vec![contract(1), contract(2)]);
        assert_eq!(f.store.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn expired_grant_resigns_once_and_is_replaced() -> TestResult {
        let f = fixture()?;
        let cap = f.devnet.capability();
        load_or_sign(&cap, &[contract(1)], &f.signer, &f.store, &f.policy).await?;

        f.clock.advance(SECONDS_PER_DAY - 1);
        load_or_sign(&cap, &[contract(1)], &f.signer, &f.store, &f.policy).await?;
        assert_eq!(f.signer.prompts(), 1);

        f.clock.advance(1);
        let renewed = load_or_sign(&cap, &[contract(1)], &f.signer, &f.store, &f.policy).await?;
        assert_eq!(f.signer.prompts(), 2);
        assert_eq!(renewed.start_timestamp, T0 + SECONDS_PER_DAY);
        assert_eq!(f.store.len(), 1);

        load_or_sign(&cap, &[contract(1)], &f.signer, &f.store, &f.policy).await?;
        assert_eq!(f.signer.prompts(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn rejection_persists_nothing() -> TestResult {
        let f = fixture()?;
        let cap = f.devnet.capability();
        f.signer.set_approve(false);
        let result = load_or_sign(&cap, &[contract(1)], &f.signer, &f.store, &f.policy).await;
        assert!(matches!(result, Err(PrivIdError::SignatureDenied { .. })));
        assert!(f.store.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn mismatched_record_is_resigned() -> TestResult {
        let f = fixture()?;
        let cap = f.devnet.capability();
        let grant = load_or_sign(&cap, &[contract(1)], &f.signer, &f.store, &f.policy).await?;
        let key = cache_key(&f.signer.address(), &[contract(1)]);
        let forged = DecryptionGrant {
            contract_addresses: vec![contract(1), contract(2)],
            ..grant
        };
        f.store.put(&key, &forged)?;

        let fresh = load_or_sign(&cap, &[contract(1)], &f.signer, &f.store, &f.policy).await?;
        assert_eq!(fresh.contract_addresses, vec![contract(1)]);
        assert_eq!(f.signer.prompts(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn purge_removes_only_expired() -> TestResult {
        let f = fixture()?;
        let cap = f.devnet.capability();
        load_or_sign(&cap, &[contract(1)], &f.signer, &f.store, &f.policy).await?;
        f.clock.advance(SECONDS_PER_DAY / 2);
        load_or_sign(&cap, &[contract(2)], &f.signer, &f.store, &f.policy).await?;

        f.clock.advance(SECONDS_PER_DAY / 2);
        assert_eq!(purge_expired(&f.store, &f.policy)?, 1);
        assert_eq!(f.store.len(), 1);
        Ok(())
    }

    /// Memory store whose `get` fails for one key, like a record that no
    /// longer authenticates.
    struct CorruptStore {
        inner: MemoryGrantStore,
        corrupt: String,
    }

    impl GrantStore for CorruptStore {
        fn get(&self, key: &str) -> Result<Option<DecryptionGrant>> {
            if key == self.corrupt {
                return Err(PrivIdError::StorageError {
                    reason: "HMAC verification failed".into(),
                });
            }
            self.inner.get(key)
        }

        fn put(&self, key: &str, grant: &DecryptionGrant) -> Result<()> {
            self.inner.put(key, grant)
        }

        fn remove(&self, key: &str) -> Result<bool> {
            self.inner.remove(key)
        }

        fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys()
        }
    }

    #[tokio::test]
    async fn purge_skips_unreadable_records() -> TestResult {
        let f = fixture()?;
        let cap = f.devnet.capability();
        let store = CorruptStore {
            inner: MemoryGrantStore::new(),
            corrupt: cache_key(&f.signer.address(), &[contract(1)]),
        };
        load_or_sign(&cap, &[contract(1)], &f.signer, &store.inner, &f.policy).await?;
        load_or_sign(&cap, &[contract(2)], &f.signer, &store.inner, &f.policy).await?;

        f.clock.advance(SECONDS_PER_DAY);
        assert_eq!(purge_expired(&store, &f.policy)?, 1);
        assert_eq!(store.keys()?, vec![store.corrupt.clone()]);
        assert_eq!(store.clear()?, 1);
        assert!(store.inner.is_empty());
        Ok(())
    }
}
