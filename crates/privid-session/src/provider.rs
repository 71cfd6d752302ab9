//! Wallet provider connection tracking.
//!
//! The [`ProviderTracker`] folds EIP-1193 provider events into a
//! [`ConnectionState`] published on a `watch` channel. Each attached
//! provider gets a generation number; events carrying an older generation
//! come from a provider that has since been replaced and are ignored.

use privid_types::{ChainId, EvmAddress, Result};
use tokio::sync::watch;

/// Event emitted by an EIP-1193 provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProviderEvent {
    /// `connect` with the hex chain id from its `ProviderConnectInfo`.
    Connect { chain_id: String },
    /// `disconnect`.
    Disconnect,
    /// `chainChanged` with the new hex chain id.
    ChainChanged(String),
    /// `accountsChanged` with the newly exposed accounts.
    AccountsChanged(Vec<EvmAddress>),
}

/// What the client currently knows about the wallet connection.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConnectionState {
    /// Generation of the provider this state belongs to.
    pub generation: u64,
    /// Whether a provider is attached.
    pub provider_present: bool,
    pub chain_id: Option<ChainId>,
    pub accounts: Vec<EvmAddress>,
}

impl ConnectionState {
    /// A provider is attached, exposes at least one account, and has
    /// reported its chain.
    pub fn is_connected(&self) -> bool {
        self.provider_present && !self.accounts.is_empty() && self.chain_id.is_some()
    }

    /// The active account (the first one exposed).
    pub fn account(&self) -> Option<EvmAddress> {
        self.accounts.first().copied()
    }
}

/// Reducer from provider events to [`ConnectionState`].
pub struct ProviderTracker {
    generation: u64,
    state_tx: watch::Sender<ConnectionState>,
}

impl Default for ProviderTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderTracker {
    /// Creates a tracker with no provider attached.
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        Self {
            generation: 0,
            state_tx,
        }
    }

    /// Attaches a new provider, replacing any previous one, and returns
    /// the generation its events must carry. State is reset until the
    /// new provider reports its chain and accounts.
    pub fn attach(&mut self) -> u64 {
        self.generation += 1;
        let generation = self.generation;
        self.state_tx.send_replace(ConnectionState {
            generation,
            provider_present: true,
            chain_id: None,
            accounts: Vec::new(),
        });
        tracing::debug!(generation, "wallet provider attached");
        generation
    }

    /// Detaches the current provider. Its pending events become stale.
    pub fn detach(&mut self) {
        self.generation += 1;
        self.state_tx.send_replace(ConnectionState {
            generation: self.generation,
            ..ConnectionState::default()
        });
        tracing::debug!(generation = self.generation, "wallet provider detached");
    }

    /// Applies `event` from the provider of `generation`.
    ///
    /// Returns `Ok(false)` if the event is stale and was ignored.
    ///
    /// # Errors
    ///
    /// [`privid_types::PrivIdError::ConfigError`] if a chain id is not
    /// valid hex; the state is left unchanged.
    pub fn apply(&self, generation: u64, event: ProviderEvent) -> Result<bool> {
        if generation != self.generation || !self.state_tx.borrow().provider_present {
            tracing::debug!(generation, current = self.generation, "ignoring stale provider event");
            return Ok(false);
        }

        match event {
            ProviderEvent::Connect { chain_id } | ProviderEvent::ChainChanged(chain_id) => {
                let chain_id = ChainId::from_hex(&chain_id)?;
                tracing::info!(%chain_id, "wallet chain set");
                self.state_tx.send_modify(|s| s.chain_id = Some(chain_id));
            }
            ProviderEvent::AccountsChanged(accounts) => {
                tracing::info!(count = accounts.len(), "wallet accounts changed");
                self.state_tx.send_modify(|s| s.accounts = accounts);
            }
            ProviderEvent::Disconnect => {
                tracing::info!("wallet disconnected");
                self.state_tx.send_modify(|s| {
                    s.chain_id = None;
                    s.accounts.clear();
                });
            }
        }
        Ok(true)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribes to state updates.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use privid_types::PrivIdError;

    use super::*;

    fn account(b: u8) -> EvmAddress {
        EvmAddress::new([b; 20])
    }

    #[test]
    fn connects_after_chain_and_accounts() -> std::result::Result<(), PrivIdError> {
        let mut tracker = ProviderTracker::new();
        assert!(!tracker.state().is_connected());

        let gen = tracker.attach();
        assert!(tracker.apply(gen, ProviderEvent::Connect { chain_id: "0x7a69".into() })?);
        assert!(!tracker.state().is_connected());

        assert!(tracker.apply(gen, ProviderEvent::AccountsChanged(vec![account(1), account(2)]))?);
        let state = tracker.state();
        assert!(state.is_connected());
        assert_eq!(state.chain_id, Some(ChainId::new(31337)));
        assert_eq!(state.account(), Some(account(1)));
        Ok(())
    }

    #[test]
    fn chain_changed_updates_chain() -> std::result::Result<(), PrivIdError> {
        let mut tracker = ProviderTracker::new();
        let gen = tracker.attach();
        tracker.apply(gen, ProviderEvent::ChainChanged("0xaa36a7".into()))?;
        assert_eq!(tracker.state().chain_id, Some(ChainId::new(11_155_111)));
        Ok(())
    }

    #[test]
    fn disconnect_clears_chain_and_accounts() -> std::result::Result<(), PrivIdError> {
        let mut tracker = ProviderTracker::new();
        let gen = tracker.attach();
        tracker.apply(gen, ProviderEvent::ChainChanged("0x1".into()))?;
        tracker.apply(gen, ProviderEvent::AccountsChanged(vec![account(1)]))?;
        tracker.apply(gen, ProviderEvent::Disconnect)?;
        let state = tracker.state();
        assert!(state.chain_id.is_none());
        assert!(state.accounts.is_empty());
        assert!(!state.is_connected());
        Ok(())
    }

    #[test]
    fn events_from_replaced_provider_ignored() -> std::result::Result<(), PrivIdError> {
        let mut tracker = ProviderTracker::new();
        let old = tracker.attach();
        let new = tracker.attach();
        assert!(!tracker.apply(old, ProviderEvent::AccountsChanged(vec![account(9)]))?);
        assert!(tracker.state().accounts.is_empty());

        assert!(tracker.apply(new, ProviderEvent::AccountsChanged(vec![account(1)]))?);
        assert_eq!(tracker.state().account(), Some(account(1)));
        Ok(())
    }

    #[test]
    fn events_after_detach_ignored() -> std::result::Result<(), PrivIdError> {
        let mut tracker = ProviderTracker::new();
        let gen = tracker.attach();
        tracker.detach();
        assert!(!tracker.apply(gen, ProviderEvent::ChainChanged("0x1".into()))?);
        assert!(!tracker.state().provider_present);
        Ok(())
    }

    #[test]
    fn invalid_chain_hex_leaves_state() -> std::result::Result<(), PrivIdError> {
        let mut tracker = ProviderTracker::new();
        let gen = tracker.attach();
        tracker.apply(gen, ProviderEvent::ChainChanged("0x1".into()))?;
        assert!(tracker.apply(gen, ProviderEvent::ChainChanged("bogus".into())).is_err());
        assert_eq!(tracker.state().chain_id, Some(ChainId::new(1)));
        Ok(())
    }

    #[tokio::test]
    async fn subscribers_see_updates() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let mut tracker = ProviderTracker::new();
        let mut rx = tracker.subscribe();
        let gen = tracker.attach();
        tracker.apply(gen, ProviderEvent::AccountsChanged(vec![account(3)]))?;
        rx.changed().await?;
        assert_eq!(rx.borrow_and_update().account(), Some(account(3)));
        Ok(())
    }
}
