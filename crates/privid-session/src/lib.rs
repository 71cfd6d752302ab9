//! Encrypted-attribute session management for the PrivID client.
//!
//! A [`session::SessionManager`] submits a user's attributes as
//! ciphertext, triggers the on-chain access computation, and decrypts the
//! resulting flags under a cached, user-signed decryption grant. The
//! chain, the FHE coprocessor, and the wallet are reached through the
//! traits in [`contract`], [`capability`] and [`signer`]; [`devnet`]
//! provides an in-process implementation of all three.

pub mod authorization;
pub mod capability;
pub mod contract;
pub mod decode;
pub mod deployments;
pub mod devnet;
pub mod provider;
pub mod session;
pub mod signer;

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future returned by the async collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
