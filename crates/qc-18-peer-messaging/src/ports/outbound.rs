//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the host application implements for this subsystem: peer
//! transport and bookkeeping, the site's stored content and keys, the
//! crypto primitives, local listening channels and the clock.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{PeerAddress, SitePolicy, Timestamp};
use crate::events::PeerCommand;
use shared_crypto::CryptoError;

/// Errors from a peer round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Peer did not answer in time")]
    Timeout,

    #[error("Peer closed the connection")]
    Closed,
}

/// Errors from the site store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Site content unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid site content: {0}")]
    InvalidContent(String),
}

/// One remote peer connection handle.
///
/// `request` returns the peer's reply or an error when the connection fails
/// or the transport gives up waiting.
#[async_trait]
pub trait Peer: Send + Sync {
    fn address(&self) -> &PeerAddress;

    async fn request(&self, command: PeerCommand, payload: Value) -> Result<Value, PeerError>;
}

/// Peer discovery and bookkeeping for the site.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Peers with a live connection.
    fn connected_peers(&self) -> Vec<Arc<dyn Peer>>;

    /// Up to `limit` recently known peers that are not connected.
    fn recent_peers(&self, limit: usize) -> Vec<Arc<dyn Peer>>;

    /// Known peer by address.
    fn get_peer(&self, address: &PeerAddress) -> Option<Arc<dyn Peer>>;

    /// Add (and connect to) a peer. `None` if that fails.
    async fn add_peer(&self, address: &PeerAddress, source: &str) -> Option<Arc<dyn Peer>>;
}

/// The site whose messages this relay carries.
pub trait SiteStore: Send + Sync {
    fn site_address(&self) -> String;

    /// P2P policy from the site's content document.
    fn load_policy(&self) -> Result<SitePolicy, StoreError>;
}

/// Private keys known to this node for the site.
pub trait IdentityProvider: Send + Sync {
    /// Key stored with the site itself.
    fn site_private_key(&self, site: &str) -> Option<String>;

    /// The authenticated user's key for the site.
    fn auth_private_key(&self, site: &str) -> Option<String>;
}

/// Hashing and signing primitives.
pub trait CryptoProvider: Send + Sync {
    /// Hex digest used as the envelope hash.
    fn digest(&self, data: &[u8]) -> String;

    /// Address belonging to a private key.
    fn derive_address(&self, private_key: &str) -> Result<String, CryptoError>;

    /// Signature over `message` in its text form.
    fn sign(&self, message: &[u8], private_key: &str) -> Result<String, CryptoError>;

    /// Check that `signature` over `message` was made by `address`.
    fn verify(&self, message: &[u8], address: &str, signature: &str) -> Result<(), CryptoError>;
}

/// A local client connection subscribed to relay events.
pub trait ListenerChannel: Send + Sync {
    fn id(&self) -> u64;

    /// Push an event. Delivery failures are the channel's concern.
    fn send(&self, event: &str, payload: Value);
}

/// Abstract time source for testability.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}
