//! # Peer Messaging Subsystem (qc-18)
//!
//! Relays application-defined messages for a site across the P2P overlay.
//! Messages travel in signed envelopes, are checked against the site's
//! declared policy on both the send and receive paths, and can be sent
//! either fire-and-forget or fire-and-wait.
//!
//! ## Architecture Role
//!
//! ```text
//! [Local client] ──peerBroadcast──→ [Peer Messaging (18)]
//!                                          │
//!                      policy → envelope → sign
//!                                          │
//!                                          ↓ fan-out (peer_count)
//!                                  ┌───────┴───────┐
//!                                  ↓               ↓
//!                             [Peer A]        [Peer B] ...
//!
//! [Local client] ──peerSend(ip)──→ [Peer Messaging (18)] ──→ [Peer] ──reply──┐
//!        ↑                                                                   │
//!        └───────────────────────── correlated response ←────────────────────┘
//! ```
//!
//! ## Components
//!
//! - **Policy Filter**: `p2p_filter` pattern, `p2p_freq_limit`, `p2p_size_limit`
//! - **Envelope Codec / Signature Service**: nonce, hash, `address|signature`
//! - **Dispatch Engine**: [`PeerMessagingService`]
//! - **Reply Correlator**: single-resolution slots keyed by envelope hash
//! - **Local Echo**: delivery to local listeners, unread buffer otherwise
//!
//! ## Security
//!
//! - Local validation failures short-circuit before any network activity
//! - Per-peer failures are isolated into result records, never failing the batch
//! - Filter patterns run on a linear-time regex engine behind static guards

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod events;
pub mod ipc;
pub mod logging;
pub mod ports;
pub mod service;

/// Mocks for the outbound ports.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{Secp256k1Crypto, SystemTimeSource};
pub use config::{ConfigError, MessagingConfig};
pub use domain::*;
pub use events::MessagingError;
pub use ipc::{
    ClientCommandHandler, ClientRequest, ClientResponse, ClientSession, PeerRequestHandler,
};
pub use logging::{init_tracing, LoggingConfig, LoggingError};
pub use ports::inbound::{PeerMessageReceiver, PeerMessagingApi};
pub use ports::outbound::{
    CryptoProvider, IdentityProvider, ListenerChannel, Peer, PeerDirectory, PeerError, SiteStore,
    StoreError, TimeSource,
};
pub use service::{PeerMessagingService, RelayState};
