//! Hexagonal ports for Peer Messaging.
//!
//! - `inbound`: what this subsystem offers (local client API, peer receive path)
//! - `outbound`: what it needs from the host (peers, site store, keys, crypto)

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
