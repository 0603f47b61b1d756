//! # IPC Layer
//!
//! Boundary between the relay and its two kinds of callers:
//!
//! - local clients on the site's duplex endpoint (`peerBroadcast`,
//!   `peerSend`, `peerValid`, `peerInvalid`, `peerReply`)
//! - remote peers delivering `peerBroadcast` / `peerSend` envelopes
//!
//! Errors never escape as protocol failures; they become `{"error": ...}`
//! bodies here.
//!
//! ## Authorization
//!
//! A session bound to another site may only broadcast. Everything else needs
//! the relay's own site or an admin session.

pub mod handler;
pub mod payloads;

pub use handler::*;
pub use payloads::*;
