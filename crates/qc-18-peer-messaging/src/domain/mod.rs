//! # Domain Layer for Peer Messaging
//!
//! Business logic with no network I/O. The only suspension point in this
//! layer is [`ReplyCorrelator::wait`].
//!
//! ## Contents
//!
//! - **entities**: Wire and event types (`Envelope`, `PeerAddress`, payloads, results)
//! - **canonical_json**: The serialized form used for filtering, sizing and `raw`
//! - **pattern**: Guarded, cached, linear-time `p2p_filter` matcher
//! - **policy**: `SitePolicy`, `RateState` and the ordered `PolicyFilter`
//! - **key_selector**: Which private key signs an envelope
//! - **envelope**: Nonces, hash input, signature wire form, payload decoding
//! - **seen_cache**: Bounded set of processed envelope hashes
//! - **correlator**: Hash-keyed single-resolution reply slots
//! - **local_echo**: Local listener fan-out and the unread buffer
//! - **metrics**: Relay counters

mod canonical_json;
mod correlator;
mod entities;
mod envelope;
mod key_selector;
mod local_echo;
mod metrics;
mod pattern;
mod policy;
mod seen_cache;

pub use canonical_json::*;
pub use correlator::*;
pub use entities::*;
pub use envelope::*;
pub use key_selector::*;
pub use local_echo::*;
pub use metrics::*;
pub use pattern::*;
pub use policy::*;
pub use seen_cache::*;
