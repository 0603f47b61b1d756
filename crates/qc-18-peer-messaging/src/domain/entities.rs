//! # Core Domain Entities
//!
//! ## Entities
//!
//! - [`Envelope`]: The unit sent over the wire (`raw`, `signature`, `hash`)
//! - [`BroadcastPayload`] / [`DirectPayload`]: What `raw` decodes to
//! - [`PeerAddress`]: `host:port` identity of a remote peer
//! - [`PeerReceiveEvent`]: Push event for local listening channels
//! - [`PeerResult`]: Per-peer outcome record of a fan-out

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

use super::KeySelector;

/// `ip` value used for messages that originate on this node.
pub const LOCAL_ORIGIN: &str = "self";

/// Milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Seconds elapsed since `earlier`; zero if `earlier` is in the future.
    pub fn secs_since(&self, earlier: Timestamp) -> f64 {
        self.0.saturating_sub(earlier.0) as f64 / 1000.0
    }
}

/// Remote peer address (`host:port`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    host: String,
    port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let (host, port) = text.rsplit_once(':')?;
        if host.is_empty() {
            return None;
        }
        let port = port.parse().ok()?;
        Some(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Signed (or unsigned) wrapper around a serialized payload.
///
/// # Fields
///
/// - `raw`: canonical JSON of the inner payload
/// - `signature`: empty, or `"<address>|<sig>"` where `<sig>` covers `address|hash|raw`
/// - `hash`: digest of `nonce + "," + raw`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub raw: String,
    #[serde(default)]
    pub signature: String,
    pub hash: String,
}

impl Envelope {
    /// Address portion of the signature, empty if unsigned.
    pub fn signed_by(&self) -> &str {
        self.signature
            .split_once('|')
            .map(|(address, _)| address)
            .unwrap_or(&self.signature)
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }
}

/// Inner payload of a broadcast envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BroadcastPayload {
    pub message: Value,
    pub peer_count: usize,
    pub broadcast: bool,
    pub immediate: bool,
    pub site: String,
}

/// Inner payload of a direct-send envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectPayload {
    pub message: Value,
    pub site: String,
}

/// `peerReceive` push event payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerReceiveEvent {
    pub ip: String,
    pub hash: String,
    pub message: Value,
    pub signed_by: String,
}

impl PeerReceiveEvent {
    pub fn new(ip: impl Into<String>, envelope: &Envelope, message: Value) -> Self {
        Self {
            ip: ip.into(),
            hash: envelope.hash.clone(),
            message,
            signed_by: envelope.signed_by().to_string(),
        }
    }

    /// Event for a message this node originated.
    pub fn local(envelope: &Envelope, message: Value) -> Self {
        Self::new(LOCAL_ORIGIN, envelope, message)
    }

    pub fn to_value(&self) -> Value {
        json!({
            "ip": self.ip,
            "hash": self.hash,
            "message": self.message,
            "signed_by": self.signed_by,
        })
    }
}

/// Outcome of one peer round-trip within a fan-out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerResult {
    pub ip: String,
    pub reply: Value,
}

impl PeerResult {
    pub fn replied(ip: impl Into<String>, reply: Value) -> Self {
        Self {
            ip: ip.into(),
            reply,
        }
    }

    pub fn connection_error(ip: impl Into<String>) -> Self {
        Self::replied(ip, json!({ "error": "Connection error" }))
    }

    /// Record for a peer still outstanding when the wait timed out.
    pub fn timed_out(ip: impl Into<String>) -> Self {
        Self::replied(ip, json!({ "error": "Timeout" }))
    }

    pub fn is_error(&self) -> bool {
        self.reply.get("error").is_some()
    }
}

/// A local request to broadcast a message.
#[derive(Clone, Debug)]
pub struct BroadcastRequest {
    pub message: Value,
    pub peer_count: usize,
    /// `true`: fire-and-forget. `false`: wait for peer results.
    pub broadcast: bool,
    /// Queue for later delivery when no local listener is subscribed.
    pub immediate: bool,
    pub timeout: Duration,
    pub key: KeySelector,
}

impl BroadcastRequest {
    /// Request with the default relay options (5 peers, fire-and-forget, 60s).
    pub fn new(message: Value) -> Self {
        Self {
            message,
            peer_count: 5,
            broadcast: true,
            immediate: false,
            timeout: Duration::from_secs(60),
            key: KeySelector::default(),
        }
    }
}

/// Result of a broadcast.
#[derive(Clone, Debug, PartialEq)]
pub enum BroadcastOutcome {
    /// Accepted for sending; nobody waited on peers.
    Sent,
    /// Per-peer records collected within the timeout.
    Collected(Vec<PeerResult>),
}

impl BroadcastOutcome {
    pub fn to_response(&self) -> Value {
        match self {
            Self::Sent => json!({ "sent": true }),
            Self::Collected(results) => Value::Array(
                results
                    .iter()
                    .map(|r| json!({ "ip": r.ip, "reply": r.reply }))
                    .collect(),
            ),
        }
    }
}

/// Result of a direct send.
#[derive(Clone, Debug, PartialEq)]
pub enum DirectSendOutcome {
    /// The peer's response carried a `reply` payload.
    Replied(Value),
    /// The peer acknowledged without a payload.
    Acknowledged,
}

impl DirectSendOutcome {
    pub fn to_response(&self) -> Value {
        match self {
            Self::Replied(reply) => reply.clone(),
            Self::Acknowledged => json!({ "sent": true }),
        }
    }
}
