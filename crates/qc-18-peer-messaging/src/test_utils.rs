//! Test utilities for peer messaging.
//!
//! Mock implementations of the outbound ports for deterministic testing.
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use qc_18_peer_messaging::test_utils::ManualTimeSource;
//! use qc_18_peer_messaging::TimeSource;
//! use std::time::Duration;
//!
//! let clock = ManualTimeSource::new(100);
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now().as_millis(), 105_000);
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{PeerAddress, SitePolicy, Timestamp};
use crate::events::PeerCommand;
use crate::ports::outbound::{
    IdentityProvider, ListenerChannel, Peer, PeerDirectory, PeerError, SiteStore, StoreError,
    TimeSource,
};

/// How a [`MockPeer`] answers requests.
#[derive(Clone, Debug)]
pub enum PeerBehavior {
    /// Answer immediately.
    Reply(Value),
    /// Fail with a connection error.
    Unreachable,
    /// Answer after a delay.
    Delayed(Duration, Value),
    /// Never answer.
    Silent,
}

/// A scripted remote peer that records every request.
pub struct MockPeer {
    address: PeerAddress,
    behavior: PeerBehavior,
    requests: Mutex<Vec<(PeerCommand, Value)>>,
}

impl MockPeer {
    pub fn new(host: &str, port: u16, behavior: PeerBehavior) -> Arc<Self> {
        Arc::new(Self {
            address: PeerAddress::new(host, port),
            behavior,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// A peer that acknowledges every request with `{"ok": true}`.
    pub fn ok(host: &str, port: u16) -> Arc<Self> {
        Self::new(host, port, PeerBehavior::Reply(json!({ "ok": true })))
    }

    pub fn unreachable(host: &str, port: u16) -> Arc<Self> {
        Self::new(host, port, PeerBehavior::Unreachable)
    }

    pub fn requests(&self) -> Vec<(PeerCommand, Value)> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Peer for MockPeer {
    fn address(&self) -> &PeerAddress {
        &self.address
    }

    async fn request(&self, command: PeerCommand, payload: Value) -> Result<Value, PeerError> {
        self.requests.lock().push((command, payload));
        match &self.behavior {
            PeerBehavior::Reply(reply) => Ok(reply.clone()),
            PeerBehavior::Unreachable => {
                Err(PeerError::ConnectionFailed(self.address.to_string()))
            }
            PeerBehavior::Delayed(delay, reply) => {
                tokio::time::sleep(*delay).await;
                Ok(reply.clone())
            }
            PeerBehavior::Silent => {
                std::future::pending::<()>().await;
                Err(PeerError::Timeout)
            }
        }
    }
}

/// In-memory peer directory.
#[derive(Default)]
pub struct MockDirectory {
    connected: Vec<Arc<MockPeer>>,
    recent: Vec<Arc<MockPeer>>,
    dialable: HashMap<PeerAddress, Arc<MockPeer>>,
    add_attempts: Mutex<Vec<(PeerAddress, String)>>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connected(mut self, peer: Arc<MockPeer>) -> Self {
        self.connected.push(peer);
        self
    }

    pub fn with_recent(mut self, peer: Arc<MockPeer>) -> Self {
        self.recent.push(peer);
        self
    }

    /// A peer that is not known yet but accepts `add_peer`.
    pub fn with_dialable(mut self, peer: Arc<MockPeer>) -> Self {
        self.dialable.insert(peer.address().clone(), peer);
        self
    }

    /// `(address, source)` of every `add_peer` call.
    pub fn add_attempts(&self) -> Vec<(PeerAddress, String)> {
        self.add_attempts.lock().clone()
    }
}

#[async_trait]
impl PeerDirectory for MockDirectory {
    fn connected_peers(&self) -> Vec<Arc<dyn Peer>> {
        self.connected
            .iter()
            .map(|p| p.clone() as Arc<dyn Peer>)
            .collect()
    }

    fn recent_peers(&self, limit: usize) -> Vec<Arc<dyn Peer>> {
        self.recent
            .iter()
            .take(limit)
            .map(|p| p.clone() as Arc<dyn Peer>)
            .collect()
    }

    fn get_peer(&self, address: &PeerAddress) -> Option<Arc<dyn Peer>> {
        self.connected
            .iter()
            .chain(self.recent.iter())
            .find(|p| p.address() == address)
            .map(|p| p.clone() as Arc<dyn Peer>)
    }

    async fn add_peer(&self, address: &PeerAddress, source: &str) -> Option<Arc<dyn Peer>> {
        self.add_attempts
            .lock()
            .push((address.clone(), source.to_string()));
        self.dialable
            .get(address)
            .map(|p| p.clone() as Arc<dyn Peer>)
    }
}

/// Site store with a replaceable policy.
pub struct StaticSiteStore {
    address: String,
    policy: Mutex<Result<SitePolicy, StoreError>>,
}

impl StaticSiteStore {
    pub fn new(address: &str, policy: SitePolicy) -> Self {
        Self {
            address: address.to_string(),
            policy: Mutex::new(Ok(policy)),
        }
    }

    pub fn set_policy(&self, policy: Result<SitePolicy, StoreError>) {
        *self.policy.lock() = policy;
    }
}

impl SiteStore for StaticSiteStore {
    fn site_address(&self) -> String {
        self.address.clone()
    }

    fn load_policy(&self) -> Result<SitePolicy, StoreError> {
        self.policy.lock().clone()
    }
}

/// Fixed site and user keys.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity {
    pub site_key: Option<String>,
    pub auth_key: Option<String>,
}

impl StaticIdentity {
    /// No keys at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_auth_key(key: &str) -> Self {
        Self {
            site_key: None,
            auth_key: Some(key.to_string()),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn site_private_key(&self, _site: &str) -> Option<String> {
        self.site_key.clone()
    }

    fn auth_private_key(&self, _site: &str) -> Option<String> {
        self.auth_key.clone()
    }
}

/// Listener channel that records pushed events.
pub struct RecordingChannel {
    id: u64,
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingChannel {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }
}

impl ListenerChannel for RecordingChannel {
    fn id(&self) -> u64 {
        self.id
    }

    fn send(&self, event: &str, payload: Value) {
        self.events.lock().push((event.to_string(), payload));
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    millis: AtomicU64,
}

impl ManualTimeSource {
    /// Start at `secs` seconds since the epoch.
    pub fn new(secs: u64) -> Self {
        Self {
            millis: AtomicU64::new(secs * 1000),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
