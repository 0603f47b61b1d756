//! # Peer Messaging Service
//!
//! The Dispatch Engine. Implements both inbound ports:
//! - [`PeerMessagingApi`]: broadcast / direct send / verdicts for local clients
//! - [`PeerMessageReceiver`]: messages arriving from remote peers
//!
//! It depends on four outbound ports plus a clock:
//! - [`PeerDirectory`]: connected and recent peers, dialing
//! - [`SiteStore`]: the site's address and P2P policy
//! - [`IdentityProvider`]: site and user private keys
//! - [`CryptoProvider`]: digest, address derivation, signing, verification
//!
//! ## Broadcast
//!
//! 1. Policy Filter (scope `self`); a rejection never reaches the network
//! 2. Envelope built and signed
//! 3. Peer set: up to `peer_count` connected peers, backfilled from recent peers
//! 4. One spawned task per peer; a failing peer becomes a result record
//! 5. Hash recorded as seen, message echoed to local listeners (or queued)
//! 6. Fire-and-forget returns at once; otherwise results are collected until
//!    all peers answered or the timeout elapsed

pub mod codec;


use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MessagingConfig;
use crate::domain::{
    cleanup_task, decode_payload, BroadcastOutcome, BroadcastPayload, BroadcastRequest,
    DirectPayload, DirectSendOutcome, EchoDelivery, Envelope, KeySelector, LocalEcho,
    MessagingMetrics, PeerAddress, PeerReceiveEvent, PeerResult, PolicyFilter, PolicyViolation,
    RateState, RelayCounters, ReplyCorrelator, Resolution, SafePatternMatcher, SeenMessageCache,
    SitePolicy, SELF_SCOPE,
};
use crate::events::{MessagingError, PeerCommand};
use crate::ports::inbound::{PeerMessageReceiver, PeerMessagingApi};
use crate::ports::outbound::{
    CryptoProvider, IdentityProvider, ListenerChannel, Peer, PeerDirectory, SiteStore, TimeSource,
};

use self::codec::{build_envelope, verify_envelope};

/// `add_peer` source tag for peers dialed by a direct send.
pub const DIRECT_SEND_SOURCE: &str = "peerSend";

/// Shared mutable relay state.
///
/// One instance per site; several service handles may share it.
pub struct RelayState {
    /// Hashes already processed (sent or received).
    pub seen: SeenMessageCache,
    /// Last send time per rate scope.
    pub rate: RateState,
    /// Pending verdicts and replies.
    pub correlator: Arc<ReplyCorrelator>,
    /// Local listeners and the unread buffer.
    pub echo: LocalEcho,
    pub counters: RelayCounters,
}

impl RelayState {
    pub fn new(config: &MessagingConfig) -> Self {
        Self {
            seen: SeenMessageCache::new(config.seen_cache_size),
            rate: RateState::new(),
            correlator: Arc::new(ReplyCorrelator::new()),
            echo: LocalEcho::new(),
            counters: RelayCounters::default(),
        }
    }
}

/// Peer Messaging Service.
///
/// ## Thread Safety
///
/// Thread-safe; share across tasks via `Arc`. All mutable state lives in
/// [`RelayState`], whose parts each guard themselves.
pub struct PeerMessagingService<D, S, I, C>
where
    D: PeerDirectory,
    S: SiteStore,
    I: IdentityProvider,
    C: CryptoProvider,
{
    config: MessagingConfig,
    state: Arc<RelayState>,
    policy_filter: PolicyFilter,
    directory: Arc<D>,
    site: Arc<S>,
    identity: Arc<I>,
    crypto: Arc<C>,
    clock: Arc<dyn TimeSource>,
}

impl<D, S, I, C> PeerMessagingService<D, S, I, C>
where
    D: PeerDirectory,
    S: SiteStore,
    I: IdentityProvider,
    C: CryptoProvider,
{
    pub fn new(
        config: MessagingConfig,
        directory: Arc<D>,
        site: Arc<S>,
        identity: Arc<I>,
        crypto: Arc<C>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let state = Arc::new(RelayState::new(&config));
        Self::with_state(config, state, directory, site, identity, crypto, clock)
    }

    /// Build a service over existing relay state.
    pub fn with_state(
        config: MessagingConfig,
        state: Arc<RelayState>,
        directory: Arc<D>,
        site: Arc<S>,
        identity: Arc<I>,
        crypto: Arc<C>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            policy_filter: PolicyFilter::new(SafePatternMatcher::new(config.pattern_limits())),
            config,
            state,
            directory,
            site,
            identity,
            crypto,
            clock,
        }
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Spawn the periodic sweep of expired reply slots.
    pub fn spawn_housekeeping(&self) -> JoinHandle<()> {
        tokio::spawn(cleanup_task(
            Arc::clone(&self.state.correlator),
            self.config.cleanup_interval(),
            self.config.pending_ttl,
        ))
    }

    fn load_policy(&self) -> Result<SitePolicy, MessagingError> {
        Ok(self.site.load_policy()?)
    }

    fn resolve_key(&self, key: &KeySelector, site: &str) -> Option<String> {
        key.resolve(
            || self.identity.site_private_key(site),
            || self.identity.auth_private_key(site),
        )
    }

    /// Up to `peer_count` connected peers, backfilled with recent ones.
    fn select_peers(&self, peer_count: usize) -> Vec<Arc<dyn Peer>> {
        let mut peers: Vec<Arc<dyn Peer>> = self
            .directory
            .connected_peers()
            .into_iter()
            .take(peer_count)
            .collect();

        if peers.len() < peer_count {
            let mut selected: HashSet<PeerAddress> =
                peers.iter().map(|p| p.address().clone()).collect();
            for peer in self.directory.recent_peers(peer_count - peers.len()) {
                if peers.len() >= peer_count {
                    break;
                }
                if selected.insert(peer.address().clone()) {
                    peers.push(peer);
                }
            }
        }

        peers
    }

    /// Spawn one `peerBroadcast` round-trip per peer.
    ///
    /// Results arrive on the returned channel in completion order. Tasks keep
    /// running if the receiver is dropped; their results are discarded.
    fn dispatch(&self, peers: &[Arc<dyn Peer>], payload: Value) -> mpsc::Receiver<PeerResult> {
        let (tx, rx) = mpsc::channel(peers.len().max(1));

        for peer in peers {
            let peer = Arc::clone(peer);
            let tx = tx.clone();
            let payload = payload.clone();
            let state = Arc::clone(&self.state);
            state.counters.record_peer_request();

            tokio::spawn(async move {
                let ip = peer.address().to_string();
                let result = match peer.request(PeerCommand::Broadcast, payload).await {
                    Ok(reply) => {
                        debug!(peer = %ip, "Peer answered broadcast");
                        PeerResult::replied(ip, reply)
                    }
                    Err(e) => {
                        state.counters.record_peer_failure();
                        warn!(peer = %ip, error = %e, "Broadcast to peer failed");
                        PeerResult::connection_error(ip)
                    }
                };
                let _ = tx.send(result).await;
            });
        }

        rx
    }

    /// Gather results until every peer answered or `timeout` elapsed.
    ///
    /// Peers still outstanding get a `Timeout` record.
    async fn collect(
        peers: &[Arc<dyn Peer>],
        mut results_rx: mpsc::Receiver<PeerResult>,
        timeout: Duration,
    ) -> Vec<PeerResult> {
        // Timeouts past the representable instant wait for every peer.
        let deadline = Instant::now().checked_add(timeout);
        let mut results = Vec::with_capacity(peers.len());

        while results.len() < peers.len() {
            let received = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, results_rx.recv()).await,
                None => Ok(results_rx.recv().await),
            };
            match received {
                Ok(Some(result)) => results.push(result),
                Ok(None) | Err(_) => break,
            }
        }

        if results.len() < peers.len() {
            let answered: HashSet<String> = results.iter().map(|r| r.ip.clone()).collect();
            let outstanding: Vec<_> = peers
                .iter()
                .map(|p| p.address().to_string())
                .filter(|ip| !answered.contains(ip))
                .collect();
            debug!(outstanding = outstanding.len(), "Broadcast wait timed out");
            results.extend(outstanding.into_iter().map(PeerResult::timed_out));
        }

        results
    }

    fn reject(&self, violation: PolicyViolation) -> MessagingError {
        self.state.counters.record_broadcast_rejected();
        violation.into()
    }
}

#[async_trait]
impl<D, S, I, C> PeerMessagingApi for PeerMessagingService<D, S, I, C>
where
    D: PeerDirectory,
    S: SiteStore,
    I: IdentityProvider,
    C: CryptoProvider,
{
    fn site_address(&self) -> String {
        self.site.site_address()
    }

    async fn broadcast(
        &self,
        request: BroadcastRequest,
    ) -> Result<BroadcastOutcome, MessagingError> {
        let site = self.site.site_address();
        let policy = self.load_policy()?;

        self.policy_filter
            .evaluate(
                &site,
                &policy,
                &request.message,
                SELF_SCOPE,
                self.clock.now(),
                &self.state.rate,
            )
            .map_err(|v| self.reject(v))?;

        let payload = BroadcastPayload {
            message: request.message.clone(),
            peer_count: request.peer_count,
            broadcast: request.broadcast,
            immediate: request.immediate,
            site: site.clone(),
        };
        let private_key = self.resolve_key(&request.key, &site);
        let envelope = build_envelope(self.crypto.as_ref(), &payload, private_key.as_deref())?;
        let wire = serde_json::to_value(&envelope)?;

        // Recorded before any peer can echo it back
        self.state.seen.insert(&envelope.hash);

        let peers = self.select_peers(request.peer_count);
        let results_rx = self.dispatch(&peers, wire);

        let delivery = self
            .state
            .echo
            .deliver(PeerReceiveEvent::local(&envelope, request.message), request.immediate);

        self.state.counters.record_broadcast_accepted();
        info!(
            site = %site,
            hash = %envelope.hash,
            peers = peers.len(),
            signed = envelope.is_signed(),
            local = ?delivery,
            "Broadcasting P2P message"
        );

        if request.broadcast {
            return Ok(BroadcastOutcome::Sent);
        }

        let results = Self::collect(&peers, results_rx, request.timeout).await;
        Ok(BroadcastOutcome::Collected(results))
    }

    async fn send_to(
        &self,
        ip: &str,
        message: Value,
        key: KeySelector,
    ) -> Result<DirectSendOutcome, MessagingError> {
        let site = self.site.site_address();
        let address =
            PeerAddress::parse(ip).ok_or_else(|| MessagingError::PeerNotFound(ip.to_string()))?;

        let peer = match self.directory.get_peer(&address) {
            Some(peer) => peer,
            None => self
                .directory
                .add_peer(&address, DIRECT_SEND_SOURCE)
                .await
                .ok_or_else(|| {
                    warn!(peer = %address, "Could not reach peer for direct send");
                    MessagingError::PeerNotFound(ip.to_string())
                })?,
        };

        let payload = DirectPayload {
            message,
            site: site.clone(),
        };
        let private_key = self.resolve_key(&key, &site);
        let envelope = build_envelope(self.crypto.as_ref(), &payload, private_key.as_deref())?;

        self.state.counters.record_direct_send();
        self.state.counters.record_peer_request();
        info!(site = %site, peer = %address, hash = %envelope.hash, "Sending direct P2P message");

        let response = peer
            .request(PeerCommand::Send, serde_json::to_value(&envelope)?)
            .await
            .map_err(|e| {
                self.state.counters.record_peer_failure();
                warn!(peer = %address, error = %e, "Direct send failed");
                MessagingError::PeerUnreachable
            })?;

        match response.get("reply") {
            Some(reply) => {
                debug!(peer = %address, hash = %envelope.hash, "Peer replied");
                Ok(DirectSendOutcome::Replied(reply.clone()))
            }
            None => Ok(DirectSendOutcome::Acknowledged),
        }
    }

    fn resolve_verdict(&self, hash: &str, valid: bool) -> bool {
        self.state
            .correlator
            .resolve(hash, Resolution::Verdict(valid))
    }

    fn resolve_reply(&self, hash: &str, reply: Value) -> bool {
        self.state.correlator.resolve(hash, Resolution::Reply(reply))
    }

    fn subscribe_listener(
        &self,
        channel: Arc<dyn ListenerChannel>,
    ) -> Result<bool, MessagingError> {
        if !self.load_policy()?.is_enabled() {
            return Ok(false);
        }
        let id = channel.id();
        let flushed = self.state.echo.subscribe(channel);
        debug!(channel = id, flushed = flushed, "Listener joined peerReceive");
        Ok(true)
    }

    fn unsubscribe_listener(&self, channel_id: u64) -> bool {
        self.state.echo.unsubscribe(channel_id)
    }

    fn metrics(&self) -> MessagingMetrics {
        self.state.counters.snapshot()
    }
}

#[async_trait]
impl<D, S, I, C> PeerMessageReceiver for PeerMessagingService<D, S, I, C>
where
    D: PeerDirectory,
    S: SiteStore,
    I: IdentityProvider,
    C: CryptoProvider,
{
    async fn receive_broadcast(
        &self,
        from: &PeerAddress,
        envelope: Envelope,
    ) -> Result<Value, MessagingError> {
        if !self.state.seen.insert(&envelope.hash) {
            debug!(peer = %from, hash = %envelope.hash, "Ignoring already received message");
            return Err(MessagingError::AlreadyReceived);
        }

        let payload: BroadcastPayload = decode_payload(&envelope)
            .map_err(|e| MessagingError::MalformedEnvelope(e.to_string()))?;
        let site = self.site.site_address();
        if payload.site != site {
            return Err(MessagingError::UnknownSite(payload.site));
        }

        let policy = self.load_policy()?;
        let serialized = self.policy_filter.evaluate(
            &site,
            &policy,
            &payload.message,
            &from.to_string(),
            self.clock.now(),
            &self.state.rate,
        )?;

        verify_envelope(self.crypto.as_ref(), &envelope)?;
        self.state.counters.record_message_received();

        let event = PeerReceiveEvent::new(from.to_string(), &envelope, payload.message);
        let delivery = self.state.echo.deliver(event, payload.immediate);
        debug!(peer = %from, hash = %envelope.hash, delivery = ?delivery, "Received P2P broadcast");

        let EchoDelivery::Delivered(_) = delivery else {
            return Ok(json!({ "ok": true }));
        };

        self.state.correlator.register(&envelope.hash);
        match self
            .state
            .correlator
            .wait(&envelope.hash, self.config.verdict_timeout)
            .await?
        {
            Resolution::Verdict(false) => Err(PolicyViolation::InvalidMessage {
                site,
                message: serialized,
            }
            .into()),
            Resolution::Verdict(true) | Resolution::Reply(_) => Ok(json!({ "ok": true })),
        }
    }

    async fn receive_send(
        &self,
        from: &PeerAddress,
        envelope: Envelope,
    ) -> Result<Value, MessagingError> {
        let payload: DirectPayload = decode_payload(&envelope)
            .map_err(|e| MessagingError::MalformedEnvelope(e.to_string()))?;
        if payload.site != self.site.site_address() {
            return Err(MessagingError::UnknownSite(payload.site));
        }

        verify_envelope(self.crypto.as_ref(), &envelope)?;
        self.state.counters.record_message_received();

        let event = PeerReceiveEvent::new(from.to_string(), &envelope, payload.message);
        let EchoDelivery::Delivered(_) = self.state.echo.deliver(event, false) else {
            return Ok(json!({ "ok": true }));
        };

        self.state.correlator.register(&envelope.hash);
        match self
            .state
            .correlator
            .wait(&envelope.hash, self.config.reply_timeout)
            .await
        {
            Ok(Resolution::Reply(reply)) => Ok(json!({ "reply": reply })),
            Ok(Resolution::Verdict(_)) => Ok(json!({ "ok": true })),
            Err(e) => {
                debug!(peer = %from, error = %e, "No reply for direct message");
                Ok(json!({ "ok": true }))
            }
        }
    }
}
