//! Inbound ports (API) for the Peer Messaging subsystem.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::domain::{
    BroadcastOutcome, BroadcastRequest, DirectSendOutcome, Envelope, KeySelector,
    MessagingMetrics, PeerAddress,
};
use crate::events::MessagingError;
use crate::ports::outbound::ListenerChannel;

/// Operations offered to local clients of the site.
#[async_trait]
pub trait PeerMessagingApi: Send + Sync {
    /// Address of the site this relay serves.
    fn site_address(&self) -> String;

    /// Validate, sign and fan a message out to the site's peers.
    ///
    /// Policy rejections return before any peer is contacted. Per-peer
    /// failures never fail the call; they appear as result records.
    async fn broadcast(&self, request: BroadcastRequest)
        -> Result<BroadcastOutcome, MessagingError>;

    /// Send a message to exactly one peer (`ip:port`) and return its reply.
    async fn send_to(
        &self,
        ip: &str,
        message: Value,
        key: KeySelector,
    ) -> Result<DirectSendOutcome, MessagingError>;

    /// `peerValid` / `peerInvalid`. Returns `false` if already settled.
    fn resolve_verdict(&self, hash: &str, valid: bool) -> bool;

    /// `peerReply`. Returns `false` if already settled.
    fn resolve_reply(&self, hash: &str, reply: Value) -> bool;

    /// Join a channel to `peerReceive`. Returns `false` when the site does
    /// not declare `p2p_filter` and the channel was not joined.
    fn subscribe_listener(&self, channel: Arc<dyn ListenerChannel>)
        -> Result<bool, MessagingError>;

    fn unsubscribe_listener(&self, channel_id: u64) -> bool;

    fn metrics(&self) -> MessagingMetrics;
}

/// Handle for messages arriving from remote peers.
#[async_trait]
pub trait PeerMessageReceiver: Send + Sync {
    /// Incoming `peerBroadcast`. Answers `{"ok": true}` when accepted.
    async fn receive_broadcast(
        &self,
        from: &PeerAddress,
        envelope: Envelope,
    ) -> Result<Value, MessagingError>;

    /// Incoming `peerSend`. Answers `{"reply": ...}` or `{"ok": true}`.
    async fn receive_send(
        &self,
        from: &PeerAddress,
        envelope: Envelope,
    ) -> Result<Value, MessagingError>;
}
