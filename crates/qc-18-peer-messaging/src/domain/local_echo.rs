//! Local Echo and Unread Buffer.
//!
//! Delivers `peerReceive` events to the site's subscribed listening
//! channels. When nobody listens, messages flagged `immediate` are queued
//! and handed to the first channel that subscribes.
//!
//! Listener list and buffer share one lock: a flush and a concurrent
//! delivery can neither lose nor duplicate a message.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::PeerReceiveEvent;
use crate::ports::outbound::ListenerChannel;

/// Push event name for relayed messages.
pub const PEER_RECEIVE_EVENT: &str = "peerReceive";

/// What happened to a delivered event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EchoDelivery {
    /// Pushed to this many live channels.
    Delivered(usize),
    /// No channel listening; appended to the unread buffer.
    Queued,
    /// No channel listening and not `immediate`.
    Dropped,
}

#[derive(Default)]
struct EchoInner {
    listeners: Vec<Arc<dyn ListenerChannel>>,
    unread: Vec<PeerReceiveEvent>,
}

#[derive(Default)]
pub struct LocalEcho {
    inner: Mutex<EchoInner>,
}

impl LocalEcho {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listening channel and flush the unread buffer to it, in order.
    ///
    /// Returns the number of flushed events. Subscribing the same channel id
    /// twice is a no-op.
    pub fn subscribe(&self, channel: Arc<dyn ListenerChannel>) -> usize {
        let mut inner = self.inner.lock();
        if inner.listeners.iter().any(|l| l.id() == channel.id()) {
            return 0;
        }

        let unread = std::mem::take(&mut inner.unread);
        let flushed = unread.len();
        for event in unread {
            channel.send(PEER_RECEIVE_EVENT, event.to_value());
        }
        if flushed > 0 {
            debug!(channel = channel.id(), flushed = flushed, "Flushed unread messages");
        }

        inner.listeners.push(channel);
        flushed
    }

    /// Remove a channel. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, channel_id: u64) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|l| l.id() != channel_id);
        inner.listeners.len() != before
    }

    pub fn deliver(&self, event: PeerReceiveEvent, immediate: bool) -> EchoDelivery {
        let mut inner = self.inner.lock();
        if !inner.listeners.is_empty() {
            let payload = event.to_value();
            for listener in &inner.listeners {
                listener.send(PEER_RECEIVE_EVENT, payload.clone());
            }
            return EchoDelivery::Delivered(inner.listeners.len());
        }

        if immediate {
            inner.unread.push(event);
            EchoDelivery::Queued
        } else {
            EchoDelivery::Dropped
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.lock().unread.len()
    }
}
