//! Relay counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated by the dispatcher.
#[derive(Debug, Default)]
pub struct RelayCounters {
    broadcasts_accepted: AtomicU64,
    broadcasts_rejected: AtomicU64,
    direct_sends: AtomicU64,
    peer_requests: AtomicU64,
    peer_failures: AtomicU64,
    messages_received: AtomicU64,
}

impl RelayCounters {
    pub fn record_broadcast_accepted(&self) {
        self.broadcasts_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast_rejected(&self) {
        self.broadcasts_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_direct_send(&self) {
        self.direct_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_request(&self) {
        self.peer_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_failure(&self) {
        self.peer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MessagingMetrics {
        MessagingMetrics {
            broadcasts_accepted: self.broadcasts_accepted.load(Ordering::Relaxed),
            broadcasts_rejected: self.broadcasts_rejected.load(Ordering::Relaxed),
            direct_sends: self.direct_sends.load(Ordering::Relaxed),
            peer_requests: self.peer_requests.load(Ordering::Relaxed),
            peer_failures: self.peer_failures.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the relay counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MessagingMetrics {
    pub broadcasts_accepted: u64,
    pub broadcasts_rejected: u64,
    pub direct_sends: u64,
    pub peer_requests: u64,
    pub peer_failures: u64,
    pub messages_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let counters = RelayCounters::default();
        counters.record_broadcast_accepted();
        counters.record_peer_request();
        counters.record_peer_request();
        counters.record_peer_failure();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.broadcasts_accepted, 1);
        assert_eq!(snapshot.peer_requests, 2);
        assert_eq!(snapshot.peer_failures, 1);
        assert_eq!(snapshot.direct_sends, 0);
    }
}
