//! Reply Correlator - hash-keyed single-resolution slots.
//!
//! Flow:
//! 1. The dispatcher delivers a message and calls `register()` with its hash
//! 2. A local client later signals `peerValid`/`peerInvalid`/`peerReply`,
//!    which calls `resolve()`
//! 3. The dispatcher `wait()`s for the resolution or times out
//!
//! The first resolution of a hash wins; later ones are no-ops. A resolution
//! that arrives before anyone waits creates the slot already settled.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Value a pending hash is settled with.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// `peerValid` (`true`) or `peerInvalid` (`false`).
    Verdict(bool),
    /// `peerReply` payload.
    Reply(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelatorError {
    #[error("Timeout waiting for {hash}")]
    Timeout { hash: String },

    /// The slot was dropped by housekeeping while a waiter was parked on it.
    #[error("Pending reply for {hash} was abandoned")]
    Abandoned { hash: String },
}

struct Slot {
    tx: watch::Sender<Option<Resolution>>,
    created_at: Instant,
}

impl Slot {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx,
            created_at: Instant::now(),
        }
    }

    fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Statistics for the correlator
#[derive(Debug, Default)]
pub struct CorrelatorStats {
    /// Slots registered by a dispatcher
    pub total_registered: AtomicU64,
    /// First resolutions accepted
    pub total_resolved: AtomicU64,
    /// Second and later resolutions ignored
    pub total_duplicates: AtomicU64,
    /// Waits that timed out
    pub total_timeouts: AtomicU64,
}

/// Pending reply table keyed by envelope hash.
#[derive(Default)]
pub struct ReplyCorrelator {
    slots: DashMap<String, Slot>,
    stats: CorrelatorStats,
}

impl ReplyCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for `hash`. Returns `false` if one already exists.
    pub fn register(&self, hash: &str) -> bool {
        let mut created = false;
        self.slots.entry(hash.to_string()).or_insert_with(|| {
            created = true;
            Slot::new()
        });
        if created {
            self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
            debug!(hash = %hash, "Registered pending reply");
        }
        created
    }

    /// Settle `hash`. Returns `true` only for the first resolution.
    pub fn resolve(&self, hash: &str, resolution: Resolution) -> bool {
        let slot = self.slots.entry(hash.to_string()).or_insert_with(|| {
            warn!(hash = %hash, "Resolution for a hash nobody is waiting on yet");
            Slot::new()
        });

        let accepted = slot.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(resolution);
            true
        });

        if accepted {
            self.stats.total_resolved.fetch_add(1, Ordering::Relaxed);
            debug!(hash = %hash, "Resolved pending reply");
        } else {
            self.stats.total_duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(hash = %hash, "Ignoring duplicate resolution");
        }
        accepted
    }

    /// Wait for `hash` to be settled, at most `timeout`.
    ///
    /// The slot is removed once the wait finishes either way.
    pub async fn wait(&self, hash: &str, timeout: Duration) -> Result<Resolution, CorrelatorError> {
        let mut rx = self
            .slots
            .entry(hash.to_string())
            .or_insert_with(Slot::new)
            .tx
            .subscribe();

        let outcome = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(settled)) => (*settled).clone().ok_or_else(|| CorrelatorError::Abandoned {
                hash: hash.to_string(),
            }),
            Ok(Err(_)) => Err(CorrelatorError::Abandoned {
                hash: hash.to_string(),
            }),
            Err(_) => {
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(hash = %hash, timeout_ms = timeout.as_millis(), "Timed out waiting for reply");
                Err(CorrelatorError::Timeout {
                    hash: hash.to_string(),
                })
            }
        };

        self.slots.remove(hash);
        outcome
    }

    pub fn is_pending(&self, hash: &str) -> bool {
        self.slots
            .get(hash)
            .map(|slot| !slot.is_settled())
            .unwrap_or(false)
    }

    /// Number of slots, settled or not.
    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }

    /// Drop slots older than `ttl`. Returns the number removed.
    pub fn remove_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.slots.retain(|hash, slot| {
            let elapsed = now.duration_since(slot.created_at);
            if elapsed > ttl {
                debug!(
                    hash = %hash,
                    settled = slot.is_settled(),
                    elapsed_ms = elapsed.as_millis(),
                    "Removing expired reply slot"
                );
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }

    pub fn stats(&self) -> &CorrelatorStats {
        &self.stats
    }
}

/// Background task dropping expired slots
pub async fn cleanup_task(correlator: Arc<ReplyCorrelator>, interval: Duration, ttl: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        let removed = correlator.remove_expired(ttl);
        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired reply slots");
        }
    }
}
