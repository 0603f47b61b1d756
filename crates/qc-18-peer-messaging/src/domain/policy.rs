//! # Policy Filter
//!
//! Validates a message against the rules a site declares in its content
//! document. Checks run in a fixed order and the first failure wins:
//!
//! 1. `p2p_filter` absent: P2P is disabled for the site
//! 2. canonical JSON of the message must match `p2p_filter` (prefix match)
//! 3. `p2p_freq_limit`: minimum seconds between sends of one scope
//! 4. `p2p_size_limit`: maximum canonical JSON length in bytes
//!
//! Step 3 commits the scope's timestamp as soon as it passes, so a message
//! later refused by step 4 still counts as a send.

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use super::{to_canonical_string, SafePatternMatcher, Timestamp};

/// Rate scope for locally originated messages.
pub const SELF_SCOPE: &str = "self";

/// Per-site P2P rules, read from the site's content document.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct SitePolicy {
    /// Presence enables P2P; the value is the message pattern.
    #[serde(default)]
    pub p2p_filter: Option<String>,
    /// Minimum seconds between sends of one scope.
    #[serde(default)]
    pub p2p_freq_limit: Option<f64>,
    /// Maximum serialized message length in bytes.
    #[serde(default)]
    pub p2p_size_limit: Option<f64>,
}

impl SitePolicy {
    /// Parse from a site content document. Unknown keys are ignored.
    pub fn from_json(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }

    /// Policy that accepts every message.
    pub fn open() -> Self {
        Self {
            p2p_filter: Some(".*".to_string()),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.p2p_filter.is_some()
    }
}

/// A message refused by the policy filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Site {site} doesn't support P2P messages")]
    NotSupported { site: String },

    #[error("Invalid message for site {site}: {message}")]
    InvalidMessage { site: String, message: String },

    #[error("Too fast messages")]
    TooFast,

    #[error("Too big message")]
    TooBig,
}

/// Scope count at which idle scopes are first pruned.
const PRUNE_THRESHOLD: usize = 1024;

/// Last send time per rate scope.
///
/// The check and the commit happen under one lock, so two concurrent sends
/// of the same scope cannot both pass.
///
/// Scopes idle for longer than the widest interval ever checked cannot
/// refuse a send, and are pruned whenever the map doubles past
/// [`PRUNE_THRESHOLD`].
#[derive(Debug)]
pub struct RateState {
    inner: Mutex<RateInner>,
}

#[derive(Debug)]
struct RateInner {
    last_send: HashMap<String, Timestamp>,
    widest_interval_secs: f64,
    prune_at: usize,
}

impl Default for RateState {
    fn default() -> Self {
        Self {
            inner: Mutex::new(RateInner {
                last_send: HashMap::new(),
                widest_interval_secs: 0.0,
                prune_at: PRUNE_THRESHOLD,
            }),
        }
    }
}

impl RateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` (leaving the state unchanged) if the previous send of
    /// `scope` was less than `min_interval_secs` ago. Otherwise records `now`.
    pub fn check_and_commit(&self, scope: &str, now: Timestamp, min_interval_secs: f64) -> bool {
        let mut inner = self.inner.lock();
        inner.widest_interval_secs = inner.widest_interval_secs.max(min_interval_secs);

        if let Some(previous) = inner.last_send.get(scope) {
            if now.secs_since(*previous) < min_interval_secs {
                return false;
            }
        } else if inner.last_send.len() >= inner.prune_at {
            inner.prune(now);
        }

        inner.last_send.insert(scope.to_string(), now);
        true
    }

    pub fn last_send(&self, scope: &str) -> Option<Timestamp> {
        self.inner.lock().last_send.get(scope).copied()
    }

    pub fn scopes(&self) -> usize {
        self.inner.lock().last_send.len()
    }
}

impl RateInner {
    fn prune(&mut self, now: Timestamp) {
        let widest = self.widest_interval_secs;
        let before = self.last_send.len();
        self.last_send.retain(|_, previous| now.secs_since(*previous) < widest);
        self.prune_at = PRUNE_THRESHOLD.max(self.last_send.len() * 2);
        debug!(
            removed = before - self.last_send.len(),
            remaining = self.last_send.len(),
            "Pruned idle rate scopes"
        );
    }
}

/// Ordered, short-circuiting site policy checks.
pub struct PolicyFilter {
    matcher: SafePatternMatcher,
}

impl PolicyFilter {
    pub fn new(matcher: SafePatternMatcher) -> Self {
        Self { matcher }
    }

    /// Evaluate `message` for `site`.
    ///
    /// On success returns the canonical JSON of the message (the form that
    /// was matched and measured).
    pub fn evaluate(
        &self,
        site: &str,
        policy: &SitePolicy,
        message: &Value,
        scope: &str,
        now: Timestamp,
        rate: &RateState,
    ) -> Result<String, PolicyViolation> {
        let Some(filter) = policy.p2p_filter.as_deref() else {
            warn!(site = %site, "P2P message for site without p2p_filter");
            return Err(PolicyViolation::NotSupported {
                site: site.to_string(),
            });
        };

        let serialized = to_canonical_string(message).map_err(|_| PolicyViolation::InvalidMessage {
            site: site.to_string(),
            message: message.to_string(),
        })?;

        if !self.matcher.is_match(filter, &serialized) {
            warn!(site = %site, scope = scope, "Message does not match p2p_filter");
            return Err(PolicyViolation::InvalidMessage {
                site: site.to_string(),
                message: serialized,
            });
        }

        if let Some(limit) = policy.p2p_freq_limit {
            if !rate.check_and_commit(scope, now, limit) {
                warn!(site = %site, scope = scope, limit_secs = limit, "Too fast messages");
                return Err(PolicyViolation::TooFast);
            }
        }

        if let Some(limit) = policy.p2p_size_limit {
            if serialized.len() as f64 > limit {
                warn!(
                    site = %site,
                    size = serialized.len(),
                    limit = limit,
                    "Too big message"
                );
                return Err(PolicyViolation::TooBig);
            }
        }

        Ok(serialized)
    }
}

impl Default for PolicyFilter {
    fn default() -> Self {
        Self::new(SafePatternMatcher::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Barrier;
    use std::thread;

    const SITE: &str = "1SiteAddr";

    fn policy(filter: Option<&str>, freq: Option<f64>, size: Option<f64>) -> SitePolicy {
        SitePolicy {
            p2p_filter: filter.map(str::to_string),
            p2p_freq_limit: freq,
            p2p_size_limit: size,
        }
    }

    #[test]
    fn test_from_json_ignores_unknown_keys() {
        let parsed = SitePolicy::from_json(
            r#"{"title": "Chat", "p2p_filter": ".*", "p2p_freq_limit": 1.5, "files": {}}"#,
        )
        .unwrap();
        assert_eq!(parsed, policy(Some(".*"), Some(1.5), None));
        assert!(parsed.is_enabled());

        let disabled = SitePolicy::from_json(r#"{"title": "Blog"}"#).unwrap();
        assert!(!disabled.is_enabled());
    }

    #[test]
    fn test_missing_filter_rejected() {
        let filter = PolicyFilter::default();
        let rate = RateState::new();
        let result = filter.evaluate(
            SITE,
            &policy(None, None, None),
            &json!("hi"),
            SELF_SCOPE,
            Timestamp::from_secs(1),
            &rate,
        );
        assert_eq!(
            result,
            Err(PolicyViolation::NotSupported { site: SITE.into() })
        );
        assert_eq!(
            result.unwrap_err().to_string(),
            "Site 1SiteAddr doesn't support P2P messages"
        );
    }

    #[test]
    fn test_pattern_mismatch_rejected() {
        let filter = PolicyFilter::default();
        let rate = RateState::new();
        let result = filter.evaluate(
            SITE,
            &policy(Some(r#"\["chat""#), None, None),
            &json!(["spam", 1]),
            SELF_SCOPE,
            Timestamp::from_secs(1),
            &rate,
        );
        assert_eq!(
            result.unwrap_err().to_string(),
            r#"Invalid message for site 1SiteAddr: ["spam", 1]"#
        );
    }

    #[test]
    fn test_returns_canonical_form() {
        let filter = PolicyFilter::default();
        let rate = RateState::new();
        let serialized = filter
            .evaluate(
                SITE,
                &SitePolicy::open(),
                &json!({ "a": 1, "b": [1, 2] }),
                SELF_SCOPE,
                Timestamp::from_secs(1),
                &rate,
            )
            .unwrap();
        assert_eq!(serialized, r#"{"a": 1, "b": [1, 2]}"#);
    }

    #[test]
    fn test_freq_limit() {
        let filter = PolicyFilter::default();
        let rate = RateState::new();
        let p = policy(Some(".*"), Some(10.0), None);
        let msg = json!("hi");

        assert!(filter
            .evaluate(SITE, &p, &msg, SELF_SCOPE, Timestamp::from_secs(100), &rate)
            .is_ok());
        assert_eq!(
            filter.evaluate(SITE, &p, &msg, SELF_SCOPE, Timestamp::from_secs(105), &rate),
            Err(PolicyViolation::TooFast)
        );
        // A refused send does not slide the window
        assert_eq!(rate.last_send(SELF_SCOPE), Some(Timestamp::from_secs(100)));
        assert!(filter
            .evaluate(SITE, &p, &msg, SELF_SCOPE, Timestamp::from_secs(110), &rate)
            .is_ok());
    }

    #[test]
    fn test_scopes_are_independent() {
        let filter = PolicyFilter::default();
        let rate = RateState::new();
        let p = policy(Some(".*"), Some(10.0), None);
        let msg = json!("hi");
        let now = Timestamp::from_secs(100);

        assert!(filter.evaluate(SITE, &p, &msg, SELF_SCOPE, now, &rate).is_ok());
        assert!(filter.evaluate(SITE, &p, &msg, "10.0.0.1:15441", now, &rate).is_ok());
        assert_eq!(rate.scopes(), 2);
    }

    #[test]
    fn test_concurrent_sends_of_one_scope_pass_once() {
        const THREADS: usize = 16;
        let rate = RateState::new();
        let barrier = Barrier::new(THREADS);
        let now = Timestamp::from_secs(100);

        let passed = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        rate.check_and_commit(SELF_SCOPE, now, 5.0)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|passed| *passed)
                .count()
        });

        assert_eq!(passed, 1);
        assert_eq!(rate.last_send(SELF_SCOPE), Some(now));
    }

    #[test]
    fn test_idle_scopes_pruned() {
        let rate = RateState::new();
        let start = Timestamp::from_secs(100);
        for i in 0..PRUNE_THRESHOLD {
            assert!(rate.check_and_commit(&format!("10.0.0.{i}:1"), start, 10.0));
        }
        assert_eq!(rate.scopes(), PRUNE_THRESHOLD);

        // Still inside the window: nothing can be dropped
        let soon = Timestamp::from_secs(105);
        assert!(rate.check_and_commit("10.9.9.9:1", soon, 10.0));
        assert_eq!(rate.scopes(), PRUNE_THRESHOLD + 1);
        assert!(!rate.check_and_commit("10.0.0.0:1", soon, 10.0));

        // Filling to the next mark drops the scopes idle for 10s or more.
        // The 1s limit used here does not shorten retention.
        let later = Timestamp::from_secs(112);
        for i in 0..PRUNE_THRESHOLD {
            assert!(rate.check_and_commit(&format!("10.1.0.{i}:1"), later, 1.0));
        }
        assert_eq!(rate.scopes(), PRUNE_THRESHOLD + 1);
        assert_eq!(rate.last_send("10.0.0.0:1"), None);
        assert_eq!(rate.last_send("10.9.9.9:1"), Some(soon));
        assert_eq!(rate.last_send("10.1.0.0:1"), Some(later));
    }

    #[test]
    fn test_size_limit() {
        let filter = PolicyFilter::default();
        let rate = RateState::new();
        // "\"abcd\"" is 6 bytes
        let p = policy(Some(".*"), None, Some(5.0));
        assert_eq!(
            filter.evaluate(SITE, &p, &json!("abcd"), SELF_SCOPE, Timestamp::from_secs(1), &rate),
            Err(PolicyViolation::TooBig)
        );
        assert!(filter
            .evaluate(SITE, &p, &json!("abc"), SELF_SCOPE, Timestamp::from_secs(1), &rate)
            .is_ok());
    }

    #[test]
    fn test_size_rejection_still_commits_timestamp() {
        let filter = PolicyFilter::default();
        let rate = RateState::new();
        let p = policy(Some(".*"), Some(10.0), Some(3.0));

        assert_eq!(
            filter.evaluate(
                SITE,
                &p,
                &json!("too long"),
                SELF_SCOPE,
                Timestamp::from_secs(50),
                &rate
            ),
            Err(PolicyViolation::TooBig)
        );
        assert_eq!(rate.last_send(SELF_SCOPE), Some(Timestamp::from_secs(50)));

        // Even a small message is now too fast
        assert_eq!(
            filter.evaluate(SITE, &p, &json!(1), SELF_SCOPE, Timestamp::from_secs(55), &rate),
            Err(PolicyViolation::TooFast)
        );
    }

    #[test]
    fn test_size_measured_on_escaped_form() {
        let filter = PolicyFilter::default();
        let rate = RateState::new();
        // One non-ASCII char is six bytes once escaped, plus two quotes
        let p = policy(Some(".*"), None, Some(7.0));
        assert_eq!(
            filter.evaluate(SITE, &p, &json!("\u{e9}"), SELF_SCOPE, Timestamp::from_secs(1), &rate),
            Err(PolicyViolation::TooBig)
        );
    }
}
