//! Relay configuration.
//!
//! Defaults match the client command defaults (`peer_count=5`, `timeout=60`).
//! Every field can be overridden from the environment:
//!
//! | variable                       | field                       |
//! |--------------------------------|-----------------------------|
//! | `QC_P2P_PEER_COUNT`            | `default_peer_count`        |
//! | `QC_P2P_TIMEOUT_SECS`          | `default_broadcast_timeout` |
//! | `QC_P2P_VERDICT_TIMEOUT_SECS`  | `verdict_timeout`           |
//! | `QC_P2P_REPLY_TIMEOUT_SECS`    | `reply_timeout`             |
//! | `QC_P2P_SEEN_CACHE_SIZE`       | `seen_cache_size`           |
//! | `QC_P2P_PENDING_TTL_SECS`      | `pending_ttl`               |

use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::domain::PatternLimits;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessagingConfig {
    /// Peers contacted per broadcast when the client does not say.
    pub default_peer_count: usize,
    /// Fan-out wait when the client does not say.
    pub default_broadcast_timeout: Duration,
    /// Receive path: wait for `peerValid` / `peerInvalid`.
    pub verdict_timeout: Duration,
    /// Receive path: wait for `peerReply`.
    pub reply_timeout: Duration,
    /// Envelope hashes remembered for deduplication.
    pub seen_cache_size: usize,
    /// Lifetime of an unread reply slot.
    pub pending_ttl: Duration,
    pub max_pattern_len: usize,
    pub max_pattern_repetitions: usize,
    pub regex_size_limit: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            default_peer_count: 5,
            default_broadcast_timeout: Duration::from_secs(60),
            verdict_timeout: Duration::from_secs(10),
            reply_timeout: Duration::from_secs(60),
            seen_cache_size: 10_000,
            pending_ttl: Duration::from_secs(300),
            max_pattern_len: 255,
            max_pattern_repetitions: 10,
            regex_size_limit: 1024 * 1024,
        }
    }
}

impl MessagingConfig {
    /// Defaults overridden by `QC_P2P_*` environment variables.
    ///
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let secs = |key: &str, fallback: Duration| {
            number(key).map(Duration::from_secs).unwrap_or(fallback)
        };

        Self {
            default_peer_count: number("QC_P2P_PEER_COUNT")
                .map(|n| n as usize)
                .unwrap_or(defaults.default_peer_count),
            default_broadcast_timeout: secs(
                "QC_P2P_TIMEOUT_SECS",
                defaults.default_broadcast_timeout,
            ),
            verdict_timeout: secs("QC_P2P_VERDICT_TIMEOUT_SECS", defaults.verdict_timeout),
            reply_timeout: secs("QC_P2P_REPLY_TIMEOUT_SECS", defaults.reply_timeout),
            seen_cache_size: number("QC_P2P_SEEN_CACHE_SIZE")
                .map(|n| n as usize)
                .unwrap_or(defaults.seen_cache_size),
            pending_ttl: secs("QC_P2P_PENDING_TTL_SECS", defaults.pending_ttl),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_peer_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "default_peer_count",
                reason: "must be at least 1".into(),
            });
        }
        if self.seen_cache_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "seen_cache_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.pending_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "pending_ttl",
                reason: "must be non-zero".into(),
            });
        }
        Ok(())
    }

    pub fn pattern_limits(&self) -> PatternLimits {
        PatternLimits {
            max_len: self.max_pattern_len,
            max_repetitions: self.max_pattern_repetitions,
            size_limit: self.regex_size_limit,
        }
    }

    /// How often expired reply slots are swept.
    pub fn cleanup_interval(&self) -> Duration {
        (self.pending_ttl / 10).max(Duration::from_secs(1))
    }
}
