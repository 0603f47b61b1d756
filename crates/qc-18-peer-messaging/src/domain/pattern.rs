//! Safe matcher for site `p2p_filter` patterns.
//!
//! Patterns run on the `regex` crate's finite-automaton engine, so matching
//! is linear in the subject length. Static guards additionally reject
//! patterns that are long or repetition-heavy before they are compiled.
//!
//! Matching is anchored at the start of the subject only.

use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Compiled patterns kept before the cache is reset.
const MAX_CACHED_PATTERNS: usize = 1024;

/// Static limits applied to every pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternLimits {
    /// Maximum pattern length in bytes.
    pub max_len: usize,
    /// Number of `.`-repetitions at which a pattern is refused.
    pub max_repetitions: usize,
    /// Compiled program size limit handed to the regex builder.
    pub size_limit: usize,
}

impl Default for PatternLimits {
    fn default() -> Self {
        Self {
            max_len: 255,
            max_repetitions: 10,
            size_limit: 1024 * 1024,
        }
    }
}

/// Why a pattern was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("Pattern too long: {len} > {max}")]
    TooLong { len: usize, max: usize },

    #[error("Potentially unsafe part of the pattern: {fragment}")]
    UnsafeRepetition { fragment: String },

    #[error("More than {max} repetitions in the pattern")]
    TooManyRepetitions { max: usize },

    #[error("Invalid pattern: {0}")]
    Compile(String),
}

fn is_repetition(byte: u8) -> bool {
    matches!(byte, b'*' | b'+' | b'{')
}

/// Reject patterns that fail the static guards.
///
/// A repetition operator (`*`, `+`, `{`) is only accepted directly after
/// `.`, and the number of such `.`-repetitions is capped.
pub fn check_pattern_safety(pattern: &str, limits: &PatternLimits) -> Result<(), PatternError> {
    if pattern.len() > limits.max_len {
        return Err(PatternError::TooLong {
            len: pattern.len(),
            max: limits.max_len,
        });
    }

    let bytes = pattern.as_bytes();
    let mut repetitions = 0usize;
    for window in bytes.windows(2) {
        if !is_repetition(window[1]) {
            continue;
        }
        if window[0] == b'.' {
            repetitions += 1;
        } else {
            return Err(PatternError::UnsafeRepetition {
                fragment: String::from_utf8_lossy(window).into_owned(),
            });
        }
    }

    if repetitions >= limits.max_repetitions {
        return Err(PatternError::TooManyRepetitions {
            max: limits.max_repetitions,
        });
    }
    Ok(())
}

/// Guarded, cached pattern matcher.
pub struct SafePatternMatcher {
    limits: PatternLimits,
    cache: DashMap<String, Result<Arc<Regex>, PatternError>>,
}

impl SafePatternMatcher {
    pub fn new(limits: PatternLimits) -> Self {
        Self {
            limits,
            cache: DashMap::new(),
        }
    }

    pub fn limits(&self) -> &PatternLimits {
        &self.limits
    }

    /// Compile `pattern` (or fetch it from the cache).
    pub fn compile(&self, pattern: &str) -> Result<Arc<Regex>, PatternError> {
        if let Some(cached) = self.cache.get(pattern) {
            return cached.value().clone();
        }

        let compiled = self.build(pattern);
        if self.cache.len() >= MAX_CACHED_PATTERNS {
            debug!(cached = self.cache.len(), "Resetting pattern cache");
            self.cache.clear();
        }
        self.cache.insert(pattern.to_string(), compiled.clone());
        compiled
    }

    fn build(&self, pattern: &str) -> Result<Arc<Regex>, PatternError> {
        check_pattern_safety(pattern, &self.limits)?;
        RegexBuilder::new(&format!("^(?:{pattern})"))
            .size_limit(self.limits.size_limit)
            .build()
            .map(Arc::new)
            .map_err(|e| PatternError::Compile(e.to_string()))
    }

    /// `true` if `subject` starts with a match of `pattern`.
    ///
    /// A refused or invalid pattern never matches.
    pub fn is_match(&self, pattern: &str, subject: &str) -> bool {
        match self.compile(pattern) {
            Ok(regex) => regex.is_match(subject),
            Err(e) => {
                warn!(pattern = pattern, error = %e, "Refusing p2p_filter pattern");
                false
            }
        }
    }

    pub fn cached_patterns(&self) -> usize {
        self.cache.len()
    }
}

impl Default for SafePatternMatcher {
    fn default() -> Self {
        Self::new(PatternLimits::default())
    }
}
