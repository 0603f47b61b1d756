//! Events and error types for the Peer Messaging subsystem.
//!
//! Every [`MessagingError`] renders to the exact string a client sees in
//! its `{"error": ...}` response body.

use thiserror::Error;

use crate::domain::{CorrelatorError, PolicyViolation};
use crate::ports::outbound::StoreError;

pub mod commands;

pub use commands::*;

/// Peer messaging errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error("Could not find peer {0}")]
    PeerNotFound(String),

    #[error("Connection error")]
    PeerUnreachable,

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Already received")]
    AlreadyReceived,

    #[error("Unknown site {0}")]
    UnknownSite(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<CorrelatorError> for MessagingError {
    fn from(err: CorrelatorError) -> Self {
        match err {
            CorrelatorError::Timeout { hash } | CorrelatorError::Abandoned { hash } => {
                Self::Timeout(hash)
            }
        }
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl MessagingError {
    /// Rejected locally, before any network activity.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Self::Policy(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_messages() {
        let cases = [
            (
                MessagingError::from(PolicyViolation::NotSupported {
                    site: "1Site".into(),
                }),
                "Site 1Site doesn't support P2P messages",
            ),
            (PolicyViolation::TooFast.into(), "Too fast messages"),
            (PolicyViolation::TooBig.into(), "Too big message"),
            (
                MessagingError::PeerNotFound("1.2.3.4:1".into()),
                "Could not find peer 1.2.3.4:1",
            ),
            (MessagingError::PeerUnreachable, "Connection error"),
            (MessagingError::Timeout("abc".into()), "Timeout waiting for abc"),
            (MessagingError::InvalidSignature, "Invalid signature"),
            (MessagingError::AlreadyReceived, "Already received"),
            (
                MessagingError::PermissionDenied("peerSend".into()),
                "Permission denied: peerSend",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_correlator_errors_become_timeouts() {
        let err: MessagingError = CorrelatorError::Abandoned { hash: "h".into() }.into();
        assert_eq!(err, MessagingError::Timeout("h".into()));
    }
}
