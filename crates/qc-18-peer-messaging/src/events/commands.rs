//! Client command payloads and peer protocol commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const CMD_PEER_BROADCAST: &str = "peerBroadcast";
pub const CMD_PEER_SEND: &str = "peerSend";
pub const CMD_PEER_VALID: &str = "peerValid";
pub const CMD_PEER_INVALID: &str = "peerInvalid";
pub const CMD_PEER_REPLY: &str = "peerReply";

/// `peerBroadcast` parameters. Unset options fall back to configured defaults.
#[derive(Clone, Debug, Deserialize)]
pub struct PeerBroadcastParams {
    pub message: Value,
    #[serde(default)]
    pub privatekey: Option<Value>,
    #[serde(default)]
    pub peer_count: Option<usize>,
    #[serde(default)]
    pub broadcast: Option<bool>,
    #[serde(default)]
    pub immediate: Option<bool>,
    /// Seconds.
    #[serde(default)]
    pub timeout: Option<f64>,
}

/// `peerSend` parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct PeerSendParams {
    pub ip: String,
    pub message: Value,
    #[serde(default)]
    pub privatekey: Option<Value>,
}

/// `peerValid` / `peerInvalid` parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct VerdictParams {
    pub hash: String,
}

/// `peerReply` parameters.
#[derive(Clone, Debug, Deserialize)]
pub struct PeerReplyParams {
    pub hash: String,
    pub reply: Value,
}

/// Requests this node issues to remote peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerCommand {
    #[serde(rename = "peerBroadcast")]
    Broadcast,
    #[serde(rename = "peerSend")]
    Send,
}

impl PeerCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broadcast => CMD_PEER_BROADCAST,
            Self::Send => CMD_PEER_SEND,
        }
    }
}

impl fmt::Display for PeerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_broadcast_params_defaults() {
        let params: PeerBroadcastParams =
            serde_json::from_value(json!({ "message": { "text": "hi" } })).unwrap();
        assert_eq!(params.message, json!({ "text": "hi" }));
        assert!(params.privatekey.is_none());
        assert!(params.peer_count.is_none());
        assert!(params.timeout.is_none());
    }

    #[test]
    fn test_null_privatekey_is_unset() {
        let params: PeerSendParams = serde_json::from_value(
            json!({ "ip": "1.2.3.4:15441", "message": 1, "privatekey": null }),
        )
        .unwrap();
        assert!(params.privatekey.is_none());
    }

    #[test]
    fn test_missing_message_rejected() {
        assert!(serde_json::from_value::<PeerBroadcastParams>(json!({})).is_err());
    }

    #[test]
    fn test_peer_command_names() {
        assert_eq!(PeerCommand::Broadcast.as_str(), "peerBroadcast");
        assert_eq!(PeerCommand::Send.to_string(), "peerSend");
        assert_eq!(
            serde_json::to_value(PeerCommand::Send).unwrap(),
            json!("peerSend")
        );
    }
}
