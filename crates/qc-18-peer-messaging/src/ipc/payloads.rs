//! Client endpoint framing.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::events::MessagingError;

/// One command from a local client.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ClientRequest {
    pub cmd: String,
    #[serde(default)]
    pub params: Value,
    /// Echoed back as the response's `to`.
    pub id: u64,
}

/// Correlated reply to a [`ClientRequest`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ClientResponse {
    pub cmd: String,
    pub to: u64,
    pub result: Value,
}

impl ClientResponse {
    pub const CMD: &'static str = "response";

    pub fn ok(to: u64, result: Value) -> Self {
        Self {
            cmd: Self::CMD.to_string(),
            to,
            result,
        }
    }

    pub fn error(to: u64, err: &MessagingError) -> Self {
        Self::ok(to, json!({ "error": err.to_string() }))
    }

    pub fn is_error(&self) -> bool {
        self.result.get("error").is_some()
    }
}

/// Who is talking on the client endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSession {
    /// Site the client connection is bound to.
    pub site_address: String,
    pub admin: bool,
}

impl ClientSession {
    pub fn new(site_address: impl Into<String>) -> Self {
        Self {
            site_address: site_address.into(),
            admin: false,
        }
    }

    pub fn admin(site_address: impl Into<String>) -> Self {
        Self {
            site_address: site_address.into(),
            admin: true,
        }
    }
}
