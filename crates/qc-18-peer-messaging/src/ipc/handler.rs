//! # IPC Message Handlers
//!
//! - [`ClientCommandHandler`]: local client commands → [`PeerMessagingApi`]
//! - [`PeerRequestHandler`]: remote peer requests → [`PeerMessageReceiver`]
//!
//! Both answer every request; failures are rendered into the response body.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::MessagingConfig;
use crate::domain::{BroadcastRequest, Envelope, KeySelector, PeerAddress};
use crate::events::{
    MessagingError, PeerBroadcastParams, PeerCommand, PeerReplyParams, PeerSendParams,
    VerdictParams, CMD_PEER_BROADCAST, CMD_PEER_INVALID, CMD_PEER_REPLY, CMD_PEER_SEND,
    CMD_PEER_VALID,
};
use crate::ipc::payloads::{ClientRequest, ClientResponse, ClientSession};
use crate::ports::inbound::{PeerMessageReceiver, PeerMessagingApi};

fn decode_params<T: DeserializeOwned>(params: Value) -> Result<T, MessagingError> {
    serde_json::from_value(params).map_err(|e| MessagingError::InvalidParams(e.to_string()))
}

/// Handles commands from local clients of the site.
pub struct ClientCommandHandler<A: PeerMessagingApi> {
    api: Arc<A>,
    config: MessagingConfig,
}

impl<A: PeerMessagingApi> ClientCommandHandler<A> {
    /// `config` supplies the defaults for omitted broadcast options.
    pub fn new(api: Arc<A>, config: MessagingConfig) -> Self {
        Self { api, config }
    }

    /// Run one command and build the correlated response.
    pub async fn handle(&self, session: &ClientSession, request: ClientRequest) -> ClientResponse {
        let id = request.id;
        let cmd = request.cmd.clone();

        match self.dispatch(session, request).await {
            Ok(result) => ClientResponse::ok(id, result),
            Err(e) => {
                if e.is_policy_rejection() {
                    warn!(cmd = %cmd, error = %e, "P2P message rejected");
                } else {
                    debug!(cmd = %cmd, error = %e, "Client command failed");
                }
                ClientResponse::error(id, &e)
            }
        }
    }

    async fn dispatch(
        &self,
        session: &ClientSession,
        request: ClientRequest,
    ) -> Result<Value, MessagingError> {
        match request.cmd.as_str() {
            CMD_PEER_BROADCAST => {
                let params: PeerBroadcastParams = decode_params(request.params)?;
                let outcome = self.api.broadcast(self.broadcast_request(params)?).await?;
                Ok(outcome.to_response())
            }
            CMD_PEER_SEND => {
                self.authorize(session, CMD_PEER_SEND)?;
                let params: PeerSendParams = decode_params(request.params)?;
                let key = KeySelector::from_param(params.privatekey.as_ref());
                let outcome = self.api.send_to(&params.ip, params.message, key).await?;
                Ok(outcome.to_response())
            }
            CMD_PEER_VALID | CMD_PEER_INVALID => {
                self.authorize(session, &request.cmd)?;
                let params: VerdictParams = decode_params(request.params)?;
                self.api
                    .resolve_verdict(&params.hash, request.cmd == CMD_PEER_VALID);
                Ok(json!("ok"))
            }
            CMD_PEER_REPLY => {
                self.authorize(session, CMD_PEER_REPLY)?;
                let params: PeerReplyParams = decode_params(request.params)?;
                self.api.resolve_reply(&params.hash, params.reply);
                Ok(json!("ok"))
            }
            other => Err(MessagingError::UnknownCommand(other.to_string())),
        }
    }

    /// Only the relay's own site (or an admin) may use non-broadcast commands.
    fn authorize(&self, session: &ClientSession, cmd: &str) -> Result<(), MessagingError> {
        if session.admin || session.site_address == self.api.site_address() {
            return Ok(());
        }
        warn!(cmd = %cmd, site = %session.site_address, "Command not permitted for session");
        Err(MessagingError::PermissionDenied(cmd.to_string()))
    }

    fn broadcast_request(
        &self,
        params: PeerBroadcastParams,
    ) -> Result<BroadcastRequest, MessagingError> {
        let timeout = match params.timeout {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map_err(|_| MessagingError::InvalidParams(format!("timeout {secs}")))?,
            None => self.config.default_broadcast_timeout,
        };

        Ok(BroadcastRequest {
            peer_count: params.peer_count.unwrap_or(self.config.default_peer_count),
            broadcast: params.broadcast.unwrap_or(true),
            immediate: params.immediate.unwrap_or(false),
            timeout,
            key: KeySelector::from_param(params.privatekey.as_ref()),
            message: params.message,
        })
    }
}

/// Handles requests arriving from remote peers.
pub struct PeerRequestHandler<R: PeerMessageReceiver> {
    receiver: Arc<R>,
}

impl<R: PeerMessageReceiver> PeerRequestHandler<R> {
    pub fn new(receiver: Arc<R>) -> Self {
        Self { receiver }
    }

    /// Answer one peer request. Errors become `{"error": ...}`.
    pub async fn handle(&self, from: &PeerAddress, command: PeerCommand, payload: Value) -> Value {
        let result = match serde_json::from_value::<Envelope>(payload) {
            Ok(envelope) => match command {
                PeerCommand::Broadcast => self.receiver.receive_broadcast(from, envelope).await,
                PeerCommand::Send => self.receiver.receive_send(from, envelope).await,
            },
            Err(e) => Err(MessagingError::MalformedEnvelope(e.to_string())),
        };

        result.unwrap_or_else(|e| {
            debug!(peer = %from, command = %command, error = %e, "Peer request refused");
            json!({ "error": e.to_string() })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Secp256k1Crypto;
    use crate::domain::{BroadcastPayload, SitePolicy};
    use crate::service::codec::build_envelope;
    use crate::service::PeerMessagingService;
    use crate::test_utils::{
        ManualTimeSource, MockDirectory, MockPeer, PeerBehavior, StaticIdentity, StaticSiteStore,
    };
    use std::sync::atomic::Ordering;

    const SITE: &str = "1RelaySite";

    type Service =
        PeerMessagingService<MockDirectory, StaticSiteStore, StaticIdentity, Secp256k1Crypto>;

    fn service(directory: MockDirectory) -> Arc<Service> {
        Arc::new(PeerMessagingService::new(
            MessagingConfig::default(),
            Arc::new(directory),
            Arc::new(StaticSiteStore::new(SITE, SitePolicy::open())),
            Arc::new(StaticIdentity::none()),
            Arc::new(Secp256k1Crypto::new()),
            Arc::new(ManualTimeSource::new(1_000)),
        ))
    }

    fn client_handler(directory: MockDirectory) -> ClientCommandHandler<Service> {
        ClientCommandHandler::new(service(directory), MessagingConfig::default())
    }

    fn request(cmd: &str, params: Value) -> ClientRequest {
        ClientRequest {
            cmd: cmd.to_string(),
            params,
            id: 42,
        }
    }

    #[tokio::test]
    async fn test_broadcast_defaults_to_fire_and_forget() {
        let handler = client_handler(MockDirectory::new());
        let response = handler
            .handle(
                &ClientSession::new(SITE),
                request("peerBroadcast", json!({ "message": "hi" })),
            )
            .await;

        assert_eq!(response.cmd, "response");
        assert_eq!(response.to, 42);
        assert_eq!(response.result, json!({ "sent": true }));
    }

    #[tokio::test]
    async fn test_broadcast_allowed_from_other_site() {
        let handler = client_handler(MockDirectory::new());
        let response = handler
            .handle(
                &ClientSession::new("1SomeOtherSite"),
                request("peerBroadcast", json!({ "message": 1 })),
            )
            .await;
        assert!(!response.is_error());
    }

    #[tokio::test]
    async fn test_other_commands_need_own_site() {
        let handler = client_handler(MockDirectory::new());
        let foreign = ClientSession::new("1SomeOtherSite");

        for cmd in ["peerSend", "peerValid", "peerInvalid", "peerReply"] {
            let response = handler.handle(&foreign, request(cmd, json!({}))).await;
            assert_eq!(
                response.result,
                json!({ "error": format!("Permission denied: {cmd}") })
            );
        }

        let response = handler
            .handle(
                &ClientSession::admin("1SomeOtherSite"),
                request("peerValid", json!({ "hash": "h" })),
            )
            .await;
        assert_eq!(response.result, json!("ok"));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let handler = client_handler(MockDirectory::new());
        let response = handler
            .handle(&ClientSession::new(SITE), request("peerShout", json!({})))
            .await;
        assert_eq!(response.result, json!({ "error": "Unknown command: peerShout" }));
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let handler = client_handler(MockDirectory::new());
        let session = ClientSession::new(SITE);

        let missing = handler
            .handle(&session, request("peerBroadcast", json!({})))
            .await;
        assert!(missing.result["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid params: "));

        let negative = handler
            .handle(
                &session,
                request("peerBroadcast", json!({ "message": 1, "timeout": -1.0 })),
            )
            .await;
        assert!(negative.is_error());
    }

    #[tokio::test]
    async fn test_huge_timeout_collects_replies() {
        let handler =
            client_handler(MockDirectory::new().with_connected(MockPeer::ok("10.0.0.5", 5)));

        let response = handler
            .handle(
                &ClientSession::new(SITE),
                request(
                    "peerBroadcast",
                    json!({ "message": 1, "broadcast": false, "timeout": 1e19 }),
                ),
            )
            .await;
        assert_eq!(
            response.result,
            json!([{ "ip": "10.0.0.5:5", "reply": { "ok": true } }])
        );
    }

    #[tokio::test]
    async fn test_peer_send_reply_is_result() {
        let peer = MockPeer::new(
            "10.0.0.5",
            5,
            PeerBehavior::Reply(json!({ "reply": [1, 2, 3] })),
        );
        let handler = client_handler(MockDirectory::new().with_connected(peer));

        let response = handler
            .handle(
                &ClientSession::new(SITE),
                request("peerSend", json!({ "ip": "10.0.0.5:5", "message": "q" })),
            )
            .await;
        assert_eq!(response.result, json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_verdict_and_reply_acknowledged() {
        let api = service(MockDirectory::new());
        let handler = ClientCommandHandler::new(Arc::clone(&api), MessagingConfig::default());
        let session = ClientSession::new(SITE);

        let response = handler
            .handle(&session, request("peerInvalid", json!({ "hash": "abc" })))
            .await;
        assert_eq!(response.result, json!("ok"));

        // Second signal for the same hash is ignored but still acknowledged
        let response = handler
            .handle(
                &session,
                request("peerReply", json!({ "hash": "abc", "reply": 1 })),
            )
            .await;
        assert_eq!(response.result, json!("ok"));
        let stats = api.state().correlator.stats();
        assert_eq!(stats.total_duplicates.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_peer_request_handler_routes_commands() {
        let handler = PeerRequestHandler::new(service(MockDirectory::new()));
        let from = PeerAddress::new("10.1.1.1", 15441);
        let payload = BroadcastPayload {
            message: json!("hello"),
            peer_count: 5,
            broadcast: true,
            immediate: false,
            site: SITE.into(),
        };
        let envelope = build_envelope(&Secp256k1Crypto::new(), &payload, None).unwrap();
        let wire = serde_json::to_value(&envelope).unwrap();

        let first = handler
            .handle(&from, PeerCommand::Broadcast, wire.clone())
            .await;
        assert_eq!(first, json!({ "ok": true }));

        let again = handler.handle(&from, PeerCommand::Broadcast, wire).await;
        assert_eq!(again, json!({ "error": "Already received" }));

        let garbage = handler
            .handle(&from, PeerCommand::Send, json!({ "nope": true }))
            .await;
        assert!(garbage["error"]
            .as_str()
            .unwrap()
            .starts_with("Malformed envelope: "));
    }
}
