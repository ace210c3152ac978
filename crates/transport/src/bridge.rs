//! WebSocket bridge transport.
//!
//! Talks JSON frames to an external transport sidecar process (one WebSocket
//! connection per tenant). Unsolicited frames become [`TransportEvent`]s;
//! command frames carry a request id and are answered with a matching
//! `result` frame, correlated here through a pending-request map.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    charla_common::{ConversationInfo, InboundMessage},
    dashmap::DashMap,
    futures::{SinkExt, StreamExt},
    serde::{Deserialize, Serialize},
    tokio::sync::{mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, warn},
    url::Url,
};

use crate::{
    client::{EventStream, TransportClient, TransportFactory},
    event::TransportEvent,
};

const EVENT_BUFFER: usize = 64;
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

// ── Wire frames ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    SendText {
        id: u64,
        conversation_id: &'a str,
        text: &'a str,
    },
    ConversationInfo {
        id: u64,
        conversation_id: &'a str,
    },
    ArchiveConversation {
        id: u64,
        conversation_id: &'a str,
    },
    MarkUnread {
        id: u64,
        conversation_id: &'a str,
    },
    Disconnect {
        id: u64,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum BridgeFrame {
    Qr {
        qr: String,
    },
    Ready,
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },
    Message {
        message: InboundMessage,
    },
    Result {
        id: u64,
        ok: bool,
        #[serde(default)]
        data: serde_json::Value,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Outcome of one correlated command frame.
#[derive(Debug)]
struct CommandOutcome {
    ok: bool,
    data: serde_json::Value,
    error: Option<String>,
}

type PendingMap = Arc<DashMap<u64, oneshot::Sender<CommandOutcome>>>;

// ── Client ──────────────────────────────────────────────────────────────────

/// Per-tenant connection handle over the sidecar WebSocket.
pub struct BridgeClient {
    tenant_id: String,
    outgoing: mpsc::Sender<Message>,
    pending: PendingMap,
    next_id: AtomicU64,
}

impl BridgeClient {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn request(&self, id: u64, command: &BridgeCommand<'_>) -> Result<CommandOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let json = serde_json::to_string(command).context("serialize bridge command")?;
        if self.outgoing.send(Message::Text(json.into())).await.is_err() {
            self.pending.remove(&id);
            bail!("bridge connection closed for tenant {}", self.tenant_id);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => {
                bail!("bridge connection dropped mid-request")
            },
            Err(_) => {
                self.pending.remove(&id);
                bail!("bridge request timed out after {REQUEST_TIMEOUT:?}")
            },
        }
    }

    async fn expect_ok(&self, id: u64, command: &BridgeCommand<'_>) -> Result<CommandOutcome> {
        let outcome = self.request(id, command).await?;
        if !outcome.ok {
            bail!(
                "bridge command failed: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(outcome)
    }
}

#[async_trait]
impl TransportClient for BridgeClient {
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<()> {
        let id = self.next_id();
        self.expect_ok(id, &BridgeCommand::SendText {
            id,
            conversation_id,
            text,
        })
        .await?;
        Ok(())
    }

    async fn conversation_info(&self, conversation_id: &str) -> Result<ConversationInfo> {
        let id = self.next_id();
        let outcome = self
            .expect_ok(id, &BridgeCommand::ConversationInfo {
                id,
                conversation_id,
            })
            .await?;
        serde_json::from_value(outcome.data).context("malformed conversation info")
    }

    async fn archive_conversation(&self, conversation_id: &str) -> Result<()> {
        let id = self.next_id();
        self.expect_ok(id, &BridgeCommand::ArchiveConversation {
            id,
            conversation_id,
        })
        .await?;
        Ok(())
    }

    async fn mark_unread(&self, conversation_id: &str) -> Result<()> {
        let id = self.next_id();
        self.expect_ok(id, &BridgeCommand::MarkUnread {
            id,
            conversation_id,
        })
        .await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let id = self.next_id();
        // Fire-and-forget: the sidecar answers with a `disconnected` frame
        // which ends the reader loop.
        let json = serde_json::to_string(&BridgeCommand::Disconnect { id })?;
        let _ = self.outgoing.send(Message::Text(json.into())).await;
        Ok(())
    }
}

// ── Factory ─────────────────────────────────────────────────────────────────

/// Opens one sidecar WebSocket per tenant.
pub struct BridgeTransportFactory {
    endpoint: Url,
}

impl BridgeTransportFactory {
    pub fn new(endpoint: Url) -> Self {
        Self { endpoint }
    }

    fn session_url(&self, tenant_id: &str) -> String {
        format!(
            "{}/session/{tenant_id}",
            self.endpoint.as_str().trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TransportFactory for BridgeTransportFactory {
    async fn connect(&self, tenant_id: &str) -> Result<(Arc<dyn TransportClient>, EventStream)> {
        let url = self.session_url(tenant_id);
        let (stream, _response) = connect_async(url.as_str())
            .await
            .with_context(|| format!("connect to transport bridge at {url}"))?;
        debug!(tenant_id, %url, "bridge connection established");

        let (mut write, mut read) = stream.split();
        let (outgoing, mut outgoing_rx) = mpsc::channel::<Message>(EVENT_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let pending: PendingMap = Arc::new(DashMap::new());

        // Writer half: forward queued command frames.
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        // Reader half: translate frames into events and correlate results.
        let reader_pending = Arc::clone(&pending);
        let reader_tenant = tenant_id.to_string();
        tokio::spawn(async move {
            let mut announced_disconnect = false;
            while let Some(frame) = read.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(tenant_id = %reader_tenant, error = %e, "bridge read failed");
                        break;
                    },
                };
                let frame: BridgeFrame = match serde_json::from_str(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(tenant_id = %reader_tenant, error = %e, "malformed bridge frame");
                        continue;
                    },
                };
                match frame {
                    BridgeFrame::Qr { qr } => {
                        if events_tx
                            .send(TransportEvent::AuthChallenge(qr))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    },
                    BridgeFrame::Ready => {
                        if events_tx.send(TransportEvent::Ready).await.is_err() {
                            break;
                        }
                    },
                    BridgeFrame::Disconnected { reason } => {
                        debug!(tenant_id = %reader_tenant, ?reason, "bridge session disconnected");
                        announced_disconnect = true;
                        let _ = events_tx.send(TransportEvent::Disconnected).await;
                        break;
                    },
                    BridgeFrame::Message { message } => {
                        if events_tx
                            .send(TransportEvent::Message(message))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    },
                    BridgeFrame::Result {
                        id,
                        ok,
                        data,
                        error,
                    } => {
                        if let Some((_, tx)) = reader_pending.remove(&id) {
                            let _ = tx.send(CommandOutcome { ok, data, error });
                        }
                    },
                }
            }
            // A hard transport failure without a farewell frame is still a
            // terminal disconnect for the session.
            if !announced_disconnect {
                let _ = events_tx.send(TransportEvent::Disconnected).await;
            }
        });

        let client = BridgeClient {
            tenant_id: tenant_id.to_string(),
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
        };
        Ok((Arc::new(client), events_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frames_carry_op_and_id() {
        let cmd = BridgeCommand::SendText {
            id: 7,
            conversation_id: "c1",
            text: "hola",
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["op"], "send_text");
        assert_eq!(json["id"], 7);
        assert_eq!(json["conversation_id"], "c1");
        assert_eq!(json["text"], "hola");
    }

    #[test]
    fn qr_frame_parses() {
        let frame: BridgeFrame = serde_json::from_str(r#"{"op":"qr","qr":"2@abc"}"#).unwrap();
        assert!(matches!(frame, BridgeFrame::Qr { qr } if qr == "2@abc"));
    }

    #[test]
    fn message_frame_parses() {
        let raw = r#"{
            "op": "message",
            "message": {
                "conversation_id": "c1",
                "body": "Hola",
                "kind": "text"
            }
        }"#;
        let frame: BridgeFrame = serde_json::from_str(raw).unwrap();
        let BridgeFrame::Message { message } = frame else {
            panic!("expected message frame");
        };
        assert_eq!(message.conversation_id, "c1");
        assert!(message.kind.is_text());
        assert!(!message.is_status);
    }

    #[test]
    fn result_frame_defaults_optional_fields() {
        let frame: BridgeFrame =
            serde_json::from_str(r#"{"op":"result","id":3,"ok":true}"#).unwrap();
        let BridgeFrame::Result {
            id,
            ok,
            data,
            error,
        } = frame
        else {
            panic!("expected result frame");
        };
        assert_eq!(id, 3);
        assert!(ok);
        assert!(data.is_null());
        assert!(error.is_none());
    }

    #[test]
    fn session_url_avoids_double_slash() {
        let factory =
            BridgeTransportFactory::new(Url::parse("ws://127.0.0.1:8766/").unwrap());
        assert_eq!(
            factory.session_url("u1"),
            "ws://127.0.0.1:8766/session/u1"
        );
    }
}
