use {async_trait::async_trait, charla_common::InboundMessage, serde::Serialize};

/// Events a transport connection emits for one tenant session.
///
/// Only these four kinds have observable effects; anything else a transport
/// might produce is dropped before it reaches the router.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An authentication challenge (QR payload) the operator must complete.
    AuthChallenge(String),
    /// The connection is authenticated and ready to relay messages.
    Ready,
    /// The connection is gone. Terminal for the owning session.
    Disconnected,
    /// An inbound chat message.
    Message(InboundMessage),
}

/// Operator-facing push events (QR codes and status changes).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    AuthChallenge { tenant_id: String, challenge: String },
    Ready { tenant_id: String },
    Disconnected { tenant_id: String },
}

/// Sink for operator push events — the gateway provides the concrete
/// implementation.
#[async_trait]
pub trait SessionEventSink: Send + Sync {
    async fn emit(&self, event: SessionEvent);
}

/// Sink that drops every event. Useful in tests and headless deployments.
pub struct NullEventSink;

#[async_trait]
impl SessionEventSink for NullEventSink {
    async fn emit(&self, _event: SessionEvent) {}
}
