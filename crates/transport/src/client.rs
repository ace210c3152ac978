use std::sync::Arc;

use {
    anyhow::Result,
    async_trait::async_trait,
    charla_common::ConversationInfo,
    tokio::sync::mpsc,
};

use crate::event::TransportEvent;

/// Ordered stream of transport events for one session.
pub type EventStream = mpsc::Receiver<TransportEvent>;

/// Opaque per-tenant messaging connection.
///
/// Owned exclusively by the session registry; all operations target a
/// conversation id on the connection's own tenant.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Send a text message to a conversation.
    async fn send_text(&self, conversation_id: &str, text: &str) -> Result<()>;

    /// Fetch the gating attributes of a conversation.
    async fn conversation_info(&self, conversation_id: &str) -> Result<ConversationInfo>;

    /// Archive a conversation (human-handoff flow).
    async fn archive_conversation(&self, conversation_id: &str) -> Result<()>;

    /// Mark a conversation unread (human-handoff flow).
    async fn mark_unread(&self, conversation_id: &str) -> Result<()>;

    /// Tear the connection down. Best-effort; callers log and move on.
    async fn disconnect(&self) -> Result<()>;
}

/// Opens transport connections for tenants.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a connection for `tenant_id`, returning the handle and the
    /// session's event stream. Events for the same conversation arrive on
    /// the stream in order.
    async fn connect(&self, tenant_id: &str) -> Result<(Arc<dyn TransportClient>, EventStream)>;
}
