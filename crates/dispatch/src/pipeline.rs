use std::sync::Arc;

use {
    async_trait::async_trait,
    charla_aggregator::Dispatcher,
    charla_common::{ConvKey, Credentials},
    charla_store::SessionStore,
    charla_transport::TransportClient,
    tokio::sync::OnceCell,
    tracing::{debug, warn},
};

use crate::{
    backend::{Answer, AnswerBackend},
    replies,
};

/// Looks up the live state of a tenant session.
///
/// Implemented by the session registry; the pipeline treats a `None` as a
/// session that vanished mid-flight and silently drops the work.
pub trait OutboundLookup: Send + Sync {
    fn outbound(&self, tenant_id: &str) -> Option<Arc<dyn TransportClient>>;
    fn credentials(&self, tenant_id: &str) -> Option<Credentials>;
}

/// Composes the downstream query for an elapsed window and routes the
/// answer back through the transport.
///
/// The registry reference is deferred through a `OnceCell` so the pipeline
/// can be constructed before the registry that depends on it exists.
pub struct DispatchPipeline {
    lookup: OnceCell<Arc<dyn OutboundLookup>>,
    backend: Arc<dyn AnswerBackend>,
    store: Arc<dyn SessionStore>,
}

impl DispatchPipeline {
    pub fn new(backend: Arc<dyn AnswerBackend>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            lookup: OnceCell::new(),
            backend,
            store,
        }
    }

    /// Late-bind the session lookup. Subsequent calls are no-ops.
    pub fn bind(&self, lookup: Arc<dyn OutboundLookup>) {
        let _ = self.lookup.set(lookup);
    }
}

#[async_trait]
impl Dispatcher for DispatchPipeline {
    async fn dispatch(&self, key: ConvKey, question: String) {
        let Some(lookup) = self.lookup.get() else {
            warn!(%key, "dispatch before registry was bound, dropping");
            return;
        };

        // Counter bump is best-effort bookkeeping, off the hot path.
        {
            let store = Arc::clone(&self.store);
            let tenant_id = key.tenant_id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.increment_message_count(&tenant_id).await {
                    warn!(tenant_id, error = %e, "failed to bump message counter");
                }
            });
        }

        let Some(credentials) = lookup.credentials(&key.tenant_id) else {
            debug!(%key, "session vanished before query, dropping");
            return;
        };

        let answer = self
            .backend
            .query(&question, &key.conversation_id, &credentials)
            .await;

        let reply = match answer {
            Answer::Empty => return,
            Answer::NotUnderstood => replies::NOT_UNDERSTOOD.to_string(),
            Answer::Text(text) => text,
        };

        // The session may have been deleted while the query was in flight.
        let Some(client) = lookup.outbound(&key.tenant_id) else {
            debug!(%key, "session vanished mid-dispatch, dropping reply");
            return;
        };
        if let Err(e) = client.send_text(&key.conversation_id, &reply).await {
            warn!(%key, error = %e, "failed to send reply");
        }
    }
}

/// Human-handoff action: archive the conversation, send the fixed
/// data-request template, mark it unread. Bypasses aggregation entirely.
///
/// Each step is best-effort; a failed archive still attempts the template
/// send so the customer is not left without a response.
pub async fn request_human_handoff(client: &dyn TransportClient, conversation_id: &str) {
    if let Err(e) = client.archive_conversation(conversation_id).await {
        warn!(conversation_id, error = %e, "failed to archive conversation");
    }
    if let Err(e) = client
        .send_text(conversation_id, replies::HANDOFF_TEMPLATE)
        .await
    {
        warn!(conversation_id, error = %e, "failed to send handoff template");
    }
    if let Err(e) = client.mark_unread(conversation_id).await {
        warn!(conversation_id, error = %e, "failed to mark conversation unread");
    }
}
