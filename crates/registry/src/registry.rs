use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::{SystemTime, UNIX_EPOCH},
};

use {
    charla_aggregator::AggregationWindow,
    charla_common::{Credentials, SessionStatus},
    charla_dispatch::OutboundLookup,
    charla_store::{SessionRecord, SessionStore},
    charla_transport::{SessionEventSink, TransportClient, TransportFactory},
    dashmap::DashMap,
    serde::Serialize,
    tracing::{error, info, warn},
};

use crate::router;

/// Outcome of a create-session request, as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CreateOutcome {
    Success,
    AlreadyExists,
    Failed,
}

/// Live state for one tenant session. The registry owns the connection
/// handle exclusively; nothing outside ever holds it long-term.
pub(crate) struct SessionHandle {
    pub client: Arc<dyn TransportClient>,
    pub credentials: Credentials,
    pub status: SessionStatus,
    pub created_at: i64,
}

/// Read-only session snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub tenant_id: String,
    pub status: SessionStatus,
    pub created_at: i64,
}

/// Owns all active sessions, at most one per tenant id.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    pending_qr: DashMap<String, String>,
    factory: Arc<dyn TransportFactory>,
    store: Arc<dyn SessionStore>,
    window: Arc<AggregationWindow>,
    sink: Arc<dyn SessionEventSink>,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl SessionRegistry {
    pub(crate) fn new(
        factory: Arc<dyn TransportFactory>,
        store: Arc<dyn SessionStore>,
        window: Arc<AggregationWindow>,
        sink: Arc<dyn SessionEventSink>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            pending_qr: DashMap::new(),
            factory,
            store,
            window,
            sink,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a session for a tenant. Idempotent against duplicate setup:
    /// an existing session makes this a no-op reporting `AlreadyExists`.
    pub async fn create_session(
        self: &Arc<Self>,
        tenant_id: &str,
        credentials: Credentials,
    ) -> CreateOutcome {
        if self.read().contains_key(tenant_id) {
            info!(tenant_id, "session already exists");
            return CreateOutcome::AlreadyExists;
        }
        if !credentials.is_complete() {
            warn!(tenant_id, "missing downstream endpoint or key");
            return CreateOutcome::Failed;
        }

        // Metadata durability is best-effort; the session-facing flow wins.
        let record = SessionRecord::new(tenant_id, &credentials, now_secs());
        if let Err(e) = self.store.upsert(record).await {
            warn!(tenant_id, error = %e, "failed to persist session record");
        }

        let (client, events) = match self.factory.connect(tenant_id).await {
            Ok(connected) => connected,
            Err(e) => {
                error!(tenant_id, error = %e, "transport connection failed");
                if let Err(e) = self
                    .store
                    .set_status(tenant_id, SessionStatus::Disconnected, false)
                    .await
                {
                    warn!(tenant_id, error = %e, "failed to persist disconnect status");
                }
                return CreateOutcome::Failed;
            },
        };

        let racing_client = {
            let mut sessions = self.write();
            if sessions.contains_key(tenant_id) {
                // Lost a create/create race; keep the session that won.
                Some(client)
            } else {
                sessions.insert(tenant_id.to_string(), SessionHandle {
                    client,
                    credentials,
                    status: SessionStatus::Created,
                    created_at: now_secs(),
                });
                None
            }
        };
        if let Some(client) = racing_client {
            let _ = client.disconnect().await;
            return CreateOutcome::AlreadyExists;
        }

        tokio::spawn(router::run(
            Arc::clone(self),
            tenant_id.to_string(),
            events,
        ));
        info!(tenant_id, "session created");
        CreateOutcome::Success
    }

    /// Read-only lookup.
    pub fn get_session(&self, tenant_id: &str) -> Option<SessionView> {
        self.read().get(tenant_id).map(|handle| SessionView {
            tenant_id: tenant_id.to_string(),
            status: handle.status,
            created_at: handle.created_at,
        })
    }

    /// Latest cached QR challenge for a tenant, if one is pending.
    pub fn pending_auth_challenge(&self, tenant_id: &str) -> Option<String> {
        self.pending_qr.get(tenant_id).map(|qr| qr.clone())
    }

    /// Tear a session down: release the connection handle (best-effort),
    /// purge all aggregation buffers and the pending QR value for the
    /// tenant, and persist the terminal status. Safe to call concurrently
    /// with an in-flight dispatch for the same tenant.
    pub async fn delete_session(&self, tenant_id: &str) -> bool {
        let handle = self.write().remove(tenant_id);
        let Some(handle) = handle else {
            return false;
        };

        if let Err(e) = handle.client.disconnect().await {
            warn!(tenant_id, error = %e, "transport disconnect failed");
        }
        self.pending_qr.remove(tenant_id);
        let purged = self.window.purge_tenant(tenant_id);
        if let Err(e) = self
            .store
            .set_status(tenant_id, SessionStatus::Disconnected, false)
            .await
        {
            warn!(tenant_id, error = %e, "failed to persist disconnect status");
        }
        info!(tenant_id, purged_buffers = purged, "session deleted");
        true
    }

    /// Tenants currently registered.
    pub fn tenant_ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    // ── Router-facing internals ─────────────────────────────────────────────

    pub(crate) fn client(&self, tenant_id: &str) -> Option<Arc<dyn TransportClient>> {
        self.read().get(tenant_id).map(|h| Arc::clone(&h.client))
    }

    /// Advance a session's lifecycle status. `Disconnected` is terminal:
    /// once there, no further transition applies.
    pub(crate) fn set_status(&self, tenant_id: &str, status: SessionStatus) {
        if let Some(handle) = self.write().get_mut(tenant_id)
            && !handle.status.is_terminal()
        {
            handle.status = status;
        }
    }

    pub(crate) fn cache_auth_challenge(&self, tenant_id: &str, challenge: String) {
        self.pending_qr.insert(tenant_id.to_string(), challenge);
    }

    pub(crate) fn clear_auth_challenge(&self, tenant_id: &str) {
        self.pending_qr.remove(tenant_id);
    }

    pub(crate) fn window(&self) -> &Arc<AggregationWindow> {
        &self.window
    }

    pub(crate) fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub(crate) fn sink(&self) -> &Arc<dyn SessionEventSink> {
        &self.sink
    }
}

impl OutboundLookup for SessionRegistry {
    fn outbound(&self, tenant_id: &str) -> Option<Arc<dyn TransportClient>> {
        self.client(tenant_id)
    }

    fn credentials(&self, tenant_id: &str) -> Option<Credentials> {
        self.read().get(tenant_id).map(|h| h.credentials.clone())
    }
}
