//! Session metadata persistence.
//!
//! Maps tenant id → downstream credentials plus bookkeeping (status, active
//! flag, message counter). Every caller treats this store as best-effort:
//! a persistence outage is logged and must never block the messaging path.

pub mod memory;
pub mod sqlite;

use {
    anyhow::Result,
    async_trait::async_trait,
    charla_common::{Credentials, SessionStatus},
    serde::Serialize,
};

pub use {memory::MemorySessionStore, sqlite::SqliteSessionStore};

/// A persisted session record, one per tenant.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub tenant_id: String,
    pub status: SessionStatus,
    pub is_active: bool,
    pub message_count: i64,
    pub endpoint_url: String,
    pub endpoint_key: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SessionRecord {
    /// Fresh record for a newly created session.
    pub fn new(tenant_id: impl Into<String>, credentials: &Credentials, now: i64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            status: SessionStatus::Created,
            is_active: true,
            message_count: 0,
            endpoint_url: credentials.endpoint.clone(),
            endpoint_key: credentials.key.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persistent storage for session records, keyed by tenant id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a record, or update credentials/status of an existing one.
    /// An update preserves `message_count` and `created_at`.
    async fn upsert(&self, record: SessionRecord) -> Result<()>;

    async fn get(&self, tenant_id: &str) -> Result<Option<SessionRecord>>;

    async fn list(&self) -> Result<Vec<SessionRecord>>;

    async fn set_status(
        &self,
        tenant_id: &str,
        status: SessionStatus,
        is_active: bool,
    ) -> Result<()>;

    async fn increment_message_count(&self, tenant_id: &str) -> Result<()>;
}

/// Run database migrations for the store crate. Call once at startup.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

pub(crate) fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
