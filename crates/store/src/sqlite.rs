use {
    anyhow::Result,
    async_trait::async_trait,
    charla_common::SessionStatus,
    sqlx::{Row, SqlitePool, sqlite::SqliteRow},
};

use crate::{SessionRecord, SessionStore, now_secs};

/// Sqlite-backed session store.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &SqliteRow) -> Result<SessionRecord> {
    let status: String = row.try_get("status")?;
    Ok(SessionRecord {
        tenant_id: row.try_get("tenant_id")?,
        status: status.parse::<SessionStatus>()?,
        is_active: row.try_get("is_active")?,
        message_count: row.try_get("message_count")?,
        endpoint_url: row.try_get("endpoint_url")?,
        endpoint_key: row.try_get("endpoint_key")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn upsert(&self, record: SessionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions
               (tenant_id, status, is_active, message_count,
                endpoint_url, endpoint_key, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(tenant_id) DO UPDATE SET
               status = excluded.status,
               is_active = excluded.is_active,
               endpoint_url = excluded.endpoint_url,
               endpoint_key = excluded.endpoint_key,
               updated_at = excluded.updated_at",
        )
        .bind(&record.tenant_id)
        .bind(record.status.as_str())
        .bind(record.is_active)
        .bind(record.message_count)
        .bind(&record.endpoint_url)
        .bind(&record.endpoint_key)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, tenant_id: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE tenant_id = ?1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query("SELECT * FROM sessions ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn set_status(
        &self,
        tenant_id: &str,
        status: SessionStatus,
        is_active: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sessions
             SET status = ?2, is_active = ?3, updated_at = ?4
             WHERE tenant_id = ?1",
        )
        .bind(tenant_id)
        .bind(status.as_str())
        .bind(is_active)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_message_count(&self, tenant_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE sessions
             SET message_count = message_count + 1, updated_at = ?2
             WHERE tenant_id = ?1",
        )
        .bind(tenant_id)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
