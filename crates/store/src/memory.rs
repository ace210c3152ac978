use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use {anyhow::Result, async_trait::async_trait, charla_common::SessionStatus};

use crate::{SessionRecord, SessionStore, now_secs};

/// In-memory session store for tests and credential-store-less deployments.
#[derive(Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn upsert(&self, record: SessionRecord) -> Result<()> {
        let mut records = self.lock();
        match records.get_mut(&record.tenant_id) {
            Some(existing) => {
                existing.status = record.status;
                existing.is_active = record.is_active;
                existing.endpoint_url = record.endpoint_url;
                existing.endpoint_key = record.endpoint_key;
                existing.updated_at = record.updated_at;
            },
            None => {
                records.insert(record.tenant_id.clone(), record);
            },
        }
        Ok(())
    }

    async fn get(&self, tenant_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.lock().get(tenant_id).cloned())
    }

    async fn list(&self) -> Result<Vec<SessionRecord>> {
        let mut all: Vec<_> = self.lock().values().cloned().collect();
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }

    async fn set_status(
        &self,
        tenant_id: &str,
        status: SessionStatus,
        is_active: bool,
    ) -> Result<()> {
        if let Some(record) = self.lock().get_mut(tenant_id) {
            record.status = status;
            record.is_active = is_active;
            record.updated_at = now_secs();
        }
        Ok(())
    }

    async fn increment_message_count(&self, tenant_id: &str) -> Result<()> {
        if let Some(record) = self.lock().get_mut(tenant_id) {
            record.message_count += 1;
            record.updated_at = now_secs();
        }
        Ok(())
    }
}
