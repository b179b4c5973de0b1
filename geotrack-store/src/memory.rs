use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::{DeviceRecord, DeviceStore, DeviceUpdate, StoreError};

/// In-process store with the same update semantics as the remote one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, DeviceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records = ids
            .into_iter()
            .map(|id| {
                let record = DeviceRecord::new(id);
                (record.id.clone(), record)
            })
            .collect();

        Self {
            records: Mutex::new(records),
        }
    }

    pub async fn remove(&self, id: &str) -> Option<DeviceRecord> {
        self.records.lock().await.remove(id)
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn update(&self, id: &str, update: &DeviceUpdate) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let commit_time = OffsetDateTime::now_utc();
        record.is_active = update.is_active;
        if let Some(sample) = &update.last_position {
            record.last_position = Some(sample.resolved(commit_time));
        }
        record.updated_at = Some(commit_time);

        tracing::debug!("memory store committed {:?} for {}", update.field_paths(), id);

        Ok(())
    }
}
