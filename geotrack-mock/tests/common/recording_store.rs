use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use geotrack_store::{DeviceRecord, DeviceStore, DeviceUpdate, MemoryStore, StatusCode, StoreError};
use tokio::time::{self, Instant};

#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub at: Instant,
    pub id: String,
    pub update: DeviceUpdate,
    pub landed: bool,
}

/// Memory store that keeps every attempted write in order and can be told
/// to fail upcoming reads or position writes, or to stall writes.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    writes: Mutex<Vec<RecordedWrite>>,
    failing_reads: AtomicUsize,
    failing_position_writes: AtomicUsize,
    online_delay: Mutex<Duration>,
    position_delay: Mutex<Duration>,
}

impl RecordingStore {
    pub fn with_device(id: &str) -> Self {
        Self {
            inner: MemoryStore::with_devices([id]),
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_position_writes(&self, count: usize) {
        self.failing_position_writes.store(count, Ordering::SeqCst);
    }

    /// Hold the going-online write for `delay` before it commits.
    pub fn delay_online_write(&self, delay: Duration) {
        *self.online_delay.lock().unwrap() = delay;
    }

    /// Hold every position write for `delay` before it commits.
    pub fn delay_position_writes(&self, delay: Duration) {
        *self.position_delay.lock().unwrap() = delay;
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub fn position_writes(&self) -> Vec<RecordedWrite> {
        self.writes()
            .into_iter()
            .filter(|w| w.update.is_active && w.update.last_position.is_some())
            .collect()
    }

    pub async fn record(&self, id: &str) -> Option<DeviceRecord> {
        self.inner.get(id).await.unwrap()
    }
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn unavailable() -> StoreError {
    StoreError::Status {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: String::from("backend unavailable"),
    }
}

#[async_trait]
impl DeviceStore for RecordingStore {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn get(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        if take(&self.failing_reads) {
            return Err(unavailable());
        }

        self.inner.get(id).await
    }

    async fn update(&self, id: &str, update: &DeviceUpdate) -> Result<(), StoreError> {
        let is_position = update.is_active && update.last_position.is_some();

        let delay = match (update.is_active, is_position) {
            (true, false) => *self.online_delay.lock().unwrap(),
            (true, true) => *self.position_delay.lock().unwrap(),
            (false, _) => Duration::ZERO,
        };
        if !delay.is_zero() {
            time::sleep(delay).await;
        }

        let result = if is_position && take(&self.failing_position_writes) {
            Err(unavailable())
        } else {
            self.inner.update(id, update).await
        };

        self.writes.lock().unwrap().push(RecordedWrite {
            at: Instant::now(),
            id: id.to_string(),
            update: update.clone(),
            landed: result.is_ok(),
        });

        result
    }
}

/// Exactly one offline write was attempted and nothing was written after it.
pub fn assert_single_offline_write_last(writes: &[RecordedWrite]) {
    let offline = writes.iter().filter(|w| !w.update.is_active).count();
    assert_eq!(offline, 1, "expected one offline write, got {writes:#?}");
    assert!(
        writes.last().is_some_and(|w| !w.update.is_active),
        "offline write is not the last one: {writes:#?}"
    );
}
