//! Document store seam for the tracked-device simulator.
//!
//! A device is one document keyed by its identifier. The simulator only ever
//! reads a whole document or merges a [`DeviceUpdate`] into it; creating and
//! deleting devices belongs to whoever owns the store.

use async_trait::async_trait;

pub use reqwest::StatusCode;

pub use error::StoreError;
pub use firestore::{FirestoreConfig, FirestoreStore};
pub use memory::MemoryStore;
pub use record::{DeviceRecord, DeviceUpdate, PositionSample, Speed, Timestamp};

mod error;
mod firestore;
mod memory;
mod record;

#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Store name used in log lines
    fn name(&self) -> &'static str;

    /// Fetch the device document, `None` when it does not exist
    async fn get(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError>;

    /// Merge the given fields into an existing device document.
    ///
    /// Only the top-level fields carried by `update` are touched, and
    /// `updatedAt` is always set to the commit time. Fails with
    /// [`StoreError::NotFound`] when the document is gone; an update never
    /// creates a device.
    async fn update(&self, id: &str, update: &DeviceUpdate) -> Result<(), StoreError>;
}
