use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use geotrack_store::{DeviceStore, DeviceUpdate, PositionSample};
use tracing::{error, info, warn};

/// Owns the online/offline flag of one device record.
///
/// Every store failure is logged here and swallowed, so presence changes never
/// abort the caller.
pub struct PresenceManager {
    store: Arc<dyn DeviceStore>,
    device_id: String,
    shut_down: AtomicBool,
}

impl PresenceManager {
    pub fn new(store: Arc<dyn DeviceStore>, device_id: impl Into<String>) -> Self {
        Self {
            store,
            device_id: device_id.into(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Write the presence flag, attaching `last_position` when given.
    /// Returns whether the write landed.
    pub async fn set_active(&self, is_active: bool, last_position: Option<PositionSample>) -> bool {
        let update = DeviceUpdate::presence(is_active, last_position);

        match self.store.update(&self.device_id, &update).await {
            Ok(()) => {
                let status = if is_active { "Online" } else { "Offline" };
                info!("Device {} is now {}", self.device_id, status);
                true
            }
            Err(e) => {
                error!("Error updating device {} status: {}", self.device_id, e);
                false
            }
        }
    }

    /// Best-effort read of the last stored position, `None` on any failure.
    pub async fn capture_last_position(&self) -> Option<PositionSample> {
        match self.store.get(&self.device_id).await {
            Ok(Some(record)) => record.last_position,
            Ok(None) => {
                warn!("Device {} no longer exists, no last position to keep", self.device_id);
                None
            }
            Err(e) => {
                error!("Could not fetch last position on shutdown: {}", e);
                None
            }
        }
    }

    /// Mark the device offline, carrying over its last stored position.
    ///
    /// Only the first call does anything; later calls return `false` without
    /// touching the store.
    pub async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!("Shutting down, setting device {} offline", self.device_id);

        let last_position = self.capture_last_position().await;
        if !self.set_active(false, last_position).await {
            error!("Device {} may still be marked online", self.device_id);
        }

        info!("Shutdown complete");
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}
