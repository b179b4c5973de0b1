use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use geotrack_store::{DeviceStore, DeviceUpdate};
use tokio::time;
use tracing::{error, info};

use crate::error::SimError;
use crate::path::PathModel;
use crate::presence::PresenceManager;
use crate::settings::Simulation;
use crate::simulate::TelemetrySource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Validating,
    Running,
    ShuttingDown,
    Offline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Position writes that landed
    pub sent: u64,
    /// Position writes that failed and were followed by a cooldown
    pub failed: u64,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn ticks(&self) -> u64 {
        self.sent + self.failed
    }
}

/// Drives one device along its path and keeps its record in the store
/// current until interrupted.
pub struct SyncLoop<T> {
    store: Arc<dyn DeviceStore>,
    device_id: String,
    path: PathModel,
    telemetry: T,
    cadence: Duration,
    cooldown: Duration,
    max_iterations: Option<u64>,
    state: SyncState,
    summary: RunSummary,
}

impl<T: TelemetrySource> SyncLoop<T> {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        device_id: impl Into<String>,
        path: PathModel,
        telemetry: T,
        simulation: &Simulation,
    ) -> Self {
        Self {
            store,
            device_id: device_id.into(),
            path,
            telemetry,
            cadence: simulation.cadence(),
            cooldown: simulation.cooldown(),
            max_iterations: simulation.max_iterations,
            state: SyncState::Uninitialized,
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Run until `interrupt` resolves, the iteration limit is hit, or the
    /// loop fails.
    ///
    /// Once the device has been marked online, every exit path (interrupt,
    /// normal completion, error or panic inside the loop) goes through the
    /// presence shutdown exactly once before returning. A missing device or
    /// unreachable store fails before anything is written.
    ///
    /// `interrupt` is only observed between store calls: a write already in
    /// flight always finishes before shutdown starts. Signal listeners behind
    /// it must be armed before calling this.
    pub async fn run<F>(&mut self, interrupt: F) -> Result<RunSummary, SimError>
    where
        F: Future<Output = ()>,
    {
        self.state = SyncState::Validating;

        match self.store.get(&self.device_id).await {
            Ok(Some(_)) => info!(
                "Successfully found device '{}' in {} store, starting simulation",
                self.device_id,
                self.store.name()
            ),
            Ok(None) => {
                self.state = SyncState::Offline;
                return Err(SimError::DeviceNotFound(self.device_id.clone()));
            }
            Err(e) => {
                self.state = SyncState::Offline;
                return Err(SimError::Unreachable(e));
            }
        }

        let mut interrupt = pin!(interrupt);

        let presence = PresenceManager::new(Arc::clone(&self.store), self.device_id.clone());
        presence.set_active(true, None).await;

        self.state = SyncState::Running;
        info!("GPS simulation started, press Ctrl+C to stop");

        let outcome = match AssertUnwindSafe(self.drive(interrupt.as_mut()))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(SimError::Panicked(panic_message(panic))),
        };

        self.state = SyncState::ShuttingDown;
        match &outcome {
            Ok(LoopExit::Interrupted) => info!("Interrupt received"),
            Ok(LoopExit::Completed) => {
                info!("Simulation finished after {} ticks", self.summary.ticks())
            }
            Err(e) => error!("Simulation stopped: {}", e),
        }

        presence.shutdown().await;
        self.state = SyncState::Offline;

        outcome.map(|exit| RunSummary {
            interrupted: exit == LoopExit::Interrupted,
            ..self.summary
        })
    }

    async fn drive<F>(&mut self, mut interrupt: Pin<&mut F>) -> Result<LoopExit, SimError>
    where
        F: Future<Output = ()>,
    {
        // Interrupted while going online
        if interrupt.as_mut().now_or_never().is_some() {
            return Ok(LoopExit::Interrupted);
        }

        loop {
            if self
                .max_iterations
                .is_some_and(|max| self.summary.ticks() >= max)
            {
                return Ok(LoopExit::Completed);
            }

            let step = self.path.next_step();
            let sample = self.telemetry.sample(step.waypoint);
            let update = DeviceUpdate::position(sample.clone());

            let pause = match self.store.update(&self.device_id, &update).await {
                Ok(()) => {
                    self.summary.sent += 1;
                    info!(
                        "Sent update: Pos {}/{} | Lat: {:.4}, Lng: {:.4} | Speed: {} | Bat: {}%",
                        step.position,
                        step.length,
                        sample.lat,
                        sample.lng,
                        sample.speed,
                        sample.battery
                    );
                    self.cadence
                }
                Err(e) if e.is_not_found() => {
                    return Err(SimError::DeviceRemoved(self.device_id.clone()));
                }
                Err(e) => {
                    self.summary.failed += 1;
                    error!("An error occurred during simulation: {}", e);
                    self.cooldown
                }
            };

            tokio::select! {
                biased;
                _ = interrupt.as_mut() => return Ok(LoopExit::Interrupted),
                _ = time::sleep(pause) => {}
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Completed,
    Interrupted,
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}
