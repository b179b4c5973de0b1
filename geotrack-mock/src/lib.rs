use std::io::{self, BufRead, Write};
use std::sync::Arc;

use geotrack_store::{DeviceStore, FirestoreStore, MemoryStore};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::signal;

use crate::error::SimError;
use crate::path::PathModel;
use crate::settings::{Settings, Store};
use crate::simulate::TelemetryGenerator;
use crate::sync::{RunSummary, SyncLoop};

pub mod error;
pub mod path;
pub mod presence;
pub mod settings;
pub mod simulate;
pub mod sync;

pub async fn run(settings: &Arc<Settings>) -> Result<RunSummary, SimError> {
    let simulation = &settings.simulation;

    let path = PathModel::new(simulation.waypoints())?;
    let rng = match simulation.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let telemetry = TelemetryGenerator::new(rng, simulation)?;

    let device_id = resolve_device_id(
        simulation.device_id.as_deref(),
        io::stdin().lock(),
        io::stdout(),
    )?;
    let store = connect_store(&settings.store)?;

    let mut interrupt = Interrupt::arm().map_err(SimError::Signal)?;
    let mut sync = SyncLoop::new(store, device_id, path, telemetry, simulation);
    sync.run(interrupt.recv()).await
}

pub fn connect_store(store: &Store) -> Result<Arc<dyn DeviceStore>, SimError> {
    let store: Arc<dyn DeviceStore> = match store {
        Store::Firestore(config) => Arc::new(FirestoreStore::new(config.clone())?),
        Store::Memory { devices } => Arc::new(MemoryStore::with_devices(devices.iter().cloned())),
    };

    Ok(store)
}

/// Use the configured device id, or prompt for one on `input`.
pub fn resolve_device_id<R, W>(
    configured: Option<&str>,
    mut input: R,
    mut output: W,
) -> Result<String, SimError>
where
    R: BufRead,
    W: Write,
{
    let device_id = match configured {
        Some(id) => id.trim().to_string(),
        None => {
            write!(output, "Enter the Device ID to simulate: ")?;
            output.flush()?;

            let mut line = String::new();
            input.read_line(&mut line)?;
            line.trim().to_string()
        }
    };

    if device_id.is_empty() {
        return Err(SimError::EmptyDeviceId);
    }

    Ok(device_id)
}

/// Process exit status for a finished run: zero after an interrupt or a
/// completed run, non-zero for any failure.
pub fn exit_status(result: &Result<RunSummary, SimError>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

/// Ctrl+C, plus SIGTERM on unix, listened for from the moment it is armed.
///
/// Signals delivered before [`Interrupt::recv`] is polled are kept. The
/// handlers stay installed for the rest of the process, so later signals are
/// absorbed instead of killing it mid-shutdown.
pub struct Interrupt {
    #[cfg(unix)]
    interrupt: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: signal::windows::CtrlC,
}

impl Interrupt {
    #[cfg(unix)]
    pub fn arm() -> io::Result<Self> {
        use signal::unix::{SignalKind, signal as listen};

        Ok(Self {
            interrupt: listen(SignalKind::interrupt())?,
            terminate: listen(SignalKind::terminate())?,
        })
    }

    #[cfg(windows)]
    pub fn arm() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: signal::windows::ctrl_c()?,
        })
    }

    pub async fn recv(&mut self) {
        #[cfg(unix)]
        tokio::select! {
            _ = self.interrupt.recv() => {},
            _ = self.terminate.recv() => {},
        }

        #[cfg(windows)]
        self.ctrl_c.recv().await;
    }
}
