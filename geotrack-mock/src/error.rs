use std::io;

use geotrack_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Device ID cannot be empty")]
    EmptyDeviceId,

    #[error("Device with ID '{0}' not found, add it to the store before running the simulator")]
    DeviceNotFound(String),

    #[error("Error accessing the device store: {0}")]
    Unreachable(#[source] StoreError),

    #[error("Device '{0}' was removed from the store during the simulation")]
    DeviceRemoved(String),

    #[error("Failed to listen for interrupt signals: {0}")]
    Signal(#[source] io::Error),

    #[error("Simulation loop panicked: {0}")]
    Panicked(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to read device ID: {0}")]
    Io(#[from] io::Error),
}
