use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs, io};

use geotrack_store::FirestoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::path::{MARKET_STREET, Waypoint};

const DEFAULT_CONFIG: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../",
    "configs/default.toml"
));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Store {
    Firestore(FirestoreConfig),
    Memory {
        #[serde(default)]
        devices: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Simulation {
    pub device_id: Option<String>,
    pub cadence_secs: u64,
    /// Wait after a failed write, before the next attempt
    pub cooldown_secs: u64,
    /// Maximum offset added to each coordinate, in degrees
    pub jitter_deg: f64,
    pub battery_min: u8,
    pub battery_max: u8,
    pub speed_min: u32,
    pub speed_max: u32,
    pub seed: Option<u64>,
    /// Stop after this many ticks instead of running until interrupted
    pub max_iterations: Option<u64>,
    pub path: Vec<[f64; 2]>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            device_id: None,
            cadence_secs: 5,
            cooldown_secs: 10,
            jitter_deg: 0.0001,
            battery_min: 15,
            battery_max: 100,
            speed_min: 5,
            speed_max: 25,
            seed: None,
            max_iterations: None,
            path: MARKET_STREET.iter().map(|w| [w.lat, w.lng]).collect(),
        }
    }
}

impl Simulation {
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.cadence_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn waypoints(&self) -> Vec<Waypoint> {
        self.path.iter().map(|&[lat, lng]| Waypoint::new(lat, lng)).collect()
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |message: String| Err(SettingsError::Invalid(message));

        if self.cadence_secs == 0 || self.cooldown_secs == 0 {
            return invalid(String::from("cadence and cooldown must be at least one second"));
        }
        if !self.jitter_deg.is_finite() || self.jitter_deg < 0.0 {
            return invalid(format!(
                "jitter must be a non-negative number, got {}",
                self.jitter_deg
            ));
        }
        if self.battery_min > self.battery_max || self.battery_max > 100 {
            return invalid(format!(
                "battery range {}..={} is not a valid percentage range",
                self.battery_min, self.battery_max
            ));
        }
        if self.speed_min > self.speed_max {
            return invalid(format!(
                "speed range {}..={} is inverted",
                self.speed_min, self.speed_max
            ));
        }
        if self.path.is_empty() {
            return invalid(String::from("path must contain at least one waypoint"));
        }
        if let Some([lat, lng]) = self
            .path
            .iter()
            .find(|[lat, lng]| !(-90.0..=90.0).contains(lat) || !(-180.0..=180.0).contains(lng))
        {
            return invalid(format!(
                "waypoint ({lat}, {lng}) is outside the valid coordinate range"
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logger: Logger,
    pub store: Store,
    #[serde(default)]
    pub simulation: Simulation,
}

impl Settings {
    /// Load the embedded defaults, or the file named by `GEOTRACK_CONFIG`,
    /// then apply `GEOTRACK_*` environment overrides.
    pub fn new() -> Result<Self, SettingsError> {
        let mut settings = match env::var("GEOTRACK_CONFIG") {
            Ok(path) => Self::from_toml(&fs::read_to_string(Self::normalize_path(&path)?)?)?,
            Err(_) => Self::from_toml(DEFAULT_CONFIG)?,
        };

        settings.apply_overrides(|key| env::var(key).ok());
        settings.simulation.validate()?;

        Ok(settings)
    }

    pub fn from_toml(source: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(source)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(device_id) = lookup("GEOTRACK_DEVICE_ID") {
            self.simulation.device_id = Some(device_id);
        }
        if let Some(level) = lookup("GEOTRACK_LOG_LEVEL") {
            self.logger.level = level;
        }
    }

    fn normalize_path(path: &str) -> io::Result<PathBuf> {
        let path_buf = PathBuf::from(path);

        Ok(if path_buf.is_absolute() {
            path_buf
        } else {
            env::current_dir()?.join(&path_buf)
        })
    }
}
