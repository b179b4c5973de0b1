use geotrack_store::{PositionSample, Speed, Timestamp};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::SettingsError;
use crate::path::Waypoint;
use crate::settings::Simulation;

/// Turns a waypoint into one telemetry sample.
pub trait TelemetrySource {
    fn sample(&mut self, waypoint: Waypoint) -> PositionSample;
}

/// Uniformly random battery, speed and coordinate jitter drawn from `R`.
///
/// The sample timestamp is left for the store to assign on commit.
pub struct TelemetryGenerator<R> {
    rng: R,
    battery: Uniform<u8>,
    speed: Uniform<u32>,
    jitter: Uniform<f64>,
}

impl<R: Rng> TelemetryGenerator<R> {
    pub fn new(rng: R, simulation: &Simulation) -> Result<Self, SettingsError> {
        Ok(Self {
            rng,
            battery: Uniform::new_inclusive(simulation.battery_min, simulation.battery_max)
                .map_err(|e| SettingsError::Invalid(format!("battery range: {e}")))?,
            speed: Uniform::new_inclusive(simulation.speed_min, simulation.speed_max)
                .map_err(|e| SettingsError::Invalid(format!("speed range: {e}")))?,
            jitter: Uniform::new_inclusive(-simulation.jitter_deg, simulation.jitter_deg)
                .map_err(|e| SettingsError::Invalid(format!("jitter range: {e}")))?,
        })
    }
}

impl<R: Rng> TelemetrySource for TelemetryGenerator<R> {
    fn sample(&mut self, waypoint: Waypoint) -> PositionSample {
        let battery = self.battery.sample(&mut self.rng);
        let speed = self.speed.sample(&mut self.rng);
        let lat = waypoint.lat + self.jitter.sample(&mut self.rng);
        let lng = waypoint.lng + self.jitter.sample(&mut self.rng);

        PositionSample {
            lat,
            lng,
            speed: Speed(speed),
            battery,
            timestamp: Timestamp::ServerAssigned,
        }
    }
}
