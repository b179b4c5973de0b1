use std::fmt;
use std::str::FromStr;

use time::OffsetDateTime;

/// A timestamp field that is either already known or left for the store to
/// fill in when the write commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    ServerAssigned,
    At(OffsetDateTime),
}

impl Timestamp {
    pub fn resolve(self, commit_time: OffsetDateTime) -> OffsetDateTime {
        match self {
            Timestamp::ServerAssigned => commit_time,
            Timestamp::At(time) => time,
        }
    }
}

/// Ground speed in whole miles per hour, stored as `"<N> mph"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Speed(pub u32);

impl Speed {
    pub fn mph(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mph", self.0)
    }
}

impl FromStr for Speed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_end_matches("mph").trim_end();

        digits
            .parse::<u32>()
            .map(Speed)
            .map_err(|e| format!("invalid speed '{s}': {e}"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionSample {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
    pub speed: Speed,
    /// Battery charge in percent
    pub battery: u8,
    pub timestamp: Timestamp,
}

impl PositionSample {
    /// Same sample with its timestamp pinned to what the store committed.
    pub fn resolved(&self, commit_time: OffsetDateTime) -> Self {
        Self {
            timestamp: Timestamp::At(self.timestamp.resolve(commit_time)),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub id: String,
    pub is_active: bool,
    pub last_position: Option<PositionSample>,
    pub updated_at: Option<OffsetDateTime>,
}

impl DeviceRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_active: false,
            last_position: None,
            updated_at: None,
        }
    }
}

/// A partial write against a device document.
///
/// `isActive` and `updatedAt` are always written, `lastPosition` only when
/// present. The whole update lands in one write so readers never observe a
/// half-applied position.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceUpdate {
    pub is_active: bool,
    pub last_position: Option<PositionSample>,
}

impl DeviceUpdate {
    pub fn presence(is_active: bool, last_position: Option<PositionSample>) -> Self {
        Self { is_active, last_position }
    }

    pub fn position(sample: PositionSample) -> Self {
        Self {
            is_active: true,
            last_position: Some(sample),
        }
    }

    /// Top-level document fields carrying a value in this update.
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = vec!["isActive"];
        if self.last_position.is_some() {
            paths.push("lastPosition");
        }
        paths
    }
}
