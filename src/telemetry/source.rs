//! Telemetry record source
//!
//! The latest location/battery snapshot is persisted as a small JSON file
//! by the GPS reader and consumed read-only by the publisher. The record
//! may be stale or absent; both are transient conditions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::TelemetryError;

/// Latest known device location/battery snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Device identifier
    pub drone_id: String,
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub long: f64,
    /// Battery indicator, e.g. `85%`
    pub bat: String,
}

impl TelemetryRecord {
    /// Wire format of one telemetry report on the data topic
    pub fn format_report(&self) -> String {
        format!("BAT:{} - LAT:{} - LONG:{}", self.bat, self.lat, self.long)
    }
}

/// Read-only source of the latest telemetry record
pub trait TelemetrySource: Send {
    fn latest(&self) -> Result<TelemetryRecord, TelemetryError>;
}

/// Source backed by the persisted JSON record
pub struct FileTelemetrySource {
    path: PathBuf,
}

impl FileTelemetrySource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TelemetrySource for FileTelemetrySource {
    fn latest(&self) -> Result<TelemetryRecord, TelemetryError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| TelemetryError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&content).map_err(|e| TelemetryError::Malformed(e.to_string()))
    }
}
