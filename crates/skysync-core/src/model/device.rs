// ── Device domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skysync_api::{CameraState, PropertyMap};
use url::Url;

/// Instrument family. Determines which property catalog the poller
/// keeps fresh and which command surfaces apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[non_exhaustive]
pub enum DeviceKind {
    Camera,
    Telescope,
    FilterWheel,
    Focuser,
    Rotator,
    SafetyMonitor,
    CoverCalibrator,
}

/// Connection lifecycle state, as driven by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum DeviceStatus {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

impl DeviceStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Client-side model of one remote instrument.
///
/// `properties` is the lowercase-keyed bag the polling loop keeps in
/// sync with hardware. It is only ever mutated through the registry's
/// diff-and-publish update; everything else reads snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    /// Control endpoint the device was discovered at, when known.
    pub address: Option<Url>,
    pub connected: bool,
    pub status: DeviceStatus,
    /// Poll cadence stored on the device (milliseconds). Overrides the
    /// configured default; an explicit `start_polling` argument
    /// overrides both.
    pub poll_interval_ms: Option<u64>,
    pub properties: PropertyMap,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            address: None,
            connected: false,
            status: DeviceStatus::Idle,
            poll_interval_ms: None,
            properties: PropertyMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Raw property lookup by lowercase name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn bool_property(&self, name: &str) -> Option<bool> {
        self.property(name)?.as_bool()
    }

    pub fn f64_property(&self, name: &str) -> Option<f64> {
        self.property(name)?.as_f64()
    }

    /// Returns `true` while the device reports an exposure in flight,
    /// either through the coarse camera state or the optimistic
    /// `isexposing` flag. Non-cameras always report `false`.
    pub fn is_mid_exposure(&self) -> bool {
        if self.kind != DeviceKind::Camera {
            return false;
        }
        if self.bool_property("isexposing") == Some(true) {
            return true;
        }
        self.property("camerastate")
            .and_then(CameraState::from_value)
            .is_some_and(CameraState::is_active)
    }
}
