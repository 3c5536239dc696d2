// ── Domain events ──
//
// Every state transition the core observes or causes is published as a
// value from this closed set. Events are immutable; listeners receive
// them by reference and clone what they keep.

mod bus;

use serde_json::Value;
use skysync_api::ImageData;

pub use bus::{Batch, EventBus, ListenerHandle, NamedHandle};

/// Structured events emitted by the synchronization core.
///
/// Every variant carries the id of the device it concerns; exposure
/// variants exist because exposure completion cannot be pushed by the
/// instrument and must be synthesized from polling.
#[derive(Debug, Clone)]
pub enum Event {
    /// A device finished its connection handshake.
    DeviceConnected { device_id: String },

    /// A device was disconnected (deliberately or by disappearance).
    DeviceDisconnected { device_id: String },

    /// One property changed value. Emitted once per changed key by the
    /// registry's diff-and-publish update.
    DevicePropertyChanged {
        device_id: String,
        property: String,
        value: Value,
    },

    /// Outcome of a command issued through the action surface.
    CommandResult {
        device_id: String,
        command: String,
        success: bool,
        message: Option<String>,
    },

    /// An exposure was accepted by the camera.
    CameraExposureStarted {
        device_id: String,
        duration_secs: f64,
        is_light: bool,
    },

    /// Exposure progress advanced (monotonic, 0–100).
    CameraExposureChanged {
        device_id: String,
        percent_complete: f64,
    },

    /// The exposure finished and the frame was read out (or the
    /// readout failed — then `error` is set and `image` is absent).
    CameraExposureComplete {
        device_id: String,
        image: Option<ImageData>,
        image_url: Option<String>,
        error: Option<String>,
    },

    /// The exposure ended without a frame: instrument error state or
    /// tracker timeout.
    CameraExposureFailed { device_id: String, error: String },

    /// A command against the instrument API failed.
    DeviceApiError { device_id: String, error: String },
}

impl Event {
    /// The device this event concerns.
    pub fn device_id(&self) -> &str {
        match self {
            Self::DeviceConnected { device_id }
            | Self::DeviceDisconnected { device_id }
            | Self::DevicePropertyChanged { device_id, .. }
            | Self::CommandResult { device_id, .. }
            | Self::CameraExposureStarted { device_id, .. }
            | Self::CameraExposureChanged { device_id, .. }
            | Self::CameraExposureComplete { device_id, .. }
            | Self::CameraExposureFailed { device_id, .. }
            | Self::DeviceApiError { device_id, .. } => device_id,
        }
    }

    /// Stable camel-case name, matching what older name-keyed consumers
    /// subscribed to.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceConnected { .. } => "deviceConnected",
            Self::DeviceDisconnected { .. } => "deviceDisconnected",
            Self::DevicePropertyChanged { .. } => "devicePropertyChanged",
            Self::CommandResult { .. } => "commandResult",
            Self::CameraExposureStarted { .. } => "cameraExposureStarted",
            Self::CameraExposureChanged { .. } => "cameraExposureChanged",
            Self::CameraExposureComplete { .. } => "cameraExposureComplete",
            Self::CameraExposureFailed { .. } => "cameraExposureFailed",
            Self::DeviceApiError { .. } => "deviceApiError",
        }
    }
}
