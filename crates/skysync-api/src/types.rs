// ── Protocol value types ──

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Property payload as instruments report it: lowercase property name to
/// raw JSON value. Both the aggregated bulk read and single-property
/// reads produce entries in this shape.
pub type PropertyMap = HashMap<String, Value>;

/// Coarse operational state a camera reports through its `camerastate`
/// property. Wire encoding is a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum CameraState {
    Idle,
    Waiting,
    Exposing,
    Reading,
    Download,
    Error,
}

impl CameraState {
    /// Decode the protocol's integer encoding. Unknown codes map to
    /// `None` so callers can treat them as a failed read.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Idle),
            1 => Some(Self::Waiting),
            2 => Some(Self::Exposing),
            3 => Some(Self::Reading),
            4 => Some(Self::Download),
            5 => Some(Self::Error),
            _ => None,
        }
    }

    /// Lenient decode from a raw JSON value. Accepts integers and
    /// numeric strings — some instrument firmware stringifies numbers.
    pub fn from_value(value: &Value) -> Option<Self> {
        let code = value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse::<i64>().ok()))?;
        Self::from_code(code)
    }

    /// Integer encoding used on the wire.
    pub fn code(self) -> i64 {
        match self {
            Self::Idle => 0,
            Self::Waiting => 1,
            Self::Exposing => 2,
            Self::Reading => 3,
            Self::Download => 4,
            Self::Error => 5,
        }
    }

    /// Returns `true` while the camera is busy producing a frame
    /// (anything between shutter open and image available).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Waiting | Self::Exposing | Self::Reading | Self::Download
        )
    }
}

/// Raw pixel buffer of a downloaded frame, in the sample depth the
/// instrument delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl SampleBuffer {
    /// Number of samples in the buffer (pixels × channels).
    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A downloaded camera frame.
///
/// `channels` is 1 for mono sensors and 3 for RGB; `samples` holds
/// `width * height * channels` values in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: usize,
    pub height: usize,
    pub channels: u8,
    pub samples: SampleBuffer,
}

impl ImageData {
    /// Returns `true` when the buffer length matches the declared
    /// geometry. Frames failing this check should not be rendered.
    pub fn is_consistent(&self) -> bool {
        self.samples.len() == self.width * self.height * usize::from(self.channels)
    }
}
