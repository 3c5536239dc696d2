// ── Core error types ──
//
// User-facing errors from skysync-core. These are NOT protocol-specific --
// consumers never see raw wire detail directly. The `From<ApiError>`
// impl translates client-layer errors into domain-appropriate variants.

use skysync_api::ApiError;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Lookup errors ────────────────────────────────────────────────
    #[error("Device not found: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Device not connected: {device_id}")]
    NotConnected { device_id: String },

    #[error("No protocol client attached for device: {device_id}")]
    ClientUnavailable { device_id: String },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Command {command} failed on {device_id}: {message}")]
    CommandFailed {
        device_id: String,
        command: String,
        message: String,
    },

    #[error("Operation not supported by instrument: {operation}")]
    Unsupported { operation: String },

    // ── Wrapped protocol errors ──────────────────────────────────────
    #[error("Instrument API error: {message}")]
    Api {
        message: String,
        /// Protocol error number, when the instrument supplied one.
        code: Option<i32>,
    },
}

// ── Conversion from client-layer errors ──────────────────────────────

impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unsupported { operation } => CoreError::Unsupported { operation },
            ApiError::Protocol { message, code } => CoreError::Api { message, code },
            other => CoreError::Api {
                message: other.to_string(),
                code: None,
            },
        }
    }
}
