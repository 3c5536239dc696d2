// ── Instrument client trait ──
//
// The seam between the synchronization core and the per-family protocol
// implementations. The core never marshals requests itself -- it drives
// whatever client the registry hands it through this trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;
use crate::types::{ImageData, PropertyMap};

/// Control-protocol client for a single instrument.
///
/// One implementation exists per instrument family (camera, telescope,
/// filter wheel, ...). The core treats every client uniformly: bulk
/// reads when the instrument supports them, single-property reads
/// otherwise, plus the handful of camera commands the exposure flow
/// issues. Non-camera families keep the default camera-method
/// implementations, which report the operation as unsupported.
#[async_trait]
pub trait InstrumentClient: Send + Sync {
    /// Fetch many properties in one request.
    ///
    /// Returns a lowercase-keyed map. Instruments without bulk-read
    /// support may return an error or an empty map -- callers treat
    /// both the same way.
    async fn aggregated_state(&self) -> Result<PropertyMap, ApiError>;

    /// Read a single property by its lowercase name.
    async fn read(&self, property: &str) -> Result<Value, ApiError>;

    /// Begin an exposure. `light` selects a light frame over a dark.
    async fn start_exposure(&self, duration_secs: f64, light: bool) -> Result<(), ApiError> {
        let _ = (duration_secs, light);
        Err(ApiError::unsupported("startexposure"))
    }

    /// Abort the in-flight exposure, discarding the frame.
    async fn abort_exposure(&self) -> Result<(), ApiError> {
        Err(ApiError::unsupported("abortexposure"))
    }

    /// Download the completed frame.
    async fn fetch_image(&self) -> Result<ImageData, ApiError> {
        Err(ApiError::unsupported("imagearray"))
    }
}
