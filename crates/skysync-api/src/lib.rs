//! Protocol surface consumed by the skysync synchronization core.
//!
//! This crate defines the seam between the core's polling machinery and
//! the per-instrument-family protocol clients:
//!
//! - **[`InstrumentClient`]** — the async client trait every family
//!   implements: one aggregated bulk read, single-property reads, and
//!   the camera commands the exposure flow issues.
//! - **[`CameraState`]** — the coarse phase enum cameras report, with
//!   lenient decoding from raw protocol values.
//! - **[`ImageData`]** / **[`SampleBuffer`]** — downloaded frames in
//!   the sample depth the instrument delivered.
//! - **[`ApiError`]** — every failure mode a client can report, with
//!   `is_transient()` / `is_unsupported()` classification helpers the
//!   core uses to decide between retrying and backing off.

pub mod client;
pub mod error;
pub mod types;

pub use client::InstrumentClient;
pub use error::ApiError;
pub use types::{CameraState, ImageData, PropertyMap, SampleBuffer};
