//! Synchronization core for remote astronomy instruments.
//!
//! Instruments (cameras, telescopes, filter wheels, focusers, rotators,
//! safety monitors, cover calibrators) expose state only through
//! individual reads over a slow HTTP-style control protocol — nothing
//! is pushed. This crate owns the machinery that keeps client-side
//! models convergent anyway:
//!
//! - **[`AdaptivePoller`]** — one recurring task per device. Each tick
//!   attempts an aggregated bulk read (cache-first, with a sticky
//!   per-connection "unsupported" verdict), fills the gaps with
//!   parallel single-property reads, and applies the union as one
//!   atomic property update.
//!
//! - **[`ExposureTracker`]** — a tighter-cadence task started only
//!   while an exposure is in flight. Reconciles elapsed time, the
//!   coarse camera state, and the image-ready flag into monotonic
//!   progress and exactly one terminal outcome, bounded by a hard
//!   timeout ceiling.
//!
//! - **[`EventBus`]** — synchronous, insertion-ordered event delivery
//!   with an atomic batch mode, plus a name-keyed handler surface kept
//!   for older consumers.
//!
//! - **[`DeviceRegistry`]** — the device collection and the single
//!   mutation path into property bags: diff one merged map, publish
//!   one change event per key that moved.
//!
//! - **[`InstrumentHub`]** — the facade tying it together, including
//!   the connect/disconnect lifecycle handlers and camera actions with
//!   optimistic updates.
//!
//! Protocol clients are external: anything implementing
//! [`skysync_api::InstrumentClient`] can be attached to a device.

pub mod camera;
pub mod catalog;
pub mod config;
pub mod display;
pub mod error;
pub mod event;
pub mod exposure;
pub mod hub;
pub mod model;
pub mod poller;
pub mod snapshot;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use camera::CameraActions;
pub use config::SyncConfig;
pub use error::CoreError;
pub use event::{Batch, Event, EventBus, ListenerHandle, NamedHandle};
pub use exposure::{ExposureCompletion, ExposurePhase, ExposureTracker};
pub use hub::InstrumentHub;
pub use model::{Device, DeviceKind, DeviceStatus};
pub use poller::AdaptivePoller;
pub use snapshot::{BulkSupport, SnapshotCache};
pub use store::DeviceRegistry;
