// ── Instrument hub ──
//
// The facade callers hold. Owns the registry, the event bus, and the
// two recurring-task engines, and wires the device connection
// lifecycle to them: connecting a device starts its property polling,
// disconnecting tears every session down.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::camera::CameraActions;
use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::event::{Batch, Event, EventBus, ListenerHandle, NamedHandle};
use crate::exposure::ExposureTracker;
use crate::model::DeviceStatus;
use crate::poller::AdaptivePoller;
use crate::store::DeviceRegistry;

/// Entry point for consumers.
///
/// Cheaply cloneable; clones share all state. Construct one per
/// instrument host the application talks to.
#[derive(Clone)]
pub struct InstrumentHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    bus: EventBus,
    registry: Arc<DeviceRegistry>,
    poller: AdaptivePoller,
    tracker: ExposureTracker,
    camera: CameraActions,
}

impl InstrumentHub {
    pub fn new(config: SyncConfig) -> Self {
        let bus = EventBus::new();
        let registry = Arc::new(DeviceRegistry::new(bus.clone()));
        let poller = AdaptivePoller::new(Arc::clone(&registry), config.clone());
        let tracker = ExposureTracker::new(Arc::clone(&registry), bus.clone(), config);
        let camera = CameraActions::new(Arc::clone(&registry), bus.clone(), tracker.clone());

        Self {
            inner: Arc::new(HubInner {
                bus,
                registry,
                poller,
                tracker,
                camera,
            }),
        }
    }

    // ── Component access ─────────────────────────────────────────────

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn poller(&self) -> &AdaptivePoller {
        &self.inner.poller
    }

    pub fn tracker(&self) -> &ExposureTracker {
        &self.inner.tracker
    }

    // ── Listener surface ─────────────────────────────────────────────

    pub fn add_listener(
        &self,
        listener: impl Fn(&Event) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.inner.bus.add_listener(listener)
    }

    pub fn remove_listener(&self, handle: ListenerHandle) {
        self.inner.bus.remove_listener(handle);
    }

    pub fn batch(&self) -> Batch {
        self.inner.bus.batch()
    }

    pub fn on(&self, name: &str, handler: impl Fn(&[Value]) + Send + Sync + 'static) -> NamedHandle {
        self.inner.bus.on(name, handler)
    }

    pub fn off(&self, name: &str, handle: NamedHandle) {
        self.inner.bus.off(name, handle);
    }

    pub fn emit_named(&self, name: &str, args: &[Value]) {
        self.inner.bus.emit_named(name, args);
    }

    // ── Polling ──────────────────────────────────────────────────────

    pub fn start_polling(&self, device_id: &str, interval_ms: Option<u64>) {
        self.inner.poller.start(device_id, interval_ms);
    }

    pub fn stop_polling(&self, device_id: &str) {
        self.inner.poller.stop(device_id);
    }

    // ── Camera actions ───────────────────────────────────────────────

    pub async fn start_exposure(
        &self,
        device_id: &str,
        duration_secs: f64,
        is_light: bool,
    ) -> Result<(), CoreError> {
        self.inner
            .camera
            .start_exposure(device_id, duration_secs, is_light)
            .await
    }

    pub async fn abort_exposure(&self, device_id: &str) -> Result<(), CoreError> {
        self.inner.camera.abort_exposure(device_id).await
    }

    /// Track an exposure that was started out of band (an external
    /// sequencer, a hand controller). Uses the standard camera
    /// completion handler for readout when the frame is ready.
    pub fn start_exposure_tracking(&self, device_id: &str, duration_secs: f64) {
        self.inner
            .tracker
            .start(device_id, duration_secs, Arc::new(self.inner.camera.clone()));
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Handle a device that just finished connecting: mark it live and
    /// begin keeping its properties fresh.
    pub fn handle_device_connected(&self, device_id: &str) {
        info!(device = device_id, "device connected");
        self.inner
            .registry
            .set_status(device_id, DeviceStatus::Connected);
        self.inner.poller.start(device_id, None);
    }

    /// Handle a device going away: stop both recurring loops before the
    /// model flips to disconnected, so no further ticks observe it.
    /// Deliberately quiet beyond the connection event — dependent state
    /// is cleared by whoever removed the device.
    pub fn handle_device_disconnected(&self, device_id: &str) {
        info!(device = device_id, "device disconnected");
        self.inner.poller.stop(device_id);
        self.inner.tracker.cancel(device_id);
        self.inner.registry.set_status(device_id, DeviceStatus::Idle);
    }
}
