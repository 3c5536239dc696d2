// ── Camera command orchestration ──
//
// Wraps the camera's command surface with the optimistic-update
// discipline: properties flip immediately when a command is issued,
// revert if the instrument rejects it, and every failure is surfaced
// both to the caller and as an error event. Successful exposure starts
// hand off to the exposure tracker; completion performs the frame
// readout and publishes the final lifecycle event.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use skysync_api::{InstrumentClient, PropertyMap};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::event::{Event, EventBus};
use crate::exposure::{ExposureCompletion, ExposureTracker};
use crate::store::DeviceRegistry;

/// Camera actions exposed to callers (UI, sequencers).
#[derive(Clone)]
pub struct CameraActions {
    inner: Arc<CameraInner>,
}

struct CameraInner {
    registry: Arc<DeviceRegistry>,
    bus: EventBus,
    tracker: ExposureTracker,
}

impl CameraActions {
    pub fn new(registry: Arc<DeviceRegistry>, bus: EventBus, tracker: ExposureTracker) -> Self {
        Self {
            inner: Arc::new(CameraInner {
                registry,
                bus,
                tracker,
            }),
        }
    }

    fn connected_client(
        &self,
        device_id: &str,
    ) -> Result<Arc<dyn InstrumentClient>, CoreError> {
        let device = self
            .inner
            .registry
            .device(device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                device_id: device_id.to_owned(),
            })?;
        if !device.connected {
            return Err(CoreError::NotConnected {
                device_id: device_id.to_owned(),
            });
        }
        self.inner
            .registry
            .client(device_id)
            .ok_or_else(|| CoreError::ClientUnavailable {
                device_id: device_id.to_owned(),
            })
    }

    /// Command an exposure and begin tracking it.
    ///
    /// The optimistic property flip and the started event are emitted
    /// as one atomic batch, so observers never see the flag without the
    /// event or vice versa. If the instrument rejects the command the
    /// optimistic update is reverted and the error is both returned and
    /// published as a `DeviceApiError`.
    pub async fn start_exposure(
        &self,
        device_id: &str,
        duration_secs: f64,
        is_light: bool,
    ) -> Result<(), CoreError> {
        let client = self.connected_client(device_id)?;

        let batch = self.inner.bus.batch();
        batch.start();
        self.inner.registry.update_device_properties(
            device_id,
            PropertyMap::from([
                ("isexposing".to_owned(), Value::Bool(true)),
                ("exposureprogress".to_owned(), Value::from(0)),
            ]),
        );
        batch.queue(Event::CameraExposureStarted {
            device_id: device_id.to_owned(),
            duration_secs,
            is_light,
        });
        batch.end();

        match client.start_exposure(duration_secs, is_light).await {
            Ok(()) => {
                debug!(device = device_id, duration_secs, is_light, "exposure started");
                self.inner.tracker.start(
                    device_id,
                    duration_secs,
                    Arc::new(self.clone()) as Arc<dyn ExposureCompletion>,
                );
                Ok(())
            }
            Err(e) => {
                warn!(device = device_id, error = %e, "start exposure rejected — reverting");
                self.inner.registry.update_device_properties(
                    device_id,
                    PropertyMap::from([
                        ("isexposing".to_owned(), Value::Bool(false)),
                        ("exposureprogress".to_owned(), Value::from(0)),
                    ]),
                );
                self.inner.bus.emit(Event::DeviceApiError {
                    device_id: device_id.to_owned(),
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Abort the in-flight exposure.
    ///
    /// Cancels the tracker (no terminal event — the abort itself is the
    /// outcome) and writes the terminal properties here.
    pub async fn abort_exposure(&self, device_id: &str) -> Result<(), CoreError> {
        let client = self.connected_client(device_id)?;

        match client.abort_exposure().await {
            Ok(()) => {
                self.inner.tracker.cancel(device_id);
                self.inner.registry.update_device_properties(
                    device_id,
                    PropertyMap::from([
                        ("isexposing".to_owned(), Value::Bool(false)),
                        ("exposureprogress".to_owned(), Value::from(0)),
                    ]),
                );
                self.inner.bus.emit(Event::CommandResult {
                    device_id: device_id.to_owned(),
                    command: "abortexposure".to_owned(),
                    success: true,
                    message: None,
                });
                Ok(())
            }
            Err(e) => {
                warn!(device = device_id, error = %e, "abort exposure failed");
                self.inner.bus.emit(Event::DeviceApiError {
                    device_id: device_id.to_owned(),
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl ExposureCompletion for CameraActions {
    /// Frame readout after the tracker observed image-ready. Runs with
    /// the tracker's timer already stopped; emits exactly one
    /// `CameraExposureComplete`, carrying either the frame or the
    /// readout error.
    async fn exposure_complete(&self, device_id: &str) {
        let client = match self.connected_client(device_id) {
            Ok(client) => client,
            Err(e) => {
                debug!(device = device_id, error = %e, "completion without usable client");
                return;
            }
        };

        let final_props = PropertyMap::from([
            ("isexposing".to_owned(), Value::Bool(false)),
            ("exposureprogress".to_owned(), Value::from(100)),
            ("imageready".to_owned(), Value::Bool(true)),
        ]);

        match client.fetch_image().await {
            Ok(image) => {
                let batch = self.inner.bus.batch();
                batch.start();
                self.inner
                    .registry
                    .update_device_properties(device_id, final_props);
                batch.queue(Event::CameraExposureComplete {
                    device_id: device_id.to_owned(),
                    image: Some(image),
                    image_url: None,
                    error: None,
                });
                batch.end();
            }
            Err(e) => {
                warn!(device = device_id, error = %e, "frame readout failed");
                self.inner
                    .registry
                    .update_device_properties(device_id, final_props);
                self.inner.bus.emit(Event::CameraExposureComplete {
                    device_id: device_id.to_owned(),
                    image: None,
                    image_url: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }
}
