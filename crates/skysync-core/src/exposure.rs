// ── Exposure progress tracking ──
//
// Converts a one-shot "start exposure" command and periodic coarse
// state polling into a deterministic lifecycle with exactly one
// terminal outcome. Three independently failing signals — elapsed
// time, the coarse camera state, and the fine-grained image-ready
// flag — are reconciled into a monotonic progress value. The session
// is torn down (timer stopped) before any terminal event or callback
// fires, so a terminal outcome can never double-deliver.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use skysync_api::{CameraState, PropertyMap};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::event::{Event, EventBus};
use crate::store::DeviceRegistry;

/// Lifecycle phase of a tracked exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ExposurePhase {
    /// The shutter is (assumed) open; progress advances with time.
    Exposing,
    /// The camera went idle after the expected duration; waiting for
    /// the image-ready flag.
    AwaitingIdle,
    Complete,
    Error,
    TimedOut,
    Aborted,
}

impl ExposurePhase {
    /// Terminal phases stop the tracking loop permanently.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Error | Self::TimedOut | Self::Aborted
        )
    }
}

/// Device-specific follow-up invoked exactly once when an exposure
/// reaches [`ExposurePhase::Complete`] — typically frame readout.
/// The tracker's own timer is already stopped when this runs.
#[async_trait]
pub trait ExposureCompletion: Send + Sync {
    async fn exposure_complete(&self, device_id: &str);
}

struct ExposureSession {
    generation: u64,
    cancel: CancellationToken,
    started_at: Instant,
    expected: Duration,
    phase: Mutex<ExposurePhase>,
    last_progress: Mutex<f64>,
}

/// Per-device exposure lifecycle tracking.
///
/// Cheaply cloneable; clones share the session registry.
#[derive(Clone)]
pub struct ExposureTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    registry: Arc<DeviceRegistry>,
    bus: EventBus,
    config: SyncConfig,
    sessions: DashMap<String, ExposureSession>,
    generation: AtomicU64,
}

impl ExposureTracker {
    pub fn new(registry: Arc<DeviceRegistry>, bus: EventBus, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                registry,
                bus,
                config,
                sessions: DashMap::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Begin tracking an exposure that was just commanded.
    ///
    /// Writes the optimistic `{isexposing, exposureprogress}` pair and
    /// starts the fixed-cadence progress loop; the first poll happens
    /// one cadence after start. A session already live for this device
    /// is replaced.
    pub fn start(
        &self,
        device_id: &str,
        expected_duration_secs: f64,
        completion: Arc<dyn ExposureCompletion>,
    ) {
        self.cancel(device_id);

        let optimistic = PropertyMap::from([
            ("isexposing".to_owned(), Value::Bool(true)),
            ("exposureprogress".to_owned(), Value::from(0)),
        ]);
        self.inner
            .registry
            .update_device_properties(device_id, optimistic);

        // Non-finite or negative durations degrade to zero: the tracker
        // then leans on the idle/image-ready signals and the ceiling.
        let expected = Duration::try_from_secs_f64(expected_duration_secs).unwrap_or_default();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.inner.sessions.insert(
            device_id.to_owned(),
            ExposureSession {
                generation,
                cancel: cancel.clone(),
                started_at: Instant::now(),
                expected,
                phase: Mutex::new(ExposurePhase::Exposing),
                last_progress: Mutex::new(0.0),
            },
        );

        debug!(device = device_id, expected = ?expected, "exposure tracking started");
        tokio::spawn(track_loop(
            Arc::clone(&self.inner),
            device_id.to_owned(),
            generation,
            cancel,
            completion,
        ));
    }

    /// Caller-driven abort: stop the loop without emitting anything.
    /// The abort command that triggered this owns the terminal
    /// property writes. Returns whether a session existed.
    pub fn cancel(&self, device_id: &str) -> bool {
        if let Some((_, session)) = self.inner.sessions.remove(device_id) {
            session.cancel.cancel();
            *session.phase.lock() = ExposurePhase::Aborted;
            debug!(device = device_id, "exposure tracking cancelled");
            true
        } else {
            false
        }
    }

    /// Whether an exposure is currently being tracked for this device.
    pub fn is_active(&self, device_id: &str) -> bool {
        self.inner.sessions.contains_key(device_id)
    }

    /// Current phase of the live session, if any.
    pub fn phase(&self, device_id: &str) -> Option<ExposurePhase> {
        self.inner.sessions.get(device_id).map(|s| *s.phase.lock())
    }

    /// Last published progress of the live session, if any.
    pub fn progress(&self, device_id: &str) -> Option<f64> {
        self.inner
            .sessions
            .get(device_id)
            .map(|s| *s.last_progress.lock())
    }
}

/// Remove the session (stopping its timer) if it still belongs to this
/// task, recording the terminal phase it ended in.
fn finish(inner: &TrackerInner, device_id: &str, generation: u64, phase: ExposurePhase) {
    if let Some((_, session)) = inner
        .sessions
        .remove_if(device_id, |_, s| s.generation == generation)
    {
        session.cancel.cancel();
        *session.phase.lock() = phase;
        debug!(device = device_id, phase = %phase, "exposure tracking finished");
    }
}

async fn track_loop(
    inner: Arc<TrackerInner>,
    device_id: String,
    generation: u64,
    cancel: CancellationToken,
    completion: Arc<dyn ExposureCompletion>,
) {
    let mut ticker = tokio::time::interval(inner.config.exposure_poll_interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if exposure_tick(&inner, &device_id, generation, &completion).await.is_break() {
                    break;
                }
            }
        }
    }
}

/// One tracking pass. `Break` means the session is over — terminal
/// transition, degenerate exit, or replacement by a newer session.
async fn exposure_tick(
    inner: &Arc<TrackerInner>,
    device_id: &str,
    generation: u64,
    completion: &Arc<dyn ExposureCompletion>,
) -> ControlFlow<()> {
    let Some((started_at, expected, phase)) = inner
        .sessions
        .get(device_id)
        .filter(|s| s.generation == generation)
        .map(|s| (s.started_at, s.expected, *s.phase.lock()))
    else {
        return ControlFlow::Break(());
    };

    // Degenerate exit: the device vanished or dropped its connection
    // mid-exposure. Stop silently — device removal already clears
    // dependent state; inventing a terminal event here would double-
    // report.
    let Some(device) = inner.registry.device(device_id) else {
        debug!(device = device_id, "device gone during exposure tracking — stopping");
        finish(inner, device_id, generation, ExposurePhase::Aborted);
        return ControlFlow::Break(());
    };
    if !device.connected {
        debug!(
            device = device_id,
            "device disconnected during exposure tracking — stopping"
        );
        finish(inner, device_id, generation, ExposurePhase::Aborted);
        return ControlFlow::Break(());
    }

    let elapsed = started_at.elapsed();

    // Hard ceiling: no exposure waits forever, whatever the instrument
    // claims. Timer is stopped before the failure event fires.
    if elapsed > inner.config.max_exposure_wait {
        finish(inner, device_id, generation, ExposurePhase::TimedOut);
        let props = PropertyMap::from([
            ("exposureprogress".to_owned(), Value::from(100)),
            ("isexposing".to_owned(), Value::Bool(false)),
        ]);
        inner.registry.update_device_properties(device_id, props);
        inner.bus.emit(Event::CameraExposureFailed {
            device_id: device_id.to_owned(),
            error: format!(
                "Exposure timed out after {}s",
                inner.config.max_exposure_wait.as_secs()
            ),
        });
        return ControlFlow::Break(());
    }

    let Some(client) = inner.registry.client(device_id) else {
        warn!(
            device = device_id,
            "no protocol client during exposure tracking — using time-based progress"
        );
        publish_progress(inner, device_id, generation, elapsed, expected);
        return ControlFlow::Continue(());
    };

    if phase == ExposurePhase::AwaitingIdle {
        return await_image_ready(inner, device_id, generation, &*client, completion).await;
    }

    match client.read("camerastate").await {
        Ok(value) => match CameraState::from_value(&value) {
            Some(CameraState::Error) => {
                finish(inner, device_id, generation, ExposurePhase::Error);
                let props = PropertyMap::from([
                    ("isexposing".to_owned(), Value::Bool(false)),
                    ("exposureprogress".to_owned(), Value::from(0)),
                    (
                        "camerastate".to_owned(),
                        Value::from(CameraState::Error.code()),
                    ),
                ]);
                inner.registry.update_device_properties(device_id, props);
                inner.bus.emit(Event::CameraExposureFailed {
                    device_id: device_id.to_owned(),
                    error: "Camera reported error state".to_owned(),
                });
                ControlFlow::Break(())
            }
            Some(CameraState::Idle) if elapsed >= expected => {
                if let Some(session) = inner.sessions.get(device_id) {
                    *session.phase.lock() = ExposurePhase::AwaitingIdle;
                }
                debug!(
                    device = device_id,
                    "camera idle after expected duration — awaiting image ready"
                );
                await_image_ready(inner, device_id, generation, &*client, completion).await
            }
            Some(_) => {
                // Still busy (or idle before the expected duration —
                // some firmware reports idle during readout gaps).
                publish_progress(inner, device_id, generation, elapsed, expected);
                ControlFlow::Continue(())
            }
            None => {
                warn!(
                    device = device_id,
                    value = %value,
                    "unrecognized camera state — using time-based progress this tick"
                );
                publish_progress(inner, device_id, generation, elapsed, expected);
                ControlFlow::Continue(())
            }
        },
        Err(e) => {
            // Transient read failure: no transition, pure time-based
            // progress until the ceiling resolves it one way or another.
            warn!(
                device = device_id,
                error = %e,
                "camera state read failed — using time-based progress this tick"
            );
            publish_progress(inner, device_id, generation, elapsed, expected);
            ControlFlow::Continue(())
        }
    }
}

/// Poll the fine-grained ready flag; on `true`, tear the session down
/// and hand off to the completion handler.
async fn await_image_ready(
    inner: &Arc<TrackerInner>,
    device_id: &str,
    generation: u64,
    client: &dyn skysync_api::InstrumentClient,
    completion: &Arc<dyn ExposureCompletion>,
) -> ControlFlow<()> {
    match client.read("imageready").await {
        Ok(value) if value.as_bool() == Some(true) => {
            finish(inner, device_id, generation, ExposurePhase::Complete);
            completion.exposure_complete(device_id).await;
            ControlFlow::Break(())
        }
        Ok(_) => ControlFlow::Continue(()),
        Err(e) => {
            warn!(
                device = device_id,
                error = %e,
                "imageready read failed — will retry"
            );
            ControlFlow::Continue(())
        }
    }
}

/// Time-derived progress: clamped to [0, 99] while the frame is
/// unresolved, published only when it advances past the previous tick.
fn publish_progress(
    inner: &TrackerInner,
    device_id: &str,
    generation: u64,
    elapsed: Duration,
    expected: Duration,
) {
    let pct = if expected.is_zero() {
        99.0
    } else {
        (elapsed.as_secs_f64() / expected.as_secs_f64() * 100.0)
            .round()
            .clamp(0.0, 99.0)
    };

    let advanced = {
        let Some(session) = inner.sessions.get(device_id) else {
            return;
        };
        if session.generation != generation {
            return;
        }
        let mut last = session.last_progress.lock();
        if pct > *last {
            *last = pct;
            true
        } else {
            false
        }
    };

    if advanced {
        inner.registry.update_device_properties(
            device_id,
            PropertyMap::from([("exposureprogress".to_owned(), Value::from(pct))]),
        );
        inner.bus.emit(Event::CameraExposureChanged {
            device_id: device_id.to_owned(),
            percent_complete: pct,
        });
    }
}
