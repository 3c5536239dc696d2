// ── Adaptive property polling ──
//
// One recurring task per device keeps its property bag fresh without
// knowing in advance whether the instrument supports bulk reads. Each
// tick tries the aggregated path (cache-first), reads whatever the
// bulk payload didn't cover property-by-property in parallel, and
// applies the union as a single atomic update. Network failures never
// escape a tick: a failed bulk read demotes the device to per-property
// reads for the rest of the connection, a failed property read is
// simply omitted from that tick's merge.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::future;
use parking_lot::Mutex;
use serde_json::Value;
use skysync_api::PropertyMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog;
use crate::config::SyncConfig;
use crate::snapshot::{BulkSupport, SnapshotCache};
use crate::store::DeviceRegistry;

/// Live polling session for one device.
///
/// At most one exists per device; a re-`start` cancels the previous
/// session's token before inserting its replacement.
struct PollSession {
    generation: u64,
    cancel: CancellationToken,
    interval: Duration,
    last_tick: Mutex<Option<Instant>>,
}

/// Per-device recurring property synchronization.
///
/// Cheaply cloneable; clones share the session registry and snapshot
/// cache.
#[derive(Clone)]
pub struct AdaptivePoller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    registry: Arc<DeviceRegistry>,
    cache: SnapshotCache,
    sessions: DashMap<String, PollSession>,
    config: SyncConfig,
    generation: AtomicU64,
}

impl AdaptivePoller {
    pub fn new(registry: Arc<DeviceRegistry>, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                registry,
                cache: SnapshotCache::new(config.snapshot_ttl),
                sessions: DashMap::new(),
                config,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Begin (or restart) polling a device.
    ///
    /// Interval precedence: explicit argument, then the interval stored
    /// on the device, then the configured default — clamped to the
    /// configured floor with a recorded warning when the request is too
    /// tight. The first fetch happens after one full interval elapses,
    /// not immediately.
    pub fn start(&self, device_id: &str, interval_ms: Option<u64>) {
        self.stop(device_id);

        let stored = self
            .inner
            .registry
            .device(device_id)
            .and_then(|d| d.poll_interval_ms);
        let requested = interval_ms
            .or(stored)
            .map_or(self.inner.config.default_poll_interval, Duration::from_millis);
        let interval = if requested < self.inner.config.min_poll_interval {
            warn!(
                device = device_id,
                requested = ?requested,
                floor = ?self.inner.config.min_poll_interval,
                "poll interval below floor — corrected upward"
            );
            self.inner.config.min_poll_interval
        } else {
            requested
        };

        // Fresh connection, fresh bulk-support probe.
        self.inner.cache.reset(device_id);

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.inner.sessions.insert(
            device_id.to_owned(),
            PollSession {
                generation,
                cancel: cancel.clone(),
                interval,
                last_tick: Mutex::new(None),
            },
        );

        debug!(device = device_id, interval = ?interval, "property polling started");
        tokio::spawn(poll_loop(
            Arc::clone(&self.inner),
            device_id.to_owned(),
            interval,
            generation,
            cancel,
        ));
    }

    /// Stop polling a device. Idempotent; an in-flight request is left
    /// to finish and its result is discarded by session re-validation.
    pub fn stop(&self, device_id: &str) {
        if let Some((_, session)) = self.inner.sessions.remove(device_id) {
            session.cancel.cancel();
            debug!(device = device_id, "property polling stopped");
        }
    }

    /// Whether a polling session is live for this device.
    pub fn is_active(&self, device_id: &str) -> bool {
        self.inner.sessions.contains_key(device_id)
    }

    /// Effective (clamped) interval of the live session.
    pub fn interval(&self, device_id: &str) -> Option<Duration> {
        self.inner.sessions.get(device_id).map(|s| s.interval)
    }

    /// When the session last ticked, if it has ticked at all.
    pub fn last_tick(&self, device_id: &str) -> Option<Instant> {
        self.inner
            .sessions
            .get(device_id)
            .and_then(|s| *s.last_tick.lock())
    }

    /// Current bulk-read support verdict for a device.
    pub fn bulk_support(&self, device_id: &str) -> BulkSupport {
        self.inner.cache.support(device_id)
    }
}

/// Remove the session, but only if it still belongs to this task.
/// A restart may have replaced it; the replacement must survive.
fn teardown(inner: &PollerInner, device_id: &str, generation: u64) {
    if let Some((_, session)) = inner
        .sessions
        .remove_if(device_id, |_, s| s.generation == generation)
    {
        session.cancel.cancel();
    }
}

async fn poll_loop(
    inner: Arc<PollerInner>,
    device_id: String,
    interval: Duration,
    generation: u64,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if poll_tick(&inner, &device_id, generation).await.is_break() {
                    break;
                }
            }
        }
    }
}

/// One synchronization pass. Never panics and never propagates an
/// error; `Break` means the session is over.
async fn poll_tick(
    inner: &Arc<PollerInner>,
    device_id: &str,
    generation: u64,
) -> ControlFlow<()> {
    {
        let Some(session) = inner.sessions.get(device_id) else {
            return ControlFlow::Break(());
        };
        if session.generation != generation {
            return ControlFlow::Break(());
        }
        *session.last_tick.lock() = Some(Instant::now());
    }

    // Connectivity gate: the only mechanism that halts polling when a
    // device disappears or disconnects. Deliberately silent beyond a
    // debug line.
    let Some(device) = inner.registry.device(device_id) else {
        debug!(device = device_id, "device gone — stopping property polling");
        teardown(inner, device_id, generation);
        return ControlFlow::Break(());
    };
    if !device.connected {
        debug!(device = device_id, "device disconnected — stopping property polling");
        teardown(inner, device_id, generation);
        return ControlFlow::Break(());
    }
    let Some(client) = inner.registry.client(device_id) else {
        debug!(device = device_id, "no protocol client attached — will retry");
        return ControlFlow::Continue(());
    };

    // Aggregated path: reuse a fresh cached payload, otherwise attempt
    // one bulk read. Failure or an empty payload demotes the device to
    // per-property reads for the rest of this connection.
    let mut aggregated: Option<PropertyMap> = None;
    if inner.cache.support(device_id) != BulkSupport::Unsupported {
        if let Some(cached) = inner.cache.fresh_payload(device_id) {
            aggregated = Some(cached);
        } else {
            match client.aggregated_state().await {
                Ok(payload) if !payload.is_empty() => {
                    let payload: PropertyMap = payload
                        .into_iter()
                        .map(|(k, v)| (k.to_ascii_lowercase(), v))
                        .collect();
                    inner.cache.store(device_id, payload.clone());
                    aggregated = Some(payload);
                }
                Ok(_) => {
                    debug!(
                        device = device_id,
                        "bulk state read came back empty — unsupported for this connection"
                    );
                    inner.cache.mark_unsupported(device_id);
                }
                Err(e) => {
                    debug!(
                        device = device_id,
                        error = %e,
                        "bulk state read failed — unsupported for this connection"
                    );
                    inner.cache.mark_unsupported(device_id);
                }
            }
        }
    }

    // Whatever the bulk payload didn't cover is read individually, in
    // parallel. A failed read is omitted from the merge, not fatal.
    let missing: Vec<&'static str> = catalog::required_for(&device)
        .into_iter()
        .filter(|p| aggregated.as_ref().is_none_or(|a| !a.contains_key(*p)))
        .collect();

    let reads = missing.into_iter().map(|prop| {
        let client = Arc::clone(&client);
        async move { (prop, client.read(prop).await) }
    });
    let results = future::join_all(reads).await;

    let used_bulk = aggregated.is_some();
    let mut merged = aggregated.unwrap_or_default();
    for (prop, result) in results {
        match result {
            Ok(value) => {
                merged.insert(prop.to_owned(), value);
            }
            Err(e) => {
                warn!(
                    device = device_id,
                    property = prop,
                    error = %e,
                    "property read failed — omitted from this update"
                );
            }
        }
    }

    if merged.is_empty() {
        // Every read failed; nothing to apply this tick.
        return ControlFlow::Continue(());
    }
    merged.insert("usingdevicestate".to_owned(), Value::Bool(used_bulk));
    inner.registry.update_device_properties(device_id, merged);

    ControlFlow::Continue(())
}
