// Shared test fixtures: a scriptable mock instrument client and hub
// setup helpers.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use skysync_api::{ApiError, ImageData, InstrumentClient, PropertyMap, SampleBuffer};
use skysync_core::event::Event;
use skysync_core::model::{Device, DeviceKind, DeviceStatus};
use skysync_core::{InstrumentHub, SyncConfig};

/// How the mock answers the aggregated bulk read.
#[derive(Default)]
pub enum BulkBehavior {
    /// Error out, like an instrument without bulk support.
    #[default]
    Fail,
    /// Succeed with an empty payload.
    Empty,
    /// Succeed with this payload.
    Payload(PropertyMap),
}

/// Scriptable in-memory instrument. Tests hold the same `Arc` the
/// registry does and mutate behavior mid-flight.
#[derive(Default)]
pub struct MockClient {
    pub bulk: Mutex<BulkBehavior>,
    pub bulk_calls: AtomicUsize,
    /// Values served by single-property reads; missing names error.
    pub values: Mutex<HashMap<String, Value>>,
    /// Property names whose reads fail with a transport error.
    pub failing: Mutex<HashSet<String>>,
    pub read_log: Mutex<Vec<String>>,
    pub fail_start: Mutex<bool>,
    pub fail_abort: Mutex<bool>,
    pub image: Mutex<Option<ImageData>>,
}

impl MockClient {
    pub fn set_value(&self, property: &str, value: Value) {
        self.values.lock().insert(property.to_owned(), value);
    }

    pub fn set_bulk(&self, behavior: BulkBehavior) {
        *self.bulk.lock() = behavior;
    }

    pub fn bulk_call_count(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn reads_of(&self, property: &str) -> usize {
        self.read_log.lock().iter().filter(|p| *p == property).count()
    }
}

#[async_trait]
impl InstrumentClient for MockClient {
    async fn aggregated_state(&self) -> Result<PropertyMap, ApiError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.bulk.lock() {
            BulkBehavior::Fail => Err(ApiError::unsupported("devicestate")),
            BulkBehavior::Empty => Ok(PropertyMap::new()),
            BulkBehavior::Payload(map) => Ok(map.clone()),
        }
    }

    async fn read(&self, property: &str) -> Result<Value, ApiError> {
        self.read_log.lock().push(property.to_owned());
        if self.failing.lock().contains(property) {
            return Err(ApiError::transport("mock read failure"));
        }
        self.values
            .lock()
            .get(property)
            .cloned()
            .ok_or_else(|| ApiError::transport("mock has no value for this property"))
    }

    async fn start_exposure(&self, _duration_secs: f64, _light: bool) -> Result<(), ApiError> {
        if *self.fail_start.lock() {
            Err(ApiError::Protocol {
                message: "shutter jammed".into(),
                code: Some(1035),
            })
        } else {
            Ok(())
        }
    }

    async fn abort_exposure(&self) -> Result<(), ApiError> {
        if *self.fail_abort.lock() {
            Err(ApiError::Protocol {
                message: "abort rejected".into(),
                code: Some(1036),
            })
        } else {
            Ok(())
        }
    }

    async fn fetch_image(&self) -> Result<ImageData, ApiError> {
        self.image
            .lock()
            .clone()
            .ok_or_else(|| ApiError::transport("no frame available"))
    }
}

/// A 2×2 mono frame for completion tests.
pub fn test_frame() -> ImageData {
    ImageData {
        width: 2,
        height: 2,
        channels: 1,
        samples: SampleBuffer::U16(vec![100, 200, 300, 400]),
    }
}

/// Hub with one connected camera (`cam-1`) and an attached mock.
pub fn camera_hub() -> (InstrumentHub, Arc<MockClient>) {
    let hub = InstrumentHub::new(SyncConfig::default());

    let mut camera = Device::new("cam-1", "Test camera", DeviceKind::Camera);
    camera.connected = true;
    camera.status = DeviceStatus::Connected;
    hub.registry().insert(camera);

    let client = Arc::new(MockClient::default());
    hub.registry()
        .attach_client("cam-1", Arc::clone(&client) as Arc<dyn InstrumentClient>);

    (hub, client)
}

/// Record every event the hub emits from now on.
pub fn capture_events(hub: &InstrumentHub) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    hub.add_listener(move |event| sink.lock().push(event.clone()));
    seen
}

/// Count captured events matching a predicate.
pub fn count_events(seen: &Mutex<Vec<Event>>, pred: impl Fn(&Event) -> bool) -> usize {
    seen.lock().iter().filter(|e| pred(e)).count()
}
