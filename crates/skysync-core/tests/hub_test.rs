#![allow(clippy::unwrap_used)]
// Connection lifecycle wiring through the hub facade.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use skysync_core::event::Event;

use common::{camera_hub, capture_events, count_events};

async fn run_for(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn connect_handler_starts_polling_and_reports_the_edge() {
    let (hub, client) = camera_hub();
    // Drop back to disconnected so the handler has an edge to report.
    hub.registry()
        .set_status("cam-1", skysync_core::DeviceStatus::Idle);
    let seen = capture_events(&hub);
    client.set_value("gain", json!(100));

    hub.handle_device_connected("cam-1");

    assert!(hub.poller().is_active("cam-1"));
    assert_eq!(
        count_events(&seen, |e| matches!(e, Event::DeviceConnected { .. })),
        1
    );

    run_for(1_050);
    let device = hub.registry().device("cam-1").unwrap();
    assert_eq!(device.property("gain"), Some(&json!(100)));
}

#[tokio::test(start_paused = true)]
async fn disconnect_handler_tears_both_loops_down() {
    let (hub, client) = camera_hub();
    let seen = capture_events(&hub);
    client.set_value("camerastate", json!(2));

    hub.handle_device_connected("cam-1");
    hub.start_exposure("cam-1", 30.0, true).await.unwrap();
    run_for(1_050);
    assert!(hub.poller().is_active("cam-1"));
    assert!(hub.tracker().is_active("cam-1"));

    hub.handle_device_disconnected("cam-1");

    assert!(!hub.poller().is_active("cam-1"));
    assert!(!hub.tracker().is_active("cam-1"));
    assert_eq!(
        count_events(&seen, |e| matches!(e, Event::DeviceDisconnected { .. })),
        1
    );
    // Disconnection is quiet: no terminal exposure event.
    assert_eq!(
        count_events(&seen, |e| matches!(
            e,
            Event::CameraExposureFailed { .. } | Event::CameraExposureComplete { .. }
        )),
        0
    );

    // Neither loop ever ticks again.
    let reads = client.read_log.lock().len();
    run_for(5_000);
    assert_eq!(client.read_log.lock().len(), reads);
}

#[tokio::test(start_paused = true)]
async fn legacy_named_surface_works_through_the_hub() {
    let (hub, _client) = camera_hub();
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));

    let sink = std::sync::Arc::clone(&seen);
    let handle = hub.on("filterChanged", move |args| sink.lock().push(args.to_vec()));

    hub.emit_named("filterChanged", &[json!("wheel-1"), json!(3)]);
    hub.off("filterChanged", handle);
    hub.emit_named("filterChanged", &[json!("wheel-1"), json!(4)]);

    let calls = seen.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], vec![json!("wheel-1"), json!(3)]);
}
