// ── Device registry ──
//
// Concurrent storage for device models and their attached protocol
// clients. The registry owns the only mutation path into a device's
// property bag: `update_device_properties` diffs one merged map against
// the current bag and publishes one change event per key that actually
// changed. Poll loops call it once per tick with their full merge, so
// observers never see a partially-applied snapshot.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use skysync_api::{InstrumentClient, PropertyMap};
use tracing::debug;

use crate::event::{Event, EventBus};
use crate::model::{Device, DeviceStatus};

/// Concurrent collection of device models plus attached clients.
pub struct DeviceRegistry {
    devices: DashMap<String, Device>,
    clients: DashMap<String, Arc<dyn InstrumentClient>>,
    bus: EventBus,
}

impl DeviceRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            devices: DashMap::new(),
            clients: DashMap::new(),
            bus,
        }
    }

    // ── Collection management ────────────────────────────────────────

    /// Insert or replace a device. Returns `true` if the id was new.
    pub fn insert(&self, device: Device) -> bool {
        self.devices.insert(device.id.clone(), device).is_none()
    }

    /// Remove a device and its attached client.
    pub fn remove(&self, device_id: &str) -> Option<Device> {
        self.clients.remove(device_id);
        self.devices.remove(device_id).map(|(_, d)| d)
    }

    /// Snapshot of one device.
    pub fn device(&self, device_id: &str) -> Option<Device> {
        self.devices.get(device_id).map(|d| d.value().clone())
    }

    /// Snapshot of every device.
    pub fn devices_snapshot(&self) -> Vec<Device> {
        self.devices.iter().map(|d| d.value().clone()).collect()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    // ── Client attachment ────────────────────────────────────────────

    pub fn attach_client(&self, device_id: &str, client: Arc<dyn InstrumentClient>) {
        self.clients.insert(device_id.to_owned(), client);
    }

    pub fn detach_client(&self, device_id: &str) {
        self.clients.remove(device_id);
    }

    /// The protocol client for a device, if one is attached.
    pub fn client(&self, device_id: &str) -> Option<Arc<dyn InstrumentClient>> {
        self.clients.get(device_id).map(|c| Arc::clone(c.value()))
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Drive the connection lifecycle state.
    ///
    /// Keeps the `connected` flag in lockstep with the status and emits
    /// a connection event on edges into and out of `Connected`.
    pub fn set_status(&self, device_id: &str, status: DeviceStatus) {
        let transition = {
            let Some(mut device) = self.devices.get_mut(device_id) else {
                debug!(device = device_id, "set_status on unknown device");
                return;
            };
            let was_connected = device.connected;
            device.status = status;
            device.connected = status.is_connected();
            device.updated_at = Utc::now();
            (was_connected, device.connected)
        };

        match transition {
            (false, true) => self.bus.emit(Event::DeviceConnected {
                device_id: device_id.to_owned(),
            }),
            (true, false) => self.bus.emit(Event::DeviceDisconnected {
                device_id: device_id.to_owned(),
            }),
            _ => {}
        }
    }

    /// Apply one merged property map to a device, atomically.
    ///
    /// Keys are normalized to lowercase. Only keys whose value actually
    /// differs are written; one `DevicePropertyChanged` fires per
    /// changed key, in sorted key order, after the bag has been fully
    /// updated. Returns `false` when the device does not exist.
    pub fn update_device_properties(&self, device_id: &str, props: PropertyMap) -> bool {
        let mut changed: Vec<(String, Value)> = {
            let Some(mut device) = self.devices.get_mut(device_id) else {
                debug!(device = device_id, "property update for unknown device");
                return false;
            };

            let mut changed = Vec::new();
            for (key, value) in props {
                let key = key.to_ascii_lowercase();
                if device.properties.get(&key) != Some(&value) {
                    device.properties.insert(key.clone(), value.clone());
                    changed.push((key, value));
                }
            }
            if !changed.is_empty() {
                device.updated_at = Utc::now();
            }
            changed
        };

        // Guard dropped before delivery so listeners may read the
        // registry without deadlocking on the same shard.
        changed.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (property, value) in changed {
            self.bus.emit(Event::DevicePropertyChanged {
                device_id: device_id.to_owned(),
                property,
                value,
            });
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DeviceKind;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry_with_camera() -> (DeviceRegistry, Arc<Mutex<Vec<Event>>>) {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.add_listener(move |event| sink.lock().push(event.clone()));

        let registry = DeviceRegistry::new(bus);
        registry.insert(Device::new("cam-1", "Camera", DeviceKind::Camera));
        (registry, seen)
    }

    fn props(pairs: &[(&str, Value)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn update_emits_only_changed_keys() {
        let (registry, seen) = registry_with_camera();

        assert!(registry.update_device_properties(
            "cam-1",
            props(&[("gain", json!(150)), ("offset", json!(30))]),
        ));
        assert_eq!(seen.lock().len(), 2);

        // Same values again: nothing changed, nothing emitted.
        registry.update_device_properties(
            "cam-1",
            props(&[("gain", json!(150)), ("offset", json!(30))]),
        );
        assert_eq!(seen.lock().len(), 2);

        // One value differs.
        registry.update_device_properties(
            "cam-1",
            props(&[("gain", json!(200)), ("offset", json!(30))]),
        );
        let events = seen.lock();
        assert_eq!(events.len(), 3);
        match &events[2] {
            Event::DevicePropertyChanged {
                property, value, ..
            } => {
                assert_eq!(property, "gain");
                assert_eq!(value, &json!(200));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn update_normalizes_keys_to_lowercase() {
        let (registry, _) = registry_with_camera();
        registry.update_device_properties("cam-1", props(&[("Gain", json!(10))]));

        let device = registry.device("cam-1").unwrap();
        assert_eq!(device.property("gain"), Some(&json!(10)));
        assert_eq!(device.property("Gain"), None);
    }

    #[test]
    fn update_unknown_device_returns_false() {
        let (registry, seen) = registry_with_camera();
        assert!(!registry.update_device_properties("nope", props(&[("gain", json!(1))])));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn status_edges_emit_connection_events() {
        let (registry, seen) = registry_with_camera();

        registry.set_status("cam-1", DeviceStatus::Connecting);
        registry.set_status("cam-1", DeviceStatus::Connected);
        registry.set_status("cam-1", DeviceStatus::Connected);
        registry.set_status("cam-1", DeviceStatus::Idle);

        let events = seen.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::DeviceConnected { .. }));
        assert!(matches!(events[1], Event::DeviceDisconnected { .. }));
    }

    #[test]
    fn remove_detaches_client() {
        let (registry, _) = registry_with_camera();
        assert!(registry.remove("cam-1").is_some());
        assert!(registry.device("cam-1").is_none());
        assert!(registry.client("cam-1").is_none());
    }
}
