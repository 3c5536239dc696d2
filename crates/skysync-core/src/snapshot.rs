// ── Aggregated snapshot cache ──
//
// Per-device cache of the last bulk-state fetch. Whether an instrument
// supports bulk reads at all is a heuristic inference (an error or an
// empty payload both count as "no"), so the answer is kept as an
// explicit tri-state on the entry instead of being re-derived at call
// sites. Once a device is marked unsupported it stays unsupported
// until its connection lifecycle resets the entry.

use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use skysync_api::PropertyMap;
use tokio::time::Instant;

/// Whether a device's bulk-state read is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BulkSupport {
    /// Never attempted on this connection.
    #[default]
    Unknown,
    /// At least one bulk read returned a payload.
    Supported,
    /// A bulk read failed or came back empty; stop attempting.
    Unsupported,
}

#[derive(Debug)]
struct SnapshotEntry {
    support: BulkSupport,
    fetched_at: Option<Instant>,
    payload: PropertyMap,
    /// Property names a bulk read has actually been observed to carry.
    covered: HashSet<String>,
}

impl SnapshotEntry {
    fn new() -> Self {
        Self {
            support: BulkSupport::Unknown,
            fetched_at: None,
            payload: PropertyMap::new(),
            covered: HashSet::new(),
        }
    }
}

/// Per-device cache of aggregated bulk-state payloads.
pub struct SnapshotCache {
    entries: DashMap<String, SnapshotEntry>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Current support verdict for a device (`Unknown` when the device
    /// has no entry yet).
    pub fn support(&self, device_id: &str) -> BulkSupport {
        self.entries
            .get(device_id)
            .map_or(BulkSupport::Unknown, |e| e.support)
    }

    /// The cached payload, if one exists and is still inside the
    /// freshness window.
    pub fn fresh_payload(&self, device_id: &str) -> Option<PropertyMap> {
        let entry = self.entries.get(device_id)?;
        let fetched_at = entry.fetched_at?;
        if fetched_at.elapsed() <= self.ttl {
            Some(entry.payload.clone())
        } else {
            None
        }
    }

    /// Record a successful bulk read: marks the device supported and
    /// remembers which property names the payload covered.
    pub fn store(&self, device_id: &str, payload: PropertyMap) {
        let mut entry = self
            .entries
            .entry(device_id.to_owned())
            .or_insert_with(SnapshotEntry::new);
        entry.support = BulkSupport::Supported;
        entry.fetched_at = Some(Instant::now());
        entry.covered.extend(payload.keys().cloned());
        entry.payload = payload;
    }

    /// Record a failed or empty bulk read: no further attempts until
    /// [`reset`](Self::reset).
    pub fn mark_unsupported(&self, device_id: &str) {
        let mut entry = self
            .entries
            .entry(device_id.to_owned())
            .or_insert_with(SnapshotEntry::new);
        entry.support = BulkSupport::Unsupported;
        entry.fetched_at = None;
        entry.payload.clear();
    }

    /// Property names bulk reads have been observed to carry for this
    /// device.
    pub fn covered(&self, device_id: &str) -> HashSet<String> {
        self.entries
            .get(device_id)
            .map_or_else(HashSet::new, |e| e.covered.clone())
    }

    /// Drop the device's entry entirely. Called when the connection
    /// lifecycle restarts, so support is re-probed on the new session.
    pub fn reset(&self, device_id: &str) {
        self.entries.remove(device_id);
    }
}
