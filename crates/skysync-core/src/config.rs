// ── Synchronization tuning ──
//
// These values describe *how aggressively* to poll instruments.
// The embedding application constructs a `SyncConfig` and hands it in;
// the core never touches disk or environment variables.

use std::time::Duration;

/// Tuning knobs for the polling and exposure-tracking loops.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Property poll cadence used when neither the caller nor the
    /// device carries an explicit interval.
    pub default_poll_interval: Duration,
    /// Hard floor for the property poll cadence. Requests below this
    /// are corrected upward and a warning is recorded.
    pub min_poll_interval: Duration,
    /// How long a bulk-state payload stays fresh enough to reuse
    /// instead of re-fetching.
    pub snapshot_ttl: Duration,
    /// Cadence of the exposure-progress loop. Tighter than property
    /// polling so progress feels live.
    pub exposure_poll_interval: Duration,
    /// Ceiling on how long an exposure may stay unresolved before the
    /// tracker gives up and reports a timeout.
    pub max_exposure_wait: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_poll_interval: Duration::from_secs(1),
            min_poll_interval: Duration::from_millis(100),
            snapshot_ttl: Duration::from_millis(500),
            exposure_poll_interval: Duration::from_millis(500),
            max_exposure_wait: Duration::from_secs(300),
        }
    }
}
