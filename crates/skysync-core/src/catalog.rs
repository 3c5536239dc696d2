// ── Required-property catalogs ──
//
// Fixed per-family lists of the lowercase property names the polling
// loop keeps fresh. Cameras additionally poll a small exposure subset
// while a frame is in flight.

use crate::model::{Device, DeviceKind};

/// Properties every camera poll keeps current.
const CAMERA: &[&str] = &[
    "binx",
    "biny",
    "gain",
    "offset",
    "readoutmode",
    "ccdtemperature",
    "cooleron",
    "coolerpower",
    "camerastate",
    "numx",
    "numy",
];

/// Extra camera properties polled only while an exposure is in flight.
const CAMERA_EXPOSING: &[&str] = &["percentcompleted", "imageready"];

const TELESCOPE: &[&str] = &[
    "rightascension",
    "declination",
    "altitude",
    "azimuth",
    "sideofpier",
    "tracking",
    "slewing",
    "atpark",
    "athome",
];

const FILTER_WHEEL: &[&str] = &["position", "focusoffsets"];

const FOCUSER: &[&str] = &["position", "ismoving", "temperature"];

const ROTATOR: &[&str] = &["position", "mechanicalposition", "ismoving"];

const SAFETY_MONITOR: &[&str] = &["issafe"];

const COVER_CALIBRATOR: &[&str] = &["coverstate", "calibratorstate", "brightness"];

/// The always-polled catalog for a device family.
pub fn required_properties(kind: DeviceKind) -> &'static [&'static str] {
    match kind {
        DeviceKind::Camera => CAMERA,
        DeviceKind::Telescope => TELESCOPE,
        DeviceKind::FilterWheel => FILTER_WHEEL,
        DeviceKind::Focuser => FOCUSER,
        DeviceKind::Rotator => ROTATOR,
        DeviceKind::SafetyMonitor => SAFETY_MONITOR,
        DeviceKind::CoverCalibrator => COVER_CALIBRATOR,
    }
}

/// The conditional subset active only during an exposure.
pub fn exposure_properties() -> &'static [&'static str] {
    CAMERA_EXPOSING
}

/// Full required set for this device right now: the family catalog,
/// plus the exposure subset while the device reports a frame in flight.
pub fn required_for(device: &Device) -> Vec<&'static str> {
    let base = required_properties(device.kind);
    if device.is_mid_exposure() {
        base.iter().chain(exposure_properties()).copied().collect()
    } else {
        base.to_vec()
    }
}
