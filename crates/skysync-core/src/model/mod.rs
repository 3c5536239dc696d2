// ── Domain model ──

mod device;

pub use device::{Device, DeviceKind, DeviceStatus};
