//! skycam-hw — QHYCCD camera access.
//!
//! Loads the vendor SDK at run time and wraps its single-frame workflow:
//! discovery, connection, configuration and exposure. Every vendor status is
//! mapped to a small per-operation code so the C shim can hand it straight
//! to a scripting caller.

pub mod camera;
pub mod config;
pub mod control;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod native;
pub mod sdk;
pub mod version;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use camera::{Camera, Session};
pub use config::{ConfigError, ExposureSettings, SkycamConfig};
pub use control::CameraControl;
pub use discovery::acquire_camera_id;
pub use frame::Frame;
pub use native::{NativeSdk, SdkLoadError};
pub use sdk::{CameraId, ChipInfo, Control, FrameInfo, OverscanArea, QhySdk, RawHandle, SdkStatus};
pub use version::{FirmwareVersion, SdkVersion};
