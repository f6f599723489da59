//! Backend-generic bodies of the C exports.
//!
//! Each function takes already-validated Rust references and returns the
//! caller-facing code, so the exports in `lib.rs` only deal with pointers.

use std::ffi::c_void;

use skycam_hw::error::DiscoveryError;
use skycam_hw::{acquire_camera_id, CameraControl, CameraId, ExposureSettings, QhySdk, RawHandle};

use crate::types::{SkycamFrameInfo, SkycamGeometry, SkycamSettings};

/// Copy `s` into `out` with a trailing NUL. Returns false if it does not fit.
pub fn write_c_string(s: &str, out: &mut [u8]) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() >= out.len() {
        return false;
    }
    out[..bytes.len()].copy_from_slice(bytes);
    out[bytes.len()] = 0;
    true
}

pub fn sdk_version<S: QhySdk + ?Sized>(sdk: &S, out: &mut [u32; 4]) {
    *out = sdk.version().to_array();
}

/// 0 on success, 1 if `out` is too small.
pub fn sdk_version_string<S: QhySdk + ?Sized>(sdk: &S, out: &mut [u8]) -> u32 {
    let version = sdk.version().to_string();
    if write_c_string(&version, out) {
        0
    } else {
        tracing::warn!(%version, capacity = out.len(), "version buffer too small");
        1
    }
}

/// Acquire the first camera id into `out`.
pub fn camera_id<S: QhySdk + ?Sized>(sdk: &S, out: &mut [u8]) -> u32 {
    match acquire_camera_id(sdk) {
        Ok(id) => {
            if write_c_string(id.as_str(), out) {
                0
            } else {
                tracing::error!(camera = %id, capacity = out.len(), "camera id does not fit caller buffer");
                match sdk.release_resource() {
                    Ok(()) => DiscoveryError::Unsupported.code(),
                    Err(status) => DiscoveryError::ReleaseResource(status).code(),
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, code = e.code(), "camera discovery failed");
            e.code()
        }
    }
}

pub fn connect<S: QhySdk + ?Sized>(sdk: &S, id: &str) -> *mut c_void {
    let id = CameraId::new(id);
    match sdk.open(&id) {
        Some(handle) => {
            tracing::info!(camera = %id, "camera connected");
            handle.as_ptr()
        }
        None => {
            tracing::error!(camera = %id, "failed to open camera");
            std::ptr::null_mut()
        }
    }
}

pub fn initialize<S: QhySdk + ?Sized>(ctl: &CameraControl<'_, S>) -> u32 {
    code_of(ctl.initialize(), |e| e.code())
}

/// Fill `out` with chip geometry and, when reported, the overscan area.
pub fn chip_info<S: QhySdk + ?Sized>(ctl: &CameraControl<'_, S>, out: &mut SkycamGeometry) -> u32 {
    match ctl.chip_info() {
        Ok(chip) => {
            *out = SkycamGeometry::new(&chip, &ctl.overscan_area());
            0
        }
        Err(e) => {
            tracing::error!(error = %e, "chip info query failed");
            e.code()
        }
    }
}

/// Firmware build date as `[year, month, day]`.
pub fn firmware_version<S: QhySdk + ?Sized>(ctl: &CameraControl<'_, S>, out: &mut [u32; 3]) -> u32 {
    match ctl.firmware_version() {
        Ok(fw) => {
            *out = fw.to_array();
            0
        }
        Err(e) => {
            tracing::warn!(error = %e, "firmware version query failed");
            e.code()
        }
    }
}

pub fn usb_traffic<S: QhySdk + ?Sized>(ctl: &CameraControl<'_, S>) -> u32 {
    code_of(ctl.set_usb_traffic(), |e| e.code())
}

pub fn resolution<S: QhySdk + ?Sized>(
    ctl: &CameraControl<'_, S>,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> u32 {
    code_of(ctl.set_resolution(x, y, width, height), |e| e.code())
}

pub fn bin_mode<S: QhySdk + ?Sized>(ctl: &CameraControl<'_, S>, bin_x: u32, bin_y: u32) -> u32 {
    code_of(ctl.set_bin_mode(bin_x, bin_y), |e| e.code())
}

pub fn bit_depth<S: QhySdk + ?Sized>(ctl: &CameraControl<'_, S>, bits: u32) -> u32 {
    code_of(ctl.set_bit_depth(bits), |e| e.code())
}

pub fn gain<S: QhySdk + ?Sized>(ctl: &CameraControl<'_, S>, value: f64) -> u32 {
    code_of(ctl.set_gain(value), |e| e.code())
}

pub fn offset<S: QhySdk + ?Sized>(ctl: &CameraControl<'_, S>, value: f64) -> u32 {
    code_of(ctl.set_offset(value), |e| e.code())
}

pub fn exposure_time<S: QhySdk + ?Sized>(ctl: &CameraControl<'_, S>, micros: f64) -> u32 {
    code_of(ctl.set_exposure_time(micros), |e| e.code())
}

pub fn apply_settings<S: QhySdk + ?Sized>(ctl: &CameraControl<'_, S>, settings: &SkycamSettings) -> u32 {
    code_of(ctl.apply(&ExposureSettings::from(settings)), |e| e.code())
}

pub fn expose<S: QhySdk + ?Sized>(
    ctl: &CameraControl<'_, S>,
    buf: &mut [u8],
    out: &mut SkycamFrameInfo,
) -> u32 {
    match ctl.expose_single_frame(buf) {
        Ok(info) => {
            *out = info.into();
            0
        }
        Err(e) => e.code(),
    }
}

pub fn disconnect<S: QhySdk + ?Sized>(sdk: &S, handle: RawHandle) {
    match sdk.close(handle) {
        Ok(()) => tracing::info!("camera disconnected"),
        Err(status) => tracing::warn!(%status, "camera close failed"),
    }
}

pub fn release<S: QhySdk + ?Sized>(sdk: &S) {
    match sdk.release_resource() {
        Ok(()) => tracing::info!("SDK resources released"),
        Err(status) => tracing::warn!(%status, "SDK resource release failed"),
    }
}

fn code_of<E: std::fmt::Display>(result: Result<(), E>, code: impl Fn(&E) -> u32) -> u32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            let code = code(&e);
            tracing::debug!(error = %e, code, "operation failed");
            code
        }
    }
}
