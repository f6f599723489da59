//! libcamera — C entry points for QHYCCD single-frame capture.
//!
//! Loaded through `ctypes` by the scripting side. Every export forwards to
//! the vendor SDK and returns a small integer code whose meaning is scoped to
//! that function (0 is always success).
//!
//! # Safety
//!
//! All Rust logic is wrapped in `catch_unwind`; a panic unwinding across the
//! `extern "C"` boundary is undefined behavior. A panic is reported as the
//! function's first failure code.
//!
//! The vendor library and configuration are loaded on first use. If the
//! library cannot be loaded every export fails with its first failure code
//! (or a null handle).

#![warn(unsafe_op_in_unsafe_fn)]
#![allow(non_snake_case)]

use std::ffi::{c_char, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Once, OnceLock};

use skycam_hw::{CameraControl, NativeSdk, RawHandle, SkycamConfig};
use tracing_subscriber::EnvFilter;

mod shim;
pub mod types;

pub use types::{SkycamFrameInfo, SkycamGeometry, SkycamSettings};

/// Size of the caller's camera id buffer.
pub const CAMERA_ID_BUF_LEN: usize = skycam_hw::sdk::CAMERA_ID_LEN;

static CONFIG: OnceLock<SkycamConfig> = OnceLock::new();
static SDK: OnceLock<Option<NativeSdk>> = OnceLock::new();

/// Install a stderr subscriber honoring `RUST_LOG`, unless the host process
/// already has one.
fn init_logging() {
    static LOGGING: Once = Once::new();
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    });
}

fn config() -> &'static SkycamConfig {
    CONFIG.get_or_init(|| {
        init_logging();
        SkycamConfig::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration");
            SkycamConfig::default()
        })
    })
}

fn sdk() -> Option<&'static NativeSdk> {
    SDK.get_or_init(|| match NativeSdk::load(config().sdk_library.as_deref()) {
        Ok(sdk) => Some(sdk),
        Err(e) => {
            tracing::error!(error = %e, "QHYCCD SDK unavailable");
            None
        }
    })
    .as_ref()
}

/// Run `f` with the loaded SDK, returning `fallback` if the SDK is missing
/// or `f` panics.
fn with_sdk<R>(fallback: R, f: impl FnOnce(&'static NativeSdk) -> R) -> R {
    let result = panic::catch_unwind(AssertUnwindSafe(|| sdk().map(f)));
    match result {
        Ok(Some(value)) => value,
        Ok(None) => fallback,
        Err(_) => {
            tracing::error!("panic inside camera shim");
            fallback
        }
    }
}

/// Like `with_sdk`, for per-camera operations. A null handle yields `fallback`.
fn with_camera<R>(
    handle: *mut c_void,
    fallback: R,
    f: impl FnOnce(&CameraControl<'static, NativeSdk>) -> R,
) -> R {
    let Some(handle) = RawHandle::from_ptr(handle) else {
        tracing::error!("null camera handle");
        return fallback;
    };
    with_sdk(fallback, |sdk| f(&CameraControl::new(sdk, handle, config())))
}

/// Write the SDK version as `[year, month, day, subversion]`.
///
/// # Safety
///
/// `version` must point to four writable `uint32_t`.
#[no_mangle]
pub unsafe extern "C" fn SDKVersion(version: *mut u32) {
    if version.is_null() {
        return;
    }
    // SAFETY: caller guarantees four writable u32.
    let out = unsafe { &mut *version.cast::<[u32; 4]>() };
    with_sdk((), |sdk| shim::sdk_version(sdk, out));
}

/// Write the SDK version as `V20YYMMDD_S` with a trailing NUL.
///
/// Returns 0, or 1 if the buffer is null, too small, or the SDK is missing.
///
/// # Safety
///
/// `buf` must point to `len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn SDKVersionString(buf: *mut c_char, len: usize) -> u32 {
    if buf.is_null() {
        return 1;
    }
    // SAFETY: caller guarantees `len` writable bytes.
    let out = unsafe { std::slice::from_raw_parts_mut(buf.cast::<u8>(), len) };
    with_sdk(1, |sdk| shim::sdk_version_string(sdk, out))
}

/// Initialize SDK resources and write the first usable camera id.
///
/// Returns 0 on success, 1 if SDK resources failed to initialize, 2 if no
/// camera was found, 3 if no detected camera is supported, 4 if additionally
/// the resources could not be released. On success the resources stay
/// initialized until `releaseSDK`.
///
/// # Safety
///
/// `cam_id` must point to `CAMERA_ID_BUF_LEN` (32) writable bytes.
#[no_mangle]
pub unsafe extern "C" fn getCameraId(cam_id: *mut c_char) -> u32 {
    if cam_id.is_null() {
        return 1;
    }
    // SAFETY: caller guarantees a 32-byte buffer.
    let out = unsafe { std::slice::from_raw_parts_mut(cam_id.cast::<u8>(), CAMERA_ID_BUF_LEN) };
    with_sdk(1, |sdk| shim::camera_id(sdk, out))
}

/// Open the camera with the given id. Returns null on failure.
///
/// # Safety
///
/// `cam_id` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn connectCamera(cam_id: *const c_char) -> *mut c_void {
    if cam_id.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: caller guarantees a NUL-terminated string.
    let id = unsafe { CStr::from_ptr(cam_id) }.to_string_lossy().into_owned();
    with_sdk(std::ptr::null_mut(), |sdk| shim::connect(sdk, &id))
}

/// Select single-frame mode and initialize the camera.
/// Returns 0, 1 if the stream mode failed, 2 if initialization failed.
///
/// # Safety
///
/// `handle` must come from `connectCamera` and not be disconnected.
#[no_mangle]
pub unsafe extern "C" fn initCamera(handle: *mut c_void) -> u32 {
    with_camera(handle, 1, shim::initialize)
}

/// Fill `geometry` with sensor geometry and overscan area.
/// Returns 0, or 1 if the chip info query failed.
///
/// # Safety
///
/// `handle` as for `initCamera`; `geometry` must be writable.
#[no_mangle]
pub unsafe extern "C" fn getChipInfo(handle: *mut c_void, geometry: *mut SkycamGeometry) -> u32 {
    if geometry.is_null() {
        return 1;
    }
    // SAFETY: caller guarantees a writable SkycamGeometry.
    let out = unsafe { &mut *geometry };
    with_camera(handle, 1, |ctl| shim::chip_info(ctl, out))
}

/// Write the firmware build date as `[year, month, day]`. Returns 0 or 1.
///
/// # Safety
///
/// `handle` as for `initCamera`; `version` must point to three writable `uint32_t`.
#[no_mangle]
pub unsafe extern "C" fn getFirmwareVersion(handle: *mut c_void, version: *mut u32) -> u32 {
    if version.is_null() {
        return 1;
    }
    // SAFETY: caller guarantees three writable u32.
    let out = unsafe { &mut *version.cast::<[u32; 3]>() };
    with_camera(handle, 1, |ctl| shim::firmware_version(ctl, out))
}

/// Set the configured USB traffic value.
/// Returns 0, 1 if the control is unavailable, 2 if setting it failed.
///
/// # Safety
///
/// `handle` as for `initCamera`.
#[no_mangle]
pub unsafe extern "C" fn setUsbTraffic(handle: *mut c_void) -> u32 {
    with_camera(handle, 1, shim::usb_traffic)
}

/// Set the readout region.
/// Returns 0, 1 if the region is not available on the sensor, 2 if applying failed.
///
/// # Safety
///
/// `handle` as for `initCamera`.
#[no_mangle]
pub unsafe extern "C" fn setResolution(
    handle: *mut c_void,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> u32 {
    with_camera(handle, 1, |ctl| shim::resolution(ctl, x, y, width, height))
}

/// Set symmetric binning. Returns 0, 1 if the mode is unavailable, 2 if applying failed.
///
/// # Safety
///
/// `handle` as for `initCamera`.
#[no_mangle]
pub unsafe extern "C" fn setBinMode(handle: *mut c_void, bin_x: u32, bin_y: u32) -> u32 {
    with_camera(handle, 1, |ctl| shim::bin_mode(ctl, bin_x, bin_y))
}

/// Set 8- or 16-bit transfer. Returns 0, 1 if unavailable, 2 if applying failed.
///
/// # Safety
///
/// `handle` as for `initCamera`.
#[no_mangle]
pub unsafe extern "C" fn setBitDepth(handle: *mut c_void, bits: u32) -> u32 {
    with_camera(handle, 1, |ctl| shim::bit_depth(ctl, bits))
}

/// Returns 0, 1 if gain is unavailable, 2 if setting it failed.
///
/// # Safety
///
/// `handle` as for `initCamera`.
#[no_mangle]
pub unsafe extern "C" fn setGain(handle: *mut c_void, gain: f64) -> u32 {
    with_camera(handle, 1, |ctl| shim::gain(ctl, gain))
}

/// Returns 0, 1 if offset is unavailable, 2 if setting it failed.
///
/// # Safety
///
/// `handle` as for `initCamera`.
#[no_mangle]
pub unsafe extern "C" fn setOffset(handle: *mut c_void, offset: f64) -> u32 {
    with_camera(handle, 1, |ctl| shim::offset(ctl, offset))
}

/// Exposure time in microseconds.
/// Returns 0, 1 if exposure is unavailable, 2 if setting it failed.
///
/// # Safety
///
/// `handle` as for `initCamera`.
#[no_mangle]
pub unsafe extern "C" fn setExposureTime(handle: *mut c_void, micros: f64) -> u32 {
    with_camera(handle, 1, |ctl| shim::exposure_time(ctl, micros))
}

/// Apply USB traffic, resolution, binning, bit depth, gain, offset and
/// exposure in that order, stopping at the first failure.
///
/// Returns 0, or `10 * step + code` where step 1..=7 follows the order above
/// and code is that setter's own code.
///
/// # Safety
///
/// `handle` as for `initCamera`; `settings` must be readable.
#[no_mangle]
pub unsafe extern "C" fn applySettings(handle: *mut c_void, settings: *const SkycamSettings) -> u32 {
    if settings.is_null() {
        return 11;
    }
    // SAFETY: caller guarantees a readable SkycamSettings.
    let settings = unsafe { &*settings };
    with_camera(handle, 11, |ctl| shim::apply_settings(ctl, settings))
}

/// Expose one frame into `buf` and report its layout in `info`.
///
/// Returns 0, 1 if the exposure failed to start, 2 if readout failed, 3 if
/// `buf_len` is smaller than the camera's frame memory length or that length
/// is unavailable.
///
/// # Safety
///
/// `handle` as for `initCamera`; `buf` must point to `buf_len` writable
/// bytes and `info` must be writable.
#[no_mangle]
pub unsafe extern "C" fn exposeSingleFrame(
    handle: *mut c_void,
    buf: *mut u8,
    buf_len: usize,
    info: *mut SkycamFrameInfo,
) -> u32 {
    if buf.is_null() || info.is_null() {
        return 1;
    }
    // SAFETY: caller guarantees `buf_len` writable bytes and a writable info struct.
    let (buf, info) = unsafe { (std::slice::from_raw_parts_mut(buf, buf_len), &mut *info) };
    with_camera(handle, 1, |ctl| shim::expose(ctl, buf, info))
}

/// Bytes `exposeSingleFrame` needs for the current camera, 0 on failure.
///
/// # Safety
///
/// `handle` as for `initCamera`.
#[no_mangle]
pub unsafe extern "C" fn getFrameBufferLength(handle: *mut c_void) -> usize {
    with_camera(handle, 0, |ctl| ctl.frame_buffer_len().unwrap_or(0))
}

/// Close the camera. The handle is invalid afterwards.
///
/// # Safety
///
/// `handle` as for `initCamera`.
#[no_mangle]
pub unsafe extern "C" fn disconnectCamera(handle: *mut c_void) {
    let Some(handle) = RawHandle::from_ptr(handle) else {
        return;
    };
    with_sdk((), |sdk| shim::disconnect(sdk, handle));
}

/// Release SDK resources.
#[no_mangle]
pub extern "C" fn releaseSDK() {
    with_sdk((), shim::release);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointers_fail_without_touching_the_sdk() {
        // SAFETY: null pointers are rejected before any dereference.
        unsafe {
            assert_eq!(getCameraId(std::ptr::null_mut()), 1);
            assert!(connectCamera(std::ptr::null()).is_null());
            assert_eq!(SDKVersionString(std::ptr::null_mut(), 0), 1);
            assert_eq!(getChipInfo(std::ptr::null_mut(), std::ptr::null_mut()), 1);
            assert_eq!(applySettings(std::ptr::null_mut(), std::ptr::null()), 11);
            assert_eq!(
                exposeSingleFrame(std::ptr::null_mut(), std::ptr::null_mut(), 0, std::ptr::null_mut()),
                1
            );
        }
    }

    #[test]
    fn null_handle_yields_fallback() {
        // SAFETY: a null handle is rejected before the SDK is consulted.
        unsafe {
            assert_eq!(initCamera(std::ptr::null_mut()), 1);
            assert_eq!(setGain(std::ptr::null_mut(), 1.0), 1);
            assert_eq!(getFrameBufferLength(std::ptr::null_mut()), 0);
            disconnectCamera(std::ptr::null_mut());
        }
    }

    #[test]
    fn camera_id_buffer_matches_python_side() {
        assert_eq!(CAMERA_ID_BUF_LEN, 32);
    }
}
