//! `libqhyccd` loaded at run time.

#![allow(non_snake_case)]

use std::ffi::{c_char, c_double, c_uint, c_void, CString};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::sdk::{
    check, CameraId, ChipInfo, Control, FrameInfo, OverscanArea, QhySdk, RawHandle, SdkResult,
    SdkStatus, StreamMode, CAMERA_ID_LEN, FIRMWARE_BUF_LEN, QHYCCD_ERROR,
};
use crate::version::SdkVersion;

#[derive(Error, Debug)]
pub enum SdkLoadError {
    #[error("QHYCCD SDK library not found (tried {0})")]
    NotFound(String),
    #[error("failed to load {path}: {source}")]
    Library {
        path: PathBuf,
        source: libloading::Error,
    },
    #[error("symbol {symbol} missing from QHYCCD SDK: {source}")]
    Symbol {
        symbol: &'static str,
        source: libloading::Error,
    },
}

type Handle = *mut c_void;

/// Resolved entry points. The `Library` is kept alive alongside them.
pub struct NativeSdk {
    _lib: libloading::Library,
    GetQHYCCDSDKVersion: unsafe extern "C" fn(*mut u32, *mut u32, *mut u32, *mut u32) -> u32,
    InitQHYCCDResource: unsafe extern "C" fn() -> u32,
    ReleaseQHYCCDResource: unsafe extern "C" fn() -> u32,
    ScanQHYCCD: unsafe extern "C" fn() -> u32,
    GetQHYCCDId: unsafe extern "C" fn(u32, *mut c_char) -> u32,
    OpenQHYCCD: unsafe extern "C" fn(*mut c_char) -> Handle,
    CloseQHYCCD: unsafe extern "C" fn(Handle) -> u32,
    SetQHYCCDStreamMode: unsafe extern "C" fn(Handle, u8) -> u32,
    InitQHYCCD: unsafe extern "C" fn(Handle) -> u32,
    GetQHYCCDChipInfo: unsafe extern "C" fn(
        Handle,
        *mut c_double,
        *mut c_double,
        *mut u32,
        *mut u32,
        *mut c_double,
        *mut c_double,
        *mut u32,
    ) -> u32,
    GetQHYCCDOverScanArea: unsafe extern "C" fn(Handle, *mut u32, *mut u32, *mut u32, *mut u32) -> u32,
    GetQHYCCDFWVersion: unsafe extern "C" fn(Handle, *mut u8) -> u32,
    IsQHYCCDControlAvailable: unsafe extern "C" fn(Handle, c_uint) -> u32,
    SetQHYCCDParam: unsafe extern "C" fn(Handle, c_uint, c_double) -> u32,
    GetQHYCCDParam: unsafe extern "C" fn(Handle, c_uint) -> c_double,
    SetQHYCCDResolution: unsafe extern "C" fn(Handle, u32, u32, u32, u32) -> u32,
    SetQHYCCDBinMode: unsafe extern "C" fn(Handle, u32, u32) -> u32,
    SetQHYCCDBitsMode: unsafe extern "C" fn(Handle, u32) -> u32,
    ExpQHYCCDSingleFrame: unsafe extern "C" fn(Handle) -> u32,
    GetQHYCCDSingleFrame:
        unsafe extern "C" fn(Handle, *mut u32, *mut u32, *mut u32, *mut u32, *mut u8) -> u32,
    GetQHYCCDMemLength: unsafe extern "C" fn(Handle) -> u32,
}

/// Library names probed when no explicit path is configured.
pub fn default_library_candidates() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["qhyccd.dll"]
    } else if cfg!(target_os = "macos") {
        &["libqhyccd.dylib", "/usr/local/lib/libqhyccd.dylib"]
    } else {
        &[
            "libqhyccd.so",
            "libqhyccd.so.20",
            "/usr/local/lib/libqhyccd.so",
            "/usr/lib/libqhyccd.so",
        ]
    }
}

macro_rules! symbol {
    ($lib:expr, $name:ident) => {
        // SAFETY: the field type matches the prototype in qhyccd.h.
        *unsafe { $lib.get(concat!(stringify!($name), "\0").as_bytes()) }.map_err(|source| {
            SdkLoadError::Symbol {
                symbol: stringify!($name),
                source,
            }
        })?
    };
}

impl NativeSdk {
    /// Load from `path`, or probe the platform defaults when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, SdkLoadError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let candidates = default_library_candidates();
                for candidate in candidates {
                    match Self::load_from(Path::new(candidate)) {
                        Ok(sdk) => return Ok(sdk),
                        Err(SdkLoadError::Library { .. }) => continue,
                        Err(e) => return Err(e),
                    }
                }
                Err(SdkLoadError::NotFound(candidates.join(", ")))
            }
        }
    }

    fn load_from(path: &Path) -> Result<Self, SdkLoadError> {
        // SAFETY: loading runs the library's initializers; libqhyccd has no
        // initializer side effects beyond its own static state.
        let lib = unsafe { libloading::Library::new(path) }.map_err(|source| {
            SdkLoadError::Library {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let sdk = Self {
            GetQHYCCDSDKVersion: symbol!(lib, GetQHYCCDSDKVersion),
            InitQHYCCDResource: symbol!(lib, InitQHYCCDResource),
            ReleaseQHYCCDResource: symbol!(lib, ReleaseQHYCCDResource),
            ScanQHYCCD: symbol!(lib, ScanQHYCCD),
            GetQHYCCDId: symbol!(lib, GetQHYCCDId),
            OpenQHYCCD: symbol!(lib, OpenQHYCCD),
            CloseQHYCCD: symbol!(lib, CloseQHYCCD),
            SetQHYCCDStreamMode: symbol!(lib, SetQHYCCDStreamMode),
            InitQHYCCD: symbol!(lib, InitQHYCCD),
            GetQHYCCDChipInfo: symbol!(lib, GetQHYCCDChipInfo),
            GetQHYCCDOverScanArea: symbol!(lib, GetQHYCCDOverScanArea),
            GetQHYCCDFWVersion: symbol!(lib, GetQHYCCDFWVersion),
            IsQHYCCDControlAvailable: symbol!(lib, IsQHYCCDControlAvailable),
            SetQHYCCDParam: symbol!(lib, SetQHYCCDParam),
            GetQHYCCDParam: symbol!(lib, GetQHYCCDParam),
            SetQHYCCDResolution: symbol!(lib, SetQHYCCDResolution),
            SetQHYCCDBinMode: symbol!(lib, SetQHYCCDBinMode),
            SetQHYCCDBitsMode: symbol!(lib, SetQHYCCDBitsMode),
            ExpQHYCCDSingleFrame: symbol!(lib, ExpQHYCCDSingleFrame),
            GetQHYCCDSingleFrame: symbol!(lib, GetQHYCCDSingleFrame),
            GetQHYCCDMemLength: symbol!(lib, GetQHYCCDMemLength),
            _lib: lib,
        };
        tracing::info!(path = %path.display(), version = %sdk.version(), "QHYCCD SDK loaded");
        Ok(sdk)
    }
}

// SAFETY (all calls below): the function pointers were resolved from a
// library that `_lib` keeps loaded, every out-pointer refers to a live local
// or caller buffer of the size the vendor writes, and handles are only those
// returned by `OpenQHYCCD`.
impl QhySdk for NativeSdk {
    fn version(&self) -> SdkVersion {
        let mut v = SdkVersion::default();
        unsafe {
            (self.GetQHYCCDSDKVersion)(&mut v.year, &mut v.month, &mut v.day, &mut v.subversion);
        }
        v
    }

    fn init_resource(&self) -> SdkResult<()> {
        check(unsafe { (self.InitQHYCCDResource)() })
    }

    fn release_resource(&self) -> SdkResult<()> {
        check(unsafe { (self.ReleaseQHYCCDResource)() })
    }

    fn scan(&self) -> u32 {
        unsafe { (self.ScanQHYCCD)() }
    }

    fn camera_id(&self, index: u32) -> SdkResult<CameraId> {
        let mut buf = [0u8; CAMERA_ID_LEN];
        check(unsafe { (self.GetQHYCCDId)(index, buf.as_mut_ptr().cast()) })?;
        CameraId::from_c_buf(&buf).ok_or(SdkStatus(QHYCCD_ERROR))
    }

    fn open(&self, id: &CameraId) -> Option<RawHandle> {
        let id = CString::new(id.as_str()).ok()?;
        // OpenQHYCCD takes a non-const pointer but does not write through it.
        RawHandle::from_ptr(unsafe { (self.OpenQHYCCD)(id.as_ptr().cast_mut()) })
    }

    fn close(&self, handle: RawHandle) -> SdkResult<()> {
        check(unsafe { (self.CloseQHYCCD)(handle.as_ptr()) })
    }

    fn set_stream_mode(&self, handle: RawHandle, mode: StreamMode) -> SdkResult<()> {
        check(unsafe { (self.SetQHYCCDStreamMode)(handle.as_ptr(), mode.as_raw()) })
    }

    fn init_camera(&self, handle: RawHandle) -> SdkResult<()> {
        check(unsafe { (self.InitQHYCCD)(handle.as_ptr()) })
    }

    fn chip_info(&self, handle: RawHandle) -> SdkResult<ChipInfo> {
        let mut c = ChipInfo::default();
        check(unsafe {
            (self.GetQHYCCDChipInfo)(
                handle.as_ptr(),
                &mut c.chip_width_mm,
                &mut c.chip_height_mm,
                &mut c.image_width,
                &mut c.image_height,
                &mut c.pixel_width_um,
                &mut c.pixel_height_um,
                &mut c.bits_per_pixel,
            )
        })?;
        Ok(c)
    }

    fn overscan_area(&self, handle: RawHandle) -> SdkResult<OverscanArea> {
        let mut a = OverscanArea::default();
        check(unsafe {
            (self.GetQHYCCDOverScanArea)(handle.as_ptr(), &mut a.x, &mut a.y, &mut a.width, &mut a.height)
        })?;
        Ok(a)
    }

    fn firmware_version(&self, handle: RawHandle) -> SdkResult<[u8; FIRMWARE_BUF_LEN]> {
        let mut buf = [0u8; FIRMWARE_BUF_LEN];
        check(unsafe { (self.GetQHYCCDFWVersion)(handle.as_ptr(), buf.as_mut_ptr()) })?;
        Ok(buf)
    }

    fn is_control_available(&self, handle: RawHandle, control: Control) -> SdkResult<()> {
        check(unsafe { (self.IsQHYCCDControlAvailable)(handle.as_ptr(), control as c_uint) })
    }

    fn set_param(&self, handle: RawHandle, control: Control, value: f64) -> SdkResult<()> {
        check(unsafe { (self.SetQHYCCDParam)(handle.as_ptr(), control as c_uint, value) })
    }

    fn get_param(&self, handle: RawHandle, control: Control) -> f64 {
        unsafe { (self.GetQHYCCDParam)(handle.as_ptr(), control as c_uint) }
    }

    fn set_resolution(&self, handle: RawHandle, x: u32, y: u32, width: u32, height: u32) -> SdkResult<()> {
        check(unsafe { (self.SetQHYCCDResolution)(handle.as_ptr(), x, y, width, height) })
    }

    fn set_bin_mode(&self, handle: RawHandle, bin_x: u32, bin_y: u32) -> SdkResult<()> {
        check(unsafe { (self.SetQHYCCDBinMode)(handle.as_ptr(), bin_x, bin_y) })
    }

    fn set_bits_mode(&self, handle: RawHandle, bits: u32) -> SdkResult<()> {
        check(unsafe { (self.SetQHYCCDBitsMode)(handle.as_ptr(), bits) })
    }

    fn exp_single_frame(&self, handle: RawHandle) -> u32 {
        unsafe { (self.ExpQHYCCDSingleFrame)(handle.as_ptr()) }
    }

    fn get_single_frame(&self, handle: RawHandle, buf: &mut [u8]) -> SdkResult<FrameInfo> {
        let mut f = FrameInfo::default();
        check(unsafe {
            (self.GetQHYCCDSingleFrame)(
                handle.as_ptr(),
                &mut f.width,
                &mut f.height,
                &mut f.bits_per_pixel,
                &mut f.channels,
                buf.as_mut_ptr(),
            )
        })?;
        Ok(f)
    }

    fn mem_length(&self, handle: RawHandle) -> u32 {
        unsafe { (self.GetQHYCCDMemLength)(handle.as_ptr()) }
    }
}
