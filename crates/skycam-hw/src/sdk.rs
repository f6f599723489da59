//! The vendor SDK seam.
//!
//! `QhySdk` mirrors the QHYCCD entry points one-to-one. Everything above it
//! (discovery, camera control, the C boundary) is written against the trait,
//! so the real library and the scripted fake are interchangeable.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use serde::Serialize;

use crate::version::SdkVersion;

/// Vendor success status.
pub const QHYCCD_SUCCESS: u32 = 0;
/// Vendor generic error sentinel.
pub const QHYCCD_ERROR: u32 = 0xFFFF_FFFF;
/// Returned by the single-frame trigger when the frame can be read at once.
pub const QHYCCD_READ_DIRECTLY: u32 = 0x2001;

/// Size of the identifier buffer the vendor writes into.
pub const CAMERA_ID_LEN: usize = 32;
/// Size of the firmware version buffer the vendor writes into.
pub const FIRMWARE_BUF_LEN: usize = 32;

/// A non-success status returned by the vendor library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdkStatus(pub u32);

impl fmt::Display for SdkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == QHYCCD_ERROR {
            write!(f, "QHYCCD_ERROR")
        } else {
            write!(f, "status {:#x}", self.0)
        }
    }
}

impl std::error::Error for SdkStatus {}

pub type SdkResult<T> = Result<T, SdkStatus>;

/// Map a raw vendor status to `Ok(())` or the failing status.
pub fn check(status: u32) -> SdkResult<()> {
    if status == QHYCCD_SUCCESS {
        Ok(())
    } else {
        Err(SdkStatus(status))
    }
}

/// Opaque camera handle issued by `OpenQHYCCD`. Never dereferenced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHandle(NonNull<c_void>);

impl RawHandle {
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Camera identifier as reported by `GetQHYCCDId`, e.g. `QHY183M-c915e844f6e5a2a1d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CameraId(String);

impl CameraId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a NUL-terminated vendor buffer. Returns `None` for an empty id.
    pub fn from_c_buf(buf: &[u8]) -> Option<Self> {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        if end == 0 {
            return None;
        }
        Some(Self(String::from_utf8_lossy(&buf[..end]).into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Model prefix before the serial, e.g. `QHY183M`.
    pub fn model(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subset of the vendor `CONTROL_ID` enumeration used by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Control {
    Gain = 6,
    Offset = 7,
    /// Exposure time in microseconds.
    Exposure = 8,
    UsbTraffic = 12,
    Bin1x1 = 21,
    Bin2x2 = 22,
    Bin3x3 = 23,
    Bin4x4 = 24,
    Bits8 = 34,
    Bits16 = 35,
}

impl Control {
    /// Availability control for a symmetric bin factor.
    pub fn for_bin(bin: u32) -> Option<Self> {
        match bin {
            1 => Some(Self::Bin1x1),
            2 => Some(Self::Bin2x2),
            3 => Some(Self::Bin3x3),
            4 => Some(Self::Bin4x4),
            _ => None,
        }
    }

    /// Availability control for a transfer bit depth.
    pub fn for_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::Bits8),
            16 => Some(Self::Bits16),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Gain => "gain",
            Self::Offset => "offset",
            Self::Exposure => "exposure",
            Self::UsbTraffic => "usb_traffic",
            Self::Bin1x1 => "bin_1x1",
            Self::Bin2x2 => "bin_2x2",
            Self::Bin3x3 => "bin_3x3",
            Self::Bin4x4 => "bin_4x4",
            Self::Bits8 => "bits_8",
            Self::Bits16 => "bits_16",
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stream mode passed to `SetQHYCCDStreamMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    #[default]
    Single,
    Live,
}

impl StreamMode {
    pub fn as_raw(self) -> u8 {
        match self {
            Self::Single => 0,
            Self::Live => 1,
        }
    }
}

/// Sensor geometry from `GetQHYCCDChipInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ChipInfo {
    pub chip_width_mm: f64,
    pub chip_height_mm: f64,
    pub image_width: u32,
    pub image_height: u32,
    pub pixel_width_um: f64,
    pub pixel_height_um: f64,
    pub bits_per_pixel: u32,
}

/// Overscan region from `GetQHYCCDOverScanArea`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OverscanArea {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Actual frame layout reported by `GetQHYCCDSingleFrame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub channels: u32,
}

/// One method per vendor entry point.
///
/// Handle-taking methods require a handle obtained from `open` on the same
/// backend that has not been passed to `close`. Violations are undefined in
/// the vendor library; nothing here tracks it.
pub trait QhySdk {
    fn version(&self) -> SdkVersion;
    fn init_resource(&self) -> SdkResult<()>;
    fn release_resource(&self) -> SdkResult<()>;
    /// Number of attached cameras.
    fn scan(&self) -> u32;
    fn camera_id(&self, index: u32) -> SdkResult<CameraId>;
    fn open(&self, id: &CameraId) -> Option<RawHandle>;
    fn close(&self, handle: RawHandle) -> SdkResult<()>;

    fn set_stream_mode(&self, handle: RawHandle, mode: StreamMode) -> SdkResult<()>;
    fn init_camera(&self, handle: RawHandle) -> SdkResult<()>;
    fn chip_info(&self, handle: RawHandle) -> SdkResult<ChipInfo>;
    fn overscan_area(&self, handle: RawHandle) -> SdkResult<OverscanArea>;
    fn firmware_version(&self, handle: RawHandle) -> SdkResult<[u8; FIRMWARE_BUF_LEN]>;

    fn is_control_available(&self, handle: RawHandle, control: Control) -> SdkResult<()>;
    fn set_param(&self, handle: RawHandle, control: Control, value: f64) -> SdkResult<()>;
    fn get_param(&self, handle: RawHandle, control: Control) -> f64;

    fn set_resolution(&self, handle: RawHandle, x: u32, y: u32, width: u32, height: u32) -> SdkResult<()>;
    fn set_bin_mode(&self, handle: RawHandle, bin_x: u32, bin_y: u32) -> SdkResult<()>;
    fn set_bits_mode(&self, handle: RawHandle, bits: u32) -> SdkResult<()>;

    /// Raw trigger status; may be `QHYCCD_ERROR`, `QHYCCD_READ_DIRECTLY` or anything else.
    fn exp_single_frame(&self, handle: RawHandle) -> u32;
    /// Read the completed frame into `buf`, which must hold `mem_length` bytes.
    fn get_single_frame(&self, handle: RawHandle, buf: &mut [u8]) -> SdkResult<FrameInfo>;
    /// Bytes needed for one full-resolution frame.
    fn mem_length(&self, handle: RawHandle) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_maps_success_only() {
        assert!(check(QHYCCD_SUCCESS).is_ok());
        assert_eq!(check(QHYCCD_ERROR), Err(SdkStatus(QHYCCD_ERROR)));
        assert_eq!(check(QHYCCD_READ_DIRECTLY), Err(SdkStatus(0x2001)));
    }

    #[test]
    fn camera_id_from_c_buf_stops_at_nul() {
        let mut buf = [0u8; CAMERA_ID_LEN];
        buf[..9].copy_from_slice(b"QHY5III-1");
        let id = CameraId::from_c_buf(&buf).unwrap();
        assert_eq!(id.as_str(), "QHY5III-1");
        assert_eq!(id.model(), "QHY5III");
    }

    #[test]
    fn camera_id_from_empty_buf_is_none() {
        assert!(CameraId::from_c_buf(&[0u8; 8]).is_none());
        assert!(CameraId::from_c_buf(&[]).is_none());
    }

    #[test]
    fn control_ids_match_vendor_enum() {
        assert_eq!(Control::Gain as u32, 6);
        assert_eq!(Control::Exposure as u32, 8);
        assert_eq!(Control::UsbTraffic as u32, 12);
        assert_eq!(Control::Bin4x4 as u32, 24);
        assert_eq!(Control::Bits16 as u32, 35);
    }

    #[test]
    fn bin_and_bits_controls() {
        assert_eq!(Control::for_bin(2), Some(Control::Bin2x2));
        assert_eq!(Control::for_bin(5), None);
        assert_eq!(Control::for_bits(8), Some(Control::Bits8));
        assert_eq!(Control::for_bits(12), None);
    }

    #[test]
    fn raw_handle_rejects_null() {
        assert!(RawHandle::from_ptr(std::ptr::null_mut()).is_none());
    }
}
