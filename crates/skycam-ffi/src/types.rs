//! `#[repr(C)]` parameter objects shared with the caller.

use skycam_hw::{ChipInfo, ExposureSettings, FrameInfo, OverscanArea};

/// Sensor geometry filled by `getChipInfo`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SkycamGeometry {
    pub chip_width_mm: f64,
    pub chip_height_mm: f64,
    pub pixel_width_um: f64,
    pub pixel_height_um: f64,
    pub image_width: u32,
    pub image_height: u32,
    pub bits_per_pixel: u32,
    pub overscan_x: u32,
    pub overscan_y: u32,
    pub overscan_width: u32,
    pub overscan_height: u32,
    pub _reserved: u32,
}

impl SkycamGeometry {
    pub fn new(chip: &ChipInfo, overscan: &OverscanArea) -> Self {
        Self {
            chip_width_mm: chip.chip_width_mm,
            chip_height_mm: chip.chip_height_mm,
            pixel_width_um: chip.pixel_width_um,
            pixel_height_um: chip.pixel_height_um,
            image_width: chip.image_width,
            image_height: chip.image_height,
            bits_per_pixel: chip.bits_per_pixel,
            overscan_x: overscan.x,
            overscan_y: overscan.y,
            overscan_width: overscan.width,
            overscan_height: overscan.height,
            _reserved: 0,
        }
    }
}

/// Acquisition settings read by `applySettings`. Zero width or height means
/// the full sensor area.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SkycamSettings {
    pub gain: f64,
    pub offset: f64,
    /// Microseconds.
    pub exposure_us: f64,
    pub roi_x: u32,
    pub roi_y: u32,
    pub width: u32,
    pub height: u32,
    pub bin_x: u32,
    pub bin_y: u32,
    pub bit_depth: u32,
    pub _reserved: u32,
}

impl From<&SkycamSettings> for ExposureSettings {
    fn from(s: &SkycamSettings) -> Self {
        Self {
            roi_x: s.roi_x,
            roi_y: s.roi_y,
            width: s.width,
            height: s.height,
            bin_x: s.bin_x,
            bin_y: s.bin_y,
            bit_depth: s.bit_depth,
            gain: s.gain,
            offset: s.offset,
            exposure_us: s.exposure_us,
        }
    }
}

/// Actual frame layout written by `exposeSingleFrame`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkycamFrameInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub channels: u32,
}

impl From<FrameInfo> for SkycamFrameInfo {
    fn from(f: FrameInfo) -> Self {
        Self {
            width: f.width,
            height: f.height,
            bits_per_pixel: f.bits_per_pixel,
            channels: f.channels,
        }
    }
}

// Layouts the Python ctypes structures are written against.
const _GEOMETRY_SIZE: () = assert!(std::mem::size_of::<SkycamGeometry>() == 64);
const _SETTINGS_SIZE: () = assert!(std::mem::size_of::<SkycamSettings>() == 56);
const _FRAME_INFO_SIZE: () = assert!(std::mem::size_of::<SkycamFrameInfo>() == 16);
