//! Per-operation errors.
//!
//! Codes are scoped to the operation that produced them and are what the C
//! boundary returns. `0` always means success and is never produced here.

use thiserror::Error;

use crate::frame::FrameError;
use crate::sdk::{CameraId, Control, SdkStatus};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to initialize SDK resources: {0}")]
    InitResource(SdkStatus),
    #[error("no camera found")]
    NoCamera,
    #[error("detected camera is not supported")]
    Unsupported,
    #[error("detected camera is not supported and SDK resources could not be released: {0}")]
    ReleaseResource(SdkStatus),
}

impl DiscoveryError {
    pub fn code(&self) -> u32 {
        match self {
            Self::InitResource(_) => 1,
            Self::NoCamera => 2,
            Self::Unsupported => 3,
            Self::ReleaseResource(_) => 4,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("failed to open camera {0}")]
    Open(CameraId),
}

#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to set stream mode: {0}")]
    StreamMode(SdkStatus),
    #[error("camera initialization failed: {0}")]
    Init(SdkStatus),
}

impl InitError {
    pub fn code(&self) -> u32 {
        match self {
            Self::StreamMode(_) => 1,
            Self::Init(_) => 2,
        }
    }
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("failed to read chip info: {0}")]
    ChipInfo(SdkStatus),
    #[error("failed to read firmware version: {0}")]
    Firmware(SdkStatus),
}

impl QueryError {
    pub fn code(&self) -> u32 {
        1
    }
}

/// Failure of a check-then-apply configuration step.
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("{control} is not available on this camera")]
    Unavailable { control: Control },
    #[error("{requested} is not supported by this camera")]
    Unsupported { requested: String },
    #[error("failed to set {what} to {value}: {status}")]
    Apply {
        what: &'static str,
        value: f64,
        status: SdkStatus,
    },
}

impl ControlError {
    pub fn code(&self) -> u32 {
        match self {
            Self::Unavailable { .. } | Self::Unsupported { .. } => 1,
            Self::Apply { .. } => 2,
        }
    }
}

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("sensor area unknown: {0}")]
    Geometry(SdkStatus),
    #[error("region {x},{y} {width}x{height} exceeds sensor area {max_width}x{max_height}")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },
    #[error("failed to set resolution: {0}")]
    Apply(SdkStatus),
}

impl ResolutionError {
    pub fn code(&self) -> u32 {
        match self {
            Self::Geometry(_) | Self::OutOfBounds { .. } => 1,
            Self::Apply(_) => 2,
        }
    }
}

/// Failure of a bundled settings apply. The step number identifies which
/// setting failed, in application order.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("usb traffic: {0}")]
    UsbTraffic(ControlError),
    #[error("resolution: {0}")]
    Resolution(ResolutionError),
    #[error("bin mode: {0}")]
    BinMode(ControlError),
    #[error("bit depth: {0}")]
    BitDepth(ControlError),
    #[error("gain: {0}")]
    Gain(ControlError),
    #[error("offset: {0}")]
    Offset(ControlError),
    #[error("exposure time: {0}")]
    Exposure(ControlError),
}

impl SettingsError {
    pub fn step(&self) -> u32 {
        match self {
            Self::UsbTraffic(_) => 1,
            Self::Resolution(_) => 2,
            Self::BinMode(_) => 3,
            Self::BitDepth(_) => 4,
            Self::Gain(_) => 5,
            Self::Offset(_) => 6,
            Self::Exposure(_) => 7,
        }
    }

    /// `10 * step + code` of the failing step, e.g. 52 for a gain apply failure.
    pub fn code(&self) -> u32 {
        let inner = match self {
            Self::UsbTraffic(e)
            | Self::BinMode(e)
            | Self::BitDepth(e)
            | Self::Gain(e)
            | Self::Offset(e)
            | Self::Exposure(e) => e.code(),
            Self::Resolution(e) => e.code(),
        };
        10 * self.step() + inner
    }
}

#[derive(Error, Debug)]
pub enum ExposureError {
    #[error("single-frame exposure failed to start")]
    Trigger,
    #[error("failed to read frame: {0}")]
    Readout(SdkStatus),
    #[error("frame buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },
    #[error("camera reported no usable frame memory length")]
    MemLength,
    #[error("readout does not match reported frame layout: {0}")]
    Layout(#[from] FrameError),
}

impl ExposureError {
    pub fn code(&self) -> u32 {
        match self {
            Self::Trigger => 1,
            Self::Readout(_) | Self::Layout(_) => 2,
            Self::BufferTooSmall { .. } | Self::MemLength => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_codes() {
        assert_eq!(DiscoveryError::InitResource(SdkStatus(1)).code(), 1);
        assert_eq!(DiscoveryError::NoCamera.code(), 2);
        assert_eq!(DiscoveryError::Unsupported.code(), 3);
        assert_eq!(DiscoveryError::ReleaseResource(SdkStatus(1)).code(), 4);
    }

    #[test]
    fn settings_code_combines_step_and_inner() {
        let err = SettingsError::Gain(ControlError::Apply {
            what: "gain",
            value: 30.0,
            status: SdkStatus(u32::MAX),
        });
        assert_eq!(err.code(), 52);

        let err = SettingsError::Resolution(ResolutionError::OutOfBounds {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            max_width: 5,
            max_height: 5,
        });
        assert_eq!(err.code(), 21);
    }

    #[test]
    fn error_messages_name_the_control() {
        let err = ControlError::Unavailable {
            control: Control::UsbTraffic,
        };
        assert_eq!(err.to_string(), "usb_traffic is not available on this camera");
    }
}
