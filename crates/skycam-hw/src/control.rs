//! Per-handle camera operations.
//!
//! `CameraControl` holds no state beyond the handle and a few configured
//! values. Each method issues a fixed sequence of vendor calls and maps the
//! outcome to its error type. Nothing is retried or cached.

use std::time::Duration;

use crate::config::{ExposureSettings, SkycamConfig};
use crate::error::{
    ControlError, ExposureError, InitError, QueryError, ResolutionError, SettingsError,
};
use crate::sdk::{
    ChipInfo, Control, FrameInfo, OverscanArea, QhySdk, RawHandle, SdkStatus, StreamMode,
    QHYCCD_ERROR, QHYCCD_READ_DIRECTLY,
};
use crate::version::FirmwareVersion;

/// Operations on one open camera handle.
pub struct CameraControl<'a, S: QhySdk + ?Sized> {
    sdk: &'a S,
    handle: RawHandle,
    stream_mode: StreamMode,
    usb_traffic: u32,
    readout_delay: Duration,
    sleep: fn(Duration),
}

impl<'a, S: QhySdk + ?Sized> CameraControl<'a, S> {
    /// `handle` must come from `sdk.open` and not have been closed.
    pub fn new(sdk: &'a S, handle: RawHandle, config: &SkycamConfig) -> Self {
        Self {
            sdk,
            handle,
            stream_mode: config.stream_mode,
            usb_traffic: config.usb_traffic,
            readout_delay: config.readout_delay(),
            sleep: std::thread::sleep,
        }
    }

    /// Replace the function used for the readout wait.
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    pub fn sdk(&self) -> &'a S {
        self.sdk
    }

    /// Select the configured stream mode, then initialize the camera.
    pub fn initialize(&self) -> Result<(), InitError> {
        self.sdk
            .set_stream_mode(self.handle, self.stream_mode)
            .map_err(InitError::StreamMode)?;
        self.sdk.init_camera(self.handle).map_err(InitError::Init)?;
        tracing::info!(mode = ?self.stream_mode, "camera initialized");
        Ok(())
    }

    pub fn chip_info(&self) -> Result<ChipInfo, QueryError> {
        self.sdk.chip_info(self.handle).map_err(QueryError::ChipInfo)
    }

    /// Overscan region, or an empty area if the camera does not report one.
    pub fn overscan_area(&self) -> OverscanArea {
        self.sdk.overscan_area(self.handle).unwrap_or_else(|status| {
            tracing::warn!(%status, "overscan area unavailable");
            OverscanArea::default()
        })
    }

    pub fn firmware_version(&self) -> Result<FirmwareVersion, QueryError> {
        let buf = self
            .sdk
            .firmware_version(self.handle)
            .map_err(QueryError::Firmware)?;
        FirmwareVersion::decode(&buf).ok_or(QueryError::Firmware(SdkStatus(QHYCCD_ERROR)))
    }

    /// Current value of a control as reported by the camera.
    pub fn param(&self, control: Control) -> f64 {
        self.sdk.get_param(self.handle, control)
    }

    pub fn set_usb_traffic(&self) -> Result<(), ControlError> {
        self.set_checked(Control::UsbTraffic, f64::from(self.usb_traffic))
    }

    /// Set the readout region. The region is checked against the unbinned
    /// sensor area before anything is applied.
    pub fn set_resolution(&self, x: u32, y: u32, width: u32, height: u32) -> Result<(), ResolutionError> {
        let chip = self
            .sdk
            .chip_info(self.handle)
            .map_err(ResolutionError::Geometry)?;
        let fits = width > 0
            && height > 0
            && x.checked_add(width).is_some_and(|r| r <= chip.image_width)
            && y.checked_add(height).is_some_and(|b| b <= chip.image_height);
        if !fits {
            tracing::warn!(x, y, width, height, "requested region not available");
            return Err(ResolutionError::OutOfBounds {
                x,
                y,
                width,
                height,
                max_width: chip.image_width,
                max_height: chip.image_height,
            });
        }
        self.sdk
            .set_resolution(self.handle, x, y, width, height)
            .map_err(|status| {
                tracing::error!(x, y, width, height, %status, "set resolution failed");
                ResolutionError::Apply(status)
            })
    }

    /// Symmetric binning from 1x1 to 4x4.
    pub fn set_bin_mode(&self, bin_x: u32, bin_y: u32) -> Result<(), ControlError> {
        let control = match Control::for_bin(bin_x) {
            Some(control) if bin_x == bin_y => control,
            _ => {
                return Err(ControlError::Unsupported {
                    requested: format!("bin {bin_x}x{bin_y}"),
                })
            }
        };
        self.check_available(control)?;
        self.sdk
            .set_bin_mode(self.handle, bin_x, bin_y)
            .map_err(|status| Self::apply_failed("bin mode", f64::from(bin_x), status))
    }

    /// 8 or 16 bit transfer.
    pub fn set_bit_depth(&self, bits: u32) -> Result<(), ControlError> {
        let control = Control::for_bits(bits).ok_or_else(|| ControlError::Unsupported {
            requested: format!("{bits}-bit depth"),
        })?;
        self.check_available(control)?;
        self.sdk
            .set_bits_mode(self.handle, bits)
            .map_err(|status| Self::apply_failed("bit depth", f64::from(bits), status))
    }

    pub fn set_gain(&self, gain: f64) -> Result<(), ControlError> {
        self.set_checked(Control::Gain, gain)
    }

    pub fn set_offset(&self, offset: f64) -> Result<(), ControlError> {
        self.set_checked(Control::Offset, offset)
    }

    pub fn set_exposure_time(&self, micros: f64) -> Result<(), ControlError> {
        self.set_checked(Control::Exposure, micros)
    }

    /// Apply every setting in order, stopping at the first failure.
    ///
    /// A zero width or height selects the full sensor area.
    pub fn apply(&self, settings: &ExposureSettings) -> Result<(), SettingsError> {
        self.set_usb_traffic().map_err(SettingsError::UsbTraffic)?;

        let (width, height) = if settings.width == 0 || settings.height == 0 {
            let chip = self
                .sdk
                .chip_info(self.handle)
                .map_err(|s| SettingsError::Resolution(ResolutionError::Geometry(s)))?;
            (chip.image_width, chip.image_height)
        } else {
            (settings.width, settings.height)
        };
        self.set_resolution(settings.roi_x, settings.roi_y, width, height)
            .map_err(SettingsError::Resolution)?;

        self.set_bin_mode(settings.bin_x, settings.bin_y)
            .map_err(SettingsError::BinMode)?;
        self.set_bit_depth(settings.bit_depth)
            .map_err(SettingsError::BitDepth)?;
        self.set_gain(settings.gain).map_err(SettingsError::Gain)?;
        self.set_offset(settings.offset)
            .map_err(SettingsError::Offset)?;
        self.set_exposure_time(settings.exposure_us)
            .map_err(SettingsError::Exposure)?;

        tracing::debug!(?settings, "exposure settings applied");
        Ok(())
    }

    /// Bytes a frame buffer must hold for `expose_single_frame`, or `None`
    /// when the camera reports zero or `QHYCCD_ERROR`.
    pub fn frame_buffer_len(&self) -> Option<usize> {
        match self.sdk.mem_length(self.handle) {
            0 | QHYCCD_ERROR => {
                tracing::error!("frame memory length unavailable");
                None
            }
            len => Some(len as usize),
        }
    }

    /// Trigger one exposure and read it into `buf`.
    ///
    /// A trigger status of `QHYCCD_ERROR` aborts without readout.
    /// `QHYCCD_READ_DIRECTLY` reads at once; any other status waits the
    /// configured readout delay exactly once first.
    pub fn expose_single_frame(&self, buf: &mut [u8]) -> Result<FrameInfo, ExposureError> {
        let needed = self.frame_buffer_len().ok_or(ExposureError::MemLength)?;
        if buf.len() < needed {
            return Err(ExposureError::BufferTooSmall {
                needed,
                actual: buf.len(),
            });
        }

        match self.sdk.exp_single_frame(self.handle) {
            QHYCCD_ERROR => {
                tracing::error!("single-frame exposure failed to start");
                return Err(ExposureError::Trigger);
            }
            QHYCCD_READ_DIRECTLY => {}
            status => {
                tracing::debug!(
                    status = format_args!("{status:#x}"),
                    delay_ms = self.readout_delay.as_millis() as u64,
                    "waiting for readout"
                );
                (self.sleep)(self.readout_delay);
            }
        }

        let info = self
            .sdk
            .get_single_frame(self.handle, buf)
            .map_err(|status| {
                tracing::error!(%status, "frame readout failed");
                ExposureError::Readout(status)
            })?;
        tracing::info!(
            width = info.width,
            height = info.height,
            bpp = info.bits_per_pixel,
            channels = info.channels,
            "frame read"
        );
        Ok(info)
    }

    fn check_available(&self, control: Control) -> Result<(), ControlError> {
        self.sdk
            .is_control_available(self.handle, control)
            .map_err(|status| {
                tracing::warn!(%control, %status, "control not available");
                ControlError::Unavailable { control }
            })
    }

    fn set_checked(&self, control: Control, value: f64) -> Result<(), ControlError> {
        self.check_available(control)?;
        self.sdk
            .set_param(self.handle, control, value)
            .map_err(|status| Self::apply_failed(control.name(), value, status))
    }

    fn apply_failed(what: &'static str, value: f64, status: SdkStatus) -> ControlError {
        tracing::error!(what, value, %status, "camera rejected setting");
        ControlError::Apply {
            what,
            value,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeSdk, Script};
    use crate::sdk::QHYCCD_SUCCESS;
    use std::cell::Cell;

    thread_local! {
        static SLEEPS: Cell<u32> = const { Cell::new(0) };
    }

    fn counting_sleep(_: Duration) {
        SLEEPS.with(|s| s.set(s.get() + 1));
    }

    fn sleeps() -> u32 {
        SLEEPS.with(|s| s.get())
    }

    fn control(sdk: &FakeSdk) -> CameraControl<'_, FakeSdk> {
        SLEEPS.with(|s| s.set(0));
        CameraControl::new(sdk, FakeSdk::handle(), &SkycamConfig::default())
            .with_sleep(counting_sleep)
    }

    fn frame_buf(sdk: &FakeSdk) -> Vec<u8> {
        vec![0u8; control(sdk).frame_buffer_len().unwrap()]
    }

    #[test]
    fn initialize_sets_stream_mode_first() {
        let sdk = FakeSdk::default();
        control(&sdk).initialize().unwrap();
        assert_eq!(sdk.calls(), vec!["set_stream_mode", "init_camera"]);
    }

    #[test]
    fn initialize_codes_distinguish_steps() {
        let sdk = FakeSdk::new(Script {
            stream_mode_ok: false,
            ..Script::default()
        });
        assert_eq!(control(&sdk).initialize().unwrap_err().code(), 1);
        assert!(!sdk.called("init_camera"));

        let sdk = FakeSdk::new(Script {
            init_camera_ok: false,
            ..Script::default()
        });
        assert_eq!(control(&sdk).initialize().unwrap_err().code(), 2);
    }

    #[test]
    fn chip_info_failure_is_code_1() {
        let sdk = FakeSdk::new(Script {
            chip: None,
            ..Script::default()
        });
        assert_eq!(control(&sdk).chip_info().unwrap_err().code(), 1);
    }

    #[test]
    fn usb_traffic_uses_configured_value() {
        let sdk = FakeSdk::default();
        control(&sdk).set_usb_traffic().unwrap();
        assert_eq!(sdk.params(), vec![(Control::UsbTraffic, 10.0)]);
    }

    #[test]
    fn usb_traffic_unavailable_then_apply_failure() {
        let sdk = FakeSdk::new(Script {
            unavailable: [Control::UsbTraffic].into(),
            ..Script::default()
        });
        assert_eq!(control(&sdk).set_usb_traffic().unwrap_err().code(), 1);
        assert!(!sdk.called("set_param"));

        let sdk = FakeSdk::new(Script {
            failing_sets: ["set_param"].into(),
            ..Script::default()
        });
        assert_eq!(control(&sdk).set_usb_traffic().unwrap_err().code(), 2);
    }

    #[test]
    fn resolution_outside_sensor_is_not_applied() {
        let sdk = FakeSdk::default();
        let err = control(&sdk).set_resolution(10, 0, 64, 48).unwrap_err();
        assert_eq!(err.code(), 1);
        assert!(!sdk.called("set_resolution"));
    }

    #[test]
    fn resolution_zero_size_is_not_applied() {
        let sdk = FakeSdk::default();
        assert_eq!(control(&sdk).set_resolution(0, 0, 0, 48).unwrap_err().code(), 1);
        assert!(!sdk.called("set_resolution"));
    }

    #[test]
    fn resolution_apply_failure_is_code_2() {
        let sdk = FakeSdk::new(Script {
            failing_sets: ["set_resolution"].into(),
            ..Script::default()
        });
        assert_eq!(control(&sdk).set_resolution(0, 0, 64, 48).unwrap_err().code(), 2);
    }

    #[test]
    fn unavailable_bin_mode_is_not_applied() {
        let sdk = FakeSdk::new(Script {
            unavailable: [Control::Bin2x2].into(),
            ..Script::default()
        });
        assert_eq!(control(&sdk).set_bin_mode(2, 2).unwrap_err().code(), 1);
        assert!(!sdk.called("set_bin_mode"));
    }

    #[test]
    fn asymmetric_bin_mode_is_unsupported() {
        let sdk = FakeSdk::default();
        assert_eq!(control(&sdk).set_bin_mode(1, 2).unwrap_err().code(), 1);
        assert!(sdk.calls().is_empty());
    }

    #[test]
    fn bin_mode_applies() {
        let sdk = FakeSdk::default();
        control(&sdk).set_bin_mode(2, 2).unwrap();
        assert_eq!(sdk.calls(), vec!["is_control_available", "set_bin_mode"]);
    }

    #[test]
    fn unavailable_bit_depth_is_not_applied() {
        let sdk = FakeSdk::new(Script {
            unavailable: [Control::Bits8].into(),
            ..Script::default()
        });
        assert_eq!(control(&sdk).set_bit_depth(8).unwrap_err().code(), 1);
        assert!(!sdk.called("set_bits_mode"));

        let sdk = FakeSdk::default();
        assert_eq!(control(&sdk).set_bit_depth(12).unwrap_err().code(), 1);
        assert!(!sdk.called("set_bits_mode"));
    }

    #[test]
    fn bit_depth_apply_failure_is_code_2() {
        let sdk = FakeSdk::new(Script {
            failing_sets: ["set_bits_mode"].into(),
            ..Script::default()
        });
        assert_eq!(control(&sdk).set_bit_depth(16).unwrap_err().code(), 2);
    }

    #[test]
    fn gain_apply_failure_returns_immediately() {
        let sdk = FakeSdk::new(Script {
            failing_sets: ["set_param"].into(),
            ..Script::default()
        });
        let err = control(&sdk).set_gain(30.0).unwrap_err();
        assert_eq!(err.code(), 2);
        assert!(matches!(
            err,
            ControlError::Apply {
                what: "gain",
                status: SdkStatus(QHYCCD_ERROR),
                ..
            }
        ));
    }

    #[test]
    fn offset_and_exposure_use_their_controls() {
        let sdk = FakeSdk::default();
        let c = control(&sdk);
        c.set_offset(40.0).unwrap();
        c.set_exposure_time(250_000.0).unwrap();
        assert_eq!(
            sdk.params(),
            vec![(Control::Offset, 40.0), (Control::Exposure, 250_000.0)]
        );
        assert_eq!(c.param(Control::Exposure), 250_000.0);
    }

    #[test]
    fn exposure_unavailable_is_code_1() {
        let sdk = FakeSdk::new(Script {
            unavailable: [Control::Exposure].into(),
            ..Script::default()
        });
        assert_eq!(control(&sdk).set_exposure_time(1.0).unwrap_err().code(), 1);
    }

    #[test]
    fn apply_uses_full_sensor_when_size_is_zero() {
        let sdk = FakeSdk::default();
        control(&sdk).apply(&ExposureSettings::default()).unwrap();
        assert_eq!(
            sdk.params(),
            vec![
                (Control::UsbTraffic, 10.0),
                (Control::Gain, 0.0),
                (Control::Offset, 0.0),
                (Control::Exposure, 1_000_000.0),
            ]
        );
        assert!(sdk.called("set_resolution"));
        assert!(sdk.called("set_bits_mode"));
    }

    #[test]
    fn apply_stops_at_first_failure() {
        let sdk = FakeSdk::new(Script {
            unavailable: [Control::Bin3x3].into(),
            ..Script::default()
        });
        let settings = ExposureSettings {
            bin_x: 3,
            bin_y: 3,
            ..ExposureSettings::default()
        };
        let err = control(&sdk).apply(&settings).unwrap_err();
        assert_eq!(err.code(), 31);
        assert!(!sdk.called("set_bits_mode"));
    }

    #[test]
    fn trigger_error_aborts_without_readout() {
        let sdk = FakeSdk::new(Script {
            trigger_status: QHYCCD_ERROR,
            ..Script::default()
        });
        let mut buf = frame_buf(&sdk);
        let err = control(&sdk).expose_single_frame(&mut buf).unwrap_err();
        assert_eq!(err.code(), 1);
        assert!(!sdk.called("get_single_frame"));
        assert_eq!(sleeps(), 0);
    }

    #[test]
    fn read_directly_skips_the_wait() {
        let sdk = FakeSdk::new(Script {
            trigger_status: QHYCCD_READ_DIRECTLY,
            ..Script::default()
        });
        let mut buf = frame_buf(&sdk);
        let info = control(&sdk).expose_single_frame(&mut buf).unwrap();
        assert_eq!(info.width, 64);
        assert_eq!(sleeps(), 0);
    }

    #[test]
    fn other_status_waits_exactly_once() {
        for status in [QHYCCD_SUCCESS, 0x2000, 7] {
            let sdk = FakeSdk::new(Script {
                trigger_status: status,
                ..Script::default()
            });
            let mut buf = frame_buf(&sdk);
            let c = control(&sdk);
            c.expose_single_frame(&mut buf).unwrap();
            assert_eq!(sleeps(), 1, "status {status:#x}");
            assert!(sdk.called("get_single_frame"));
        }
    }

    #[test]
    fn readout_failure_is_code_2() {
        let sdk = FakeSdk::new(Script {
            readout_ok: false,
            ..Script::default()
        });
        let mut buf = frame_buf(&sdk);
        assert_eq!(control(&sdk).expose_single_frame(&mut buf).unwrap_err().code(), 2);
    }

    #[test]
    fn short_buffer_is_rejected_before_trigger() {
        let sdk = FakeSdk::default();
        let mut buf = vec![0u8; 16];
        let err = control(&sdk).expose_single_frame(&mut buf).unwrap_err();
        assert_eq!(err.code(), 3);
        assert!(!sdk.called("exp_single_frame"));
    }

    #[test]
    fn zero_mem_length_is_rejected_before_trigger() {
        let sdk = FakeSdk::new(Script {
            frame: FrameInfo::default(),
            ..Script::default()
        });
        let c = control(&sdk);
        assert_eq!(c.frame_buffer_len(), None);
        let err = c.expose_single_frame(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, ExposureError::MemLength));
        assert_eq!(err.code(), 3);
        assert!(!sdk.called("exp_single_frame"));
        assert!(!sdk.called("get_single_frame"));
    }

    #[test]
    fn error_mem_length_is_not_a_size() {
        let sdk = FakeSdk::new(Script {
            mem_length: Some(QHYCCD_ERROR),
            ..Script::default()
        });
        let c = control(&sdk);
        assert_eq!(c.frame_buffer_len(), None);
        let mut buf = vec![0u8; 64 * 48 * 2];
        assert_eq!(c.expose_single_frame(&mut buf).unwrap_err().code(), 3);
        assert!(!sdk.called("exp_single_frame"));
    }

    #[test]
    fn firmware_version_is_decoded() {
        let sdk = FakeSdk::default();
        let fw = control(&sdk).firmware_version().unwrap();
        assert_eq!(fw.to_array(), [2019, 5, 21]);
    }

    #[test]
    fn missing_overscan_is_empty() {
        let sdk = FakeSdk::new(Script {
            overscan: None,
            ..Script::default()
        });
        assert_eq!(control(&sdk).overscan_area(), OverscanArea::default());
    }
}
