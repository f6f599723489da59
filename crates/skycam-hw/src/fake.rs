//! Scripted in-memory SDK that records every vendor call.

use std::collections::HashSet;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use crate::sdk::{
    CameraId, ChipInfo, Control, FrameInfo, OverscanArea, QhySdk, RawHandle, SdkResult,
    SdkStatus, StreamMode, FIRMWARE_BUF_LEN, QHYCCD_ERROR, QHYCCD_SUCCESS,
};
use crate::version::SdkVersion;

const FAIL: SdkStatus = SdkStatus(QHYCCD_ERROR);

/// Behaviour of a `FakeSdk`. Every field defaults to the happy path with one
/// 64x48 16-bit mono camera.
#[derive(Debug, Clone)]
pub struct Script {
    pub version: SdkVersion,
    pub init_ok: bool,
    pub release_ok: bool,
    /// One entry per attached camera; `None` makes the id query fail.
    pub ids: Vec<Option<String>>,
    pub open_ok: bool,
    pub stream_mode_ok: bool,
    pub init_camera_ok: bool,
    pub chip: Option<ChipInfo>,
    pub overscan: Option<OverscanArea>,
    pub firmware: Option<[u8; 2]>,
    pub unavailable: HashSet<Control>,
    /// Names of set_* calls that fail (`"set_param"`, `"set_resolution"`, ...).
    pub failing_sets: HashSet<&'static str>,
    pub trigger_status: u32,
    pub readout_ok: bool,
    pub frame: FrameInfo,
    /// Raw `GetQHYCCDMemLength` result; derived from `frame` when `None`.
    pub mem_length: Option<u32>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            version: SdkVersion {
                year: 24,
                month: 1,
                day: 9,
                subversion: 0,
            },
            init_ok: true,
            release_ok: true,
            ids: vec![Some("QHY5III178M-1a2b3c".to_string())],
            open_ok: true,
            stream_mode_ok: true,
            init_camera_ok: true,
            chip: Some(ChipInfo {
                chip_width_mm: 7.4,
                chip_height_mm: 5.0,
                image_width: 64,
                image_height: 48,
                pixel_width_um: 2.4,
                pixel_height_um: 2.4,
                bits_per_pixel: 16,
            }),
            overscan: Some(OverscanArea::default()),
            firmware: Some([0x35, 21]),
            unavailable: HashSet::new(),
            failing_sets: HashSet::new(),
            trigger_status: QHYCCD_SUCCESS,
            readout_ok: true,
            frame: FrameInfo {
                width: 64,
                height: 48,
                bits_per_pixel: 16,
                channels: 1,
            },
            mem_length: None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<&'static str>,
    params: Vec<(Control, f64)>,
}

/// In-memory `QhySdk` driven by a `Script`. Clones share one call log.
#[derive(Debug, Default, Clone)]
pub struct FakeSdk {
    pub script: Script,
    state: Arc<Mutex<State>>,
}

impl FakeSdk {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            state: Arc::default(),
        }
    }

    /// Handle the fake hands out. Only compared, never dereferenced.
    pub fn handle() -> RawHandle {
        RawHandle::from_ptr(NonNull::<c_void>::dangling().as_ptr())
            .unwrap_or_else(|| unreachable!("dangling pointer is non-null"))
    }

    /// Vendor calls in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn called(&self, name: &str) -> bool {
        self.lock().calls.iter().any(|c| *c == name)
    }

    /// Values written through `set_param`, in order.
    pub fn params(&self) -> Vec<(Control, f64)> {
        self.lock().params.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, name: &'static str) {
        self.lock().calls.push(name);
    }

    fn outcome(ok: bool) -> SdkResult<()> {
        if ok {
            Ok(())
        } else {
            Err(FAIL)
        }
    }

    fn set_outcome(&self, name: &'static str) -> SdkResult<()> {
        self.record(name);
        Self::outcome(!self.script.failing_sets.contains(name))
    }
}

impl QhySdk for FakeSdk {
    fn version(&self) -> SdkVersion {
        self.record("version");
        self.script.version
    }

    fn init_resource(&self) -> SdkResult<()> {
        self.record("init_resource");
        Self::outcome(self.script.init_ok)
    }

    fn release_resource(&self) -> SdkResult<()> {
        self.record("release_resource");
        Self::outcome(self.script.release_ok)
    }

    fn scan(&self) -> u32 {
        self.record("scan");
        self.script.ids.len() as u32
    }

    fn camera_id(&self, index: u32) -> SdkResult<CameraId> {
        self.record("camera_id");
        match self.script.ids.get(index as usize) {
            Some(Some(id)) => Ok(CameraId::new(id.clone())),
            _ => Err(FAIL),
        }
    }

    fn open(&self, _id: &CameraId) -> Option<RawHandle> {
        self.record("open");
        self.script.open_ok.then(Self::handle)
    }

    fn close(&self, _handle: RawHandle) -> SdkResult<()> {
        self.record("close");
        Ok(())
    }

    fn set_stream_mode(&self, _handle: RawHandle, _mode: StreamMode) -> SdkResult<()> {
        self.record("set_stream_mode");
        Self::outcome(self.script.stream_mode_ok)
    }

    fn init_camera(&self, _handle: RawHandle) -> SdkResult<()> {
        self.record("init_camera");
        Self::outcome(self.script.init_camera_ok)
    }

    fn chip_info(&self, _handle: RawHandle) -> SdkResult<ChipInfo> {
        self.record("chip_info");
        self.script.chip.ok_or(FAIL)
    }

    fn overscan_area(&self, _handle: RawHandle) -> SdkResult<OverscanArea> {
        self.record("overscan_area");
        self.script.overscan.ok_or(FAIL)
    }

    fn firmware_version(&self, _handle: RawHandle) -> SdkResult<[u8; FIRMWARE_BUF_LEN]> {
        self.record("firmware_version");
        let head = self.script.firmware.ok_or(FAIL)?;
        let mut buf = [0u8; FIRMWARE_BUF_LEN];
        buf[..2].copy_from_slice(&head);
        Ok(buf)
    }

    fn is_control_available(&self, _handle: RawHandle, control: Control) -> SdkResult<()> {
        self.record("is_control_available");
        Self::outcome(!self.script.unavailable.contains(&control))
    }

    fn set_param(&self, _handle: RawHandle, control: Control, value: f64) -> SdkResult<()> {
        let result = self.set_outcome("set_param");
        if result.is_ok() {
            self.lock().params.push((control, value));
        }
        result
    }

    fn get_param(&self, _handle: RawHandle, control: Control) -> f64 {
        self.record("get_param");
        self.lock()
            .params
            .iter()
            .rev()
            .find(|(c, _)| *c == control)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    }

    fn set_resolution(&self, _handle: RawHandle, _x: u32, _y: u32, _w: u32, _h: u32) -> SdkResult<()> {
        self.set_outcome("set_resolution")
    }

    fn set_bin_mode(&self, _handle: RawHandle, _bin_x: u32, _bin_y: u32) -> SdkResult<()> {
        self.set_outcome("set_bin_mode")
    }

    fn set_bits_mode(&self, _handle: RawHandle, _bits: u32) -> SdkResult<()> {
        self.set_outcome("set_bits_mode")
    }

    fn exp_single_frame(&self, _handle: RawHandle) -> u32 {
        self.record("exp_single_frame");
        self.script.trigger_status
    }

    fn get_single_frame(&self, _handle: RawHandle, buf: &mut [u8]) -> SdkResult<FrameInfo> {
        self.record("get_single_frame");
        if !self.script.readout_ok {
            return Err(FAIL);
        }
        for (i, b) in buf.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        Ok(self.script.frame)
    }

    fn mem_length(&self, _handle: RawHandle) -> u32 {
        self.record("mem_length");
        if let Some(len) = self.script.mem_length {
            return len;
        }
        let f = self.script.frame;
        f.width * f.height * f.bits_per_pixel.div_ceil(8) * f.channels
    }
}
