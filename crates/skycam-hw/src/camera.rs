//! Owned SDK session and camera lifecycle.
//!
//! A `Session` owns initialized SDK resources; a `Camera` borrows the session
//! and owns one open handle. Dropping either releases what it owns, so a
//! camera can never outlive the resources it was opened under.

use std::ops::Deref;

use crate::config::SkycamConfig;
use crate::control::CameraControl;
use crate::discovery::acquire_camera_id;
use crate::error::{ConnectError, DiscoveryError, ExposureError};
use crate::frame::Frame;
use crate::sdk::{CameraId, QhySdk, SdkResult};

/// Initialized SDK resources.
pub struct Session<S: QhySdk> {
    sdk: S,
    config: SkycamConfig,
    released: bool,
}

impl<S: QhySdk> Session<S> {
    /// Initialize SDK resources and acquire the first usable camera id.
    ///
    /// Unlike `acquire_camera_id`, resources initialized before an empty scan
    /// are released here, since no session is returned to own them.
    pub fn discover(sdk: S, config: SkycamConfig) -> Result<(Self, CameraId), DiscoveryError> {
        let id = match acquire_camera_id(&sdk) {
            Ok(id) => id,
            Err(DiscoveryError::NoCamera) => {
                if let Err(status) = sdk.release_resource() {
                    tracing::warn!(%status, "SDK resource release failed");
                }
                return Err(DiscoveryError::NoCamera);
            }
            Err(e) => return Err(e),
        };
        let session = Self {
            sdk,
            config,
            released: false,
        };
        Ok((session, id))
    }

    pub fn sdk(&self) -> &S {
        &self.sdk
    }

    pub fn config(&self) -> &SkycamConfig {
        &self.config
    }

    /// Open the camera with the given id.
    pub fn connect(&self, id: &CameraId) -> Result<Camera<'_, S>, ConnectError> {
        let handle = self
            .sdk
            .open(id)
            .ok_or_else(|| ConnectError::Open(id.clone()))?;
        tracing::info!(camera = %id, "camera connected");
        Ok(Camera {
            control: CameraControl::new(&self.sdk, handle, &self.config),
            id: id.clone(),
            open: true,
        })
    }

    /// Release SDK resources, reporting the vendor status.
    pub fn release(mut self) -> SdkResult<()> {
        self.released = true;
        self.sdk.release_resource()
    }
}

impl<S: QhySdk> Drop for Session<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(status) = self.sdk.release_resource() {
            tracing::warn!(%status, "SDK resource release failed");
        }
    }
}

/// An open camera. Per-handle operations come from `CameraControl` via `Deref`.
pub struct Camera<'s, S: QhySdk> {
    control: CameraControl<'s, S>,
    id: CameraId,
    open: bool,
}

impl<'s, S: QhySdk> Camera<'s, S> {
    pub fn id(&self) -> &CameraId {
        &self.id
    }

    /// Expose one frame into a freshly allocated buffer.
    pub fn capture_frame(&self) -> Result<Frame, ExposureError> {
        let len = self
            .control
            .frame_buffer_len()
            .ok_or(ExposureError::MemLength)?;
        let mut buf = vec![0u8; len];
        let info = self.control.expose_single_frame(&mut buf)?;
        Frame::from_readout(buf, info).map_err(|e| {
            tracing::error!(error = %e, "frame layout does not match readout");
            ExposureError::Layout(e)
        })
    }

    /// Close the handle, reporting the vendor status.
    pub fn disconnect(mut self) -> SdkResult<()> {
        self.open = false;
        let result = self.control.sdk().close(self.control.handle());
        tracing::info!(camera = %self.id, "camera disconnected");
        result
    }
}

impl<'s, S: QhySdk> Deref for Camera<'s, S> {
    type Target = CameraControl<'s, S>;

    fn deref(&self) -> &Self::Target {
        &self.control
    }
}

impl<S: QhySdk> Drop for Camera<'_, S> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        if let Err(status) = self.control.sdk().close(self.control.handle()) {
            tracing::warn!(camera = %self.id, %status, "camera close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeSdk, Script};
    use crate::sdk::QHYCCD_READ_DIRECTLY;

    fn session(script: Script) -> (Session<FakeSdk>, CameraId) {
        let config = SkycamConfig {
            readout_delay_ms: 0,
            ..SkycamConfig::default()
        };
        Session::discover(FakeSdk::new(script), config).unwrap()
    }

    #[test]
    fn discover_without_cameras_fails() {
        let err = Session::discover(
            FakeSdk::new(Script {
                ids: vec![],
                ..Script::default()
            }),
            SkycamConfig::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), 2);
    }

    #[test]
    fn empty_scan_releases_resources() {
        let sdk = FakeSdk::new(Script {
            ids: vec![],
            ..Script::default()
        });
        let err = Session::discover(sdk.clone(), SkycamConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, DiscoveryError::NoCamera));
        assert_eq!(sdk.calls(), vec!["init_resource", "scan", "release_resource"]);
    }

    #[test]
    fn readout_layout_mismatch_is_reported() {
        let (session, id) = session(Script {
            // Frame info claims more bytes than the buffer the SDK asked for.
            mem_length: Some(16),
            trigger_status: QHYCCD_READ_DIRECTLY,
            ..Script::default()
        });
        let camera = session.connect(&id).unwrap();
        let err = camera.capture_frame().err().unwrap();
        assert!(matches!(err, ExposureError::Layout(_)));
        assert_eq!(err.code(), 2);
        let lengths = session.sdk().calls().iter().filter(|c| **c == "mem_length").count();
        assert_eq!(lengths, 2);
    }

    #[test]
    fn camera_lifecycle() {
        let (session, id) = session(Script {
            trigger_status: QHYCCD_READ_DIRECTLY,
            ..Script::default()
        });
        {
            let camera = session.connect(&id).unwrap();
            assert_eq!(camera.id(), &id);
            camera.initialize().unwrap();
            let chip = camera.chip_info().unwrap();
            assert_eq!(chip.image_width, 64);
            let frame = camera.capture_frame().unwrap();
            assert_eq!(frame.data.len(), 64 * 48 * 2);
            camera.disconnect().unwrap();
        }
        let calls = session.sdk().calls();
        assert_eq!(calls.iter().filter(|c| **c == "close").count(), 1);
        session.release().unwrap();
    }

    #[test]
    fn dropped_camera_is_closed() {
        let (session, id) = session(Script::default());
        drop(session.connect(&id).unwrap());
        assert!(session.sdk().called("close"));
    }

    #[test]
    fn connect_failure_reports_id() {
        let (session, id) = session(Script {
            open_ok: false,
            ..Script::default()
        });
        let err = session.connect(&id).err().unwrap();
        assert!(err.to_string().contains(id.as_str()));
    }
}
