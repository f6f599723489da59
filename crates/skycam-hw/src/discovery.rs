//! Camera discovery: initialize SDK resources and pick the first usable id.

use crate::error::DiscoveryError;
use crate::sdk::{CameraId, QhySdk};

/// Initialize SDK resources, scan, and return the first camera whose id
/// query succeeds. Remaining cameras are not queried.
///
/// Resources stay initialized when an id is returned; they are released only
/// when every candidate failed. With zero cameras nothing past the scan is
/// called.
pub fn acquire_camera_id<S: QhySdk + ?Sized>(sdk: &S) -> Result<CameraId, DiscoveryError> {
    sdk.init_resource().map_err(DiscoveryError::InitResource)?;

    let count = sdk.scan();
    if count == 0 {
        tracing::warn!("no QHYCCD camera found");
        return Err(DiscoveryError::NoCamera);
    }
    tracing::debug!(count, "cameras detected");

    for index in 0..count {
        match sdk.camera_id(index) {
            Ok(id) => {
                tracing::info!(index, camera = %id, "camera id acquired");
                return Ok(id);
            }
            Err(status) => {
                tracing::debug!(index, %status, "camera id query failed, skipping");
            }
        }
    }

    if let Err(status) = sdk.release_resource() {
        tracing::error!(%status, "no supported camera and SDK release failed");
        return Err(DiscoveryError::ReleaseResource(status));
    }
    Err(DiscoveryError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeSdk, Script};

    #[test]
    fn init_failure_is_code_1() {
        let sdk = FakeSdk::new(Script {
            init_ok: false,
            ..Script::default()
        });
        let err = acquire_camera_id(&sdk).unwrap_err();
        assert_eq!(err.code(), 1);
        assert_eq!(sdk.calls(), vec!["init_resource"]);
    }

    #[test]
    fn zero_cameras_stops_after_scan() {
        let sdk = FakeSdk::new(Script {
            ids: vec![],
            ..Script::default()
        });
        let err = acquire_camera_id(&sdk).unwrap_err();
        assert_eq!(err.code(), 2);
        assert_eq!(sdk.calls(), vec!["init_resource", "scan"]);
    }

    #[test]
    fn first_id_returns_without_release() {
        let sdk = FakeSdk::new(Script {
            ids: vec![Some("QHY183M-aa".into()), Some("QHY600M-bb".into())],
            ..Script::default()
        });
        let id = acquire_camera_id(&sdk).unwrap();
        assert_eq!(id.as_str(), "QHY183M-aa");
        assert_eq!(sdk.calls(), vec!["init_resource", "scan", "camera_id"]);
        assert!(!sdk.called("release_resource"));
    }

    #[test]
    fn failed_ids_are_skipped() {
        let sdk = FakeSdk::new(Script {
            ids: vec![None, Some("QHY294C-cc".into()), Some("QHY600M-dd".into())],
            ..Script::default()
        });
        let id = acquire_camera_id(&sdk).unwrap();
        assert_eq!(id.as_str(), "QHY294C-cc");
        assert_eq!(
            sdk.calls(),
            vec!["init_resource", "scan", "camera_id", "camera_id"]
        );
    }

    #[test]
    fn all_ids_failing_is_unsupported() {
        let sdk = FakeSdk::new(Script {
            ids: vec![None, None],
            ..Script::default()
        });
        let err = acquire_camera_id(&sdk).unwrap_err();
        assert!(matches!(err, DiscoveryError::Unsupported));
        assert_eq!(err.code(), 3);
        assert!(sdk.called("release_resource"));
    }

    #[test]
    fn all_ids_failing_with_release_failure_is_code_4() {
        let sdk = FakeSdk::new(Script {
            ids: vec![None],
            release_ok: false,
            ..Script::default()
        });
        let err = acquire_camera_id(&sdk).unwrap_err();
        assert_eq!(err.code(), 4);
    }
}
