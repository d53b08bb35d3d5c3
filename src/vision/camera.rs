//! Webcam frame source.
//!
//! The camera is opened while monitoring and released before a conversation
//! so the device is never held while the microphone is in use.

use thiserror::Error;

use super::Frame;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Failed to open camera {index}: {reason}")]
    OpenFailed { index: u32, reason: String },

    #[error("Failed to read frame: {0}")]
    ReadFailed(String),

    #[error("Camera is not open")]
    NotOpen,

    #[error("Camera support not compiled in (enable the `camera` feature)")]
    FeatureNotEnabled,
}

/// Sequential frames from a video device
pub trait FrameSource {
    fn open(&mut self) -> Result<(), CameraError>;

    /// Next frame; any error here is fatal to monitoring
    fn grab(&mut self) -> Result<Frame, CameraError>;

    /// Give the device back to the system. Safe to call when closed.
    fn release(&mut self);
}

#[cfg(feature = "camera")]
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};

/// System webcam via nokhwa
#[cfg(feature = "camera")]
pub struct Webcam {
    index: u32,
    camera: Option<Camera>,
}

#[cfg(feature = "camera")]
impl Webcam {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            camera: None,
        }
    }
}

#[cfg(feature = "camera")]
impl FrameSource for Webcam {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.camera.is_some() {
            return Ok(());
        }

        let index = self.index;
        let open_failed = move |e: nokhwa::NokhwaError| CameraError::OpenFailed {
            index,
            reason: e.to_string(),
        };

        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera =
            Camera::new(CameraIndex::Index(self.index), requested).map_err(open_failed)?;
        camera.open_stream().map_err(open_failed)?;

        tracing::info!(
            "Camera {} opened: {:?}",
            self.index,
            camera.camera_format()
        );
        self.camera = Some(camera);
        Ok(())
    }

    fn grab(&mut self) -> Result<Frame, CameraError> {
        let camera = self.camera.as_mut().ok_or(CameraError::NotOpen)?;

        let buffer = camera
            .frame()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;

        let (width, height) = decoded.dimensions();
        Frame::from_rgb(width, height, decoded.into_raw())
            .ok_or_else(|| CameraError::ReadFailed("Decoded frame has wrong size".to_string()))
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                tracing::warn!("Failed to stop camera stream: {}", e);
            }
            tracing::info!("Camera {} released", self.index);
        }
    }
}

// Stub implementation when feature is not enabled
#[cfg(not(feature = "camera"))]
pub struct Webcam;

#[cfg(not(feature = "camera"))]
impl Webcam {
    pub fn new(_index: u32) -> Self {
        Self
    }
}

#[cfg(not(feature = "camera"))]
impl FrameSource for Webcam {
    fn open(&mut self) -> Result<(), CameraError> {
        Err(CameraError::FeatureNotEnabled)
    }

    fn grab(&mut self) -> Result<Frame, CameraError> {
        Err(CameraError::FeatureNotEnabled)
    }

    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "camera"))]
    #[test]
    fn test_stub_webcam() {
        let mut cam = Webcam::new(0);
        assert!(matches!(cam.open(), Err(CameraError::FeatureNotEnabled)));
        assert!(matches!(cam.grab(), Err(CameraError::FeatureNotEnabled)));
        cam.release();
    }

    #[test]
    fn test_open_error_message() {
        let err = CameraError::OpenFailed {
            index: 0,
            reason: "device busy".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to open camera 0: device busy");
    }
}
