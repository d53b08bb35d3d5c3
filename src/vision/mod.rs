//! Camera frames, facial emotion classification, and the live preview.

pub mod camera;
pub mod classifier;
pub mod ferplus;
mod frame;
pub mod preview;

pub use camera::{CameraError, FrameSource, Webcam};
pub use classifier::{dominant, ClassifierError, EmotionClassifier, EmotionSample};
pub use ferplus::{FerPlusClassifier, FerPlusConfig};
pub use frame::Frame;
pub use preview::{ConsolePreview, Overlay, Preview, PreviewError, PreviewEvent, SADNESS_CAPTION};

#[cfg(feature = "window")]
pub use preview::WindowPreview;
