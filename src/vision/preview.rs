//! Live preview of the camera feed with the emotion overlay.

use thiserror::Error;

use super::Frame;

pub const WINDOW_TITLE: &str = "Emotion Detection";

/// Shown once when the sadness threshold is crossed
pub const SADNESS_CAPTION: &str = "I noticed you're feeling sad. Let's talk.";

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Failed to open preview window: {0}")]
    OpenFailed(String),

    #[error("Failed to draw frame: {0}")]
    DrawFailed(String),
}

/// Text drawn on top of the frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlay {
    /// `label: score` line for the dominant emotion
    pub emotion: Option<String>,
    pub caption: Option<String>,
}

impl Overlay {
    pub fn emotion(text: String) -> Self {
        Self {
            emotion: Some(text),
            caption: None,
        }
    }

    pub fn with_caption(mut self, caption: &str) -> Self {
        self.caption = Some(caption.to_string());
        self
    }

    /// Single-line rendering, used for titles and the console
    pub fn line(&self) -> String {
        match (&self.emotion, &self.caption) {
            (Some(e), Some(c)) => format!("{} | {}", e, c),
            (Some(e), None) => e.clone(),
            (None, Some(c)) => c.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Title bar text for the preview window. minifb cannot draw text, so the
/// overlay lives here instead of on the frame.
pub fn window_title(overlay: &Overlay) -> String {
    let line = overlay.line();
    if line.is_empty() {
        WINDOW_TITLE.to_string()
    } else {
        format!("{} - {}", WINDOW_TITLE, line)
    }
}

/// What the user did while the frame was shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewEvent {
    Continue,
    Quit,
}

pub trait Preview {
    fn show(&mut self, frame: &Frame, overlay: &Overlay) -> Result<PreviewEvent, PreviewError>;

    /// Tear down any window; the next `show` recreates it
    fn close(&mut self);
}

/// Headless preview: logs overlay changes instead of drawing
#[derive(Debug, Default)]
pub struct ConsolePreview {
    last_line: String,
}

impl Preview for ConsolePreview {
    fn show(&mut self, _frame: &Frame, overlay: &Overlay) -> Result<PreviewEvent, PreviewError> {
        let line = overlay.line();
        if line != self.last_line {
            if !line.is_empty() {
                println!("[{}] {}", WINDOW_TITLE, line);
            }
            self.last_line = line;
        }
        Ok(PreviewEvent::Continue)
    }

    fn close(&mut self) {
        self.last_line.clear();
    }
}

#[cfg(feature = "window")]
use minifb::{Key, Window, WindowOptions};

/// Native preview window. The overlay goes in the title bar; `q` or Escape
/// quits.
#[cfg(feature = "window")]
#[derive(Default)]
pub struct WindowPreview {
    window: Option<Window>,
    size: (usize, usize),
}

#[cfg(feature = "window")]
impl WindowPreview {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_window(&mut self, width: usize, height: usize) -> Result<&mut Window, PreviewError> {
        if self.size != (width, height) {
            self.window = None;
        }
        if self.window.is_none() {
            let window = Window::new(WINDOW_TITLE, width, height, WindowOptions::default())
                .map_err(|e| PreviewError::OpenFailed(e.to_string()))?;
            tracing::debug!("Preview window opened: {}x{}", width, height);
            self.window = Some(window);
            self.size = (width, height);
        }
        self.window
            .as_mut()
            .ok_or_else(|| PreviewError::OpenFailed("Window unavailable".to_string()))
    }
}

#[cfg(feature = "window")]
impl Preview for WindowPreview {
    fn show(&mut self, frame: &Frame, overlay: &Overlay) -> Result<PreviewEvent, PreviewError> {
        let (width, height) = (frame.width as usize, frame.height as usize);
        let window = self.ensure_window(width, height)?;

        window.set_title(&window_title(overlay));

        window
            .update_with_buffer(&frame.to_argb_words(), width, height)
            .map_err(|e| PreviewError::DrawFailed(e.to_string()))?;

        if !window.is_open() || window.is_key_down(Key::Q) || window.is_key_down(Key::Escape) {
            return Ok(PreviewEvent::Quit);
        }
        Ok(PreviewEvent::Continue)
    }

    fn close(&mut self) {
        if self.window.take().is_some() {
            tracing::debug!("Preview window closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_line() {
        let overlay = Overlay::emotion("sad: 0.91".to_string()).with_caption(SADNESS_CAPTION);
        assert_eq!(
            overlay.line(),
            "sad: 0.91 | I noticed you're feeling sad. Let's talk."
        );
        assert_eq!(Overlay::default().line(), "");
    }

    #[test]
    fn test_console_display_never_quits() {
        let mut display = ConsolePreview::default();
        let frame = Frame::filled(2, 2, 0);
        let event = display
            .show(&frame, &Overlay::emotion("happy: 0.50".to_string()))
            .unwrap();
        assert_eq!(event, PreviewEvent::Continue);
    }

    #[test]
    fn test_window_title_carries_overlay() {
        assert_eq!(window_title(&Overlay::default()), "Emotion Detection");
        let overlay = Overlay::emotion("sad: 0.91".to_string()).with_caption(SADNESS_CAPTION);
        assert_eq!(
            window_title(&overlay),
            format!("Emotion Detection - sad: 0.91 | {}", SADNESS_CAPTION)
        );
    }
}
