//! The companion loop: watch the camera until sadness persists, then talk.
//!
//! Everything runs on the calling thread. While monitoring, each tick grabs
//! one frame, classifies it, feeds the dominant label to the
//! [`SadnessTracker`] and redraws the preview. Once the tracker fires, the
//! camera and preview are released and the loop switches to a spoken
//! conversation until the user says "stop".

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::assistant::{AssistantClient, ChatError};
use crate::pause::Pause;
use crate::speech::{is_stop_request, Heard, SpeechError, SpeechInput, SpeechOutput};
use crate::tracker::SadnessTracker;
use crate::vision::{
    dominant, CameraError, ClassifierError, EmotionClassifier, FrameSource, Overlay, Preview,
    PreviewError, PreviewEvent, SADNESS_CAPTION,
};

/// Spoken when the tracker fires
pub const INVITATION: &str = "I noticed you're feeling sad. Let's talk. Why are you feeling down?";

/// Spoken when audio was captured but not understood
pub const DIDNT_CATCH: &str = "Sorry, I didn't catch that. Could you repeat?";

/// Spoken when speech recognition itself failed
pub const SPEECH_SERVICE_ISSUE: &str = "There seems to be an issue with the speech service.";

/// Spoken when the user asks to stop
pub const GOODBYE: &str = "Okay, I'm here if you need to talk again.";

#[derive(Debug, Error)]
pub enum CompanionError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("Assistant failed: {0}")]
    Assistant(#[from] ChatError),

    #[error(transparent)]
    Preview(#[from] PreviewError),
}

/// What a frame without any detected face does to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoFacePolicy {
    /// Leave the accumulated time untouched
    Hold,
    /// Treat it like a non-sad frame
    Reset,
}

impl Default for NoFacePolicy {
    fn default() -> Self {
        Self::Hold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanionSettings {
    pub poll_interval: Duration,
    pub no_face: NoFacePolicy,
}

impl Default for CompanionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            no_face: NoFacePolicy::Hold,
        }
    }
}

/// Devices the companion drives
pub struct Collaborators {
    pub camera: Box<dyn FrameSource>,
    pub classifier: Box<dyn EmotionClassifier>,
    pub preview: Box<dyn Preview>,
    pub listener: Box<dyn SpeechInput>,
    pub voice: Box<dyn SpeechOutput>,
}

/// Counts reported when the run ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Sadness episodes that led to a conversation
    pub episodes: u32,
    /// User utterances answered by the assistant
    pub turns: u32,
}

enum Watch {
    Sad,
    Quit,
}

enum Talk {
    Resume,
    Quit,
}

pub struct Companion {
    devices: Collaborators,
    assistant: AssistantClient,
    tracker: SadnessTracker,
    settings: CompanionSettings,
    pause: Box<dyn Pause>,
    quit: Arc<AtomicBool>,
}

impl Companion {
    pub fn new(
        devices: Collaborators,
        assistant: AssistantClient,
        tracker: SadnessTracker,
        settings: CompanionSettings,
        pause: Box<dyn Pause>,
        quit: Arc<AtomicBool>,
    ) -> Self {
        Self {
            devices,
            assistant,
            tracker,
            settings,
            pause,
            quit,
        }
    }

    /// Monitor and converse until the user quits or a fatal error occurs.
    /// Devices are released on every exit path.
    pub fn run(&mut self) -> Result<RunSummary, CompanionError> {
        info!(
            "Watching for sadness (threshold {:.1}s, polling every {}ms)",
            self.tracker.threshold_seconds(),
            self.settings.poll_interval.as_millis()
        );

        let result = self.run_loop();

        self.devices.preview.close();
        self.devices.camera.release();
        result
    }

    pub fn tracker(&self) -> &SadnessTracker {
        &self.tracker
    }

    pub fn assistant(&self) -> &AssistantClient {
        &self.assistant
    }

    fn run_loop(&mut self) -> Result<RunSummary, CompanionError> {
        let mut summary = RunSummary::default();
        self.devices.camera.open()?;

        loop {
            match self.monitor()? {
                Watch::Quit => break,
                Watch::Sad => {}
            }

            summary.episodes += 1;
            info!("Sadness episode {} started", summary.episodes);
            match self.converse(&mut summary)? {
                Talk::Quit => break,
                Talk::Resume => {
                    self.devices.camera.open()?;
                    self.tracker.reset();
                    info!("Back to monitoring");
                }
            }
        }

        Ok(summary)
    }

    fn monitor(&mut self) -> Result<Watch, CompanionError> {
        let interval = self.settings.poll_interval.as_secs_f64();

        loop {
            if self.quit_requested() {
                return Ok(Watch::Quit);
            }

            let frame = self.devices.camera.grab()?;
            let samples = self.devices.classifier.classify(&frame)?;

            let overlay = match dominant(&samples) {
                Some(top) => {
                    let fired = self.tracker.observe(&top.label, interval);
                    debug!(
                        "Dominant {} (sad for {:.1}s)",
                        top.overlay_text(),
                        self.tracker.accumulated_seconds()
                    );
                    let overlay = Overlay::emotion(top.overlay_text());
                    if fired {
                        info!(
                            "Sadness persisted for {:.1}s",
                            self.tracker.accumulated_seconds()
                        );
                        let event = self
                            .devices
                            .preview
                            .show(&frame, &overlay.with_caption(SADNESS_CAPTION))?;
                        if event == PreviewEvent::Quit {
                            info!("Quit requested from preview");
                            return Ok(Watch::Quit);
                        }
                        return Ok(Watch::Sad);
                    }
                    overlay
                }
                None => {
                    if self.settings.no_face == NoFacePolicy::Reset {
                        self.tracker.reset();
                    }
                    Overlay::default()
                }
            };

            if self.devices.preview.show(&frame, &overlay)? == PreviewEvent::Quit {
                info!("Quit requested from preview");
                return Ok(Watch::Quit);
            }

            self.pause.pause(self.settings.poll_interval);
        }
    }

    fn converse(&mut self, summary: &mut RunSummary) -> Result<Talk, CompanionError> {
        self.assistant.begin_episode();
        self.speak(INVITATION);

        // The camera stays free while the microphone is in use
        self.devices.preview.close();
        self.devices.camera.release();

        loop {
            if self.quit_requested() {
                return Ok(Talk::Quit);
            }

            let text = match self.devices.listener.listen() {
                Ok(Heard::Text(text)) => text,
                Ok(Heard::Unintelligible) => {
                    debug!("Nothing intelligible in the last utterance");
                    self.speak(DIDNT_CATCH);
                    continue;
                }
                Err(SpeechError::Interrupted) if self.quit_requested() => {
                    return Ok(Talk::Quit);
                }
                Err(e) => {
                    warn!("Speech recognition failed: {}", e);
                    self.speak(SPEECH_SERVICE_ISSUE);
                    continue;
                }
            };
            println!("You: {}", text);

            if is_stop_request(&text) {
                self.speak(GOODBYE);
                return Ok(Talk::Resume);
            }

            let reply = self.assistant.send(&text)?;
            summary.turns += 1;
            if reply.is_fallback() {
                warn!("Assistant unavailable, answered with fallback");
            }
            self.speak(reply.text());
        }
    }

    /// Echo and speak. Synthesis failures are logged and otherwise ignored.
    fn speak(&mut self, text: &str) {
        println!("Companion: {}", text);
        if let Err(e) = self.devices.voice.say(text) {
            warn!("Speech output failed: {}", e);
        }
    }

    fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}
