//! Spoken input and output.
//!
//! Both directions block the calling thread: listening returns once the
//! user stops talking, speaking returns once playback finishes.

pub mod gate;
pub mod listener;
pub mod voice;

pub use gate::{GateConfig, UtteranceGate};
pub use listener::{ListenerConfig, WhisperListener};
pub use voice::{SystemVoice, VoiceSettings};

use thiserror::Error;

/// Keyword that ends a conversation
pub const STOP_KEYWORD: &str = "stop";

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    /// Capture was abandoned because the process is shutting down
    #[error("Listening interrupted")]
    Interrupted,

    #[error("Speech recognition not compiled in (enable the `listen` feature)")]
    FeatureNotEnabled,
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("No speech synthesizer available: {0}")]
    Unavailable(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),
}

/// Result of one listening attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heard {
    Text(String),
    /// Audio was captured but nothing intelligible came out of it
    Unintelligible,
}

/// Microphone capture plus transcription
pub trait SpeechInput {
    /// Block until one utterance has been captured and transcribed
    fn listen(&mut self) -> Result<Heard, SpeechError>;
}

/// Text-to-speech
pub trait SpeechOutput {
    /// Speak `text`, returning when playback is done
    fn say(&mut self, text: &str) -> Result<(), VoiceError>;
}

/// Case-insensitive substring match on the stop keyword
pub fn is_stop_request(text: &str) -> bool {
    text.to_lowercase().contains(STOP_KEYWORD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_request_is_case_insensitive_substring() {
        assert!(is_stop_request("please stop now"));
        assert!(is_stop_request("STOP"));
        assert!(is_stop_request("Okay, Stop."));
        assert!(!is_stop_request("keep going"));
        assert!(!is_stop_request(""));
    }
}
