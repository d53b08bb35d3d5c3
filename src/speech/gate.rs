use std::collections::VecDeque;
use tracing::{debug, trace};

/// Samples per millisecond at 16kHz
const SAMPLES_PER_MS: usize = 16;

/// End-of-utterance detection parameters
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Speech probability threshold (0.0 - 1.0)
    pub vad_threshold: f32,
    /// Audio kept from before speech onset
    pub pre_roll_samples: usize,
    /// Shorter bursts are treated as noise and dropped
    pub min_speech_samples: usize,
    /// Trailing silence that ends the utterance
    pub silence_to_flush_samples: usize,
    /// Hard cap on one utterance
    pub max_utterance_samples: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::from_ms(0.5, 300, 250, 500, 25000)
    }
}

impl GateConfig {
    pub fn from_ms(
        vad_threshold: f32,
        pre_roll_ms: u32,
        min_speech_ms: u32,
        silence_to_flush_ms: u32,
        max_utterance_ms: u32,
    ) -> Self {
        Self {
            vad_threshold,
            pre_roll_samples: pre_roll_ms as usize * SAMPLES_PER_MS,
            min_speech_samples: min_speech_ms as usize * SAMPLES_PER_MS,
            silence_to_flush_samples: silence_to_flush_ms as usize * SAMPLES_PER_MS,
            max_utterance_samples: max_utterance_ms as usize * SAMPLES_PER_MS,
        }
    }
}

/// Collects a single utterance from a stream of 16kHz VAD chunks.
///
/// Waits for speech, keeps a short pre-roll, and completes once enough
/// trailing silence follows or the utterance hits its length cap.
pub struct UtteranceGate {
    config: GateConfig,
    pre_roll: VecDeque<f32>,
    speech: Vec<f32>,
    speech_active: bool,
    silence_samples: usize,
}

impl UtteranceGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            pre_roll: VecDeque::with_capacity(config.pre_roll_samples),
            config,
            speech: Vec::new(),
            speech_active: false,
            silence_samples: 0,
        }
    }

    /// Feed one chunk with its speech probability. Returns the finished
    /// utterance once it ends.
    pub fn push(&mut self, chunk: &[f32], speech_prob: f32) -> Option<Vec<f32>> {
        let is_speech = speech_prob > self.config.vad_threshold;
        trace!(
            "Gate chunk: prob={:.2}, active={}, buffered={}",
            speech_prob,
            self.speech_active,
            self.speech.len()
        );

        let mut finished = None;
        match (self.speech_active, is_speech) {
            (false, true) => {
                self.speech_active = true;
                self.silence_samples = 0;
                self.speech.clear();
                self.speech.extend(self.pre_roll.iter());
                self.speech.extend_from_slice(chunk);
                debug!(
                    "Speech started ({}ms pre-roll)",
                    self.pre_roll.len() / SAMPLES_PER_MS
                );
            }
            (true, true) => {
                self.speech.extend_from_slice(chunk);
                self.silence_samples = 0;
            }
            (true, false) => {
                self.speech.extend_from_slice(chunk);
                self.silence_samples += chunk.len();
                if self.silence_samples >= self.config.silence_to_flush_samples {
                    finished = self.finish();
                }
            }
            (false, false) => {}
        }

        if finished.is_none()
            && self.speech_active
            && self.speech.len() >= self.config.max_utterance_samples
        {
            debug!("Max utterance length reached, ending capture");
            finished = self.finish();
        }

        self.pre_roll.extend(chunk.iter().copied());
        while self.pre_roll.len() > self.config.pre_roll_samples {
            self.pre_roll.pop_front();
        }

        finished
    }

    fn finish(&mut self) -> Option<Vec<f32>> {
        self.speech_active = false;
        self.silence_samples = 0;

        if self.speech.len() < self.config.min_speech_samples {
            debug!(
                "Ignoring short burst: {} samples (min: {})",
                self.speech.len(),
                self.config.min_speech_samples
            );
            self.speech.clear();
            return None;
        }

        debug!("Utterance complete: {}ms", self.speech.len() / SAMPLES_PER_MS);
        Some(std::mem::take(&mut self.speech))
    }

    pub fn is_speech_active(&self) -> bool {
        self.speech_active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: usize = 512;

    fn gate() -> UtteranceGate {
        UtteranceGate::new(GateConfig::from_ms(0.5, 64, 96, 96, 1000))
    }

    fn feed(gate: &mut UtteranceGate, probs: &[f32]) -> Option<Vec<f32>> {
        let chunk = vec![0.1f32; CHUNK];
        let mut out = None;
        for p in probs {
            if let Some(u) = gate.push(&chunk, *p) {
                out = Some(u);
            }
        }
        out
    }

    #[test]
    fn test_config_from_ms() {
        let config = GateConfig::from_ms(0.5, 300, 250, 500, 25000);
        assert_eq!(config.pre_roll_samples, 4800);
        assert_eq!(config.min_speech_samples, 4000);
        assert_eq!(config.silence_to_flush_samples, 8000);
        assert_eq!(config.max_utterance_samples, 400000);
    }

    #[test]
    fn test_silence_only_never_completes() {
        let mut gate = gate();
        assert!(feed(&mut gate, &[0.0; 50]).is_none());
        assert!(!gate.is_speech_active());
    }

    #[test]
    fn test_speech_then_silence_completes_with_pre_roll() {
        let mut gate = gate();
        // Silence fills the 64ms (1024 sample) pre-roll, then 3 speech chunks,
        // then 96ms (1536 samples = 3 chunks) of silence ends it.
        let utterance = feed(&mut gate, &[0.0, 0.0, 0.9, 0.9, 0.9, 0.1, 0.1, 0.1]).unwrap();
        assert_eq!(utterance.len(), 1024 + 3 * CHUNK + 3 * CHUNK);
    }

    #[test]
    fn test_short_burst_is_dropped() {
        let mut gate = UtteranceGate::new(GateConfig::from_ms(0.5, 0, 200, 32, 1000));
        // One 32ms speech chunk + 32ms silence is under 200ms
        assert!(feed(&mut gate, &[0.9, 0.0]).is_none());
        assert!(!gate.is_speech_active());
    }

    #[test]
    fn test_max_length_forces_completion() {
        let mut gate = UtteranceGate::new(GateConfig::from_ms(0.5, 0, 0, 500, 96));
        let utterance = feed(&mut gate, &[0.9; 3]).unwrap();
        assert_eq!(utterance.len(), 3 * CHUNK);
    }
}
