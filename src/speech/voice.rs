//! Speech output through the platform synthesizer (`say` on macOS,
//! `espeak-ng` elsewhere). Playback blocks until the utterance is finished.

use serde::{Deserialize, Serialize};
use std::process::Command;
use tracing::{debug, info, warn};

use super::{SpeechOutput, VoiceError};

/// macOS voices that are female but don't say so in their name
const KNOWN_FEMALE_VOICES: [&str; 8] = [
    "samantha", "victoria", "karen", "moira", "tessa", "fiona", "allison", "ava",
];

/// Voice preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Prefer a voice labeled female when one is installed
    pub prefer_female: bool,
    /// Words per minute
    pub rate: u32,
    /// 0.0 - 1.0
    pub volume: f32,
    /// Explicit voice name; skips detection
    pub voice: Option<String>,
    /// Language used to build espeak-ng voice names
    pub language: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            prefer_female: true,
            rate: 145,
            volume: 1.0,
            voice: None,
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Say,
    Espeak,
}

/// One installed voice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub name: String,
    /// What to pass to the synthesizer to select it
    pub id: String,
    pub female: bool,
}

/// Parse `espeak-ng --voices=variant`:
/// `Pty Language Age/Gender VoiceName File Other Languages`
pub fn parse_espeak_voices(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 {
                return None;
            }
            let gender = cols[2].rsplit('/').next().unwrap_or("");
            let name = cols[3].replace('_', " ");
            let id = cols[4].trim_start_matches("!v/").to_string();
            Some(VoiceInfo {
                female: gender.eq_ignore_ascii_case("f") || name.to_lowercase().contains("female"),
                name,
                id,
            })
        })
        .collect()
}

/// Parse `say -v ?`: `Name   locale   # sample sentence`
pub fn parse_say_voices(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim_end();
            // Names may contain spaces; the locale is the last column
            let (name, _locale) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let lower = name.to_lowercase();
            let female = lower.contains("female")
                || KNOWN_FEMALE_VOICES
                    .iter()
                    .any(|v| lower.split_whitespace().next() == Some(*v));
            Some(VoiceInfo {
                name: name.to_string(),
                id: name.to_string(),
                female,
            })
        })
        .collect()
}

/// First female-labeled voice, if any
pub fn pick_female(voices: &[VoiceInfo]) -> Option<&VoiceInfo> {
    voices.iter().find(|v| v.female)
}

/// Platform command-line synthesizer
#[derive(Debug, Clone)]
pub struct SystemVoice {
    engine: Engine,
    program: String,
    voice: Option<String>,
    settings: VoiceSettings,
}

impl SystemVoice {
    /// Find the platform synthesizer and pick a voice
    pub fn detect(settings: VoiceSettings) -> Result<Self, VoiceError> {
        let (engine, program) = Self::find_program()?;
        let mut voice = Self {
            engine,
            program,
            voice: None,
            settings,
        };

        voice.voice = match voice.settings.voice.clone() {
            Some(explicit) => Some(explicit),
            None if voice.settings.prefer_female => voice.find_female_voice(),
            None => None,
        };

        info!(
            "Speech output: {} (voice: {}, rate: {})",
            voice.program,
            voice.voice.as_deref().unwrap_or("default"),
            voice.settings.rate
        );
        Ok(voice)
    }

    pub fn new(engine: Engine, program: &str, voice: Option<String>, settings: VoiceSettings) -> Self {
        Self {
            engine,
            program: program.to_string(),
            voice,
            settings,
        }
    }

    fn find_program() -> Result<(Engine, String), VoiceError> {
        let candidates: &[(Engine, &str)] = if cfg!(target_os = "macos") {
            &[(Engine::Say, "say"), (Engine::Espeak, "espeak-ng")]
        } else {
            &[(Engine::Espeak, "espeak-ng"), (Engine::Espeak, "espeak")]
        };

        for (engine, program) in candidates {
            let check = match engine {
                Engine::Say => Command::new(program).args(["-v", "?"]).output(),
                Engine::Espeak => Command::new(program).arg("--version").output(),
            };
            if check.map(|o| o.status.success()).unwrap_or(false) {
                return Ok((*engine, program.to_string()));
            }
            debug!("Speech synthesizer '{}' not available", program);
        }

        Err(VoiceError::Unavailable(
            "install espeak-ng (or use macOS `say`)".to_string(),
        ))
    }

    fn find_female_voice(&self) -> Option<String> {
        let listing = match self.engine {
            Engine::Say => Command::new(&self.program).args(["-v", "?"]).output(),
            Engine::Espeak => Command::new(&self.program).arg("--voices=variant").output(),
        };
        let listing = match listing {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).into_owned(),
            Ok(out) => {
                warn!("Voice listing exited with {}", out.status);
                return None;
            }
            Err(e) => {
                warn!("Failed to list voices: {}", e);
                return None;
            }
        };

        let voices = match self.engine {
            Engine::Say => parse_say_voices(&listing),
            Engine::Espeak => parse_espeak_voices(&listing),
        };

        let picked = pick_female(&voices)?;
        debug!("Picked female voice '{}'", picked.name);
        Some(match self.engine {
            Engine::Say => picked.id.clone(),
            // espeak-ng variants attach to a language: en+f3
            Engine::Espeak => format!("{}+{}", self.settings.language, picked.id),
        })
    }

    /// Command-line arguments for speaking `text`
    pub fn args(&self, text: &str) -> Vec<String> {
        let mut args = Vec::new();
        match self.engine {
            Engine::Say => {
                if let Some(v) = &self.voice {
                    args.extend(["-v".to_string(), v.clone()]);
                }
                args.extend(["-r".to_string(), self.settings.rate.to_string()]);
            }
            Engine::Espeak => {
                let voice = self
                    .voice
                    .clone()
                    .unwrap_or_else(|| self.settings.language.clone());
                // Amplitude 0-200, 100 is the synthesizer's normal level
                let amplitude = (self.settings.volume.clamp(0.0, 2.0) * 100.0).round() as u32;
                args.extend([
                    "-v".to_string(),
                    voice,
                    "-s".to_string(),
                    self.settings.rate.to_string(),
                    "-a".to_string(),
                    amplitude.to_string(),
                ]);
            }
        }
        args.push("--".to_string());
        args.push(text.to_string());
        args
    }
}

impl SpeechOutput for SystemVoice {
    fn say(&mut self, text: &str) -> Result<(), VoiceError> {
        if text.trim().is_empty() {
            return Ok(());
        }

        let status = Command::new(&self.program)
            .args(self.args(text))
            .status()
            .map_err(|e| VoiceError::SynthesisFailed(format!("Failed to run {}: {}", self.program, e)))?;

        if !status.success() {
            return Err(VoiceError::SynthesisFailed(format!(
                "{} exited with {}",
                self.program, status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESPEAK_VARIANTS: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  variant         --/M      Alex               !v/Alex
 5  variant         --/F      Annie              !v/Annie
 5  variant         --/F      female3            !v/f3
";

    const SAY_VOICES: &str = "\
Alex                en_US    # Most people recognize me by my voice.
Daniel              en_GB    # Hello, my name is Daniel.
Samantha            en_US    # Hello, my name is Samantha.
Bad News            en_US    # The light you see at the end of the tunnel.
";

    #[test]
    fn test_parse_espeak_variants() {
        let voices = parse_espeak_voices(ESPEAK_VARIANTS);
        assert_eq!(voices.len(), 3);
        assert!(!voices[0].female);
        assert_eq!(voices[1].id, "Annie");
        assert!(voices[1].female);
        assert_eq!(pick_female(&voices).unwrap().name, "Annie");
    }

    #[test]
    fn test_parse_say_voices() {
        let voices = parse_say_voices(SAY_VOICES);
        assert_eq!(voices.len(), 4);
        assert_eq!(voices[3].name, "Bad News");
        assert_eq!(pick_female(&voices).unwrap().name, "Samantha");
    }

    #[test]
    fn test_no_female_voice() {
        let voices = parse_say_voices("Alex   en_US   # hi\n");
        assert!(pick_female(&voices).is_none());
    }

    #[test]
    fn test_espeak_args() {
        let voice = SystemVoice::new(
            Engine::Espeak,
            "espeak-ng",
            Some("en+f3".to_string()),
            VoiceSettings::default(),
        );
        assert_eq!(
            voice.args("Hello there"),
            vec!["-v", "en+f3", "-s", "145", "-a", "100", "--", "Hello there"]
        );
    }

    #[test]
    fn test_say_args_without_voice() {
        let voice = SystemVoice::new(Engine::Say, "say", None, VoiceSettings::default());
        assert_eq!(voice.args("Hi"), vec!["-r", "145", "--", "Hi"]);
    }

    #[test]
    fn test_default_settings() {
        let settings = VoiceSettings::default();
        assert_eq!(settings.rate, 145);
        assert_eq!(settings.volume, 1.0);
        assert!(settings.prefer_female);
    }
}
