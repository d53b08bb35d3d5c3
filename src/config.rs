use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::assistant::{GenerationSettings, MemoryScope, RetryPolicy, DEFAULT_MODEL, SUPPORT_PERSONA};
use crate::companion::{CompanionSettings, NoFacePolicy};
use crate::speech::{GateConfig, ListenerConfig, VoiceSettings};
use crate::vision::FerPlusConfig;

/// Environment variable holding the Gemini API key
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Default FER+ model file inside the models directory
pub const FERPLUS_MODEL_FILE: &str = "emotion-ferplus-8.onnx";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("Failed to get home directory")]
    NoHomeDir,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,

    // Monitoring
    pub camera_index: u32,
    pub threshold_seconds: f64,
    pub poll_interval_ms: u64,
    pub no_face: NoFacePolicy,
    pub show_window: bool,

    // Emotion model
    pub classifier_model_path: Option<PathBuf>,
    pub min_confidence: f32,

    // Assistant
    pub gemini_model: String,
    pub persona: String,
    pub generation: GenerationSettings,
    pub memory: MemoryScope,
    pub max_retries: u32,
    pub retry_delay_secs: u64,

    // Speech
    pub whisper_model: WhisperModelType,
    pub model_path: Option<PathBuf>,
    pub language: String,
    pub input_device_id: Option<String>,
    pub voice: VoiceSettings,

    // VAD tuning
    pub vad_threshold: f32,
    pub vad_pre_roll_ms: u32,
    pub min_speech_ms: u32,
    pub silence_to_flush_ms: u32,
    pub max_utterance_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            camera_index: 0,
            threshold_seconds: 1.0,
            poll_interval_ms: 500,
            no_face: NoFacePolicy::default(),
            show_window: true,
            classifier_model_path: None,
            min_confidence: 0.3,
            gemini_model: DEFAULT_MODEL.to_string(),
            persona: SUPPORT_PERSONA.to_string(),
            generation: GenerationSettings::default(),
            memory: MemoryScope::default(),
            max_retries: 5,
            retry_delay_secs: 10,
            whisper_model: WhisperModelType::Base,
            model_path: None,
            language: "en".to_string(),
            input_device_id: None,
            voice: VoiceSettings::default(),
            vad_threshold: 0.5,
            vad_pre_roll_ms: 300,
            min_speech_ms: 250,
            silence_to_flush_ms: 500,
            max_utterance_ms: 25000,
        }
    }
}

impl Config {
    /// Load config from file, or use defaults when it doesn't exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to file, creating its directory if needed
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)
    }

    pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".sad-companion"))
    }

    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::default_config_dir()?.join("config.json"))
    }

    pub fn default_models_dir() -> Result<PathBuf, ConfigError> {
        Ok(Self::default_config_dir()?.join("models"))
    }

    /// Whisper model file: explicit path or the named model in the models dir
    pub fn whisper_model_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.model_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::default_models_dir()?.join(self.whisper_model.filename())),
        }
    }

    pub fn classifier_model_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.classifier_model_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::default_models_dir()?.join(FERPLUS_MODEL_FILE)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    pub fn companion_settings(&self) -> CompanionSettings {
        CompanionSettings {
            poll_interval: self.poll_interval(),
            no_face: self.no_face,
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig::from_ms(
            self.vad_threshold,
            self.vad_pre_roll_ms,
            self.min_speech_ms,
            self.silence_to_flush_ms,
            self.max_utterance_ms,
        )
    }

    pub fn listener_config(&self) -> Result<ListenerConfig, ConfigError> {
        Ok(ListenerConfig {
            device_id: self.input_device_id.clone(),
            model_path: self.whisper_model_path()?,
            language: self.language.clone(),
            gate: self.gate_config(),
            ..ListenerConfig::default()
        })
    }

    pub fn ferplus_config(&self) -> Result<FerPlusConfig, ConfigError> {
        Ok(FerPlusConfig {
            model_path: self.classifier_model_path()?,
            min_confidence: self.min_confidence,
            ..FerPlusConfig::default()
        })
    }
}

/// Read the Gemini API key from the environment
pub fn api_key_from_env() -> Result<String, ConfigError> {
    api_key_from(std::env::var(API_KEY_VAR).ok())
}

/// Blank values count as missing
pub fn api_key_from(value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(ConfigError::MissingApiKey),
    }
}

/// Whisper model type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhisperModelType {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl Default for WhisperModelType {
    fn default() -> Self {
        Self::Base
    }
}

impl WhisperModelType {
    pub fn filename(&self) -> &'static str {
        match self {
            Self::Tiny => "ggml-tiny.en.bin",
            Self::Base => "ggml-base.en.bin",
            Self::Small => "ggml-small.en.bin",
            Self::Medium => "ggml-medium.en.bin",
            Self::Large => "ggml-large-v3.bin",
        }
    }
}

impl std::str::FromStr for WhisperModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(Self::Tiny),
            "base" => Ok(Self::Base),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            _ => Err(format!("Unknown model type: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.threshold_seconds, 1.0);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.no_face, NoFacePolicy::Hold);
        assert_eq!(config.memory, MemoryScope::Episode);
        assert_eq!(config.language, "en");
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = Config {
            max_retries: 3,
            retry_delay_secs: 2,
            ..Config::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.delay, Duration::from_secs(2));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.camera_index, 0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            camera_index: 2,
            threshold_seconds: 3.5,
            no_face: NoFacePolicy::Reset,
            memory: MemoryScope::Process,
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.camera_index, 2);
        assert_eq!(loaded.threshold_seconds, 3.5);
        assert_eq!(loaded.no_face, NoFacePolicy::Reset);
        assert_eq!(loaded.memory, MemoryScope::Process);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"threshold_seconds": 2.0, "no_face": "reset"}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.threshold_seconds, 2.0);
        assert_eq!(config.no_face, NoFacePolicy::Reset);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.generation.top_k, 64);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_explicit_model_paths_win() {
        let config = Config {
            model_path: Some(PathBuf::from("/tmp/whisper.bin")),
            classifier_model_path: Some(PathBuf::from("/tmp/fer.onnx")),
            ..Config::default()
        };
        assert_eq!(config.whisper_model_path().unwrap(), PathBuf::from("/tmp/whisper.bin"));
        assert_eq!(config.classifier_model_path().unwrap(), PathBuf::from("/tmp/fer.onnx"));
    }

    #[test]
    fn test_gate_config_from_vad_settings() {
        let gate = Config::default().gate_config();
        assert_eq!(gate.silence_to_flush_samples, 8000);
        assert_eq!(gate.max_utterance_samples, 400000);
    }

    #[test]
    fn test_api_key() {
        assert!(matches!(api_key_from(None), Err(ConfigError::MissingApiKey)));
        assert!(matches!(
            api_key_from(Some("   ".to_string())),
            Err(ConfigError::MissingApiKey)
        ));
        assert_eq!(api_key_from(Some(" abc ".to_string())).unwrap(), "abc");
    }

    #[test]
    fn test_model_type_parse() {
        assert_eq!("base".parse::<WhisperModelType>().unwrap(), WhisperModelType::Base);
        assert_eq!("TINY".parse::<WhisperModelType>().unwrap(), WhisperModelType::Tiny);
        assert!("huge".parse::<WhisperModelType>().is_err());
    }
}
