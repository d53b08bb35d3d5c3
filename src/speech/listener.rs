//! Speech input: microphone capture, Silero VAD end-pointing, Whisper
//! transcription.
//!
//! Each `listen` call opens the input stream, waits for one utterance, closes
//! the stream, and transcribes the captured audio.

use std::path::PathBuf;
#[cfg(not(feature = "listen"))]
use std::sync::{atomic::AtomicBool, Arc};

use super::gate::GateConfig;
use super::{Heard, SpeechError, SpeechInput};

/// Configuration for the Whisper listener
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Input device name; `None` for the system default
    pub device_id: Option<String>,
    /// Path to the Whisper model file (.bin)
    pub model_path: PathBuf,
    /// Language code, or "auto"
    pub language: String,
    pub n_threads: i32,
    pub gate: GateConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            model_path: PathBuf::new(),
            language: "en".to_string(),
            n_threads: 4,
            gate: GateConfig::default(),
        }
    }
}

/// Audio input device information
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub name: String,
    pub is_default: bool,
}

/// Whisper emits bracketed markers like `[BLANK_AUDIO]` or `(music)` for
/// non-speech; those don't count as words.
fn is_non_speech_marker(segment: &str) -> bool {
    let bracketed = |open: char, close: char| segment.starts_with(open) && segment.ends_with(close);
    bracketed('[', ']') || bracketed('(', ')') || bracketed('*', '*')
}

/// Join transcribed segments, dropping empty and non-speech ones
pub fn clean_transcript<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_non_speech_marker(s))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a transcript to what the conversation loop sees
pub fn heard_from_transcript(text: String) -> Heard {
    if text.chars().any(char::is_alphanumeric) {
        Heard::Text(text)
    } else {
        Heard::Unintelligible
    }
}

#[cfg(feature = "listen")]
mod native {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Device, SampleFormat, Stream, StreamConfig};
    use ringbuf::traits::{Consumer, Observer, Producer, Split};
    use ringbuf::{HeapCons, HeapProd, HeapRb};
    use rubato::{FftFixedIn, Resampler};
    use tracing::{debug, error, info, warn};
    use voice_activity_detector::VoiceActivityDetector;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    use super::{clean_transcript, heard_from_transcript, AudioDevice, ListenerConfig};
    use crate::speech::gate::UtteranceGate;
    use crate::speech::{Heard, SpeechError};

    /// Sample rate for VAD and Whisper
    pub const TARGET_SAMPLE_RATE: u32 = 16000;

    /// VAD chunk size at 16kHz
    const VAD_CHUNK_SIZE: usize = 512;

    /// Seconds of device audio the ring buffer can hold
    const RING_SECONDS: usize = 30;

    pub fn list_input_devices() -> Result<Vec<AudioDevice>, SpeechError> {
        let host = cpal::default_host();
        let default_name = host
            .default_input_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_default();

        let devices = host
            .input_devices()
            .map_err(|e| SpeechError::Device(format!("Failed to enumerate input devices: {}", e)))?
            .filter_map(|d| d.name().ok())
            .map(|name| AudioDevice {
                is_default: name == default_name,
                name,
            })
            .collect();
        Ok(devices)
    }

    fn get_device(device_id: Option<&str>) -> Result<Device, SpeechError> {
        let host = cpal::default_host();
        match device_id {
            Some(id) if id != "default" => host
                .input_devices()
                .map_err(|e| SpeechError::Device(format!("Failed to enumerate devices: {}", e)))?
                .find(|d| d.name().map(|n| n == id).unwrap_or(false))
                .ok_or_else(|| SpeechError::Device(format!("Device not found: {}", id))),
            _ => host
                .default_input_device()
                .ok_or_else(|| SpeechError::Device("No default input device available".to_string())),
        }
    }

    /// Prefer a mono config, otherwise the default (first channel is used)
    fn select_input_config(device: &Device) -> Result<(StreamConfig, SampleFormat), SpeechError> {
        if let Ok(mut supported) = device.supported_input_configs() {
            if let Some(range) = supported.find(|r| r.channels() == 1) {
                let config = range.with_max_sample_rate();
                return Ok((config.config(), config.sample_format()));
            }
        }

        let config = device
            .default_input_config()
            .map_err(|e| SpeechError::Device(format!("No default input config: {}", e)))?;
        Ok((config.config(), config.sample_format()))
    }

    /// Push the first channel of each frame into the ring buffer
    fn push_first_channel<T: Copy>(
        data: &[T],
        channels: usize,
        producer: &mut HeapProd<f32>,
        overflow: &AtomicU64,
        convert: fn(T) -> f32,
    ) {
        for frame in data.chunks(channels.max(1)) {
            if producer.try_push(convert(frame[0])).is_err() {
                overflow.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    fn build_stream<T: cpal::SizedSample + Send + 'static>(
        device: &Device,
        config: &StreamConfig,
        mut producer: HeapProd<f32>,
        overflow: Arc<AtomicU64>,
        convert: fn(T) -> f32,
    ) -> Result<Stream, SpeechError> {
        let channels = config.channels as usize;
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    push_first_channel(data, channels, &mut producer, &overflow, convert);
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| SpeechError::Device(format!("Failed to build input stream: {}", e)))
    }

    /// Open input stream feeding a ring buffer
    struct Microphone {
        stream: Stream,
        consumer: HeapCons<f32>,
        sample_rate: u32,
        overflow: Arc<AtomicU64>,
    }

    impl Microphone {
        fn open(device: &Device) -> Result<Self, SpeechError> {
            let (config, format) = select_input_config(device)?;
            let sample_rate = config.sample_rate.0;
            let (producer, consumer) = HeapRb::<f32>::new(sample_rate as usize * RING_SECONDS).split();
            let overflow = Arc::new(AtomicU64::new(0));

            debug!(
                "Opening microphone: {} Hz, {} channels, format {:?}",
                sample_rate, config.channels, format
            );

            let stream = match format {
                SampleFormat::F32 => {
                    build_stream::<f32>(device, &config, producer, overflow.clone(), |s| s)
                }
                SampleFormat::I16 => build_stream::<i16>(device, &config, producer, overflow.clone(), |s| {
                    s as f32 / 32768.0
                }),
                SampleFormat::U8 => build_stream::<u8>(device, &config, producer, overflow.clone(), |s| {
                    (s as f32 - 128.0) / 128.0
                }),
                other => {
                    return Err(SpeechError::Device(format!(
                        "Unsupported sample format: {:?}",
                        other
                    )))
                }
            }?;

            stream
                .play()
                .map_err(|e| SpeechError::Device(format!("Failed to start audio stream: {}", e)))?;

            Ok(Self {
                stream,
                consumer,
                sample_rate,
                overflow,
            })
        }

        fn stop(&self) {
            if let Err(e) = self.stream.pause() {
                warn!("Failed to stop audio stream: {}", e);
            }
            let overflows = self.overflow.load(Ordering::Relaxed);
            if overflows > 0 {
                warn!("Audio overflows during capture: {}", overflows);
            }
        }
    }

    /// Converts device-rate mono audio to 16kHz
    struct Resampler16k {
        inner: Option<FftFixedIn<f32>>,
        input: Vec<Vec<f32>>,
        output: Vec<Vec<f32>>,
        frames: usize,
    }

    impl Resampler16k {
        fn new(device_sample_rate: u32) -> Result<Self, SpeechError> {
            const INPUT_FRAMES: usize = 1024;

            if device_sample_rate == TARGET_SAMPLE_RATE {
                return Ok(Self {
                    inner: None,
                    input: Vec::new(),
                    output: Vec::new(),
                    frames: VAD_CHUNK_SIZE,
                });
            }

            let inner = FftFixedIn::<f32>::new(
                device_sample_rate as usize,
                TARGET_SAMPLE_RATE as usize,
                INPUT_FRAMES,
                2,
                1,
            )
            .map_err(|e| SpeechError::Device(format!("Failed to create resampler: {}", e)))?;
            let output = inner.output_buffer_allocate(true);

            Ok(Self {
                inner: Some(inner),
                input: vec![vec![0.0; INPUT_FRAMES]],
                output,
                frames: INPUT_FRAMES,
            })
        }

        fn input_frames(&self) -> usize {
            self.frames
        }

        fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>, SpeechError> {
            let Some(inner) = self.inner.as_mut() else {
                return Ok(samples.to_vec());
            };

            self.input[0].copy_from_slice(samples);
            let (_, written) = inner
                .process_into_buffer(&self.input, &mut self.output, None)
                .map_err(|e| SpeechError::Device(format!("Resampling failed: {}", e)))?;
            Ok(self.output[0][..written].to_vec())
        }
    }

    /// Microphone + VAD + Whisper [`SpeechInput`](crate::speech::SpeechInput)
    pub struct WhisperListener {
        ctx: WhisperContext,
        config: ListenerConfig,
        quit: Arc<AtomicBool>,
    }

    impl WhisperListener {
        pub fn new(config: ListenerConfig, quit: Arc<AtomicBool>) -> Result<Self, SpeechError> {
            if !config.model_path.exists() {
                return Err(SpeechError::Recognition(format!(
                    "Whisper model not found: {:?}",
                    config.model_path
                )));
            }

            info!("Loading Whisper model from {:?}", config.model_path);
            let path = config
                .model_path
                .to_str()
                .ok_or_else(|| SpeechError::Recognition("Invalid model path".to_string()))?;
            let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
                .map_err(|e| SpeechError::Recognition(format!("Failed to load Whisper model: {}", e)))?;
            info!("Whisper model loaded");

            Ok(Self { ctx, config, quit })
        }

        fn capture_utterance(&self) -> Result<Vec<f32>, SpeechError> {
            let device = get_device(self.config.device_id.as_deref())?;
            let mut mic = Microphone::open(&device)?;
            let mut resampler = Resampler16k::new(mic.sample_rate)?;
            let mut vad = VoiceActivityDetector::builder()
                .sample_rate(16000)
                .chunk_size(VAD_CHUNK_SIZE)
                .build()
                .map_err(|e| SpeechError::Device(format!("Failed to create VAD: {:?}", e)))?;
            let mut gate = UtteranceGate::new(self.config.gate.clone());

            let mut staging: Vec<f32> = Vec::with_capacity(VAD_CHUNK_SIZE * 2);
            let mut input = vec![0.0f32; resampler.input_frames()];

            println!("Listening...");
            loop {
                if self.quit.load(Ordering::Relaxed) {
                    mic.stop();
                    return Err(SpeechError::Interrupted);
                }

                if mic.consumer.occupied_len() < input.len() {
                    std::thread::sleep(Duration::from_millis(5));
                    continue;
                }
                let read = mic.consumer.pop_slice(&mut input);
                if read < input.len() {
                    continue;
                }

                staging.extend(resampler.process(&input)?);
                while staging.len() >= VAD_CHUNK_SIZE {
                    let chunk: Vec<f32> = staging.drain(..VAD_CHUNK_SIZE).collect();
                    let prob = vad.predict(chunk.iter().copied());
                    if let Some(audio) = gate.push(&chunk, prob) {
                        mic.stop();
                        return Ok(audio);
                    }
                }
            }
        }

        fn transcribe(&self, audio: &[f32]) -> Result<String, SpeechError> {
            let started = std::time::Instant::now();

            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_n_threads(self.config.n_threads);
            params.set_print_special(false);
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_print_timestamps(false);
            if self.config.language != "auto" {
                params.set_language(Some(self.config.language.as_str()));
            }

            let mut state = self
                .ctx
                .create_state()
                .map_err(|e| SpeechError::Recognition(format!("Failed to create Whisper state: {}", e)))?;
            state
                .full(params, audio)
                .map_err(|e| SpeechError::Recognition(format!("Whisper inference failed: {}", e)))?;

            let n_segments = state
                .full_n_segments()
                .map_err(|e| SpeechError::Recognition(format!("Failed to get segment count: {}", e)))?;
            let segments: Vec<String> = (0..n_segments)
                .filter_map(|i| state.full_get_segment_text(i).ok())
                .collect();
            let text = clean_transcript(segments.iter().map(String::as_str));

            debug!(
                "Transcribed {:.1}s of audio in {:?}: \"{}\"",
                audio.len() as f32 / TARGET_SAMPLE_RATE as f32,
                started.elapsed(),
                text
            );
            Ok(text)
        }

        pub(super) fn listen_once(&mut self) -> Result<Heard, SpeechError> {
            let audio = self.capture_utterance()?;
            let text = self.transcribe(&audio)?;
            Ok(heard_from_transcript(text))
        }
    }
}

#[cfg(feature = "listen")]
pub use native::{list_input_devices, WhisperListener, TARGET_SAMPLE_RATE};

#[cfg(feature = "listen")]
impl SpeechInput for WhisperListener {
    fn listen(&mut self) -> Result<Heard, SpeechError> {
        self.listen_once()
    }
}

// Stub implementation when feature is not enabled
#[cfg(not(feature = "listen"))]
pub struct WhisperListener;

#[cfg(not(feature = "listen"))]
impl WhisperListener {
    pub fn new(_config: ListenerConfig, _quit: Arc<AtomicBool>) -> Result<Self, SpeechError> {
        Err(SpeechError::FeatureNotEnabled)
    }
}

#[cfg(not(feature = "listen"))]
impl SpeechInput for WhisperListener {
    fn listen(&mut self) -> Result<Heard, SpeechError> {
        Err(SpeechError::FeatureNotEnabled)
    }
}

#[cfg(not(feature = "listen"))]
pub fn list_input_devices() -> Result<Vec<AudioDevice>, SpeechError> {
    Err(SpeechError::FeatureNotEnabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_transcript_drops_markers() {
        let text = clean_transcript(["  I feel tired ", "[BLANK_AUDIO]", "(music)", "today."]);
        assert_eq!(text, "I feel tired today.");
    }

    #[test]
    fn test_blank_audio_is_unintelligible() {
        let text = clean_transcript(["[BLANK_AUDIO]"]);
        assert_eq!(heard_from_transcript(text), Heard::Unintelligible);
        assert_eq!(heard_from_transcript(" ... ".to_string()), Heard::Unintelligible);
    }

    #[test]
    fn test_words_are_heard() {
        assert_eq!(
            heard_from_transcript("stop".to_string()),
            Heard::Text("stop".to_string())
        );
    }

    #[test]
    fn test_default_config() {
        let config = ListenerConfig::default();
        assert_eq!(config.language, "en");
        assert_eq!(config.gate.silence_to_flush_samples, 8000);
    }

    #[cfg(not(feature = "listen"))]
    #[test]
    fn test_stub_listener() {
        let result = WhisperListener::new(ListenerConfig::default(), Arc::default());
        assert!(matches!(result, Err(SpeechError::FeatureNotEnabled)));
    }
}
