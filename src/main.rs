use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use sad_companion::assistant::{AssistantClient, GeminiBackend};
use sad_companion::config::{api_key_from_env, Config};
use sad_companion::pause::ThreadPause;
use sad_companion::speech::listener::list_input_devices;
use sad_companion::speech::{SystemVoice, WhisperListener};
use sad_companion::tracker::SadnessTracker;
use sad_companion::vision::{ConsolePreview, FerPlusClassifier, Preview, Webcam};
use sad_companion::{Collaborators, Companion};

/// Watches your webcam and offers to talk when you look sad for a while
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ~/.sad-companion/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera index
    #[arg(long)]
    camera: Option<u32>,

    /// Seconds of continuous sadness before starting a conversation
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Path to the Whisper model file (.bin)
    #[arg(long)]
    whisper_model: Option<PathBuf>,

    /// Path to the FER+ emotion model (.onnx)
    #[arg(long)]
    classifier_model: Option<PathBuf>,

    /// Input device name (run with --list-devices)
    #[arg(short, long)]
    device: Option<String>,

    /// Log emotions to the console instead of opening a preview window
    #[arg(long)]
    no_window: bool,

    /// List available input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    save_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    if args.list_devices {
        return list_devices_and_exit();
    }

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    apply_overrides(&mut config, &args);

    if args.save_config {
        config.save(&config_path)?;
        println!("Saved configuration to {:?}", config_path);
        return Ok(());
    }

    // Before touching any device
    let api_key = api_key_from_env().context("Export your Gemini API key as GEMINI_API_KEY")?;

    info!("Sad companion starting...");
    info!("Config: {:?}", config_path);
    info!("Camera: {}", config.camera_index);
    info!("Threshold: {:.1}s", config.threshold_seconds);
    info!("Model: {}", config.gemini_model);

    if !models_present(&config)? {
        return Ok(());
    }

    let quit = Arc::new(AtomicBool::new(false));

    // Ctrl+C handler on its own small runtime; the companion loop stays blocking
    let signals = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("Failed to start signal handler")?;
    let quit_ctrlc = quit.clone();
    signals.spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, stopping...");
        quit_ctrlc.store(true, Ordering::SeqCst);

        // A blocking HTTP call can outlast the first request
        tokio::signal::ctrl_c().await.ok();
        warn!("Received second Ctrl+C, exiting immediately");
        std::process::exit(130);
    });

    let backend = GeminiBackend::new(&api_key)?
        .with_model(&config.gemini_model)
        .with_persona(&config.persona)
        .with_generation(config.generation.clone());
    let assistant = AssistantClient::new(
        Box::new(backend),
        Box::new(ThreadPause),
        config.retry_policy(),
        config.memory,
    )
    .with_quit(quit.clone());

    info!("Loading emotion model...");
    let classifier = FerPlusClassifier::new(config.ferplus_config()?)
        .context("Failed to load emotion model")?;

    info!("Loading Whisper model...");
    let listener = WhisperListener::new(config.listener_config()?, quit.clone())
        .context("Failed to start speech recognition")?;

    let voice = SystemVoice::detect(config.voice.clone()).context("Failed to start speech output")?;

    let devices = Collaborators {
        camera: Box::new(Webcam::new(config.camera_index)),
        classifier: Box::new(classifier),
        preview: make_preview(config.show_window),
        listener: Box::new(listener),
        voice: Box::new(voice),
    };
    let mut companion = Companion::new(
        devices,
        assistant,
        SadnessTracker::new(config.threshold_seconds),
        config.companion_settings(),
        Box::new(ThreadPause),
        quit,
    );

    println!("\nWatching... Press Ctrl+C to stop (twice to force).\n");
    let summary = companion.run().context("Companion stopped")?;

    println!("\n--- Session Summary ---");
    println!("Episodes: {}", summary.episodes);
    println!("Turns: {}", summary.turns);

    let session = companion.assistant().session();
    if !session.is_empty() {
        println!("\n--- Last Conversation ---\n");
        println!("{}", session.timestamped_transcript());
    }

    drop(signals);
    info!("Session complete");
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(camera) = args.camera {
        config.camera_index = camera;
    }
    if let Some(threshold) = args.threshold {
        config.threshold_seconds = threshold;
    }
    if let Some(path) = &args.whisper_model {
        config.model_path = Some(path.clone());
    }
    if let Some(path) = &args.classifier_model {
        config.classifier_model_path = Some(path.clone());
    }
    if let Some(device) = &args.device {
        config.input_device_id = Some(device.clone());
    }
    if args.no_window {
        config.show_window = false;
    }
}

/// Print download hints for any missing model file
fn models_present(config: &Config) -> Result<bool> {
    let mut present = true;

    if cfg!(feature = "listen") {
        let whisper = config.whisper_model_path()?;
        if !whisper.exists() {
            report_missing(
                &whisper,
                "https://huggingface.co/ggerganov/whisper.cpp/tree/main",
                "--whisper-model",
            );
            present = false;
        }
    }

    if cfg!(feature = "ferplus") {
        let fer = config.classifier_model_path()?;
        if !fer.exists() {
            report_missing(
                &fer,
                "https://github.com/onnx/models/tree/main/validated/vision/body_analysis/emotion_ferplus",
                "--classifier-model",
            );
            present = false;
        }
    }

    Ok(present)
}

fn report_missing(path: &Path, source: &str, flag: &str) {
    error!("Model file not found: {:?}", path);
    eprintln!("\nModel file not found: {:?}", path);
    eprintln!("You can download it from:");
    eprintln!("  {}", source);
    eprintln!("Place it at the path above or pass {} /path/to/model", flag);
}

#[cfg(feature = "window")]
fn make_preview(show_window: bool) -> Box<dyn Preview> {
    if show_window {
        Box::new(sad_companion::vision::WindowPreview::new())
    } else {
        Box::new(ConsolePreview::default())
    }
}

#[cfg(not(feature = "window"))]
fn make_preview(show_window: bool) -> Box<dyn Preview> {
    if show_window {
        warn!("Preview window not compiled in (enable the `window` feature), using console output");
    }
    Box::new(ConsolePreview::default())
}

fn list_devices_and_exit() -> Result<()> {
    println!("Available input devices:\n");

    match list_input_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("  No input devices found.");
            } else {
                for device in devices {
                    let default_marker = if device.is_default { " (default)" } else { "" };
                    println!("  - {}{}", device.name, default_marker);
                }
            }
        }
        Err(e) => {
            error!("Failed to list devices: {}", e);
            println!("  Error: {}", e);
        }
    }

    Ok(())
}
