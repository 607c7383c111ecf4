use anyhow::Result;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use parlo::audio::capture::{CpalCaptureSource, list_devices, suppress_audio_warnings};
use parlo::audio::playback::{CpalPlaybackSink, PlaybackSink};
use parlo::channel::loopback::LoopbackConnector;
use parlo::cli::{Cli, Commands};
use parlo::config::Config;
use parlo::lang::{LANGUAGE_OPTIONS, default_voice};
use parlo::session::{SessionController, SessionDeps, SessionEvent};
use parlo::transcript::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Languages => {
            list_languages();
        }
        Commands::Check => {
            run_check(cli.config.as_deref())?;
        }
        Commands::Run {
            language,
            voice,
            device,
            duration,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run_session(
                config,
                language,
                voice,
                device,
                duration,
                cli.quiet,
                cli.verbose,
            )
            .await?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "parlo",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/parlo/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

/// List available audio input devices.
fn list_audio_devices() -> Result<()> {
    let devices = list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

/// List supported languages with their accents and default voices.
fn list_languages() {
    println!("Supported languages:");
    for language in LANGUAGE_OPTIONS {
        println!("{}", language.name.bold());
        for accent in language.accents {
            println!(
                "  {}-{}  {} (voice: {})",
                language.code, accent.code, accent.name, accent.voice
            );
        }
    }
}

/// Probe devices and validate the effective configuration.
fn run_check(custom_path: Option<&std::path::Path>) -> Result<()> {
    let config = load_config(custom_path)?;

    match list_devices() {
        Ok(devices) if devices.is_empty() => {
            println!("{} no audio input devices found", "✗".red());
        }
        Ok(devices) => {
            println!("{} {} audio input device(s)", "✓".green(), devices.len());
        }
        Err(e) => {
            println!("{} audio probe failed: {}", "✗".red(), e);
        }
    }

    let language = &config.session.language_accent;
    match default_voice(language) {
        Some(voice) => {
            println!("{} language {} (voice: {})", "✓".green(), language, voice);
        }
        None => {
            println!("{} unknown language-accent pair: {}", "✗".red(), language);
        }
    }

    if config.translation.api_key.is_some() {
        println!("{} translation API key configured", "✓".green());
    } else {
        println!(
            "{} no translation API key (set PARLO_API_KEY to enable translation)",
            "-".dimmed()
        );
    }

    Ok(())
}

/// Drive a timed session against the loopback transport, printing status
/// transitions and the final transcript.
async fn run_session(
    config: Config,
    language: Option<String>,
    voice: Option<String>,
    device: Option<String>,
    duration: u64,
    quiet: bool,
    verbose: u8,
) -> Result<()> {
    suppress_audio_warnings();

    let language = language.unwrap_or(config.session.language_accent);
    let voice = voice.or(config.session.voice);
    let device = device.or(config.audio.input_device);

    let deps = SessionDeps {
        connector: Arc::new(LoopbackConnector::new()),
        capture: Box::new(move || {
            Ok(Box::new(CpalCaptureSource::new(device.as_deref())?) as Box<dyn parlo::audio::capture::CaptureSource>)
        }),
        playback: Box::new(|completion_tx| {
            Ok(Box::new(CpalPlaybackSink::new(completion_tx)?) as Box<dyn PlaybackSink>)
        }),
        debounce: Duration::from_millis(config.session.processing_debounce_ms),
        frame_samples: config.audio.frame_samples,
    };

    let controller = SessionController::spawn(deps);
    let mut events = controller.subscribe();

    if !quiet {
        eprintln!("parlo: starting loopback session ({language}, {duration}s)");
        eprintln!("parlo: you should hear your own voice echoed back");
    }
    controller.start(&language, voice.as_deref()).await?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            event = events.recv() => match event {
                Ok(SessionEvent::StatusUpdated(status)) => {
                    if !quiet {
                        eprintln!("parlo: status {status}");
                    }
                }
                Ok(SessionEvent::TranscriptUpdated(messages)) => {
                    if verbose > 0 {
                        for message in &messages {
                            eprintln!("parlo:   [{}] {}", message.sender, message.text);
                        }
                    }
                }
                Ok(SessionEvent::Error(message)) => {
                    eprintln!("parlo: session error: {message}");
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    controller.stop().await?;
    let transcript = controller.transcript().await?;
    if !quiet {
        print_transcript(&transcript);
    }

    Ok(())
}

fn print_transcript(messages: &[Message]) {
    if messages.is_empty() {
        return;
    }
    println!("Transcript:");
    for message in messages {
        println!("  {} {}", format!("[{}]", message.sender).cyan(), message.text);
    }
}
