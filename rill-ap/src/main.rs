//! Rill audio player (rill-ap) - command line entry point
//!
//! Plays audio files through the streaming playback core and exits once
//! every Player has finished.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rill_ap::audio::{AudioOutput, Sound};
use rill_ap::AudioEngine;
use rill_common::{EngineConfig, UpdateMode};
use tracing::{info, warn};

/// How often the CLI checks whether playback has finished
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Command-line arguments for rill-ap
#[derive(Parser, Debug)]
#[command(name = "rill-ap")]
#[command(about = "Streaming audio playback core")]
#[command(version)]
struct Args {
    /// Configuration file (overrides RILL_CONFIG and the platform default)
    #[arg(short, long, global = true, env = "RILL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play one or more files at once
    Play {
        /// Audio files to play
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Loop every file until interrupted
        #[arg(short, long = "loop")]
        looping: bool,

        /// Stream through the buffer ring instead of decoding up front
        #[arg(short, long)]
        stream: bool,

        /// Fade-in time in seconds
        #[arg(long, default_value_t = 0.0)]
        fade_in: f32,

        /// Player gain (0.0 - 1.0)
        #[arg(long, default_value_t = 1.0)]
        volume: f32,

        /// Tick driver, overriding the configuration file
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// List output devices
    Devices,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Polling,
    DriverCallback,
}

impl From<ModeArg> for UpdateMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Polling => UpdateMode::Polling,
            ModeArg::DriverCallback => UpdateMode::DriverCallback,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = EngineConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    rill_common::logging::init(&config.log_level);

    match args.command {
        Command::Devices => {
            for name in AudioOutput::list_devices().context("Failed to list output devices")? {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Play {
            files,
            looping,
            stream,
            fade_in,
            volume,
            mode,
        } => {
            if let Some(mode) = mode {
                config.mode = mode.into();
            }
            play(config, &files, looping, stream, fade_in, volume)
        }
    }
}

fn play(config: EngineConfig, files: &[PathBuf], looping: bool, stream: bool, fade_in: f32, volume: f32) -> Result<()> {
    let mut engine = AudioEngine::start(config).context("Failed to start audio engine")?;
    let manager = engine.manager().clone();

    let mut started = 0;
    for path in files {
        let sound = match Sound::from_file(path, "music", stream) {
            Ok(sound) => Arc::new(sound),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let Some(id) = manager.create_player(&sound) else {
            warn!("No voice available for {}", path.display());
            continue;
        };
        manager.set_loop(id, looping)?;
        manager.set_gain(id, volume)?;
        manager.play(id, fade_in)?;
        info!("Playing {} as {}", path.display(), id);
        started += 1;
    }

    if started == 0 {
        anyhow::bail!("Nothing to play");
    }

    while manager.playing_count() > 0 {
        thread::sleep(POLL_INTERVAL);
    }

    info!("Playback finished");
    engine.shutdown();
    Ok(())
}
