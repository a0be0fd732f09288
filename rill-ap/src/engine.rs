//! Audio engine
//!
//! Wires the software mixer, the playback manager, the cpal output and (in
//! polling mode) the update thread together.
//!
//! # Modes
//!
//! ```text
//! polling:          UpdateThread ─tick+mix─► output ring ─pop─► cpal callback
//! driver-callback:  cpal callback ─mix_audio (tick+mix+reap)─► device
//! ```
//!
//! A device that cannot be opened is a hard startup error; the caller may
//! then fall back to [`AudioEngine::disabled`], whose manager ignores every
//! playback call.

use crate::audio::output::AudioOutput;
use crate::error::{Error, Result};
use crate::playback::backend::SoftwareMixer;
use crate::playback::manager::PlaybackManager;
use crate::playback::update_thread::UpdateThread;
use ringbuf::traits::{Consumer, Split};
use ringbuf::HeapRb;
use rill_common::{EngineConfig, UpdateMode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, trace};

/// Output quanta buffered between the update thread and the device callback
const OUTPUT_RING_QUANTA: usize = 4;

/// Running audio engine
pub struct AudioEngine {
    manager: PlaybackManager<SoftwareMixer>,
    output: Option<AudioOutput>,
    update_thread: Option<UpdateThread>,
    config: EngineConfig,
    /// Callback blocks that found the output ring short (polling mode)
    underruns: Arc<AtomicU64>,
}

impl AudioEngine {
    /// Open the output device and start playback processing
    ///
    /// # Errors
    /// `Error::DeviceInit` when the device or its stream cannot be set up.
    pub fn start(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let mut output = AudioOutput::open(&config).map_err(|e| {
            error!("Audio device initialization failed: {}", e);
            e
        })?;

        // Mix at whatever format the device actually accepted
        let channels = output.channels();
        let sample_rate = output.sample_rate();
        let mixer = SoftwareMixer::new(config.voice_count, channels, sample_rate);
        let manager = PlaybackManager::new(mixer, &config);
        let underruns = Arc::new(AtomicU64::new(0));

        let quantum = config.buffer_frames as usize * channels as usize;
        let update_thread = match config.mode {
            UpdateMode::DriverCallback => {
                let callback_manager = manager.clone();
                output.start(move |data: &mut [f32]| callback_manager.mix_audio(data))?;
                None
            }
            UpdateMode::Polling => {
                let ring = HeapRb::<f32>::new(quantum * OUTPUT_RING_QUANTA);
                let (producer, mut consumer) = ring.split();
                let callback_underruns = Arc::clone(&underruns);

                output.start(move |data: &mut [f32]| {
                    let read = consumer.pop_slice(data);
                    if read < data.len() {
                        data[read..].fill(0.0);
                        let count = callback_underruns.fetch_add(1, Ordering::Relaxed) + 1;
                        if count % 1000 == 0 {
                            trace!("Output ring underrun (total: {})", count);
                        }
                    }
                })?;

                Some(UpdateThread::spawn_with_output(
                    manager.clone(),
                    producer,
                    config.update_interval(),
                    quantum,
                )?)
            }
        };

        info!(
            "Audio engine started ({:?} mode, {} voices, {} Hz, {} channels)",
            config.mode, config.voice_count, sample_rate, channels
        );

        Ok(Self {
            manager,
            output: Some(output),
            update_thread,
            config,
            underruns,
        })
    }

    /// Engine without an output device; every playback call is a no-op
    pub fn disabled(config: EngineConfig) -> Self {
        let mixer = SoftwareMixer::new(config.voice_count, config.channels, config.sample_rate);
        Self {
            manager: PlaybackManager::disabled(mixer, &config),
            output: None,
            update_thread: None,
            config,
            underruns: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start, or fall back to a disabled engine when the device fails
    pub fn start_or_disabled(config: EngineConfig) -> Self {
        match Self::start(config.clone()) {
            Ok(engine) => engine,
            Err(Error::DeviceInit(reason)) => {
                error!("Continuing without audio: {}", reason);
                Self::disabled(config)
            }
            Err(e) => {
                error!("Audio engine failed to start: {}, continuing without audio", e);
                Self::disabled(config)
            }
        }
    }

    /// Manager handle; clones share the engine's Players
    pub fn manager(&self) -> &PlaybackManager<SoftwareMixer> {
        &self.manager
    }

    pub fn is_enabled(&self) -> bool {
        self.manager.is_enabled()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Device callbacks that had to pad with silence
    pub fn output_underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn device_name(&self) -> Option<String> {
        self.output.as_ref().map(|o| o.device_name())
    }

    /// Stop every Player, the update thread and the output stream
    pub fn shutdown(&mut self) {
        self.manager.stop_all(0.0);
        if let Some(mut thread) = self.update_thread.take() {
            thread.shutdown();
        }
        if let Some(mut output) = self.output.take() {
            if let Err(e) = output.stop() {
                error!("Failed to stop output: {}", e);
            }
        }
        info!("Audio engine stopped");
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if self.output.is_some() || self.update_thread.is_some() {
            self.shutdown();
        }
    }
}
