//! Audio output using cpal
//!
//! Opens an output device and runs a stream whose callback pulls blocks of
//! interleaved f32 samples. Devices that only accept integer samples get the
//! block converted on the way out.

use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use rill_common::EngineConfig;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Audio output stream on one device
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    /// Stream errors reported by the driver
    error_count: Arc<AtomicU32>,
}

impl AudioOutput {
    /// List available audio output devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the configured device for output.
    ///
    /// Falls back to the default device when the named one is missing.
    ///
    /// # Errors
    /// `Error::DeviceInit` when no usable device or configuration exists.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = match config.device_name.as_ref() {
            Some(name) => {
                let mut devices = host
                    .output_devices()
                    .map_err(|e| Error::DeviceInit(format!("Failed to enumerate devices: {}", e)))?;

                match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                    Some(dev) => {
                        info!("Found requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!("Requested device '{}' not found, falling back to default device", name);
                        host.default_output_device().ok_or_else(|| {
                            Error::DeviceInit(format!("Device '{}' not found and no default device available", name))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::DeviceInit("No default output device found".to_string()))?,
        };

        let (mut stream_config, sample_format) = Self::best_config(&device, config)?;
        stream_config.buffer_size = cpal::BufferSize::Fixed(config.buffer_frames);

        info!(
            "Using audio device '{}': {} Hz, {} channels, {:?}, {} frame buffer",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            stream_config.sample_rate.0,
            stream_config.channels,
            sample_format,
            config.buffer_frames
        );

        Ok(Self {
            device,
            config: stream_config,
            sample_format,
            stream: None,
            error_count: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Pick a stream configuration, preferring f32 at the requested rate and
    /// channel count.
    fn best_config(device: &Device, config: &EngineConfig) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceInit(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported.find(|c| {
            c.channels() == config.channels
                && c.min_sample_rate().0 <= config.sample_rate
                && c.max_sample_rate().0 >= config.sample_rate
                && c.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let stream_config = supported_config
                .with_sample_rate(cpal::SampleRate(config.sample_rate))
                .config();
            return Ok((stream_config, sample_format));
        }

        // Fallback: use default config
        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::DeviceInit(format!("Failed to get default config: {}", e)))?;
        debug!(
            "Requested format unavailable, using device default {:?}",
            supported_config.sample_format()
        );

        let sample_format = supported_config.sample_format();
        Ok((supported_config.config(), sample_format))
    }

    /// Start the stream.
    ///
    /// `render` is called on the driver's real-time thread with an
    /// interleaved f32 block to fill completely; it must not block.
    pub fn start<F>(&mut self, render: F) -> Result<()>
    where
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        info!("Starting audio stream");

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream_f32(render)?,
            SampleFormat::I16 => self.build_stream_converted::<i16, _>(render, |s| (s * i16::MAX as f32) as i16)?,
            SampleFormat::U16 => self.build_stream_converted::<u16, _>(render, |s| ((s + 1.0) * 32767.5) as u16)?,
            sample_format => {
                return Err(Error::DeviceInit(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::DeviceInit(format!("Failed to start stream: {}", e)))?;
        self.stream = Some(stream);

        info!("Audio stream started");
        Ok(())
    }

    fn build_stream_f32<F>(&self, mut render: F) -> Result<Stream>
    where
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        let error_count = Arc::clone(&self.error_count);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render(data),
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_count.fetch_add(1, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| Error::DeviceInit(format!("Failed to build stream: {}", e)))
    }

    /// Integer-format stream: render into a scratch block, then convert
    fn build_stream_converted<T, F>(&self, mut render: F, convert: fn(f32) -> T) -> Result<Stream>
    where
        T: cpal::SizedSample + Send + 'static,
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        let error_count = Arc::clone(&self.error_count);
        let mut scratch: Vec<f32> = Vec::new();

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    if scratch.len() < data.len() {
                        scratch.resize(data.len(), 0.0);
                    }
                    let block = &mut scratch[..data.len()];
                    render(block);
                    for (out, sample) in data.iter_mut().zip(block.iter()) {
                        *out = convert(sample.clamp(-1.0, 1.0));
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_count.fetch_add(1, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| Error::DeviceInit(format!("Failed to build stream: {}", e)))
    }

    /// Pause and drop the stream.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream");
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
        }
        Ok(())
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Stream errors reported by the driver since open
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("{}", e);
        }
    }
}
