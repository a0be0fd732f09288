//! Audio test data generation
//!
//! Byte patterns with known content for ring arithmetic checks, and WAV
//! files written with hound for the symphonia decoder path.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Standard test sample rate (44.1 kHz)
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// `len` bytes where byte `i` is `i % 251`
///
/// 251 is prime, so no chunk size used in tests lines up with the pattern
/// and a misplaced byte is always visible.
pub fn ramp_pcm(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// `frames` interleaved frames with every sample set to `value`
pub fn constant_pcm(frames: usize, channels: u16, value: i16) -> Vec<u8> {
    let mut data = Vec::with_capacity(frames * channels as usize * 2);
    for _ in 0..frames * channels as usize {
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

/// Generate a 16-bit sine wave WAV file
///
/// # Arguments
/// * `path` - Output file path
/// * `duration_ms` - Duration in milliseconds
/// * `frequency_hz` - Sine wave frequency in Hz
/// * `amplitude` - Amplitude 0.0-1.0
/// * `channels` - Channel count (same signal on every channel)
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
    channels: u16,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000;
    let amplitude_i16 = amplitude * i16::MAX as f32;

    for frame_idx in 0..total_frames {
        let t = frame_idx as f32 / TEST_SAMPLE_RATE as f32;
        let sample = ((2.0 * PI * frequency_hz * t).sin() * amplitude_i16) as i16;
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
