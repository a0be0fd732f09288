//! Software-mix backend
//!
//! "Queueing" a chunk appends it to the voice's read list; the device
//! callback then pulls mixed output: every playing voice's current chunk is
//! read from its cursor, scaled by the voice gain and summed into the shared
//! output buffer. Chunks read to the end move to the processed list where
//! the buffer ring reclaims them on its next update.
//!
//! Chunks are read one source frame per output frame, so they must arrive
//! at the mixer's rate. [`VoiceBackend::output_rate`] reports that rate and
//! the manager resamples Sounds to it before their PCM is queued.
//!
//! [`VoiceBackend::output_rate`]: super::VoiceBackend::output_rate

use super::{impl_pool_backend, VoicePool, VoiceQueue, VoiceState};
use crate::audio::types::PcmChunk;
use tracing::trace;

/// Scale from i16 to [-1.0, 1.0)
const I16_SCALE: f32 = 1.0 / 32768.0;

/// Mixing backend producing interleaved f32 output
#[derive(Debug)]
pub struct SoftwareMixer {
    pool: VoicePool,
    channels: u16,
    sample_rate: u32,
}

impl SoftwareMixer {
    /// Create a mixer with `voice_count` voices producing `channels` ×
    /// `sample_rate` output
    pub fn new(voice_count: usize, channels: u16, sample_rate: u32) -> Self {
        Self {
            pool: VoicePool::new(voice_count),
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn mix_rate(&self) -> Option<u32> {
        Some(self.sample_rate)
    }

    /// Voices currently allocated
    pub fn voices_in_use(&self) -> usize {
        self.pool.in_use()
    }

    /// Mix every playing voice into `out` (interleaved, overwritten)
    ///
    /// The output is clamped to [-1.0, 1.0] after summing.
    pub fn mix(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let channels = self.channels as usize;

        for voice in self.pool.iter_mut() {
            if voice.state == VoiceState::Playing {
                mix_voice(voice, out, channels);
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

impl_pool_backend!(SoftwareMixer);

/// Sum one voice into `out`, consuming its queued chunks
fn mix_voice(voice: &mut VoiceQueue, out: &mut [f32], out_channels: usize) {
    let frames = out.len() / out_channels;
    let gain = voice.gain;
    let mut frame = 0;

    while frame < frames && voice.state == VoiceState::Playing {
        let finished = {
            let Some(head) = voice.pending.front_mut() else {
                break;
            };
            let chunk = &head.chunk;
            let src_frames = chunk.frames();

            while frame < frames && head.frame < src_frames {
                let base = frame * out_channels;
                for ch in 0..out_channels {
                    out[base + ch] += sample_for_channel(chunk, head.frame, ch, out_channels) * gain;
                }
                head.frame += 1;
                frame += 1;
            }

            head.frame >= src_frames
        };

        if finished {
            trace!("Chunk consumed by mixer");
            voice.finish_head();
        }
    }
}

/// Source sample for output channel `ch`, mapping channel layouts
fn sample_for_channel(chunk: &PcmChunk, frame: usize, ch: usize, out_channels: usize) -> f32 {
    let src_channels = chunk.format().channels as usize;

    if src_channels == out_channels {
        return chunk.sample(frame, ch) as f32 * I16_SCALE;
    }
    if out_channels == 1 && src_channels >= 2 {
        let left = chunk.sample(frame, 0) as f32;
        let right = chunk.sample(frame, 1) as f32;
        return (left + right) * 0.5 * I16_SCALE;
    }
    chunk.sample(frame, ch.min(src_channels - 1)) as f32 * I16_SCALE
}
