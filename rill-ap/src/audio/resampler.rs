//! Sample rate conversion using rubato
//!
//! The software mixer reads every chunk at its own output rate, so PCM from
//! a Sound at another rate is converted before it reaches a chunk: streamed
//! Players pull through a [`ResamplingDecoder`], resident buffers are
//! converted once with [`resample_chunk`].
//!
//! The resampler's delay line is hidden from callers. The first
//! `output_delay()` frames are dropped, and at end of stream the line is
//! flushed and the output trimmed to `ceil(input_frames × ratio)`, so a
//! looping stream rewinds without a gap or a click of padding.

use crate::audio::decoder::{load_resident, Decoder, MemoryDecoder};
use crate::audio::types::{PcmChunk, PcmFormat, BYTES_PER_SAMPLE};
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Input frames per resampler block
const BLOCK_FRAMES: usize = 1024;

/// Scale between i16 PCM and rubato's f32 samples
const I16_SCALE: f32 = 32768.0;

/// Wrap `decoder` so it produces PCM at `rate`
///
/// Returns the decoder unchanged when no rate is requested or the rates
/// already match.
pub fn resample_to(decoder: Box<dyn Decoder>, rate: Option<u32>) -> Result<Box<dyn Decoder>> {
    match rate {
        Some(rate) if rate != decoder.format().sample_rate => Ok(Box::new(ResamplingDecoder::new(decoder, rate)?)),
        _ => Ok(decoder),
    }
}

/// Convert a whole PCM chunk to `rate`
pub fn resample_chunk(chunk: &PcmChunk, rate: u32, name: &str) -> Result<PcmChunk> {
    let source = MemoryDecoder::new(chunk.format(), chunk.bytes().to_vec());
    let mut decoder = ResamplingDecoder::new(Box::new(source), rate)?;
    Ok(load_resident(&mut decoder, name))
}

/// Decoder adapter converting another decoder's PCM to a fixed output rate
pub struct ResamplingDecoder {
    inner: Box<dyn Decoder>,
    resampler: FastFixedIn<f32>,
    format: PcmFormat,
    ratio: f64,
    /// Planar input gathered for the next block
    input: Vec<Vec<f32>>,
    /// Input bytes short of a whole frame
    carry: Vec<u8>,
    scratch: Vec<u8>,
    /// Converted PCM bytes not yet returned
    pending: Vec<u8>,
    pending_pos: usize,
    /// Leading delay frames still to drop
    skip: usize,
    frames_in: usize,
    frames_out: usize,
    inner_done: bool,
    flushed: bool,
}

impl ResamplingDecoder {
    /// Convert `inner` to `rate` frames per second
    ///
    /// # Errors
    /// `Error::Decode` when rubato rejects the rate pair or channel count.
    pub fn new(inner: Box<dyn Decoder>, rate: u32) -> Result<Self> {
        let source = inner.format();
        let channels = source.channels.max(1) as usize;
        let ratio = rate as f64 / source.sample_rate.max(1) as f64;

        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, BLOCK_FRAMES, channels)
            .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;
        let skip = resampler.output_delay();

        debug!(
            "Resampling {} Hz to {} Hz ({} channels, delay {} frames)",
            source.sample_rate, rate, channels, skip
        );

        Ok(Self {
            inner,
            resampler,
            format: PcmFormat::new(source.channels, rate),
            ratio,
            input: vec![Vec::with_capacity(BLOCK_FRAMES); channels],
            carry: Vec::new(),
            scratch: Vec::new(),
            pending: Vec::new(),
            pending_pos: 0,
            skip,
            frames_in: 0,
            frames_out: 0,
            inner_done: false,
            flushed: false,
        })
    }

    fn channels(&self) -> usize {
        self.input.len()
    }

    /// Pull input until one block is gathered or the inner stream ends
    fn gather(&mut self, needed: usize) -> Result<()> {
        let frame_bytes = self.channels() * BYTES_PER_SAMPLE;

        while self.input[0].len() < needed && !self.inner_done {
            let want = (needed - self.input[0].len()) * frame_bytes;
            self.scratch.resize(want, 0);
            let n = self.inner.read(&mut self.scratch[..want])?;
            if n == 0 {
                self.inner_done = true;
                break;
            }

            self.carry.extend_from_slice(&self.scratch[..n]);
            let whole = self.carry.len() / frame_bytes * frame_bytes;
            for frame in self.carry[..whole].chunks_exact(frame_bytes) {
                for (ch, sample) in frame.chunks_exact(BYTES_PER_SAMPLE).enumerate() {
                    let value = i16::from_le_bytes([sample[0], sample[1]]);
                    self.input[ch].push(value as f32 / I16_SCALE);
                }
            }
            self.frames_in += whole / frame_bytes;
            self.carry.drain(..whole);
        }
        Ok(())
    }

    /// Convert the next block into `pending`
    fn process_next(&mut self) -> Result<()> {
        let needed = self.resampler.input_frames_next();
        self.gather(needed)?;

        if self.input[0].len() >= needed {
            let output = self
                .resampler
                .process(&self.input, None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            for channel in self.input.iter_mut() {
                channel.clear();
            }
            self.emit(&output, None);
            return Ok(());
        }

        // End of input: convert the short block, then flush the delay line
        let partial = self
            .resampler
            .process_partial(Some(self.input.as_slice()), None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
        for channel in self.input.iter_mut() {
            channel.clear();
        }
        let tail = self
            .resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

        let expected = (self.frames_in as f64 * self.ratio).ceil() as usize;
        self.emit(&partial, Some(expected));
        self.emit(&tail, Some(expected));
        self.flushed = true;
        Ok(())
    }

    /// Interleave planar output into `pending` as i16 bytes
    fn emit(&mut self, planar: &[Vec<f32>], limit: Option<usize>) {
        let frames = planar.first().map(Vec::len).unwrap_or(0);
        for frame in 0..frames {
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if limit.is_some_and(|limit| self.frames_out >= limit) {
                break;
            }
            for channel in planar {
                let value = (channel[frame] * I16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                self.pending.extend_from_slice(&value.to_le_bytes());
            }
            self.frames_out += 1;
        }
    }
}

impl Decoder for ResamplingDecoder {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let wanted = buf.len() & !1;
        while self.pending.len() - self.pending_pos < wanted && !self.flushed {
            self.process_next()?;
        }

        let count = wanted.min(self.pending.len() - self.pending_pos);
        buf[..count].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + count]);
        self.pending_pos += count;
        if self.pending_pos == self.pending.len() {
            self.pending.clear();
            self.pending_pos = 0;
        }
        Ok(count)
    }

    fn reset_to_start(&mut self) -> Result<()> {
        self.inner.reset_to_start()?;
        self.resampler.reset();
        for channel in self.input.iter_mut() {
            channel.clear();
        }
        self.carry.clear();
        self.pending.clear();
        self.pending_pos = 0;
        self.skip = self.resampler.output_delay();
        self.frames_in = 0;
        self.frames_out = 0;
        self.inner_done = false;
        self.flushed = false;
        Ok(())
    }

    fn format(&self) -> PcmFormat {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(samples: usize, step: i16) -> Vec<u8> {
        (0..samples).flat_map(|i| (i as i16 * step).to_le_bytes()).collect()
    }

    fn samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    fn read_all(decoder: &mut dyn Decoder) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; 1000];
        loop {
            let n = decoder.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn test_matching_rate_is_not_wrapped() {
        let decoder = MemoryDecoder::new(PcmFormat::new(2, 44100), vec![0u8; 16]);
        let mut decoder = resample_to(Box::new(decoder), Some(44100)).unwrap();
        assert_eq!(decoder.format().sample_rate, 44100);
        assert_eq!(read_all(decoder.as_mut()).len(), 16);
    }

    #[test]
    fn test_upsampled_ramp_is_interpolated() {
        let source = MemoryDecoder::new(PcmFormat::new(1, 22050), ramp(512, 50));
        let mut decoder = ResamplingDecoder::new(Box::new(source), 44100).unwrap();
        assert_eq!(decoder.format(), PcmFormat::new(1, 44100));

        let out = samples(&read_all(&mut decoder));
        assert!((out.len() as i64 - 1024).abs() <= 2, "got {} frames", out.len());

        // Every new output sample lies between two input samples
        for pair in out[64..960].windows(2) {
            let step = pair[1] - pair[0];
            assert!((20..=30).contains(&step), "step {} in {:?}", step, pair);
        }
    }

    #[test]
    fn test_downsampled_length_follows_ratio() {
        let source = MemoryDecoder::new(PcmFormat::new(2, 48000), vec![0u8; 4800 * 4]).with_max_read(300);
        let mut decoder = ResamplingDecoder::new(Box::new(source), 44100).unwrap();

        let out = read_all(&mut decoder);
        assert_eq!(out.len() % 4, 0);
        assert!((out.len() as i64 / 4 - 4410).abs() <= 2);
    }

    #[test]
    fn test_reset_replays_identically() {
        let source = MemoryDecoder::new(PcmFormat::new(1, 22050), ramp(3000, 5));
        let mut decoder = ResamplingDecoder::new(Box::new(source), 44100).unwrap();

        let first = read_all(&mut decoder);
        decoder.reset_to_start().unwrap();
        let again = read_all(&mut decoder);
        assert_eq!(first, again);
    }

    #[test]
    fn test_resample_chunk_converts_whole_buffer() {
        let chunk = PcmChunk::from_bytes(PcmFormat::new(1, 22050), ramp(2205, 10));
        let converted = resample_chunk(&chunk, 44100, "ramp").unwrap();

        assert_eq!(converted.format().sample_rate, 44100);
        assert!((converted.frames() as i64 - 4410).abs() <= 2);
    }
}
