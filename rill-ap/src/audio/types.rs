//! Core audio data types
//!
//! Defines the PCM format description, the PCM chunk shared between the
//! buffer ring and the voice backends, and the immutable Sound asset.
//!
//! **Format:** all PCM handled by the core is signed 16-bit little-endian,
//! interleaved by channel. Decoders convert into this format before the
//! bytes reach a chunk.

use crate::audio::decoder::{load_resident, Decoder, MemorySource, SoundSource};
use crate::audio::file_decoder::FileSource;
use crate::audio::resampler::resample_to;
use crate::error::Result;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Bytes per sample (always 16-bit PCM)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Description of a decoded PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// Interleaved channel count
    pub channels: u16,

    /// Frames per second
    pub sample_rate: u32,

    /// Always 16
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// Create a 16-bit format
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            bits_per_sample: 16,
        }
    }

    /// Bytes in one frame (one sample per channel)
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * BYTES_PER_SAMPLE
    }

    /// Bytes per second of audio
    pub fn byte_rate(&self) -> usize {
        self.frame_bytes() * self.sample_rate as usize
    }

    /// Convert a byte count into seconds of audio
    pub fn bytes_to_seconds(&self, bytes: usize) -> f32 {
        let rate = self.byte_rate();
        if rate == 0 {
            return 0.0;
        }
        bytes as f32 / rate as f32
    }
}

/// One block of PCM bytes
///
/// Used both for the slots of a streaming ring (fixed capacity, refilled in
/// place) and for the single resident buffer of a non-streamed Sound.
#[derive(Clone, PartialEq, Eq)]
pub struct PcmChunk {
    data: Vec<u8>,
    format: PcmFormat,
}

/// Shared reference to a chunk, as handed to a voice backend
///
/// A backend holds a clone for as long as the chunk is queued; the ring only
/// writes into a chunk it owns exclusively.
pub type ChunkRef = Arc<PcmChunk>;

impl PcmChunk {
    /// Empty chunk with room for `capacity` bytes
    pub fn with_capacity(format: PcmFormat, capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            format,
        }
    }

    /// Chunk holding `data`
    pub fn from_bytes(format: PcmFormat, data: Vec<u8>) -> Self {
        Self { data, format }
    }

    /// PCM bytes currently held
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Filled length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when no bytes are held
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Format of the held PCM
    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Whole frames held
    pub fn frames(&self) -> usize {
        self.data.len() / self.format.frame_bytes()
    }

    /// Sample at `frame` for `channel` (no bounds forgiveness)
    pub fn sample(&self, frame: usize, channel: usize) -> i16 {
        let at = (frame * self.format.channels as usize + channel) * BYTES_PER_SAMPLE;
        i16::from_le_bytes([self.data[at], self.data[at + 1]])
    }

    /// Storage for an in-place refill
    pub(crate) fn storage_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

impl fmt::Debug for PcmChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcmChunk")
            .field("len", &self.data.len())
            .field("capacity", &self.data.capacity())
            .field("format", &self.format)
            .finish()
    }
}

/// Immutable description of an audio asset
///
/// Players reference a Sound through `Arc` and never own it. A streamed Sound
/// opens one decoder per Player; a resident Sound is decoded once into a
/// single chunk that every Player shares read-only.
pub struct Sound {
    name: String,
    category: String,
    streamed: bool,
    format: PcmFormat,
    source: Arc<dyn SoundSource>,
    resident: OnceLock<ChunkRef>,
    /// Resident buffer converted to the first output rate asked for
    converted: OnceLock<ChunkRef>,
}

impl Sound {
    /// Create a Sound over any decodable source
    ///
    /// Opens one decoder up front to learn the PCM format.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        streamed: bool,
        source: Arc<dyn SoundSource>,
    ) -> Result<Self> {
        let format = source.open()?.format();
        let name = name.into();
        debug!(
            "Created sound '{}' ({} ch, {} Hz, streamed={})",
            name, format.channels, format.sample_rate, streamed
        );

        Ok(Self {
            name,
            category: category.into(),
            streamed,
            format,
            source,
            resident: OnceLock::new(),
            converted: OnceLock::new(),
        })
    }

    /// Create a Sound decoded from a file by symphonia
    pub fn from_file(path: impl AsRef<Path>, category: impl Into<String>, streamed: bool) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let source = Arc::new(FileSource::new(path));
        Self::new(name, category, streamed, source)
    }

    /// Create a Sound over PCM already in memory
    pub fn from_pcm(
        name: impl Into<String>,
        category: impl Into<String>,
        streamed: bool,
        format: PcmFormat,
        data: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            streamed,
            format,
            source: Arc::new(MemorySource::new(format, data)),
            resident: OnceLock::new(),
            converted: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn is_streamed(&self) -> bool {
        self.streamed
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Open a fresh decoder positioned at stream start
    pub fn open_decoder(&self) -> Result<Box<dyn Decoder>> {
        self.source.open()
    }

    /// The shared resident buffer, decoded on first use
    pub fn resident_buffer(&self) -> Result<ChunkRef> {
        if let Some(chunk) = self.resident.get() {
            return Ok(Arc::clone(chunk));
        }

        let mut decoder = self.source.open()?;
        let chunk = Arc::new(load_resident(decoder.as_mut(), &self.name));
        debug!("Loaded resident buffer for '{}' ({} bytes)", self.name, chunk.len());

        // Another thread may have won the race; both results are identical
        Ok(Arc::clone(self.resident.get_or_init(|| chunk)))
    }

    /// The resident buffer at `rate`, resampled when the Sound differs
    ///
    /// One converted copy is cached. A request for yet another rate is
    /// converted afresh each time.
    pub fn resident_buffer_at(&self, rate: Option<u32>) -> Result<ChunkRef> {
        let rate = match rate {
            Some(rate) if rate != self.format.sample_rate => rate,
            _ => return self.resident_buffer(),
        };

        if let Some(chunk) = self.converted.get() {
            if chunk.format().sample_rate == rate {
                return Ok(Arc::clone(chunk));
            }
        }

        let mut decoder = resample_to(self.source.open()?, Some(rate))?;
        let chunk = Arc::new(load_resident(decoder.as_mut(), &self.name));
        debug!(
            "Converted resident buffer for '{}' to {} Hz ({} bytes)",
            self.name,
            rate,
            chunk.len()
        );

        let cached = self.converted.get_or_init(|| Arc::clone(&chunk));
        if cached.format().sample_rate == rate {
            Ok(Arc::clone(cached))
        } else {
            Ok(chunk)
        }
    }

    /// Duration in seconds, known once the resident buffer is loaded
    pub fn duration(&self) -> Option<f32> {
        self.resident
            .get()
            .map(|chunk| self.format.bytes_to_seconds(chunk.len()))
    }
}

impl fmt::Debug for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sound")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("streamed", &self.streamed)
            .field("format", &self.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bytes() {
        assert_eq!(PcmFormat::new(1, 22050).frame_bytes(), 2);
        assert_eq!(PcmFormat::new(2, 44100).frame_bytes(), 4);
    }

    #[test]
    fn test_bytes_to_seconds() {
        let format = PcmFormat::new(2, 1000);
        assert!((format.bytes_to_seconds(4000) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_chunk_sample_access() {
        let format = PcmFormat::new(2, 44100);
        let mut data = Vec::new();
        for s in [100i16, -200, 300, -400] {
            data.extend_from_slice(&s.to_le_bytes());
        }
        let chunk = PcmChunk::from_bytes(format, data);

        assert_eq!(chunk.frames(), 2);
        assert_eq!(chunk.sample(0, 1), -200);
        assert_eq!(chunk.sample(1, 0), 300);
    }

    #[test]
    fn test_converted_resident_buffer_cached_per_rate() {
        let format = PcmFormat::new(1, 22050);
        let sound = Sound::from_pcm("beep", "sfx", false, format, vec![0u8; 4410]);

        let native = sound.resident_buffer_at(Some(22050)).unwrap();
        assert!(Arc::ptr_eq(&native, &sound.resident_buffer().unwrap()));

        let a = sound.resident_buffer_at(Some(44100)).unwrap();
        let b = sound.resident_buffer_at(Some(44100)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.format().sample_rate, 44100);
        assert!((a.frames() as i64 - 4410).abs() <= 2);

        let other = sound.resident_buffer_at(Some(48000)).unwrap();
        assert_eq!(other.format().sample_rate, 48000);
    }

    #[test]
    fn test_resident_buffer_shared() {
        let format = PcmFormat::new(1, 8000);
        let sound = Sound::from_pcm("beep", "sfx", false, format, vec![1u8; 64]);

        assert!(sound.duration().is_none());
        let a = sound.resident_buffer().unwrap();
        let b = sound.resident_buffer().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 64);
        assert!(sound.duration().is_some());
    }
}
