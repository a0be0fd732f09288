//! Decoder adapter interface
//!
//! The playback core never decodes compressed audio itself. It pulls 16-bit
//! PCM bytes from a [`Decoder`] on demand and rewinds it at loop boundaries.
//! A [`SoundSource`] produces a fresh decoder for every streamed Player.

use crate::audio::types::{PcmChunk, PcmFormat};
use crate::error::Result;
use std::sync::Arc;
use tracing::warn;

/// Pull-based PCM producer
///
/// Read sizes are unpredictable: a decoder may return fewer bytes than asked
/// for at any time. `Ok(0)` means end of stream; an `Err` is a decode error
/// for that call only.
pub trait Decoder: Send {
    /// Decode up to `buf.len()` bytes of PCM into `buf`
    ///
    /// Byte counts are always a multiple of 2 (whole 16-bit samples).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Rewind to the first sample of the stream
    fn reset_to_start(&mut self) -> Result<()>;

    /// Format of the produced PCM
    fn format(&self) -> PcmFormat;
}

/// Factory for decoders over one asset
pub trait SoundSource: Send + Sync {
    /// Open a decoder positioned at stream start
    fn open(&self) -> Result<Box<dyn Decoder>>;
}

/// Decoder over PCM bytes already in memory
///
/// `max_read` caps the bytes returned per call, emulating codecs that decode
/// one packet at a time.
#[derive(Debug, Clone)]
pub struct MemoryDecoder {
    data: Arc<[u8]>,
    cursor: usize,
    max_read: Option<usize>,
    format: PcmFormat,
}

impl MemoryDecoder {
    pub fn new(format: PcmFormat, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            cursor: 0,
            max_read: None,
            format,
        }
    }

    /// Cap every read at `max_read` bytes (rounded down to whole samples)
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = Some((max_read & !1).max(2));
        self
    }

    /// Total stream length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Decoder for MemoryDecoder {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.data.len() - self.cursor;
        let mut count = buf.len().min(remaining);
        if let Some(max) = self.max_read {
            count = count.min(max);
        }
        buf[..count].copy_from_slice(&self.data[self.cursor..self.cursor + count]);
        self.cursor += count;
        Ok(count)
    }

    fn reset_to_start(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn format(&self) -> PcmFormat {
        self.format
    }
}

/// Source of [`MemoryDecoder`]s sharing one PCM block
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
    format: PcmFormat,
    max_read: Option<usize>,
}

impl MemorySource {
    pub fn new(format: PcmFormat, data: Vec<u8>) -> Self {
        Self {
            data: data.into(),
            format,
            max_read: None,
        }
    }

    /// Decoders opened from this source cap reads at `max_read` bytes
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = Some(max_read);
        self
    }
}

impl SoundSource for MemorySource {
    fn open(&self) -> Result<Box<dyn Decoder>> {
        let decoder = MemoryDecoder::new(self.format, Arc::clone(&self.data));
        Ok(match self.max_read {
            Some(max) => Box::new(decoder.with_max_read(max)),
            None => Box::new(decoder),
        })
    }
}

/// Decode an entire stream into one resident chunk
///
/// A decode error ends the load early with a warning; whatever was decoded
/// so far becomes the buffer.
pub fn load_resident(decoder: &mut dyn Decoder, name: &str) -> PcmChunk {
    const READ_SIZE: usize = 16384;

    let format = decoder.format();
    let mut data = Vec::new();
    let mut scratch = vec![0u8; READ_SIZE];

    loop {
        match decoder.read(&mut scratch) {
            Ok(0) => break,
            Ok(n) => data.extend_from_slice(&scratch[..n]),
            Err(e) => {
                warn!("Error while loading '{}', keeping {} bytes: {}", name, data.len(), e);
                break;
            }
        }
    }

    PcmChunk::from_bytes(format, data)
}
