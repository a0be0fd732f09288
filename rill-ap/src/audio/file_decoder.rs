//! File decoder using symphonia
//!
//! Decodes Vorbis, WAV, FLAC, MP3 and AAC files incrementally into 16-bit
//! little-endian PCM. One packet is decoded at a time and buffered until the
//! buffer ring asks for more bytes, so memory use stays at a packet or two.

use crate::audio::decoder::{Decoder, SoundSource};
use crate::audio::types::PcmFormat;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

/// Incremental symphonia-backed decoder
pub struct SymphoniaDecoder {
    path: PathBuf,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    format: PcmFormat,
    /// Decoded bytes not yet handed out
    pending: Vec<u8>,
    /// Read position inside `pending`
    pending_pos: usize,
}

impl SymphoniaDecoder {
    /// Open and probe an audio file
    ///
    /// # Errors
    /// - Failed to open file
    /// - Unsupported audio format
    /// - No decodable audio track
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening stream decoder: {}", path.display());

        let file = std::fs::File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open file {}: {}", path.display(), e)))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        debug!(
            "Stream format: sample_rate={}, channels={}",
            sample_rate, channels
        );

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            decoder,
            track_id,
            format: PcmFormat::new(channels, sample_rate),
            pending: Vec::new(),
            pending_pos: 0,
        })
    }

    /// Decode the next packet of our track into `pending`
    ///
    /// Returns false at end of stream.
    fn decode_next_packet(&mut self) -> Result<bool> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => {
                    return Err(Error::Decode(format!(
                        "Error reading packet from {}: {}",
                        self.path.display(),
                        e
                    )));
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
                    samples.copy_interleaved_ref(decoded);

                    self.pending.clear();
                    self.pending_pos = 0;
                    for sample in samples.samples() {
                        self.pending.extend_from_slice(&sample.to_le_bytes());
                    }
                    if !self.pending.is_empty() {
                        return Ok(true);
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt packet: skip it and keep going
                    warn!("Skipping undecodable packet in {}: {}", self.path.display(), e);
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Decode error: {}", e)));
                }
            }
        }
    }
}

impl Decoder for SymphoniaDecoder {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pending_pos >= self.pending.len() && !self.decode_next_packet()? {
            return Ok(0);
        }

        let available = &self.pending[self.pending_pos..];
        let count = available.len().min(buf.len()) & !1;
        buf[..count].copy_from_slice(&available[..count]);
        self.pending_pos += count;
        Ok(count)
    }

    fn reset_to_start(&mut self) -> Result<()> {
        self.reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::new(0, 0.0),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Decode(format!("Failed to rewind {}: {}", self.path.display(), e)))?;

        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        Ok(())
    }

    fn format(&self) -> PcmFormat {
        self.format
    }
}

/// Source opening a [`SymphoniaDecoder`] per Player
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SoundSource for FileSource {
    fn open(&self) -> Result<Box<dyn Decoder>> {
        Ok(Box::new(SymphoniaDecoder::open(&self.path)?))
    }
}
