//! Audio data types, decoder adapters, rate conversion and device output

pub mod decoder;
pub mod file_decoder;
pub mod output;
pub mod resampler;
pub mod types;

pub use decoder::{load_resident, Decoder, MemoryDecoder, MemorySource, SoundSource};
pub use file_decoder::{FileSource, SymphoniaDecoder};
pub use output::AudioOutput;
pub use resampler::{resample_chunk, resample_to, ResamplingDecoder};
pub use types::{ChunkRef, PcmChunk, PcmFormat, Sound};
