//! # Rill Audio Playback Library (rill-ap)
//!
//! Streaming-playback core: decodes compressed audio incrementally into a
//! small ring of fixed-size PCM chunks, keeps a playback voice fed without
//! gaps, and drives every playing instance through its lifecycle with
//! continuous gain computation.
//!
//! **Architecture:**
//! - [`audio`]: PCM formats, sounds, decoder adapters and the cpal output
//! - [`playback`]: buffer ring, player state machine, voice backends and the
//!   playback manager that serializes every tick
//! - [`engine`]: wires configuration, backend, manager and output together

pub mod audio;
pub mod engine;
pub mod error;
pub mod playback;

pub use engine::AudioEngine;
pub use error::{Error, Result};
pub use playback::{PlaybackManager, PlayerId, PlayerState};
