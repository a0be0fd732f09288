//! Test helper modules for rill-ap integration tests
//!
//! - audio_generator: deterministic PCM blocks and WAV files
//! - scripted_decoder: decoders with injected failures and observable rewinds

#![allow(dead_code)]

pub mod audio_generator;
pub mod scripted_decoder;

pub use audio_generator::{constant_pcm, generate_sine_wav, ramp_pcm};
pub use scripted_decoder::{ScriptedDecoder, ScriptedSource};
