//! # Rill Common Library
//!
//! Shared code for the rill workspace including:
//! - Engine configuration loading (TOML + environment overrides)
//! - Common error type
//! - Logging setup for binaries
//! - Fade curve definitions and calculations

pub mod config;
pub mod error;
pub mod fade_curves;
pub mod logging;

pub use config::{EngineConfig, UpdateMode};
pub use error::{Error, Result};
pub use fade_curves::FadeCurve;
