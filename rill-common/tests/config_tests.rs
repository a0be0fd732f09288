//! Integration tests for configuration resolution
//!
//! Uses serial_test because the tests manipulate RILL_CONFIG and must not
//! run in parallel with each other.

use rill_common::config::{EngineConfig, UpdateMode, CONFIG_ENV_VAR};
use rill_common::{Error, FadeCurve};
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(content.as_bytes()).expect("write temp config");
    file
}

#[test]
#[serial]
fn test_cli_path_has_priority_over_env() {
    let env_file = write_config("voice_count = 4");
    let cli_file = write_config("voice_count = 9");
    env::set_var(CONFIG_ENV_VAR, env_file.path());

    let config = EngineConfig::resolve(Some(cli_file.path())).unwrap();
    assert_eq!(config.voice_count, 9);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_path() {
    let file = write_config(
        r#"
        mode = "driver-callback"
        fade_curve = "s-curve"
        buffer_frames = 512
        "#,
    );
    env::set_var(CONFIG_ENV_VAR, file.path());

    let config = EngineConfig::resolve(None).unwrap();
    assert_eq!(config.mode, UpdateMode::DriverCallback);
    assert_eq!(config.fade_curve, FadeCurve::SCurve);
    assert_eq!(config.buffer_frames, 512);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_env_file_does_not_fail() {
    env::set_var(CONFIG_ENV_VAR, "/nonexistent/rill/config.toml");

    // Falls through to the platform file or compiled defaults
    let config = EngineConfig::resolve(None);
    assert!(config.is_ok());

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_cli_file_is_io_error() {
    let result = EngineConfig::resolve(Some(std::path::Path::new("/nonexistent/rill.toml")));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_invalid_values_rejected_from_file() {
    let file = write_config("channels = 0");
    let result = EngineConfig::load_from_file(file.path());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_unknown_mode_rejected() {
    let file = write_config("mode = \"interrupt\"");
    let result = EngineConfig::load_from_file(file.path());
    assert!(matches!(result, Err(Error::Toml(_))));
}
