//! Configuration resolution tests
//!
//! Covers:
//! - Missing TOML files fall back to defaults instead of failing
//! - Priority order: explicit path → HYDRA_CONFIG → user config dir
//! - Environment overrides for the vision API key and log level
//!
//! Note: Uses serial_test to prevent ENV variable races. Every test that
//! touches HYDRA_* variables is marked #[serial].

use hydra_common::config::{
    resolve_config_path, GoalPolicyName, HydraConfig, CONFIG_PATH_ENV, LOG_LEVEL_ENV,
    VISION_API_KEY_ENV,
};
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(CONFIG_PATH_ENV);
    env::remove_var(VISION_API_KEY_ENV);
    env::remove_var(LOG_LEVEL_ENV);
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.toml");

    let config = HydraConfig::load(Some(&missing)).unwrap();
    assert_eq!(config, HydraConfig::default());
}

#[test]
#[serial]
fn test_explicit_path_is_loaded() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("hydra.toml");
    fs::write(
        &path,
        r#"
[goal]
policy = "weight_based"

[estimation]
remote_wait_ms = 1500
default_bottle_capacity_ml = 750.0

[day]
utc_offset_minutes = -300
"#,
    )
    .unwrap();

    let config = HydraConfig::load(Some(&path)).unwrap();
    assert_eq!(config.goal.policy, GoalPolicyName::WeightBased);
    assert_eq!(config.estimation.remote_wait_ms, 1500);
    assert_eq!(config.estimation.default_bottle_capacity_ml, 750.0);
    assert_eq!(config.day.utc_offset_minutes, Some(-300));
}

#[test]
#[serial]
fn test_env_path_used_when_no_explicit_path() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("from-env.toml");
    fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
    env::set_var(CONFIG_PATH_ENV, &path);

    assert_eq!(resolve_config_path(None), Some(path.clone()));
    let config = HydraConfig::load(None).unwrap();
    assert_eq!(config.logging.level, "debug");

    clear_env();
}

#[test]
#[serial]
fn test_explicit_path_beats_env_path() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let explicit = temp_dir.path().join("explicit.toml");
    env::set_var(CONFIG_PATH_ENV, temp_dir.path().join("env.toml"));

    assert_eq!(resolve_config_path(Some(&explicit)), Some(explicit.clone()));

    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("hydra.toml");
    fs::write(
        &path,
        "[vision]\napi_key = \"from-file\"\n\n[logging]\nlevel = \"warn\"\n",
    )
    .unwrap();
    env::set_var(VISION_API_KEY_ENV, "from-env");
    env::set_var(LOG_LEVEL_ENV, "trace");

    let config = HydraConfig::load(Some(&path)).unwrap();
    assert_eq!(config.vision.api_key.as_deref(), Some("from-env"));
    assert_eq!(config.logging.level, "trace");

    clear_env();
}

#[test]
#[serial]
fn test_blank_env_key_does_not_override() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("hydra.toml");
    fs::write(&path, "[vision]\napi_key = \"from-file\"\n").unwrap();
    env::set_var(VISION_API_KEY_ENV, "  ");

    let config = HydraConfig::load(Some(&path)).unwrap();
    assert_eq!(config.vision.api_key.as_deref(), Some("from-file"));

    clear_env();
}

#[test]
#[serial]
fn test_malformed_file_is_error() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    fs::write(&path, "[fusion\nremote_min_confidence = ").unwrap();

    assert!(HydraConfig::load(Some(&path)).is_err());
}

#[test]
#[serial]
fn test_out_of_range_values_rejected_on_load() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("hydra.toml");
    fs::write(&path, "[fusion]\nremote_min_confidence = 2.0\n").unwrap();

    assert!(HydraConfig::load(Some(&path)).is_err());
}
