//! Settings loading from files and the environment.

#![allow(unsafe_code)]

use hotswap_watch::settings::Settings;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_environment_overrides_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("watch.toml");
    fs::write(
        &path,
        r#"
[clock]
threshold_ms = 10000
autostart = true

[reload]
debounce_ms = 250
"#,
    )
    .unwrap();

    // SAFETY: the prefix is unique to this test, no other thread reads it.
    unsafe {
        std::env::set_var("HSWATCH_ENV_TEST_CLOCK__THRESHOLD_MS", "2500");
        std::env::set_var("HSWATCH_ENV_TEST_CLOCK__AUTOSTART", "false");
    }

    let settings = Settings::load(Some(&path), Some("HSWATCH_ENV_TEST")).unwrap();
    assert_eq!(settings.clock.threshold_ms, 2_500);
    assert!(!settings.clock.autostart);
    assert_eq!(settings.reload.debounce_ms, 250);
    assert_eq!(settings.watch.resubscribe_backoff_ms, 3_000);

    unsafe {
        std::env::remove_var("HSWATCH_ENV_TEST_CLOCK__THRESHOLD_MS");
        std::env::remove_var("HSWATCH_ENV_TEST_CLOCK__AUTOSTART");
    }
}

#[test]
fn test_malformed_file_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("watch.json");
    fs::write(&path, r#"{"clock": {"threshold_ms": "soon"}}"#).unwrap();

    assert!(Settings::load(Some(&path), None).is_err());
}
