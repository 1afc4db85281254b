// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use depthview::Config;
use depthview::backends::camera::{
    CameraFps, ColorFormat, ColorResolution, DepthMode, WiredSyncMode,
};
use depthview::errors::ConfigError;
use depthview::media::DepthColormap;
use depthview::pipelines::TimeoutPolicy;

#[test]
fn test_config_default() {
    // Default matches the reference setup
    let config = Config::default();

    assert_eq!(config.devices, vec![0]);
    assert_eq!(config.device.color_format, ColorFormat::Bgra32);
    assert_eq!(config.device.color_resolution, ColorResolution::R720p);
    assert_eq!(config.device.depth_mode, DepthMode::NfovUnbinned);
    assert_eq!(config.device.camera_fps, CameraFps::Fps30);
    assert!(config.device.synchronized_images_only);
    assert_eq!(config.device.wired_sync_mode, WiredSyncMode::Standalone);
    assert_eq!(config.session.capture_timeout_ms, 1000);
    assert_eq!(config.session.timeout_policy, TimeoutPolicy::Terminate);
    assert_eq!(config.display.depth_max_mm, 5000);
    assert_eq!(config.display.wait_key_ms, 30);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let config = Config::from_json(
        r#"{
            "devices": [0, 1],
            "device": { "color_resolution": "1080p" },
            "session": { "timeout_policy": { "kind": "retry", "max_consecutive": 5 } },
            "display": { "colormap": "turbo" }
        }"#,
    )
    .unwrap();

    assert_eq!(config.devices, vec![0, 1]);
    assert_eq!(config.device.color_resolution, ColorResolution::R1080p);
    assert_eq!(config.device.depth_mode, DepthMode::NfovUnbinned);
    assert_eq!(
        config.session.timeout_policy,
        TimeoutPolicy::Retry { max_consecutive: 5 }
    );
    assert_eq!(config.session.capture_timeout_ms, 1000);
    assert_eq!(config.display.colormap, DepthColormap::Turbo);
    assert!(config.display.show_point_cloud);
}

#[test]
fn test_invalid_values_rejected() {
    for text in [
        r#"{ "devices": [] }"#,
        r#"{ "display": { "depth_max_mm": 0 } }"#,
        r#"{ "session": { "max_frames": 0 } }"#,
        r#"{ "session": { "timeout_policy": { "kind": "retry", "max_consecutive": 0 } } }"#,
    ] {
        let err = Config::from_json(text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{text}");
    }
}

#[test]
fn test_malformed_json_is_parse_error() {
    let err = Config::from_json("{ devices: ").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("depthview-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "session": { "max_frames": 10 } }"#).unwrap();

    let config = Config::load(&path);
    let _ = std::fs::remove_file(&path);

    assert_eq!(config.unwrap().session.max_frames, Some(10));
}

#[test]
fn test_missing_file_is_io_error() {
    let path = std::env::temp_dir().join("depthview-config-does-not-exist.json");
    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
