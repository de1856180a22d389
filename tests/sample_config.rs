//! The shipped sample configuration must stay loadable.

use std::path::PathBuf;
use zcpublish_core::config::{AppConfig, LogFormat};
use zcpublish_core::types::{EndpointId, EndpointKind, SampleFormat};

fn sample_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join("zcpublish.yaml")
}

#[test]
fn test_sample_config_is_valid() {
    let config = AppConfig::from_file(sample_config_path()).expect("sample config should load");
    config.validate().expect("sample config should validate");

    assert_eq!(config.publish.port().unwrap(), 4713);
    assert_eq!(config.logging.format, LogFormat::Text);
    assert!(config.publish.user_name.is_none());
}

#[test]
fn test_sample_config_endpoints() {
    let config = AppConfig::from_file(sample_config_path()).unwrap();
    let endpoints = config.endpoints();
    assert_eq!(endpoints.len(), 3);

    let surround = endpoints
        .iter()
        .find(|e| e.id == EndpointId(2))
        .expect("usb headset declared");
    assert_eq!(surround.kind, EndpointKind::Sink);
    assert_eq!(surround.sample_spec.format, SampleFormat::Float32Le);
    assert_eq!(surround.channel_map.len(), 6);
    assert_eq!(surround.display_label(), "USB Headset");

    assert!(endpoints
        .iter()
        .any(|e| e.kind == EndpointKind::Source && e.channel_map.to_string() == "front-left,front-right"));
}

#[test]
fn test_sample_config_through_config_builder() {
    let config = AppConfig::from_config_builder(sample_config_path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.endpoints.len(), 3);
}
