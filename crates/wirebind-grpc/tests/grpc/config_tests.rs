use std::fs;
use std::time::Duration;

use super::test_utilities::*;
use tempfile::tempdir;
use test_log::test;
use wirebind_grpc::testservice::{string_message, text_of};
use wirebind_grpc::{ChannelConfigLoader, ChannelCredentials, ConfigError, Http2Channel};

#[test]
fn load_json_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("channel.json");
    fs::write(
        &path,
        r#"{
            "target": "http://127.0.0.1:50051",
            "security": {"mode": "insecure"},
            "auth": {"type": "bearer", "token": "abc"},
            "timeout_ms": 1500,
            "connect_timeout_ms": 200
        }"#,
    )
    .unwrap();

    let config = ChannelConfigLoader::from_path(&path).unwrap();
    assert_eq!(config.target, "http://127.0.0.1:50051");
    assert_eq!(config.timeout, Duration::from_millis(1500));
    assert_eq!(config.connect_timeout, Some(Duration::from_millis(200)));
    assert_eq!(config.credentials.call.get("authorization"), Some("Bearer abc"));
}

#[test]
fn load_yaml_config_with_relative_ca() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("ca.pem"), b"-----BEGIN CERTIFICATE-----\n").unwrap();
    let path = dir.path().join("channel.yml");
    fs::write(
        &path,
        "target: https://localhost:50052\nsecurity:\n  mode: tls\n  ca_certificate: ca.pem\n  domain_name: localhost\n",
    )
    .unwrap();

    let config = ChannelConfigLoader::from_path(&path).unwrap();
    match &config.credentials.channel {
        ChannelCredentials::Tls(settings) => {
            assert_eq!(settings.domain_name.as_deref(), Some("localhost"));
            assert!(settings.ca_certificate_pem.is_some());
        }
        other => panic!("expected TLS credentials, got {other:?}"),
    }
}

#[test]
fn unknown_extension_tries_both_formats() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("channel.conf");
    fs::write(&path, "target: http://localhost:1\nsecurity:\n  mode: insecure\n").unwrap();
    assert!(ChannelConfigLoader::from_path(&path).is_ok());
}

#[test]
fn missing_file_and_bad_content() {
    let dir = tempdir().unwrap();
    let missing = ChannelConfigLoader::from_path(dir.path().join("absent.json"));
    assert!(matches!(missing, Err(ConfigError::Io { .. })));

    let path = dir.path().join("channel.json");
    fs::write(&path, r#"{"target": "http://localhost:1", "security": {"mode": "plaintext"}}"#)
        .unwrap();
    assert!(matches!(
        ChannelConfigLoader::from_path(&path),
        Err(ConfigError::Parse { .. })
    ));

    let path = dir.path().join("mismatch.json");
    fs::write(&path, r#"{"target": "https://localhost:1", "security": {"mode": "insecure"}}"#)
        .unwrap();
    assert!(matches!(
        ChannelConfigLoader::from_path(&path),
        Err(ConfigError::Invalid { .. })
    ));
}

#[test]
fn read_file_defers_certificate_loading() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("channel.yaml");
    fs::write(
        &path,
        "target: https://localhost:1\nsecurity:\n  mode: tls\n  ca_certificate: absent.pem\n",
    )
    .unwrap();
    assert!(ChannelConfigLoader::read_file(&path).is_ok());
    assert!(matches!(
        ChannelConfigLoader::from_path(&path),
        Err(ConfigError::Io { .. })
    ));

    let typo = dir.path().join("typo.json");
    fs::write(&typo, r#"{"target": "http://localhost:1", "securty": {"mode": "tls"}}"#).unwrap();
    assert!(matches!(
        ChannelConfigLoader::read_file(&typo),
        Err(ConfigError::Parse { .. })
    ));
}

#[test(tokio::test)]
async fn loaded_config_drives_a_channel() {
    let server = TestServer::start().await.unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("channel.yaml");
    fs::write(
        &path,
        format!(
            "target: {}\nsecurity:\n  mode: insecure\ntimeout_ms: 5000\n",
            server.target()
        ),
    )
    .unwrap();

    let config = ChannelConfigLoader::from_path(&path).unwrap();
    let channel = Http2Channel::connect(config).await.unwrap();
    let client = wirebind_grpc::Client::with_channel(
        &wirebind_grpc::testservice::TEST_SERVICE,
        std::sync::Arc::new(channel),
    );
    let reply = client
        .call("testMethod", &string_message("configured").unwrap())
        .await
        .unwrap();
    assert_eq!(text_of(&reply), "configured");
}
