use cellauth_config::{CellConfig, ConfigError};
use std::env;
use std::fs;

const KEY: &str = "ed25519/0101010101010101010101010101010101010101010101010101010101010101";
const CA: &str = "-----BEGIN CERTIFICATE-----\nCA CONTENT\n-----END CERTIFICATE-----";

#[test]
fn test_config_new() {
    let config = CellConfig::new("https://example.com/cell1", KEY);

    assert_eq!(config.cell_url, "https://example.com/cell1/");
    assert_eq!(config.signing_key, KEY);
    assert_eq!(config.access_token_lifetime, 3600);
    assert_eq!(config.refresh_token_lifetime, 86400);
    assert_eq!(config.key_cache_ttl, 300);
    assert_eq!(config.public_key_path, "__auth/public_key");
    assert!(config.validate().is_ok());
    assert_eq!(
        config.public_key_url("https://example.com/cell2"),
        "https://example.com/cell2/__auth/public_key"
    );
}

#[test]
fn test_config_validation() {
    let valid = CellConfig::new("https://example.com/cell1", KEY);
    assert!(valid.validate().is_ok());

    let mut invalid = valid.clone();
    invalid.cell_url = String::new();
    match invalid.validate() {
        Err(ConfigError::MissingCellUrl) => {}
        other => panic!("Expected MissingCellUrl error, got {other:?}"),
    }

    let mut invalid = valid.clone();
    invalid.cell_url = "ftp://example.com/".to_string();
    match invalid.validate() {
        Err(ConfigError::InvalidCellUrl(_)) => {}
        other => panic!("Expected InvalidCellUrl error, got {other:?}"),
    }

    let mut invalid = valid.clone();
    invalid.signing_key = String::new();
    match invalid.validate() {
        Err(ConfigError::MissingSigningKey) => {}
        other => panic!("Expected MissingSigningKey error, got {other:?}"),
    }

    let mut invalid = valid.clone();
    invalid.signing_key = "ed25519/beef".to_string();
    match invalid.validate() {
        Err(ConfigError::InvalidSigningKey(_)) => {}
        other => panic!("Expected InvalidSigningKey error, got {other:?}"),
    }

    let mut invalid = valid.clone();
    invalid.access_token_lifetime = 0;
    match invalid.validate() {
        Err(ConfigError::InvalidLifetime(_)) => {}
        other => panic!("Expected InvalidLifetime error, got {other:?}"),
    }

    let mut invalid = valid.clone();
    invalid.fetch_timeout_ms = 0;
    match invalid.validate() {
        Err(ConfigError::InvalidTimeout(_)) => {}
        other => panic!("Expected InvalidTimeout error, got {other:?}"),
    }

    let mut invalid = valid;
    invalid.server_ca = Some("not a pem".to_string());
    match invalid.validate() {
        Err(ConfigError::InvalidCertificate(_)) => {}
        other => panic!("Expected InvalidCertificate error, got {other:?}"),
    }
}

#[test]
fn test_builder_normalizes_and_validates() {
    let config = CellConfig::builder()
        .cell_url("https://example.com/cell1")
        .signing_key(KEY)
        .public_key_path("/__auth/public_key")
        .trusted_issuer("https://example.com/cell2")
        .server_ca(CA)
        .build()
        .unwrap();

    assert_eq!(config.cell_url, "https://example.com/cell1/");
    assert_eq!(config.public_key_path, "__auth/public_key");
    assert_eq!(
        config.trusted_issuers,
        Some(vec!["https://example.com/cell2/".to_string()])
    );

    let modified = config.to_builder().access_token_lifetime(60).build().unwrap();
    assert_eq!(modified.access_token_lifetime, 60);
    assert_eq!(modified.cell_url, config.cell_url);

    match CellConfig::builder().signing_key(KEY).build() {
        Err(ConfigError::MissingCellUrl) => {}
        other => panic!("Expected MissingCellUrl error, got {other:?}"),
    }
}

#[test]
fn test_keypair_and_debug() {
    let config = CellConfig::new("https://example.com/cell1", KEY);
    let keypair = config.keypair().unwrap();
    assert_eq!(keypair.to_key_string(), KEY);

    let debug = format!("{:?}", config);
    assert!(!debug.contains("0101010101"));
    assert!(debug.contains("<redacted>"));
}

#[test]
fn test_config_from_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file_path = temp_dir.path().join("cell.json");

    let config_json = format!(
        r#"{{
            "cell_url": "https://json.example.com/cell1",
            "signing_key": "{KEY}",
            "access_token_lifetime": 120,
            "trusted_issuers": ["https://json.example.com/cell2"]
        }}"#
    );
    fs::write(&file_path, config_json).unwrap();

    let config = CellConfig::from_file(&file_path).unwrap();

    assert_eq!(config.cell_url, "https://json.example.com/cell1/");
    assert_eq!(config.access_token_lifetime, 120);
    assert_eq!(config.refresh_token_lifetime, 86400);
    assert_eq!(
        config.trusted_issuers,
        Some(vec!["https://json.example.com/cell2/".to_string()])
    );

    fs::write(&file_path, "{ not json").unwrap();
    match CellConfig::from_file(&file_path) {
        Err(ConfigError::ParseError(_)) => {}
        other => panic!("Expected ParseError, got {other:?}"),
    }
}

#[cfg(feature = "toml")]
#[test]
fn test_config_from_toml() {
    let temp_dir = tempfile::tempdir().unwrap();
    let file_path = temp_dir.path().join("cell.toml");

    let config_toml = format!(
        r#"
        cell_url = "https://toml.example.com/cell1/"
        signing_key = "{KEY}"
        key_cache_ttl = 30
        fetch_timeout_ms = 250
        "#
    );
    fs::write(&file_path, config_toml).unwrap();

    let config = CellConfig::from_toml(&file_path).unwrap();

    assert_eq!(config.cell_url, "https://toml.example.com/cell1/");
    assert_eq!(config.key_cache_ttl, 30);
    assert_eq!(config.fetch_timeout().as_millis(), 250);
    assert_eq!(config.key_cache_duration().as_secs(), 30);
}

#[test]
fn test_config_from_env() {
    env::set_var("ENVTEST_CELL_URL", "https://env.example.com/cell1");
    env::set_var("ENVTEST_SIGNING_KEY", KEY);
    env::set_var("ENVTEST_REFRESH_TOKEN_LIFETIME", "7200");
    env::set_var(
        "ENVTEST_TRUSTED_ISSUERS",
        "https://env.example.com/cell2, https://env.example.com/cell3/",
    );

    let config = CellConfig::from_env("ENVTEST").unwrap();

    assert_eq!(config.cell_url, "https://env.example.com/cell1/");
    assert_eq!(config.refresh_token_lifetime, 7200);
    assert_eq!(
        config.trusted_issuers,
        Some(vec![
            "https://env.example.com/cell2/".to_string(),
            "https://env.example.com/cell3/".to_string(),
        ])
    );

    env::set_var("ENVTEST_REFRESH_TOKEN_LIFETIME", "soon");
    match CellConfig::from_env("ENVTEST") {
        Err(ConfigError::ParseError(_)) => {}
        other => panic!("Expected ParseError, got {other:?}"),
    }

    env::remove_var("ENVTEST_CELL_URL");
    env::remove_var("ENVTEST_SIGNING_KEY");
    env::remove_var("ENVTEST_REFRESH_TOKEN_LIFETIME");
    env::remove_var("ENVTEST_TRUSTED_ISSUERS");
}

#[test]
fn test_config_from_env_missing_variable() {
    env::set_var("MISSINGTEST_CELL_URL", "https://env.example.com/cell1");

    match CellConfig::from_env("MISSINGTEST") {
        Err(ConfigError::EnvVarError(_)) => {}
        other => panic!("Expected EnvVarError, got {other:?}"),
    }

    env::remove_var("MISSINGTEST_CELL_URL");
}

#[test]
fn test_config_from_env_or_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let key_path = temp_dir.path().join("cell.key");
    let ca_path = temp_dir.path().join("ca.crt");
    fs::write(&key_path, format!("{KEY}\n")).unwrap();
    fs::write(&ca_path, CA).unwrap();

    env::set_var("FILETEST_CELL_URL", "https://file.example.com/cell1/");
    env::set_var("FILETEST_SIGNING_KEY_FILE", key_path.to_str().unwrap());
    env::set_var("FILETEST_SERVER_CA_FILE", ca_path.to_str().unwrap());

    let config = CellConfig::from_env_or_file("FILETEST").unwrap();

    assert_eq!(config.cell_url, "https://file.example.com/cell1/");
    assert_eq!(config.signing_key, KEY);
    assert_eq!(config.server_ca.as_deref(), Some(CA));

    env::set_var("FILETEST_SIGNING_KEY_FILE", "/nonexistent/cell.key");
    match CellConfig::from_env_or_file("FILETEST") {
        Err(ConfigError::IOError(_)) => {}
        other => panic!("Expected IOError, got {other:?}"),
    }

    env::remove_var("FILETEST_CELL_URL");
    env::remove_var("FILETEST_SIGNING_KEY_FILE");
    env::remove_var("FILETEST_SERVER_CA_FILE");
}
