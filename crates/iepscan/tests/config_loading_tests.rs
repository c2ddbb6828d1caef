//! Table-driven tests for configuration loading and validation.

use std::io::Write;

use iepscan::config::{load_config, load_config_from_str, load_config_or_default};

/// Outcome a case expects: success, or an error containing the substring.
enum Expect {
    Loads,
    Fails(&'static str),
}

struct ConfigTestCase {
    name: &'static str,
    config_json: &'static str,
    expect: Expect,
}

const JSON_CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "empty_object",
        config_json: "{}",
        expect: Expect::Loads,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "server": { "host": "0.0.0.0", "port": 9000, "public_base_url": "https://scans.example.org/" },
            "database": { "path": "/var/lib/iepscan/iepscan.db" },
            "storage": { "directory": "/var/lib/iepscan/blobs", "upload_url_ttl_secs": 600 },
            "upload": { "max_file_size": 10485760 },
            "extraction": {
                "model": "gemini-1.5-pro",
                "temperature": 0.2,
                "api_key_env_var": "IEPSCAN_GEMINI_KEY",
                "worker_count": 4,
                "request_timeout_secs": 60,
                "structured_fields": true
            },
            "auth": { "tokens": [ { "user_id": "teacher-1", "token_env_var": "IEPSCAN_TOKEN" } ] },
            "logging": { "level": "debug", "json": true }
        }"#,
        expect: Expect::Loads,
    },
    ConfigTestCase {
        name: "unknown_top_level_key",
        config_json: r#"{ "input_directory": "/input" }"#,
        expect: Expect::Fails("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_nested_key",
        config_json: r#"{ "upload": { "max_size": 10 } }"#,
        expect: Expect::Fails("Schema validation failed"),
    },
    ConfigTestCase {
        name: "wrong_type",
        config_json: r#"{ "server": { "port": "8080" } }"#,
        expect: Expect::Fails("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_json: r#"{ "version": "2.0" }"#,
        expect: Expect::Fails("Unsupported config version"),
    },
    ConfigTestCase {
        name: "zero_workers",
        config_json: r#"{ "extraction": { "worker_count": 0 } }"#,
        expect: Expect::Fails("worker_count must be greater than 0"),
    },
    ConfigTestCase {
        name: "temperature_out_of_range",
        config_json: r#"{ "extraction": { "temperature": 3.5 } }"#,
        expect: Expect::Fails("temperature must be between 0 and 2"),
    },
    ConfigTestCase {
        name: "token_without_source",
        config_json: r#"{ "auth": { "tokens": [ { "user_id": "teacher-1" } ] } }"#,
        expect: Expect::Fails("has no token source"),
    },
    ConfigTestCase {
        name: "invalid_json",
        config_json: "{ not json",
        expect: Expect::Fails("Failed to parse config JSON"),
    },
];

#[test]
fn test_json_config_loading() {
    for case in JSON_CONFIG_TESTS {
        let result = load_config_from_str(case.config_json);
        match (&case.expect, result) {
            (Expect::Loads, Ok(_)) => {}
            (Expect::Loads, Err(e)) => panic!("{}: expected success, got {}", case.name, e),
            (Expect::Fails(_), Ok(_)) => panic!("{}: expected an error", case.name),
            (Expect::Fails(needle), Err(e)) => {
                let message = e.to_string();
                assert!(
                    message.contains(needle),
                    "{}: error '{}' does not mention '{}'",
                    case.name,
                    message,
                    needle
                );
            }
        }
    }
}

#[test]
fn test_valid_config_field_values() {
    let config = load_config_from_str(JSON_CONFIG_TESTS[1].config_json).unwrap();

    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.base_url(), "https://scans.example.org");
    assert_eq!(config.storage.upload_url_ttl_secs, 600);
    assert_eq!(config.upload.max_file_size, 10 * 1024 * 1024);
    assert_eq!(config.extraction.model, "gemini-1.5-pro");
    assert_eq!(config.extraction.worker_count, 4);
    assert!(config.extraction.structured_fields);
    assert_eq!(config.auth.tokens[0].user_id, "teacher-1");
    assert!(config.logging.json);
}

#[test]
fn test_config_defaults_applied() {
    let config = load_config_from_str("{}").unwrap();

    assert_eq!(config.version, "1.0");
    assert_eq!(config.server.base_url(), "http://127.0.0.1:8080");
    assert_eq!(config.upload.max_file_size, 1024 * 1024);
    assert_eq!(config.extraction.model, "gemini-1.5-flash");
    assert_eq!(config.extraction.worker_count, 2);
    assert_eq!(
        config.extraction.api_key_env_var.as_deref(),
        Some("GEMINI_API_KEY")
    );
    assert!(!config.extraction.structured_fields);
    assert!(config.auth.tokens.is_empty());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_load_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(br#"{ "server": { "port": 9090 } }"#).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.server.port, 9090);

    let config = load_config_or_default(Some(&path)).unwrap();
    assert_eq!(config.server.port, 9090);
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(dir.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
