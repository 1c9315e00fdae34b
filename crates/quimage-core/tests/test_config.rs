//! Integration tests for [`quimage_core::config`].

use std::fs;
use std::sync::Arc;

use quimage_core::config::{CodecConfig, DEFAULT_MAX_QUBITS, QUBIT_CEILING};
use quimage_core::{CodecError, ConfigError, SchemeRegistry, StaticPolicy, Verbosity};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[test]
fn default_config_is_valid() {
    CodecConfig::default()
        .validate()
        .expect("default CodecConfig must be valid");
}

/// Defaults fail closed: no fallback list, no custom bundles.
#[test]
fn defaults_are_restrictive() {
    let cfg = CodecConfig::default();
    assert!(cfg.default_allow_list.is_none());
    assert!(!cfg.allow_custom_bundles);
    assert_eq!(cfg.max_qubits, DEFAULT_MAX_QUBITS);
    assert!(cfg.max_qubits <= QUBIT_CEILING);
    assert_eq!(cfg.verbosity, Verbosity::Error);
    assert!(cfg.unitarity_tolerance <= 1e-6);
}

// ---------------------------------------------------------------------------
// File formats
// ---------------------------------------------------------------------------

#[test]
fn json_roundtrip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/codec.json");
    let cfg = CodecConfig {
        default_allow_list: Some(vec!["frqi".into(), "neqr".into()]),
        policy_timeout_ms: 250,
        verbosity: Verbosity::Math,
        parallel: false,
        ..CodecConfig::with_root("/srv/schemes")
    };
    cfg.to_json(&path).unwrap();

    let loaded = CodecConfig::from_file(&path).unwrap();
    assert_eq!(loaded, cfg);
}

#[test]
fn toml_file_with_partial_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codec.toml");
    fs::write(
        &path,
        r#"
trusted_root = "schemes"
max_qubits = 16
allow_custom_bundles = true
verbosity = "state"
"#,
    )
    .unwrap();

    let cfg = CodecConfig::from_file(&path).unwrap();
    assert_eq!(cfg.max_qubits, 16);
    assert!(cfg.allow_custom_bundles);
    assert_eq!(cfg.verbosity, Verbosity::State);
    assert_eq!(cfg.policy_timeout_ms, CodecConfig::default().policy_timeout_ms);
}

#[test]
fn unsupported_extension_is_rejected() {
    let err = CodecConfig::from_file(std::path::Path::new("codec.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
}

#[test]
fn missing_file_is_file_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = CodecConfig::from_file(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::FileRead { .. }));
}

/// Values that parse but break an invariant are rejected at load time.
#[test]
fn invalid_values_fail_on_load() {
    let dir = tempfile::tempdir().unwrap();
    for (name, body) in [
        ("zero_timeout.json", r#"{"policy_timeout_ms": 0}"#),
        ("wide.json", r#"{"max_qubits": 64}"#),
        ("typo.json", r#"{"max_qbits": 4}"#),
        ("verbosity.json", r#"{"verbosity": "shouting"}"#),
    ] {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        let err = CodecConfig::from_file(&path).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { .. }),
            "{name}: {err}"
        );
    }
}

// ---------------------------------------------------------------------------
// Registry construction
// ---------------------------------------------------------------------------

#[test]
fn registry_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = CodecConfig {
        unitarity_tolerance: -1.0,
        ..CodecConfig::with_root(dir.path())
    };
    let err = SchemeRegistry::new(cfg, Arc::new(StaticPolicy::default())).unwrap_err();
    assert!(matches!(err, CodecError::Config(ConfigError::InvalidValue { .. })));
}

#[test]
fn registry_requires_existing_root() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = CodecConfig::with_root(dir.path().join("missing"));
    let err = SchemeRegistry::new(cfg, Arc::new(StaticPolicy::default())).unwrap_err();
    assert!(matches!(err, CodecError::Config(ConfigError::FileRead { .. })));
}
