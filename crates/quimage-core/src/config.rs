//! Codec configuration.
//!
//! [`CodecConfig`] is threaded explicitly through the registry, composer and
//! decoder. Nothing in the crate reads process-wide settings. It can be stored
//! as JSON or TOML; [`CodecConfig::from_file`] picks the format by extension.
//!
//! # Example
//!
//! ```rust
//! use quimage_core::config::CodecConfig;
//!
//! let cfg = CodecConfig::default();
//! cfg.validate().expect("default config is valid");
//!
//! assert_eq!(cfg.default_dimensionality, 2);
//! assert!(!cfg.allow_custom_bundles);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::Verbosity;

/// Largest register the composer will build by default (a 1024x1024 operator).
pub const DEFAULT_MAX_QUBITS: u32 = 10;

/// Hard ceiling on `max_qubits`; bitstring positions are decoded into `u64`.
pub const QUBIT_CEILING: u32 = 24;

/// Complete configuration for a codec instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    /// Directory holding one sub-directory per scheme. Scheme resolution
    /// never leaves it. Default: **`schemes`**.
    pub trusted_root: PathBuf,

    /// Names approved when the policy store is unreachable.
    ///
    /// `None` means there is no fallback and an unreachable store denies
    /// everything. Default: **`None`**.
    pub default_allow_list: Option<Vec<String>>,

    /// How long a policy lookup may take before the fallback decides.
    /// Default: **500 ms**.
    pub policy_timeout_ms: u64,

    /// Permit loading raw init/data/map entry files outside the name-based
    /// registry. Intended for local tooling only. Default: **false**.
    pub allow_custom_bundles: bool,

    /// Maximum Frobenius norm of `U†U − I` accepted after orthonormalization.
    /// Default: **1e-6**.
    pub unitarity_tolerance: f64,

    /// Number of spatial axes assumed when decoding without a declared
    /// shape. Default: **2**.
    pub default_dimensionality: usize,

    /// Upper bound on the composed register size. Default: **10**.
    pub max_qubits: u32,

    /// Maximum size of a single scheme entry file in bytes. Default: **64 KiB**.
    pub max_entry_bytes: u64,

    /// Evaluate per-coordinate kernels on the rayon pool. Summation order is
    /// unaffected. Default: **true**.
    pub parallel: bool,

    /// Diagnostic verbosity. Default: **error**.
    pub verbosity: Verbosity,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            trusted_root: PathBuf::from("schemes"),
            default_allow_list: None,
            policy_timeout_ms: 500,
            allow_custom_bundles: false,
            unitarity_tolerance: 1e-6,
            default_dimensionality: 2,
            max_qubits: DEFAULT_MAX_QUBITS,
            max_entry_bytes: 64 * 1024,
            parallel: true,
            verbosity: Verbosity::Error,
        }
    }
}

impl CodecConfig {
    /// Default configuration rooted at `trusted_root`.
    pub fn with_root(trusted_root: impl Into<PathBuf>) -> Self {
        Self {
            trusted_root: trusted_root.into(),
            ..Self::default()
        }
    }

    /// Policy lookup deadline as a [`Duration`].
    #[must_use]
    pub fn policy_timeout(&self) -> Duration {
        Duration::from_millis(self.policy_timeout_ms)
    }

    /// Load a [`CodecConfig`] from a JSON file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be opened and
    /// [`ConfigError::InvalidValue`] if it is malformed or fails validation.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = read(path)?;
        let cfg: CodecConfig = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::invalid_value("(file)", e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a [`CodecConfig`] from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Same as [`CodecConfig::from_json`].
    pub fn from_toml(path: &Path) -> Result<Self, ConfigError> {
        let contents = read(path)?;
        let cfg: CodecConfig = toml::from_str(&contents)
            .map_err(|e| ConfigError::invalid_value("(file)", e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `path`, choosing the format from its extension
    /// (`.json` or `.toml`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedFormat`] for any other extension.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(path),
            Some("toml") => Self::from_toml(path),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Serialize this configuration to pretty-printed JSON and write it to
    /// `path`, creating parent directories if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the directory cannot be created or
    /// the file cannot be written.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate all fields and return an error describing the first problem
    /// found.
    ///
    /// # Validated invariants
    ///
    /// - `trusted_root` is non-empty.
    /// - `policy_timeout_ms` is at least 1.
    /// - `unitarity_tolerance` is finite and in `(0, 1)`.
    /// - `default_dimensionality` is at least 1.
    /// - `max_qubits` is in `[1, QUBIT_CEILING]`.
    /// - `max_entry_bytes` is at least 1.
    /// - Allow-list entries are non-empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trusted_root.as_os_str().is_empty() {
            return Err(ConfigError::invalid_value("trusted_root", "must not be empty"));
        }
        if self.policy_timeout_ms == 0 {
            return Err(ConfigError::invalid_value("policy_timeout_ms", "must be > 0"));
        }
        if !self.unitarity_tolerance.is_finite()
            || self.unitarity_tolerance <= 0.0
            || self.unitarity_tolerance >= 1.0
        {
            return Err(ConfigError::invalid_value(
                "unitarity_tolerance",
                "must be in (0.0, 1.0)",
            ));
        }
        if self.default_dimensionality == 0 {
            return Err(ConfigError::invalid_value(
                "default_dimensionality",
                "must be > 0",
            ));
        }
        if self.max_qubits == 0 || self.max_qubits > QUBIT_CEILING {
            return Err(ConfigError::invalid_value(
                "max_qubits",
                format!("must be in [1, {QUBIT_CEILING}]"),
            ));
        }
        if self.max_entry_bytes == 0 {
            return Err(ConfigError::invalid_value("max_entry_bytes", "must be > 0"));
        }
        if let Some(list) = &self.default_allow_list {
            if list.iter().any(|name| name.trim().is_empty()) {
                return Err(ConfigError::invalid_value(
                    "default_allow_list",
                    "entries must be non-empty",
                ));
            }
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}
