//! Error types for the quimage codec.
//!
//! All fallible operations in the crate return [`CodecResult`]. The variants of
//! [`CodecError`] mirror the failure classes a caller has to distinguish:
//!
//! ```text
//! CodecError
//! ├── SchemeNotFound / PathEscape / NotApproved    (resolution, security, policy)
//! ├── SchemeContractViolation                      (malformed scheme bundle or kernel output)
//! ├── InvalidImage / NumericInstability            (composition)
//! ├── InvalidResult                                (decoding)
//! ├── ExecutionFailure(ExecutionError)             (external collaborator, passed through)
//! └── Config(ConfigError)                          (configuration loading / validation)
//! ```
//!
//! Security and policy variants carry the scheme name only. Nothing in this
//! module ever formats a filesystem path into a caller-facing message except
//! [`ConfigError`], which reports on files the caller supplied themselves.

use std::path::PathBuf;

use thiserror::Error;

/// A specialized `Result` type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Top-level error type for the codec.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CodecError {
    /// No scheme with this name exists under the trusted root.
    #[error("Scheme not found: '{name}'")]
    SchemeNotFound {
        /// Requested scheme name
        name: String,
    },

    /// The requested name or entry location would leave the trusted root.
    #[error("Path escape rejected for scheme '{name}'")]
    PathEscape {
        /// Requested scheme name (or entry label for custom bundles)
        name: String,
    },

    /// The approval policy denied the scheme, or could not be evaluated.
    #[error("Scheme not approved: '{name}'")]
    NotApproved {
        /// Requested scheme name
        name: String,
    },

    /// The scheme bundle, or a value one of its kernels produced, broke the
    /// scheme contract.
    #[error("Scheme contract violation in '{scheme}': {reason}")]
    SchemeContractViolation {
        /// Scheme name
        scheme: String,
        /// What was wrong
        reason: String,
    },

    /// The input image cannot be encoded.
    #[error("Invalid image: {message}")]
    InvalidImage {
        /// Description of the problem
        message: String,
    },

    /// Floating-point composition produced an unusable operator.
    #[error("Numeric instability: {message}")]
    NumericInstability {
        /// Description of the problem
        message: String,
    },

    /// Measurement results are malformed or inconsistent.
    #[error("Invalid result: {message}")]
    InvalidResult {
        /// Description of the problem
        message: String,
    },

    /// The external execution service failed.
    #[error("Execution failure: {0}")]
    ExecutionFailure(#[from] ExecutionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CodecError {
    /// Creates a new scheme-not-found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::SchemeNotFound { name: name.into() }
    }

    /// Creates a new path-escape error.
    #[must_use]
    pub fn path_escape(name: impl Into<String>) -> Self {
        Self::PathEscape { name: name.into() }
    }

    /// Creates a new not-approved error.
    #[must_use]
    pub fn not_approved(name: impl Into<String>) -> Self {
        Self::NotApproved { name: name.into() }
    }

    /// Creates a new contract violation error.
    #[must_use]
    pub fn contract(scheme: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemeContractViolation {
            scheme: scheme.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new invalid image error.
    #[must_use]
    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage {
            message: message.into(),
        }
    }

    /// Creates a new numeric instability error.
    #[must_use]
    pub fn numeric(message: impl Into<String>) -> Self {
        Self::NumericInstability {
            message: message.into(),
        }
    }

    /// Creates a new invalid result error.
    #[must_use]
    pub fn invalid_result(message: impl Into<String>) -> Self {
        Self::InvalidResult {
            message: message.into(),
        }
    }

    /// Returns `true` for errors raised by the loader's security or policy
    /// checks.
    #[must_use]
    pub fn is_security(&self) -> bool {
        matches!(self, Self::PathEscape { .. } | Self::NotApproved { .. })
    }

    /// Returns `true` if retrying the same call could succeed.
    ///
    /// The core never retries on its own; this is advice for the caller.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ExecutionFailure(e) => e.is_recoverable(),
            Self::SchemeNotFound { .. }
            | Self::PathEscape { .. }
            | Self::NotApproved { .. }
            | Self::SchemeContractViolation { .. }
            | Self::InvalidImage { .. }
            | Self::NumericInstability { .. }
            | Self::InvalidResult { .. }
            | Self::Config(_) => false,
        }
    }
}

/// Failures reported by the external execution service.
///
/// These are carried through [`CodecError::ExecutionFailure`] unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExecutionError {
    /// The run did not finish within the caller's deadline.
    #[error("execution timed out after {after_ms}ms")]
    Timeout {
        /// Deadline in milliseconds
        after_ms: u64,
    },

    /// The caller cancelled the run.
    #[error("execution cancelled")]
    Cancelled,

    /// The target device is offline or unknown.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The backend could not translate the circuit for the device.
    #[error("transpilation failed: {0}")]
    TranspilationFailed(String),

    /// The circuit needs more qubits than the device offers.
    #[error("circuit requires {qubits} qubits but device supports at most {max}")]
    CircuitTooLarge {
        /// Qubits required
        qubits: u32,
        /// Device capacity
        max: u32,
    },

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl ExecutionError {
    /// Returns `true` if the failure is transient.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::DeviceUnavailable(_) => true,
            Self::Cancelled
            | Self::TranspilationFailed(_)
            | Self::CircuitTooLarge { .. }
            | Self::Backend(_) => false,
        }
    }
}

/// Errors produced when loading or validating a [`CodecConfig`].
///
/// [`CodecConfig`]: crate::config::CodecConfig
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration file could not be read or written.
    #[error("Failed to access config file {path:?}: {source}")]
    FileRead {
        /// Path that was being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A field holds a value outside its valid range, or the file is malformed.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason the value was rejected
        reason: String,
    },

    /// The file extension does not name a supported format.
    #[error("Unsupported config format: {0:?}")]
    UnsupportedFormat(PathBuf),
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors an [`ApprovalPolicy`] store may report.
///
/// Any of these makes the policy gate fall back to its default allow-list.
///
/// [`ApprovalPolicy`]: crate::policy::ApprovalPolicy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The backing store could not be reached.
    #[error("policy store unavailable: {0}")]
    Unavailable(String),

    /// The backing store returned data that could not be interpreted.
    #[error("policy store corrupt: {0}")]
    Corrupt(String),
}
