//! Boundary to an external circuit executor.
//!
//! The codec never runs circuits itself. An [`Executor`] takes a
//! [`CircuitDescriptor`] and returns raw counts; [`execute`] wraps one call
//! with a deadline, an optional cancellation signal and validation of what
//! comes back. Failures are passed through as
//! [`CodecError::ExecutionFailure`] and never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{CodecError, CodecResult, ConfigError, ExecutionError};
use crate::types::{CircuitDescriptor, MeasurementCounts};

/// Default shot count.
pub const DEFAULT_SHOTS: u64 = 1024;

/// Default deadline for one run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A device or simulator that samples a descriptor.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Prepare, evolve and measure `descriptor` `options.shots` times.
    async fn run(
        &self,
        descriptor: &CircuitDescriptor,
        options: &RunOptions,
    ) -> Result<MeasurementCounts, ExecutionError>;
}

/// Per-run options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub shots: u64,
    pub timeout: Duration,
    /// Zero-fill every one of the `2^n_qubits` outcomes before returning.
    pub pad_counts: bool,
    /// Backend-specific device name.
    pub device: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            shots: DEFAULT_SHOTS,
            timeout: DEFAULT_TIMEOUT,
            pad_counts: false,
            device: None,
        }
    }
}

impl RunOptions {
    pub fn with_shots(mut self, shots: u64) -> Self {
        self.shots = shots;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shots == 0 {
            return Err(ConfigError::invalid_value("shots", "must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::invalid_value("timeout", "must be positive"));
        }
        Ok(())
    }
}

/// Run `descriptor` on `executor`.
///
/// The run happens on a spawned task. It is aborted when `options.timeout`
/// elapses or when `cancel` fires; a cancel sender that is dropped without
/// sending does not cancel. Returned counts must use `n_qubits`-bit keys
/// and report at most `shots` outcomes.
///
/// # Errors
///
/// - [`CodecError::Config`] for invalid `options`
/// - [`CodecError::ExecutionFailure`] for executor errors, timeouts,
///   cancellation or a panicked run
/// - [`CodecError::InvalidResult`] for counts that do not fit the circuit
pub async fn execute(
    executor: Arc<dyn Executor>,
    descriptor: Arc<CircuitDescriptor>,
    options: RunOptions,
    cancel: Option<oneshot::Receiver<()>>,
) -> CodecResult<MeasurementCounts> {
    options.validate()?;
    let backend = executor.name().to_owned();
    debug!(
        backend = %backend,
        n_qubits = descriptor.n_qubits,
        shots = options.shots,
        "submitting circuit"
    );

    let task = {
        let descriptor = Arc::clone(&descriptor);
        let options = options.clone();
        tokio::spawn(async move { executor.run(&descriptor, &options).await })
    };
    let abort = task.abort_handle();

    let cancelled = async move {
        match cancel {
            Some(rx) => {
                if rx.await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    };

    let outcome = tokio::select! {
        () = cancelled => {
            abort.abort();
            Err(ExecutionError::Cancelled)
        }
        joined = tokio::time::timeout(options.timeout, task) => match joined {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ExecutionError::Backend(format!("run aborted: {join}"))),
            Err(_) => {
                abort.abort();
                Err(ExecutionError::Timeout {
                    after_ms: u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        },
    };

    let counts = outcome.map_err(|e| {
        warn!(backend = %backend, error = %e, "execution failed");
        CodecError::ExecutionFailure(e)
    })?;
    counts.validate_against(&descriptor, options.shots)?;
    let counts = if options.pad_counts {
        counts.padded(descriptor.n_qubits)?
    } else {
        counts
    };
    info!(
        backend = %backend,
        outcomes = counts.len(),
        total = counts.total(),
        "execution finished"
    );
    Ok(counts)
}
