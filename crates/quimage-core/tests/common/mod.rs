//! Shared fixtures for the quimage-core integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use quimage_core::composer::output_probabilities;
use quimage_core::{
    CircuitDescriptor, Codec, CodecConfig, ExecutionError, Executor, MeasurementCounts,
    RunOptions, StaticPolicy,
};

/// Names of the schemes shipped in the repository's `schemes/` tree.
pub const SHIPPED: [&str; 13] = [
    "efrqi", "frqci", "frqi", "ifrqi", "lpiqe", "mcqi", "mfrqi", "naqss", "ncqi", "neqr", "oqim",
    "qrci", "qualpi",
];

/// The repository's `schemes/` directory.
pub fn shipped_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../schemes")
}

/// A codec over the shipped schemes with every one of them approved.
pub fn shipped_codec(configure: impl FnOnce(&mut CodecConfig)) -> Codec {
    let mut config = CodecConfig::with_root(shipped_root());
    configure(&mut config);
    Codec::new(config, Arc::new(StaticPolicy::new(SHIPPED)))
        .expect("shipped scheme tree must load")
}

// ---------------------------------------------------------------------------
// Temporary scheme trees
// ---------------------------------------------------------------------------

/// A temporary directory laid out as `<tmp>/root/<scheme>/<entry>.json`,
/// with `<tmp>/outside` available for escape attempts.
pub struct SchemeTree {
    dir: TempDir,
}

impl SchemeTree {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("root")).expect("create root");
        fs::create_dir(dir.path().join("outside")).expect("create outside");
        Self { dir }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("root")
    }

    pub fn outside(&self) -> PathBuf {
        self.dir.path().join("outside")
    }

    /// Write `entries` (file stem, JSON text) into `root/<name>/`.
    pub fn scheme(&self, name: &str, entries: &[(&str, &str)]) -> &Self {
        let dir = self.root().join(name);
        fs::create_dir_all(&dir).expect("create scheme dir");
        for (stem, text) in entries {
            fs::write(dir.join(format!("{stem}.json")), text).expect("write entry");
        }
        self
    }

    /// A complete single-qubit angle scheme.
    pub fn frqi_like(&self, name: &str) -> &Self {
        self.scheme(name, FRQI_ENTRIES)
    }

    /// Write `entries` into `outside/<name>/`.
    pub fn outside_scheme(&self, name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let dir = self.outside().join(name);
        fs::create_dir_all(&dir).expect("create outside dir");
        for (stem, text) in entries {
            fs::write(dir.join(format!("{stem}.json")), text).expect("write entry");
        }
        dir
    }

    pub fn config(&self) -> CodecConfig {
        CodecConfig::with_root(self.root())
    }
}

pub const FRQI_ENTRIES: &[(&str, &str)] = &[
    (
        "init",
        r#"{"kernel": "uniform_positions", "params": {"payload_qubits": 1}}"#,
    ),
    ("data", r#"{"kernel": "row_major_basis"}"#),
    ("map", r#"{"kernel": "ry_angle"}"#),
    ("retrieve", r#"{"kernel": "probability"}"#),
];

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Deterministic stand-in for a device: outcome `i` is reported
/// `floor(p_i * shots)` times, where `p_i = |(U·ψ)_i|²`.
pub struct BornRuleExecutor;

#[async_trait]
impl Executor for BornRuleExecutor {
    fn name(&self) -> &str {
        "born-rule"
    }

    async fn run(
        &self,
        descriptor: &CircuitDescriptor,
        options: &RunOptions,
    ) -> Result<MeasurementCounts, ExecutionError> {
        let width = descriptor.n_qubits as usize;
        let probs = output_probabilities(descriptor);
        let pairs: Vec<(String, u64)> = probs
            .iter()
            .enumerate()
            .map(|(i, p)| (format!("{i:0width$b}"), (p * options.shots as f64).floor() as u64))
            .filter(|(_, n)| *n > 0)
            .collect();
        MeasurementCounts::from_pairs(pairs).map_err(|e| ExecutionError::Backend(e.to_string()))
    }
}
