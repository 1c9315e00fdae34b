//! Command handlers
//!
//! Each subcommand has an `Args` struct and an `execute_*` handler. Handlers
//! build a [`Codec`] from the global options, do their work and print or
//! write the result.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Args;
use ndarray::ArrayD;
use ndarray_npy::{read_npy, write_npy};
use tracing::{debug, info};

use quimage_core::composer::output_probabilities;
use quimage_core::{
    CircuitDescriptor, Codec, CodecConfig, CustomBundle, ExecutionError, Executor, FilePolicy,
    Image, MeasurementCounts, RunOptions, Verbosity,
};

use crate::GlobalArgs;

/// Name of the approval file looked up in the trusted root.
pub const APPROVALS_FILE: &str = "approvals.json";

/// Arguments for `list`
#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Only show schemes the approval policy accepts
    #[arg(short, long)]
    pub approved: bool,
}

/// Arguments for `encode`
#[derive(Args, Debug, Clone)]
pub struct EncodeArgs {
    /// Registered scheme name
    #[arg(required_unless_present = "init", conflicts_with = "init")]
    pub scheme: Option<String>,

    /// Image as a .npy array (f64, f32 or u8)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Number of leading spatial axes; inferred when omitted
    #[arg(short, long)]
    pub dims: Option<usize>,

    /// Write the descriptor JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Custom bundle: init entry file, relative to the trusted root
    #[arg(long, requires_all = ["data", "map"])]
    pub init: Option<PathBuf>,

    /// Custom bundle: data entry file
    #[arg(long, requires_all = ["init", "map"])]
    pub data: Option<PathBuf>,

    /// Custom bundle: map entry file
    #[arg(long, requires_all = ["init", "data"])]
    pub map: Option<PathBuf>,

    /// Custom bundle: optional retrieve entry file
    #[arg(long, requires = "init")]
    pub retrieve: Option<PathBuf>,
}

/// Arguments for `simulate`
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Circuit descriptor JSON produced by `encode`
    #[arg(short, long)]
    pub circuit: PathBuf,

    /// Number of shots
    #[arg(short, long, default_value_t = quimage_core::execution::DEFAULT_SHOTS)]
    pub shots: u64,

    /// Deadline in seconds
    #[arg(short, long, default_value_t = 60)]
    pub timeout: u64,

    /// Report every outcome, including zero counts
    #[arg(long)]
    pub pad: bool,

    /// Write the counts JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `retrieve`
#[derive(Args, Debug, Clone)]
pub struct RetrieveArgs {
    /// Registered scheme name
    pub scheme: String,

    /// Measurement counts as a JSON object of bitstrings to counts
    #[arg(short, long)]
    pub counts: PathBuf,

    /// Spatial shape of the original image, e.g. `4,4`
    #[arg(short, long, value_delimiter = ',')]
    pub shape: Option<Vec<usize>>,

    /// Write the image as .npy instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Build the codec described by the global options.
pub fn build_codec(global: &GlobalArgs) -> Result<Codec> {
    let mut config = match &global.config {
        Some(path) => CodecConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CodecConfig::default(),
    };
    if let Some(root) = &global.root {
        config.trusted_root = root.clone();
    }
    if global.allow_custom {
        config.allow_custom_bundles = true;
    }
    config.verbosity = config
        .verbosity
        .max(Verbosity::from_occurrences(global.verbose));

    let approvals = global
        .approvals
        .clone()
        .unwrap_or_else(|| config.trusted_root.join(APPROVALS_FILE));
    debug!(approvals = %approvals.display(), root = %config.trusted_root.display(), "building codec");

    Ok(Codec::new(config, Arc::new(FilePolicy::new(approvals)))?)
}

/// Execute `list`
pub fn execute_list(global: &GlobalArgs, args: ListArgs) -> Result<()> {
    let codec = build_codec(global)?;
    let names = if args.approved {
        codec.registry().list_approved()?
    } else {
        codec.registry().list()?
    };
    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// Execute `encode`
pub fn execute_encode(global: &GlobalArgs, args: EncodeArgs) -> Result<()> {
    let codec = build_codec(global)?;
    let image = read_image(&args.input)?;

    let descriptor = match (&args.scheme, &args.init, &args.data, &args.map) {
        (Some(name), _, _, _) => codec.encode(name, &image, args.dims)?,
        (None, Some(init), Some(data), Some(map)) => {
            let mut bundle = CustomBundle::new(init, data, map);
            if let Some(retrieve) = &args.retrieve {
                bundle = bundle.with_retrieve(retrieve);
            }
            let handle = codec.registry().resolve_custom(&bundle)?;
            codec.encode_with(&handle, &image, args.dims)?
        }
        _ => bail!("either a scheme name or --init, --data and --map are required"),
    };
    info!(
        scheme = %descriptor.metadata.scheme,
        n_qubits = descriptor.n_qubits,
        "encoded {}",
        args.input.display()
    );

    emit(args.output.as_deref(), &descriptor.to_json()?)
}

/// Execute `simulate`
pub async fn execute_simulate(global: &GlobalArgs, args: SimulateArgs) -> Result<()> {
    let codec = build_codec(global)?;
    let text = fs::read_to_string(&args.circuit)
        .with_context(|| format!("reading {}", args.circuit.display()))?;
    let descriptor: CircuitDescriptor = serde_json::from_str(&text)
        .with_context(|| format!("parsing descriptor {}", args.circuit.display()))?;

    let options = RunOptions {
        pad_counts: args.pad,
        ..RunOptions::default()
            .with_shots(args.shots)
            .with_timeout(Duration::from_secs(args.timeout))
    };
    let counts = codec
        .execute(Arc::new(IdealExecutor), Arc::new(descriptor), options, None)
        .await?;

    emit(args.output.as_deref(), &counts.to_json())
}

/// Execute `retrieve`
pub fn execute_retrieve(global: &GlobalArgs, args: RetrieveArgs) -> Result<()> {
    let codec = build_codec(global)?;
    let payload = fs::read_to_string(&args.counts)
        .with_context(|| format!("reading {}", args.counts.display()))?;
    let image = codec.retrieve_json(&args.scheme, &payload, args.shape.as_deref())?;

    match &args.output {
        Some(path) => {
            write_npy(path, image.as_array())
                .with_context(|| format!("writing {}", path.display()))?;
            info!("wrote {:?} image to {}", image.shape(), path.display());
        }
        None => print!("{image}"),
    }
    Ok(())
}

/// Load a .npy image, accepting f64, f32 and u8 element types.
pub fn read_image(path: &Path) -> Result<Image> {
    if let Ok(data) = read_npy::<_, ArrayD<f64>>(path) {
        return Ok(Image::new(data)?);
    }
    if let Ok(data) = read_npy::<_, ArrayD<f32>>(path) {
        return Ok(Image::new(data.mapv(f64::from))?);
    }
    let data: ArrayD<u8> =
        read_npy(path).with_context(|| format!("reading image {}", path.display()))?;
    Ok(Image::from_u8(data)?)
}

fn emit(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

/// Noise-free local executor.
///
/// Reports `floor(p * shots)` for each outcome of `U|ψ₀⟩`, so the counts are
/// the expected histogram rather than a random sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdealExecutor;

#[async_trait]
impl Executor for IdealExecutor {
    fn name(&self) -> &str {
        "ideal"
    }

    async fn run(
        &self,
        descriptor: &CircuitDescriptor,
        options: &RunOptions,
    ) -> Result<MeasurementCounts, ExecutionError> {
        let width = descriptor.n_qubits as usize;
        let shots = options.shots as f64;
        let pairs: Vec<(String, u64)> = output_probabilities(descriptor)
            .iter()
            .enumerate()
            .map(|(i, p)| (format!("{i:0width$b}"), (p * shots).floor() as u64))
            .filter(|(_, n)| *n > 0)
            .collect();
        if pairs.is_empty() {
            return Err(ExecutionError::Backend(
                "no outcome reached a whole shot".to_string(),
            ));
        }
        MeasurementCounts::from_pairs(pairs).map_err(|e| ExecutionError::Backend(e.to_string()))
    }
}
