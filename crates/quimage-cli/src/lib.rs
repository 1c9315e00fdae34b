//! quimage CLI
//!
//! Command-line front end for the quimage codec.
//!
//! # Usage
//!
//! ```bash
//! # List the schemes under the trusted root
//! quimage --root schemes list --approved
//!
//! # Encode a .npy image into a circuit descriptor
//! quimage encode frqi --input cat.npy --output cat.circuit.json
//!
//! # Sample it without a device
//! quimage simulate --circuit cat.circuit.json --shots 100000 --output counts.json
//!
//! # Decode measurement counts back into an image
//! quimage -vv retrieve frqi --counts counts.json --shape 4,4 --output cat.out.npy
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub mod commands;

/// quimage command line interface
#[derive(Parser, Debug)]
#[command(name = "quimage")]
#[command(author, version, about = "Quantum image encoding and retrieval")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Increase verbosity (-v warning, -vv info, -vvv debug, -vvvv math,
    /// -vvvvv state, -vvvvvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Codec configuration file (.json or .toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Trusted scheme root, overriding the configuration
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// JSON approval file; defaults to `approvals.json` in the trusted root
    #[arg(long, global = true)]
    pub approvals: Option<PathBuf>,

    /// Accept custom entry-point bundles (`encode --init/--data/--map`)
    #[arg(long, global = true)]
    pub allow_custom: bool,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List schemes under the trusted root
    List(commands::ListArgs),

    /// Encode an image into a circuit descriptor
    Encode(commands::EncodeArgs),

    /// Sample a circuit descriptor on the ideal local executor
    Simulate(commands::SimulateArgs),

    /// Reconstruct an image from measurement counts
    Retrieve(commands::RetrieveArgs),

    /// Display version information
    Version,
}
