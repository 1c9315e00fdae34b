//! # quimage core
//!
//! Classical side of a quantum image codec: turns an n-dimensional image
//! into a circuit descriptor (initial state plus one unitary) and turns
//! measurement counts from that circuit back into an image.
//!
//! - **Schemes**: an encoding scheme is a directory under a trusted root
//!   whose JSON entry files name compiled-in kernels. The [`registry`]
//!   resolves names through a lexical check, an [`ApprovalPolicy`] and path
//!   confinement before anything is read.
//! - **Composition**: the [`composer`] sums `|v⟩⟨v| ⊗ M` over all pixels and
//!   orthonormalizes the result.
//! - **Decoding**: the [`decoder`] reads counts through a scheme's bit layout.
//! - **Execution**: the [`execution`] module defines the async [`Executor`]
//!   boundary; the codec never simulates circuits itself.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use quimage_core::prelude::*;
//!
//! # fn main() -> CodecResult<()> {
//! let codec = Codec::new(
//!     CodecConfig::with_root("schemes"),
//!     Arc::new(StaticPolicy::new(["frqi"])),
//! )?;
//! let counts = MeasurementCounts::from_json(r#"{"000": 10, "001": 10, "010": 20}"#)?;
//! let image = codec.retrieve("frqi", &counts, Some(&[2, 2]))?;
//! println!("{image}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod codec;
pub mod composer;
pub mod config;
pub mod decoder;
pub mod error;
pub mod execution;
pub mod kernels;
pub mod loader;
pub mod logging;
pub mod policy;
pub mod registry;
pub mod scheme;
pub mod types;

pub use codec::Codec;
pub use composer::{compose, register_bits, ComposeOptions};
pub use config::CodecConfig;
pub use decoder::{DecodeOptions, PayloadLayout, PositionLayout, Readout};
pub use error::{CodecError, CodecResult, ConfigError, ExecutionError, PolicyError};
pub use execution::{execute, Executor, RunOptions};
pub use kernels::{EntryPoint, KernelCatalog, KernelSpec};
pub use logging::Verbosity;
pub use policy::{AllowList, ApprovalPolicy, FilePolicy, PolicyGate, StaticPolicy};
pub use registry::{CustomBundle, SchemeHandle, SchemeRegistry};
pub use scheme::{EncodingScheme, PayloadMap, PositionEncoder, Retrieve, SchemeOrigin, StatePrep};
pub use types::{
    ChannelReduction, CircuitDescriptor, CircuitMetadata, Image, MeasurementCounts, Operator,
    ReconstructedImage, StateVector,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient re-exports.
///
/// ```rust
/// use quimage_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::codec::Codec;
    pub use crate::config::CodecConfig;
    pub use crate::error::{CodecError, CodecResult};
    pub use crate::execution::{Executor, RunOptions};
    pub use crate::policy::{ApprovalPolicy, FilePolicy, StaticPolicy};
    pub use crate::registry::CustomBundle;
    pub use crate::types::{CircuitDescriptor, Image, MeasurementCounts, ReconstructedImage};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_valid() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(CodecConfig::default().validate().is_ok());
    }
}
