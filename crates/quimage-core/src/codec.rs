//! The codec facade: resolve a scheme, then encode or retrieve with it.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::info;

use crate::composer::{self, ComposeOptions};
use crate::config::CodecConfig;
use crate::decoder::DecodeOptions;
use crate::error::{CodecError, CodecResult};
use crate::execution::{self, Executor, RunOptions};
use crate::policy::ApprovalPolicy;
use crate::registry::{SchemeHandle, SchemeRegistry};
use crate::scheme::EncodingScheme;
use crate::types::{CircuitDescriptor, Image, MeasurementCounts, ReconstructedImage};

/// Encode images into circuit descriptors and decode measurement counts.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use quimage_core::{Codec, CodecConfig, Image, StaticPolicy};
///
/// # fn main() -> Result<(), quimage_core::CodecError> {
/// let config = CodecConfig::with_root("schemes");
/// let codec = Codec::new(config, Arc::new(StaticPolicy::new(["frqi"])))?;
///
/// let image = Image::new(ndarray::array![[0.0, 255.0], [128.0, 64.0]].into_dyn())?;
/// let descriptor = codec.encode("frqi", &image, None)?;
/// assert_eq!(descriptor.n_qubits, 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Codec {
    registry: SchemeRegistry,
}

impl Codec {
    /// # Errors
    ///
    /// Returns [`CodecError::Config`] if `config` is invalid.
    pub fn new(config: CodecConfig, policy: Arc<dyn ApprovalPolicy>) -> CodecResult<Self> {
        Ok(Self::from_registry(SchemeRegistry::new(config, policy)?))
    }

    pub fn from_registry(registry: SchemeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CodecConfig {
        self.registry.config()
    }

    /// Encode `image` with the registered scheme `name`.
    ///
    /// `dimensionality` fixes how many leading axes are spatial; `None`
    /// infers it from the image and scheme.
    pub fn encode(
        &self,
        name: &str,
        image: &Image,
        dimensionality: Option<usize>,
    ) -> CodecResult<CircuitDescriptor> {
        let scheme = self.registry.get(name)?;
        self.encode_scheme(&scheme, image, dimensionality)
    }

    /// Encode with an already resolved handle, e.g. a custom bundle.
    pub fn encode_with(
        &self,
        handle: &SchemeHandle,
        image: &Image,
        dimensionality: Option<usize>,
    ) -> CodecResult<CircuitDescriptor> {
        let scheme = self.registry.load(handle)?;
        self.encode_scheme(&scheme, image, dimensionality)
    }

    /// Encode with a scheme object directly.
    pub fn encode_scheme(
        &self,
        scheme: &EncodingScheme,
        image: &Image,
        dimensionality: Option<usize>,
    ) -> CodecResult<CircuitDescriptor> {
        composer::compose(
            scheme,
            image,
            dimensionality,
            &ComposeOptions::from_config(self.config()),
        )
    }

    /// Run `descriptor` on an external executor.
    ///
    /// See [`execution::execute`].
    pub async fn execute(
        &self,
        executor: Arc<dyn Executor>,
        descriptor: Arc<CircuitDescriptor>,
        options: RunOptions,
        cancel: Option<oneshot::Receiver<()>>,
    ) -> CodecResult<MeasurementCounts> {
        execution::execute(executor, descriptor, options, cancel).await
    }

    /// Reconstruct an image from counts under the registered scheme `name`.
    ///
    /// `shape` is the spatial shape of the original image; without it a
    /// square shape is inferred from the position bits.
    pub fn retrieve(
        &self,
        name: &str,
        counts: &MeasurementCounts,
        shape: Option<&[usize]>,
    ) -> CodecResult<ReconstructedImage> {
        let scheme = self.registry.get(name)?;
        self.retrieve_scheme(&scheme, counts, shape)
    }

    /// Retrieve with an already resolved handle.
    pub fn retrieve_with(
        &self,
        handle: &SchemeHandle,
        counts: &MeasurementCounts,
        shape: Option<&[usize]>,
    ) -> CodecResult<ReconstructedImage> {
        let scheme = self.registry.load(handle)?;
        self.retrieve_scheme(&scheme, counts, shape)
    }

    /// Parse a JSON counts payload and retrieve.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidResult`] for anything but a JSON object of
    /// bitstrings to non-negative integers.
    pub fn retrieve_json(
        &self,
        name: &str,
        payload: &str,
        shape: Option<&[usize]>,
    ) -> CodecResult<ReconstructedImage> {
        let scheme = self.registry.get(name)?;
        let counts = MeasurementCounts::from_json(payload)?;
        self.retrieve_scheme(&scheme, &counts, shape)
    }

    fn retrieve_scheme(
        &self,
        scheme: &EncodingScheme,
        counts: &MeasurementCounts,
        shape: Option<&[usize]>,
    ) -> CodecResult<ReconstructedImage> {
        let retrieve = scheme.retrieve().ok_or_else(|| {
            CodecError::contract(scheme.name(), "scheme has no retrieve entry")
        })?;
        let image = retrieve.retrieve(counts, shape, &DecodeOptions::from_config(self.config()))?;
        info!(
            scheme = scheme.name(),
            shape = ?image.shape(),
            total = counts.total(),
            "retrieved image"
        );
        Ok(image)
    }
}
