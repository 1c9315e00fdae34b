//! The capability traits a scheme is assembled from.
//!
//! A scheme is four strategy objects. None of them is ever code read from
//! disk: scheme directories only name kernels from the
//! [`KernelCatalog`](crate::kernels::KernelCatalog).

use std::fmt;

use crate::decoder::{self, DecodeOptions, PayloadLayout};
use crate::error::CodecResult;
use crate::types::{MeasurementCounts, Operator, PixelView, ReconstructedImage, StateVector};

/// Builds the initial register state.
pub trait StatePrep: Send + Sync {
    /// Amplitudes for a register of `n_qubits`; the composer checks the
    /// length and normalizes.
    fn init(&self, n_qubits: u32) -> CodecResult<StateVector>;
}

/// Encodes a spatial position as a basis vector of the position register.
pub trait PositionEncoder: Send + Sync {
    /// Unit vector of length `2^(r * coords.len())`.
    fn data(&self, coords: &[usize], r: u32, view: &PixelView<'_>) -> CodecResult<StateVector>;
}

/// Encodes the value at a position as a block acting on the payload qubits.
pub trait PayloadMap: Send + Sync {
    /// Width of the payload register; every block is `2^payload_qubits` square.
    fn payload_qubits(&self) -> u32;

    /// Whether the map reads a trailing channel axis.
    fn channel_aware(&self) -> bool {
        false
    }

    /// Block for the pixel at `coords`.
    fn map(&self, coords: &[usize], r: u32, view: &PixelView<'_>) -> CodecResult<Operator>;
}

/// Inverts measurement counts into an image.
pub trait Retrieve: Send + Sync {
    /// Bit layout the counts are read with.
    fn layout(&self) -> &PayloadLayout;

    /// Decode `counts`. The default reads them through the generic decoder.
    fn retrieve(
        &self,
        counts: &MeasurementCounts,
        shape: Option<&[usize]>,
        options: &DecodeOptions,
    ) -> CodecResult<ReconstructedImage> {
        decoder::decode(self.layout(), counts, shape, options)
    }
}

/// Where a loaded scheme came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemeOrigin {
    /// Resolved by name under the trusted root and approved by policy
    Registered,
    /// Assembled from explicit entry files; never cached under a name
    Custom,
}

/// A loaded, immutable scheme.
pub struct EncodingScheme {
    name: String,
    origin: SchemeOrigin,
    init: Box<dyn StatePrep>,
    data: Box<dyn PositionEncoder>,
    map: Box<dyn PayloadMap>,
    retrieve: Option<Box<dyn Retrieve>>,
}

impl EncodingScheme {
    /// Assemble a scheme from its parts.
    pub fn new(
        name: impl Into<String>,
        origin: SchemeOrigin,
        init: Box<dyn StatePrep>,
        data: Box<dyn PositionEncoder>,
        map: Box<dyn PayloadMap>,
        retrieve: Option<Box<dyn Retrieve>>,
    ) -> Self {
        Self {
            name: name.into(),
            origin,
            init,
            data,
            map,
            retrieve,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> SchemeOrigin {
        self.origin
    }

    pub fn init(&self) -> &dyn StatePrep {
        self.init.as_ref()
    }

    pub fn data(&self) -> &dyn PositionEncoder {
        self.data.as_ref()
    }

    pub fn map(&self) -> &dyn PayloadMap {
        self.map.as_ref()
    }

    /// The inversion entry, absent for encode-only schemes.
    pub fn retrieve(&self) -> Option<&dyn Retrieve> {
        self.retrieve.as_deref()
    }
}

impl fmt::Debug for EncodingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodingScheme")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("payload_qubits", &self.map.payload_qubits())
            .field("has_retrieve", &self.retrieve.is_some())
            .finish()
    }
}
