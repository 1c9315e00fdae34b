//! Operator composition.
//!
//! For every spatial coordinate, in row-major order, the scheme's data kernel
//! yields a position basis vector `|v⟩` and its map kernel a payload block
//! `M`. The global operator is
//!
//! ```text
//! G = Σ_coords |v⟩⟨v| ⊗ M
//! ```
//!
//! `G` is QR-orthonormalized into the unitary `U` of the descriptor. Column
//! phases of `Q` are normalized against the diagonal of `R`, so a `G` that is
//! already unitary comes back unchanged.
//!
//! Kernel evaluation may run on the rayon pool; the sum is always taken
//! sequentially in row-major order so results are bit-identical either way.

use nalgebra::DVector;
use ndarray::{Dimension, IxDyn};
use num_complex::Complex64;
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::config::CodecConfig;
use crate::error::{CodecError, CodecResult};
use crate::logging::{tabulate_complex, Verbosity};
use crate::scheme::EncodingScheme;
use crate::types::{CircuitDescriptor, CircuitMetadata, Image, Operator, PixelView, StateVector};

/// Tolerance for unit norms and vanishing diagonal entries.
const NORM_EPS: f64 = 1e-9;

/// Knobs the composer reads from a [`CodecConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComposeOptions {
    pub max_qubits: u32,
    pub unitarity_tolerance: f64,
    pub parallel: bool,
    pub verbosity: Verbosity,
}

impl ComposeOptions {
    pub fn from_config(config: &CodecConfig) -> Self {
        Self {
            max_qubits: config.max_qubits,
            unitarity_tolerance: config.unitarity_tolerance,
            parallel: config.parallel,
            verbosity: config.verbosity,
        }
    }
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self::from_config(&CodecConfig::default())
    }
}

/// Qubits per spatial axis: `ceil(log2(max side))`, 0 for a single pixel.
pub fn register_bits(shape: &[usize]) -> u32 {
    match shape.iter().copied().max() {
        Some(side) if side > 1 => usize::BITS - (side - 1).leading_zeros(),
        _ => 0,
    }
}

/// Compose the circuit descriptor for `image` under `scheme`.
///
/// # Errors
///
/// - [`CodecError::InvalidImage`] if the spatial layout cannot be resolved
///   or the register would exceed `max_qubits`
/// - [`CodecError::SchemeContractViolation`] if a kernel returns a vector or
///   block of the wrong size, or a non-unit basis vector
/// - [`CodecError::NumericInstability`] if the accumulation is not finite or
///   the orthonormalized operator fails the unitarity check
pub fn compose(
    scheme: &EncodingScheme,
    image: &Image,
    dimensionality: Option<usize>,
    options: &ComposeOptions,
) -> CodecResult<CircuitDescriptor> {
    let name = scheme.name();
    let map = scheme.map();
    let view = PixelView::new(image, dimensionality, map.channel_aware())?;
    let shape = view.spatial_shape().to_vec();
    let r = register_bits(&shape);

    let payload_qubits = map.payload_qubits();
    let position_qubits = u32::try_from(shape.len())
        .ok()
        .and_then(|ndims| r.checked_mul(ndims))
        .ok_or_else(|| CodecError::invalid_image("position register too wide"))?;
    let n_qubits = position_qubits
        .checked_add(payload_qubits)
        .filter(|&n| n <= options.max_qubits)
        .ok_or_else(|| {
            CodecError::invalid_image(format!(
                "image needs {position_qubits} position and {payload_qubits} payload qubits, \
                 limit is {}",
                options.max_qubits
            ))
        })?;
    let pos_dim = 1usize << position_qubits;
    let block_dim = 1usize << payload_qubits;
    let dim = pos_dim * block_dim;
    debug!(
        scheme = name,
        ?shape,
        r,
        position_qubits,
        payload_qubits,
        "composing operator"
    );

    let coords: Vec<Vec<usize>> = ndarray::indices(IxDyn(&shape))
        .into_iter()
        .map(|ix| ix.slice().to_vec())
        .collect();

    let evaluate = |c: &Vec<usize>| -> CodecResult<(StateVector, Operator)> {
        let basis = scheme.data().data(c, r, &view)?;
        let block = map.map(c, r, &view)?;
        Ok((basis, block))
    };
    let terms: Vec<(StateVector, Operator)> = if options.parallel {
        coords.par_iter().map(evaluate).collect::<CodecResult<_>>()?
    } else {
        coords.iter().map(evaluate).collect::<CodecResult<_>>()?
    };

    let mut g = Operator::zeros(dim, dim);
    for (c, (basis, block)) in coords.iter().zip(&terms) {
        check_term(name, c, basis, block, pos_dim, block_dim)?;
        if options.verbosity.allows(Verbosity::State) {
            trace!(scheme = name, coords = ?c, basis = ?basis.as_slice(), "position vector");
            trace!(scheme = name, coords = ?c, "map block\n{}", tabulate_complex(block));
        }
        accumulate(&mut g, basis, block);
    }
    if g.iter().any(|z| !z.re.is_finite() || !z.im.is_finite()) {
        return Err(CodecError::numeric(format!(
            "scheme '{name}' produced a non-finite operator"
        )));
    }
    if options.verbosity.allows(Verbosity::Math) {
        trace!(scheme = name, "global operator G\n{}", tabulate_complex(&g));
    }

    let unitary = orthonormalize(g);
    check_unitary(&unitary, options.unitarity_tolerance)?;
    if options.verbosity.allows(Verbosity::Math) {
        trace!(scheme = name, "unitary U\n{}", tabulate_complex(&unitary));
    }

    let init_state = initial_state(scheme, n_qubits, dim)?;
    if options.verbosity.allows(Verbosity::State) {
        trace!(scheme = name, state = ?init_state.as_slice(), "initial state");
    }

    info!(
        scheme = name,
        n_qubits,
        positions = coords.len(),
        "encoded image"
    );
    Ok(CircuitDescriptor {
        n_qubits,
        init_state,
        unitary,
        measure_all: true,
        metadata: CircuitMetadata {
            scheme: name.to_owned(),
            spatial_shape: shape,
            position_qubits,
            payload_qubits,
        },
    })
}

fn check_term(
    scheme: &str,
    coords: &[usize],
    basis: &StateVector,
    block: &Operator,
    pos_dim: usize,
    block_dim: usize,
) -> CodecResult<()> {
    if basis.len() != pos_dim {
        return Err(CodecError::contract(
            scheme,
            format!(
                "data kernel returned length {} at {coords:?}, expected {pos_dim}",
                basis.len()
            ),
        ));
    }
    if (basis.norm() - 1.0).abs() > NORM_EPS {
        return Err(CodecError::contract(
            scheme,
            format!("data kernel returned a non-unit vector at {coords:?}"),
        ));
    }
    if block.nrows() != block_dim || block.ncols() != block_dim {
        return Err(CodecError::contract(
            scheme,
            format!(
                "map kernel returned a {}x{} block at {coords:?}, expected {block_dim}x{block_dim}",
                block.nrows(),
                block.ncols()
            ),
        ));
    }
    Ok(())
}

/// `G += |v⟩⟨v| ⊗ M`, touching only the non-zero amplitudes of `v`.
fn accumulate(g: &mut Operator, basis: &StateVector, block: &Operator) {
    let d = block.nrows();
    let support: Vec<(usize, Complex64)> = basis
        .iter()
        .enumerate()
        .filter(|(_, z)| z.norm_sqr() > 0.0)
        .map(|(i, z)| (i, *z))
        .collect();
    for &(i, vi) in &support {
        for &(j, vj) in &support {
            let w = vi * vj.conj();
            for a in 0..d {
                for b in 0..d {
                    g[(i * d + a, j * d + b)] += w * block[(a, b)];
                }
            }
        }
    }
}

/// Unitary `Q` of `G = QR`, with each column rotated by the phase of the
/// matching diagonal entry of `R`.
fn orthonormalize(g: Operator) -> Operator {
    let qr = g.qr();
    let r = qr.r();
    let mut q = qr.q();
    for k in 0..q.ncols() {
        let rkk = r[(k, k)];
        let modulus = rkk.norm();
        if modulus > NORM_EPS {
            let phase = rkk / modulus;
            for z in q.column_mut(k).iter_mut() {
                *z *= phase;
            }
        }
    }
    q
}

fn check_unitary(u: &Operator, tolerance: f64) -> CodecResult<()> {
    let n = u.nrows();
    let residual = (u.adjoint() * u - Operator::identity(n, n)).norm();
    if !residual.is_finite() || residual >= tolerance {
        return Err(CodecError::numeric(format!(
            "orthonormalized operator deviates from unitarity by {residual:e}"
        )));
    }
    Ok(())
}

fn initial_state(scheme: &EncodingScheme, n_qubits: u32, dim: usize) -> CodecResult<StateVector> {
    let state = scheme.init().init(n_qubits)?;
    if state.len() != dim {
        return Err(CodecError::contract(
            scheme.name(),
            format!("init kernel returned length {}, expected {dim}", state.len()),
        ));
    }
    let norm = state.norm();
    if !norm.is_finite() || norm <= NORM_EPS {
        return Err(CodecError::contract(
            scheme.name(),
            "init kernel returned a zero or non-finite state",
        ));
    }
    Ok(state.unscale(norm))
}

/// `Σ |amplitude|²` per basis index, the distribution an ideal device samples.
pub fn output_probabilities(descriptor: &CircuitDescriptor) -> DVector<f64> {
    let out = &descriptor.unitary * &descriptor.init_state;
    out.map(|z| z.norm_sqr())
}
