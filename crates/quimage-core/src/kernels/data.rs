//! Position-encoding kernels.
//!
//! Both kernels return a computational basis vector of the position
//! register. They differ only in how coordinates become an index:
//!
//! - `row_major_basis`: row-major flat index over the spatial shape
//!   (`ravel_multi_index` order). Decodes with the `row_major` layout.
//! - `grid_basis`: `r` bits per axis, first axis most significant. Decodes
//!   with the `grid` layout.
//!
//! For power-of-two square images the two coincide.

use num_complex::Complex64;
use serde::Deserialize;

use super::{parse_params, KernelCatalog, KernelParams};
use crate::error::{CodecError, CodecResult};
use crate::scheme::PositionEncoder;
use crate::types::{PixelView, StateVector};

pub(super) fn register(catalog: &mut KernelCatalog) {
    catalog.register_data("row_major_basis", |p| {
        parse_params::<NoParams>(p)?;
        Ok(Box::new(RowMajorBasis))
    });
    catalog.register_data("grid_basis", |p| {
        parse_params::<NoParams>(p)?;
        Ok(Box::new(GridBasis))
    });
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

fn position_dimension(r: u32, ndims: usize) -> CodecResult<usize> {
    let bits = (r as usize)
        .checked_mul(ndims)
        .filter(|&b| b < usize::BITS as usize)
        .ok_or_else(|| CodecError::invalid_image("position register too wide"))?;
    Ok(1usize << bits)
}

fn basis(dim: usize, index: usize) -> CodecResult<StateVector> {
    if index >= dim {
        return Err(CodecError::invalid_image(format!(
            "position index {index} exceeds register size {dim}"
        )));
    }
    let mut v = StateVector::zeros(dim);
    v[index] = Complex64::new(1.0, 0.0);
    Ok(v)
}

/// `|ravel(coords)⟩` in a register of `2^(r·ndims)` states.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowMajorBasis;

impl PositionEncoder for RowMajorBasis {
    fn data(&self, coords: &[usize], r: u32, view: &PixelView<'_>) -> CodecResult<StateVector> {
        let dim = position_dimension(r, coords.len())?;
        basis(dim, view.flat_index(coords)?)
    }
}

/// `|c₀⟩|c₁⟩…` with `r` bits per coordinate.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridBasis;

impl PositionEncoder for GridBasis {
    fn data(&self, coords: &[usize], r: u32, view: &PixelView<'_>) -> CodecResult<StateVector> {
        // Bounds-check against the image before packing.
        view.flat_index(coords)?;
        let dim = position_dimension(r, coords.len())?;
        let side = 1usize << r;
        let mut index = 0usize;
        for &c in coords {
            if c >= side {
                return Err(CodecError::invalid_image(format!(
                    "coordinate {c} does not fit in {r} bits"
                )));
            }
            index = (index << r) | c;
        }
        basis(dim, index)
    }
}
