//! Initial-state kernels.

use num_complex::Complex64;
use serde::Deserialize;

use super::{parse_params, KernelCatalog, KernelParams};
use crate::error::{CodecError, CodecResult};
use crate::scheme::StatePrep;
use crate::types::StateVector;

pub(super) fn register(catalog: &mut KernelCatalog) {
    catalog.register_init("zero", |p| {
        no_params(p)?;
        Ok(Box::new(ZeroState))
    });
    catalog.register_init("uniform", |p| {
        no_params(p)?;
        Ok(Box::new(UniformState))
    });
    catalog.register_init("uniform_positions", |p| {
        Ok(Box::new(UniformPositions::from_params(p)?))
    });
}

fn no_params(params: &KernelParams) -> Result<(), String> {
    parse_params::<Empty>(params).map(|_| ())
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Empty {}

fn dimension(n_qubits: u32) -> CodecResult<usize> {
    1usize
        .checked_shl(n_qubits)
        .ok_or_else(|| CodecError::invalid_image(format!("{n_qubits} qubits is too wide")))
}

/// `|0…0⟩`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroState;

impl StatePrep for ZeroState {
    fn init(&self, n_qubits: u32) -> CodecResult<StateVector> {
        let mut state = StateVector::zeros(dimension(n_qubits)?);
        state[0] = Complex64::new(1.0, 0.0);
        Ok(state)
    }
}

/// Equal superposition over the whole register.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformState;

impl StatePrep for UniformState {
    fn init(&self, n_qubits: u32) -> CodecResult<StateVector> {
        let dim = dimension(n_qubits)?;
        let amp = Complex64::new(1.0 / (dim as f64).sqrt(), 0.0);
        Ok(StateVector::from_element(dim, amp))
    }
}

/// Equal superposition over positions with the payload register at `|0…0⟩`.
///
/// Non-zero amplitudes sit at every index that is a multiple of
/// `2^payload_qubits`.
#[derive(Debug, Clone, Copy)]
pub struct UniformPositions {
    payload_qubits: u32,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UniformPositionsParams {
    payload_qubits: u32,
}

impl UniformPositions {
    pub fn new(payload_qubits: u32) -> Self {
        Self { payload_qubits }
    }

    fn from_params(params: &KernelParams) -> Result<Self, String> {
        let p: UniformPositionsParams = parse_params(params)?;
        if p.payload_qubits == 0 || p.payload_qubits > 32 {
            return Err("payload_qubits must be in 1..=32".into());
        }
        Ok(Self::new(p.payload_qubits))
    }
}

impl StatePrep for UniformPositions {
    fn init(&self, n_qubits: u32) -> CodecResult<StateVector> {
        if n_qubits < self.payload_qubits {
            return Err(CodecError::contract(
                "uniform_positions",
                format!(
                    "register of {n_qubits} qubits is narrower than the {}-qubit payload",
                    self.payload_qubits
                ),
            ));
        }
        let dim = dimension(n_qubits)?;
        let stride = 1usize << self.payload_qubits;
        let positions = dim / stride;
        let amp = Complex64::new(1.0 / (positions as f64).sqrt(), 0.0);
        let mut state = StateVector::zeros(dim);
        for i in (0..dim).step_by(stride) {
            state[i] = amp;
        }
        Ok(state)
    }
}
