//! Payload-map kernels.
//!
//! Each kernel turns the value at one position into a square block acting on
//! the payload register. Rotations use the real form
//! `Ry(θ) = [[cos θ, −sin θ], [sin θ, cos θ]]`, so a payload qubit prepared
//! in `|0⟩` reads `1` with probability `sin²θ`. Multi-qubit blocks are
//! Kronecker products with the most significant qubit leftmost.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use num_complex::Complex64;
use serde::Deserialize;

use super::{parse_params, KernelCatalog, KernelParams};
use crate::error::{CodecError, CodecResult};
use crate::scheme::PayloadMap;
use crate::types::{ChannelReduction, Operator, PixelView};

pub(super) fn register(catalog: &mut KernelCatalog) {
    catalog.register_map("ry_angle", |p| Ok(Box::new(RyAngle::from_params(p)?)));
    catalog.register_map("ry_segmented", |p| {
        Ok(Box::new(RySegmented::from_params(p)?))
    });
    catalog.register_map("binary_x", |p| Ok(Box::new(BinaryX::from_params(p)?)));
    catalog.register_map("ry_bit_pairs", |p| {
        Ok(Box::new(RyBitPairs::from_params(p)?))
    });
    catalog.register_map("ry_channels", |p| {
        Ok(Box::new(RyChannels::from_params(p)?))
    });
    catalog.register_map("binary_channels", |p| {
        Ok(Box::new(BinaryChannels::from_params(p)?))
    });
    catalog.register_map("ry_packed_rgb", |p| {
        Ok(Box::new(RyPackedRgb::from_params(p)?))
    });
    catalog.register_map("phase_mix", |p| Ok(Box::new(PhaseMix::from_params(p)?)));
    catalog.register_map("global_phase", |p| {
        Ok(Box::new(GlobalPhase::from_params(p)?))
    });
    catalog.register_map("ry_ordered", |p| Ok(Box::new(RyOrdered::from_params(p)?)));
}

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

/// Real rotation `[[cos θ, −sin θ], [sin θ, cos θ]]`.
pub fn ry(theta: f64) -> Operator {
    let (s, c) = theta.sin_cos();
    Operator::from_row_slice(
        2,
        2,
        &[
            Complex64::new(c, 0.0),
            Complex64::new(-s, 0.0),
            Complex64::new(s, 0.0),
            Complex64::new(c, 0.0),
        ],
    )
}

/// Pauli X.
pub fn pauli_x() -> Operator {
    let zero = Complex64::new(0.0, 0.0);
    let one = Complex64::new(1.0, 0.0);
    Operator::from_row_slice(2, 2, &[zero, one, one, zero])
}

/// Kronecker product of `ops`, leftmost factor most significant.
pub fn kron_all<I: IntoIterator<Item = Operator>>(ops: I) -> Operator {
    ops.into_iter()
        .fold(Operator::identity(1, 1), |acc, op| acc.kronecker(&op))
}

/// `X` on every set bit of `value` (MSB first), `I` elsewhere.
pub fn bit_pattern(value: u64, bits: u32) -> Operator {
    kron_all((0..bits).rev().map(|b| {
        if (value >> b) & 1 == 1 {
            pauli_x()
        } else {
            Operator::identity(2, 2)
        }
    }))
}

/// Qubits needed to select one of `channels`.
fn selector_bits(channels: usize) -> u32 {
    usize::BITS - channels.saturating_sub(1).leading_zeros()
}

// ---------------------------------------------------------------------------
// Pixel access
// ---------------------------------------------------------------------------

fn intensity(view: &PixelView<'_>, coords: &[usize], reduction: ChannelReduction) -> CodecResult<f64> {
    if view.channels() == 1 {
        view.value(coords, 0)
    } else {
        Ok(reduction.reduce(&view.pixel(coords)?))
    }
}

fn require_channels(view: &PixelView<'_>, needed: usize) -> CodecResult<()> {
    if view.channels() < needed {
        return Err(CodecError::invalid_image(format!(
            "scheme needs {needed} channels, image has {}",
            view.channels()
        )));
    }
    Ok(())
}

/// `value / max_value`, rejecting values above the maximum.
fn fraction(value: f64, max_value: f64) -> CodecResult<f64> {
    if value > max_value * (1.0 + 1e-12) {
        return Err(CodecError::invalid_image(format!(
            "pixel value {value} exceeds max_value {max_value}"
        )));
    }
    Ok(value / max_value)
}

fn angle(value: f64, max_value: f64) -> CodecResult<f64> {
    Ok(fraction(value, max_value)? * FRAC_PI_2)
}

fn to_integer(value: f64, bits: u32) -> CodecResult<u64> {
    let rounded = value.round();
    if rounded >= (1u64 << bits) as f64 {
        return Err(CodecError::invalid_image(format!(
            "pixel value {value} does not fit in {bits} bits"
        )));
    }
    Ok(rounded as u64)
}

fn default_max_value() -> f64 {
    255.0
}

fn default_bits() -> u32 {
    8
}

fn default_channels() -> usize {
    3
}

fn check_max_value(max_value: f64) -> Result<(), String> {
    if max_value.is_finite() && max_value > 0.0 {
        Ok(())
    } else {
        Err("max_value must be positive and finite".into())
    }
}

fn check_channels(channels: usize) -> Result<(), String> {
    if (1..=8).contains(&channels) {
        Ok(())
    } else {
        Err("channels must be in 1..=8".into())
    }
}

// ---------------------------------------------------------------------------
// Grayscale kernels
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AngleParams {
    #[serde(default = "default_max_value")]
    max_value: f64,
    #[serde(default)]
    reduction: ChannelReduction,
}

/// One qubit rotated by `I·π/(2·max_value)`.
#[derive(Debug, Clone, Copy)]
pub struct RyAngle {
    pub max_value: f64,
    pub reduction: ChannelReduction,
}

impl RyAngle {
    fn from_params(params: &KernelParams) -> Result<Self, String> {
        let p: AngleParams = parse_params(params)?;
        check_max_value(p.max_value)?;
        Ok(Self {
            max_value: p.max_value,
            reduction: p.reduction,
        })
    }
}

impl PayloadMap for RyAngle {
    fn payload_qubits(&self) -> u32 {
        1
    }

    fn channel_aware(&self) -> bool {
        true
    }

    fn map(&self, coords: &[usize], _r: u32, view: &PixelView<'_>) -> CodecResult<Operator> {
        let value = intensity(view, coords, self.reduction)?;
        Ok(ry(angle(value, self.max_value)?))
    }
}

/// Two qubits: a segmentation qubit then an intensity qubit.
///
/// The segmentation qubit is rotated by π/2 when the pixel is at or above
/// the image mean (foreground), and left alone otherwise.
#[derive(Debug, Clone, Copy)]
pub struct RySegmented {
    pub max_value: f64,
    pub reduction: ChannelReduction,
}

impl RySegmented {
    fn from_params(params: &KernelParams) -> Result<Self, String> {
        let p: AngleParams = parse_params(params)?;
        check_max_value(p.max_value)?;
        Ok(Self {
            max_value: p.max_value,
            reduction: p.reduction,
        })
    }
}

impl PayloadMap for RySegmented {
    fn payload_qubits(&self) -> u32 {
        2
    }

    fn channel_aware(&self) -> bool {
        true
    }

    fn map(&self, coords: &[usize], _r: u32, view: &PixelView<'_>) -> CodecResult<Operator> {
        let value = intensity(view, coords, self.reduction)?;
        let beta = if value >= view.mean() { FRAC_PI_2 } else { 0.0 };
        Ok(ry(beta).kronecker(&ry(angle(value, self.max_value)?)))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BitsParams {
    #[serde(default = "default_bits")]
    bits: u32,
    #[serde(default)]
    reduction: ChannelReduction,
}

/// `bits` qubits holding the integer value directly, LSB on the last qubit.
#[derive(Debug, Clone, Copy)]
pub struct BinaryX {
    pub bits: u32,
    pub reduction: ChannelReduction,
}

impl BinaryX {
    fn from_params(params: &KernelParams) -> Result<Self, String> {
        let p: BitsParams = parse_params(params)?;
        if !(1..=16).contains(&p.bits) {
            return Err("bits must be in 1..=16".into());
        }
        Ok(Self {
            bits: p.bits,
            reduction: p.reduction,
        })
    }
}

impl PayloadMap for BinaryX {
    fn payload_qubits(&self) -> u32 {
        self.bits
    }

    fn channel_aware(&self) -> bool {
        true
    }

    fn map(&self, coords: &[usize], _r: u32, view: &PixelView<'_>) -> CodecResult<Operator> {
        let value = to_integer(intensity(view, coords, self.reduction)?, self.bits)?;
        Ok(bit_pattern(value, self.bits))
    }
}

/// `bits / 2` qubits, each rotated to one of four angles by a pair of bits.
///
/// Pair `k` (bits `2k`, `2k+1`) drives the qubit `k` places from the right.
#[derive(Debug, Clone, Copy)]
pub struct RyBitPairs {
    pub bits: u32,
    pub reduction: ChannelReduction,
}

impl RyBitPairs {
    fn from_params(params: &KernelParams) -> Result<Self, String> {
        let p: BitsParams = parse_params(params)?;
        if p.bits == 0 || p.bits % 2 != 0 || p.bits > 16 {
            return Err("bits must be even and in 2..=16".into());
        }
        Ok(Self {
            bits: p.bits,
            reduction: p.reduction,
        })
    }
}

impl PayloadMap for RyBitPairs {
    fn payload_qubits(&self) -> u32 {
        self.bits / 2
    }

    fn channel_aware(&self) -> bool {
        true
    }

    fn map(&self, coords: &[usize], _r: u32, view: &PixelView<'_>) -> CodecResult<Operator> {
        use crate::decoder::BIT_PAIR_ANGLES;

        let value = to_integer(intensity(view, coords, self.reduction)?, self.bits)?;
        let pairs = self.bits / 2;
        Ok(kron_all((0..pairs).rev().map(|k| {
            let low = (value >> (2 * k)) & 1;
            let high = (value >> (2 * k + 1)) & 1;
            ry(BIT_PAIR_ANGLES[((low << 1) | high) as usize])
        })))
    }
}

/// One qubit mixed by the complex block
/// `[[(1+iᵗ)/2, −(1−iᵗ)/2], [(1−iᵗ)/2, (1+iᵗ)/2]]` with `t = I/max_value`.
///
/// The block is not unitary for `t > 0`; orthonormalization of the global
/// operator takes care of that.
#[derive(Debug, Clone, Copy)]
pub struct PhaseMix {
    pub max_value: f64,
    pub reduction: ChannelReduction,
}

impl PhaseMix {
    fn from_params(params: &KernelParams) -> Result<Self, String> {
        let p: AngleParams = parse_params(params)?;
        check_max_value(p.max_value)?;
        Ok(Self {
            max_value: p.max_value,
            reduction: p.reduction,
        })
    }
}

impl PayloadMap for PhaseMix {
    fn payload_qubits(&self) -> u32 {
        1
    }

    fn channel_aware(&self) -> bool {
        true
    }

    fn map(&self, coords: &[usize], _r: u32, view: &PixelView<'_>) -> CodecResult<Operator> {
        let t = fraction(intensity(view, coords, self.reduction)?, self.max_value)?;
        let one = Complex64::new(1.0, 0.0);
        let i_t = Complex64::from_polar(1.0, t * FRAC_PI_2);
        let q0 = (one + i_t) / 2.0;
        let q1 = (one - i_t) / 2.0;
        Ok(Operator::from_row_slice(2, 2, &[q0, -q1, q1, q0]))
    }
}

/// One qubit carrying the intensity as a global phase `e^{iπI/max_value}·I`.
#[derive(Debug, Clone, Copy)]
pub struct GlobalPhase {
    pub max_value: f64,
    pub reduction: ChannelReduction,
}

impl GlobalPhase {
    fn from_params(params: &KernelParams) -> Result<Self, String> {
        let p: AngleParams = parse_params(params)?;
        check_max_value(p.max_value)?;
        Ok(Self {
            max_value: p.max_value,
            reduction: p.reduction,
        })
    }
}

impl PayloadMap for GlobalPhase {
    fn payload_qubits(&self) -> u32 {
        1
    }

    fn channel_aware(&self) -> bool {
        true
    }

    fn map(&self, coords: &[usize], _r: u32, view: &PixelView<'_>) -> CodecResult<Operator> {
        let t = fraction(intensity(view, coords, self.reduction)?, self.max_value)?;
        Ok(Operator::identity(2, 2) * Complex64::from_polar(1.0, PI * t))
    }
}

/// Two qubits: a rotated qubit then an order qubit selecting what it holds.
///
/// ```text
/// M = Ry(θ_colour) ⊗ |0⟩⟨0| + Ry(θ_order) ⊗ |1⟩⟨1|
/// θ_colour = I/max_value · π/2 − π/4
/// θ_order  = m/(N−1) · π/2 − π/4      (m: row-major index, N: positions)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RyOrdered {
    pub max_value: f64,
    pub reduction: ChannelReduction,
}

impl RyOrdered {
    fn from_params(params: &KernelParams) -> Result<Self, String> {
        let p: AngleParams = parse_params(params)?;
        check_max_value(p.max_value)?;
        Ok(Self {
            max_value: p.max_value,
            reduction: p.reduction,
        })
    }
}

impl PayloadMap for RyOrdered {
    fn payload_qubits(&self) -> u32 {
        2
    }

    fn channel_aware(&self) -> bool {
        true
    }

    fn map(&self, coords: &[usize], _r: u32, view: &PixelView<'_>) -> CodecResult<Operator> {
        let value = intensity(view, coords, self.reduction)?;
        let colour = angle(value, self.max_value)? - FRAC_PI_4;

        let last = view.num_positions().saturating_sub(1);
        let order_fraction = if last == 0 {
            0.0
        } else {
            view.flat_index(coords)? as f64 / last as f64
        };
        let order = order_fraction * FRAC_PI_2 - FRAC_PI_4;

        let zero = Complex64::new(0.0, 0.0);
        let one = Complex64::new(1.0, 0.0);
        let ket_bra_0 = Operator::from_row_slice(2, 2, &[one, zero, zero, zero]);
        let ket_bra_1 = Operator::from_row_slice(2, 2, &[zero, zero, zero, one]);
        Ok(ry(colour).kronecker(&ket_bra_0) + ry(order).kronecker(&ket_bra_1))
    }
}

// ---------------------------------------------------------------------------
// Colour kernels
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RyChannelsParams {
    #[serde(default = "default_channels")]
    channels: usize,
    #[serde(default = "default_max_value")]
    max_value: f64,
}

/// Selector qubits then one intensity qubit:
/// `Σ_c pattern(c) ⊗ Ry(θ_c)`.
#[derive(Debug, Clone, Copy)]
pub struct RyChannels {
    pub channels: usize,
    pub max_value: f64,
}

impl RyChannels {
    fn from_params(params: &KernelParams) -> Result<Self, String> {
        let p: RyChannelsParams = parse_params(params)?;
        check_channels(p.channels)?;
        check_max_value(p.max_value)?;
        Ok(Self {
            channels: p.channels,
            max_value: p.max_value,
        })
    }
}

impl PayloadMap for RyChannels {
    fn payload_qubits(&self) -> u32 {
        selector_bits(self.channels) + 1
    }

    fn channel_aware(&self) -> bool {
        true
    }

    fn map(&self, coords: &[usize], _r: u32, view: &PixelView<'_>) -> CodecResult<Operator> {
        require_channels(view, self.channels)?;
        let sel = selector_bits(self.channels);
        let dim = 1usize << (sel + 1);
        let mut block = Operator::zeros(dim, dim);
        for c in 0..self.channels {
            let theta = angle(view.value(coords, c)?, self.max_value)?;
            block += bit_pattern(c as u64, sel).kronecker(&ry(theta));
        }
        Ok(block)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BinaryChannelsParams {
    #[serde(default = "default_channels")]
    channels: usize,
    #[serde(default = "default_bits")]
    bits: u32,
}

/// Value qubits then selector qubits: `Σ_c pattern(v_c) ⊗ pattern(c)`.
#[derive(Debug, Clone, Copy)]
pub struct BinaryChannels {
    pub channels: usize,
    pub bits: u32,
}

impl BinaryChannels {
    fn from_params(params: &KernelParams) -> Result<Self, String> {
        let p: BinaryChannelsParams = parse_params(params)?;
        check_channels(p.channels)?;
        if !(1..=12).contains(&p.bits) {
            return Err("bits must be in 1..=12".into());
        }
        Ok(Self {
            channels: p.channels,
            bits: p.bits,
        })
    }
}

impl PayloadMap for BinaryChannels {
    fn payload_qubits(&self) -> u32 {
        self.bits + selector_bits(self.channels)
    }

    fn channel_aware(&self) -> bool {
        true
    }

    fn map(&self, coords: &[usize], _r: u32, view: &PixelView<'_>) -> CodecResult<Operator> {
        require_channels(view, self.channels)?;
        let sel = selector_bits(self.channels);
        let dim = 1usize << (self.bits + sel);
        let mut block = Operator::zeros(dim, dim);
        for c in 0..self.channels {
            let value = to_integer(view.value(coords, c)?, self.bits)?;
            block += bit_pattern(value, self.bits).kronecker(&bit_pattern(c as u64, sel));
        }
        Ok(block)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PackedParams {
    #[serde(default = "default_channels")]
    channels: usize,
    #[serde(default = "default_bits")]
    bits_per_channel: u32,
}

/// One qubit rotated by the packed channel integer:
/// `θ = (v₀ << 16 | v₁ << 8 | v₂) / (2²⁴ − 1) · π/2` for three 8-bit channels.
#[derive(Debug, Clone, Copy)]
pub struct RyPackedRgb {
    pub channels: usize,
    pub bits_per_channel: u32,
}

impl RyPackedRgb {
    fn from_params(params: &KernelParams) -> Result<Self, String> {
        let p: PackedParams = parse_params(params)?;
        check_channels(p.channels)?;
        if p.bits_per_channel == 0 || p.channels as u32 * p.bits_per_channel > 48 {
            return Err("channels * bits_per_channel must be in 1..=48".into());
        }
        Ok(Self {
            channels: p.channels,
            bits_per_channel: p.bits_per_channel,
        })
    }

    /// Largest packed value.
    pub fn max_value(&self) -> u64 {
        (1u64 << (self.channels as u32 * self.bits_per_channel)) - 1
    }
}

impl PayloadMap for RyPackedRgb {
    fn payload_qubits(&self) -> u32 {
        1
    }

    fn channel_aware(&self) -> bool {
        true
    }

    fn map(&self, coords: &[usize], _r: u32, view: &PixelView<'_>) -> CodecResult<Operator> {
        require_channels(view, self.channels)?;
        let mut packed = 0u64;
        for c in 0..self.channels {
            let v = to_integer(view.value(coords, c)?, self.bits_per_channel)?;
            packed = (packed << self.bits_per_channel) | v;
        }
        Ok(ry(packed as f64 / self.max_value() as f64 * FRAC_PI_2))
    }
}
