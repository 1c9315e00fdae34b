//! Generic measurement decoder.
//!
//! Every bitstring is split into a leading position segment and a trailing
//! payload segment of `payload_bits`. For each spatial position and each
//! [`ChannelTap`] the decoder accumulates the shot total, per-bit one counts
//! and (for binary readouts) a histogram of payload values. The scheme's
//! [`Readout`] then turns those statistics into intensities.
//!
//! ```text
//!  bitstring   = [ position bits | payload bits ]
//!  payload     = [ ... selector ... value ... ]      (ranges per tap)
//!  p           = ones / total                       (0 when total == 0)
//!  Probability → p
//!  Angle       → (2/π)·asin(√p)·max_value
//!  Binary      → modal value of the value range
//!  PackedAngle → angle into 0..=max, then split into byte channels
//!  BitPairs    → per qubit nearest of four levels, two bits each
//! ```
//!
//! Decoding is all-or-nothing: any malformed input fails the whole call.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{CodecConfig, QUBIT_CEILING};
use crate::error::{CodecError, CodecResult};
use crate::logging::Verbosity;
use crate::types::{MeasurementCounts, ReconstructedImage};

/// Rotation angles a [`Readout::BitPairs`] qubit can carry, indexed by the
/// two-bit value `(b_low << 1) | b_high` of the pair.
pub const BIT_PAIR_ANGLES: [f64; 4] = [0.0, 2.0 * PI / 10.0, 3.0 * PI / 10.0, 5.0 * PI / 10.0];

/// A contiguous range of payload bits, counted from the most significant
/// (leftmost) payload bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitRange {
    pub start: usize,
    pub len: usize,
}

impl BitRange {
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// One past the last bit.
    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    fn read(&self, payload: &[u8]) -> u64 {
        payload[self.start..self.end()]
            .iter()
            .fold(0, |acc, &b| (acc << 1) | u64::from(b == b'1'))
    }
}

/// Gates a tap on the value of a payload sub-range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub bits: BitRange,
    pub value: u64,
}

/// One output channel's view of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTap {
    /// When set, only samples whose selector bits match count for this tap.
    pub selector: Option<Selector>,
    /// Bits the readout is applied to.
    pub value: BitRange,
}

impl ChannelTap {
    /// Ungated tap over `value`.
    pub const fn plain(value: BitRange) -> Self {
        Self {
            selector: None,
            value,
        }
    }
}

/// How position bits map to spatial coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionLayout {
    /// The position segment is a row-major flat index over the shape.
    #[default]
    RowMajor,
    /// The position segment holds `pos_bits / ndims` bits per axis.
    Grid,
}

/// How per-tap statistics become output values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Readout {
    /// Output `p` of a single value bit.
    Probability,
    /// Output `(2/π)·asin(√p)·max_value` of a single value bit.
    Angle { max_value: f64 },
    /// Output the most frequent value of the value range (ties to the smaller).
    Binary,
    /// Invert a single-bit angle into `0..=max_value`, then split the integer
    /// into `channels` fields of `bits_per_channel`, most significant first.
    PackedAngle {
        max_value: u64,
        channels: usize,
        bits_per_channel: u32,
    },
    /// Snap each value qubit's `p` to the nearest `sin²` of
    /// [`BIT_PAIR_ANGLES`]; qubit `len-1-k` carries bits `2k` and `2k+1`.
    BitPairs,
}

impl Readout {
    fn outputs_per_tap(&self) -> usize {
        match self {
            Self::PackedAngle { channels, .. } => *channels,
            _ => 1,
        }
    }

    fn needs_histogram(&self) -> bool {
        matches!(self, Self::Binary)
    }
}

/// Everything the decoder needs to know about a scheme's payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadLayout {
    pub payload_bits: usize,
    pub positions: PositionLayout,
    pub taps: Vec<ChannelTap>,
    pub readout: Readout,
}

impl PayloadLayout {
    /// Check that every range lies inside the payload and suits the readout.
    ///
    /// Returns a path-free reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.payload_bits == 0 {
            return Err("payload must have at least one bit".into());
        }
        if self.taps.is_empty() {
            return Err("layout declares no channels".into());
        }
        for (i, tap) in self.taps.iter().enumerate() {
            if tap.value.len == 0 || tap.value.end() > self.payload_bits {
                return Err(format!("channel {i} value bits fall outside the payload"));
            }
            if let Some(sel) = tap.selector {
                if sel.bits.len == 0 || sel.bits.len > 63 || sel.bits.end() > self.payload_bits {
                    return Err(format!("channel {i} selector bits fall outside the payload"));
                }
                if sel.value >> sel.bits.len != 0 {
                    return Err(format!(
                        "channel {i} selector value {} does not fit in {} bits",
                        sel.value, sel.bits.len
                    ));
                }
            }
            let width_ok = match self.readout {
                Readout::Probability | Readout::Angle { .. } | Readout::PackedAngle { .. } => {
                    tap.value.len == 1
                }
                Readout::Binary => tap.value.len <= 63,
                Readout::BitPairs => tap.value.len <= 31,
            };
            if !width_ok {
                return Err(format!(
                    "channel {i} value width {} does not suit the readout",
                    tap.value.len
                ));
            }
        }
        match self.readout {
            Readout::Angle { max_value } if !(max_value.is_finite() && max_value > 0.0) => {
                Err("angle readout needs a positive max_value".into())
            }
            Readout::PackedAngle {
                max_value,
                channels,
                bits_per_channel,
            } => {
                let total_bits = channels as u32 * bits_per_channel;
                if channels == 0 || bits_per_channel == 0 || total_bits > 63 {
                    Err("packed readout needs 1..=63 total bits".into())
                } else if max_value == 0 || max_value >> total_bits != 0 {
                    Err(format!("packed max_value must fit in {total_bits} bits"))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// Output channels produced per position.
    pub fn output_channels(&self) -> usize {
        self.taps.len() * self.readout.outputs_per_tap()
    }
}

/// Per-call decoding options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Spatial axes assumed when no shape is declared.
    pub default_dimensionality: usize,
    /// Widest outcome accepted; the codec never composes a larger register.
    pub max_qubits: u32,
    pub verbosity: Verbosity,
}

impl DecodeOptions {
    pub fn from_config(config: &CodecConfig) -> Self {
        Self {
            default_dimensionality: config.default_dimensionality,
            max_qubits: config.max_qubits,
            verbosity: config.verbosity,
        }
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::from_config(&CodecConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct TapStats {
    total: u64,
    ones: Vec<u64>,
    histogram: BTreeMap<u64, u64>,
}

impl TapStats {
    fn probability(&self, bit: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.ones[bit] as f64 / self.total as f64).clamp(0.0, 1.0)
        }
    }

    fn modal_value(&self) -> u64 {
        // BTreeMap iterates ascending, so `>` keeps the smaller value on ties.
        let mut best: Option<(u64, u64)> = None;
        for (&value, &count) in &self.histogram {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((value, count));
            }
        }
        best.map_or(0, |(v, _)| v)
    }
}

/// Decode `counts` against `layout`.
///
/// `shape` is the spatial shape of the original image. Without it, a square
/// of `options.default_dimensionality` axes of side `2^(pos_bits / ndims)`
/// is assumed.
///
/// # Errors
///
/// Returns [`CodecError::InvalidResult`] if the bitstrings are narrower than
/// the payload, the shape does not fit the position register, or the
/// position bits cannot be split evenly across the axes.
pub fn decode(
    layout: &PayloadLayout,
    counts: &MeasurementCounts,
    shape: Option<&[usize]>,
    options: &DecodeOptions,
) -> CodecResult<ReconstructedImage> {
    layout.validate().map_err(CodecError::invalid_result)?;

    let width = counts.width();
    if width > options.max_qubits as usize {
        return Err(CodecError::invalid_result(format!(
            "{width}-bit outcomes exceed the {}-qubit limit",
            options.max_qubits
        )));
    }
    if width < layout.payload_bits {
        return Err(CodecError::invalid_result(format!(
            "{width}-bit outcomes cannot hold a {}-bit payload",
            layout.payload_bits
        )));
    }
    let pos_bits = width - layout.payload_bits;
    let spatial = resolve_shape(layout.positions, pos_bits, shape, options.default_dimensionality)?;
    let n_taps = layout.taps.len();
    let n_positions = spatial
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .filter(|n| {
            n.checked_mul(n_taps)
                .map_or(false, |cells| cells <= 1usize << QUBIT_CEILING)
        })
        .ok_or_else(|| {
            CodecError::invalid_result(format!("shape {spatial:?} is too large to decode"))
        })?;

    debug!(
        pos_bits,
        payload_bits = layout.payload_bits,
        shape = ?spatial,
        taps = n_taps,
        "decoding measurement counts"
    );

    let mut stats: Vec<TapStats> = (0..n_positions * n_taps)
        .map(|_| TapStats::default())
        .collect();
    for (i, tap) in layout.taps.iter().enumerate() {
        for pos in 0..n_positions {
            stats[pos * n_taps + i].ones = vec![0; tap.value.len];
        }
    }

    let axis_bits = match layout.positions {
        PositionLayout::Grid => pos_bits / spatial.len(),
        PositionLayout::RowMajor => 0,
    };

    for (bitstring, &count) in counts {
        let bytes = bitstring.as_bytes();
        let (position, payload) = bytes.split_at(pos_bits);
        let Some(pos) = position_index(layout.positions, position, &spatial, axis_bits) else {
            if options.verbosity.allows(Verbosity::Trace) {
                trace!(bitstring = %bitstring, "outcome outside the image, ignored");
            }
            continue;
        };
        if options.verbosity.allows(Verbosity::Trace) {
            trace!(bitstring = %bitstring, count, position = pos, "accumulating outcome");
        }

        for (i, tap) in layout.taps.iter().enumerate() {
            if let Some(sel) = tap.selector {
                if sel.bits.read(payload) != sel.value {
                    continue;
                }
            }
            let cell = &mut stats[pos * n_taps + i];
            cell.total += count;
            let value_bits = &payload[tap.value.start..tap.value.end()];
            for (b, &bit) in value_bits.iter().enumerate() {
                if bit == b'1' {
                    cell.ones[b] += count;
                }
            }
            if layout.readout.needs_histogram() && count > 0 {
                *cell.histogram.entry(tap.value.read(payload)).or_default() += count;
            }
        }
    }

    let out_channels = layout.output_channels();
    let mut out_shape = spatial.clone();
    if out_channels > 1 {
        out_shape.push(out_channels);
    }
    let per_tap = layout.readout.outputs_per_tap();
    let mut values = Vec::with_capacity(n_positions * out_channels);
    for pos in 0..n_positions {
        for i in 0..n_taps {
            let cell = &stats[pos * n_taps + i];
            let start = values.len();
            values.resize(start + per_tap, 0.0);
            read_out(&layout.readout, cell, &mut values[start..]);
        }
    }

    let data = ArrayD::from_shape_vec(IxDyn(&out_shape), values)
        .map_err(|e| CodecError::invalid_result(e.to_string()))?;
    Ok(ReconstructedImage::new(data))
}

fn read_out(readout: &Readout, cell: &TapStats, out: &mut [f64]) {
    if cell.total == 0 {
        return;
    }
    match *readout {
        Readout::Probability => out[0] = cell.probability(0),
        Readout::Angle { max_value } => out[0] = angle_fraction(cell.probability(0)) * max_value,
        Readout::Binary => out[0] = cell.modal_value() as f64,
        Readout::PackedAngle {
            max_value,
            channels,
            bits_per_channel,
        } => {
            let raw = (angle_fraction(cell.probability(0)) * max_value as f64)
                .round()
                .clamp(0.0, max_value as f64) as u64;
            let mask = (1u64 << bits_per_channel) - 1;
            for (c, slot) in out.iter_mut().enumerate().take(channels) {
                let shift = bits_per_channel * (channels - 1 - c) as u32;
                *slot = ((raw >> shift) & mask) as f64;
            }
        }
        Readout::BitPairs => {
            let qubits = cell.ones.len();
            let mut value = 0u64;
            for k in 0..qubits {
                let level = nearest_level(cell.probability(qubits - 1 - k));
                let low = (level >> 1) & 1;
                let high = level & 1;
                value |= (low << (2 * k)) | (high << (2 * k + 1));
            }
            out[0] = value as f64;
        }
    }
}

/// `(2/π)·asin(√p)`, in `[0, 1]`.
fn angle_fraction(p: f64) -> f64 {
    p.clamp(0.0, 1.0).sqrt().asin() * 2.0 / PI
}

fn nearest_level(p: f64) -> u64 {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, angle) in BIT_PAIR_ANGLES.iter().enumerate() {
        let dist = (angle.sin().powi(2) - p).abs();
        if dist < best_dist {
            best = i as u64;
            best_dist = dist;
        }
    }
    best
}

fn position_index(
    layout: PositionLayout,
    bits: &[u8],
    shape: &[usize],
    axis_bits: usize,
) -> Option<usize> {
    let read = |seg: &[u8]| {
        seg.iter()
            .fold(0u64, |acc, &b| (acc << 1) | u64::from(b == b'1'))
    };
    match layout {
        PositionLayout::RowMajor => {
            let index = usize::try_from(read(bits)).ok()?;
            (index < shape.iter().product::<usize>()).then_some(index)
        }
        PositionLayout::Grid => {
            let mut flat = 0usize;
            for (axis, &side) in shape.iter().enumerate() {
                let seg = &bits[axis * axis_bits..(axis + 1) * axis_bits];
                let coord = usize::try_from(read(seg)).ok()?;
                if coord >= side {
                    return None;
                }
                flat = flat * side + coord;
            }
            Some(flat)
        }
    }
}

/// Spatial shape used for decoding: the declared one, checked against the
/// position register, or the inferred square.
pub fn resolve_shape(
    layout: PositionLayout,
    pos_bits: usize,
    declared: Option<&[usize]>,
    default_dimensionality: usize,
) -> CodecResult<Vec<usize>> {
    if pos_bits >= usize::BITS as usize {
        return Err(CodecError::invalid_result(format!(
            "{pos_bits} position bits exceed the addressable range"
        )));
    }

    let Some(shape) = declared else {
        let dims = default_dimensionality.max(1);
        if pos_bits % dims != 0 {
            return Err(CodecError::invalid_result(format!(
                "{pos_bits} position bits do not split evenly over {dims} axes; declare a shape"
            )));
        }
        return Ok(vec![1usize << (pos_bits / dims); dims]);
    };

    if shape.is_empty() || shape.iter().any(|&n| n == 0) {
        return Err(CodecError::invalid_result(format!(
            "invalid spatial shape {shape:?}"
        )));
    }
    match layout {
        PositionLayout::RowMajor => {
            let capacity = 1u128 << pos_bits;
            let points = shape
                .iter()
                .try_fold(1u128, |acc, &n| acc.checked_mul(n as u128));
            if points.map_or(true, |p| p > capacity) {
                return Err(CodecError::invalid_result(format!(
                    "shape {shape:?} does not fit a {pos_bits}-bit position register"
                )));
            }
        }
        PositionLayout::Grid => {
            if pos_bits % shape.len() != 0 {
                return Err(CodecError::invalid_result(format!(
                    "{pos_bits} position bits do not split evenly over {} axes",
                    shape.len()
                )));
            }
            let side = 1usize << (pos_bits / shape.len());
            if shape.iter().any(|&n| n > side) {
                return Err(CodecError::invalid_result(format!(
                    "shape {shape:?} exceeds {side} positions per axis"
                )));
            }
        }
    }
    Ok(shape.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn single_bit(readout: Readout, payload_bits: usize) -> PayloadLayout {
        PayloadLayout {
            payload_bits,
            positions: PositionLayout::RowMajor,
            taps: vec![ChannelTap::plain(BitRange::new(payload_bits - 1, 1))],
            readout,
        }
    }

    fn counts(pairs: &[(&str, u64)]) -> MeasurementCounts {
        MeasurementCounts::from_pairs(pairs.iter().map(|(k, v)| (*k, *v))).unwrap()
    }

    #[test]
    fn probability_readout_reference_case() {
        let c = counts(&[("000", 10), ("001", 10), ("010", 20), ("101", 20), ("110", 20)]);
        let img = decode(&single_bit(Readout::Probability, 1), &c, None, &DecodeOptions::default())
            .unwrap();
        assert_eq!(img.shape(), &[2, 2]);
        assert_eq!(img.get(&[0, 0]), Some(0.5));
        assert_eq!(img.get(&[0, 1]), Some(0.0));
        assert_eq!(img.get(&[1, 0]), Some(1.0));
        assert_eq!(img.get(&[1, 1]), Some(0.0));
    }

    #[test]
    fn zero_total_positions_decode_to_zero() {
        let c = counts(&[("001", 7)]);
        let layout = single_bit(Readout::Angle { max_value: 255.0 }, 1);
        let img = decode(&layout, &c, None, &DecodeOptions::default()).unwrap();
        assert_relative_eq!(img.get(&[0, 0]).unwrap(), 255.0, epsilon = 1e-9);
        for idx in [[0, 1], [1, 0], [1, 1]] {
            assert_eq!(img.get(&idx), Some(0.0));
        }
    }

    #[test]
    fn angle_readout_inverts_sine_squared() {
        let c = counts(&[("0", 75), ("1", 25)]);
        let layout = single_bit(Readout::Angle { max_value: 255.0 }, 1);
        let img = decode(&layout, &c, Some(&[1]), &DecodeOptions::default()).unwrap();
        // sin²(π/6) = 1/4 → one third of the way to π/2
        assert_relative_eq!(img.get(&[0]).unwrap(), 85.0, epsilon = 1e-9);
    }

    #[test]
    fn binary_readout_takes_mode_with_small_tie_break() {
        let layout = PayloadLayout {
            payload_bits: 2,
            positions: PositionLayout::RowMajor,
            taps: vec![ChannelTap::plain(BitRange::new(0, 2))],
            readout: Readout::Binary,
        };
        let c = counts(&[("011", 5), ("010", 5), ("100", 9), ("111", 1)]);
        let img = decode(&layout, &c, Some(&[2]), &DecodeOptions::default()).unwrap();
        assert_eq!(img.get(&[0]), Some(2.0));
        assert_eq!(img.get(&[1]), Some(0.0));
    }

    #[test]
    fn selector_gated_channels() {
        // payload: 2 selector bits then 1 value bit
        let taps = (0..3)
            .map(|c| ChannelTap {
                selector: Some(Selector {
                    bits: BitRange::new(0, 2),
                    value: c,
                }),
                value: BitRange::new(2, 1),
            })
            .collect();
        let layout = PayloadLayout {
            payload_bits: 3,
            positions: PositionLayout::RowMajor,
            taps,
            readout: Readout::Probability,
        };
        let c = counts(&[("001", 4), ("000", 4), ("011", 8), ("100", 8), ("111", 3)]);
        let img = decode(&layout, &c, Some(&[1]), &DecodeOptions::default()).unwrap();
        assert_eq!(img.shape(), &[1, 3]);
        assert_eq!(img.get(&[0, 0]), Some(0.5));
        assert_eq!(img.get(&[0, 1]), Some(1.0));
        assert_eq!(img.get(&[0, 2]), Some(0.0));
    }

    #[test]
    fn packed_angle_splits_bytes() {
        let max = (1u64 << 24) - 1;
        let raw: u64 = (200 << 16) | (100 << 8) | 50;
        let theta = raw as f64 / max as f64 * PI / 2.0;
        let p = theta.sin().powi(2);
        let shots = 1_000_000_000u64;
        let ones = (p * shots as f64).round() as u64;
        let c = counts(&[("0", shots - ones), ("1", ones)]);
        let layout = single_bit(
            Readout::PackedAngle {
                max_value: max,
                channels: 3,
                bits_per_channel: 8,
            },
            1,
        );
        let img = decode(&layout, &c, Some(&[1]), &DecodeOptions::default()).unwrap();
        assert_eq!(img.shape(), &[1, 3]);
        assert_eq!(img.get(&[0, 0]), Some(200.0));
        assert_eq!(img.get(&[0, 1]), Some(100.0));
    }

    #[test]
    fn bit_pairs_snap_to_levels() {
        let layout = PayloadLayout {
            payload_bits: 2,
            positions: PositionLayout::RowMajor,
            taps: vec![ChannelTap::plain(BitRange::new(0, 2))],
            readout: Readout::BitPairs,
        };
        // last qubit p = 1.0 → pair 0 = (1,1); first qubit p ≈ 0.345 → pair 1 = (0,1)
        let c = counts(&[("01", 655), ("11", 345)]);
        let img = decode(&layout, &c, Some(&[1]), &DecodeOptions::default()).unwrap();
        assert_eq!(img.get(&[0]), Some((0b11 | (0b10 << 2)) as f64));
    }

    #[test]
    fn grid_layout_and_padding() {
        let layout = PayloadLayout {
            payload_bits: 1,
            positions: PositionLayout::Grid,
            taps: vec![ChannelTap::plain(BitRange::new(0, 1))],
            readout: Readout::Probability,
        };
        // 3x3 image on a 2+2 bit grid; row 1 col 2 → bits "01" "10"
        let c = counts(&[("01101", 4), ("11111", 9)]);
        let img = decode(&layout, &c, Some(&[3, 3]), &DecodeOptions::default()).unwrap();
        assert_eq!(img.shape(), &[3, 3]);
        assert_eq!(img.get(&[1, 2]), Some(1.0));
        assert_eq!(img.as_array().sum(), 1.0);
    }

    #[test]
    fn shape_errors() {
        let layout = single_bit(Readout::Probability, 1);
        let c = counts(&[("0000", 1)]);
        let opts = DecodeOptions::default();
        // 3 position bits cannot be split over two axes
        assert!(matches!(
            decode(&layout, &c, None, &opts),
            Err(CodecError::InvalidResult { .. })
        ));
        // 3x3 = 9 > 8 positions
        assert!(decode(&layout, &c, Some(&[3, 3]), &opts).is_err());
        assert!(decode(&layout, &c, Some(&[2, 4]), &opts).is_ok());

        let narrow = counts(&[("1", 1)]);
        assert!(decode(&single_bit(Readout::Probability, 2), &narrow, None, &opts).is_err());
    }

    #[test]
    fn wide_outcomes_are_rejected_before_allocating() {
        let layout = single_bit(Readout::Probability, 1);
        let key = "0".repeat(41);
        let c = counts(&[(key.as_str(), 1)]);
        let opts = DecodeOptions::default();
        assert!(matches!(
            decode(&layout, &c, None, &opts),
            Err(CodecError::InvalidResult { .. })
        ));

        let roomy = DecodeOptions {
            max_qubits: 41,
            ..opts
        };
        assert!(matches!(
            decode(&layout, &c, None, &roomy),
            Err(CodecError::InvalidResult { .. })
        ));
    }

    #[test]
    fn layout_validation() {
        let mut layout = single_bit(Readout::Probability, 1);
        assert!(layout.validate().is_ok());
        layout.taps[0].value = BitRange::new(1, 1);
        assert!(layout.validate().is_err());

        let wide = PayloadLayout {
            payload_bits: 2,
            positions: PositionLayout::RowMajor,
            taps: vec![ChannelTap::plain(BitRange::new(0, 2))],
            readout: Readout::Angle { max_value: 1.0 },
        };
        assert!(wide.validate().is_err());
    }
}
