//! Retrieve kernels.
//!
//! Every built-in retrieve kernel is a [`PayloadLayout`] read through the
//! generic decoder; the kernels differ only in the layout they build from
//! their parameters.

use serde::Deserialize;

use super::{parse_params, KernelCatalog, KernelParams};
use crate::decoder::{BitRange, ChannelTap, PayloadLayout, PositionLayout, Readout, Selector};
use crate::scheme::Retrieve;

pub(super) fn register(catalog: &mut KernelCatalog) {
    catalog.register_retrieve("probability", |p| {
        let p: SingleBitParams = parse_params(p)?;
        LayoutRetrieve::new(p.layout(Readout::Probability)?)
    });
    catalog.register_retrieve("angle", |p| {
        let p: SingleBitParams = parse_params(p)?;
        let max_value = p.max_value.unwrap_or(255.0);
        LayoutRetrieve::new(p.layout(Readout::Angle { max_value })?)
    });
    catalog.register_retrieve("binary", |p| {
        let p: BinaryParams = parse_params(p)?;
        LayoutRetrieve::new(PayloadLayout {
            payload_bits: p.payload_qubits,
            positions: p.positions,
            taps: vec![ChannelTap::plain(BitRange::new(0, p.payload_qubits))],
            readout: Readout::Binary,
        })
    });
    catalog.register_retrieve("bit_pairs", |p| {
        let p: BinaryParams = parse_params(p)?;
        LayoutRetrieve::new(PayloadLayout {
            payload_bits: p.payload_qubits,
            positions: p.positions,
            taps: vec![ChannelTap::plain(BitRange::new(0, p.payload_qubits))],
            readout: Readout::BitPairs,
        })
    });
    catalog.register_retrieve("angle_channels", |p| {
        let p: AngleChannelsParams = parse_params(p)?;
        let sel = selector_bits(p.channels)?;
        let taps = (0..p.channels)
            .map(|c| ChannelTap {
                selector: (sel > 0).then_some(Selector {
                    bits: BitRange::new(0, sel),
                    value: c as u64,
                }),
                value: BitRange::new(sel, 1),
            })
            .collect();
        LayoutRetrieve::new(PayloadLayout {
            payload_bits: sel + 1,
            positions: p.positions,
            taps,
            readout: Readout::Angle {
                max_value: p.max_value,
            },
        })
    });
    catalog.register_retrieve("binary_channels", |p| {
        let p: BinaryChannelsParams = parse_params(p)?;
        let sel = selector_bits(p.channels)?;
        let taps = (0..p.channels)
            .map(|c| ChannelTap {
                selector: (sel > 0).then_some(Selector {
                    bits: BitRange::new(p.bits, sel),
                    value: c as u64,
                }),
                value: BitRange::new(0, p.bits),
            })
            .collect();
        LayoutRetrieve::new(PayloadLayout {
            payload_bits: p.bits + sel,
            positions: p.positions,
            taps,
            readout: Readout::Binary,
        })
    });
    catalog.register_retrieve("packed_angle", |p| {
        let p: PackedParams = parse_params(p)?;
        let total_bits = p.channels as u32 * p.bits_per_channel;
        if total_bits == 0 || total_bits > 48 {
            return Err("channels * bits_per_channel must be in 1..=48".into());
        }
        LayoutRetrieve::new(PayloadLayout {
            payload_bits: 1,
            positions: p.positions,
            taps: vec![ChannelTap::plain(BitRange::new(0, 1))],
            readout: Readout::PackedAngle {
                max_value: (1u64 << total_bits) - 1,
                channels: p.channels,
                bits_per_channel: p.bits_per_channel,
            },
        })
    });
}

fn selector_bits(channels: usize) -> Result<usize, String> {
    if !(1..=8).contains(&channels) {
        return Err("channels must be in 1..=8".into());
    }
    Ok((usize::BITS - (channels - 1).leading_zeros()) as usize)
}

/// A retrieve kernel defined entirely by its payload layout.
#[derive(Debug, Clone)]
pub struct LayoutRetrieve {
    layout: PayloadLayout,
}

impl LayoutRetrieve {
    /// Validate `layout` and wrap it.
    pub fn new(layout: PayloadLayout) -> Result<Box<dyn Retrieve>, String> {
        layout.validate()?;
        Ok(Box::new(Self { layout }))
    }
}

impl Retrieve for LayoutRetrieve {
    fn layout(&self) -> &PayloadLayout {
        &self.layout
    }
}

fn one() -> usize {
    1
}

fn eight() -> usize {
    8
}

fn three() -> usize {
    3
}

fn max_255() -> f64 {
    255.0
}

/// Params for `probability` and `angle`: one value bit, by default the last.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SingleBitParams {
    #[serde(default = "one")]
    payload_qubits: usize,
    #[serde(default)]
    value_bit: Option<usize>,
    #[serde(default)]
    max_value: Option<f64>,
    #[serde(default)]
    positions: PositionLayout,
}

impl SingleBitParams {
    fn layout(&self, readout: Readout) -> Result<PayloadLayout, String> {
        if self.payload_qubits == 0 {
            return Err("payload_qubits must be at least 1".into());
        }
        if self.max_value.is_some() && !matches!(readout, Readout::Angle { .. }) {
            return Err("max_value only applies to angle readouts".into());
        }
        let bit = self.value_bit.unwrap_or(self.payload_qubits - 1);
        Ok(PayloadLayout {
            payload_bits: self.payload_qubits,
            positions: self.positions,
            taps: vec![ChannelTap::plain(BitRange::new(bit, 1))],
            readout,
        })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BinaryParams {
    #[serde(default = "eight")]
    payload_qubits: usize,
    #[serde(default)]
    positions: PositionLayout,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AngleChannelsParams {
    #[serde(default = "three")]
    channels: usize,
    #[serde(default = "max_255")]
    max_value: f64,
    #[serde(default)]
    positions: PositionLayout,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BinaryChannelsParams {
    #[serde(default = "three")]
    channels: usize,
    #[serde(default = "eight")]
    bits: usize,
    #[serde(default)]
    positions: PositionLayout,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PackedParams {
    #[serde(default = "three")]
    channels: usize,
    #[serde(default = "eight_u32")]
    bits_per_channel: u32,
    #[serde(default)]
    positions: PositionLayout,
}

fn eight_u32() -> u32 {
    8
}
