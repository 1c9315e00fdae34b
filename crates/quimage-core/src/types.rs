//! Core data types: images, state vectors, circuit descriptors and
//! measurement counts.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use nalgebra::{DMatrix, DVector};
use ndarray::{ArrayD, IxDyn};
use num_complex::Complex64;
use once_cell::sync::OnceCell;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::QUBIT_CEILING;
use crate::error::{CodecError, CodecResult};

/// A column of complex amplitudes.
pub type StateVector = DVector<Complex64>;

/// A dense complex matrix acting on a register.
pub type Operator = DMatrix<Complex64>;

/// Channel-axis sizes recognised when no dimensionality is given.
pub const CHANNEL_AXIS_SIZES: [usize; 3] = [1, 3, 4];

/// Longest bitstring a [`MeasurementCounts`] key may have.
pub const MAX_BITSTRING_LEN: usize = 63;

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// A rectangular array of non-negative, finite intensities.
///
/// The array may carry a trailing channel axis; which axes are spatial is
/// decided when the image is paired with a scheme (see [`PixelView`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    data: ArrayD<f64>,
}

impl Image {
    /// Wrap an array, rejecting empty axes and negative or non-finite values.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidImage`] if the array is zero-dimensional,
    /// has an axis of length 0, or holds a negative, NaN or infinite value.
    pub fn new(data: ArrayD<f64>) -> CodecResult<Self> {
        if data.ndim() == 0 {
            return Err(CodecError::invalid_image("image has no axes"));
        }
        if data.shape().iter().any(|&n| n == 0) {
            return Err(CodecError::invalid_image(format!(
                "image shape {:?} has an empty axis",
                data.shape()
            )));
        }
        if let Some(bad) = data.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(CodecError::invalid_image(format!(
                "pixel value {bad} is not a finite non-negative number"
            )));
        }
        Ok(Self { data })
    }

    /// Build an image from 8-bit samples.
    pub fn from_u8(data: ArrayD<u8>) -> CodecResult<Self> {
        Self::new(data.mapv(f64::from))
    }

    /// Full array shape, channel axis included.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Borrow the underlying array.
    pub fn as_array(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Unwrap into the underlying array.
    pub fn into_array(self) -> ArrayD<f64> {
        self.data
    }
}

// ---------------------------------------------------------------------------
// PixelView
// ---------------------------------------------------------------------------

/// How a grayscale payload map collapses a multi-channel pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelReduction {
    /// Take channel 0.
    #[default]
    First,
    /// Arithmetic mean over all channels.
    Average,
    /// `0.299 R + 0.587 G + 0.114 B`; images with fewer than three channels
    /// fall back to channel 0.
    Luminance,
}

impl ChannelReduction {
    /// Collapse the channel values of one pixel.
    pub fn reduce(self, values: &[f64]) -> f64 {
        match (self, values) {
            (_, []) => 0.0,
            (Self::First, [first, ..]) => *first,
            (Self::Average, vals) => vals.iter().sum::<f64>() / vals.len() as f64,
            (Self::Luminance, [r, g, b, ..]) => 0.299 * r + 0.587 * g + 0.114 * b,
            (Self::Luminance, [first, ..]) => *first,
        }
    }
}

/// An [`Image`] together with its resolved spatial layout.
///
/// This is what data and map kernels see. Coordinates passed to a kernel
/// always index the spatial axes only.
#[derive(Debug)]
pub struct PixelView<'a> {
    image: &'a Image,
    spatial_shape: Vec<usize>,
    has_channel_axis: bool,
    mean: OnceCell<f64>,
}

impl<'a> PixelView<'a> {
    /// Split `image` into spatial axes and an optional channel axis.
    ///
    /// With `dimensionality` set, the leading `dimensionality` axes are
    /// spatial and at most one trailing channel axis may remain. Without it,
    /// a trailing axis of size 1, 3 or 4 on an image of three or more axes is
    /// read as channels when `channel_aware` is set; otherwise every axis is
    /// spatial.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidImage`] when `dimensionality` is zero,
    /// exceeds the number of axes, or leaves more than one trailing axis.
    pub fn new(
        image: &'a Image,
        dimensionality: Option<usize>,
        channel_aware: bool,
    ) -> CodecResult<Self> {
        let shape = image.shape();
        let spatial_dims = match dimensionality {
            Some(0) => {
                return Err(CodecError::invalid_image("dimensionality must be at least 1"));
            }
            Some(d) if d > shape.len() => {
                return Err(CodecError::invalid_image(format!(
                    "dimensionality {d} exceeds the {} axes of the image",
                    shape.len()
                )));
            }
            Some(d) if shape.len() - d > 1 => {
                return Err(CodecError::invalid_image(format!(
                    "dimensionality {d} leaves {} trailing axes; at most one channel axis is allowed",
                    shape.len() - d
                )));
            }
            Some(d) => d,
            None => {
                let trailing_channels = channel_aware
                    && shape.len() >= 3
                    && shape
                        .last()
                        .map_or(false, |n| CHANNEL_AXIS_SIZES.contains(n));
                if trailing_channels {
                    shape.len() - 1
                } else {
                    shape.len()
                }
            }
        };

        Ok(Self {
            image,
            spatial_shape: shape[..spatial_dims].to_vec(),
            has_channel_axis: spatial_dims < shape.len(),
            mean: OnceCell::new(),
        })
    }

    /// The wrapped image.
    pub fn image(&self) -> &Image {
        self.image
    }

    /// Shape of the spatial axes.
    pub fn spatial_shape(&self) -> &[usize] {
        &self.spatial_shape
    }

    /// Number of spatial axes.
    pub fn ndims(&self) -> usize {
        self.spatial_shape.len()
    }

    /// Number of channels per pixel (1 when there is no channel axis).
    pub fn channels(&self) -> usize {
        if self.has_channel_axis {
            self.image.shape()[self.spatial_shape.len()]
        } else {
            1
        }
    }

    /// Whether the image carries a channel axis.
    pub fn has_channel_axis(&self) -> bool {
        self.has_channel_axis
    }

    /// Number of spatial positions.
    pub fn num_positions(&self) -> usize {
        self.spatial_shape.iter().product()
    }

    /// Value of one channel at `coords`.
    pub fn value(&self, coords: &[usize], channel: usize) -> CodecResult<f64> {
        self.check_coords(coords)?;
        if self.has_channel_axis {
            let mut index = coords.to_vec();
            index.push(channel);
            self.image
                .as_array()
                .get(IxDyn(&index))
                .copied()
                .ok_or_else(|| {
                    CodecError::invalid_image(format!(
                        "channel {channel} out of range for {} channels",
                        self.channels()
                    ))
                })
        } else if channel == 0 {
            Ok(self.image.as_array()[IxDyn(coords)])
        } else {
            Err(CodecError::invalid_image(format!(
                "channel {channel} requested from a single-channel image"
            )))
        }
    }

    /// All channel values at `coords`.
    pub fn pixel(&self, coords: &[usize]) -> CodecResult<Vec<f64>> {
        (0..self.channels())
            .map(|c| self.value(coords, c))
            .collect()
    }

    /// Row-major flat index of `coords` over the spatial shape.
    pub fn flat_index(&self, coords: &[usize]) -> CodecResult<usize> {
        self.check_coords(coords)?;
        Ok(coords
            .iter()
            .zip(&self.spatial_shape)
            .fold(0, |acc, (&c, &n)| acc * n + c))
    }

    /// Mean over every sample of the image, computed once per view.
    pub fn mean(&self) -> f64 {
        *self.mean.get_or_init(|| {
            let array = self.image.as_array();
            array.sum() / array.len() as f64
        })
    }

    fn check_coords(&self, coords: &[usize]) -> CodecResult<()> {
        if coords.len() != self.spatial_shape.len()
            || coords.iter().zip(&self.spatial_shape).any(|(c, n)| c >= n)
        {
            return Err(CodecError::invalid_image(format!(
                "coordinates {coords:?} outside spatial shape {:?}",
                self.spatial_shape
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CircuitDescriptor
// ---------------------------------------------------------------------------

/// Informational metadata attached to a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitMetadata {
    /// Scheme name, or `"custom"` for a custom bundle
    pub scheme: String,
    /// Spatial shape of the encoded image
    pub spatial_shape: Vec<usize>,
    /// Qubits addressing positions (`R * ndims`)
    pub position_qubits: u32,
    /// Qubits carrying the payload (`log2(d)`)
    pub payload_qubits: u32,
}

/// The composer's output: prepare `init_state`, apply `unitary`, measure
/// every qubit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DescriptorWire", into = "DescriptorWire")]
pub struct CircuitDescriptor {
    /// Register width
    pub n_qubits: u32,
    /// Normalized initial state of length `2^n_qubits`
    pub init_state: StateVector,
    /// Square unitary of dimension `2^n_qubits`
    pub unitary: Operator,
    /// Always `true`
    pub measure_all: bool,
    /// Informational metadata
    pub metadata: CircuitMetadata,
}

impl CircuitDescriptor {
    /// Hilbert-space dimension `2^n_qubits`.
    pub fn dimension(&self) -> usize {
        1usize << self.n_qubits
    }

    /// Serialize to the JSON wire format.
    pub fn to_json(&self) -> CodecResult<String> {
        serde_json::to_string(self)
            .map_err(|e| CodecError::numeric(format!("descriptor serialization failed: {e}")))
    }
}

/// Wire form: complex numbers as `[re, im]`, unitary as row-major rows.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DescriptorWire {
    n_qubits: u32,
    init_state: Vec<[f64; 2]>,
    unitary: Vec<Vec<[f64; 2]>>,
    measure_all: bool,
    metadata: CircuitMetadata,
}

impl From<CircuitDescriptor> for DescriptorWire {
    fn from(d: CircuitDescriptor) -> Self {
        let pair = |z: &Complex64| [z.re, z.im];
        let unitary = (0..d.unitary.nrows())
            .map(|i| d.unitary.row(i).iter().map(pair).collect())
            .collect();
        Self {
            n_qubits: d.n_qubits,
            init_state: d.init_state.iter().map(pair).collect(),
            unitary,
            measure_all: d.measure_all,
            metadata: d.metadata,
        }
    }
}

impl TryFrom<DescriptorWire> for CircuitDescriptor {
    type Error = String;

    fn try_from(w: DescriptorWire) -> Result<Self, Self::Error> {
        if w.n_qubits == 0 || w.n_qubits > QUBIT_CEILING {
            return Err(format!("n_qubits {} out of range", w.n_qubits));
        }
        let dim = 1usize << w.n_qubits;
        if w.init_state.len() != dim {
            return Err(format!(
                "init_state has {} amplitudes, expected {dim}",
                w.init_state.len()
            ));
        }
        if w.unitary.len() != dim || w.unitary.iter().any(|row| row.len() != dim) {
            return Err(format!("unitary must be {dim}x{dim}"));
        }
        let complex = |p: &[f64; 2]| Complex64::new(p[0], p[1]);
        let init_state = StateVector::from_iterator(dim, w.init_state.iter().map(complex));
        let unitary = Operator::from_row_iterator(
            dim,
            dim,
            w.unitary.iter().flat_map(|row| row.iter().map(complex)),
        );
        Ok(Self {
            n_qubits: w.n_qubits,
            init_state,
            unitary,
            measure_all: w.measure_all,
            metadata: w.metadata,
        })
    }
}

// ---------------------------------------------------------------------------
// MeasurementCounts
// ---------------------------------------------------------------------------

/// Bitstring → shot count, with uniform key width.
///
/// Keys are most-significant-qubit first. Every key has the same length,
/// consists only of `'0'` and `'1'`, and appears once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementCounts {
    width: usize,
    total: u64,
    counts: BTreeMap<String, u64>,
}

impl MeasurementCounts {
    /// Build from `(bitstring, count)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidResult`] for an empty input, a duplicate
    /// or non-binary key, keys of differing length, or a total that
    /// overflows `u64`.
    pub fn from_pairs<I, S>(pairs: I) -> CodecResult<Self>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut counts = BTreeMap::new();
        let mut width = None;
        let mut total: u64 = 0;

        for (key, count) in pairs {
            let key = key.into();
            validate_key(&key)?;
            match width {
                None => width = Some(key.len()),
                Some(w) if w != key.len() => {
                    return Err(CodecError::invalid_result(format!(
                        "bitstring '{key}' has length {}, expected {w}",
                        key.len()
                    )));
                }
                Some(_) => {}
            }
            total = total
                .checked_add(count)
                .ok_or_else(|| CodecError::invalid_result("total count overflows u64"))?;
            if counts.insert(key.clone(), count).is_some() {
                return Err(CodecError::invalid_result(format!(
                    "duplicate bitstring '{key}'"
                )));
            }
        }

        let width = width.ok_or_else(|| CodecError::invalid_result("no measurement outcomes"))?;
        Ok(Self {
            width,
            total,
            counts,
        })
    }

    /// Parse the JSON wire format with the strict deserializer.
    ///
    /// Anything other than a single JSON object mapping bitstrings to
    /// non-negative integers is rejected.
    pub fn from_json(text: &str) -> CodecResult<Self> {
        serde_json::from_str(text).map_err(|e| CodecError::invalid_result(e.to_string()))
    }

    /// Serialize to the JSON wire format.
    pub fn to_json(&self) -> String {
        // A map of strings to integers always serializes.
        serde_json::to_string(&self.counts).unwrap_or_default()
    }

    /// Key width in bits.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Always `false`; empty counts are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count recorded for `bitstring`, 0 if absent.
    pub fn get(&self, bitstring: &str) -> u64 {
        self.counts.get(bitstring).copied().unwrap_or(0)
    }

    /// Iterate in lexicographic (= numeric) key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, u64> {
        self.counts.iter()
    }

    /// A copy holding every one of the `2^n_qubits` keys, absent ones at 0.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidResult`] if the key width differs from
    /// `n_qubits` or the register is too wide to enumerate.
    pub fn padded(&self, n_qubits: u32) -> CodecResult<Self> {
        if self.width != n_qubits as usize {
            return Err(CodecError::invalid_result(format!(
                "cannot pad {}-bit counts to {n_qubits} qubits",
                self.width
            )));
        }
        if n_qubits > QUBIT_CEILING {
            return Err(CodecError::invalid_result(format!(
                "refusing to enumerate 2^{n_qubits} outcomes"
            )));
        }
        let width = self.width;
        let mut counts: BTreeMap<String, u64> = (0..1u64 << n_qubits)
            .map(|i| (format!("{i:0width$b}"), 0))
            .collect();
        for (k, v) in &self.counts {
            counts.insert(k.clone(), *v);
        }
        Ok(Self {
            width,
            total: self.total,
            counts,
        })
    }

    /// Check these counts against the circuit that produced them.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidResult`] if the key width is not
    /// `descriptor.n_qubits` or more than `shots` outcomes were reported.
    pub fn validate_against(&self, descriptor: &CircuitDescriptor, shots: u64) -> CodecResult<()> {
        if self.width != descriptor.n_qubits as usize {
            return Err(CodecError::invalid_result(format!(
                "bitstring width {} does not match {} qubits",
                self.width, descriptor.n_qubits
            )));
        }
        if self.total > shots {
            return Err(CodecError::invalid_result(format!(
                "{} outcomes reported for {shots} shots",
                self.total
            )));
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a MeasurementCounts {
    type Item = (&'a String, &'a u64);
    type IntoIter = btree_map::Iter<'a, String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.iter()
    }
}

fn validate_key(key: &str) -> CodecResult<()> {
    if key.is_empty() {
        return Err(CodecError::invalid_result("empty bitstring"));
    }
    if key.len() > MAX_BITSTRING_LEN {
        return Err(CodecError::invalid_result(format!(
            "bitstring longer than {MAX_BITSTRING_LEN} bits"
        )));
    }
    if !key.bytes().all(|b| b == b'0' || b == b'1') {
        return Err(CodecError::invalid_result(format!(
            "'{key}' is not a bitstring"
        )));
    }
    Ok(())
}

impl Serialize for MeasurementCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (k, v) in &self.counts {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MeasurementCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(CountsVisitor)
    }
}

struct CountsVisitor;

impl<'de> Visitor<'de> for CountsVisitor {
    type Value = MeasurementCounts;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object mapping bitstrings to non-negative integer counts")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut pairs: Vec<(String, u64)> = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(key) = access.next_key::<String>()? {
            let count = access.next_value::<u64>()?;
            pairs.push((key, count));
        }
        MeasurementCounts::from_pairs(pairs).map_err(|e| match e {
            CodecError::InvalidResult { message } => de::Error::custom(message),
            other => de::Error::custom(other),
        })
    }
}

// ---------------------------------------------------------------------------
// ReconstructedImage
// ---------------------------------------------------------------------------

/// A decoded image.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedImage {
    data: ArrayD<f64>,
}

impl ReconstructedImage {
    pub(crate) fn new(data: ArrayD<f64>) -> Self {
        Self { data }
    }

    /// Output shape, channel axis included.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Value at a full index.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        self.data.get(IxDyn(index)).copied()
    }

    /// Borrow the underlying array.
    pub fn as_array(&self) -> &ArrayD<f64> {
        &self.data
    }

    /// Unwrap into the underlying array.
    pub fn into_array(self) -> ArrayD<f64> {
        self.data
    }

    /// Round to the nearest integer and clamp into `0..=255`.
    pub fn to_u8(&self) -> ArrayD<u8> {
        self.data.mapv(|v| {
            if v.is_nan() {
                0
            } else {
                v.round().clamp(0.0, 255.0) as u8
            }
        })
    }
}

impl fmt::Display for ReconstructedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    fn image(shape: &[usize]) -> Image {
        Image::new(Array::from_elem(IxDyn(shape), 1.0)).unwrap()
    }

    #[test]
    fn image_rejects_bad_values() {
        assert!(Image::new(array![[1.0, -0.5]].into_dyn()).is_err());
        assert!(Image::new(array![[1.0, f64::NAN]].into_dyn()).is_err());
        assert!(Image::new(Array::<f64, _>::zeros(IxDyn(&[0, 3]))).is_err());
        assert!(Image::new(array![[0.0, 255.0]].into_dyn()).is_ok());
    }

    #[test]
    fn spatial_shape_explicit_dimensionality() {
        let img = image(&[4, 4, 3]);
        let view = PixelView::new(&img, Some(2), false).unwrap();
        assert_eq!(view.spatial_shape(), &[4, 4]);
        assert_eq!(view.channels(), 3);

        let view = PixelView::new(&img, Some(3), false).unwrap();
        assert_eq!(view.spatial_shape(), &[4, 4, 3]);
        assert!(!view.has_channel_axis());

        assert!(PixelView::new(&img, Some(1), false).is_err());
        assert!(PixelView::new(&img, Some(4), false).is_err());
        assert!(PixelView::new(&img, Some(0), false).is_err());
    }

    #[test]
    fn spatial_shape_inferred() {
        let rgb = image(&[2, 2, 3]);
        assert_eq!(
            PixelView::new(&rgb, None, true).unwrap().spatial_shape(),
            &[2, 2]
        );
        assert_eq!(
            PixelView::new(&rgb, None, false).unwrap().spatial_shape(),
            &[2, 2, 3]
        );

        // A square 4x4 image is never mistaken for a 1-D RGBA strip.
        let square = image(&[4, 4]);
        assert_eq!(
            PixelView::new(&square, None, true).unwrap().spatial_shape(),
            &[4, 4]
        );
    }

    #[test]
    fn flat_index_is_row_major() {
        let img = image(&[2, 3]);
        let view = PixelView::new(&img, None, false).unwrap();
        assert_eq!(view.flat_index(&[0, 0]).unwrap(), 0);
        assert_eq!(view.flat_index(&[0, 2]).unwrap(), 2);
        assert_eq!(view.flat_index(&[1, 0]).unwrap(), 3);
        assert!(view.flat_index(&[2, 0]).is_err());
    }

    #[test]
    fn pixel_values_and_mean() {
        let img = Image::new(array![[[10.0, 20.0, 30.0]], [[0.0, 0.0, 60.0]]].into_dyn()).unwrap();
        let view = PixelView::new(&img, Some(2), true).unwrap();
        assert_eq!(view.pixel(&[0, 0]).unwrap(), vec![10.0, 20.0, 30.0]);
        assert_eq!(view.value(&[1, 0], 2).unwrap(), 60.0);
        assert!(view.value(&[1, 0], 3).is_err());
        assert!((view.mean() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn channel_reduction() {
        let px = [100.0, 200.0, 50.0];
        assert_eq!(ChannelReduction::First.reduce(&px), 100.0);
        assert!((ChannelReduction::Average.reduce(&px) - 350.0 / 3.0).abs() < 1e-12);
        assert!((ChannelReduction::Luminance.reduce(&px) - 153.0).abs() < 1e-9);
        assert_eq!(ChannelReduction::Luminance.reduce(&[7.0]), 7.0);
    }

    #[test]
    fn counts_strict_parsing() {
        let counts = MeasurementCounts::from_json(r#"{"01": 3, "10": 5}"#).unwrap();
        assert_eq!(counts.width(), 2);
        assert_eq!(counts.total(), 8);
        assert_eq!(counts.get("10"), 5);
        assert_eq!(counts.get("11"), 0);

        for bad in [
            r#"{"01": 3, "01": 4}"#,
            r#"{"01": 3, "1": 4}"#,
            r#"{"0a": 3}"#,
            r#"{"01": -1}"#,
            r#"{"01": 1.5}"#,
            r#"{"": 1}"#,
            r#"{}"#,
            r#"["01", 3]"#,
            "print('x') or {'01': 1}",
        ] {
            let err = MeasurementCounts::from_json(bad).unwrap_err();
            assert!(matches!(err, CodecError::InvalidResult { .. }), "{bad}");
        }
    }

    #[test]
    fn counts_padding() {
        let counts = MeasurementCounts::from_pairs([("10", 4u64)]).unwrap();
        let padded = counts.padded(2).unwrap();
        let keys: Vec<&str> = padded.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["00", "01", "10", "11"]);
        assert_eq!(padded.get("10"), 4);
        assert_eq!(padded.total(), 4);
        assert!(counts.padded(3).is_err());
    }

    #[test]
    fn descriptor_wire_format() {
        let d = CircuitDescriptor {
            n_qubits: 1,
            init_state: StateVector::from_vec(vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)]),
            unitary: Operator::from_row_slice(
                2,
                2,
                &[
                    Complex64::new(0.0, 0.0),
                    Complex64::new(1.0, 0.0),
                    Complex64::new(0.0, 1.0),
                    Complex64::new(0.0, 0.0),
                ],
            ),
            measure_all: true,
            metadata: CircuitMetadata {
                scheme: "test".into(),
                spatial_shape: vec![1],
                position_qubits: 0,
                payload_qubits: 1,
            },
        };
        let json: serde_json::Value = serde_json::from_str(&d.to_json().unwrap()).unwrap();
        assert_eq!(json["unitary"][0][1], serde_json::json!([1.0, 0.0]));
        assert_eq!(json["unitary"][1][0], serde_json::json!([0.0, 1.0]));

        let back: CircuitDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn to_u8_rounds_and_clamps() {
        let img = ReconstructedImage::new(array![[-3.0, 127.5], [254.6, 300.0]].into_dyn());
        assert_eq!(img.to_u8(), array![[0u8, 128], [255, 255]].into_dyn());
    }
}
