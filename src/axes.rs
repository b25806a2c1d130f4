//! Named axes and selections over them.
//!
//! Images are addressed with labels in storage order, outermost first, for
//! example `["t", "c", "z", "y", "x"]`. Interleaved RGB(A) data carries one
//! more trailing axis, `"_c"`, holding 3 or 4 samples per pixel.
//!
//! A [`Selection`] names indices on the non-spatial axes; any axis it does
//! not mention is read at index 0.

use std::fmt;

use crate::error::{IndexError, MetadataError};

/// Label of the trailing sample axis of interleaved images.
pub const SAMPLE_AXIS: &str = "_c";

/// Ordered, unique axis names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AxisLabels(Vec<String>);

impl AxisLabels {
    /// Build labels, rejecting duplicates and a `_c` axis anywhere but last.
    pub fn new<I, S>(labels: I) -> Result<Self, MetadataError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(MetadataError::Unsupported(format!(
                    "duplicate axis label '{}'",
                    label
                )));
            }
            if label == SAMPLE_AXIS && i + 1 != labels.len() {
                return Err(MetadataError::Unsupported(
                    "sample axis '_c' must be the last axis".to_string(),
                ));
            }
        }
        Ok(Self(labels))
    }

    /// Labels for an OME `DimensionOrder`: the order lists the fastest axis
    /// first, so `"XYZCT"` becomes `[t, c, z, y, x]`.
    pub fn from_dimension_order(order: &str) -> Result<Self, IndexError> {
        Ok(DimensionOrder::parse(order)?.labels())
    }

    /// Append the interleaved sample axis.
    pub fn with_interleaved_samples(mut self) -> Self {
        if !self.is_interleaved() {
            self.0.push(SAMPLE_AXIS.to_string());
        }
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn position(&self, axis: &str) -> Option<usize> {
        self.0.iter().position(|l| l == axis)
    }

    pub fn contains(&self, axis: &str) -> bool {
        self.position(axis).is_some()
    }

    /// True when the last axis is the `_c` sample axis.
    pub fn is_interleaved(&self) -> bool {
        self.0.last().map(|l| l == SAMPLE_AXIS).unwrap_or(false)
    }

    /// Positions of the `y` and `x` axes.
    pub fn spatial_positions(&self) -> Option<(usize, usize)> {
        Some((self.position("y")?, self.position("x")?))
    }
}

impl fmt::Display for AxisLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// True when `shape` ends in a 3- or 4-sample interleaved axis.
pub fn is_interleaved(labels: &AxisLabels, shape: &[usize]) -> bool {
    labels.is_interleaved() && matches!(shape.last(), Some(3) | Some(4))
}

// =============================================================================
// Dimension order
// =============================================================================

/// The six OME `DimensionOrder` values, all with X and Y fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimensionOrder {
    Xyzct,
    Xyztc,
    Xyctz,
    Xyczt,
    Xytcz,
    Xytzc,
}

impl DimensionOrder {
    pub const ALL: [DimensionOrder; 6] = [
        DimensionOrder::Xyzct,
        DimensionOrder::Xyztc,
        DimensionOrder::Xyctz,
        DimensionOrder::Xyczt,
        DimensionOrder::Xytcz,
        DimensionOrder::Xytzc,
    ];

    pub fn parse(order: &str) -> Result<Self, IndexError> {
        match order.to_ascii_uppercase().as_str() {
            "XYZCT" => Ok(DimensionOrder::Xyzct),
            "XYZTC" => Ok(DimensionOrder::Xyztc),
            "XYCTZ" => Ok(DimensionOrder::Xyctz),
            "XYCZT" => Ok(DimensionOrder::Xyczt),
            "XYTCZ" => Ok(DimensionOrder::Xytcz),
            "XYTZC" => Ok(DimensionOrder::Xytzc),
            _ => Err(IndexError::UnsupportedDimensionOrder(order.to_string())),
        }
    }

    /// Storage-order labels, slowest axis first.
    pub fn labels(self) -> AxisLabels {
        AxisLabels(
            self.as_str()
                .chars()
                .rev()
                .map(|c| c.to_ascii_lowercase().to_string())
                .collect(),
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DimensionOrder::Xyzct => "XYZCT",
            DimensionOrder::Xyztc => "XYZTC",
            DimensionOrder::Xyctz => "XYCTZ",
            DimensionOrder::Xyczt => "XYCZT",
            DimensionOrder::Xytcz => "XYTCZ",
            DimensionOrder::Xytzc => "XYTZC",
        }
    }
}

impl fmt::Display for DimensionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Indices on named non-spatial axes. Unnamed axes read index 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Selection {
    entries: Vec<(String, usize)>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// The common `(t, c, z)` selection.
    pub fn tcz(t: usize, c: usize, z: usize) -> Self {
        Self::new().with("t", t).with("c", c).with("z", z)
    }

    /// Set `axis` to `index`, replacing an earlier value for the same axis.
    pub fn with(mut self, axis: impl Into<String>, index: usize) -> Self {
        let axis = axis.into();
        match self.entries.iter_mut().find(|(name, _)| *name == axis) {
            Some(entry) => entry.1 = index,
            None => self.entries.push((axis, index)),
        }
        self
    }

    /// Index on `axis`, 0 when unset.
    pub fn get(&self, axis: &str) -> usize {
        self.entries
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, index)| *index)
            .unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(name, index)| (name.as_str(), *index))
    }

    pub fn plane_key(&self) -> PlaneKey {
        PlaneKey {
            t: self.get("t"),
            c: self.get("c"),
            z: self.get("z"),
        }
    }

    /// Check every named axis exists and every index is in range.
    pub fn validate(&self, labels: &AxisLabels, shape: &[usize]) -> Result<(), IndexError> {
        for (axis, index) in self.iter() {
            let pos = labels.position(axis).ok_or_else(|| unknown_axis(axis, labels))?;
            let size = shape.get(pos).copied().unwrap_or(0);
            if index >= size {
                return Err(IndexError::SelectionOutOfRange {
                    axis: axis.to_string(),
                    index,
                    size,
                });
            }
        }
        Ok(())
    }
}

/// A `(t, c, z)` triple, used as a lookup key by the TIFF indexers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaneKey {
    pub t: usize,
    pub c: usize,
    pub z: usize,
}

impl fmt::Display for PlaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.t, self.c, self.z)
    }
}

/// A selection either already in storage order or keyed by axis name.
#[derive(Debug, Clone, Copy)]
pub enum SelectionInput<'a> {
    Ordered(&'a [usize]),
    Named(&'a Selection),
}

impl<'a> From<&'a Selection> for SelectionInput<'a> {
    fn from(selection: &'a Selection) -> Self {
        SelectionInput::Named(selection)
    }
}

impl<'a> From<&'a [usize]> for SelectionInput<'a> {
    fn from(indices: &'a [usize]) -> Self {
        SelectionInput::Ordered(indices)
    }
}

impl<'a> From<&'a Vec<usize>> for SelectionInput<'a> {
    fn from(indices: &'a Vec<usize>) -> Self {
        SelectionInput::Ordered(indices.as_slice())
    }
}

/// Map a selection onto one index per axis, in label order.
///
/// Ordered input passes through after a rank check. Named input fails on the
/// first unknown axis; unnamed axes are 0.
pub fn resolve_selection<'a>(
    labels: &AxisLabels,
    selection: impl Into<SelectionInput<'a>>,
) -> Result<Vec<usize>, IndexError> {
    match selection.into() {
        SelectionInput::Ordered(indices) => {
            if indices.len() != labels.len() {
                return Err(IndexError::RankMismatch {
                    expected: labels.len(),
                    actual: indices.len(),
                });
            }
            Ok(indices.to_vec())
        }
        SelectionInput::Named(selection) => {
            let mut resolved = vec![0; labels.len()];
            for (axis, index) in selection.iter() {
                let pos = labels
                    .position(axis)
                    .ok_or_else(|| unknown_axis(axis, labels))?;
                resolved[pos] = index;
            }
            Ok(resolved)
        }
    }
}

fn unknown_axis(axis: &str, labels: &AxisLabels) -> IndexError {
    IndexError::UnknownAxis {
        axis: axis.to_string(),
        labels: labels.as_slice().to_vec(),
    }
}
