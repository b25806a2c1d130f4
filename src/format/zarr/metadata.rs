//! Zarr v2 `.zarray` and OME-NGFF `.zattrs` documents.

use serde::Deserialize;
use serde_json::Value;

use crate::decode::Codec;
use crate::dtype::DataType;
use crate::error::{LoadError, MetadataError};
use crate::format::tiff::ByteOrder;

// =============================================================================
// Arrays
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct ArrayDocument {
    zarr_format: u32,
    shape: Vec<usize>,
    chunks: Vec<usize>,
    dtype: String,
    #[serde(default)]
    compressor: Option<CompressorDocument>,
    #[serde(default)]
    fill_value: Value,
    #[serde(default = "default_order")]
    order: String,
    #[serde(default)]
    filters: Option<Vec<Value>>,
    #[serde(default)]
    dimension_separator: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CompressorDocument {
    id: String,
}

fn default_order() -> String {
    "C".to_string()
}

/// A parsed Zarr v2 array: geometry, sample type and chunk encoding.
#[derive(Debug, Clone)]
pub struct ZarrArray {
    /// Key prefix of the array inside its store, empty for the root
    pub path: String,
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
    pub dtype: DataType,
    pub byte_order: ByteOrder,
    pub codec: Codec,
    /// Value of elements whose chunk was never written
    pub fill_value: f64,
    pub separator: char,
}

impl ZarrArray {
    /// Parse the `.zarray` document of the array at `path`.
    pub fn parse(path: &str, document: &[u8]) -> Result<Self, LoadError> {
        let key = metadata_key(path, ".zarray");
        let doc: ArrayDocument = serde_json::from_slice(document).map_err(|e| {
            MetadataError::Json {
                key: key.clone(),
                message: e.to_string(),
            }
        })?;

        if doc.zarr_format != 2 {
            return Err(MetadataError::Unsupported(format!(
                "{}: zarr_format {}",
                key, doc.zarr_format
            ))
            .into());
        }
        if doc.shape.len() != doc.chunks.len() || doc.chunks.iter().any(|&c| c == 0) {
            return Err(MetadataError::Unsupported(format!(
                "{}: chunks {:?} do not fit shape {:?}",
                key, doc.chunks, doc.shape
            ))
            .into());
        }
        if doc.order != "C" {
            return Err(MetadataError::Unsupported(format!("{}: order '{}'", key, doc.order)).into());
        }
        if doc.filters.as_ref().is_some_and(|f| !f.is_empty()) {
            return Err(MetadataError::Unsupported(format!("{}: filters", key)).into());
        }

        let (dtype, byte_order) = DataType::from_zarr(&doc.dtype)?;
        let codec = Codec::from_zarr(doc.compressor.as_ref().map(|c| c.id.as_str()))?;
        let separator = match doc.dimension_separator.as_deref() {
            None | Some(".") => '.',
            Some("/") => '/',
            Some(other) => {
                return Err(MetadataError::Unsupported(format!(
                    "{}: dimension_separator '{}'",
                    key, other
                ))
                .into())
            }
        };

        Ok(Self {
            path: path.trim_matches('/').to_string(),
            shape: doc.shape,
            chunks: doc.chunks,
            dtype,
            byte_order,
            codec,
            fill_value: parse_fill_value(&doc.fill_value),
            separator,
        })
    }

    /// Store key of the chunk at grid position `coords`.
    pub fn chunk_key(&self, coords: &[usize]) -> String {
        let sep = self.separator.to_string();
        let name = coords
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(&sep);
        if self.path.is_empty() {
            name
        } else {
            format!("{}/{}", self.path, name)
        }
    }

    /// Elements in one chunk.
    pub fn chunk_len(&self) -> usize {
        self.chunks.iter().product()
    }

    /// Decoded size of one chunk in bytes.
    pub fn chunk_byte_len(&self) -> usize {
        self.chunk_len() * self.dtype.bytes_per_sample()
    }

    /// C-order element strides of one chunk.
    pub fn chunk_strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.chunks.len()];
        for i in (0..self.chunks.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.chunks[i + 1];
        }
        strides
    }
}

/// Key of a metadata document under `path`.
pub fn metadata_key(path: &str, name: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", path, name)
    }
}

fn parse_fill_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::String(s) => match s.as_str() {
            "NaN" => f64::NAN,
            "Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            _ => 0.0,
        },
        _ => 0.0,
    }
}

// =============================================================================
// Multiscales
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
struct GroupAttributes {
    #[serde(default)]
    multiscales: Vec<MultiscaleDocument>,
    #[serde(default)]
    omero: Option<OmeroDocument>,
}

#[derive(Debug, Clone, Deserialize)]
struct MultiscaleDocument {
    #[serde(default)]
    axes: Option<Vec<AxisDocument>>,
    datasets: Vec<DatasetDocument>,
    #[serde(default)]
    name: Option<String>,
}

/// NGFF 0.3 lists axis names, 0.4 and later axis objects.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AxisDocument {
    Name(String),
    Object {
        name: String,
        #[serde(default)]
        unit: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct DatasetDocument {
    path: String,
    #[serde(default, rename = "coordinateTransformations")]
    transforms: Vec<TransformDocument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TransformDocument {
    Scale {
        scale: Vec<f64>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
struct OmeroDocument {
    #[serde(default)]
    channels: Vec<OmeroChannel>,
}

#[derive(Debug, Clone, Deserialize)]
struct OmeroChannel {
    #[serde(default)]
    label: Option<String>,
}

/// One named axis of a multiscale image.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisInfo {
    pub name: String,
    pub unit: Option<String>,
}

/// The first multiscale image described by a group's `.zattrs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Multiscales {
    pub name: Option<String>,
    /// `None` for NGFF versions that predate axis metadata
    pub axes: Option<Vec<AxisInfo>>,
    /// Array paths, finest level first
    pub paths: Vec<String>,
    /// Scale factors of the finest level, one per axis, when declared
    pub scale: Option<Vec<f64>>,
    pub channel_names: Vec<String>,
}

impl Multiscales {
    /// Parse a group's `.zattrs`. A group without `multiscales` is treated as
    /// a single array at its root.
    pub fn parse(document: &[u8]) -> Result<Self, MetadataError> {
        let attrs: GroupAttributes =
            serde_json::from_slice(document).map_err(|e| MetadataError::Json {
                key: ".zattrs".to_string(),
                message: e.to_string(),
            })?;

        let channel_names = attrs
            .omero
            .map(|o| {
                o.channels
                    .into_iter()
                    .enumerate()
                    .map(|(i, c)| c.label.unwrap_or_else(|| format!("Channel {}", i)))
                    .collect()
            })
            .unwrap_or_default();

        let Some(multiscale) = attrs.multiscales.into_iter().next() else {
            return Ok(Self {
                name: None,
                axes: None,
                paths: vec![String::new()],
                scale: None,
                channel_names,
            });
        };
        if multiscale.datasets.is_empty() {
            return Err(MetadataError::MissingField("multiscales[0].datasets".to_string()));
        }

        let axes = multiscale.axes.map(|axes| {
            axes.into_iter()
                .map(|axis| match axis {
                    AxisDocument::Name(name) => AxisInfo { name, unit: None },
                    AxisDocument::Object { name, unit } => AxisInfo { name, unit },
                })
                .collect()
        });
        let scale = multiscale.datasets[0].transforms.iter().find_map(|t| match t {
            TransformDocument::Scale { scale } => Some(scale.clone()),
            TransformDocument::Other => None,
        });

        Ok(Self {
            name: multiscale.name,
            axes,
            paths: multiscale.datasets.into_iter().map(|d| d.path).collect(),
            scale,
            channel_names,
        })
    }
}
