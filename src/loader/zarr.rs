use std::sync::Arc;

use tracing::debug;

use super::{ImageMetadata, LoadOptions, MultiscaleImage};
use crate::axes::AxisLabels;
use crate::error::{LoadError, MetadataError};
use crate::format::zarr::{metadata_key, ChunkStore, Multiscales, ZarrArray};
use crate::format::DEFAULT_PHYSICAL_UNIT;
use crate::source::{PhysicalSize, PhysicalSizes, PixelMeta, PixelSource, ZarrPixelSource};

/// Axis names assumed when the group does not declare any, trimmed from the
/// left to the array's rank.
const DEFAULT_AXES: [&str; 5] = ["t", "c", "z", "y", "x"];

/// Open the first multiscale image of an OME-Zarr group. A store without
/// `.zattrs` is read as a single array at its root.
pub async fn load_ome_zarr(
    store: Arc<dyn ChunkStore>,
    options: LoadOptions,
) -> Result<MultiscaleImage, LoadError> {
    let multiscales = match store.get(".zattrs").await? {
        Some(document) => Multiscales::parse(&document)?,
        None => Multiscales::parse(b"{}")?,
    };

    let mut arrays = Vec::with_capacity(multiscales.paths.len());
    for path in &multiscales.paths {
        let key = metadata_key(path, ".zarray");
        let document = store
            .get(&key)
            .await?
            .ok_or_else(|| MetadataError::MissingField(key.clone()))?;
        arrays.push(ZarrArray::parse(path, &document)?);
    }
    let Some(base) = arrays.first() else {
        return Err(MetadataError::MissingField("multiscales[0].datasets".to_string()).into());
    };
    let labels = axis_labels(&multiscales, base.shape.len())?;
    let base_shape = base.shape.clone();
    debug!(
        store = store.identifier(),
        levels = arrays.len(),
        axes = %labels,
        dtype = %base.dtype,
        "opened OME-Zarr"
    );

    let pool = options.pool()?;
    let mut levels: Vec<Arc<dyn PixelSource>> = Vec::with_capacity(arrays.len());
    for array in arrays {
        if array.shape.len() != labels.len() {
            return Err(MetadataError::Unsupported(format!(
                "level {} has rank {}, expected {}",
                array.path,
                array.shape.len(),
                labels.len()
            ))
            .into());
        }
        let meta = PixelMeta {
            physical_sizes: physical_sizes(&multiscales, &labels, &base_shape, &array.shape),
            photometric_interpretation: None,
        };
        let mut source =
            ZarrPixelSource::new(store.clone(), array, labels.clone(), pool.clone())?.with_meta(meta);
        if let Some(handler) = &options.tile_error_handler {
            source = source.with_tile_error_handler(handler.clone());
        }
        levels.push(Arc::new(source));
    }

    Ok(MultiscaleImage {
        levels,
        metadata: ImageMetadata::Zarr(multiscales),
    })
}

fn axis_labels(multiscales: &Multiscales, rank: usize) -> Result<AxisLabels, LoadError> {
    let labels = match &multiscales.axes {
        Some(axes) => AxisLabels::new(axes.iter().map(|a| a.name.as_str()))?,
        None if rank <= DEFAULT_AXES.len() => {
            AxisLabels::new(DEFAULT_AXES[DEFAULT_AXES.len() - rank..].iter().copied())?
        }
        None => {
            return Err(MetadataError::Unsupported(format!(
                "{} axes without axis metadata",
                rank
            ))
            .into())
        }
    };
    if labels.len() != rank {
        return Err(MetadataError::Unsupported(format!(
            "{} axes declared for an array of rank {}",
            labels.len(),
            rank
        ))
        .into());
    }
    Ok(labels)
}

/// Sizes of the spatial axes from the finest level's scale transform, grown
/// by the downsampling of `shape`.
fn physical_sizes(
    multiscales: &Multiscales,
    labels: &AxisLabels,
    base_shape: &[usize],
    shape: &[usize],
) -> Option<PhysicalSizes> {
    let scale = multiscales.scale.as_ref()?;
    let size = |axis: &str| {
        let pos = labels.position(axis)?;
        let factor = *base_shape.get(pos)? as f64 / (*shape.get(pos)?).max(1) as f64;
        let unit = multiscales
            .axes
            .as_ref()
            .and_then(|axes| axes.get(pos))
            .and_then(|a| a.unit.clone())
            .unwrap_or_else(|| DEFAULT_PHYSICAL_UNIT.to_string());
        Some(PhysicalSize {
            size: scale.get(pos)? * factor,
            unit,
        })
    };
    let sizes = PhysicalSizes {
        x: size("x"),
        y: size("y"),
        z: size("z"),
    };
    (!sizes.is_empty()).then_some(sizes)
}
