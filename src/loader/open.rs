use std::path::{Path, PathBuf};
use std::sync::Arc;

use aws_sdk_s3::Client;
use tracing::debug;

use super::{load_multi_tiff, load_ome_tiff, load_ome_zarr, LoadOptions, MultiscaleImage};
use crate::axes::PlaneKey;
use crate::config::ReaderConfig;
use crate::error::LoadError;
use crate::format::zarr::{ChunkStore, FileSystemStore, S3Store};
use crate::io::{create_s3_client, BlockCache, FileRangeReader, RangeReader, S3Location, S3RangeReader};

/// Where an image is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    Local(PathBuf),
    S3(S3Location),
}

impl ImageLocation {
    /// `s3://` URLs go to S3, anything else is a local path.
    pub fn parse(location: &str) -> Self {
        match S3Location::parse(location) {
            Some(s3) => ImageLocation::S3(s3),
            None => ImageLocation::Local(PathBuf::from(location)),
        }
    }

    /// Zarr hierarchies are directories locally and `.zarr` prefixes on S3.
    pub fn is_zarr(&self) -> bool {
        match self {
            ImageLocation::Local(path) => {
                path.is_dir() || has_zarr_extension(&path.to_string_lossy())
            }
            ImageLocation::S3(s3) => has_zarr_extension(&s3.key),
        }
    }
}

fn has_zarr_extension(name: &str) -> bool {
    name.trim_end_matches('/').to_ascii_lowercase().ends_with(".zarr")
}

/// Open the image at `location`, picking the loader from its kind.
///
/// TIFF readers get a block cache sized by `config`. When `channel_files` is
/// non-empty, `location` and the extra files form a multi-file image with
/// one channel per file, in order.
pub async fn open_image(
    location: &str,
    channel_files: &[String],
    config: &ReaderConfig,
    options: LoadOptions,
) -> Result<MultiscaleImage, LoadError> {
    let location = ImageLocation::parse(location);
    let uses_s3 = matches!(location, ImageLocation::S3(_))
        || channel_files.iter().any(|f| S3Location::parse(f).is_some());
    let client = if uses_s3 {
        Some(create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await)
    } else {
        None
    };

    if !channel_files.is_empty() {
        let mut files = Vec::with_capacity(channel_files.len() + 1);
        files.push((PlaneKey::default(), tiff_reader(&location, config, client.as_ref()).await?));
        for (i, file) in channel_files.iter().enumerate() {
            let key = PlaneKey { t: 0, c: i + 1, z: 0 };
            let reader = tiff_reader(&ImageLocation::parse(file), config, client.as_ref()).await?;
            files.push((key, reader));
        }
        return load_multi_tiff(files, options).await;
    }

    if location.is_zarr() {
        let store: Arc<dyn ChunkStore> = match &location {
            ImageLocation::Local(path) => Arc::new(FileSystemStore::new(path)),
            ImageLocation::S3(s3) => {
                let client = s3_client(client.as_ref(), config).await;
                Arc::new(S3Store::new(client, s3.clone()))
            }
        };
        debug!(store = store.identifier(), "opening OME-Zarr");
        return load_ome_zarr(store, options).await;
    }

    let reader = tiff_reader(&location, config, client.as_ref()).await?;
    load_ome_tiff(reader, options).await
}

async fn s3_client(client: Option<&Client>, config: &ReaderConfig) -> Client {
    match client {
        Some(client) => client.clone(),
        None => create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await,
    }
}

async fn tiff_reader(
    location: &ImageLocation,
    config: &ReaderConfig,
    client: Option<&Client>,
) -> Result<Arc<dyn RangeReader>, LoadError> {
    match location {
        ImageLocation::Local(path) => local_reader(path, config).await,
        ImageLocation::S3(s3) => {
            let client = s3_client(client, config).await;
            let reader = S3RangeReader::open(client, s3.clone()).await?;
            Ok(Arc::new(BlockCache::with_capacity(
                reader,
                config.block_size,
                config.block_cache_capacity,
            )))
        }
    }
}

async fn local_reader(path: &Path, config: &ReaderConfig) -> Result<Arc<dyn RangeReader>, LoadError> {
    let reader = FileRangeReader::open(path).await?;
    Ok(Arc::new(BlockCache::with_capacity(
        reader,
        config.block_size,
        config.block_cache_capacity,
    )))
}
