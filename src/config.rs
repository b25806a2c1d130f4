//! Configuration for the `ome-pixels` command-line tool and the readers it
//! builds.
//!
//! Every option can also be set through an environment variable with the
//! `OME_PIXELS_` prefix:
//!
//! - `OME_PIXELS_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `OME_PIXELS_S3_REGION` - AWS region (default: us-east-1)
//! - `OME_PIXELS_BLOCK_SIZE` - Block cache block size in bytes (default: 256KB)
//! - `OME_PIXELS_CACHE_BLOCKS` - Blocks cached per file (default: 64)
//! - `OME_PIXELS_DECODE_WORKERS` - Decode threads (default: one per core)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::axes::Selection;
use crate::decode::default_pool_size;
use crate::io::{DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Largest accepted block size.
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// Reader configuration
// =============================================================================

/// Settings for the byte transports and decode pool behind an opened image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Block size of the block cache in front of TIFF readers
    pub block_size: usize,
    /// Blocks cached per file
    pub block_cache_capacity: usize,
    /// Decode threads
    pub decode_workers: usize,
    /// Custom S3 endpoint (MinIO and other S3-compatible services)
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_cache_capacity: DEFAULT_BLOCK_CACHE_CAPACITY,
            decode_workers: default_pool_size(),
            s3_endpoint: None,
            s3_region: DEFAULT_REGION.to_string(),
        }
    }
}

impl ReaderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }
        if self.block_cache_capacity == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        if self.decode_workers == 0 {
            return Err("decode_workers must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// ome-pixels - read tiles and planes from OME-TIFF, multi-file TIFF and
/// OME-Zarr images on local disk or S3.
#[derive(Parser, Debug, Clone)]
#[command(name = "ome-pixels")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print levels, axes, shapes and data type of an image.
    Info(InfoConfig),

    /// Read one tile and print its size and value range.
    Tile(TileConfig),

    /// Compute channel statistics of one plane.
    Stats(StatsConfig),
}

impl Command {
    pub fn source(&self) -> &SourceArgs {
        match self {
            Command::Info(config) => &config.source,
            Command::Tile(config) => &config.source,
            Command::Stats(config) => &config.source,
        }
    }
}

/// Where an image lives and how to read it.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Local path or `s3://bucket/key` URL. Directories and `.zarr` keys are
    /// read as OME-Zarr, everything else as OME-TIFF.
    pub location: String,

    /// Additional single-plane TIFFs, one per channel, read together with
    /// `location` as a multi-file image.
    #[arg(long = "channel-file")]
    pub channel_files: Vec<String>,

    /// OME image (series) index.
    #[arg(long, default_value_t = 0)]
    pub image: usize,

    /// JSON file listing the IFD offset of every page.
    #[arg(long, env = "OME_PIXELS_OFFSETS")]
    pub offsets: Option<PathBuf>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "OME_PIXELS_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "OME_PIXELS_S3_REGION")]
    pub s3_region: String,

    /// Block size in bytes for the block cache.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, env = "OME_PIXELS_BLOCK_SIZE")]
    pub block_size: usize,

    /// Maximum number of blocks to cache per file.
    #[arg(long, default_value_t = DEFAULT_BLOCK_CACHE_CAPACITY, env = "OME_PIXELS_CACHE_BLOCKS")]
    pub cache_blocks: usize,

    /// Decode threads; defaults to the number of cores.
    #[arg(long, env = "OME_PIXELS_DECODE_WORKERS")]
    pub decode_workers: Option<usize>,
}

impl SourceArgs {
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            block_size: self.block_size,
            block_cache_capacity: self.cache_blocks,
            decode_workers: self.decode_workers.unwrap_or_else(default_pool_size),
            s3_endpoint: self.s3_endpoint.clone(),
            s3_region: self.s3_region.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.location.is_empty() {
            return Err("An image location is required".to_string());
        }
        self.reader_config().validate()
    }
}

/// A `(t, c, z)` plane.
#[derive(Args, Debug, Clone, Default)]
pub struct PlaneArgs {
    #[arg(short = 't', long, default_value_t = 0)]
    pub time: usize,

    #[arg(short = 'c', long, default_value_t = 0)]
    pub channel: usize,

    #[arg(short = 'z', long, default_value_t = 0)]
    pub z: usize,
}

impl PlaneArgs {
    pub fn selection(&self) -> Selection {
        Selection::tcz(self.time, self.channel, self.z)
    }
}

#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub plane: PlaneArgs,

    /// Pyramid level, 0 is full resolution.
    #[arg(short, long, default_value_t = 0)]
    pub level: usize,

    /// Tile column.
    #[arg(short = 'x', long = "col", default_value_t = 0)]
    pub x: u32,

    /// Tile row.
    #[arg(short = 'y', long = "row", default_value_t = 0)]
    pub y: u32,

    /// Write the raw little-endian samples to this file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatsConfig {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub plane: PlaneArgs,

    /// Pyramid level; defaults to the coarsest one.
    #[arg(short, long)]
    pub level: Option<usize>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ome-pixels").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_reader_config() {
        let config = ReaderConfig::default();
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.s3_region, DEFAULT_REGION);
        assert!(config.decode_workers > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_reader_config() {
        let mut config = ReaderConfig::default();
        config.block_size = 512;
        assert!(config.validate().unwrap_err().contains("block_size"));

        let mut config = ReaderConfig::default();
        config.block_cache_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = ReaderConfig::default();
        config.decode_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_tile_command() {
        let cli = parse(&[
            "tile",
            "s3://bucket/image.ome.tif",
            "--level",
            "2",
            "-x",
            "3",
            "-y",
            "1",
            "-c",
            "4",
            "--decode-workers",
            "2",
        ]);
        let Command::Tile(config) = cli.command else {
            panic!("expected tile command");
        };
        assert_eq!(config.level, 2);
        assert_eq!((config.x, config.y), (3, 1));
        assert_eq!(config.plane.selection(), Selection::tcz(0, 4, 0));
        assert_eq!(config.source.reader_config().decode_workers, 2);
        assert!(config.source.validate().is_ok());
    }

    #[test]
    fn test_parse_stats_and_info() {
        let cli = parse(&["-v", "stats", "plate.zarr"]);
        assert!(cli.verbose);
        let Command::Stats(config) = &cli.command else {
            panic!("expected stats command");
        };
        assert!(config.level.is_none());
        assert_eq!(cli.command.source().location, "plate.zarr");

        let cli = parse(&["info", "a.tif", "--channel-file", "b.tif", "--json"]);
        let Command::Info(config) = cli.command else {
            panic!("expected info command");
        };
        assert!(config.json);
        assert_eq!(config.source.channel_files, vec!["b.tif"]);
    }

    #[test]
    fn test_invalid_block_size() {
        let cli = parse(&["info", "a.tif", "--block-size", "10"]);
        assert!(cli.command.source().validate().is_err());
    }
}
