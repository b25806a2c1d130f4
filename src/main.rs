//! ome-pixels - inspect and read OME-TIFF, multi-file TIFF and OME-Zarr
//! images from the command line.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ome_pixels::{
    buffer_stats, open_image, parse_offsets,
    config::{Cli, Command, InfoConfig, SourceArgs, StatsConfig, TileConfig},
    ByteOrder, DecodePool, LoadOptions, MultiscaleImage, PixelSource, TileRequest,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.command.source().validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Info(config) => run_info(config).await,
        Command::Tile(config) => run_tile(config).await,
        Command::Stats(config) => run_stats(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "ome_pixels=debug"
    } else {
        "ome_pixels=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn open(source: &SourceArgs) -> Result<MultiscaleImage, String> {
    let config = source.reader_config();
    let pool = DecodePool::new(config.decode_workers).map_err(|e| e.to_string())?;
    let mut options = LoadOptions::default()
        .with_pool(Arc::new(pool))
        .with_image(source.image);

    if let Some(path) = &source.offsets {
        let document = tokio::fs::read(path)
            .await
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        options = options.with_offsets(parse_offsets(&document).map_err(|e| e.to_string())?);
    }

    let image = open_image(&source.location, &source.channel_files, &config, options)
        .await
        .map_err(|e| e.to_string())?;
    debug!(levels = image.level_count(), "image opened");
    Ok(image)
}

fn level(image: &MultiscaleImage, level: usize) -> Result<&Arc<dyn PixelSource>, String> {
    image.level(level).ok_or_else(|| {
        format!(
            "level {} out of range, image has {} levels",
            level,
            image.level_count()
        )
    })
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> Result<(), String> {
    let image = open(&config.source).await?;

    if config.json {
        let levels: Vec<_> = image
            .levels
            .iter()
            .map(|source| {
                serde_json::json!({
                    "shape": source.shape(),
                    "tile_size": source.tile_size(),
                })
            })
            .collect();
        let json = serde_json::json!({
            "format": image.metadata.format(),
            "name": image.metadata.name(),
            "labels": image.labels().map(|l| l.as_slice().to_vec()),
            "dtype": image.dtype().map(|d| d.name()),
            "channels": image.metadata.channel_names(),
            "levels": levels,
        });
        let text = serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }

    println!("Format:   {}", image.metadata.format());
    if let Some(name) = image.metadata.name() {
        println!("Name:     {}", name);
    }
    if let Some(labels) = image.labels() {
        println!("Axes:     {}", labels);
    }
    if let Some(dtype) = image.dtype() {
        println!("Type:     {}", dtype);
    }
    let channels = image.metadata.channel_names();
    if !channels.is_empty() {
        println!("Channels: {}", channels.join(", "));
    }
    println!();
    for (i, source) in image.levels.iter().enumerate() {
        println!(
            "Level {}: {}x{} shape {:?} tile {}",
            i,
            source.width(),
            source.height(),
            source.shape(),
            source.tile_size()
        );
    }
    Ok(())
}

// =============================================================================
// Tile Command
// =============================================================================

async fn run_tile(config: TileConfig) -> Result<(), String> {
    let image = open(&config.source).await?;
    let source = level(&image, config.level)?;

    let request = TileRequest::new(config.x, config.y, config.plane.selection());
    let tile = source
        .fetch_tile(&request)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("tile ({}, {}) is outside level {}", config.x, config.y, config.level))?;

    let (min, max) = (0..tile.data.len())
        .filter_map(|i| tile.data.get_f64(i))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    println!(
        "Tile ({}, {}) level {}: {}x{} {} min {} max {}",
        config.x,
        config.y,
        config.level,
        tile.width,
        tile.height,
        tile.data.dtype(),
        min,
        max
    );

    if let Some(path) = &config.output {
        tokio::fs::write(path, tile.data.to_bytes(ByteOrder::LittleEndian))
            .await
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

// =============================================================================
// Stats Command
// =============================================================================

async fn run_stats(config: StatsConfig) -> Result<(), String> {
    let image = open(&config.source).await?;
    let index = config
        .level
        .unwrap_or_else(|| image.level_count().saturating_sub(1));
    let source = level(&image, index)?;

    let raster = source
        .get_raster(&config.plane.selection(), None)
        .await
        .map_err(|e| e.to_string())?;
    let mut data = raster.data;
    let stats = buffer_stats(&mut data).ok_or_else(|| "plane is empty".to_string())?;

    let text = serde_json::to_string_pretty(&stats).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}
