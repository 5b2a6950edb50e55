//! virtual-tiff - Describe a TIFF as virtual chunked arrays.
//!
//! This binary opens a local or S3 file, translates its IFDs and prints the
//! resulting group as JSON on stdout.

use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use virtual_tiff::{
    config::{Config, Source},
    create_s3_client, BlockCache, LocalRangeReader, RangeReader, S3RangeReader,
    TiffDirectoryReader, VirtualTiff,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match config.source() {
        Ok(source) => source,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match source {
        Source::S3(url) => {
            if let Some(ref endpoint) = config.s3_endpoint {
                info!("S3 endpoint: {}", endpoint);
            }
            let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
            match S3RangeReader::from_url(client, &url).await {
                Ok(reader) => run(&config, reader).await,
                Err(e) => Err(format!("Failed to open {}: {}", url, e)),
            }
        }
        Source::Local(path) => match LocalRangeReader::open(&path).await {
            Ok(reader) => run(&config, reader).await,
            Err(e) => Err(format!("Failed to open {}: {}", path.display(), e)),
        },
    };

    match result {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Translate the file behind `reader` and render the output JSON.
async fn run<R: RangeReader + 'static>(config: &Config, reader: R) -> Result<String, String> {
    let cache = BlockCache::with_capacity(reader, config.block_size, config.cache_blocks);

    // IFDs of most files sit in the first block
    match cache.prefetch(config.block_size as u64).await {
        Ok(blocks) => debug!(blocks, "prefetched header blocks"),
        Err(e) => return Err(format!("Failed to read {}: {}", cache.identifier(), e)),
    }

    let translator = VirtualTiff::new()
        .with_ifd(config.ifd)
        .with_layout(config.layout());

    let group = translator
        .translate(&cache, &TiffDirectoryReader)
        .await
        .map_err(|e| e.to_string())?;
    info!(arrays = group.len(), "translation complete");

    let value = group
        .to_json(!config.no_manifest)
        .map_err(|e| e.to_string())?;
    let rendered = if config.compact {
        serde_json::to_string(&value)
    } else {
        serde_json::to_string_pretty(&value)
    };
    rendered.map_err(|e| format!("Failed to render JSON: {}", e))
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so stdout carries only the JSON output.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "virtual_tiff=debug"
    } else {
        "virtual_tiff=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
