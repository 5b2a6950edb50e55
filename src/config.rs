//! Configuration for the `virtual-tiff` command line tool.
//!
//! Options come from command-line arguments via clap, with environment
//! variable fallbacks and defaults for everything but the input URL.
//!
//! # Example
//!
//! ```ignore
//! use virtual_tiff::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! match config.source()? {
//!     Source::S3(url) => println!("reading {}", url),
//!     Source::Local(path) => println!("reading {}", path.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `VIRTUAL_TIFF_URL` - Input file (`s3://bucket/key`, `file:///path` or a path)
//! - `VIRTUAL_TIFF_IFD` - Translate only this IFD
//! - `VIRTUAL_TIFF_NESTED` - Put each array in its own subgroup
//! - `VIRTUAL_TIFF_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `VIRTUAL_TIFF_S3_REGION` - AWS region (default: us-east-1)
//! - `VIRTUAL_TIFF_NO_MANIFEST` - Omit chunk manifests from the output
//! - `VIRTUAL_TIFF_COMPACT` - Print JSON on a single line
//! - `VIRTUAL_TIFF_CACHE_BLOCKS` - Blocks kept by the read cache (default: 64)
//! - `VIRTUAL_TIFF_BLOCK_SIZE` - Block size in bytes (default: 64KiB)

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::io::{DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};
use crate::translate::GroupLayout;

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

// =============================================================================
// CLI Arguments
// =============================================================================

/// virtual-tiff - Describe a TIFF as virtual chunked arrays.
///
/// Reads only the TIFF header and image file directories, then prints array
/// metadata, codec pipelines and chunk byte ranges as JSON. Pixel data is
/// never read.
#[derive(Parser, Debug, Clone)]
#[command(name = "virtual-tiff")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// File to translate: s3://bucket/key, file:///path or a local path.
    #[arg(env = "VIRTUAL_TIFF_URL")]
    pub url: String,

    /// Translate only this IFD (0-based). All IFDs by default.
    #[arg(long, env = "VIRTUAL_TIFF_IFD")]
    pub ifd: Option<usize>,

    /// Put each array in a subgroup of the same name.
    #[arg(long, default_value_t = false, env = "VIRTUAL_TIFF_NESTED")]
    pub nested: bool,

    // =========================================================================
    // S3 Configuration
    // =========================================================================
    /// Endpoint of an S3-compatible store such as MinIO.
    #[arg(long, env = "VIRTUAL_TIFF_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "VIRTUAL_TIFF_S3_REGION")]
    pub s3_region: String,

    // =========================================================================
    // Read Cache
    // =========================================================================
    /// Maximum number of blocks kept by the read cache.
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY, env = "VIRTUAL_TIFF_CACHE_BLOCKS")]
    pub cache_blocks: usize,

    /// Block size in bytes for the read cache.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, env = "VIRTUAL_TIFF_BLOCK_SIZE")]
    pub block_size: usize,

    // =========================================================================
    // Output
    // =========================================================================
    /// Omit chunk manifests and print only array metadata.
    #[arg(long, default_value_t = false, env = "VIRTUAL_TIFF_NO_MANIFEST")]
    pub no_manifest: bool,

    /// Print JSON on a single line.
    #[arg(long, default_value_t = false, env = "VIRTUAL_TIFF_COMPACT")]
    pub compact: bool,

    /// Log at debug level.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Where the input file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// `s3://bucket/key`
    S3(String),
    Local(PathBuf),
}

impl Config {
    /// Check option ranges and that the URL resolves to a source.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("An input URL is required. Pass it as an argument or set VIRTUAL_TIFF_URL"
                .to_string());
        }

        if self.cache_blocks == 0 {
            return Err("--cache-blocks must be at least 1".to_string());
        }

        if self.block_size < 1024 || self.block_size > 16 * 1024 * 1024 {
            return Err("--block-size must be between 1 KiB and 16 MiB".to_string());
        }

        self.source().map(|_| ())
    }

    /// Resolve the input URL to a storage source.
    pub fn source(&self) -> Result<Source, String> {
        let url = self.url.trim();
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "s3" => Ok(Source::S3(url.to_string())),
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .map(Source::Local)
                .map_err(|_| format!("Invalid file URL: {}", url)),
            // Windows drive letters parse as a one-letter scheme
            Ok(parsed) if parsed.scheme().len() > 1 => Err(format!(
                "Unsupported URL scheme '{}'. Use s3://, file:// or a local path",
                parsed.scheme()
            )),
            _ => Ok(Source::Local(PathBuf::from(url))),
        }
    }

    /// Group layout selected by `--nested`.
    pub fn layout(&self) -> GroupLayout {
        if self.nested {
            GroupLayout::Nested
        } else {
            GroupLayout::Flat
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
