//! Byte-range access to local files and S3 objects.

mod block_cache;
mod local_reader;
mod range_reader;
mod s3_reader;

pub use block_cache::{BlockCache, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};
pub use local_reader::LocalRangeReader;
pub use range_reader::{check_range, RangeReader};
pub use s3_reader::{create_s3_client, S3Location, S3RangeReader};
