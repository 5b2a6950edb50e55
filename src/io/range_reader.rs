use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Capability for reading byte ranges from a named resource.
///
/// The translator only ever reads the first two bytes through this trait to
/// sniff the byte order; the directory reader uses it to walk the IFD chain.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with `RangeOutOfBounds` if the range extends past `size()`.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Read the half-open byte range `[start, end)`.
    async fn read_range(&self, start: u64, end: u64) -> Result<Bytes, IoError> {
        if end < start {
            return Err(IoError::InvalidRange { start, end });
        }
        self.read_exact_at(start, (end - start) as usize).await
    }

    /// Total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Stable name of the resource, used in logs and as the manifest path.
    ///
    /// `s3://bucket/key` for S3 objects, `file:///abs/path` for local files.
    fn identifier(&self) -> &str;
}

/// Check that `len` bytes at `offset` fit in a resource of `size` bytes.
///
/// Shared by every reader so out-of-range requests fail the same way before
/// any I/O is attempted.
pub fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    let fits = offset
        .checked_add(len as u64)
        .is_some_and(|end| end <= size);
    if fits {
        Ok(())
    } else {
        Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        })
    }
}
