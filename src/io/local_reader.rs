use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::{check_range, RangeReader};
use crate::error::IoError;

/// Local filesystem implementation of RangeReader.
///
/// The file handle is shared behind a mutex since every read seeks it.
pub struct LocalRangeReader {
    file: Mutex<File>,
    path: PathBuf,
    size: u64,
    identifier: String,
}

impl LocalRangeReader {
    /// Open a local file for range reads.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(path.display().to_string()),
            _ => IoError::File(format!("{}: {}", path.display(), e)),
        })?;

        let size = file
            .metadata()
            .await
            .map_err(|e| IoError::File(format!("{}: {}", path.display(), e)))?
            .len();

        let absolute = tokio::fs::canonicalize(&path)
            .await
            .unwrap_or_else(|_| path.clone());
        let identifier = format!("file://{}", absolute.display());

        Ok(Self {
            file: Mutex::new(file),
            path,
            size,
            identifier,
        })
    }

    /// Get the path this reader was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RangeReader for LocalRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut buf = vec![0u8; len];
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| IoError::File(e.to_string()))?;
        file.read_exact(&mut buf)
            .await
            .map_err(|e| IoError::File(e.to_string()))?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
