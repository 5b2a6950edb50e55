use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::trace;

use super::{check_range, RangeReader};
use crate::error::IoError;

/// Default block size: 64KB.
///
/// Cloud-optimized GeoTIFFs keep their IFDs and offset arrays near the start of
/// the file, so one or two blocks usually cover the whole directory.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default cache capacity in number of blocks (4MB with the default block size).
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Fixed-size block cache in front of a RangeReader.
///
/// Walking an IFD chain issues many tiny reads: entry counts, entries, then
/// tag values at scattered offsets. Against object storage each of those is a
/// request. The cache rounds every read out to whole blocks, keeps the most
/// recently used blocks, and lets concurrent readers of the same block share
/// a single fetch.
pub struct BlockCache<R> {
    inner: Arc<R>,
    block_size: usize,
    blocks: RwLock<LruCache<u64, Bytes>>,
    /// Blocks currently being fetched
    pending: Mutex<HashMap<u64, Arc<InFlight>>>,
}

/// A block fetch other readers can wait on.
#[derive(Default)]
struct InFlight {
    notify: Notify,
    /// Set when the fetching task was dropped before it finished
    abandoned: AtomicBool,
}

/// Wakes the waiters of a fetch when the fetching task finishes or is dropped.
///
/// A fetch dropped mid-flight leaves its pending entry behind marked
/// abandoned, so the next reader takes it over instead of waiting forever.
struct FetchGuard {
    in_flight: Arc<InFlight>,
    finished: bool,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.in_flight.abandoned.store(true, Ordering::Release);
        }
        self.in_flight.notify.notify_waiters();
    }
}

/// Outcome of trying to claim a block fetch.
enum Claim {
    /// Block was already resident
    Cached(Bytes),
    /// Another task is fetching it
    Wait,
    /// This task must fetch it and wake the waiters
    Fetch(FetchGuard),
}

impl<R: RangeReader> BlockCache<R> {
    /// Wrap `inner` with the default block size and capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY)
    }

    /// Wrap `inner`, holding at most `capacity` blocks of `block_size` bytes.
    ///
    /// A zero block size or capacity is bumped to one.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(inner),
            block_size: block_size.max(1),
            blocks: RwLock::new(LruCache::new(capacity)),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of blocks currently held.
    pub async fn resident_blocks(&self) -> usize {
        self.blocks.read().await.len()
    }

    /// Warm the cache with the blocks covering the first `len` bytes.
    ///
    /// Returns how many blocks that prefix spans.
    pub async fn prefetch(&self, len: u64) -> Result<usize, IoError> {
        let len = len.min(self.inner.size());
        if len == 0 {
            return Ok(0);
        }

        let span = self.span(0, len as usize);
        let count = span.clone().count();
        for index in span {
            self.block(index).await?;
        }
        Ok(count)
    }

    /// Indices of the blocks touched by `len > 0` bytes at `offset`.
    fn span(&self, offset: u64, len: usize) -> RangeInclusive<u64> {
        let block_size = self.block_size as u64;
        (offset / block_size)..=((offset + len as u64 - 1) / block_size)
    }

    /// Get block `index`, fetching it if no one else is.
    async fn block(&self, index: u64) -> Result<Bytes, IoError> {
        loop {
            // A hit refreshes the block's recency
            if let Some(data) = self.blocks.write().await.get(&index) {
                return Ok(data.clone());
            }

            let mut guard = match self.claim(index).await {
                Claim::Cached(data) => return Ok(data),
                Claim::Wait => continue,
                Claim::Fetch(guard) => guard,
            };

            let result = self.fetch(index).await;
            {
                // Lock order: pending, then blocks
                let mut pending = self.pending.lock().await;
                if let Ok(data) = &result {
                    self.blocks.write().await.put(index, data.clone());
                }
                pending.remove(&index);
            }
            guard.finished = true;

            return result;
        }
    }

    /// Register this task as the fetcher of `index`, or wait for the current one.
    ///
    /// An abandoned fetch is replaced, making this task the new fetcher.
    async fn claim(&self, index: u64) -> Claim {
        let mut pending = self.pending.lock().await;

        let live = pending
            .get(&index)
            .filter(|in_flight| !in_flight.abandoned.load(Ordering::Acquire))
            .cloned();
        if let Some(in_flight) = live {
            // Register before releasing the lock so the wakeup can't be missed
            let notified = in_flight.notify.notified();
            drop(pending);
            notified.await;
            return Claim::Wait;
        }

        // A fetch may have finished between the caller's cache check and the lock
        if let Some(data) = self.blocks.read().await.peek(&index) {
            return Claim::Cached(data.clone());
        }

        let in_flight = Arc::new(InFlight::default());
        pending.insert(index, Arc::clone(&in_flight));
        Claim::Fetch(FetchGuard {
            in_flight,
            finished: false,
        })
    }

    /// Read block `index` from the wrapped reader. The final block may be short.
    async fn fetch(&self, index: u64) -> Result<Bytes, IoError> {
        let start = index * self.block_size as u64;
        let size = self.inner.size();
        let len = size.saturating_sub(start).min(self.block_size as u64) as usize;
        if len == 0 {
            return Err(IoError::RangeOutOfBounds {
                offset: start,
                requested: self.block_size as u64,
                size,
            });
        }

        trace!(block = index, start, len, "fetching block");
        self.inner.read_exact_at(start, len).await
    }
}

#[async_trait]
impl<R: RangeReader + 'static> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.inner.size())?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let block_size = self.block_size as u64;
        let span = self.span(offset, len);

        // Reads inside one block are a zero-copy slice of it
        if span.start() == span.end() {
            let block = self.block(*span.start()).await?;
            let skip = (offset % block_size) as usize;
            return Ok(block.slice(skip..skip + len));
        }

        let end = offset + len as u64;
        let mut out = BytesMut::with_capacity(len);
        for index in span {
            let block = self.block(index).await?;
            let block_start = index * block_size;
            let from = offset.saturating_sub(block_start) as usize;
            let to = ((end - block_start) as usize).min(block.len());
            out.extend_from_slice(&block[from..to]);
        }
        Ok(out.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
