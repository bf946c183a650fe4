//! Byte rate limiting for file transfers
//!
//! This crate caps the number of bytes per second read from a source so that a copy does not
//! saturate a disk or a network share.
//!
//! # Overview
//!
//! Two types make up the public API:
//!
//! 1. [`RateLimiter`] - a token bucket where every token is one byte. Tokens are replenished on
//!    a fixed interval by a background task owned by the limiter.
//! 2. [`Throttled`] - wraps any [`tokio::io::AsyncRead`] and charges every chunk it reads against
//!    a limiter. Every wait races a [`CancellationToken`] so a reader blocked on a slow limiter
//!    returns [`Error::Cancelled`] as soon as the deadline fires.
//!
//! # Usage
//!
//! ```rust,no_run
//! use throttle::{RateLimiter, Throttled};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), throttle::Error> {
//! let file = tokio::fs::File::open("/tmp/source").await?;
//! // 512 KiB per second
//! let limiter = RateLimiter::new(512 * 1024);
//! let cancel = CancellationToken::new();
//! let mut reader = Throttled::new(file, limiter, cancel.clone());
//! let mut buf = vec![0; 64 * 1024];
//! while reader.read(&mut buf).await? > 0 {
//!     // write the chunk out
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Bucket Shape
//!
//! The limiter aims for ten refills per second. For a rate `R` bytes/s every 100ms refill tops the
//! bucket up to `R / 10` bytes. When `R` is not a multiple of ten and small enough for the dropped
//! remainder to matter (below 10 000 bytes/s), the bucket refills `R` bytes once per second
//! instead, so the configured rate is honored exactly.
//!
//! A single read never asks for more bytes than one refill grants, so a read can always make
//! progress regardless of the caller's buffer size. Idle time does not accumulate tokens past one
//! refill, which keeps the observed throughput close to `R` over any window longer than a couple of
//! intervals.
//!
//! # Lifetime
//!
//! A limiter is meant to be private to a single transfer. [`RateLimiter::new`] spawns the refill
//! task on the current tokio runtime and dropping the limiter aborts it.

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

mod semaphore;

const REFILLS_PER_SECOND: u64 = 10;
const REFILL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);
// above this rate, truncating to R / 10 loses less than 0.1%
const EXACT_REFILL_BELOW: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cancellation token fired while a read or a token wait was pending.
    #[error("transfer cancelled: read would exceed the deadline")]
    Cancelled,
    #[error("rate limiter is closed")]
    Closed(#[from] tokio::sync::AcquireError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct Bucket {
    sem: std::sync::Arc<semaphore::Semaphore>,
    burst: usize,
    refill: tokio::task::AbortHandle,
}

/// Token bucket capping the number of bytes per second
pub struct RateLimiter {
    bytes_per_second: u64,
    bucket: Option<Bucket>,
}

fn bucket_shape(bytes_per_second: u64) -> (usize, std::time::Duration) {
    let per_refill = bytes_per_second / REFILLS_PER_SECOND;
    let exact =
        bytes_per_second % REFILLS_PER_SECOND == 0 || bytes_per_second >= EXACT_REFILL_BELOW;
    let (tokens, interval) = if per_refill > 0 && exact {
        (per_refill, REFILL_INTERVAL)
    } else {
        (bytes_per_second, std::time::Duration::from_secs(1))
    };
    // acquire_many takes a u32
    let tokens = std::cmp::min(tokens, u64::from(u32::MAX));
    (
        usize::try_from(tokens).unwrap_or(u32::MAX as usize),
        interval,
    )
}

impl RateLimiter {
    /// Creates a limiter allowing `bytes_per_second`; 0 means no limit.
    ///
    /// Must be called from within a tokio runtime when `bytes_per_second > 0`.
    pub fn new(bytes_per_second: u64) -> Self {
        if bytes_per_second == 0 {
            return Self::unlimited();
        }
        let (burst, interval) = bucket_shape(bytes_per_second);
        let sem = std::sync::Arc::new(semaphore::Semaphore::new(burst));
        let refill = {
            let sem = sem.clone();
            tokio::spawn(async move { sem.run_replenish_thread(burst, interval).await })
        };
        tracing::trace!(
            "rate limiter: {} B/s, burst {} bytes every {:?}",
            bytes_per_second,
            burst,
            interval
        );
        Self {
            bytes_per_second,
            bucket: Some(Bucket {
                sem,
                burst,
                refill: refill.abort_handle(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            bytes_per_second: 0,
            bucket: None,
        }
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }

    /// Largest number of bytes a single acquisition may ask for, `None` when unlimited.
    pub fn max_chunk(&self) -> Option<usize> {
        self.bucket.as_ref().map(|bucket| bucket.burst)
    }

    /// Waits until `bytes` tokens are available and consumes them.
    ///
    /// Requests larger than [`RateLimiter::max_chunk`] are clamped to it.
    pub async fn acquire(&self, bytes: usize) -> Result<(), Error> {
        let Some(bucket) = &self.bucket else {
            return Ok(());
        };
        let bytes = std::cmp::min(bytes, bucket.burst);
        if bucket.sem.available() < bytes {
            tracing::trace!("waiting for {} tokens", bytes);
        }
        // burst is capped to u32::MAX in bucket_shape
        let tokens = u32::try_from(bytes).unwrap_or(u32::MAX);
        bucket.sem.consume_many(tokens).await?;
        Ok(())
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(bucket) = &self.bucket {
            bucket.refill.abort();
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("bytes_per_second", &self.bytes_per_second)
            .field("max_chunk", &self.max_chunk())
            .finish()
    }
}

/// Rate limited, cancellable reader
pub struct Throttled<R> {
    inner: R,
    limiter: RateLimiter,
    cancel: CancellationToken,
}

impl<R: tokio::io::AsyncRead + Unpin> Throttled<R> {
    pub fn new(inner: R, limiter: RateLimiter, cancel: CancellationToken) -> Self {
        Self {
            inner,
            limiter,
            cancel,
        }
    }

    /// Reads at most one refill worth of bytes into `buf` and charges them to the limiter.
    ///
    /// Returns `Ok(0)` at end of stream and [`Error::Cancelled`] once the token fires.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let len = match self.limiter.max_chunk() {
            Some(max_chunk) => std::cmp::min(buf.len(), max_chunk),
            None => buf.len(),
        };
        let n = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            res = self.inner.read(&mut buf[..len]) => res?,
        };
        if n == 0 {
            return Ok(0);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            res = self.limiter.acquire(n) => res.map(|_| n),
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
