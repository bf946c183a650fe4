//! Copy task executor
//!
//! An [`Attempt`] copies one file: stale check, parent directory creation, rate-limited and
//! chunk-reported streaming, final sync. It signals readiness exactly once, right before bytes
//! start flowing (or immediately for a skip), and can be torn down from another task through
//! [`AttemptHandle::force_close`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::Settings;
use crate::events::ChunkSink;
use crate::proxy;

/// Terminal status of a copy task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, enum_map::Enum)]
pub enum Status {
    /// Destination has the same size and a more recent modification time
    AlreadyExists,
    Copied,
    /// Destination existed but was stale
    Overwritten,
    Failed,
}

impl Status {
    pub fn name(&self) -> &'static str {
        match self {
            Status::AlreadyExists => "already exists",
            Status::Copied => "copied",
            Status::Overwritten => "overwritten",
            Status::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.pad(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyTask {
    pub source: std::path::PathBuf,
    pub destination: std::path::PathBuf,
}

/// Error taxonomy of a single attempt.
///
/// The supervisor decides what to do with an attempt by looking at the variant only.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    /// Source is missing, is not a regular file or cannot be opened
    #[error("source: {0:#}")]
    Source(#[source] anyhow::Error),
    /// Destination directory or file cannot be created
    #[error("destination: {0:#}")]
    Destination(#[source] anyhow::Error),
    /// I/O failure while streaming
    #[error("transfer: {0:#}")]
    Transfer(#[source] anyhow::Error),
    /// The attempt deadline fired before the copy completed
    #[error("transfer cancelled: would exceed the attempt deadline")]
    Deadline,
    /// Anything outside the taxonomy, e.g. a panicked attempt
    #[error("unclassified: {0:#}")]
    Unclassified(#[source] anyhow::Error),
}

impl CopyError {
    /// Whether another attempt may succeed; source and unclassified errors are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CopyError::Deadline | CopyError::Transfer(_) | CopyError::Destination(_)
        )
    }

    pub fn is_setup(&self) -> bool {
        matches!(self, CopyError::Source(_) | CopyError::Destination(_))
    }
}

fn read_error(error: throttle::Error) -> CopyError {
    match error {
        throttle::Error::Cancelled => CopyError::Deadline,
        error => CopyError::Transfer(anyhow::Error::new(error).context("failed reading source")),
    }
}

/// Payload of the readiness signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub size: u64,
    pub status: Status,
    /// Bytes are about to be streamed; false for a skip
    pub transferring: bool,
}

/// Single-fire readiness notification; firing consumes the signal.
#[derive(Debug)]
pub struct ReadySignal {
    tx: tokio::sync::oneshot::Sender<Ready>,
}

impl ReadySignal {
    fn fire(self, ready: Ready) {
        if self.tx.send(ready).is_err() {
            tracing::trace!("nobody is waiting for readiness");
        }
    }
}

pub type ReadyReceiver = tokio::sync::oneshot::Receiver<Ready>;

pub type AttemptJoinHandle = tokio::task::JoinHandle<Result<Outcome, CopyError>>;

/// Result of a successful attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    pub size: u64,
}

#[derive(Debug)]
struct Resources {
    opened: AtomicBool,
    closed: AtomicBool,
    cancel: CancellationToken,
    reporter: Mutex<Option<proxy::ReporterHandle>>,
    task: Mutex<Option<tokio::task::AbortHandle>>,
}

/// Handle used to tear down a running attempt from another task
#[derive(Debug, Clone)]
pub struct AttemptHandle {
    resources: Arc<Resources>,
}

impl AttemptHandle {
    /// Releases the attempt's proxy, reader and writer without waiting for them.
    ///
    /// Only the first call does anything, and only once the attempt has opened its files.
    /// Returns whether resources were released by this call.
    pub fn force_close(&self) -> bool {
        if !self.resources.opened.load(Ordering::Acquire) {
            tracing::trace!("attempt never opened its files, nothing to close");
            return false;
        }
        if self.resources.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.resources.cancel.cancel();
        if let Some(reporter) = self.resources.reporter.lock().unwrap().take() {
            reporter.close();
        }
        // aborting drops the reader and the writer on the runtime, not here
        if let Some(task) = self.resources.task.lock().unwrap().take() {
            task.abort();
        }
        tracing::debug!("forced close");
        true
    }

    pub fn is_opened(&self) -> bool {
        self.resources.opened.load(Ordering::Acquire)
    }
}

enum Freshness {
    Missing,
    Stale,
    UpToDate,
}

async fn freshness(
    src_metadata: &std::fs::Metadata,
    dst: &std::path::Path,
) -> Result<Freshness, CopyError> {
    let dst_metadata = match tokio::fs::metadata(dst).await {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Freshness::Missing);
        }
        Err(error) => {
            return Err(CopyError::Destination(
                anyhow::Error::new(error)
                    .context(format!("failed reading metadata from {:?}", dst)),
            ));
        }
    };
    if !dst_metadata.is_file() {
        return Err(CopyError::Destination(anyhow!(
            "non-regular destination file {:?}",
            dst
        )));
    }
    let newer = match (dst_metadata.modified(), src_metadata.modified()) {
        (Ok(dst_mtime), Ok(src_mtime)) => dst_mtime > src_mtime,
        _ => false,
    };
    if newer && dst_metadata.len() == src_metadata.len() {
        Ok(Freshness::UpToDate)
    } else {
        Ok(Freshness::Stale)
    }
}

/// One timed, cancellable execution of a [`CopyTask`]
#[derive(Debug)]
pub struct Attempt {
    task: CopyTask,
    speed: u64,
    chunk_size: usize,
    chunks: ChunkSink,
    ready: Option<ReadySignal>,
    resources: Arc<Resources>,
}

impl Attempt {
    pub fn new(
        task: CopyTask,
        settings: &Settings,
        cancel: CancellationToken,
        chunks: ChunkSink,
    ) -> (Self, ReadyReceiver) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let attempt = Self {
            task,
            speed: settings.speed,
            chunk_size: std::cmp::max(settings.chunk_size, 1),
            chunks,
            ready: Some(ReadySignal { tx }),
            resources: Arc::new(Resources {
                opened: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                cancel,
                reporter: Mutex::new(None),
                task: Mutex::new(None),
            }),
        };
        (attempt, rx)
    }

    pub fn task(&self) -> &CopyTask {
        &self.task
    }

    pub fn handle(&self) -> AttemptHandle {
        AttemptHandle {
            resources: self.resources.clone(),
        }
    }

    /// Runs the attempt on its own tokio task.
    pub fn spawn(self) -> (AttemptHandle, AttemptJoinHandle) {
        let handle = self.handle();
        let join = tokio::spawn(self.execute());
        *handle.resources.task.lock().unwrap() = Some(join.abort_handle());
        (handle, join)
    }

    fn fire(&mut self, ready: Ready) {
        if let Some(signal) = self.ready.take() {
            signal.fire(ready);
        }
    }

    pub async fn execute(self) -> Result<Outcome, CopyError> {
        let span = tracing::debug_span!(
            "copy",
            src = ?self.task.source,
            dst = ?self.task.destination
        );
        self.run().instrument(span).await
    }

    async fn run(mut self) -> Result<Outcome, CopyError> {
        let task = self.task.clone();
        let src_metadata = tokio::fs::metadata(&task.source)
            .await
            .with_context(|| format!("failed reading metadata from {:?}", &task.source))
            .map_err(CopyError::Source)?;
        if !src_metadata.is_file() {
            return Err(CopyError::Source(anyhow!(
                "non-regular source file {:?}",
                &task.source
            )));
        }
        let size = src_metadata.len();
        if let Some(parent) = task.destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create directory {:?}", parent))
                .map_err(CopyError::Destination)?;
        }
        let status = match freshness(&src_metadata, &task.destination).await? {
            Freshness::UpToDate => {
                tracing::debug!("destination is up to date, skipping");
                self.fire(Ready {
                    size,
                    status: Status::AlreadyExists,
                    transferring: false,
                });
                return Ok(Outcome {
                    status: Status::AlreadyExists,
                    size,
                });
            }
            Freshness::Stale => Status::Overwritten,
            Freshness::Missing => Status::Copied,
        };
        if self.resources.cancel.is_cancelled() {
            return Err(CopyError::Deadline);
        }
        tracing::debug!("opening 'src' for reading and 'dst' for writing");
        let reader = tokio::fs::File::open(&task.source)
            .await
            .with_context(|| format!("cannot open {:?} for reading", &task.source))
            .map_err(CopyError::Source)?;
        let mut writer = tokio::fs::File::create(&task.destination)
            .await
            .with_context(|| format!("cannot open {:?} for writing", &task.destination))
            .map_err(CopyError::Destination)?;
        self.resources.opened.store(true, Ordering::Release);
        let throttled = throttle::Throttled::new(
            reader,
            throttle::RateLimiter::new(self.speed),
            self.resources.cancel.clone(),
        );
        let mut reporter = proxy::ChunkReporter::new(throttled, self.chunks.clone());
        *self.resources.reporter.lock().unwrap() = Some(reporter.handle());
        self.fire(Ready {
            size,
            status,
            transferring: true,
        });
        let result = self.transfer(&mut reporter, &mut writer).await;
        reporter.close();
        result?;
        tracing::debug!("{}: {} bytes", status, size);
        Ok(Outcome { status, size })
    }

    async fn transfer<R: tokio::io::AsyncRead + Unpin>(
        &self,
        reporter: &mut proxy::ChunkReporter<R>,
        writer: &mut tokio::fs::File,
    ) -> Result<(), CopyError> {
        let cancel = self.resources.cancel.clone();
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = reporter.read(&mut buf).await.map_err(read_error)?;
            if n == 0 {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CopyError::Deadline),
                res = writer.write_all(&buf[..n]) => res
                    .with_context(|| format!("failed writing to {:?}", &self.task.destination))
                    .map_err(CopyError::Transfer)?,
            }
        }
        writer
            .flush()
            .await
            .with_context(|| format!("failed flushing {:?}", &self.task.destination))
            .map_err(CopyError::Transfer)?;
        writer
            .sync_all()
            .await
            .with_context(|| format!("failed syncing {:?}", &self.task.destination))
            .map_err(CopyError::Transfer)?;
        Ok(())
    }
}
