//! Typed events published by the supervisor
//!
//! A batch run produces two streams, both bounded tokio channels:
//!
//! - progress: one [`ProgressEvent`] per task, carrying a live [`ChunkStream`] when bytes are
//!   actually transferred
//! - log: one [`LogEvent`] per task, meant to be persisted by an audit sink
//!
//! Consumers drain the receivers until they return `None`; that happens once the [`Events`]
//! handle owned by the supervisor is dropped.

use crate::exec::Status;

const PROGRESS_CAPACITY: usize = 8;
const LOG_CAPACITY: usize = 8;

/// One item of a live chunk stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk {
    /// Number of bytes read from the source by one read call
    Read(u64),
    /// A new attempt starts from scratch; discard what was counted so far
    Restart,
    /// Last item of the stream, carrying the terminal status of the task
    Done(Status),
}

/// Receiving end of the chunks read by the attempts of one task
#[derive(Debug)]
pub struct ChunkStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<Chunk>,
}

impl ChunkStream {
    pub async fn next(&mut self) -> Option<Chunk> {
        self.rx.recv().await
    }

    /// Drains the stream and returns the number of bytes counted since the last restart.
    pub async fn total(mut self) -> u64 {
        let mut total = 0;
        while let Some(chunk) = self.next().await {
            match chunk {
                Chunk::Read(n) => total += n,
                Chunk::Restart => total = 0,
                Chunk::Done(_) => {}
            }
        }
        total
    }
}

/// Sending end shared by the supervisor and the chunk-reporting proxies of one task
#[derive(Debug, Clone)]
pub struct ChunkSink {
    tx: tokio::sync::mpsc::UnboundedSender<Chunk>,
}

impl ChunkSink {
    pub fn send(&self, chunk: Chunk) {
        // the consumer is free to stop listening
        let _ = self.tx.send(chunk);
    }
}

pub fn chunk_channel() -> (ChunkSink, ChunkStream) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    (ChunkSink { tx }, ChunkStream { rx })
}

#[derive(Debug)]
pub struct ProgressEvent {
    pub name: std::path::PathBuf,
    pub size: u64,
    /// Terminal status, or the expected one when a stream is attached; the stream's
    /// [`Chunk::Done`] item has the last word
    pub status: Status,
    /// Present only when the task transfers bytes
    pub chunks: Option<ChunkStream>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warn,
    Info,
    Debug,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Severity::Error => "ERROR",
            Severity::Warn => "WARN",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDetail {
    Destination(std::path::PathBuf),
    Error(String),
}

impl std::fmt::Display for LogDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LogDetail::Destination(path) => write!(f, "{}", path.display()),
            LogDetail::Error(error) => write!(f, "{}", error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub severity: Severity,
    pub status: Status,
    pub source: std::path::PathBuf,
    pub detail: LogDetail,
}

/// Producer side of both event streams, owned by the supervisor for one batch
#[derive(Debug)]
pub struct Events {
    progress: tokio::sync::mpsc::Sender<ProgressEvent>,
    log: tokio::sync::mpsc::Sender<LogEvent>,
}

pub type ProgressReceiver = tokio::sync::mpsc::Receiver<ProgressEvent>;
pub type LogReceiver = tokio::sync::mpsc::Receiver<LogEvent>;

impl Events {
    pub fn channel() -> (Self, ProgressReceiver, LogReceiver) {
        let (progress, progress_rx) = tokio::sync::mpsc::channel(PROGRESS_CAPACITY);
        let (log, log_rx) = tokio::sync::mpsc::channel(LOG_CAPACITY);
        (Self { progress, log }, progress_rx, log_rx)
    }

    pub async fn progress(&self, event: ProgressEvent) {
        if self.progress.send(event).await.is_err() {
            tracing::debug!("progress consumer is gone, dropping event");
        }
    }

    pub async fn log(&self, event: LogEvent) {
        if self.log.send(event).await.is_err() {
            tracing::debug!("log consumer is gone, dropping event");
        }
    }
}
