//! Audit log sink
//!
//! Persists every [`LogEvent`] as one line:
//!
//! ```text
//! [Mon, 19 Oct 2026 10:01:02 +0200]  INFO: /data/a/x.txt  ->  /backup/a/x.txt (status=copied)
//! ```

use anyhow::Context;
use tokio::io::AsyncWriteExt;

use crate::events::{LogEvent, LogReceiver};

pub const DEFAULT_FILE_NAME: &str = "rcopier.log";

pub fn format_line<Tz: chrono::TimeZone>(
    event: &LogEvent,
    time: &chrono::DateTime<Tz>,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "[{}] {:>5}: {}  ->  {} (status={})\n",
        time.to_rfc2822(),
        event.severity,
        event.source.display(),
        event.detail,
        event.status
    )
}

/// Audit log file opened for appending, ready to be handed to [`run_log_sink`]
#[derive(Debug)]
pub struct LogFile {
    path: std::path::PathBuf,
    file: tokio::fs::File,
}

impl LogFile {
    /// Opens (or creates) `path` in append mode.
    pub async fn open(path: std::path::PathBuf) -> anyhow::Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("cannot open log file {:?}", &path))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// Appends every received event to `log_file` until the producer is gone.
///
/// Returns the number of events written.
pub async fn run_log_sink(mut log_rx: LogReceiver, log_file: LogFile) -> anyhow::Result<usize> {
    let LogFile { path, file } = log_file;
    let mut writer = tokio::io::BufWriter::new(file);
    let mut written = 0;
    while let Some(event) = log_rx.recv().await {
        tracing::trace!("log: {:?} {}", &event.source, &event.status);
        let line = format_line(&event, &chrono::Local::now());
        writer
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed writing to log file {:?}", &path))?;
        writer
            .flush()
            .await
            .with_context(|| format!("failed flushing log file {:?}", &path))?;
        written += 1;
    }
    writer
        .into_inner()
        .sync_all()
        .await
        .with_context(|| format!("failed syncing log file {:?}", &path))?;
    Ok(written)
}
