//! Retry/timeout supervisor
//!
//! Runs the tasks of a batch strictly one after another. Each task gets up to `retries + 1`
//! attempts, every attempt is bounded by the configured timeout, and every task ends with exactly
//! one progress event and one log event.

use anyhow::{anyhow, Context};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::config::Settings;
use crate::events::{
    chunk_channel, Chunk, ChunkSink, ChunkStream, Events, LogDetail, LogEvent, ProgressEvent,
    Severity,
};
use crate::exec::{
    Attempt, AttemptHandle, AttemptJoinHandle, CopyError, CopyTask, Outcome, Ready, Status,
};

/// Per-status task counts of a batch
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    counts: enum_map::EnumMap<Status, usize>,
}

impl Summary {
    pub fn get(&self, status: Status) -> usize {
        self.counts[status]
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    fn record(&mut self, status: Status) {
        self.counts[status] += 1;
    }
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        let mut counts = self.counts;
        for (status, count) in other.counts {
            counts[status] += count;
        }
        Self { counts }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let order = [
            Status::Copied,
            Status::Overwritten,
            Status::AlreadyExists,
            Status::Failed,
        ];
        for (i, status) in order.into_iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "files {}: {}", status, self.get(status))?;
        }
        Ok(())
    }
}

/// Error aborting a batch, carrying the counts of the tasks completed so far
#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(source: anyhow::Error, summary: Summary) -> Self {
        Error { source, summary }
    }
}

/// Chunk plumbing shared by all attempts of one task
struct TaskProgress {
    chunks: ChunkSink,
    stream: Option<ChunkStream>,
    size: u64,
}

impl TaskProgress {
    fn new() -> Self {
        let (chunks, stream) = chunk_channel();
        Self {
            chunks,
            stream: Some(stream),
            size: 0,
        }
    }

    /// Whether the stream was already handed to the progress consumer
    fn announced(&self) -> bool {
        self.stream.is_none()
    }

    /// Ends an announced stream with the terminal status of the task.
    fn finish(&self, status: Status) {
        if self.announced() {
            self.chunks.send(Chunk::Done(status));
        }
    }
}

/// Starts an attempt on its own task
pub type Launch = fn(Attempt) -> (AttemptHandle, AttemptJoinHandle);

#[derive(Debug)]
pub struct Supervisor {
    sources: Vec<std::path::PathBuf>,
    destination: std::path::PathBuf,
    base: std::path::PathBuf,
    settings: Settings,
    events: Events,
    cancel: CancellationToken,
    summary: Summary,
    attempts: usize,
    launch: Launch,
}

impl Supervisor {
    /// Builds a supervisor for `sources`, mirrored under `destination` relative to their common
    /// base directory.
    pub fn new(
        sources: Vec<std::path::PathBuf>,
        destination: std::path::PathBuf,
        settings: Settings,
        events: Events,
    ) -> anyhow::Result<Self> {
        settings
            .validate()
            .map_err(|error| anyhow!("invalid settings: {}", error))?;
        let base = crate::path::common_base(&sources).context("no source files to copy")?;
        tracing::debug!("base directory of the batch: {:?}", &base);
        Ok(Self {
            sources,
            destination,
            base,
            settings,
            events,
            cancel: CancellationToken::new(),
            summary: Summary::default(),
            attempts: 0,
            launch: Attempt::spawn,
        })
    }

    /// Replaces the way attempts are started, e.g. to wrap or instrument them.
    #[must_use]
    pub fn with_launch(mut self, launch: Launch) -> Self {
        self.launch = launch;
        self
    }

    pub fn base(&self) -> &std::path::Path {
        &self.base
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Total number of attempts made so far, across all tasks
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Consumes the supervisor; dropping its [`Events`] lets the consumers finish.
    pub fn into_summary(self) -> Summary {
        self.summary
    }

    /// Copies every source, one task at a time.
    ///
    /// Tasks failing with a setup, transfer or deadline error are recorded as failed and the batch
    /// moves on. The batch is aborted only by an error outside that taxonomy, or by a setup error
    /// when `fail_early` is set.
    #[instrument(skip(self))]
    pub async fn execute(&mut self) -> Result<(), Error> {
        tracing::info!(
            "copying {} files: speed {}, timeout {}, retries {}, retry interval {}",
            self.sources.len(),
            if self.settings.speed == 0 {
                "unlimited".to_string()
            } else {
                format!("{}/s", bytesize::ByteSize(self.settings.speed))
            },
            humantime::format_duration(self.settings.timeout),
            self.settings.retries,
            humantime::format_duration(self.settings.retry_interval),
        );
        let sources = self.sources.clone();
        for source in sources {
            if let Err(error) = self.run_task(source).await {
                return Err(Error::new(error, self.summary));
            }
        }
        Ok(())
    }

    async fn run_task(&mut self, source: std::path::PathBuf) -> anyhow::Result<()> {
        let destination = match crate::path::mirror(&source, &self.base, &self.destination) {
            Ok(destination) => destination,
            Err(error) => {
                let mut progress = TaskProgress::new();
                let task = CopyTask {
                    destination: self.destination.clone(),
                    source,
                };
                return self
                    .failed(task, CopyError::Destination(error), &mut progress, 0)
                    .await;
            }
        };
        let task = CopyTask {
            source,
            destination,
        };
        let mut progress = TaskProgress::new();
        let mut attempts = 0;
        let mut retries_left = self.settings.retries;
        let error = loop {
            attempts += 1;
            self.attempts += 1;
            let error = match self.run_attempt(&task, &mut progress).await {
                Ok(outcome) => return self.succeeded(task, outcome, &mut progress).await,
                Err(error) => error,
            };
            if !error.is_retryable() || retries_left == 0 {
                break error;
            }
            retries_left -= 1;
            tracing::warn!(
                "copying {:?} failed: {}, retrying in {} ({} retries left)",
                &task.source,
                &error,
                humantime::format_duration(self.settings.retry_interval),
                retries_left
            );
            tokio::time::sleep(self.settings.retry_interval).await;
            if progress.announced() {
                progress.chunks.send(Chunk::Restart);
            }
        };
        self.failed(task, error, &mut progress, attempts).await
    }

    /// Runs one attempt bounded by the timeout.
    async fn run_attempt(
        &self,
        task: &CopyTask,
        progress: &mut TaskProgress,
    ) -> Result<Outcome, CopyError> {
        let cancel = self.cancel.child_token();
        let (attempt, mut ready_rx) = Attempt::new(
            task.clone(),
            &self.settings,
            cancel.clone(),
            progress.chunks.clone(),
        );
        let (handle, mut join) = (self.launch)(attempt);
        let deadline = tokio::time::sleep(self.settings.timeout);
        tokio::pin!(deadline);
        let mut ready_done = false;
        loop {
            tokio::select! {
                biased;
                ready = &mut ready_rx, if !ready_done => {
                    ready_done = true;
                    // a dropped signal means the attempt failed before being ready
                    if let Ok(ready) = ready {
                        self.ready(task, ready, progress).await;
                    }
                }
                res = &mut join => {
                    return match res {
                        Ok(result) => result,
                        Err(error) => Err(CopyError::Unclassified(
                            anyhow::Error::new(error).context("copy attempt did not run to completion"),
                        )),
                    };
                }
                _ = &mut deadline => {
                    tracing::warn!(
                        "copying {:?} did not complete within {}",
                        &task.source,
                        humantime::format_duration(self.settings.timeout)
                    );
                    cancel.cancel();
                    handle.force_close();
                    join.abort();
                    return Err(CopyError::Deadline);
                }
            }
        }
    }

    async fn ready(&self, task: &CopyTask, ready: Ready, progress: &mut TaskProgress) {
        progress.size = ready.size;
        if !ready.transferring {
            return;
        }
        if let Some(stream) = progress.stream.take() {
            self.events
                .progress(ProgressEvent {
                    name: task.source.clone(),
                    size: ready.size,
                    status: ready.status,
                    chunks: Some(stream),
                })
                .await;
        }
    }

    async fn succeeded(
        &mut self,
        task: CopyTask,
        outcome: Outcome,
        progress: &mut TaskProgress,
    ) -> anyhow::Result<()> {
        self.summary.record(outcome.status);
        progress.finish(outcome.status);
        if !progress.announced() {
            self.events
                .progress(ProgressEvent {
                    name: task.source.clone(),
                    size: outcome.size,
                    status: outcome.status,
                    chunks: None,
                })
                .await;
        }
        tracing::info!(
            "{:?} -> {:?} (status={})",
            &task.source,
            &task.destination,
            outcome.status
        );
        self.events
            .log(LogEvent {
                severity: Severity::Info,
                status: outcome.status,
                source: task.source,
                detail: LogDetail::Destination(task.destination),
            })
            .await;
        Ok(())
    }

    async fn failed(
        &mut self,
        task: CopyTask,
        error: CopyError,
        progress: &mut TaskProgress,
        attempts: usize,
    ) -> anyhow::Result<()> {
        self.summary.record(Status::Failed);
        progress.finish(Status::Failed);
        if !progress.announced() {
            self.events
                .progress(ProgressEvent {
                    name: task.source.clone(),
                    size: progress.size,
                    status: Status::Failed,
                    chunks: None,
                })
                .await;
        }
        let detail = match attempts {
            0 | 1 => format!("{:#}", error),
            attempts => format!("{:#} (after {} attempts)", error, attempts),
        };
        tracing::error!("{:?} -> {:?}: {}", &task.source, &task.destination, &detail);
        self.events
            .log(LogEvent {
                severity: Severity::Error,
                status: Status::Failed,
                source: task.source.clone(),
                detail: LogDetail::Error(detail),
            })
            .await;
        let abort = match &error {
            CopyError::Unclassified(_) => true,
            error => self.settings.fail_early && error.is_setup(),
        };
        if abort {
            return Err(anyhow::Error::new(error)
                .context(format!("failed copying {:?}, aborting", &task.source)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LogReceiver, ProgressReceiver};
    use crate::testutils;
    use tracing_test::traced_test;

    #[derive(Debug)]
    struct Seen {
        name: std::path::PathBuf,
        size: u64,
        status: Status,
        chunks: Option<Vec<Chunk>>,
    }

    impl Seen {
        fn total(&self) -> Option<u64> {
            self.chunks.as_ref().map(|chunks| {
                chunks.iter().fold(0, |total, chunk| match chunk {
                    Chunk::Read(n) => total + n,
                    Chunk::Restart => 0,
                    Chunk::Done(_) => total,
                })
            })
        }

        /// Status a consumer ends up with once the stream is drained
        fn final_status(&self) -> Status {
            match self.chunks.as_ref().and_then(|chunks| chunks.last()) {
                Some(Chunk::Done(status)) => *status,
                _ => self.status,
            }
        }
    }

    type Collected = tokio::task::JoinHandle<(Vec<Seen>, Vec<LogEvent>)>;

    fn collect(mut progress_rx: ProgressReceiver, mut log_rx: LogReceiver) -> Collected {
        tokio::spawn(async move {
            let logs = tokio::spawn(async move {
                let mut logs = vec![];
                while let Some(event) = log_rx.recv().await {
                    logs.push(event);
                }
                logs
            });
            let mut seen = vec![];
            while let Some(event) = progress_rx.recv().await {
                let chunks = match event.chunks {
                    Some(mut stream) => {
                        let mut chunks = vec![];
                        while let Some(chunk) = stream.next().await {
                            chunks.push(chunk);
                        }
                        Some(chunks)
                    }
                    None => None,
                };
                seen.push(Seen {
                    name: event.name,
                    size: event.size,
                    status: event.status,
                    chunks,
                });
            }
            (seen, logs.await.unwrap())
        })
    }

    fn unlimited() -> Settings {
        Settings {
            speed: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn batch_counts_every_status() -> anyhow::Result<()> {
        let tmp_dir = testutils::setup_test_dir()?;
        let src = tmp_dir.path().join("src");
        let dst = tmp_dir.path().join("dst");
        let sources = vec![
            src.join("a").join("x.txt"),
            src.join("b").join("y.txt"),
            src.join("b").join("z.txt"),
        ];
        // y.txt is stale, z.txt is up to date
        std::fs::create_dir_all(dst.join("b"))?;
        std::fs::write(dst.join("b").join("y.txt"), "old")?;
        std::fs::copy(&sources[2], dst.join("b").join("z.txt"))?;
        testutils::make_newer(&dst.join("b").join("z.txt"), &sources[2])?;
        let (events, progress_rx, log_rx) = Events::channel();
        let collected = collect(progress_rx, log_rx);
        let mut supervisor = Supervisor::new(sources.clone(), dst.clone(), unlimited(), events)?;
        assert_eq!(supervisor.base(), src.as_path());
        supervisor.execute().await?;
        assert_eq!(supervisor.attempts(), 3);
        let summary = supervisor.into_summary();
        assert_eq!(summary.get(Status::Copied), 1);
        assert_eq!(summary.get(Status::Overwritten), 1);
        assert_eq!(summary.get(Status::AlreadyExists), 1);
        assert_eq!(summary.get(Status::Failed), 0);
        assert_eq!(summary.total(), sources.len());
        let (seen, logs) = collected.await?;
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].name, sources[0]);
        assert_eq!(seen[0].status, Status::Copied);
        assert_eq!(seen[0].total(), Some(testutils::X_SIZE));
        assert_eq!(seen[0].final_status(), Status::Copied);
        assert_eq!(seen[1].status, Status::Overwritten);
        assert_eq!(seen[1].total(), Some(testutils::Y_SIZE));
        assert_eq!(seen[2].status, Status::AlreadyExists);
        assert_eq!(seen[2].size, testutils::Z_SIZE);
        assert!(seen[2].chunks.is_none());
        assert_eq!(logs.len(), 3);
        assert!(logs.iter().all(|log| log.severity == Severity::Info));
        assert!(logs_contain("status=already exists"));
        assert_eq!(
            logs[0].detail,
            LogDetail::Destination(dst.join("a").join("x.txt"))
        );
        assert_eq!(
            std::fs::read(&sources[1])?,
            std::fs::read(dst.join("b").join("y.txt"))?
        );
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn deadline_exhausts_retries_and_batch_continues() -> anyhow::Result<()> {
        let tmp_dir = testutils::setup_test_dir()?;
        let src = tmp_dir.path().join("src");
        let dst = tmp_dir.path().join("dst");
        // 64 KiB at 1 KiB/s cannot finish within the timeout, 10 bytes can
        let sources = vec![src.join("b").join("y.txt"), src.join("b").join("z.txt")];
        let settings = Settings {
            speed: 1024,
            timeout: std::time::Duration::from_millis(300),
            retries: 2,
            retry_interval: std::time::Duration::from_millis(10),
            ..Default::default()
        };
        let (events, progress_rx, log_rx) = Events::channel();
        let collected = collect(progress_rx, log_rx);
        let mut supervisor = Supervisor::new(sources.clone(), dst.clone(), settings, events)?;
        let start = std::time::Instant::now();
        supervisor.execute().await?;
        assert!(start.elapsed() >= std::time::Duration::from_millis(900));
        assert_eq!(supervisor.attempts(), 3 + 1);
        let summary = supervisor.into_summary();
        assert_eq!(summary.get(Status::Failed), 1);
        assert_eq!(summary.get(Status::Copied), 1);
        let (seen, logs) = collected.await?;
        assert_eq!(seen.len(), 2);
        // the failed transfer was announced once, then restarted for every retry
        let chunks = seen[0].chunks.as_ref().unwrap();
        assert_eq!(
            chunks.iter().filter(|chunk| **chunk == Chunk::Restart).count(),
            2
        );
        assert!(seen[0].total().unwrap() < testutils::Y_SIZE);
        assert_eq!(chunks.last(), Some(&Chunk::Done(Status::Failed)));
        assert_eq!(seen[0].final_status(), Status::Failed);
        assert_eq!(seen[1].total(), Some(testutils::Z_SIZE));
        assert_eq!(seen[1].final_status(), Status::Copied);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].severity, Severity::Error);
        assert_eq!(logs[0].status, Status::Failed);
        match &logs[0].detail {
            LogDetail::Error(detail) => assert!(detail.contains("after 3 attempts"), "{}", detail),
            detail => panic!("unexpected detail {:?}", detail),
        }
        assert_eq!(logs[1].status, Status::Copied);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn source_errors_are_not_retried() -> anyhow::Result<()> {
        let tmp_dir = testutils::setup_test_dir()?;
        let src = tmp_dir.path().join("src");
        let dst = tmp_dir.path().join("dst");
        let sources = vec![src.join("a").join("missing.txt"), src.join("a").join("x.txt")];
        let settings = Settings {
            retries: 3,
            retry_interval: std::time::Duration::from_secs(60),
            ..unlimited()
        };
        let (events, progress_rx, log_rx) = Events::channel();
        let collected = collect(progress_rx, log_rx);
        let mut supervisor = Supervisor::new(sources, dst.clone(), settings, events)?;
        supervisor.execute().await?;
        assert_eq!(supervisor.attempts(), 2);
        let summary = supervisor.into_summary();
        assert_eq!(summary.get(Status::Failed), 1);
        assert_eq!(summary.get(Status::Copied), 1);
        let (seen, logs) = collected.await?;
        assert_eq!(seen[0].status, Status::Failed);
        assert!(seen[0].chunks.is_none());
        assert_eq!(logs[0].severity, Severity::Error);
        assert!(logs_contain("ERROR"));
        assert!(logs_contain("missing.txt"));
        assert!(dst.join("x.txt").exists());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn destination_errors_are_retried() -> anyhow::Result<()> {
        let tmp_dir = testutils::setup_test_dir()?;
        let src = tmp_dir.path().join("src");
        let dst = tmp_dir.path().join("dst");
        // the parent of the first destination is a regular file
        std::fs::write(dst.join("a"), "in the way")?;
        let sources = vec![src.join("a").join("x.txt"), src.join("b").join("z.txt")];
        let settings = Settings {
            retries: 3,
            retry_interval: std::time::Duration::from_millis(10),
            ..unlimited()
        };
        let (events, progress_rx, log_rx) = Events::channel();
        let collected = collect(progress_rx, log_rx);
        let mut supervisor = Supervisor::new(sources, dst.clone(), settings, events)?;
        supervisor.execute().await?;
        assert_eq!(supervisor.attempts(), 3 + 1 + 1);
        let summary = supervisor.into_summary();
        assert_eq!(summary.get(Status::Failed), 1);
        assert_eq!(summary.get(Status::Copied), 1);
        let (seen, logs) = collected.await?;
        assert_eq!(seen[0].status, Status::Failed);
        assert!(seen[0].chunks.is_none());
        match &logs[0].detail {
            LogDetail::Error(detail) => {
                assert!(detail.contains("cannot create directory"), "{}", detail);
                assert!(detail.contains("after 4 attempts"), "{}", detail);
            }
            detail => panic!("unexpected detail {:?}", detail),
        }
        assert!(dst.join("b").join("z.txt").exists());
        Ok(())
    }

    fn flaky_source(attempt: Attempt) -> (AttemptHandle, AttemptJoinHandle) {
        if !attempt.task().source.ends_with("y.txt") {
            return attempt.spawn();
        }
        let handle = attempt.handle();
        let join: AttemptJoinHandle = tokio::spawn(async {
            Err(CopyError::Transfer(anyhow!("connection reset by peer")))
        });
        (handle, join)
    }

    #[tokio::test]
    #[traced_test]
    async fn transfer_errors_exhaust_retries() -> anyhow::Result<()> {
        let tmp_dir = testutils::setup_test_dir()?;
        let src = tmp_dir.path().join("src");
        let dst = tmp_dir.path().join("dst");
        let sources = vec![src.join("b").join("y.txt"), src.join("b").join("z.txt")];
        let settings = Settings {
            retries: 2,
            retry_interval: std::time::Duration::from_millis(10),
            ..unlimited()
        };
        let (events, progress_rx, log_rx) = Events::channel();
        let collected = collect(progress_rx, log_rx);
        let mut supervisor =
            Supervisor::new(sources, dst.clone(), settings, events)?.with_launch(flaky_source);
        supervisor.execute().await?;
        assert_eq!(supervisor.attempts(), 3 + 1);
        let summary = supervisor.into_summary();
        assert_eq!(summary.get(Status::Failed), 1);
        assert_eq!(summary.get(Status::Copied), 1);
        let (seen, logs) = collected.await?;
        assert_eq!(seen[0].final_status(), Status::Failed);
        match &logs[0].detail {
            LogDetail::Error(detail) => {
                assert!(detail.contains("connection reset by peer"), "{}", detail);
                assert!(detail.contains("after 3 attempts"), "{}", detail);
            }
            detail => panic!("unexpected detail {:?}", detail),
        }
        assert!(!dst.join("y.txt").exists());
        assert!(dst.join("z.txt").exists());
        Ok(())
    }

    fn aborted_source(attempt: Attempt) -> (AttemptHandle, AttemptJoinHandle) {
        if !attempt.task().source.ends_with("z.txt") {
            return attempt.spawn();
        }
        let handle = attempt.handle();
        let join: AttemptJoinHandle = tokio::spawn(std::future::pending());
        join.abort();
        (handle, join)
    }

    #[tokio::test]
    #[traced_test]
    async fn unclassified_error_aborts_with_partial_summary() -> anyhow::Result<()> {
        let tmp_dir = testutils::setup_test_dir()?;
        let src = tmp_dir.path().join("src");
        let dst = tmp_dir.path().join("dst");
        let sources = vec![
            src.join("a").join("x.txt"),
            src.join("b").join("z.txt"),
            src.join("b").join("y.txt"),
        ];
        let settings = Settings {
            retries: 3,
            ..unlimited()
        };
        let (events, progress_rx, log_rx) = Events::channel();
        let collected = collect(progress_rx, log_rx);
        let mut supervisor =
            Supervisor::new(sources, dst.clone(), settings, events)?.with_launch(aborted_source);
        let error = supervisor.execute().await.unwrap_err();
        // never retried, and fail_early is not needed
        assert_eq!(supervisor.attempts(), 2);
        assert_eq!(error.summary.get(Status::Copied), 1);
        assert_eq!(error.summary.get(Status::Failed), 1);
        assert_eq!(error.summary.total(), 2);
        let message = format!("{}", error);
        assert!(message.contains("z.txt"), "{}", message);
        assert!(message.contains("did not run to completion"), "{}", message);
        drop(supervisor);
        let (seen, logs) = collected.await?;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].status, Status::Failed);
        assert_eq!(logs.len(), 2);
        assert!(!dst.join("b").join("y.txt").exists());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn fail_early_aborts_on_setup_error() -> anyhow::Result<()> {
        let tmp_dir = testutils::setup_test_dir()?;
        let src = tmp_dir.path().join("src");
        let dst = tmp_dir.path().join("dst");
        let sources = vec![
            src.join("a").join("x.txt"),
            src.join("a").join("missing.txt"),
            src.join("b").join("z.txt"),
        ];
        let settings = Settings {
            fail_early: true,
            ..unlimited()
        };
        let (events, progress_rx, log_rx) = Events::channel();
        let collected = collect(progress_rx, log_rx);
        let mut supervisor = Supervisor::new(sources, dst.clone(), settings, events)?;
        let error = supervisor.execute().await.unwrap_err();
        assert_eq!(error.summary.get(Status::Copied), 1);
        assert_eq!(error.summary.get(Status::Failed), 1);
        assert!(format!("{}", error).contains("missing.txt"));
        drop(supervisor);
        let (seen, logs) = collected.await?;
        assert_eq!(seen.len(), 2);
        assert_eq!(logs.len(), 2);
        assert!(!dst.join("b").join("z.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let (events, _progress_rx, _log_rx) = Events::channel();
        assert!(Supervisor::new(vec![], "/tmp".into(), unlimited(), events).is_err());
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected() {
        let (events, _progress_rx, _log_rx) = Events::channel();
        let settings = Settings {
            timeout: std::time::Duration::ZERO,
            ..Default::default()
        };
        assert!(Supervisor::new(vec!["/a/b".into()], "/tmp".into(), settings, events).is_err());
    }

    #[test]
    fn summary_display_and_add() {
        let mut lhs = Summary::default();
        lhs.record(Status::Copied);
        lhs.record(Status::Failed);
        let mut rhs = Summary::default();
        rhs.record(Status::Copied);
        rhs.record(Status::AlreadyExists);
        let summary = lhs + rhs;
        assert_eq!(summary.total(), 4);
        assert_eq!(
            summary.to_string(),
            "files copied: 2\nfiles overwritten: 0\nfiles already exists: 1\nfiles failed: 1"
        );
    }
}
