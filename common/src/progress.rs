//! Terminal rendering of progress events

use std::io::IsTerminal;

use crate::events::{Chunk, ChunkStream, ProgressEvent, ProgressReceiver};
use crate::exec::Status;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "PascalCase")]
pub enum ProgressType {
    /// Progress bars when stderr is a terminal, text updates otherwise
    #[default]
    Auto,
    /// One progress bar per file
    ProgressBar,
    /// Periodic text updates, suited for logs and pipes
    TextUpdates,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressSettings {
    pub progress_type: ProgressType,
    /// Delay between two updates (None = 200ms for bars, 10s for text)
    pub progress_delay: Option<std::time::Duration>,
}

impl ProgressSettings {
    fn resolved(&self) -> (ProgressType, std::time::Duration) {
        let progress_type = match self.progress_type {
            ProgressType::Auto => {
                if std::io::stderr().is_terminal() {
                    ProgressType::ProgressBar
                } else {
                    ProgressType::TextUpdates
                }
            }
            progress_type => progress_type,
        };
        let default_delay = match progress_type {
            ProgressType::TextUpdates => std::time::Duration::from_secs(10),
            _ => std::time::Duration::from_millis(200),
        };
        (progress_type, self.progress_delay.unwrap_or(default_delay))
    }
}

/// Byte count of one transfer as seen by a consumer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    /// Bytes read since the last restart
    pub bytes: u64,
    pub restarts: usize,
    /// Terminal status, once the stream delivered it
    pub status: Option<Status>,
}

impl Transfer {
    pub fn apply(&mut self, chunk: Chunk) {
        match chunk {
            Chunk::Read(n) => self.bytes += n,
            Chunk::Restart => {
                self.bytes = 0;
                self.restarts += 1;
            }
            Chunk::Done(status) => self.status = Some(status),
        }
    }
}

fn message(event: &ProgressEvent) -> String {
    format!("{} ({})", event.name.display(), event.status)
}

async fn follow_bar(
    event: &ProgressEvent,
    chunks: &mut ChunkStream,
    delay: std::time::Duration,
) -> Transfer {
    let bar = indicatif::ProgressBar::new(event.size);
    let style = indicatif::ProgressStyle::with_template(
        "{msg}\n[{elapsed_precise}] [{wide_bar}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    )
    .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message(message(event));
    bar.enable_steady_tick(delay);
    let mut transfer = Transfer::default();
    while let Some(chunk) = chunks.next().await {
        transfer.apply(chunk);
        if chunk == Chunk::Restart {
            bar.set_message(format!("{} retry #{}", message(event), transfer.restarts));
        }
        bar.set_position(transfer.bytes);
    }
    bar.finish();
    transfer
}

async fn follow_text(
    event: &ProgressEvent,
    chunks: &mut ChunkStream,
    delay: std::time::Duration,
) -> Transfer {
    let mut transfer = Transfer::default();
    let mut updates = tokio::time::interval(delay);
    // the first tick completes immediately
    updates.tick().await;
    loop {
        tokio::select! {
            chunk = chunks.next() => match chunk {
                Some(chunk) => transfer.apply(chunk),
                None => break,
            },
            _ = updates.tick() => {
                eprintln!(
                    "{}: {} / {}",
                    message(event),
                    bytesize::ByteSize(transfer.bytes),
                    bytesize::ByteSize(event.size)
                );
            }
        }
    }
    transfer
}

/// Renders every progress event until the producer is gone.
///
/// Returns the number of transfers that ended before all their bytes were read.
pub async fn render(mut progress_rx: ProgressReceiver, settings: ProgressSettings) -> usize {
    let (progress_type, delay) = settings.resolved();
    let mut interrupted = 0;
    while let Some(mut event) = progress_rx.recv().await {
        let Some(mut chunks) = event.chunks.take() else {
            eprintln!("File {}: {}", event.name.display(), event.status);
            continue;
        };
        let transfer = match progress_type {
            ProgressType::TextUpdates => follow_text(&event, &mut chunks, delay).await,
            _ => follow_bar(&event, &mut chunks, delay).await,
        };
        let status = transfer.status.unwrap_or(event.status);
        if status == Status::Failed || transfer.bytes != event.size {
            interrupted += 1;
            eprintln!(
                "===> copy of {} interrupted: {} of {} transferred",
                event.name.display(),
                bytesize::ByteSize(transfer.bytes),
                bytesize::ByteSize(event.size)
            );
        }
        eprintln!("File {}: {}", event.name.display(), status);
    }
    interrupted
}

/// Consumes progress events without rendering them.
pub async fn discard(mut progress_rx: ProgressReceiver) {
    while progress_rx.recv().await.is_some() {}
}
