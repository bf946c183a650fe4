//! Common utilities and types for the rcopier tool
//!
//! This crate provides the supervised copy engine behind `rcopier`: a batch of files is copied
//! one file at a time, every transfer is rate-limited and bounded by a deadline, and failed
//! attempts are retried.
//!
//! # Core Modules
//!
//! - [`exec`] - single copy attempt: stale check, rate-limited streaming, readiness signal and forced close
//! - [`supervisor`] - retry and timeout policy over a batch, per-status summary
//! - [`proxy`] - chunk-reporting wrapper around a rate-limited reader
//! - [`events`] - progress and log events published by the supervisor
//! - [`progress`] - terminal rendering of progress events
//! - [`logfile`] - audit log sink
//! - [`list`] - source enumeration from a directory tree or a list file
//! - [`path`] - mirroring of source paths under the destination root
//! - [`config`] - runtime, output and copy settings
//!
//! # Error Handling
//!
//! An attempt fails with a [`exec::CopyError`] whose variant drives the retry decision. Errors
//! that abort a batch are returned as [`supervisor::Error`], which carries the summary of the
//! work done so far so the caller can still report it.

pub mod config;
pub mod events;
pub mod exec;
pub mod list;
pub mod logfile;
pub mod path;
pub mod progress;
pub mod proxy;
pub mod supervisor;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, RuntimeConfig, Settings};
pub use progress::{ProgressSettings, ProgressType};

fn get_max_level(output: &OutputConfig) -> tracing::Level {
    match output.verbose {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

fn init_tracing(output: &OutputConfig) {
    if output.quiet {
        return;
    }
    let level = get_max_level(output);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str()));
    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("failed to initialize logging: {}", error);
    }
}

/// Runs `func` on a freshly built tokio runtime.
///
/// Sets up logging according to `output`, prints the summary when requested and reports the
/// error otherwise. Returns `None` on failure so that the caller can pick the exit code.
pub fn run<Fut, Summary, Error>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Error: std::fmt::Display,
    Fut: std::future::Future<Output = Result<Summary, Error>>,
{
    init_tracing(&output);
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let tokio_runtime = match builder.build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(error) => {
            if !output.quiet {
                eprintln!("failed to start the async runtime: {}", error);
            }
            return None;
        }
    };
    let res = tokio_runtime.block_on(func());
    match res {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{}", summary);
            }
            Some(summary)
        }
        Err(error) => {
            if !output.quiet {
                tracing::error!("{}", error);
            }
            None
        }
    }
}
