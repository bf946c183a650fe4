use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rcopier",
    version,
    about = "Copy files one at a time under a byte-rate budget, a per-file deadline and a retry policy",
    long_about = "`rcopier` copies a batch of files from a source tree into a destination tree, one file at a time.

Every transfer is rate-limited, every attempt is bounded by a deadline, and failed attempts are retried. Files whose destination copy is up to date (same size, more recent) are skipped. Every file gets one line in the audit log, by default `<destination>/rcopier.log`.

EXAMPLES:
    # Copy a directory tree at 2 MiB/s with progress
    rcopier copy /data/source /backup/target --speed 2MiB --progress --summary

    # Copy the files listed in a file, giving up on each file after 3 retries
    rcopier copy --from-list files.txt /backup/target --retries 3

    # Produce a list of files to edit and feed back with --from-list
    rcopier list /data/source -o files.txt"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    // Progress & output
    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true, help_heading = "Progress & output")]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        help_heading = "Progress & output"
    )]
    quiet: bool,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        global = true,
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        global = true,
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,
}

#[derive(clap::Subcommand, Debug, Clone)]
enum Command {
    /// Copy all files under a source directory, or the files named in a list, into a destination directory
    #[command(visible_alias = "c")]
    Copy(CopyArgs),
    /// List all files under a path, one per line
    #[command(visible_alias = "l")]
    List(ListArgs),
}

#[derive(clap::Args, Debug, Clone)]
struct CopyArgs {
    // Copy options
    /// Read source files from a list file instead of walking a source directory
    ///
    /// One path per line; empty lines and lines starting with '#' are skipped. When given, the
    /// only positional argument is the destination directory.
    #[arg(long, value_name = "PATH", help_heading = "Copy options")]
    from_list: Option<std::path::PathBuf>,

    /// Abort the whole batch on the first file that cannot be opened or created
    ///
    /// Without it such files are reported as failed and the batch moves on.
    #[arg(short = 'e', long = "fail-early", help_heading = "Copy options")]
    fail_early: bool,

    /// Audit log file (default: `<destination>/rcopier.log`)
    #[arg(long, value_name = "PATH", help_heading = "Copy options")]
    log_file: Option<std::path::PathBuf>,

    // Transfer & retries
    /// Transfer speed limit per file, e.g. "512K", "2MBps", "1GiB/s"; 0 means no limit
    #[arg(
        long,
        default_value = "512KBps",
        value_name = "SPEED",
        value_parser = common::config::parse_speed,
        help_heading = "Transfer & retries"
    )]
    speed: u64,

    /// Deadline of a single copy attempt, e.g. "30s", "10m"
    #[arg(
        long,
        default_value = "10m",
        value_name = "DURATION",
        value_parser = common::config::parse_duration,
        help_heading = "Transfer & retries"
    )]
    timeout: std::time::Duration,

    /// Number of retries after a timed out, interrupted or unwritable attempt
    #[arg(
        long,
        default_value = "5",
        value_name = "N",
        help_heading = "Transfer & retries"
    )]
    retries: usize,

    /// Pause between two attempts of the same file
    #[arg(
        long,
        default_value = "2s",
        value_name = "DURATION",
        value_parser = common::config::parse_duration,
        help_heading = "Transfer & retries"
    )]
    retry_interval: std::time::Duration,

    /// Size of a single read
    #[arg(
        long,
        default_value = "64KiB",
        value_name = "SIZE",
        help_heading = "Transfer & retries"
    )]
    chunk_size: bytesize::ByteSize,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Toggles the type of progress to show
    ///
    /// If specified, --progress flag is implied.
    ///
    /// Options are: `ProgressBar` (one progress bar per file), `TextUpdates` (appropriate for logging), Auto (default, will
    /// choose between `ProgressBar` or `TextUpdates` depending on the type of terminal attached to stderr)
    #[arg(long, value_name = "TYPE", help_heading = "Progress & output")]
    progress_type: Option<common::ProgressType>,

    /// Sets the delay between progress updates
    ///
    /// - For the interactive (--progress-type=ProgressBar), the default is 200ms.
    /// - For the non-interactive (--progress-type=TextUpdates), the default is 10s.
    ///
    /// If specified, --progress flag is implied.
    #[arg(
        long,
        value_name = "DELAY",
        value_parser = common::config::parse_duration,
        help_heading = "Progress & output"
    )]
    progress_delay: Option<std::time::Duration>,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    // ARGUMENTS
    /// Source directory and destination directory, or only the destination directory with --from-list
    #[arg(required = true, num_args = 1..=2)]
    paths: Vec<std::path::PathBuf>,
}

impl CopyArgs {
    fn progress_settings(&self) -> Option<common::ProgressSettings> {
        if self.progress || self.progress_type.is_some() || self.progress_delay.is_some() {
            Some(common::ProgressSettings {
                progress_type: self.progress_type.unwrap_or_default(),
                progress_delay: self.progress_delay,
            })
        } else {
            None
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
struct ListArgs {
    /// Write the list to a file instead of stdout
    #[arg(short = 'o', long, value_name = "PATH")]
    output: Option<std::path::PathBuf>,

    /// Directory to list (default: current directory)
    #[arg()]
    path: Option<std::path::PathBuf>,
}

#[derive(Debug)]
enum Report {
    Copy(common::supervisor::Summary),
    List(usize),
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Report::Copy(summary) => write!(f, "{}", summary),
            Report::List(count) => write!(f, "files listed: {}", count),
        }
    }
}

async fn collect_sources(
    args: &CopyArgs,
) -> Result<(Vec<std::path::PathBuf>, std::path::PathBuf)> {
    let (sources, destination) = match (&args.from_list, args.paths.as_slice()) {
        (Some(list), [destination]) => {
            (common::list::load_list(list).await?, destination.clone())
        }
        (None, [source, destination]) => {
            (common::list::list_files(source).await?, destination.clone())
        }
        (Some(_), _) => {
            return Err(anyhow!(
                "with --from-list, the only argument is the destination directory"
            ));
        }
        (None, _) => {
            return Err(anyhow!(
                "you must specify a source directory and a destination directory"
            ));
        }
    };
    let is_dir = tokio::fs::metadata(&destination)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(anyhow!("no such directory: {:?}", destination));
    }
    let sources = sources
        .iter()
        .map(std::path::absolute)
        .collect::<std::io::Result<Vec<_>>>()
        .context("failed resolving source paths")?;
    let destination = std::path::absolute(&destination)
        .with_context(|| format!("failed resolving {:?}", destination))?;
    Ok((sources, destination))
}

#[instrument]
async fn copy(args: CopyArgs) -> Result<common::supervisor::Summary> {
    let (sources, destination) = collect_sources(&args).await?;
    if sources.is_empty() {
        tracing::info!("nothing to copy");
        return Ok(common::supervisor::Summary::default());
    }
    let settings = common::Settings {
        speed: args.speed,
        timeout: args.timeout,
        retries: args.retries,
        retry_interval: args.retry_interval,
        chunk_size: args.chunk_size.as_u64() as usize,
        fail_early: args.fail_early,
    };
    let log_path = args
        .log_file
        .clone()
        .unwrap_or_else(|| destination.join(common::logfile::DEFAULT_FILE_NAME));
    // no file is copied without an audit trail
    let log_file = common::logfile::LogFile::open(log_path).await?;
    tracing::info!("logging to {:?}", log_file.path());
    let (events, progress_rx, log_rx) = common::events::Events::channel();
    let log_sink = tokio::spawn(common::logfile::run_log_sink(log_rx, log_file));
    let progress = match args.progress_settings() {
        Some(settings) => tokio::spawn(common::progress::render(progress_rx, settings)),
        None => tokio::spawn(async move {
            common::progress::discard(progress_rx).await;
            0
        }),
    };
    let mut supervisor =
        common::supervisor::Supervisor::new(sources, destination, settings, events)?;
    let result = supervisor.execute().await;
    // releases the event senders so that both sinks finish
    let summary = supervisor.into_summary();
    let interrupted = progress.await?;
    tracing::debug!("{} transfers did not complete", interrupted);
    let logged = log_sink.await??;
    tracing::debug!("{} events written to the log file", logged);
    if let Err(error) = result {
        if args.summary {
            return Err(anyhow!("{}\n\n{}", error, &error.summary));
        }
        return Err(error.into());
    }
    if summary.get(common::exec::Status::Failed) > 0 {
        if args.summary {
            return Err(anyhow!("rcopier encountered errors\n\n{}", &summary));
        }
        return Err(anyhow!("rcopier encountered errors"));
    }
    Ok(summary)
}

#[instrument]
async fn list(args: ListArgs) -> Result<usize> {
    let root = args.path.unwrap_or_else(|| std::path::PathBuf::from("."));
    let files = common::list::list_files(&root).await?;
    let mut contents = String::new();
    for file in &files {
        contents.push_str(&file.to_string_lossy());
        contents.push('\n');
    }
    match args.output {
        Some(output) => {
            if let Some(parent) = output.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("cannot create directory {:?}", parent))?;
            }
            tokio::fs::write(&output, contents)
                .await
                .with_context(|| format!("failed writing list to {:?}", &output))?;
        }
        None => print!("{}", contents),
    }
    Ok(files.len())
}

async fn async_main(args: Args) -> Result<Report> {
    match args.command {
        Command::Copy(copy_args) => Ok(Report::Copy(copy(copy_args).await?)),
        Command::List(list_args) => Ok(Report::List(list(list_args).await?)),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let print_summary = match &args.command {
        Command::Copy(copy_args) => copy_args.summary,
        Command::List(_) => false,
    };
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let res = common::run(output, runtime, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
