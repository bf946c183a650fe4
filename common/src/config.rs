//! Configuration types for runtime, output and copy settings

use anyhow::{anyhow, Context};

pub const KIB: u64 = 1 << 10;
pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

/// Settings for one batch run, read-only once the supervisor is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Byte rate budget for a single transfer (0 = no limit)
    pub speed: u64,
    /// Deadline for a single attempt
    pub timeout: std::time::Duration,
    /// Additional attempts after the first one
    pub retries: usize,
    /// Pause between two attempts of the same file
    pub retry_interval: std::time::Duration,
    /// Read buffer size
    pub chunk_size: usize,
    /// Abort the whole batch on a source or destination setup error
    pub fail_early: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            speed: 512 * KIB,
            timeout: std::time::Duration::from_secs(10 * 60),
            retries: 5,
            retry_interval: std::time::Duration::from_secs(2),
            chunk_size: 64 * 1024,
            fail_early: false,
        }
    }
}

impl Settings {
    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout.is_zero() {
            return Err("timeout must be greater than zero".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Parses a transfer speed such as `512K`, `2MBps`, `1GiB/s` or `100` into bytes per second.
///
/// Multipliers are binary (1K = 1024 bytes) and the unit is case-insensitive.
pub fn parse_speed(value: &str) -> anyhow::Result<u64> {
    let lowered = value.trim().to_lowercase();
    let unit_start = lowered
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lowered.len());
    let (number, unit) = lowered.split_at(unit_start);
    if number.is_empty() {
        return Err(anyhow!("invalid speed {:?}: missing number", value));
    }
    let number: u64 = number
        .parse()
        .with_context(|| format!("invalid speed {:?}", value))?;
    let unit = unit.trim();
    let unit = unit
        .strip_suffix("/s")
        .or_else(|| unit.strip_suffix("ps"))
        .unwrap_or(unit);
    let unit = unit.strip_suffix('b').unwrap_or(unit);
    let unit = unit.strip_suffix('i').unwrap_or(unit);
    let multiplier = match unit {
        "" => 1,
        "k" => KIB,
        "m" => MIB,
        "g" => GIB,
        _ => return Err(anyhow!("invalid speed {:?}: unknown unit", value)),
    };
    number
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow!("invalid speed {:?}: value too large", value))
}

/// Parses a human readable duration, e.g. "2s", "10min", "1h 30m".
pub fn parse_duration(value: &str) -> anyhow::Result<std::time::Duration> {
    humantime::parse_duration(value.trim()).with_context(|| format!("invalid duration {:?}", value))
}
