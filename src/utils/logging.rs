//! Logging Module
//!
//! Structured logging on top of the `tracing` crate, plus the progress
//! reporter used while walking a dataset.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include the target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Debug output with module paths
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Warnings and errors only
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Warn,
            ..Self::default()
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Parse a level name, falling back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Initialize the global subscriber
///
/// Fails if a global subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Periodic "Processed i/N" reporter for long-running walks
pub struct ProgressLogger {
    total: usize,
    current: usize,
    log_interval: usize,
    start_time: Instant,
}

impl ProgressLogger {
    /// Create a reporter that logs every `log_interval` items
    pub fn new(total: usize, log_interval: usize) -> Self {
        Self {
            total,
            current: 0,
            log_interval: log_interval.max(1),
            start_time: Instant::now(),
        }
    }

    /// Number of items reported so far
    pub fn current(&self) -> usize {
        self.current
    }

    /// Whether the given processed count falls on a reporting boundary
    pub fn should_log(&self, count: usize) -> bool {
        count > 0 && count % self.log_interval == 0
    }

    /// Increment progress by one item, logging on interval boundaries
    pub fn increment(&mut self) {
        self.current += 1;

        if self.should_log(self.current) {
            tracing::info!("{}", self.progress_line());
        }
    }

    /// Render the current progress line
    pub fn progress_line(&self) -> String {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let items_per_sec = if elapsed > 0.0 {
            self.current as f64 / elapsed
        } else {
            0.0
        };

        let eta = if items_per_sec > 0.0 {
            let remaining = self.total.saturating_sub(self.current);
            format!("{:.0}s", remaining as f64 / items_per_sec)
        } else {
            "N/A".to_string()
        };

        format!(
            "Processed {}/{} - {:.1} images/s - ETA: {}",
            self.current, self.total, items_per_sec, eta
        )
    }

    /// Seconds since the reporter was created
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}
