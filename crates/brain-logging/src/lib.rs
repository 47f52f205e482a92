//! Centralized logging configuration for brain
//!
//! Wraps `tracing` and `tracing-subscriber` so every binary and integration
//! point initializes logging the same way.
//!
//! # Usage
//!
//! ```rust,ignore
//! use brain_logging::{init, LogConfig, LogOutput};
//!
//! // Simple initialization with defaults
//! init(LogConfig::default());
//!
//! // Embedded in a protocol server (stdout reserved for the protocol)
//! init(LogConfig::new().output(LogOutput::Stderr));
//!
//! // File logging for long-running processes
//! let _guard = init_with_file(LogConfig::new(), Path::new("/var/log/brain.log"));
//! ```

use std::io::IsTerminal;
use std::path::Path;

use tracing_subscriber::{fmt, EnvFilter};

// Re-export tracing macros for standardized imports
pub use tracing::{debug, error, info, span, trace, warn, Level};

// Re-export WorkerGuard for file logging lifetime management
pub use tracing_appender::non_blocking::WorkerGuard;

/// Output destination for logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOutput {
    /// Write logs to stdout (default)
    #[default]
    Stdout,
    /// Write logs to stderr (for protocol-embedded processes)
    Stderr,
}

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable debug-level logging (overrides default_level)
    pub debug: bool,
    /// Default log level when RUST_LOG is not set
    pub default_level: String,
    /// Output destination
    pub output: LogOutput,
    /// Show module target in log output
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_level: "info".to_string(),
            output: LogOutput::Stdout,
            show_target: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable debug-level logging
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Set the default log level (used when RUST_LOG is not set)
    pub fn default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    /// Set the output destination
    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Show or hide module target in log output
    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    fn build_filter(&self) -> EnvFilter {
        if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
        }
    }
}

/// Initialize the logging system with the given configuration.
///
/// Call once at startup. `RUST_LOG` overrides the configured default level.
///
/// # Panics
///
/// Panics if called more than once (tracing can only be initialized once).
pub fn init(config: LogConfig) {
    let filter = config.build_filter();
    match config.output {
        LogOutput::Stdout => {
            fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_ansi(std::io::stdout().is_terminal())
                .init();
        }
        LogOutput::Stderr => {
            fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal())
                .init();
        }
    }
}

/// Initialize logging with non-blocking file output.
///
/// The returned guard must be held for the program's lifetime or buffered
/// log lines are lost on exit.
pub fn init_with_file(config: LogConfig, path: &Path) -> std::io::Result<WorkerGuard> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "brain.log".into());

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    fmt()
        .with_env_filter(config.build_filter())
        .with_target(config.show_target)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}
