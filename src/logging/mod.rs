//! Logging infrastructure - structured tracing throughout the projection layer
//!
//! Design: Uses `tracing` with per-component targets:
//! - `interop::table` - interface table construction
//! - `interop::factory` - factory resolution and proxy construction
//! - `interop::classifier` - free-threaded classification
//! - `gc::registry` - identity registry inserts and sweeps
//! - `ffi` - function-table allocation and capability queries
//!
//! Nothing is emitted until a subscriber is installed with `init` or
//! `init_with_config`.

use once_cell::sync::OnceCell;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

pub use tracing::{debug, error, info, trace, warn, Level};

use crate::config::LoggingSection;
use crate::core::Guid;

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    /// Also write to this file (non-blocking)
    pub log_path: Option<PathBuf>,
    /// JSON lines instead of human-readable output
    pub json_format: bool,
    /// Emit span enter/close events
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

fn parse_level(text: &str) -> Level {
    match text.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // WINRT_PROJECTION_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("WINRT_PROJECTION_LOG_LEVEL") {
            config.level = parse_level(&level);
        }

        if let Ok(path) = std::env::var("WINRT_PROJECTION_LOG_FILE") {
            config.log_path = Some(PathBuf::from(path));
        }

        config.json_format = std::env::var("WINRT_PROJECTION_LOG_JSON").is_ok();
        config.show_spans = std::env::var("WINRT_PROJECTION_LOG_SPANS").is_ok();

        config
    }

    /// Verbose config for diagnosing projection issues
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: None,
            json_format: false,
            show_spans: true,
        }
    }
}

impl From<&LoggingSection> for LogConfig {
    fn from(section: &LoggingSection) -> Self {
        Self {
            level: parse_level(&section.level),
            log_path: section.file.clone(),
            json_format: section.json,
            show_spans: section.show_spans,
        }
    }
}

/// Initialize logging from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging once; later calls are no-ops
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "winrt_projection={}",
                config.level.as_str().to_lowercase()
            ))
        });

        let span_events = if config.show_spans {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let console = if config.json_format {
            fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_span_events(span_events.clone())
                .boxed()
        } else {
            fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_span_events(span_events.clone())
                .with_target(true)
                .with_thread_ids(cfg!(debug_assertions))
                .with_line_number(cfg!(debug_assertions))
                .boxed()
        };

        let file = config.log_path.as_ref().and_then(|path| {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty())?;
            let name = path.file_name()?;
            let appender = tracing_appender::rolling::never(directory, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_span_events(span_events)
                    .boxed(),
            )
        });

        // Another subscriber may already be installed by the host
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .with(file)
            .try_init();
    });
}

pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

// ============================================================================
// Projection-specific logging functions
// ============================================================================

/// Log interface table construction
pub fn log_table_built(ty: &str, entries: usize, custom_marshal: bool) {
    debug!(
        target: "interop::table",
        event = "table_built",
        ty,
        entries,
        custom_marshal,
        "interface table built"
    );
}

/// Log factory selection
pub fn log_factory_resolved(key: &str, strategy: &str) {
    debug!(
        target: "interop::factory",
        event = "factory_resolved",
        key,
        strategy,
        "factory resolved"
    );
}

/// Log a class name that could not be mapped to a type
pub fn log_resolution_fallback(class_name: &str) {
    debug!(
        target: "interop::factory",
        event = "resolution_fallback",
        class_name,
        "class name not resolvable, using identity factory"
    );
}

/// Log free-threaded classification
pub fn log_classification(iid: &Guid, free_threaded: bool) {
    trace!(
        target: "interop::classifier",
        event = "classified",
        iid = %iid,
        free_threaded,
        "reference classified"
    );
}

/// Log registry sweep results
pub fn log_sweep(removed: usize, remaining: usize) {
    debug!(
        target: "gc::registry",
        event = "sweep",
        removed,
        remaining,
        "registry swept"
    );
}

/// Log a failure translated at a native entry point
pub fn log_boundary_error(function: &str, error: &str) {
    warn!(
        target: "ffi",
        event = "boundary_error",
        function,
        error,
        "native entry point failed"
    );
}

/// Performance tracking utilities
pub mod perf {
    use std::time::Instant;
    use tracing::debug;

    /// Track operation duration (returns guard that logs on drop)
    #[must_use]
    pub fn track(operation: &'static str) -> PerformanceGuard {
        PerformanceGuard {
            operation,
            start: Instant::now(),
        }
    }

    pub struct PerformanceGuard {
        operation: &'static str,
        start: Instant,
    }

    impl Drop for PerformanceGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            debug!(
                operation = self.operation,
                duration_us = elapsed.as_micros() as u64,
                "operation completed"
            );
        }
    }
}
