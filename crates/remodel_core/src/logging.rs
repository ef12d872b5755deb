//! File logging bootstrap for applications embedding the mapping layer.
//!
//! # Responsibility
//! - Start one rolling `flexi_logger` file backend per process.
//! - Capture panics as metadata-only log events.
//!
//! # Invariants
//! - Initialization is idempotent for an identical configuration and
//!   rejects any later, different configuration.
//! - Initialization never panics.
//! - Library code logs `event=... module=... status=...` lines and never
//!   attribute values.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::env::VarError;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOG_FILE_BASENAME: &str = "remodel";
const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

struct LoggingState {
    config: LogConfig,
    _logger: LoggerHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoggingError {
    #[error("unsupported log level `{0}`; expected trace|debug|info|warn|error")]
    UnsupportedLevel(String),
    #[error("invalid log directory: {0}")]
    InvalidDirectory(String),
    #[error("logging already initialized with {active}; refusing to switch to {requested}")]
    Conflict { active: String, requested: String },
    #[error("failed to start logger: {0}")]
    Backend(String),
}

/// Rolling file logger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: &'static str,
    pub log_dir: PathBuf,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl LogConfig {
    /// Normalizes `level` and requires an absolute `log_dir`.
    pub fn new(level: &str, log_dir: impl AsRef<Path>) -> Result<Self, LoggingError> {
        Ok(Self {
            level: normalize_level(level)?,
            log_dir: normalize_log_dir(log_dir.as_ref())?,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            max_files: DEFAULT_MAX_FILES,
        })
    }

    /// Reads `<PREFIX>_LOG_DIR` (required) and `<PREFIX>_LOG_LEVEL`
    /// (defaults to [`default_log_level`]).
    pub fn from_env(prefix: &str) -> Result<Self, LoggingError> {
        let dir_var = format!("{prefix}_LOG_DIR");
        let log_dir = match dotenvy::var(&dir_var) {
            Ok(value) => value,
            Err(dotenvy::Error::EnvVar(VarError::NotPresent)) => {
                return Err(LoggingError::InvalidDirectory(format!("`{dir_var}` is not set")))
            }
            Err(err) => return Err(LoggingError::InvalidDirectory(err.to_string())),
        };
        let level = dotenvy::var(format!("{prefix}_LOG_LEVEL"))
            .unwrap_or_else(|_| default_log_level().to_string());
        Self::new(&level, log_dir.trim())
    }

    fn describe(&self) -> String {
        format!("level `{}` at `{}`", self.level, self.log_dir.display())
    }
}

/// Starts file logging.
///
/// # Errors
/// - `Conflict` when logging is already active with another configuration.
/// - `InvalidDirectory` when the directory cannot be created.
/// - `Backend` when `flexi_logger` fails to start.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    if let Some(state) = LOGGING_STATE.get() {
        return ensure_same(&state.config, config);
    }

    let state = LOGGING_STATE.get_or_try_init(|| start_logger(config))?;
    ensure_same(&state.config, config)
}

/// Active `(level, log_dir)`, or `None` before initialization.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.config.level, state.config.log_dir.clone()))
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(config: &LogConfig) -> Result<LoggingState, LoggingError> {
    std::fs::create_dir_all(&config.log_dir).map_err(|err| {
        LoggingError::InvalidDirectory(format!(
            "failed to create `{}`: {err}",
            config.log_dir.display()
        ))
    })?;

    let logger = Logger::try_with_str(config.level)
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(config.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(config.max_file_size_bytes),
            Naming::Numbers,
            Cleanup::KeepLogFiles(config.max_files),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook_once();

    info!(
        "event=logging_init module=logging status=ok platform={} version={} level={} log_dir={}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION"),
        config.level,
        config.log_dir.display()
    );

    Ok(LoggingState {
        config: config.clone(),
        _logger: logger,
    })
}

fn ensure_same(active: &LogConfig, requested: &LogConfig) -> Result<(), LoggingError> {
    if active == requested {
        Ok(())
    } else {
        Err(LoggingError::Conflict {
            active: active.describe(),
            requested: requested.describe(),
        })
    }
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

fn normalize_log_dir(log_dir: &Path) -> Result<PathBuf, LoggingError> {
    if log_dir.as_os_str().is_empty() {
        return Err(LoggingError::InvalidDirectory("path is empty".to_string()));
    }
    if !log_dir.is_absolute() {
        return Err(LoggingError::InvalidDirectory(format!(
            "`{}` is not an absolute path",
            log_dir.display()
        )));
    }
    Ok(log_dir.to_path_buf())
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            panic_payload_summary(panic_info)
        );
        previous_hook(panic_info);
    }));
}

fn panic_payload_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };

    sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
}

/// Single-line, length-capped copy of `value`.
fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{
        init_logging, logging_status, normalize_level, sanitize_message, LogConfig, LoggingError,
    };

    #[test]
    fn normalize_level_accepts_known_values() {
        assert_eq!(normalize_level("INFO"), Ok("info"));
        assert_eq!(normalize_level(" warning "), Ok("warn"));
        assert_eq!(
            normalize_level("loud"),
            Err(LoggingError::UnsupportedLevel("loud".into()))
        );
    }

    #[test]
    fn config_rejects_relative_directory() {
        let err = LogConfig::new("info", "logs/dev").expect_err("relative paths must fail");
        assert!(matches!(err, LoggingError::InvalidDirectory(_)));
    }

    #[test]
    fn sanitize_message_removes_newlines_and_truncates() {
        let sanitized = sanitize_message("line1\nline2\rline3", 8);
        assert!(!sanitized.contains('\n'));
        assert!(!sanitized.contains('\r'));
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn init_is_idempotent_and_rejects_conflicts() {
        let first = tempfile::tempdir().expect("temp dir");
        let second = tempfile::tempdir().expect("temp dir");

        let config = LogConfig::new("info", first.path()).expect("valid config");
        init_logging(&config).expect("first init should succeed");
        init_logging(&config).expect("same config should be idempotent");

        let louder = LogConfig::new("debug", first.path()).expect("valid config");
        assert!(matches!(
            init_logging(&louder),
            Err(LoggingError::Conflict { .. })
        ));

        let elsewhere = LogConfig::new("info", second.path()).expect("valid config");
        assert!(matches!(
            init_logging(&elsewhere),
            Err(LoggingError::Conflict { .. })
        ));

        let (level, dir) = logging_status().expect("logging should be active");
        assert_eq!(level, "info");
        assert_eq!(dir, first.path());
    }
}
