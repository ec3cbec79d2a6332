//! Process logging: `tracing-subscriber` setup and structured event macros
//!
//! Everything here goes to stderr or a log file. The user-facing output
//! channel is separate (see [`crate::extension::host::log_client`]).

use std::env;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level filter (e.g., "debug", "info", "warn", "error")
    pub level: String,
    /// Optional log file path. If None, logs only to stderr
    pub file_path: Option<PathBuf>,
    /// Whether to use structured JSON format for logs
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Read `RUST_LOG` and the `RUBOCOP_CLIENT_LOG_*` variables
    pub fn from_env() -> Self {
        let flag = |name: &str| env::var(name).is_ok_and(|value| value == "true");

        let file_path = env::var("RUBOCOP_CLIENT_LOG_FILE").ok().map(PathBuf::from);
        let file_path = match file_path {
            Some(path) if flag("RUBOCOP_CLIENT_LOG_UNIQUE") => Some(with_pid_suffix(path)),
            other => other,
        };

        Self {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            file_path,
            json_format: flag("RUBOCOP_CLIENT_LOG_JSON"),
        }
    }

    /// CLI arguments win over the environment
    pub fn with_overrides(mut self, level: Option<String>, file_path: Option<PathBuf>) -> Self {
        if let Some(level) = level {
            self.level = level;
        }
        if file_path.is_some() {
            self.file_path = file_path;
        }
        self
    }
}

/// `client.log` becomes `client.<pid>.log`
fn with_pid_suffix(mut path: PathBuf) -> PathBuf {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return path;
    };
    let pid = std::process::id();
    let name = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{stem}.{pid}.{ext}"),
        _ => format!("{stem}.{pid}"),
    };
    path.set_file_name(name);
    path
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn output_layer<W>(writer: W, json: bool, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .boxed()
    }
}

/// Install the global subscriber; a bad level falls back to `info`
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_new(&config.level).or_else(|_| EnvFilter::try_new("info"))?;

    let layer = match &config.file_path {
        Some(file_path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)?;
            output_layer(Arc::new(file), config.json_format, false)
        }
        None => output_layer(io::stderr, config.json_format, true),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .try_init()?;
    Ok(())
}

/// One event per JSON-RPC message, with its direction and method
#[macro_export]
macro_rules! log_lsp_message {
    ($level:expr, $direction:expr, $method:expr, $data:expr) => {
        tracing::event!(
            $level,
            direction = $direction,
            method = $method,
            data = ?$data,
            pid = std::process::id(),
            "LSP message"
        );
    };
}

/// Duration of a named operation
#[macro_export]
macro_rules! log_timing {
    ($level:expr, $operation:expr, $duration:expr) => {
        tracing::event!(
            $level,
            operation = $operation,
            duration_ms = $duration.as_millis(),
            pid = std::process::id(),
            "Performance timing"
        );
    };
}
