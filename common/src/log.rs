use std::io;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: once_cell::sync::OnceCell<()> = once_cell::sync::OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Console,
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: Level,
    pub format: LogFormat,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions { level: Level::INFO, format: LogFormat::Console }
    }
}

/// Initializes the global tracing subscriber. Idempotent: a second call
/// (e.g. from tests) is a no-op.
pub fn init_tracing(opts: LogOptions) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(opts.level.to_string()));

        let subscriber = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_writer(io::stdout);

        let result = match opts.format {
            LogFormat::Json => subscriber.json().try_init(),
            LogFormat::Console => subscriber.compact().try_init(),
        };
        let _ = result;
    });
}
