//! File logging. The terminal belongs to the TUI, so tracing output goes to
//! `<data dir>/roster/roster.log`.

use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Install the global subscriber. Keep the guard alive until exit so buffered
/// lines get flushed.
pub fn init(config: &Config) -> Result<WorkerGuard> {
  let dir = Config::data_dir()?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(&dir, "roster.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter(config.log_level.as_deref()))
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}

/// RUST_LOG wins; otherwise the configured level, otherwise `info`.
fn env_filter(configured: Option<&str>) -> EnvFilter {
  EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(configured.unwrap_or("info")))
    .unwrap_or_else(|_| EnvFilter::new("info"))
}
