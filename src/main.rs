mod api;
mod app;
mod cache;
mod commands;
mod config;
mod event;
mod logging;
mod query;
mod ui;

#[cfg(test)]
mod testing;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "roster")]
#[command(about = "A terminal admin panel for a students REST API")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./roster.yaml, then $XDG_CONFIG_HOME/roster/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL, overriding the config file
  #[arg(short, long)]
  base_url: Option<String>,

  /// Start with the student list filtered by this text
  #[arg(short, long)]
  search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(base_url) = args.base_url {
    config.api.base_url = base_url;
  }

  let _log_guard = logging::init(&config)?;
  tracing::info!(base_url = %config.api.base_url, "Starting roster");

  let transport = api::HttpTransport::new(&config)?;
  let cache = cache::QueryCache::new(Arc::new(transport)).with_stale_time(config.cache.stale_time());
  let students = api::StudentsApi::new(cache);

  // Initialize and run the app
  let mut app = app::App::new(&config, students, args.search);
  app.run().await?;

  Ok(())
}
