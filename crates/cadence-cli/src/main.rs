//! `cadence`: manage campaigns, import feeds and publish due posts.
//!
//! Reads `cadence.toml` (or the path given with `--config`) layered under
//! `CADENCE__*` environment variables, opens the SQLite store and runs one
//! subcommand. The result is printed to stdout as a JSON envelope:
//!
//! ```text
//! {"ok": true, "result": ...}
//! {"ok": false, "kind": "no_due_post", "message": "..."}
//! ```
//!
//! Logs go to stderr. The process exits non-zero when `ok` is false, which
//! lets a scheduler trigger `cadence publish --slot am` and alert on failure.

mod cli;
mod commands;

use std::{
  path::{Path, PathBuf},
  process::ExitCode,
};

use anyhow::Context as _;
use cadence_core::Classify;
use cadence_engine::{Engine, EngineConfig};
use cadence_store_sqlite::SqliteStore;
use clap::Parser;
use cli::Cli;
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  // Initialise tracing on stderr; stdout carries only the result.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.as_path()).required(false))
    .add_source(config::Environment::with_prefix("CADENCE").separator("__"))
    .build()
    .context("failed to read config file")?;

  let engine_cfg: EngineConfig = settings
    .try_deserialize()
    .context("failed to deserialise EngineConfig")?;

  let store_path = expand_tilde(&engine_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let engine = Engine::new(store, &engine_cfg).context("invalid engine configuration")?;

  let (envelope, code) = match commands::run(&engine, &engine_cfg, cli.command).await {
    Ok(result) => (json!({ "ok": true, "result": result }), ExitCode::SUCCESS),
    Err(e) => {
      tracing::debug!(error = ?e, "command failed");
      let failure = json!({ "ok": false, "kind": e.kind(), "message": e.to_string() });
      (failure, ExitCode::FAILURE)
    }
  };

  println!("{}", serde_json::to_string_pretty(&envelope)?);
  Ok(code)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
