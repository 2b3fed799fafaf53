//! vellum-admin binary.
//!
//! Reads `vellum.toml` (or the path specified with `--config`), opens the
//! SQLite store it names, runs one command and prints the result as JSON.
//!
//! ```
//! cargo run -p vellum-admin -- diff 0b6f7c52-7a0e-4f61-9d43-5d0f3c2a1e77
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vellum_admin::{AdminConfig, Command, execute};
use vellum_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Vellum store administration")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "vellum.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr; stdout carries the JSON report.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("VELLUM")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let admin_cfg: AdminConfig = settings
    .try_deserialize()
    .context("failed to deserialise AdminConfig")?;

  let store_path = expand_tilde(&admin_cfg.store_path);
  let store = SqliteStore::open_with(&store_path, admin_cfg.engine)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  tracing::debug!(?store_path, "opened store");

  let output = execute(&store, cli.command).await?;
  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
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
