mod api;
mod app;
mod charts;
mod chunked;
mod config;
mod controls;
mod date;
mod event;
mod feature;
mod logging;
mod map;
mod network;
mod projection;
mod region;
mod statistics;
mod store;
mod sync;
mod ui;

use chrono::NaiveDate;
use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "skredview")]
#[command(about = "A terminal dashboard for avalanche events")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/skredview/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// First day of the date range (yyyy-mm-dd), overrides the stored value
  #[arg(long = "date-from")]
  date_from: Option<NaiveDate>,

  /// Day after the last day of the date range (yyyy-mm-dd)
  #[arg(long = "date-to")]
  date_to: Option<NaiveDate>,

  /// Region to select on startup
  #[arg(long = "region-id")]
  region_id: Option<u32>,

  /// Log file (default: $XDG_DATA_HOME/skredview/skredview.log)
  #[arg(long)]
  log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Keep the guard alive so buffered log lines are flushed on exit
  let _log_guard = logging::init(args.log_file.as_deref())?;

  let config = config::Config::load(args.config.as_deref())?;

  let overrides = controls::StartupOverrides {
    date_from: args.date_from,
    date_to: args.date_to,
    region_id: args.region_id,
  };

  let mut app = app::App::new(config, overrides)?;
  app.run().await?;

  Ok(())
}
