mod cli;
mod commands;

use std::fs;
use std::time::Instant;

use clap::Parser;
use codegraph::config::Config;
use codegraph::errors::GraphResult;
use console::style;
use directories::ProjectDirs;
use tracing_subscriber::fmt::time;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use cli::Cli;

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .pretty()
        .with_timer(time::UtcTime::rfc_3339());

    Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt_layer)
        .init();
}

fn main() -> GraphResult<()> {
    let now = Instant::now();
    init_tracing();

    tracing::debug!("CLI starting up");
    let cli = Cli::parse();

    let config = match ProjectDirs::from("dev", "codegraph", "codegraph") {
        Some(dirs) => {
            fs::create_dir_all(dirs.config_dir())?;
            Config::load(dirs.config_dir())?
        }
        None => Config::default(),
    };

    commands::handle_command(cli.command, &config)?;

    println!(
        "{} in {:.3}s.",
        style("Finished").green().bold(),
        now.elapsed().as_secs_f32()
    );
    Ok(())
}
