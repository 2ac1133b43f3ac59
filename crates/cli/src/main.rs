//! backdrop command-line entry point.
//!
//! Every subcommand prints pretty JSON on stdout. Logging goes to stderr so
//! the output stays machine-readable.

use std::path::PathBuf;

use anyhow::Result;
use backdrop_core::{AppConfig, Error};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{App, backgrounds, cache, error::ErrorOutput, render, status};

#[derive(Parser)]
#[command(name = "backdrop", version, about = "Versioned, expiring cache for background images")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the cached payload for a key
    Get { key: String },
    /// Store a payload under a key
    Put { key: String, data: String },
    /// Resolve an image through the cache
    Fetch { url: String, key: String },
    /// Remove one cached image
    Evict { key: String },
    /// Remove every cached image
    Clear,
    /// Warm the cache; uses the configured presets when no items are given
    Preload {
        /// Items as key=url
        items: Vec<String>,
    },
    /// Select a background; `none` clears the selection
    Select {
        key: String,
        /// Image locator; defaults to the preset with the same key
        #[arg(default_value = "")]
        url: String,
    },
    /// Cache a local image file and select it
    Upload { file: PathBuf },
    /// Re-apply the saved background
    Restore,
    /// Restore the saved background, then warm the presets
    Init,
    /// Show store location, version, and entry count
    Status,
    /// Show the cache version
    ///
    /// `--set` applies only to this process and is not saved. Set
    /// BACKDROP_CACHE_VERSION to change the version for every run.
    Version {
        /// Version to use for this run only
        #[arg(long)]
        set: Option<i64>,
    },
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(app: &App, command: Command) -> Result<String, Error> {
    match command {
        Command::Get { key } => render(&cache::get_impl(app, &key).await?),
        Command::Put { key, data } => render(&cache::put_impl(app, &key, &data).await?),
        Command::Fetch { url, key } => render(&cache::fetch_impl(app, &url, &key).await?),
        Command::Evict { key } => render(&cache::evict_impl(app, &key).await?),
        Command::Clear => render(&cache::clear_impl(app).await?),
        Command::Preload { items } => render(&cache::preload_impl(app, &items).await?),
        Command::Select { key, url } => render(&backgrounds::select_impl(app, &key, &url).await?),
        Command::Upload { file } => render(&backgrounds::upload_impl(app, &file).await?),
        Command::Restore => render(&backgrounds::restore_impl(app).await),
        Command::Init => render(&backgrounds::init_impl(app).await),
        Command::Status => render(&status::status_impl(app).await),
        Command::Version { set } => render(&status::version_impl(app, set).await?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::load()?;
    let app = App::new(config)?;

    let outcome = run(&app, cli.command).await;
    app.cache().store().disconnect().await;

    match outcome {
        Ok(json) => {
            println!("{json}");
            Ok(())
        }
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "command failed");
            println!("{}", render(&ErrorOutput::from(&e))?);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_version_help_names_persistent_setting() {
        let mut cli = Cli::command();
        let version = cli.find_subcommand_mut("version").unwrap();
        let help = version.render_long_help().to_string();
        assert!(help.contains("only to this process"));
        assert!(help.contains("BACKDROP_CACHE_VERSION"));
    }

    #[test]
    fn test_parse_select_without_url() {
        let cli = Cli::try_parse_from(["backdrop", "select", "bg1"]).unwrap();
        assert!(matches!(cli.command, Command::Select { ref key, ref url } if key == "bg1" && url.is_empty()));
    }
}
