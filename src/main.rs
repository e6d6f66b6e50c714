//! confgraph
//!
//! Composes typed, validated configurations from config groups, a defaults
//! list and command-line overrides, and expands multi-run sweeps.

use anyhow::Result;
use clap::Parser;
use confgraph::cli::{self, Cli, Command};
use confgraph::logging;
use confgraph::settings::SettingsLoader;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log, cli.verbose)?;

    let mut loader = SettingsLoader::load()?;
    cli.apply(loader.settings_mut());
    debug!(sources = ?loader.sources(), "Settings loaded");
    let settings = loader.into_settings();

    let output = match &cli.command {
        Command::Compose(args) => {
            let composer = cli::load_composer(&settings)?;
            cli::compose::run(&composer, &settings, args).await?
        }
        Command::Groups(args) => cli::groups::run(&settings, args)?,
        Command::Key(args) => {
            let composer = cli::load_composer(&settings)?;
            cli::key::run(&composer, args)?
        }
    };
    print!("{}", output);

    Ok(())
}
