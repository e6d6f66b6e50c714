//! Groups subcommand for confgraph CLI

use crate::config::ConfigGroupRegistry;
use crate::format::format_groups;
use crate::settings::Settings;
use anyhow::Result;
use clap::Args;

/// Arguments for the groups subcommand
#[derive(Args, Debug)]
pub struct GroupsArgs {
    /// Group whose variants to list (all groups if omitted)
    #[arg(value_name = "GROUP")]
    pub group: Option<String>,
}

pub fn run(settings: &Settings, args: &GroupsArgs) -> Result<String> {
    let registry = ConfigGroupRegistry::discover(&settings.config_dir)?;
    Ok(format_groups(&registry, args.group.as_deref())?)
}
