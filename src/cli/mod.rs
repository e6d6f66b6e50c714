//! CLI command definitions for confgraph
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod compose;
pub mod groups;
pub mod key;

use crate::compose::Composer;
use crate::schema::{SchemaCatalog, builtin};
use crate::settings::Settings;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use compose::ComposeArgs;
use groups::GroupsArgs;
use key::KeyArgs;
use std::path::PathBuf;

/// Compose typed configurations from config groups and overrides
#[derive(Parser, Debug)]
#[command(name = "confgraph", author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the base config and group directories
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Base config name, without extension
    #[arg(long, global = true, value_name = "NAME")]
    pub config_name: Option<String>,

    /// Schema document (built-in training schema if not given)
    #[arg(long, global = true, value_name = "FILE")]
    pub schema: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compose one configuration, or a sweep with --multirun
    Compose(ComposeArgs),

    /// List config groups, or the variants of one group
    Groups(GroupsArgs),

    /// Print cache keys for attribute paths of a composed configuration
    Key(KeyArgs),
}

impl Cli {
    /// Apply command-line flags over loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.config_dir {
            settings.config_dir = dir.clone();
        }
        if let Some(name) = &self.config_name {
            settings.config_name = name.clone();
        }
        if let Some(schema) = &self.schema {
            settings.schema = Some(schema.clone());
        }
    }
}

/// Load the schema document named by the settings, or the built-in one.
pub fn load_catalog(settings: &Settings) -> Result<SchemaCatalog> {
    match &settings.schema {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read schema {}", path.display()))?;
            SchemaCatalog::from_yaml(&source)
                .with_context(|| format!("invalid schema {}", path.display()))
        }
        None => builtin::training().context("built-in schema is invalid"),
    }
}

/// Build a composer from the settings' config directory and schema.
pub fn load_composer(settings: &Settings) -> Result<Composer> {
    let catalog = load_catalog(settings)?;
    Composer::from_dir(&settings.config_dir, &settings.config_name, catalog).with_context(|| {
        format!(
            "failed to load config '{}' from {}",
            settings.config_name,
            settings.config_dir.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compose_command() {
        let cli = Cli::parse_from([
            "confgraph",
            "--config-dir",
            "conf",
            "compose",
            "hyperparameters=small,large",
            "-m",
            "--key",
            "connection",
        ]);
        let Command::Compose(args) = &cli.command else {
            panic!("expected compose");
        };
        assert!(args.multirun);
        assert_eq!(args.overrides, vec!["hyperparameters=small,large"]);
        assert_eq!(args.keys, vec!["connection"]);

        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.config_dir, PathBuf::from("conf"));
        assert_eq!(settings.config_name, "config");
    }

    #[test]
    fn test_parse_key_command_with_overrides() {
        let cli = Cli::parse_from([
            "confgraph",
            "key",
            "connection",
            "hyperparameters",
            "--",
            "hyperparameters=large",
        ]);
        let Command::Key(args) = &cli.command else {
            panic!("expected key");
        };
        assert_eq!(args.paths, vec!["connection", "hyperparameters"]);
        assert_eq!(args.overrides, vec!["hyperparameters=large"]);
    }

    #[test]
    fn test_builtin_catalog_when_no_schema() {
        let catalog = load_catalog(&Settings::default()).unwrap();
        assert_eq!(catalog.root_name(), "Configuration");
    }
}
