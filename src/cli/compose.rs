//! Compose subcommand for confgraph CLI
//!
//! Resolves overrides into one configuration, or into one configuration per
//! sweep combination with `--multirun`.

use crate::compose::Composer;
use crate::format::{OutputFormat, RunReport, render_reports};
use crate::settings::Settings;
use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

/// Arguments for the compose subcommand
#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Overrides: group=variant, dotted.path=value, or key=v1,v2 with --multirun
    #[arg(value_name = "OVERRIDE")]
    pub overrides: Vec<String>,

    /// Expand multi-valued overrides into one run per combination
    #[arg(short, long)]
    pub multirun: bool,

    /// Output format: yaml or json (default from settings)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Attribute path to emit a cache key for (repeatable)
    #[arg(long = "key", value_name = "PATH")]
    pub keys: Vec<String>,

    /// Maximum combinations composed at once (default from settings)
    #[arg(long, value_name = "N")]
    pub max_parallel: Option<usize>,
}

/// Compose and render. Nothing is rendered unless every run succeeds.
pub async fn run(composer: &Composer, settings: &Settings, args: &ComposeArgs) -> Result<String> {
    let overrides = composer.parse_overrides(&args.overrides)?;

    let runs = if args.multirun {
        let max_parallel = args.max_parallel.unwrap_or(settings.max_parallel);
        let plan = composer.plan(&overrides)?;
        composer
            .sweep_concurrent(&plan, max_parallel)
            .await
            .context("sweep failed")?
    } else {
        vec![composer.compose(&overrides)?]
    };
    info!(runs = runs.len(), "Composed");

    let reports = runs
        .iter()
        .map(|run| RunReport::new(run, &args.keys))
        .collect::<Result<Vec<_>, _>>()?;
    render_reports(&reports, args.format.unwrap_or(settings.output))
}
