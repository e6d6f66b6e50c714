//! Key subcommand for confgraph CLI
//!
//! Prints one `path<TAB>digest` line per requested attribute path.

use crate::compose::Composer;
use crate::keys::keys_for;
use anyhow::Result;
use clap::Args;

/// Arguments for the key subcommand
#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Attribute paths to key; an empty string keys the whole configuration
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<String>,

    /// Overrides applied before keying, after `--`
    #[arg(last = true, value_name = "OVERRIDE")]
    pub overrides: Vec<String>,
}

pub fn run(composer: &Composer, args: &KeyArgs) -> Result<String> {
    let overrides = composer.parse_overrides(&args.overrides)?;
    let run = composer.compose(&overrides)?;
    let keys = keys_for(run.root(), &args.paths)?;

    let mut out = String::new();
    for path in &args.paths {
        if let Some(key) = keys.get(path) {
            out.push_str(&format!("{}\t{}\n", path, key.digest));
        }
    }
    Ok(out)
}
