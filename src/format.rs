//! Output formatting for composed runs and registry listings.

use crate::compose::RunConfiguration;
use crate::config::ConfigGroupRegistry;
use crate::error::{KeyError, ResolveResult};
use crate::instantiate::TypedNode;
use crate::keys::{self, CacheKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output format for composed configurations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format '{}'. Valid options: yaml, json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Yaml => write!(f, "yaml"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Hand-off document for one run, as consumed by task orchestrators.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub index: usize,
    pub overrides: Vec<String>,
    pub selections: BTreeMap<String, String>,
    /// Typed configuration in schema field order.
    pub config: TypedNode,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, String>,
}

impl RunReport {
    /// Build the report, keying each of `key_paths`.
    pub fn new<S: AsRef<str>>(run: &RunConfiguration, key_paths: &[S]) -> Result<Self, KeyError> {
        let keys = keys::keys_for(run.root(), key_paths)?
            .into_iter()
            .map(|(path, CacheKey { digest, .. })| (path, digest))
            .collect();
        Ok(Self {
            index: run.index(),
            overrides: run.overrides().iter().map(|o| o.to_string()).collect(),
            selections: run.selections().to_map(),
            config: run.root().clone(),
            keys,
        })
    }
}

/// Render reports. JSON emits one document per line; YAML separates
/// documents with `---`.
pub fn render_reports(reports: &[RunReport], format: OutputFormat) -> anyhow::Result<String> {
    let mut out = String::new();
    for report in reports {
        match format {
            OutputFormat::Json => {
                out.push_str(&serde_json::to_string(report)?);
                out.push('\n');
            }
            OutputFormat::Yaml => {
                out.push_str("---\n");
                out.push_str(&serde_yaml::to_string(report)?);
            }
        }
    }
    Ok(out)
}

/// List every group with its variants, or one group's variants.
pub fn format_groups(registry: &ConfigGroupRegistry, group: Option<&str>) -> ResolveResult<String> {
    let mut out = String::new();
    match group {
        Some(group) => {
            for variant in registry.list_variants(group)? {
                out.push_str(&variant);
                out.push('\n');
            }
        }
        None => {
            for group in registry.list_groups() {
                let variants = registry.list_variants(group)?;
                out.push_str(&format!("{}: {}\n", group, variants.join(", ")));
            }
        }
    }
    Ok(out)
}
