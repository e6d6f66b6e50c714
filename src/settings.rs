//! Tool settings with tier-based merging.
//!
//! Tiers, lowest to highest priority:
//! 1. **Defaults** - [`Settings::default`]
//! 2. **Project** - `./confgraph.yaml`
//! 3. **User** - `~/.confgraph/settings.yaml`
//! 4. **Environment** - `CONFGRAPH_CONFIG_DIR`, `CONFGRAPH_CONFIG_NAME`,
//!    `CONFGRAPH_SCHEMA`, `CONFGRAPH_MAX_PARALLEL`
//!
//! File tiers are deep-merged field by field. Command-line flags are applied
//! on top by the binary.

use crate::config::deep_merge_all;
use crate::format::OutputFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SettingsTier {
    Defaults = 0,
    Project = 1,
    User = 2,
    Environment = 3,
}

impl std::fmt::Display for SettingsTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsTier::Defaults => write!(f, "defaults"),
            SettingsTier::Project => write!(f, "project"),
            SettingsTier::User => write!(f, "user"),
            SettingsTier::Environment => write!(f, "environment"),
        }
    }
}

/// Where `confgraph` finds its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the base config and one directory per group.
    pub config_dir: PathBuf,
    /// Base config file name, without extension.
    pub config_name: String,
    /// Schema document; the built-in training schema when unset.
    pub schema: Option<PathBuf>,
    pub output: OutputFormat,
    /// Upper bound on concurrently composed sweep combinations.
    pub max_parallel: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("config"),
            config_name: "config".to_string(),
            schema: None,
            output: OutputFormat::Yaml,
            max_parallel: 4,
        }
    }
}

/// Settings files for each tier.
#[derive(Debug, Clone)]
pub struct SettingsPaths {
    pub project_file: Option<PathBuf>,
    pub user_file: Option<PathBuf>,
}

impl Default for SettingsPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl SettingsPaths {
    pub fn discover() -> Self {
        Self {
            project_file: Some(PathBuf::from("confgraph.yaml")),
            user_file: dirs::home_dir().map(|h| h.join(".confgraph").join("settings.yaml")),
        }
    }

    pub fn with_files(project_file: Option<PathBuf>, user_file: Option<PathBuf>) -> Self {
        Self {
            project_file,
            user_file,
        }
    }
}

/// Loads [`Settings`] from all tiers.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    pub paths: SettingsPaths,
    settings: Settings,
    sources: Vec<PathBuf>,
}

impl SettingsLoader {
    /// Load from discovered paths and the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(SettingsPaths::discover(), |key| std::env::var(key).ok())
    }

    /// Load from explicit paths; `env` stands in for the process environment.
    pub fn load_with(paths: SettingsPaths, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut tiers: Vec<Value> = vec![
            serde_json::to_value(Settings::default()).context("failed to encode default settings")?,
        ];
        let mut sources = Vec::new();

        for (tier, file) in [
            (SettingsTier::Project, &paths.project_file),
            (SettingsTier::User, &paths.user_file),
        ] {
            let Some(file) = file else { continue };
            if let Some(value) = read_tier(file)? {
                debug!(tier = %tier, path = %file.display(), "Loaded settings tier");
                tiers.push(value);
                sources.push(file.clone());
            }
        }

        let merged = deep_merge_all(tiers);
        let mut settings: Settings =
            serde_json::from_value(merged).context("invalid settings")?;
        apply_env(&mut settings, env)?;

        Ok(Self {
            paths,
            settings,
            sources,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Settings files that contributed, lowest tier first.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

fn read_tier(file: &Path) -> Result<Option<Value>> {
    if !file.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok((!value.is_null()).then_some(value))
}

/// Apply environment variable overrides.
pub fn apply_env(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(dir) = env("CONFGRAPH_CONFIG_DIR") {
        settings.config_dir = PathBuf::from(dir);
    }
    if let Some(name) = env("CONFGRAPH_CONFIG_NAME") {
        settings.config_name = name;
    }
    if let Some(schema) = env("CONFGRAPH_SCHEMA") {
        settings.schema = Some(PathBuf::from(schema));
    }
    if let Some(max_parallel) = env("CONFGRAPH_MAX_PARALLEL") {
        settings.max_parallel = max_parallel
            .parse()
            .with_context(|| format!("CONFGRAPH_MAX_PARALLEL must be a number, got '{}'", max_parallel))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_load_defaults_only() {
        let temp = TempDir::new().unwrap();
        let paths = SettingsPaths::with_files(
            Some(temp.path().join("confgraph.yaml")),
            Some(temp.path().join("user").join("settings.yaml")),
        );
        let loader = SettingsLoader::load_with(paths, no_env).unwrap();
        assert_eq!(loader.settings(), &Settings::default());
        assert!(loader.sources().is_empty());
    }

    #[test]
    fn test_user_tier_overrides_project_field_by_field() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("confgraph.yaml");
        let user = temp.path().join("settings.yaml");
        std::fs::write(&project, "config_dir: conf\nmax_parallel: 8\n").unwrap();
        std::fs::write(&user, "max_parallel: 2\noutput: json\n").unwrap();

        let paths = SettingsPaths::with_files(Some(project), Some(user));
        let settings = SettingsLoader::load_with(paths, no_env)
            .unwrap()
            .into_settings();
        assert_eq!(settings.config_dir, PathBuf::from("conf"));
        assert_eq!(settings.config_name, "config");
        assert_eq!(settings.max_parallel, 2);
        assert_eq!(settings.output, OutputFormat::Json);
    }

    #[test]
    fn test_empty_file_keeps_lower_tiers() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("confgraph.yaml");
        std::fs::write(&project, "").unwrap();
        let paths = SettingsPaths::with_files(Some(project), None);
        let settings = SettingsLoader::load_with(paths, no_env)
            .unwrap()
            .into_settings();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_environment_wins() {
        let env: HashMap<&str, &str> = [
            ("CONFGRAPH_CONFIG_DIR", "/srv/conf"),
            ("CONFGRAPH_SCHEMA", "schema.yaml"),
            ("CONFGRAPH_MAX_PARALLEL", "16"),
        ]
        .into_iter()
        .collect();
        let paths = SettingsPaths::with_files(None, None);
        let settings = SettingsLoader::load_with(paths, |k| env.get(k).map(|v| v.to_string()))
            .unwrap()
            .into_settings();
        assert_eq!(settings.config_dir, PathBuf::from("/srv/conf"));
        assert_eq!(settings.schema, Some(PathBuf::from("schema.yaml")));
        assert_eq!(settings.max_parallel, 16);
    }

    #[test]
    fn test_bad_values_are_errors() {
        let mut settings = Settings::default();
        let err = apply_env(&mut settings, |k| {
            (k == "CONFGRAPH_MAX_PARALLEL").then(|| "many".to_string())
        });
        assert!(err.is_err());

        let temp = TempDir::new().unwrap();
        let project = temp.path().join("confgraph.yaml");
        std::fs::write(&project, "max_parallel: [1\n").unwrap();
        let paths = SettingsPaths::with_files(Some(project), None);
        assert!(SettingsLoader::load_with(paths, no_env).is_err());
    }
}
