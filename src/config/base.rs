//! Base configuration file and its defaults list.
//!
//! ```yaml
//! defaults:
//!   - connection: postgres
//!   - structure: iris
//!   - hyperparameters: medium
//!   - _self_
//!
//! experiment: baseline
//! ```
//!
//! Each defaults entry is a single-key mapping naming a group and a variant
//! (or `null` for "declared but unselected"). The string `_self_` marks where
//! the file's own keys are merged relative to the group fragments; without
//! it the file's keys come first and fragments are layered on top.

use crate::config::registry::kind_of;
use crate::error::{ResolveError, ResolveResult};
use serde_json::{Map, Value};
use std::path::Path;

/// Key holding the defaults list in the base file.
pub const DEFAULTS_KEY: &str = "defaults";

/// Defaults list entry marking the position of the base file's own keys.
pub const SELF_ENTRY: &str = "_self_";

/// One entry of the defaults list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultsEntry {
    /// `group: variant`, or `group: null` for no selection.
    Group {
        group: String,
        variant: Option<String>,
    },
    /// `_self_`
    SelfRef,
}

impl DefaultsEntry {
    pub fn group(group: impl Into<String>, variant: impl Into<String>) -> Self {
        DefaultsEntry::Group {
            group: group.into(),
            variant: Some(variant.into()),
        }
    }
}

/// The top-level config file: defaults list plus its own keys.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseConfig {
    pub name: String,
    pub defaults: Vec<DefaultsEntry>,
    /// The file's own keys, defaults list excluded.
    pub body: Value,
}

impl BaseConfig {
    /// An empty base with the given defaults list.
    pub fn with_defaults(defaults: Vec<DefaultsEntry>) -> Self {
        Self {
            name: "config".to_string(),
            defaults,
            body: Value::Object(Map::new()),
        }
    }

    /// Load `<dir>/<name>.yaml` (or `.yml`).
    pub fn load(dir: &Path, name: &str) -> ResolveResult<Self> {
        let yaml = dir.join(format!("{}.yaml", name));
        let path = if yaml.exists() {
            yaml
        } else {
            dir.join(format!("{}.yml", name))
        };
        let text = std::fs::read_to_string(&path).map_err(|source| ResolveError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_yaml(name, &text)
    }

    pub fn from_yaml(name: &str, text: &str) -> ResolveResult<Self> {
        let value: Value = serde_yaml::from_str(text).map_err(|e| {
            let (line, column) = e
                .location()
                .map(|l| (l.line(), l.column()))
                .unwrap_or((0, 0));
            ResolveError::BaseParse {
                name: name.to_string(),
                line,
                column,
                message: e.to_string(),
            }
        })?;

        let mut body = match value {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(ResolveError::BaseParse {
                    name: name.to_string(),
                    line: 1,
                    column: 1,
                    message: format!(
                        "expected a mapping at the top level, found {}",
                        kind_of(&other)
                    ),
                });
            }
        };

        let defaults = match body.remove(DEFAULTS_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| parse_entry(name, entry))
                .collect::<ResolveResult<Vec<_>>>()?,
            Some(other) => {
                return Err(invalid_defaults(
                    name,
                    format!("'defaults' must be a sequence, found {}", kind_of(&other)),
                ));
            }
        };

        Ok(Self {
            name: name.to_string(),
            defaults,
            body: Value::Object(body),
        })
    }

    /// Groups listed before `_self_`, or `None` if `_self_` is absent.
    pub fn groups_before_self(&self) -> Option<Vec<&str>> {
        let position = self
            .defaults
            .iter()
            .position(|e| *e == DefaultsEntry::SelfRef)?;
        Some(
            self.defaults[..position]
                .iter()
                .filter_map(|e| match e {
                    DefaultsEntry::Group { group, .. } => Some(group.as_str()),
                    DefaultsEntry::SelfRef => None,
                })
                .collect(),
        )
    }
}

fn parse_entry(name: &str, entry: &Value) -> ResolveResult<DefaultsEntry> {
    match entry {
        Value::String(s) if s == SELF_ENTRY => Ok(DefaultsEntry::SelfRef),
        Value::Object(map) if map.len() == 1 => {
            let Some((group, variant)) = map.iter().next() else {
                return Err(invalid_defaults(name, "empty defaults entry"));
            };
            let variant = match variant {
                Value::Null => None,
                Value::String(v) => Some(v.clone()),
                other => {
                    return Err(invalid_defaults(
                        name,
                        format!(
                            "variant for group '{}' must be a name or null, found {}",
                            group,
                            kind_of(other)
                        ),
                    ));
                }
            };
            Ok(DefaultsEntry::Group {
                group: group.clone(),
                variant,
            })
        }
        other => Err(invalid_defaults(
            name,
            format!(
                "entries must be '{}' or a single 'group: variant' mapping, found {}",
                SELF_ENTRY,
                kind_of(other)
            ),
        )),
    }
}

fn invalid_defaults(name: &str, message: impl Into<String>) -> ResolveError {
    ResolveError::BaseParse {
        name: name.to_string(),
        line: 0,
        column: 0,
        message: message.into(),
    }
}
