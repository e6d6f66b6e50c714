//! Config group registry.
//!
//! Indexes fragments by (group, variant). On disk a group is a directory under
//! the config root and each `.yaml`/`.yml` file inside it is a variant named
//! after the file stem. Fragments are parsed on first use and cached for the
//! registry's lifetime.

use crate::error::{ResolveError, ResolveResult};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Where a variant's raw text comes from.
#[derive(Debug, Clone)]
enum VariantSource {
    File(PathBuf),
    Inline(String),
}

/// A named axis of variation and its available variants.
#[derive(Debug, Clone)]
pub struct ConfigGroup {
    pub name: String,
    variants: BTreeMap<String, VariantSource>,
}

impl ConfigGroup {
    /// Variant names, sorted.
    pub fn variant_names(&self) -> Vec<String> {
        self.variants.keys().cloned().collect()
    }

    pub fn has_variant(&self, variant: &str) -> bool {
        self.variants.contains_key(variant)
    }
}

/// A loaded fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigVariant {
    pub group: String,
    pub name: String,
    /// Top-level mapping of the fragment.
    pub content: Value,
}

/// Registry of config groups with a shared fragment cache.
///
/// The cache is the only mutable state. Concurrent readers never mutate an
/// entry; on a miss the fragment is parsed outside the lock and inserted
/// first-writer-wins, so redundant concurrent loads race harmlessly.
#[derive(Debug, Default)]
pub struct ConfigGroupRegistry {
    groups: BTreeMap<String, ConfigGroup>,
    cache: RwLock<HashMap<(String, String), Arc<ConfigVariant>>>,
}

impl ConfigGroupRegistry {
    /// Discover groups under `root`: every subdirectory is a group.
    ///
    /// A missing root yields an empty registry.
    pub fn discover(root: &Path) -> ResolveResult<Self> {
        let mut groups = BTreeMap::new();
        if !root.exists() {
            warn!(root = %root.display(), "Config directory does not exist");
            return Ok(Self::from_groups(groups));
        }

        for entry in read_dir_sorted(root)? {
            if !entry.is_dir() {
                continue;
            }
            let Some(group_name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let mut variants = BTreeMap::new();
            for file in read_dir_sorted(&entry)? {
                let is_yaml = matches!(
                    file.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                );
                if !file.is_file() || !is_yaml {
                    continue;
                }
                let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if variants.contains_key(stem) {
                    warn!(
                        group = %group_name,
                        variant = %stem,
                        ignored = %file.display(),
                        "Duplicate variant file, keeping the first"
                    );
                    continue;
                }
                variants.insert(stem.to_string(), VariantSource::File(file.clone()));
            }
            debug!(group = %group_name, variants = variants.len(), "Discovered config group");
            groups.insert(
                group_name.to_string(),
                ConfigGroup {
                    name: group_name.to_string(),
                    variants,
                },
            );
        }

        Ok(Self::from_groups(groups))
    }

    /// Build a registry from in-memory `(group, variant, yaml)` fragments.
    pub fn in_memory<I, G, V, C>(fragments: I) -> Self
    where
        I: IntoIterator<Item = (G, V, C)>,
        G: Into<String>,
        V: Into<String>,
        C: Into<String>,
    {
        let mut groups: BTreeMap<String, ConfigGroup> = BTreeMap::new();
        for (group, variant, content) in fragments {
            let group = group.into();
            groups
                .entry(group.clone())
                .or_insert_with(|| ConfigGroup {
                    name: group,
                    variants: BTreeMap::new(),
                })
                .variants
                .insert(variant.into(), VariantSource::Inline(content.into()));
        }
        Self::from_groups(groups)
    }

    fn from_groups(groups: BTreeMap<String, ConfigGroup>) -> Self {
        Self {
            groups,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Group names, sorted.
    pub fn list_groups(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn has_variant(&self, group: &str, variant: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|g| g.has_variant(variant))
    }

    pub fn group(&self, group: &str) -> ResolveResult<&ConfigGroup> {
        self.groups
            .get(group)
            .ok_or_else(|| ResolveError::UnknownGroup {
                group: group.to_string(),
            })
    }

    /// Variant names of `group`, sorted.
    pub fn list_variants(&self, group: &str) -> ResolveResult<Vec<String>> {
        Ok(self.group(group)?.variant_names())
    }

    /// Load (or fetch from cache) one fragment.
    pub fn load_variant(&self, group: &str, variant: &str) -> ResolveResult<Arc<ConfigVariant>> {
        let key = (group.to_string(), variant.to_string());
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(cached));
        }

        let config_group = self.group(group)?;
        let source = config_group
            .variants
            .get(variant)
            .ok_or_else(|| ResolveError::UnknownVariant {
                group: group.to_string(),
                variant: variant.to_string(),
                available: config_group.variant_names(),
            })?;

        let text = match source {
            VariantSource::File(path) => {
                std::fs::read_to_string(path).map_err(|source| ResolveError::Io {
                    path: path.clone(),
                    source,
                })?
            }
            VariantSource::Inline(text) => text.clone(),
        };
        let content = parse_fragment(group, variant, &text)?;
        debug!(group = %group, variant = %variant, "Loaded config fragment");

        let loaded = Arc::new(ConfigVariant {
            group: group.to_string(),
            name: variant.to_string(),
            content,
        });
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(key).or_insert(loaded)))
    }

    /// Number of fragments currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn parse_fragment(group: &str, variant: &str, text: &str) -> ResolveResult<Value> {
    let value: Value = serde_yaml::from_str(text).map_err(|e| {
        let (line, column) = e
            .location()
            .map(|l| (l.line(), l.column()))
            .unwrap_or((0, 0));
        ResolveError::FragmentParse {
            group: group.to_string(),
            variant: variant.to_string(),
            line,
            column,
            message: e.to_string(),
        }
    })?;
    match value {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(value),
        other => Err(ResolveError::FragmentParse {
            group: group.to_string(),
            variant: variant.to_string(),
            line: 1,
            column: 1,
            message: format!("expected a mapping at the top level, found {}", kind_of(&other)),
        }),
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

fn read_dir_sorted(dir: &Path) -> ResolveResult<Vec<PathBuf>> {
    let io_err = |source| ResolveError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        entries.push(entry.map_err(io_err)?.path());
    }
    entries.sort();
    Ok(entries)
}
