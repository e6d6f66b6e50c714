//! Deep merge and composition of config fragments.
//!
//! Composition layers, lowest to highest precedence:
//! 1. **Base** - the top-level file's own keys (defaults list excluded)
//! 2. **Fragments** - each selected variant, spliced under its group's key
//! 3. **Assignments** - `dotted.path=value` overrides, each replacing exactly
//!    one value
//!
//! Mappings are merged key by key. Sequences and scalars are replaced
//! entirely, not concatenated.

use super::base::BaseConfig;
use super::defaults::Selections;
use super::overrides::OverrideSpec;
use super::registry::ConfigGroupRegistry;
use crate::error::{ConflictReason, ResolveError, ResolveResult};
use crate::path::{AttrPath, Segment};
use serde_json::{Map, Value};
use tracing::debug;

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans and nulls replace the base entirely
///
/// # Example
/// ```
/// use serde_json::json;
/// use confgraph::config::deep_merge;
///
/// let base = json!({
///     "connection": { "port": 5432, "host": "localhost" },
///     "features": ["a", "b"]
/// });
/// let overlay = json!({
///     "connection": { "port": 6432 },
///     "features": ["c"]
/// });
/// let result = deep_merge(base, overlay);
/// assert_eq!(
///     result,
///     json!({ "connection": { "port": 6432, "host": "localhost" }, "features": ["c"] })
/// );
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = if let Some(base_value) = base_map.remove(&key) {
                    deep_merge(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge multiple values in order, with later values taking precedence.
///
/// Equivalent to folding `deep_merge` over the list.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

/// Compose the raw tree for one resolution.
///
/// Fragments are spliced in selection order. Only `ScalarAssignment`
/// overrides are applied here; group selections were consumed by defaults
/// resolution.
pub fn merge(
    base: &BaseConfig,
    selections: &Selections,
    overrides: &[OverrideSpec],
    registry: &ConfigGroupRegistry,
) -> ResolveResult<Value> {
    let before_self = base.groups_before_self();
    let mut tree = Value::Object(Map::new());
    let mut body_merged = false;

    if before_self.is_none() {
        tree = deep_merge(tree, base.body.clone());
        body_merged = true;
    }

    for selection in selections.iter() {
        let listed_before_self = before_self
            .as_ref()
            .is_some_and(|groups| groups.contains(&selection.group.as_str()));
        if !body_merged && !listed_before_self {
            tree = deep_merge(tree, base.body.clone());
            body_merged = true;
        }

        let variant = registry.load_variant(&selection.group, &selection.variant)?;
        splice(&mut tree, &selection.group, variant.content.clone());
        debug!(
            group = %selection.group,
            variant = %selection.variant,
            origin = %selection.origin,
            "Merged fragment"
        );
    }

    if !body_merged {
        tree = deep_merge(tree, base.body.clone());
    }

    for spec in overrides {
        if let OverrideSpec::ScalarAssignment { path, value } = spec {
            set_path(&mut tree, path, value.clone())?;
            debug!(path = %path, "Applied assignment");
        }
    }

    Ok(tree)
}

/// Deep-merge `content` into the sub-tree named `group`.
fn splice(tree: &mut Value, group: &str, content: Value) {
    if let Value::Object(map) = tree {
        let existing = map.remove(group).unwrap_or(Value::Null);
        map.insert(group.to_string(), deep_merge(existing, content));
    }
}

/// Replace exactly the value at `path`.
///
/// Every intermediate segment must already exist as a mapping (or a sequence
/// when indexed); only the final key may be created.
pub fn set_path(tree: &mut Value, path: &AttrPath, value: Value) -> ResolveResult<()> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Err(ResolveError::invalid_override(
            &path.to_string(),
            "cannot assign to the root",
        ));
    };
    let conflict = |depth: usize, reason: ConflictReason| ResolveError::PathConflict {
        path: path.to_string(),
        at: path.prefix(depth).to_string(),
        reason,
    };

    if tree.is_null() {
        *tree = Value::Object(Map::new());
    }

    let mut current = tree;
    for (depth, segment) in parents.iter().enumerate() {
        current = match (current, segment) {
            (Value::Object(map), segment) => map
                .get_mut(&segment.as_key())
                .ok_or_else(|| conflict(depth + 1, ConflictReason::Missing))?,
            (Value::Array(items), Segment::Index(i)) => items
                .get_mut(*i)
                .ok_or_else(|| conflict(depth + 1, ConflictReason::OutOfRange))?,
            _ => return Err(conflict(depth, ConflictReason::NotAMapping)),
        };
    }

    match (current, last) {
        (Value::Object(map), segment) => {
            map.insert(segment.as_key(), value);
            Ok(())
        }
        (Value::Array(items), Segment::Index(i)) => match items.get_mut(*i) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(conflict(path.len(), ConflictReason::OutOfRange)),
        },
        _ => Err(conflict(parents.len(), ConflictReason::NotAMapping)),
    }
}
