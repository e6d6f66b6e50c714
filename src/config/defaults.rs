//! Defaults resolution: which variant is active per group.
//!
//! Precedence, lowest to highest:
//! 1. **Defaults list** in declaration order, last entry for a group wins
//! 2. **Group overrides** (`group=variant`), last override wins
//! 3. **Implicit default** for required groups still unselected: the variant
//!    named like the group, if it exists

use super::base::DefaultsEntry;
use super::overrides::OverrideSpec;
use super::registry::ConfigGroupRegistry;
use crate::error::{ResolveError, ResolveResult};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Where a selection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SelectionOrigin {
    Defaults,
    Override,
    Implicit,
}

impl std::fmt::Display for SelectionOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionOrigin::Defaults => write!(f, "defaults"),
            SelectionOrigin::Override => write!(f, "override"),
            SelectionOrigin::Implicit => write!(f, "implicit"),
        }
    }
}

/// One active (group, variant) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub group: String,
    pub variant: String,
    pub origin: SelectionOrigin,
}

/// Active variants in merge order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selections(Vec<Selection>);

impl Selections {
    pub fn get(&self, group: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|s| s.group == group)
            .map(|s| s.variant.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selection> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Group to variant, sorted by group.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|s| (s.group.clone(), s.variant.clone()))
            .collect()
    }
}

/// Resolve the active variant of every group.
///
/// `required_groups` are groups some typed node needs; each must end up with
/// a selection. Every selection is checked against the registry.
pub fn resolve(
    defaults: &[DefaultsEntry],
    overrides: &[OverrideSpec],
    required_groups: &[String],
    registry: &ConfigGroupRegistry,
) -> ResolveResult<Selections> {
    let mut order: Vec<String> = Vec::new();
    let mut chosen: Chosen = HashMap::new();

    for entry in defaults {
        if let DefaultsEntry::Group { group, variant } = entry {
            choose(&mut order, &mut chosen, group, variant.clone(), SelectionOrigin::Defaults);
        }
    }

    for spec in overrides {
        if let OverrideSpec::GroupSelection { group, variant } = spec {
            choose(
                &mut order,
                &mut chosen,
                group,
                Some(variant.clone()),
                SelectionOrigin::Override,
            );
        }
    }

    for group in required_groups {
        let selected = chosen.get(group).is_some_and(|(v, _)| v.is_some());
        if selected {
            continue;
        }
        if registry.has_variant(group, group) {
            debug!(group = %group, "Using implicit default variant");
            choose(
                &mut order,
                &mut chosen,
                group,
                Some(group.clone()),
                SelectionOrigin::Implicit,
            );
        } else {
            return Err(ResolveError::MissingSelection {
                group: group.clone(),
            });
        }
    }

    let mut selections = Vec::with_capacity(order.len());
    for group in order {
        let Some((Some(variant), origin)) = chosen.remove(&group) else {
            continue;
        };
        let config_group = registry.group(&group)?;
        if !config_group.has_variant(&variant) {
            return Err(ResolveError::UnknownVariant {
                group,
                variant,
                available: config_group.variant_names(),
            });
        }
        selections.push(Selection {
            group,
            variant,
            origin,
        });
    }

    Ok(Selections(selections))
}

type Chosen = HashMap<String, (Option<String>, SelectionOrigin)>;

fn choose(
    order: &mut Vec<String>,
    chosen: &mut Chosen,
    group: &str,
    variant: Option<String>,
    origin: SelectionOrigin,
) {
    match chosen.get(group) {
        Some((previous, _)) => debug!(
            group = %group,
            previous = ?previous,
            variant = ?variant,
            origin = %origin,
            "Selection shadowed"
        ),
        None => order.push(group.to_string()),
    }
    chosen.insert(group.to_string(), (variant, origin));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ConfigGroupRegistry {
        ConfigGroupRegistry::in_memory([
            ("connection", "postgres", "driver: postgresql"),
            ("connection", "sqlite", "driver: sqlite"),
            ("hyperparameters", "small", "max_depth: 2"),
            ("hyperparameters", "large", "max_depth: 8"),
            ("structure", "structure", "target: {}"),
            ("model", "gbm", "kind: gbm"),
        ])
    }

    fn select(group: &str, variant: &str) -> OverrideSpec {
        OverrideSpec::GroupSelection {
            group: group.into(),
            variant: variant.into(),
        }
    }

    #[test]
    fn test_last_defaults_entry_wins() {
        let defaults = vec![
            DefaultsEntry::group("hyperparameters", "small"),
            DefaultsEntry::group("hyperparameters", "large"),
        ];
        let selections = resolve(&defaults, &[], &[], &registry()).unwrap();
        assert_eq!(selections.get("hyperparameters"), Some("large"));
        assert_eq!(selections.len(), 1);
    }

    #[test]
    fn test_override_beats_defaults_regardless_of_order() {
        let defaults = vec![
            DefaultsEntry::group("connection", "postgres"),
            DefaultsEntry::group("connection", "postgres"),
        ];
        let selections =
            resolve(&defaults, &[select("connection", "sqlite")], &[], &registry()).unwrap();
        assert_eq!(selections.get("connection"), Some("sqlite"));
        assert_eq!(
            selections.iter().next().unwrap().origin,
            SelectionOrigin::Override
        );
    }

    #[test]
    fn test_merge_order_follows_first_appearance() {
        let defaults = vec![
            DefaultsEntry::group("connection", "postgres"),
            DefaultsEntry::group("hyperparameters", "small"),
            DefaultsEntry::group("connection", "sqlite"),
        ];
        let selections = resolve(&defaults, &[select("model", "gbm")], &[], &registry()).unwrap();
        let groups: Vec<&str> = selections.iter().map(|s| s.group.as_str()).collect();
        assert_eq!(groups, vec!["connection", "hyperparameters", "model"]);
    }

    #[test]
    fn test_implicit_default_and_missing_selection() {
        let required = vec!["structure".to_string()];
        let selections = resolve(&[], &[], &required, &registry()).unwrap();
        assert_eq!(selections.get("structure"), Some("structure"));
        assert_eq!(
            selections.iter().next().unwrap().origin,
            SelectionOrigin::Implicit
        );

        let required = vec!["connection".to_string()];
        assert!(matches!(
            resolve(&[], &[], &required, &registry()),
            Err(ResolveError::MissingSelection { ref group }) if group == "connection"
        ));
    }

    #[test]
    fn test_null_default_leaves_group_unselected() {
        let defaults = vec![DefaultsEntry::Group {
            group: "connection".into(),
            variant: None,
        }];
        let selections = resolve(&defaults, &[], &[], &registry()).unwrap();
        assert!(selections.is_empty());

        let required = vec!["connection".to_string()];
        assert!(matches!(
            resolve(&defaults, &[], &required, &registry()),
            Err(ResolveError::MissingSelection { .. })
        ));
    }

    #[test]
    fn test_unknown_group_and_variant() {
        assert!(matches!(
            resolve(&[DefaultsEntry::group("optimizer", "adam")], &[], &[], &registry()),
            Err(ResolveError::UnknownGroup { .. })
        ));
        assert!(matches!(
            resolve(&[], &[select("connection", "mysql")], &[], &registry()),
            Err(ResolveError::UnknownVariant { .. })
        ));
    }
}
