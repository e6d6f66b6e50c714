//! Composition pipeline: defaults resolution, merge and instantiation.
//!
//! A [`Composer`] owns everything one resolution needs: the base config, the
//! fragment registry and the schema catalog. Registry and catalog are shared
//! behind `Arc`, so cloning a composer is cheap and clones may run on other
//! threads.

use crate::config::{BaseConfig, ConfigGroupRegistry, OverrideSpec, Selections, defaults, merge};
use crate::error::{KeyError, ResolveError, ResolveResult, SweepError};
use crate::instantiate::{TypedNode, instantiate};
use crate::keys::{self, CacheKey};
use crate::schema::SchemaCatalog;
use crate::sweep::{Sweep, SweepPlan};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// One fully resolved and validated configuration.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    index: usize,
    overrides: Vec<OverrideSpec>,
    selections: Selections,
    raw: Value,
    root: TypedNode,
}

impl RunConfiguration {
    /// Combination index; 0 for single runs.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The concrete overrides this run was composed with.
    pub fn overrides(&self) -> &[OverrideSpec] {
        &self.overrides
    }

    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    /// Merged tree before instantiation.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn root(&self) -> &TypedNode {
        &self.root
    }

    pub fn key_for(&self, path: &str) -> Result<CacheKey, KeyError> {
        keys::key_for(&self.root, path)
    }
}

/// Resolves overrides into [`RunConfiguration`]s.
#[derive(Debug, Clone)]
pub struct Composer {
    base: Arc<BaseConfig>,
    registry: Arc<ConfigGroupRegistry>,
    catalog: Arc<SchemaCatalog>,
}

impl Composer {
    pub fn new(
        base: BaseConfig,
        registry: impl Into<Arc<ConfigGroupRegistry>>,
        catalog: impl Into<Arc<SchemaCatalog>>,
    ) -> Self {
        Self {
            base: Arc::new(base),
            registry: registry.into(),
            catalog: catalog.into(),
        }
    }

    /// Load `<config_dir>/<config_name>.yaml` and discover groups under
    /// `config_dir`.
    pub fn from_dir(
        config_dir: &Path,
        config_name: &str,
        catalog: impl Into<Arc<SchemaCatalog>>,
    ) -> ResolveResult<Self> {
        let base = BaseConfig::load(config_dir, config_name)?;
        let registry = ConfigGroupRegistry::discover(config_dir)?;
        info!(
            config_dir = %config_dir.display(),
            config_name = %config_name,
            groups = registry.list_groups().len(),
            "Loaded config"
        );
        Ok(Self::new(base, registry, catalog))
    }

    pub fn base(&self) -> &BaseConfig {
        &self.base
    }

    pub fn registry(&self) -> &ConfigGroupRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Parse invocation arguments against this composer's groups.
    pub fn parse_overrides<S: AsRef<str>>(&self, args: &[S]) -> ResolveResult<Vec<OverrideSpec>> {
        crate::config::parse_overrides(args, |key| self.registry.has_group(key))
    }

    /// Root schema fields that name a config group.
    pub fn required_groups(&self) -> Vec<String> {
        self.catalog
            .root_node()
            .field_names()
            .filter(|name| self.registry.has_group(name))
            .map(str::to_string)
            .collect()
    }

    /// Compose a single run. Multi-valued overrides are rejected.
    pub fn compose(&self, overrides: &[OverrideSpec]) -> ResolveResult<RunConfiguration> {
        if let Some(OverrideSpec::MultiValue { target, values }) =
            overrides.iter().find(|o| o.is_multi())
        {
            return Err(ResolveError::AmbiguousSingleRun {
                target: target.to_string(),
                count: values.len(),
            });
        }
        self.run(0, overrides.to_vec())
    }

    /// Split overrides into fixed overrides and sweep axes.
    pub fn plan(&self, overrides: &[OverrideSpec]) -> ResolveResult<SweepPlan> {
        let plan = SweepPlan::new(overrides)?;
        info!(combinations = plan.len(), axes = plan.axis_count(), "Expanding sweep");
        Ok(plan)
    }

    /// Lazily expand multi-valued overrides into one run per combination.
    ///
    /// Only the plan is checked here; each combination is composed when the
    /// returned iterator reaches it.
    pub fn sweep(&self, overrides: &[OverrideSpec]) -> ResolveResult<Sweep<'_>> {
        Ok(Sweep::new(self, self.plan(overrides)?))
    }

    /// Compose every combination of `plan` on blocking workers, at most
    /// `max_parallel` in flight at a time.
    ///
    /// Results are ordered by combination index. If any combination fails, the
    /// failure with the lowest index is returned once all workers finish.
    /// Every successful run is held until the whole plan is done; iterate
    /// [`Composer::sweep`] instead to handle runs one at a time.
    pub async fn sweep_concurrent(
        &self,
        plan: &SweepPlan,
        max_parallel: usize,
    ) -> Result<Vec<RunConfiguration>, SweepError> {
        let total = plan.len();
        let max_parallel = max_parallel.max(1);
        debug!(combinations = total, max_parallel = max_parallel, "Composing sweep concurrently");

        let mut slots: Vec<Option<ResolveResult<RunConfiguration>>> =
            (0..total).map(|_| None).collect();
        let mut tasks = JoinSet::new();
        for index in 0..total {
            if tasks.len() >= max_parallel {
                collect_one(&mut tasks, &mut slots).await;
            }
            let composer = self.clone();
            let combination = plan.combination(index);
            tasks.spawn_blocking(move || (index, composer.run(index, combination)));
        }
        while !tasks.is_empty() {
            collect_one(&mut tasks, &mut slots).await;
        }

        let mut runs = Vec::with_capacity(total);
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(run)) => runs.push(run),
                Some(Err(source)) => return Err(SweepError { index, source }),
                None => unreachable!("every combination is joined"),
            }
        }
        Ok(runs)
    }

    /// Resolve, merge and instantiate one set of concrete overrides.
    pub(crate) fn run(
        &self,
        index: usize,
        overrides: Vec<OverrideSpec>,
    ) -> ResolveResult<RunConfiguration> {
        let selections = defaults::resolve(
            &self.base.defaults,
            &overrides,
            &self.required_groups(),
            &self.registry,
        )?;
        let raw = merge::merge(&self.base, &selections, &overrides, &self.registry)?;
        let root = instantiate(&raw, &self.catalog)?;
        debug!(
            index = index,
            selections = ?selections.to_map(),
            "Composed run"
        );
        Ok(RunConfiguration {
            index,
            overrides,
            selections,
            raw,
            root,
        })
    }
}

type Joined = (usize, ResolveResult<RunConfiguration>);

/// Wait for one worker and store its result by combination index.
async fn collect_one(
    tasks: &mut JoinSet<Joined>,
    slots: &mut [Option<ResolveResult<RunConfiguration>>],
) {
    match tasks.join_next().await {
        Some(Ok((index, result))) => slots[index] = Some(result),
        Some(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Some(Err(e)) => panic!("sweep worker cancelled: {}", e),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultsEntry;
    use crate::schema::builtin;

    fn composer() -> Composer {
        let registry = ConfigGroupRegistry::in_memory([
            (
                "connection",
                "postgres",
                "driver: postgresql\nusername: etl\npassword: secret\nhost: localhost\nport: 5432\ndatabase: warehouse\n",
            ),
            (
                "structure",
                "structure",
                "target: {name: price, type: float, description: sale price}\nfeatures:\n  - {name: rooms, type: int, description: room count}\n",
            ),
            (
                "hyperparameters",
                "small",
                "loss: huber\nlearning_rate: 0.1\nn_estimators: 2\nmax_depth: 2\nmin_samples_split: 2\n",
            ),
            (
                "hyperparameters",
                "large",
                "loss: squared_error\nlearning_rate: 0.05\nn_estimators: 200\nmax_depth: 8\nmin_samples_split: 4\n",
            ),
        ]);
        let base = BaseConfig::with_defaults(vec![
            DefaultsEntry::group("connection", "postgres"),
            DefaultsEntry::group("hyperparameters", "small"),
        ]);
        Composer::new(base, registry, builtin::training().unwrap())
    }

    #[test]
    fn test_required_groups_follow_root_fields() {
        assert_eq!(
            composer().required_groups(),
            vec!["connection", "structure", "hyperparameters"]
        );
    }

    #[test]
    fn test_compose_single_run() {
        let composer = composer();
        let overrides = composer
            .parse_overrides(&["hyperparameters=large", "connection.port=6432"])
            .unwrap();
        let run = composer.compose(&overrides).unwrap();
        assert_eq!(run.index(), 0);
        assert_eq!(run.selections().get("hyperparameters"), Some("large"));
        assert_eq!(run.selections().get("structure"), Some("structure"));
        let connection = run.root().get("connection").and_then(|v| v.as_node()).unwrap();
        assert_eq!(connection.get("port").and_then(|v| v.as_i64()), Some(6432));
    }

    #[test]
    fn test_compose_rejects_multi_value() {
        let composer = composer();
        let overrides = composer
            .parse_overrides(&["hyperparameters=small,large"])
            .unwrap();
        match composer.compose(&overrides) {
            Err(ResolveError::AmbiguousSingleRun { target, count }) => {
                assert_eq!(target, "hyperparameters");
                assert_eq!(count, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sweep_isolates_failures_by_index() {
        let composer = composer();
        let overrides = composer
            .parse_overrides(&["hyperparameters.learning_rate=0.5,1.5"])
            .unwrap();
        let results: Vec<_> = composer.sweep(&overrides).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.index, 1);
        assert!(err.source.is_validation());
    }

    #[tokio::test]
    async fn test_sweep_concurrent_preserves_order() {
        let composer = composer();
        let overrides = composer
            .parse_overrides(&["hyperparameters=large,small", "connection.port=1,2,3"])
            .unwrap();
        let plan = composer.plan(&overrides).unwrap();
        let runs = composer.sweep_concurrent(&plan, 2).await.unwrap();
        assert_eq!(runs.len(), 6);
        for (i, run) in runs.iter().enumerate() {
            assert_eq!(run.index(), i);
        }
        assert_eq!(runs[0].selections().get("hyperparameters"), Some("large"));
        assert_eq!(runs[5].selections().get("hyperparameters"), Some("small"));
    }

    #[tokio::test]
    async fn test_sweep_concurrent_with_single_worker() {
        let composer = composer();
        let overrides = composer
            .parse_overrides(&["connection.port=1,2,3,4,5"])
            .unwrap();
        let plan = composer.plan(&overrides).unwrap();
        for max_parallel in [0, 1] {
            let runs = composer.sweep_concurrent(&plan, max_parallel).await.unwrap();
            let ports: Vec<i64> = runs
                .iter()
                .map(|r| {
                    r.root()
                        .get("connection")
                        .and_then(|v| v.as_node())
                        .and_then(|c| c.get("port"))
                        .and_then(|v| v.as_i64())
                        .unwrap()
                })
                .collect();
            assert_eq!(ports, vec![1, 2, 3, 4, 5]);
        }
    }
}
