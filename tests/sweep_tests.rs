//! Integration tests for multi-run sweeps and cache keys across runs.

use confgraph::Composer;
use confgraph::error::ResolveError;
use confgraph::schema::builtin;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn hyperparameters(loss: &str, n_estimators: u32, max_depth: u32) -> String {
    format!(
        "loss: {}\nlearning_rate: 0.1\nn_estimators: {}\nmax_depth: {}\nmin_samples_split: 2\n",
        loss, n_estimators, max_depth
    )
}

/// Helper to create a config tree with three hyperparameter variants.
fn sweep_config_dir() -> TempDir {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    write(
        dir,
        "config.yaml",
        r#"
defaults:
  - connection: postgres
  - structure: housing
  - hyperparameters: medium
"#,
    );
    write(
        dir,
        "connection/postgres.yaml",
        r#"
driver: postgresql
username: etl
password: secret
host: localhost
port: 5432
database: warehouse
"#,
    );
    write(
        dir,
        "connection/replica.yaml",
        r#"
driver: postgresql
username: etl
password: secret
host: replica
port: 5433
database: warehouse
"#,
    );
    write(
        dir,
        "structure/housing.yaml",
        r#"
target: {name: price, type: float, description: sale price}
features:
  - {name: rooms, type: int, description: number of rooms}
"#,
    );
    write(dir, "hyperparameters/small.yaml", &hyperparameters("huber", 2, 2));
    write(dir, "hyperparameters/medium.yaml", &hyperparameters("squared_error", 100, 4));
    write(dir, "hyperparameters/large.yaml", &hyperparameters("squared_error", 500, 8));
    temp
}

fn composer(dir: &Path) -> Composer {
    Composer::from_dir(dir, "config", builtin::training().unwrap())
        .expect("Failed to load composer")
}

mod expansion_tests {
    use super::*;

    #[test]
    fn test_three_way_hyperparameter_sweep() {
        let temp = sweep_config_dir();
        let composer = composer(temp.path());
        let overrides = composer
            .parse_overrides(&["hyperparameters=large,medium,small"])
            .unwrap();

        let sweep = composer.sweep(&overrides).unwrap();
        assert_eq!(sweep.len(), 3);
        let runs = sweep.collect_all().unwrap();

        let selected: Vec<&str> = runs
            .iter()
            .map(|r| r.selections().get("hyperparameters").unwrap())
            .collect();
        assert_eq!(selected, vec!["large", "medium", "small"]);
        for (i, run) in runs.iter().enumerate() {
            assert_eq!(run.index(), i);
            assert_eq!(run.selections().get("connection"), Some("postgres"));
        }

        // Only the swept sub-tree changes identity.
        let connection_keys: HashSet<String> = runs
            .iter()
            .map(|r| r.key_for("connection").unwrap().digest)
            .collect();
        assert_eq!(connection_keys.len(), 1);
        let hyperparameter_keys: HashSet<String> = runs
            .iter()
            .map(|r| r.key_for("hyperparameters").unwrap().digest)
            .collect();
        assert_eq!(hyperparameter_keys.len(), 3);
    }

    #[test]
    fn test_cardinality_is_product_of_axes() {
        let temp = sweep_config_dir();
        let composer = composer(temp.path());
        let overrides = composer
            .parse_overrides(&[
                "hyperparameters=small,medium,large",
                "connection=postgres,replica",
                "hyperparameters.min_samples_split=2,3,4,5",
            ])
            .unwrap();

        let runs = composer.sweep(&overrides).unwrap().collect_all().unwrap();
        assert_eq!(runs.len(), 3 * 2 * 4);

        let distinct: HashSet<String> = runs.iter().map(|r| r.key_for("").unwrap().digest).collect();
        assert_eq!(distinct.len(), 24);

        // first declared axis varies slowest
        assert_eq!(runs[0].selections().get("hyperparameters"), Some("small"));
        assert_eq!(runs[7].selections().get("hyperparameters"), Some("small"));
        assert_eq!(runs[8].selections().get("hyperparameters"), Some("medium"));
        assert_eq!(runs[4].selections().get("connection"), Some("replica"));
    }

    #[test]
    fn test_axis_wins_over_fixed_override_of_same_target() {
        let temp = sweep_config_dir();
        let composer = composer(temp.path());
        let overrides = composer
            .parse_overrides(&["hyperparameters=small,large", "hyperparameters=medium"])
            .unwrap();
        let runs = composer.sweep(&overrides).unwrap().collect_all().unwrap();
        let selected: Vec<&str> = runs
            .iter()
            .map(|r| r.selections().get("hyperparameters").unwrap())
            .collect();
        assert_eq!(selected, vec!["small", "large"]);
    }

    #[test]
    fn test_sweep_without_axes_is_one_run() {
        let temp = sweep_config_dir();
        let composer = composer(temp.path());
        let overrides = composer.parse_overrides(&["connection=replica"]).unwrap();
        let runs = composer.sweep(&overrides).unwrap().collect_all().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].selections().get("connection"), Some("replica"));
    }
}

mod failure_tests {
    use super::*;

    #[test]
    fn test_failures_are_isolated_per_combination() {
        let temp = sweep_config_dir();
        let composer = composer(temp.path());
        let overrides = composer
            .parse_overrides(&["hyperparameters=small,missing,large"])
            .unwrap();

        let results: Vec<_> = composer.sweep(&overrides).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[2].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.index, 1);
        assert!(matches!(err.source, ResolveError::UnknownVariant { .. }));
    }

    #[test]
    fn test_collect_all_stops_at_first_failure() {
        let temp = sweep_config_dir();
        let composer = composer(temp.path());
        let overrides = composer
            .parse_overrides(&["hyperparameters.learning_rate=0.1,2.0,3.0"])
            .unwrap();
        let err = composer.sweep(&overrides).unwrap().collect_all().unwrap_err();
        assert_eq!(err.index, 1);
        assert!(err.source.is_validation());
    }

    #[test]
    fn test_oversized_sweep_is_rejected_before_composing() {
        let temp = sweep_config_dir();
        let composer = composer(temp.path());
        let args: Vec<String> = (0..70).map(|i| format!("k{}=1,2", i)).collect();
        let overrides = composer.parse_overrides(&args).unwrap();

        match composer.sweep(&overrides) {
            Err(ResolveError::InvalidOverride { reason, .. }) => {
                assert_eq!(reason, "sweep too large")
            }
            Err(other) => panic!("unexpected {:?}", other),
            Ok(_) => panic!("expected oversized sweep to fail"),
        }
        assert!(composer.plan(&overrides).is_err());
        assert_eq!(composer.registry().cached_len(), 0);
    }

    #[test]
    fn test_sweep_is_lazy() {
        let temp = sweep_config_dir();
        let composer = composer(temp.path());
        let overrides = composer
            .parse_overrides(&["hyperparameters=small,medium,large"])
            .unwrap();
        let mut sweep = composer.sweep(&overrides).unwrap();
        assert_eq!(sweep.size_hint(), (3, Some(3)));
        let first = sweep.next().unwrap().unwrap();
        assert_eq!(first.selections().get("hyperparameters"), Some("small"));
        assert_eq!(sweep.size_hint(), (2, Some(2)));
        assert_eq!(composer.registry().cached_len(), 3);
    }
}

mod concurrent_tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_sweep_matches_sequential_order() {
        let temp = sweep_config_dir();
        let composer = composer(temp.path());
        let overrides = composer
            .parse_overrides(&[
                "hyperparameters=large,medium,small",
                "connection=replica,postgres",
            ])
            .unwrap();

        let sequential = composer.sweep(&overrides).unwrap().collect_all().unwrap();
        let plan = composer.plan(&overrides).unwrap();
        let concurrent = composer.sweep_concurrent(&plan, 3).await.unwrap();

        assert_eq!(sequential.len(), concurrent.len());
        for (a, b) in sequential.iter().zip(&concurrent) {
            assert_eq!(a.index(), b.index());
            assert_eq!(a.root(), b.root());
        }
    }

    #[tokio::test]
    async fn test_concurrent_sweep_reports_lowest_failing_index() {
        let temp = sweep_config_dir();
        let composer = composer(temp.path());
        let overrides = composer
            .parse_overrides(&["hyperparameters=small,nope,large,gone"])
            .unwrap();
        let plan = composer.plan(&overrides).unwrap();
        let err = composer.sweep_concurrent(&plan, 4).await.unwrap_err();
        assert_eq!(err.index, 1);
    }
}
