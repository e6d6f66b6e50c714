//! Integration tests for composing against a declarative schema document.

use confgraph::cli::load_composer;
use confgraph::error::{IssueKind, ResolveError};
use confgraph::settings::Settings;
use std::fs;
use tempfile::TempDir;

const SCHEMA: &str = r#"
root: Experiment
enums:
  Optimizer: [sgd, adam]
nodes:
  Training:
    fields:
      - {name: optimizer, type: Optimizer}
      - {name: warmup_steps, type: int, ge: 0}
      - {name: total_steps, type: int, gt: 0}
      - {name: tags, type: "list[str]", default: [], max_items: 3}
    validators:
      - name: warmup_before_end
        less_than: {left: warmup_steps, right: total_steps}
        message: warmup must end before training does
  Experiment:
    fields:
      - {name: name, type: str, min_length: 1}
      - {name: training, type: Training}
"#;

/// Helper to create a config tree plus schema file.
fn setup() -> (TempDir, Settings) {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    fs::create_dir_all(dir.join("conf/training")).unwrap();
    fs::write(dir.join("schema.yaml"), SCHEMA).unwrap();
    fs::write(
        dir.join("conf/experiment.yaml"),
        "defaults:\n  - training: short\nname: baseline\n",
    )
    .unwrap();
    fs::write(
        dir.join("conf/training/short.yaml"),
        "optimizer: adam\nwarmup_steps: 10\ntotal_steps: 100\n",
    )
    .unwrap();
    let settings = Settings {
        config_dir: dir.join("conf"),
        config_name: "experiment".into(),
        schema: Some(dir.join("schema.yaml")),
        ..Settings::default()
    };
    (temp, settings)
}

#[test]
fn test_compose_with_schema_document() {
    let (_temp, settings) = setup();
    let composer = load_composer(&settings).unwrap();
    assert_eq!(composer.required_groups(), vec!["training"]);

    let run = composer.compose(&[]).unwrap();
    let training = run.root().get("training").and_then(|v| v.as_node()).unwrap();
    assert_eq!(training.type_name(), "Training");
    assert_eq!(training.get("optimizer").and_then(|v| v.as_str()), Some("adam"));
    assert_eq!(training.get("tags").and_then(|v| v.as_list()).map(|l| l.len()), Some(0));
}

#[test]
fn test_declarative_validator_and_enum_errors() {
    let (_temp, settings) = setup();
    let composer = load_composer(&settings).unwrap();
    let overrides = composer
        .parse_overrides(&["training.optimizer=rmsprop", "training.warmup_steps=500"])
        .unwrap();

    let Err(ResolveError::Validation(err)) = composer.compose(&overrides) else {
        panic!("expected validation error");
    };
    assert_eq!(err.len(), 1, "{}", err);
    assert_eq!(err.issues()[0].path.to_string(), "training.optimizer");
    assert!(matches!(err.issues()[0].kind, IssueKind::TypeCoercion { .. }));

    let overrides = composer
        .parse_overrides(&["training.warmup_steps=500"])
        .unwrap();
    let Err(ResolveError::Validation(err)) = composer.compose(&overrides) else {
        panic!("expected validation error");
    };
    assert!(matches!(
        err.issues()[0].kind,
        IssueKind::CrossField { ref validator, .. } if validator == "warmup_before_end"
    ));
}

#[test]
fn test_invalid_schema_file_is_reported() {
    let (temp, settings) = setup();
    fs::write(
        temp.path().join("schema.yaml"),
        "root: Experiment\nnodes:\n  Experiment:\n    fields:\n      - {name: model, type: Model}\n",
    )
    .unwrap();
    assert!(load_composer(&settings).is_err());
}
