//! Declarative schema documents.
//!
//! ```yaml
//! root: Configuration
//! enums:
//!   Loss: [squared_error, huber]
//! nodes:
//!   Hyperparameters:
//!     fields:
//!       - { name: loss, type: Loss }
//!       - { name: learning_rate, type: float, gt: 0.0, lt: 1.0 }
//!       - { name: max_depth, type: int, ge: 1 }
//!     validators:
//!       - name: check_complexity
//!         sum_at_least: { fields: [max_depth, n_estimators], min: 4 }
//!         message: the model is not complex enough
//! ```
//!
//! Field order in `fields` is the declared order used for instantiation and
//! cache-key canonicalization. Type names are `str`, `int`, `float`, `bool`,
//! `list[T]`, an enum name or a node name.

use super::{
    Constraint, CrossFieldValidator, EnumSchema, FieldSchema, FieldType, NodeSchema,
    SchemaCatalog,
};
use crate::error::SchemaError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDocument {
    root: String,
    #[serde(default)]
    enums: BTreeMap<String, Vec<String>>,
    nodes: BTreeMap<String, NodeDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeDocument {
    #[serde(default)]
    fields: Vec<FieldDocument>,
    #[serde(default)]
    validators: Vec<ValidatorDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDocument {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    gt: Option<f64>,
    #[serde(default)]
    ge: Option<f64>,
    #[serde(default)]
    lt: Option<f64>,
    #[serde(default)]
    le: Option<f64>,
    #[serde(default)]
    min_items: Option<usize>,
    #[serde(default)]
    max_items: Option<usize>,
    #[serde(default)]
    min_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ValidatorDocument {
    name: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    rule: RuleDocument,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RuleDocument {
    SumAtLeast { fields: Vec<String>, min: f64 },
    LessThan { left: String, right: String },
}

pub(super) fn parse(source: &str) -> Result<SchemaCatalog, SchemaError> {
    let doc: SchemaDocument = serde_yaml::from_str(source)?;

    let mut builder = SchemaCatalog::builder(doc.root);
    for (name, tokens) in doc.enums {
        builder = builder.enumeration(EnumSchema::new(name, tokens));
    }
    let enum_names: Vec<String> = builder.enums.iter().map(|e| e.name.clone()).collect();

    for (name, node_doc) in doc.nodes {
        let mut node = NodeSchema::new(name.clone());
        for field in node_doc.fields {
            let ty = parse_type(&field.type_name, &enum_names);
            let mut schema = FieldSchema::new(field.name, ty);
            let bounds = [
                field.gt.map(Constraint::Gt),
                field.ge.map(Constraint::Ge),
                field.lt.map(Constraint::Lt),
                field.le.map(Constraint::Le),
                field.min_items.map(Constraint::MinItems),
                field.max_items.map(Constraint::MaxItems),
                field.min_length.map(Constraint::MinLength),
            ];
            for constraint in bounds.into_iter().flatten() {
                schema = schema.constraint(constraint);
            }
            if let Some(default) = field.default {
                schema = schema.default_value(default);
            }
            node = node.field(schema);
        }

        for validator in node_doc.validators {
            let referenced: Vec<&String> = match &validator.rule {
                RuleDocument::SumAtLeast { fields, .. } => fields.iter().collect(),
                RuleDocument::LessThan { left, right } => vec![left, right],
            };
            for field in referenced {
                if node.get_field(field).is_none() {
                    return Err(SchemaError::Invalid {
                        node: name.clone(),
                        message: format!(
                            "validator '{}' references unknown field '{}'",
                            validator.name, field
                        ),
                    });
                }
            }
            let built = match validator.rule {
                RuleDocument::SumAtLeast { fields, min } => {
                    CrossFieldValidator::sum_at_least(validator.name, fields, min, validator.message)
                }
                RuleDocument::LessThan { left, right } => {
                    CrossFieldValidator::less_than(validator.name, left, right, validator.message)
                }
            };
            node = node.validator(built);
        }
        builder = builder.node(node);
    }

    builder.build()
}

fn parse_type(name: &str, enums: &[String]) -> FieldType {
    let name = name.trim();
    if let Some(inner) = name
        .strip_prefix("list[")
        .and_then(|rest| rest.strip_suffix(']'))
    {
        return FieldType::list_of(parse_type(inner, enums));
    }
    match name {
        "str" | "string" => FieldType::STR,
        "int" | "integer" => FieldType::INT,
        "float" | "number" => FieldType::FLOAT,
        "bool" | "boolean" => FieldType::BOOL,
        other if enums.iter().any(|e| e == other) => FieldType::enumeration(other),
        other => FieldType::node(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
root: Experiment
enums:
  Mode: [fast, slow]
nodes:
  Experiment:
    fields:
      - { name: mode, type: Mode }
      - { name: seeds, type: "list[int]", min_items: 1 }
      - { name: low, type: float }
      - { name: high, type: float, default: 10.0 }
    validators:
      - name: ordered_bounds
        less_than: { left: low, right: high }
"#;

    #[test]
    fn test_parse_document() {
        let catalog = SchemaCatalog::from_yaml(DOC).unwrap();
        let root = catalog.root_node();
        assert_eq!(root.name, "Experiment");
        let names: Vec<&str> = root.field_names().collect();
        assert_eq!(names, vec!["mode", "seeds", "low", "high"]);
        assert_eq!(root.fields[0].ty, FieldType::enumeration("Mode"));
        assert_eq!(root.fields[1].ty, FieldType::list_of(FieldType::INT));
        assert_eq!(root.fields[1].constraints, vec![Constraint::MinItems(1)]);
        assert!(!root.fields[3].is_required());
        assert_eq!(root.validators.len(), 1);
        assert_eq!(root.validators[0].name(), "ordered_bounds");
    }

    #[test]
    fn test_validator_referencing_unknown_field() {
        let doc = r#"
root: A
nodes:
  A:
    fields:
      - { name: x, type: int }
    validators:
      - name: bad
        sum_at_least: { fields: [x, y], min: 1 }
"#;
        assert!(matches!(
            SchemaCatalog::from_yaml(doc),
            Err(SchemaError::Invalid { .. })
        ));
    }

    #[test]
    fn test_unknown_type_reference() {
        let doc = r#"
root: A
nodes:
  A:
    fields:
      - { name: child, type: Nowhere }
"#;
        assert!(matches!(
            SchemaCatalog::from_yaml(doc),
            Err(SchemaError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let doc = "root: A\nnodes:\n  A:\n    fieldz: []\n";
        assert!(matches!(
            SchemaCatalog::from_yaml(doc),
            Err(SchemaError::Parse(_))
        ));
    }
}
