//! Built-in training-job schema.
//!
//! `Configuration` bundles a database connection, the column structure of
//! the training table and gradient-boosting hyperparameters.

use super::{
    Constraint, CrossFieldValidator, EnumSchema, FieldSchema, FieldType, NodeSchema,
    SchemaCatalog,
};
use crate::error::SchemaError;

/// Tokens accepted for `Hyperparameters.loss`.
pub const LOSS_TOKENS: &[&str] = &["squared_error", "absolute_error", "huber", "quantile"];

/// The training configuration catalog rooted at `Configuration`.
pub fn training() -> Result<SchemaCatalog, SchemaError> {
    let connection = NodeSchema::new("Connection")
        .field(FieldSchema::new("driver", FieldType::STR))
        .field(FieldSchema::new("username", FieldType::STR))
        .field(FieldSchema::new("password", FieldType::STR))
        .field(FieldSchema::new("host", FieldType::STR))
        .field(FieldSchema::new("port", FieldType::INT))
        .field(FieldSchema::new("database", FieldType::STR));

    let column = NodeSchema::new("Column")
        .field(FieldSchema::new("name", FieldType::STR))
        .field(FieldSchema::new("type", FieldType::STR))
        .field(FieldSchema::new("description", FieldType::STR));

    let structure = NodeSchema::new("Structure")
        .field(FieldSchema::new("target", FieldType::node("Column")))
        .field(FieldSchema::new(
            "features",
            FieldType::list_of(FieldType::node("Column")),
        ));

    let hyperparameters = NodeSchema::new("Hyperparameters")
        .field(FieldSchema::new("loss", FieldType::enumeration("Loss")))
        .field(
            FieldSchema::new("learning_rate", FieldType::FLOAT)
                .constraint(Constraint::Gt(0.0))
                .constraint(Constraint::Lt(1.0)),
        )
        .field(FieldSchema::new("n_estimators", FieldType::INT).constraint(Constraint::Ge(1.0)))
        .field(FieldSchema::new("max_depth", FieldType::INT).constraint(Constraint::Ge(1.0)))
        .field(
            FieldSchema::new("min_samples_split", FieldType::INT).constraint(Constraint::Ge(1.0)),
        )
        .validator(CrossFieldValidator::sum_at_least(
            "check_complexity",
            vec!["max_depth".into(), "n_estimators".into()],
            4.0,
            Some("the model is not complex enough".into()),
        ));

    let configuration = NodeSchema::new("Configuration")
        .field(FieldSchema::new("connection", FieldType::node("Connection")))
        .field(FieldSchema::new("structure", FieldType::node("Structure")))
        .field(FieldSchema::new(
            "hyperparameters",
            FieldType::node("Hyperparameters"),
        ));

    SchemaCatalog::builder("Configuration")
        .enumeration(EnumSchema::new("Loss", LOSS_TOKENS.iter().copied()))
        .node(connection)
        .node(column)
        .node(structure)
        .node(hyperparameters)
        .node(configuration)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_catalog_builds() {
        let catalog = training().unwrap();
        assert_eq!(catalog.root_name(), "Configuration");
        let fields: Vec<&str> = catalog.root_node().field_names().collect();
        assert_eq!(fields, vec!["connection", "structure", "hyperparameters"]);
        assert!(catalog.enumeration("Loss").unwrap().contains("huber"));
        assert_eq!(catalog.node("Hyperparameters").unwrap().validators.len(), 1);
    }
}
