//! Schema-driven instantiation of raw trees into typed node graphs.
//!
//! Instantiation walks the catalog's declared fields, coerces leaves, checks
//! constraints and runs cross-field validators. Every problem found anywhere
//! in the tree is collected; the caller either gets a fully valid
//! [`TypedNode`] or a [`ValidationError`] listing all issues.

use crate::error::{IssueKind, ValidationError, ValidationIssue};
use crate::path::AttrPath;
use crate::schema::{FieldType, NodeSchema, ScalarType, SchemaCatalog};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Marker for a value that must be supplied before instantiation.
pub const MANDATORY_MARKER: &str = "???";

/// A validated field value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Enum { enum_name: String, token: String },
    Node(TypedNode),
    List(Vec<TypedValue>),
}

impl TypedValue {
    /// Numeric view of ints and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TypedValue::Int(i) => Some(*i as f64),
            TypedValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Text of strings and enum tokens.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::Str(s) => Some(s),
            TypedValue::Enum { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&TypedNode> {
        match self {
            TypedValue::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[TypedValue]> {
        match self {
            TypedValue::List(items) => Some(items),
            _ => None,
        }
    }

    fn render(&self) -> String {
        match self {
            TypedValue::Str(s) => format!("{:?}", s),
            TypedValue::Int(i) => i.to_string(),
            TypedValue::Float(f) => f.to_string(),
            TypedValue::Bool(b) => b.to_string(),
            TypedValue::Enum { token, .. } => format!("{:?}", token),
            TypedValue::Node(n) => n.type_name().to_string(),
            TypedValue::List(items) => format!("list of {} items", items.len()),
        }
    }
}

impl Serialize for TypedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TypedValue::Str(s) => serializer.serialize_str(s),
            TypedValue::Int(i) => serializer.serialize_i64(*i),
            TypedValue::Float(f) => serializer.serialize_f64(*f),
            TypedValue::Bool(b) => serializer.serialize_bool(*b),
            TypedValue::Enum { token, .. } => serializer.serialize_str(token),
            TypedValue::Node(node) => node.serialize(serializer),
            TypedValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

/// A validated instance of a schema node.
///
/// Fields are held in schema-declared order. Instances are only produced by
/// [`instantiate`] and [`instantiate_node`], so every `TypedNode` a caller
/// sees is fully valid.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedNode {
    type_name: String,
    fields: Vec<(String, TypedValue)>,
}

impl TypedNode {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, field: &str) -> Option<&TypedValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Fields in schema-declared order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for TypedNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Instantiate `raw` as the catalog's root node type.
pub fn instantiate(raw: &Value, catalog: &SchemaCatalog) -> Result<TypedNode, ValidationError> {
    instantiate_node(raw, catalog, catalog.root_node())
}

/// Instantiate `raw` as an arbitrary node type of the catalog.
pub fn instantiate_node(
    raw: &Value,
    catalog: &SchemaCatalog,
    schema: &NodeSchema,
) -> Result<TypedNode, ValidationError> {
    let mut walker = Walker {
        catalog,
        issues: Vec::new(),
    };
    let node = walker.node(schema, raw, &AttrPath::root());
    match node {
        Some(node) if walker.issues.is_empty() => Ok(node),
        _ => {
            tracing::debug!(
                root = %schema.name,
                issues = walker.issues.len(),
                "Instantiation failed"
            );
            Err(ValidationError::new(schema.name.clone(), walker.issues))
        }
    }
}

struct Walker<'a> {
    catalog: &'a SchemaCatalog,
    issues: Vec<ValidationIssue>,
}

impl Walker<'_> {
    fn report(&mut self, path: AttrPath, kind: IssueKind) {
        self.issues.push(ValidationIssue::new(path, kind));
    }

    fn coercion(&mut self, path: &AttrPath, raw: &Value, expected: impl Into<String>) {
        self.report(
            path.clone(),
            IssueKind::TypeCoercion {
                raw: render_raw(raw),
                expected: expected.into(),
            },
        );
    }

    /// Returns a node whenever every field produced a typed value, even if a
    /// constraint failed; the overall outcome is decided by the issue list.
    fn node(&mut self, schema: &NodeSchema, raw: &Value, path: &AttrPath) -> Option<TypedNode> {
        let Some(map) = raw.as_object() else {
            self.coercion(path, raw, schema.name.clone());
            return None;
        };

        let mut fields = Vec::with_capacity(schema.fields.len());
        let mut complete = true;

        for field in &schema.fields {
            let field_path = path.child(&field.name);
            let raw_value = match map.get(&field.name) {
                Some(Value::String(s)) if s == MANDATORY_MARKER => None,
                Some(v) => Some(v),
                None => None,
            };
            let Some(raw_value) = raw_value.or(field.default.as_ref()) else {
                self.report(field_path, IssueKind::MissingField);
                complete = false;
                continue;
            };

            match self.value(&field.ty, raw_value, &field_path) {
                Some(value) => {
                    for constraint in &field.constraints {
                        if !constraint.check(&value) {
                            self.report(
                                field_path.clone(),
                                IssueKind::Constraint {
                                    constraint: constraint.to_string(),
                                    actual: value.render(),
                                },
                            );
                        }
                    }
                    fields.push((field.name.clone(), value));
                }
                None => complete = false,
            }
        }

        for key in map.keys() {
            if schema.get_field(key).is_none() {
                self.report(path.child(key), IssueKind::UnknownField);
            }
        }

        if !complete {
            return None;
        }

        let node = TypedNode {
            type_name: schema.name.clone(),
            fields,
        };
        for validator in &schema.validators {
            if let Err(message) = validator.check(&node) {
                self.report(
                    path.clone(),
                    IssueKind::CrossField {
                        validator: validator.name().to_string(),
                        message,
                    },
                );
            }
        }
        Some(node)
    }

    fn value(&mut self, ty: &FieldType, raw: &Value, path: &AttrPath) -> Option<TypedValue> {
        match ty {
            FieldType::Scalar(scalar) => {
                let coerced = coerce_scalar(*scalar, raw);
                if coerced.is_none() {
                    self.coercion(path, raw, scalar.as_str());
                }
                coerced
            }
            FieldType::Enum(name) => {
                let catalog = self.catalog;
                let schema = catalog.enumeration(name)?;
                match raw.as_str() {
                    Some(token) if schema.contains(token) => Some(TypedValue::Enum {
                        enum_name: name.clone(),
                        token: token.to_string(),
                    }),
                    _ => {
                        self.coercion(
                            path,
                            raw,
                            format!("{} (one of: {})", name, schema.tokens.join(", ")),
                        );
                        None
                    }
                }
            }
            FieldType::Node(name) => {
                let catalog = self.catalog;
                let schema = catalog.node(name)?;
                self.node(schema, raw, path).map(TypedValue::Node)
            }
            FieldType::Sequence(inner) => {
                let Some(items) = raw.as_array() else {
                    self.coercion(path, raw, ty.to_string());
                    return None;
                };
                let mut values = Vec::with_capacity(items.len());
                let mut complete = true;
                for (i, item) in items.iter().enumerate() {
                    match self.value(inner, item, &path.index(i)) {
                        Some(v) => values.push(v),
                        None => complete = false,
                    }
                }
                complete.then_some(TypedValue::List(values))
            }
        }
    }
}

fn coerce_scalar(ty: ScalarType, raw: &Value) -> Option<TypedValue> {
    match ty {
        ScalarType::Str => raw.as_str().map(|s| TypedValue::Str(s.to_string())),
        ScalarType::Int => match raw {
            Value::Number(n) => n.as_i64().map(TypedValue::Int).or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| TypedValue::Int(f as i64))
            }),
            Value::String(s) => s.trim().parse::<i64>().ok().map(TypedValue::Int),
            _ => None,
        },
        ScalarType::Float => match raw {
            Value::Number(n) => n.as_f64().map(TypedValue::Float),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(TypedValue::Float),
            _ => None,
        },
        ScalarType::Bool => match raw {
            Value::Bool(b) => Some(TypedValue::Bool(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(TypedValue::Bool(true)),
                "false" => Some(TypedValue::Bool(false)),
                _ => None,
            },
            _ => None,
        },
    }
}

fn render_raw(raw: &Value) -> String {
    match raw {
        Value::Object(_) => "a mapping".to_string(),
        Value::Array(items) => format!("a sequence of {} items", items.len()),
        other => other.to_string(),
    }
}
