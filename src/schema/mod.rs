//! Schema catalog: the static description of every typed node.
//!
//! A catalog holds node schemas (ordered fields plus cross-field validators)
//! and closed string enums. Field types are a tagged description
//! ([`FieldType`]) that the instantiator dispatches on.
//!
//! Catalogs are built in code with [`SchemaCatalog::builder`] or read from a
//! YAML document with [`SchemaCatalog::from_yaml`]. Either way `build()`
//! checks that every type reference resolves, so a built catalog is always
//! internally consistent.

pub mod builtin;
mod document;

use crate::error::SchemaError;
use crate::instantiate::{TypedNode, TypedValue};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Leaf scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Str,
    Int,
    Float,
    Bool,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Str => "str",
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::Bool => "bool",
        }
    }
}

/// Declared type of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarType),
    /// Closed string enum, by catalog name.
    Enum(String),
    /// Nested node, by catalog name.
    Node(String),
    /// Sequence of the inner type.
    Sequence(Box<FieldType>),
}

impl FieldType {
    pub const STR: FieldType = FieldType::Scalar(ScalarType::Str);
    pub const INT: FieldType = FieldType::Scalar(ScalarType::Int);
    pub const FLOAT: FieldType = FieldType::Scalar(ScalarType::Float);
    pub const BOOL: FieldType = FieldType::Scalar(ScalarType::Bool);

    pub fn node(name: impl Into<String>) -> Self {
        FieldType::Node(name.into())
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        FieldType::Enum(name.into())
    }

    pub fn list_of(inner: FieldType) -> Self {
        FieldType::Sequence(Box::new(inner))
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Scalar(ScalarType::Int) | FieldType::Scalar(ScalarType::Float)
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Scalar(s) => write!(f, "{}", s.as_str()),
            FieldType::Enum(name) => write!(f, "enum {}", name),
            FieldType::Node(name) => write!(f, "{}", name),
            FieldType::Sequence(inner) => write!(f, "list[{}]", inner),
        }
    }
}

/// Declarative per-field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Gt(f64),
    Ge(f64),
    Lt(f64),
    Le(f64),
    MinItems(usize),
    MaxItems(usize),
    MinLength(usize),
}

impl Constraint {
    /// Check a coerced value. Constraints that do not apply to the value's
    /// shape pass; the catalog builder rejects such pairings up front.
    pub fn check(&self, value: &TypedValue) -> bool {
        match self {
            Constraint::Gt(bound) => value.as_f64().is_none_or(|v| v > *bound),
            Constraint::Ge(bound) => value.as_f64().is_none_or(|v| v >= *bound),
            Constraint::Lt(bound) => value.as_f64().is_none_or(|v| v < *bound),
            Constraint::Le(bound) => value.as_f64().is_none_or(|v| v <= *bound),
            Constraint::MinItems(n) => value.as_list().is_none_or(|l| l.len() >= *n),
            Constraint::MaxItems(n) => value.as_list().is_none_or(|l| l.len() <= *n),
            Constraint::MinLength(n) => value.as_str().is_none_or(|s| s.chars().count() >= *n),
        }
    }

    fn applies_to(&self, ty: &FieldType) -> bool {
        match self {
            Constraint::Gt(_) | Constraint::Ge(_) | Constraint::Lt(_) | Constraint::Le(_) => {
                ty.is_numeric()
            }
            Constraint::MinItems(_) | Constraint::MaxItems(_) => {
                matches!(ty, FieldType::Sequence(_))
            }
            Constraint::MinLength(_) => matches!(ty, FieldType::Scalar(ScalarType::Str)),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Gt(b) => write!(f, "> {}", b),
            Constraint::Ge(b) => write!(f, ">= {}", b),
            Constraint::Lt(b) => write!(f, "< {}", b),
            Constraint::Le(b) => write!(f, "<= {}", b),
            Constraint::MinItems(n) => write!(f, "at least {} items", n),
            Constraint::MaxItems(n) => write!(f, "at most {} items", n),
            Constraint::MinLength(n) => write!(f, "at least {} characters", n),
        }
    }
}

/// Check run against a node once its fields are typed.
pub type ValidatorFn = dyn Fn(&TypedNode) -> Result<(), String> + Send + Sync;

/// Named cross-field validator.
#[derive(Clone)]
pub struct CrossFieldValidator {
    name: String,
    check: Arc<ValidatorFn>,
}

impl CrossFieldValidator {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&TypedNode) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Fails unless the listed numeric fields sum to at least `min`.
    pub fn sum_at_least(
        name: impl Into<String>,
        fields: Vec<String>,
        min: f64,
        message: Option<String>,
    ) -> Self {
        let message = message.unwrap_or_else(|| {
            format!("{} must sum to at least {}", fields.join(" + "), min)
        });
        Self::new(name, move |node| {
            let sum: f64 = fields
                .iter()
                .filter_map(|f| node.get(f).and_then(TypedValue::as_f64))
                .sum();
            if sum >= min { Ok(()) } else { Err(message.clone()) }
        })
    }

    /// Fails unless numeric field `left` is strictly less than `right`.
    pub fn less_than(
        name: impl Into<String>,
        left: String,
        right: String,
        message: Option<String>,
    ) -> Self {
        let message = message.unwrap_or_else(|| format!("{} must be less than {}", left, right));
        Self::new(name, move |node| {
            let l = node.get(&left).and_then(TypedValue::as_f64);
            let r = node.get(&right).and_then(TypedValue::as_f64);
            match (l, r) {
                (Some(l), Some(r)) if l < r => Ok(()),
                _ => Err(message.clone()),
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, node: &TypedNode) -> Result<(), String> {
        (self.check)(node)
    }
}

impl fmt::Debug for CrossFieldValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossFieldValidator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Schema of a single field.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: String,
    pub ty: FieldType,
    pub constraints: Vec<Constraint>,
    /// Raw value used when the field is absent. A field without a default is required.
    pub default: Option<Value>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            constraints: Vec::new(),
            default: None,
        }
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Schema of a typed node: ordered fields, then ordered validators.
#[derive(Debug, Clone)]
pub struct NodeSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
    pub validators: Vec<CrossFieldValidator>,
}

impl NodeSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            validators: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn validator(mut self, validator: CrossFieldValidator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// Closed set of string tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumSchema {
    pub name: String,
    pub tokens: Vec<String>,
}

impl EnumSchema {
    pub fn new<I, S>(name: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }
}

/// Every node and enum reachable from a root node type.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    root: String,
    nodes: BTreeMap<String, NodeSchema>,
    enums: BTreeMap<String, EnumSchema>,
}

impl SchemaCatalog {
    pub fn builder(root: impl Into<String>) -> SchemaCatalogBuilder {
        SchemaCatalogBuilder {
            root: root.into(),
            nodes: Vec::new(),
            enums: Vec::new(),
        }
    }

    /// Read a declarative schema document.
    pub fn from_yaml(source: &str) -> Result<Self, SchemaError> {
        document::parse(source)
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn root_node(&self) -> &NodeSchema {
        // Presence is checked by the builder.
        &self.nodes[&self.root]
    }

    pub fn node(&self, name: &str) -> Option<&NodeSchema> {
        self.nodes.get(name)
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumSchema> {
        self.enums.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeSchema> {
        self.nodes.values()
    }
}

/// Collects nodes and enums, then checks them as a whole.
#[derive(Debug)]
pub struct SchemaCatalogBuilder {
    root: String,
    nodes: Vec<NodeSchema>,
    enums: Vec<EnumSchema>,
}

impl SchemaCatalogBuilder {
    pub fn node(mut self, node: NodeSchema) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn enumeration(mut self, schema: EnumSchema) -> Self {
        self.enums.push(schema);
        self
    }

    pub fn build(self) -> Result<SchemaCatalog, SchemaError> {
        let mut enums = BTreeMap::new();
        for e in self.enums {
            if e.tokens.is_empty() {
                return Err(SchemaError::Invalid {
                    node: e.name,
                    message: "enum declares no tokens".into(),
                });
            }
            enums.insert(e.name.clone(), e);
        }

        let mut nodes = BTreeMap::new();
        for node in self.nodes {
            if nodes.contains_key(&node.name) || enums.contains_key(&node.name) {
                return Err(SchemaError::Invalid {
                    node: node.name,
                    message: "type declared more than once".into(),
                });
            }
            nodes.insert(node.name.clone(), node);
        }

        if !nodes.contains_key(&self.root) {
            return Err(SchemaError::UnknownRoot(self.root));
        }

        for node in nodes.values() {
            let mut seen = HashSet::new();
            for field in &node.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(SchemaError::Invalid {
                        node: node.name.clone(),
                        message: format!("field '{}' declared twice", field.name),
                    });
                }
                check_reference(&node.name, &field.name, &field.ty, &nodes, &enums)?;
                for constraint in &field.constraints {
                    if !constraint.applies_to(&field.ty) {
                        return Err(SchemaError::Invalid {
                            node: node.name.clone(),
                            message: format!(
                                "constraint '{}' does not apply to field '{}' of type {}",
                                constraint, field.name, field.ty
                            ),
                        });
                    }
                }
            }
        }

        Ok(SchemaCatalog {
            root: self.root,
            nodes,
            enums,
        })
    }
}

fn check_reference(
    node: &str,
    field: &str,
    ty: &FieldType,
    nodes: &BTreeMap<String, NodeSchema>,
    enums: &BTreeMap<String, EnumSchema>,
) -> Result<(), SchemaError> {
    let unknown = |type_name: &str| SchemaError::UnknownType {
        node: node.to_string(),
        field: field.to_string(),
        type_name: type_name.to_string(),
    };
    match ty {
        FieldType::Scalar(_) => Ok(()),
        FieldType::Enum(name) if enums.contains_key(name) => Ok(()),
        FieldType::Node(name) if nodes.contains_key(name) => Ok(()),
        FieldType::Enum(name) | FieldType::Node(name) => Err(unknown(name)),
        FieldType::Sequence(inner) => check_reference(node, field, inner, nodes, enums),
    }
}
