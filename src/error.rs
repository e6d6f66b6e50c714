//! Structured error types.
//!
//! Errors fall into three families:
//! - **structural** ([`ResolveError`]) surfaced immediately, abort resolution
//! - **validation** ([`ValidationError`]) aggregated per instantiation attempt
//! - **addressing** ([`KeyError`]) surfaced at cache-key derivation time

use crate::path::AttrPath;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Structural
    UnknownGroup,
    UnknownVariant,
    FragmentParseError,
    PathConflict,
    MissingSelection,
    AmbiguousSingleRunError,
    InvalidOverride,
    IoError,

    // Validation
    ValidationError,

    // Addressing
    InvalidPath,

    // Schema documents
    SchemaError,
}

/// What went wrong with one field.
#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    /// A required field is absent and has no default.
    MissingField,
    /// The raw mapping carries a key the schema does not declare.
    UnknownField,
    /// The raw value cannot be coerced to the declared type.
    TypeCoercion { raw: String, expected: String },
    /// The value violates one of the field's constraints.
    Constraint { constraint: String, actual: String },
    /// A cross-field validator on the enclosing node rejected it.
    CrossField { validator: String, message: String },
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::MissingField => write!(f, "field required"),
            IssueKind::UnknownField => write!(f, "extra field not permitted"),
            IssueKind::TypeCoercion { raw, expected } => {
                write!(f, "cannot coerce {} to {}", raw, expected)
            }
            IssueKind::Constraint { constraint, actual } => {
                write!(f, "value {} violates constraint {}", actual, constraint)
            }
            IssueKind::CrossField { validator, message } => {
                write!(f, "{} failed: {}", validator, message)
            }
        }
    }
}

/// One field-path-scoped validation problem.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub path: AttrPath,
    pub kind: IssueKind,
}

impl ValidationIssue {
    pub fn new(path: AttrPath, kind: IssueKind) -> Self {
        Self { path, kind }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// Summary of failing elements of one sequence field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementValidationError {
    /// Path of the sequence field.
    pub path: AttrPath,
    /// Index of the first failing element.
    pub first_index: usize,
    /// Every failing element index, ascending.
    pub failing_indices: Vec<usize>,
}

/// Aggregate of every issue found while instantiating one raw tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ValidationError {
    root: String,
    issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(root: impl Into<String>, issues: Vec<ValidationIssue>) -> Self {
        Self {
            root: root.into(),
            issues,
        }
    }

    /// Name of the root node type that failed.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues located at or under `path`.
    pub fn issues_under<'a>(
        &'a self,
        path: &'a AttrPath,
    ) -> impl Iterator<Item = &'a ValidationIssue> + 'a {
        self.issues.iter().filter(move |i| i.path.starts_with(path))
    }

    /// Element failures of the sequence at `path`, if any element failed.
    pub fn element_failures(&self, path: &AttrPath) -> Option<ElementValidationError> {
        let depth = path.len();
        let mut indices: Vec<usize> = self
            .issues_under(path)
            .filter_map(|issue| match issue.path.segments().get(depth) {
                Some(crate::path::Segment::Index(i)) => Some(*i),
                _ => None,
            })
            .collect();
        indices.sort_unstable();
        indices.dedup();
        let first_index = *indices.first()?;
        Some(ElementValidationError {
            path: path.clone(),
            first_index,
            failing_indices: indices,
        })
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.issues.len() == 1 { "error" } else { "errors" };
        write!(f, "{} validation {} for {}", self.issues.len(), noun, self.root)?;
        for issue in &self.issues {
            write!(f, "\n  - {}", issue)?;
        }
        Ok(())
    }
}

/// Why a scalar assignment could not descend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The position holds a scalar or sequence, not a mapping.
    NotAMapping,
    /// An intermediate mapping does not exist.
    Missing,
    /// A sequence index is out of range.
    OutOfRange,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::NotAMapping => write!(f, "not a mapping"),
            ConflictReason::Missing => write!(f, "no such key"),
            ConflictReason::OutOfRange => write!(f, "index out of range"),
        }
    }
}

/// Structural failures during composition.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown config group '{group}'")]
    UnknownGroup { group: String },

    #[error("unknown variant '{variant}' in group '{group}' (available: {})", available.join(", "))]
    UnknownVariant {
        group: String,
        variant: String,
        available: Vec<String>,
    },

    #[error("failed to parse {group}/{variant} at line {line}, column {column}: {message}")]
    FragmentParse {
        group: String,
        variant: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("failed to parse base config '{name}' at line {line}, column {column}: {message}")]
    BaseParse {
        name: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("cannot assign '{path}': {reason} at '{at}'")]
    PathConflict {
        path: String,
        at: String,
        reason: ConflictReason,
    },

    #[error("no variant selected for required group '{group}'")]
    MissingSelection { group: String },

    #[error("override '{target}' has {count} values; pass --multirun to sweep over them")]
    AmbiguousSingleRun { target: String, count: usize },

    #[error("invalid override '{raw}': {reason}")]
    InvalidOverride { raw: String, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ResolveError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ResolveError::UnknownGroup { .. } => ErrorCode::UnknownGroup,
            ResolveError::UnknownVariant { .. } => ErrorCode::UnknownVariant,
            ResolveError::FragmentParse { .. } | ResolveError::BaseParse { .. } => {
                ErrorCode::FragmentParseError
            }
            ResolveError::PathConflict { .. } => ErrorCode::PathConflict,
            ResolveError::MissingSelection { .. } => ErrorCode::MissingSelection,
            ResolveError::AmbiguousSingleRun { .. } => ErrorCode::AmbiguousSingleRunError,
            ResolveError::InvalidOverride { .. } => ErrorCode::InvalidOverride,
            ResolveError::Io { .. } => ErrorCode::IoError,
            ResolveError::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// True for failures found by schema validation rather than structure.
    pub fn is_validation(&self) -> bool {
        matches!(self, ResolveError::Validation(_))
    }

    pub fn invalid_override(raw: &str, reason: impl Into<String>) -> Self {
        ResolveError::InvalidOverride {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure of one sweep combination, tagged with its index.
#[derive(Debug, Error)]
#[error("combination {index} failed: {source}")]
pub struct SweepError {
    pub index: usize,
    #[source]
    pub source: ResolveError,
}

/// Addressing failures when deriving cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid path '{path}': no field '{segment}'")]
    InvalidPath { path: String, segment: String },
}

impl KeyError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidPath
    }
}

/// Problems in a declarative schema document.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse schema: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("node '{node}' field '{field}' references unknown type '{type_name}'")]
    UnknownType {
        node: String,
        field: String,
        type_name: String,
    },

    #[error("root node '{0}' is not declared")]
    UnknownRoot(String),

    #[error("node '{node}': {message}")]
    Invalid { node: String, message: String },
}

impl SchemaError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::SchemaError
    }
}

/// Result type for composition operations.
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;
