//! Invocation override parsing.
//!
//! Three forms are accepted:
//! - `group=variant` selects a variant for a known group
//! - `dotted.path=value` assigns a literal at a path of the merged tree
//! - `key=v1,v2,v3` sweeps over several values (multi-run only)
//!
//! Values are read as YAML scalars, so `port=5432` is a number and
//! `debug=true` a boolean. Quoted text stays a string and commas inside
//! quotes or brackets do not split (`tags=[a,b]` is one sequence value).

use crate::error::{ResolveError, ResolveResult};
use crate::path::AttrPath;
use regex_lite::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;

static OVERRIDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z0-9_\-]+)*)=(.*)$")
        .expect("override pattern is valid")
});

/// What a multi-valued override sweeps over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepTarget {
    Group(String),
    Path(AttrPath),
}

impl SweepTarget {
    /// The concrete override for one sweep value.
    pub fn select(&self, value: &str) -> OverrideSpec {
        match self {
            SweepTarget::Group(group) => OverrideSpec::GroupSelection {
                group: group.clone(),
                variant: unquote(value.trim()).to_string(),
            },
            SweepTarget::Path(path) => OverrideSpec::ScalarAssignment {
                path: path.clone(),
                value: parse_literal(value),
            },
        }
    }
}

impl fmt::Display for SweepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepTarget::Group(group) => write!(f, "{}", group),
            SweepTarget::Path(path) => write!(f, "{}", path),
        }
    }
}

/// A parsed override.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideSpec {
    GroupSelection { group: String, variant: String },
    ScalarAssignment { path: AttrPath, value: Value },
    MultiValue { target: SweepTarget, values: Vec<String> },
}

impl OverrideSpec {
    pub fn is_multi(&self) -> bool {
        matches!(self, OverrideSpec::MultiValue { .. })
    }
}

impl fmt::Display for OverrideSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideSpec::GroupSelection { group, variant } => write!(f, "{}={}", group, variant),
            OverrideSpec::ScalarAssignment { path, value } => match value {
                Value::String(s) if needs_quotes(s) => {
                    let quote = if s.contains('\'') { '"' } else { '\'' };
                    write!(f, "{}={}{}{}", path, quote, s, quote)
                }
                Value::String(s) => write!(f, "{}={}", path, s),
                other => write!(f, "{}={}", path, other),
            },
            OverrideSpec::MultiValue { target, values } => {
                write!(f, "{}={}", target, values.join(","))
            }
        }
    }
}

/// Parse one `key=value` argument. `is_group` decides whether a dot-free key
/// names a config group.
pub fn parse_override(raw: &str, is_group: impl Fn(&str) -> bool) -> ResolveResult<OverrideSpec> {
    let caps = OVERRIDE_RE
        .captures(raw.trim())
        .ok_or_else(|| ResolveError::invalid_override(raw, "expected key=value"))?;
    let key = &caps[1];
    let value_text = &caps[2];

    let values = split_values(value_text)
        .map_err(|reason| ResolveError::invalid_override(raw, reason))?;
    let group = (!key.contains('.') && is_group(key)).then(|| key.to_string());

    if values.len() > 1 {
        if values.iter().any(|v| v.is_empty()) {
            return Err(ResolveError::invalid_override(raw, "empty value in sweep list"));
        }
        return match group {
            Some(group) => {
                let values: Vec<String> = values.iter().map(|v| unquote(v).to_string()).collect();
                if values.iter().any(|v| v.is_empty()) {
                    return Err(ResolveError::invalid_override(raw, "empty value in sweep list"));
                }
                Ok(OverrideSpec::MultiValue {
                    target: SweepTarget::Group(group),
                    values,
                })
            }
            None => Ok(OverrideSpec::MultiValue {
                target: SweepTarget::Path(parse_path(raw, key)?),
                values,
            }),
        };
    }

    let value = values.into_iter().next().unwrap_or_default();
    match group {
        Some(group) => {
            let variant = unquote(&value);
            if variant.is_empty() {
                return Err(ResolveError::invalid_override(raw, "missing variant name"));
            }
            Ok(OverrideSpec::GroupSelection {
                group,
                variant: variant.to_string(),
            })
        }
        None => Ok(OverrideSpec::ScalarAssignment {
            path: parse_path(raw, key)?,
            value: parse_literal(&value),
        }),
    }
}

/// Parse every argument in order.
pub fn parse_overrides<S: AsRef<str>>(
    args: &[S],
    is_group: impl Fn(&str) -> bool,
) -> ResolveResult<Vec<OverrideSpec>> {
    args.iter()
        .map(|arg| parse_override(arg.as_ref(), &is_group))
        .collect()
}

fn parse_path(raw: &str, key: &str) -> ResolveResult<AttrPath> {
    AttrPath::parse(key).ok_or_else(|| ResolveError::invalid_override(raw, "malformed path"))
}

/// Read a value as a YAML scalar; quoted text is always a string.
pub fn parse_literal(text: &str) -> Value {
    let text = text.trim();
    if text.is_empty() {
        return Value::String(String::new());
    }
    let inner = unquote(text);
    if inner.len() != text.len() {
        return Value::String(inner.to_string());
    }
    serde_yaml::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Strip one pair of matching surrounding quotes.
fn unquote(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

/// True when `text` written bare would not parse back as the same string.
fn needs_quotes(text: &str) -> bool {
    text.trim() != text
        || text.contains([',', '[', ']', '{', '}', '"', '\''])
        || parse_literal(text) != Value::String(text.to_string())
}

/// Split on top-level commas, keeping quoted and bracketed commas.
fn split_values(text: &str) -> Result<Vec<String>, String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '[' | '{') => {
                depth += 1;
                current.push(c);
            }
            (None, ']' | '}') => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced brackets".to_string())?;
                current.push(c);
            }
            (None, ',') if depth == 0 => {
                values.push(current.trim().to_string());
                current.clear();
            }
            (None, c) => current.push(c),
        }
    }
    if quote.is_some() {
        return Err("unterminated quote".to_string());
    }
    if depth != 0 {
        return Err("unbalanced brackets".to_string());
    }
    values.push(current.trim().to_string());
    Ok(values)
}
