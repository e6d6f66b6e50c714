//! Dotted attribute paths.
//!
//! Paths address values inside raw trees and typed graphs. Segments are
//! separated by `.`; purely numeric segments index into sequences
//! (`structure.features.0.name`). The empty string is the root path.

use std::fmt;

/// One step of an attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// A mapping key or field name.
    Key(String),
    /// A sequence position.
    Index(usize),
}

impl Segment {
    /// The segment as it appears in dotted notation.
    pub fn as_key(&self) -> String {
        match self {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => write!(f, "{}", k),
            Segment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// A parsed dotted path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrPath(Vec<Segment>);

impl AttrPath {
    /// The empty path, addressing the root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse dotted notation. Returns `None` if any segment is empty.
    pub fn parse(dotted: &str) -> Option<Self> {
        let dotted = dotted.trim();
        if dotted.is_empty() {
            return Some(Self::root());
        }
        let mut segments = Vec::new();
        for part in dotted.split('.') {
            if part.is_empty() {
                return None;
            }
            match part.parse::<usize>() {
                Ok(i) => segments.push(Segment::Index(i)),
                Err(_) => segments.push(Segment::Key(part.to_string())),
            }
        }
        Some(Self(segments))
    }

    /// Extend with a field name.
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.into()));
        Self(segments)
    }

    /// Extend with a sequence index.
    pub fn index(&self, i: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(i));
        Self(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `self` equals `other` or lies underneath it.
    pub fn starts_with(&self, other: &AttrPath) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Dotted rendering of the first `n` segments.
    pub fn prefix(&self, n: usize) -> AttrPath {
        AttrPath(self.0[..n.min(self.0.len())].to_vec())
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_segments() {
        let path = AttrPath::parse("structure.features.2.name").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("structure".into()),
                Segment::Key("features".into()),
                Segment::Index(2),
                Segment::Key("name".into()),
            ]
        );
        assert_eq!(path.to_string(), "structure.features.2.name");
    }

    #[test]
    fn test_empty_is_root() {
        let path = AttrPath::parse("").unwrap();
        assert!(path.is_root());
        assert_eq!(path.to_string(), "<root>");
    }

    #[test]
    fn test_rejects_empty_segment() {
        assert!(AttrPath::parse("a..b").is_none());
        assert!(AttrPath::parse(".a").is_none());
        assert!(AttrPath::parse("a.").is_none());
    }

    #[test]
    fn test_starts_with() {
        let parent = AttrPath::parse("hyperparameters").unwrap();
        let child = parent.child("learning_rate");
        assert!(child.starts_with(&parent));
        assert!(!parent.starts_with(&child));
        assert_eq!(child.prefix(1), parent);
    }
}
