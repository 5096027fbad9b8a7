//! Paths into a configuration tree.
//!
//! A path is a sequence of segments, each either a map key or a list index.
//! The dotted text form (`routeSets.main.routes.0`) is accepted for
//! convenience; all-digit segments parse as indices.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of an [`OverridePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Position in a list
    Index(usize),
    /// Key in a map
    Key(String),
}

impl PathSegment {
    /// The segment as a map key (indices are stringified).
    pub fn as_key(&self) -> String {
        match self {
            PathSegment::Key(k) => k.clone(),
            PathSegment::Index(i) => i.to_string(),
        }
    }

    /// The segment as a list index, if it is one or parses as one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Index(i) => Some(*i),
            PathSegment::Key(k) => k.parse().ok(),
        }
    }

    /// Whether two segments address the same slot regardless of spelling.
    pub fn matches(&self, other: &PathSegment) -> bool {
        self.as_key() == other.as_key()
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{}", k),
            PathSegment::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Location of a value inside a configuration tree.
///
/// The empty path addresses the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverridePath(Vec<PathSegment>);

impl OverridePath {
    /// The root path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from segments.
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Parse a dotted path. Empty input is the root; all-digit segments
    /// become indices.
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }
        Self(
            dotted
                .split('.')
                .map(|part| match part.parse::<usize>() {
                    Ok(i) if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) => {
                        PathSegment::Index(i)
                    }
                    _ => PathSegment::Key(part.to_string()),
                })
                .collect(),
        )
    }

    /// Path to a single item of a keyed collection.
    pub fn item(id: &str) -> Self {
        Self(vec![PathSegment::Key(id.to_string())])
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Key of the first segment; for a collection document this is the item id.
    pub fn first_key(&self) -> Option<String> {
        self.0.first().map(PathSegment::as_key)
    }

    /// Whether `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &OverridePath) -> bool {
        prefix.0.len() <= self.0.len()
            && prefix.0.iter().zip(&self.0).all(|(a, b)| a.matches(b))
    }

    /// Remainder of this path below `prefix`.
    pub fn strip_prefix(&self, prefix: &OverridePath) -> Option<OverridePath> {
        if self.starts_with(prefix) {
            Some(Self(self.0[prefix.0.len()..].to_vec()))
        } else {
            None
        }
    }

    /// Append `rest` below this path.
    pub fn join(&self, rest: &OverridePath) -> OverridePath {
        let mut segments = self.0.clone();
        segments.extend(rest.0.iter().cloned());
        Self(segments)
    }

    /// Append a single segment.
    pub fn child(&self, segment: impl Into<PathSegment>) -> OverridePath {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Same path with the first segment replaced.
    pub fn with_first(&self, segment: impl Into<PathSegment>) -> OverridePath {
        let mut segments = self.0.clone();
        match segments.first_mut() {
            Some(first) => *first = segment.into(),
            None => segments.push(segment.into()),
        }
        Self(segments)
    }
}

impl From<Vec<PathSegment>> for OverridePath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for OverridePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
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
    fn test_parse_dotted() {
        let path = OverridePath::parse("main.routes.0.mappedLayer");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("main".into()),
                PathSegment::Key("routes".into()),
                PathSegment::Index(0),
                PathSegment::Key("mappedLayer".into()),
            ]
        );
        assert_eq!(path.to_string(), "main.routes.0.mappedLayer");
    }

    #[test]
    fn test_parse_empty_is_root() {
        assert!(OverridePath::parse("").is_root());
    }

    #[test]
    fn test_prefix_matching_ignores_segment_spelling() {
        let path = OverridePath::new(vec!["a".into(), PathSegment::Index(2), "b".into()]);
        let prefix = OverridePath::new(vec!["a".into(), "2".into()]);
        assert!(path.starts_with(&prefix));
        assert_eq!(path.strip_prefix(&prefix), Some(OverridePath::parse("b")));
        assert!(!prefix.starts_with(&path));
    }

    #[test]
    fn test_serde_untagged_segments() {
        let path: OverridePath = serde_json::from_str(r#"["a", 1, "b"]"#).unwrap();
        assert_eq!(path, OverridePath::parse("a.1.b"));
        assert_eq!(serde_json::to_string(&path).unwrap(), r#"["a",1,"b"]"#);
    }

    #[test]
    fn test_with_first_renames_item() {
        let path = OverridePath::parse("old.name");
        assert_eq!(path.with_first("new"), OverridePath::parse("new.name"));
    }
}
