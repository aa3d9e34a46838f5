//! Attribute path addressing
//!
//! Paths address into possibly-nested documents with dot-delimited
//! segments, e.g. `address.city` or `tags.0`. Paths are split once at
//! construction and held as segment sequences; descent walks an index-based
//! cursor instead of re-splitting strings at each level.

pub mod wildcard;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A pre-split attribute path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributePath {
    segments: Vec<String>,
}

impl AttributePath {
    /// Parses a dotted path into its segments
    pub fn parse(text: &str) -> Self {
        Self {
            segments: text.split('.').map(str::to_string).collect(),
        }
    }

    /// Builds a path from segments already in hand
    pub fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Returns the segments of this path
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the number of segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Returns true for single-segment (top-level) paths
    pub fn is_top_level(&self) -> bool {
        self.segments.len() == 1
    }

    /// Returns the first segment
    pub fn head(&self) -> &str {
        &self.segments[0]
    }

    /// Returns the last segment
    pub fn leaf(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Returns a new path with one more segment appended
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    /// Returns the parent path, or None at the top level
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Returns the dotted string form
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

impl From<&str> for AttributePath {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_once() {
        let path = AttributePath::parse("address.city");
        assert_eq!(path.segments(), &["address", "city"]);
        assert_eq!(path.depth(), 2);
        assert!(!path.is_top_level());
    }

    #[test]
    fn test_top_level_path() {
        let path = AttributePath::parse("id");
        assert!(path.is_top_level());
        assert_eq!(path.head(), "id");
        assert_eq!(path.leaf(), "id");
        assert_eq!(path.parent(), None);
    }

    #[test]
    fn test_child_and_parent() {
        let path = AttributePath::parse("tags");
        let element = path.child("0");
        assert_eq!(element.dotted(), "tags.0");
        assert_eq!(element.parent().unwrap(), path);
    }

    #[test]
    fn test_display_round_trip() {
        let path = AttributePath::parse("a.b.c");
        assert_eq!(path.to_string(), "a.b.c");
        assert_eq!(AttributePath::parse(&path.to_string()), path);
    }
}
