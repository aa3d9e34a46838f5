//! Wildcard path matching for the save-unknown policy
//!
//! An allow-list is either a blanket boolean or a list of patterns. Each
//! pattern is a delimiter-split sequence of literal segments, `*` (exactly
//! one segment, any value), or `**` (the rest of the path, unconditionally).
//!
//! A pattern that runs out before the path does is a mismatch unless the
//! settings permit prefixes, in which case an exhausted pattern that matched
//! every consumed segment counts as a match.

use serde::{Deserialize, Serialize};

/// One segment of a wildcard pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternSegment {
    /// Must equal the path segment exactly
    Literal(String),
    /// Matches any single segment
    Any,
    /// Matches the remainder of the path
    Rest,
}

/// A pre-split wildcard pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPattern {
    segments: Vec<PatternSegment>,
}

impl PathPattern {
    /// Parses a pattern, splitting on the given delimiter
    pub fn parse(text: &str, split: char) -> Self {
        let segments = text
            .split(split)
            .map(|segment| match segment {
                "*" => PatternSegment::Any,
                "**" => PatternSegment::Rest,
                literal => PatternSegment::Literal(literal.to_string()),
            })
            .collect();
        Self { segments }
    }

    /// Walks this pattern against path segments left to right
    pub fn matches(&self, path: &[&str], prefixes_disallowed: bool) -> bool {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PatternSegment::Rest => return true,
                _ if i >= path.len() => return false,
                PatternSegment::Any => {}
                PatternSegment::Literal(literal) => {
                    if literal != path[i] {
                        return false;
                    }
                }
            }
        }
        // Pattern exhausted: exact-length match, or an allowed prefix
        path.len() == self.segments.len() || !prefixes_disallowed
    }
}

/// Settings for allow-list matching
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    /// Delimiter used to split paths and patterns
    pub split: char,
    /// When true (the default), a pattern may not match a strict prefix of
    /// the path
    pub prefixes_disallowed: bool,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            split: '.',
            prefixes_disallowed: true,
        }
    }
}

/// An allow-list: blanket boolean or wildcard patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AllowList {
    /// Short-circuit: allow everything or nothing
    Allow(bool),
    /// Allow paths matched by at least one pattern
    Patterns(Vec<PathPattern>),
}

impl AllowList {
    /// Allow-list admitting every path
    pub fn all() -> Self {
        AllowList::Allow(true)
    }

    /// Allow-list admitting no path
    pub fn none() -> Self {
        AllowList::Allow(false)
    }

    /// Allow-list built from pattern strings, split per the settings
    pub fn patterns<I, S>(patterns: I, settings: &MatchSettings) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        AllowList::Patterns(
            patterns
                .into_iter()
                .map(|p| PathPattern::parse(p.as_ref(), settings.split))
                .collect(),
        )
    }

    /// Returns true if any pattern matches the dotted path
    pub fn matches(&self, path: &str, settings: &MatchSettings) -> bool {
        let segments: Vec<&str> = path.split(settings.split).collect();
        self.matches_segments(&segments, settings)
    }

    /// Returns true if any pattern matches the pre-split path
    pub fn matches_segments(&self, path: &[&str], settings: &MatchSettings) -> bool {
        match self {
            AllowList::Allow(allowed) => *allowed,
            AllowList::Patterns(patterns) => patterns
                .iter()
                .any(|pattern| pattern.matches(path, settings.prefixes_disallowed)),
        }
    }
}
