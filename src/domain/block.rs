//! Block identity types.
//!
//! Blocks are named regions of accumulated page content. Names are dotted
//! hierarchies (`header`, `scripts.analytics`, `footer.dev.tools`); patterns
//! match over those names segment by segment.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Validated dotted block name.
///
/// Each segment follows the module-name charset (lowercase ASCII head,
/// `_`/`-`/digits after). Segments are separated by single dots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockName(String);

impl BlockName {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::validation("block name must not be empty"));
        }
        for segment in name.split('.') {
            if !valid_segment(segment) {
                return Err(DomainError::validation(format!(
                    "block name `{name}` has invalid segment `{segment}`"
                )));
            }
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate the dotted segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BlockName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BlockName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BlockName> for String {
    fn from(name: BlockName) -> Self {
        name.0
    }
}

/// Segment-wise pattern over block names.
///
/// A `*` segment matches exactly one segment; a trailing `*` matches any
/// remaining suffix, including none (`scripts.*` matches `scripts` and
/// `scripts.site.inline`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPattern {
    segments: Vec<PatternSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Wildcard,
}

impl BlockPattern {
    pub fn new(pattern: impl AsRef<str>) -> Result<Self, DomainError> {
        let pattern = pattern.as_ref();
        if pattern.is_empty() {
            return Err(DomainError::validation("block pattern must not be empty"));
        }
        let mut segments = Vec::new();
        for segment in pattern.split('.') {
            if segment == "*" {
                segments.push(PatternSegment::Wildcard);
            } else if valid_segment(segment) {
                segments.push(PatternSegment::Literal(segment.to_string()));
            } else {
                return Err(DomainError::validation(format!(
                    "block pattern `{pattern}` has invalid segment `{segment}`"
                )));
            }
        }
        Ok(Self { segments })
    }

    pub fn matches(&self, name: &BlockName) -> bool {
        let mut segments = name.segments();
        for (index, pattern) in self.segments.iter().enumerate() {
            let trailing_wildcard =
                index == self.segments.len() - 1 && *pattern == PatternSegment::Wildcard;
            if trailing_wildcard {
                return true;
            }
            match (segments.next(), pattern) {
                (Some(actual), PatternSegment::Literal(expected)) if actual == expected => {}
                (Some(_), PatternSegment::Wildcard) => {}
                _ => return false,
            }
        }
        segments.next().is_none()
    }
}

fn valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    let valid_head = chars.next().is_some_and(|ch| ch.is_ascii_lowercase());
    let valid_tail =
        chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-');
    valid_head && valid_tail
}
