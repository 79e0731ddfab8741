//! Module identity and descriptor types.
//!
//! A module is a self-contained unit of request-handling logic. Its
//! descriptor is built once at load time from an on-disk manifest paired
//! with a registered implementation, and is only ever mutated through
//! explicit enable/disable administration.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Validated module identifier.
///
/// Lowercase ASCII, starting with a letter, with `_` and `-` allowed after
/// the first character. Module names double as directory names and as cache
/// key components, so the charset stays deliberately narrow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleName(String);

impl ModuleName {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|ch| ch.is_ascii_lowercase());
        let valid_tail = chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' || ch == '-');
        if !valid_head || !valid_tail {
            return Err(DomainError::validation(format!(
                "module name `{name}` must be lowercase ascii starting with a letter"
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ModuleName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModuleName> for String {
    fn from(name: ModuleName) -> Self {
        name.0
    }
}

/// Advisory position of a module in the dispatch order.
///
/// Placement tunes invocation order for performance; correctness ordering
/// between modules comes from the coordinator's dependency gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    First,
    #[default]
    Normal,
    Last,
}

impl Placement {
    pub fn as_str(self) -> &'static str {
        match self {
            Placement::First => "first",
            Placement::Normal => "normal",
            Placement::Last => "last",
        }
    }
}

/// Which lifecycle steps an implementation actually provides.
///
/// Recorded at load time so dispatch never has to probe at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub init: bool,
    pub route: bool,
}

/// Fully-resolved module descriptor owned by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: ModuleName,
    pub kind: String,
    pub version: String,
    pub depends_on: BTreeSet<ModuleName>,
    pub placement: Placement,
    pub capabilities: Capabilities,
    pub enabled: bool,
}
