//! Module manifest schema.
//!
//! Each module folder carries a `module.toml` describing the module's
//! identity, category, version, dependencies, and advisory placement. The raw
//! document is deserialized first and then validated into typed fields so a
//! malformed manifest is reported as one configuration diagnostic.

use std::collections::BTreeSet;

use serde::Deserialize;

use super::error::DomainError;
use super::module::{ModuleName, Placement};

pub const MANIFEST_FILE: &str = "module.toml";

/// Validated module manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleManifest {
    pub name: ModuleName,
    pub kind: String,
    pub version: String,
    pub depends_on: BTreeSet<ModuleName>,
    pub placement: Placement,
    pub enabled: bool,
}

impl ModuleManifest {
    /// Parse and validate a `module.toml` document.
    pub fn from_toml(document: &str) -> Result<Self, DomainError> {
        let raw: RawManifest = toml::from_str(document)
            .map_err(|err| DomainError::validation(format!("invalid manifest: {err}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawManifest) -> Result<Self, DomainError> {
        let module = raw.module;
        let name = ModuleName::new(module.name)?;

        let kind = module.kind.trim().to_string();
        if kind.is_empty() {
            return Err(DomainError::validation(format!(
                "module `{name}` manifest is missing `module.kind`"
            )));
        }

        let version = module.version.trim().to_string();
        if version.is_empty() {
            return Err(DomainError::validation(format!(
                "module `{name}` manifest is missing `module.version`"
            )));
        }

        let mut depends_on = BTreeSet::new();
        for dependency in module.depends_on {
            let dependency = ModuleName::new(dependency)?;
            if dependency == name {
                return Err(DomainError::invariant(format!(
                    "module `{name}` declares a dependency on itself"
                )));
            }
            depends_on.insert(dependency);
        }

        Ok(Self {
            name,
            kind,
            version,
            depends_on,
            placement: module.placement,
            enabled: module.enabled,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    module: RawModuleSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawModuleSection {
    name: String,
    kind: String,
    version: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    placement: Placement,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}
