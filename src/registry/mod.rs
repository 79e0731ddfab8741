//! Process-wide module registry.
//!
//! Owns every module descriptor for the lifetime of the process. Load pairs
//! discovered manifests with implementations from the builder catalog,
//! validates the dependency graph, and keeps configuration diagnostics for
//! the operator surface. Dispatch works from immutable snapshots so an
//! enable/disable flip is never observed mid-request.

pub mod graph;
pub mod loader;

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::manifest::ModuleManifest;
use crate::domain::module::{ModuleDescriptor, ModuleName, Placement};
use crate::modules::{ModuleCatalog, ModuleHandler};
use crate::util::lock::{rw_read, rw_write};

pub use graph::GraphIssue;
pub use loader::{ConfigDiagnostic, Discovery, LoaderError, discover};

const SOURCE: &str = "registry";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown module `{name}`")]
    UnknownModule { name: ModuleName },
}

/// One registered module: its descriptor plus the handler instance.
#[derive(Clone)]
pub struct SnapshotModule {
    pub descriptor: ModuleDescriptor,
    pub handler: Arc<dyn ModuleHandler>,
}

/// Immutable view of the enabled modules taken at dispatch start.
#[derive(Clone, Default)]
pub struct DispatchSnapshot {
    modules: Vec<SnapshotModule>,
}

impl DispatchSnapshot {
    /// Modules in dispatch order.
    pub fn modules(&self) -> &[SnapshotModule] {
        &self.modules
    }

    pub fn contains(&self, name: &ModuleName) -> bool {
        self.modules
            .iter()
            .any(|module| module.descriptor.name == *name)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// `(module, depends_on)` pairs for the coordinator.
    pub fn members(&self) -> Vec<(ModuleName, BTreeSet<ModuleName>)> {
        self.modules
            .iter()
            .map(|module| {
                (
                    module.descriptor.name.clone(),
                    module.descriptor.depends_on.clone(),
                )
            })
            .collect()
    }
}

/// Operator-facing view of one registered module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleStatus {
    pub name: ModuleName,
    pub kind: String,
    pub version: String,
    pub enabled: bool,
    pub placement: String,
    pub depends_on: Vec<ModuleName>,
}

struct Slot {
    descriptor: ModuleDescriptor,
    handler: Arc<dyn ModuleHandler>,
}

/// Process-wide table of registered modules.
pub struct ModuleRegistry {
    // Discovery order; dispatch order is derived from placement over it.
    slots: RwLock<Vec<Slot>>,
    diagnostics: Vec<ConfigDiagnostic>,
}

impl ModuleRegistry {
    /// Pair discovered manifests with catalog implementations.
    ///
    /// Configuration problems block only the affected modules: cycle members
    /// and manifests without an implementation are excluded with diagnostics;
    /// a module with an unknown dependency still registers (its gate is
    /// permanently unsatisfiable and surfaced per dispatch).
    pub fn load(discovery: Discovery, catalog: &ModuleCatalog) -> Self {
        let mut diagnostics = discovery.diagnostics;
        let issues = graph::validate(&discovery.manifests);
        let excluded = graph::cycle_members(&issues);

        for issue in &issues {
            warn!(issue = %issue, "Module graph issue");
            let subject = match issue {
                GraphIssue::UnknownDependency { module, .. } => module.to_string(),
                GraphIssue::Cycle { path } => path
                    .first()
                    .map(ModuleName::to_string)
                    .unwrap_or_default(),
            };
            diagnostics.push(ConfigDiagnostic::new(subject, issue.to_string()));
        }

        let mut slots = Vec::new();
        for manifest in discovery.manifests {
            if excluded.contains(&manifest.name) {
                continue;
            }
            let Some(handler) = catalog.build(manifest.name.as_str()) else {
                warn!(module = %manifest.name, "No implementation registered for manifest");
                diagnostics.push(ConfigDiagnostic::new(
                    manifest.name.to_string(),
                    "no implementation registered for this module name",
                ));
                continue;
            };

            let descriptor = descriptor_from(&manifest, handler.as_ref());
            info!(
                module = %descriptor.name,
                kind = %descriptor.kind,
                placement = descriptor.placement.as_str(),
                enabled = descriptor.enabled,
                "Registered module"
            );
            slots.push(Slot {
                descriptor,
                handler,
            });
        }

        Self {
            slots: RwLock::new(slots),
            diagnostics,
        }
    }

    /// Flip a module's enabled flag.
    ///
    /// Snapshots taken before the flip keep the previous state; the change
    /// applies from the next snapshot on.
    pub fn set_enabled(&self, name: &ModuleName, enabled: bool) -> Result<(), RegistryError> {
        let mut slots = rw_write(&self.slots, SOURCE, "set_enabled");
        let slot = slots
            .iter_mut()
            .find(|slot| slot.descriptor.name == *name)
            .ok_or_else(|| RegistryError::UnknownModule { name: name.clone() })?;
        slot.descriptor.enabled = enabled;
        info!(module = %name, enabled, "Module enabled state changed");
        Ok(())
    }

    /// Names in dispatch order, regardless of enabled state.
    pub fn dispatch_order(&self) -> Vec<ModuleName> {
        let slots = rw_read(&self.slots, SOURCE, "dispatch_order");
        order_by_placement(slots.iter())
            .map(|slot| slot.descriptor.name.clone())
            .collect()
    }

    /// Enabled modules in dispatch order, frozen for one request.
    pub fn snapshot(&self) -> DispatchSnapshot {
        let slots = rw_read(&self.slots, SOURCE, "snapshot");
        let modules = order_by_placement(slots.iter())
            .filter(|slot| slot.descriptor.enabled)
            .map(|slot| SnapshotModule {
                descriptor: slot.descriptor.clone(),
                handler: slot.handler.clone(),
            })
            .collect();
        DispatchSnapshot { modules }
    }

    /// Every registered module with the init capability, in dispatch order.
    pub fn init_modules(&self) -> Vec<SnapshotModule> {
        let slots = rw_read(&self.slots, SOURCE, "init_modules");
        order_by_placement(slots.iter())
            .filter(|slot| slot.descriptor.enabled && slot.descriptor.capabilities.init)
            .map(|slot| SnapshotModule {
                descriptor: slot.descriptor.clone(),
                handler: slot.handler.clone(),
            })
            .collect()
    }

    pub fn status(&self) -> Vec<ModuleStatus> {
        let slots = rw_read(&self.slots, SOURCE, "status");
        order_by_placement(slots.iter())
            .map(|slot| ModuleStatus {
                name: slot.descriptor.name.clone(),
                kind: slot.descriptor.kind.clone(),
                version: slot.descriptor.version.clone(),
                enabled: slot.descriptor.enabled,
                placement: slot.descriptor.placement.as_str().to_string(),
                depends_on: slot.descriptor.depends_on.iter().cloned().collect(),
            })
            .collect()
    }

    /// Load-time configuration diagnostics, in the order they were found.
    pub fn diagnostics(&self) -> &[ConfigDiagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        rw_read(&self.slots, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Placement-ordered iteration: run-first modules, then normal, then
/// run-last, each group in discovery order.
fn order_by_placement<'a>(
    slots: impl Iterator<Item = &'a Slot> + Clone,
) -> impl Iterator<Item = &'a Slot> {
    let firsts = slots
        .clone()
        .filter(|slot| slot.descriptor.placement == Placement::First);
    let normals = slots
        .clone()
        .filter(|slot| slot.descriptor.placement == Placement::Normal);
    let lasts = slots.filter(|slot| slot.descriptor.placement == Placement::Last);
    firsts.chain(normals).chain(lasts)
}

fn descriptor_from(manifest: &ModuleManifest, handler: &dyn ModuleHandler) -> ModuleDescriptor {
    ModuleDescriptor {
        name: manifest.name.clone(),
        kind: manifest.kind.clone(),
        version: manifest.version.clone(),
        depends_on: manifest.depends_on.clone(),
        placement: manifest.placement,
        capabilities: handler.capabilities(),
        enabled: manifest.enabled,
    }
}
