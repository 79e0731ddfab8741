//! Collaborator interfaces.
//!
//! The engine core consumes transport, templating, persistence, and runtime
//! settings through narrow traits. Minimal in-memory implementations live
//! beside each trait so the host binary and the tests run without external
//! services; real deployments swap richer implementations in.

mod content;
mod renderer;
mod router;
mod settings;

pub use content::{ContentError, ContentSource, MemoryContent};
pub use renderer::{RenderError, SubstitutionRenderer, TemplateRenderer};
pub use router::{RouteEntry, RouteOptions, RouteTable};
pub use settings::{MemorySettings, SettingsError, SettingsStore};
