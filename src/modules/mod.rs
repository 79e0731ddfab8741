//! Module implementations and the handler contract.
//!
//! A module is a self-contained unit of request-handling logic: an optional
//! init step run once at engine startup, and a route step run once per
//! request after its dependency gate releases. Implementations are paired
//! with on-disk manifests through the builder catalog at load time.

pub mod chrome;
pub mod content;
pub mod scripts;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;
use thiserror::Error;
use time::Duration;
use uuid::Uuid;

use crate::blocks::BlockAccumulator;
use crate::cache::{self, CacheBackend};
use crate::domain::module::Capabilities;
use crate::ports::{
    ContentError, ContentSource, RenderError, SettingsError, SettingsStore, TemplateRenderer,
};

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("module failed: {message}")]
    Failed { message: String },
}

impl ModuleError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// One incoming page request as the modules see it.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub path: String,
    pub params: BTreeMap<String, String>,
}

impl PageRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }
}

/// Runtime configuration snapshot a request runs under.
///
/// Captured once at dispatch start; a configuration reload only affects
/// requests started after it.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub theme: String,
    pub cache_enabled: bool,
    pub cache_prefix: String,
    pub cache_ttl: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            theme: "default".to_string(),
            cache_enabled: true,
            cache_prefix: "mosaico".to_string(),
            cache_ttl: Duration::seconds(300),
        }
    }
}

/// Everything a module's route step may touch for one request.
#[derive(Clone)]
pub struct RouteContext {
    pub request_id: Uuid,
    pub request: Arc<PageRequest>,
    pub runtime: Arc<RuntimeConfig>,
    pub blocks: Arc<BlockAccumulator>,
    pub cache: Arc<dyn CacheBackend>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub content: Arc<dyn ContentSource>,
    pub settings: Arc<dyn SettingsStore>,
}

impl RouteContext {
    /// Canonical cache key for this request: configured prefix, active theme,
    /// the given components, and the request parameters.
    pub fn cache_key(&self, components: &[&str]) -> String {
        cache::cache_key(
            &self.runtime.cache_prefix,
            &self.runtime.theme,
            components,
            &self.request.params,
        )
    }
}

/// Dependencies available to a module's init step.
#[derive(Clone)]
pub struct InitContext {
    pub cache: Arc<dyn CacheBackend>,
    pub content: Arc<dyn ContentSource>,
    pub settings: Arc<dyn SettingsStore>,
}

/// The module contract.
#[async_trait]
pub trait ModuleHandler: Send + Sync {
    /// Which lifecycle steps this implementation provides. Recorded on the
    /// descriptor at load time so nothing probes at runtime.
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            init: false,
            route: true,
        }
    }

    /// One-time startup step, run inside `init_start`/`init_finish` events.
    async fn init(&self, _ctx: &InitContext) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Per-request route step, run after the dependency gate releases.
    async fn route(&self, ctx: &RouteContext) -> Result<(), ModuleError>;
}

/// Factory producing a fresh handler instance.
pub type ModuleBuilder = Arc<dyn Fn() -> Arc<dyn ModuleHandler> + Send + Sync>;

/// Compiled-in module builders, looked up by manifest name at load time.
static BUILTIN_BUILDERS: Lazy<Vec<(&'static str, fn() -> Arc<dyn ModuleHandler>)>> =
    Lazy::new(|| {
        vec![
            (chrome::MODULE_NAME, chrome::create_chrome_module),
            (content::MODULE_NAME, content::create_content_module),
            (scripts::MODULE_NAME, scripts::create_scripts_module),
        ]
    });

/// Catalog mapping module names to their builders.
#[derive(Clone, Default)]
pub struct ModuleCatalog {
    builders: HashMap<String, ModuleBuilder>,
}

impl ModuleCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog of the compiled-in modules.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for (name, builder) in BUILTIN_BUILDERS.iter() {
            let builder = *builder;
            catalog.register(name, Arc::new(move || builder()));
        }
        catalog
    }

    pub fn register(&mut self, name: &str, builder: ModuleBuilder) {
        self.builders.insert(name.to_string(), builder);
    }

    /// Build a handler for `name`; `None` when no implementation is
    /// registered under that name.
    pub fn build(&self, name: &str) -> Option<Arc<dyn ModuleHandler>> {
        self.builders.get(name).map(|builder| builder())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }
}

/// Well-known settings keys shared between modules and the engine.
pub mod settings_keys {
    /// Active theme identifier.
    pub const THEME: &str = "site.theme";
    /// Site title rendered into the chrome.
    pub const SITE_TITLE: &str = "site.title";
    /// Override for the block cache TTL, in seconds.
    pub const CACHE_TTL_SECONDS: &str = "cache.ttl_seconds";
}

pub use self::{chrome::ChromeModule, content::ContentModule, scripts::ScriptsModule};

/// Helper shared by the built-in modules for reading a string setting.
pub(crate) async fn string_setting(
    settings: &dyn SettingsStore,
    key: &str,
) -> Result<Option<String>, ModuleError> {
    let value = settings.get(key).await?;
    Ok(value.and_then(|value| match value {
        Value::String(text) => Some(text),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_knows_all_compiled_modules() {
        let catalog = ModuleCatalog::builtin();
        for name in ["chrome", "content", "scripts"] {
            assert!(catalog.contains(name), "missing builtin `{name}`");
            assert!(catalog.build(name).is_some());
        }
        assert!(!catalog.contains("unknown"));
    }

    #[test]
    fn catalog_registration_overrides() {
        struct Noop;

        #[async_trait]
        impl ModuleHandler for Noop {
            async fn route(&self, _ctx: &RouteContext) -> Result<(), ModuleError> {
                Ok(())
            }
        }

        let mut catalog = ModuleCatalog::builtin();
        catalog.register("chrome", Arc::new(|| Arc::new(Noop)));
        let handler = catalog.build("chrome").expect("handler");
        assert!(!handler.capabilities().init);
    }
}
