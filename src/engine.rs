//! Engine bootstrap and lifecycle.
//!
//! Wires discovery, the registry, the cache store, and the shared ports into
//! a dispatcher, then runs every init-capable module once before the first
//! request. A module whose init step fails is disabled with a diagnostic
//! rather than blocking startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use time::Duration;
use tracing::{error, info, warn};

use crate::cache::{CacheBackend, CacheConfig, MemoryStore};
use crate::config::Settings;
use crate::dispatch::{Dispatcher, events};
use crate::modules::{
    InitContext, ModuleCatalog, ModuleHandler, RuntimeConfig, settings_keys, string_setting,
};
use crate::ports::{
    ContentSource, MemoryContent, MemorySettings, SettingsStore, SubstitutionRenderer,
};
use crate::registry::{ConfigDiagnostic, LoaderError, ModuleRegistry, ModuleStatus, discover};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Discovery(#[from] LoaderError),
}

/// Operator-facing engine snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub modules: Vec<ModuleStatus>,
    pub diagnostics: Vec<ConfigDiagnostic>,
    pub cache_entries: usize,
}

/// The assembled system: registry, stores, and the dispatcher over them.
pub struct Engine {
    registry: Arc<ModuleRegistry>,
    cache: Arc<dyn CacheBackend>,
    content: Arc<dyn ContentSource>,
    settings_store: Arc<dyn SettingsStore>,
    runtime: Arc<ArcSwap<RuntimeConfig>>,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Discover modules, load the registry, and run the init phase.
    pub async fn bootstrap(settings: &Settings, catalog: &ModuleCatalog) -> Result<Self, EngineError> {
        let discovery = discover(&settings.engine.modules_dir)?;
        let registry = Arc::new(ModuleRegistry::load(discovery, catalog));

        let cache_config = CacheConfig::from(&settings.cache);
        let cache: Arc<dyn CacheBackend> = Arc::new(MemoryStore::new(&cache_config));
        let content: Arc<dyn ContentSource> = Arc::new(MemoryContent::new());

        let mut seeded = BTreeMap::new();
        seeded.insert(
            settings_keys::THEME.to_string(),
            Value::String(settings.site.theme.clone()),
        );
        seeded.insert(
            settings_keys::CACHE_TTL_SECONDS.to_string(),
            json!(settings.cache.default_ttl_seconds),
        );
        let settings_store: Arc<dyn SettingsStore> = Arc::new(MemorySettings::seeded(seeded));

        let runtime = Arc::new(ArcSwap::from_pointee(RuntimeConfig {
            theme: settings.site.theme.clone(),
            cache_enabled: settings.cache.enabled,
            cache_prefix: settings.cache.prefix.clone(),
            cache_ttl: Duration::seconds(settings.cache.default_ttl_seconds),
        }));

        let dispatcher = Dispatcher::new(
            registry.clone(),
            cache.clone(),
            Arc::new(SubstitutionRenderer),
            content.clone(),
            settings_store.clone(),
            runtime.clone(),
            settings.engine.dependency_timeout,
        );

        let engine = Self {
            registry,
            cache,
            content,
            settings_store,
            runtime,
            dispatcher,
        };
        engine.run_init_phase().await;
        Ok(engine)
    }

    /// Run every enabled init-capable module once, in dispatch order.
    async fn run_init_phase(&self) {
        let init_ctx = InitContext {
            cache: self.cache.clone(),
            content: self.content.clone(),
            settings: self.settings_store.clone(),
        };

        for module in self.registry.init_modules() {
            let name = module.descriptor.name.clone();
            info!(module = %name, event = events::INIT_START, "Module init started");
            match module.handler.init(&init_ctx).await {
                Ok(()) => {
                    info!(module = %name, event = events::INIT_FINISH, "Module init finished");
                }
                Err(init_error) => {
                    error!(
                        module = %name,
                        error = %init_error,
                        "Module init failed; disabling module"
                    );
                    if let Err(registry_error) = self.registry.set_enabled(&name, false) {
                        warn!(
                            module = %name,
                            error = %registry_error,
                            "Failed to disable module after init failure"
                        );
                    }
                }
            }
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<dyn CacheBackend> {
        &self.cache
    }

    pub fn content(&self) -> &Arc<dyn ContentSource> {
        &self.content
    }

    pub fn settings_store(&self) -> &Arc<dyn SettingsStore> {
        &self.settings_store
    }

    /// Operator snapshot: module table, load diagnostics, cache population.
    pub async fn status(&self) -> EngineStatus {
        let cache_entries = self.cache.count().await.unwrap_or(0);
        EngineStatus {
            modules: self.registry.status(),
            diagnostics: self.registry.diagnostics().to_vec(),
            cache_entries,
        }
    }

    /// Rebuild the runtime configuration from the settings store.
    ///
    /// In-flight requests keep the snapshot they started with; the new values
    /// apply from the next dispatch on.
    pub async fn reload(&self) {
        let current = self.runtime.load_full();

        let theme = match string_setting(self.settings_store.as_ref(), settings_keys::THEME).await {
            Ok(Some(theme)) => theme,
            Ok(None) => current.theme.clone(),
            Err(settings_error) => {
                warn!(error = %settings_error, "Reload kept previous theme");
                current.theme.clone()
            }
        };

        let cache_ttl = match self.settings_store.get(settings_keys::CACHE_TTL_SECONDS).await {
            Ok(Some(value)) => value
                .as_i64()
                .map(Duration::seconds)
                .unwrap_or(current.cache_ttl),
            Ok(None) => current.cache_ttl,
            Err(settings_error) => {
                warn!(error = %settings_error, "Reload kept previous cache TTL");
                current.cache_ttl
            }
        };

        let next = RuntimeConfig {
            theme,
            cache_enabled: current.cache_enabled,
            cache_prefix: current.cache_prefix.clone(),
            cache_ttl,
        };
        info!(theme = %next.theme, "Runtime configuration reloaded");
        self.runtime.store(Arc::new(next));
    }
}
