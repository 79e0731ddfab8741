//! The per-request dispatch loop.
//!
//! One dispatch takes an immutable snapshot of the enabled modules, builds a
//! coordinator and a block accumulator scoped to the request, and runs every
//! module's route step concurrently. Modules whose dependency gate never
//! releases are abandoned with a visible diagnostic; a failing handler
//! degrades its own output, never the page. The request ends by composing
//! the accumulated blocks into a response.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use futures::future::join_all;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blocks::BlockAccumulator;
use crate::cache::CacheBackend;
use crate::domain::block::BlockName;
use crate::domain::module::ModuleName;
use crate::modules::{ModuleHandler, PageRequest, RouteContext, RuntimeConfig};
use crate::ports::{ContentSource, SettingsStore, TemplateRenderer};
use crate::registry::{ModuleRegistry, SnapshotModule};

use super::coordinator::Coordinator;
use super::progress::AbandonReason;
use super::render::{self, DIAGNOSTICS_BLOCK, RenderedPage};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no modules are enabled")]
    NoModules,
}

/// Terminal outcome of one module within one request.
#[derive(Debug, Clone)]
pub enum ModuleOutcome {
    Routed { duration: Duration },
    Failed { error: String, duration: Duration },
    Abandoned { reason: AbandonReason },
}

impl ModuleOutcome {
    pub fn is_routed(&self) -> bool {
        matches!(self, ModuleOutcome::Routed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ModuleReport {
    pub module: ModuleName,
    pub outcome: ModuleOutcome,
    pub started: Option<Instant>,
    pub finished: Option<Instant>,
}

/// What happened during one dispatch, module by module.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub request_id: Uuid,
    pub modules: Vec<ModuleReport>,
    /// The primary content region stayed empty and at least one module did
    /// not route. The host surface turns this into an error response.
    pub primary_failure: bool,
}

pub struct DispatchOutcome {
    pub page: RenderedPage,
    pub report: DispatchReport,
}

/// Runs requests against the registry.
pub struct Dispatcher {
    registry: Arc<ModuleRegistry>,
    cache: Arc<dyn CacheBackend>,
    renderer: Arc<dyn TemplateRenderer>,
    content: Arc<dyn ContentSource>,
    settings: Arc<dyn SettingsStore>,
    runtime: Arc<ArcSwap<RuntimeConfig>>,
    dependency_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        cache: Arc<dyn CacheBackend>,
        renderer: Arc<dyn TemplateRenderer>,
        content: Arc<dyn ContentSource>,
        settings: Arc<dyn SettingsStore>,
        runtime: Arc<ArcSwap<RuntimeConfig>>,
        dependency_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            renderer,
            content,
            settings,
            runtime,
            dependency_timeout,
        }
    }

    /// Dispatch one request through every enabled module.
    pub async fn dispatch(&self, request: PageRequest) -> Result<DispatchOutcome, DispatchError> {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            return Err(DispatchError::NoModules);
        }

        let request_id = Uuid::new_v4();
        let dispatch_started = Instant::now();
        let runtime = self.runtime.load_full();
        let blocks = Arc::new(BlockAccumulator::new());
        let coordinator = Arc::new(Coordinator::new(
            request_id,
            snapshot.members(),
            self.dependency_timeout,
        ));

        let ctx = RouteContext {
            request_id,
            request: Arc::new(request),
            runtime,
            blocks: blocks.clone(),
            cache: self.cache.clone(),
            renderer: self.renderer.clone(),
            content: self.content.clone(),
            settings: self.settings.clone(),
        };

        debug!(
            request_id = %request_id,
            path = %ctx.request.path,
            modules = snapshot.len(),
            "Dispatch started"
        );

        let runs = snapshot
            .modules()
            .iter()
            .map(|module| run_module(module, &ctx, &coordinator));
        let mut reports: Vec<ModuleReport> = join_all(runs).await;

        for report in &mut reports {
            if let Some(view) = coordinator.view(&report.module) {
                report.started = view.started;
                report.finished = view.finished;
            }
        }

        let primary_failure = render::body_is_empty(&blocks)
            && reports.iter().any(|report| !report.outcome.is_routed());
        let page = render::compose(&blocks);

        let elapsed = dispatch_started.elapsed();
        histogram!("mosaico_dispatch_duration_seconds").record(elapsed.as_secs_f64());
        counter!("mosaico_dispatch_total").increment(1);
        info!(
            request_id = %request_id,
            path = %ctx.request.path,
            duration_ms = elapsed.as_millis() as u64,
            primary_failure,
            "Dispatch finished"
        );

        Ok(DispatchOutcome {
            page,
            report: DispatchReport {
                request_id,
                modules: reports,
                primary_failure,
            },
        })
    }
}

fn diagnostics_block() -> BlockName {
    BlockName::new(DIAGNOSTICS_BLOCK).expect("static block name")
}

/// Run one module's route step: gate, route, report.
async fn run_module(
    module: &SnapshotModule,
    ctx: &RouteContext,
    coordinator: &Coordinator,
) -> ModuleReport {
    let name = module.descriptor.name.clone();

    if let Err(failure) = coordinator.wait_for_dependencies(&name).await {
        let reason = failure.reason();
        warn!(
            request_id = %ctx.request_id,
            module = %name,
            reason = %reason,
            "Module abandoned for this request"
        );
        counter!("mosaico_module_abandoned_total").increment(1);
        ctx.blocks.append(&diagnostics_block(), failure.to_string());
        if let Err(error) = coordinator.abandon(&name, reason.clone()) {
            warn!(module = %name, error = %error, "Failed to record abandonment");
        }
        return ModuleReport {
            module: name,
            outcome: ModuleOutcome::Abandoned { reason },
            started: None,
            finished: None,
        };
    }

    let started = match coordinator.route_start(&name) {
        Ok(started) => started,
        Err(error) => {
            warn!(module = %name, error = %error, "Module could not start routing");
            return ModuleReport {
                module: name,
                outcome: ModuleOutcome::Failed {
                    error: error.to_string(),
                    duration: Duration::ZERO,
                },
                started: None,
                finished: None,
            };
        }
    };

    let result = module.handler.route(ctx).await;

    // A failed handler still reaches `route_finish`: its dependents keep
    // their contract of "ran after", degraded output and all.
    let duration = match coordinator.route_finish(&name) {
        Ok(duration) => duration,
        Err(error) => {
            warn!(module = %name, error = %error, "Failed to record route finish");
            started.elapsed()
        }
    };

    match result {
        Ok(()) => ModuleReport {
            module: name,
            outcome: ModuleOutcome::Routed { duration },
            started: None,
            finished: None,
        },
        Err(error) => {
            warn!(
                request_id = %ctx.request_id,
                module = %name,
                error = %error,
                "Module route step failed"
            );
            counter!("mosaico_module_failed_total").increment(1);
            ctx.blocks.append(
                &diagnostics_block(),
                format!("module `{name}` failed: {error}"),
            );
            ModuleReport {
                module: name,
                outcome: ModuleOutcome::Failed {
                    error: error.to_string(),
                    duration,
                },
                started: None,
                finished: None,
            }
        }
    }
}
