//! End-to-end scenarios driven through engine bootstrap: real module
//! directories on disk, custom handlers, and full dispatches.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use mosaico::cache::CacheBackend;
use mosaico::config::{
    CacheSettings, EngineSettings, LogFormat, LoggingSettings, ServerSettings, Settings,
    SiteSettings,
};
use mosaico::domain::block::BlockName;
use mosaico::domain::module::ModuleName;
use mosaico::engine::Engine;
use mosaico::modules::{ModuleCatalog, ModuleError, ModuleHandler, PageRequest, RouteContext};
use mosaico::ports::ContentSource;

fn write_module(root: &Path, folder: &str, manifest: &str) {
    let dir = root.join(folder);
    fs::create_dir_all(&dir).expect("module dir");
    fs::write(dir.join("module.toml"), manifest).expect("manifest");
}

fn settings_for(modules_dir: &Path) -> Settings {
    Settings {
        server: ServerSettings {
            addr: "127.0.0.1:0".parse().expect("addr"),
            graceful_shutdown: std::time::Duration::from_secs(5),
        },
        logging: LoggingSettings {
            level: tracing::level_filters::LevelFilter::INFO,
            format: LogFormat::Compact,
        },
        engine: EngineSettings {
            modules_dir: modules_dir.to_path_buf(),
            dependency_timeout: std::time::Duration::from_millis(500),
        },
        cache: CacheSettings {
            enabled: true,
            default_ttl_seconds: 300,
            prefix: "mosaico".to_string(),
        },
        site: SiteSettings {
            theme: "default".to_string(),
        },
    }
}

struct Appender {
    fragment: &'static str,
}

#[async_trait]
impl ModuleHandler for Appender {
    async fn route(&self, ctx: &RouteContext) -> Result<(), ModuleError> {
        ctx.blocks
            .append(&BlockName::new("body").expect("block"), self.fragment);
        Ok(())
    }
}

/// Pauses inside `route` until the test releases it.
struct Paused {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl ModuleHandler for Paused {
    async fn route(&self, ctx: &RouteContext) -> Result<(), ModuleError> {
        self.entered.notify_one();
        self.release.notified().await;
        ctx.blocks
            .append(&BlockName::new("body").expect("block"), "paused-module");
        Ok(())
    }
}

#[tokio::test]
async fn disable_mid_request_affects_later_requests_only() {
    let root = TempDir::new().expect("tempdir");
    write_module(
        root.path(),
        "paused",
        "[module]\nname = \"paused\"\nkind = \"test\"\nversion = \"1.0.0\"\n",
    );
    write_module(
        root.path(),
        "plain",
        "[module]\nname = \"plain\"\nkind = \"test\"\nversion = \"1.0.0\"\n",
    );

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let mut catalog = ModuleCatalog::empty();
    {
        let entered = entered.clone();
        let release = release.clone();
        catalog.register(
            "paused",
            Arc::new(move || {
                Arc::new(Paused {
                    entered: entered.clone(),
                    release: release.clone(),
                })
            }),
        );
    }
    catalog.register("plain", Arc::new(|| Arc::new(Appender { fragment: "plain" })));

    let engine = Arc::new(
        Engine::bootstrap(&settings_for(root.path()), &catalog)
            .await
            .expect("bootstrap"),
    );

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.dispatcher().dispatch(PageRequest::new("/")).await })
    };

    // Wait until the paused module is mid-route, flip it off, then let the
    // in-flight request complete.
    entered.notified().await;
    engine
        .registry()
        .set_enabled(&ModuleName::new("paused").expect("name"), false)
        .expect("set_enabled");
    release.notify_one();

    let first = first.await.expect("join").expect("dispatch");
    assert!(first.page.html.contains("paused-module"));

    let second = engine
        .dispatcher()
        .dispatch(PageRequest::new("/"))
        .await
        .expect("dispatch");
    assert!(!second.page.html.contains("paused-module"));
    assert!(second.page.html.contains("plain"));
}

#[tokio::test]
async fn declared_order_holds_across_requests() {
    let root = TempDir::new().expect("tempdir");
    write_module(
        root.path(),
        "base",
        "[module]\nname = \"base\"\nkind = \"test\"\nversion = \"1.0.0\"\n",
    );
    write_module(
        root.path(),
        "dependent",
        "[module]\nname = \"dependent\"\nkind = \"test\"\nversion = \"1.0.0\"\ndepends_on = [\"base\"]\n",
    );
    write_module(
        root.path(),
        "first",
        "[module]\nname = \"first\"\nkind = \"test\"\nversion = \"1.0.0\"\nplacement = \"first\"\n",
    );

    let mut catalog = ModuleCatalog::empty();
    catalog.register("base", Arc::new(|| Arc::new(Appender { fragment: "base" })));
    catalog.register(
        "dependent",
        Arc::new(|| {
            Arc::new(Appender {
                fragment: "dependent",
            })
        }),
    );
    catalog.register("first", Arc::new(|| Arc::new(Appender { fragment: "first" })));

    let engine = Engine::bootstrap(&settings_for(root.path()), &catalog)
        .await
        .expect("bootstrap");

    for _ in 0..5 {
        let outcome = engine
            .dispatcher()
            .dispatch(PageRequest::new("/"))
            .await
            .expect("dispatch");

        // Run-first placement leads the snapshot even though `first` sorts
        // after `base` and `dependent` on disk.
        assert_eq!(outcome.report.modules[0].module.as_str(), "first");
        assert!(outcome.report.modules.iter().all(|r| r.outcome.is_routed()));

        let base = outcome
            .report
            .modules
            .iter()
            .find(|report| report.module.as_str() == "base")
            .expect("base report");
        let dependent = outcome
            .report
            .modules
            .iter()
            .find(|report| report.module.as_str() == "dependent")
            .expect("dependent report");

        assert!(
            base.finished.expect("base finished")
                <= dependent.started.expect("dependent started")
        );
    }
}

#[tokio::test]
async fn unsatisfiable_dependency_is_visible_and_contained() {
    let root = TempDir::new().expect("tempdir");
    write_module(
        root.path(),
        "healthy",
        "[module]\nname = \"healthy\"\nkind = \"test\"\nversion = \"1.0.0\"\n",
    );
    write_module(
        root.path(),
        "orphan",
        "[module]\nname = \"orphan\"\nkind = \"test\"\nversion = \"1.0.0\"\ndepends_on = [\"missing\"]\n",
    );

    let mut catalog = ModuleCatalog::empty();
    catalog.register(
        "healthy",
        Arc::new(|| {
            Arc::new(Appender {
                fragment: "healthy",
            })
        }),
    );
    catalog.register("orphan", Arc::new(|| Arc::new(Appender { fragment: "orphan" })));

    let engine = Engine::bootstrap(&settings_for(root.path()), &catalog)
        .await
        .expect("bootstrap");

    let outcome = engine
        .dispatcher()
        .dispatch(PageRequest::new("/"))
        .await
        .expect("dispatch");

    assert!(outcome.page.html.contains("healthy"));
    assert!(!outcome.page.html.contains("orphan"));
    assert!(outcome.page.html.contains("dispatch-diagnostics"));
    assert!(!outcome.report.primary_failure);

    // The load-time diagnostic is also on the operator surface.
    let status = engine.status().await;
    assert!(
        status
            .diagnostics
            .iter()
            .any(|diag| diag.message.contains("unknown module"))
    );
}

#[tokio::test]
async fn request_params_shape_the_cache_key() {
    let root = TempDir::new().expect("tempdir");
    write_module(
        root.path(),
        "content",
        "[module]\nname = \"content\"\nkind = \"core\"\nversion = \"1.0.0\"\n",
    );

    let engine = Engine::bootstrap(&settings_for(root.path()), &ModuleCatalog::builtin())
        .await
        .expect("bootstrap");
    engine
        .content()
        .save(
            "page",
            "home",
            serde_json::json!({"title": "Home", "body": "<p>Hi</p>"}),
        )
        .await
        .expect("save");

    let mut params = BTreeMap::new();
    params.insert("page".to_string(), "2".to_string());

    let plain = engine
        .dispatcher()
        .dispatch(PageRequest::new("/"))
        .await
        .expect("dispatch");
    let paged = engine
        .dispatcher()
        .dispatch(PageRequest::new("/").with_params(params))
        .await
        .expect("dispatch");

    // Both dispatches rendered; distinct parameter sets never collide on one
    // cached entry, so each wrote its own.
    assert!(!plain.report.primary_failure);
    assert!(!paged.report.primary_failure);
    let entries = engine.cache().count().await.expect("count");
    assert_eq!(entries, 2);
}
