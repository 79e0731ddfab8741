use std::{process, sync::Arc};

use mosaico::{
    config,
    engine::{Engine, EngineError},
    infra::{InfraError, http, telemetry},
    modules::ModuleCatalog,
    registry::{ModuleRegistry, discover},
};
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to read modules directory: {0}")]
    Discovery(#[from] mosaico::registry::LoaderError),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Check(_) => run_check(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let engine = Engine::bootstrap(&settings, &ModuleCatalog::builtin()).await?;
    http::serve(&settings.server, Arc::new(engine)).await?;
    Ok(())
}

/// Validate the module directory and print the dispatch plan.
async fn run_check(settings: config::Settings) -> Result<(), AppError> {
    let discovery = discover(&settings.engine.modules_dir)?;
    let registry = ModuleRegistry::load(discovery, &ModuleCatalog::builtin());

    for name in registry.dispatch_order() {
        println!("{name}");
    }

    let diagnostics = registry.diagnostics();
    for diagnostic in diagnostics {
        println!("warning: {}: {}", diagnostic.subject, diagnostic.message);
    }

    if diagnostics.is_empty() {
        info!(modules = registry.len(), "Module directory is clean");
        Ok(())
    } else {
        info!(
            modules = registry.len(),
            diagnostics = diagnostics.len(),
            "Module directory loaded with diagnostics"
        );
        Ok(())
    }
}
