//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mosaico";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_MODULES_DIR: &str = "modules";
const DEFAULT_DEPENDENCY_TIMEOUT_MILLIS: u64 = 2_000;
const DEFAULT_CACHE_TTL_SECONDS: i64 = 300;
const DEFAULT_CACHE_PREFIX: &str = "mosaico";
const DEFAULT_THEME: &str = "default";

/// Command-line arguments for the Mosaico binary.
#[derive(Debug, Parser)]
#[command(name = "mosaico", version, about = "Mosaico CMS server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MOSAICO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Mosaico HTTP service.
    Serve(Box<ServeArgs>),
    /// Validate the module directory and report the dispatch plan.
    #[command(name = "check")]
    Check(CheckArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the module manifest directory.
    #[arg(long = "modules-dir", value_name = "PATH")]
    pub modules_dir: Option<PathBuf>,

    /// Override the dependency gate timeout.
    #[arg(long = "dependency-timeout-millis", value_name = "MILLIS")]
    pub dependency_timeout_millis: Option<u64>,

    /// Toggle block caching.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the default block cache TTL.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<i64>,

    /// Override the cache key prefix.
    #[arg(long = "cache-prefix", value_name = "PREFIX")]
    pub cache_prefix: Option<String>,

    /// Override the active theme.
    #[arg(long = "site-theme", value_name = "THEME")]
    pub site_theme: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CheckArgs {
    /// Override the module manifest directory.
    #[arg(long = "modules-dir", value_name = "PATH")]
    pub modules_dir: Option<PathBuf>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub engine: EngineSettings,
    pub cache: CacheSettings,
    pub site: SiteSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub modules_dir: PathBuf,
    pub dependency_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub default_ttl_seconds: i64,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub theme: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("MOSAICO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Check(args)) => raw.apply_check_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    engine: RawEngineSettings,
    cache: RawCacheSettings,
    site: RawSiteSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(dir) = overrides.modules_dir.as_ref() {
            self.engine.modules_dir = Some(dir.clone());
        }
        if let Some(millis) = overrides.dependency_timeout_millis {
            self.engine.dependency_timeout_millis = Some(millis);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.default_ttl_seconds = Some(ttl);
        }
        if let Some(prefix) = overrides.cache_prefix.as_ref() {
            self.cache.prefix = Some(prefix.clone());
        }
        if let Some(theme) = overrides.site_theme.as_ref() {
            self.site.theme = Some(theme.clone());
        }
    }

    fn apply_check_overrides(&mut self, args: &CheckArgs) {
        if let Some(dir) = args.modules_dir.as_ref() {
            self.engine.modules_dir = Some(dir.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            engine,
            cache,
            site,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let engine = build_engine_settings(engine)?;
        let cache = build_cache_settings(cache)?;
        let site = build_site_settings(site)?;

        Ok(Self {
            server,
            logging,
            engine,
            cache,
            site,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }
    let graceful_shutdown = Duration::from_secs(graceful_secs);

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_engine_settings(engine: RawEngineSettings) -> Result<EngineSettings, LoadError> {
    let modules_dir = engine
        .modules_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MODULES_DIR));
    if modules_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "engine.modules_dir",
            "path must not be empty",
        ));
    }

    let timeout_millis = engine
        .dependency_timeout_millis
        .unwrap_or(DEFAULT_DEPENDENCY_TIMEOUT_MILLIS);
    if timeout_millis == 0 {
        return Err(LoadError::invalid(
            "engine.dependency_timeout_millis",
            "must be greater than zero",
        ));
    }

    Ok(EngineSettings {
        modules_dir,
        dependency_timeout: Duration::from_millis(timeout_millis),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let prefix = cache
        .prefix
        .unwrap_or_else(|| DEFAULT_CACHE_PREFIX.to_string());
    if prefix.trim().is_empty() {
        return Err(LoadError::invalid("cache.prefix", "must not be empty"));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        default_ttl_seconds: cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECONDS),
        prefix,
    })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let theme = site.theme.unwrap_or_else(|| DEFAULT_THEME.to_string());
    if theme.trim().is_empty() {
        return Err(LoadError::invalid("site.theme", "must not be empty"));
    }
    Ok(SiteSettings { theme })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngineSettings {
    modules_dir: Option<PathBuf>,
    dependency_timeout_millis: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    default_ttl_seconds: Option<i64>,
    prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    theme: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
