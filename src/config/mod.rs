//! Settings resolution.
//!
//! Sources are layered lowest to highest: `config/default.toml`, a local
//! `coursepages.toml`, the `--config-file` argument, `COURSEPAGES__*`
//! environment variables, then command-line flags. Every raw section resolves
//! into its typed counterpart or fails with [`LoadError::Invalid`] naming the
//! offending key.

mod cli;

use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use axum::http::HeaderName;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CheckCourseArgs, CliArgs, Command, ServeArgs, ServeOverrides};

const BASE_FILE: &str = "config/default";
const LOCAL_FILE: &str = "coursepages";
const ENV_PREFIX: &str = "COURSEPAGES";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub course: CourseSettings,
    pub identity: IdentitySettings,
    pub registration: RegistrationSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    /// Upper bound on connection draining after a shutdown signal.
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
    pub capacity: NonZeroUsize,
    pub single_flight: bool,
    pub warm_on_start: bool,
}

#[derive(Debug, Clone)]
pub struct CourseSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub header: HeaderName,
    pub login_url: String,
    pub logout_url: String,
}

#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    /// `None` means unlimited.
    pub max_class_size: Option<NonZeroUsize>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read configuration sources: {0}")]
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

/// Parse the process arguments and resolve settings for them.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut sources = Config::builder()
        .add_source(File::with_name(BASE_FILE).required(false))
        .add_source(File::with_name(LOCAL_FILE).required(false));
    if let Some(path) = &cli.config_file {
        sources = sources.add_source(File::from(path.as_path()).required(true));
    }
    let sources = sources.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = sources.build()?.try_deserialize()?;
    match cli.command_or_serve() {
        Command::Serve(args) => raw.override_with(&args.overrides),
        Command::CheckCourse(args) => {
            if args.file.is_some() {
                raw.course.path = args.file;
            }
        }
    }
    raw.resolve()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    server: RawServer,
    logging: RawLogging,
    cache: RawCache,
    course: RawCourse,
    identity: RawIdentity,
    registration: RawRegistration,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawServer {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawLogging {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawCache {
    enabled: Option<bool>,
    ttl_seconds: Option<u64>,
    capacity: Option<u64>,
    single_flight: Option<bool>,
    warm_on_start: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawCourse {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawIdentity {
    header: Option<String>,
    login_url: Option<String>,
    logout_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawRegistration {
    max_class_size: Option<u64>,
}

/// Replace `slot` when the flag was given.
fn take_flag<T: Clone>(slot: &mut Option<T>, flag: &Option<T>) {
    if flag.is_some() {
        slot.clone_from(flag);
    }
}

impl RawSettings {
    fn override_with(&mut self, flags: &ServeOverrides) {
        take_flag(&mut self.server.host, &flags.server_host);
        take_flag(&mut self.server.port, &flags.server_port);
        take_flag(
            &mut self.server.graceful_shutdown_seconds,
            &flags.server_graceful_shutdown_seconds,
        );
        take_flag(&mut self.logging.level, &flags.log_level);
        take_flag(&mut self.logging.json, &flags.log_json);
        take_flag(&mut self.cache.enabled, &flags.cache_enabled);
        take_flag(&mut self.cache.ttl_seconds, &flags.cache_ttl_seconds);
        take_flag(&mut self.cache.capacity, &flags.cache_capacity);
        take_flag(&mut self.cache.single_flight, &flags.cache_single_flight);
        take_flag(&mut self.cache.warm_on_start, &flags.cache_warm_on_start);
        take_flag(&mut self.course.path, &flags.course_path);
        take_flag(&mut self.identity.header, &flags.identity_header);
        take_flag(&mut self.identity.login_url, &flags.identity_login_url);
        take_flag(&mut self.identity.logout_url, &flags.identity_logout_url);
        take_flag(
            &mut self.registration.max_class_size,
            &flags.registration_max_class_size,
        );
    }

    fn resolve(self) -> Result<Settings, LoadError> {
        Ok(Settings {
            server: self.server.resolve()?,
            logging: self.logging.resolve()?,
            cache: self.cache.resolve()?,
            course: self.course.resolve()?,
            identity: self.identity.resolve()?,
            registration: self.registration.resolve()?,
        })
    }
}

impl RawServer {
    fn resolve(self) -> Result<ServerSettings, LoadError> {
        let host = self.host.as_deref().unwrap_or("127.0.0.1").trim();
        let ip = IpAddr::from_str(host)
            .map_err(|err| LoadError::invalid("server.host", format!("`{host}`: {err}")))?;
        let port = self.port.unwrap_or(8080);
        positive(u64::from(port), "server.port")?;
        let drain = positive(
            self.graceful_shutdown_seconds.unwrap_or(30),
            "server.graceful_shutdown_seconds",
        )?;
        Ok(ServerSettings {
            addr: SocketAddr::new(ip, port),
            graceful_shutdown: Duration::from_secs(drain),
        })
    }
}

impl RawLogging {
    fn resolve(self) -> Result<LoggingSettings, LoadError> {
        let level = match self.level.as_deref().map(str::trim) {
            None | Some("") => LevelFilter::INFO,
            Some(level) => level
                .parse()
                .map_err(|err| LoadError::invalid("logging.level", format!("`{level}`: {err}")))?,
        };
        let format = match self.json {
            Some(true) => LogFormat::Json,
            _ => LogFormat::Compact,
        };
        Ok(LoggingSettings { level, format })
    }
}

impl RawCache {
    fn resolve(self) -> Result<CacheSettings, LoadError> {
        let ttl = positive(self.ttl_seconds.unwrap_or(60 * 60), "cache.ttl_seconds")?;
        let capacity = positive(self.capacity.unwrap_or(512), "cache.capacity")?;
        Ok(CacheSettings {
            enabled: self.enabled.unwrap_or(true),
            ttl: Duration::from_secs(ttl),
            capacity: to_non_zero(capacity, "cache.capacity")?,
            single_flight: self.single_flight.unwrap_or(true),
            warm_on_start: self.warm_on_start.unwrap_or(false),
        })
    }
}

impl RawCourse {
    fn resolve(self) -> Result<CourseSettings, LoadError> {
        let path = self
            .path
            .unwrap_or_else(|| PathBuf::from("config/course.toml"));
        if path.as_os_str().is_empty() {
            return Err(LoadError::invalid("course.path", "must name a file"));
        }
        Ok(CourseSettings { path })
    }
}

impl RawIdentity {
    fn resolve(self) -> Result<IdentitySettings, LoadError> {
        let header = self.header.as_deref().unwrap_or("x-viewer-email").trim();
        let header = HeaderName::from_str(header)
            .map_err(|err| LoadError::invalid("identity.header", format!("`{header}`: {err}")))?;
        Ok(IdentitySettings {
            header,
            login_url: url_or(self.login_url, "/_auth/login", "identity.login_url")?,
            logout_url: url_or(self.logout_url, "/_auth/logout", "identity.logout_url")?,
        })
    }
}

impl RawRegistration {
    fn resolve(self) -> Result<RegistrationSettings, LoadError> {
        let max_class_size = match self.max_class_size {
            None | Some(0) => None,
            Some(size) => Some(to_non_zero(size, "registration.max_class_size")?),
        };
        Ok(RegistrationSettings { max_class_size })
    }
}

fn positive(value: u64, key: &'static str) -> Result<u64, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(value)
}

fn to_non_zero(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    usize::try_from(value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid(key, format!("{value} is not a usable count")))
}

fn url_or(value: Option<String>, default: &str, key: &'static str) -> Result<String, LoadError> {
    let url = value.as_deref().unwrap_or(default).trim();
    if url.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    Ok(url.to_string())
}
