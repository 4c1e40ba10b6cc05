use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the coursepages binary.
#[derive(Debug, Parser)]
#[command(name = "coursepages", version, about = "Online course server")]
pub struct CliArgs {
    /// Extra configuration file layered over `config/default.toml`.
    #[arg(long = "config-file", env = "COURSEPAGES_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl CliArgs {
    /// The requested command; a bare invocation serves.
    pub fn command_or_serve(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Serve(Box::default()))
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the course HTTP server.
    Serve(Box<ServeArgs>),
    /// Validate a course outline file and log a summary.
    #[command(name = "check-course")]
    CheckCourse(CheckCourseArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct CheckCourseArgs {
    /// Course outline to validate; defaults to the configured `course.path`.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,
}

/// Flags that win over every other configuration source when serving.
#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Seconds to let open connections drain after a shutdown signal.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// trace, debug, info, warn or error.
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[arg(long = "log-json", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub log_json: Option<bool>,

    #[arg(long = "cache-enabled", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub cache_enabled: Option<bool>,

    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Maximum number of rendered pages kept in memory.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<u64>,

    /// Let only one of several concurrent misses on a page render it.
    #[arg(
        long = "cache-single-flight",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_single_flight: Option<bool>,

    /// Render every shared page before accepting traffic.
    #[arg(
        long = "cache-warm-on-start",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_warm_on_start: Option<bool>,

    #[arg(long = "course-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub course_path: Option<PathBuf>,

    /// Request header carrying the signed-in email.
    #[arg(long = "identity-header", value_name = "NAME")]
    pub identity_header: Option<String>,

    #[arg(long = "identity-login-url", value_name = "URL")]
    pub identity_login_url: Option<String>,

    #[arg(long = "identity-logout-url", value_name = "URL")]
    pub identity_logout_url: Option<String>,

    /// Enrollment cap; 0 removes it.
    #[arg(long = "registration-max-class-size", value_name = "COUNT")]
    pub registration_max_class_size: Option<u64>,
}
