//! Command-line interface for the pact mock service.
use std::{path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::{
    constants::{DEFAULT_HOST, DEFAULT_LOG_DIR, DEFAULT_PID_DIR, DEFAULT_PORT},
    descriptor::{SpecVersion, WriteMode},
};

/// Wrapper around `LevelFilter` so clap can parse log levels by name, in
/// either case ("debug", "WARN", etc.).
#[derive(Clone, Copy, Debug)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// String representation suitable for `RUST_LOG`.
    pub fn as_str(&self) -> &'static str {
        match self.0 {
            LevelFilter::OFF => "off",
            LevelFilter::ERROR => "error",
            LevelFilter::WARN => "warn",
            LevelFilter::INFO => "info",
            LevelFilter::DEBUG => "debug",
            LevelFilter::TRACE => "trace",
        }
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let level = match value.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::OFF,
            "error" => LevelFilter::ERROR,
            "warn" | "warning" => LevelFilter::WARN,
            "info" => LevelFilter::INFO,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            other => return Err(format!("unknown log level '{other}'")),
        };
        Ok(LogLevelArg(level))
    }
}

/// Command-line interface for the pact mock service.
#[derive(Parser)]
#[command(name = "pact-mock-service", version, author)]
#[command(
    about = "Standalone pact mock service and control server",
    long_about = None
)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// The command to execute. Without one, the mock service runs in the
    /// foreground exactly as `service` would.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Service options honored when no command is given.
    #[command(flatten)]
    pub service: ServiceArgs,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the mock service in the foreground.
    Service(ServiceArgs),

    /// Start the mock service as a daemon.
    Start(StartArgs),

    /// Stop a daemonized mock service.
    Stop(StopArgs),

    /// Restart a daemonized mock service.
    Restart(StartArgs),

    /// Run the control server in the foreground.
    Control(ControlArgs),

    /// Start the control server as a daemon.
    ControlStart(ControlArgs),

    /// Stop a daemonized control server.
    ControlStop(StopArgs),

    /// Restart a daemonized control server.
    ControlRestart(ControlArgs),

    /// Print the version.
    Version,
}

/// Options shared by the mock service subcommands.
#[derive(Args, Clone, Debug)]
pub struct ServiceArgs {
    /// Consumer name the recorded pact is written for.
    #[arg(long, value_name = "NAME")]
    pub consumer: Option<String>,

    /// Provider name the recorded pact is written for.
    #[arg(long, value_name = "NAME")]
    pub provider: Option<String>,

    /// Port to bind the mock service to.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT, value_name = "PORT")]
    pub port: u16,

    /// Host to bind the mock service to.
    #[arg(long, default_value = DEFAULT_HOST, value_name = "HOST")]
    pub host: String,

    /// Directory the pact file is written to on graceful shutdown.
    #[arg(short = 'd', long, value_name = "DIR")]
    pub pact_dir: Option<PathBuf>,

    /// How to combine with an existing pact file: overwrite or merge.
    #[arg(short = 'm', long, default_value_t = WriteMode::default(), value_name = "MODE")]
    pub pact_file_write_mode: WriteMode,

    /// Pact specification version for the written document: 1 or 2.
    #[arg(short = 'i', long, default_value_t = SpecVersion::default(), value_name = "VERSION")]
    pub pact_specification_version: SpecVersion,

    /// File to log to; a daemonized service also redirects its output here.
    #[arg(short = 'l', long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Answer CORS preflight requests.
    #[arg(short = 'o', long)]
    pub cors: bool,

    /// Serve over HTTPS. Requires --sslcert and --sslkey.
    #[arg(long)]
    pub ssl: bool,

    /// Path to the PEM certificate to serve with.
    #[arg(long, value_name = "FILE")]
    pub sslcert: Option<PathBuf>,

    /// Path to the PEM private key to serve with.
    #[arg(long, value_name = "FILE")]
    pub sslkey: Option<PathBuf>,
}

/// Options for starting or restarting the daemonized mock service.
#[derive(Args, Clone, Debug)]
pub struct StartArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    /// Directory the PID record is kept in.
    #[arg(long, default_value = DEFAULT_PID_DIR, value_name = "DIR")]
    pub pid_dir: PathBuf,
}

/// Options for stopping a daemonized service.
#[derive(Args, Clone, Debug)]
pub struct StopArgs {
    /// Port the daemon was started on.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT, value_name = "PORT")]
    pub port: u16,

    /// Directory the PID record is kept in.
    #[arg(long, default_value = DEFAULT_PID_DIR, value_name = "DIR")]
    pub pid_dir: PathBuf,
}

/// Options shared by the control server subcommands.
#[derive(Args, Clone, Debug)]
pub struct ControlArgs {
    /// Port to bind the control server to.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT, value_name = "PORT")]
    pub port: u16,

    /// Host to bind the control server to.
    #[arg(long, default_value = DEFAULT_HOST, value_name = "HOST")]
    pub host: String,

    /// Directory managed mock services log to.
    #[arg(long, default_value = DEFAULT_LOG_DIR, value_name = "DIR")]
    pub log_dir: PathBuf,

    /// Directory managed mock services write their pacts to.
    #[arg(short = 'd', long, value_name = "DIR")]
    pub pact_dir: Option<PathBuf>,

    /// How managed mocks combine with existing pact files: overwrite or merge.
    #[arg(short = 'm', long, default_value_t = WriteMode::default(), value_name = "MODE")]
    pub pact_file_write_mode: WriteMode,

    /// Pact specification version for written documents: 1 or 2.
    #[arg(short = 'i', long, default_value_t = SpecVersion::default(), value_name = "VERSION")]
    pub pact_specification_version: SpecVersion,

    /// Managed mock services answer CORS preflight requests.
    #[arg(short = 'o', long)]
    pub cors: bool,

    /// Serve over HTTPS, managed mock services included. Requires --sslcert
    /// and --sslkey.
    #[arg(long)]
    pub ssl: bool,

    /// Path to the PEM certificate to serve with.
    #[arg(long, value_name = "FILE")]
    pub sslcert: Option<PathBuf>,

    /// Path to the PEM private key to serve with.
    #[arg(long, value_name = "FILE")]
    pub sslkey: Option<PathBuf>,

    /// Directory PID records are kept in, managed mock services' included.
    #[arg(long, default_value = DEFAULT_PID_DIR, value_name = "DIR")]
    pub pid_dir: PathBuf,
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
