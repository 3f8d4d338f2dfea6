//! Descriptions of the services the supervisor can launch.
use std::{fmt, path::PathBuf, str::FromStr};

use chrono::{DateTime, Utc};

use crate::constants::{DEFAULT_HOST, DEFAULT_LOG_DIR, DEFAULT_PID_DIR, DEFAULT_PORT};

/// The two process families sharing the supervisor machinery.
///
/// Identities are per `(family, port)`: the PID file names collide on purpose
/// so a second spawn of the same family on the same port is refused, while a
/// mock service and a control server may share a port number in different
/// processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessFamily {
    /// An interaction-recording mock provider.
    MockService,
    /// The server that administers mock service instances over HTTP.
    ControlServer,
}

impl ProcessFamily {
    /// Human-readable name used in log and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MockService => "mock service",
            Self::ControlServer => "control server",
        }
    }

    /// PID file name for this family on `port`.
    pub fn pidfile_name(&self, port: u16) -> String {
        match self {
            Self::MockService => format!("mock-service-{port}.pid"),
            Self::ControlServer => format!("mock-service-control-{port}.pid"),
        }
    }
}

/// How the pact file is combined with an existing one on shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace any existing pact file.
    #[default]
    Overwrite,
    /// Keep interactions from the existing file, updating duplicates by
    /// description.
    Merge,
}

impl WriteMode {
    /// String representation for CLI round-tripping.
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Overwrite => "overwrite",
            WriteMode::Merge => "merge",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "overwrite" => Ok(WriteMode::Overwrite),
            "merge" => Ok(WriteMode::Merge),
            _ => Err(format!(
                "invalid pact file write mode '{}', must be one of: overwrite, merge",
                s
            )),
        }
    }
}

/// Pact specification version declared in the written pact metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpecVersion {
    /// Version 1.
    V1,
    /// Version 2.
    #[default]
    V2,
}

impl SpecVersion {
    /// String representation for CLI round-tripping.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecVersion::V1 => "1",
            SpecVersion::V2 => "2",
        }
    }

    /// Version string recorded in the pact document metadata.
    pub fn document_version(&self) -> &'static str {
        match self {
            SpecVersion::V1 => "1.0.0",
            SpecVersion::V2 => "2.0.0",
        }
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SpecVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(SpecVersion::V1),
            "2" => Ok(SpecVersion::V2),
            _ => Err(format!(
                "invalid pact specification version '{}', only versions 1 and 2 are supported",
                s
            )),
        }
    }
}

/// Certificate and key paths for serving over HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsIdentity {
    /// Path to the PEM certificate.
    pub cert: PathBuf,
    /// Path to the PEM private key.
    pub key: PathBuf,
}

/// Everything needed to launch one service instance.
///
/// A descriptor is consumed once per spawn. Because daemonization re-invokes
/// the current executable, the descriptor also knows how to render itself as
/// the argument vector of the matching foreground subcommand.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// Which family this instance belongs to.
    pub family: ProcessFamily,
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Consumer name recorded in the pact.
    pub consumer: Option<String>,
    /// Provider name recorded in the pact.
    pub provider: Option<String>,
    /// Directory the pact is written to on shutdown. The pact is only
    /// written when consumer, provider and this directory are all set.
    pub pact_dir: Option<PathBuf>,
    /// Overwrite or merge behaviour for the pact file.
    pub write_mode: WriteMode,
    /// Pact specification version for the written document.
    pub spec_version: SpecVersion,
    /// Answer OPTIONS requests with permissive CORS headers.
    pub cors: bool,
    /// Serve over HTTPS with this identity when set.
    pub tls: Option<TlsIdentity>,
    /// File the service logs to; a daemonized child also has its stdio
    /// redirected here.
    pub log: Option<PathBuf>,
    /// Directory for per-port log files of control-managed mock services.
    pub log_dir: PathBuf,
    /// Directory where the control server records the PID files of the mock
    /// services it manages.
    pub pid_dir: PathBuf,
}

impl ServiceDescriptor {
    /// A descriptor for `family` with the stock defaults.
    pub fn new(family: ProcessFamily) -> Self {
        Self {
            family,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            consumer: None,
            provider: None,
            pact_dir: None,
            write_mode: WriteMode::default(),
            spec_version: SpecVersion::default(),
            cors: false,
            tls: None,
            log: None,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            pid_dir: PathBuf::from(DEFAULT_PID_DIR),
        }
    }

    /// Whether this instance serves HTTPS.
    pub fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// URL scheme matching [`ServiceDescriptor::uses_tls`].
    pub fn scheme(&self) -> &'static str {
        if self.uses_tls() { "https" } else { "http" }
    }

    /// Base URL of this instance as bound, e.g. `http://0.0.0.0:1234`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.port)
    }

    /// Renders the argument vector of the foreground subcommand that runs
    /// this instance. Daemonization re-invokes the current executable with
    /// exactly these arguments.
    pub fn foreground_args(&self) -> Vec<String> {
        let mut args = vec![
            match self.family {
                ProcessFamily::MockService => "service".to_string(),
                ProcessFamily::ControlServer => "control".to_string(),
            },
            "--host".to_string(),
            self.host.clone(),
            "--port".to_string(),
            self.port.to_string(),
        ];

        if let Some(consumer) = &self.consumer {
            args.push("--consumer".to_string());
            args.push(consumer.clone());
        }
        if let Some(provider) = &self.provider {
            args.push("--provider".to_string());
            args.push(provider.clone());
        }
        if let Some(pact_dir) = &self.pact_dir {
            args.push("--pact-dir".to_string());
            args.push(pact_dir.display().to_string());
        }

        args.push("--pact-file-write-mode".to_string());
        args.push(self.write_mode.to_string());
        args.push("--pact-specification-version".to_string());
        args.push(self.spec_version.to_string());

        if self.cors {
            args.push("--cors".to_string());
        }
        if let Some(tls) = &self.tls {
            args.push("--ssl".to_string());
            args.push("--sslcert".to_string());
            args.push(tls.cert.display().to_string());
            args.push("--sslkey".to_string());
            args.push(tls.key.display().to_string());
        }

        match self.family {
            ProcessFamily::MockService => {
                if let Some(log) = &self.log {
                    args.push("--log".to_string());
                    args.push(log.display().to_string());
                }
            }
            ProcessFamily::ControlServer => {
                args.push("--log-dir".to_string());
                args.push(self.log_dir.display().to_string());
                args.push("--pid-dir".to_string());
                args.push(self.pid_dir.display().to_string());
            }
        }

        args
    }
}

/// Handle returned by a successful spawn.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    /// PID of the daemonized service.
    pub pid: u32,
    /// When the service was confirmed responsive.
    pub started_at: DateTime<Utc>,
}
