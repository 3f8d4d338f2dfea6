//! Error handling for the mock service supervisor.
use std::{path::PathBuf, process::ExitStatus, time::Duration};

use thiserror::Error;

/// Defines all possible errors that can occur while supervising services.
///
/// Each failure class maps to a distinct process exit code via
/// [`SupervisorError::exit_code`], so scripts driving the CLI can tell a
/// port conflict from a stop of a service that was never running.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A live process is already recorded for this identity.
    #[error("'{name}' is already running with PID {pid}")]
    AlreadyRunning {
        /// The PID file name that is already claimed.
        name: String,
        /// The recorded, still-live PID.
        pid: u32,
    },

    /// No live process is recorded for this identity.
    #[error("no '{name}' is currently running")]
    NotRunning {
        /// The PID file name that was queried.
        name: String,
    },

    /// The spawned service never answered its liveness probe. The child is
    /// left running and its PID file in place so a later probe can still
    /// find it.
    #[error(
        "'{name}' did not respond on port {port} within {waited:?}; the process was left running"
    )]
    SpawnTimeout {
        /// The PID file name of the service that timed out.
        name: String,
        /// The port that was probed.
        port: u16,
        /// How long the supervisor waited.
        waited: Duration,
    },

    /// The recorded PID could not be parsed, so the stop target is unknowable.
    #[error("PID file {path:?} for '{name}' is corrupt; remove it manually")]
    CorruptRecord {
        /// The PID file name whose record is corrupt.
        name: String,
        /// Path of the unreadable PID file.
        path: PathBuf,
    },

    /// The spawned service exited before becoming responsive.
    #[error("'{name}' exited during startup with {status}")]
    SpawnExited {
        /// The PID file name of the service that died.
        name: String,
        /// Exit status collected from the child.
        status: ExitStatus,
    },

    /// Error creating the detached service process.
    #[error("failed to spawn '{name}': {source}")]
    SpawnFailed {
        /// The PID file name of the service that failed to start.
        name: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error signalling a running service process.
    #[error("failed to stop '{name}': {source}")]
    StopFailed {
        /// The PID file name of the service that failed to stop.
        name: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error binding the listener for a foreground runner.
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        /// The address that could not be bound.
        addr: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error reading an SSL certificate or key file.
    #[error("failed to read TLS file {path:?}: {source}")]
    TlsFile {
        /// Path of the certificate or key that could not be read.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error constructing the TLS acceptor from the provided identity.
    #[error("failed to initialise TLS: {0}")]
    Tls(#[from] native_tls::Error),

    /// Error constructing the liveness probe client.
    #[error("failed to construct liveness probe: {0}")]
    Probe(#[from] reqwest::Error),

    /// Error registering the shutdown signal handler.
    #[error("failed to register signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    /// Error for PID file operations.
    #[error("PID file error: {0}")]
    Pidfile(#[from] PidfileError),

    /// Error persisting the recorded interactions on shutdown.
    #[error("pact error: {0}")]
    Pact(#[from] PactError),

    /// Invalid combination of command-line arguments.
    #[error("{message}")]
    InvalidArguments {
        /// Human-readable description of the problem.
        message: String,
    },

    /// Uncategorised I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Process exit code for this error.
    ///
    /// `0` is reserved for success (including a forced kill, which is a
    /// warning rather than a failure) and `1` for generic errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AlreadyRunning { .. } => 2,
            Self::Pidfile(PidfileError::Locked { .. }) => 2,
            Self::NotRunning { .. } => 3,
            Self::SpawnTimeout { .. } => 4,
            Self::CorruptRecord { .. } => 5,
            Self::Pidfile(PidfileError::Corrupt { .. }) => 5,
            Self::SpawnExited { .. } => 6,
            Self::Pact(_) => 7,
            _ => 1,
        }
    }
}

/// Error type for PID file operations.
#[derive(Debug, Error)]
pub enum PidfileError {
    /// Error reading or writing a PID file.
    #[error("failed to access PID file: {0}")]
    Io(#[from] std::io::Error),

    /// The PID file exists but does not contain a decimal PID.
    #[error("PID file {path:?} does not contain a valid PID")]
    Corrupt {
        /// Path of the unparseable PID file.
        path: PathBuf,
    },

    /// Another supervisor invocation holds the spawn lock for this identity.
    #[error("PID file '{name}' is locked by another process")]
    Locked {
        /// The PID file name whose lock is contended.
        name: String,
    },
}

/// Error type for pact persistence.
#[derive(Debug, Error)]
pub enum PactError {
    /// Error reading an existing pact file for merging.
    #[error("failed to read pact file {path:?}: {source}")]
    Read {
        /// Path of the pact file.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// Error writing the pact file.
    #[error("failed to write pact file {path:?}: {source}")]
    Write {
        /// Path of the pact file.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The existing pact file could not be parsed for merging.
    #[error("existing pact file {path:?} is not valid JSON: {source}")]
    Merge {
        /// Path of the pact file.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: serde_json::Error,
    },

    /// Error serialising the pact document.
    #[error("failed to serialise pact document: {0}")]
    Serialize(#[from] serde_json::Error),
}
