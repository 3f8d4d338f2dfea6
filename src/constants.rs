//! Constants and configuration values for the mock service supervisor.
//!
//! This module centralizes the magic numbers and strings shared by the CLI,
//! the supervisor, and the foreground runners.

use std::time::Duration;

// ============================================================================
// Network Defaults
// ============================================================================

/// Default bind host for the mock service and the control server.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port for the mock service and the control server.
pub const DEFAULT_PORT: u16 = 1234;

/// Host used when probing a service that was bound to a wildcard address.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

// ============================================================================
// File System Defaults
// ============================================================================

/// Default directory in which PID files are recorded.
pub const DEFAULT_PID_DIR: &str = "tmp/pids";

/// Default directory for the log files of control-managed mock services.
pub const DEFAULT_LOG_DIR: &str = "log";

/// Pact directory a daemonized control server falls back to when
/// `--pact-dir` is not given, so its managed mocks always persist.
pub const DEFAULT_CONTROL_PACT_DIR: &str = ".";

/// Lock file suffix for PID files to ensure exclusive spawn access.
pub const PID_LOCK_SUFFIX: &str = ".lock";

// ============================================================================
// Administrative HTTP Headers
// ============================================================================

/// Header that marks a request as administrative traffic.
/// Requests carrying it are answered but never recorded as interactions.
pub const MOCK_SERVICE_HEADER: &str = "X-Pact-Mock-Service";

/// Header naming the consumer when registering a mock with the control server.
pub const CONSUMER_HEADER: &str = "X-Pact-Consumer";

/// Header naming the provider when registering a mock with the control server.
pub const PROVIDER_HEADER: &str = "X-Pact-Provider";

// ============================================================================
// Process Management Timing
// ============================================================================

/// Maximum time to wait for a freshly spawned service to answer its
/// liveness probe before giving up.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between liveness probe attempts.
pub const PROBE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-request timeout for a single liveness probe.
pub const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum time to wait for a service to exit after SIGINT before
/// escalating to SIGKILL.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between process-gone checks while stopping a service.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Server Loop Timing
// ============================================================================

/// Sleep between accept attempts while the listener has no pending
/// connections.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Read timeout applied to accepted connections so a stalled client cannot
/// wedge the single-threaded request loop.
pub const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Request Limits
// ============================================================================

/// Largest request body the runners accept. Requests declaring more are
/// rejected before any buffer is allocated for them.
pub const MAX_REQUEST_BODY_BYTES: usize = 4 * 1024 * 1024;
