//! Standalone pact mock service: an interaction-recording HTTP provider and
//! the tooling to run fleets of them. The mock service records the requests a
//! consumer makes and writes them out as a pact file on graceful shutdown;
//! the supervisor daemonizes instances behind durable PID records, and the
//! control server starts and stops mock services over HTTP for test suites
//! that juggle many consumer/provider pairs at once.

/// CLI interface.
pub mod cli;

/// Shared defaults, timeouts and header names.
pub mod constants;

/// Control server runtime.
pub mod control;

/// Service descriptions shared between the CLI, supervisor and runners.
pub mod descriptor;

/// Error handling.
pub mod error;

/// Durable file writes.
pub mod fsio;

/// Blocking HTTP plumbing shared by the runners.
pub mod http;

/// Mock service runtime.
pub mod mock;

/// Pact document recording and persistence.
pub mod pact;

/// PID records and spawn locks.
pub mod pidfile;

/// HTTP liveness probing.
pub mod probe;

/// Command dispatch.
pub mod router;

/// Daemon lifecycle management.
pub mod supervisor;
