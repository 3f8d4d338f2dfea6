//! Daemon lifecycle management: spawn, probe, stop, respawn.
//!
//! The supervisor never holds on to the processes it launches. Each spawn
//! re-invokes the current executable in its own session, records the child
//! PID on disk, and waits for the service to answer a liveness probe; from
//! then on the PID record is the only link between supervisor invocations
//! and the daemon.
use std::{
    env, fs,
    os::unix::process::CommandExt,
    path::Path,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use nix::{
    errno::Errno,
    sys::{
        signal::{Signal, kill},
        wait::{WaitPidFlag, WaitStatus, waitpid},
    },
    unistd::Pid,
};
use tracing::{debug, info, warn};

use crate::{
    constants::{PROBE_POLL_INTERVAL, PROBE_TIMEOUT, STOP_POLL_INTERVAL, STOP_TIMEOUT},
    descriptor::{ProcessHandle, ServiceDescriptor},
    error::{PidfileError, SupervisorError},
    pidfile::{Pidfile, process_alive},
    probe::Prober,
};

/// How a stop concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The service exited on its own within the stop timeout after SIGINT.
    Graceful,
    /// The service had to be SIGKILLed. Its graceful-shutdown work, pact
    /// persistence included, did not run.
    Forced,
}

/// Spawns and stops daemonized services.
#[derive(Debug, Clone, Copy)]
pub struct Supervisor {
    /// How long a freshly spawned service may take to answer its first
    /// successful probe.
    pub probe_timeout: Duration,
    /// How long a signalled service may take to exit before escalation to
    /// SIGKILL.
    pub stop_timeout: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self {
            probe_timeout: PROBE_TIMEOUT,
            stop_timeout: STOP_TIMEOUT,
        }
    }
}

impl Supervisor {
    /// A supervisor with explicit timeouts.
    pub fn new(probe_timeout: Duration, stop_timeout: Duration) -> Self {
        Self {
            probe_timeout,
            stop_timeout,
        }
    }

    /// Launches `descriptor` as a daemon recorded in `pidfile` and waits for
    /// it to become responsive.
    ///
    /// The child is the current executable re-invoked with the matching
    /// foreground subcommand, detached into its own session. A live record
    /// for the same identity fails with
    /// [`SupervisorError::AlreadyRunning`]; stale and unreadable records
    /// are deleted and the spawn proceeds.
    ///
    /// On probe timeout the child is left running and the PID record in
    /// place: a service that is merely slow to come up can still be used and
    /// stopped, which beats killing a healthy process.
    pub fn spawn(
        &self,
        pidfile: &Pidfile,
        descriptor: &ServiceDescriptor,
    ) -> Result<ProcessHandle, SupervisorError> {
        let _lock = pidfile.lock()?;
        self.check_not_running(pidfile)?;

        let label = descriptor.family.label();
        let mut command = Command::new(env::current_exe()?);
        command.args(descriptor.foreground_args());
        command.stdin(Stdio::null());
        match &descriptor.log {
            Some(path) => {
                let (stdout, stderr) =
                    log_stdio(path).map_err(|source| SupervisorError::SpawnFailed {
                        name: label.to_string(),
                        source,
                    })?;
                command.stdout(stdout);
                command.stderr(stderr);
            }
            None => {
                command.stdout(Stdio::null());
                command.stderr(Stdio::null());
            }
        }
        // Detach into a fresh session so terminal signals aimed at the
        // launching shell never reach the daemon.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command
            .spawn()
            .map_err(|source| SupervisorError::SpawnFailed {
                name: label.to_string(),
                source,
            })?;
        let pid = child.id();
        if let Err(err) = pidfile.write(pid) {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            return Err(err.into());
        }
        info!(%pid, port = descriptor.port, "spawned {label}, waiting for it to come up");

        let prober = Prober::new(&descriptor.host, descriptor.port, descriptor.uses_tls())?;
        let deadline = Instant::now() + self.probe_timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                pidfile.clear()?;
                return Err(SupervisorError::SpawnExited {
                    name: label.to_string(),
                    status,
                });
            }
            if prober.responsive() {
                info!(%pid, url = prober.url(), "{label} is up");
                return Ok(ProcessHandle {
                    pid,
                    started_at: Utc::now(),
                });
            }
            if Instant::now() >= deadline {
                return Err(SupervisorError::SpawnTimeout {
                    name: label.to_string(),
                    port: descriptor.port,
                    waited: self.probe_timeout,
                });
            }
            thread::sleep(PROBE_POLL_INTERVAL);
        }
    }

    /// Stops the daemon recorded in `pidfile`.
    ///
    /// Sends SIGINT and polls for exit; a daemon still alive after the stop
    /// timeout is SIGKILLed and reported as [`StopOutcome::Forced`]. The PID
    /// record is deleted either way. Stale records are cleaned up but still
    /// reported as [`SupervisorError::NotRunning`]; unreadable records are
    /// left untouched for inspection and fail with
    /// [`SupervisorError::CorruptRecord`].
    pub fn stop(&self, pidfile: &Pidfile) -> Result<StopOutcome, SupervisorError> {
        let name = pidfile.name().to_string();
        let pid = match pidfile.read() {
            Ok(Some(pid)) => pid,
            Ok(None) => return Err(SupervisorError::NotRunning { name }),
            Err(PidfileError::Corrupt { path }) => {
                return Err(SupervisorError::CorruptRecord { name, path });
            }
            Err(err) => return Err(err.into()),
        };
        // read() refuses records beyond the OS PID range; never let one
        // wrap negative here, where kill(2) would broadcast.
        let Ok(raw_pid) = i32::try_from(pid) else {
            return Err(SupervisorError::CorruptRecord {
                name,
                path: pidfile.path(),
            });
        };
        let target = Pid::from_raw(raw_pid);
        if daemon_gone(pid) {
            warn!(%pid, "process is already gone, deleting stale PID record");
            pidfile.clear()?;
            return Err(SupervisorError::NotRunning { name });
        }

        debug!(%pid, "sending SIGINT to {name}");
        match kill(target, Signal::SIGINT) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => {
                return Err(SupervisorError::StopFailed {
                    name,
                    source: errno.into(),
                });
            }
        }

        let deadline = Instant::now() + self.stop_timeout;
        while Instant::now() < deadline {
            if daemon_gone(pid) {
                pidfile.clear()?;
                info!(%pid, "{name} stopped");
                return Ok(StopOutcome::Graceful);
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }

        warn!(
            %pid,
            timeout = ?self.stop_timeout,
            "{name} did not exit after SIGINT, sending SIGKILL"
        );
        match kill(target, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(errno) => {
                return Err(SupervisorError::StopFailed {
                    name,
                    source: errno.into(),
                });
            }
        }
        pidfile.clear()?;
        Ok(StopOutcome::Forced)
    }

    /// Stops the daemon if it is running, then spawns it again.
    pub fn respawn(
        &self,
        pidfile: &Pidfile,
        descriptor: &ServiceDescriptor,
    ) -> Result<ProcessHandle, SupervisorError> {
        match self.stop(pidfile) {
            Ok(outcome) => debug!(?outcome, "stopped previous instance"),
            Err(SupervisorError::NotRunning { name }) => {
                debug!("{name} was not running, starting fresh");
            }
            Err(err) => return Err(err),
        }
        self.spawn(pidfile, descriptor)
    }

    fn check_not_running(&self, pidfile: &Pidfile) -> Result<(), SupervisorError> {
        match pidfile.read() {
            Ok(Some(pid)) if process_alive(pid) => Err(SupervisorError::AlreadyRunning {
                name: pidfile.name().to_string(),
                pid,
            }),
            Ok(Some(pid)) => {
                warn!(%pid, record = %pidfile.path().display(), "deleting stale PID record");
                pidfile.clear()?;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(PidfileError::Corrupt { path }) => {
                warn!(record = %path.display(), "deleting unreadable PID record");
                pidfile.clear()?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Whether the daemon with `pid` is gone.
///
/// A mock service stopped by the control server that spawned it lingers as
/// a zombie until reaped; a zero-signal probe alone would report it alive
/// forever. Reap it with a non-blocking wait when it is our child, and fall
/// back to the signal probe when it is not. PID 0 and PIDs beyond the OS
/// range never name a daemon and count as gone.
pub fn daemon_gone(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return true;
    };
    if raw == 0 {
        return true;
    }
    match waitpid(Pid::from_raw(raw), Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => true,
        Ok(_) => false,
        Err(_) => !process_alive(pid),
    }
}

fn log_stdio(path: &Path) -> std::io::Result<(Stdio, Stdio)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
    let clone = file.try_clone()?;
    Ok((Stdio::from(file), Stdio::from(clone)))
}
