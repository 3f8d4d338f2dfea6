//! Durable PID records for supervised services.
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::PathBuf,
};

use fs2::FileExt;
use nix::{errno::Errno, sys::signal::kill, unistd::Pid};
use tracing::{debug, trace};

use crate::{constants::PID_LOCK_SUFFIX, error::PidfileError, fsio};

/// Durable record of the process currently claiming a supervised identity.
///
/// A PID file lives at `<directory>/<name>` and contains a single decimal
/// PID followed by a newline. At most one live process is recorded per
/// `(directory, name)` pair; a record whose process has since died is stale
/// and safe to delete. Note that a stale record can still point at an
/// unrelated process if the OS has recycled the PID; the zero-signal probe
/// cannot tell the two apart.
#[derive(Debug, Clone)]
pub struct Pidfile {
    directory: PathBuf,
    name: String,
}

impl Pidfile {
    /// Creates the identity handle. No I/O is performed.
    pub fn new(directory: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
        }
    }

    /// The PID file name, e.g. `mock-service-1234.pid`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the backing file.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }

    fn lock_path(&self) -> PathBuf {
        self.directory.join(format!("{}{}", self.name, PID_LOCK_SUFFIX))
    }

    /// Reads the recorded PID.
    ///
    /// A missing file is the Absent state and yields `Ok(None)`. Contents
    /// that do not parse as a decimal PID, or that name a PID beyond the
    /// OS range, yield [`PidfileError::Corrupt`].
    pub fn read(&self) -> Result<Option<u32>, PidfileError> {
        let path = self.path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        // A value that does not fit the OS PID type would wrap negative on
        // the way into kill(2) and address the wrong processes entirely.
        match contents.trim().parse::<u32>() {
            Ok(pid) if i32::try_from(pid).is_ok() => Ok(Some(pid)),
            _ => Err(PidfileError::Corrupt { path }),
        }
    }

    /// Records `pid`, creating the directory if needed.
    ///
    /// The write goes through a temporary file and a rename, so a concurrent
    /// reader never observes a partial record.
    pub fn write(&self, pid: u32) -> Result<(), PidfileError> {
        fsio::write_atomic(&self.path(), format!("{pid}\n").as_bytes())?;
        debug!("Recorded PID {} in {:?}", pid, self.path());
        Ok(())
    }

    /// Removes the record. Clearing an absent record is not an error.
    pub fn clear(&self) -> Result<(), PidfileError> {
        match fs::remove_file(self.path()) {
            Ok(()) => {
                debug!("Removed PID file {:?}", self.path());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Reports whether a live process is currently recorded.
    ///
    /// Returns `Ok(false)` for an absent record and for a stale one, and
    /// propagates [`PidfileError::Corrupt`] for an unparseable record.
    pub fn is_process_alive(&self) -> Result<bool, PidfileError> {
        match self.read()? {
            Some(pid) => Ok(process_alive(pid)),
            None => Ok(false),
        }
    }

    /// Acquires the exclusive advisory spawn lock for this identity.
    ///
    /// The lock lives in a `.lock` companion file so the PID file itself can
    /// be atomically renamed while the lock is held. Contention means another
    /// supervisor invocation is mid-spawn for the same identity.
    pub fn lock(&self) -> Result<PidLock, PidfileError> {
        fs::create_dir_all(&self.directory)?;
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                trace!("Acquired spawn lock {:?}", lock_path);
                Ok(PidLock { _file: file })
            }
            Err(_) => Err(PidfileError::Locked {
                name: self.name.clone(),
            }),
        }
    }
}

/// Exclusive advisory lock over a PID file identity, released on drop.
#[derive(Debug)]
pub struct PidLock {
    _file: File,
}

/// Probes whether `pid` refers to a live process using a zero signal.
///
/// `EPERM` counts as alive: the process exists even if we may not signal it.
/// PID 0 and PIDs beyond the OS range are never alive; the former addresses
/// our own process group, and the latter would wrap into the negative
/// values `kill` treats as broadcasts.
pub fn process_alive(pid: u32) -> bool {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH)),
        _ => false,
    }
}
