//! Atomic filesystem helpers shared by the PID file and pact writers.
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::Path,
    process,
};

use chrono::Utc;
use tracing::trace;

/// Writes `bytes` to `path` atomically.
///
/// The contents are written to a uniquely named temporary file in the same
/// directory, synced, and renamed into place, so readers never observe a
/// partially written file. Parent directories are created as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no parent directory for {}", path.display()),
        )
    })?;
    fs::create_dir_all(parent)?;

    let tmp = parent.join(format!(
        ".{}.tmp.{}.{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("file"),
        process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));

    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }

    trace!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}
