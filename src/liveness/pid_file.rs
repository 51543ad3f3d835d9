//! The pid-file marker owned by a running supervisor.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use nix::unistd::Pid;

use crate::error::{Result, SupervisorError};

/// A plain-text file holding one decimal process id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the recorded pid; `Ok(None)` when there is no file.
    ///
    /// Content that is not a positive decimal number is `InvalidData`.
    pub fn read(&self) -> io::Result<Option<Pid>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        match content.trim().parse::<i32>() {
            Ok(raw) if raw > 0 => Ok(Some(Pid::from_raw(raw))),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("not a pid: {:?}", content.trim()),
            )),
        }
    }

    pub fn write(&self, pid: Pid) -> io::Result<()> {
        fs::write(&self.path, pid.to_string())
    }

    /// Remove the file; a missing file is not an error.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Record `pid` as the owner.
    ///
    /// Fails with `ConcurrentInstance` if the file already exists or if it
    /// holds another pid right after writing. This check is not atomic: two
    /// racing claimers can still both pass it.
    pub fn claim(&self, pid: Pid) -> Result<()> {
        if self.exists() {
            return Err(SupervisorError::ConcurrentInstance {
                path: self.path.clone(),
            });
        }

        self.write(pid)
            .map_err(|e| SupervisorError::pid_file(&self.path, e))?;

        match self.read() {
            Ok(Some(recorded)) if recorded == pid => Ok(()),
            _ => Err(SupervisorError::ConcurrentInstance {
                path: self.path.clone(),
            }),
        }
    }
}
