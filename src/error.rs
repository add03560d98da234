use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("journal is already locked by another writer")]
    Locked,
    #[error("journal frame is corrupted")]
    Corrupted,
    #[error(transparent)]
    Corruption(Box<CorruptionError>),
    #[error("offset is out of order in {file:?}: expect {expected} but got {offset}")]
    OutOfOrder {
        file: PathBuf,
        offset: u64,
        timestamp: Option<SystemTime>,
        expected: u64,
    },
    #[error("journal file {file:?} shrank to {size} bytes below read position {file_offset}")]
    Truncated {
        file: PathBuf,
        size: u64,
        file_offset: u64,
    },
    #[error("scan timed out")]
    Timeout,
    #[error("message key or value is too long")]
    MessageTooLong,
    #[error("append refused after an earlier write failure ({0:?})")]
    Sticky(io::ErrorKind),
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Returned by [`crate::Writer::open`] when the tail of the last segment
/// could not be read back. `fix_err == None` means the bad tail has been
/// truncated away and a second open will succeed.
#[derive(Debug)]
pub struct CorruptionError {
    /// Path of the corrupted segment file.
    pub file: PathBuf,
    /// Offset at which corruption was detected, one past the last whole frame.
    pub offset: u64,
    /// Timestamp of the last whole frame, if any survived.
    pub timestamp: Option<SystemTime>,
    /// The bytes removed from the tail.
    pub message: Vec<u8>,
    /// The read error that triggered recovery.
    pub err: Box<Error>,
    /// Set when truncation itself failed; the journal is then unrecoverable.
    pub fix_err: Option<io::Error>,
}

impl fmt::Display for CorruptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fix_err {
            Some(fix_err) => write!(
                f,
                "file {} is corrupted but failed to fix it: {fix_err}",
                self.file.display()
            ),
            None => write!(
                f,
                "file {} is corrupted but has been fixed, base64 of the bad tail is {}",
                self.file.display(),
                STANDARD.encode(&self.message)
            ),
        }
    }
}

impl std::error::Error for CorruptionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
