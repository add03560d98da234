use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::lock::FileLock;
use crate::segment::{self, JournalDir};
use crate::{Error, Result};

/// Picks the starting value for a consumer that has no stored offset yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetPolicy {
    /// Start from the oldest message still in the journal.
    First,
    /// Start after the newest readable message.
    Last,
}

/// Returns the offset directory under a journal root.
pub fn offset_dir_path(root: &Path) -> PathBuf {
    root.join("ofs")
}

/// A consumer's durable cursor, stored as 8 big-endian bytes in
/// `ofs/<name>.ofs` and guarded by an exclusive `ofs/<name>.lck`.
pub struct Offset {
    dir: File,
    path: PathBuf,
    lock: FileLock,
    value: u64,
    /// Syncs the temp file and the directory during [`commit`](Self::commit)
    /// when set, making the new value survive power loss.
    pub syncing: bool,
}

impl Offset {
    /// Locks and loads the cursor `name` under `root`. A missing or empty
    /// offset file is initialized according to `policy`.
    pub fn open(root: impl AsRef<Path>, name: &str, policy: OffsetPolicy) -> Result<Self> {
        let root = root.as_ref();
        let dir_path = offset_dir_path(root);
        fs::create_dir_all(&dir_path)?;
        let lock = FileLock::acquire(&dir_path.join(format!("{name}.lck")))?;
        let path = dir_path.join(format!("{name}.ofs"));
        let value = match read_offset_file(&path)? {
            Some(value) => value,
            None => default_value(root, policy)?,
        };
        let dir = File::open(&dir_path)?;
        Ok(Self {
            dir,
            path,
            lock,
            value,
            syncing: false,
        })
    }

    /// Reads a cursor's stored value without taking its lock. Fails when
    /// the cursor was never committed.
    pub fn read(root: impl AsRef<Path>, name: &str) -> Result<u64> {
        let path = offset_dir_path(root.as_ref()).join(format!("{name}.ofs"));
        read_offset_file(&path)?.ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "offset file is missing or empty",
            ))
        })
    }

    /// The current in-memory value.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Atomically persists `offset`: temp file, optional fsync, rename over
    /// the cursor file, optional directory fsync. Committing the current
    /// value is a no-op.
    pub fn commit(&mut self, offset: u64) -> Result<()> {
        if offset == self.value {
            return Ok(());
        }
        let tmp = self.path.with_extension("ofs.tmp");
        if let Err(err) = self.write_tmp(&tmp, offset) {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        if self.syncing {
            self.dir.sync_all()?;
        }
        self.value = offset;
        Ok(())
    }

    /// Releases the cursor lock.
    pub fn close(mut self) -> Result<()> {
        self.lock.release()
    }

    fn write_tmp(&self, tmp: &Path, offset: u64) -> Result<()> {
        let mut file = File::create(tmp)?;
        file.write_all(&offset.to_be_bytes())?;
        if self.syncing {
            file.sync_all()?;
        }
        Ok(())
    }
}

// A 0-byte file is legal and means "uninitialized", same as no file at all.
fn read_offset_file(path: &Path) -> Result<Option<u64>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut bytes = Vec::with_capacity(8);
    file.read_to_end(&mut bytes)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    if bytes.len() < 8 {
        return Err(Error::Corrupted);
    }
    Ok(Some(u64::from_be_bytes(
        bytes[..8].try_into().expect("slice length"),
    )))
}

fn default_value(root: &Path, policy: OffsetPolicy) -> Result<u64> {
    let dir = JournalDir::open(&segment::journal_dir_path(root))?;
    match policy {
        OffsetPolicy::First => Ok(dir.first().first_offset),
        OffsetPolicy::Last => dir.last().last_readable_offset(),
    }
}
