use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{Error, Result};

/// Advisory exclusive lock backed by a lock file.
///
/// The file is created on acquire and removed again on release to keep the
/// journal directory tidy.
#[derive(Debug)]
pub(crate) struct FileLock {
    file: Option<File>,
    path: PathBuf,
}

impl FileLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().write(true).create(true).open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                file: Some(file),
                path: path.to_path_buf(),
            }),
            Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(Error::Locked)
            }
            Err(err) => Err(Error::Io(err)),
        }
    }

    pub fn release(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.unlock()?;
            drop(file);
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::FileLock;
    use crate::Error;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("jnl.lck");

        let mut lock = FileLock::acquire(&path).expect("first acquire");
        assert!(matches!(FileLock::acquire(&path), Err(Error::Locked)));

        lock.release().expect("release");
        assert!(!path.exists(), "lock file is removed on release");
        FileLock::acquire(&path).expect("reacquire");
    }
}
