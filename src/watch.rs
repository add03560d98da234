use std::path::Path;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::{Error, Result};

/// Signals segment files appearing in or disappearing from a directory.
pub struct DirWatcher {
    inner: ChangeWatcher,
}

/// Signals writes to a single file.
pub struct FileWatcher {
    inner: ChangeWatcher,
}

// OS notification subscription collapsed to a single retained signal.
// Whatever happens between two polls of the channel shows up as one `()`;
// the consumer only needs "something changed since I last checked".
struct ChangeWatcher {
    rx: Receiver<()>,
    err: Arc<Mutex<Option<notify::Error>>>,
    _watcher: RecommendedWatcher,
}

impl ChangeWatcher {
    fn new(path: &Path, wanted: fn(&EventKind) -> bool) -> Result<Self> {
        let (tx, rx) = bounded::<()>(1);
        let err = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&err);
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) if wanted(&event.kind) => {
                    let _ = tx.try_send(());
                }
                Ok(_) => {}
                Err(watch_err) => {
                    log::warn!("journal watcher error: {watch_err}");
                    if let Ok(mut slot) = sink.lock() {
                        *slot = Some(watch_err);
                    }
                }
            },
            Config::default(),
        )?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(Self {
            rx,
            err,
            _watcher: watcher,
        })
    }

    fn take_err(&self) -> Option<notify::Error> {
        self.err.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl DirWatcher {
    pub fn new(path: &Path) -> Result<Self> {
        let inner = ChangeWatcher::new(path, |kind| {
            matches!(
                kind,
                EventKind::Create(_) | EventKind::Remove(_) | EventKind::Any
            )
        })?;
        Ok(Self { inner })
    }

    /// The pending-change channel; holds at most one signal.
    pub fn watch(&self) -> &Receiver<()> {
        &self.inner.rx
    }

    /// Takes the last asynchronous watcher error, if one occurred.
    pub fn take_err(&self) -> Option<Error> {
        self.inner.take_err().map(Error::Watch)
    }
}

impl FileWatcher {
    pub fn new(path: &Path) -> Result<Self> {
        let inner = ChangeWatcher::new(path, |kind| {
            matches!(kind, EventKind::Modify(_) | EventKind::Any)
        })?;
        Ok(Self { inner })
    }

    pub fn watch(&self) -> &Receiver<()> {
        &self.inner.rx
    }

    pub fn take_err(&self) -> Option<Error> {
        self.inner.take_err().map(Error::Watch)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};
    use std::io::Write;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::{DirWatcher, FileWatcher};

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn dir_watcher_signals_created_files() {
        let dir = tempdir().expect("tempdir");
        let watcher = DirWatcher::new(dir.path()).expect("watch dir");

        File::create(dir.path().join("0000000000000001.jnl")).expect("create");
        watcher.watch().recv_timeout(WAIT).expect("create signal");

        fs::remove_file(dir.path().join("0000000000000001.jnl")).expect("remove");
        watcher.watch().recv_timeout(WAIT).expect("remove signal");
    }

    #[test]
    fn file_watcher_collapses_multiple_writes() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("0000000000000000.jnl");
        let mut file = File::create(&path).expect("create");
        let watcher = FileWatcher::new(&path).expect("watch file");

        for _ in 0..10 {
            file.write_all(b"x").expect("write");
        }
        file.flush().expect("flush");

        watcher.watch().recv_timeout(WAIT).expect("write signal");
        // at most one signal is retained for the burst of writes
        std::thread::sleep(Duration::from_millis(200));
        assert!(watcher.watch().len() <= 1);
    }
}
