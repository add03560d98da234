use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::Result;

/// Discovers journal directories and hands each one to a callback exactly
/// once, no matter how often it is polled.
pub struct RootWatcher<F: FnMut(&Path)> {
    seen: HashSet<PathBuf>,
    open: F,
}

impl<F: FnMut(&Path)> RootWatcher<F> {
    pub fn new(open: F) -> Self {
        Self {
            seen: HashSet::new(),
            open,
        }
    }

    /// Fires the callback if `dir` holds a journal (a `jnl/` subdirectory)
    /// and has not been reported before.
    pub fn poll(&mut self, dir: &Path) {
        if self.seen.contains(dir) {
            return;
        }
        if !dir.join("jnl").is_dir() {
            return;
        }
        self.seen.insert(dir.to_path_buf());
        log::debug!("discovered journal directory {}", dir.display());
        (self.open)(dir);
    }
}

/// Polls `root` and its direct subdirectories every `interval`, invoking
/// `open` once per journal directory found. Runs until listing the root
/// fails.
pub fn watch_root<F: FnMut(&Path)>(root: &Path, interval: Duration, open: F) -> Result<()> {
    let mut watcher = RootWatcher::new(open);
    loop {
        let started = Instant::now();
        if root.is_dir() {
            watcher.poll(root);
            for entry in std::fs::read_dir(root)? {
                watcher.poll(&entry?.path());
            }
        }
        if let Some(delay) = interval.checked_sub(started.elapsed()) {
            std::thread::sleep(delay);
        }
    }
}
