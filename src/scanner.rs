use std::fs::File;
use std::io::{self, BufReader, Seek};
use std::path::Path;
use std::time::{Duration, Instant};

use crossbeam_channel::{after, never, select, Receiver};

use crate::message::Message;
use crate::segment::{self, JournalDir, JournalFile};
use crate::watch::{DirWatcher, FileWatcher};
use crate::{Error, Result};

/// Default per-call scan timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default safety-net wakeup for missed OS notifications.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// A one-directional cursor over a journal.
///
/// The scanner reads messages in offset order, advances across segment
/// boundaries on its own, and blocks at the tail until the watched file or
/// directory changes, bounded by [`timeout`](Self::timeout). Dropping the
/// scanner releases its file handle and watches.
pub struct Scanner {
    dir: WatchedJournalDir,
    file: SegmentReader,
    next_offset: u64,
    message: Message,
    err: Option<Error>,
    /// Longest a single [`scan`](Self::scan) waits for new data. Zero
    /// blocks until data or a notification arrives.
    pub timeout: Duration,
    /// Forced wakeup interval covering notifications the OS never
    /// delivered, as happens on some network filesystems.
    pub notify_timeout: Duration,
}

impl Scanner {
    /// Opens a scanner over the journal under `root`, positioned at
    /// `start_offset`.
    ///
    /// Messages before `start_offset` are skipped without being delivered.
    /// A journal that does not reach `start_offset` is not an error; the
    /// scanner simply starts at the tail.
    pub fn open(root: impl AsRef<Path>, start_offset: u64) -> Result<Self> {
        let dir = WatchedJournalDir::open(&segment::journal_dir_path(root.as_ref()))?;
        let journal_file = dir.find(start_offset).clone();
        let file = SegmentReader::open(&journal_file, dir.is_last(&journal_file))?;
        let mut scanner = Self {
            next_offset: journal_file.first_offset,
            dir,
            file,
            message: Message::default(),
            err: None,
            timeout: DEFAULT_TIMEOUT,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        };
        while scanner.next_offset < start_offset && scanner.scan() {}
        Ok(scanner)
    }

    /// Reads the next message; `true` means [`message`](Self::message)
    /// holds it. `false` leaves the cause in [`err`](Self::err).
    ///
    /// A [`Error::Timeout`] is not sticky; the next call scans again.
    pub fn scan(&mut self) -> bool {
        match &self.err {
            Some(Error::Timeout) | None => {}
            Some(_) => return false,
        }
        self.err = None;
        loop {
            let file_changed = self.file.watch();
            let dir_changed = self.dir.watch().clone();
            match self.message.read_from(&mut self.file.file) {
                Ok(_) => break,
                Err(Error::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    if !self.dir.is_last(&self.file.journal_file) {
                        if let Err(err) = self.move_to_next_file() {
                            self.err = Some(err);
                            return false;
                        }
                        continue;
                    }
                    if let Err(err) = self.wait_for_change(&file_changed, &dir_changed) {
                        self.err = Some(err);
                        return false;
                    }
                }
                Err(err) => {
                    self.err = Some(err);
                    return false;
                }
            }
        }

        if self.message.offset != self.next_offset {
            self.err = Some(Error::OutOfOrder {
                file: self.file.journal_file.path.clone(),
                offset: self.message.offset,
                timestamp: self.message.timestamp,
                expected: self.next_offset,
            });
            return false;
        }
        self.next_offset = self.message.offset + 1;
        true
    }

    /// The most recently scanned message, valid until the next
    /// [`scan`](Self::scan).
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// One past the offset of the last delivered message.
    pub fn offset(&self) -> u64 {
        self.next_offset
    }

    /// The cause of the last failed [`scan`](Self::scan).
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    // Blocks at the tail of the last segment until something changes.
    fn wait_for_change(
        &mut self,
        file_changed: &Receiver<()>,
        dir_changed: &Receiver<()>,
    ) -> Result<()> {
        if let Some(err) = self.dir.take_err().or_else(|| self.file.take_err()) {
            return Err(err);
        }
        let timeout_fires: Receiver<Instant> = if self.timeout.is_zero() {
            never()
        } else {
            after(self.timeout)
        };
        select! {
            recv(dir_changed) -> _ => {
                self.dir.reload()?;
                let target = self.dir.find(self.next_offset).clone();
                if target.first_offset != self.file.journal_file.first_offset {
                    self.reopen_at(&target)?;
                }
                // same tail segment: keep the position and the watch
            }
            recv(file_changed) -> _ => self.check_truncated()?,
            recv(timeout_fires) -> _ => return Err(Error::Timeout),
            recv(after(self.notify_timeout)) -> _ => {}
        }
        Ok(())
    }

    fn move_to_next_file(&mut self) -> Result<()> {
        let target = self.dir.find(self.next_offset).clone();
        self.reopen_at(&target)
    }

    fn reopen_at(&mut self, target: &JournalFile) -> Result<()> {
        self.file = SegmentReader::open(target, self.dir.is_last(target))?;
        Ok(())
    }

    // A watched file that shrank below the read position was truncated
    // behind our back; resynchronization is not possible.
    fn check_truncated(&mut self) -> Result<()> {
        let size = std::fs::metadata(&self.file.journal_file.path)?.len();
        let file_offset = self.file.file.stream_position()?;
        if size < file_offset {
            return Err(Error::Truncated {
                file: self.file.journal_file.path.clone(),
                size,
                file_offset,
            });
        }
        Ok(())
    }
}

// The scanner's view of one open segment. Only the journal's last segment
// carries a file watch; earlier segments are immutable and a never-firing
// channel stands in for their signal.
struct SegmentReader {
    journal_file: JournalFile,
    file: BufReader<File>,
    watcher: Option<FileWatcher>,
}

impl SegmentReader {
    fn open(journal_file: &JournalFile, watched: bool) -> Result<Self> {
        let file = BufReader::new(File::open(&journal_file.path)?);
        let watcher = if watched {
            Some(FileWatcher::new(&journal_file.path)?)
        } else {
            None
        };
        Ok(Self {
            journal_file: journal_file.clone(),
            file,
            watcher,
        })
    }

    fn watch(&self) -> Receiver<()> {
        match &self.watcher {
            Some(watcher) => watcher.watch().clone(),
            None => never(),
        }
    }

    fn take_err(&self) -> Option<Error> {
        self.watcher.as_ref().and_then(|w| w.take_err())
    }
}

// Directory snapshot coupled with a change subscription. The subscription
// is set up before the first listing so a segment created in between still
// leaves a pending signal.
struct WatchedJournalDir {
    dir: JournalDir,
    watcher: DirWatcher,
}

impl WatchedJournalDir {
    fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let watcher = DirWatcher::new(path)?;
        let dir = JournalDir::open(path)?;
        Ok(Self { dir, watcher })
    }

    fn reload(&mut self) -> Result<()> {
        let path = self.dir.path.clone();
        self.dir = JournalDir::open(&path)?;
        Ok(())
    }

    fn find(&self, offset: u64) -> &JournalFile {
        self.dir.find(offset)
    }

    fn is_last(&self, file: &JournalFile) -> bool {
        self.dir.is_last(file)
    }

    fn watch(&self) -> &Receiver<()> {
        self.watcher.watch()
    }

    fn take_err(&self) -> Option<Error> {
        self.watcher.take_err()
    }
}
