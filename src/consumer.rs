use std::fs::File;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::message::Message;
use crate::offset::{Offset, OffsetPolicy};
use crate::scanner::Scanner;
use crate::segment::{self, JournalDir};
use crate::{Error, Result};

/// A scanner paired with a durable cursor.
///
/// The consumer resumes where its last committed offset left off and makes
/// the read-handle-commit loop explicit: pull with [`next`](Self::next),
/// persist progress with [`commit`](Self::commit) once the message has been
/// handled.
pub struct Consumer {
    scanner: Scanner,
    offset: Offset,
}

impl Consumer {
    /// Opens the cursor `name` under `root` and positions a scanner at its
    /// value. A consumer without a stored offset starts per `policy`.
    pub fn open(root: impl AsRef<Path>, name: &str, policy: OffsetPolicy) -> Result<Self> {
        let root = root.as_ref();
        let offset = Offset::open(root, name, policy)?;
        let scanner = Scanner::open(root, offset.value())?;
        Ok(Self { scanner, offset })
    }

    /// Longest a single [`next`](Self::next) waits for new data.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.scanner.timeout = timeout;
    }

    /// The next message, or `None` when the scanner stopped; check
    /// [`err`](Self::err) to tell a timeout from a failure.
    pub fn next(&mut self) -> Option<&Message> {
        if self.scanner.scan() {
            Some(self.scanner.message())
        } else {
            None
        }
    }

    /// The cause of the last `None` from [`next`](Self::next).
    pub fn err(&self) -> Option<&Error> {
        self.scanner.err()
    }

    /// Durably records that everything delivered so far has been handled.
    pub fn commit(&mut self) -> Result<()> {
        let next = self.scanner.offset();
        self.offset.commit(next)
    }

    /// The last committed offset.
    pub fn committed(&self) -> u64 {
        self.offset.value()
    }

    /// Releases the cursor lock; uncommitted progress is dropped.
    pub fn close(self) -> Result<()> {
        self.offset.close()
    }
}

/// Opens a scanner positioned at the first message whose timestamp is at or
/// past `from`.
///
/// Segments are probed by their first message, so only one segment is
/// scanned in full. When every message predates `from`, the scanner parks
/// at the journal's tail.
pub fn scanner_since(root: impl AsRef<Path>, from: SystemTime) -> Result<Scanner> {
    let root = root.as_ref();
    let dir = JournalDir::open(&segment::journal_dir_path(root))?;
    let mut start_offset = dir.first().first_offset;
    for file in &dir.files {
        let mut probe = File::open(&file.path)?;
        let mut msg = Message::default();
        match msg.read_from(&mut probe) {
            Ok(_) => {
                if msg.timestamp.map_or(false, |ts| ts > from) {
                    break;
                }
                start_offset = file.first_offset;
            }
            // an empty tail segment has nothing to probe
            Err(Error::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {}
            Err(err) => return Err(err),
        }
    }

    let mut scanner = Scanner::open(root, start_offset)?;
    let mut at = None;
    while scanner.scan() {
        let msg = scanner.message();
        if msg.timestamp.map_or(false, |ts| ts >= from) {
            at = Some(msg.offset);
            break;
        }
    }
    let at = at.unwrap_or_else(|| scanner.offset());
    drop(scanner);
    Scanner::open(root, at)
}
