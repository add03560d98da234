use std::fs::OpenOptions;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::CorruptionError;
use crate::lock::FileLock;
use crate::message::{Message, MAX_KEY_LEN};
use crate::segment::{self, JournalDir, JournalFile};
use crate::{Error, Result};

/// Default segment rotation threshold.
pub const DEFAULT_SEGMENT_SIZE: u64 = 1 << 30;

/// The single exclusive appender of a journal.
///
/// One writer per journal root at a time, enforced by the `jnl.lck` lock
/// file. The writer owns the last segment, appends through a buffered sink,
/// and rotates to a fresh segment once the current one reaches
/// [`segment_size`](Self::segment_size) bytes.
#[derive(Debug)]
pub struct Writer {
    dir_path: PathBuf,
    lock: FileLock,
    file: BufWriter<std::fs::File>,
    file_size: u64,
    next_offset: u64,
    sticky: Option<io::ErrorKind>,
    /// Rotation threshold in bytes; may be adjusted between appends.
    pub segment_size: u64,
}

impl Writer {
    /// Locks the journal under `root` and recovers the append position from
    /// the last segment's tail.
    ///
    /// A tail that cannot be read backward is healed by truncating after
    /// the last whole frame; the call still fails with
    /// [`Error::Corruption`] so the damage is auditable, and a second open
    /// succeeds when the fix went through.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let lock = FileLock::acquire(&segment::lock_file_path(root))?;
        let dir_path = segment::journal_dir_path(root);
        let dir = JournalDir::open(&dir_path)?;
        let last = dir.last().clone();

        let mut file = OpenOptions::new().read(true).write(true).open(&last.path)?;
        let file_size = file.seek(SeekFrom::End(0))?;
        let next_offset = if file_size == 0 {
            last.first_offset
        } else {
            match Message::read_backward(&mut file) {
                Ok(msg) => msg.offset + 1,
                Err(err) => return Err(fix_tail(&last, err)),
            }
        };
        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            dir_path,
            lock,
            file: BufWriter::new(file),
            file_size,
            next_offset,
            sticky: None,
            segment_size: DEFAULT_SEGMENT_SIZE,
        })
    }

    /// Assigns the next offset to `msg`, stamps an unset timestamp, and
    /// appends the frame to the buffered sink.
    ///
    /// A failed write poisons the writer; every later append is refused
    /// with [`Error::Sticky`] until the writer is closed.
    pub fn append(&mut self, msg: &mut Message) -> Result<()> {
        if let Some(kind) = self.sticky {
            return Err(Error::Sticky(kind));
        }
        if msg.key.len() > MAX_KEY_LEN || msg.value.len() > i32::MAX as usize {
            return Err(Error::MessageTooLong);
        }
        msg.offset = self.next_offset;
        if msg.timestamp.is_none() {
            msg.timestamp = Some(SystemTime::now());
        }
        let written = match msg.write_to(&mut self.file) {
            Ok(n) => n,
            Err(err) => return Err(self.poison(err)),
        };
        self.next_offset += 1;
        self.file_size += written;
        if self.file_size >= self.segment_size {
            if let Err(err) = self.rotate() {
                return Err(self.poison(err));
            }
        }
        Ok(())
    }

    /// The offset the next appended message will get.
    pub fn offset(&self) -> u64 {
        self.next_offset
    }

    /// Moves buffered frames into the file; fresh readers of the segment
    /// observe them afterwards.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Flushes, then fsyncs the current segment file.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    /// Flushes and syncs the current segment, then releases the journal
    /// lock.
    pub fn close(mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        self.lock.release()
    }

    fn poison(&mut self, err: Error) -> Error {
        if let Error::Io(io_err) = &err {
            self.sticky = Some(io_err.kind());
        }
        err
    }

    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        let (_, file) = segment::create_segment_file(&self.dir_path, self.next_offset)?;
        self.file = BufWriter::new(file);
        self.file_size = 0;
        Ok(())
    }
}

fn fix_tail(journal_file: &JournalFile, err: Error) -> Error {
    let mut corruption = CorruptionError {
        file: journal_file.path.clone(),
        offset: journal_file.first_offset,
        timestamp: None,
        message: Vec::new(),
        err: Box::new(err),
        fix_err: None,
    };
    if let Err(fix_err) = truncate_tail(journal_file, &mut corruption) {
        corruption.fix_err = Some(fix_err);
    }
    Error::Corruption(Box::new(corruption))
}

// Scans from the head, truncates after the last whole frame, and records
// the removed bytes for the corruption report.
fn truncate_tail(journal_file: &JournalFile, report: &mut CorruptionError) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&journal_file.path)?;
    let mut msg = Message::default();
    let mut good_end: u64 = 0;
    while let Ok(n) = msg.read_from(&mut file) {
        good_end += n;
        report.offset = msg.offset + 1;
        report.timestamp = msg.timestamp;
    }
    file.seek(SeekFrom::Start(good_end))?;
    let mut bad = Vec::new();
    file.read_to_end(&mut bad)?;
    report.message = bad;
    file.set_len(good_end)?;
    file.sync_all()?;
    log::warn!(
        "truncated {} corrupt tail byte(s) from {}",
        report.message.len(),
        journal_file.path.display()
    );
    Ok(())
}
