use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::message::Message;
use crate::{Error, Result};

const SEGMENT_EXT: &str = ".jnl";

/// Returns the segment directory under a journal root.
pub fn journal_dir_path(root: &Path) -> PathBuf {
    root.join("jnl")
}

pub(crate) fn lock_file_path(root: &Path) -> PathBuf {
    root.join("jnl.lck")
}

/// One segment of a journal, named after the offset of the first message it
/// will contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalFile {
    pub first_offset: u64,
    pub path: PathBuf,
}

/// A sorted snapshot of the segment files in one journal directory.
///
/// The snapshot always holds at least one segment; opening an empty
/// directory creates `0000000000000000.jnl`.
#[derive(Debug)]
pub struct JournalDir {
    pub path: PathBuf,
    pub files: Vec<JournalFile>,
}

impl JournalDir {
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;
        let mut files = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(file) = parse_journal_file_name(path, name) {
                files.push(file);
            }
        }
        if files.is_empty() {
            let (file, handle) = create_segment_file(path, 0)?;
            drop(handle);
            files.push(file);
        }
        files.sort_by_key(|f| f.first_offset);
        Ok(Self {
            path: path.to_path_buf(),
            files,
        })
    }

    pub fn first(&self) -> &JournalFile {
        &self.files[0]
    }

    pub fn last(&self) -> &JournalFile {
        self.files.last().expect("journal dir holds at least one segment")
    }

    /// Returns the segment whose offset range contains `offset`. Offsets
    /// below the first segment clamp to the first segment; offsets past the
    /// last resolve to the last.
    pub fn find(&self, offset: u64) -> &JournalFile {
        let mut found = self.first();
        for file in &self.files {
            if file.first_offset > offset {
                break;
            }
            found = file;
        }
        found
    }

    /// Answers against this snapshot; a new segment may appear on disk at
    /// any time after it was taken.
    pub fn is_last(&self, file: &JournalFile) -> bool {
        self.last().first_offset == file.first_offset
    }
}

impl JournalFile {
    /// Returns one past the offset of the last message, or `first_offset`
    /// for an empty segment. Any unreadable tail reports `Corrupted`.
    pub fn last_offset(&self) -> Result<u64> {
        let mut file = File::open(&self.path)?;
        let size = file.seek(SeekFrom::End(0))?;
        if size == 0 {
            return Ok(self.first_offset);
        }
        match Message::read_backward(&mut file) {
            Ok(msg) => Ok(msg.offset + 1),
            Err(_) => Err(Error::Corrupted),
        }
    }

    /// Like [`last_offset`](Self::last_offset), but a corrupt tail falls
    /// back to a forward scan and reports one past the last whole frame.
    pub fn last_readable_offset(&self) -> Result<u64> {
        match self.last_offset() {
            Err(Error::Corrupted) => {}
            result => return result,
        }
        let mut file = File::open(&self.path)?;
        let mut msg = Message::default();
        let mut offset = self.first_offset;
        while msg.read_from(&mut file).is_ok() {
            offset = msg.offset + 1;
        }
        Ok(offset)
    }
}

/// Parses `<16-lowercase-hex>.jnl` into a segment entry. Anything else,
/// sidecar files included, yields `None`.
pub fn parse_journal_file_name(dir: &Path, name: &str) -> Option<JournalFile> {
    let stem = name.strip_suffix(SEGMENT_EXT)?;
    if stem.len() != 16 {
        return None;
    }
    if !stem
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return None;
    }
    let first_offset = u64::from_str_radix(stem, 16).ok()?;
    Some(JournalFile {
        first_offset,
        path: dir.join(name),
    })
}

pub(crate) fn segment_file_name(first_offset: u64) -> String {
    format!("{first_offset:016x}{SEGMENT_EXT}")
}

pub(crate) fn create_segment_file(dir: &Path, first_offset: u64) -> Result<(JournalFile, File)> {
    let path = dir.join(segment_file_name(first_offset));
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    Ok((JournalFile { first_offset, path }, file))
}
