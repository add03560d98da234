#![allow(dead_code)]

use std::path::{Path, PathBuf};

use jnl::{Message, Scanner, Writer};

pub fn write_values(writer: &mut Writer, values: &[&str]) {
    let start = writer.offset();
    for (i, value) in values.iter().enumerate() {
        let mut msg = Message {
            value: value.as_bytes().to_vec(),
            ..Message::default()
        };
        writer.append(&mut msg).expect("append");
        assert_eq!(msg.offset, start + i as u64);
        assert_eq!(writer.offset(), start + i as u64 + 1);
    }
}

pub fn read_messages(root: &Path, start: u64, n: usize) -> Vec<Message> {
    let mut scanner = Scanner::open(root, start).expect("scanner open");
    let mut messages = Vec::with_capacity(n);
    for i in 0..n {
        assert!(scanner.scan(), "scan {i}: {:?}", scanner.err());
        assert_eq!(scanner.offset(), start + i as u64 + 1);
        messages.push(scanner.message().clone());
    }
    messages
}

pub fn read_values(root: &Path, start: u64, n: usize) -> Vec<String> {
    read_messages(root, start, n)
        .into_iter()
        .map(|msg| String::from_utf8(msg.value).expect("utf8 value"))
        .collect()
}

/// Segment files under `root`, as sorted (file name, byte size) pairs.
pub fn segment_sizes(root: &Path) -> Vec<(String, u64)> {
    let dir = jnl::segment::journal_dir_path(root);
    let mut entries: Vec<(String, u64)> = std::fs::read_dir(&dir)
        .expect("journal dir")
        .map(|entry| entry.expect("dir entry"))
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".jnl"))
        .map(|entry| {
            let size = entry.metadata().expect("metadata").len();
            (entry.file_name().to_string_lossy().into_owned(), size)
        })
        .collect();
    entries.sort();
    entries
}

pub fn segment_path(root: &Path, first_offset: u64) -> PathBuf {
    jnl::segment::journal_dir_path(root).join(format!("{first_offset:016x}.jnl"))
}

/// Removes `n` bytes from the end of a file.
pub fn truncate_tail(path: &Path, n: u64) {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .expect("open segment");
    let size = file.metadata().expect("metadata").len();
    file.set_len(size - n).expect("truncate");
}
