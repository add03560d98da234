mod common;

use jnl::{Error, Offset, OffsetPolicy, Writer};
use tempfile::tempdir;

#[test]
fn committed_value_survives_reopen() {
    let dir = tempdir().expect("tempdir");

    let mut offset = Offset::open(dir.path(), "reader1", OffsetPolicy::First).expect("open");
    assert_eq!(offset.value(), 0);
    offset.commit(1).expect("commit");
    assert_eq!(offset.value(), 1);
    offset.close().expect("close");

    let offset = Offset::open(dir.path(), "reader1", OffsetPolicy::First).expect("reopen");
    assert_eq!(offset.value(), 1);
    offset.close().expect("close");
}

#[test]
fn default_policies_resolve_against_the_journal() {
    let dir = tempdir().expect("tempdir");
    let mut writer = Writer::open(dir.path()).expect("writer open");
    common::write_values(&mut writer, &["a", "b", "c"]);
    writer.close().expect("writer close");

    let from_start = Offset::open(dir.path(), "replayer", OffsetPolicy::First).expect("open");
    assert_eq!(from_start.value(), 0);
    from_start.close().expect("close");

    let from_tail = Offset::open(dir.path(), "follower", OffsetPolicy::Last).expect("open");
    assert_eq!(from_tail.value(), 3);
    from_tail.close().expect("close");
}

#[test]
fn empty_offset_file_counts_as_uninitialized() {
    let dir = tempdir().expect("tempdir");
    let ofs_dir = jnl::offset::offset_dir_path(dir.path());
    std::fs::create_dir_all(&ofs_dir).expect("ofs dir");
    std::fs::write(ofs_dir.join("reader1.ofs"), b"").expect("empty file");

    let offset = Offset::open(dir.path(), "reader1", OffsetPolicy::First).expect("open");
    assert_eq!(offset.value(), 0);
    offset.close().expect("close");
}

#[test]
fn readonly_read_needs_a_committed_value() {
    let dir = tempdir().expect("tempdir");
    assert!(Offset::read(dir.path(), "reader1").is_err());

    let mut offset = Offset::open(dir.path(), "reader1", OffsetPolicy::First).expect("open");
    offset.syncing = true;
    offset.commit(7).expect("commit");

    // readonly access takes no lock, so it works while the holder is open
    assert_eq!(Offset::read(dir.path(), "reader1").expect("read"), 7);
    offset.close().expect("close");
}

#[test]
fn cursor_lock_allows_one_holder() {
    let dir = tempdir().expect("tempdir");
    let offset = Offset::open(dir.path(), "reader1", OffsetPolicy::First).expect("open");
    assert!(matches!(
        Offset::open(dir.path(), "reader1", OffsetPolicy::First),
        Err(Error::Locked)
    ));
    // a different consumer name is unaffected
    Offset::open(dir.path(), "reader2", OffsetPolicy::First)
        .expect("open other")
        .close()
        .expect("close other");
    offset.close().expect("close");

    Offset::open(dir.path(), "reader1", OffsetPolicy::First)
        .expect("reopen after close")
        .close()
        .expect("close");
}

#[test]
fn committing_the_current_value_is_a_no_op() {
    let dir = tempdir().expect("tempdir");
    let mut offset = Offset::open(dir.path(), "reader1", OffsetPolicy::First).expect("open");
    offset.commit(0).expect("no-op commit");
    // still uninitialized on disk because the value never changed
    assert!(Offset::read(dir.path(), "reader1").is_err());
    offset.commit(2).expect("commit");
    assert_eq!(Offset::read(dir.path(), "reader1").expect("read"), 2);
    offset.close().expect("close");
}
