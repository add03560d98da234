mod common;

use jnl::Writer;
use tempfile::tempdir;

#[test]
fn write_close_read_back_in_order() {
    let dir = tempdir().expect("tempdir");
    let mut writer = Writer::open(dir.path()).expect("writer open");
    common::write_values(&mut writer, &["a", "bc", "def"]);
    writer.close().expect("writer close");

    let messages = common::read_messages(dir.path(), 0, 3);
    let offsets: Vec<u64> = messages.iter().map(|m| m.offset).collect();
    assert_eq!(offsets, [0, 1, 2]);
    let values: Vec<&[u8]> = messages.iter().map(|m| m.value.as_slice()).collect();
    assert_eq!(values, [b"a".as_slice(), b"bc", b"def"]);
    for msg in &messages {
        assert!(msg.timestamp.is_some(), "append stamps the timestamp");
    }
}

#[test]
fn flushed_messages_are_visible_before_close() {
    let dir = tempdir().expect("tempdir");
    let mut writer = Writer::open(dir.path()).expect("writer open");
    common::write_values(&mut writer, &["a", "bc"]);
    writer.flush().expect("flush");

    assert_eq!(common::read_values(dir.path(), 0, 2), ["a", "bc"]);
    writer.close().expect("writer close");
}

#[test]
fn key_and_type_round_trip() {
    let dir = tempdir().expect("tempdir");
    let mut writer = Writer::open(dir.path()).expect("writer open");
    let mut msg = jnl::Message {
        type_tag: 9,
        key: b"user-17".to_vec(),
        value: b"signup".to_vec(),
        ..jnl::Message::default()
    };
    writer.append(&mut msg).expect("append");
    writer.close().expect("writer close");

    let got = common::read_messages(dir.path(), 0, 1).remove(0);
    assert_eq!(got.type_tag, 9);
    assert_eq!(got.key, b"user-17");
    assert_eq!(got.value, b"signup");
    assert_eq!(got.timestamp, msg.timestamp, "timestamp survives the disk trip");
}
