use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{Error, Result};

/// Frame overhead of a message with an empty key and an empty value.
pub const META_SIZE: usize = 26;

/// Longest key the frame's signed length prefix can carry.
pub const MAX_KEY_LEN: usize = 127;

// Nanosecond sentinel stored for a message without a timestamp.
const TIMESTAMP_UNSET: i64 = i64::MIN;

/// One record of a segmented journal.
///
/// On disk a message is framed as big-endian `offset`, `timestamp`, `type`,
/// a signed byte key length, the key, a signed 32-bit value length, the
/// value, and a trailing total size equal to the whole frame's byte count.
/// The trailing size makes the frame readable backward from its end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub offset: u64,
    pub timestamp: Option<SystemTime>,
    pub type_tag: u8,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Message {
    /// Number of bytes this message occupies on disk.
    pub fn frame_size(&self) -> usize {
        META_SIZE + self.key.len() + self.value.len()
    }

    /// Appends the framed message to `w` and returns the byte count written,
    /// which equals the frame's trailing size field.
    ///
    /// Length limits are checked before the first byte is written so a
    /// rejected message never leaves a partial frame behind.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<u64> {
        if self.key.len() > MAX_KEY_LEN || self.value.len() > i32::MAX as usize {
            return Err(Error::MessageTooLong);
        }
        let mut cnt: u64 = 0;

        w.write_all(&self.offset.to_be_bytes())?;
        cnt += 8;

        let nanos = match self.timestamp {
            Some(ts) => unix_nanos(ts),
            None => TIMESTAMP_UNSET,
        };
        w.write_all(&nanos.to_be_bytes())?;
        cnt += 8;

        w.write_all(&[self.type_tag])?;
        cnt += 1;

        w.write_all(&[self.key.len() as u8])?;
        cnt += 1;
        w.write_all(&self.key)?;
        cnt += self.key.len() as u64;

        w.write_all(&(self.value.len() as i32).to_be_bytes())?;
        cnt += 4;
        w.write_all(&self.value)?;
        cnt += self.value.len() as u64;

        w.write_all(&((cnt + 4) as i32).to_be_bytes())?;
        cnt += 4;

        Ok(cnt)
    }

    /// Reads one framed message, replacing the fields of `self`, and returns
    /// the byte count consumed.
    ///
    /// On any failure the reader is seeked back to where it was before the
    /// call, so the caller can retry from a consistent position once more
    /// data has been appended.
    pub fn read_from<R: Read + Seek>(&mut self, r: &mut R) -> Result<u64> {
        let mut cnt: i64 = 0;
        match self.read_fields(r, &mut cnt) {
            Ok(()) => Ok(cnt as u64),
            Err(err) => {
                if cnt > 0 {
                    r.seek(SeekFrom::Current(-cnt))?;
                }
                Err(err)
            }
        }
    }

    fn read_fields<R: Read + Seek>(&mut self, r: &mut R, cnt: &mut i64) -> Result<()> {
        let mut buf8 = [0u8; 8];
        read_full(r, &mut buf8, cnt)?;
        self.offset = u64::from_be_bytes(buf8);

        read_full(r, &mut buf8, cnt)?;
        let nanos = i64::from_be_bytes(buf8);
        self.timestamp = if nanos == TIMESTAMP_UNSET {
            None
        } else {
            Some(nanos_to_time(nanos))
        };

        let mut buf1 = [0u8; 1];
        read_full(r, &mut buf1, cnt)?;
        self.type_tag = buf1[0];

        read_full(r, &mut buf1, cnt)?;
        let key_len = buf1[0] as i8;
        if key_len < 0 {
            return Err(Error::Corrupted);
        }
        self.key.clear();
        self.key.resize(key_len as usize, 0);
        read_full(r, &mut self.key, cnt)?;

        let mut buf4 = [0u8; 4];
        read_full(r, &mut buf4, cnt)?;
        let value_len = i32::from_be_bytes(buf4);
        if value_len < 0 {
            return Err(Error::Corrupted);
        }
        self.value.clear();
        self.value.resize(value_len as usize, 0);
        read_full(r, &mut self.value, cnt)?;

        read_full(r, &mut buf4, cnt)?;
        let trailer = i32::from_be_bytes(buf4);
        if i64::from(trailer) != *cnt {
            return Err(Error::Corrupted);
        }
        Ok(())
    }

    /// Reads the message that ends at the reader's current position by
    /// following the trailing size field, leaving the reader back at the
    /// frame's end.
    pub fn read_backward<R: Read + Seek>(r: &mut R) -> Result<Message> {
        r.seek(SeekFrom::Current(-4))?;
        let mut cnt = 0i64;
        let mut buf4 = [0u8; 4];
        read_full(r, &mut buf4, &mut cnt)?;
        let size = i32::from_be_bytes(buf4);
        if size < META_SIZE as i32 {
            return Err(Error::Corrupted);
        }
        r.seek(SeekFrom::Current(-i64::from(size)))?;
        let mut msg = Message::default();
        msg.read_from(r)?;
        Ok(msg)
    }
}

// read_exact would leave the consumed count unspecified on a short read;
// the rollback in read_from needs it exact.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8], cnt: &mut i64) -> Result<()> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..]) {
            Ok(0) => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "journal frame is truncated",
                )))
            }
            Ok(n) => {
                read += n;
                *cnt += n as i64;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(Error::Io(err)),
        }
    }
    Ok(())
}

fn unix_nanos(ts: SystemTime) -> i64 {
    match ts.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(err) => -(err.duration().as_nanos() as i64),
    }
}

fn nanos_to_time(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}
