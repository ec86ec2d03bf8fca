//! Big-endian wire primitives for the Multifile on-disk format.
//!
//! Every multi-byte integer in a Multifile is a **big-endian u64**, and
//! every string is a u64 length prefix followed by UTF-8 bytes. The helpers
//! here are free functions over any seekable handle; they own no buffering,
//! so callers are responsible for flushing before observing on-disk state.
//!
//! All failures carry the file offset they happened at, which makes a
//! corrupt container diagnosable from the error message alone.

use byteorder::{BigEndian, ByteOrder};
use std::io::{self, Read, Seek, SeekFrom, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("short read at offset {at}: wanted {wanted} bytes, got {got}")]
    ShortRead { at: u64, wanted: usize, got: usize },
    #[error("short write at offset {at}: wanted {wanted} bytes, wrote {wrote}")]
    ShortWrite { at: u64, wanted: usize, wrote: usize },
    #[error("seek to offset {target} failed: {source}")]
    Seek { target: u64, source: io::Error },
    #[error("invalid utf-8 in string at offset {at}")]
    BadString { at: u64 },
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Reads exactly `n` bytes from the current position.
///
/// # Errors
///
/// Returns [`CodecError::ShortRead`] (with the starting offset and the
/// number of bytes actually available) if the handle ends early.
pub fn read_bytes<R: Read + Seek>(r: &mut R, n: usize) -> Result<Vec<u8>> {
    let at = r.stream_position()?;
    let mut buf = vec![0u8; n];
    let mut got = 0;
    while got < n {
        match r.read(&mut buf[got..]) {
            Ok(0) => return Err(CodecError::ShortRead { at, wanted: n, got }),
            Ok(k) => got += k,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CodecError::Io(e)),
        }
    }
    Ok(buf)
}

/// Writes all of `bytes` at the current position.
///
/// # Errors
///
/// Returns [`CodecError::ShortWrite`] if the handle stops accepting bytes.
pub fn write_bytes<W: Write + Seek>(w: &mut W, bytes: &[u8]) -> Result<()> {
    let at = w.stream_position()?;
    let mut wrote = 0;
    while wrote < bytes.len() {
        match w.write(&bytes[wrote..]) {
            Ok(0) => {
                return Err(CodecError::ShortWrite {
                    at,
                    wanted: bytes.len(),
                    wrote,
                })
            }
            Ok(k) => wrote += k,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CodecError::Io(e)),
        }
    }
    Ok(())
}

/// Reads a fixed-width big-endian u64.
pub fn read_u64<R: Read + Seek>(r: &mut R) -> Result<u64> {
    let buf = read_bytes(r, 8)?;
    Ok(BigEndian::read_u64(&buf))
}

/// Writes a fixed-width big-endian u64.
pub fn write_u64<W: Write + Seek>(w: &mut W, value: u64) -> Result<()> {
    let mut buf = [0u8; 8];
    BigEndian::write_u64(&mut buf, value);
    write_bytes(w, &buf)
}

/// Reads a length-prefixed UTF-8 string: u64 BE length, then that many bytes.
///
/// # Errors
///
/// Returns [`CodecError::BadString`] (with the offset of the length prefix)
/// if the bytes are not valid UTF-8.
pub fn read_string<R: Read + Seek>(r: &mut R) -> Result<String> {
    let at = r.stream_position()?;
    let len = read_u64(r)?;
    let bytes = read_bytes(r, len as usize)?;
    String::from_utf8(bytes).map_err(|_| CodecError::BadString { at })
}

/// Writes a length-prefixed UTF-8 string.
pub fn write_string<W: Write + Seek>(w: &mut W, s: &str) -> Result<()> {
    write_u64(w, s.len() as u64)?;
    write_bytes(w, s.as_bytes())
}

/// Seeks to an absolute offset from the start of the handle.
pub fn seek_to<S: Seek>(s: &mut S, offset: u64) -> Result<()> {
    s.seek(SeekFrom::Start(offset))
        .map_err(|e| CodecError::Seek {
            target: offset,
            source: e,
        })?;
    Ok(())
}

/// Seeks to the end of the handle and returns the resulting offset.
pub fn seek_end<S: Seek>(s: &mut S) -> Result<u64> {
    Ok(s.seek(SeekFrom::End(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // -------------------- u64 round-trip --------------------

    #[test]
    fn u64_round_trip() -> Result<()> {
        let mut cur = Cursor::new(Vec::new());
        write_u64(&mut cur, 0)?;
        write_u64(&mut cur, 0xDEAD_BEEF)?;
        write_u64(&mut cur, u64::MAX)?;

        seek_to(&mut cur, 0)?;
        assert_eq!(read_u64(&mut cur)?, 0);
        assert_eq!(read_u64(&mut cur)?, 0xDEAD_BEEF);
        assert_eq!(read_u64(&mut cur)?, u64::MAX);
        Ok(())
    }

    #[test]
    fn u64_is_big_endian_on_the_wire() -> Result<()> {
        let mut cur = Cursor::new(Vec::new());
        write_u64(&mut cur, 0x0102_0304_0506_0708)?;
        assert_eq!(
            cur.get_ref().as_slice(),
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
        Ok(())
    }

    // -------------------- strings --------------------

    #[test]
    fn string_round_trip() -> Result<()> {
        let mut cur = Cursor::new(Vec::new());
        write_string(&mut cur, "posting-list/therefore")?;
        write_string(&mut cur, "")?;

        seek_to(&mut cur, 0)?;
        assert_eq!(read_string(&mut cur)?, "posting-list/therefore");
        assert_eq!(read_string(&mut cur)?, "");
        Ok(())
    }

    #[test]
    fn string_length_prefix_counts_bytes_not_chars() -> Result<()> {
        let mut cur = Cursor::new(Vec::new());
        write_string(&mut cur, "søk")?;
        seek_to(&mut cur, 0)?;
        assert_eq!(read_u64(&mut cur)?, 4); // 'ø' is two bytes
        Ok(())
    }

    #[test]
    fn string_rejects_invalid_utf8() -> Result<()> {
        let mut cur = Cursor::new(Vec::new());
        write_u64(&mut cur, 2)?;
        write_bytes(&mut cur, &[0xFF, 0xFE])?;

        seek_to(&mut cur, 0)?;
        match read_string(&mut cur) {
            Err(CodecError::BadString { at }) => assert_eq!(at, 0),
            other => panic!("expected BadString, got {:?}", other.map(|_| ())),
        }
        Ok(())
    }

    // -------------------- short reads --------------------

    #[test]
    fn short_read_reports_offset_and_counts() -> Result<()> {
        let mut cur = Cursor::new(Vec::new());
        write_u64(&mut cur, 42)?;
        // Ask for a u64 starting 5 bytes in; only 3 bytes remain.
        seek_to(&mut cur, 5)?;
        match read_u64(&mut cur) {
            Err(CodecError::ShortRead { at, wanted, got }) => {
                assert_eq!(at, 5);
                assert_eq!(wanted, 8);
                assert_eq!(got, 3);
            }
            other => panic!("expected ShortRead, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn read_bytes_zero_len_is_empty() -> Result<()> {
        let mut cur = Cursor::new(Vec::new());
        assert!(read_bytes(&mut cur, 0)?.is_empty());
        Ok(())
    }

    // -------------------- seeks --------------------

    #[test]
    fn seek_end_returns_size() -> Result<()> {
        let mut cur = Cursor::new(Vec::new());
        write_bytes(&mut cur, b"0123456789")?;
        assert_eq!(seek_end(&mut cur)?, 10);
        Ok(())
    }

    #[test]
    fn seek_then_read_at_offset() -> Result<()> {
        let mut cur = Cursor::new(Vec::new());
        write_bytes(&mut cur, b"abcdef")?;
        seek_to(&mut cur, 2)?;
        assert_eq!(read_bytes(&mut cur, 3)?, b"cde");
        Ok(())
    }
}
