//! Multifile header constants and read/write helpers.
//!
//! The header is always the **first 12 bytes** of the backing file:
//!
//! ```text
//! [magic: 4 bytes = "Sof+"][index pointer: u64 BE]
//! ```
//!
//! The index pointer gives the start of the serialized catalog chunk; a
//! fresh container points it at the data region, where an empty catalog
//! (a zero entry count) is written alongside the header.

use std::io::{Read, Seek, Write};

use index::DATA_START;

/// Magic bytes identifying a Multifile ("Sof+").
pub const MULTIFILE_MAGIC: [u8; 4] = *b"Sof+";

/// Size of the header in bytes: 4 (magic) + 8 (index pointer). Equals
/// [`DATA_START`], the first offset available to chunks.
pub const HEADER_BYTES: u64 = 4 + 8;

/// Writes a fresh header at offset 0: magic, an index pointer aimed at
/// `DATA_START`, and the empty catalog (entry count 0) it points to.
pub fn write_header<W: Write + Seek>(w: &mut W) -> codec::Result<()> {
    codec::seek_to(w, 0)?;
    codec::write_bytes(w, &MULTIFILE_MAGIC)?;
    codec::write_u64(w, DATA_START)?;
    codec::write_u64(w, 0)?;
    Ok(())
}

/// Reads the header, returning `(magic, index_pointer)`. Validating the
/// magic is the caller's job.
pub fn read_header<R: Read + Seek>(r: &mut R) -> codec::Result<([u8; 4], u64)> {
    codec::seek_to(r, 0)?;
    let bytes = codec::read_bytes(r, 4)?;
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&bytes);
    let pointer = codec::read_u64(r)?;
    Ok((magic, pointer))
}
