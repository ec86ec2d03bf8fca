//! # Multifile — a single-file container of named, growable byte chunks
//!
//! The storage layer of the Softie full-text search index. One backing file
//! hosts up to ≈10⁵ independently addressable "subfiles", each identified
//! by a string name. Subfiles can be read in slices, overwritten at
//! arbitrary offsets, extended, appended to, or memory-mapped for in-place
//! mutation. The search layers above (document table, posting lists) are
//! plain clients of this surface.
//!
//! The container is **self-describing**: its catalog — the [`index::Index`]
//! mapping names to byte ranges — is serialized into one of the chunks it
//! manages, under the reserved name `$$softie-index$$`. The only fixed
//! anchor is the index pointer at file offset 4.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ HEADER (always the first 12 bytes)            │
//! │                                               │
//! │ magic (4 bytes "Sof+") | index ptr (u64 BE)   │
//! ├───────────────────────────────────────────────┤
//! │ DATA REGION (ranges and gaps, any order)      │
//! │                                               │
//! │   "doc-table"        → [start, start+len)     │
//! │   "postings/soaring" → [start, start+len)     │
//! │   "$$softie-index$$" → the serialized catalog │
//! │   …gaps: unowned spans, contents undefined…   │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. Chunks that outgrow their slot are moved by
//! a first-fit gap allocator; the catalog relocates itself the same way.
//!
//! ## Example
//! ```rust
//! use multifile::Multifile;
//!
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("search.sfm");
//!
//! let mut mf = Multifile::open(&path, true)?;
//! mf.write("doc-table", 0, b"tar/1 soul/2")?;
//! mf.manipulate("postings/soaring", 16, |bytes| {
//!     bytes[..4].copy_from_slice(&7u32.to_be_bytes());
//!     Ok(())
//! })?;
//! mf.close()?;
//!
//! let mut mf = Multifile::open(&path, false)?;
//! assert_eq!(mf.read("doc-table")?.as_deref(), Some(&b"tar/1 soul/2"[..]));
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;

mod container;
mod format;

pub use container::Multifile;
pub use format::{HEADER_BYTES, MULTIFILE_MAGIC};
pub use index::{INDEX_ENTRY_NAME, RESERVED_PREFIX};

#[derive(Debug, Error)]
pub enum MultifileError {
    #[error("no such multifile: {path}")]
    NotFound { path: PathBuf },
    #[error("bad magic {found:02x?}, not a multifile")]
    BadMagic { found: [u8; 4] },
    #[error("corrupted index: {0}")]
    Corrupted(#[from] index::IndexError),
    #[error("corrupted index: pointer at offset 4 is {pointer} but the self-entry starts at {start}")]
    StalePointer { pointer: u64, start: u64 },
    #[error(transparent)]
    Codec(#[from] codec::CodecError),
    #[error("multifile is closed")]
    Closed,
    #[error("could not extend the backing file to {wanted} bytes: {source}")]
    OutOfSpace { wanted: u64, source: io::Error },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
