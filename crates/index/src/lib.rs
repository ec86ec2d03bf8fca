//! # Index
//!
//! The in-memory catalog of a Multifile, and its serialized on-disk form.
//!
//! The catalog keeps every [`Entry`] in **two orderings**: by name (for
//! lookups) and by start offset (for gap-finding and neighbour queries).
//! Both views are kept in sync under every mutation, and a running `size`
//! counter tracks the serialized byte length of the whole catalog so the
//! allocator always knows how much room the catalog will need next time it
//! is written out.
//!
//! The catalog is **self-hosting**: its serialized form is stored as a
//! regular chunk of the container it describes, under the reserved name
//! [`INDEX_ENTRY_NAME`]. The only stable anchor is the index pointer, a
//! big-endian u64 at file offset [`INDEX_PTR_POS`] giving the start of that
//! chunk. When the serialized catalog outgrows its slot it relocates itself
//! through the same first-fit allocator that places ordinary chunks.
//!
//! ## Serialized layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ count (u64 BE)                              │
//! ├─────────────────────────────────────────────┤
//! │ count × entry record, in by-name order:     │
//! │   start (u64 BE) | length (u64 BE)          │
//! │   name_len (u64 BE) | name bytes (UTF-8)    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust
//! use index::{Index, DATA_START};
//!
//! let mut idx = Index::new();
//! let entry = idx.create("postings/whale", 64);
//! assert_eq!(entry.start, DATA_START);
//! assert_eq!(idx.lookup("postings/whale"), Some(entry));
//! ```

use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};
use std::ops::Bound;

use codec::CodecError;
use thiserror::Error;
use tracing::{debug, trace};

mod entry;
pub use entry::Entry;

/// File offset of the index pointer: the u64 giving the start of the
/// serialized catalog. Sits right after the 4-byte container magic.
pub const INDEX_PTR_POS: u64 = 4;

/// First byte offset available for chunks: 4-byte magic + 8-byte pointer.
pub const DATA_START: u64 = 12;

/// Names starting with this prefix belong to the engine, not to clients.
pub const RESERVED_PREFIX: &str = "$$";

/// Name of the self-entry, the chunk holding the serialized catalog.
pub const INDEX_ENTRY_NAME: &str = "$$softie-index$$";

/// Transient name a chunk carries while it is being relocated.
pub const RESIZE_TMP_NAME: &str = "$$softie-tmp-resize";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("duplicate entry name in serialized index: {name}")]
    DuplicateName { name: String },
    #[error("serialized index records out of order: {prev:?} before {next:?}")]
    OutOfOrder { prev: String, next: String },
    #[error("entry {name:?} starts at {start}, inside the file header")]
    StartInHeader { name: String, start: u64 },
    #[error("zero-length entry in serialized index: {name}")]
    ZeroLength { name: String },
    #[error("entries {a:?} and {b:?} overlap")]
    Overlap { a: String, b: String },
    #[error("index lists {count} entries but none of them is the self-entry")]
    MissingSelfEntry { count: u64 },
    #[error("self-entry length {length} is smaller than the serialized index ({size} bytes)")]
    SelfEntryTooSmall { length: u64, size: u64 },
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// The catalog of every chunk in a Multifile, dual-indexed by name and by
/// start offset, plus the first-fit gap allocator that places new chunks.
///
/// Invariants held across every mutation:
/// - the by-name and by-start views contain the same entry set;
/// - no two entries overlap;
/// - `size` equals `8 + Σ header_size()` over all entries, which is exactly
///   the byte length the catalog serializes to.
#[derive(Debug)]
pub struct Index {
    by_name: BTreeMap<String, Entry>,
    by_start: BTreeMap<u64, Entry>,
    /// Serialized byte length of the catalog: the u64 count plus one record
    /// per entry. Updated incrementally by [`insert`](Index::insert) and
    /// [`remove`](Index::remove).
    size: u64,
}

impl Index {
    pub fn new() -> Self {
        Self {
            by_name: BTreeMap::new(),
            by_start: BTreeMap::new(),
            size: 8, // the count field
        }
    }

    /// Number of entries, the self-entry included once present.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Byte length the catalog would serialize to right now.
    pub fn serialized_size(&self) -> u64 {
        self.size
    }

    /// O(log n) lookup by name, returning a detached copy.
    pub fn lookup(&self, name: &str) -> Option<Entry> {
        self.by_name.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// The entry with the smallest start strictly greater than `entry`'s,
    /// i.e. its neighbour on the right.
    pub fn next_after(&self, entry: &Entry) -> Option<Entry> {
        self.by_start
            .range((Bound::Excluded(entry.start), Bound::Unbounded))
            .next()
            .map(|(_, e)| e.clone())
    }

    /// Iterates entries in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.by_start.values()
    }

    /// Iterates entry names in ascending (byte-lexicographic) name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// Adds `entry` to both orderings and grows `size` by its record size.
    ///
    /// The name must not already be present; inserting a range that
    /// overlaps a live entry corrupts the catalog.
    pub fn insert(&mut self, entry: Entry) {
        debug_assert!(!self.by_name.contains_key(&entry.name));
        self.size += entry.header_size();
        self.by_start.insert(entry.start, entry.clone());
        self.by_name.insert(entry.name.clone(), entry);
    }

    /// Removes the live entry with `entry`'s name from both orderings.
    pub fn remove(&mut self, entry: &Entry) {
        if let Some(e) = self.by_name.remove(&entry.name) {
            self.by_start.remove(&e.start);
            self.size -= e.header_size();
        }
    }

    /// Grows (or shrinks) `entry` without moving it.
    ///
    /// Returns `false` when the right-hand neighbour starts before
    /// `entry.start + new_length`, in which case nothing changes and the
    /// caller must relocate instead. On success the caller's copy and both
    /// catalog views carry the new length.
    pub fn resize_in_place(&mut self, entry: &mut Entry, new_length: u64) -> bool {
        if let Some(next) = self.next_after(entry) {
            if next.start < entry.start + new_length {
                return false;
            }
        }
        self.remove(entry);
        entry.length = new_length;
        self.insert(entry.clone());
        true
    }

    /// Renames `entry` in both orderings. Only used while relocating, to
    /// swap a freshly copied chunk in under the original name.
    pub fn rename(&mut self, entry: &mut Entry, new_name: &str) {
        self.remove(entry);
        entry.name = new_name.to_string();
        self.insert(entry.clone());
    }

    /// Allocates a range for a new chunk via [`find_gap`](Index::find_gap),
    /// inserts it, and returns the new entry.
    pub fn create(&mut self, name: &str, length: u64) -> Entry {
        let start = self.find_gap(length);
        trace!(name, start, length, "allocated chunk range");
        let entry = Entry::new(name, start, length);
        self.insert(entry.clone());
        entry
    }

    /// First-fit gap scan: walks entries in start order and returns the
    /// first offset at or after [`DATA_START`] where `length` bytes fit
    /// before the next entry, falling through to the end of the used
    /// region. Deterministic given the current catalog, and never overlaps
    /// a live range.
    pub fn find_gap(&self, length: u64) -> u64 {
        let mut last = DATA_START;
        for e in self.by_start.values() {
            if last + length <= e.start {
                return last;
            }
            last = e.end();
        }
        last
    }

    /// Writes the catalog into the container, relocating its own chunk
    /// first if the serialized form no longer fits.
    ///
    /// Three cases:
    /// - no self-entry yet (first serialization): allocate one via
    ///   [`write_to_new_section`](Index::write_to_new_section);
    /// - the right-hand neighbour starts within `size` bytes of the
    ///   self-entry: the slot is too small, so the self-entry is removed
    ///   and re-allocated elsewhere;
    /// - otherwise serialize in place, growing the self-entry's recorded
    ///   length first when `size` has crept past it, so the self-entry
    ///   always covers the serialized bytes.
    ///
    /// Flushing is the caller's responsibility.
    pub fn write_to_disk<F: Write + Seek>(&mut self, file: &mut F) -> Result<()> {
        let Some(mut own) = self.lookup(INDEX_ENTRY_NAME) else {
            return self.write_to_new_section(file);
        };

        let blocked = self
            .next_after(&own)
            .is_some_and(|next| next.start < own.start + self.size);
        if blocked {
            debug!(
                old_start = own.start,
                size = self.size,
                "serialized index outgrew its slot, relocating"
            );
            self.remove(&own);
            return self.write_to_new_section(file);
        }

        if self.size > own.length {
            let new_length = self.size;
            let grown = self.resize_in_place(&mut own, new_length);
            debug_assert!(grown, "unblocked self-entry must grow in place");
        }
        codec::seek_to(file, own.start)?;
        self.write_here(file)
    }

    /// Allocates a fresh chunk for the catalog and serializes into it.
    ///
    /// The reservation is the serialized size including the new self-entry
    /// record, inflated by 50% so a run of inserts does not relocate the
    /// catalog every time.
    fn write_to_new_section<F: Write + Seek>(&mut self, file: &mut F) -> Result<()> {
        let mut own = Entry::new(INDEX_ENTRY_NAME, 0, 0);
        let mut reserved = self.size + own.header_size();
        reserved += reserved >> 1;
        own.length = reserved;
        own.start = self.find_gap(reserved);
        self.insert(own.clone());
        codec::seek_to(file, own.start)?;
        self.write_here(file)
    }

    /// Serializes the catalog at the current position, then publishes that
    /// position through the index pointer at [`INDEX_PTR_POS`].
    fn write_here<F: Write + Seek>(&self, file: &mut F) -> Result<()> {
        let start = file.stream_position().map_err(CodecError::from)?;
        codec::write_u64(file, self.by_name.len() as u64)?;
        for e in self.by_name.values() {
            codec::write_u64(file, e.start)?;
            codec::write_u64(file, e.length)?;
            codec::write_string(file, &e.name)?;
        }
        codec::seek_to(file, INDEX_PTR_POS)?;
        codec::write_u64(file, start)?;
        Ok(())
    }

    /// Deserializes a catalog from the current position, validating what
    /// the writer guarantees: strictly increasing names, no
    /// overlaps, no zero-length or header-dwelling ranges, and a self-entry
    /// large enough to have held these bytes.
    pub fn read<R: Read + Seek>(file: &mut R) -> Result<Self> {
        let mut index = Index::new();
        let count = codec::read_u64(file)?;

        let mut prev: Option<String> = None;
        for _ in 0..count {
            let start = codec::read_u64(file)?;
            let length = codec::read_u64(file)?;
            let name = codec::read_string(file)?;

            if index.contains(&name) {
                return Err(IndexError::DuplicateName { name });
            }
            if let Some(p) = prev {
                if p.as_bytes() > name.as_bytes() {
                    return Err(IndexError::OutOfOrder {
                        prev: p,
                        next: name,
                    });
                }
            }
            if start < DATA_START {
                return Err(IndexError::StartInHeader { name, start });
            }
            if length == 0 {
                return Err(IndexError::ZeroLength { name });
            }

            index.insert(Entry::new(name.clone(), start, length));
            prev = Some(name);
        }

        let mut left: Option<&Entry> = None;
        for e in index.by_start.values() {
            if let Some(l) = left {
                if l.end() > e.start {
                    return Err(IndexError::Overlap {
                        a: l.name.clone(),
                        b: e.name.clone(),
                    });
                }
            }
            left = Some(e);
        }

        if count > 0 {
            match index.by_name.get(INDEX_ENTRY_NAME) {
                None => return Err(IndexError::MissingSelfEntry { count }),
                Some(own) if own.length < index.size => {
                    return Err(IndexError::SelfEntryTooSmall {
                        length: own.length,
                        size: index.size,
                    });
                }
                Some(_) => {}
            }
        }

        Ok(index)
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}
