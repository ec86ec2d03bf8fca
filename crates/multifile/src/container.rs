use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use index::{Entry, Index, INDEX_ENTRY_NAME, RESERVED_PREFIX, RESIZE_TMP_NAME};
use memmap2::MmapOptions;
use tracing::{debug, warn};

use crate::format::{self, MULTIFILE_MAGIC};
use crate::MultifileError;

type Result<T> = std::result::Result<T, MultifileError>;

/// Buffer size for the relocation copy and zero-fill loops.
const COPY_CHUNK: usize = 8 * 1024;

/// A single-file container of named, growable byte chunks.
///
/// One `Multifile` owns its backing file descriptor and in-memory catalog
/// exclusively: it must not be shared across threads, and two instances
/// over the same path are undefined behaviour (no advisory locking).
///
/// Catalog mutations (create / grow / relocate) are applied in memory
/// first and serialized to disk before the mutating call returns, so a
/// reopen after any successful call finds every previously written chunk.
/// A crash mid-mutation may leave the index pointer referring to a stale
/// catalog; stale bytes in gaps are harmless because no entry references
/// them.
pub struct Multifile {
    /// `None` once closed; every file-touching operation checks this.
    file: Option<File>,
    index: Index,
    path: PathBuf,
}

impl Multifile {
    /// Opens the container at `path`, creating it first when `create` is
    /// set.
    ///
    /// # Validation
    ///
    /// - The first 4 bytes must be the magic `"Sof+"`.
    /// - The index pointer at offset 4 must lead to a well-formed
    ///   serialized catalog (see [`Index::read`]).
    /// - The pointer must agree with the catalog's own self-entry.
    ///
    /// # Errors
    ///
    /// [`MultifileError::NotFound`] when the file is missing and `create`
    /// is false; [`MultifileError::BadMagic`] for a foreign file;
    /// [`MultifileError::Corrupted`] / [`MultifileError::StalePointer`]
    /// for a damaged catalog.
    pub fn open<P: AsRef<Path>>(path: P, create: bool) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            if !create {
                return Err(MultifileError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            let mut fresh = OpenOptions::new()
                .create_new(true)
                .read(true)
                .write(true)
                .open(path)?;
            format::write_header(&mut fresh)?;
            fresh.flush()?;
            fresh.sync_all()?;
        }

        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let (magic, pointer) = format::read_header(&mut file)?;
        if magic != MULTIFILE_MAGIC {
            return Err(MultifileError::BadMagic { found: magic });
        }
        codec::seek_to(&mut file, pointer)?;
        let catalog = Index::read(&mut file)?;
        if let Some(own) = catalog.lookup(INDEX_ENTRY_NAME) {
            if own.start != pointer {
                return Err(MultifileError::StalePointer {
                    pointer,
                    start: own.start,
                });
            }
        }
        debug!(path = %path.display(), chunks = catalog.len(), "opened multifile");
        Ok(Self {
            file: Some(file),
            index: catalog,
            path: path.to_path_buf(),
        })
    }

    /// Reads a whole chunk. `None` for names the container has never seen.
    pub fn read(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let file = self.file.as_mut().ok_or(MultifileError::Closed)?;
        let Some(entry) = self.index.lookup(name) else {
            return Ok(None);
        };
        codec::seek_to(file, entry.start)?;
        Ok(Some(codec::read_bytes(file, entry.length as usize)?))
    }

    /// Reads up to `count` bytes of a chunk starting at `offset`.
    ///
    /// The returned buffer holds exactly `min(count, length - offset)`
    /// bytes. An offset at or past the chunk's end — or a name the
    /// container has never seen — yields an empty buffer.
    pub fn read_at(&mut self, name: &str, offset: u64, count: u64) -> Result<Vec<u8>> {
        let file = self.file.as_mut().ok_or(MultifileError::Closed)?;
        let Some(entry) = self.index.lookup(name) else {
            return Ok(Vec::new());
        };
        if offset >= entry.length {
            return Ok(Vec::new());
        }
        let wanted = count.min(entry.length - offset);
        codec::seek_to(file, entry.start + offset)?;
        Ok(codec::read_bytes(file, wanted as usize)?)
    }

    /// Writes `bytes` into `name` at `offset`, creating or growing the
    /// chunk first so the write always lands inside its range, then
    /// flushes. If the write leapfrogs the chunk's old end, the skipped
    /// span has undefined contents until something writes it.
    pub fn write(&mut self, name: &str, offset: u64, bytes: &[u8]) -> Result<()> {
        if self.file.is_none() {
            return Err(MultifileError::Closed);
        }
        if bytes.is_empty() && offset == 0 && !self.index.contains(name) {
            // Never materialize a zero-length chunk.
            return Ok(());
        }
        let entry = self.get_or_grow(name, offset + bytes.len() as u64)?;
        let file = self.file.as_mut().ok_or(MultifileError::Closed)?;
        codec::seek_to(file, entry.start + offset)?;
        codec::write_bytes(file, bytes)?;
        file.flush()?;
        Ok(())
    }

    /// Appends `bytes` at the chunk's current end (a new name starts at
    /// length zero).
    pub fn append(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let end = self.index.lookup(name).map_or(0, |e| e.length);
        self.write(name, end, bytes)
    }

    /// Grows `name` to at least `min_length`, memory-maps its whole range
    /// shared read/write, and hands the mutable slice to `f`.
    ///
    /// The mapping is dropped on every exit path, normal or error. Nothing
    /// is flushed after the closure; dirty pages are the OS's to write
    /// back unless [`flush`](Multifile::flush) is called. A `min_length`
    /// of zero on an unknown name is clamped to one byte so there is
    /// always a mappable range.
    pub fn manipulate<T, F>(&mut self, name: &str, min_length: u64, f: F) -> Result<T>
    where
        F: FnOnce(&mut [u8]) -> io::Result<T>,
    {
        let entry = self.get_or_grow(name, min_length.max(1))?;
        let file = self.file.as_mut().ok_or(MultifileError::Closed)?;
        // Safety: this container holds the only live handle to the backing
        // file, and the mapping never outlives this call.
        let mut map = unsafe {
            MmapOptions::new()
                .offset(entry.start)
                .len(entry.length as usize)
                .map_mut(&*file)?
        };
        Ok(f(&mut map)?)
    }

    /// Client-visible chunk names in ascending order; engine-reserved
    /// `$$…` names are filtered out. Catalog-only, no I/O.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index
            .names()
            .filter(|n| !n.starts_with(RESERVED_PREFIX))
    }

    /// Number of client-visible chunks.
    pub fn len(&self) -> usize {
        self.names().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        !name.starts_with(RESERVED_PREFIX) && self.index.contains(name)
    }

    /// Current byte length of a client-visible chunk.
    pub fn length_of(&self, name: &str) -> Option<u64> {
        if name.starts_with(RESERVED_PREFIX) {
            return None;
        }
        self.index.lookup(name).map(|e| e.length)
    }

    /// Serializes the catalog and syncs the backing file.
    pub fn flush(&mut self) -> Result<()> {
        let file = self.file.as_mut().ok_or(MultifileError::Closed)?;
        self.index.write_to_disk(file)?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    /// Flushes, then releases the file handle. Every later operation
    /// fails with [`MultifileError::Closed`]; construct a new `Multifile`
    /// to reopen the file.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.file = None;
        Ok(())
    }

    /// Returns the entry for `name`, creating or growing the chunk so its
    /// length is at least `min_length`. Any catalog mutation is serialized
    /// to disk before this returns.
    fn get_or_grow(&mut self, name: &str, min_length: u64) -> Result<Entry> {
        if self.file.is_none() {
            return Err(MultifileError::Closed);
        }
        match self.index.lookup(name) {
            None => {
                let entry = self.index.create(name, min_length);
                let file = self.file.as_mut().ok_or(MultifileError::Closed)?;
                ensure_file_len(file, entry.end())?;
                self.index.write_to_disk(file)?;
                Ok(entry)
            }
            Some(entry) if entry.length >= min_length => Ok(entry),
            Some(mut entry) => {
                if self.index.resize_in_place(&mut entry, min_length) {
                    let file = self.file.as_mut().ok_or(MultifileError::Closed)?;
                    ensure_file_len(file, entry.end())?;
                    self.index.write_to_disk(file)?;
                    Ok(entry)
                } else {
                    self.relocate(entry, min_length)
                }
            }
        }
    }

    /// Moves a chunk that cannot grow in place: a temporary chunk of the
    /// new length is allocated, the old bytes are copied across, the grown
    /// tail is zero-filled, and the temporary takes over the old name.
    fn relocate(&mut self, old: Entry, min_length: u64) -> Result<Entry> {
        debug!(
            name = %old.name,
            old_start = old.start,
            old_length = old.length,
            new_length = min_length,
            "relocating chunk"
        );
        let mut moved = self.index.create(RESIZE_TMP_NAME, min_length);
        let file = self.file.as_mut().ok_or(MultifileError::Closed)?;
        ensure_file_len(file, moved.end())?;

        let mut copied = 0u64;
        while copied < old.length {
            let step = (old.length - copied).min(COPY_CHUNK as u64) as usize;
            codec::seek_to(file, old.start + copied)?;
            let buf = codec::read_bytes(file, step)?;
            codec::seek_to(file, moved.start + copied)?;
            codec::write_bytes(file, &buf)?;
            copied += step as u64;
        }

        let zeroes = [0u8; COPY_CHUNK];
        let mut filled = old.length;
        codec::seek_to(file, moved.start + filled)?;
        while filled < min_length {
            let step = (min_length - filled).min(COPY_CHUNK as u64) as usize;
            codec::write_bytes(file, &zeroes[..step])?;
            filled += step as u64;
        }
        file.flush()?;

        self.index.remove(&old);
        self.index.rename(&mut moved, &old.name);
        let file = self.file.as_mut().ok_or(MultifileError::Closed)?;
        self.index.write_to_disk(file)?;
        Ok(moved)
    }
}

fn ensure_file_len(file: &mut File, wanted: u64) -> Result<()> {
    let len = file.metadata()?.len();
    if len < wanted {
        file.set_len(wanted)
            .map_err(|source| MultifileError::OutOfSpace { wanted, source })?;
    }
    Ok(())
}

impl Drop for Multifile {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(error) = self.close() {
                warn!(path = %self.path.display(), %error, "flush on drop failed");
            }
        }
    }
}
