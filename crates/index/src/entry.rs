/// Descriptor for one chunk inside a Multifile: a name and the byte range
/// `[start, start + length)` it owns.
///
/// An `Entry` is a pure value. The catalog stores copies in both of its
/// orderings, and callers pass detached copies back into mutating calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Unique, non-empty chunk name. Names starting with `$$` are reserved.
    pub name: String,
    /// First byte of the owned range; never below the data region start.
    pub start: u64,
    /// Byte length of the owned range. Stored entries always have
    /// `length > 0`; a zero length only appears in lookup-miss sentinels.
    pub length: u64,
}

impl Entry {
    pub fn new(name: impl Into<String>, start: u64, length: u64) -> Self {
        Self {
            name: name.into(),
            start,
            length,
        }
    }

    /// One past the last byte of the owned range.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// Serialized size of this entry's catalog record:
    /// start (8) + length (8) + name_len (8) + name bytes.
    pub fn header_size(&self) -> u64 {
        self.name.len() as u64 + 3 * 8
    }

    /// Distinguishes a found entry from a zero-length lookup sentinel.
    pub fn exists(&self) -> bool {
        self.length > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_is_start_plus_length() {
        let e = Entry::new("doc-table", 12, 100);
        assert_eq!(e.end(), 112);
    }

    #[test]
    fn header_size_matches_record_layout() {
        // 3 fixed u64 fields plus the name bytes.
        let e = Entry::new("ab", 0, 1);
        assert_eq!(e.header_size(), 2 + 24);
    }

    #[test]
    fn zero_length_sentinel_does_not_exist() {
        assert!(!Entry::new("probe", 0, 0).exists());
        assert!(Entry::new("probe", 0, 1).exists());
    }
}
