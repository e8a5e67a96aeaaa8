use time::OffsetDateTime;

/// File-mode bits, including the directory flag. Mirrors Go's `os.FileMode`:
/// the top bit marks a directory, the low bits are POSIX permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mode(pub u32);

impl Mode {
    pub const DIR: u32 = 1 << 31;

    pub fn dir(perm: u32) -> Mode {
        Mode((perm & 0o7777) | Self::DIR)
    }

    pub fn file(perm: u32) -> Mode {
        Mode(perm & 0o7777)
    }

    pub fn is_dir(self) -> bool {
        self.0 & Self::DIR != 0
    }

    pub fn perm(self) -> u32 {
        self.0 & 0o7777
    }
}

impl From<u32> for Mode {
    fn from(raw: u32) -> Self {
        Mode(raw)
    }
}

impl From<i64> for Mode {
    fn from(raw: i64) -> Self {
        Mode(raw as u32)
    }
}

/// One logical filesystem node: a row in the relational backend, a tree node
/// in the in-memory backend, a directory entry in the local-filesystem
/// backend.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Absolute canonical path. Directories end in `/`; the root is `/`.
    pub name: String,
    /// Raw byte payload. Empty for directories.
    pub content: Vec<u8>,
    pub mode: Mode,
    pub mod_time: OffsetDateTime,
}

impl Entry {
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }
}

/// Metadata about an entry, returned by `stat()` without the content payload
/// (the relational backend can compute this from `length(content)/2` without
/// ever transferring the blob).
#[derive(Debug, Clone)]
pub struct Metadata {
    /// Basename (last path component); the root reports as `/`.
    pub name: String,
    pub size: u64,
    pub mode: Mode,
    pub mod_time: OffsetDateTime,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }
}
