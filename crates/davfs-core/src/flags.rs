use bitflags::bitflags;

bitflags! {
    /// Open flags recognized by `Filesystem::open_file`. Read/write direction
    /// bits are observed but not separately enforced by this layer — the
    /// WebDAV handler gates byte-direction before it ever calls in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ      = 0b0000_0001;
        const WRITE     = 0b0000_0010;
        /// Create the entry if it doesn't exist.
        const CREATE    = 0b0000_0100;
        /// Fail if the entry already exists. Only meaningful with `CREATE`.
        const EXCL      = 0b0000_1000;
        /// Discard prior content on open.
        const TRUNCATE  = 0b0001_0000;
    }
}

impl OpenFlags {
    pub fn wants_create(self) -> bool {
        self.contains(OpenFlags::CREATE)
    }

    pub fn wants_excl(self) -> bool {
        self.contains(OpenFlags::EXCL)
    }
}
