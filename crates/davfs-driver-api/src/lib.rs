//! The three small capability sets a WebDAV handler (or anything else that
//! wants a hierarchical filesystem view) builds against: a [`Driver`] that
//! attaches to or initializes a backing store, a [`Filesystem`] that exposes
//! the POSIX-like tree operations, and a [`FileHandle`] for the transient
//! per-open-file state. Only trait definitions live here — see
//! `davfs-drivers` for the `memory`/`localfs`/relational implementations.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use davfs_core::{Entry, FsResult, Metadata, Mode, OpenFlags};

/// Capability set a storage backend provides to the Filesystem Facade.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Attach to an existing store.
    async fn mount(&self, source: &str) -> FsResult<Arc<dyn Filesystem>>;

    /// Initialize a fresh store (create table/directory, insert root entry).
    /// Idempotent: re-running on an initialized store must succeed without
    /// data loss.
    async fn create(&self, source: &str) -> FsResult<()>;
}

/// Capability set consumed by the WebDAV handler. Every operation takes a
/// [`CancellationToken`] and must check it before/after its single backend
/// round trip, surfacing [`davfs_core::FsError::Cancelled`] if it fires
/// mid-operation.
#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn mkdir(&self, ctx: &CancellationToken, name: &str, perm: u32) -> FsResult<()>;

    async fn open_file(
        &self,
        ctx: &CancellationToken,
        name: &str,
        flags: OpenFlags,
        perm: u32,
    ) -> FsResult<Box<dyn FileHandle>>;

    async fn remove_all(&self, ctx: &CancellationToken, name: &str) -> FsResult<()>;

    async fn rename(&self, ctx: &CancellationToken, old: &str, new: &str) -> FsResult<()>;

    async fn stat(&self, ctx: &CancellationToken, name: &str) -> FsResult<Metadata>;

    /// Release the connection pool / backing resources. Idempotent.
    async fn close(&self) -> FsResult<()>;
}

/// Transient per-open-file state: read/write/seek on file handles,
/// pagination on directory handles.
#[async_trait]
pub trait FileHandle: Send + Sync {
    /// Read up to `buf.len()` bytes at the handle's offset, advancing it by
    /// the amount read. Returns `0` at end-of-stream — not an error, mirrors
    /// `std::io::Read`'s own EOF convention. Fails with `InvalidOperation` on
    /// a directory handle or a handle whose entry has been deleted.
    async fn read(&mut self, ctx: &CancellationToken, buf: &mut [u8]) -> FsResult<usize>;

    /// Write all of `buf` at the handle's offset, overwriting/extending as
    /// needed, and advance the offset by `buf.len()`.
    async fn write(&mut self, ctx: &CancellationToken, buf: &[u8]) -> FsResult<usize>;

    async fn seek(&mut self, ctx: &CancellationToken, pos: SeekFrom) -> FsResult<u64>;

    async fn stat(&self, ctx: &CancellationToken) -> FsResult<Metadata>;

    /// Directory handles only: return up to `count` immediate children (all
    /// remaining if `count <= 0`). The full child list is snapshotted lazily
    /// on the first call and paginated on subsequent ones. Returns an empty
    /// `Vec` at end-of-stream (not an error).
    async fn read_dir(&mut self, ctx: &CancellationToken, count: i64) -> FsResult<Vec<Entry>>;

    /// Release handle-local state. Idempotent. Does not affect the stored
    /// entry. After `close`, every other method returns `InvalidOperation`.
    async fn close(&mut self) -> FsResult<()>;
}

/// Convenience re-export so downstream crates only need one `mode` helper
/// import alongside the traits above.
pub fn dir_mode(perm: u32) -> Mode {
    Mode::dir(perm)
}
