//! The two entry points (`create_fs`, `new_fs`) an embedder calls to
//! provision or attach to a backing store, plus a pre-populated
//! [`Registry`] wiring up every backend this workspace ships.
//!
//! The registry is an explicit value rather than process-wide state —
//! callers that want the five built-in drivers reach for
//! [`builtin_registry`]; callers assembling a custom set build their own
//! [`Registry`] and `register` only what they need.

use std::sync::Arc;

pub use davfs_core::{DriverKind, Entry, FsError, FsResult, Metadata, Mode, OpenFlags};
pub use davfs_driver_api::{Driver, FileHandle, Filesystem};
pub use davfs_driver_registry::Registry;
pub use davfs_drivers::{LocalFsDriver, MemoryDriver, SqlDriver};

/// A registry with `memory`, `file`, `postgres`, `mysql` and `sqlite3`
/// pre-registered against this workspace's own backend implementations.
/// `postgres`/`mysql`/`sqlite3` all share one [`SqlDriver`] instance — the
/// dialect is determined by `source`'s URL scheme via `sqlx::Any`, not by
/// which name the caller looked it up under.
pub fn builtin_registry() -> Registry {
    let registry = Registry::new();
    registry.register(DriverKind::Memory.as_str(), Arc::new(MemoryDriver));
    registry.register(DriverKind::File.as_str(), Arc::new(LocalFsDriver));
    let sql_driver: Arc<dyn Driver> = Arc::new(SqlDriver);
    registry.register(DriverKind::Postgres.as_str(), sql_driver.clone());
    registry.register(DriverKind::Mysql.as_str(), sql_driver.clone());
    registry.register(DriverKind::Sqlite3.as_str(), sql_driver);
    registry
}

/// Initialize a fresh backing store for `driver`/`source` (create the
/// relational table and seed row, `mkdir -p` the local directory, or a
/// no-op for `memory`). Idempotent.
pub async fn create_fs(registry: &Registry, driver: &str, source: &str) -> FsResult<()> {
    let driver = registry.lookup(driver).ok_or(FsError::DriverNotFound)?;
    driver.create(source).await
}

/// Attach to an existing backing store and return the live [`Filesystem`]
/// handle.
pub async fn new_fs(
    registry: &Registry,
    driver: &str,
    source: &str,
) -> FsResult<Arc<dyn Filesystem>> {
    let driver = registry.lookup(driver).ok_or(FsError::DriverNotFound)?;
    driver.mount(source).await
}
