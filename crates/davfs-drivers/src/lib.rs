//! Concrete [`davfs_driver_api::Driver`] implementations: an in-memory tree,
//! a host-filesystem passthrough, and a flat relational table shared across
//! postgres/mysql/sqlite3 via `sqlx::Any`.

mod util;

pub mod localfs;
pub mod memory;
pub mod sql;

pub use localfs::LocalFsDriver;
pub use memory::MemoryDriver;
pub use sql::SqlDriver;
