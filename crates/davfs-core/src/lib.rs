pub mod entry;
pub mod error;
pub mod flags;
pub mod path;

pub use entry::{Entry, Metadata, Mode};
pub use error::{FsError, FsResult};
pub use flags::OpenFlags;

use std::fmt;
use std::str::FromStr;

/// Typed convenience over the driver-name strings the registry actually
/// keys on. The external contract only ever speaks of bare driver-name
/// strings; this exists purely so an embedder with its own typed
/// configuration doesn't have to hand-roll the five string constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Memory,
    File,
    Postgres,
    Mysql,
    Sqlite3,
}

impl DriverKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DriverKind::Memory => "memory",
            DriverKind::File => "file",
            DriverKind::Postgres => "postgres",
            DriverKind::Mysql => "mysql",
            DriverKind::Sqlite3 => "sqlite3",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(DriverKind::Memory),
            "file" => Ok(DriverKind::File),
            "postgres" => Ok(DriverKind::Postgres),
            "mysql" => Ok(DriverKind::Mysql),
            "sqlite3" => Ok(DriverKind::Sqlite3),
            _ => Err(FsError::DriverNotFound),
        }
    }
}
