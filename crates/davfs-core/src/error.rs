use std::fmt;

/// Error taxonomy surfaced by the storage layer, matching the status codes a
/// WebDAV handler translates these into (invalid-argument -> 400,
/// not-exists -> 404, already-exists -> 405/412, ...).
#[derive(Debug)]
pub enum FsError {
    /// No driver registered under the requested name.
    DriverNotFound,
    /// Malformed path, or a file path that ends in `/`.
    InvalidArgument,
    /// Target entry does not exist.
    NotExists,
    /// Target entry exists where absence was required.
    AlreadyExists,
    /// Directory op on a file handle, file op on a directory handle, or any
    /// op on a handle whose entry has since been deleted or closed.
    InvalidOperation,
    /// Opaque failure from the backend (SQL error, I/O error, ...).
    Backend(anyhow::Error),
    /// The caller's cancellation context was cancelled mid-operation.
    Cancelled,
}

pub type FsResult<T> = std::result::Result<T, FsError>;

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::DriverNotFound => write!(f, "driver not found"),
            FsError::InvalidArgument => write!(f, "invalid argument"),
            FsError::NotExists => write!(f, "no such file or directory"),
            FsError::AlreadyExists => write!(f, "file or directory already exists"),
            FsError::InvalidOperation => write!(f, "invalid operation for this entry"),
            FsError::Backend(e) => write!(f, "backend error: {e}"),
            FsError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Backend(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for FsError {
    fn from(e: anyhow::Error) -> Self {
        FsError::Backend(e)
    }
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => FsError::NotExists,
            std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
            _ => FsError::Backend(e.into()),
        }
    }
}
