//! Backend rooted at a real host directory. Unlike the relational and
//! in-memory backends (flat key-value stores presenting a hierarchy),
//! this one delegates directly to `tokio::fs` and lets the OS's own
//! directory tree be the hierarchy — entries are synthesized from real
//! `std::fs::Metadata`, not reconstructed from a stored row.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use davfs_core::{path, Entry, FsError, FsResult, Metadata, Mode, OpenFlags};
use davfs_driver_api::{Driver, FileHandle, Filesystem};

use crate::util::check_cancelled;

fn to_host_path(root: &Path, name: &str) -> PathBuf {
    let trimmed = name.trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        root.to_path_buf()
    } else {
        root.join(trimmed)
    }
}

fn mode_from_metadata(meta: &std::fs::Metadata) -> Mode {
    use std::os::unix::fs::PermissionsExt;
    let perm = meta.permissions().mode() & 0o7777;
    if meta.is_dir() {
        Mode::dir(perm)
    } else {
        Mode::file(perm)
    }
}

fn mod_time_from_metadata(meta: &std::fs::Metadata) -> OffsetDateTime {
    meta.modified()
        .map(OffsetDateTime::from)
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Driver for the `file` name. `source` is a host directory path.
#[derive(Default)]
pub struct LocalFsDriver;

#[async_trait]
impl Driver for LocalFsDriver {
    async fn mount(&self, source: &str) -> FsResult<Arc<dyn Filesystem>> {
        let root = PathBuf::from(source);
        debug!(target: "davfs::localfs", root = %root.display(), "mounting local filesystem backend");
        let meta = fs::metadata(&root).await.map_err(FsError::from)?;
        if !meta.is_dir() {
            return Err(FsError::InvalidArgument);
        }
        Ok(Arc::new(LocalFs {
            root,
            mu: Arc::new(Mutex::new(())),
        }))
    }

    async fn create(&self, source: &str) -> FsResult<()> {
        debug!(target: "davfs::localfs", root = %source, "initializing local filesystem root");
        fs::create_dir_all(source).await.map_err(FsError::from)?;
        Ok(())
    }
}

struct LocalFs {
    root: PathBuf,
    mu: Arc<Mutex<()>>,
}

#[async_trait]
impl Filesystem for LocalFs {
    async fn mkdir(&self, ctx: &CancellationToken, name: &str, perm: u32) -> FsResult<()> {
        check_cancelled(ctx)?;
        let name = path::normalize(name)?;
        let host = to_host_path(&self.root, &name);
        debug!(target: "davfs::localfs", %name, "mkdir");

        let _guard = self.mu.lock().await;
        let (parent, _) = path::split(&name);
        let parent_host = to_host_path(&self.root, parent);
        match fs::metadata(&parent_host).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(FsError::InvalidArgument),
        }

        fs::create_dir(&host).await.map_err(|e| {
            let e = FsError::from(e);
            warn!(target: "davfs::localfs", error = %e, "mkdir failed");
            e
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&host, std::fs::Permissions::from_mode(perm & 0o7777))
                .await;
        }
        Ok(())
    }

    async fn open_file(
        &self,
        ctx: &CancellationToken,
        name: &str,
        flags: OpenFlags,
        perm: u32,
    ) -> FsResult<Box<dyn FileHandle>> {
        check_cancelled(ctx)?;
        let name = path::normalize(name)?;
        if name.ends_with('/') && flags.wants_create() {
            return Err(FsError::InvalidArgument);
        }
        let host = to_host_path(&self.root, &name);
        debug!(target: "davfs::localfs", %name, ?flags, "open_file");

        let _guard = self.mu.lock().await;

        if flags.wants_create() {
            let (parent, _) = path::split(&name);
            let parent_host = to_host_path(&self.root, parent);
            match fs::metadata(&parent_host).await {
                Ok(meta) if meta.is_dir() => {}
                _ => return Err(FsError::InvalidArgument),
            }
            let mut options = fs::OpenOptions::new();
            options.write(true).create(true);
            if flags.wants_excl() {
                options.create_new(true);
            } else {
                options.truncate(true);
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(perm & 0o7777);
            }
            let file = options.open(&host).await.map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
                _ => FsError::from(e),
            })?;
            return Ok(Box::new(LocalFile {
                file: Some(file),
                dir_host: None,
                name,
                dir_cursor: None,
            }));
        }

        let meta = fs::metadata(&host).await.map_err(FsError::from)?;
        if meta.is_dir() {
            let mut dir_name = name;
            if !dir_name.ends_with('/') {
                dir_name.push('/');
            }
            return Ok(Box::new(LocalFile {
                file: None,
                dir_host: Some(host),
                name: dir_name,
                dir_cursor: None,
            }));
        }
        let file = fs::OpenOptions::new()
            .read(true)
            .write(flags.contains(OpenFlags::WRITE))
            .open(&host)
            .await
            .map_err(FsError::from)?;
        Ok(Box::new(LocalFile {
            file: Some(file),
            dir_host: None,
            name,
            dir_cursor: None,
        }))
    }

    async fn remove_all(&self, ctx: &CancellationToken, name: &str) -> FsResult<()> {
        check_cancelled(ctx)?;
        let name = path::normalize(name)?;
        let host = to_host_path(&self.root, &name);
        debug!(target: "davfs::localfs", %name, "remove_all");

        let _guard = self.mu.lock().await;
        let meta = fs::metadata(&host).await.map_err(FsError::from)?;
        if meta.is_dir() {
            fs::remove_dir_all(&host).await.map_err(FsError::from)?;
        } else {
            fs::remove_file(&host).await.map_err(FsError::from)?;
        }
        Ok(())
    }

    async fn rename(&self, ctx: &CancellationToken, old: &str, new: &str) -> FsResult<()> {
        check_cancelled(ctx)?;
        let old = path::normalize(old)?;
        let new = path::normalize(new)?;
        let old_host = to_host_path(&self.root, &old);
        let new_host = to_host_path(&self.root, &new);
        debug!(target: "davfs::localfs", %old, %new, "rename");

        let _guard = self.mu.lock().await;
        fs::metadata(&old_host).await.map_err(|_| FsError::NotExists)?;
        if fs::metadata(&new_host).await.is_ok() {
            return Err(FsError::AlreadyExists);
        }
        fs::rename(&old_host, &new_host).await.map_err(FsError::from)?;
        Ok(())
    }

    async fn stat(&self, ctx: &CancellationToken, name: &str) -> FsResult<Metadata> {
        check_cancelled(ctx)?;
        let name = path::normalize(name)?;
        let host = to_host_path(&self.root, &name);
        let _guard = self.mu.lock().await;
        let meta = fs::metadata(&host).await.map_err(FsError::from)?;
        Ok(Metadata {
            name: path::basename(&name).to_string(),
            size: meta.len(),
            mode: mode_from_metadata(&meta),
            mod_time: mod_time_from_metadata(&meta),
        })
    }

    async fn close(&self) -> FsResult<()> {
        Ok(())
    }
}

struct LocalFile {
    file: Option<fs::File>,
    dir_host: Option<PathBuf>,
    /// Canonical dav path this handle was opened on, trailing `/` included
    /// for directories. Kept so `stat`/`read_dir` report dav-style names
    /// rather than host filesystem paths.
    name: String,
    dir_cursor: Option<(Vec<Entry>, usize)>,
}

#[async_trait]
impl FileHandle for LocalFile {
    async fn read(&mut self, ctx: &CancellationToken, buf: &mut [u8]) -> FsResult<usize> {
        check_cancelled(ctx)?;
        let file = self.file.as_mut().ok_or(FsError::InvalidOperation)?;
        let n = file.read(buf).await.map_err(FsError::from)?;
        Ok(n)
    }

    async fn write(&mut self, ctx: &CancellationToken, buf: &[u8]) -> FsResult<usize> {
        check_cancelled(ctx)?;
        let file = self.file.as_mut().ok_or(FsError::InvalidOperation)?;
        file.write_all(buf).await.map_err(FsError::from)?;
        Ok(buf.len())
    }

    async fn seek(&mut self, ctx: &CancellationToken, pos: SeekFrom) -> FsResult<u64> {
        check_cancelled(ctx)?;
        let file = self.file.as_mut().ok_or(FsError::InvalidOperation)?;
        let off = file.seek(pos).await.map_err(FsError::from)?;
        Ok(off)
    }

    async fn stat(&self, ctx: &CancellationToken) -> FsResult<Metadata> {
        check_cancelled(ctx)?;
        let meta = if let Some(file) = &self.file {
            file.metadata().await.map_err(FsError::from)?
        } else if let Some(dir) = &self.dir_host {
            fs::metadata(dir).await.map_err(FsError::from)?
        } else {
            return Err(FsError::InvalidOperation);
        };
        let name = path::basename(&self.name).to_string();
        Ok(Metadata {
            name,
            size: meta.len(),
            mode: mode_from_metadata(&meta),
            mod_time: mod_time_from_metadata(&meta),
        })
    }

    async fn read_dir(&mut self, ctx: &CancellationToken, count: i64) -> FsResult<Vec<Entry>> {
        check_cancelled(ctx)?;
        let dir_host = self.dir_host.as_ref().ok_or(FsError::InvalidOperation)?;

        if self.dir_cursor.is_none() {
            let mut children = Vec::new();
            let mut read_dir = fs::read_dir(dir_host).await.map_err(FsError::from)?;
            while let Some(dirent) = read_dir.next_entry().await.map_err(FsError::from)? {
                let meta = dirent.metadata().await.map_err(FsError::from)?;
                let file_name = dirent.file_name().to_string_lossy().into_owned();
                let mut child_name = format!("{}{}", self.name, file_name);
                if meta.is_dir() {
                    child_name.push('/');
                }
                children.push(Entry {
                    name: child_name,
                    content: Vec::new(),
                    mode: mode_from_metadata(&meta),
                    mod_time: mod_time_from_metadata(&meta),
                });
            }
            children.sort_by(|a, b| a.name.cmp(&b.name));
            self.dir_cursor = Some((children, 0));
        }

        let (children, cursor) = self.dir_cursor.as_mut().unwrap();
        if *cursor >= children.len() {
            return Ok(Vec::new());
        }
        let end = if count > 0 {
            (*cursor + count as usize).min(children.len())
        } else {
            children.len()
        };
        let slice = children[*cursor..end].to_vec();
        *cursor = end;
        Ok(slice)
    }

    async fn close(&mut self) -> FsResult<()> {
        self.file = None;
        self.dir_host = None;
        self.dir_cursor = None;
        Ok(())
    }
}
