//! Pure in-memory backend. No `source` string carries any real meaning
//! beyond a key the caller chooses; `mount` on a name that has never been
//! `create`d gets a fresh empty tree with just the root entry, since there is
//! nothing persistent to attach to.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use davfs_core::{path, Entry, FsError, FsResult, Metadata, Mode, OpenFlags};
use davfs_driver_api::{Driver, FileHandle, Filesystem};

use crate::util::check_cancelled;

fn root_entry() -> Entry {
    Entry {
        name: "/".to_string(),
        content: Vec::new(),
        mode: Mode::dir(0o755),
        mod_time: OffsetDateTime::now_utc(),
    }
}

/// Driver for the `memory` name. Every `mount`/`create` call gets its own
/// independent tree — there is no shared process-wide store to attach to,
/// unlike the relational backend's `source` connection string.
#[derive(Default)]
pub struct MemoryDriver;

#[async_trait]
impl Driver for MemoryDriver {
    async fn mount(&self, source: &str) -> FsResult<Arc<dyn Filesystem>> {
        debug!(target: "davfs::memory", %source, "mounting in-memory backend");
        let mut entries = HashMap::new();
        entries.insert("/".to_string(), root_entry());
        Ok(Arc::new(MemoryFs {
            entries: Arc::new(Mutex::new(entries)),
        }))
    }

    async fn create(&self, _source: &str) -> FsResult<()> {
        // Nothing to persist; a subsequent `mount` always starts fresh.
        Ok(())
    }
}

struct MemoryFs {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

#[async_trait]
impl Filesystem for MemoryFs {
    async fn mkdir(&self, ctx: &CancellationToken, name: &str, perm: u32) -> FsResult<()> {
        check_cancelled(ctx)?;
        let mut name = path::normalize(name)?;
        if !name.ends_with('/') {
            name.push('/');
        }
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&name) {
            return Err(FsError::AlreadyExists);
        }
        let (parent, _) = path::split(&name);
        match entries.get(parent) {
            Some(p) if p.is_dir() => {}
            _ => return Err(FsError::InvalidArgument),
        }
        entries.insert(
            name.clone(),
            Entry {
                name,
                content: Vec::new(),
                mode: Mode::dir(perm),
                mod_time: OffsetDateTime::now_utc(),
            },
        );
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
        let mut entries = self.entries.lock().await;

        if flags.wants_create() {
            if name.ends_with('/') {
                return Err(FsError::InvalidArgument);
            }
            let (parent, _) = path::split(&name);
            match entries.get(parent) {
                Some(p) if p.is_dir() => {}
                _ => return Err(FsError::InvalidArgument),
            }
            if let Some(existing) = entries.get(&name) {
                if flags.wants_excl() {
                    return Err(FsError::AlreadyExists);
                }
                if existing.is_dir() {
                    return Err(FsError::InvalidOperation);
                }
            }
            entries.insert(
                name.clone(),
                Entry {
                    name: name.clone(),
                    content: Vec::new(),
                    mode: Mode::file(perm),
                    mod_time: OffsetDateTime::now_utc(),
                },
            );
            return Ok(Box::new(MemoryFile {
                entries: self.entries.clone(),
                name,
                off: 0,
                dir_cursor: None,
                closed: false,
            }));
        }

        let mut resolved = name;
        if !resolved.ends_with('/') {
            if let Some(e) = entries.get(&resolved) {
                if e.is_dir() {
                    resolved.push('/');
                }
            } else if entries.contains_key(&format!("{resolved}/")) {
                resolved.push('/');
            }
        }
        if !entries.contains_key(&resolved) {
            return Err(FsError::NotExists);
        }
        Ok(Box::new(MemoryFile {
            entries: self.entries.clone(),
            name: resolved,
            off: 0,
            dir_cursor: None,
            closed: false,
        }))
    }

    async fn remove_all(&self, ctx: &CancellationToken, name: &str) -> FsResult<()> {
        check_cancelled(ctx)?;
        let name = path::normalize(name)?;
        let mut entries = self.entries.lock().await;
        let target = if entries.contains_key(&name) {
            name
        } else if entries.contains_key(&format!("{name}/")) {
            format!("{name}/")
        } else {
            return Err(FsError::NotExists);
        };
        entries.retain(|k, _| k != &target && !k.starts_with(&target));
        Ok(())
    }

    async fn rename(&self, ctx: &CancellationToken, old: &str, new: &str) -> FsResult<()> {
        check_cancelled(ctx)?;
        let mut old = path::normalize(old)?;
        let mut new = path::normalize(new)?;
        let mut entries = self.entries.lock().await;

        let is_dir = if entries.contains_key(&old) {
            entries.get(&old).unwrap().is_dir()
        } else if entries.contains_key(&format!("{old}/")) {
            old.push('/');
            true
        } else {
            return Err(FsError::NotExists);
        };
        if is_dir && !new.ends_with('/') {
            new.push('/');
        }
        if entries.contains_key(&new) {
            return Err(FsError::AlreadyExists);
        }

        if is_dir {
            let affected: Vec<String> = entries
                .keys()
                .filter(|k| *k == &old || k.starts_with(&old))
                .cloned()
                .collect();
            for key in affected {
                let mut entry = entries.remove(&key).unwrap();
                let renamed = format!("{new}{}", &key[old.len()..]);
                entry.name = renamed.clone();
                entries.insert(renamed, entry);
            }
        } else {
            let mut entry = entries.remove(&old).unwrap();
            entry.name = new.clone();
            entries.insert(new, entry);
        }
        Ok(())
    }

    async fn stat(&self, ctx: &CancellationToken, name: &str) -> FsResult<Metadata> {
        check_cancelled(ctx)?;
        let name = path::normalize(name)?;
        let entries = self.entries.lock().await;
        let entry = entries
            .get(&name)
            .or_else(|| entries.get(&format!("{name}/")))
            .ok_or(FsError::NotExists)?;
        Ok(Metadata {
            name: path::basename(&entry.name).to_string(),
            size: entry.size(),
            mode: entry.mode,
            mod_time: entry.mod_time,
        })
    }

    async fn close(&self) -> FsResult<()> {
        Ok(())
    }
}

struct MemoryFile {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    name: String,
    off: u64,
    dir_cursor: Option<(Vec<Entry>, usize)>,
    closed: bool,
}

#[async_trait]
impl FileHandle for MemoryFile {
    async fn read(&mut self, ctx: &CancellationToken, buf: &mut [u8]) -> FsResult<usize> {
        check_cancelled(ctx)?;
        if self.closed {
            return Err(FsError::InvalidOperation);
        }
        let entries = self.entries.lock().await;
        let entry = entries.get(&self.name).ok_or(FsError::InvalidOperation)?;
        if entry.is_dir() {
            return Err(FsError::InvalidOperation);
        }
        let start = (self.off as usize).min(entry.content.len());
        let end = (start + buf.len()).min(entry.content.len());
        let n = end - start;
        buf[..n].copy_from_slice(&entry.content[start..end]);
        self.off += n as u64;
        Ok(n)
    }

    async fn write(&mut self, ctx: &CancellationToken, buf: &[u8]) -> FsResult<usize> {
        check_cancelled(ctx)?;
        if self.closed {
            return Err(FsError::InvalidOperation);
        }
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&self.name).ok_or(FsError::InvalidOperation)?;
        if entry.is_dir() {
            return Err(FsError::InvalidOperation);
        }
        // Matches the relational backend's `substr(content, 1, 2*offset) ||
        // hex(buf)`: everything past `offset + buf.len()` is discarded, not
        // preserved, and a write past the prior end zero-fills the gap.
        let start = self.off as usize;
        entry.content.truncate(start.min(entry.content.len()));
        entry.content.resize(start, 0);
        entry.content.extend_from_slice(buf);
        entry.mod_time = OffsetDateTime::now_utc();
        self.off += buf.len() as u64;
        Ok(buf.len())
    }

    async fn seek(&mut self, ctx: &CancellationToken, pos: SeekFrom) -> FsResult<u64> {
        check_cancelled(ctx)?;
        if self.closed {
            return Err(FsError::InvalidOperation);
        }
        self.off = match pos {
            SeekFrom::Start(o) => o,
            SeekFrom::Current(delta) => (self.off as i64 + delta).max(0) as u64,
            SeekFrom::End(delta) => {
                let entries = self.entries.lock().await;
                let entry = entries.get(&self.name).ok_or(FsError::InvalidOperation)?;
                (entry.content.len() as i64 + delta).max(0) as u64
            }
        };
        Ok(self.off)
    }

    async fn stat(&self, ctx: &CancellationToken) -> FsResult<Metadata> {
        check_cancelled(ctx)?;
        if self.closed {
            return Err(FsError::InvalidOperation);
        }
        let entries = self.entries.lock().await;
        let entry = entries.get(&self.name).ok_or(FsError::InvalidOperation)?;
        Ok(Metadata {
            name: path::basename(&entry.name).to_string(),
            size: entry.size(),
            mode: entry.mode,
            mod_time: entry.mod_time,
        })
    }

    async fn read_dir(&mut self, ctx: &CancellationToken, count: i64) -> FsResult<Vec<Entry>> {
        check_cancelled(ctx)?;
        if self.closed {
            return Err(FsError::InvalidOperation);
        }
        if self.dir_cursor.is_none() {
            let entries = self.entries.lock().await;
            let mut children: Vec<Entry> = entries
                .values()
                .filter(|e| {
                    e.name != self.name
                        && e.name.starts_with(&self.name)
                        && !e.name[self.name.len()..].trim_end_matches('/').contains('/')
                })
                .cloned()
                .collect();
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
        self.closed = true;
        self.dir_cursor = None;
        Ok(())
    }
}
