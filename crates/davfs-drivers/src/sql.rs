//! The relational backend: one `filesystem` table, shared across
//! `postgres`, `mysql` and `sqlite3`, via `sqlx`'s dialect-agnostic `Any`
//! driver. Grounded on `examples/original_source/plugin/postgres/postgres.go`,
//! the Go reference implementation this entire crate's design is a
//! translation of.
//!
//! Content is stored hex-encoded to sidestep binary-escape quirks across
//! dialects, exactly as the Go original does with `encoding/hex`. The one
//! coarse per-filesystem mutex makes the non-atomic sequences here —
//! stat-then-insert, stat-then-delete-then-insert, directory snapshotting —
//! safe without per-backend transactions.

use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use davfs_core::{path, Entry, FsError, FsResult, Metadata, Mode, OpenFlags};
use davfs_driver_api::{Driver, FileHandle, Filesystem};

use crate::util::check_cancelled;

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS filesystem (
    name TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    mode BIGINT NOT NULL,
    mod_time TIMESTAMP NOT NULL
)
"#;

// Portable substitute for Postgres's `ON CONFLICT DO NOTHING` — MySQL and
// SQLite via `sqlx::Any` don't share that syntax, but every dialect
// understands `INSERT ... SELECT ... WHERE NOT EXISTS`.
const BOOTSTRAP_SQL: &str = r#"
INSERT INTO filesystem (name, content, mode, mod_time)
SELECT ?, ?, ?, ?
WHERE NOT EXISTS (SELECT 1 FROM filesystem WHERE name = ?)
"#;

const INSERT_SQL: &str =
    "INSERT INTO filesystem (name, content, mode, mod_time) VALUES (?, ?, ?, ?)";

const SELECT_STAT_SQL: &str =
    "SELECT name, length(content)/2 AS size, mode, mod_time FROM filesystem WHERE name = ?";

fn backend_err(e: sqlx::Error) -> FsError {
    FsError::Backend(anyhow::anyhow!(e))
}

fn now_string() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("OffsetDateTime::now_utc always formats as RFC3339")
}

fn parse_time(s: &str) -> FsResult<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| FsError::Backend(anyhow::anyhow!(e)))
}

/// Escape `%`/`_` (the LIKE-dialect wildcards) and the escape character
/// itself, so that path components containing those literal characters
/// don't over-match a prefix scan.
fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

struct StatRow {
    name: String,
    size: u64,
    mode: Mode,
    mod_time: OffsetDateTime,
}

/// Exact-match on `name`; if it lacks a trailing `/` and nothing matches,
/// retry with one appended (so `stat("/foo")` finds directory `/foo/`).
async fn stat_raw(pool: &AnyPool, name: &str) -> FsResult<StatRow> {
    let row = sqlx::query(SELECT_STAT_SQL)
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(backend_err)?;

    let row = match row {
        Some(row) => row,
        None if !name.ends_with('/') => sqlx::query(SELECT_STAT_SQL)
            .bind(format!("{name}/"))
            .fetch_optional(pool)
            .await
            .map_err(backend_err)?
            .ok_or(FsError::NotExists)?,
        None => return Err(FsError::NotExists),
    };

    let size: i64 = row.get("size");
    let mode: i64 = row.get("mode");
    let mod_time: String = row.get("mod_time");
    Ok(StatRow {
        name: row.get("name"),
        size: size as u64,
        mode: Mode(mode as u32),
        mod_time: parse_time(&mod_time)?,
    })
}

async fn remove_all_raw(pool: &AnyPool, name: &str) -> FsResult<()> {
    let row = stat_raw(pool, name).await?;
    if row.mode.is_dir() {
        let pattern = format!("{}%", escape_like(&row.name));
        sqlx::query("DELETE FROM filesystem WHERE name LIKE ? ESCAPE '\\'")
            .bind(pattern)
            .execute(pool)
            .await
            .map_err(backend_err)?;
    } else {
        sqlx::query("DELETE FROM filesystem WHERE name = ?")
            .bind(&row.name)
            .execute(pool)
            .await
            .map_err(backend_err)?;
    }
    Ok(())
}

/// Driver for the `postgres` / `mysql` / `sqlite3` names, all backed by the
/// same generic implementation via `sqlx::Any`.
pub struct SqlDriver;

#[async_trait]
impl Driver for SqlDriver {
    async fn mount(&self, source: &str) -> FsResult<Arc<dyn Filesystem>> {
        sqlx::any::install_default_drivers();
        debug!(target: "davfs::sql", "mounting relational backend");
        let pool = AnyPoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .connect(source)
            .await
            .map_err(backend_err)?;
        Ok(Arc::new(SqlFs {
            pool,
            mu: Arc::new(Mutex::new(())),
        }))
    }

    async fn create(&self, source: &str) -> FsResult<()> {
        sqlx::any::install_default_drivers();
        debug!(target: "davfs::sql", "initializing relational backing store");
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(source)
            .await
            .map_err(backend_err)?;
        sqlx::query(CREATE_TABLE_SQL)
            .execute(&pool)
            .await
            .map_err(backend_err)?;
        let now = now_string();
        sqlx::query(BOOTSTRAP_SQL)
            .bind("/")
            .bind("")
            .bind(Mode::dir(0o755).0 as i64)
            .bind(now)
            .bind("/")
            .execute(&pool)
            .await
            .map_err(backend_err)?;
        pool.close().await;
        Ok(())
    }
}

struct SqlFs {
    pool: AnyPool,
    mu: Arc<Mutex<()>>,
}

#[async_trait]
impl Filesystem for SqlFs {
    async fn mkdir(&self, ctx: &CancellationToken, name: &str, perm: u32) -> FsResult<()> {
        check_cancelled(ctx)?;
        let mut name = path::normalize(name)?;
        if !name.ends_with('/') {
            name.push('/');
        }
        debug!(target: "davfs::sql", %name, "mkdir");

        let _guard = self.mu.lock().await;
        if stat_raw(&self.pool, &name).await.is_ok() {
            return Err(FsError::AlreadyExists);
        }
        let (parent, _) = path::split(&name);
        let parent_row = stat_raw(&self.pool, parent)
            .await
            .map_err(|_| FsError::InvalidArgument)?;
        if !parent_row.mode.is_dir() {
            return Err(FsError::InvalidArgument);
        }

        sqlx::query(INSERT_SQL)
            .bind(&name)
            .bind("")
            .bind(Mode::dir(perm).0 as i64)
            .bind(now_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                let e = backend_err(e);
                warn!(target: "davfs::sql", error = %e, "mkdir failed");
                e
            })?;
        check_cancelled(ctx)?;
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
        debug!(target: "davfs::sql", %name, ?flags, "open_file");

        let _guard = self.mu.lock().await;

        if flags.wants_create() {
            if name.ends_with('/') {
                return Err(FsError::InvalidArgument);
            }
            let (parent, _) = path::split(&name);
            if stat_raw(&self.pool, parent).await.is_err() {
                return Err(FsError::InvalidArgument);
            }
            if stat_raw(&self.pool, &name).await.is_ok() {
                if flags.wants_excl() {
                    return Err(FsError::AlreadyExists);
                }
                remove_all_raw(&self.pool, &name).await?;
            }
            sqlx::query(INSERT_SQL)
                .bind(&name)
                .bind("")
                .bind(Mode::file(perm).0 as i64)
                .bind(now_string())
                .execute(&self.pool)
                .await
                .map_err(backend_err)?;
            check_cancelled(ctx)?;
            return Ok(Box::new(SqlFile {
                pool: self.pool.clone(),
                mu: self.mu.clone(),
                name,
                off: 0,
                children: None,
                closed: false,
            }));
        }

        let row = stat_raw(&self.pool, &name).await?;
        let mut name = name;
        if !name.ends_with('/') && row.mode.is_dir() {
            name.push('/');
        }
        check_cancelled(ctx)?;
        Ok(Box::new(SqlFile {
            pool: self.pool.clone(),
            mu: self.mu.clone(),
            name,
            off: 0,
            children: None,
            closed: false,
        }))
    }

    async fn remove_all(&self, ctx: &CancellationToken, name: &str) -> FsResult<()> {
        check_cancelled(ctx)?;
        let name = path::normalize(name)?;
        debug!(target: "davfs::sql", %name, "remove_all");
        let _guard = self.mu.lock().await;
        remove_all_raw(&self.pool, &name).await?;
        check_cancelled(ctx)?;
        Ok(())
    }

    async fn rename(&self, ctx: &CancellationToken, old: &str, new: &str) -> FsResult<()> {
        check_cancelled(ctx)?;
        let mut old = path::normalize(old)?;
        let mut new = path::normalize(new)?;
        debug!(target: "davfs::sql", %old, %new, "rename");

        let _guard = self.mu.lock().await;
        let old_row = stat_raw(&self.pool, &old).await.map_err(|_| FsError::NotExists)?;
        if old_row.mode.is_dir() {
            if !old.ends_with('/') {
                old.push('/');
            }
            if !new.ends_with('/') {
                new.push('/');
            }
        }
        if stat_raw(&self.pool, &new).await.is_ok() {
            return Err(FsError::AlreadyExists);
        }

        if old_row.mode.is_dir() {
            // Rename the directory row and every descendant row in one
            // statement, so descendants never reference a nonexistent
            // parent. The Go original only updates the single row, which
            // orphans the whole subtree.
            let pattern = format!("{}%", escape_like(&old));
            sqlx::query(
                "UPDATE filesystem SET name = ? || substr(name, ?) WHERE name LIKE ? ESCAPE '\\'",
            )
            .bind(&new)
            .bind((old.len() + 1) as i64)
            .bind(pattern)
            .execute(&self.pool)
            .await
            .map_err(backend_err)?;
        } else {
            sqlx::query("UPDATE filesystem SET name = ? WHERE name = ?")
                .bind(&new)
                .bind(&old)
                .execute(&self.pool)
                .await
                .map_err(backend_err)?;
        }
        check_cancelled(ctx)?;
        Ok(())
    }

    async fn stat(&self, ctx: &CancellationToken, name: &str) -> FsResult<Metadata> {
        check_cancelled(ctx)?;
        let name = path::normalize(name)?;
        let _guard = self.mu.lock().await;
        let row = stat_raw(&self.pool, &name).await?;
        check_cancelled(ctx)?;
        Ok(Metadata {
            name: path::basename(&row.name).to_string(),
            size: row.size,
            mode: row.mode,
            mod_time: row.mod_time,
        })
    }

    async fn close(&self) -> FsResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

struct SqlFile {
    pool: AnyPool,
    mu: Arc<Mutex<()>>,
    name: String,
    off: u64,
    children: Option<(Vec<Entry>, usize)>,
    closed: bool,
}

#[async_trait]
impl FileHandle for SqlFile {
    async fn read(&mut self, ctx: &CancellationToken, buf: &mut [u8]) -> FsResult<usize> {
        check_cancelled(ctx)?;
        if self.closed {
            return Err(FsError::InvalidOperation);
        }
        let _guard = self.mu.lock().await;
        let row = sqlx::query(
            "SELECT mode, substr(content, ?, ?) AS chunk FROM filesystem WHERE name = ?",
        )
        .bind((1 + self.off * 2) as i64)
        .bind((buf.len() * 2) as i64)
        .bind(&self.name)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_err)?
        .ok_or(FsError::InvalidOperation)?;

        let mode: i64 = row.get("mode");
        if Mode(mode as u32).is_dir() {
            return Err(FsError::InvalidOperation);
        }
        let chunk: String = row.get("chunk");
        let bytes = hex::decode(&chunk).map_err(|e| FsError::Backend(anyhow::anyhow!(e)))?;
        let n = bytes.len();
        buf[..n].copy_from_slice(&bytes);
        self.off += n as u64;
        check_cancelled(ctx)?;
        Ok(n)
    }

    async fn write(&mut self, ctx: &CancellationToken, buf: &[u8]) -> FsResult<usize> {
        check_cancelled(ctx)?;
        if self.closed {
            return Err(FsError::InvalidOperation);
        }
        let _guard = self.mu.lock().await;
        let row = stat_raw(&self.pool, &self.name)
            .await
            .map_err(|_| FsError::InvalidOperation)?;
        if row.mode.is_dir() {
            return Err(FsError::InvalidOperation);
        }

        // `substr(content, 1, 2*offset) || hex(buffer)` truncates anything
        // past `offset + len(buffer)` that previously existed. Writing past
        // the current end needs the gap zero-filled, or a seek-past-end
        // write followed by a read would return garbage for the padding
        // bytes instead of zeros.
        let keep_chars = (row.size.min(self.off) * 2) as i64;
        let pad = if self.off > row.size {
            "00".repeat((self.off - row.size) as usize)
        } else {
            String::new()
        };

        let result = sqlx::query(
            "UPDATE filesystem SET content = substr(content, 1, ?) || ? || ? WHERE name = ?",
        )
        .bind(keep_chars)
        .bind(pad)
        .bind(hex::encode(buf))
        .bind(&self.name)
        .execute(&self.pool)
        .await
        .map_err(backend_err)?;

        if result.rows_affected() == 0 {
            return Err(FsError::InvalidOperation);
        }
        self.off += buf.len() as u64;
        check_cancelled(ctx)?;
        Ok(buf.len())
    }

    async fn seek(&mut self, ctx: &CancellationToken, pos: SeekFrom) -> FsResult<u64> {
        check_cancelled(ctx)?;
        if self.closed {
            return Err(FsError::InvalidOperation);
        }
        let _guard = self.mu.lock().await;
        self.off = match pos {
            SeekFrom::Start(o) => o,
            SeekFrom::Current(delta) => (self.off as i64 + delta).max(0) as u64,
            SeekFrom::End(delta) => {
                let row = stat_raw(&self.pool, &self.name)
                    .await
                    .map_err(|_| FsError::InvalidOperation)?;
                (row.size as i64 + delta).max(0) as u64
            }
        };
        Ok(self.off)
    }

    async fn stat(&self, ctx: &CancellationToken) -> FsResult<Metadata> {
        check_cancelled(ctx)?;
        if self.closed {
            return Err(FsError::InvalidOperation);
        }
        let _guard = self.mu.lock().await;
        let row = stat_raw(&self.pool, &self.name)
            .await
            .map_err(|_| FsError::InvalidOperation)?;
        Ok(Metadata {
            name: path::basename(&row.name).to_string(),
            size: row.size,
            mode: row.mode,
            mod_time: row.mod_time,
        })
    }

    async fn read_dir(&mut self, ctx: &CancellationToken, count: i64) -> FsResult<Vec<Entry>> {
        check_cancelled(ctx)?;
        if self.closed {
            return Err(FsError::InvalidOperation);
        }
        let _guard = self.mu.lock().await;

        if self.children.is_none() {
            let pattern = format!("{}%", escape_like(&self.name));
            let rows = sqlx::query(
                "SELECT name, length(content)/2 AS size, mode, mod_time FROM filesystem \
                 WHERE name <> ? AND name LIKE ? ESCAPE '\\'",
            )
            .bind(&self.name)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(backend_err)?;

            let mut children = Vec::new();
            for row in rows {
                let name: String = row.get("name");
                let remainder = name[self.name.len()..].trim_end_matches('/');
                if remainder.contains('/') {
                    continue;
                }
                let size: i64 = row.get("size");
                let mode: i64 = row.get("mode");
                let mod_time: String = row.get("mod_time");
                children.push(Entry {
                    name,
                    content: Vec::new(),
                    mode: Mode(mode as u32),
                    mod_time: parse_time(&mod_time)?,
                });
            }
            self.children = Some((children, 0));
        }

        let (children, cursor) = self.children.as_mut().unwrap();
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
        self.children = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CancellationToken {
        CancellationToken::new()
    }

    /// `sqlite::memory:` opens a fresh, unshared database *per connection* —
    /// `create`'s own short-lived pool bootstraps a table nothing else can
    /// ever see, since it `pool.close()`s before `mount` opens a second,
    /// entirely separate `:memory:` database. A temp-file database is the
    /// only way `create` and `mount` observe the same store, the same way
    /// `create_is_idempotent` below already has to.
    async fn fresh_fs() -> (tempfile::TempDir, Arc<dyn Filesystem>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.sqlite3");
        let source = format!("sqlite://{}?mode=rwc", path.display());
        SqlDriver.create(&source).await.unwrap();
        let fs = SqlDriver.mount(&source).await.unwrap();
        (dir, fs)
    }

    #[test]
    fn escape_like_neutralizes_wildcards() {
        assert_eq!(escape_like("a%b_c\\d"), "a\\%b\\_c\\\\d");
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.sqlite3");
        let source = format!("sqlite://{}?mode=rwc", path.display());
        SqlDriver.create(&source).await.unwrap();
        SqlDriver.create(&source).await.unwrap();
        let fs = SqlDriver.mount(&source).await.unwrap();
        let meta = fs.stat(&ctx(), "/").await.unwrap();
        assert!(meta.is_dir());
        fs.close().await.unwrap();
    }

    #[tokio::test]
    async fn root_exists_from_create() {
        let (_dir, fs) = fresh_fs().await;
        let meta = fs.stat(&ctx(), "/").await.unwrap();
        assert!(meta.is_dir());
        assert_eq!(meta.name, "/");
    }

    #[tokio::test]
    async fn create_then_stat_directory() {
        let (_dir, fs) = fresh_fs().await;
        fs.mkdir(&ctx(), "/folder", 0o755).await.unwrap();
        let meta = fs.stat(&ctx(), "/folder").await.unwrap();
        assert_eq!(meta.name, "folder");
        assert!(meta.is_dir());
    }

    #[tokio::test]
    async fn mkdir_twice_fails_the_second_time() {
        let (_dir, fs) = fresh_fs().await;
        fs.mkdir(&ctx(), "/d", 0o755).await.unwrap();
        assert!(matches!(
            fs.mkdir(&ctx(), "/d", 0o755).await.unwrap_err(),
            FsError::AlreadyExists
        ));
    }

    #[tokio::test]
    async fn mkdir_with_missing_parent_is_invalid_argument() {
        let (_dir, fs) = fresh_fs().await;
        assert!(matches!(
            fs.mkdir(&ctx(), "/missing/child", 0o755).await.unwrap_err(),
            FsError::InvalidArgument
        ));
    }

    #[tokio::test]
    async fn idempotent_file_write() {
        let (_dir, fs) = fresh_fs().await;
        let mut handle = fs
            .open_file(&ctx(), "/f", OpenFlags::CREATE | OpenFlags::WRITE, 0o644)
            .await
            .unwrap();
        handle.write(&ctx(), b"hello world file").await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(fs.stat(&ctx(), "/f").await.unwrap().size, 16);

        let mut handle = fs
            .open_file(&ctx(), "/f", OpenFlags::CREATE | OpenFlags::WRITE, 0o644)
            .await
            .unwrap();
        handle.write(&ctx(), b"hello world file").await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(fs.stat(&ctx(), "/f").await.unwrap().size, 16);
    }

    #[tokio::test]
    async fn write_to_missing_directory_fails() {
        let (_dir, fs) = fresh_fs().await;
        assert!(matches!(
            fs.open_file(&ctx(), "/no_such_dir/f", OpenFlags::CREATE, 0o644)
                .await
                .unwrap_err(),
            FsError::InvalidArgument
        ));
        assert!(matches!(
            fs.stat(&ctx(), "/no_such_dir/f").await.unwrap_err(),
            FsError::NotExists
        ));
    }

    #[tokio::test]
    async fn write_past_end_zero_fills_the_gap() {
        let (_dir, fs) = fresh_fs().await;
        let mut handle = fs
            .open_file(&ctx(), "/f", OpenFlags::CREATE | OpenFlags::WRITE, 0o644)
            .await
            .unwrap();
        handle.write(&ctx(), b"ab").await.unwrap();
        handle.seek(&ctx(), SeekFrom::Start(5)).await.unwrap();
        handle.write(&ctx(), b"cd").await.unwrap();
        handle.seek(&ctx(), SeekFrom::Start(0)).await.unwrap();
        let mut buf = vec![0u8; 7];
        let n = handle.read(&ctx(), &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ab\0\0\0cd");
    }

    #[tokio::test]
    async fn mid_file_write_truncates_the_tail() {
        let (_dir, fs) = fresh_fs().await;
        let mut handle = fs
            .open_file(&ctx(), "/f", OpenFlags::CREATE | OpenFlags::WRITE, 0o644)
            .await
            .unwrap();
        handle.write(&ctx(), b"abcdef").await.unwrap();
        handle.seek(&ctx(), SeekFrom::Start(0)).await.unwrap();
        handle.write(&ctx(), b"X").await.unwrap();
        let meta = fs.stat(&ctx(), "/f").await.unwrap();
        assert_eq!(meta.size, 1);
        handle.seek(&ctx(), SeekFrom::Start(0)).await.unwrap();
        let mut buf = vec![0u8; 1];
        let n = handle.read(&ctx(), &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"X");
    }

    #[tokio::test]
    async fn read_on_directory_handle_is_invalid_operation() {
        let (_dir, fs) = fresh_fs().await;
        fs.mkdir(&ctx(), "/d", 0o755).await.unwrap();
        let mut handle = fs.open_file(&ctx(), "/d", OpenFlags::READ, 0).await.unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            handle.read(&ctx(), &mut buf).await.unwrap_err(),
            FsError::InvalidOperation
        ));
    }

    #[tokio::test]
    async fn recursive_delete() {
        let (_dir, fs) = fresh_fs().await;
        fs.mkdir(&ctx(), "/a", 0o755).await.unwrap();
        let mut handle = fs
            .open_file(&ctx(), "/a/f", OpenFlags::CREATE | OpenFlags::WRITE, 0o644)
            .await
            .unwrap();
        handle.write(&ctx(), b"x").await.unwrap();
        handle.close().await.unwrap();

        fs.remove_all(&ctx(), "/a").await.unwrap();
        assert!(matches!(
            fs.stat(&ctx(), "/a").await.unwrap_err(),
            FsError::NotExists
        ));
        assert!(matches!(
            fs.stat(&ctx(), "/a/f").await.unwrap_err(),
            FsError::NotExists
        ));
    }

    #[tokio::test]
    async fn remove_all_does_not_over_match_wildcard_lookalikes() {
        let (_dir, fs) = fresh_fs().await;
        fs.mkdir(&ctx(), "/a%b", 0o755).await.unwrap();
        fs.mkdir(&ctx(), "/a_b", 0o755).await.unwrap();
        fs.open_file(&ctx(), "/a%b/c", OpenFlags::CREATE, 0o644).await.unwrap();
        fs.open_file(&ctx(), "/a_b/c", OpenFlags::CREATE, 0o644).await.unwrap();

        fs.remove_all(&ctx(), "/a%b").await.unwrap();
        assert!(matches!(
            fs.stat(&ctx(), "/a%b/c").await.unwrap_err(),
            FsError::NotExists
        ));
        fs.stat(&ctx(), "/a_b/c").await.unwrap();
    }

    #[tokio::test]
    async fn rename_carries_descendants() {
        let (_dir, fs) = fresh_fs().await;
        fs.mkdir(&ctx(), "/a", 0o755).await.unwrap();
        fs.mkdir(&ctx(), "/a/sub", 0o755).await.unwrap();
        fs.open_file(&ctx(), "/a/f", OpenFlags::CREATE, 0o644).await.unwrap();

        fs.rename(&ctx(), "/a", "/b").await.unwrap();
        assert!(matches!(
            fs.stat(&ctx(), "/a").await.unwrap_err(),
            FsError::NotExists
        ));
        assert!(fs.stat(&ctx(), "/b/sub").await.unwrap().is_dir());
        fs.stat(&ctx(), "/b/f").await.unwrap();
    }

    #[tokio::test]
    async fn rename_old_missing_is_not_exists() {
        let (_dir, fs) = fresh_fs().await;
        assert!(matches!(
            fs.rename(&ctx(), "/missing", "/new").await.unwrap_err(),
            FsError::NotExists
        ));
    }

    #[tokio::test]
    async fn rename_onto_existing_target_fails() {
        let (_dir, fs) = fresh_fs().await;
        fs.mkdir(&ctx(), "/a", 0o755).await.unwrap();
        fs.mkdir(&ctx(), "/b", 0o755).await.unwrap();
        assert!(matches!(
            fs.rename(&ctx(), "/a", "/b").await.unwrap_err(),
            FsError::AlreadyExists
        ));
    }

    #[tokio::test]
    async fn directory_listing_returns_immediate_children_only() {
        let (_dir, fs) = fresh_fs().await;
        fs.mkdir(&ctx(), "/d", 0o755).await.unwrap();
        fs.open_file(&ctx(), "/d/f1", OpenFlags::CREATE, 0o644).await.unwrap();
        fs.open_file(&ctx(), "/d/f2", OpenFlags::CREATE, 0o644).await.unwrap();
        fs.mkdir(&ctx(), "/d/sub", 0o755).await.unwrap();

        let mut handle = fs.open_file(&ctx(), "/d", OpenFlags::READ, 0).await.unwrap();
        let children = handle.read_dir(&ctx(), -1).await.unwrap();
        let mut names: Vec<&str> = children.iter().map(|e| path::basename(&e.name)).collect();
        names.sort();
        assert_eq!(names, ["f1", "f2", "sub"]);
    }

    #[tokio::test]
    async fn read_dir_paginates_with_positive_count() {
        let (_dir, fs) = fresh_fs().await;
        fs.mkdir(&ctx(), "/d", 0o755).await.unwrap();
        for name in ["f1", "f2", "f3"] {
            fs.open_file(&ctx(), &format!("/d/{name}"), OpenFlags::CREATE, 0o644)
                .await
                .unwrap();
        }
        let mut handle = fs.open_file(&ctx(), "/d", OpenFlags::READ, 0).await.unwrap();
        let first = handle.read_dir(&ctx(), 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = handle.read_dir(&ctx(), 2).await.unwrap();
        assert_eq!(second.len(), 1);
        let third = handle.read_dir(&ctx(), 2).await.unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn operations_on_closed_handle_fail() {
        let (_dir, fs) = fresh_fs().await;
        let mut handle = fs.open_file(&ctx(), "/f", OpenFlags::CREATE, 0o644).await.unwrap();
        handle.close().await.unwrap();
        assert!(matches!(
            handle.write(&ctx(), b"x").await.unwrap_err(),
            FsError::InvalidOperation
        ));
    }
}
