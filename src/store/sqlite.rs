use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{MirrorError, Result};
use crate::domain::{AccountId, CanonicalPost, PageCursor, PostId, SourceTag};
use crate::store::Store;

const POST_COLUMNS: &str =
    "id, account_id, created_at, text_original, text_rendered, source_tag, foreign_id, source_data";

/// SQLite-backed store. File databases get a second, read-only connection
/// so feed reads never queue behind a harvest write; in-memory databases
/// share the single writer.
pub struct SqliteStore {
    writer: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mut store = Self {
            writer: Mutex::new(conn),
            reader: None,
        };
        store.run_migrations()?;

        // Opened after migrations so the schema is already in place.
        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.busy_timeout(Duration::from_secs(5))?;
        store.reader = Some(Mutex::new(reader));

        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            writer: Mutex::new(conn),
            reader: None,
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.writer()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| MirrorError::Config(format!("database migration failed: {}", e)))?;

        Ok(())
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        lock(&self.writer)
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        lock(self.reader.as_ref().unwrap_or(&self.writer))
    }

    fn row_to_post(row: &Row<'_>) -> rusqlite::Result<CanonicalPost> {
        let created_at: i64 = row.get(2)?;
        let source_code: u8 = row.get(5)?;
        Ok(CanonicalPost {
            id: PostId::from(row.get::<_, String>(0)?),
            account_id: AccountId(row.get(1)?),
            created_at: DateTime::<Utc>::from_timestamp(created_at, 0).unwrap_or_default(),
            text_original: row.get(3)?,
            text_rendered: row.get(4)?,
            source_tag: SourceTag::from_code(source_code).ok_or_else(|| {
                rusqlite::Error::IntegralValueOutOfRange(5, source_code as i64)
            })?,
            foreign_id: row.get(6)?,
            raw_source_data: row.get(7)?,
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        MirrorError::Storage(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some(e.to_string()),
        ))
    })
}

impl Store for SqliteStore {
    fn put(&self, post: &CanonicalPost) -> Result<()> {
        let conn = self.writer()?;

        let outcome = conn.execute(
            &format!(
                "INSERT INTO posts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                POST_COLUMNS
            ),
            params![
                post.id.as_str(),
                post.account_id.0,
                post.timestamp(),
                post.text_original,
                post.text_rendered,
                post.source_tag.code(),
                post.foreign_id,
                post.raw_source_data
            ],
        );

        match outcome {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(MirrorError::Conflict(post.id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &PostId) -> Result<Option<CanonicalPost>> {
        let conn = self.reader()?;

        let post = conn
            .query_row(
                &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
                params![id.as_str()],
                Self::row_to_post,
            )
            .optional()?;

        Ok(post)
    }

    fn latest_foreign_id(&self, account: AccountId, source: SourceTag) -> Result<Option<String>> {
        let conn = self.reader()?;

        // Foreign ids are decimal strings without leading zeros, so length
        // first then text gives numeric order.
        let id = conn
            .query_row(
                "SELECT foreign_id FROM posts WHERE account_id = ?1 AND source_tag = ?2
                 ORDER BY length(foreign_id) DESC, foreign_id DESC LIMIT 1",
                params![account.0, source.code()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(id)
    }

    fn count(&self, account: AccountId) -> Result<u64> {
        let conn = self.reader()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE account_id = ?1",
            params![account.0],
            |row| row.get(0),
        )?;

        Ok(count as u64)
    }

    fn range(
        &self,
        account: AccountId,
        cursor: PageCursor,
        limit: usize,
    ) -> Result<Vec<CanonicalPost>> {
        let conn = self.reader()?;

        let (op, bound) = match cursor {
            PageCursor::Before(ts) => ("<", ts),
            PageCursor::After(ts) => (">", ts),
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM posts WHERE account_id = ?1 AND created_at {} ?2
             ORDER BY created_at DESC, id DESC LIMIT ?3",
            POST_COLUMNS, op
        ))?;

        let posts = stmt
            .query_map(
                params![account.0, bound, limit as i64],
                Self::row_to_post,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    fn at(&self, account: AccountId, timestamp: i64) -> Result<Vec<CanonicalPost>> {
        let conn = self.reader()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM posts WHERE account_id = ?1 AND created_at = ?2 ORDER BY id DESC",
            POST_COLUMNS
        ))?;

        let posts = stmt
            .query_map(params![account.0, timestamp], Self::row_to_post)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    fn newer(&self, account: AccountId, timestamp: i64, limit: usize) -> Result<Vec<CanonicalPost>> {
        let conn = self.reader()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM posts WHERE account_id = ?1 AND created_at > ?2
             ORDER BY created_at ASC, id ASC LIMIT ?3",
            POST_COLUMNS
        ))?;

        let posts = stmt
            .query_map(
                params![account.0, timestamp, limit as i64],
                Self::row_to_post,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(posts)
    }
}
