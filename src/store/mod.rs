pub mod sqlite;

use crate::app::Result;
use crate::domain::{AccountId, CanonicalPost, PageCursor, PostId, SourceTag};

pub use sqlite::SqliteStore;

/// Append-only persistence for canonical posts.
pub trait Store {
    /// Insert a new post. Fails with `MirrorError::Conflict` when the id is
    /// already stored.
    fn put(&self, post: &CanonicalPost) -> Result<()>;
    fn get(&self, id: &PostId) -> Result<Option<CanonicalPost>>;

    /// Numerically greatest foreign id stored for the pair.
    fn latest_foreign_id(&self, account: AccountId, source: SourceTag) -> Result<Option<String>>;
    fn count(&self, account: AccountId) -> Result<u64>;

    /// Up to `limit` posts strictly bounded by the cursor, newest first.
    fn range(&self, account: AccountId, cursor: PageCursor, limit: usize)
        -> Result<Vec<CanonicalPost>>;
    /// Every post of the account created at exactly `timestamp`, newest id first.
    fn at(&self, account: AccountId, timestamp: i64) -> Result<Vec<CanonicalPost>>;
    /// Up to `limit` posts created strictly after `timestamp`, oldest first.
    fn newer(&self, account: AccountId, timestamp: i64, limit: usize) -> Result<Vec<CanonicalPost>>;
}
