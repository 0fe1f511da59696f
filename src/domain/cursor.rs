use std::fmt;

use crate::app::{MirrorError, Result};

/// `before` value of the outbox `last` link: 99000-12-31T23:59:59Z.
pub const LAST_PAGE_SENTINEL: i64 = 3_062_002_607_999;

/// Exclusive position in an account's time-ordered feed, in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    /// Posts strictly older than the timestamp.
    Before(i64),
    /// Posts strictly newer than the timestamp.
    After(i64),
}

impl PageCursor {
    /// The page holding the most recent posts.
    pub fn newest() -> Self {
        PageCursor::Before(LAST_PAGE_SENTINEL)
    }

    /// The page addressed by the collection's `first` link.
    pub fn first() -> Self {
        PageCursor::After(0)
    }

    /// Build a cursor from optional bounds. Supplying both is rejected;
    /// supplying neither addresses the newest page.
    pub fn from_bounds(before: Option<i64>, after: Option<i64>) -> Result<Self> {
        match (before, after) {
            (Some(_), Some(_)) => Err(MirrorError::Validation(
                "Only the 'before' or 'after' query parameter may be set, not both".into(),
            )),
            (Some(ts), None) => Ok(PageCursor::Before(ts)),
            (None, Some(ts)) => Ok(PageCursor::After(ts)),
            (None, None) => Ok(Self::newest()),
        }
    }

    /// Query string (without `?`) addressing this page.
    pub fn to_query(self) -> String {
        match self {
            PageCursor::Before(ts) => format!("before={}", ts),
            PageCursor::After(ts) => format!("after={}", ts),
        }
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}
