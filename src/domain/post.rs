use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, PostId, SourceTag};

/// Immutable stored representation of one upstream post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPost {
    pub id: PostId,
    pub account_id: AccountId,
    pub created_at: DateTime<Utc>,
    pub text_original: String,
    pub text_rendered: String,
    pub source_tag: SourceTag,
    pub foreign_id: String,
    /// The upstream record exactly as received, serialized as JSON.
    pub raw_source_data: String,
}

impl CanonicalPost {
    /// Unix seconds, the granularity used by the outbox cursors.
    pub fn timestamp(&self) -> i64 {
        self.created_at.timestamp()
    }
}
