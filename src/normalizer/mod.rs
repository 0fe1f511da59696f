use chrono::{DateTime, Utc};
use html_escape::encode_text;
use serde::Deserialize;

use crate::app::{MirrorError, Result};
use crate::domain::{AccountId, CanonicalPost, PostId, SourceTag};

/// Fields a raw upstream post must carry to be stored.
#[derive(Debug, Deserialize)]
struct UpstreamPost {
    id: String,
    created_at: DateTime<Utc>,
    text: String,
}

/// Converts raw upstream records into canonical posts.
#[derive(Debug, Clone, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(
        &self,
        account: AccountId,
        source: SourceTag,
        raw: &serde_json::Value,
    ) -> Result<CanonicalPost> {
        let record: UpstreamPost = serde_json::from_value(raw.clone())
            .map_err(|e| MirrorError::InvalidRecord(e.to_string()))?;

        let foreign_id: u64 = record.id.parse().map_err(|_| {
            MirrorError::InvalidRecord(format!("foreign id '{}' is not numeric", record.id))
        })?;

        Ok(CanonicalPost {
            id: PostId::new(account, source, foreign_id),
            account_id: account,
            created_at: record.created_at,
            text_rendered: render_text(&record.text),
            text_original: record.text,
            source_tag: source,
            foreign_id: record.id,
            raw_source_data: serde_json::to_string(raw)?,
        })
    }
}

/// Plain-text rendering: escaped, one paragraph, newlines as `<br>`.
pub fn render_text(text: &str) -> String {
    let escaped = encode_text(text.trim());
    format!("<p>{}</p>", escaped.replace("\r\n", "\n").replace('\n', "<br>"))
}

/// Full-size variant of an upstream avatar URL (drops the `_normal` suffix).
pub fn full_size_avatar(url: &str) -> String {
    match url.find("_normal.") {
        Some(idx) => format!("{}{}", &url[..idx], &url[idx + "_normal".len()..]),
        None => url.to_string(),
    }
}
