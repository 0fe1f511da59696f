pub mod twitter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::app::{MirrorError, Result};

pub use twitter::TwitterClient;

/// Lower bound of an upstream search. The two forms are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LowerBound {
    /// Posts newer than this foreign id.
    SinceId(String),
    /// Posts created at or after this instant.
    StartTime(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub handle: String,
    pub credential: String,
    pub lower_bound: LowerBound,
    /// Opaque continuation token from the previous page.
    pub next_token: Option<String>,
}

/// One page of upstream search results, as sent.
///
/// Every field is optional here; [`SearchResponse::into_page`] decides
/// which absences make the page unusable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    pub meta: Option<SearchMeta>,
    pub data: Option<Vec<serde_json::Value>>,
    pub includes: Option<Includes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchMeta {
    pub result_count: Option<u64>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<UserProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    pub username: Option<String>,
    pub profile_image_url: Option<String>,
}

/// A structurally valid page.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub result_count: u64,
    pub next_token: Option<String>,
    /// Raw post records, normalized one by one so a bad record only costs itself.
    pub items: Vec<serde_json::Value>,
    pub profiles: Vec<UserProfile>,
}

impl SearchResponse {
    pub fn into_page(self) -> Result<SearchPage> {
        let meta = self
            .meta
            .ok_or_else(|| MirrorError::MalformedResponse("missing 'meta'".into()))?;
        let result_count = meta
            .result_count
            .ok_or_else(|| MirrorError::MalformedResponse("missing 'meta.result_count'".into()))?;

        let items = match self.data {
            Some(items) => items,
            None if result_count == 0 => Vec::new(),
            None => {
                return Err(MirrorError::MalformedResponse(format!(
                    "'meta.result_count' is {} but 'data' is missing",
                    result_count
                )))
            }
        };

        Ok(SearchPage {
            result_count,
            next_token: meta.next_token.filter(|t| !t.is_empty()),
            items,
            profiles: self.includes.map(|i| i.users).unwrap_or_default(),
        })
    }
}

/// Paginated search against the upstream source.
#[async_trait]
pub trait Upstream {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<SearchPage> {
        serde_json::from_str::<SearchResponse>(json)
            .unwrap()
            .into_page()
    }

    #[test]
    fn test_full_page() {
        let page = parse(
            r#"{
                "data": [{"id": "1", "created_at": "2024-01-01T00:00:00.000Z", "text": "hi"}],
                "includes": {"users": [{"username": "alice_src", "profile_image_url": "https://img.example/a_normal.png"}]},
                "meta": {"result_count": 1, "next_token": "abc"}
            }"#,
        )
        .unwrap();

        assert_eq!(page.result_count, 1);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_token.as_deref(), Some("abc"));
        assert_eq!(page.profiles[0].username.as_deref(), Some("alice_src"));
    }

    #[test]
    fn test_empty_page_without_data() {
        let page = parse(r#"{"meta": {"result_count": 0}}"#).unwrap();
        assert_eq!(page.result_count, 0);
        assert!(page.items.is_empty());
        assert!(page.next_token.is_none());
    }

    #[test]
    fn test_missing_meta_is_malformed() {
        let err = parse(r#"{"data": []}"#).unwrap_err();
        assert!(matches!(err, MirrorError::MalformedResponse(_)));
    }

    #[test]
    fn test_missing_data_with_results_is_malformed() {
        let err = parse(r#"{"meta": {"result_count": 3}}"#).unwrap_err();
        assert!(matches!(err, MirrorError::MalformedResponse(_)));
    }

    #[test]
    fn test_missing_includes_yields_no_profiles() {
        let page = parse(r#"{"data": [{}], "meta": {"result_count": 1}}"#).unwrap();
        assert!(page.profiles.is_empty());
    }
}
