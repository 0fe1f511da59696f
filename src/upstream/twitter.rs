use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::app::{MirrorError, Result};
use crate::upstream::{LowerBound, SearchQuery, SearchResponse, Upstream};

pub const USER_AGENT: &str = concat!("fedimirror/", env!("CARGO_PKG_VERSION"));

const MAX_RESULTS: &str = "100";

/// Client for the recent-search endpoint of the Twitter v2 API.
pub struct TwitterClient {
    client: Client,
    base_url: String,
}

impl TwitterClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn search_url(&self, query: &SearchQuery) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/tweets/search/recent", self.base_url))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair(
                    "query",
                    &format!("from:{} -is:retweet -is:reply -is:quote", query.handle),
                )
                .append_pair("max_results", MAX_RESULTS)
                .append_pair("sort_order", "recency")
                .append_pair("tweet.fields", "created_at,entities")
                .append_pair("expansions", "author_id,attachments.media_keys")
                .append_pair("user.fields", "profile_image_url")
                .append_pair("media.fields", "type,preview_image_url,url,width,height");

            match &query.lower_bound {
                LowerBound::SinceId(id) => {
                    pairs.append_pair("since_id", id);
                }
                LowerBound::StartTime(start) => {
                    pairs.append_pair(
                        "start_time",
                        &start.to_rfc3339_opts(SecondsFormat::Secs, true),
                    );
                }
            }

            if let Some(token) = &query.next_token {
                pairs.append_pair("next_token", token);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl Upstream for TwitterClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let url = self.search_url(query)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&query.credential)
            .send()
            .await?;

        if let Some(remaining) = response
            .headers()
            .get("x-rate-limit-remaining")
            .and_then(|v| v.to_str().ok())
        {
            tracing::debug!(handle = %query.handle, remaining, "upstream rate limit");
        }

        if response.status() != StatusCode::OK {
            return Err(MirrorError::UpstreamStatus(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| MirrorError::MalformedResponse(e.to_string()))
    }
}
