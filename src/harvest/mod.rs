//! Resumable, paginated ingestion of upstream posts.
//!
//! Each account pass resumes from the newest stored foreign id (or the
//! account's start date, clamped to the upstream lookback window), walks
//! the upstream pages, then stores every new post and fetches any avatar
//! found in the page metadata. Failures stay inside the account's pass.
//!
//! Posts are committed only once the page walk completes. The resume point
//! is the newest stored foreign id, so committing the first (newest) page of
//! an interrupted walk would hide its older pages from every later pass.

pub mod scheduler;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::app::{MirrorError, Result};
use crate::assets::{AssetFetcher, ProfileImages};
use crate::config::{Account, HarvestSettings};
use crate::domain::{AccountId, CanonicalPost};
use crate::normalizer::{full_size_avatar, Normalizer};
use crate::store::Store;
use crate::upstream::{LowerBound, SearchPage, SearchQuery, Upstream, UserProfile};

pub use scheduler::{Scheduler, SchedulerHandle};

/// Bounded exponential backoff for transient upstream failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HarvestConfig {
    /// How far back the upstream search can reach.
    pub lookback: chrono::Duration,
    pub retry: RetryPolicy,
}

impl HarvestConfig {
    pub fn from_settings(settings: &HarvestSettings) -> Self {
        Self {
            lookback: chrono::Duration::days(settings.lookback_days as i64),
            retry: RetryPolicy {
                max_attempts: settings.max_attempts.max(1),
                base_delay: Duration::from_millis(settings.retry_base_ms),
            },
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::from_settings(&HarvestSettings::default())
    }
}

/// Outcome of one account pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountReport {
    pub pages: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub avatars: usize,
}

/// Outcome of one cycle over the whole roster.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub accounts: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: Vec<(AccountId, String)>,
}

pub struct HarvestEngine {
    store: Arc<dyn Store + Send + Sync>,
    upstream: Arc<dyn Upstream + Send + Sync>,
    assets: Arc<dyn AssetFetcher + Send + Sync>,
    images: ProfileImages,
    accounts: Vec<Account>,
    normalizer: Normalizer,
    config: HarvestConfig,
}

impl HarvestEngine {
    pub fn new(
        store: Arc<dyn Store + Send + Sync>,
        upstream: Arc<dyn Upstream + Send + Sync>,
        assets: Arc<dyn AssetFetcher + Send + Sync>,
        images: ProfileImages,
        accounts: Vec<Account>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            store,
            upstream,
            assets,
            images,
            accounts,
            normalizer: Normalizer::new(),
            config,
        }
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// One pass over every configured account. Never fails as a whole.
    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_with(&CancellationToken::new()).await
    }

    /// Like `run_cycle`, but stops once `cancel` fires. Cancellation is
    /// honoured between accounts and while waiting on the upstream; an
    /// interrupted account stores nothing and resumes intact next time.
    pub async fn run_cycle_with(&self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();
        let mut fetched_avatars = HashSet::new();

        for account in &self.accounts {
            if cancel.is_cancelled() {
                tracing::info!(remaining = self.accounts.len() - report.accounts, "harvest cycle interrupted");
                break;
            }
            report.accounts += 1;
            tracing::info!(account = %account.id, handle = %account.source.handle, "harvesting");

            match self
                .harvest_account_with(account, &mut fetched_avatars, cancel)
                .await
            {
                Ok(r) => {
                    tracing::info!(
                        account = %account.id,
                        pages = r.pages,
                        stored = r.stored,
                        duplicates = r.duplicates,
                        skipped = r.skipped,
                        "account harvested"
                    );
                    report.stored += r.stored;
                    report.duplicates += r.duplicates;
                    report.skipped += r.skipped;
                }
                Err(MirrorError::Cancelled) => {
                    tracing::info!(account = %account.id, "account harvest interrupted");
                    break;
                }
                Err(e) => {
                    tracing::error!(account = %account.id, error = %e, "account harvest aborted");
                    report.failed.push((account.id, e.to_string()));
                }
            }
        }

        report
    }

    pub async fn harvest_account(&self, account: &Account) -> Result<AccountReport> {
        self.harvest_account_with(account, &mut HashSet::new(), &CancellationToken::new())
            .await
    }

    /// Where the next pass for `account` starts.
    pub fn resume_point(&self, account: &Account, now: DateTime<Utc>) -> Result<LowerBound> {
        match self
            .store
            .latest_foreign_id(account.id, account.source.kind)?
        {
            Some(id) => Ok(LowerBound::SinceId(id)),
            None => Ok(LowerBound::StartTime(clamp_start(
                account.start_date,
                now,
                self.config.lookback,
            ))),
        }
    }

    async fn harvest_account_with(
        &self,
        account: &Account,
        fetched_avatars: &mut HashSet<(AccountId, String)>,
        cancel: &CancellationToken,
    ) -> Result<AccountReport> {
        let lower_bound = self.resume_point(account, Utc::now())?;
        tracing::debug!(account = %account.id, ?lower_bound, "resuming");

        let mut report = AccountReport::default();
        let mut pending = Vec::new();
        let mut next_token = None;

        loop {
            let query = SearchQuery {
                handle: account.source.handle.clone(),
                credential: account.source.token.clone(),
                lower_bound: lower_bound.clone(),
                next_token: next_token.take(),
            };

            let page = self.search_with_retry(&query, cancel).await?.into_page()?;
            report.pages += 1;

            if page.result_count == 0 {
                break;
            }

            pending.extend(self.normalize_page(account, &page, &mut report));
            report.avatars += self.fetch_avatars(&page.profiles, fetched_avatars).await;

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        self.commit(pending, &mut report)?;
        Ok(report)
    }

    async fn search_with_retry(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<crate::upstream::SearchResponse> {
        let retry = self.config.retry;
        let mut attempt = 1;
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(MirrorError::Cancelled),
                outcome = self.upstream.search(query) => outcome,
            };
            match outcome {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                    let delay = retry.delay_after(attempt);
                    tracing::warn!(
                        handle = %query.handle,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "upstream request failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(MirrorError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn normalize_page(
        &self,
        account: &Account,
        page: &SearchPage,
        report: &mut AccountReport,
    ) -> Vec<CanonicalPost> {
        let mut posts = Vec::with_capacity(page.items.len());
        for raw in &page.items {
            match self
                .normalizer
                .normalize(account.id, account.source.kind, raw)
            {
                Ok(post) => posts.push(post),
                Err(e) => {
                    tracing::warn!(account = %account.id, error = %e, "skipping upstream record");
                    report.skipped += 1;
                }
            }
        }
        posts
    }

    /// Store a completed walk oldest first, so a storage failure part way
    /// leaves the resume point below every post still missing.
    fn commit(&self, mut posts: Vec<CanonicalPost>, report: &mut AccountReport) -> Result<()> {
        posts.sort_by(|a, b| {
            (a.foreign_id.len(), &a.foreign_id).cmp(&(b.foreign_id.len(), &b.foreign_id))
        });

        for post in &posts {
            match self.store.put(post) {
                Ok(()) => {
                    tracing::debug!(post_id = %post.id, "post stored");
                    report.stored += 1;
                }
                Err(MirrorError::Conflict(_)) => report.duplicates += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Fetch avatars for every roster account present in `profiles`.
    /// Returns how many were downloaded; failures are only logged.
    async fn fetch_avatars(
        &self,
        profiles: &[UserProfile],
        fetched: &mut HashSet<(AccountId, String)>,
    ) -> usize {
        let mut downloaded = 0;

        for profile in profiles {
            let (Some(username), Some(url)) = (&profile.username, &profile.profile_image_url) else {
                continue;
            };
            if url.is_empty() {
                continue;
            }
            let url = full_size_avatar(url);

            for account in self
                .accounts
                .iter()
                .filter(|a| a.source.handle.eq_ignore_ascii_case(username))
            {
                if !fetched.insert((account.id, url.clone())) {
                    continue;
                }

                let destination = self.images.path_for(account.id, &url);
                match self.assets.fetch(&url, &destination).await {
                    Ok(()) => {
                        downloaded += 1;
                        tracing::info!(
                            account = %account.id,
                            path = %destination.display(),
                            "avatar downloaded"
                        );
                        if let Err(e) = self.images.prune(account.id, &destination) {
                            tracing::warn!(account = %account.id, error = %e, "failed to prune old avatars");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(account = %account.id, error = %e, "avatar fetch failed");
                    }
                }
            }
        }

        downloaded
    }
}

/// Clamp a start date to the upstream lookback window, keeping one hour of
/// margin so the request does not fall just outside it.
pub fn clamp_start(
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    lookback: chrono::Duration,
) -> DateTime<Utc> {
    let earliest = now - lookback + chrono::Duration::hours(1);
    start.max(earliest)
}
