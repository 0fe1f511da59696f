//! Periodic harvest cycles in a background task.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::HarvestEngine;

/// Parse an interval such as "30m", "1h", "45s", "1d" or plain seconds.
pub fn parse_interval(s: &str) -> Result<u64, String> {
    let s = s.trim().to_lowercase();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (count, unit) = s.split_at(split);

    let scale: u64 = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => {
            return Err(format!(
                "Invalid interval unit in '{}'. Use format like '15m', '1h', '1d'",
                s
            ))
        }
    };
    let count = count
        .parse::<u64>()
        .map_err(|_| format!("Invalid interval: '{}'", s))?;
    let secs = count
        .checked_mul(scale)
        .ok_or_else(|| format!("Interval too large: '{}'", s))?;

    if secs == 0 {
        return Err("Interval must be greater than zero".to_string());
    }
    Ok(secs)
}

/// Format interval for display
pub fn format_interval(secs: u64) -> String {
    if secs >= 86400 && secs % 86400 == 0 {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Runs one harvest cycle immediately and then one per interval.
///
/// Cycles run sequentially inside a single task, so a slow cycle delays the
/// next tick instead of overlapping it.
pub struct Scheduler {
    engine: Arc<HarvestEngine>,
    every: Duration,
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl Scheduler {
    pub fn new(engine: Arc<HarvestEngine>, every: Duration) -> Self {
        Self {
            engine,
            every: every.max(Duration::from_secs(1)),
        }
    }

    pub fn spawn(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let join = tokio::spawn(async move { self.run(token).await });
        SchedulerHandle { cancel, join }
    }

    async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval = %format_interval(self.every.as_secs()),
            accounts = self.engine.accounts().len(),
            "harvest scheduler started"
        );

        let mut timer = interval(self.every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            let start = Utc::now();
            let report = self.engine.run_cycle_with(&cancel).await;
            let elapsed = Utc::now().signed_duration_since(start);

            tracing::info!(
                accounts = report.accounts,
                stored = report.stored,
                duplicates = report.duplicates,
                skipped = report.skipped,
                failed = report.failed.len(),
                elapsed_ms = elapsed.num_milliseconds(),
                "harvest cycle complete"
            );
        }

        tracing::info!("harvest scheduler stopped");
    }
}

impl SchedulerHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop scheduling and wait for the task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "harvest scheduler task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use crate::app::Result;
    use crate::assets::{AssetFetcher, ProfileImages};
    use crate::domain::AccountId;
    use crate::harvest::HarvestConfig;
    use crate::store::{SqliteStore, Store};
    use crate::upstream::{LowerBound, SearchQuery, SearchResponse, Upstream};

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("1h").unwrap(), 3600);
        assert_eq!(parse_interval("15m").unwrap(), 900);
        assert_eq!(parse_interval("1d").unwrap(), 86400);
        assert_eq!(parse_interval("45s").unwrap(), 45);
        assert_eq!(parse_interval("120").unwrap(), 120);
        assert_eq!(parse_interval(" 2H ").unwrap(), 7200);
    }

    #[test]
    fn test_parse_interval_invalid() {
        assert!(parse_interval("abc").is_err());
        assert!(parse_interval("1x").is_err());
        assert!(parse_interval("").is_err());
        assert!(parse_interval("0m").is_err());
        assert!(parse_interval("h").is_err());
        assert!(parse_interval("-5m").is_err());
    }

    #[test]
    fn test_parse_interval_overflow_is_an_error() {
        assert!(parse_interval("9999999999999999h").is_err());
        assert!(parse_interval("999999999999999999d").is_err());
        assert_eq!(parse_interval("18446744073709551615").unwrap(), u64::MAX);
        assert!(parse_interval("18446744073709551616").is_err());
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(3600), "1h");
        assert_eq!(format_interval(900), "15m");
        assert_eq!(format_interval(86400), "1d");
        assert_eq!(format_interval(90), "90s");
    }

    fn account() -> crate::config::Account {
        toml::from_str(
            r#"
            id = 1
            username = "alice"
            start_date = "2024-01-01T00:00:00Z"
            [source]
            handle = "alice_src"
            token = "t"
            "#,
        )
        .unwrap()
    }

    #[derive(Default)]
    struct CountingUpstream {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Upstream for CountingUpstream {
        async fn search(&self, _query: &SearchQuery) -> Result<SearchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::from_str(r#"{"meta": {"result_count": 0}}"#).unwrap())
        }
    }

    /// Serves a first page that points at a second one, then hangs on the
    /// second request until the caller gives up.
    #[derive(Default)]
    struct StallingUpstream {
        second_page_requested: Notify,
    }

    #[async_trait]
    impl Upstream for StallingUpstream {
        async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
            if query.next_token.is_none() {
                return Ok(serde_json::from_str(
                    r#"{
                        "data": [
                            {"id": "20", "created_at": "2024-01-02T00:00:00Z", "text": "newest"},
                            {"id": "19", "created_at": "2024-01-01T00:00:00Z", "text": "older"}
                        ],
                        "meta": {"result_count": 2, "next_token": "page2"}
                    }"#,
                )
                .unwrap());
            }
            self.second_page_requested.notify_one();
            std::future::pending().await
        }
    }

    struct NoAssets;

    #[async_trait]
    impl AssetFetcher for NoAssets {
        async fn fetch(&self, _url: &str, _destination: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_runs_immediately_and_stops_on_shutdown() {
        let upstream = Arc::new(CountingUpstream::default());

        let engine = Arc::new(HarvestEngine::new(
            Arc::new(SqliteStore::in_memory().unwrap()),
            upstream.clone(),
            Arc::new(NoAssets),
            ProfileImages::new("/tmp/fedimirror-test"),
            vec![account()],
            HarvestConfig::default(),
        ));

        let handle = Scheduler::new(engine, Duration::from_secs(3600)).spawn();

        for _ in 0..100 {
            if upstream.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

        handle.shutdown().await;
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_mid_pass_stores_nothing() {
        let upstream = Arc::new(StallingUpstream::default());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let engine = Arc::new(HarvestEngine::new(
            store.clone(),
            upstream.clone(),
            Arc::new(NoAssets),
            ProfileImages::new("/tmp/fedimirror-test"),
            vec![account()],
            HarvestConfig::default(),
        ));

        let handle = Scheduler::new(engine.clone(), Duration::from_secs(3600)).spawn();
        tokio::time::timeout(Duration::from_secs(5), upstream.second_page_requested.notified())
            .await
            .expect("second page was never requested");

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("scheduler did not stop");

        // The pass was interrupted before it finished, so nothing was kept and
        // the next pass starts over from the start date.
        assert_eq!(store.count(AccountId(1)).unwrap(), 0);
        match engine.resume_point(&engine.accounts()[0], Utc::now()).unwrap() {
            LowerBound::StartTime(_) => {}
            other => panic!("expected start time, got {:?}", other),
        }
    }
}
