use std::sync::Arc;

use tokio::net::TcpListener;

use crate::app::{AppContext, MirrorError, Result};
use crate::domain::{id, PageCursor};
use crate::harvest::scheduler::format_interval;
use crate::harvest::Scheduler;
use crate::server;
use crate::store::Store;

/// Serve HTTP and harvest periodically until SIGINT or SIGTERM.
pub async fn serve(ctx: &AppContext) -> Result<()> {
    let every = ctx
        .settings
        .harvest
        .interval()
        .map_err(|e| MirrorError::Config(e.to_string()))?;

    let listener = TcpListener::bind(&ctx.settings.server.bind).await?;
    let scheduler = Scheduler::new(Arc::new(ctx.harvest_engine()), every).spawn();

    println!(
        "Serving {} on {} (harvest every {})",
        ctx.settings.server.public_base_url,
        ctx.settings.server.bind,
        format_interval(every.as_secs())
    );

    let app = server::router(ctx.app_state());
    let served = server::serve(listener, app, shutdown_signal()).await;

    tracing::info!("shutting down");
    scheduler.shutdown().await;
    served
}

pub async fn harvest_once(ctx: &AppContext) -> Result<()> {
    let accounts = ctx.settings.accounts.len();
    println!("Harvesting {} accounts...", accounts);

    let report = ctx.harvest_engine().run_cycle().await;

    println!(
        "Done: {} new posts, {} already stored, {} skipped",
        report.stored, report.duplicates, report.skipped
    );
    for (account, error) in &report.failed {
        println!("  account {} failed: {}", account, error);
    }
    Ok(())
}

pub fn list_posts(ctx: &AppContext, username: &str, limit: usize) -> Result<()> {
    let account = ctx
        .settings
        .account_by_username(username)
        .ok_or_else(|| MirrorError::NotFound(format!("no such user '{}'", username)))?;

    let total = ctx.store.count(account.id)?;
    let posts = ctx.store.range(account.id, PageCursor::newest(), limit)?;

    if posts.is_empty() {
        println!("No posts stored for {}", username);
        return Ok(());
    }

    println!("{} posts stored for {}, newest first:", total, username);
    for post in posts {
        let text: String = post.text_original.chars().take(60).collect();
        println!(
            "  {} {} {}",
            post.created_at.format("%Y-%m-%d %H:%M"),
            post.id,
            text.replace('\n', " ")
        );
    }
    Ok(())
}

pub fn print_id(account: u8, source: u8, foreign_id: u64) {
    println!("{}", id::encode(account, source, foreign_id));
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = tokio::signal::ctrl_c() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received");
}
