//! # fedimirror
//!
//! Mirrors a fixed roster of upstream social-media accounts as ActivityPub
//! actors.
//!
//! ## Architecture
//!
//! ```text
//! Upstream → Normalizer → Store → Outbox → HTTP
//! ```
//!
//! A background scheduler drives the harvest engine, which pulls new posts
//! page by page and stores them append-only. Feed requests read the store
//! independently and never wait on a harvest.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run one harvest cycle
//! fedimirror --config mirror.toml harvest
//!
//! # Serve the federation endpoints, harvesting every interval
//! fedimirror --config mirror.toml serve
//!
//! # Show what has been stored
//! fedimirror --config mirror.toml list alice
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store,
/// the upstream client and the asset fetcher.
pub mod app;

/// Download of secondary assets (avatars) to local storage.
pub mod assets;

/// Command-line interface using clap.
///
/// - `serve` - HTTP endpoints plus the background harvest scheduler
/// - `harvest` - one harvest cycle in the foreground
/// - `list <username>` - newest stored posts
/// - `id <account> <source> <foreign id>` - identifier codec output
pub mod cli;

/// TOML settings: server, harvest tuning, storage paths and the account roster.
pub mod config;

/// Core domain models.
///
/// - [`PostId`](domain::PostId): deterministic cross-source identifier
/// - [`CanonicalPost`](domain::CanonicalPost): stored post
/// - [`PageCursor`](domain::PageCursor): outbox position
pub mod domain;

/// Incremental, resumable harvesting and its scheduler.
pub mod harvest;

/// Converts raw upstream records into canonical posts.
pub mod normalizer;

/// Outbox pagination and ActivityPub documents.
pub mod outbox;

/// axum router for WebFinger, actors, outboxes, statuses and avatars.
pub mod server;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Upstream search API.
///
/// - [`Upstream`](upstream::Upstream): Async trait for paginated search
/// - [`TwitterClient`](upstream::TwitterClient): reqwest-based implementation
pub mod upstream;
