//! HTTP surface: WebFinger discovery, actor documents, outboxes, status
//! objects and avatars.

mod error;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::app::{MirrorError, Result};
use crate::assets::{media_type, ProfileImages};
use crate::config::{Account, Settings};
use crate::domain::PostId;
use crate::outbox::{self, Links, Paginator, ACTIVITY_JSON, JRD_JSON};
use crate::store::Store;

pub use error::ApiError;

/// Shared, read-only request state. All mutable state lives in the store.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

struct Shared {
    directory: HashMap<String, Account>,
    domain: String,
    page_size: usize,
    links: Links,
    paginator: Paginator,
    store: Arc<dyn Store + Send + Sync>,
    images: ProfileImages,
}

impl AppState {
    pub fn new(
        settings: &Settings,
        store: Arc<dyn Store + Send + Sync>,
        images: ProfileImages,
    ) -> Self {
        let links = Links::new(&settings.server.public_base_url);
        let directory = settings
            .accounts
            .iter()
            .map(|a| (a.username.clone(), a.clone()))
            .collect();

        Self {
            inner: Arc::new(Shared {
                directory,
                domain: settings.server.domain.clone(),
                page_size: settings.server.page_size,
                paginator: Paginator::new(store.clone(), links.clone()),
                links,
                store,
                images,
            }),
        }
    }

    fn account(&self, username: &str) -> Result<&Account> {
        self.inner
            .directory
            .get(username)
            .ok_or_else(|| MirrorError::NotFound(format!("no such user '{}'", username)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/.well-known/webfinger", get(get_webfinger))
        .route("/users/{username}", get(get_actor))
        .route("/users/{username}/outbox", get(get_outbox))
        .route("/users/{username}/avatar", get(get_avatar))
        .route("/users/{username}/statuses/{id}", get(get_status))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    tracing::info!(addr = ?listener.local_addr().ok(), "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

fn activity_json<T: serde::Serialize>(doc: T) -> Response {
    ([(header::CONTENT_TYPE, ACTIVITY_JSON)], Json(doc)).into_response()
}

/// Run a store-bound closure off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| MirrorError::Io(std::io::Error::other(e)))?
}

#[derive(Debug, Deserialize)]
struct WebfingerQuery {
    resource: Option<String>,
}

async fn get_webfinger(
    State(state): State<AppState>,
    Query(query): Query<WebfingerQuery>,
) -> std::result::Result<Response, ApiError> {
    let resource = query
        .resource
        .ok_or_else(|| MirrorError::Validation("missing 'resource' parameter".into()))?;
    let acct = resource
        .strip_prefix("acct:")
        .ok_or_else(|| MirrorError::Validation("resource must be an acct: URI".into()))?;
    let (username, domain) = acct
        .rsplit_once('@')
        .ok_or_else(|| MirrorError::Validation("resource must be user@domain".into()))?;

    if !domain.eq_ignore_ascii_case(&state.inner.domain) {
        return Err(MirrorError::NotFound(format!("unknown domain '{}'", domain)).into());
    }
    let account = state.account(username)?;

    let doc = outbox::webfinger(&state.inner.links, account, &state.inner.domain);
    Ok(([(header::CONTENT_TYPE, JRD_JSON)], Json(doc)).into_response())
}

async fn get_actor(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let account = state.account(&username)?;
    Ok(activity_json(outbox::actor(&state.inner.links, account)))
}

#[derive(Debug, Deserialize)]
struct OutboxQuery {
    before: Option<String>,
    after: Option<String>,
}

fn parse_timestamp(name: &str, value: Option<String>) -> Result<Option<i64>> {
    value
        .map(|v| {
            v.trim().parse::<i64>().map_err(|_| {
                MirrorError::Validation(format!("'{}' must be a unix timestamp", name))
            })
        })
        .transpose()
}

async fn get_outbox(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<OutboxQuery>,
) -> std::result::Result<Response, ApiError> {
    let account = state.account(&username)?.clone();
    let before = parse_timestamp("before", query.before)?;
    let after = parse_timestamp("after", query.after)?;

    let shared = state.inner.clone();
    if before.is_none() && after.is_none() {
        let doc = blocking(move || shared.paginator.collection(&account)).await?;
        return Ok(activity_json(doc));
    }

    let doc = blocking(move || {
        shared
            .paginator
            .page_from_bounds(&account, before, after, shared.page_size)
    })
    .await?;
    Ok(activity_json(doc))
}

async fn get_status(
    State(state): State<AppState>,
    Path((username, id)): Path<(String, String)>,
) -> std::result::Result<Response, ApiError> {
    let account = state.account(&username)?.clone();
    let shared = state.inner.clone();

    let note = blocking(move || {
        let post = shared
            .store
            .get(&PostId::from(id.clone()))?
            .filter(|p| p.account_id == account.id)
            .ok_or_else(|| MirrorError::NotFound(format!("no such status '{}'", id)))?;
        Ok(shared.paginator.status(&account, &post))
    })
    .await?;

    Ok(activity_json(note))
}

async fn get_avatar(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let account = state.account(&username)?;
    let path = state
        .inner
        .images
        .find(account.id)
        .ok_or_else(|| MirrorError::NotFound(format!("no avatar for '{}'", username)))?;

    let bytes = tokio::fs::read(&path).await?;
    Ok((
        [(header::CONTENT_TYPE, media_type(&path))],
        Body::from(bytes),
    )
        .into_response())
}

async fn not_found() -> ApiError {
    MirrorError::NotFound("no such resource".into()).into()
}
