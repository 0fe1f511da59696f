//! Outbox pagination and the ActivityPub documents around it.
//!
//! Pages are ordered newest first and addressed by exclusive timestamp
//! cursors. Because timestamps have one-second granularity, a full page is
//! never cut inside a group of posts sharing its oldest timestamp, which
//! keeps `before=<oldest>` lossless. `prev` links address the page directly
//! newer than the current one, so walking back from the tail is lossless too.

pub mod activity;
pub mod links;

use std::sync::Arc;

use chrono::SecondsFormat;

use crate::app::{MirrorError, Result};
use crate::config::Account;
use crate::domain::{CanonicalPost, PageCursor};
use crate::store::Store;

pub use activity::{
    Actor, Create, Image, Jrd, JrdLink, Note, OrderedCollection, OrderedCollectionPage,
    ACTIVITY_JSON, ACTIVITY_STREAMS_CONTEXT, JRD_JSON, PUBLIC_COLLECTION,
};
pub use links::Links;

pub struct Paginator {
    store: Arc<dyn Store + Send + Sync>,
    links: Links,
}

impl Paginator {
    pub fn new(store: Arc<dyn Store + Send + Sync>, links: Links) -> Self {
        Self { store, links }
    }

    pub fn links(&self) -> &Links {
        &self.links
    }

    pub fn collection(&self, account: &Account) -> Result<OrderedCollection> {
        let username = &account.username;
        Ok(OrderedCollection {
            context: ACTIVITY_STREAMS_CONTEXT.to_string(),
            kind: "OrderedCollection".to_string(),
            id: self.links.outbox(username),
            total_items: self.store.count(account.id)?,
            first: self.links.outbox_page(username, PageCursor::first()),
            last: self.links.outbox_page(username, PageCursor::newest()),
        })
    }

    /// Page addressed by raw query bounds; neither bound means the newest page.
    pub fn page_from_bounds(
        &self,
        account: &Account,
        before: Option<i64>,
        after: Option<i64>,
        limit: usize,
    ) -> Result<OrderedCollectionPage> {
        self.page(account, PageCursor::from_bounds(before, after)?, limit)
    }

    pub fn page(
        &self,
        account: &Account,
        cursor: PageCursor,
        limit: usize,
    ) -> Result<OrderedCollectionPage> {
        if limit == 0 {
            return Err(MirrorError::Validation("page size must be positive".into()));
        }

        let posts = self.posts(account, cursor, limit)?;
        let username = &account.username;

        let next = match posts.last() {
            Some(oldest) if posts.len() >= limit => Some(
                self.links
                    .outbox_page(username, PageCursor::Before(oldest.timestamp())),
            ),
            _ => None,
        };
        // An empty `before=T` page still has newer posts at T and above.
        let newest = match (posts.first(), cursor) {
            (Some(p), _) => Some(p.timestamp()),
            (None, PageCursor::Before(ts)) => Some(ts.saturating_sub(1)),
            (None, PageCursor::After(_)) => None,
        };
        let prev = match newest {
            Some(ts) => self
                .prev_cursor(account, ts, limit)?
                .map(|c| self.links.outbox_page(username, c)),
            None => None,
        };

        Ok(OrderedCollectionPage {
            context: ACTIVITY_STREAMS_CONTEXT.to_string(),
            kind: "OrderedCollectionPage".to_string(),
            id: self.links.outbox_page(username, cursor),
            next,
            prev,
            part_of: self.links.outbox(username),
            ordered_items: posts.iter().map(|p| self.create(account, p)).collect(),
        })
    }

    /// Up to `limit` posts for the cursor, extended so the oldest timestamp
    /// group on a full page is complete.
    fn posts(
        &self,
        account: &Account,
        cursor: PageCursor,
        limit: usize,
    ) -> Result<Vec<CanonicalPost>> {
        let mut posts = self.store.range(account.id, cursor, limit)?;
        if posts.len() < limit {
            return Ok(posts);
        }

        let Some(boundary) = posts.last().map(CanonicalPost::timestamp) else {
            return Ok(posts);
        };
        posts.retain(|p| p.timestamp() != boundary);
        posts.extend(self.store.at(account.id, boundary)?);
        Ok(posts)
    }

    /// Cursor of the page holding the posts directly newer than `newest`, or
    /// `None` at the head of the feed.
    ///
    /// `before` pages always finish their oldest timestamp group. When the
    /// group at the top of the target range would pull a `before` page past
    /// the lowest group above `newest`, the link steps down one group and the
    /// pages overlap rather than skip posts.
    fn prev_cursor(
        &self,
        account: &Account,
        newest: i64,
        limit: usize,
    ) -> Result<Option<PageCursor>> {
        let above = self.store.newer(account.id, newest, limit)?;
        let (Some(low), Some(high)) = (
            above.first().map(CanonicalPost::timestamp),
            above.last().map(CanonicalPost::timestamp),
        ) else {
            return Ok(None);
        };

        if above.len() < limit {
            return Ok(Some(PageCursor::After(newest)));
        }
        if low == high {
            return Ok(Some(PageCursor::Before(high.saturating_add(1))));
        }

        let between = above
            .iter()
            .filter(|p| p.timestamp() != low && p.timestamp() != high)
            .count();
        let top = self.store.at(account.id, high)?.len();
        if between + top < limit {
            Ok(Some(PageCursor::Before(high.saturating_add(1))))
        } else {
            Ok(Some(PageCursor::Before(high)))
        }
    }

    pub fn note(&self, account: &Account, post: &CanonicalPost) -> Note {
        let username = &account.username;
        Note {
            context: None,
            id: self.links.status(username, &post.id),
            kind: "Note".to_string(),
            attributed_to: self.links.actor(username),
            published: published(post),
            content: post.text_rendered.clone(),
            to: vec![PUBLIC_COLLECTION.to_string()],
            cc: vec![self.links.followers(username)],
            url: self.links.status(username, &post.id),
        }
    }

    /// Note served on its own, carrying its JSON-LD context.
    pub fn status(&self, account: &Account, post: &CanonicalPost) -> Note {
        Note {
            context: Some(ACTIVITY_STREAMS_CONTEXT.to_string()),
            ..self.note(account, post)
        }
    }

    fn create(&self, account: &Account, post: &CanonicalPost) -> Create {
        let username = &account.username;
        Create {
            id: self.links.activity(username, &post.id),
            kind: "Create".to_string(),
            actor: self.links.actor(username),
            published: published(post),
            to: vec![PUBLIC_COLLECTION.to_string()],
            cc: vec![self.links.followers(username)],
            object: self.note(account, post),
        }
    }
}

fn published(post: &CanonicalPost) -> String {
    post.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn actor(links: &Links, account: &Account) -> Actor {
    let username = &account.username;
    let name = if account.display_name.is_empty() {
        username.clone()
    } else {
        account.display_name.clone()
    };

    Actor {
        context: ACTIVITY_STREAMS_CONTEXT.to_string(),
        id: links.actor(username),
        kind: "Person".to_string(),
        preferred_username: username.clone(),
        name,
        summary: account.summary.clone(),
        icon: Image {
            kind: "Image".to_string(),
            url: links.avatar(username),
        },
        inbox: links.inbox(username),
        outbox: links.outbox(username),
        followers: links.followers(username),
        following: links.following(username),
        liked: links.liked(username),
        url: links.profile_page(username),
    }
}

pub fn webfinger(links: &Links, account: &Account, domain: &str) -> Jrd {
    let username = &account.username;
    Jrd {
        subject: format!("acct:{}@{}", username, domain),
        aliases: vec![links.actor(username), links.profile_page(username)],
        links: vec![
            JrdLink {
                rel: "self".to_string(),
                media_type: ACTIVITY_JSON.to_string(),
                href: links.actor(username),
            },
            JrdLink {
                rel: "http://webfinger.net/rel/profile-page".to_string(),
                media_type: "text/html".to_string(),
                href: links.profile_page(username),
            },
        ],
    }
}
