// HTTP-level tests for the federation router without opening sockets.
// The router is driven directly via tower::ServiceExt::oneshot.

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::Value as Json;
use tower::ServiceExt as _;

use fedimirror::assets::ProfileImages;
use fedimirror::config::Settings;
use fedimirror::domain::{AccountId, CanonicalPost, PostId, SourceTag};
use fedimirror::server::{router, AppState};
use fedimirror::store::{SqliteStore, Store};

const BODY_LIMIT: usize = 1024 * 1024;

const CONFIG: &str = r#"
[server]
domain = "mirror.example"
public_base_url = "https://mirror.example"
page_size = 2

[[accounts]]
id = 5
username = "alice"
display_name = "Alice"
start_date = "2024-01-01T00:00:00Z"

[accounts.source]
handle = "alice_src"
token = "t"

[[accounts]]
id = 6
username = "bob"
start_date = "2024-01-01T00:00:00Z"

[accounts.source]
handle = "bob_src"
token = "t"
"#;

fn post(account: u8, foreign_id: u64, ts: i64) -> CanonicalPost {
    let account = AccountId(account);
    CanonicalPost {
        id: PostId::new(account, SourceTag::Twitter, foreign_id),
        account_id: account,
        created_at: Utc.timestamp_opt(ts, 0).unwrap(),
        text_original: format!("post {}", foreign_id),
        text_rendered: format!("<p>post {}</p>", foreign_id),
        source_tag: SourceTag::Twitter,
        foreign_id: foreign_id.to_string(),
        raw_source_data: "{}".into(),
    }
}

struct TestApp {
    router: Router,
    images: ProfileImages,
    _dir: tempfile::TempDir,
}

fn test_app() -> TestApp {
    let settings = Settings::from_toml(CONFIG).expect("parse config");
    let store = Arc::new(SqliteStore::in_memory().expect("in-memory store"));
    for p in [post(5, 1, 100), post(5, 2, 200), post(5, 3, 300), post(6, 9, 150)] {
        store.put(&p).expect("seed post");
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let images = ProfileImages::new(dir.path());
    std::fs::create_dir_all(images.dir()).expect("create image dir");

    TestApp {
        router: router(AppState::new(&settings, store, images.clone())),
        images,
        _dir: dir,
    }
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");

    let resp = app.router.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, content_type, bytes)
}

async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, Json) {
    let (status, _, bytes) = get(app, uri).await;
    let value = serde_json::from_slice(&bytes).expect("json body");
    (status, value)
}

#[tokio::test]
async fn webfinger_resolves_known_account() {
    let app = test_app();
    let (status, content_type, bytes) =
        get(&app, "/.well-known/webfinger?resource=acct:alice@mirror.example").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/jrd+json"));

    let v: Json = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["subject"], "acct:alice@mirror.example");
    assert_eq!(v["links"][0]["rel"], "self");
    assert_eq!(v["links"][0]["href"], "https://mirror.example/users/alice");
}

#[tokio::test]
async fn webfinger_validation_errors() {
    let app = test_app();

    let (status, v) = get_json(&app, "/.well-known/webfinger").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["error"].is_string());

    let (status, _) = get_json(&app, "/.well-known/webfinger?resource=https://x.example/alice").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&app, "/.well-known/webfinger?resource=acct:alice@other.example").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&app, "/.well-known/webfinger?resource=acct:carol@mirror.example").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn actor_document_is_fully_qualified() {
    let app = test_app();
    let (status, content_type, bytes) = get(&app, "/users/alice").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/activity+json"));

    let v: Json = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["type"], "Person");
    assert_eq!(v["preferredUsername"], "alice");
    assert_eq!(v["name"], "Alice");
    assert_eq!(v["outbox"], "https://mirror.example/users/alice/outbox");
    assert_eq!(v["icon"]["url"], "https://mirror.example/users/alice/avatar");
    for key in ["inbox", "followers", "following", "liked", "url"] {
        assert!(
            v[key].as_str().unwrap().starts_with("https://mirror.example/"),
            "{} should be absolute",
            key
        );
    }

    let (status, _) = get_json(&app, "/users/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn outbox_without_query_is_the_collection() {
    let app = test_app();
    let (status, v) = get_json(&app, "/users/alice/outbox").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["type"], "OrderedCollection");
    assert_eq!(v["totalItems"], 3);
    assert_eq!(v["first"], "https://mirror.example/users/alice/outbox?after=0");
    assert_eq!(
        v["last"],
        "https://mirror.example/users/alice/outbox?before=3062002607999"
    );
}

#[tokio::test]
async fn outbox_page_uses_configured_size() {
    let app = test_app();
    let (status, v) = get_json(&app, "/users/alice/outbox?after=0").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["type"], "OrderedCollectionPage");
    assert_eq!(v["partOf"], "https://mirror.example/users/alice/outbox");

    let items = v["orderedItems"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["type"], "Create");
    assert_eq!(items[0]["object"]["content"], "<p>post 3</p>");
    assert_eq!(v["next"], "https://mirror.example/users/alice/outbox?before=200");
    assert!(v.get("prev").is_none());

    let (_, tail) = get_json(&app, "/users/alice/outbox?before=200").await;
    let items = tail["orderedItems"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["object"]["content"], "<p>post 1</p>");
    assert!(tail.get("next").is_none());
    assert_eq!(tail["prev"], "https://mirror.example/users/alice/outbox?before=301");
}

#[tokio::test]
async fn outbox_rejects_bad_cursors() {
    let app = test_app();

    let (status, v) = get_json(&app, "/users/alice/outbox?before=10&after=5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["error"].as_str().unwrap().contains("not both"));

    let (status, _) = get_json(&app, "/users/alice/outbox?before=tomorrow").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&app, "/users/nobody/outbox?after=0").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_is_scoped_to_its_account() {
    let app = test_app();
    let id = PostId::new(AccountId(5), SourceTag::Twitter, 2);

    let (status, v) = get_json(&app, &format!("/users/alice/statuses/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["type"], "Note");
    assert_eq!(v["@context"], "https://www.w3.org/ns/activitystreams");
    assert_eq!(v["content"], "<p>post 2</p>");

    let (status, _) = get_json(&app, &format!("/users/bob/statuses/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&app, "/users/alice/statuses/05000zz").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn avatar_is_served_once_downloaded() {
    let app = test_app();

    let (status, _) = get_json(&app, "/users/alice/avatar").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    std::fs::write(app.images.dir().join("5.png"), b"\x89PNG").unwrap();

    let (status, content_type, bytes) = get(&app, "/users/alice/avatar").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));
    assert_eq!(bytes, b"\x89PNG");
}

#[tokio::test]
async fn wrong_method_and_unknown_path() {
    let app = test_app();

    let req = Request::builder()
        .method("POST")
        .uri("/users/alice/outbox")
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = get_json(&app, "/nothing/here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
