use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use hasharchive_core::QueueStore;

use crate::common::{
    TEST_ADMIN_TOKEN, json_body, record, setup_test_app, setup_test_app_no_auth,
    setup_test_app_with,
};

const DAY: u64 = 86_400;

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn history_of_unknown_url_enqueues_refetch() {
    let app = setup_test_app().await;

    let response = app
        .get("/v1/history?url=https://example.test/new&client=tester")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["url"], "https://example.test/new");
    assert_eq!(json["outdated"], true);
    assert_eq!(json["enqueued"], true);
    assert_eq!(json["groups"].as_array().unwrap().len(), 0);

    let queued = app.db.queued_entries(10).await.unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].url, "https://example.test/new");
    assert_eq!(queued[0].client, "tester");
}

#[tokio::test]
async fn history_groups_equivalent_responses() {
    let url = "https://example.test/page";
    let app = setup_test_app_with(
        &[
            record(url, 3 * DAY, 1, [1u8; 32]),
            record(url, 2 * DAY, 2, [2u8; 32]),
            record(url, 60, 3, [2u8; 32]),
        ],
        Some(TEST_ADMIN_TOKEN),
    )
    .await;

    let json = json_body(app.get(&format!("/v1/history?url={url}")).await).await;
    assert_eq!(json["outdated"], false);
    assert_eq!(json["enqueued"], false);

    let groups = json["groups"].as_array().unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["id"], 3);
    assert_eq!(groups[0]["also_seen"].as_array().unwrap().len(), 1);
    assert_eq!(groups[0]["digests"]["sha256"], "02".repeat(32));
    assert_eq!(
        groups[0]["hash_uri"],
        format!("hash://sha256/{}", "02".repeat(32))
    );
    assert_eq!(groups[1]["id"], 1);
    assert_eq!(groups[1]["also_seen"].as_array().unwrap().len(), 0);

    assert!(app.db.queued_entries(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn stale_history_is_reported_outdated() {
    let url = "https://example.test/old";
    let app = setup_test_app_with(&[record(url, 2 * DAY, 1, [1u8; 32])], None).await;

    let json = json_body(app.get(&format!("/v1/history?url={url}")).await).await;
    assert_eq!(json["outdated"], true);
    assert_eq!(json["enqueued"], true);
    assert_eq!(json["groups"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn history_with_invalid_url_returns_400() {
    let app = setup_test_app().await;

    let response = app.get("/v1/history?url=not-a-url").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = json_body(response).await;
    assert_eq!(json["error"], "invalid_url");
}

#[tokio::test]
async fn sources_list_distinct_urls() {
    let hash = [9u8; 32];
    let app = setup_test_app_with(
        &[
            record("https://a.example.test/file", 300, 1, hash),
            record("https://b.example.test/mirror", 200, 2, hash),
            record("https://a.example.test/file", 100, 3, hash),
            record("https://c.example.test/other", 50, 4, [8u8; 32]),
        ],
        None,
    )
    .await;

    let hex = "09".repeat(32);
    let response = app.get(&format!("/v1/sources/sha256/{hex}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["hash"], format!("hash://sha256/{hex}"));
    let sources = json["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["url"], "https://a.example.test/file");
    assert_eq!(sources[0]["times"].as_array().unwrap().len(), 2);
    assert_eq!(sources[1]["url"], "https://b.example.test/mirror");
}

#[tokio::test]
async fn sources_by_hash_uri() {
    let hash = [5u8; 32];
    let app = setup_test_app_with(&[record("https://example.test/x", 10, 1, hash)], None).await;

    let uri = format!("hash://sha256/{}", "05".repeat(32));
    let json = json_body(app.get(&format!("/v1/sources?uri={uri}")).await).await;
    assert_eq!(json["sources"][0]["url"], "https://example.test/x");
}

#[tokio::test]
async fn sources_with_bad_hash_returns_400() {
    let app = setup_test_app().await;

    let response = app.get("/v1/sources/whirlpool/00ff").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/v1/sources/sha256/xyz").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_hash");
}

#[tokio::test]
async fn unknown_hash_has_no_sources() {
    let app = setup_test_app().await;

    let json = json_body(app.get(&format!("/v1/sources/sha1/{}", "ab".repeat(20))).await).await;
    assert_eq!(json["sources"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn enqueue_without_token_returns_401() {
    let app = setup_test_app().await;

    let response = app
        .post_queue(None, json!({"url": "https://example.test/"}))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .post_queue(Some("wrong-token"), json!({"url": "https://example.test/"}))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn no_admin_token_returns_403() {
    let app = setup_test_app_no_auth().await;

    let response = app
        .post_queue(Some("any-token"), json!({"url": "https://example.test/"}))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "forbidden");
}

#[tokio::test]
async fn enqueue_and_list_queue() {
    let app = setup_test_app().await;

    let response = app
        .post_queue(
            Some(TEST_ADMIN_TOKEN),
            json!({"url": "https://example.test/a", "client": "ops"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = json_body(response).await;
    assert_eq!(json["status"], "queued");

    // Same URL again is suppressed by the default duplicate policy.
    let response = app
        .post_queue(Some(TEST_ADMIN_TOKEN), json!({"url": "https://example.test/a"}))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["status"], "already_queued");

    let response = app
        .router
        .clone()
        .oneshot(
            axum::http::Request::get("/v1/queue")
                .header("authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["entries"][0]["url"], "https://example.test/a");
    assert_eq!(json["entries"][0]["client"], "ops");
}

#[tokio::test]
async fn enqueue_invalid_url_returns_400() {
    let app = setup_test_app().await;

    let response = app
        .post_queue(Some(TEST_ADMIN_TOKEN), json!({"url": "::nope"}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.db.queued_entries(10).await.unwrap().is_empty());
}
