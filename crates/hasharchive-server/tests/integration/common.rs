use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use hasharchive_core::util::unix_now;
use hasharchive_core::{
    ArchiveConfig, ArchiveService, DigestSet, HashAlgo, ResponseRecord, ResponseStore, Seq,
};
use hasharchive_db::{ArchiveDb, DatabaseConfig};
use hasharchive_server::routes;
use hasharchive_server::state::AppState;

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestApp {
    pub router: Router,
    pub db: ArchiveDb,
    /// Keeps the database file alive for the test.
    _dir: TempDir,
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> Response {
        self.router
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn post_queue(&self, token: Option<&str>, body: serde_json::Value) -> Response {
        let mut request = Request::post("/v1/queue").header("content-type", "application/json");
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        self.router
            .clone()
            .oneshot(
                request
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }
}

/// Router over a fresh on-disk archive holding `records`.
pub async fn setup_test_app_with(
    records: &[ResponseRecord],
    admin_token: Option<&str>,
) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = ArchiveDb::open(&DatabaseConfig::new(dir.path().join("archive.redb")))
        .expect("Failed to open database");
    for record in records {
        db.put_response(record).await.expect("Failed to seed record");
    }

    let archive = ArchiveService::open(db.clone(), ArchiveConfig::default())
        .await
        .expect("Failed to open archive");
    let state = Arc::new(AppState {
        archive,
        admin_token: admin_token.map(str::to_string),
    });

    TestApp {
        router: routes::router(state),
        db,
        _dir: dir,
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(&[], Some(TEST_ADMIN_TOKEN)).await
}

pub async fn setup_test_app_no_auth() -> TestApp {
    setup_test_app_with(&[], None).await
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// A 200 `text/html` record fetched `age` seconds ago.
pub fn record(url: &str, age: u64, id: u64, sha256: [u8; 32]) -> ResponseRecord {
    ResponseRecord {
        seq: Seq::new(unix_now() - age, id),
        url: url.to_string(),
        status: 200,
        content_type: "text/html".to_string(),
        length: 1024,
        digests: DigestSet::new().with(HashAlgo::Sha256, sha256),
    }
}
