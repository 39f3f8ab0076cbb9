use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;

use hasharchive_core::hash_uri::parse_digest;
use hasharchive_core::{AppError, HashAlgo, HashUri, QueueStore};

use crate::auth::require_admin_token;
use crate::dto::{
    EnqueueRequest, EnqueueResponse, HealthResponse, HistoryQuery, HistoryResponse, LimitQuery,
    QueueEntryResponse, QueueListResponse, SourceResponse, SourcesQuery, SourcesResponse,
};
use crate::error::ApiError;
use crate::state::AppState;

/// Upper bound on any caller-supplied `limit`.
const MAX_LIMIT: usize = 1000;
/// Client name recorded when a history read enqueues without naming one.
const DEFAULT_CLIENT: &str = "http";

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/v1/queue", get(list_queue).post(enqueue))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .route("/v1/history", get(history))
        .route("/v1/sources", get(sources_by_uri))
        .route("/v1/sources/{algo}/{digest}", get(sources));

    public.merge(admin).with_state(state)
}

fn clamp_limit(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).clamp(1, MAX_LIMIT)
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(query.limit, state.archive.config().history_limit);
    let client = query.client.as_deref().unwrap_or(DEFAULT_CLIENT);

    let history = state
        .archive
        .history_with_limit(&query.url, client, limit)
        .await?;

    Ok(axum::Json(HistoryResponse::from(history)))
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

pub async fn sources(
    State(state): State<Arc<AppState>>,
    Path((algo, digest)): Path<(String, String)>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let algo: HashAlgo = algo.parse().map_err(AppError::InvalidHashUri)?;
    let digest = parse_digest(algo, &digest)?;
    lookup_sources(&state, HashUri::new(algo, digest), query.limit).await
}

pub async fn sources_by_uri(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SourcesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let uri: HashUri = query.uri.parse()?;
    lookup_sources(&state, uri, query.limit).await
}

async fn lookup_sources(
    state: &AppState,
    uri: HashUri,
    limit: Option<usize>,
) -> Result<axum::Json<SourcesResponse>, ApiError> {
    let limit = clamp_limit(limit, state.archive.config().sources_limit);
    let sources = state
        .archive
        .sources_with_limit(uri.algo, &uri.digest, limit)
        .await?;

    Ok(axum::Json(SourcesResponse {
        hash: uri.to_string(),
        sources: sources.into_iter().map(SourceResponse::from).collect(),
    }))
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<EnqueueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let client = body.client.as_deref().unwrap_or(DEFAULT_CLIENT);
    let enqueued = state.archive.enqueue(&body.url, client).await?;

    Ok((
        StatusCode::ACCEPTED,
        axum::Json(EnqueueResponse::from(enqueued)),
    ))
}

pub async fn list_queue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = clamp_limit(query.limit, 100);
    let entries: Vec<QueueEntryResponse> = state
        .archive
        .store()
        .queued_entries(limit)
        .await?
        .into_iter()
        .map(QueueEntryResponse::from)
        .collect();

    Ok(axum::Json(QueueListResponse {
        count: entries.len(),
        entries,
    }))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_status = match state.archive.store().ping().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            "error"
        }
    };

    let status = if db_status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if db_status == "ok" {
            "healthy"
        } else {
            "unhealthy"
        },
        database: db_status,
    };

    (status, axum::Json(response))
}
