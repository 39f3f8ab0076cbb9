use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hasharchive_core::{
    EnqueueOutcome, Enqueued, FetchError, HashUri, History, QueueEntry, ResponseGroup,
    ResponseRecord, Seq, Source,
};

fn timestamp(time: u64) -> Option<DateTime<Utc>> {
    i64::try_from(time)
        .ok()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub url: String,
    pub limit: Option<usize>,
    /// Recorded on the queue entry if this read triggers a refetch.
    pub client: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub time: u64,
    pub id: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    pub url: String,
    pub status: i32,
    /// Set when `status` is a fetch failure code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub content_type: String,
    pub length: u64,
    /// Hex digests keyed by algorithm name.
    pub digests: BTreeMap<&'static str, String>,
    /// Primary content address, never a deprecated algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_uri: Option<String>,
}

impl From<&ResponseRecord> for RecordResponse {
    fn from(record: &ResponseRecord) -> Self {
        let hash_uri = record
            .digests
            .preferred()
            .find(|(algo, _)| !algo.is_deprecated())
            .map(|(algo, digest)| HashUri::new(algo, digest).to_string());

        Self {
            time: record.seq.time,
            id: record.seq.id,
            fetched_at: timestamp(record.seq.time),
            url: record.url.clone(),
            status: record.status,
            error: FetchError::from_code(record.status).map(|e| e.to_string()),
            content_type: record.content_type.clone(),
            length: record.length,
            digests: record
                .digests
                .iter()
                .map(|(algo, digest)| (algo.as_str(), hex::encode(digest)))
                .collect(),
            hash_uri,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    #[serde(flatten)]
    pub record: RecordResponse,
    /// Times of the other observations merged into this group, newest first.
    pub also_seen: Vec<u64>,
}

impl From<&ResponseGroup> for GroupResponse {
    fn from(group: &ResponseGroup) -> Self {
        Self {
            record: RecordResponse::from(&group.representative),
            also_seen: group.also_seen.iter().map(|seq| seq.time).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub url: String,
    pub outdated: bool,
    pub enqueued: bool,
    pub groups: Vec<GroupResponse>,
}

impl From<History> for HistoryResponse {
    fn from(history: History) -> Self {
        Self {
            groups: history.groups.iter().map(GroupResponse::from).collect(),
            url: history.url,
            outdated: history.outdated,
            enqueued: history.enqueued,
        }
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SourcesQuery {
    /// `hash://<algo>/<hex>`
    pub uri: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SourceResponse {
    pub url: String,
    pub last_seen: Option<DateTime<Utc>>,
    /// Observation times, newest first.
    pub times: Vec<u64>,
}

impl From<Source> for SourceResponse {
    fn from(source: Source) -> Self {
        Self {
            last_seen: source.times.first().copied().and_then(timestamp),
            url: source.url,
            times: source.times,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub hash: String,
    pub sources: Vec<SourceResponse>,
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub url: String,
    pub client: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub time: u64,
    pub id: u64,
    /// `queued` or `already_queued`.
    pub status: &'static str,
}

impl From<Enqueued> for EnqueueResponse {
    fn from(enqueued: Enqueued) -> Self {
        let Seq { time, id } = enqueued.seq;
        Self {
            time,
            id,
            status: match enqueued.outcome {
                EnqueueOutcome::Queued => "queued",
                EnqueueOutcome::AlreadyQueued => "already_queued",
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueueEntryResponse {
    pub time: u64,
    pub id: u64,
    pub url: String,
    pub client: String,
}

impl From<QueueEntry> for QueueEntryResponse {
    fn from(entry: QueueEntry) -> Self {
        Self {
            time: entry.seq.time,
            id: entry.seq.id,
            url: entry.url,
            client: entry.client,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueueListResponse {
    pub entries: Vec<QueueEntryResponse>,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
