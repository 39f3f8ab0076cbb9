use std::future::Future;

use crate::config::DuplicatePolicy;
use crate::error::AppError;
use crate::fetch_error::FetchError;
use crate::models::{FetchedResponse, HashAlgo, QueueEntry, ResponseRecord};
use crate::sequence::Seq;

/// Fetches a URL and hashes its body in one streaming pass.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(
        &self,
        url: &str,
        client: &str,
    ) -> impl Future<Output = Result<FetchedResponse, FetchError>> + Send;
}

/// Result of inserting a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Suppressed by [`DuplicatePolicy::SkipQueued`].
    AlreadyQueued,
}

/// Read/write access to archived responses and their indexes.
///
/// Every read runs against one snapshot; every write is all-or-nothing.
/// `limit` bounds the scan, so results are a prefix, not a complete set.
pub trait ResponseStore: Send + Sync + Clone {
    /// Write the record with its sequence, URL and hash index entries.
    ///
    /// Fails with [`AppError::Conflict`] if a record already exists at the same sequence.
    fn put_response(
        &self,
        record: &ResponseRecord,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Records fetched from `url`, newest first.
    fn responses_by_url(
        &self,
        url: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ResponseRecord>, AppError>> + Send;

    /// Records whose `algo` digest equals `digest`, newest first.
    fn responses_by_hash(
        &self,
        algo: HashAlgo,
        digest: &[u8],
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ResponseRecord>, AppError>> + Send;

    /// Records strictly after `after` in ascending sequence order.
    fn responses_after(
        &self,
        after: Option<Seq>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ResponseRecord>, AppError>> + Send;

    /// Largest id persisted by any write so far (0 for an empty store).
    fn sequence_high_water(&self) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Durable FIFO of pending fetches, ordered by sequence.
pub trait QueueStore: Send + Sync + Clone {
    fn put_queue_entry(
        &self,
        entry: &QueueEntry,
        policy: DuplicatePolicy,
    ) -> impl Future<Output = Result<EnqueueOutcome, AppError>> + Send;

    /// First entry strictly after `after`, or `None` when nothing is queued past it.
    fn next_queue_entry(
        &self,
        after: Option<Seq>,
    ) -> impl Future<Output = Result<Option<QueueEntry>, AppError>> + Send;

    /// Pending entries, oldest first.
    fn queued_entries(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<QueueEntry>, AppError>> + Send;

    /// Drop a pending entry without archiving anything.
    ///
    /// Returns false if the entry was not queued.
    fn delete_queue_entry(
        &self,
        entry: &QueueEntry,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// In one transaction: delete `entry` and write `record` with its indexes.
    ///
    /// Either both land or neither does.
    fn commit_fetch(
        &self,
        entry: &QueueEntry,
        record: &ResponseRecord,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
