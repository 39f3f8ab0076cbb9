use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::DuplicatePolicy;
use crate::error::AppError;
use crate::models::QueueEntry;
use crate::sequence::{Seq, SequenceAllocator};
use crate::surt::surt;
use crate::traits::{EnqueueOutcome, QueueStore};

/// Outcome of [`CrawlQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub seq: Seq,
    pub outcome: EnqueueOutcome,
}

/// Scan-resume hint: the last entry handed to the consumer.
///
/// `epoch` changes on every committed enqueue and every rewind. A scan only
/// advances `position` if the epoch is unchanged when it finishes, so an entry
/// committed while the scan ran cannot end up behind the cursor.
#[derive(Debug, Default)]
struct Cursor {
    position: Option<Seq>,
    epoch: u64,
}

/// Durable crawl queue with an in-memory cursor and a wake signal.
///
/// The queue index in the store is authoritative; the cursor only saves
/// re-scanning entries already handed out. Consumers block on the wake signal
/// instead of polling, and re-check the index on every wake.
pub struct CrawlQueue<S: QueueStore> {
    store: S,
    sequencer: Arc<SequenceAllocator>,
    policy: DuplicatePolicy,
    cursor: Mutex<Cursor>,
    wake: watch::Sender<u64>,
}

impl<S: QueueStore> CrawlQueue<S> {
    pub fn new(store: S, sequencer: Arc<SequenceAllocator>, policy: DuplicatePolicy) -> Self {
        let (wake, _) = watch::channel(0);
        Self {
            store,
            sequencer,
            policy,
            cursor: Mutex::new(Cursor::default()),
            wake,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sequencer(&self) -> &Arc<SequenceAllocator> {
        &self.sequencer
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Queue `url` for fetching, stamped with `time`.
    ///
    /// Wakes every waiting consumer once the entry is committed.
    pub async fn enqueue(&self, time: u64, url: &str, client: &str) -> Result<Enqueued, AppError> {
        // Only http(s) can be fetched; anything else would sit in the queue forever.
        let parsed =
            Url::parse(url.trim()).map_err(|e| AppError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::InvalidUrl(format!(
                "{url}: unsupported scheme '{}'",
                parsed.scheme()
            )));
        }
        surt(url)?;

        let seq = self.sequencer.next(time);
        let entry = QueueEntry {
            seq,
            url: url.to_string(),
            client: client.to_string(),
        };

        let outcome = self.store.put_queue_entry(&entry, self.policy).await?;
        match outcome {
            EnqueueOutcome::Queued => {
                self.note_enqueued(seq);
                self.wake.send_modify(|generation| *generation = generation.wrapping_add(1));
                tracing::info!(%url, %seq, "Enqueued");
            }
            EnqueueOutcome::AlreadyQueued => {
                tracing::debug!(%url, "Already queued, skipping");
            }
        }

        Ok(Enqueued { seq, outcome })
    }

    /// The first entry past the cursor, advancing the cursor onto it.
    ///
    /// `None` means nothing is queued beyond the cursor; wait for a wake.
    pub async fn peek_next(&self) -> Result<Option<QueueEntry>, AppError> {
        let (after, epoch) = {
            let cursor = self.lock_cursor();
            (cursor.position, cursor.epoch)
        };

        let entry = self.store.next_queue_entry(after).await?;

        if let Some(entry) = &entry {
            let mut cursor = self.lock_cursor();
            if cursor.epoch == epoch {
                cursor.position = Some(entry.seq);
            }
        }
        Ok(entry)
    }

    /// Wait until an entry is available or `cancel` fires (`Ok(None)`).
    ///
    /// When nothing is queued past the cursor the scan wraps to the oldest
    /// pending entry, so entries skipped after a failed attempt are retried
    /// once the rest of the queue has had its turn.
    pub async fn next_entry(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<QueueEntry>, AppError> {
        let mut wake = self.wake.subscribe();
        loop {
            // Mark the current generation seen before scanning, so an enqueue
            // that lands after the scan still wakes us.
            wake.borrow_and_update();

            if let Some(entry) = self.peek_next().await? {
                return Ok(Some(entry));
            }
            if self.cursor().is_some() {
                self.rewind();
                if let Some(entry) = self.peek_next().await? {
                    return Ok(Some(entry));
                }
            }

            tracing::debug!("Queue empty, waiting for wake");
            tokio::select! {
                changed = wake.changed() => {
                    if changed.is_err() {
                        return Ok(None);
                    }
                }
                () = cancel.cancelled() => return Ok(None),
            }
        }
    }

    /// Forget the cursor so the next scan starts from the oldest pending entry.
    pub fn rewind(&self) {
        let mut cursor = self.lock_cursor();
        cursor.position = None;
        cursor.epoch = cursor.epoch.wrapping_add(1);
    }

    /// Current cursor position.
    pub fn cursor(&self) -> Option<Seq> {
        self.lock_cursor().position
    }

    /// Make sure the next scan can reach `seq`, and invalidate scans in flight.
    fn note_enqueued(&self, seq: Seq) {
        let mut cursor = self.lock_cursor();
        cursor.epoch = cursor.epoch.wrapping_add(1);
        if cursor.position.is_some_and(|pos| pos >= seq) {
            cursor.position = seq.predecessor();
        }
    }

    fn lock_cursor(&self) -> std::sync::MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
