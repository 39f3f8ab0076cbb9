use std::io::{Read, Write};
use std::sync::Arc;

use crate::config::ArchiveConfig;
use crate::crawl_queue::{CrawlQueue, Enqueued};
use crate::dedup::{ResponseGroup, group_responses};
use crate::dump::{DumpReader, DumpRecord, write_record};
use crate::error::AppError;
use crate::models::{HashAlgo, ResponseRecord};
use crate::sequence::SequenceAllocator;
use crate::traits::{EnqueueOutcome, QueueStore, ResponseStore};
use crate::util::unix_now;

const EXPORT_BATCH: usize = 256;

/// Deduplicated fetch history of one URL.
#[derive(Debug, Clone)]
pub struct History {
    pub url: String,
    /// Newest first.
    pub groups: Vec<ResponseGroup>,
    /// No record, or the newest one is older than the staleness threshold.
    pub outdated: bool,
    /// A fresh queue entry was written by this read.
    pub enqueued: bool,
}

impl History {
    pub fn latest(&self) -> Option<&ResponseRecord> {
        self.groups.first().map(|g| &g.representative)
    }
}

/// A URL that served a given digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub url: String,
    /// Observation times, newest first.
    pub times: Vec<u64>,
}

/// Read paths over the archive, plus the enqueue they may trigger.
pub struct ArchiveService<S>
where
    S: ResponseStore + QueueStore,
{
    queue: Arc<CrawlQueue<S>>,
    config: ArchiveConfig,
}

impl<S> ArchiveService<S>
where
    S: ResponseStore + QueueStore,
{
    /// Seed the sequence allocator from the store and build the crawl queue.
    pub async fn open(store: S, config: ArchiveConfig) -> Result<Self, AppError> {
        let high_water = store.sequence_high_water().await?;
        tracing::debug!(%high_water, "Sequence allocator seeded");
        let queue = CrawlQueue::new(
            store,
            Arc::new(SequenceAllocator::new(high_water)),
            config.duplicate_policy,
        );
        Ok(Self::new(Arc::new(queue), config))
    }

    pub fn new(queue: Arc<CrawlQueue<S>>, config: ArchiveConfig) -> Self {
        Self { queue, config }
    }

    /// The crawl queue, shared with the worker.
    pub fn queue(&self) -> &Arc<CrawlQueue<S>> {
        &self.queue
    }

    pub fn store(&self) -> &S {
        self.queue.store()
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub async fn enqueue(&self, url: &str, client: &str) -> Result<Enqueued, AppError> {
        self.queue.enqueue(unix_now(), url, client).await
    }

    pub async fn history(&self, url: &str, client: &str) -> Result<History, AppError> {
        self.history_with_limit(url, client, self.config.history_limit)
            .await
    }

    /// Grouped history of `url`, newest first.
    ///
    /// Enqueues a refetch when the URL was never archived or is stale. A
    /// failed enqueue is logged and does not fail the read.
    pub async fn history_with_limit(
        &self,
        url: &str,
        client: &str,
        limit: usize,
    ) -> Result<History, AppError> {
        let records = self.store().responses_by_url(url, limit).await?;

        let now = unix_now();
        let threshold = now.saturating_sub(self.config.stale_after.as_secs());
        let outdated = records.first().is_none_or(|newest| newest.time() < threshold);

        let mut enqueued = false;
        if outdated {
            match self.queue.enqueue(now, url, client).await {
                Ok(result) => enqueued = result.outcome == EnqueueOutcome::Queued,
                Err(e) => tracing::warn!(%url, error = %e, "Failed to enqueue stale URL"),
            }
        }

        Ok(History {
            url: url.to_string(),
            groups: group_responses(records),
            outdated,
            enqueued,
        })
    }

    pub async fn sources(&self, algo: HashAlgo, digest: &[u8]) -> Result<Vec<Source>, AppError> {
        self.sources_with_limit(algo, digest, self.config.sources_limit)
            .await
    }

    /// Distinct URLs that served `digest`, most recently seen first.
    pub async fn sources_with_limit(
        &self,
        algo: HashAlgo,
        digest: &[u8],
        limit: usize,
    ) -> Result<Vec<Source>, AppError> {
        let records = self.store().responses_by_hash(algo, digest, limit).await?;

        let mut sources: Vec<Source> = Vec::new();
        for record in records {
            match sources.iter_mut().find(|s| s.url == record.url) {
                Some(source) => source.times.push(record.time()),
                None => sources.push(Source {
                    url: record.url,
                    times: vec![record.seq.time],
                }),
            }
        }
        Ok(sources)
    }

    /// Write every archived record to `w` in sequence order.
    ///
    /// Returns the number of records written.
    pub async fn export_dump<W: Write>(&self, w: &mut W) -> Result<u64, AppError> {
        let mut after = None;
        let mut written = 0u64;
        loop {
            let batch = self.store().responses_after(after, EXPORT_BATCH).await?;
            let Some(last) = batch.last() else {
                break;
            };
            after = Some(last.seq);
            for record in &batch {
                write_record(w, &DumpRecord::from(record))?;
                written += 1;
            }
        }
        w.flush()?;
        tracing::info!(%written, "Export finished");
        Ok(written)
    }

    /// Archive every record of a dump under freshly allocated ids.
    ///
    /// Records with an unknown time are stored at time 0. Returns the number
    /// of records imported; a malformed dump stops the import at that record.
    pub async fn import_dump<R: Read>(&self, r: R) -> Result<u64, AppError> {
        let mut imported = 0u64;
        for dumped in DumpReader::new(r) {
            let dumped = dumped?;
            let seq = self.queue.sequencer().next(dumped.time.unwrap_or(0));
            let record = ResponseRecord {
                seq,
                url: dumped.url,
                status: dumped.status,
                content_type: dumped.content_type,
                length: dumped.length,
                digests: dumped.digests,
            };
            self.store().put_response(&record).await?;
            imported += 1;
        }
        tracing::info!(%imported, "Import finished");
        Ok(imported)
    }
}
