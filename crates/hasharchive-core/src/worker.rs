use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::crawl_queue::CrawlQueue;
use crate::error::AppError;
use crate::models::QueueEntry;
use crate::sequence::Seq;
use crate::traits::{Fetcher, QueueStore};
use crate::util::unix_now;

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Waiting,
    EntryClaimed {
        entry: &'a QueueEntry,
    },
    Fetching {
        seq: Seq,
        url: &'a str,
    },
    Archived {
        seq: Seq,
        url: &'a str,
        status: i32,
    },
    AttemptFailed {
        url: &'a str,
        error: &'a str,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Waiting => {
                tracing::debug!("Waiting for queue entries");
            }
            WorkerEvent::EntryClaimed { entry } => {
                tracing::info!(seq = %entry.seq, url = %entry.url, client = %entry.client, "Entry claimed");
            }
            WorkerEvent::Fetching { seq, url } => {
                tracing::debug!(%seq, %url, "Fetching");
            }
            WorkerEvent::Archived { seq, url, status } => {
                tracing::info!(%seq, %url, %status, "Response archived");
            }
            WorkerEvent::AttemptFailed { url, error } => {
                tracing::warn!(%url, %error, "Attempt failed, will retry");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Single consumer that drains the crawl queue into the archive.
///
/// Each entry is fetched outside any transaction, then handed off in one
/// commit that deletes the entry and writes the record. A failed attempt
/// leaves the entry queued and pauses for `retry_delay`; the cursor stays past
/// it, so the rest of the queue drains before the entry comes round again.
pub struct WorkerService<S, F>
where
    S: QueueStore,
    F: Fetcher,
{
    queue: Arc<CrawlQueue<S>>,
    fetcher: F,
    config: WorkerConfig,
}

impl<S, F> WorkerService<S, F>
where
    S: QueueStore,
    F: Fetcher,
{
    pub fn new(queue: Arc<CrawlQueue<S>>, fetcher: F, config: WorkerConfig) -> Self {
        Self {
            queue,
            fetcher,
            config,
        }
    }

    /// Run the worker loop until cancellation.
    ///
    /// Returns an error only for fatal conditions (sequence collision or
    /// corrupt store data); everything else is retried.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        let result = self.drain(&cancel_token, reporter).await;

        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });
        result
    }

    async fn drain<WR: WorkerReporter>(
        &self,
        cancel_token: &CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        loop {
            if cancel_token.is_cancelled() {
                return Ok(());
            }

            reporter.report(WorkerEvent::Waiting);

            let entry = match self.queue.next_entry(cancel_token).await {
                Ok(Some(entry)) => entry,
                Ok(None) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read queue");
                    if !self.backoff(cancel_token).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            reporter.report(WorkerEvent::EntryClaimed { entry: &entry });

            match self.process_entry(&entry, reporter).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    tracing::error!(seq = %entry.seq, url = %entry.url, error = %e, "Fatal store error");
                    return Err(e);
                }
                Err(e) => {
                    let error_msg = e.to_string();
                    reporter.report(WorkerEvent::AttemptFailed {
                        url: &entry.url,
                        error: &error_msg,
                    });
                    if !self.backoff(cancel_token).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn process_entry<WR: WorkerReporter>(
        &self,
        entry: &QueueEntry,
        reporter: &WR,
    ) -> Result<(), AppError> {
        let seq = self.queue.sequencer().next(unix_now());
        reporter.report(WorkerEvent::Fetching {
            seq,
            url: &entry.url,
        });

        let response = self.fetcher.fetch(&entry.url, &entry.client).await?;
        let record = response.into_record(seq, &entry.url);

        self.queue.store().commit_fetch(entry, &record).await?;

        reporter.report(WorkerEvent::Archived {
            seq,
            url: &entry.url,
            status: record.status,
        });
        Ok(())
    }

    /// Sleep `retry_delay`. Returns false if cancelled meanwhile.
    async fn backoff(&self, cancel_token: &CancellationToken) -> bool {
        tokio::select! {
            () = tokio::time::sleep(self.config.retry_delay) => true,
            () = cancel_token.cancelled() => false,
        }
    }
}
