pub mod archive;
pub mod config;
pub mod crawl_queue;
pub mod dedup;
pub mod dump;
pub mod error;
pub mod fetch_error;
pub mod hash_uri;
pub mod models;
pub mod sequence;
pub mod surt;
pub mod traits;
pub mod util;
pub mod worker;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use archive::{ArchiveService, History, Source};
pub use config::{ArchiveConfig, DuplicatePolicy, WorkerConfig};
pub use crawl_queue::{CrawlQueue, Enqueued};
pub use dedup::{ResponseGroup, group_responses};
pub use error::AppError;
pub use fetch_error::FetchError;
pub use hash_uri::HashUri;
pub use models::{ALGO_COUNT, DigestSet, FetchedResponse, HashAlgo, QueueEntry, ResponseRecord};
pub use sequence::{Seq, SequenceAllocator};
pub use surt::surt;
pub use traits::{EnqueueOutcome, Fetcher, QueueStore, ResponseStore};
pub use worker::{TracingWorkerReporter, WorkerEvent, WorkerReporter, WorkerService};
