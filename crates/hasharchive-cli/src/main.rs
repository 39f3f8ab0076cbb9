use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hasharchive_client::HttpFetcher;
use hasharchive_core::hash_uri::parse_digest;
use hasharchive_core::util::format_time;
use hasharchive_core::{
    ArchiveConfig, ArchiveService, DuplicatePolicy, EnqueueOutcome, FetchError, HashAlgo, HashUri,
    QueueStore, ResponseRecord, TracingWorkerReporter, WorkerConfig, WorkerService,
};
use hasharchive_db::{ArchiveDb, DatabaseConfig};

#[derive(Parser)]
#[command(name = "hasharchive", version, about = "Content-addressed web archive")]
struct Cli {
    /// Path to the archive database
    #[arg(long, global = true, env = "HASHARCHIVE_DB_PATH", default_value = "hasharchive.redb")]
    db: PathBuf,

    /// What to do when a URL is already queued: skip-queued or allow
    #[arg(
        long,
        global = true,
        env = "HASHARCHIVE_DUPLICATE_POLICY",
        default_value = "skip-queued"
    )]
    duplicate_policy: DuplicatePolicy,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a URL for fetching
    Enqueue {
        url: String,

        /// Who asked for the fetch
        #[arg(short, long, default_value = "cli")]
        client: String,
    },

    /// Show the deduplicated fetch history of a URL
    History {
        url: String,

        /// Number of records to read
        #[arg(short, long, default_value_t = 30)]
        limit: usize,

        /// Recorded on the queue entry if the URL is refetched
        #[arg(short, long, default_value = "cli")]
        client: String,
    },

    /// List URLs that served a digest
    Sources {
        /// A `hash://<algo>/<hex>` URI, or an algorithm name followed by a hex digest
        target: String,

        digest: Option<String>,

        #[arg(short, long, default_value_t = 30)]
        limit: usize,
    },

    /// Show pending queue entries, oldest first
    Queue {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Remove a pending queue entry by its id
    Unqueue { id: u64 },

    /// Fetch queued URLs until interrupted
    Work {
        /// Seconds to wait after a failed attempt
        #[arg(long, env = "HASHARCHIVE_RETRY_DELAY", default_value_t = 5)]
        retry_delay: u64,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,

        /// Allow fetching loopback and private-network addresses
        #[arg(long, default_value_t = false)]
        allow_private: bool,
    },

    /// Write every archived record as a binary dump
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Archive the records of a binary dump under fresh ids
    Import {
        /// Input file (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hasharchive=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let archive = open_archive(&cli.db, cli.duplicate_policy).await?;

    match cli.command {
        Commands::Enqueue { url, client } => cmd_enqueue(&archive, &url, &client).await?,
        Commands::History { url, limit, client } => {
            cmd_history(&archive, &url, &client, limit).await?;
        }
        Commands::Sources {
            target,
            digest,
            limit,
        } => {
            let uri = parse_hash_target(&target, digest.as_deref())?;
            cmd_sources(&archive, &uri, limit).await?;
        }
        Commands::Queue { limit } => cmd_queue(&archive, limit).await?,
        Commands::Unqueue { id } => cmd_unqueue(&archive, id).await?,
        Commands::Work {
            retry_delay,
            timeout,
            allow_private,
        } => {
            let mut fetcher = HttpFetcher::with_timeout(Duration::from_secs(timeout))
                .context("Failed to create HTTP client")?;
            if allow_private {
                fetcher = fetcher.allow_private_urls();
            }
            let config = WorkerConfig::default().with_retry_delay(Duration::from_secs(retry_delay));
            cmd_work(&archive, fetcher, config).await?;
        }
        Commands::Export { output } => {
            let sink: Box<dyn Write> = match &output {
                Some(path) => Box::new(
                    File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?,
                ),
                None => Box::new(std::io::stdout().lock()),
            };
            let written = archive.export_dump(&mut BufWriter::new(sink)).await?;
            tracing::info!(%written, "Exported records");
        }
        Commands::Import { input } => {
            let source: Box<dyn Read> = match &input {
                Some(path) => Box::new(
                    File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
                ),
                None => Box::new(std::io::stdin().lock()),
            };
            let imported = archive.import_dump(BufReader::new(source)).await?;
            println!("Imported {imported} records");
        }
    }

    Ok(())
}

async fn open_archive(path: &Path, policy: DuplicatePolicy) -> Result<ArchiveService<ArchiveDb>> {
    let db = ArchiveDb::open(&DatabaseConfig::new(path))
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    let archive = ArchiveService::open(db, ArchiveConfig::default().with_duplicate_policy(policy))
        .await
        .context("Failed to open archive")?;
    Ok(archive)
}

/// Accepts `hash://sha256/ab..`, `sha256 ab..`, or a bare sha256 hex digest.
fn parse_hash_target(target: &str, digest: Option<&str>) -> Result<HashUri> {
    if let Some(digest) = digest {
        let algo: HashAlgo = target.parse().map_err(anyhow::Error::msg)?;
        return Ok(HashUri::new(algo, parse_digest(algo, digest)?));
    }
    if target.starts_with("hash://") {
        return Ok(target.parse()?);
    }
    Ok(HashUri::new(
        HashAlgo::Sha256,
        parse_digest(HashAlgo::Sha256, target)?,
    ))
}

fn describe_status(status: i32) -> String {
    match FetchError::from_code(status) {
        Some(e) => format!("{status} ({e})"),
        None => status.to_string(),
    }
}

fn primary_hash(record: &ResponseRecord) -> String {
    record
        .digests
        .preferred()
        .find(|(algo, _)| !algo.is_deprecated())
        .map(|(algo, digest)| HashUri::new(algo, digest).to_string())
        .unwrap_or_else(|| "-".to_string())
}

async fn cmd_enqueue(archive: &ArchiveService<ArchiveDb>, url: &str, client: &str) -> Result<()> {
    let enqueued = archive.enqueue(url, client).await?;
    match enqueued.outcome {
        EnqueueOutcome::Queued => println!("Queued {url} as {}", enqueued.seq),
        EnqueueOutcome::AlreadyQueued => println!("{url} is already queued"),
    }
    Ok(())
}

async fn cmd_history(
    archive: &ArchiveService<ArchiveDb>,
    url: &str,
    client: &str,
    limit: usize,
) -> Result<()> {
    let history = archive.history_with_limit(url, client, limit).await?;

    if history.groups.is_empty() {
        println!("No responses archived for {url}");
    } else {
        println!("History for {url}:\n");
        for group in &history.groups {
            let record = &group.representative;
            println!(
                "  {}  status {}  {}  {} bytes  {}",
                format_time(record.time()),
                describe_status(record.status),
                if record.content_type.is_empty() {
                    "-"
                } else {
                    record.content_type.as_str()
                },
                record.length,
                primary_hash(record),
            );
            for seq in &group.also_seen {
                println!("      also seen {}", format_time(seq.time));
            }
        }
    }

    if history.enqueued {
        println!("\nOutdated; queued for refetch");
    } else if history.outdated {
        println!("\nOutdated; refetch already pending");
    }

    Ok(())
}

async fn cmd_sources(archive: &ArchiveService<ArchiveDb>, uri: &HashUri, limit: usize) -> Result<()> {
    if uri.is_short() {
        tracing::warn!(%uri, "Short digest only matches records stored with the same short digest");
    }

    let sources = archive.sources_with_limit(uri.algo, &uri.digest, limit).await?;
    if sources.is_empty() {
        println!("No sources known for {uri}");
        return Ok(());
    }

    println!("Sources for {uri}:\n");
    for source in &sources {
        let last_seen = source.times.first().map_or_else(|| "-".to_string(), |t| format_time(*t));
        println!("  {}  (last seen {}, {} observations)", source.url, last_seen, source.times.len());
    }
    Ok(())
}

async fn cmd_queue(archive: &ArchiveService<ArchiveDb>, limit: usize) -> Result<()> {
    let entries = archive.store().queued_entries(limit).await?;
    if entries.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "  {:>8}  {}  {}  (client: {})",
            entry.seq.id,
            format_time(entry.seq.time),
            entry.url,
            if entry.client.is_empty() { "-" } else { entry.client.as_str() },
        );
    }
    println!("\nTotal: {} pending", entries.len());
    Ok(())
}

async fn cmd_unqueue(archive: &ArchiveService<ArchiveDb>, id: u64) -> Result<()> {
    let entries = archive.store().queued_entries(usize::MAX).await?;
    let entry = entries
        .into_iter()
        .find(|e| e.seq.id == id)
        .with_context(|| format!("No queue entry with id {id}"))?;

    if archive.store().delete_queue_entry(&entry).await? {
        println!("Removed {} ({})", entry.url, entry.seq);
    } else {
        println!("Entry {id} was already gone");
    }
    Ok(())
}

async fn cmd_work(
    archive: &ArchiveService<ArchiveDb>,
    fetcher: HttpFetcher,
    config: WorkerConfig,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
        }
        ctrl_c.cancel();
    });

    let worker = WorkerService::new(archive.queue().clone(), fetcher, config);
    worker.run(cancel, &TracingWorkerReporter).await?;
    Ok(())
}
