use std::fmt::Display;
use std::sync::Arc;

use hasharchive_core::{
    AppError, DuplicatePolicy, EnqueueOutcome, HashAlgo, QueueEntry, QueueStore, ResponseRecord,
    ResponseStore, Seq, surt,
};
use redb::{Database, ReadableTable, Table, TableDefinition, WriteTransaction};

use crate::config::DatabaseConfig;
use crate::keys::{
    self, META_SEQUENCE, TAG_QUEUE, TAG_RESPONSE, decode_hash_key, decode_queue_key,
    decode_response_key, decode_url_key, hash_key, hash_prefix, meta_key, prefix_end, queue_key,
    queue_seek, queued_url_key, queued_url_prefix, response_key, tag_prefix, url_key, url_prefix,
};
use crate::record::{decode_record, encode_record};

/// One ordered keyspace shared by every index; keys start with a tag.
const ARCHIVE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("archive");

/// Index entries carry everything in the key.
const EMPTY: &[u8] = &[];

pub(crate) fn db_err(e: impl Display) -> AppError {
    AppError::DatabaseError(e.to_string())
}

/// Content store and crawl queue backed by a single redb file.
///
/// Reads run in their own snapshot; every write is one transaction. All redb
/// calls run on the blocking pool.
#[derive(Clone)]
pub struct ArchiveDb {
    db: Arc<Database>,
}

impl ArchiveDb {
    /// Open (or create) the database file named by `config`.
    pub fn open(config: &DatabaseConfig) -> Result<Self, AppError> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&config.path)
            .map_err(|e| AppError::DatabaseError(format!("Failed to open {}: {e}", config.path.display())))?;
        tracing::debug!(path = %config.path.display(), "Database opened");
        Self::init(db)
    }

    /// A throwaway database held in memory (useful for testing).
    pub fn in_memory() -> Result<Self, AppError> {
        let db = redb::Builder::new()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(db_err)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, AppError> {
        // Create the table up front so read transactions never see it missing.
        let txn = db.begin_write().map_err(db_err)?;
        txn.open_table(ARCHIVE).map_err(db_err)?;
        txn.commit().map_err(db_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Cheap liveness check: open a read snapshot.
    pub async fn ping(&self) -> Result<(), AppError> {
        self.blocking(|db| {
            let txn = db.begin_read().map_err(db_err)?;
            txn.open_table(ARCHIVE).map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, AppError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| AppError::DatabaseError(format!("Blocking task failed: {e}")))?
    }
}

/// Run `f` in a write transaction, committing on success and aborting on error.
fn write<T>(
    db: &Database,
    f: impl FnOnce(&WriteTransaction) -> Result<T, AppError>,
) -> Result<T, AppError> {
    let txn = db.begin_write().map_err(db_err)?;
    match f(&txn) {
        Ok(value) => {
            txn.commit().map_err(db_err)?;
            Ok(value)
        }
        Err(e) => {
            txn.abort().map_err(db_err)?;
            Err(e)
        }
    }
}

/// Raise the persisted sequence high-water mark to at least `id`.
fn bump_high_water(txn: &WriteTransaction, id: u64) -> Result<(), AppError> {
    let key = meta_key(META_SEQUENCE)?;
    let mut table = txn.open_table(ARCHIVE).map_err(db_err)?;
    let current = match table.get(key.as_slice()).map_err(db_err)? {
        Some(value) => keys::decode_varint(value.value())?,
        None => 0,
    };
    if id > current {
        table
            .insert(key.as_slice(), keys::encode_varint(id).as_slice())
            .map_err(db_err)?;
    }
    Ok(())
}

/// Write the sequence, URL and hash index entries for `record`.
fn insert_response(txn: &WriteTransaction, record: &ResponseRecord) -> Result<(), AppError> {
    let surt = surt(&record.url)?;
    let key = response_key(record.seq);
    let value = encode_record(record)?;
    let url_index = url_key(&surt, record.seq)?;

    {
        let mut table = txn.open_table(ARCHIVE).map_err(db_err)?;
        if table.get(key.as_slice()).map_err(db_err)?.is_some() {
            return Err(AppError::Conflict {
                time: record.seq.time,
                id: record.seq.id,
            });
        }
        table
            .insert(key.as_slice(), value.as_slice())
            .map_err(db_err)?;
        table
            .insert(url_index.as_slice(), EMPTY)
            .map_err(db_err)?;
        for (algo, digest) in record.digests.iter() {
            let hash_index = hash_key(algo, digest, record.seq);
            table
                .insert(hash_index.as_slice(), EMPTY)
                .map_err(db_err)?;
        }
    }

    bump_high_water(txn, record.seq.id)?;
    tracing::debug!(url = %record.url, status = record.status, %surt, seq = %record.seq, "Response committed");
    Ok(())
}

/// Resolve index hits through the sequence index, newest first.
fn resolve_newest(
    db: &Database,
    prefix: &[u8],
    limit: usize,
    decode_seq: impl Fn(&[u8]) -> Result<Seq, AppError>,
) -> Result<Vec<ResponseRecord>, AppError> {
    let txn = db.begin_read().map_err(db_err)?;
    let table = txn.open_table(ARCHIVE).map_err(db_err)?;
    let end = prefix_end(prefix)
        .ok_or_else(|| AppError::InvalidKey("index prefix has no upper bound".into()))?;

    let mut records = Vec::new();
    for item in table
        .range(prefix..end.as_slice())
        .map_err(db_err)?
        .rev()
    {
        if records.len() >= limit {
            break;
        }
        let (key, _) = item.map_err(db_err)?;
        let seq = decode_seq(key.value())?;
        let value = table
            .get(response_key(seq).as_slice())
            .map_err(db_err)?
            .ok_or_else(|| AppError::Corrupt(format!("index entry points at missing record {seq}")))?;
        records.push(decode_record(seq, value.value())?);
    }
    Ok(records)
}

impl ResponseStore for ArchiveDb {
    async fn put_response(&self, record: &ResponseRecord) -> Result<(), AppError> {
        let record = record.clone();
        self.blocking(move |db| write(db, |txn| insert_response(txn, &record)))
            .await
    }

    async fn responses_by_url(
        &self,
        url: &str,
        limit: usize,
    ) -> Result<Vec<ResponseRecord>, AppError> {
        let prefix = url_prefix(&surt(url)?)?;
        self.blocking(move |db| {
            resolve_newest(db, &prefix, limit, |key| decode_url_key(key).map(|(_, seq)| seq))
        })
        .await
    }

    async fn responses_by_hash(
        &self,
        algo: HashAlgo,
        digest: &[u8],
        limit: usize,
    ) -> Result<Vec<ResponseRecord>, AppError> {
        if digest.is_empty() {
            return Ok(Vec::new());
        }
        let prefix = hash_prefix(algo, digest);
        self.blocking(move |db| {
            resolve_newest(db, &prefix, limit, |key| {
                decode_hash_key(key).map(|(_, _, seq)| seq)
            })
        })
        .await
    }

    async fn responses_after(
        &self,
        after: Option<Seq>,
        limit: usize,
    ) -> Result<Vec<ResponseRecord>, AppError> {
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(db_err)?;
            let table = txn.open_table(ARCHIVE).map_err(db_err)?;
            let start = after.map_or_else(|| tag_prefix(TAG_RESPONSE), response_key);
            let end = tag_prefix(TAG_RESPONSE + 1);

            let mut records = Vec::new();
            for item in table
                .range(start.as_slice()..end.as_slice())
                .map_err(db_err)?
            {
                if records.len() >= limit {
                    break;
                }
                let (key, value) = item.map_err(db_err)?;
                let seq = decode_response_key(key.value())?;
                if after.is_some_and(|a| seq <= a) {
                    continue;
                }
                records.push(decode_record(seq, value.value())?);
            }
            Ok(records)
        })
        .await
    }

    async fn sequence_high_water(&self) -> Result<u64, AppError> {
        self.blocking(|db| {
            let txn = db.begin_read().map_err(db_err)?;
            let table = txn.open_table(ARCHIVE).map_err(db_err)?;
            match table
                .get(meta_key(META_SEQUENCE)?.as_slice())
                .map_err(db_err)?
            {
                Some(value) => keys::decode_varint(value.value()),
                None => Ok(0),
            }
        })
        .await
    }
}

/// Every queue entry at or after `from`, oldest first.
fn scan_queue(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    from: Option<Seq>,
    mut visit: impl FnMut(QueueEntry) -> bool,
) -> Result<(), AppError> {
    let start = from.map_or_else(|| tag_prefix(TAG_QUEUE), queue_seek);
    let end = tag_prefix(TAG_QUEUE + 1);
    for item in table
        .range(start.as_slice()..end.as_slice())
        .map_err(db_err)?
    {
        let (key, _) = item.map_err(db_err)?;
        if !visit(decode_queue_key(key.value())?) {
            break;
        }
    }
    Ok(())
}

/// Whether any queue entry carries exactly `url`.
fn is_url_queued(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    url: &str,
) -> Result<bool, AppError> {
    let prefix = queued_url_prefix(url)?;
    let end = prefix_end(&prefix)
        .ok_or_else(|| AppError::InvalidKey("index prefix has no upper bound".into()))?;
    let mut range = table
        .range(prefix.as_slice()..end.as_slice())
        .map_err(db_err)?;
    Ok(range.next().transpose().map_err(db_err)?.is_some())
}

/// Remove a queue entry together with its URL marker. Returns false when the
/// entry was not queued.
fn remove_queue_entry(
    table: &mut Table<'_, &'static [u8], &'static [u8]>,
    entry: &QueueEntry,
) -> Result<bool, AppError> {
    if table
        .remove(queue_key(entry)?.as_slice())
        .map_err(db_err)?
        .is_none()
    {
        return Ok(false);
    }
    table
        .remove(queued_url_key(entry)?.as_slice())
        .map_err(db_err)?;
    Ok(true)
}

impl QueueStore for ArchiveDb {
    async fn put_queue_entry(
        &self,
        entry: &QueueEntry,
        policy: DuplicatePolicy,
    ) -> Result<EnqueueOutcome, AppError> {
        let entry = entry.clone();
        self.blocking(move |db| {
            write(db, |txn| {
                let key = queue_key(&entry)?;
                {
                    let mut table = txn.open_table(ARCHIVE).map_err(db_err)?;

                    if policy == DuplicatePolicy::SkipQueued && is_url_queued(&table, &entry.url)? {
                        return Ok(EnqueueOutcome::AlreadyQueued);
                    }

                    let mut conflict = false;
                    scan_queue(&table, Some(entry.seq), |pending| {
                        conflict = pending.seq == entry.seq;
                        false
                    })?;
                    if conflict {
                        return Err(AppError::Conflict {
                            time: entry.seq.time,
                            id: entry.seq.id,
                        });
                    }

                    table
                        .insert(key.as_slice(), EMPTY)
                        .map_err(db_err)?;
                    table
                        .insert(queued_url_key(&entry)?.as_slice(), EMPTY)
                        .map_err(db_err)?;
                }
                bump_high_water(txn, entry.seq.id)?;
                Ok(EnqueueOutcome::Queued)
            })
        })
        .await
    }

    async fn next_queue_entry(&self, after: Option<Seq>) -> Result<Option<QueueEntry>, AppError> {
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(db_err)?;
            let table = txn.open_table(ARCHIVE).map_err(db_err)?;
            let mut next = None;
            scan_queue(&table, after, |pending| {
                if after.is_some_and(|a| pending.seq <= a) {
                    return true;
                }
                next = Some(pending);
                false
            })?;
            Ok(next)
        })
        .await
    }

    async fn queued_entries(&self, limit: usize) -> Result<Vec<QueueEntry>, AppError> {
        self.blocking(move |db| {
            let txn = db.begin_read().map_err(db_err)?;
            let table = txn.open_table(ARCHIVE).map_err(db_err)?;
            let mut entries = Vec::new();
            scan_queue(&table, None, |pending| {
                if entries.len() >= limit {
                    return false;
                }
                entries.push(pending);
                true
            })?;
            Ok(entries)
        })
        .await
    }

    async fn delete_queue_entry(&self, entry: &QueueEntry) -> Result<bool, AppError> {
        let entry = entry.clone();
        self.blocking(move |db| {
            write(db, |txn| {
                let mut table = txn.open_table(ARCHIVE).map_err(db_err)?;
                remove_queue_entry(&mut table, &entry)
            })
        })
        .await
    }

    async fn commit_fetch(
        &self,
        entry: &QueueEntry,
        record: &ResponseRecord,
    ) -> Result<(), AppError> {
        let entry = entry.clone();
        let record = record.clone();
        self.blocking(move |db| {
            write(db, |txn| {
                {
                    let mut table = txn.open_table(ARCHIVE).map_err(db_err)?;
                    if !remove_queue_entry(&mut table, &entry)? {
                        return Err(AppError::NotFound(format!("queue entry {}", entry.seq)));
                    }
                }
                insert_response(txn, &record)
            })
        })
        .await
    }
}
