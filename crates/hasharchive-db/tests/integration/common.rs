use hasharchive_core::{DigestSet, HashAlgo, ResponseRecord, Seq};
use hasharchive_db::{ArchiveDb, DatabaseConfig};
use tempfile::TempDir;

/// Opens a fresh on-disk database in a temporary directory.
///
/// The `TempDir` must be kept in scope for the test duration;
/// dropping it deletes the database file.
pub fn setup_test_db() -> (ArchiveDb, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = ArchiveDb::open(&test_config(&dir)).expect("Failed to open database");
    (db, dir)
}

pub fn test_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig::new(dir.path().join("archive.redb"))
}

pub fn record(url: &str, time: u64, id: u64, sha256: [u8; 32]) -> ResponseRecord {
    ResponseRecord {
        seq: Seq::new(time, id),
        url: url.to_string(),
        status: 200,
        content_type: "text/html".to_string(),
        length: 512,
        digests: DigestSet::new()
            .with(HashAlgo::Sha256, sha256)
            .with(HashAlgo::Sha1, [sha256[0]; 20]),
    }
}
