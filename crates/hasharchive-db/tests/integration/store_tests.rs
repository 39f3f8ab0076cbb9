use hasharchive_core::{
    AppError, DigestSet, FetchError, HashAlgo, ResponseRecord, ResponseStore, Seq,
};
use hasharchive_db::ArchiveDb;

use crate::common::{record, setup_test_db, test_config};

#[tokio::test]
async fn put_response_is_reachable_through_every_index() {
    let (db, _dir) = setup_test_db();
    let rec = record("https://www.Example.test/a?b=1", 1000, 1, [7u8; 32]);
    db.put_response(&rec).await.unwrap();

    let by_url = db.responses_by_url("https://www.Example.test/a?b=1", 10).await.unwrap();
    assert_eq!(by_url, vec![rec.clone()]);

    let by_sha256 = db.responses_by_hash(HashAlgo::Sha256, &[7u8; 32], 10).await.unwrap();
    assert_eq!(by_sha256, vec![rec.clone()]);

    let by_sha1 = db.responses_by_hash(HashAlgo::Sha1, &[7u8; 20], 10).await.unwrap();
    assert_eq!(by_sha1, vec![rec.clone()]);

    let all = db.responses_after(None, 10).await.unwrap();
    assert_eq!(all, vec![rec]);
}

#[tokio::test]
async fn url_lookup_normalizes_to_surt() {
    let (db, _dir) = setup_test_db();
    db.put_response(&record("http://www.example.test/page", 10, 1, [1u8; 32]))
        .await
        .unwrap();

    let found = db.responses_by_url("http://EXAMPLE.test/page#frag", 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].url, "http://www.example.test/page");

    assert!(db.responses_by_url("http://example.test/page/more", 10).await.unwrap().is_empty());
    assert!(db.responses_by_url("http://example.test/pag", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn lookups_are_newest_first_and_bounded() {
    let (db, _dir) = setup_test_db();
    for (time, id) in [(100, 1), (300, 2), (200, 3), (300, 4)] {
        db.put_response(&record("http://example.test/", time, id, [5u8; 32]))
            .await
            .unwrap();
    }

    let seqs: Vec<Seq> = db
        .responses_by_url("http://example.test/", 10)
        .await
        .unwrap()
        .iter()
        .map(|r| r.seq)
        .collect();
    assert_eq!(
        seqs,
        vec![Seq::new(300, 4), Seq::new(300, 2), Seq::new(200, 3), Seq::new(100, 1)]
    );

    let limited = db.responses_by_hash(HashAlgo::Sha256, &[5u8; 32], 2).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].seq, Seq::new(300, 4));
}

#[tokio::test]
async fn hash_lookup_is_exact() {
    let (db, _dir) = setup_test_db();
    db.put_response(&record("http://a.test/", 1, 1, [0xab; 32])).await.unwrap();

    assert!(db.responses_by_hash(HashAlgo::Sha256, &[0xab; 16], 10).await.unwrap().is_empty());
    assert!(db.responses_by_hash(HashAlgo::Sha512, &[0xab; 32], 10).await.unwrap().is_empty());
    assert!(db.responses_by_hash(HashAlgo::Sha256, &[], 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_sequence_is_a_conflict() {
    let (db, _dir) = setup_test_db();
    db.put_response(&record("http://a.test/", 5, 9, [1u8; 32])).await.unwrap();

    let err = db
        .put_response(&record("http://b.test/", 5, 9, [2u8; 32]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { time: 5, id: 9 }));
    assert!(err.is_fatal());

    // The rejected write left nothing behind.
    assert!(db.responses_by_url("http://b.test/", 10).await.unwrap().is_empty());
    assert!(db.responses_by_hash(HashAlgo::Sha256, &[2u8; 32], 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn failure_status_and_sparse_digests_are_preserved() {
    let (db, _dir) = setup_test_db();
    let failed = ResponseRecord {
        seq: Seq::new(50, 1),
        url: "https://expired.test/".into(),
        status: FetchError::CertHasExpired.code(),
        content_type: String::new(),
        length: 0,
        digests: DigestSet::new(),
    };
    db.put_response(&failed).await.unwrap();

    let found = db.responses_by_url("https://expired.test/", 10).await.unwrap();
    assert_eq!(found, vec![failed]);
}

#[tokio::test]
async fn responses_after_pages_in_sequence_order() {
    let (db, _dir) = setup_test_db();
    for id in 1..=5 {
        db.put_response(&record("http://page.test/", 100 + id, id, [id as u8; 32]))
            .await
            .unwrap();
    }

    let first = db.responses_after(None, 2).await.unwrap();
    assert_eq!(first.iter().map(|r| r.seq.id).collect::<Vec<_>>(), vec![1, 2]);

    let rest = db.responses_after(Some(first[1].seq), 10).await.unwrap();
    assert_eq!(rest.iter().map(|r| r.seq.id).collect::<Vec<_>>(), vec![3, 4, 5]);

    assert!(db.responses_after(Some(rest[2].seq), 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn high_water_survives_reopen() {
    let (db, dir) = setup_test_db();
    assert_eq!(db.sequence_high_water().await.unwrap(), 0);

    db.put_response(&record("http://a.test/", 1, 17, [1u8; 32])).await.unwrap();
    db.put_response(&record("http://a.test/", 2, 4, [1u8; 32])).await.unwrap();
    assert_eq!(db.sequence_high_water().await.unwrap(), 17);
    drop(db);

    let reopened = ArchiveDb::open(&test_config(&dir)).unwrap();
    assert_eq!(reopened.sequence_high_water().await.unwrap(), 17);
    assert_eq!(reopened.responses_by_url("http://a.test/", 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn in_memory_database_works() {
    let db = ArchiveDb::in_memory().unwrap();
    db.ping().await.unwrap();
    db.put_response(&record("http://mem.test/", 1, 1, [3u8; 32])).await.unwrap();
    assert_eq!(db.responses_by_url("http://mem.test/", 1).await.unwrap().len(), 1);
}
