use std::sync::Arc;

use hasharchive_core::{
    AppError, CrawlQueue, DuplicatePolicy, EnqueueOutcome, HashAlgo, QueueEntry, QueueStore,
    ResponseStore, Seq, SequenceAllocator,
};

use crate::common::{record, setup_test_db};

fn entry(time: u64, id: u64, url: &str) -> QueueEntry {
    QueueEntry {
        seq: Seq::new(time, id),
        url: url.to_string(),
        client: "tester".to_string(),
    }
}

#[tokio::test]
async fn queue_is_fifo_by_sequence() {
    let (db, _dir) = setup_test_db();
    db.put_queue_entry(&entry(20, 2, "http://b.test/"), DuplicatePolicy::Allow).await.unwrap();
    db.put_queue_entry(&entry(10, 3, "http://c.test/"), DuplicatePolicy::Allow).await.unwrap();
    db.put_queue_entry(&entry(20, 1, "http://a.test/"), DuplicatePolicy::Allow).await.unwrap();

    let urls: Vec<String> = db
        .queued_entries(10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.url)
        .collect();
    assert_eq!(urls, vec!["http://c.test/", "http://a.test/", "http://b.test/"]);
}

#[tokio::test]
async fn next_queue_entry_skips_past_cursor() {
    let (db, _dir) = setup_test_db();
    let first = entry(10, 1, "http://a.test/");
    let second = entry(10, 2, "http://b.test/");
    db.put_queue_entry(&first, DuplicatePolicy::Allow).await.unwrap();
    db.put_queue_entry(&second, DuplicatePolicy::Allow).await.unwrap();

    assert_eq!(db.next_queue_entry(None).await.unwrap(), Some(first.clone()));
    assert_eq!(db.next_queue_entry(Some(first.seq)).await.unwrap(), Some(second.clone()));
    assert_eq!(db.next_queue_entry(Some(second.seq)).await.unwrap(), None);
}

#[tokio::test]
async fn skip_queued_policy_suppresses_duplicates() {
    let (db, _dir) = setup_test_db();
    let outcome = db
        .put_queue_entry(&entry(1, 1, "http://dup.test/"), DuplicatePolicy::SkipQueued)
        .await
        .unwrap();
    assert_eq!(outcome, EnqueueOutcome::Queued);

    let outcome = db
        .put_queue_entry(&entry(2, 2, "http://dup.test/"), DuplicatePolicy::SkipQueued)
        .await
        .unwrap();
    assert_eq!(outcome, EnqueueOutcome::AlreadyQueued);

    let outcome = db
        .put_queue_entry(&entry(3, 3, "http://dup.test/"), DuplicatePolicy::Allow)
        .await
        .unwrap();
    assert_eq!(outcome, EnqueueOutcome::Queued);
    assert_eq!(db.queued_entries(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn skip_queued_tracks_entries_leaving_the_queue() {
    let (db, _dir) = setup_test_db();
    let first = entry(1, 1, "http://again.test/");
    let second = entry(2, 2, "http://again.test/");
    db.put_queue_entry(&first, DuplicatePolicy::Allow).await.unwrap();
    db.put_queue_entry(&second, DuplicatePolicy::Allow).await.unwrap();
    // A different URL sharing the prefix does not count as queued.
    db.put_queue_entry(&entry(3, 3, "http://again.test/x"), DuplicatePolicy::Allow)
        .await
        .unwrap();

    db.commit_fetch(&first, &record("http://again.test/", 4, 4, [2u8; 32]))
        .await
        .unwrap();
    let outcome = db
        .put_queue_entry(&entry(5, 5, "http://again.test/"), DuplicatePolicy::SkipQueued)
        .await
        .unwrap();
    assert_eq!(outcome, EnqueueOutcome::AlreadyQueued);

    assert!(db.delete_queue_entry(&second).await.unwrap());
    let outcome = db
        .put_queue_entry(&entry(6, 6, "http://again.test/"), DuplicatePolicy::SkipQueued)
        .await
        .unwrap();
    assert_eq!(outcome, EnqueueOutcome::Queued);

    let urls: Vec<String> = db
        .queued_entries(10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.url)
        .collect();
    assert_eq!(urls, vec!["http://again.test/x", "http://again.test/"]);
}

#[tokio::test]
async fn duplicate_queue_sequence_is_a_conflict() {
    let (db, _dir) = setup_test_db();
    db.put_queue_entry(&entry(1, 1, "http://a.test/"), DuplicatePolicy::Allow).await.unwrap();
    let err = db
        .put_queue_entry(&entry(1, 1, "http://b.test/"), DuplicatePolicy::Allow)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict { time: 1, id: 1 }));
}

#[tokio::test]
async fn commit_fetch_hands_off_atomically() {
    let (db, _dir) = setup_test_db();
    let queued = entry(10, 1, "http://handoff.test/");
    db.put_queue_entry(&queued, DuplicatePolicy::Allow).await.unwrap();

    let rec = record("http://handoff.test/", 11, 2, [8u8; 32]);
    db.commit_fetch(&queued, &rec).await.unwrap();

    assert!(db.queued_entries(10).await.unwrap().is_empty());
    assert_eq!(db.responses_by_url("http://handoff.test/", 10).await.unwrap(), vec![rec]);
    assert_eq!(db.sequence_high_water().await.unwrap(), 2);
}

#[tokio::test]
async fn failed_commit_leaves_entry_queued() {
    let (db, _dir) = setup_test_db();
    db.put_response(&record("http://other.test/", 11, 2, [1u8; 32])).await.unwrap();

    let queued = entry(10, 1, "http://handoff.test/");
    db.put_queue_entry(&queued, DuplicatePolicy::Allow).await.unwrap();

    // Same sequence as the existing record: the whole transaction rolls back.
    let clash = record("http://handoff.test/", 11, 2, [9u8; 32]);
    let err = db.commit_fetch(&queued, &clash).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict { .. }));

    assert_eq!(db.queued_entries(10).await.unwrap(), vec![queued]);
    assert!(db.responses_by_url("http://handoff.test/", 10).await.unwrap().is_empty());
    assert!(db.responses_by_hash(HashAlgo::Sha256, &[9u8; 32], 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn commit_fetch_requires_queued_entry() {
    let (db, _dir) = setup_test_db();
    let missing = entry(10, 1, "http://gone.test/");
    let err = db
        .commit_fetch(&missing, &record("http://gone.test/", 11, 2, [1u8; 32]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(db.responses_after(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_queue_entry_reports_presence() {
    let (db, _dir) = setup_test_db();
    let queued = entry(10, 1, "http://a.test/");
    db.put_queue_entry(&queued, DuplicatePolicy::Allow).await.unwrap();

    assert!(db.delete_queue_entry(&queued).await.unwrap());
    assert!(!db.delete_queue_entry(&queued).await.unwrap());
}

#[tokio::test]
async fn concurrent_enqueues_get_distinct_sequences() {
    let (db, _dir) = setup_test_db();
    let queue = Arc::new(CrawlQueue::new(
        db.clone(),
        Arc::new(SequenceAllocator::default()),
        DuplicatePolicy::Allow,
    ));

    let mut handles = Vec::new();
    for i in 0..16 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            queue.enqueue(500, &format!("http://n{i}.test/"), "").await.unwrap()
        }));
    }
    let mut seqs = Vec::new();
    for handle in handles {
        seqs.push(handle.await.unwrap().seq);
    }
    seqs.sort();
    seqs.dedup();
    assert_eq!(seqs.len(), 16);

    let queued = db.queued_entries(100).await.unwrap();
    assert_eq!(queued.len(), 16);
    assert!(queued.windows(2).all(|w| w[0].seq < w[1].seq));
}
