/// Pipeline tests against an in-memory SQLite store.
///
/// Covers the end-to-end scenarios, duplicate handling under sequential
/// and concurrent delivery, and the failure paths of each stage.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::json;

use postvault_db::Database;
use postvault_ingest::{
    Coordinator, CoordinatorConfig, Disposition, IdempotentWriter, OutcomeSink, PostStore,
    normalize,
};
use postvault_types::events::Update;
use postvault_types::models::{
    FailureReason, IngestOutcome, IngestReport, InsertOutcome, PostRecord,
};

// -- Helpers --

#[derive(Default)]
struct RecordingSink {
    reports: Mutex<Vec<IngestReport>>,
}

impl RecordingSink {
    fn outcomes(&self) -> Vec<IngestOutcome> {
        self.reports.lock().unwrap().iter().map(|r| r.outcome).collect()
    }
}

impl OutcomeSink for RecordingSink {
    fn report(&self, report: &IngestReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

/// Wraps the real store, counting calls and optionally failing them.
struct ProbeStore {
    db: Arc<Database>,
    fail_exists: bool,
    fail_insert: bool,
    insert_delay: Option<Duration>,
    exists_calls: AtomicUsize,
    insert_calls: AtomicUsize,
}

impl ProbeStore {
    fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            fail_exists: false,
            fail_insert: false,
            insert_delay: None,
            exists_calls: AtomicUsize::new(0),
            insert_calls: AtomicUsize::new(0),
        }
    }
}

impl PostStore for ProbeStore {
    fn exists_by_identity(&self, channel_id: &str, message_id: &str) -> Result<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_exists {
            return Err(anyhow!("connection refused"));
        }
        self.db.exists_by_identity(channel_id, message_id)
    }

    fn insert_if_absent(&self, record: &PostRecord) -> Result<InsertOutcome> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.insert_delay {
            std::thread::sleep(delay);
        }
        if self.fail_insert {
            return Err(anyhow!("disk I/O error"));
        }
        self.db.insert_post(record)
    }

    fn count_posts(&self) -> Result<u64> {
        self.db.count_posts()
    }
}

/// Lookups always miss, and each lookup waits until the other concurrent
/// one has run, so both attempts reach the writer.
struct StaleStore {
    db: Arc<Database>,
    barrier: Barrier,
    inserts: Mutex<Vec<InsertOutcome>>,
}

impl PostStore for StaleStore {
    fn exists_by_identity(&self, _channel_id: &str, _message_id: &str) -> Result<bool> {
        self.barrier.wait();
        Ok(false)
    }

    fn insert_if_absent(&self, record: &PostRecord) -> Result<InsertOutcome> {
        let outcome = self.db.insert_post(record)?;
        self.inserts.lock().unwrap().push(outcome);
        Ok(outcome)
    }

    fn count_posts(&self) -> Result<u64> {
        self.db.count_posts()
    }
}

fn pipeline(store: Arc<dyn PostStore>) -> (Coordinator, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let coordinator = Coordinator::new(store, sink.clone(), CoordinatorConfig::default());
    (coordinator, sink)
}

fn channel_post(update_id: i64, post: serde_json::Value) -> Update {
    serde_json::from_value(json!({ "update_id": update_id, "channel_post": post })).unwrap()
}

fn text_update(update_id: i64, message_id: &str, channel_id: &str) -> Update {
    channel_post(
        update_id,
        json!({ "message_id": message_id, "chat": { "id": channel_id }, "text": "hi" }),
    )
}

// -- End-to-end scenarios --

#[tokio::test]
async fn stores_text_post() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (coordinator, sink) = pipeline(db.clone());

    let update = channel_post(
        1,
        json!({
            "message_id": 7,
            "chat": { "id": 555, "type": "channel" },
            "text": "Hello world",
            "views": 12,
            "date": 1700000000
        }),
    );

    assert_eq!(
        coordinator.submit(update).await,
        Disposition::Processed(IngestOutcome::Ingested)
    );

    let row = db.get_post("555", "7").unwrap().unwrap();
    assert_eq!(row.telegram_message_id, "7");
    assert_eq!(row.telegram_channel_id, "555");
    assert_eq!(row.message, "Hello world");
    assert_eq!(row.views, 12);
    assert_eq!(row.media_url, None);
    assert_eq!(row.media_type, None);
    assert_eq!(row.date_posted.as_deref(), Some("2023-11-14T22:13:20Z"));

    let reports = sink.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].channel_id, "555");
    assert_eq!(reports[0].message_id, "7");
}

#[tokio::test]
async fn stores_captioned_photo() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (coordinator, _sink) = pipeline(db.clone());

    let update = channel_post(
        2,
        json!({
            "message_id": 8,
            "chat": { "id": 555 },
            "caption": "pic",
            "photo": [{ "file_id": "abc" }]
        }),
    );
    coordinator.submit(update).await;

    let row = db.get_post("555", "8").unwrap().unwrap();
    assert_eq!(row.message, "pic");
    assert_eq!(row.media_url.as_deref(), Some("photo_abc"));
    assert_eq!(row.media_type.as_deref(), Some("photo"));
    assert_eq!(row.views, 0);
    assert_eq!(row.date_posted, None);
}

#[tokio::test]
async fn photo_wins_over_video() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (coordinator, _sink) = pipeline(db.clone());

    let update = channel_post(
        3,
        json!({
            "message_id": 9,
            "chat": { "id": 555 },
            "photo": [{ "file_id": "small" }, { "file_id": "big" }],
            "video": { "file_id": "clip" }
        }),
    );
    coordinator.submit(update).await;

    let row = db.get_post("555", "9").unwrap().unwrap();
    assert_eq!(row.media_type.as_deref(), Some("photo"));
    assert_eq!(row.media_url.as_deref(), Some("photo_big"));
    assert_eq!(row.message, "");
}

#[tokio::test]
async fn long_text_is_truncated() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (coordinator, _sink) = pipeline(db.clone());

    let text: String = ('a'..='z').cycle().take(6000).collect();
    let update = channel_post(
        4,
        json!({ "message_id": 10, "chat": { "id": 555 }, "text": text }),
    );
    coordinator.submit(update).await;

    let row = db.get_post("555", "10").unwrap().unwrap();
    assert_eq!(row.message.chars().count(), 5000);
    assert_eq!(row.message, text[..5000]);
}

// -- Duplicates --

#[tokio::test]
async fn redelivery_is_skipped() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (coordinator, sink) = pipeline(db.clone());

    let first = coordinator.submit(text_update(1, "42", "100")).await;
    let second = coordinator.submit(text_update(2, "42", "100")).await;

    assert_eq!(first, Disposition::Processed(IngestOutcome::Ingested));
    assert_eq!(second, Disposition::Processed(IngestOutcome::SkippedDuplicate));
    assert_eq!(db.count_posts().unwrap(), 1);
    assert_eq!(
        sink.outcomes(),
        vec![IngestOutcome::Ingested, IngestOutcome::SkippedDuplicate]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redelivery_stores_once() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (coordinator, _sink) = pipeline(db.clone());

    let (a, b) = tokio::join!(
        coordinator.submit(text_update(1, "42", "100")),
        coordinator.submit(text_update(2, "42", "100")),
    );

    let mut outcomes = vec![a, b];
    outcomes.sort_by_key(|d| format!("{:?}", d));
    assert_eq!(
        outcomes,
        vec![
            Disposition::Processed(IngestOutcome::Ingested),
            Disposition::Processed(IngestOutcome::SkippedDuplicate),
        ]
    );
    assert_eq!(db.count_posts().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_writers_hit_unique_constraint() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store = Arc::new(StaleStore {
        db: db.clone(),
        barrier: Barrier::new(2),
        inserts: Mutex::new(Vec::new()),
    });
    let (coordinator, sink) = pipeline(store.clone());

    let (a, b) = tokio::join!(
        coordinator.submit(text_update(1, "42", "100")),
        coordinator.submit(text_update(2, "42", "100")),
    );
    assert!(!a.needs_redelivery());
    assert!(!b.needs_redelivery());

    let mut inserts = store.inserts.lock().unwrap().clone();
    inserts.sort_by_key(|o| format!("{:?}", o));
    assert_eq!(inserts, vec![InsertOutcome::AlreadyExists, InsertOutcome::Inserted]);

    let mut outcomes = sink.outcomes();
    outcomes.sort_by_key(|o| o.tag());
    assert_eq!(
        outcomes,
        vec![IngestOutcome::Ingested, IngestOutcome::SkippedDuplicate]
    );
    assert_eq!(db.count_posts().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn writer_treats_constraint_violation_as_present() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let writer = IdempotentWriter::new(db.clone());

    let update = text_update(1, "42", "100");
    let record = normalize(update.channel_post.as_ref().unwrap()).unwrap();

    let (a, b) = tokio::join!(writer.write(record.clone()), writer.write(record));
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| format!("{:?}", o));

    assert_eq!(outcomes, vec![InsertOutcome::AlreadyExists, InsertOutcome::Inserted]);
    assert_eq!(db.count_posts().unwrap(), 1);
}

// -- Failure paths --

#[tokio::test]
async fn contentless_post_is_rejected_without_store_access() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store = Arc::new(ProbeStore::new(db.clone()));
    let (coordinator, sink) = pipeline(store.clone());

    let update = channel_post(1, json!({ "message_id": 5, "chat": { "id": 555 } }));
    assert_eq!(
        coordinator.submit(update).await,
        Disposition::Processed(IngestOutcome::RejectedMalformed)
    );

    assert_eq!(store.exists_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.insert_calls.load(Ordering::SeqCst), 0);
    assert_eq!(sink.outcomes(), vec![IngestOutcome::RejectedMalformed]);
}

#[tokio::test]
async fn unavailable_store_is_not_treated_as_not_found() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let mut probe = ProbeStore::new(db.clone());
    probe.fail_exists = true;
    let store = Arc::new(probe);
    let (coordinator, _sink) = pipeline(store.clone());

    let disposition = coordinator.submit(text_update(1, "1", "555")).await;
    assert_eq!(
        disposition,
        Disposition::Processed(IngestOutcome::Failed(FailureReason::StoreUnavailable))
    );
    assert!(disposition.needs_redelivery());
    assert_eq!(store.insert_calls.load(Ordering::SeqCst), 0);
    assert_eq!(db.count_posts().unwrap(), 0);
}

#[tokio::test]
async fn write_failure_is_reported() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let mut probe = ProbeStore::new(db.clone());
    probe.fail_insert = true;
    let (coordinator, sink) = pipeline(Arc::new(probe));

    let disposition = coordinator.submit(text_update(1, "1", "555")).await;
    assert_eq!(
        disposition,
        Disposition::Processed(IngestOutcome::Failed(FailureReason::StoreWrite))
    );
    assert_eq!(
        sink.outcomes(),
        vec![IngestOutcome::Failed(FailureReason::StoreWrite)]
    );

    // A later delivery after the store recovers still goes through
    let (healthy, _) = pipeline(db.clone());
    assert_eq!(
        healthy.submit(text_update(2, "1", "555")).await,
        Disposition::Processed(IngestOutcome::Ingested)
    );
}

// -- Filtering, batching, shutdown --

#[tokio::test]
async fn ignores_edits_direct_messages_and_other_channels() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let sink = Arc::new(RecordingSink::default());
    let coordinator = Coordinator::new(
        db.clone(),
        sink.clone(),
        CoordinatorConfig {
            allowed_channel_id: Some("-100".into()),
            ..Default::default()
        },
    );

    let edited: Update = serde_json::from_value(json!({
        "update_id": 1,
        "edited_channel_post": { "message_id": 1, "chat": { "id": -100 }, "text": "edit" }
    }))
    .unwrap();
    let direct: Update = serde_json::from_value(json!({
        "update_id": 2,
        "message": { "message_id": 1, "chat": { "id": 77 }, "text": "/status" }
    }))
    .unwrap();

    assert_eq!(coordinator.submit(edited).await, Disposition::Ignored);
    assert_eq!(coordinator.submit(direct).await, Disposition::Ignored);
    assert_eq!(
        coordinator.submit(text_update(3, "1", "-200")).await,
        Disposition::Ignored
    );
    assert_eq!(
        coordinator.submit(text_update(4, "1", "-100")).await,
        Disposition::Processed(IngestOutcome::Ingested)
    );

    assert_eq!(sink.outcomes(), vec![IngestOutcome::Ingested]);
    assert_eq!(db.count_posts().unwrap(), 1);
}

#[tokio::test]
async fn batch_results_follow_input_order() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (coordinator, _sink) = pipeline(db.clone());

    let empty = channel_post(11, json!({ "message_id": 3, "chat": { "id": 1 } }));
    let results = coordinator
        .ingest_batch(vec![
            text_update(10, "1", "1"),
            empty,
            text_update(12, "2", "1"),
        ])
        .await;

    let ids: Vec<i64> = results.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![10, 11, 12]);
    assert_eq!(results[1].1, Disposition::Processed(IngestOutcome::RejectedMalformed));
    assert!(results.iter().all(|(_, d)| !d.needs_redelivery()));
    assert_eq!(coordinator.stored_count().await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_waits_for_in_flight_writes() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let mut probe = ProbeStore::new(db.clone());
    probe.insert_delay = Some(Duration::from_millis(200));
    let (coordinator, _sink) = pipeline(Arc::new(probe));

    let handle = coordinator.spawn(text_update(1, "1", "555")).unwrap();
    drop(handle);

    // Let the task reach the slow insert before shutting down
    tokio::time::sleep(Duration::from_millis(50)).await;
    coordinator.shutdown().await;

    assert_eq!(db.count_posts().unwrap(), 1);
    assert_eq!(
        coordinator.submit(text_update(2, "2", "555")).await,
        Disposition::NotAccepted
    );
    assert!(Disposition::NotAccepted.needs_redelivery());
}

#[tokio::test]
async fn shutdown_waits_for_updates_not_yet_started() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let (coordinator, _sink) = pipeline(db.clone());

    // On the current-thread runtime none of these run before shutdown
    let handles: Vec<_> = (1..=3)
        .map(|i| coordinator.spawn(text_update(i, &i.to_string(), "555")).unwrap())
        .collect();
    coordinator.shutdown().await;

    assert_eq!(db.count_posts().unwrap(), 3);
    for handle in handles {
        assert_eq!(
            handle.await.unwrap(),
            Disposition::Processed(IngestOutcome::Ingested)
        );
    }
}

#[tokio::test]
async fn updates_after_shutdown_never_reach_the_store() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let probe = Arc::new(ProbeStore::new(db.clone()));
    let (coordinator, _sink) = pipeline(probe.clone());

    coordinator.shutdown().await;

    assert!(coordinator.spawn(text_update(1, "1", "555")).is_none());
    let results = coordinator.ingest_batch(vec![text_update(2, "2", "555")]).await;
    assert_eq!(results, vec![(2, Disposition::NotAccepted)]);
    assert_eq!(probe.exists_calls.load(Ordering::SeqCst), 0);
    assert_eq!(probe.insert_calls.load(Ordering::SeqCst), 0);
}
