//! End-to-end drain behavior against a scripted endpoint.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use tally::{
    DeliveryEngine, DeliveryPolicy, ProfileKey, RecordStore, ResultPayload, ResultQueue,
    StatusTracker, SubmitError, SubmitOutcome, Submitter,
};

/// Endpoint double: answers from a script, then with a fixed default, and
/// records every `clientResultId` it is sent.
struct ScriptedSubmitter {
    script: Mutex<VecDeque<bool>>,
    default_ok: bool,
    seen: Mutex<Vec<String>>,
}

impl ScriptedSubmitter {
    fn new(script: &[bool], default_ok: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            default_ok,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn always_failing() -> Arc<Self> {
        Self::new(&[], false)
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Submitter for ScriptedSubmitter {
    async fn submit(&self, payload: &ResultPayload) -> Result<(), SubmitError> {
        self.seen
            .lock()
            .unwrap()
            .push(payload.client_result_id().unwrap_or_default().to_string());

        let ok = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_ok);
        if ok {
            Ok(())
        } else {
            Err(SubmitError::Other {
                message: "endpoint unavailable".to_string(),
            })
        }
    }
}

fn no_wait_policy() -> DeliveryPolicy {
    DeliveryPolicy {
        cooldown: Duration::ZERO,
        inter_record_delay: Duration::ZERO,
        ..Default::default()
    }
}

fn engine_on(
    store: RecordStore,
    submitter: Arc<ScriptedSubmitter>,
    policy: DeliveryPolicy,
) -> DeliveryEngine {
    let queue = ResultQueue::new(store.clone(), StatusTracker::new(store));
    DeliveryEngine::new(queue, submitter, policy)
}

fn engine(submitter: Arc<ScriptedSubmitter>, policy: DeliveryPolicy) -> DeliveryEngine {
    engine_on(
        RecordStore::in_memory(ProfileKey::new("classroom")),
        submitter,
        policy,
    )
}

fn quiz_result(score: i64) -> ResultPayload {
    ResultPayload::default()
        .with_field("userId", 42)
        .with_field("activityId", "fractions-quiz")
        .with_field("score", score)
}

#[tokio::test]
async fn test_fails_twice_then_succeeds() {
    let submitter = ScriptedSubmitter::new(&[false, false, true], true);
    let engine = engine(submitter.clone(), no_wait_policy());

    let id = engine.queue().enqueue(quiz_result(8)).await.unwrap();
    let token = engine.queue().pending().await[0]
        .client_result_id()
        .to_string();
    assert!(!token.is_empty());

    for _ in 0..2 {
        let report = engine.drain().await.unwrap();
        assert_eq!((report.synced, report.failed, report.total), (0, 1, 1));
    }
    let pending = engine.queue().pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].attempts, 2);

    let report = engine.drain().await.unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 0);
    assert!(engine.queue().pending().await.is_empty());

    // Every attempt carried the same idempotency token
    assert_eq!(submitter.seen(), vec![token.clone(), token.clone(), token]);
}

#[tokio::test]
async fn test_evicted_after_five_failures() {
    let submitter = ScriptedSubmitter::always_failing();
    let engine = engine(submitter.clone(), no_wait_policy());
    engine.queue().enqueue(quiz_result(3)).await.unwrap();

    for attempt in 1..=4 {
        let report = engine.drain().await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(report.evicted.is_empty());
        assert_eq!(engine.queue().pending().await[0].attempts, attempt);
    }

    let report = engine.drain().await.unwrap();
    assert_eq!(report.synced, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.evicted.len(), 1);
    assert_eq!(report.evicted[0].record.attempts, 5);
    assert!(engine.queue().pending().await.is_empty());
    assert_eq!(submitter.seen().len(), 5);

    let dead = engine.queue().store().load_evicted().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].last_error.as_deref(), Some("endpoint unavailable"));

    // Nothing left to attempt
    assert_eq!(engine.drain().await.unwrap().total, 0);
    assert_eq!(submitter.seen().len(), 5);
}

#[tokio::test]
async fn test_custom_retry_ceiling() {
    let submitter = ScriptedSubmitter::always_failing();
    let engine = engine(
        submitter,
        DeliveryPolicy {
            max_attempts: 2,
            ..no_wait_policy()
        },
    );
    engine.queue().enqueue(quiz_result(1)).await.unwrap();

    assert!(engine.drain().await.unwrap().evicted.is_empty());
    assert_eq!(engine.drain().await.unwrap().evicted.len(), 1);
    assert!(!engine.queue().has_pending().await);
}

#[tokio::test]
async fn test_cooldown_skips_recent_attempt() {
    let submitter = ScriptedSubmitter::new(&[], true);
    let store = RecordStore::in_memory(ProfileKey::new("classroom"));
    let engine = engine_on(
        store.clone(),
        submitter.clone(),
        DeliveryPolicy {
            inter_record_delay: Duration::ZERO,
            ..Default::default()
        },
    );

    engine.queue().enqueue(quiz_result(1)).await.unwrap();
    engine.queue().enqueue(quiz_result(2)).await.unwrap();

    // Mark the first record as attempted 10 seconds ago
    let mut records = store.load().await;
    records[0].attempts = 1;
    records[0].last_attempt_at = Some(Utc::now() - chrono::Duration::seconds(10));
    store.save(&records).await.unwrap();
    let cooling = records[0].clone();
    let fresh_token = records[1].client_result_id().to_string();

    let report = engine.drain().await.unwrap();
    assert_eq!(report.total, 2);
    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(submitter.seen(), vec![fresh_token]);

    let pending = engine.queue().pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, cooling.id);
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(
        pending[0].last_attempt_at.map(|t| t.timestamp_millis()),
        cooling.last_attempt_at.map(|t| t.timestamp_millis())
    );
}

#[tokio::test]
async fn test_failed_drain_loses_nothing() {
    let submitter = ScriptedSubmitter::always_failing();
    let engine = engine(submitter, no_wait_policy());
    for score in 0..3 {
        engine.queue().enqueue(quiz_result(score)).await.unwrap();
    }
    let before = engine.queue().pending().await;

    let report = engine.drain().await.unwrap();
    assert_eq!(report.failed, 3);

    let after = engine.queue().pending().await;
    assert_eq!(after.len(), before.len());
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old.id, new.id);
        assert_eq!(old.payload, new.payload);
        assert_eq!(new.attempts, old.attempts + 1);
        assert!(new.last_attempt_at.is_some());
    }
    assert_eq!(engine.status().current().await.pending_count, 3);
}

#[tokio::test]
async fn test_pending_count_drops_by_synced() {
    let submitter = ScriptedSubmitter::new(&[true, false, true], true);
    let engine = engine(submitter, no_wait_policy());
    for score in 0..3 {
        engine.queue().enqueue(quiz_result(score)).await.unwrap();
    }
    let before = engine.status().current().await.pending_count;

    let report = engine.drain().await.unwrap();
    assert_eq!(report.synced, 2);

    let status = engine.queue().store().load_status().await;
    assert_eq!(status.pending_count, before - report.synced);
    assert!(!status.is_syncing);
    assert!(status.last_error.is_some());

    // The survivor is the record whose delivery failed
    let pending = engine.queue().pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload.fields()["score"], json!(1));
}

#[tokio::test]
async fn test_mid_drain_enqueue_waits_for_next_cycle() {
    let submitter = ScriptedSubmitter::new(&[], true);
    let engine = Arc::new(engine(submitter.clone(), no_wait_policy()));
    engine.queue().enqueue(quiz_result(1)).await.unwrap();

    let report = engine.drain().await.unwrap();
    engine.queue().enqueue(quiz_result(2)).await.unwrap();

    assert_eq!(report.total, 1);
    assert_eq!(engine.queue().len().await, 1);
    assert_eq!(engine.drain().await.unwrap().synced, 1);
}

#[tokio::test]
async fn test_submit_delivers_immediately() {
    let submitter = ScriptedSubmitter::new(&[], true);
    let engine = engine(submitter.clone(), no_wait_policy());

    let outcome = engine.submit(quiz_result(10)).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Delivered);
    assert!(!engine.queue().has_pending().await);
    assert_eq!(submitter.seen().len(), 1);
}

#[tokio::test]
async fn test_submit_queues_with_the_token_it_sent() {
    let submitter = ScriptedSubmitter::new(&[false], true);
    let engine = engine(submitter.clone(), no_wait_policy());

    let outcome = engine.submit(quiz_result(10)).await.unwrap();
    let SubmitOutcome::Queued(id) = outcome else {
        panic!("expected the result to be queued");
    };

    let pending = engine.queue().pending().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].attempts, 0);
    assert_eq!(pending[0].client_result_id(), submitter.seen()[0]);

    assert_eq!(engine.drain().await.unwrap().synced, 1);
    let seen = submitter.seen();
    assert_eq!(seen[0], seen[1]);
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let dir = TempDir::new().unwrap();
    let url = dir.path().to_str().unwrap();
    let profile = ProfileKey::new("classroom");

    let token = {
        let store = RecordStore::open(url, profile.clone()).await.unwrap();
        let engine = engine_on(store, ScriptedSubmitter::always_failing(), no_wait_policy());
        engine.queue().enqueue(quiz_result(5)).await.unwrap();
        engine.drain().await.unwrap();
        engine.queue().pending().await[0]
            .client_result_id()
            .to_string()
    };

    let submitter = ScriptedSubmitter::new(&[], true);
    let store = RecordStore::open(url, profile).await.unwrap();
    let pending = store.load().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);

    let engine = engine_on(store, submitter.clone(), no_wait_policy());
    assert_eq!(engine.drain().await.unwrap().synced, 1);
    assert_eq!(submitter.seen(), vec![token]);
    assert!(!engine.queue().has_pending().await);
}

#[tokio::test]
async fn test_corrupt_queue_starts_empty() {
    let dir = TempDir::new().unwrap();
    let profile_dir = dir.path().join("classroom");
    std::fs::create_dir_all(&profile_dir).unwrap();
    std::fs::write(profile_dir.join("pending_results.json"), b"\x00\x01garbage").unwrap();

    let store = RecordStore::open(dir.path().to_str().unwrap(), ProfileKey::new("classroom"))
        .await
        .unwrap();
    let submitter = ScriptedSubmitter::new(&[], true);
    let engine = engine_on(store, submitter.clone(), no_wait_policy());

    let report = engine.drain().await.unwrap();
    assert_eq!(report.total, 0);

    engine.queue().enqueue(quiz_result(1)).await.unwrap();
    assert_eq!(engine.drain().await.unwrap().synced, 1);
}
