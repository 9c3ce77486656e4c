use std::sync::Arc;

use chrono::Utc;
use runtime_types::{Checkpoint, Run, RunStatus};
use state_store::{memory::InMemoryCache, memory::InMemoryStore, HybridStore, RunFilter, StateStore};

#[tokio::test]
async fn save_run_load_run_round_trip_up_to_normalization() {
    let store = HybridStore::new(Arc::new(InMemoryStore::new()), Some(Arc::new(InMemoryCache::new())));
    let run = Run::new("run-1", "session-1", "hello", Utc::now());
    store.save_run(run.clone()).await.unwrap();

    let loaded = store.load_run("run-1").await.unwrap();
    assert_eq!(loaded.run_id, run.run_id);
    assert_eq!(loaded.session_id, run.session_id);
    assert_eq!(loaded.status, RunStatus::Queued);
}

#[tokio::test]
async fn second_save_wins_but_preserves_created_at() {
    let store = HybridStore::durable_only(Arc::new(InMemoryStore::new()));
    let t0 = Utc::now();
    let run = Run::new("run-1", "session-1", "hello", t0);
    store.save_run(run.clone()).await.unwrap();

    let mut updated = run.clone();
    updated.status = RunStatus::Completed;
    updated.output = "done".to_string();
    updated.updated_at = t0 + chrono::Duration::seconds(30);
    store.save_run(updated).await.unwrap();

    let loaded = store.load_run("run-1").await.unwrap();
    assert_eq!(loaded.status, RunStatus::Completed);
    assert_eq!(loaded.output, "done");
    assert_eq!(loaded.created_at.timestamp(), t0.timestamp());
}

#[tokio::test]
async fn duplicate_checkpoint_seq_returns_conflict() {
    let store = HybridStore::durable_only(Arc::new(InMemoryStore::new()));
    let cp = Checkpoint::new("run-1", 1, "node-a", serde_json::json!({"k": "v"}), Utc::now());
    store.save_checkpoint(cp.clone()).await.unwrap();

    let err = store.save_checkpoint(cp).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn lock_acquire_release_matches_spec_sequence() {
    let store = HybridStore::durable_only(Arc::new(InMemoryStore::new()));
    let ttl = std::time::Duration::from_secs(30);

    assert!(store.acquire_run_lock("run-1", "worker-a", ttl).await.unwrap());
    assert!(!store.acquire_run_lock("run-1", "worker-b", ttl).await.unwrap());
    store.release_run_lock("run-1", "worker-b").await.unwrap();
    assert!(!store.acquire_run_lock("run-1", "worker-c", ttl).await.unwrap());
    store.release_run_lock("run-1", "worker-a").await.unwrap();
    assert!(store.acquire_run_lock("run-1", "worker-d", ttl).await.unwrap());
}

#[tokio::test]
async fn list_runs_filters_by_session_and_status() {
    let store = HybridStore::durable_only(Arc::new(InMemoryStore::new()));
    let mut completed = Run::new("run-1", "session-a", "hi", Utc::now());
    completed.status = RunStatus::Completed;
    store.save_run(completed).await.unwrap();
    store.save_run(Run::new("run-2", "session-a", "hi", Utc::now())).await.unwrap();
    store.save_run(Run::new("run-3", "session-b", "hi", Utc::now())).await.unwrap();

    let filter = RunFilter::new().with_session("session-a").with_status(RunStatus::Completed);
    let runs = store.list_runs(&filter).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, "run-1");
}
