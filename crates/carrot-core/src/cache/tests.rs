//! Tests for the durable request queue.

use serde_json::{Map, Value, json};
use tempfile::TempDir;

use super::*;

/// Helper to create a temporary on-disk cache for testing.
fn temp_cache() -> (RequestCache, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("carrot.db");
    let cache = RequestCache::open(&path).expect("failed to open cache");
    (cache, dir)
}

fn achievement_parameters(id: &str) -> Map<String, Value> {
    let mut parameters = Map::new();
    parameters.insert("achievement_id".to_string(), json!(id));
    parameters
}

#[test]
fn enqueue_assigns_cache_id_and_stamps_metadata() {
    let (cache, _dir) = temp_cache();

    let record = cache.enqueue("/me/achievements.json", achievement_parameters("chicken"));

    assert!(record.cache_id.is_some());
    assert_eq!(record.retry_count, 0);
    assert!(!record.request_id.is_empty());
    assert!(record.request_date > 0);
}

#[test]
fn enqueue_then_list_round_trips_the_record() {
    let (cache, _dir) = temp_cache();

    let enqueued = cache.enqueue("/me/scores.json", achievement_parameters("chicken"));
    let pending = cache.list_pending();
    assert_eq!(pending.len(), 1);

    let found = pending
        .iter()
        .find(|record| record.request_id == enqueued.request_id)
        .expect("record by request_id");
    assert_eq!(found.endpoint, enqueued.endpoint);
    assert_eq!(found.parameters, enqueued.parameters);
    assert_eq!(found.request_date, enqueued.request_date);
    assert_eq!(found.cache_id, enqueued.cache_id);
}

#[test]
fn list_pending_orders_by_ascending_retry_count() {
    let (cache, _dir) = temp_cache();

    let never_failed = cache.enqueue("/me/like.json", Map::new());
    let failed_twice = cache.enqueue("/me/actions.json", Map::new());
    let failed_once = cache.enqueue("/me/scores.json", Map::new());

    let twice_id = failed_twice.cache_id.expect("cache id");
    assert!(cache.increment_retry(twice_id));
    assert!(cache.increment_retry(twice_id));
    assert!(cache.increment_retry(failed_once.cache_id.expect("cache id")));

    let pending = cache.list_pending();
    let retries: Vec<u32> = pending.iter().map(|record| record.retry_count).collect();
    assert_eq!(retries, vec![0, 1, 2]);
    assert_eq!(pending[0].request_id, never_failed.request_id);
    assert_eq!(pending[1].request_id, failed_once.request_id);
    assert_eq!(pending[2].request_id, failed_twice.request_id);
}

#[test]
fn remove_is_terminal_and_idempotent() {
    let (cache, _dir) = temp_cache();

    let record = cache.enqueue("/me/achievements.json", Map::new());
    let cache_id = record.cache_id.expect("cache id");

    assert!(cache.remove(cache_id));
    assert!(cache.list_pending().is_empty());

    // Removing again is a no-op, not an error, and state is unchanged.
    assert!(cache.remove(cache_id));
    assert!(cache.list_pending().is_empty());
}

#[test]
fn increment_retry_on_missing_row_reports_false() {
    let (cache, _dir) = temp_cache();
    assert!(!cache.increment_retry(9999));
}

#[test]
fn rows_survive_reopening_the_database() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("carrot.db");

    let enqueued = {
        let cache = RequestCache::open(&path).expect("failed to open cache");
        cache.enqueue("/me/achievements.json", achievement_parameters("chicken"))
    };

    let reopened = RequestCache::open(&path).expect("failed to reopen cache");
    let pending = reopened.list_pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request_id, enqueued.request_id);
    assert_eq!(pending[0].parameters, enqueued.parameters);
}

#[test]
fn disabled_cache_passes_through_without_queuing() {
    let cache = RequestCache::disabled();
    assert!(!cache.is_enabled());

    let record = cache.enqueue("/me/achievements.json", achievement_parameters("chicken"));
    assert!(record.cache_id.is_none());
    assert!(!record.request_id.is_empty());

    assert!(cache.list_pending().is_empty());
    assert!(!cache.remove(1));
    assert!(!cache.increment_retry(1));
}

#[test]
fn open_or_disabled_degrades_on_unopenable_path() {
    let dir = TempDir::new().expect("failed to create temp dir");
    // A directory is not a valid database file.
    let cache = RequestCache::open_or_disabled(Some(dir.path()));
    assert!(!cache.is_enabled());
}

#[test]
fn display_shows_cache_id_request_id_and_endpoint() {
    let (cache, _dir) = temp_cache();

    let record = cache.enqueue("/me/achievements.json", Map::new());
    let cache_id = record.cache_id.expect("cache id");
    assert_eq!(
        record.to_string(),
        format!("[{cache_id}] {} - /me/achievements.json", record.request_id)
    );

    let unpersisted = RequestCache::disabled().enqueue("/me/scores.json", Map::new());
    assert_eq!(
        unpersisted.to_string(),
        format!("[-] {} - /me/scores.json", unpersisted.request_id)
    );
}

#[test]
fn in_memory_cache_is_durable_within_the_process() {
    let cache = RequestCache::in_memory().expect("in-memory cache");
    cache.enqueue("/me/scores.json", Map::new());
    assert_eq!(cache.list_pending().len(), 1);
}
