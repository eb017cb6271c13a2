// crates/tessera-store/tests/archive.rs
//
// Integration tests for the RocksDB archive: registry and commit
// persistence, commit-once, and corruption detection.

use chrono::Utc;
use uuid::Uuid;

use tessera_core::traits::SlotArchive;
use tessera_core::types::{AdjustedScore, Participant, RawScore, Role, SlotCommit};
use tessera_core::{Registry, TesseraError};
use tessera_store::RocksStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a temporary directory path using UUID to avoid conflicts.
fn temp_db_path(label: &str) -> String {
    let dir = std::env::temp_dir();
    dir.join(format!("tessera-{}-{}", label, Uuid::now_v7()))
        .to_string_lossy()
        .to_string()
}

fn commit(slot_id: u64) -> SlotCommit {
    SlotCommit {
        slot_id,
        params_version: 1,
        adjusted: vec![AdjustedScore {
            slot_id,
            miner_id: 10,
            value: 0.774,
            contributing_validator_count: 3,
        }],
        absent_miners: vec![11],
        performances: Vec::new(),
        weights: Vec::new(),
        incentives: Vec::new(),
        trust_deltas: Vec::new(),
        penalties: Vec::new(),
        committed_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_registry_round_trip() {
    let db_path = temp_db_path("registry");
    let store = RocksStore::open(&db_path).unwrap();

    assert!(store.load_registry().await.unwrap().is_none());

    let mut registry = Registry::new();
    registry
        .register(Participant::new(1, Role::Validator, [1u8; 32], 500, 0.9, 0))
        .unwrap();
    registry
        .register(Participant::new(10, Role::Miner, [10u8; 32], 0, 0.4, 0))
        .unwrap();
    store.save_registry(&registry).await.unwrap();

    let loaded = store.load_registry().await.unwrap().unwrap();
    assert_eq!(loaded.len(), 2);
    assert!((loaded.get(1).unwrap().trust - 0.9).abs() < 1e-12);

    drop(store);
    std::fs::remove_dir_all(&db_path).ok();
}

#[tokio::test]
async fn test_commit_is_written_once() {
    let db_path = temp_db_path("commit-once");
    let store = RocksStore::open(&db_path).unwrap();

    store.save_commit(&commit(4)).await.unwrap();
    let again = store.save_commit(&commit(4)).await;
    assert!(matches!(again, Err(TesseraError::AlreadyCommitted(4))));

    let loaded = store.load_commit(4).await.unwrap().unwrap();
    assert_eq!(loaded.absent_miners, vec![11]);
    assert!(store.load_commit(5).await.unwrap().is_none());

    drop(store);
    std::fs::remove_dir_all(&db_path).ok();
}

#[tokio::test]
async fn test_commits_from_are_ordered_and_bounded() {
    let db_path = temp_db_path("commits-from");
    let store = RocksStore::open(&db_path).unwrap();

    for slot in [12, 3, 100, 7] {
        store.save_commit(&commit(slot)).await.unwrap();
    }
    store
        .save_scores(7, &[RawScore::new(7, 10, 1, 0.5)])
        .await
        .unwrap();

    let slots: Vec<u64> = store
        .commits_from(7)
        .unwrap()
        .iter()
        .map(|c| c.slot_id)
        .collect();
    assert_eq!(slots, vec![7, 12, 100]);
    assert_eq!(store.load_scores_sync(7).unwrap().unwrap().len(), 1);

    drop(store);
    std::fs::remove_dir_all(&db_path).ok();
}

#[tokio::test]
async fn test_corrupted_record_is_fatal() {
    let db_path = temp_db_path("corrupt");
    let store = RocksStore::open(&db_path).unwrap();

    store.save_commit(&commit(2)).await.unwrap();
    store.verify().await.unwrap();

    let key = b"commit:00000000000000000002";
    let mut bytes = store.get_bytes(key).unwrap().unwrap();
    let last = bytes.len() - 2;
    bytes[last] ^= 0x20;
    store.put_bytes(key, &bytes).unwrap();

    let err = store.verify().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, TesseraError::Corruption(_)));
    assert!(matches!(
        store.load_commit(2).await,
        Err(TesseraError::Corruption(_))
    ));

    drop(store);
    std::fs::remove_dir_all(&db_path).ok();
}
