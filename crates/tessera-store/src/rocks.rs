// crates/tessera-store/src/rocks.rs
//
// RocksDB-backed archive for registry snapshots, the parameter schedule,
// frozen raw scores and slot commits.
//
// Key format:
//   - `registry`            -> latest registry snapshot
//   - `schedule`            -> every known ConsensusParams version
//   - `scores:{slot:020}`   -> frozen raw scores of a slot
//   - `commit:{slot:020}`   -> SlotCommit of a committed slot
//
// Every value is `sha256(payload) || payload` with a JSON payload. A digest
// mismatch on read is reported as `TesseraError::Corruption`.

use async_trait::async_trait;
use rocksdb::{DBWithThreadMode, MultiThreaded, Options};
use serde::de::DeserializeOwned;
use serde::Serialize;

use tessera_core::crypto::digest;
use tessera_core::error::TesseraError;
use tessera_core::params::ParamSchedule;
use tessera_core::registry::Registry;
use tessera_core::traits::SlotArchive;
use tessera_core::types::{RawScore, SlotCommit, SlotId};

const REGISTRY_KEY: &[u8] = b"registry";
const SCHEDULE_KEY: &[u8] = b"schedule";
const SCORES_PREFIX: &str = "scores:";
const COMMIT_PREFIX: &str = "commit:";
const DIGEST_LEN: usize = 32;

/// RocksDB wrapper implementing [`SlotArchive`].
#[derive(Debug)]
pub struct RocksStore {
    db: DBWithThreadMode<MultiThreaded>,
}

impl RocksStore {
    /// Open (or create) a database at `path`.
    pub fn open(path: &str) -> Result<Self, TesseraError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, path).map_err(|e| {
            TesseraError::Storage(format!("Failed to open RocksDB at {}: {}", path, e))
        })?;

        Ok(Self { db })
    }

    fn scores_key(slot_id: SlotId) -> Vec<u8> {
        format!("{}{:020}", SCORES_PREFIX, slot_id).into_bytes()
    }

    fn commit_key(slot_id: SlotId) -> Vec<u8> {
        format!("{}{:020}", COMMIT_PREFIX, slot_id).into_bytes()
    }

    /// Store raw bytes under an arbitrary key, bypassing the checksum envelope.
    pub fn put_bytes(&self, key: &[u8], value: &[u8]) -> Result<(), TesseraError> {
        self.db
            .put(key, value)
            .map_err(|e| TesseraError::Storage(format!("RocksDB put failed: {}", e)))
    }

    /// Read raw bytes by key.
    pub fn get_bytes(&self, key: &[u8]) -> Result<Option<Vec<u8>>, TesseraError> {
        self.db
            .get(key)
            .map_err(|e| TesseraError::Storage(format!("RocksDB get failed: {}", e)))
    }

    fn put_sealed<T: Serialize>(&self, key: &[u8], value: &T) -> Result<(), TesseraError> {
        let payload = serde_json::to_vec(value)?;
        self.put_bytes(key, &seal(&payload))
    }

    fn get_sealed<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, TesseraError> {
        match self.get_bytes(key)? {
            Some(bytes) => {
                let payload = unseal(key, &bytes)?;
                Ok(Some(serde_json::from_slice(payload)?))
            }
            None => Ok(None),
        }
    }

    /// Every commit at or after `from`, oldest first.
    pub fn commits_from(&self, from: SlotId) -> Result<Vec<SlotCommit>, TesseraError> {
        let start = Self::commit_key(from);
        let mut commits = Vec::new();

        let iter = self.db.iterator(rocksdb::IteratorMode::From(
            &start,
            rocksdb::Direction::Forward,
        ));
        for item in iter {
            let (key, value) = item
                .map_err(|e| TesseraError::Storage(format!("RocksDB iteration error: {}", e)))?;
            if !key.starts_with(COMMIT_PREFIX.as_bytes()) {
                break;
            }
            let payload = unseal(&key, &value)?;
            commits.push(serde_json::from_slice(payload)?);
        }

        Ok(commits)
    }

    /// Blocking read of a slot's frozen scores.
    pub fn load_scores_sync(&self, slot_id: SlotId) -> Result<Option<Vec<RawScore>>, TesseraError> {
        self.get_sealed(&Self::scores_key(slot_id))
    }

    /// Check the digest of every stored value.
    pub fn verify_all(&self) -> Result<usize, TesseraError> {
        let mut checked = 0;
        for item in self.db.iterator(rocksdb::IteratorMode::Start) {
            let (key, value) = item
                .map_err(|e| TesseraError::Storage(format!("RocksDB iteration error: {}", e)))?;
            unseal(&key, &value)?;
            checked += 1;
        }
        Ok(checked)
    }
}

fn seal(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(DIGEST_LEN + payload.len());
    out.extend_from_slice(&digest(payload));
    out.extend_from_slice(payload);
    out
}

fn unseal<'a>(key: &[u8], bytes: &'a [u8]) -> Result<&'a [u8], TesseraError> {
    if bytes.len() < DIGEST_LEN {
        return Err(TesseraError::Corruption(format!(
            "record {} is truncated ({} bytes)",
            String::from_utf8_lossy(key),
            bytes.len()
        )));
    }
    let (stored, payload) = bytes.split_at(DIGEST_LEN);
    if stored != digest(payload) {
        return Err(TesseraError::Corruption(format!(
            "checksum mismatch for record {}",
            String::from_utf8_lossy(key)
        )));
    }
    Ok(payload)
}

#[async_trait]
impl SlotArchive for RocksStore {
    async fn save_registry(&self, registry: &Registry) -> Result<(), TesseraError> {
        self.put_sealed(REGISTRY_KEY, registry)
    }

    async fn load_registry(&self) -> Result<Option<Registry>, TesseraError> {
        self.get_sealed(REGISTRY_KEY)
    }

    async fn save_schedule(&self, schedule: &ParamSchedule) -> Result<(), TesseraError> {
        self.put_sealed(SCHEDULE_KEY, schedule)
    }

    async fn load_schedule(&self) -> Result<Option<ParamSchedule>, TesseraError> {
        self.get_sealed(SCHEDULE_KEY)
    }

    async fn save_scores(&self, slot_id: SlotId, scores: &[RawScore]) -> Result<(), TesseraError> {
        self.put_sealed(&Self::scores_key(slot_id), &scores)
    }

    async fn save_commit(&self, commit: &SlotCommit) -> Result<(), TesseraError> {
        let key = Self::commit_key(commit.slot_id);
        if self.get_bytes(&key)?.is_some() {
            return Err(TesseraError::AlreadyCommitted(commit.slot_id));
        }
        self.put_sealed(&key, commit)
    }

    async fn load_commit(&self, slot_id: SlotId) -> Result<Option<SlotCommit>, TesseraError> {
        self.get_sealed(&Self::commit_key(slot_id))
    }

    async fn verify(&self) -> Result<(), TesseraError> {
        self.verify_all().map(|_| ())
    }
}
