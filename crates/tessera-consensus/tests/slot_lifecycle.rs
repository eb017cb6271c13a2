// crates/tessera-consensus/tests/slot_lifecycle.rs
//
// End-to-end slot lifecycle tests for the SlotCoordinator with in-memory
// collaborators: aggregation through peer exchange, commit-once under
// concurrent finalize, quorum expiry with decay, no-response bookkeeping,
// peer message validation, the expiry policy, pruned and archived slots
// staying closed, and halting on a fatal archive error.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use tessera_consensus::{Collaborators, FinalizeOutcome, PeerDelivery, SlotCoordinator};
use tessera_core::crypto::Keypair;
use tessera_core::messages::{PeerScore, PeerScoreMessage, TaskRequest, TaskResponse};
use tessera_core::params::{ConsensusParams, ExpiredPolicy, ParamSchedule};
use tessera_core::traits::{LedgerSink, PeerExchange, SlotArchive, TaskDispatcher, TaskEvaluator};
use tessera_core::types::{Participant, RawScore, Role, SlotCommit, SlotId, Uid};
use tessera_core::{Registry, SlotPhase, TesseraError};

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum MinerBehavior {
    Answer,
    Fail,
    Hang,
}

struct MockDispatcher {
    behavior: BTreeMap<Uid, MinerBehavior>,
    calls: AtomicUsize,
}

impl MockDispatcher {
    fn new(behavior: &[(Uid, MinerBehavior)]) -> Self {
        Self {
            behavior: behavior.iter().copied().collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TaskDispatcher for MockDispatcher {
    async fn dispatch(
        &self,
        miner: &Participant,
        request: TaskRequest,
    ) -> Result<TaskResponse, TesseraError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior.get(&miner.uid).copied().unwrap_or(MinerBehavior::Answer) {
            MinerBehavior::Answer => Ok(TaskResponse {
                task_id: request.task_id,
                slot_id: request.slot_id,
                miner_id: request.miner_id,
                result: serde_json::json!({ "echo": request.payload }),
            }),
            MinerBehavior::Fail => Err(TesseraError::Network("connection refused".into())),
            MinerBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(TesseraError::Network("unreachable".into()))
            }
        }
    }
}

/// Scores each miner with a fixed value.
struct FixedEvaluator {
    scores: BTreeMap<Uid, f64>,
}

#[async_trait]
impl TaskEvaluator for FixedEvaluator {
    fn build_payload(&self, slot_id: SlotId, miner_id: Uid) -> serde_json::Value {
        serde_json::json!({ "slot": slot_id, "miner": miner_id })
    }

    async fn score(
        &self,
        request: &TaskRequest,
        _response: &TaskResponse,
    ) -> Result<f64, TesseraError> {
        Ok(self.scores.get(&request.miner_id).copied().unwrap_or(0.5))
    }
}

#[derive(Default)]
struct RecordingExchange {
    sent: Mutex<Vec<PeerScoreMessage>>,
}

#[async_trait]
impl PeerExchange for RecordingExchange {
    async fn broadcast(&self, message: &PeerScoreMessage) -> Result<usize, TesseraError> {
        self.sent.lock().await.push(message.clone());
        Ok(0)
    }
}

#[derive(Default)]
struct RecordingLedger {
    commits: Mutex<Vec<SlotCommit>>,
}

#[async_trait]
impl LedgerSink for RecordingLedger {
    async fn commit(&self, commit: &SlotCommit) -> Result<(), TesseraError> {
        self.commits.lock().await.push(commit.clone());
        Ok(())
    }
}

/// An archive whose disk is gone.
struct BrokenArchive;

#[async_trait]
impl SlotArchive for BrokenArchive {
    async fn save_registry(&self, _registry: &Registry) -> Result<(), TesseraError> {
        Err(TesseraError::Storage("disk full".into()))
    }

    async fn load_registry(&self) -> Result<Option<Registry>, TesseraError> {
        Ok(None)
    }

    async fn save_schedule(&self, _schedule: &ParamSchedule) -> Result<(), TesseraError> {
        Err(TesseraError::Storage("disk full".into()))
    }

    async fn load_schedule(&self) -> Result<Option<ParamSchedule>, TesseraError> {
        Ok(None)
    }

    async fn save_scores(&self, _slot_id: SlotId, _scores: &[RawScore]) -> Result<(), TesseraError> {
        Err(TesseraError::Storage("disk full".into()))
    }

    async fn save_commit(&self, _commit: &SlotCommit) -> Result<(), TesseraError> {
        Err(TesseraError::Storage("disk full".into()))
    }

    async fn load_commit(&self, _slot_id: SlotId) -> Result<Option<SlotCommit>, TesseraError> {
        Ok(None)
    }

    async fn verify(&self) -> Result<(), TesseraError> {
        Ok(())
    }
}

/// Keeps commits and the schedule in memory; shared between coordinators to
/// stand in for a restart.
#[derive(Default)]
struct MemoryArchive {
    commits: Mutex<BTreeMap<SlotId, SlotCommit>>,
    schedule: Mutex<Option<ParamSchedule>>,
}

#[async_trait]
impl SlotArchive for MemoryArchive {
    async fn save_registry(&self, _registry: &Registry) -> Result<(), TesseraError> {
        Ok(())
    }

    async fn load_registry(&self) -> Result<Option<Registry>, TesseraError> {
        Ok(None)
    }

    async fn save_schedule(&self, schedule: &ParamSchedule) -> Result<(), TesseraError> {
        *self.schedule.lock().await = Some(schedule.clone());
        Ok(())
    }

    async fn load_schedule(&self) -> Result<Option<ParamSchedule>, TesseraError> {
        Ok(self.schedule.lock().await.clone())
    }

    async fn save_scores(&self, _slot_id: SlotId, _scores: &[RawScore]) -> Result<(), TesseraError> {
        Ok(())
    }

    async fn save_commit(&self, commit: &SlotCommit) -> Result<(), TesseraError> {
        let mut commits = self.commits.lock().await;
        if commits.contains_key(&commit.slot_id) {
            return Err(TesseraError::AlreadyCommitted(commit.slot_id));
        }
        commits.insert(commit.slot_id, commit.clone());
        Ok(())
    }

    async fn load_commit(&self, slot_id: SlotId) -> Result<Option<SlotCommit>, TesseraError> {
        Ok(self.commits.lock().await.get(&slot_id).cloned())
    }

    async fn verify(&self) -> Result<(), TesseraError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

const LOCAL: Uid = 1;

fn keypair(uid: Uid) -> Keypair {
    Keypair::from_secret(&[uid as u8; 32])
}

fn params() -> ConsensusParams {
    ConsensusParams {
        miners_per_slot: 8,
        collect_deadline_ms: 300,
        exchange_deadline_ms: 350,
        slot_duration_ms: 2_000,
        dispatch_timeout_ms: 100,
        dispatch_retries: 1,
        ..Default::default()
    }
}

struct Harness {
    coordinator: Arc<SlotCoordinator>,
    dispatcher: Arc<MockDispatcher>,
    exchange: Arc<RecordingExchange>,
    ledger: Arc<RecordingLedger>,
}

/// Validators are `(uid, trust)`, miners are `(uid, local score, behavior)`.
fn harness(
    validators: &[(Uid, f64)],
    miners: &[(Uid, f64, MinerBehavior)],
    params: ConsensusParams,
    archive: Option<Arc<dyn SlotArchive>>,
) -> Harness {
    let mut registry = Registry::new();
    for (uid, trust) in validators {
        registry
            .register(Participant::new(
                *uid,
                Role::Validator,
                keypair(*uid).public_key(),
                1_000,
                *trust,
                0,
            ))
            .unwrap();
    }
    for (uid, _, _) in miners {
        registry
            .register(Participant::new(*uid, Role::Miner, [*uid as u8; 32], 0, 0.5, 0))
            .unwrap();
    }

    let dispatcher = Arc::new(MockDispatcher::new(
        &miners.iter().map(|(uid, _, b)| (*uid, *b)).collect::<Vec<_>>(),
    ));
    let evaluator = Arc::new(FixedEvaluator {
        scores: miners.iter().map(|(uid, s, _)| (*uid, *s)).collect(),
    });
    let exchange = Arc::new(RecordingExchange::default());
    let ledger = Arc::new(RecordingLedger::default());

    let mut coordinator = SlotCoordinator::new(
        LOCAL,
        keypair(LOCAL),
        ParamSchedule::new(params).unwrap(),
        Arc::new(RwLock::new(registry)),
        Collaborators {
            dispatcher: dispatcher.clone(),
            evaluator,
            exchange: exchange.clone(),
            ledger: ledger.clone(),
        },
    );
    if let Some(archive) = archive {
        coordinator = coordinator.with_archive(archive);
    }

    Harness {
        coordinator: Arc::new(coordinator),
        dispatcher,
        exchange,
        ledger,
    }
}

fn peer_message(slot_id: SlotId, validator: Uid, scores: &[(Uid, f64)]) -> PeerScoreMessage {
    PeerScoreMessage::signed(
        slot_id,
        validator,
        scores
            .iter()
            .map(|(miner_id, value)| PeerScore {
                miner_id: *miner_id,
                value: *value,
            })
            .collect(),
        &keypair(validator),
    )
    .unwrap()
}

async fn collect_and_exchange(coordinator: &SlotCoordinator, slot_id: SlotId) {
    coordinator.collect(slot_id).await.unwrap();
    coordinator.exchange(slot_id).await.unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_peer_exchange_trust_weighted_commit() {
    let h = harness(
        &[(1, 0.9), (2, 0.7), (3, 0.5)],
        &[(10, 0.85, MinerBehavior::Answer)],
        params(),
        None,
    );
    let c = &h.coordinator;

    c.open_slot(1).await.unwrap();
    for (validator, raw) in [(2, 0.80), (3, 0.60)] {
        let delivery = c
            .deliver_peer_scores(peer_message(1, validator, &[(10, raw)]))
            .await;
        assert_eq!(delivery, PeerDelivery::Accepted { slot_id: 1 });
    }
    collect_and_exchange(c, 1).await;

    let outcome = c.finalize(1).await.unwrap();
    let commit = outcome.commit().expect("slot should commit");
    let adjusted = commit.adjusted_for(10).unwrap();
    assert!((adjusted - 0.774).abs() < 1e-3);
    assert_eq!(commit.adjusted[0].contributing_validator_count, 3);
    assert_eq!(commit.performances.len(), 3);

    let sent = h.exchange.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].validator_id, LOCAL);
    assert_eq!(sent[0].scores, vec![PeerScore { miner_id: 10, value: 0.85 }]);

    assert_eq!(h.ledger.commits.lock().await.len(), 1);
    assert_eq!(c.status(1).await.unwrap().phase, SlotPhase::Committed);
    assert!(c.trust_of(10).await.unwrap() > 0.5 * (-0.1f64).exp());
}

#[tokio::test]
async fn test_concurrent_finalize_commits_once() {
    let h = harness(
        &[(1, 0.9)],
        &[(10, 0.7, MinerBehavior::Answer), (11, 0.4, MinerBehavior::Answer)],
        params(),
        None,
    );
    let c = h.coordinator.clone();
    c.open_slot(1).await.unwrap();
    collect_and_exchange(&c, 1).await;

    let (a, b) = tokio::join!(c.finalize(1), c.finalize(1));
    let outcomes = [a.unwrap(), b.unwrap()];
    let committed = outcomes
        .iter()
        .filter(|o| matches!(o, FinalizeOutcome::Committed(_)))
        .count();
    let noops = outcomes
        .iter()
        .filter(|o| matches!(o, FinalizeOutcome::AlreadyFinal(SlotPhase::Committed)))
        .count();
    assert_eq!((committed, noops), (1, 1));

    let trust_after = c.trust_of(10).await.unwrap();
    let again = c.finalize(1).await.unwrap();
    assert!(matches!(again, FinalizeOutcome::AlreadyFinal(SlotPhase::Committed)));
    assert_eq!(c.trust_of(10).await.unwrap(), trust_after);
    assert_eq!(h.ledger.commits.lock().await.len(), 1);

    let commit = c.commit(1).await.unwrap().unwrap();
    let miner_shares: f64 = commit
        .incentives
        .iter()
        .filter(|i| i.role == Role::Miner)
        .map(|i| i.share)
        .sum();
    assert!((miner_shares - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_zero_contributor_slot_expires_and_decays_once_per_slot() {
    let h = harness(
        &[(1, 0.9)],
        &[(10, 0.9, MinerBehavior::Fail)],
        params(),
        None,
    );
    let c = &h.coordinator;

    // Slot 1 never ran; slot 2 sees two elapsed slots.
    c.open_slot(2).await.unwrap();
    collect_and_exchange(c, 2).await;
    let outcome = c.finalize(2).await.unwrap();
    assert!(matches!(
        outcome,
        FinalizeOutcome::Expired {
            committed: false,
            ..
        }
    ));
    assert!(h.ledger.commits.lock().await.is_empty());
    assert!(c.commit(2).await.unwrap().is_none());

    let trust = c.trust_of(10).await.unwrap();
    assert!((trust - 0.5 * (-0.2f64).exp()).abs() < 1e-12);
    assert!((trust - 0.409).abs() < 1e-3);

    c.open_slot(3).await.unwrap();
    collect_and_exchange(c, 3).await;
    c.finalize(3).await.unwrap();
    let decayed = c.trust_of(10).await.unwrap();
    assert!((decayed - trust * (-0.1f64).exp()).abs() < 1e-12);

    let state = c.status(3).await.unwrap();
    assert_eq!(state.phase, SlotPhase::Expired);
    assert!(state.expiry_reason.unwrap().contains("Quorum not met"));
}

#[tokio::test]
async fn test_commit_partial_below_quorum() {
    let params = ConsensusParams {
        quorum_min_validators: 2,
        expired_policy: ExpiredPolicy::CommitPartial,
        ..params()
    };
    let h = harness(
        &[(1, 0.9), (2, 0.9)],
        &[(10, 0.6, MinerBehavior::Answer)],
        params,
        None,
    );
    let c = &h.coordinator;
    c.open_slot(1).await.unwrap();
    collect_and_exchange(c, 1).await;

    let outcome = c.finalize(1).await.unwrap();
    assert!(matches!(
        outcome,
        FinalizeOutcome::Expired {
            committed: true,
            ..
        }
    ));
    assert_eq!(h.ledger.commits.lock().await.len(), 1);
    assert_eq!(c.status(1).await.unwrap().phase, SlotPhase::Expired);
    assert_eq!(c.commit(1).await.unwrap().unwrap().adjusted_for(10), Some(0.6));
}

#[tokio::test]
async fn test_unresponsive_miners_recorded_as_no_response() {
    let h = harness(
        &[(1, 0.9)],
        &[
            (10, 0.8, MinerBehavior::Answer),
            (11, 0.8, MinerBehavior::Fail),
            (12, 0.8, MinerBehavior::Hang),
        ],
        params(),
        None,
    );
    let c = &h.coordinator;
    c.open_slot(1).await.unwrap();
    let state = c.collect(1).await.unwrap();

    assert_eq!(state.participants_responded.into_iter().collect::<Vec<_>>(), vec![10]);
    assert_eq!(state.no_response.into_iter().collect::<Vec<_>>(), vec![11, 12]);
    // One call for the answering miner, two (one retry) for each failing one.
    assert_eq!(h.dispatcher.calls.load(Ordering::SeqCst), 5);

    c.exchange(1).await.unwrap();
    let commit = c.finalize(1).await.unwrap().commit().cloned().unwrap();
    assert_eq!(commit.adjusted.len(), 1);
}

#[tokio::test]
async fn test_peer_messages_are_validated() {
    let h = harness(
        &[(1, 0.9), (2, 0.7)],
        &[(10, 0.8, MinerBehavior::Answer)],
        params(),
        None,
    );
    let c = &h.coordinator;

    // No slot open yet.
    let early = c.deliver_peer_scores(peer_message(1, 2, &[(10, 0.5)])).await;
    assert!(matches!(early, PeerDelivery::Rejected { .. }));

    c.open_slot(1).await.unwrap();

    let mut forged = peer_message(1, 2, &[(10, 0.5)]);
    forged.scores[0].value = 1.0;
    assert!(matches!(
        c.deliver_peer_scores(forged).await,
        PeerDelivery::Rejected { .. }
    ));

    // Miners cannot submit scores.
    let from_miner = PeerScoreMessage::signed(
        1,
        10,
        vec![PeerScore {
            miner_id: 10,
            value: 1.0,
        }],
        &keypair(10),
    )
    .unwrap();
    assert!(matches!(
        c.deliver_peer_scores(from_miner).await,
        PeerDelivery::Rejected { .. }
    ));

    assert_eq!(
        c.deliver_peer_scores(peer_message(1, 2, &[(10, 0.5)])).await,
        PeerDelivery::Accepted { slot_id: 1 }
    );

    collect_and_exchange(c, 1).await;
    let late = c.deliver_peer_scores(peer_message(1, 2, &[(10, 0.9)])).await;
    assert!(matches!(late, PeerDelivery::Rejected { .. }));

    let commit = c.finalize(1).await.unwrap().commit().cloned().unwrap();
    let expected = (0.9 * 0.8 + 0.7 * 0.5) / 1.6;
    assert!((commit.adjusted_for(10).unwrap() - expected).abs() < 1e-12);
}

#[tokio::test]
async fn test_fatal_archive_error_halts_coordinator() {
    let h = harness(
        &[(1, 0.9)],
        &[(10, 0.8, MinerBehavior::Answer)],
        params(),
        Some(Arc::new(BrokenArchive)),
    );
    let c = &h.coordinator;
    c.open_slot(1).await.unwrap();
    collect_and_exchange(c, 1).await;

    let outcome = c.finalize(1).await.unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Committed(_)));
    assert!(c.is_halted().await);

    let err = c.open_slot(2).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, TesseraError::Halted(_)));
}

#[tokio::test]
async fn test_run_slot_and_reopen_rules() {
    let h = harness(
        &[(1, 0.9)],
        &[(10, 0.8, MinerBehavior::Answer)],
        params(),
        None,
    );
    let c = &h.coordinator;

    let outcome = c.run_slot(1).await.unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Committed(_)));

    let err = c.open_slot(1).await.unwrap_err();
    assert!(matches!(err, TesseraError::AlreadyCommitted(1)));

    c.open_slot(2).await.unwrap();
    assert!(matches!(
        c.open_slot(2).await.unwrap_err(),
        TesseraError::InvalidState(_)
    ));
    // Skipping a phase is refused.
    assert!(c.exchange(2).await.is_err());
}

#[tokio::test]
async fn test_pruned_slots_stay_closed() {
    let params = ConsensusParams {
        history_window: 1,
        ..params()
    };
    let h = harness(&[(1, 0.9)], &[(10, 0.8, MinerBehavior::Answer)], params, None);
    let c = &h.coordinator;

    for slot in [1, 2] {
        assert!(matches!(c.run_slot(slot).await.unwrap(), FinalizeOutcome::Committed(_)));
    }
    // Slot 1 has fallen out of the in-memory history.
    assert!(c.commit(1).await.unwrap().is_none());
    let trust = c.trust_of(10).await.unwrap();

    assert!(matches!(
        c.open_slot(1).await.unwrap_err(),
        TesseraError::AlreadyCommitted(1)
    ));
    assert!(matches!(
        c.run_slot(1).await.unwrap_err(),
        TesseraError::AlreadyCommitted(1)
    ));

    let slots: Vec<SlotId> = h.ledger.commits.lock().await.iter().map(|c| c.slot_id).collect();
    assert_eq!(slots, vec![1, 2]);
    assert_eq!(c.trust_of(10).await.unwrap(), trust);
    assert_eq!(c.latest_commit().await.unwrap().slot_id, 2);
}

#[tokio::test]
async fn test_archived_commit_blocks_reopen_after_restart() {
    let archive = Arc::new(MemoryArchive::default());
    let first = harness(
        &[(1, 0.9)],
        &[(10, 0.8, MinerBehavior::Answer)],
        params(),
        Some(archive.clone() as Arc<dyn SlotArchive>),
    );
    first.coordinator.run_slot(1).await.unwrap();
    assert!(archive.commits.lock().await.contains_key(&1));

    // A fresh coordinator on the same archive, without restored history.
    let second = harness(
        &[(1, 0.9)],
        &[(10, 0.8, MinerBehavior::Answer)],
        params(),
        Some(archive.clone() as Arc<dyn SlotArchive>),
    );
    let c = &second.coordinator;
    assert!(matches!(
        c.open_slot(1).await.unwrap_err(),
        TesseraError::AlreadyCommitted(1)
    ));
    assert_eq!(c.commit(1).await.unwrap().unwrap().slot_id, 1);
    assert!(second.ledger.commits.lock().await.is_empty());

    c.run_slot(2).await.unwrap();
    assert_eq!(second.ledger.commits.lock().await.len(), 1);
}

#[tokio::test]
async fn test_expiry_follows_commit_partial_policy() {
    let commit_partial = ConsensusParams {
        expired_policy: ExpiredPolicy::CommitPartial,
        ..params()
    };
    let h = harness(
        &[(1, 0.9), (2, 0.7)],
        &[(10, 0.8, MinerBehavior::Answer)],
        commit_partial,
        None,
    );
    let c = &h.coordinator;

    c.open_slot(1).await.unwrap();
    c.deliver_peer_scores(peer_message(1, 2, &[(10, 0.6)])).await;
    c.collect(1).await.unwrap();

    // What `run_slot` does when the slot overruns its duration.
    let outcome = c.expire(1, "slot duration exceeded").await.unwrap();
    assert!(matches!(
        outcome,
        FinalizeOutcome::Expired {
            committed: true,
            ..
        }
    ));
    let state = c.status(1).await.unwrap();
    assert_eq!(state.phase, SlotPhase::Expired);
    assert_eq!(state.expiry_reason.as_deref(), Some("slot duration exceeded"));

    let commit = c.commit(1).await.unwrap().unwrap();
    let expected = (0.9 * 0.8 + 0.7 * 0.6) / 1.6;
    assert!((commit.adjusted_for(10).unwrap() - expected).abs() < 1e-12);
    assert_eq!(h.ledger.commits.lock().await.len(), 1);

    // Finalizing before the exchange phase takes the same route.
    c.open_slot(2).await.unwrap();
    c.deliver_peer_scores(peer_message(2, 2, &[(10, 0.6)])).await;
    let early = c.finalize(2).await.unwrap();
    assert!(matches!(
        early,
        FinalizeOutcome::Expired {
            committed: true,
            ..
        }
    ));
    let partial = c.commit(2).await.unwrap().unwrap();
    assert!((partial.adjusted_for(10).unwrap() - 0.6).abs() < 1e-12);
    assert_eq!(h.ledger.commits.lock().await.len(), 2);
}

#[tokio::test]
async fn test_expiry_discards_scores_by_default() {
    let h = harness(
        &[(1, 0.9), (2, 0.7)],
        &[(10, 0.8, MinerBehavior::Answer)],
        params(),
        None,
    );
    let c = &h.coordinator;

    c.open_slot(1).await.unwrap();
    c.deliver_peer_scores(peer_message(1, 2, &[(10, 0.6)])).await;
    c.collect(1).await.unwrap();

    let outcome = c.expire(1, "slot duration exceeded").await.unwrap();
    assert!(matches!(
        outcome,
        FinalizeOutcome::Expired {
            committed: false,
            ..
        }
    ));
    assert!(c.commit(1).await.unwrap().is_none());
    assert!(h.ledger.commits.lock().await.is_empty());
    assert!(matches!(
        c.expire(1, "again").await.unwrap(),
        FinalizeOutcome::AlreadyFinal(SlotPhase::Expired)
    ));
}

#[tokio::test]
async fn test_expiry_without_score_partition_still_expires() {
    let commit_partial = ConsensusParams {
        expired_policy: ExpiredPolicy::CommitPartial,
        ..params()
    };
    let h = harness(
        &[(1, 0.9), (2, 0.7)],
        &[(10, 0.8, MinerBehavior::Answer)],
        commit_partial,
        None,
    );
    let c = &h.coordinator;

    c.open_slot(1).await.unwrap();
    c.collect(1).await.unwrap();
    assert_eq!(c.score_store().prune_before(2).await, 1);

    // Nothing left to freeze: the slot expires with nothing committed.
    let outcome = c.expire(1, "slot duration exceeded").await.unwrap();
    assert!(matches!(
        outcome,
        FinalizeOutcome::Expired {
            committed: false,
            ..
        }
    ));
    assert_eq!(c.status(1).await.unwrap().phase, SlotPhase::Expired);
    assert!(c.commit(1).await.unwrap().is_none());
    assert!(h.ledger.commits.lock().await.is_empty());
}

#[tokio::test]
async fn test_scheduled_params_are_persisted() {
    let archive = Arc::new(MemoryArchive::default());
    let h = harness(
        &[(1, 0.9)],
        &[(10, 0.8, MinerBehavior::Answer)],
        params(),
        Some(archive.clone() as Arc<dyn SlotArchive>),
    );
    h.coordinator
        .schedule_params(ConsensusParams {
            version: 2,
            effective_from_slot: 5,
            ..params()
        })
        .await
        .unwrap();

    let saved = archive.schedule.lock().await.clone().unwrap();
    assert_eq!(saved.version_count(), 2);
    assert_eq!(saved.for_slot(5).version, 2);
}

#[tokio::test]
async fn test_unpersisted_schedule_is_not_applied() {
    let h = harness(
        &[(1, 0.9)],
        &[(10, 0.8, MinerBehavior::Answer)],
        params(),
        Some(Arc::new(BrokenArchive)),
    );
    let c = &h.coordinator;
    let err = c
        .schedule_params(ConsensusParams {
            version: 2,
            effective_from_slot: 5,
            ..params()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, TesseraError::Storage(_)));
    assert_eq!(c.params_for(5).await.version, 1);
}

#[tokio::test]
async fn test_params_take_effect_from_scheduled_slot() {
    let h = harness(
        &[(1, 0.9)],
        &[(10, 0.8, MinerBehavior::Answer)],
        params(),
        None,
    );
    let c = &h.coordinator;
    c.run_slot(1).await.unwrap();

    let next = ConsensusParams {
        version: 2,
        effective_from_slot: 3,
        delta: 0.2,
        ..params()
    };
    assert!(c
        .schedule_params(ConsensusParams {
            effective_from_slot: 1,
            ..next.clone()
        })
        .await
        .is_err());
    c.schedule_params(next).await.unwrap();

    assert_eq!(c.params_for(2).await.version, 1);
    assert_eq!(c.params_for(3).await.version, 2);

    c.run_slot(3).await.unwrap();
    assert_eq!(c.commit(3).await.unwrap().unwrap().params_version, 2);
}
