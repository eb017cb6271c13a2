// crates/tessera-consensus/src/coordinator.rs
//
// SlotCoordinator: drives each slot through
// Open -> Collecting -> Exchanging -> Aggregating -> Committed (or Expired).
//
// Every slot has its own async mutex, so phases of one slot are serialized
// while different slots overlap freely. Peer score messages arrive through a
// per-slot mailbox that stays open from `open_slot` until the end of the
// exchange phase. Finalization is commit-once: the per-slot lock plus the
// history's refusal to record a slot twice make a second `finalize` a no-op.
// Pruned slots stay closed: `retained_from` only moves forward, and with an
// archive attached a persisted commit also blocks re-opening.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use tessera_core::crypto::Keypair;
use tessera_core::error::TesseraError;
use tessera_core::messages::{PeerScore, PeerScoreMessage, TaskRequest};
use tessera_core::params::{ConsensusParams, ExpiredPolicy, ParamSchedule};
use tessera_core::registry::Registry;
use tessera_core::slot::{SlotPhase, SlotState};
use tessera_core::traits::{LedgerSink, PeerExchange, SlotArchive, TaskDispatcher, TaskEvaluator};
use tessera_core::types::{Participant, ParticipantStatus, RawScore, SlotCommit, SlotId, Uid};
use tessera_reputation::TrustLedger;
use tessera_store::{ScoreStore, SlotHistory, SlotScores};

use crate::aggregator::contributing_validators;
use crate::pipeline::{compute_slot_outcome, SlotInputs};
use crate::selection::{Selection, SelectionScheduler};

/// Buffered peer messages per slot.
const MAILBOX_CAPACITY: usize = 256;

/// The outside world, as seen by the coordinator.
#[derive(Clone)]
pub struct Collaborators {
    pub dispatcher: Arc<dyn TaskDispatcher>,
    pub evaluator: Arc<dyn TaskEvaluator>,
    pub exchange: Arc<dyn PeerExchange>,
    pub ledger: Arc<dyn LedgerSink>,
}

/// Result of handing a peer message to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PeerDelivery {
    Accepted { slot_id: SlotId },
    Rejected { reason: String },
}

/// How a `finalize` call ended.
#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    Committed(Box<SlotCommit>),
    /// `committed` is true when a partial commit was written anyway.
    Expired { reason: String, committed: bool },
    /// The slot was already final; nothing happened.
    AlreadyFinal(SlotPhase),
}

impl FinalizeOutcome {
    pub fn commit(&self) -> Option<&SlotCommit> {
        match self {
            FinalizeOutcome::Committed(commit) => Some(commit),
            _ => None,
        }
    }
}

struct SlotRuntime {
    state: SlotState,
    params: ConsensusParams,
    selection: Selection,
    started: Instant,
    inbox: Option<mpsc::Receiver<PeerScoreMessage>>,
}

/// Drives slots through their lifecycle and owns the trust registry.
///
/// One coordinator runs per validator node. Each slot has its own runtime
/// behind its own lock.
pub struct SlotCoordinator {
    local_uid: Uid,
    keypair: Keypair,
    schedule: RwLock<ParamSchedule>,
    registry: Arc<RwLock<Registry>>,
    scores: Arc<ScoreStore>,
    history: RwLock<SlotHistory>,
    collaborators: Collaborators,
    archive: Option<Arc<dyn SlotArchive>>,
    slots: Mutex<BTreeMap<SlotId, Arc<Mutex<SlotRuntime>>>>,
    /// Last published state of each slot, readable while a phase runs.
    snapshots: RwLock<BTreeMap<SlotId, SlotState>>,
    mailboxes: RwLock<BTreeMap<SlotId, mpsc::Sender<PeerScoreMessage>>>,
    next_selection: Mutex<Option<Selection>>,
    /// Oldest slot still held in memory. Everything below it was pruned
    /// and can never be opened again.
    retained_from: RwLock<SlotId>,
    halted: RwLock<Option<String>>,
}

impl SlotCoordinator {
    /// Creates a coordinator with empty history and no archive.
    ///
    /// # Arguments
    /// * `local_uid` - Uid of the validator running this node.
    /// * `keypair` - Signs outgoing score messages.
    /// * `schedule` - Versioned consensus parameters.
    /// * `registry` - Shared participant registry.
    /// * `collaborators` - Miner dispatch, evaluation, gossip and ledger hooks.
    pub fn new(
        local_uid: Uid,
        keypair: Keypair,
        schedule: ParamSchedule,
        registry: Arc<RwLock<Registry>>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            local_uid,
            keypair,
            schedule: RwLock::new(schedule),
            registry,
            scores: Arc::new(ScoreStore::new()),
            history: RwLock::new(SlotHistory::new()),
            collaborators,
            archive: None,
            slots: Mutex::new(BTreeMap::new()),
            snapshots: RwLock::new(BTreeMap::new()),
            mailboxes: RwLock::new(BTreeMap::new()),
            next_selection: Mutex::new(None),
            retained_from: RwLock::new(0),
            halted: RwLock::new(None),
        }
    }

    /// Persist frozen scores, commits and the registry after every commit.
    pub fn with_archive(mut self, archive: Arc<dyn SlotArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn local_uid(&self) -> Uid {
        self.local_uid
    }

    pub fn score_store(&self) -> Arc<ScoreStore> {
        self.scores.clone()
    }

    /// Reload committed history, e.g. from the archive at startup.
    pub async fn restore_history(&self, commits: Vec<SlotCommit>) -> usize {
        let mut history = self.history.write().await;
        let mut restored = 0;
        for commit in commits {
            if history.record_commit(commit).is_ok() {
                restored += 1;
            }
        }
        restored
    }

    // --- Lifecycle -----------------------------------------------------------

    /// Open `slot_id`: select miners, stamp them, open the score partition
    /// and the peer mailbox.
    ///
    /// Fails with `AlreadyCommitted` for a slot that was already finalized,
    /// including slots pruned from memory and commits found in the archive.
    pub async fn open_slot(&self, slot_id: SlotId) -> Result<SlotState, TesseraError> {
        if let Some(reason) = self.halted.read().await.clone() {
            return Err(TesseraError::Halted(reason));
        }
        if self.history.read().await.is_finalized(slot_id)
            || slot_id < *self.retained_from.read().await
        {
            return Err(TesseraError::AlreadyCommitted(slot_id));
        }
        if let Some(archive) = &self.archive {
            if archive.load_commit(slot_id).await?.is_some() {
                return Err(TesseraError::AlreadyCommitted(slot_id));
            }
        }

        let mut slots = self.slots.lock().await;
        if slots.contains_key(&slot_id) {
            return Err(TesseraError::InvalidState(format!(
                "slot {} is already open",
                slot_id
            )));
        }

        let params = self.schedule.read().await.for_slot(slot_id).clone();
        let cached = self
            .next_selection
            .lock()
            .await
            .take()
            .filter(|s| s.slot_id == slot_id);
        let selection = match cached {
            Some(selection) => selection,
            None => {
                let registry = self.registry.read().await;
                SelectionScheduler::new(&params).select(&registry, slot_id)
            }
        };

        {
            let mut registry = self.registry.write().await;
            for miner in &selection.miners {
                registry.mark_selected(*miner, slot_id)?;
            }
        }

        self.scores.open_slot(slot_id).await;
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        self.mailboxes.write().await.insert(slot_id, tx);

        let state = SlotState::open(
            slot_id,
            Utc::now(),
            params.collect_deadline_ms,
            params.exchange_deadline_ms,
            selection.miners.clone(),
        );

        tracing::info!(
            "Slot {}: opened with {} miners and {} validators (params v{})",
            slot_id,
            selection.miners.len(),
            selection.validators.len(),
            params.version
        );

        self.publish(&state).await;
        slots.insert(
            slot_id,
            Arc::new(Mutex::new(SlotRuntime {
                state: state.clone(),
                params,
                selection,
                started: Instant::now(),
                inbox: Some(rx),
            })),
        );
        Ok(state)
    }

    /// Dispatch tasks to the selected miners and score their answers.
    ///
    /// Miners that fail, time out or are still running at the collect
    /// deadline end up in `no_response`.
    pub async fn collect(&self, slot_id: SlotId) -> Result<SlotState, TesseraError> {
        let runtime = self.runtime(slot_id).await?;
        let mut rt = runtime.lock().await;
        self.transition(&mut rt.state, SlotPhase::Collecting).await?;

        let params = rt.params.clone();
        let deadline = rt.started + Duration::from_millis(params.collect_deadline_ms);
        let miners: Vec<Participant> = {
            let registry = self.registry.read().await;
            rt.selection
                .miners
                .iter()
                .filter_map(|uid| registry.get(*uid).cloned())
                .collect()
        };

        let semaphore = Arc::new(Semaphore::new(params.max_concurrent_dispatch.max(1)));
        let mut tasks = JoinSet::new();
        for miner in miners {
            let semaphore = semaphore.clone();
            let collaborators = self.collaborators.clone();
            let local_uid = self.local_uid;
            let call_timeout = Duration::from_millis(params.dispatch_timeout_ms);
            let retries = params.dispatch_retries;
            tasks.spawn(async move {
                let uid = miner.uid;
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        dispatch_and_score(
                            &collaborators,
                            local_uid,
                            &miner,
                            slot_id,
                            call_timeout,
                            retries,
                        )
                        .await
                    }
                    Err(e) => Err(TesseraError::InvalidState(e.to_string())),
                };
                (uid, result)
            });
        }

        let mut responded: BTreeMap<Uid, f64> = BTreeMap::new();
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((uid, Ok(value))))) => {
                    responded.insert(uid, value);
                }
                Ok(Some(Ok((uid, Err(e))))) => {
                    tracing::debug!("Slot {}: miner {} gave no usable response: {}", slot_id, uid, e);
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!("Slot {}: dispatch task failed: {}", slot_id, e);
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Slot {}: collect deadline reached with {} dispatches in flight",
                        slot_id,
                        tasks.len()
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        let due: BTreeSet<Uid> = rt.state.participants_due.iter().copied().collect();
        let answered: BTreeSet<Uid> = responded.keys().copied().collect();
        rt.state.no_response = due.difference(&answered).copied().collect();
        rt.state.participants_responded = answered;

        let report = self
            .scores
            .ingest_many(Box::new(
                responded
                    .iter()
                    .map(|(miner, value)| RawScore::new(slot_id, *miner, self.local_uid, *value)),
            ) as Box<dyn Iterator<Item = RawScore> + Send + '_>)
            .await;

        tracing::info!(
            "Slot {}: collected {} of {} miners ({} stored, {} no response)",
            slot_id,
            rt.state.participants_responded.len(),
            due.len(),
            report.stored,
            rt.state.no_response.len()
        );

        self.publish(&rt.state).await;
        Ok(rt.state.clone())
    }

    /// Broadcast our scores and ingest peers' scores until the exchange
    /// deadline.
    pub async fn exchange(&self, slot_id: SlotId) -> Result<SlotState, TesseraError> {
        let runtime = self.runtime(slot_id).await?;
        let mut rt = runtime.lock().await;
        self.transition(&mut rt.state, SlotPhase::Exchanging).await?;

        let deadline = rt.started + Duration::from_millis(rt.params.exchange_deadline_ms);

        let local: Vec<PeerScore> = self
            .scores
            .scores_by(slot_id, self.local_uid)
            .await
            .into_iter()
            .map(|s| PeerScore {
                miner_id: s.miner_id,
                value: s.value,
            })
            .collect();
        if !local.is_empty() {
            let message = PeerScoreMessage::signed(slot_id, self.local_uid, local, &self.keypair)?;
            let exchange = self.collaborators.exchange.clone();
            tokio::spawn(async move {
                match exchange.broadcast(&message).await {
                    Ok(peers) => {
                        tracing::debug!("Slot {}: scores sent to {} peers", message.slot_id, peers)
                    }
                    Err(e) => tracing::warn!("Slot {}: broadcast failed: {}", message.slot_id, e),
                }
            });
        }

        let mut received = 0usize;
        if let Some(mut inbox) = rt.inbox.take() {
            while let Ok(Some(message)) = tokio::time::timeout_at(deadline, inbox.recv()).await {
                received += self.ingest_peer(message).await;
            }
            self.mailboxes.write().await.remove(&slot_id);
            inbox.close();
            while let Ok(message) = inbox.try_recv() {
                received += self.ingest_peer(message).await;
            }
        }

        tracing::info!("Slot {}: exchange stored {} peer scores", slot_id, received);
        self.publish(&rt.state).await;
        Ok(rt.state.clone())
    }

    /// Inbound peer scores from the RPC layer.
    pub async fn deliver_peer_scores(&self, message: PeerScoreMessage) -> PeerDelivery {
        let slot_id = message.slot_id;
        let sender = self.mailboxes.read().await.get(&slot_id).cloned();
        let Some(sender) = sender else {
            return PeerDelivery::Rejected {
                reason: format!("slot {} is not accepting peer scores", slot_id),
            };
        };

        let hotkey = {
            let registry = self.registry.read().await;
            if !registry.is_eligible_validator(message.validator_id) {
                return PeerDelivery::Rejected {
                    reason: format!("{} is not an active validator", message.validator_id),
                };
            }
            match registry.get(message.validator_id) {
                Some(p) => p.hotkey,
                None => {
                    return PeerDelivery::Rejected {
                        reason: format!("unknown validator {}", message.validator_id),
                    }
                }
            }
        };

        if let Err(e) = message.verify(&hotkey) {
            tracing::warn!(
                "Slot {}: rejected scores from validator {}: {}",
                slot_id,
                message.validator_id,
                e
            );
            return PeerDelivery::Rejected {
                reason: e.to_string(),
            };
        }

        match sender.try_send(message) {
            Ok(()) => PeerDelivery::Accepted { slot_id },
            Err(TrySendError::Full(_)) => PeerDelivery::Rejected {
                reason: format!("slot {} mailbox is full", slot_id),
            },
            Err(TrySendError::Closed(_)) => PeerDelivery::Rejected {
                reason: format!("slot {} is not accepting peer scores", slot_id),
            },
        }
    }

    /// Quorum check, then commit or expire. A slot that is already final is
    /// left untouched.
    pub async fn finalize(&self, slot_id: SlotId) -> Result<FinalizeOutcome, TesseraError> {
        let runtime = match self.runtime(slot_id).await {
            Ok(runtime) => runtime,
            Err(e) => return self.final_phase(slot_id).await.ok_or(e),
        };
        let mut rt = runtime.lock().await;
        if rt.state.is_final() {
            return Ok(FinalizeOutcome::AlreadyFinal(rt.state.phase));
        }

        self.close_mailbox(&mut rt, slot_id).await;
        let frozen = self.scores.freeze(slot_id).await?;
        let params = rt.params.clone();

        if rt.state.phase != SlotPhase::Exchanging {
            let reason = format!("finalized during {}", rt.state.phase);
            return self.close_expired(&mut rt, Some(frozen), reason).await;
        }

        let contributed = {
            let registry = self.registry.read().await;
            contributing_validators(&frozen, &registry).len()
        };
        if contributed < params.quorum_min_validators {
            let err = TesseraError::QuorumNotMet {
                slot_id,
                contributed,
                required: params.quorum_min_validators,
            };
            tracing::warn!("Slot {}: {}", slot_id, err);
            return self.close_expired(&mut rt, Some(frozen), err.to_string()).await;
        }

        self.commit_locked(&mut rt, frozen, None).await
    }

    /// Expire a slot that has not been finalized yet. Under
    /// `ExpiredPolicy::CommitPartial` the scores gathered so far are still
    /// committed.
    pub async fn expire(
        &self,
        slot_id: SlotId,
        reason: impl Into<String>,
    ) -> Result<FinalizeOutcome, TesseraError> {
        let runtime = match self.runtime(slot_id).await {
            Ok(runtime) => runtime,
            Err(e) => return self.final_phase(slot_id).await.ok_or(e),
        };
        let mut rt = runtime.lock().await;
        if rt.state.is_final() {
            return Ok(FinalizeOutcome::AlreadyFinal(rt.state.phase));
        }
        self.close_mailbox(&mut rt, slot_id).await;
        let frozen = match self.scores.freeze(slot_id).await {
            Ok(frozen) => Some(frozen),
            Err(e) => {
                tracing::debug!("Slot {}: no scores to freeze on expiry: {}", slot_id, e);
                None
            }
        };
        self.close_expired(&mut rt, frozen, reason.into()).await
    }

    /// Drive one slot end to end. Collection and exchange share the slot
    /// duration budget; finalization always runs to completion. A slot that
    /// overruns or fails mid-phase is expired under the slot's policy.
    pub async fn run_slot(&self, slot_id: SlotId) -> Result<FinalizeOutcome, TesseraError> {
        self.open_slot(slot_id).await?;
        let budget = Duration::from_millis(self.params_for(slot_id).await.slot_duration_ms);

        let phases = async {
            self.collect(slot_id).await?;
            self.exchange(slot_id).await?;
            Ok::<(), TesseraError>(())
        };

        match tokio::time::timeout(budget, phases).await {
            Ok(Ok(())) => self.finalize(slot_id).await,
            Ok(Err(e)) => {
                tracing::warn!("Slot {}: phase failed: {}", slot_id, e);
                if e.is_fatal() {
                    self.halt(e.to_string()).await;
                }
                self.expire(slot_id, e.to_string()).await
            }
            Err(_) => self.expire(slot_id, "slot duration exceeded").await,
        }
    }

    // --- Queries -------------------------------------------------------------

    /// Last published state of a slot, if it is still held in memory.
    pub async fn status(&self, slot_id: SlotId) -> Option<SlotState> {
        self.snapshots.read().await.get(&slot_id).cloned()
    }

    /// Committed result of a slot, from memory or the archive.
    pub async fn commit(&self, slot_id: SlotId) -> Result<Option<SlotCommit>, TesseraError> {
        if let Some(commit) = self.history.read().await.commit(slot_id) {
            return Ok(Some(commit.clone()));
        }
        match &self.archive {
            Some(archive) => archive.load_commit(slot_id).await,
            None => Ok(None),
        }
    }

    /// Most recent commit still held in memory.
    pub async fn latest_commit(&self) -> Option<SlotCommit> {
        self.history.read().await.latest_commit().cloned()
    }

    pub async fn trust_of(&self, uid: Uid) -> Option<f64> {
        self.registry.read().await.get(uid).map(|p| p.trust)
    }

    /// Clone of the registry as of now.
    pub async fn registry_snapshot(&self) -> Registry {
        self.registry.read().await.clone()
    }

    /// Parameters in force for a slot.
    pub async fn params_for(&self, slot_id: SlotId) -> ConsensusParams {
        self.schedule.read().await.for_slot(slot_id).clone()
    }

    /// Add a parameter version. It may only take effect after every slot the
    /// coordinator has opened so far. With an archive attached the whole
    /// schedule is persisted before the new version becomes visible.
    pub async fn schedule_params(&self, params: ConsensusParams) -> Result<(), TesseraError> {
        let current = self
            .snapshots
            .read()
            .await
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0);
        let version = params.version;
        let from = params.effective_from_slot;

        let mut schedule = self.schedule.write().await;
        let mut next = schedule.clone();
        next.schedule(params, current)?;
        if let Some(archive) = &self.archive {
            archive.save_schedule(&next).await?;
        }
        *schedule = next;

        tracing::info!("Scheduled params v{} from slot {}", version, from);
        Ok(())
    }

    pub async fn halted_reason(&self) -> Option<String> {
        self.halted.read().await.clone()
    }

    pub async fn is_halted(&self) -> bool {
        self.halted.read().await.is_some()
    }

    // --- Internals -----------------------------------------------------------

    async fn runtime(&self, slot_id: SlotId) -> Result<Arc<Mutex<SlotRuntime>>, TesseraError> {
        self.slots
            .lock()
            .await
            .get(&slot_id)
            .cloned()
            .ok_or_else(|| TesseraError::NotFound(format!("slot {}", slot_id)))
    }

    /// Outcome for a slot whose runtime was pruned after it became final.
    async fn final_phase(&self, slot_id: SlotId) -> Option<FinalizeOutcome> {
        let history = self.history.read().await;
        if history.is_committed(slot_id) {
            Some(FinalizeOutcome::AlreadyFinal(SlotPhase::Committed))
        } else if history.is_finalized(slot_id) {
            Some(FinalizeOutcome::AlreadyFinal(SlotPhase::Expired))
        } else {
            None
        }
    }

    async fn transition(&self, state: &mut SlotState, next: SlotPhase) -> Result<(), TesseraError> {
        let from = state.phase;
        state.advance(next)?;
        tracing::info!("Slot {}: state transition: {} -> {}", state.slot_id, from, next);
        self.publish(state).await;
        Ok(())
    }

    async fn publish(&self, state: &SlotState) {
        self.snapshots
            .write()
            .await
            .insert(state.slot_id, state.clone());
    }

    async fn close_mailbox(&self, rt: &mut SlotRuntime, slot_id: SlotId) {
        self.mailboxes.write().await.remove(&slot_id);
        if let Some(mut inbox) = rt.inbox.take() {
            inbox.close();
            while let Ok(message) = inbox.try_recv() {
                self.ingest_peer(message).await;
            }
        }
    }

    async fn ingest_peer(&self, message: PeerScoreMessage) -> usize {
        let report = self.scores.ingest_many(message.to_raw_scores()).await;
        if report.duplicates > 0 || report.rejected > 0 {
            tracing::debug!(
                "Slot {}: validator {} sent {} duplicate and {} invalid scores",
                message.slot_id,
                message.validator_id,
                report.duplicates,
                report.rejected
            );
        }
        report.stored
    }

    /// Aggregate, record, apply, persist and publish one slot.
    ///
    /// `partial` carries the expiry reason when committing under
    /// `ExpiredPolicy::CommitPartial`.
    async fn commit_locked(
        &self,
        rt: &mut SlotRuntime,
        frozen: SlotScores,
        partial: Option<String>,
    ) -> Result<FinalizeOutcome, TesseraError> {
        let slot_id = rt.state.slot_id;
        let params = rt.params.clone();
        // A partial commit may start before the exchange phase; it goes
        // straight to Expired afterwards.
        if partial.is_none() || rt.state.phase == SlotPhase::Exchanging {
            self.transition(&mut rt.state, SlotPhase::Aggregating).await?;
        }

        let snapshot = self.registry.read().await.clone();
        let outcome = {
            let history = self.history.read().await;
            compute_slot_outcome(SlotInputs {
                slot_id,
                params: &params,
                registry: &snapshot,
                scores: &frozen,
                history: &history,
            })
        };

        if outcome.is_empty() {
            let reason = partial.unwrap_or_else(|| "no miner received a usable score".to_string());
            return self.expire_locked(rt, reason).await;
        }

        let commit = outcome.into_commit(params.version, Utc::now());

        // Step 1: commit-once
        self.history.write().await.record_commit(commit.clone())?;

        // Step 2: apply trust, rewards and jailing in one registry write
        let registry_after = {
            let mut registry = self.registry.write().await;
            TrustLedger::apply(&mut registry, &commit.trust_deltas)?;
            for incentive in &commit.incentives {
                registry.credit_reward(incentive.participant_id, incentive.absolute_amount)?;
            }
            for penalty in commit.penalties.iter().filter(|p| p.jailed) {
                registry.set_status(penalty.participant_id, ParticipantStatus::Jailed)?;
                tracing::warn!(
                    "Slot {}: validator {} jailed (severity {:.2})",
                    slot_id,
                    penalty.participant_id,
                    penalty.severity
                );
            }
            registry.clone()
        };

        // Step 3: persist
        if let Some(archive) = &self.archive {
            let persisted = async {
                archive.save_scores(slot_id, &frozen.to_vec()).await?;
                archive.save_commit(&commit).await?;
                archive.save_registry(&registry_after).await
            }
            .await;
            if let Err(e) = persisted {
                if e.is_fatal() {
                    tracing::error!("Slot {}: archive failed, halting: {}", slot_id, e);
                    self.halt(e.to_string()).await;
                } else {
                    tracing::warn!("Slot {}: archive write skipped: {}", slot_id, e);
                }
            }
        }

        // Step 4: ledger, exactly once
        if let Err(e) = self.collaborators.ledger.commit(&commit).await {
            tracing::warn!("Slot {}: ledger sink rejected commit: {}", slot_id, e);
        }

        // Step 5: selection for the next slot
        self.prepare_selection(slot_id + 1).await;

        tracing::info!(
            "Slot {}: committed {} adjusted scores, {} absent, {} incentives, {} penalties",
            slot_id,
            commit.adjusted.len(),
            commit.absent_miners.len(),
            commit.incentives.len(),
            commit.penalties.len()
        );

        // Step 6: phase
        let outcome = match partial {
            Some(reason) => {
                rt.state.expire(reason.clone())?;
                FinalizeOutcome::Expired {
                    reason,
                    committed: true,
                }
            }
            None => {
                self.transition(&mut rt.state, SlotPhase::Committed).await?;
                FinalizeOutcome::Committed(Box::new(commit))
            }
        };
        self.publish(&rt.state).await;
        self.prune(slot_id, params.history_window).await;
        Ok(outcome)
    }

    /// Apply the slot's `ExpiredPolicy`: commit what was gathered, or discard.
    /// A halted coordinator always discards.
    async fn close_expired(
        &self,
        rt: &mut SlotRuntime,
        frozen: Option<SlotScores>,
        reason: String,
    ) -> Result<FinalizeOutcome, TesseraError> {
        let commit_partial =
            rt.params.expired_policy == ExpiredPolicy::CommitPartial && !self.is_halted().await;
        match frozen {
            Some(frozen) if commit_partial && !frozen.is_empty() => {
                self.commit_locked(rt, frozen, Some(reason)).await
            }
            _ => self.expire_locked(rt, reason).await,
        }
    }

    /// Expire the slot and decay everyone once for it.
    async fn expire_locked(
        &self,
        rt: &mut SlotRuntime,
        reason: String,
    ) -> Result<FinalizeOutcome, TesseraError> {
        let slot_id = rt.state.slot_id;
        let params = rt.params.clone();
        rt.state.expire(reason.clone())?;

        {
            let mut registry = self.registry.write().await;
            let deltas = TrustLedger::new(&params).plan_decay_only(&registry, slot_id);
            TrustLedger::apply(&mut registry, &deltas)?;
        }
        self.history.write().await.record_expired(slot_id)?;
        self.prepare_selection(slot_id + 1).await;

        tracing::warn!("Slot {}: expired: {}", slot_id, reason);
        self.publish(&rt.state).await;
        self.prune(slot_id, params.history_window).await;
        Ok(FinalizeOutcome::Expired {
            reason,
            committed: false,
        })
    }

    async fn prepare_selection(&self, slot_id: SlotId) {
        let params = self.params_for(slot_id).await;
        let selection = {
            let registry = self.registry.read().await;
            SelectionScheduler::new(&params).select(&registry, slot_id)
        };
        *self.next_selection.lock().await = Some(selection);
    }

    async fn halt(&self, reason: String) {
        let mut halted = self.halted.write().await;
        if halted.is_none() {
            tracing::error!("Coordinator halted: {}", reason);
            *halted = Some(reason);
        }
    }

    /// Forget slots that fell out of the history window.
    async fn prune(&self, slot_id: SlotId, window: u64) {
        let cutoff = (slot_id + 1).saturating_sub(window.max(1));
        {
            let mut retained_from = self.retained_from.write().await;
            if cutoff <= *retained_from {
                return;
            }
            *retained_from = cutoff;
        }
        {
            let mut slots = self.slots.lock().await;
            *slots = slots.split_off(&cutoff);
        }
        {
            let mut snapshots = self.snapshots.write().await;
            *snapshots = snapshots.split_off(&cutoff);
        }
        self.scores.prune_before(cutoff).await;
        self.history.write().await.prune_before(cutoff);
    }
}

/// Dispatch one task, retrying transient failures, and score the answer.
async fn dispatch_and_score(
    collaborators: &Collaborators,
    local_uid: Uid,
    miner: &Participant,
    slot_id: SlotId,
    call_timeout: Duration,
    retries: u32,
) -> Result<f64, TesseraError> {
    let payload = collaborators.evaluator.build_payload(slot_id, miner.uid);
    let request = TaskRequest::new(slot_id, miner.uid, payload);

    let mut attempt = 0;
    let response = loop {
        let result = match tokio::time::timeout(
            call_timeout,
            collaborators.dispatcher.dispatch(miner, request.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TesseraError::Timeout(format!(
                "miner {} did not answer within {:?}",
                miner.uid, call_timeout
            ))),
        };
        match result {
            Ok(response) => break response,
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                tracing::debug!(
                    "Slot {}: retrying miner {} ({}/{}): {}",
                    slot_id,
                    miner.uid,
                    attempt,
                    retries,
                    e
                );
            }
            Err(e) => return Err(e),
        }
    };

    if response.task_id != request.task_id
        || response.miner_id != miner.uid
        || response.slot_id != slot_id
    {
        return Err(TesseraError::InvalidState(format!(
            "miner {} answered a different task",
            miner.uid
        )));
    }

    let value = collaborators.evaluator.score(&request, &response).await?;
    RawScore::new(slot_id, miner.uid, local_uid, value).validate()?;
    Ok(value)
}
