//! Anchor orchestrator (spec §4.5): drives the three-phase anchor state
//! machine, links anchors into a chain, and coordinates the VRF engine,
//! move vault, and UTXO pool. Grounded on the teacher's
//! `heartbeat_attestation.rs::HeartbeatAttestationSystem` for the
//! ticking/backoff shape and `finality_proof.rs` for the
//! accumulate-and-classify error handling style.

use crate::codec;
use crate::config::AnchorConfig;
use crate::constants::wire;
use crate::crypto::sha256;
use crate::error::{OrchestratorError, SendError};
use crate::event::{AnchorEvent, EventSink};
use crate::ledger::{frame_payload, game_id_tag, SendRequest};
use crate::merkle::MerkleTree;
use crate::move_vault::MoveVault;
use crate::runtime::Runtime;
use crate::types::{
    AnchorChainEntry, AnchorType, FinalPayload, GenesisPayload, HeartbeatPayload, MovePacket,
    OutcomeCode, TxId, delta_flags,
};
use crate::utxo_pool::UtxoPool;
use crate::vrf_chain::VrfChainEngine;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Starting,
    AwaitingGenesis,
    Running,
    Finalizing,
    Complete,
    Aborted,
}

struct Inner {
    state: OrchestratorState,
    heartbeats_enabled: bool,
    anchor_chain: Vec<AnchorChainEntry>,
    last_final_bytes: Option<Vec<u8>>,
}

/// Drives one game's anchor lifecycle end to end.
pub struct AnchorOrchestrator {
    inner: Mutex<Inner>,
    sending_heartbeat: AtomicBool,
    consecutive_failures: AtomicU32,
    config: AnchorConfig,
    runtime: Arc<Runtime>,
    vrf: Arc<VrfChainEngine>,
    vault: Arc<MoveVault>,
    pool: Arc<UtxoPool>,
    events: Arc<dyn EventSink>,
    from_address: String,
    to_address: String,
    private_keys: Vec<u8>,
    game_id_tag: [u8; 4],
}

struct RetryPolicy {
    max_attempts: u32,
    base_backoff_ms: u64,
    multiplier: f64,
    max_backoff_ms: u64,
    per_attempt_deadline_ms: Option<u64>,
    /// Cap on retries for `SendError::Unknown` specifically (spec §7):
    /// unlike the other families, an unclassified error is only
    /// retryable up to this many times, not the full attempt budget.
    unknown_retry_limit: u32,
}

impl AnchorOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AnchorConfig,
        runtime: Arc<Runtime>,
        vrf: Arc<VrfChainEngine>,
        vault: Arc<MoveVault>,
        pool: Arc<UtxoPool>,
        events: Arc<dyn EventSink>,
        game_id: &str,
        from_address: impl Into<String>,
        to_address: impl Into<String>,
        private_keys: Vec<u8>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: OrchestratorState::Idle,
                heartbeats_enabled: false,
                anchor_chain: Vec::new(),
                last_final_bytes: None,
            }),
            sending_heartbeat: AtomicBool::new(false),
            consecutive_failures: AtomicU32::new(0),
            config,
            runtime,
            vrf,
            vault,
            pool,
            events,
            from_address: from_address.into(),
            to_address: to_address.into(),
            private_keys,
            game_id_tag: game_id_tag(game_id),
        }
    }

    pub async fn state(&self) -> OrchestratorState {
        self.inner.lock().await.state
    }

    /// `Idle → Starting`. The heartbeat timer is armed but stays
    /// disabled until the genesis anchor confirms.
    pub async fn start(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = OrchestratorState::Starting;
        inner.heartbeats_enabled = false;
    }

    async fn send_with_retry(
        &self,
        to_address: &str,
        payload: &[u8],
        janitor_mode: bool,
        policy: &RetryPolicy,
    ) -> Result<TxId, SendError> {
        let mut last_err = SendError::Unknown("no attempts made".to_string());
        let mut unknown_attempts = 0u32;
        for attempt in 1..=policy.max_attempts {
            let req = SendRequest {
                from_address: &self.from_address,
                to_address,
                amount: self.config.anchor_amount,
                private_keys: &self.private_keys,
                priority_fee: None,
                payload,
                janitor_mode,
            };

            let send_fut = self.runtime.ledger.manual_send(req);
            let outcome = match policy.per_attempt_deadline_ms {
                Some(deadline) => tokio::time::timeout(Duration::from_millis(deadline), send_fut)
                    .await
                    .unwrap_or_else(|_| Err(crate::ledger::LedgerError::SendFailed("timeout".to_string()))),
                None => send_fut.await,
            };

            match outcome {
                Ok(hash) => return Ok(TxId(hash)),
                Err(err) => {
                    let classified = SendError::classify(&err.to_string());
                    if matches!(classified, SendError::Unknown(_)) {
                        unknown_attempts += 1;
                    }
                    let unknown_exhausted = matches!(classified, SendError::Unknown(_))
                        && unknown_attempts >= policy.unknown_retry_limit;
                    if !classified.is_retryable() || attempt == policy.max_attempts || unknown_exhausted {
                        return Err(classified);
                    }
                    last_err = classified;
                    self.events.emit(AnchorEvent::AnchorRetryNeeded {
                        reason: last_err.to_string(),
                    });
                    let backoff_ms = (policy.base_backoff_ms as f64
                        * policy.multiplier.powi(attempt as i32 - 1))
                        .min(policy.max_backoff_ms as f64) as u64;
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
        Err(last_err)
    }

    /// Build, sign, and send the genesis anchor. Enables heartbeats and
    /// notifies the VRF engine of the confirmed txid on success.
    #[allow(clippy::too_many_arguments)]
    pub async fn anchor_genesis_seed(
        &self,
        game_id_hash: [u8; 32],
        vrf_seed_hash: [u8; 32],
        btc_block_hashes: Vec<[u8; 32]>,
        start_daa_score: u64,
        end_daa_score: u64,
        nist_pulse_index: u64,
        nist_output_hash: [u8; 64],
        nist_signature: [u8; 512],
    ) -> Result<TxId, OrchestratorError> {
        {
            let mut inner = self.inner.lock().await;
            inner.state = OrchestratorState::AwaitingGenesis;
        }

        let payload = GenesisPayload {
            game_id_hash,
            vrf_seed_hash,
            btc_block_hashes,
            start_daa_score,
            end_daa_score,
            nist_pulse_index,
            nist_output_hash,
            nist_signature,
        };
        let body = codec::encode_genesis(&payload).map_err(OrchestratorError::from)?;
        let framed = frame_payload(wire::GENESIS_PREFIX, self.game_id_tag, &body);

        let policy = RetryPolicy {
            max_attempts: self.config.genesis_send_max_attempts,
            base_backoff_ms: self.config.genesis_send_base_backoff_ms,
            multiplier: self.config.genesis_send_backoff_multiplier,
            max_backoff_ms: self.config.genesis_send_max_backoff_ms,
            per_attempt_deadline_ms: Some(self.config.genesis_send_attempt_deadline_ms),
            unknown_retry_limit: self.config.send_error_retry_limit,
        };

        match self
            .send_with_retry(&self.to_address.clone(), framed.as_bytes(), false, &policy)
            .await
        {
            Ok(tx_id) => {
                let mut inner = self.inner.lock().await;
                inner.anchor_chain.push(AnchorChainEntry {
                    tx_id,
                    anchor_type: AnchorType::Genesis,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                    move_count: None,
                    delta_flags: None,
                });
                inner.heartbeats_enabled = true;
                inner.state = OrchestratorState::Running;
                drop(inner);
                self.vrf.notify_genesis_tx_id(tx_id.0).await;
                Ok(tx_id)
            }
            Err(err) => {
                let mut inner = self.inner.lock().await;
                inner.state = OrchestratorState::Aborted;
                drop(inner);
                self.events.emit(AnchorEvent::GenesisAnchorFailed { error: err.clone() });
                Err(OrchestratorError::GenesisFailed(err.to_string()))
            }
        }
    }

    fn result_leaf_hash(score: u32, coins: u32, outcome: OutcomeCode, race_time_ms: u32) -> [u8; 32] {
        let text = format!(
            "RESULT:{score}:{coins}:{}:{race_time_ms}",
            outcome.wire_code()
        );
        sha256(text.as_bytes())
    }

    fn genesis_tx_id(chain: &[AnchorChainEntry]) -> Option<TxId> {
        chain
            .iter()
            .find(|e| e.anchor_type == AnchorType::Genesis)
            .map(|e| e.tx_id)
    }

    fn last_tx_id(chain: &[AnchorChainEntry]) -> Option<TxId> {
        chain.last().map(|e| e.tx_id)
    }

    /// Drain pending moves and deltas and send one heartbeat. A no-op
    /// (returns `Ok(false)`) if a send is already in flight, the pool
    /// is degraded, genesis hasn't confirmed, or heartbeats are
    /// disabled after a run of consecutive failures.
    pub async fn send_heartbeat_anchor(&self) -> Result<bool, OrchestratorError> {
        if self
            .sending_heartbeat
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        let result = self.send_heartbeat_anchor_inner().await;
        self.sending_heartbeat.store(false, Ordering::Release);
        result
    }

    async fn send_heartbeat_anchor_inner(&self) -> Result<bool, OrchestratorError> {
        if self.pool.is_degraded() {
            return Ok(false);
        }
        let (state, heartbeats_enabled, prev_tx_id) = {
            let inner = self.inner.lock().await;
            (inner.state, inner.heartbeats_enabled, Self::last_tx_id(&inner.anchor_chain))
        };
        if state != OrchestratorState::Running || !heartbeats_enabled {
            return Ok(false);
        }
        let prev_tx_id = match prev_tx_id {
            Some(tx_id) => tx_id,
            None => return Ok(false),
        };

        let new_moves = self.vault.drain_new_moves(self.config.max_moves_per_heartbeat);
        let (btc_delta, nist_delta) = self.vrf.drain_pending_deltas().await;

        if new_moves.is_empty() && btc_delta.is_none() && nist_delta.is_none() {
            return Ok(false);
        }

        let mut flags = 0u8;
        if btc_delta.is_some() {
            flags |= delta_flags::BTC;
        }
        if nist_delta.is_some() {
            flags |= delta_flags::NIST;
        }

        let anchored_moves = &self.vault.all_moves()[..self.vault.last_anchored_move_count()];
        let tree = MerkleTree::build_from_moves(anchored_moves);
        let mut merkle_root = [0u8; 32];
        if let Ok(bytes) = hex::decode(tree.root()) {
            if bytes.len() == 32 {
                merkle_root.copy_from_slice(&bytes);
            }
        }

        let packets: Vec<MovePacket> = new_moves
            .iter()
            .map(|mv| MovePacket {
                action_code: mv.action_code,
                payload: mv.payload,
                time_delta: mv.time_delta,
                vrf_fragment: mv.vrf_fragment,
                value: mv.value,
            })
            .collect();

        let payload = HeartbeatPayload {
            version: wire::PROTOCOL_VERSION,
            merkle_root,
            prev_tx_id,
            delta_flags: flags,
            moves: packets,
            btc_delta,
            nist_delta,
        };
        let body = codec::encode_heartbeat(&payload).map_err(OrchestratorError::from)?;
        let framed = frame_payload(wire::HEARTBEAT_PREFIX, self.game_id_tag, &body);

        let policy = RetryPolicy {
            max_attempts: 1,
            base_backoff_ms: 0,
            multiplier: 1.0,
            max_backoff_ms: 0,
            per_attempt_deadline_ms: None,
            unknown_retry_limit: self.config.send_error_retry_limit,
        };

        match self
            .send_with_retry(&self.to_address.clone(), framed.as_bytes(), false, &policy)
            .await
        {
            Ok(tx_id) => {
                self.consecutive_failures.store(0, Ordering::Release);
                let mut inner = self.inner.lock().await;
                inner.anchor_chain.push(AnchorChainEntry {
                    tx_id,
                    anchor_type: AnchorType::Heartbeat,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                    move_count: Some(new_moves.len() as u8),
                    delta_flags: Some(flags),
                });
                Ok(true)
            }
            Err(err) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                self.events.emit(AnchorEvent::AnchorFailed {
                    anchor_type: AnchorType::Heartbeat,
                    error: err,
                });
                if failures >= self.config.heartbeat_max_consecutive_failures {
                    let mut inner = self.inner.lock().await;
                    inner.heartbeats_enabled = false;
                }
                Ok(false)
            }
        }
    }

    /// Re-arm the heartbeat timer after a consecutive-failure backoff.
    pub async fn rearm_heartbeats(&self) {
        tokio::time::sleep(Duration::from_millis(self.config.heartbeat_backoff_rearm_ms)).await;
        self.consecutive_failures.store(0, Ordering::Release);
        let mut inner = self.inner.lock().await;
        if inner.state == OrchestratorState::Running {
            inner.heartbeats_enabled = true;
        }
    }

    /// `Running → Finalizing`: stop accepting new heartbeats, wait for
    /// any in-flight send to settle, then send the final anchor.
    pub async fn anchor_final_state(
        &self,
        final_score: u32,
        coins_collected: u32,
        race_time_ms: u32,
        outcome_code: OutcomeCode,
    ) -> Result<TxId, OrchestratorError> {
        {
            let mut inner = self.inner.lock().await;
            inner.state = OrchestratorState::Finalizing;
            inner.heartbeats_enabled = false;
        }

        let grace = Duration::from_millis(self.config.final_send_inflight_grace_ms);
        let deadline = tokio::time::Instant::now() + grace;
        while self.sending_heartbeat.load(Ordering::Acquire) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let all_moves = self.vault.all_moves();
        let tree = MerkleTree::build_from_moves(&all_moves);
        let mut final_merkle_root = [0u8; 32];
        if let Ok(bytes) = hex::decode(tree.root()) {
            if bytes.len() == 32 {
                final_merkle_root.copy_from_slice(&bytes);
            }
        }

        let (genesis_tx_id, prev_tx_id) = {
            let inner = self.inner.lock().await;
            let genesis = Self::genesis_tx_id(&inner.anchor_chain)
                .ok_or_else(|| OrchestratorError::FinalFailed("no genesis anchor in chain".to_string()))?;
            let prev = Self::last_tx_id(&inner.anchor_chain).unwrap_or(genesis);
            (genesis, prev)
        };

        let payload = FinalPayload {
            final_merkle_root,
            genesis_tx_id,
            prev_tx_id,
            result_leaf_hash: Self::result_leaf_hash(final_score, coins_collected, outcome_code, race_time_ms),
            final_score,
            coins_collected,
            race_time_ms,
            outcome_code,
            total_moves: all_moves.len().min(u8::MAX as usize) as u8,
        };
        let body = codec::encode_final(&payload).map_err(OrchestratorError::from)?;
        let framed = frame_payload(wire::FINAL_PREFIX, self.game_id_tag, &body);

        {
            let mut inner = self.inner.lock().await;
            inner.last_final_bytes = Some(framed.clone().into_bytes());
        }

        self.send_final_bytes(framed.into_bytes()).await
    }

    async fn send_final_bytes(&self, framed_bytes: Vec<u8>) -> Result<TxId, OrchestratorError> {
        let policy = RetryPolicy {
            max_attempts: self.config.final_send_max_attempts,
            base_backoff_ms: self.config.genesis_send_base_backoff_ms,
            multiplier: self.config.genesis_send_backoff_multiplier,
            max_backoff_ms: self.config.final_send_max_backoff_ms,
            per_attempt_deadline_ms: None,
            unknown_retry_limit: self.config.send_error_retry_limit,
        };

        match self
            .send_with_retry(&self.to_address.clone(), &framed_bytes, false, &policy)
            .await
        {
            Ok(tx_id) => {
                {
                    let mut inner = self.inner.lock().await;
                    inner.anchor_chain.push(AnchorChainEntry {
                        tx_id,
                        anchor_type: AnchorType::Final,
                        timestamp: chrono::Utc::now().timestamp_millis(),
                        move_count: None,
                        delta_flags: None,
                    });
                    inner.state = OrchestratorState::Complete;
                }
                self.consolidate_utxos().await;
                Ok(tx_id)
            }
            Err(err) => {
                self.events.emit(AnchorEvent::AnchorFailed { anchor_type: AnchorType::Final, error: err.clone() });
                Err(OrchestratorError::FinalFailed(err.to_string()))
            }
        }
    }

    async fn consolidate_utxos(&self) {
        for attempt in 1..=self.config.final_consolidation_max_attempts {
            match self.runtime.ledger.consolidate_utxos(&self.from_address, 1).await {
                Ok(_) => return,
                Err(err) => {
                    let classified = SendError::classify(&err.to_string());
                    if !classified.is_retryable() {
                        return;
                    }
                    tracing::warn!(attempt, %classified, "utxo consolidation attempt failed");
                }
            }
        }
    }

    /// User-initiated retry of the final anchor using the previously
    /// packed bytes, for use when `anchor_final_state` exhausted its
    /// attempts.
    pub async fn retry_final_anchor(&self) -> Result<TxId, OrchestratorError> {
        let bytes = {
            let inner = self.inner.lock().await;
            inner.last_final_bytes.clone()
        };
        match bytes {
            Some(bytes) => self.send_final_bytes(bytes).await,
            None => Err(OrchestratorError::FinalFailed("no final anchor pending retry".to_string())),
        }
    }

    pub async fn anchor_chain(&self) -> Vec<AnchorChainEntry> {
        self.inner.lock().await.anchor_chain.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NullEventSink;
    use crate::ledger::LedgerError;
    use crate::types::{Hash256, UtxoEntry};
    use crate::utxo_pool::UtxoPoolConfig;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32 as StdAtomicU32;

    struct FlakyLedger {
        fail_times: StdAtomicU32,
    }

    #[async_trait]
    impl crate::ledger::LedgerAdapter for FlakyLedger {
        async fn manual_send(&self, _req: SendRequest<'_>) -> Result<Hash256, LedgerError> {
            if self.fail_times.load(Ordering::Acquire) > 0 {
                self.fail_times.fetch_sub(1, Ordering::AcqRel);
                return Err(LedgerError::SendFailed("mempool conflict".to_string()));
            }
            Ok([7u8; 32])
        }
        async fn get_utxos(&self, _address: &str) -> Result<Vec<UtxoEntry>, LedgerError> {
            Ok(Vec::new())
        }
        async fn split_utxos(&self, _address: &str, _split_count: usize) -> Result<Hash256, LedgerError> {
            Ok([0u8; 32])
        }
        async fn consolidate_utxos(&self, _address: &str, _target_count: usize) -> Result<Hash256, LedgerError> {
            Ok([0u8; 32])
        }
        async fn walk_dag_range(
            &self,
            _start_hash: Hash256,
            _end_hash: Hash256,
            _prefixes: &[[u8; 4]],
        ) -> Result<Vec<(Hash256, Vec<u8>)>, LedgerError> {
            Ok(Vec::new())
        }
    }

    fn fast_config() -> AnchorConfig {
        let mut cfg = AnchorConfig::default();
        cfg.genesis_send_base_backoff_ms = 1;
        cfg.genesis_send_max_backoff_ms = 2;
        cfg.final_send_max_backoff_ms = 2;
        cfg.genesis_send_attempt_deadline_ms = 5_000;
        cfg.heartbeat_backoff_rearm_ms = 1;
        cfg
    }

    fn test_orchestrator(ledger: FlakyLedger) -> AnchorOrchestrator {
        let runtime = Arc::new(Runtime::new(Arc::new(ledger)));
        let vrf = Arc::new(VrfChainEngine::new("game-1"));
        let vault = Arc::new(MoveVault::new());
        let pool = Arc::new(UtxoPool::new(UtxoPoolConfig::default(), Arc::new(NullEventSink)));
        AnchorOrchestrator::new(
            fast_config(),
            runtime,
            vrf,
            vault,
            pool,
            Arc::new(NullEventSink),
            "game-1",
            "kaspa:from",
            "kaspa:to",
            vec![],
        )
    }

    #[tokio::test]
    async fn genesis_succeeds_and_enables_heartbeats() {
        let orch = test_orchestrator(FlakyLedger { fail_times: StdAtomicU32::new(0) });
        orch.start().await;
        let tx_id = orch
            .anchor_genesis_seed([1u8; 32], [2u8; 32], vec![], 0, 100, 0, [0u8; 64], [0u8; 512])
            .await
            .unwrap();
        assert_eq!(tx_id.0, [7u8; 32]);
        assert_eq!(orch.state().await, OrchestratorState::Running);
    }

    #[tokio::test]
    async fn genesis_retries_through_transient_failures() {
        let orch = test_orchestrator(FlakyLedger { fail_times: StdAtomicU32::new(2) });
        orch.start().await;
        let result = orch
            .anchor_genesis_seed([1u8; 32], [2u8; 32], vec![], 0, 100, 0, [0u8; 64], [0u8; 512])
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn heartbeat_is_noop_before_genesis_confirms() {
        let orch = test_orchestrator(FlakyLedger { fail_times: StdAtomicU32::new(0) });
        orch.start().await;
        let sent = orch.send_heartbeat_anchor().await.unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn full_lifecycle_genesis_heartbeat_final() {
        let orch = test_orchestrator(FlakyLedger { fail_times: StdAtomicU32::new(0) });
        orch.start().await;
        orch.anchor_genesis_seed([1u8; 32], [2u8; 32], vec![], 0, 100, 0, [0u8; 64], [0u8; 512])
            .await
            .unwrap();

        orch.vault.record_move(crate::types::Move {
            sequence: 0,
            action: "none".to_string(),
            action_code: 0,
            payload: crate::types::ActionPayload::Lane(1),
            timestamp: 0,
            time_delta: 1,
            value: 0,
            vrf_fragment: [1, 2, 3, 4],
            vrf_output: [0u8; 32],
            entropy_snapshot: crate::types::EntropySnapshot::default(),
        });

        let sent = orch.send_heartbeat_anchor().await.unwrap();
        assert!(sent);

        let final_tx = orch
            .anchor_final_state(100, 5, 20_000, OutcomeCode::Complete)
            .await
            .unwrap();
        assert_eq!(final_tx.0, [7u8; 32]);
        assert_eq!(orch.state().await, OrchestratorState::Complete);
        assert_eq!(orch.anchor_chain().await.len(), 3);
    }
}
