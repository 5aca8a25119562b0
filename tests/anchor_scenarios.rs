//! End-to-end scenarios over the public API: one test per concrete
//! scenario named for the anchor protocol (single move, a mid-game BTC
//! delta, genesis reinforcement, over-cap move batching, mempool
//! conflict recovery, and forged-score detection).

use anchor_attest::audit::{AnchoredRecord, AuditInput, AuditVerifier};
use anchor_attest::config::AnchorConfig;
use anchor_attest::crypto::{sha256, encode_coord14, decode_coord14};
use anchor_attest::entropy::NoopEntropySource;
use anchor_attest::event::NullEventSink;
use anchor_attest::ledger::{InMemoryLedger, LedgerAdapter, LedgerError, SendRequest};
use anchor_attest::merkle::MerkleTree;
use anchor_attest::move_vault::MoveVault;
use anchor_attest::orchestrator::AnchorOrchestrator;
use anchor_attest::runtime::Runtime;
use anchor_attest::types::{
    ActionPayload, AnchorChainEntry, AnchorPayload, AnchorType, Coord3, EntropySnapshot,
    FinalPayload, GenesisPayload, HeartbeatPayload, Move, MovePacket, OutcomeCode,
    TxId, UtxoEntry, MOVE_ACTION_CODE, NONE_ACTION_CODE,
};
use anchor_attest::utxo_pool::{UtxoPool, UtxoPoolConfig};
use anchor_attest::vrf_chain::{VrfChainEngine, VrfStepInput};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn bare_snapshot() -> EntropySnapshot {
    EntropySnapshot::default()
}

// S1 — single move, single heartbeat, complete.
#[tokio::test]
async fn s1_single_move_single_heartbeat_complete() {
    let vrf = VrfChainEngine::new("g1");
    let coord = Coord3 { x: 1.23, y: -4.56, z: 0.00 };
    let snapshot = bare_snapshot();
    let step = vrf
        .step(
            "p",
            1000,
            VrfStepInput { action_code: MOVE_ACTION_CODE, payload: &ActionPayload::Coord(coord), time_delta: 10, snapshot: &snapshot },
        )
        .await
        .unwrap();

    let mv = Move {
        sequence: 0,
        action: "move".to_string(),
        action_code: MOVE_ACTION_CODE,
        payload: ActionPayload::Coord(coord),
        timestamp: 1000,
        time_delta: 10,
        value: 0,
        vrf_fragment: step.fragment,
        vrf_output: step.output,
        entropy_snapshot: snapshot,
    };

    let packet = MovePacket {
        action_code: mv.action_code,
        payload: mv.payload,
        time_delta: mv.time_delta,
        vrf_fragment: mv.vrf_fragment,
        value: mv.value,
    };
    let heartbeat = HeartbeatPayload {
        version: 5,
        merkle_root: [0u8; 32],
        prev_tx_id: TxId([1u8; 32]),
        delta_flags: 0,
        moves: vec![packet],
        btc_delta: None,
        nist_delta: None,
    };
    let encoded = anchor_attest::codec::encode_heartbeat(&heartbeat).unwrap();
    // 70-byte header + one 16-byte extended move packet (MOVE action).
    assert_eq!(encoded.len(), 70 + 16);

    let decoded = anchor_attest::codec::decode_heartbeat(&encoded).unwrap();
    assert_eq!(decoded.moves.len(), 1);
    match decoded.moves[0].payload {
        ActionPayload::Coord(c) => {
            assert!((c.x - 1.23).abs() < 0.01);
            assert!((c.y - (-4.56)).abs() < 0.01);
            assert_eq!(c.z, 0.00);
        }
        _ => panic!("expected a coordinate payload"),
    }

    assert_eq!(decode_coord14(encode_coord14(1.23)), 1.23);
    assert!((decode_coord14(encode_coord14(-4.56)) - (-4.56)).abs() < 0.01);

    let tree = MerkleTree::build_from_moves(&[mv]);
    assert_eq!(tree.leaf_count(), 1);
    assert!(!tree.root().is_empty());

    let result_leaf_hash = sha256(b"RESULT:0:0:1:0");
    assert_eq!(result_leaf_hash, sha256(format!("RESULT:{}:{}:{}:{}", 0, 0, OutcomeCode::Complete.wire_code(), 0).as_bytes()));
}

// S2 — a BTC delta observed mid-game is carried by the next heartbeat.
#[tokio::test]
async fn s2_btc_delta_mid_game_is_carried_by_next_heartbeat() {
    let vrf = Arc::new(VrfChainEngine::new("g2"));
    let h0 = [0xAAu8; 32];
    let h1 = [0xBBu8; 32];
    assert_ne!(h0, h1);

    vrf.observe_btc_hash(h1).await;
    let (btc_delta, nist_delta) = vrf.drain_pending_deltas().await;
    assert_eq!(btc_delta, Some(h1));
    assert!(nist_delta.is_none());

    // Once drained, a second drain before a new observation reports nothing.
    let (btc_delta_2, _) = vrf.drain_pending_deltas().await;
    assert!(btc_delta_2.is_none());

    let heartbeat = HeartbeatPayload {
        version: 5,
        merkle_root: [0u8; 32],
        prev_tx_id: TxId([2u8; 32]),
        delta_flags: anchor_attest::types::delta_flags::BTC,
        moves: vec![],
        btc_delta: Some(h1),
        nist_delta: None,
    };
    let encoded = anchor_attest::codec::encode_heartbeat(&heartbeat).unwrap();
    let decoded = anchor_attest::codec::decode_heartbeat(&encoded).unwrap();
    assert_eq!(decoded.btc_delta, Some(h1));
}

// S3 — a move computed without the one-time genesis reinforcement VRF
// replays to a different output than the live chain recorded.
#[tokio::test]
async fn s3_missing_genesis_reinforcement_fails_replay() {
    let engine = VrfChainEngine::new("g3");
    let genesis_tx_id = [0x11u8; 32];
    engine.notify_genesis_tx_id(genesis_tx_id).await;

    let snapshot = bare_snapshot();
    let live = engine
        .step("p", 1000, VrfStepInput { action_code: NONE_ACTION_CODE, payload: &ActionPayload::Lane(1), time_delta: 1, snapshot: &snapshot })
        .await
        .unwrap();
    assert!(engine.is_genesis_reinforced().await);

    // A replay engine that never learns the genesis txid computes a
    // different first-move output — the audit's VRF replay check would
    // flag this move as mismatched.
    let unreinforced_replay = VrfChainEngine::new("g3");
    let replayed = unreinforced_replay
        .step("p", 1000, VrfStepInput { action_code: NONE_ACTION_CODE, payload: &ActionPayload::Lane(1), time_delta: 1, snapshot: &snapshot })
        .await
        .unwrap();

    assert_ne!(live.output, replayed.output);
}

// S4 — a run of moves larger than one heartbeat's cap splits across two
// heartbeats with the second's prevTxId pointing at the first.
#[tokio::test]
async fn s4_over_cap_moves_split_across_heartbeats() {
    let config = AnchorConfig::default();
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.seed("from", config.utxo_split_count, 100_000_000);
    let runtime = Arc::new(Runtime::new(ledger.clone()));
    let vrf = Arc::new(VrfChainEngine::new("g4"));
    let vault = Arc::new(MoveVault::new());
    let pool = Arc::new(UtxoPool::new(UtxoPoolConfig::default(), Arc::new(NullEventSink)));
    pool.ensure_pool_ready(runtime.ledger.as_ref(), "from").await.unwrap();
    pool.prepare_for_game();

    let orchestrator = AnchorOrchestrator::new(
        config,
        runtime,
        vrf.clone(),
        vault.clone(),
        pool,
        Arc::new(NullEventSink),
        "g4",
        "from",
        "to",
        vec![0u8; 32],
    );
    orchestrator.start().await;
    orchestrator
        .anchor_genesis_seed([0u8; 32], [0u8; 32], vec![], 0, 0, 0, [0u8; 64], [0u8; 512])
        .await
        .unwrap();

    let snapshot = bare_snapshot();
    for i in 0..300u64 {
        let step = vrf
            .step("p", 0, VrfStepInput { action_code: NONE_ACTION_CODE, payload: &ActionPayload::Lane(0), time_delta: 1, snapshot: &snapshot })
            .await
            .unwrap();
        vault.record_move(Move {
            sequence: 0,
            action: "none".to_string(),
            action_code: NONE_ACTION_CODE,
            payload: ActionPayload::Lane(0),
            timestamp: i as i64,
            time_delta: 1,
            value: 0,
            vrf_fragment: step.fragment,
            vrf_output: step.output,
            entropy_snapshot: snapshot,
        });
    }

    assert!(orchestrator.send_heartbeat_anchor().await.unwrap());
    assert_eq!(vault.last_anchored_move_count(), 255);

    assert!(orchestrator.send_heartbeat_anchor().await.unwrap());
    assert_eq!(vault.last_anchored_move_count(), 300);

    let chain = orchestrator.anchor_chain().await;
    assert_eq!(chain.len(), 3); // genesis + 2 heartbeats
    assert_eq!(chain[1].move_count, Some(255));
    assert_eq!(chain[2].move_count, Some(45));
}

// S5 — the first final-anchor send is rejected as a mempool conflict;
// the orchestrator retries and the chain ends with exactly one final
// anchor.
struct FlakyOnceLedger {
    failures_remaining: AtomicU32,
}

#[async_trait]
impl LedgerAdapter for FlakyOnceLedger {
    async fn manual_send(&self, req: SendRequest<'_>) -> Result<[u8; 32], LedgerError> {
        if self.failures_remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n > 0 { Some(n - 1) } else { None }
        }).is_ok() {
            return Err(LedgerError::SendFailed("already spent in mempool".to_string()));
        }
        Ok(sha256(req.payload))
    }
    async fn get_utxos(&self, _address: &str) -> Result<Vec<UtxoEntry>, LedgerError> {
        Ok(Vec::new())
    }
    async fn split_utxos(&self, _address: &str, _split_count: usize) -> Result<[u8; 32], LedgerError> {
        Ok([0u8; 32])
    }
    async fn consolidate_utxos(&self, _address: &str, _target_count: usize) -> Result<[u8; 32], LedgerError> {
        Ok([0u8; 32])
    }
    async fn walk_dag_range(
        &self,
        _start_hash: [u8; 32],
        _end_hash: [u8; 32],
        _prefixes: &[[u8; 4]],
    ) -> Result<Vec<([u8; 32], Vec<u8>)>, LedgerError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn s5_mempool_conflict_on_final_anchor_recovers_on_retry() {
    let mut config = AnchorConfig::default();
    config.final_send_max_backoff_ms = 10;
    config.genesis_send_base_backoff_ms = 1;
    config.genesis_send_max_backoff_ms = 5;
    config.genesis_send_attempt_deadline_ms = 1000;

    let ledger: Arc<dyn LedgerAdapter> = Arc::new(FlakyOnceLedger { failures_remaining: AtomicU32::new(1) });
    let runtime = Arc::new(Runtime::new(ledger));
    let vrf = Arc::new(VrfChainEngine::new("g5"));
    let vault = Arc::new(MoveVault::new());
    let pool = Arc::new(UtxoPool::new(UtxoPoolConfig::default(), Arc::new(NullEventSink)));

    let orchestrator = AnchorOrchestrator::new(
        config,
        runtime,
        vrf,
        vault,
        pool,
        Arc::new(NullEventSink),
        "g5",
        "from",
        "to",
        vec![0u8; 32],
    );
    orchestrator.start().await;
    orchestrator
        .anchor_genesis_seed([0u8; 32], [0u8; 32], vec![], 0, 0, 0, [0u8; 64], [0u8; 512])
        .await
        .unwrap();

    orchestrator.anchor_final_state(100, 5, 2000, OutcomeCode::Complete).await.unwrap();

    let chain = orchestrator.anchor_chain().await;
    let finals = chain.iter().filter(|e| e.anchor_type == AnchorType::Final).count();
    assert_eq!(finals, 1);
}

// S6 — an altered finalScore without a recomputed resultLeafHash is
// flagged by the final-result-hash check.
#[tokio::test]
async fn s6_forged_score_without_recomputed_hash_is_flagged() {
    let genesis_payload = GenesisPayload {
        game_id_hash: sha256(b"g6"),
        vrf_seed_hash: [0u8; 32],
        btc_block_hashes: vec![],
        start_daa_score: 0,
        end_daa_score: 0,
        nist_pulse_index: 0,
        nist_output_hash: [0u8; 64],
        nist_signature: [0u8; 512],
    };
    let genesis_tx_id = TxId([7u8; 32]);
    let genesis_record = AnchoredRecord {
        entry: AnchorChainEntry {
            tx_id: genesis_tx_id,
            anchor_type: AnchorType::Genesis,
            timestamp: 0,
            move_count: None,
            delta_flags: None,
        },
        payload: AnchorPayload::Genesis(genesis_payload),
    };

    let original_score = 100u32;
    let result_leaf_hash = sha256(format!("RESULT:{}:{}:{}:{}", original_score, 5, OutcomeCode::Complete.wire_code(), 2000).as_bytes());
    // The merkle root is irrelevant to this scenario; a forged score is
    // flagged by the result-hash check regardless of what else fails.
    let final_merkle_root = [0u8; 32];

    // Attacker bumps finalScore after the fact without touching resultLeafHash.
    let forged_final = FinalPayload {
        final_merkle_root,
        genesis_tx_id,
        prev_tx_id: genesis_tx_id,
        result_leaf_hash,
        final_score: original_score + 500,
        coins_collected: 5,
        race_time_ms: 2000,
        outcome_code: OutcomeCode::Complete,
        total_moves: 0,
    };
    let final_record = AnchoredRecord {
        entry: AnchorChainEntry {
            tx_id: TxId([8u8; 32]),
            anchor_type: AnchorType::Final,
            timestamp: 0,
            move_count: None,
            delta_flags: None,
        },
        payload: AnchorPayload::Final(forged_final),
    };

    let chain = vec![genesis_record, final_record];
    let entropy = NoopEntropySource;
    let verifier = AuditVerifier::new(&entropy);
    let input = AuditInput {
        game_id: "g6",
        player_id: "p",
        first_move_timestamp: 0,
        chain: &chain,
        moves: &[],
        nist_public_key_der: None,
    };
    let verdict = verifier.verify(&input).await;

    assert!(!verdict.passed());
    assert!(verdict.reasons.iter().any(|r| r.contains("resultLeafHash")));
}
