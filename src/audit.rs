//! Audit verifier (spec §4.7): five ordered checks over a completed
//! match's anchor chain. Grounded on the teacher's
//! `finality_proof.rs::FinalityProofManager` accumulate-then-verdict
//! style — every check runs to completion and appends to `reasons`
//! (fatal) or `warnings` (advisory); nothing here ever panics or
//! short-circuits on the first failure, so an operator sees every
//! defect in one pass.

use crate::crypto::sha256;
use crate::entropy::{verify_nist_signature, EntropyLookupError, ExternalEntropySource};
use crate::merkle::MerkleTree;
use crate::types::{AnchorChainEntry, AnchorPayload, AnchorType, FinalPayload, GenesisPayload, Move};
use crate::vrf_chain::{VrfChainEngine, VrfStepInput};
use serde::{Deserialize, Serialize};

/// One anchor transaction as observed on the ledger, paired with its
/// decoded payload. Serializable so a simulator can hand a completed
/// match's chain to the audit CLI as a plain JSON file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnchoredRecord {
    pub entry: AnchorChainEntry,
    pub payload: AnchorPayload,
}

/// Everything the verifier needs to re-derive a verdict without
/// touching the network itself (network lookups go through
/// `ExternalEntropySource`, injected separately).
pub struct AuditInput<'a> {
    pub game_id: &'a str,
    pub player_id: &'a str,
    pub first_move_timestamp: i64,
    pub chain: &'a [AnchoredRecord],
    /// The full, claimed, in-order move history (reconstructed from the
    /// heartbeats' moves sections).
    pub moves: &'a [Move],
    /// DER-encoded NIST beacon public key, if signature verification is
    /// requested; `None` skips step 2's signature check (still resolves
    /// pulse existence/value).
    pub nist_public_key_der: Option<&'a [u8]>,
}

/// Outcome of a full audit pass. `passed` is true only when `reasons`
/// is empty; `warnings` never affect `passed`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditVerdict {
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
}

impl AuditVerdict {
    pub fn passed(&self) -> bool {
        self.reasons.is_empty()
    }

    fn fail(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }

    fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

pub struct AuditVerifier<'a> {
    entropy: &'a dyn ExternalEntropySource,
}

impl<'a> AuditVerifier<'a> {
    pub fn new(entropy: &'a dyn ExternalEntropySource) -> Self {
        Self { entropy }
    }

    pub async fn verify(&self, input: &AuditInput<'_>) -> AuditVerdict {
        let mut verdict = AuditVerdict::default();

        let (genesis, final_payload) = match self.check_structural(input, &mut verdict) {
            Some(parts) => parts,
            None => return verdict,
        };

        self.check_external_entropy(input, genesis, &mut verdict).await;
        self.check_final_result_hash(final_payload, &mut verdict);
        self.check_merkle_reconciliation(input, final_payload, &mut verdict);
        self.check_vrf_replay(input, &mut verdict).await;

        verdict
    }

    /// Check 1 — structural: the chain opens with Genesis, closes with
    /// Final, every entry's linkage (`prevTxId`) points at the entry
    /// before it, and the final anchor's `genesisTxId` matches the
    /// opening entry. Returns the decoded genesis/final payloads for
    /// later checks, or `None` if the chain is too malformed to proceed.
    fn check_structural<'b>(
        &self,
        input: &AuditInput<'b>,
        verdict: &mut AuditVerdict,
    ) -> Option<(&'b GenesisPayload, &'b FinalPayload)> {
        if input.chain.is_empty() {
            verdict.fail("anchor chain is empty");
            return None;
        }

        let first = &input.chain[0];
        let genesis = match &first.payload {
            AnchorPayload::Genesis(g) => g,
            _ => {
                verdict.fail("anchor chain does not open with a genesis anchor");
                return None;
            }
        };

        let last = &input.chain[input.chain.len() - 1];
        let final_payload = match &last.payload {
            AnchorPayload::Final(f) => f,
            _ => {
                verdict.fail("anchor chain does not close with a final anchor");
                return None;
            }
        };

        if final_payload.genesis_tx_id != first.entry.tx_id {
            verdict.fail("final anchor's genesisTxId does not match the chain's opening genesis");
        }

        let expected_game_id_hash = sha256(input.game_id.as_bytes());
        if genesis.game_id_hash != expected_game_id_hash {
            verdict.fail("genesis anchor's gameIdHash does not match the supplied game id");
        }

        for (idx, record) in input.chain.iter().enumerate().skip(1) {
            let prev_tx_id = match &record.payload {
                AnchorPayload::Heartbeat(h) => h.prev_tx_id,
                AnchorPayload::Final(f) => f.prev_tx_id,
                AnchorPayload::Genesis(_) => {
                    verdict.fail(format!("chain entry {idx} is an unexpected second genesis anchor"));
                    continue;
                }
            };
            if prev_tx_id != input.chain[idx - 1].entry.tx_id {
                verdict.fail(format!(
                    "chain entry {idx} (type {:?}) prevTxId does not match the preceding anchor's txid",
                    record.entry.anchor_type
                ));
            }
        }

        let claimed_total_moves: u32 = input
            .chain
            .iter()
            .filter(|r| r.entry.anchor_type == AnchorType::Heartbeat)
            .map(|r| r.entry.move_count.unwrap_or(0) as u32)
            .sum();
        if claimed_total_moves != final_payload.total_moves as u32 {
            verdict.fail(format!(
                "final anchor's totalMoves ({}) does not match the sum of heartbeat move counts ({})",
                final_payload.total_moves, claimed_total_moves
            ));
        }
        if input.moves.len() as u32 != claimed_total_moves {
            verdict.fail(format!(
                "supplied move history has {} moves but heartbeats claim {}",
                input.moves.len(),
                claimed_total_moves
            ));
        }

        Some((genesis, final_payload))
    }

    /// Check 2 — external entropy: every BTC block hash embedded in the
    /// genesis anchor resolves at the configured block explorer, and the
    /// NIST pulse's output value (and, if a public key was supplied, its
    /// signature) verifies. Source-unreachable failures are warnings,
    /// not reasons — an audit run without network access should not be
    /// reported as a tampered match.
    async fn check_external_entropy(
        &self,
        input: &AuditInput<'_>,
        genesis: &GenesisPayload,
        verdict: &mut AuditVerdict,
    ) {
        for hash in &genesis.btc_block_hashes {
            if *hash == [0u8; 32] {
                continue;
            }
            match self.entropy.resolve_btc_block(hash).await {
                Ok(()) => {}
                Err(EntropyLookupError::Unreachable) => {
                    verdict.warn("btc block explorer unreachable, skipping entropy cross-check");
                }
                Err(err) => verdict.fail(format!("btc block hash cross-check failed: {err}")),
            }
        }

        if genesis.nist_pulse_index != 0 {
            let signature = genesis.nist_signature;
            match self
                .entropy
                .resolve_nist_pulse(genesis.nist_pulse_index, &genesis.nist_output_hash, Some(&signature))
                .await
            {
                Ok(()) => {}
                Err(EntropyLookupError::Unreachable) => {
                    verdict.warn("nist beacon unreachable, skipping entropy cross-check");
                }
                Err(err) => verdict.fail(format!("nist pulse cross-check failed: {err}")),
            }

            if let Some(public_key_der) = input.nist_public_key_der {
                if let Err(err) = verify_nist_signature(public_key_der, &genesis.nist_output_hash, &signature) {
                    verdict.fail(format!("nist signature verification failed: {err}"));
                }
            }
        }
    }

    /// Check 3 — final result hash: recompute
    /// `SHA-256("RESULT:<finalScore>:<coinsCollected>:<outcomeCode>:<raceTimeMs>")`
    /// and compare against the anchored `resultLeafHash`.
    fn check_final_result_hash(&self, final_payload: &FinalPayload, verdict: &mut AuditVerdict) {
        let text = format!(
            "RESULT:{}:{}:{}:{}",
            final_payload.final_score,
            final_payload.coins_collected,
            final_payload.outcome_code.wire_code(),
            final_payload.race_time_ms
        );
        let recomputed = sha256(text.as_bytes());
        if recomputed != final_payload.result_leaf_hash {
            verdict.fail("final anchor's resultLeafHash does not match the recomputed result digest");
        }
    }

    /// Check 4 — Merkle reconciliation: each heartbeat's embedded root
    /// must match the cumulative root at that move boundary, and the
    /// final anchor's root must match the overall root over the full
    /// move history.
    fn check_merkle_reconciliation(
        &self,
        input: &AuditInput<'_>,
        final_payload: &FinalPayload,
        verdict: &mut AuditVerdict,
    ) {
        let mut cumulative = 0usize;
        for record in input.chain {
            let AnchorPayload::Heartbeat(h) = &record.payload else {
                continue;
            };
            let claimed_count = record.entry.move_count.unwrap_or(0) as usize;
            cumulative = (cumulative + claimed_count).min(input.moves.len());
            let prefix_root = MerkleTree::build_from_moves(&input.moves[..cumulative]).root();
            let claimed_root = hex::encode(h.merkle_root);
            if prefix_root != claimed_root {
                verdict.fail(format!(
                    "heartbeat anchor {} merkle root does not match the cumulative root at its move boundary",
                    record.entry.tx_id.to_hex()
                ));
            }
        }

        let tree = MerkleTree::build_from_moves(input.moves);
        let rebuilt_root = tree.root();
        let claimed_root = hex::encode(final_payload.final_merkle_root);
        if rebuilt_root != claimed_root {
            verdict.fail("rebuilt Merkle root over the move history does not match the final anchor's finalMerkleRoot");
        }
    }

    /// Check 5 — VRF chain replay: re-run the VRF engine over the move
    /// history in order and confirm every move's recorded
    /// `vrfFragment` matches what a clean replay produces.
    async fn check_vrf_replay(&self, input: &AuditInput<'_>, verdict: &mut AuditVerdict) {
        let engine = VrfChainEngine::new(input.game_id);
        let genesis_tx_id = input
            .chain
            .first()
            .map(|r| r.entry.tx_id.0);

        for (idx, mv) in input.moves.iter().enumerate() {
            if mv.entropy_snapshot.is_genesis_reinforced {
                if let Some(tx_id) = genesis_tx_id {
                    engine.notify_genesis_tx_id(tx_id).await;
                }
            }
            let step = engine
                .step(
                    input.player_id,
                    input.first_move_timestamp,
                    VrfStepInput {
                        action_code: mv.action_code,
                        payload: &mv.payload,
                        time_delta: mv.time_delta,
                        snapshot: &mv.entropy_snapshot,
                    },
                )
                .await;

            match step {
                Ok(output) => {
                    if output.fragment != mv.vrf_fragment {
                        verdict.fail(format!(
                            "vrf replay mismatch at move {idx}: recorded fragment does not match replayed output"
                        ));
                    }
                }
                Err(err) => {
                    verdict.fail(format!("vrf replay failed at move {idx}: {err}"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::NoopEntropySource;
    use crate::types::{ActionPayload, EntropySnapshot, FinalPayload, GenesisPayload, OutcomeCode, TxId};

    fn genesis_record(tx_id: [u8; 32], game_id: &str) -> AnchoredRecord {
        let payload = GenesisPayload {
            game_id_hash: sha256(game_id.as_bytes()),
            vrf_seed_hash: [0u8; 32],
            btc_block_hashes: vec![],
            start_daa_score: 0,
            end_daa_score: 0,
            nist_pulse_index: 0,
            nist_output_hash: [0u8; 64],
            nist_signature: [0u8; 512],
        };
        AnchoredRecord {
            entry: AnchorChainEntry {
                tx_id: TxId(tx_id),
                anchor_type: AnchorType::Genesis,
                timestamp: 0,
                move_count: None,
                delta_flags: None,
            },
            payload: AnchorPayload::Genesis(payload),
        }
    }

    fn sample_move() -> Move {
        Move {
            sequence: 0,
            action: "none".to_string(),
            action_code: 0,
            payload: ActionPayload::Lane(2),
            timestamp: 0,
            time_delta: 1,
            value: 0,
            vrf_fragment: [0, 0, 0, 0],
            vrf_output: [0u8; 32],
            entropy_snapshot: EntropySnapshot::default(),
        }
    }

    #[tokio::test]
    async fn empty_chain_fails_structurally_and_stops() {
        let entropy = NoopEntropySource;
        let verifier = AuditVerifier::new(&entropy);
        let input = AuditInput {
            game_id: "g",
            player_id: "p",
            first_move_timestamp: 0,
            chain: &[],
            moves: &[],
            nist_public_key_der: None,
        };
        let verdict = verifier.verify(&input).await;
        assert!(!verdict.passed());
        assert_eq!(verdict.reasons.len(), 1);
    }

    #[tokio::test]
    async fn mismatched_result_hash_is_flagged() {
        let entropy = NoopEntropySource;
        let verifier = AuditVerifier::new(&entropy);
        let genesis = genesis_record([1u8; 32], "game-1");
        let genesis_tx = genesis.entry.tx_id;

        let tree = MerkleTree::build_from_moves(&[sample_move()]);
        let mut final_merkle_root = [0u8; 32];
        final_merkle_root.copy_from_slice(&hex::decode(tree.root()).unwrap());

        let final_payload = FinalPayload {
            final_merkle_root,
            genesis_tx_id: genesis_tx,
            prev_tx_id: genesis_tx,
            result_leaf_hash: [0xFFu8; 32],
            final_score: 10,
            coins_collected: 1,
            race_time_ms: 500,
            outcome_code: OutcomeCode::Complete,
            total_moves: 1,
        };
        let final_record = AnchoredRecord {
            entry: AnchorChainEntry {
                tx_id: TxId([2u8; 32]),
                anchor_type: AnchorType::Final,
                timestamp: 0,
                move_count: None,
                delta_flags: None,
            },
            payload: AnchorPayload::Final(final_payload),
        };

        let chain = vec![genesis, final_record];
        let moves = vec![sample_move()];
        let input = AuditInput {
            game_id: "game-1",
            player_id: "player-1",
            first_move_timestamp: 0,
            chain: &chain,
            moves: &moves,
            nist_public_key_der: None,
        };
        let verdict = verifier.verify(&input).await;
        assert!(!verdict.passed());
        assert!(verdict.reasons.iter().any(|r| r.contains("resultLeafHash")));
    }
}
