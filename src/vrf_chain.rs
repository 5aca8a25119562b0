//! VRF chain engine (spec §4.4): a deterministic, replayable per-move
//! VRF step seeded by gameplay entropy and folded through the genesis
//! transaction id once it confirms.

use crate::constants::fold as fold_bounds;
use crate::crypto::{fold, sha256, sha256_concat, hmac_sha256};
use crate::error::VrfError;
use crate::types::{ActionPayload, EntropySnapshot, Fragment4, Hash256};
use tokio::sync::Mutex;

/// Output of one VRF step: the full 32-byte output and its 4-byte wire
/// fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VrfStepOutput {
    pub output: Hash256,
    pub fragment: Fragment4,
}

/// Inputs to one VRF step, mirroring spec §4.4's `{action, lane|xyz,
/// timeDelta}` plus the move's entropy snapshot.
pub struct VrfStepInput<'a> {
    pub action_code: u8,
    pub payload: &'a ActionPayload,
    pub time_delta: u8,
    pub snapshot: &'a EntropySnapshot,
}

struct VrfInner {
    state: Option<Hash256>,
    genesis_reinforced: bool,
    genesis_tx_id: Option<Hash256>,
    pending_btc_delta: Option<[u8; 32]>,
    pending_nist_delta: Option<crate::types::NistPulse>,
}

/// The per-game VRF chain. Every method that touches `state` takes the
/// single-slot coalescing mutex so two concurrent moves can never
/// interleave a read and a write (spec §5).
pub struct VrfChainEngine {
    inner: Mutex<VrfInner>,
    game_id: String,
}

impl VrfChainEngine {
    pub fn new(game_id: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(VrfInner {
                state: None,
                genesis_reinforced: false,
                genesis_tx_id: None,
                pending_btc_delta: None,
                pending_nist_delta: None,
            }),
            game_id: game_id.into(),
        }
    }

    /// Record the confirmed genesis transaction id. The next step (and
    /// only the next step) folds it into the chain state before
    /// computing its VRF output; moves already computed are never
    /// retroactively reseeded (spec §9 Open Question).
    pub async fn notify_genesis_tx_id(&self, tx_id: Hash256) {
        let mut inner = self.inner.lock().await;
        inner.genesis_tx_id = Some(tx_id);
    }

    /// Build the seed for the *current* step. Must be called under the
    /// lock, after any pending genesis reinforcement has been applied,
    /// so `fold_seed`'s branch reflects the state this step should use.
    fn current_fold_seed(&self, inner: &VrfInner) -> Vec<u8> {
        if let Some(tx_id) = inner.genesis_tx_id {
            let mut seed = Vec::with_capacity(32 + self.game_id.len() + fold_bounds::FALLBACK_SEED.len());
            seed.extend_from_slice(&tx_id);
            seed.extend_from_slice(self.game_id.as_bytes());
            seed.extend_from_slice(fold_bounds::FALLBACK_SEED);
            seed
        } else {
            fold_bounds::FALLBACK_SEED.to_vec()
        }
    }

    /// Execute one VRF step, lazily initializing state on the first
    /// move and applying the one-time genesis reinforcement if a
    /// genesis txid is pending and has not yet been folded in.
    pub async fn step(
        &self,
        player_id: &str,
        first_move_timestamp: i64,
        input: VrfStepInput<'_>,
    ) -> Result<VrfStepOutput, VrfError> {
        let mut inner = self.inner.lock().await;

        if inner.state.is_none() {
            let seed_str = format!("{player_id}:{}:{first_move_timestamp}", self.game_id);
            inner.state = Some(sha256(seed_str.as_bytes()));
        }

        if !inner.genesis_reinforced {
            if let Some(tx_id) = inner.genesis_tx_id {
                let state = inner.state.expect("seeded above");
                inner.state = Some(sha256_concat(&[&state, &tx_id]));
                inner.genesis_reinforced = true;
            }
        }

        let state = inner.state.expect("seeded above");

        let mut data_buffer = Vec::with_capacity(32 + 1 + 6 + 96);
        data_buffer.extend_from_slice(&state);
        data_buffer.push(input.action_code);
        match input.payload {
            ActionPayload::Coord(coord) => {
                data_buffer.extend_from_slice(&crate::crypto::coord::encode_coord14(coord.x).to_be_bytes());
                data_buffer.extend_from_slice(&crate::crypto::coord::encode_coord14(coord.y).to_be_bytes());
                data_buffer.extend_from_slice(&crate::crypto::coord::encode_coord14(coord.z).to_be_bytes());
            }
            ActionPayload::Lane(lane) => {
                data_buffer.push(*lane);
            }
        }
        data_buffer.push(input.time_delta);

        data_buffer.extend_from_slice(&input.snapshot.nist_output_hash);
        data_buffer.extend_from_slice(&input.snapshot.btc_hash);
        data_buffer.extend_from_slice(&input.snapshot.kaspa_block_hash);

        let hmac = hmac_sha256(&state, &data_buffer);
        let entropy_hash = sha256_concat(&[
            &input.snapshot.kaspa_block_hash,
            &input.snapshot.nist_output_hash,
            &input.snapshot.btc_hash,
        ]);

        let seed = self.current_fold_seed(&inner);
        let fold_bits = fold::fold(
            &hex::encode(hmac),
            &hex::encode(entropy_hash),
            &seed,
            fold_bounds::DEFAULT_ITERATIONS,
        )?;

        let output = sha256(fold_bits.as_bytes());
        let mut fragment = [0u8; 4];
        fragment.copy_from_slice(&output[0..4]);

        inner.state = Some(output);

        Ok(VrfStepOutput { output, fragment })
    }

    /// Record a freshly-observed BTC block hash, if it differs from the
    /// last one anchored. Replaces any still-pending delta.
    pub async fn observe_btc_hash(&self, hash: [u8; 32]) {
        let mut inner = self.inner.lock().await;
        inner.pending_btc_delta = Some(hash);
    }

    /// Record a freshly-observed NIST pulse, if it differs from the
    /// last one anchored.
    pub async fn observe_nist_pulse(&self, pulse: crate::types::NistPulse) {
        let mut inner = self.inner.lock().await;
        inner.pending_nist_delta = Some(pulse);
    }

    /// Drain whatever deltas are pending, for inclusion in the next
    /// heartbeat. Clears them.
    pub async fn drain_pending_deltas(&self) -> (Option<[u8; 32]>, Option<crate::types::NistPulse>) {
        let mut inner = self.inner.lock().await;
        (inner.pending_btc_delta.take(), inner.pending_nist_delta.take())
    }

    pub async fn is_genesis_reinforced(&self) -> bool {
        self.inner.lock().await.genesis_reinforced
    }
}
