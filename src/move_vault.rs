//! Move history vault (spec §3, §4.5 "drains the vault's newly appended
//! moves", §5 "Moves are appended to the vault strictly in the order
//! `record_move` is called").
//!
//! Assigns each move its sequence number, keeps the full ordered
//! history for Merkle rebuilds, and tracks a drain cursor so the
//! orchestrator can pull only the moves a heartbeat hasn't anchored yet.

use crate::types::Move;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct MoveVault {
    moves: RwLock<Vec<Move>>,
    drained_up_to: AtomicUsize,
}

impl MoveVault {
    pub fn new() -> Self {
        Self {
            moves: RwLock::new(Vec::new()),
            drained_up_to: AtomicUsize::new(0),
        }
    }

    /// Append a move, assigning it the next sequence number. The
    /// caller-supplied `sequence` field is overwritten to guarantee
    /// monotonicity regardless of what the game layer passed in.
    pub fn record_move(&self, mut mv: Move) -> u64 {
        let mut moves = self.moves.write();
        mv.sequence = moves.len() as u64;
        let sequence = mv.sequence;
        moves.push(mv);
        sequence
    }

    /// Full ordered history, for Merkle rebuilds and audit replay.
    pub fn all_moves(&self) -> Vec<Move> {
        self.moves.read().clone()
    }

    pub fn len(&self) -> usize {
        self.moves.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain up to `cap` moves that have not yet been included in a
    /// heartbeat, advancing the drain cursor. Returns an empty vec if
    /// nothing new has accumulated.
    pub fn drain_new_moves(&self, cap: usize) -> Vec<Move> {
        let moves = self.moves.read();
        let start = self.drained_up_to.load(Ordering::Acquire);
        if start >= moves.len() {
            return Vec::new();
        }
        let end = (start + cap).min(moves.len());
        let batch = moves[start..end].to_vec();
        self.drained_up_to.store(end, Ordering::Release);
        batch
    }

    pub fn last_anchored_move_count(&self) -> usize {
        self.drained_up_to.load(Ordering::Acquire)
    }
}

impl Default for MoveVault {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionPayload, EntropySnapshot};

    fn bare_move() -> Move {
        Move {
            sequence: 0,
            action: "none".to_string(),
            action_code: 0,
            payload: ActionPayload::Lane(0),
            timestamp: 0,
            time_delta: 0,
            value: 0,
            vrf_fragment: [0u8; 4],
            vrf_output: [0u8; 32],
            entropy_snapshot: EntropySnapshot::default(),
        }
    }

    #[test]
    fn sequence_numbers_are_assigned_monotonically() {
        let vault = MoveVault::new();
        assert_eq!(vault.record_move(bare_move()), 0);
        assert_eq!(vault.record_move(bare_move()), 1);
        assert_eq!(vault.record_move(bare_move()), 2);
        assert_eq!(vault.len(), 3);
    }

    #[test]
    fn drain_respects_cap_and_advances_cursor() {
        let vault = MoveVault::new();
        for _ in 0..10 {
            vault.record_move(bare_move());
        }
        let first_batch = vault.drain_new_moves(4);
        assert_eq!(first_batch.len(), 4);
        assert_eq!(first_batch[0].sequence, 0);
        assert_eq!(first_batch[3].sequence, 3);

        let second_batch = vault.drain_new_moves(4);
        assert_eq!(second_batch[0].sequence, 4);

        let remainder = vault.drain_new_moves(10);
        assert_eq!(remainder.len(), 2);

        assert_eq!(vault.drain_new_moves(10).len(), 0);
    }

    #[test]
    fn all_moves_survives_draining() {
        let vault = MoveVault::new();
        vault.record_move(bare_move());
        vault.record_move(bare_move());
        let _ = vault.drain_new_moves(1);
        assert_eq!(vault.all_moves().len(), 2);
    }
}
