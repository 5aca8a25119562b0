//! Move-history Merkle tree (spec §4.2).
//!
//! Leaves are `simple_hash_hex` of a canonical per-move byte buffer;
//! internal nodes fold left||right through `simple_hash_hex_concat`. An
//! odd node at any level is paired with itself (standard Bitcoin-style
//! duplication) so the tree never changes shape based on move count
//! parity. The tree is rebuilt from scratch on every heartbeat — the
//! move count per game is small enough that this is cheap, and it
//! avoids having to reconcile a persistent tree structure across moves
//! learned out of order.

use crate::crypto::simple_hash::{simple_hash_hex, simple_hash_hex_concat};
use crate::types::{ActionPayload, MerkleLeaf, Move};

/// One step of a Merkle inclusion proof: the sibling hash and whether
/// the sibling sits to the right of the node being folded.
#[derive(Clone, Debug, PartialEq)]
pub struct ProofStep {
    pub sibling: MerkleLeaf,
    pub sibling_is_right: bool,
}

/// Build the canonical leaf-hash input for one move: the MOVE action
/// hashes `{action, x, y, z, timeDelta, vrfFragment}`; every other
/// action hashes `{action, lane, timeDelta, vrfFragment}`. Field order
/// and width are part of the audit wire contract.
pub fn leaf_bytes_for_move(mv: &Move) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12);
    buf.push(mv.action_code);
    match mv.payload {
        ActionPayload::Coord(coord) => {
            buf.extend_from_slice(&crate::crypto::coord::encode_coord14(coord.x).to_be_bytes());
            buf.extend_from_slice(&crate::crypto::coord::encode_coord14(coord.y).to_be_bytes());
            buf.extend_from_slice(&crate::crypto::coord::encode_coord14(coord.z).to_be_bytes());
        }
        ActionPayload::Lane(lane) => {
            buf.push(lane);
        }
    }
    buf.push(mv.time_delta);
    buf.extend_from_slice(&mv.vrf_fragment);
    buf
}

/// Hash one move into its Merkle leaf.
pub fn leaf_hash_for_move(mv: &Move) -> MerkleLeaf {
    simple_hash_hex(&leaf_bytes_for_move(mv))
}

/// A rebuilt Merkle tree over an ordered slice of move leaves. The tree
/// over zero leaves is well-formed and roots to the empty string.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<MerkleLeaf>>,
}

impl MerkleTree {
    /// Build a tree from already-hashed leaves.
    pub fn build(leaves: Vec<MerkleLeaf>) -> Self {
        if leaves.is_empty() {
            return Self { levels: Vec::new() };
        }
        let mut levels = vec![leaves];
        while levels.last().unwrap().len() > 1 {
            let prev = levels.last().unwrap();
            let mut next = Vec::with_capacity((prev.len() + 1) / 2);
            for chunk in prev.chunks(2) {
                let left = &chunk[0];
                let right = chunk.get(1).unwrap_or(left);
                next.push(simple_hash_hex_concat(left, right));
            }
            levels.push(next);
        }
        Self { levels }
    }

    /// Convenience: hash a slice of moves and build the tree in one call.
    pub fn build_from_moves(moves: &[Move]) -> Self {
        Self::build(moves.iter().map(leaf_hash_for_move).collect())
    }

    /// The root hash, or the empty string for a tree over zero leaves.
    pub fn root(&self) -> MerkleLeaf {
        match self.levels.last() {
            Some(top) => top[0].clone(),
            None => String::new(),
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, |l| l.len())
    }

    /// Inclusion proof for the leaf at `index`, bottom level first.
    pub fn proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut steps = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            let sibling = level.get(sibling_idx).unwrap_or(&level[idx]).clone();
            steps.push(ProofStep {
                sibling,
                sibling_is_right: idx % 2 == 0,
            });
            idx /= 2;
        }
        Some(steps)
    }
}

/// Recompute a root from a leaf hash and its inclusion proof, without
/// needing the whole tree in memory (the audit path uses this).
pub fn verify_proof(leaf: &MerkleLeaf, proof: &[ProofStep], expected_root: &MerkleLeaf) -> bool {
    let mut current = leaf.clone();
    for step in proof {
        current = if step.sibling_is_right {
            simple_hash_hex_concat(&current, &step.sibling)
        } else {
            simple_hash_hex_concat(&step.sibling, &current)
        };
    }
    &current == expected_root
}
