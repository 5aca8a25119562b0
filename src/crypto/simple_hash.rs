//! `simple_hash_hex` — the Merkle leaf hash (spec §4.2, §9).
//!
//! This is **not** SHA-256, despite carrying a name that would suggest
//! otherwise in some deployed implementations. It is a 32-bit FNV-1a mix,
//! tiled eight times (each successive 4-byte block is the FNV-1a hash of
//! the previous block) to fill a 64-char hex string. Deployed audits
//! depend on these exact bytes — do not replace this with a "real" hash
//! function, and do not change the tiling order.

const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a(data: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Produce the 64-hex-char canonical leaf hash for an arbitrary byte
/// buffer. Callers are responsible for building a canonical buffer
/// (field order and width matter — see `leaf_bytes_for_move` in
/// `merkle.rs`).
pub fn simple_hash_hex(data: &[u8]) -> String {
    let mut block = fnv1a(data).to_be_bytes();
    let mut out = Vec::with_capacity(32);
    out.extend_from_slice(&block);
    for _ in 1..8 {
        block = fnv1a(&block).to_be_bytes();
        out.extend_from_slice(&block);
    }
    hex::encode(out)
}

/// `simple_hash_hex` applied to the concatenation of a left/right proof
/// step, as used when folding a Merkle proof back up to a root (spec
/// §4.2 "Proofs").
pub fn simple_hash_hex_concat(left: &str, right: &str) -> String {
    let mut buf = Vec::with_capacity(left.len() + right.len());
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());
    simple_hash_hex(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = simple_hash_hex(b"hello");
        let b = simple_hash_hex(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(simple_hash_hex(b"hello"), simple_hash_hex(b"world"));
    }

    #[test]
    fn concat_matches_manual() {
        let left = simple_hash_hex(b"a");
        let right = simple_hash_hex(b"b");
        let manual = simple_hash_hex(format!("{left}{right}").as_bytes());
        assert_eq!(simple_hash_hex_concat(&left, &right), manual);
    }
}
