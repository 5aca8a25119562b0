//! The VRF chain's `fold` primitive (spec §4.4).
//!
//! Takes two hex-encoded 256-bit blocks and a seed, and performs a
//! bounded recursive bit-extraction: each iteration derives a fresh set
//! of bit positions (from the seed on iteration 0, from the previous
//! iteration's extracted bitstring afterward), pulls one bit per
//! position from the two input blocks round-robin, and the final
//! iteration's bitstring is whitened with one more SHA-256 pass. The
//! result is part of the audit wire contract — do not change the
//! position-derivation or round-robin order.

use crate::constants::fold as bounds;
use crate::crypto::sha::sha256;
use crate::error::VrfError;

const BITS_PER_BLOCK: usize = 256;
const NUM_POSITIONS: usize = 256;

struct Block {
    bits: [bool; BITS_PER_BLOCK],
    valid: bool,
}

impl Block {
    fn from_hex(hex_str: &str) -> Self {
        let bytes = match hex::decode(hex_str) {
            Ok(b) if b.len() == 32 => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&b);
                arr
            }
            _ => sha256(hex_str.as_bytes()),
        };
        Self {
            bits: bytes_to_bits(&bytes),
            valid: true,
        }
    }

    fn bit_at(&self, position: usize) -> bool {
        self.bits[position % BITS_PER_BLOCK]
    }
}

fn bytes_to_bits(bytes: &[u8; 32]) -> [bool; BITS_PER_BLOCK] {
    let mut bits = [false; BITS_PER_BLOCK];
    for (byte_idx, byte) in bytes.iter().enumerate() {
        for bit_idx in 0..8 {
            bits[byte_idx * 8 + bit_idx] = (byte >> (7 - bit_idx)) & 1 == 1;
        }
    }
    bits
}

fn bits_to_bitstring(bits: &[bool]) -> String {
    bits.iter().map(|b| if *b { '1' } else { '0' }).collect()
}

/// Expand `seed` via counter-mode SHA-256 into `count` position indices,
/// each reduced modulo `modulus`.
fn derive_positions(seed: &[u8], count: usize, modulus: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(count);
    let mut counter: u32 = 0;
    while out.len() < count {
        let mut buf = Vec::with_capacity(seed.len() + 4);
        buf.extend_from_slice(seed);
        buf.extend_from_slice(&counter.to_be_bytes());
        let digest = sha256(&buf);
        for byte in digest.iter() {
            if out.len() >= count {
                break;
            }
            out.push((*byte as usize) % modulus);
        }
        counter += 1;
    }
    out
}

fn validate_bounds(num_positions: usize, iterations: usize, num_blocks: usize) -> Result<(), VrfError> {
    if !(bounds::MIN_POSITIONS..=bounds::MAX_POSITIONS).contains(&num_positions) {
        return Err(VrfError::FoldingValidationError {
            field: "numPositions",
            value: num_positions,
        });
    }
    if !(bounds::MIN_ITERATIONS..=bounds::MAX_ITERATIONS).contains(&iterations) {
        return Err(VrfError::FoldingValidationError {
            field: "iterations",
            value: iterations,
        });
    }
    if !(bounds::MIN_BLOCKS..=bounds::MAX_BLOCKS).contains(&num_blocks) {
        return Err(VrfError::FoldingValidationError {
            field: "blocks",
            value: num_blocks,
        });
    }
    Ok(())
}

/// Fold two hex-encoded 256-bit inputs into a 256-char bitstring.
///
/// `iterations` defaults to `fold::DEFAULT_ITERATIONS` (2) and must lie
/// in `[1, 32]`; callers outside `vrf_chain.rs` should pass the default
/// unless they are deliberately testing the bound enforcement.
pub fn fold(hex_a: &str, hex_b: &str, seed: &[u8], iterations: usize) -> Result<String, VrfError> {
    validate_bounds(NUM_POSITIONS, iterations, bounds::BLOCK_COUNT)?;

    let blocks = [Block::from_hex(hex_a), Block::from_hex(hex_b)];

    let mut positions = derive_positions(seed, NUM_POSITIONS, BITS_PER_BLOCK);
    let mut bitstring = String::new();

    for iteration in 0..iterations {
        let mut extracted = Vec::with_capacity(NUM_POSITIONS);
        for (i, &position) in positions.iter().enumerate() {
            let mut picked = None;
            for attempt in 0..blocks.len() {
                let block = &blocks[(i + attempt) % blocks.len()];
                if block.valid {
                    picked = Some(block.bit_at(position));
                    break;
                }
                tracing::warn!(iteration, position, attempt, "fold: skipped invalid block");
            }
            if let Some(bit) = picked {
                extracted.push(bit);
            }
        }

        if extracted.is_empty() {
            return Err(VrfError::FoldingExtractionError { iteration });
        }

        bitstring = bits_to_bitstring(&extracted);

        if iteration + 1 < iterations {
            positions = derive_positions(bitstring.as_bytes(), NUM_POSITIONS, BITS_PER_BLOCK);
        }
    }

    let whitened = sha256(bitstring.as_bytes());
    Ok(bits_to_bitstring(&bytes_to_bits(&whitened)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::fold::DEFAULT_ITERATIONS;

    fn hex32(byte: u8) -> String {
        hex::encode([byte; 32])
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let a = hex32(0x11);
        let b = hex32(0x22);
        let out1 = fold(&a, &b, b"seed", DEFAULT_ITERATIONS).unwrap();
        let out2 = fold(&a, &b, b"seed", DEFAULT_ITERATIONS).unwrap();
        assert_eq!(out1, out2);
        assert_eq!(out1.len(), 256);
    }

    #[test]
    fn different_seed_changes_output() {
        let a = hex32(0x11);
        let b = hex32(0x22);
        let out1 = fold(&a, &b, b"seed-one", DEFAULT_ITERATIONS).unwrap();
        let out2 = fold(&a, &b, b"seed-two", DEFAULT_ITERATIONS).unwrap();
        assert_ne!(out1, out2);
    }

    #[test]
    fn rejects_out_of_bound_iterations() {
        let a = hex32(0x11);
        let b = hex32(0x22);
        assert!(matches!(
            fold(&a, &b, b"seed", 0),
            Err(VrfError::FoldingValidationError { field: "iterations", .. })
        ));
        assert!(matches!(
            fold(&a, &b, b"seed", 33),
            Err(VrfError::FoldingValidationError { field: "iterations", .. })
        ));
    }

    #[test]
    fn non_hex_input_falls_back_to_hashing() {
        let out = fold("not-hex", "also-not-hex", b"seed", DEFAULT_ITERATIONS);
        assert!(out.is_ok());
    }
}
