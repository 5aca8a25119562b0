//! Global constants for the anchor protocol.
//!
//! Centralizes the wire-format and timing magic numbers named in the
//! protocol spec so they have exactly one definition site.

/// Binary layout constants (spec §4.1).
pub mod wire {
    /// Current encode-path protocol version. The decoder additionally
    /// tolerates `version < 5` heartbeats under the legacy v4 layout.
    pub const PROTOCOL_VERSION: u8 = 5;
    pub const LEGACY_HEARTBEAT_VERSION: u8 = 4;

    pub const GENESIS_PAYLOAD_LEN: usize = 858;
    pub const GENESIS_BTC_HASH_SLOTS: usize = 6;

    pub const HEARTBEAT_HEADER_LEN: usize = 70;
    pub const LEGACY_HEARTBEAT_HEADER_LEN: usize = 68;

    pub const FINAL_PAYLOAD_LEN: usize = 144;

    pub const STANDARD_MOVE_PACKET_LEN: usize = 8;
    pub const EXTENDED_MOVE_PACKET_LEN: usize = 16;

    pub const BTC_DELTA_LEN: usize = 32;
    pub const NIST_DELTA_LEN: usize = 8 + 64 + 512;

    /// ASCII "KGEN" / "KHRT" / "KEND" framing prefixes (spec §6).
    pub const GENESIS_PREFIX: [u8; 4] = *b"KGEN";
    pub const HEARTBEAT_PREFIX: [u8; 4] = *b"KHRT";
    pub const FINAL_PREFIX: [u8; 4] = *b"KEND";
}

/// Protocol timing and batching defaults (spec §6 configuration table).
/// These are the *defaults*; `AnchorConfig` may override every one.
pub mod defaults {
    pub const ANCHOR_BATCH_MS: u64 = 500;
    pub const ANCHOR_AMOUNT: f64 = 0.5;
    pub const UTXO_SPLIT_COUNT: usize = 10;
    pub const UTXO_LOW_THRESHOLD: usize = 3;
    pub const UTXO_USABLE_THRESHOLD_KAS: f64 = 0.6;
    pub const TIME_DELTA_SCALE_MS: u64 = 4;
    pub const MAX_MOVES_PER_HEARTBEAT: usize = 255;
    pub const NOP_HEARTBEAT_MS: u64 = 1020;

    pub const GENESIS_SEND_MAX_ATTEMPTS: u32 = 5;
    pub const GENESIS_SEND_BASE_BACKOFF_MS: u64 = 1500;
    pub const GENESIS_SEND_BACKOFF_MULTIPLIER: f64 = 1.5;
    pub const GENESIS_SEND_MAX_BACKOFF_MS: u64 = 10_000;
    pub const GENESIS_SEND_ATTEMPT_DEADLINE_MS: u64 = 30_000;

    pub const FINAL_SEND_MAX_ATTEMPTS: u32 = 10;
    pub const FINAL_SEND_MAX_BACKOFF_MS: u64 = 15_000;
    pub const FINAL_SEND_INFLIGHT_GRACE_MS: u64 = 2_000;
    pub const FINAL_CONSOLIDATION_MAX_ATTEMPTS: u32 = 3;

    pub const HEARTBEAT_MAX_CONSECUTIVE_FAILURES: u32 = 5;
    pub const HEARTBEAT_BACKOFF_REARM_MS: u64 = 500;

    pub const UTXO_RESERVATION_MAX_AGE_MS: i64 = 10_000;
    pub const UTXO_REPLENISH_INTERVAL_MS: u64 = 2_000;

    pub const SEND_ERROR_RETRY_LIMIT: u32 = 3;
}

/// Bounds enforced by the VRF fold primitive (spec §4.4).
pub mod fold {
    pub const DEFAULT_ITERATIONS: usize = 2;
    pub const MIN_ITERATIONS: usize = 1;
    pub const MAX_ITERATIONS: usize = 32;

    pub const MIN_POSITIONS: usize = 1;
    pub const MAX_POSITIONS: usize = 4096;

    pub const MIN_BLOCKS: usize = 1;
    pub const MAX_BLOCKS: usize = 32;

    /// Number of 256-bit blocks actually folded: exactly the two inputs
    /// (HMAC output, entropy hash) named in spec §4.4 step 4.
    pub const BLOCK_COUNT: usize = 2;

    /// Default seed suffix and pre-genesis fallback seed (spec §9 Open
    /// Question — load-bearing for audit determinism).
    pub const FALLBACK_SEED: &[u8] = b"kktp";
}
