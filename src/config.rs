//! Anchor protocol configuration (spec §6 "Configuration parameters").
//!
//! A single typed record replaces the duck-typed option bag spec.md §9
//! calls out — every parameter in the spec's table gets a named field
//! with a `#[serde(default = ...)]`, mirroring the teacher's `NodeConfig`
//! defaulting style in `config.rs`. Loadable from TOML via `toml` +
//! `serde`, same as the teacher.

use crate::constants::defaults;
use crate::types::{MOVE_ACTION_CODE, NONE_ACTION_CODE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_anchor_batch_ms() -> u64 {
    defaults::ANCHOR_BATCH_MS
}
fn default_anchor_amount() -> f64 {
    defaults::ANCHOR_AMOUNT
}
fn default_utxo_split_count() -> usize {
    defaults::UTXO_SPLIT_COUNT
}
fn default_utxo_low_threshold() -> usize {
    defaults::UTXO_LOW_THRESHOLD
}
fn default_utxo_usable_threshold_kas() -> f64 {
    defaults::UTXO_USABLE_THRESHOLD_KAS
}
fn default_time_delta_scale_ms() -> u64 {
    defaults::TIME_DELTA_SCALE_MS
}
fn default_max_moves_per_heartbeat() -> usize {
    defaults::MAX_MOVES_PER_HEARTBEAT
}
fn default_nop_heartbeat_ms() -> u64 {
    defaults::NOP_HEARTBEAT_MS
}
fn default_genesis_send_max_attempts() -> u32 {
    defaults::GENESIS_SEND_MAX_ATTEMPTS
}
fn default_genesis_send_base_backoff_ms() -> u64 {
    defaults::GENESIS_SEND_BASE_BACKOFF_MS
}
fn default_genesis_send_backoff_multiplier() -> f64 {
    defaults::GENESIS_SEND_BACKOFF_MULTIPLIER
}
fn default_genesis_send_max_backoff_ms() -> u64 {
    defaults::GENESIS_SEND_MAX_BACKOFF_MS
}
fn default_genesis_send_attempt_deadline_ms() -> u64 {
    defaults::GENESIS_SEND_ATTEMPT_DEADLINE_MS
}
fn default_final_send_max_attempts() -> u32 {
    defaults::FINAL_SEND_MAX_ATTEMPTS
}
fn default_final_send_max_backoff_ms() -> u64 {
    defaults::FINAL_SEND_MAX_BACKOFF_MS
}
fn default_final_send_inflight_grace_ms() -> u64 {
    defaults::FINAL_SEND_INFLIGHT_GRACE_MS
}
fn default_final_consolidation_max_attempts() -> u32 {
    defaults::FINAL_CONSOLIDATION_MAX_ATTEMPTS
}
fn default_heartbeat_max_consecutive_failures() -> u32 {
    defaults::HEARTBEAT_MAX_CONSECUTIVE_FAILURES
}
fn default_heartbeat_backoff_rearm_ms() -> u64 {
    defaults::HEARTBEAT_BACKOFF_REARM_MS
}
fn default_utxo_reservation_max_age_ms() -> i64 {
    defaults::UTXO_RESERVATION_MAX_AGE_MS
}
fn default_utxo_replenish_interval_ms() -> u64 {
    defaults::UTXO_REPLENISH_INTERVAL_MS
}
fn default_send_error_retry_limit() -> u32 {
    defaults::SEND_ERROR_RETRY_LIMIT
}

fn default_action_map() -> HashMap<String, u8> {
    let mut map = HashMap::new();
    map.insert("none".to_string(), NONE_ACTION_CODE);
    map.insert("move".to_string(), MOVE_ACTION_CODE);
    for code in 10u8..=15 {
        map.insert(format!("category_{code}"), code);
    }
    map
}

/// Every knob named in spec §6's configuration table, plus the action
/// map. All fields default to the spec's stated defaults, so a caller
/// only needs to override what it wants changed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnchorConfig {
    #[serde(default = "default_anchor_batch_ms")]
    pub anchor_batch_ms: u64,
    #[serde(default = "default_anchor_amount")]
    pub anchor_amount: f64,
    #[serde(default = "default_utxo_split_count")]
    pub utxo_split_count: usize,
    #[serde(default = "default_utxo_low_threshold")]
    pub utxo_low_threshold: usize,
    #[serde(default = "default_utxo_usable_threshold_kas")]
    pub utxo_usable_threshold_kas: f64,
    #[serde(default = "default_time_delta_scale_ms")]
    pub time_delta_scale_ms: u64,
    #[serde(default = "default_max_moves_per_heartbeat")]
    pub max_moves_per_heartbeat: usize,
    #[serde(default = "default_nop_heartbeat_ms")]
    pub nop_heartbeat_ms: u64,

    #[serde(default = "default_genesis_send_max_attempts")]
    pub genesis_send_max_attempts: u32,
    #[serde(default = "default_genesis_send_base_backoff_ms")]
    pub genesis_send_base_backoff_ms: u64,
    #[serde(default = "default_genesis_send_backoff_multiplier")]
    pub genesis_send_backoff_multiplier: f64,
    #[serde(default = "default_genesis_send_max_backoff_ms")]
    pub genesis_send_max_backoff_ms: u64,
    #[serde(default = "default_genesis_send_attempt_deadline_ms")]
    pub genesis_send_attempt_deadline_ms: u64,

    #[serde(default = "default_final_send_max_attempts")]
    pub final_send_max_attempts: u32,
    #[serde(default = "default_final_send_max_backoff_ms")]
    pub final_send_max_backoff_ms: u64,
    #[serde(default = "default_final_send_inflight_grace_ms")]
    pub final_send_inflight_grace_ms: u64,
    #[serde(default = "default_final_consolidation_max_attempts")]
    pub final_consolidation_max_attempts: u32,

    #[serde(default = "default_heartbeat_max_consecutive_failures")]
    pub heartbeat_max_consecutive_failures: u32,
    #[serde(default = "default_heartbeat_backoff_rearm_ms")]
    pub heartbeat_backoff_rearm_ms: u64,

    #[serde(default = "default_utxo_reservation_max_age_ms")]
    pub utxo_reservation_max_age_ms: i64,
    #[serde(default = "default_utxo_replenish_interval_ms")]
    pub utxo_replenish_interval_ms: u64,

    #[serde(default = "default_send_error_retry_limit")]
    pub send_error_retry_limit: u32,

    #[serde(default = "default_action_map")]
    pub action_map: HashMap<String, u8>,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            anchor_batch_ms: default_anchor_batch_ms(),
            anchor_amount: default_anchor_amount(),
            utxo_split_count: default_utxo_split_count(),
            utxo_low_threshold: default_utxo_low_threshold(),
            utxo_usable_threshold_kas: default_utxo_usable_threshold_kas(),
            time_delta_scale_ms: default_time_delta_scale_ms(),
            max_moves_per_heartbeat: default_max_moves_per_heartbeat(),
            nop_heartbeat_ms: default_nop_heartbeat_ms(),
            genesis_send_max_attempts: default_genesis_send_max_attempts(),
            genesis_send_base_backoff_ms: default_genesis_send_base_backoff_ms(),
            genesis_send_backoff_multiplier: default_genesis_send_backoff_multiplier(),
            genesis_send_max_backoff_ms: default_genesis_send_max_backoff_ms(),
            genesis_send_attempt_deadline_ms: default_genesis_send_attempt_deadline_ms(),
            final_send_max_attempts: default_final_send_max_attempts(),
            final_send_max_backoff_ms: default_final_send_max_backoff_ms(),
            final_send_inflight_grace_ms: default_final_send_inflight_grace_ms(),
            final_consolidation_max_attempts: default_final_consolidation_max_attempts(),
            heartbeat_max_consecutive_failures: default_heartbeat_max_consecutive_failures(),
            heartbeat_backoff_rearm_ms: default_heartbeat_backoff_rearm_ms(),
            utxo_reservation_max_age_ms: default_utxo_reservation_max_age_ms(),
            utxo_replenish_interval_ms: default_utxo_replenish_interval_ms(),
            send_error_retry_limit: default_send_error_retry_limit(),
            action_map: default_action_map(),
        }
    }
}

impl AnchorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = AnchorConfig::default();
        assert_eq!(cfg.anchor_batch_ms, 500);
        assert_eq!(cfg.anchor_amount, 0.5);
        assert_eq!(cfg.utxo_split_count, 10);
        assert_eq!(cfg.max_moves_per_heartbeat, 255);
        assert_eq!(cfg.action_map.get("move"), Some(&1));
        assert_eq!(cfg.action_map.get("none"), Some(&0));
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg: AnchorConfig = AnchorConfig::from_toml_str("anchor_batch_ms = 750\n").unwrap();
        assert_eq!(cfg.anchor_batch_ms, 750);
        assert_eq!(cfg.anchor_amount, 0.5);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = AnchorConfig::default();
        let serialized = cfg.to_toml_string().unwrap();
        let parsed = AnchorConfig::from_toml_str(&serialized).unwrap();
        assert_eq!(parsed.anchor_batch_ms, cfg.anchor_batch_ms);
        assert_eq!(parsed.action_map.len(), cfg.action_map.len());
    }
}
