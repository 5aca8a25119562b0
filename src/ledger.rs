//! Ledger adapter boundary (spec §6). The core treats the settlement
//! ledger as an opaque capability; this trait is the entire surface it
//! is allowed to depend on. Grounded on the teacher's `storage.rs`
//! async-trait pattern (`UtxoStorage`/`BlockStorage` swap-in-a-backend
//! shape), generalized from key-value storage to ledger RPCs.

use crate::types::{Hash256, OutPoint, UtxoEntry};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger send failed: {0}")]
    SendFailed(String),
    #[error("ledger query failed: {0}")]
    QueryFailed(String),
}

/// One outgoing anchor transmission request.
pub struct SendRequest<'a> {
    pub from_address: &'a str,
    pub to_address: &'a str,
    pub amount: f64,
    /// Opaque signing material. Key derivation and storage are out of
    /// scope here — the orchestrator only ever forwards whatever the
    /// embedding game supplied at startup.
    pub private_keys: &'a [u8],
    pub priority_fee: Option<f64>,
    pub payload: &'a [u8],
    /// When true, the ledger should treat this as housekeeping traffic
    /// (UTXO splits/consolidations) rather than gameplay anchoring, for
    /// fee-prioritization purposes.
    pub janitor_mode: bool,
}

/// Every capability the orchestrator and UTXO pool need from the
/// settlement ledger (spec §6 "Ledger adapter (required capabilities)").
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    async fn manual_send(&self, req: SendRequest<'_>) -> Result<Hash256, LedgerError>;

    async fn get_utxos(&self, address: &str) -> Result<Vec<UtxoEntry>, LedgerError>;

    async fn split_utxos(&self, address: &str, split_count: usize) -> Result<Hash256, LedgerError>;

    async fn consolidate_utxos(&self, address: &str, target_count: usize) -> Result<Hash256, LedgerError>;

    /// Scan the DAG between two block hashes for transactions whose
    /// payload starts with one of `prefixes`, invoking `on_match` for
    /// each (used by the audit verifier, not gameplay).
    async fn walk_dag_range(
        &self,
        start_hash: Hash256,
        end_hash: Hash256,
        prefixes: &[[u8; 4]],
    ) -> Result<Vec<(Hash256, Vec<u8>)>, LedgerError>;
}

/// Build the ASCII-hex wire frame for one anchor payload (spec §6
/// "Payload prefix framing"): `prefix(4B) || gameIdTag(4B) ||
/// anchorBody`, hex-encoded.
pub fn frame_payload(prefix: [u8; 4], game_id_tag: [u8; 4], body: &[u8]) -> String {
    let mut buf = Vec::with_capacity(8 + body.len());
    buf.extend_from_slice(&prefix);
    buf.extend_from_slice(&game_id_tag);
    buf.extend_from_slice(body);
    hex::encode(buf)
}

/// Derive a 4-byte game id tag from an arbitrary game id string, for
/// framing and DAG-scan filtering.
pub fn game_id_tag(game_id: &str) -> [u8; 4] {
    let hash = crate::crypto::sha256(game_id.as_bytes());
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&hash[0..4]);
    tag
}

/// In-memory ledger adapter for simulation and tests, grounded on the
/// teacher's `InMemoryUtxoStorage`. Every send succeeds immediately and
/// is assigned a deterministic fake transaction id derived from the
/// payload and a monotonic counter — there is no real settlement DAG
/// behind it.
pub struct InMemoryLedger {
    utxos: parking_lot::RwLock<std::collections::HashMap<OutPoint, UtxoEntry>>,
    counter: std::sync::atomic::AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            utxos: parking_lot::RwLock::new(std::collections::HashMap::new()),
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Seed the pool with `count` freshly-minted `Available` entries of
    /// `amount` sompi each, as a real wallet would hold after a split.
    pub fn seed(&self, address: &str, count: usize, amount: u64) {
        let mut utxos = self.utxos.write();
        for _ in 0..count {
            let vout = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed) as u32;
            let txid = crate::types::TxId(crate::crypto::sha256(format!("{address}:seed:{vout}").as_bytes()));
            let outpoint = OutPoint { txid, vout };
            utxos.insert(
                outpoint.clone(),
                UtxoEntry { outpoint, amount, state: crate::types::UtxoState::Available, reserved_at: None },
            );
        }
    }

    fn fake_tx_id(&self, body: &[u8]) -> Hash256 {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        crate::crypto::sha256_concat(&[body, &n.to_be_bytes()])
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerAdapter for InMemoryLedger {
    async fn manual_send(&self, req: SendRequest<'_>) -> Result<Hash256, LedgerError> {
        Ok(self.fake_tx_id(req.payload))
    }

    async fn get_utxos(&self, _address: &str) -> Result<Vec<UtxoEntry>, LedgerError> {
        Ok(self.utxos.read().values().cloned().collect())
    }

    async fn split_utxos(&self, address: &str, split_count: usize) -> Result<Hash256, LedgerError> {
        self.seed(address, split_count, 100_000_000);
        Ok(self.fake_tx_id(b"split"))
    }

    async fn consolidate_utxos(&self, _address: &str, _target_count: usize) -> Result<Hash256, LedgerError> {
        let mut utxos = self.utxos.write();
        for entry in utxos.values_mut() {
            if entry.state == crate::types::UtxoState::Available {
                entry.state = crate::types::UtxoState::Spent;
            }
        }
        Ok(self.fake_tx_id(b"consolidate"))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::wire;

    #[test]
    fn frame_payload_concatenates_prefix_tag_and_body() {
        let framed = frame_payload(wire::GENESIS_PREFIX, [1, 2, 3, 4], &[0xAA, 0xBB]);
        assert_eq!(framed, format!("{}01020304aabb", hex::encode(wire::GENESIS_PREFIX)));
    }

    #[test]
    fn game_id_tag_is_deterministic() {
        assert_eq!(game_id_tag("match-1"), game_id_tag("match-1"));
        assert_ne!(game_id_tag("match-1"), game_id_tag("match-2"));
    }

    #[tokio::test]
    async fn in_memory_ledger_seeds_and_spends() {
        let ledger = InMemoryLedger::new();
        ledger.seed("addr", 3, 100_000_000);
        let utxos = ledger.get_utxos("addr").await.unwrap();
        assert_eq!(utxos.len(), 3);

        let tx_id = ledger
            .manual_send(SendRequest {
                from_address: "addr",
                to_address: "addr2",
                amount: 0.5,
                private_keys: &[],
                priority_fee: None,
                payload: b"hello",
                janitor_mode: false,
            })
            .await
            .unwrap();
        let tx_id2 = ledger
            .manual_send(SendRequest {
                from_address: "addr",
                to_address: "addr2",
                amount: 0.5,
                private_keys: &[],
                priority_fee: None,
                payload: b"hello",
                janitor_mode: false,
            })
            .await
            .unwrap();
        assert_ne!(tx_id, tx_id2);
    }
}
