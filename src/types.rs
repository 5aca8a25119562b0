//! Core data types for the Union Binary Anchor Protocol.

use serde::{Deserialize, Serialize};

/// A 32-byte hash, used for transaction ids, block hashes, and VRF state.
pub type Hash256 = [u8; 32];

/// The first 4 bytes of a VRF output, embedded in every move packet.
pub type Fragment4 = [u8; 4];

/// A ledger transaction id referenced by an anchor chain entry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TxId(pub Hash256);

impl TxId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// A ledger output reference: (transaction id, output index).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub txid: TxId,
    pub vout: u32,
}

/// A 3-D fixed-point coordinate used by the MOVE action, in engine units
/// (not yet quantized to the wire's 14-bit fixed-point representation).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Coord3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// The reserved MOVE action code (§3 of the protocol spec).
pub const MOVE_ACTION_CODE: u8 = 1;
/// The `none` action code, the default action with no semantic meaning.
pub const NONE_ACTION_CODE: u8 = 0;

/// Action-specific payload: either a lane index (most actions) or a 3-D
/// coordinate triple (the reserved MOVE action, code 1).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub enum ActionPayload {
    Lane(u8),
    Coord(Coord3),
}

/// Entropy inputs folded into a single move's VRF step. Any field that was
/// unavailable at the time of the move is zero-filled so replay is
/// deterministic regardless of when external data later arrived.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct EntropySnapshot {
    /// SHA-256 of the NIST beacon pulse's 64-byte `outputValue`, or zero.
    pub nist_output_hash: Hash256,
    /// Raw 32-byte BTC block hash, or zero.
    pub btc_hash: Hash256,
    /// Raw 32-byte ledger (kaspa) block hash, or zero.
    pub kaspa_block_hash: Hash256,
    /// True once the genesis transaction id has been folded into the VRF
    /// chain and this move was computed after that fold.
    pub is_genesis_reinforced: bool,
    /// Wall-clock timestamp (ms) of the first move, only set on sequence 0.
    pub init_timestamp: Option<i64>,
}

impl Default for EntropySnapshot {
    fn default() -> Self {
        Self {
            nist_output_hash: [0u8; 32],
            btc_hash: [0u8; 32],
            kaspa_block_hash: [0u8; 32],
            is_genesis_reinforced: false,
            init_timestamp: None,
        }
    }
}

/// A single recorded player action.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Move {
    /// Strictly monotonic, 0-based.
    pub sequence: u64,
    /// Human-readable action name, resolved through the action map.
    pub action: String,
    /// 4-bit action code, resolved through the action map.
    pub action_code: u8,
    pub payload: ActionPayload,
    /// Wall-clock timestamp in milliseconds.
    pub timestamp: i64,
    /// Delay since the previous move, in `TIME_DELTA_SCALE`-ms units,
    /// saturated to 255.
    pub time_delta: u8,
    /// Sub-id carried by category actions (codes 10-15); zero otherwise.
    pub value: u16,
    pub vrf_fragment: Fragment4,
    pub vrf_output: Hash256,
    pub entropy_snapshot: EntropySnapshot,
}

impl Move {
    pub fn is_move_action(&self) -> bool {
        self.action_code == MOVE_ACTION_CODE
    }
}

/// Tag identifying which of the three anchor payload kinds a record is.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnchorType {
    Genesis,
    Heartbeat,
    Final,
}

impl AnchorType {
    pub fn wire_code(self) -> u8 {
        match self {
            AnchorType::Genesis => 1,
            AnchorType::Heartbeat => 2,
            AnchorType::Final => 3,
        }
    }

    pub fn from_wire_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(AnchorType::Genesis),
            2 => Some(AnchorType::Heartbeat),
            3 => Some(AnchorType::Final),
            _ => None,
        }
    }
}

/// Outcome of a completed match, carried in the final anchor.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutcomeCode {
    Complete,
    Forfeit,
    Timeout,
    Cheat,
}

impl OutcomeCode {
    pub fn wire_code(self) -> u8 {
        match self {
            OutcomeCode::Complete => 1,
            OutcomeCode::Forfeit => 2,
            OutcomeCode::Timeout => 3,
            OutcomeCode::Cheat => 4,
        }
    }

    pub fn from_wire_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(OutcomeCode::Complete),
            2 => Some(OutcomeCode::Forfeit),
            3 => Some(OutcomeCode::Timeout),
            4 => Some(OutcomeCode::Cheat),
            _ => None,
        }
    }
}

/// A fully-signed pulse record from the NIST randomness beacon, as needed
/// to reconstruct a delta or the genesis's embedded pulse.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NistPulse {
    pub pulse_index: u64,
    /// 64-byte `outputValue`.
    pub output_hash: [u8; 64],
    /// 512-byte RSA signature over the published beacon fields.
    pub signature: [u8; 512],
}

/// A newly-observed external entropy value pending inclusion in the next
/// heartbeat's delta section.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum PendingDelta {
    Btc([u8; 32]),
    Nist(NistPulse),
}

/// The genesis anchor payload (§4.1, 858 bytes).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GenesisPayload {
    pub game_id_hash: Hash256,
    pub vrf_seed_hash: Hash256,
    /// Up to 6 BTC block hashes, zero-padded if fewer were available.
    pub btc_block_hashes: Vec<Hash256>,
    pub start_daa_score: u64,
    pub end_daa_score: u64,
    pub nist_pulse_index: u64,
    pub nist_output_hash: [u8; 64],
    pub nist_signature: [u8; 512],
}

/// One packed move inside a heartbeat's moves section.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MovePacket {
    pub action_code: u8,
    pub payload: ActionPayload,
    pub time_delta: u8,
    pub vrf_fragment: Fragment4,
    pub value: u16,
}

/// Bitflags selecting which delta sections follow a heartbeat's moves.
pub mod delta_flags {
    pub const BTC: u8 = 0b01;
    pub const NIST: u8 = 0b10;
}

/// A heartbeat anchor payload (§4.1, 70-byte header + variable body).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatPayload {
    pub version: u8,
    pub merkle_root: Hash256,
    pub prev_tx_id: TxId,
    pub delta_flags: u8,
    pub moves: Vec<MovePacket>,
    pub btc_delta: Option<[u8; 32]>,
    pub nist_delta: Option<NistPulse>,
}

/// The final anchor payload (§4.1, 144 bytes).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FinalPayload {
    pub final_merkle_root: Hash256,
    pub genesis_tx_id: TxId,
    pub prev_tx_id: TxId,
    pub result_leaf_hash: Hash256,
    pub final_score: u32,
    pub coins_collected: u32,
    pub race_time_ms: u32,
    pub outcome_code: OutcomeCode,
    pub total_moves: u8,
}

/// Tagged union over the three anchor payload kinds.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum AnchorPayload {
    Genesis(GenesisPayload),
    Heartbeat(HeartbeatPayload),
    Final(FinalPayload),
}

impl AnchorPayload {
    pub fn anchor_type(&self) -> AnchorType {
        match self {
            AnchorPayload::Genesis(_) => AnchorType::Genesis,
            AnchorPayload::Heartbeat(_) => AnchorType::Heartbeat,
            AnchorPayload::Final(_) => AnchorType::Final,
        }
    }
}

/// An entry in the orchestrator's append-only record of sent anchors.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnchorChainEntry {
    pub tx_id: TxId,
    pub anchor_type: AnchorType,
    pub timestamp: i64,
    pub move_count: Option<u8>,
    pub delta_flags: Option<u8>,
}

/// State of one UTXO pool entry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum UtxoState {
    Available,
    Reserved,
    Spent,
}

/// One entry in the pre-split anchor-transmission UTXO pool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UtxoEntry {
    pub outpoint: OutPoint,
    pub amount: u64,
    pub state: UtxoState,
    /// Wall-clock ms timestamp the entry transitioned to `Reserved`.
    pub reserved_at: Option<i64>,
}

/// The canonical hash of one move record, used as a Merkle leaf.
pub type MerkleLeaf = String;
