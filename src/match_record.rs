//! On-disk interchange format between `anchor-sim` and `anchor-audit`:
//! a full match's move history plus its anchor chain, enough to replay
//! an audit without a live ledger connection.

use crate::audit::AnchoredRecord;
use crate::types::{AnchorChainEntry, Move};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchRecord {
    pub game_id: String,
    pub player_id: String,
    pub first_move_timestamp: i64,
    pub moves: Vec<Move>,
    pub chain: Vec<AnchoredRecord>,
}

impl MatchRecord {
    pub fn genesis_entry(&self) -> Option<&AnchorChainEntry> {
        self.chain.iter().map(|r| &r.entry).find(|e| e.anchor_type == crate::types::AnchorType::Genesis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let record = MatchRecord {
            game_id: "match-1".to_string(),
            player_id: "p1".to_string(),
            first_move_timestamp: 1000,
            moves: Vec::new(),
            chain: Vec::new(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: MatchRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.game_id, record.game_id);
    }
}
