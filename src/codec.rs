//! Binary anchor codec (spec §4.1): bit-exact translation between typed
//! anchor payloads and the byte layouts embedded in ledger transactions.
//!
//! Encoding is total and deterministic over well-formed inputs.
//! Decoding never panics — malformed or truncated input always comes
//! back as a `CodecError`, never a slice-index panic.

use crate::constants::wire;
use crate::crypto::coord::{decode_coord14, encode_coord14};
use crate::error::CodecError;
use crate::types::{
    ActionPayload, AnchorPayload, AnchorType, Coord3, FinalPayload, GenesisPayload,
    HeartbeatPayload, MovePacket, NistPulse, OutcomeCode, TxId, delta_flags,
};

fn require_len(data: &[u8], min: usize) -> Result<(), CodecError> {
    if data.len() < min {
        Err(CodecError::PayloadTooShort)
    } else {
        Ok(())
    }
}

fn read_array<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], CodecError> {
    require_len(data, offset + N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    Ok(out)
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, CodecError> {
    Ok(u16::from_be_bytes(read_array::<2>(data, offset)?))
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, CodecError> {
    Ok(u32::from_be_bytes(read_array::<4>(data, offset)?))
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64, CodecError> {
    Ok(u64::from_be_bytes(read_array::<8>(data, offset)?))
}

// ---------------------------------------------------------------- genesis

/// Encode a genesis anchor payload (858 bytes).
pub fn encode_genesis(payload: &GenesisPayload) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(wire::GENESIS_PAYLOAD_LEN);
    buf.push(wire::PROTOCOL_VERSION);
    buf.push(AnchorType::Genesis.wire_code());
    buf.extend_from_slice(&payload.game_id_hash);
    buf.extend_from_slice(&payload.vrf_seed_hash);

    for slot in 0..wire::GENESIS_BTC_HASH_SLOTS {
        match payload.btc_block_hashes.get(slot) {
            Some(hash) => buf.extend_from_slice(hash),
            None => buf.extend_from_slice(&[0u8; 32]),
        }
    }

    buf.extend_from_slice(&payload.start_daa_score.to_be_bytes());
    buf.extend_from_slice(&payload.end_daa_score.to_be_bytes());
    buf.extend_from_slice(&payload.nist_pulse_index.to_be_bytes());
    buf.extend_from_slice(&payload.nist_output_hash);
    buf.extend_from_slice(&payload.nist_signature);

    debug_assert_eq!(buf.len(), wire::GENESIS_PAYLOAD_LEN);
    Ok(buf)
}

/// Decode a genesis anchor payload.
pub fn decode_genesis(data: &[u8]) -> Result<GenesisPayload, CodecError> {
    require_len(data, wire::GENESIS_PAYLOAD_LEN)?;
    let version = data[0];
    if version != wire::PROTOCOL_VERSION {
        return Err(CodecError::VersionMismatch(version));
    }
    let type_byte = data[1];
    if AnchorType::from_wire_code(type_byte) != Some(AnchorType::Genesis) {
        return Err(CodecError::UnknownAnchorType(type_byte));
    }

    let game_id_hash = read_array::<32>(data, 2)?;
    let vrf_seed_hash = read_array::<32>(data, 34)?;

    let mut btc_block_hashes = Vec::with_capacity(wire::GENESIS_BTC_HASH_SLOTS);
    for slot in 0..wire::GENESIS_BTC_HASH_SLOTS {
        btc_block_hashes.push(read_array::<32>(data, 66 + slot * 32)?);
    }

    let start_daa_score = read_u64(data, 258)?;
    let end_daa_score = read_u64(data, 266)?;
    let nist_pulse_index = read_u64(data, 274)?;
    let nist_output_hash = read_array::<64>(data, 282)?;
    let nist_signature = read_array::<512>(data, 346)?;

    Ok(GenesisPayload {
        game_id_hash,
        vrf_seed_hash,
        btc_block_hashes,
        start_daa_score,
        end_daa_score,
        nist_pulse_index,
        nist_output_hash,
        nist_signature,
    })
}

// -------------------------------------------------------------- move packets

fn encode_move_packet(mv: &MovePacket) -> Result<Vec<u8>, CodecError> {
    if mv.action_code > 0x0F {
        return Err(CodecError::PayloadTooShort);
    }
    match mv.payload {
        ActionPayload::Coord(Coord3 { x, y, z }) => {
            let mut buf = Vec::with_capacity(wire::EXTENDED_MOVE_PACKET_LEN);
            buf.push(mv.action_code << 4);
            buf.push(mv.time_delta);
            buf.extend_from_slice(&encode_coord14(x).to_be_bytes());
            buf.extend_from_slice(&encode_coord14(y).to_be_bytes());
            buf.extend_from_slice(&encode_coord14(z).to_be_bytes());
            buf.extend_from_slice(&mv.vrf_fragment);
            buf.extend_from_slice(&mv.value.to_be_bytes());
            buf.extend_from_slice(&[0u8, 0u8]);
            Ok(buf)
        }
        ActionPayload::Lane(lane) => {
            if lane > 0x0F {
                return Err(CodecError::PayloadTooShort);
            }
            let mut buf = Vec::with_capacity(wire::STANDARD_MOVE_PACKET_LEN);
            buf.push((mv.action_code << 4) | lane);
            buf.push(mv.time_delta);
            buf.extend_from_slice(&mv.vrf_fragment);
            buf.extend_from_slice(&mv.value.to_be_bytes());
            Ok(buf)
        }
    }
}

fn decode_move_packet(data: &[u8], offset: usize, index: usize) -> Result<(MovePacket, usize), CodecError> {
    if offset >= data.len() {
        return Err(CodecError::MoveRunTruncated(index));
    }
    let tag = data[offset];
    let action_code = tag >> 4;

    if action_code == crate::types::MOVE_ACTION_CODE {
        if offset + wire::EXTENDED_MOVE_PACKET_LEN > data.len() {
            return Err(CodecError::MoveRunTruncated(index));
        }
        let time_delta = data[offset + 1];
        let x_raw = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);
        let y_raw = u16::from_be_bytes([data[offset + 4], data[offset + 5]]);
        let z_raw = u16::from_be_bytes([data[offset + 6], data[offset + 7]]);
        let mut vrf_fragment = [0u8; 4];
        vrf_fragment.copy_from_slice(&data[offset + 8..offset + 12]);
        let value = u16::from_be_bytes([data[offset + 12], data[offset + 13]]);
        let packet = MovePacket {
            action_code,
            payload: ActionPayload::Coord(Coord3 {
                x: decode_coord14(x_raw),
                y: decode_coord14(y_raw),
                z: decode_coord14(z_raw),
            }),
            time_delta,
            vrf_fragment,
            value,
        };
        Ok((packet, offset + wire::EXTENDED_MOVE_PACKET_LEN))
    } else {
        if offset + wire::STANDARD_MOVE_PACKET_LEN > data.len() {
            return Err(CodecError::MoveRunTruncated(index));
        }
        let lane = tag & 0x0F;
        let time_delta = data[offset + 1];
        let mut vrf_fragment = [0u8; 4];
        vrf_fragment.copy_from_slice(&data[offset + 2..offset + 6]);
        let value = u16::from_be_bytes([data[offset + 6], data[offset + 7]]);
        let packet = MovePacket {
            action_code,
            payload: ActionPayload::Lane(lane),
            time_delta,
            vrf_fragment,
            value,
        };
        Ok((packet, offset + wire::STANDARD_MOVE_PACKET_LEN))
    }
}

// ------------------------------------------------------------- heartbeat

/// Encode a v5 heartbeat anchor payload (70-byte header + variable body).
pub fn encode_heartbeat(payload: &HeartbeatPayload) -> Result<Vec<u8>, CodecError> {
    if payload.moves.len() > crate::constants::defaults::MAX_MOVES_PER_HEARTBEAT {
        return Err(CodecError::PayloadTooShort);
    }

    let mut moves_section = Vec::new();
    for mv in &payload.moves {
        moves_section.extend_from_slice(&encode_move_packet(mv)?);
    }

    let moves_len: u16 = moves_section
        .len()
        .try_into()
        .map_err(|_| CodecError::PayloadTooShort)?;

    let mut buf = Vec::with_capacity(wire::HEARTBEAT_HEADER_LEN + moves_section.len());
    buf.push(wire::PROTOCOL_VERSION);
    buf.push(AnchorType::Heartbeat.wire_code());
    buf.extend_from_slice(&payload.merkle_root);
    buf.extend_from_slice(&payload.prev_tx_id.0);
    buf.push(payload.delta_flags);
    buf.push(payload.moves.len() as u8);
    buf.extend_from_slice(&moves_len.to_be_bytes());
    buf.extend_from_slice(&moves_section);

    if payload.delta_flags & delta_flags::BTC != 0 {
        let hash = payload
            .btc_delta
            .ok_or(CodecError::PayloadTooShort)?;
        buf.extend_from_slice(&hash);
    }
    if payload.delta_flags & delta_flags::NIST != 0 {
        let pulse = payload
            .nist_delta
            .as_ref()
            .ok_or(CodecError::PayloadTooShort)?;
        buf.extend_from_slice(&pulse.pulse_index.to_be_bytes());
        buf.extend_from_slice(&pulse.output_hash);
        buf.extend_from_slice(&pulse.signature);
    }

    Ok(buf)
}

fn decode_deltas(
    data: &[u8],
    mut offset: usize,
    delta_flags_byte: u8,
) -> Result<(Option<[u8; 32]>, Option<NistPulse>, usize), CodecError> {
    let btc_delta = if delta_flags_byte & delta_flags::BTC != 0 {
        let hash = read_array::<32>(data, offset)?;
        offset += wire::BTC_DELTA_LEN;
        Some(hash)
    } else {
        None
    };

    let nist_delta = if delta_flags_byte & delta_flags::NIST != 0 {
        let pulse_index = read_u64(data, offset)?;
        let output_hash = read_array::<64>(data, offset + 8)?;
        let signature = read_array::<512>(data, offset + 72)?;
        offset += wire::NIST_DELTA_LEN;
        Some(NistPulse {
            pulse_index,
            output_hash,
            signature,
        })
    } else {
        None
    };

    Ok((btc_delta, nist_delta, offset))
}

/// Decode a heartbeat anchor payload. Tolerates the legacy v4 68-byte
/// header (no `movesSectionLength`, all-standard packets) when the
/// observed version is below 5.
pub fn decode_heartbeat(data: &[u8]) -> Result<HeartbeatPayload, CodecError> {
    require_len(data, 2)?;
    let version = data[0];
    let type_byte = data[1];
    if AnchorType::from_wire_code(type_byte) != Some(AnchorType::Heartbeat) {
        return Err(CodecError::UnknownAnchorType(type_byte));
    }

    if version < wire::PROTOCOL_VERSION {
        decode_heartbeat_v4(data, version)
    } else if version == wire::PROTOCOL_VERSION {
        decode_heartbeat_v5(data)
    } else {
        Err(CodecError::VersionMismatch(version))
    }
}

fn decode_heartbeat_v5(data: &[u8]) -> Result<HeartbeatPayload, CodecError> {
    require_len(data, wire::HEARTBEAT_HEADER_LEN)?;
    let version = data[0];
    let merkle_root = read_array::<32>(data, 2)?;
    let prev_tx_id = TxId(read_array::<32>(data, 34)?);
    let flags = data[66];
    let move_count = data[67] as usize;
    let moves_section_len = read_u16(data, 68)? as usize;

    let moves_start = wire::HEARTBEAT_HEADER_LEN;
    require_len(data, moves_start + moves_section_len)?;

    let mut moves = Vec::with_capacity(move_count);
    let mut offset = moves_start;
    let moves_end = moves_start + moves_section_len;
    let mut index = 0;
    while offset < moves_end {
        let (packet, next) = decode_move_packet(data, offset, index)?;
        moves.push(packet);
        offset = next;
        index += 1;
    }
    if moves.len() != move_count || offset != moves_end {
        return Err(CodecError::MoveRunTruncated(moves.len()));
    }

    let (btc_delta, nist_delta, _) = decode_deltas(data, offset, flags)?;

    Ok(HeartbeatPayload {
        version,
        merkle_root,
        prev_tx_id,
        delta_flags: flags,
        moves,
        btc_delta,
        nist_delta,
    })
}

fn decode_heartbeat_v4(data: &[u8], version: u8) -> Result<HeartbeatPayload, CodecError> {
    require_len(data, wire::LEGACY_HEARTBEAT_HEADER_LEN)?;
    let merkle_root = read_array::<32>(data, 2)?;
    let prev_tx_id = TxId(read_array::<32>(data, 34)?);
    let flags = data[66];
    let move_count = data[67] as usize;

    let moves_start = wire::LEGACY_HEARTBEAT_HEADER_LEN;
    let moves_section_len = move_count * wire::STANDARD_MOVE_PACKET_LEN;
    require_len(data, moves_start + moves_section_len)?;

    let mut moves = Vec::with_capacity(move_count);
    let mut offset = moves_start;
    for index in 0..move_count {
        let tag = data[offset];
        let action_code = tag >> 4;
        let lane = tag & 0x0F;
        let time_delta = data[offset + 1];
        let mut vrf_fragment = [0u8; 4];
        vrf_fragment.copy_from_slice(&data[offset + 2..offset + 6]);
        let value = u16::from_be_bytes([data[offset + 6], data[offset + 7]]);
        moves.push(MovePacket {
            action_code,
            payload: ActionPayload::Lane(lane),
            time_delta,
            vrf_fragment,
            value,
        });
        offset += wire::STANDARD_MOVE_PACKET_LEN;
        let _ = index;
    }

    let (btc_delta, nist_delta, _) = decode_deltas(data, offset, flags)?;

    Ok(HeartbeatPayload {
        version,
        merkle_root,
        prev_tx_id,
        delta_flags: flags,
        moves,
        btc_delta,
        nist_delta,
    })
}

// ----------------------------------------------------------------- final

/// Encode a final anchor payload (144 bytes).
pub fn encode_final(payload: &FinalPayload) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(wire::FINAL_PAYLOAD_LEN);
    buf.push(wire::PROTOCOL_VERSION);
    buf.push(AnchorType::Final.wire_code());
    buf.extend_from_slice(&payload.final_merkle_root);
    buf.extend_from_slice(&payload.genesis_tx_id.0);
    buf.extend_from_slice(&payload.prev_tx_id.0);
    buf.extend_from_slice(&payload.result_leaf_hash);
    buf.extend_from_slice(&payload.final_score.to_be_bytes());
    buf.extend_from_slice(&payload.coins_collected.to_be_bytes());
    buf.extend_from_slice(&payload.race_time_ms.to_be_bytes());
    buf.push(payload.outcome_code.wire_code());
    buf.push(payload.total_moves);

    debug_assert_eq!(buf.len(), wire::FINAL_PAYLOAD_LEN);
    Ok(buf)
}

/// Decode a final anchor payload.
pub fn decode_final(data: &[u8]) -> Result<FinalPayload, CodecError> {
    require_len(data, wire::FINAL_PAYLOAD_LEN)?;
    let version = data[0];
    if version != wire::PROTOCOL_VERSION {
        return Err(CodecError::VersionMismatch(version));
    }
    let type_byte = data[1];
    if AnchorType::from_wire_code(type_byte) != Some(AnchorType::Final) {
        return Err(CodecError::UnknownAnchorType(type_byte));
    }

    let final_merkle_root = read_array::<32>(data, 2)?;
    let genesis_tx_id = TxId(read_array::<32>(data, 34)?);
    let prev_tx_id = TxId(read_array::<32>(data, 66)?);
    let result_leaf_hash = read_array::<32>(data, 98)?;
    let final_score = read_u32(data, 130)?;
    let coins_collected = read_u32(data, 134)?;
    let race_time_ms = read_u32(data, 138)?;
    let outcome_byte = data[142];
    let outcome_code =
        OutcomeCode::from_wire_code(outcome_byte).ok_or(CodecError::UnknownAnchorType(outcome_byte))?;
    let total_moves = data[143];

    Ok(FinalPayload {
        final_merkle_root,
        genesis_tx_id,
        prev_tx_id,
        result_leaf_hash,
        final_score,
        coins_collected,
        race_time_ms,
        outcome_code,
        total_moves,
    })
}

// -------------------------------------------------------------- dispatch

/// Encode any anchor payload by its variant.
pub fn encode_anchor(payload: &AnchorPayload) -> Result<Vec<u8>, CodecError> {
    match payload {
        AnchorPayload::Genesis(g) => encode_genesis(g),
        AnchorPayload::Heartbeat(h) => encode_heartbeat(h),
        AnchorPayload::Final(f) => encode_final(f),
    }
}

/// Decode any anchor payload, dispatching on the type byte at offset 1.
pub fn decode_anchor(data: &[u8]) -> Result<AnchorPayload, CodecError> {
    require_len(data, 2)?;
    match AnchorType::from_wire_code(data[1]) {
        Some(AnchorType::Genesis) => decode_genesis(data).map(AnchorPayload::Genesis),
        Some(AnchorType::Heartbeat) => decode_heartbeat(data).map(AnchorPayload::Heartbeat),
        Some(AnchorType::Final) => decode_final(data).map(AnchorPayload::Final),
        None => Err(CodecError::UnknownAnchorType(data[1])),
    }
}
