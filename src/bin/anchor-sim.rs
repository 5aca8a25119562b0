//! Local match simulator: drives a full genesis → heartbeat → final
//! anchor lifecycle through `AnchorOrchestrator` against an in-memory
//! ledger, without a live blockDAG connection. Useful for exercising
//! the orchestrator and VRF chain end to end and for producing fixture
//! match records that `anchor-audit` can verify.

use anchor_attest::audit::AnchoredRecord;
use anchor_attest::config::AnchorConfig;
use anchor_attest::crypto::sha256;
use anchor_attest::entropy::NoopEntropySource;
use anchor_attest::event::TracingEventSink;
use anchor_attest::ledger::InMemoryLedger;
use anchor_attest::match_record::MatchRecord;
use anchor_attest::merkle::MerkleTree;
use anchor_attest::move_vault::MoveVault;
use anchor_attest::orchestrator::AnchorOrchestrator;
use anchor_attest::runtime::Runtime;
use anchor_attest::types::{
    ActionPayload, AnchorPayload, Coord3, EntropySnapshot, FinalPayload, GenesisPayload,
    HeartbeatPayload, Move, MovePacket, OutcomeCode, MOVE_ACTION_CODE, NONE_ACTION_CODE,
};
use anchor_attest::utxo_pool::{UtxoPool, UtxoPoolConfig};
use anchor_attest::vrf_chain::{VrfChainEngine, VrfStepInput};
use clap::{Parser, Subcommand};
use rand::Rng;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "anchor-sim")]
#[command(about = "Simulate a gameplay anchor lifecycle against an in-memory ledger", long_about = None)]
struct Args {
    /// Output compact JSON (single line)
    #[arg(long)]
    compact: bool,

    /// Output human-readable summary instead of JSON
    #[arg(long)]
    human: bool,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Run a simulated match end to end
    Run {
        #[arg(long, default_value = "sim-match")]
        game_id: String,
        #[arg(long, default_value = "sim-player")]
        player_id: String,
        /// Number of moves to generate
        #[arg(long, default_value_t = 30)]
        moves: usize,
        /// Moves per heartbeat anchor
        #[arg(long, default_value_t = 8)]
        heartbeat_interval: usize,
        /// complete | forfeit | timeout | cheat
        #[arg(long, default_value = "complete")]
        outcome: String,
        /// Write the full match record (moves + anchor chain) to this path
        #[arg(long)]
        out: Option<String>,
    },
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    setup_logging(args.verbose);

    if let Err(e) = run_command(&args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn parse_outcome(s: &str) -> Result<OutcomeCode, String> {
    match s.to_lowercase().as_str() {
        "complete" => Ok(OutcomeCode::Complete),
        "forfeit" => Ok(OutcomeCode::Forfeit),
        "timeout" => Ok(OutcomeCode::Timeout),
        "cheat" => Ok(OutcomeCode::Cheat),
        other => Err(format!("unknown outcome '{other}' (expected complete|forfeit|timeout|cheat)")),
    }
}

async fn run_command(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let (game_id, player_id, moves, heartbeat_interval, outcome, out) = match &args.command {
        Commands::Run { game_id, player_id, moves, heartbeat_interval, outcome, out } => {
            (game_id, player_id, moves, heartbeat_interval, outcome, out)
        }
    };
    let outcome_code = parse_outcome(outcome)?;
    let record = simulate_match(game_id, player_id, *moves, *heartbeat_interval, outcome_code).await?;

    if let Some(path) = out {
        std::fs::write(path, serde_json::to_string_pretty(&record)?)?;
    }

    let summary = serde_json::json!({
        "gameId": record.game_id,
        "playerId": record.player_id,
        "moveCount": record.moves.len(),
        "anchorCount": record.chain.len(),
        "chain": record.chain.iter().map(|r| serde_json::json!({
            "type": format!("{:?}", r.entry.anchor_type),
            "txId": r.entry.tx_id.to_hex(),
            "timestamp": r.entry.timestamp,
        })).collect::<Vec<_>>(),
    });

    if args.compact {
        println!("{}", serde_json::to_string(&summary)?);
    } else if args.human {
        println!("Simulated match: {}", record.game_id);
        println!("  player:   {}", record.player_id);
        println!("  moves:    {}", record.moves.len());
        println!("  anchors:  {}", record.chain.len());
        for r in &record.chain {
            println!(
                "    {:?}{:<10} {}",
                r.entry.anchor_type,
                "",
                r.entry.tx_id.to_hex()
            );
        }
        if let Some(path) = out {
            println!("  wrote match record to {path}");
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

/// Drive the orchestrator through genesis, a run of heartbeats, and a
/// final anchor, independently reconstructing the decoded payload for
/// each sent anchor from the same inputs the orchestrator used, so the
/// result can be handed to `anchor-audit` without re-decoding wire
/// bytes.
async fn simulate_match(
    game_id: &str,
    player_id: &str,
    move_count: usize,
    heartbeat_interval: usize,
    outcome: OutcomeCode,
) -> Result<MatchRecord, Box<dyn std::error::Error>> {
    let config = AnchorConfig::default();
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.seed("sim-from", config.utxo_split_count, 100_000_000);
    let runtime = Arc::new(Runtime::new(ledger.clone()).with_entropy_source(Arc::new(NoopEntropySource)));
    let vrf = Arc::new(VrfChainEngine::new(game_id));
    let vault = Arc::new(MoveVault::new());
    let pool = Arc::new(UtxoPool::new(UtxoPoolConfig::default(), Arc::new(TracingEventSink)));
    pool.ensure_pool_ready(runtime.ledger.as_ref(), "sim-from").await.ok();
    pool.prepare_for_game();

    let orchestrator = Arc::new(AnchorOrchestrator::new(
        config,
        runtime,
        vrf.clone(),
        vault.clone(),
        pool,
        Arc::new(TracingEventSink),
        game_id,
        "sim-from",
        "sim-to",
        vec![0u8; 32],
    ));

    orchestrator.start().await;

    let mut chain: Vec<AnchoredRecord> = Vec::new();

    let game_id_hash = sha256(game_id.as_bytes());
    let vrf_seed_hash = sha256(format!("{game_id}:vrf-seed").as_bytes());
    let genesis_payload = GenesisPayload {
        game_id_hash,
        vrf_seed_hash,
        btc_block_hashes: Vec::new(),
        start_daa_score: 0,
        end_daa_score: 0,
        nist_pulse_index: 0,
        nist_output_hash: [0u8; 64],
        nist_signature: [0u8; 512],
    };
    orchestrator
        .anchor_genesis_seed(
            genesis_payload.game_id_hash,
            genesis_payload.vrf_seed_hash,
            genesis_payload.btc_block_hashes.clone(),
            genesis_payload.start_daa_score,
            genesis_payload.end_daa_score,
            genesis_payload.nist_pulse_index,
            genesis_payload.nist_output_hash,
            genesis_payload.nist_signature,
        )
        .await
        .map_err(|e| format!("genesis anchor failed: {e}"))?;
    let genesis_entry = orchestrator.anchor_chain().await.into_iter().next().expect("genesis just anchored");
    chain.push(AnchoredRecord { entry: genesis_entry, payload: AnchorPayload::Genesis(genesis_payload) });

    let first_move_timestamp = 1_700_000_000_000i64;
    let mut rng = rand::thread_rng();

    for i in 0..move_count {
        let time_delta: u8 = rng.gen_range(1..=20);
        let snapshot = EntropySnapshot::default();
        let (action, action_code, payload) = if rng.gen_bool(0.6) {
            let coord = Coord3 { x: rng.gen_range(-50.0..50.0), y: rng.gen_range(-50.0..50.0), z: 0.0 };
            ("move".to_string(), MOVE_ACTION_CODE, ActionPayload::Coord(coord))
        } else {
            ("none".to_string(), NONE_ACTION_CODE, ActionPayload::Lane(rng.gen_range(0..8)))
        };

        let step = vrf
            .step(
                player_id,
                first_move_timestamp,
                VrfStepInput { action_code, payload: &payload, time_delta, snapshot: &snapshot },
            )
            .await
            .map_err(|e| format!("vrf step failed: {e}"))?;

        vault.record_move(Move {
            sequence: 0,
            action,
            action_code,
            payload,
            timestamp: first_move_timestamp + i as i64 * 50,
            time_delta,
            value: 0,
            vrf_fragment: step.fragment,
            vrf_output: step.output,
            entropy_snapshot: snapshot,
        });

        if (i + 1) % heartbeat_interval == 0 {
            let before_anchored = vault.last_anchored_move_count();
            let prev_tx_id = chain.last().expect("genesis anchored").entry.tx_id;
            let sent = orchestrator
                .send_heartbeat_anchor()
                .await
                .map_err(|e| format!("heartbeat failed: {e}"))?;
            if sent {
                let after_anchored = vault.last_anchored_move_count();
                let all_moves = vault.all_moves();
                let included = &all_moves[before_anchored..after_anchored];
                let heartbeat_payload = HeartbeatPayload {
                    version: 5,
                    merkle_root: merkle_root_bytes(&all_moves[..after_anchored]),
                    prev_tx_id,
                    delta_flags: delta_flags_for(included),
                    moves: included.iter().map(to_move_packet).collect(),
                    btc_delta: None,
                    nist_delta: None,
                };
                let entry = orchestrator.anchor_chain().await.into_iter().last().expect("heartbeat just anchored");
                chain.push(AnchoredRecord { entry, payload: AnchorPayload::Heartbeat(heartbeat_payload) });
            }
        }
    }

    let final_score = (move_count * 10) as u32;
    let coins_collected = (move_count / 3) as u32;
    let race_time_ms = (move_count as u32) * 50;
    let genesis_tx_id = chain.first().expect("genesis anchored").entry.tx_id;
    let prev_tx_id = chain.last().expect("genesis anchored").entry.tx_id;

    orchestrator
        .anchor_final_state(final_score, coins_collected, race_time_ms, outcome)
        .await
        .map_err(|e| format!("final anchor failed: {e}"))?;

    let all_moves = vault.all_moves();
    let final_payload = FinalPayload {
        final_merkle_root: merkle_root_bytes(&all_moves),
        genesis_tx_id,
        prev_tx_id,
        result_leaf_hash: result_leaf_hash(final_score, coins_collected, outcome, race_time_ms),
        final_score,
        coins_collected,
        race_time_ms,
        outcome_code: outcome,
        total_moves: all_moves.len() as u8,
    };
    let final_entry = orchestrator.anchor_chain().await.into_iter().last().expect("final just anchored");
    chain.push(AnchoredRecord { entry: final_entry, payload: AnchorPayload::Final(final_payload) });

    Ok(MatchRecord {
        game_id: game_id.to_string(),
        player_id: player_id.to_string(),
        first_move_timestamp,
        moves: all_moves,
        chain,
    })
}

fn merkle_root_bytes(moves: &[Move]) -> [u8; 32] {
    let tree = MerkleTree::build_from_moves(moves);
    let mut root = [0u8; 32];
    if let Ok(bytes) = hex::decode(tree.root()) {
        if bytes.len() == 32 {
            root.copy_from_slice(&bytes);
        }
    }
    root
}

fn result_leaf_hash(score: u32, coins: u32, outcome: OutcomeCode, race_time_ms: u32) -> [u8; 32] {
    let text = format!("RESULT:{score}:{coins}:{}:{race_time_ms}", outcome.wire_code());
    sha256(text.as_bytes())
}

fn delta_flags_for(_moves: &[Move]) -> u8 {
    0
}

fn to_move_packet(mv: &Move) -> MovePacket {
    MovePacket {
        action_code: mv.action_code,
        payload: mv.payload,
        time_delta: mv.time_delta,
        vrf_fragment: mv.vrf_fragment,
        value: mv.value,
    }
}
