//! Offline audit CLI: runs the five-check `AuditVerifier` pass over a
//! match record produced by `anchor-sim` (or exported from a live
//! deployment) and reports whether the anchored chain is internally
//! consistent.

use anchor_attest::audit::{AuditInput, AuditVerifier};
use anchor_attest::entropy::NoopEntropySource;
use anchor_attest::match_record::MatchRecord;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "anchor-audit")]
#[command(about = "Verify a completed match's anchor chain offline", long_about = None)]
struct Args {
    /// Output compact JSON (single line)
    #[arg(long)]
    compact: bool,

    /// Output human-readable format instead of JSON
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
    /// Verify a match record file
    Verify {
        /// Path to a JSON match record written by `anchor-sim --out`
        record: PathBuf,
        /// DER-encoded NIST beacon public key, to additionally check the
        /// genesis pulse signature
        #[arg(long)]
        nist_key: Option<PathBuf>,
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

async fn run_command(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let (record_path, nist_key_path) = match &args.command {
        Commands::Verify { record, nist_key } => (record, nist_key),
    };

    let raw = std::fs::read_to_string(record_path)
        .map_err(|e| format!("failed to read match record {}: {e}", record_path.display()))?;
    let record: MatchRecord = serde_json::from_str(&raw)
        .map_err(|e| format!("failed to parse match record {}: {e}", record_path.display()))?;

    let nist_public_key_der = match nist_key_path {
        Some(path) => Some(std::fs::read(path).map_err(|e| format!("failed to read nist key {}: {e}", path.display()))?),
        None => None,
    };

    let entropy = NoopEntropySource;
    let verifier = AuditVerifier::new(&entropy);
    let input = AuditInput {
        game_id: &record.game_id,
        player_id: &record.player_id,
        first_move_timestamp: record.first_move_timestamp,
        chain: &record.chain,
        moves: &record.moves,
        nist_public_key_der: nist_public_key_der.as_deref(),
    };
    let verdict = verifier.verify(&input).await;

    let result = serde_json::json!({
        "gameId": record.game_id,
        "passed": verdict.passed(),
        "reasons": verdict.reasons,
        "warnings": verdict.warnings,
    });

    if args.compact {
        println!("{}", serde_json::to_string(&result)?);
    } else if args.human {
        if verdict.passed() {
            println!("PASS  {} ({} moves, {} anchors)", record.game_id, record.moves.len(), record.chain.len());
        } else {
            println!("FAIL  {} ({} moves, {} anchors)", record.game_id, record.moves.len(), record.chain.len());
        }
        for reason in &verdict.reasons {
            println!("  reason:  {reason}");
        }
        for warning in &verdict.warnings {
            println!("  warning: {warning}");
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    if !verdict.passed() {
        std::process::exit(1);
    }
    Ok(())
}
