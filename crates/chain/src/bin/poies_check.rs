//! Consensus test harness: replays a chain context and judges one block.
//!
//! Exit codes: 0 accepted, 1 rejected-structural, 2 rejected-policy,
//! 3 rejected-work. The rejection's stable string code is printed on
//! stdout either way.

use animica_chain::ChainState;
use animica_types::block::{Block, Header};
use animica_types::codec::from_bytes_canonical;
use animica_types::config::ConsensusParams;
use animica_types::error::ErrorCode;
use animica_types::policy::PolicyBundle;
use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::ExitCode;

/// Replay a chain context and run the admission pipeline on one block.
#[derive(Parser)]
#[command(name = "poies-check", version)]
struct Args {
    /// Path to the candidate block, hex-encoded canonical CBOR.
    #[arg(long)]
    block: PathBuf,
    /// Path to the chain context document (JSON).
    #[arg(long)]
    context: PathBuf,
    /// Local clock reading (UNIX seconds) for the skew check; omitted
    /// selects the median-of-parents substitution.
    #[arg(long)]
    local_time: Option<u64>,
}

/// The harness input: parameters, the policy bundle, the genesis header,
/// and the ancestor blocks to replay, all consensus objects hex-encoded.
#[derive(Deserialize)]
struct ContextDoc {
    params: ConsensusParams,
    policy: PolicyBundle,
    genesis: String,
    #[serde(default)]
    ancestors: Vec<String>,
}

fn read_hex(doc: &str) -> Result<Vec<u8>> {
    let compact: String = doc.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact).context("invalid hex")
}

fn run(args: &Args) -> Result<ExitCode> {
    let context: ContextDoc = serde_json::from_str(
        &std::fs::read_to_string(&args.context).context("reading context document")?,
    )
    .context("parsing context document")?;
    let genesis: Header = from_bytes_canonical(&read_hex(&context.genesis)?)
        .context("decoding genesis header")?;
    let mut chain = ChainState::new(genesis, context.params, context.policy)
        .map_err(|e| anyhow::anyhow!("invalid genesis: {e}"))?;

    for (idx, doc) in context.ancestors.iter().enumerate() {
        let block = Block::decode_wire(&read_hex(doc)?)
            .map_err(|e| anyhow::anyhow!("ancestor {idx} undecodable: {e}"))?;
        chain
            .admit_block(&block, None)
            .map_err(|e| anyhow::anyhow!("ancestor {idx} rejected: {}", e.code()))?;
    }

    let raw = read_hex(
        &std::fs::read_to_string(&args.block).context("reading block file")?,
    )?;
    let block = match Block::decode_wire(&raw) {
        Ok(block) => block,
        Err(e) => {
            println!("{}", e.code());
            return Ok(ExitCode::from(1));
        }
    };
    match chain.admit_block(&block, args.local_time) {
        Ok(outcome) => {
            println!("accepted score={} work={}", outcome.score, outcome.work);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            println!("{}", err.code());
            Ok(ExitCode::from(err.category() as u8))
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("poies-check: {err:#}");
            ExitCode::from(1)
        }
    }
}
