use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use dotenv::dotenv;
use kgw_core::{
    compact::{difficulty, nbits_to_target, target_from_hex, target_to_hex, target_to_nbits},
    resolve_one, resolve_one_fast, BlockHeader, NetworkParams,
};
use kgw_host::{
    check_headers, format_timestamp, load_headers, load_params, parse_bits, CheckSummary,
    Verdict,
};
use num_bigint::BigUint;
use serde_json::json;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// JSON file with network parameters. Defaults to Reddcoin mainnet.
    #[clap(long, global = true, env = "KGW_PARAMS")]
    params: Option<PathBuf>,

    /// Print results as JSON.
    #[clap(long, global = true)]
    json: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Computes the difficulty required of the block after the last header in a file.
    Next {
        /// JSON array of headers, oldest first.
        headers: PathBuf,
    },
    /// Recomputes the difficulty of every header in a file and compares it with the reported bits.
    Verify {
        /// JSON array of headers to check, oldest first.
        headers: PathBuf,
        /// Trusted headers immediately preceding the checked ones.
        #[clap(long)]
        prev: Option<PathBuf>,
    },
    /// Encodes a 256-bit target given in hex as compact bits.
    Encode { target: String },
    /// Decodes compact bits, hex with a 0x prefix or decimal, into a target.
    Decode { bits: String },
}

fn main() -> Result<(), anyhow::Error> {
    dotenv().ok();
    // Initialize tracing with INFO level as default if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Next { headers } => {
            let params = load_params(cli.params.as_deref())?;
            next_target(&params, &load_headers(&headers)?, cli.json)
        }
        Commands::Verify { headers, prev } => {
            let params = load_params(cli.params.as_deref())?;
            let prev = match prev {
                Some(path) => load_headers(&path)?,
                None => Vec::new(),
            };
            verify_headers(&params, &prev, &load_headers(&headers)?, cli.json)
        }
        Commands::Encode { target } => encode(&target, cli.json),
        Commands::Decode { bits } => decode(&bits, cli.json),
    }
}

fn next_target(params: &NetworkParams, headers: &[BlockHeader], json: bool) -> Result<()> {
    if let Some(tip) = headers.last() {
        info!(
            "Chain tip {} at {}",
            tip.height,
            format_timestamp(tip.timestamp)
        );
    }

    let fast = resolve_one_fast(params, headers).context("Failed to resolve next target")?;
    let sequential = resolve_one(params, headers).context("Failed to resolve next target")?;
    // Both resolvers reject a tip without a successor height.
    let next_height = headers.last().map_or(0, |h| h.height.saturating_add(1));
    if fast != sequential {
        warn!(
            "Resolvers disagree at height {}: vectorized {:?}, sequential {:?}",
            next_height, fast, sequential
        );
        bail!("Resolvers disagree at height {}", next_height);
    }

    match fast {
        Some(retarget) => print_difficulty(
            Some(next_height),
            retarget.nbits,
            &retarget.target,
            json,
        ),
        None if json => println!("{}", json!({ "height": next_height, "result": null })),
        None => println!(
            "Height {}: not enough history to compute the difficulty",
            next_height
        ),
    }
    Ok(())
}

fn verify_headers(
    params: &NetworkParams,
    prev: &[BlockHeader],
    headers: &[BlockHeader],
    json: bool,
) -> Result<()> {
    let checks = check_headers(params, prev, headers)?;
    let summary = CheckSummary::from_checks(&checks);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "summary": summary, "headers": checks }))?
        );
    } else {
        for check in &checks {
            let status = match check.verdict {
                Verdict::Valid => "ok".to_string(),
                Verdict::Mismatch { expected_bits } => {
                    format!("MISMATCH, expected {:#010x}", expected_bits)
                }
                Verdict::Deferred => "deferred".to_string(),
            };
            println!(
                "{:>9}  {}  {:#010x}  {}",
                check.height,
                format_timestamp(check.timestamp),
                check.reported_bits,
                status
            );
        }
        println!(
            "{} valid, {} mismatched, {} deferred",
            summary.valid, summary.mismatched, summary.deferred
        );
    }

    if summary.mismatched > 0 {
        return Err(anyhow!(
            "{} header(s) report bits that differ from the recomputed difficulty",
            summary.mismatched
        ));
    }
    Ok(())
}

fn encode(target_hex: &str, json: bool) -> Result<()> {
    let target = target_from_hex(target_hex)
        .with_context(|| format!("Invalid target {:?}", target_hex))?;
    let nbits = target_to_nbits(&target);
    let rounded = nbits_to_target(nbits);
    if rounded != target {
        warn!("Target is not exactly representable, compact form rounds it down");
    }
    print_difficulty(None, nbits, &rounded, json);
    Ok(())
}

fn decode(bits: &str, json: bool) -> Result<()> {
    let nbits = parse_bits(bits)?;
    print_difficulty(None, nbits, &nbits_to_target(nbits), json);
    Ok(())
}

fn print_difficulty(height: Option<u64>, nbits: u32, target: &BigUint, json: bool) {
    if json {
        let mut value = json!({
            "bits": format!("{:#010x}", nbits),
            "target": target_to_hex(target),
            "difficulty": difficulty(target),
        });
        if let Some(height) = height {
            value["height"] = json!(height);
        }
        println!("{}", value);
    } else {
        if let Some(height) = height {
            println!("Height:     {}", height);
        }
        println!("Bits:       {:#010x}", nbits);
        println!("Target:     {}", target_to_hex(target));
        println!("Difficulty: {}", difficulty(target));
    }
}
