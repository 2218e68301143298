use std::{fs, path::Path};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use kgw_core::{resolve_many, BlockHeader, NetworkParams};
use serde::Serialize;
use tracing::{info, warn};

/// Reads a JSON array of headers, oldest first.
pub fn load_headers(path: &Path) -> Result<Vec<BlockHeader>> {
    info!("Loading headers from file: {}", path.display());
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read header file {}", path.display()))?;
    let headers: Vec<BlockHeader> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse headers in {}", path.display()))?;

    match (headers.first(), headers.last()) {
        (Some(first), Some(last)) => info!(
            "  Loaded {} headers, heights {}..={}",
            headers.len(),
            first.height,
            last.height
        ),
        _ => warn!("  Header file {} is empty", path.display()),
    }
    Ok(headers)
}

/// Reads a parameter set from a JSON file, or returns the Reddcoin mainnet
/// parameters when no file is given.
pub fn load_params(path: Option<&Path>) -> Result<NetworkParams> {
    let Some(path) = path else {
        return Ok(NetworkParams::reddcoin());
    };

    info!("Loading network parameters from file: {}", path.display());
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameter file {}", path.display()))?;
    let params: NetworkParams = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse parameters in {}", path.display()))?;
    if params.target_spacing == 0 {
        return Err(anyhow!("target_spacing must be positive"));
    }
    Ok(params)
}

/// Parses compact bits written as `0x`-prefixed hex or as a decimal number.
pub fn parse_bits(input: &str) -> Result<u32> {
    let input = input.trim();
    match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(digits) => u32::from_str_radix(digits, 16)
            .with_context(|| format!("Invalid hex bits {input:?}")),
        None => input
            .parse()
            .with_context(|| format!("Invalid decimal bits {input:?}")),
    }
}

/// Renders a header timestamp as RFC 3339, or the raw value when it is out of
/// range.
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// The reported bits equal the recomputed bits.
    Valid,
    /// The header reports bits other than the recomputed ones.
    Mismatch { expected_bits: u32 },
    /// Too little history precedes the header to recompute its difficulty.
    Deferred,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct HeaderCheck {
    pub height: u64,
    pub timestamp: i64,
    pub reported_bits: u32,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Recomputes the difficulty of every header in `chain` and compares it with
/// the bits the header reports. `prev` holds the trusted headers preceding it.
pub fn check_headers(
    params: &NetworkParams,
    prev: &[BlockHeader],
    chain: &[BlockHeader],
) -> Result<Vec<HeaderCheck>> {
    let expected = resolve_many(params, prev, chain).context("Failed to resolve header batch")?;

    let checks: Vec<HeaderCheck> = chain
        .iter()
        .zip(expected)
        .map(|(header, expected)| {
            let verdict = match expected {
                None => Verdict::Deferred,
                Some(retarget) if retarget.nbits == header.bits => Verdict::Valid,
                Some(retarget) => {
                    warn!(
                        "Header {} reports bits {:#010x}, expected {:#010x}",
                        header.height, header.bits, retarget.nbits
                    );
                    Verdict::Mismatch {
                        expected_bits: retarget.nbits,
                    }
                }
            };
            HeaderCheck {
                height: header.height,
                timestamp: header.timestamp,
                reported_bits: header.bits,
                verdict,
            }
        })
        .collect();

    let summary = CheckSummary::from_checks(&checks);
    info!(
        "Checked {} headers: {} valid, {} mismatched, {} deferred",
        checks.len(),
        summary.valid,
        summary.mismatched,
        summary.deferred
    );
    Ok(checks)
}

#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckSummary {
    pub valid: usize,
    pub mismatched: usize,
    pub deferred: usize,
}

impl CheckSummary {
    pub fn from_checks(checks: &[HeaderCheck]) -> Self {
        checks
            .iter()
            .fold(CheckSummary::default(), |mut summary, check| {
                match check.verdict {
                    Verdict::Valid => summary.valid += 1,
                    Verdict::Mismatch { .. } => summary.mismatched += 1,
                    Verdict::Deferred => summary.deferred += 1,
                }
                summary
            })
    }
}
