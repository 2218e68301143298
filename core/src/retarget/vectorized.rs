use tracing::debug;

use super::{
    exits_band, finalize, pace_ratio, schedule, sum_targets, HorizonTable, Retarget, Schedule,
};
use crate::{
    error::ChainError,
    header::{clamp_elapsed, next_height, validate_chain, BlockHeader},
    params::NetworkParams,
};

/// Resolves the difficulty of the block following `chain` from per-position
/// arrays built over the whole window at once.
///
/// Produces the same breakpoint and result as [`super::resolve_one`].
pub fn resolve_one_fast(
    params: &NetworkParams,
    chain: &[BlockHeader],
) -> Result<Option<Retarget>, ChainError> {
    validate_chain(chain)?;

    let Some(last) = chain.last() else {
        return Ok(Some(params.genesis()));
    };
    let next_height = next_height(last)?;

    let (min_blocks, max_blocks, floor_height) = match schedule(params, next_height) {
        Schedule::Fixed(fixed) => return Ok(Some(fixed)),
        Schedule::Window {
            min_blocks,
            max_blocks,
            floor_height,
        } => (min_blocks, max_blocks, floor_height),
    };

    let window = trim_window(chain, max_blocks, floor_height);
    if window.len() < min_blocks {
        debug!(
            height = next_height,
            window = window.len(),
            min_blocks,
            "insufficient history"
        );
        return Ok(None);
    }

    let profile = WindowProfile::new(params, window);
    let breakpoint = profile.breakpoint(min_blocks);
    let mass = breakpoint + 1;
    debug!(height = next_height, mass, "window breakpoint");

    let target_sum = sum_targets(window[window.len() - mass..].iter().map(|h| &h.bits));
    Ok(Some(finalize(
        params,
        &target_sum,
        mass,
        profile.elapsed[breakpoint],
    )))
}

/// Keeps at most `max_blocks` of the newest headers, none below `floor_height`.
fn trim_window(
    chain: &[BlockHeader],
    max_blocks: usize,
    floor_height: Option<u64>,
) -> &[BlockHeader] {
    let mut start = chain.len().saturating_sub(max_blocks);
    if let (Some(floor), Some(first)) = (floor_height, chain.first()) {
        if first.height < floor {
            let floor_index = usize::try_from(floor - first.height).unwrap_or(usize::MAX);
            start = start.max(floor_index.min(chain.len()));
        }
    }
    &chain[start..]
}

/// Per-position arrays over a window, indexed newest first: position `j`
/// describes the window made of the newest `j + 1` headers.
struct WindowProfile {
    /// Seconds from the header at position `j` to the tip, floored at zero.
    elapsed: Vec<u64>,
    ratios: Vec<f64>,
    bands: HorizonTable,
}

impl WindowProfile {
    fn new(params: &NetworkParams, window: &[BlockHeader]) -> Self {
        // gaps[k] is the time from header k - 1 to header k, oldest first.
        let gaps: Vec<i128> = std::iter::once(0)
            .chain(
                window
                    .windows(2)
                    .map(|pair| i128::from(pair[1].timestamp) - i128::from(pair[0].timestamp)),
            )
            .collect();

        let len = window.len();
        let mut running = 0i128;
        let elapsed: Vec<u64> = (0..len)
            .map(|j| {
                if j > 0 {
                    running += gaps[len - j];
                }
                clamp_elapsed(running)
            })
            .collect();

        let ratios = elapsed
            .iter()
            .enumerate()
            .map(|(j, &actual)| pace_ratio(params.target_spacing * (j as u64 + 1), actual))
            .collect();

        WindowProfile {
            elapsed,
            ratios,
            bands: HorizonTable::new(len),
        }
    }

    /// First position at or after `min_blocks - 1` whose ratio leaves its band,
    /// or the oldest position when none does.
    fn breakpoint(&self, min_blocks: usize) -> usize {
        let last_index = self.ratios.len() - 1;
        (min_blocks.saturating_sub(1)..=last_index)
            .find(|&j| exits_band(self.ratios[j], self.bands.band(j)))
            .unwrap_or(last_index)
    }
}
