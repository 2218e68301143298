// Kimoto Gravity Well
// ===================
//
// KGW averages the targets of a variable number of past blocks. Starting from
// the chain tip it grows the window one block at a time and stops once the
// observed block pace leaves the "event horizon" band, a tolerance that
// narrows as more blocks are included. The average target is then scaled by
// actual over expected elapsed time.
//
// The same algorithm is realized three ways: a backward walk (`sequential`),
// an array scan over one window (`vectorized`), and an array scan sharing its
// arrays across many consecutive heights (`batch`). The helpers below are the
// single source of the arithmetic all three use, so their results agree bit for
// bit.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{compact, params::NetworkParams};

pub mod batch;
pub mod sequential;
pub mod vectorized;

pub use batch::resolve_many;
pub use sequential::resolve_one;
pub use vectorized::resolve_one_fast;

/// Scale of the event horizon band.
pub const EVENT_HORIZON_COEFFICIENT: f64 = 0.7084;

/// Decay exponent of the event horizon band.
pub const EVENT_HORIZON_EXPONENT: f64 = -1.228;

/// Block count at which the band's power term equals one.
pub const EVENT_HORIZON_BLOCKS: f64 = 144.0;

/// A resolved difficulty: the compact bits a header must carry and the full
/// target they were derived from.
///
/// `target` is the value before compaction, so `nbits_to_target(nbits)` may be
/// smaller than `target`; compare headers by `nbits`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Retarget {
    pub nbits: u32,
    #[serde(with = "compact::target_hex")]
    pub target: BigUint,
}

impl Retarget {
    pub fn new(nbits: u32, target: BigUint) -> Self {
        Retarget { nbits, target }
    }
}

/// The acceptable pace ratio range `(slow, fast)` once `mass` blocks are in the
/// window.
pub fn event_horizon(mass: usize) -> (f64, f64) {
    let fast = 1.0
        + EVENT_HORIZON_COEFFICIENT
            * (mass as f64 / EVENT_HORIZON_BLOCKS).powf(EVENT_HORIZON_EXPONENT);
    (1.0 / fast, fast)
}

/// Expected over actual elapsed seconds. Either side being zero yields 1.0.
pub fn pace_ratio(target_seconds: u64, actual_seconds: u64) -> f64 {
    if target_seconds == 0 || actual_seconds == 0 {
        return 1.0;
    }
    target_seconds as f64 / actual_seconds as f64
}

/// True when `ratio` has left `(slow, fast)`. The edges count as outside.
pub(crate) fn exits_band(ratio: f64, (slow, fast): (f64, f64)) -> bool {
    ratio <= slow || ratio >= fast
}

/// Precomputed event horizon bands, indexed by `mass - 1`.
#[derive(Clone, Debug)]
pub(crate) struct HorizonTable {
    bands: Vec<(f64, f64)>,
}

impl HorizonTable {
    pub(crate) fn new(len: usize) -> Self {
        HorizonTable {
            bands: (1..=len).map(event_horizon).collect(),
        }
    }

    /// Band for a window of `index + 1` blocks.
    pub(crate) fn band(&self, index: usize) -> (f64, f64) {
        self.bands[index]
    }
}

/// What a resolver does for a given chain tip before looking at any window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Schedule {
    /// The result is a fixed parameter pair.
    Fixed(Retarget),
    /// Average over a window of `min_blocks..=max_blocks` headers, none of them
    /// below `floor_height` when set.
    Window {
        min_blocks: usize,
        max_blocks: usize,
        floor_height: Option<u64>,
    },
}

/// Decides the regime for the block at `next_height`, which must follow at
/// least one header.
pub(crate) fn schedule(params: &NetworkParams, next_height: u64) -> Schedule {
    debug_assert!(next_height > 0);
    let last_height = next_height.saturating_sub(1);
    let (min_blocks, max_blocks) = params.window_bounds(next_height);

    if last_height < min_blocks {
        trace!(last_height, min_blocks, "not enough history, using max target");
        return Schedule::Fixed(params.max());
    }

    let is_posv = params.is_posv(last_height);
    if is_posv && last_height - params.last_pow_block < min_blocks {
        trace!(last_height, min_blocks, "inside PoSV reset period");
        return Schedule::Fixed(params.posv_reset());
    }

    Schedule::Window {
        // An average needs at least one block.
        min_blocks: (min_blocks as usize).max(1),
        max_blocks: max_blocks as usize,
        floor_height: is_posv.then_some(params.last_pow_block.saturating_add(1)),
    }
}

/// Scales the window's average target by actual over expected elapsed time.
///
/// `target_sum` is the sum of the `mass` targets in the window. The mean is kept
/// as this exact pair, so `sum * actual / (mass * expected)` is one floor
/// division. A zero actual elapsed time counts as being exactly on pace.
pub(crate) fn finalize(
    params: &NetworkParams,
    target_sum: &BigUint,
    mass: usize,
    actual_seconds: u64,
) -> Retarget {
    debug_assert!(mass > 0);
    let target_seconds = params.target_spacing * mass as u64;

    // The reference node folds each block into a running mean and truncates at
    // every step, which can land one unit below this exact quotient. Whether
    // that ever changes `nbits` on mainnet is still open.
    let new_target = if actual_seconds == 0 || target_seconds == 0 {
        target_sum / BigUint::from(mass)
    } else {
        (target_sum * BigUint::from(actual_seconds))
            / (BigUint::from(mass) * BigUint::from(target_seconds))
    };

    let new_target = if new_target > params.max_target {
        params.max_target.clone()
    } else {
        new_target
    };
    let nbits = compact::target_to_nbits(&new_target);
    Retarget::new(nbits, new_target)
}

/// Sum of the targets encoded by `bits`.
pub(crate) fn sum_targets<'a>(bits: impl IntoIterator<Item = &'a u32>) -> BigUint {
    bits.into_iter()
        .fold(BigUint::zero(), |acc, b| acc + compact::nbits_to_target(*b))
}
