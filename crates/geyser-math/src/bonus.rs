//! GYSR spend bonus and time bonus envelope
//!
//! Two multiplier families, both 1e18-scaled:
//! - the GYSR bonus rewards burning the protocol utility token, with
//!   diminishing returns through a decimal logarithm and a pool-dominance
//!   scale-down
//! - the time bonus rewards longer-held stake with a linear ramp capped at
//!   a configured maximum
//!
//! ## GYSR bonus formula
//!
//! ```text
//! scale      = min(1, (totalStake * 0.01) / userStake)
//! multiplier = 1 + log10(1 + spend * scale / (0.01 + usage))
//! ```
//!
//! Monotone increasing in spend, monotone decreasing in usage. A stake
//! that already dominates more than 1% of the pool gets no amplification
//! beyond parity.

use crate::error::{MathError, Result};
use crate::fixed::{from_q64, log10, mul_div, to_q64, Q64_ONE, UNIT};
use serde::{Deserialize, Serialize};

/// Hundredth of a unit: the 0.01 buffer in the bonus denominator and the
/// pool-dominance threshold.
const CENTI_UNIT: u128 = UNIT / 100;

/// Largest decimal-scale logarithm argument whose whole part survives
/// the Q64.64 conversion; larger amplifications clamp here so the curve
/// stays monotone instead of wrapping back to identity.
const MAX_LOG_ARG: u128 = Q64_ONE * UNIT - 1;

/// GYSR spend bonus multiplier, 1e18-scaled.
///
/// All inputs are 1e18-scaled; `usage` is clamped into `[0, 1e18]`.
///
/// Returns:
/// - `0` when `user_stake` or `total_stake` is zero. This is a sentinel,
///   not a multiplier: there is no stake basis to amplify, and callers
///   must treat the bonus as inapplicable rather than apply a zero
///   factor to a reward.
/// - `1e18` (identity) when `spend` is zero.
/// - `1e18 + log10(1e18 + spend * scale / (0.01e18 + usage))` otherwise,
///   with the logarithm argument saturating at its representable
///   ceiling so the multiplier is monotone over the full spend range.
///
/// The zero-stake guard runs before anything else, so the logarithm
/// primitive can never see a domain error from this path.
pub fn gysr_bonus(spend: u128, user_stake: u128, total_stake: u128, usage: u128) -> u128 {
    if user_stake == 0 || total_stake == 0 {
        return 0;
    }
    if spend == 0 {
        return UNIT;
    }
    let usage = usage.min(UNIT);

    // scale = min(1, total * 0.01 / user); saturate without the wide
    // multiply when the user holds less than 1% of the pool
    let scale = if total_stake / 100 >= user_stake {
        UNIT
    } else {
        // total < 100 * user, so the quotient is below UNIT
        mul_div(total_stake, CENTI_UNIT, user_stake).unwrap_or(UNIT)
    };

    // arg = 1 + spend * scale / (0.01 + usage), in 1e18 decimal scale;
    // spends past the representable ceiling saturate at the maximum
    let amplified = mul_div(spend, scale, CENTI_UNIT + usage).unwrap_or(u128::MAX);
    let arg = UNIT.saturating_add(amplified).min(MAX_LOG_ARG);

    // arg >= 1.0 by construction, so log10 is non-negative and total
    UNIT + from_q64(log10(to_q64(arg)).unwrap_or(0) as u128)
}

/// Time bonus envelope: linear interpolation from `min_multiplier` at
/// stake time to `max_multiplier` once `period_secs` has elapsed, capped
/// thereafter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusParameters {
    /// Multiplier applied at stake time, 1e18-scaled
    pub min_multiplier: u128,
    /// Multiplier reached after the full period, 1e18-scaled
    pub max_multiplier: u128,
    /// Ramp length in seconds; zero means the maximum applies immediately
    pub period_secs: u64,
}

impl BonusParameters {
    /// Validated constructor: the envelope must be non-decreasing.
    pub fn new(min_multiplier: u128, max_multiplier: u128, period_secs: u64) -> Result<Self> {
        if min_multiplier > max_multiplier {
            return Err(MathError::InvalidBonusEnvelope {
                min: min_multiplier,
                max: max_multiplier,
            });
        }
        Ok(Self {
            min_multiplier,
            max_multiplier,
            period_secs,
        })
    }

    /// Identity envelope: 1.0x at all times.
    pub fn flat() -> Self {
        Self {
            min_multiplier: UNIT,
            max_multiplier: UNIT,
            period_secs: 0,
        }
    }
}

impl Default for BonusParameters {
    fn default() -> Self {
        Self::flat()
    }
}

/// Time bonus multiplier for a stake of the given age, 1e18-scaled.
pub fn time_bonus(params: &BonusParameters, elapsed_secs: u64) -> u128 {
    if params.period_secs == 0 || elapsed_secs >= params.period_secs {
        return params.max_multiplier;
    }
    let range = params.max_multiplier - params.min_multiplier;
    params.min_multiplier + range * elapsed_secs as u128 / params.period_secs as u128
}
