//! Rate-assignment staking converter
//!
//! Positions hold no deposited asset. A controller assigns each
//! beneficiary a shares-per-day rate; shares then accrue linearly and
//! continuously from the assignment epoch until the rate is reduced.
//! "Withdrawal" only stops further accrual.
//!
//! Through the pool seam, `stake`/`unstake` amounts are rate deltas
//! (token-scale shares per day) and the acting user must be the
//! controller, with the beneficiary named in the parameter blob. The
//! share value a rate delta converts to is `rate * 1e6`, and the
//! reported shares-per-token ratio is the fixed 1e24 constant (1e6
//! scaled twice for the two-stage rate-times-time representation).

use super::{decode_data, StakingError, StakingModule};
use crate::constants::{ASSIGNMENT_SHARES_PER_TOKEN, INITIAL_SHARES_PER_TOKEN, SECONDS_PER_DAY};
use crate::types::{Address, TokenMetadata};
use geyser_math::mul_div;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use tracing::debug;

/// Parameter blob naming the beneficiary of a rate change
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Beneficiary {
    pub address: Address,
}

/// One beneficiary's accrual state
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct AssignmentPosition {
    /// Assigned rate: token-scale (1e18) shares per day
    pub rate_per_day: u128,
    /// Epoch the current rate accrues from
    pub since: i64,
    /// Shares settled from earlier rates
    pub settled_shares: u128,
}

impl AssignmentPosition {
    fn accrued(&self, now: i64) -> u128 {
        let elapsed = (now - self.since).max(0) as u128;
        // elapsed * scale stays far below 2^128; the rate product can
        // exceed it and saturates rather than panicking
        let live = mul_div(
            self.rate_per_day,
            elapsed * INITIAL_SHARES_PER_TOKEN,
            SECONDS_PER_DAY as u128,
        )
        .unwrap_or(u128::MAX);
        self.settled_shares.saturating_add(live)
    }

    /// Fold live accrual into the settled bucket and restart the clock.
    fn settle(&mut self, now: i64) {
        self.settled_shares = self.accrued(now);
        self.since = self.since.max(now);
    }
}

/// Staking converter driven by administrator-assigned accrual rates
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssignmentStakingModule {
    factory: Address,
    controller: Address,
    positions: HashMap<Address, AssignmentPosition>,
    /// Sum of assigned rates, token-scale per day
    total_rate: u128,
}

impl AssignmentStakingModule {
    pub fn new(factory: Address, controller: Address) -> Self {
        Self {
            factory,
            controller,
            positions: HashMap::new(),
            total_rate: 0,
        }
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    /// Assigned daily rate for a beneficiary.
    pub fn rate(&self, user: &Address) -> u128 {
        self.positions.get(user).map(|p| p.rate_per_day).unwrap_or(0)
    }

    fn require_controller(&self, caller: &Address) -> Result<(), StakingError> {
        if caller != &self.controller {
            return Err(StakingError::NotController);
        }
        Ok(())
    }
}

impl StakingModule for AssignmentStakingModule {
    fn factory(&self) -> Address {
        self.factory
    }

    /// No backing asset
    fn tokens(&self) -> Vec<TokenMetadata> {
        Vec::new()
    }

    /// The "balance" of an assignment position is its daily rate
    fn balance(&self, user: &Address) -> u128 {
        self.rate(user)
    }

    fn shares(&self, user: &Address, now: i64) -> u128 {
        self.positions.get(user).map(|p| p.accrued(now)).unwrap_or(0)
    }

    fn total_shares(&self, now: i64) -> u128 {
        self.positions
            .values()
            .fold(0u128, |acc, p| acc.saturating_add(p.accrued(now)))
    }

    /// Constant by construction; elapsed time never changes it
    fn shares_per_token(&self, _now: i64) -> u128 {
        ASSIGNMENT_SHARES_PER_TOKEN
    }

    /// Rate-delta to share-value conversion. Sufficiency is checked in
    /// the mutating calls, where the beneficiary is known; the acting
    /// user here is the controller, who holds no position of their own.
    fn amount_to_shares(
        &self,
        user: &Address,
        amount: u128,
        _now: i64,
    ) -> Result<u128, StakingError> {
        let amount = if amount == 0 { self.rate(user) } else { amount };
        amount
            .checked_mul(INITIAL_SHARES_PER_TOKEN)
            .ok_or(StakingError::ConversionOverflow)
    }

    /// The acting user is the controller; the beneficiary named in
    /// `data` must hold at least `amount` of daily rate.
    fn validate_unstake(
        &self,
        user: &Address,
        amount: u128,
        data: &[u8],
        _now: i64,
    ) -> Result<(), StakingError> {
        self.require_controller(user)?;
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let beneficiary: Beneficiary = decode_data("assignment unstake", data)?;
        let available = self.rate(&beneficiary.address);
        if amount > available {
            return Err(StakingError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    /// Raise the beneficiary's rate by `amount` shares per day.
    /// Controller-only; the beneficiary is named in `data`.
    fn stake(
        &mut self,
        user: &Address,
        amount: u128,
        data: &[u8],
        now: i64,
    ) -> Result<u128, StakingError> {
        self.require_controller(user)?;
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let beneficiary: Beneficiary = decode_data("assignment stake", data)?;
        let minted = amount
            .checked_mul(INITIAL_SHARES_PER_TOKEN)
            .ok_or(StakingError::ConversionOverflow)?;
        let total_rate = self
            .total_rate
            .checked_add(amount)
            .ok_or(StakingError::ConversionOverflow)?;

        let position = self.positions.entry(beneficiary.address).or_default();
        position.settle(now);
        position.since = position.since.max(now);
        position.rate_per_day += amount;
        self.total_rate = total_rate;
        debug!(beneficiary = %beneficiary.address, rate = amount, "assignment rate raised");
        Ok(minted)
    }

    /// Lower the beneficiary's rate by `amount` shares per day; a rate of
    /// zero stops accrual while keeping already-accrued shares settled.
    fn unstake(
        &mut self,
        user: &Address,
        amount: u128,
        data: &[u8],
        now: i64,
    ) -> Result<u128, StakingError> {
        self.require_controller(user)?;
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let beneficiary: Beneficiary = decode_data("assignment unstake", data)?;

        let position = self
            .positions
            .get_mut(&beneficiary.address)
            .ok_or(StakingError::InsufficientBalance {
                requested: amount,
                available: 0,
            })?;
        if amount > position.rate_per_day {
            return Err(StakingError::InsufficientBalance {
                requested: amount,
                available: position.rate_per_day,
            });
        }
        position.settle(now);
        position.rate_per_day -= amount;
        self.total_rate -= amount;
        debug!(beneficiary = %beneficiary.address, rate = amount, "assignment rate lowered");
        // burned share value saturates; rates accumulated over several
        // assignments can exceed what one conversion represents
        Ok(amount.checked_mul(INITIAL_SHARES_PER_TOKEN).unwrap_or(u128::MAX))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geyser_math::UNIT;

    const DAY: i64 = 86_400;

    fn controller() -> Address {
        Address::new([0xcc; 32])
    }

    fn user(n: u8) -> Address {
        Address::new([n; 32])
    }

    fn module() -> AssignmentStakingModule {
        AssignmentStakingModule::new(Address::new([3; 32]), controller())
    }

    fn beneficiary(n: u8) -> Vec<u8> {
        bincode::serialize(&Beneficiary { address: user(n) }).unwrap()
    }

    #[test]
    fn test_controller_only() {
        let mut m = module();
        assert_eq!(
            m.stake(&user(1), 100 * UNIT, &beneficiary(1), 0),
            Err(StakingError::NotController)
        );
        assert!(m.stake(&controller(), 100 * UNIT, &beneficiary(1), 0).is_ok());
    }

    #[test]
    fn test_linear_accrual() {
        let mut m = module();
        m.stake(&controller(), 100 * UNIT, &beneficiary(1), 0).unwrap();
        m.stake(&controller(), 200 * UNIT, &beneficiary(2), 0).unwrap();

        let expect = |rate: u128, days: u128| rate * days * INITIAL_SHARES_PER_TOKEN;
        assert_eq!(m.shares(&user(1), 30 * DAY), expect(100 * UNIT, 30));
        assert_eq!(m.shares(&user(2), 30 * DAY), expect(200 * UNIT, 30));
        assert_eq!(m.total_shares(30 * DAY), expect(300 * UNIT, 30));
        // balance reports the assigned daily rate, not accrued shares
        assert_eq!(m.balance(&user(1)), 100 * UNIT);
    }

    #[test]
    fn test_shares_per_token_constant() {
        let mut m = module();
        assert_eq!(m.shares_per_token(0), ASSIGNMENT_SHARES_PER_TOKEN);
        m.stake(&controller(), 100 * UNIT, &beneficiary(1), 0).unwrap();
        for t in [0, 30 * DAY, 400 * DAY] {
            assert_eq!(m.shares_per_token(t), ASSIGNMENT_SHARES_PER_TOKEN);
        }
        assert_eq!(ASSIGNMENT_SHARES_PER_TOKEN, 10u128.pow(24));
    }

    #[test]
    fn test_rate_reduction_stops_accrual() {
        let mut m = module();
        m.stake(&controller(), 100 * UNIT, &beneficiary(1), 0).unwrap();
        m.unstake(&controller(), 100 * UNIT, &beneficiary(1), 10 * DAY)
            .unwrap();
        let settled = 100 * UNIT * 10 * INITIAL_SHARES_PER_TOKEN;
        assert_eq!(m.shares(&user(1), 10 * DAY), settled);
        // no further accrual after the rate hits zero
        assert_eq!(m.shares(&user(1), 400 * DAY), settled);
        assert_eq!(m.balance(&user(1)), 0);
    }

    #[test]
    fn test_rate_change_settles_history() {
        let mut m = module();
        m.stake(&controller(), 100 * UNIT, &beneficiary(1), 0).unwrap();
        m.stake(&controller(), 100 * UNIT, &beneficiary(1), 10 * DAY)
            .unwrap();
        // 10 days at 100/day, then 5 days at 200/day
        let want = (100 * 10 + 200 * 5) * UNIT * INITIAL_SHARES_PER_TOKEN;
        assert_eq!(m.shares(&user(1), 15 * DAY), want);
    }

    #[test]
    fn test_unstake_beyond_rate_rejected() {
        let mut m = module();
        m.stake(&controller(), 100 * UNIT, &beneficiary(1), 0).unwrap();
        assert!(matches!(
            m.unstake(&controller(), 150 * UNIT, &beneficiary(1), DAY),
            Err(StakingError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            m.unstake(&controller(), UNIT, &beneficiary(2), DAY),
            Err(StakingError::InsufficientBalance { available: 0, .. })
        ));
    }

    #[test]
    fn test_no_backing_asset() {
        let m = module();
        assert!(m.tokens().is_empty());
    }

    #[test]
    fn test_validate_unstake_mirrors_rejections() {
        let mut m = module();
        m.stake(&controller(), 100 * UNIT, &beneficiary(1), 0).unwrap();
        assert_eq!(
            m.validate_unstake(&user(1), 50 * UNIT, &beneficiary(1), DAY),
            Err(StakingError::NotController)
        );
        assert!(matches!(
            m.validate_unstake(&controller(), 150 * UNIT, &beneficiary(1), DAY),
            Err(StakingError::InsufficientBalance { .. })
        ));
        assert!(m
            .validate_unstake(&controller(), 100 * UNIT, &beneficiary(1), DAY)
            .is_ok());
        // the check touched nothing
        assert_eq!(m.rate(&user(1)), 100 * UNIT);
    }

    #[test]
    fn test_extreme_rate_saturates_without_panic() {
        let mut m = module();
        // overflowing conversions are rejected before anything mutates
        assert_eq!(
            m.stake(&controller(), u128::MAX, &beneficiary(1), 0),
            Err(StakingError::ConversionOverflow)
        );
        assert_eq!(m.rate(&user(1)), 0);

        // the largest assignable rate accrues to the saturation ceiling
        let rate = u128::MAX / INITIAL_SHARES_PER_TOKEN;
        m.stake(&controller(), rate, &beneficiary(1), 0).unwrap();
        assert_eq!(m.shares(&user(1), 400 * DAY), u128::MAX);
        assert_eq!(m.total_shares(400 * DAY), u128::MAX);
    }
}
