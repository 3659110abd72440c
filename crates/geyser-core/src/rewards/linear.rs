//! Linear reward distributor
//!
//! Flat continuous emission: every staked share earns the configured
//! rate per second, with no time or spend bonuses. The simplest variant,
//! and the oracle the weighted ones are checked against.
//!
//! Emission is capped by funding: when the desired accrual for an
//! interval exceeds what the unlock curve has made available, only the
//! available amount enters the per-share accumulator and emission stalls
//! until more funding unlocks.

use super::{RewardError, RewardModule, Settlement};
use crate::ledger::LedgerError;
use crate::schedule::FundingSet;
use crate::types::{Address, TokenMetadata};
use geyser_math::{mul_div, Q64_ONE, UNIT};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use tracing::debug;

/// One user's aggregate position; lot identity is irrelevant when every
/// share earns identically
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
struct LinearPosition {
    shares: u128,
    /// Earnings-per-share tally at last settlement, Q64.64
    tally: u128,
    /// Earnings settled but not yet paid out
    banked: u128,
}

/// Reward distributor emitting a fixed rate per share per second
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearRewardModule {
    factory: Address,
    token: TokenMetadata,
    /// Reward per 1e18 shares per second, 1e18-scaled
    rate: u128,
    positions: HashMap<Address, LinearPosition>,
    total_shares: u128,
    funding: FundingSet,
    /// Cumulative earnings per share, Q64.64
    eps: u128,
    /// Reward committed into the accumulator so far
    committed: u128,
    distributed: u128,
    last_update: i64,
}

impl LinearRewardModule {
    pub fn new(factory: Address, token: TokenMetadata, rate: u128) -> Self {
        Self {
            factory,
            token,
            rate,
            positions: HashMap::new(),
            total_shares: 0,
            funding: FundingSet::new(),
            eps: 0,
            committed: 0,
            distributed: 0,
            last_update: 0,
        }
    }

    pub fn rate(&self) -> u128 {
        self.rate
    }

    pub fn total_shares(&self) -> u128 {
        self.total_shares
    }

    pub fn balance(&self, user: &Address) -> u128 {
        self.positions.get(user).map(|p| p.shares).unwrap_or(0)
    }

    /// Advance the accumulator to `now`, emitting at the configured rate
    /// but never more than the unlock curve has made available.
    fn update(&mut self, now: i64) {
        let dt = (now - self.last_update).max(0) as u128;
        self.last_update = self.last_update.max(now);
        if dt == 0 || self.total_shares == 0 || self.rate == 0 {
            return;
        }
        // an unbounded rate-times-interval product saturates; the funding
        // cap below bounds what actually enters the accumulator
        let desired = self
            .rate
            .checked_mul(dt)
            .and_then(|per_share| mul_div(self.total_shares, per_share, UNIT).ok())
            .unwrap_or(u128::MAX);
        let available = self.funding.total_unlocked(now) - self.committed;
        let actual = desired.min(available);
        if actual == 0 {
            return;
        }
        let delta = match mul_div(actual, Q64_ONE, self.total_shares) {
            Ok(delta) => delta,
            Err(_) => return,
        };
        self.eps += delta;
        // track what the accumulator actually absorbed, not the target
        self.committed += mul_div(delta, self.total_shares, Q64_ONE).unwrap_or(actual);
    }

    /// Fold accrued earnings into the banked bucket at the current tally.
    fn settle_position(eps: u128, position: &mut LinearPosition) {
        position.banked += mul_div(position.shares, eps - position.tally, Q64_ONE).unwrap_or(0);
        position.tally = eps;
    }

    fn require_shares(&self, user: &Address, shares: u128) -> Result<(), RewardError> {
        if shares == 0 {
            return Err(LedgerError::ZeroShares.into());
        }
        let available = self.balance(user);
        if shares > available {
            return Err(LedgerError::InsufficientShares {
                requested: shares,
                available,
            }
            .into());
        }
        Ok(())
    }
}

impl RewardModule for LinearRewardModule {
    fn factory(&self) -> Address {
        self.factory
    }

    fn tokens(&self) -> Vec<TokenMetadata> {
        vec![self.token.clone()]
    }

    fn stake(
        &mut self,
        user: &Address,
        shares: u128,
        _data: &[u8],
        now: i64,
    ) -> Result<(), RewardError> {
        if shares == 0 {
            return Err(LedgerError::ZeroShares.into());
        }
        self.update(now);
        let position = self.positions.entry(*user).or_default();
        Self::settle_position(self.eps, position);
        position.shares += shares;
        self.total_shares += shares;
        Ok(())
    }

    /// Remove shares and pay everything earned so far
    fn unstake(
        &mut self,
        user: &Address,
        shares: u128,
        _data: &[u8],
        now: i64,
    ) -> Result<Settlement, RewardError> {
        self.require_shares(user, shares)?;
        self.update(now);
        let position = self.positions.get_mut(user).expect("balance implies position");
        Self::settle_position(self.eps, position);
        position.shares -= shares;
        self.total_shares -= shares;
        let reward = position.banked;
        position.banked = 0;
        self.distributed += reward;
        debug!(user = %user, shares, reward, "linear settlement");
        Ok(Settlement {
            reward,
            gysr_spent: 0,
        })
    }

    /// Pay everything earned so far without touching the stake
    fn claim(
        &mut self,
        user: &Address,
        shares: u128,
        _data: &[u8],
        now: i64,
    ) -> Result<Settlement, RewardError> {
        self.require_shares(user, shares)?;
        self.update(now);
        let position = self.positions.get_mut(user).expect("balance implies position");
        Self::settle_position(self.eps, position);
        let reward = position.banked;
        position.banked = 0;
        self.distributed += reward;
        debug!(user = %user, reward, "linear claim");
        Ok(Settlement {
            reward,
            gysr_spent: 0,
        })
    }

    fn fund(
        &mut self,
        amount: u128,
        duration_secs: u64,
        start: i64,
        now: i64,
    ) -> Result<(), RewardError> {
        self.funding.fund(amount, duration_secs, start, now)?;
        Ok(())
    }

    fn preview(&self, user: &Address, shares: u128, now: i64) -> u128 {
        if shares == 0 || shares > self.balance(user) {
            return 0;
        }
        // project the accumulator without committing the update
        let mut eps = self.eps;
        let dt = (now - self.last_update).max(0) as u128;
        if dt > 0 && self.total_shares > 0 && self.rate > 0 {
            let desired = self
                .rate
                .checked_mul(dt)
                .and_then(|per_share| mul_div(self.total_shares, per_share, UNIT).ok())
                .unwrap_or(u128::MAX);
            let available = self.funding.total_unlocked(now) - self.committed;
            let actual = desired.min(available);
            eps += mul_div(actual, Q64_ONE, self.total_shares).unwrap_or(0);
        }
        let position = self.positions.get(user).expect("balance implies position");
        position.banked + mul_div(position.shares, eps - position.tally, Q64_ONE).unwrap_or(0)
    }

    fn usage(&self, now: i64) -> u128 {
        let unlocked = self.funding.total_unlocked(now);
        if unlocked == 0 {
            return 0;
        }
        mul_div(self.distributed, UNIT, unlocked).unwrap_or(UNIT)
    }

    fn distributed(&self) -> u128 {
        self.distributed
    }

    fn total_unlocked(&self, now: i64) -> u128 {
        self.funding.total_unlocked(now)
    }

    fn total_funded(&self) -> u128 {
        self.funding.total_funded()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
