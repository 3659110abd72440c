//! Friendly reward distributor
//!
//! Vesting fairness instead of share-seconds competition. Unlocked
//! reward is spread over currently staked shares through a
//! rewards-per-share accumulator (Q64.64 per share); each deposit lot
//! earns from its entry tally forward, so nothing is retroactive.
//!
//! A lot's earnings start fully unvested and vest linearly to 100% over
//! the configured vesting period. Unstaking early pays only the vested
//! fraction; the forfeited remainder returns to the distribution dust
//! and is spread over the remaining stakers on the next update, never
//! burned. Claiming pays the vested fraction and banks the rest on the
//! lot without resetting its vesting clock.

use super::{RewardError, RewardModule, Settlement};
use crate::ledger::LedgerError;
use crate::schedule::FundingSet;
use crate::types::{Address, TokenMetadata};
use geyser_math::{mul_div, Q64_ONE, UNIT};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use tracing::debug;

/// One deposit increment and its vesting state
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
struct VestingLot {
    shares: u128,
    staked_at: i64,
    /// Rewards-per-share tally at entry, Q64.64
    tally: u128,
    /// Earnings carried from a prior claim, not yet paid
    banked: u128,
}

/// Reward distributor with linear vesting and forfeit redistribution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FriendlyRewardModule {
    factory: Address,
    token: TokenMetadata,
    vesting_period_secs: u64,
    lots: HashMap<Address, Vec<VestingLot>>,
    total_shares: u128,
    funding: FundingSet,
    /// Cumulative rewards per staked share, Q64.64
    rps: u128,
    /// Unlocked but not yet spread: truncation residue plus forfeits
    dust: u128,
    /// Unlocked amount already pulled into distribution
    released: u128,
    distributed: u128,
}

impl FriendlyRewardModule {
    pub fn new(factory: Address, token: TokenMetadata, vesting_period_secs: u64) -> Self {
        Self {
            factory,
            token,
            vesting_period_secs,
            lots: HashMap::new(),
            total_shares: 0,
            funding: FundingSet::new(),
            rps: 0,
            dust: 0,
            released: 0,
            distributed: 0,
        }
    }

    pub fn vesting_period_secs(&self) -> u64 {
        self.vesting_period_secs
    }

    pub fn total_shares(&self) -> u128 {
        self.total_shares
    }

    pub fn balance(&self, user: &Address) -> u128 {
        self.lots
            .get(user)
            .map(|lots| lots.iter().map(|l| l.shares).sum())
            .unwrap_or(0)
    }

    /// Spread newly unlocked reward plus accumulated dust over the
    /// currently staked shares. With no stakers everything waits in dust.
    fn update(&mut self, now: i64) {
        let unlocked = self.funding.total_unlocked(now);
        let newly = unlocked - self.released;
        self.released = unlocked;
        let distribute = newly + self.dust;
        if self.total_shares == 0 || distribute == 0 {
            self.dust = distribute;
            return;
        }
        match mul_div(distribute, Q64_ONE, self.total_shares) {
            Ok(delta) => {
                self.rps += delta;
                let applied = mul_div(delta, self.total_shares, Q64_ONE).unwrap_or(distribute);
                self.dust = distribute - applied;
            }
            // unrepresentable per-share delta; hold everything as dust
            Err(_) => self.dust = distribute,
        }
    }

    /// Vested fraction of a lot's earnings, 1e18-scaled.
    fn vested(period_secs: u64, staked_at: i64, now: i64) -> u128 {
        if period_secs == 0 {
            return UNIT;
        }
        let elapsed = (now - staked_at).max(0) as u128;
        let period = period_secs as u128;
        if elapsed >= period {
            UNIT
        } else {
            elapsed * UNIT / period
        }
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

impl RewardModule for FriendlyRewardModule {
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
        self.lots.entry(*user).or_default().push(VestingLot {
            shares,
            staked_at: now,
            tally: self.rps,
            banked: 0,
        });
        self.total_shares += shares;
        Ok(())
    }

    /// Settle newest-first; the unvested remainder of each settled lot
    /// returns to the dust for redistribution
    fn unstake(
        &mut self,
        user: &Address,
        shares: u128,
        _data: &[u8],
        now: i64,
    ) -> Result<Settlement, RewardError> {
        self.require_shares(user, shares)?;
        self.update(now);
        let rps = self.rps;
        let period = self.vesting_period_secs;

        let lots = self.lots.get_mut(user).expect("balance implies lots");
        let mut remaining = shares;
        let mut paid: u128 = 0;
        let mut forfeited: u128 = 0;
        while remaining > 0 {
            let lot = lots.last_mut().expect("balance covers remaining shares");
            let take = lot.shares.min(remaining);
            let banked_part = if take == lot.shares {
                lot.banked
            } else {
                mul_div(lot.banked, take, lot.shares).unwrap_or(0)
            };
            let earned = banked_part + mul_div(take, rps - lot.tally, Q64_ONE).unwrap_or(0);
            let vested = Self::vested(period, lot.staked_at, now);
            let vested_pay = mul_div(earned, vested, UNIT).unwrap_or(0);
            paid += vested_pay;
            forfeited += earned - vested_pay;
            remaining -= take;
            if take == lot.shares {
                lots.pop();
            } else {
                lot.shares -= take;
                lot.banked -= banked_part;
            }
        }
        self.total_shares -= shares;
        self.dust += forfeited;
        self.distributed += paid;
        debug!(user = %user, shares, reward = paid, forfeited, "friendly settlement");
        Ok(Settlement {
            reward: paid,
            gysr_spent: 0,
        })
    }

    /// Pay the vested fraction of the settled lots' earnings and bank the
    /// rest on replacement lots that keep their original vesting clocks
    fn claim(
        &mut self,
        user: &Address,
        shares: u128,
        _data: &[u8],
        now: i64,
    ) -> Result<Settlement, RewardError> {
        self.require_shares(user, shares)?;
        self.update(now);
        let rps = self.rps;
        let period = self.vesting_period_secs;

        let lots = self.lots.get_mut(user).expect("balance implies lots");
        let mut remaining = shares;
        let mut paid: u128 = 0;
        let mut replacements = Vec::new();
        while remaining > 0 {
            let lot = lots.last_mut().expect("balance covers remaining shares");
            let take = lot.shares.min(remaining);
            let banked_part = if take == lot.shares {
                lot.banked
            } else {
                mul_div(lot.banked, take, lot.shares).unwrap_or(0)
            };
            let earned = banked_part + mul_div(take, rps - lot.tally, Q64_ONE).unwrap_or(0);
            let vested = Self::vested(period, lot.staked_at, now);
            let vested_pay = mul_div(earned, vested, UNIT).unwrap_or(0);
            paid += vested_pay;
            replacements.push(VestingLot {
                shares: take,
                staked_at: lot.staked_at,
                tally: rps,
                banked: earned - vested_pay,
            });
            remaining -= take;
            if take == lot.shares {
                lots.pop();
            } else {
                lot.shares -= take;
                lot.banked -= banked_part;
            }
        }
        // claimed lots rejoin at the top of the settlement order
        lots.extend(replacements);
        self.distributed += paid;
        debug!(user = %user, shares, reward = paid, "friendly claim");
        Ok(Settlement {
            reward: paid,
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
        let mut rps = self.rps;
        let distribute = self.funding.total_unlocked(now) - self.released + self.dust;
        if self.total_shares > 0 {
            rps += mul_div(distribute, Q64_ONE, self.total_shares).unwrap_or(0);
        }

        let lots = self.lots.get(user).expect("balance implies lots");
        let mut remaining = shares;
        let mut paid: u128 = 0;
        for lot in lots.iter().rev() {
            if remaining == 0 {
                break;
            }
            let take = lot.shares.min(remaining);
            let banked_part = if take == lot.shares {
                lot.banked
            } else {
                mul_div(lot.banked, take, lot.shares).unwrap_or(0)
            };
            let earned = banked_part + mul_div(take, rps - lot.tally, Q64_ONE).unwrap_or(0);
            let vested = Self::vested(self.vesting_period_secs, lot.staked_at, now);
            paid += mul_div(earned, vested, UNIT).unwrap_or(0);
            remaining -= take;
        }
        paid
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

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DAY: i64 = 86_400;

    fn user(n: u8) -> Address {
        Address::new([n; 32])
    }

    fn module(vesting_days: i64) -> FriendlyRewardModule {
        let token = TokenMetadata::new(Address::new([7; 32]), "Reward", "RWD", 18);
        FriendlyRewardModule::new(
            Address::new([5; 32]),
            token,
            (vesting_days * DAY) as u64,
        )
    }

    #[test]
    fn test_partial_vesting_forfeits_remainder() {
        let mut m = module(90);
        m.fund(1_000 * UNIT, 100 * DAY as u64, 0, 0).unwrap();
        m.stake(&user(1), 100 * UNIT, &[], 0).unwrap();

        // 50 of 90 vesting days elapsed: 5/9 of the 500 earned is paid
        let s = m.unstake(&user(1), 100 * UNIT, &[], 50 * DAY).unwrap();
        assert_eq!(s.reward, 277_777_777_777_777_777_500);
        assert_eq!(m.distributed(), s.reward);
        // the forfeit waits in dust, not burned
        assert_eq!(m.dust, 222_222_222_222_222_222_500);
    }

    #[test]
    fn test_forfeit_redistributes_to_remaining_stakers() {
        let mut m = module(90);
        m.fund(1_000 * UNIT, 100 * DAY as u64, 0, 0).unwrap();
        m.stake(&user(1), 100 * UNIT, &[], 0).unwrap();
        m.stake(&user(2), 100 * UNIT, &[], 0).unwrap();

        let a = m.unstake(&user(1), 100 * UNIT, &[], 50 * DAY).unwrap();
        assert_eq!(a.reward, 138_888_888_888_888_888_750);

        // B stays past full vesting and inherits A's forfeit
        let b = m.unstake(&user(2), 100 * UNIT, &[], 100 * DAY).unwrap();
        assert_eq!(b.reward, 861_111_111_111_111_111_247);
        assert!(b.reward > a.reward);
        assert_eq!(m.distributed(), 999_999_999_999_999_999_997);
        assert!(m.distributed() + m.dust <= m.total_funded());
    }

    #[test]
    fn test_full_vesting_pays_everything() {
        let mut m = module(90);
        m.fund(1_000 * UNIT, 100 * DAY as u64, 0, 0).unwrap();
        m.stake(&user(1), 100 * UNIT, &[], 0).unwrap();
        let s = m.unstake(&user(1), 100 * UNIT, &[], 100 * DAY).unwrap();
        assert_eq!(s.reward, 1_000 * UNIT);
        assert_eq!(s.gysr_spent, 0);
    }

    #[test]
    fn test_pre_stake_unlock_waits_in_dust() {
        let mut m = module(90);
        m.fund(1_000 * UNIT, 100 * DAY as u64, 0, 0).unwrap();
        // first staker arrives at day 50; the 500 already unlocked waits
        m.stake(&user(1), 100 * UNIT, &[], 50 * DAY).unwrap();
        assert_eq!(m.dust, 500 * UNIT);
        let s = m.unstake(&user(1), 100 * UNIT, &[], 140 * DAY).unwrap();
        assert_eq!(s.reward, 1_000 * UNIT);
    }

    #[test]
    fn test_claim_banks_unvested_without_clock_reset() {
        let mut m = module(90);
        m.fund(1_000 * UNIT, 100 * DAY as u64, 0, 0).unwrap();
        m.stake(&user(1), 100 * UNIT, &[], 0).unwrap();

        let early = m.claim(&user(1), 100 * UNIT, &[], 50 * DAY).unwrap();
        assert_eq!(early.reward, 277_777_777_777_777_777_500);
        assert_eq!(m.balance(&user(1)), 100 * UNIT);

        // at day 100 the banked remainder is fully vested and the
        // remaining unlock pays on top
        let late = m.unstake(&user(1), 100 * UNIT, &[], 100 * DAY).unwrap();
        assert_eq!(early.reward + late.reward, 1_000 * UNIT);
    }

    #[test]
    fn test_zero_vesting_period_pays_immediately() {
        let mut m = module(0);
        m.fund(1_000 * UNIT, 100 * DAY as u64, 0, 0).unwrap();
        m.stake(&user(1), 100 * UNIT, &[], 0).unwrap();
        let s = m.unstake(&user(1), 100 * UNIT, &[], 10 * DAY).unwrap();
        assert_eq!(s.reward, 100 * UNIT);
    }

    #[test]
    fn test_preview_matches_settlement() {
        let mut m = module(90);
        m.fund(1_000 * UNIT, 100 * DAY as u64, 0, 0).unwrap();
        m.stake(&user(1), 100 * UNIT, &[], 0).unwrap();
        m.stake(&user(2), 300 * UNIT, &[], 20 * DAY).unwrap();

        let previewed = m.preview(&user(1), 100 * UNIT, 60 * DAY);
        let settled = m.unstake(&user(1), 100 * UNIT, &[], 60 * DAY).unwrap();
        assert_eq!(previewed, settled.reward);
    }

    #[test]
    fn test_invalid_settlements_rejected() {
        let mut m = module(90);
        m.fund(1_000 * UNIT, 100 * DAY as u64, 0, 0).unwrap();
        m.stake(&user(1), 100, &[], 0).unwrap();
        assert_eq!(
            m.unstake(&user(1), 0, &[], DAY),
            Err(RewardError::Ledger(LedgerError::ZeroShares))
        );
        assert!(matches!(
            m.claim(&user(1), 101, &[], DAY),
            Err(RewardError::Ledger(LedgerError::InsufficientShares { .. }))
        ));
    }

    proptest! {
        /// Paid rewards plus pending dust never exceed the unlock curve.
        #[test]
        fn prop_vesting_conservation(ops in proptest::collection::vec(
            (0u8..3, 1u8..4, 1u128..500, 1i64..20),
            1..40,
        )) {
            let mut m = module(60);
            m.fund(10_000 * UNIT, 400 * DAY as u64, 0, 0).unwrap();
            let mut now = 0i64;
            for (op, who, amount, dt) in ops {
                now += dt * DAY;
                let u = user(who);
                let amount = amount * UNIT;
                match op {
                    0 => { m.stake(&u, amount, &[], now).unwrap(); }
                    1 => {
                        let bal = m.balance(&u);
                        if bal > 0 {
                            m.unstake(&u, amount.min(bal), &[], now).unwrap();
                        }
                    }
                    _ => {
                        let bal = m.balance(&u);
                        if bal > 0 {
                            m.claim(&u, amount.min(bal), &[], now).unwrap();
                        }
                    }
                }
                prop_assert!(m.distributed() <= m.total_unlocked(now));
                prop_assert!(m.total_unlocked(now) <= m.total_funded());
            }
        }
    }
}
