//! Competitive reward distributor
//!
//! Share-seconds fairness with both multipliers. A settlement of `s`
//! shares pays
//!
//! ```text
//! reward = pool * weighted / (totalShareSeconds - raw + weighted)
//! ```
//!
//! where `raw` and `weighted` are the settled lots' share-seconds before
//! and after the per-lot time bonus, and `pool` is the unlocked amount
//! not yet distributed. An elected utility-token spend amplifies
//! `weighted` by the GYSR bonus. With no bonuses the formula reduces to
//! the plain proportional share; with them, the extra weight competes
//! against everyone else's unweighted share-seconds, which is what keeps
//! the payout inside the pool.
//!
//! Claiming settles like an unstake and immediately re-deposits the
//! shares, so the time bonus ramp restarts from the claim.

use super::{GysrSpend, RewardError, RewardModule, Settlement};
use crate::ledger::ShareLedger;
use crate::schedule::FundingSet;
use crate::types::{Address, TokenMetadata};
use geyser_math::{gysr_bonus, mul_div, time_bonus, BonusParameters, UNIT};
use serde::{Deserialize, Serialize};
use std::any::Any;
use tracing::{debug, warn};

/// Reward distributor with time-bonus and GYSR-bonus weighting
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompetitiveRewardModule {
    factory: Address,
    token: TokenMetadata,
    bonus: BonusParameters,
    ledger: ShareLedger,
    funding: FundingSet,
    distributed: u128,
}

impl CompetitiveRewardModule {
    pub fn new(factory: Address, token: TokenMetadata, bonus: BonusParameters) -> Self {
        Self {
            factory,
            token,
            bonus,
            ledger: ShareLedger::new(),
            funding: FundingSet::new(),
            distributed: 0,
        }
    }

    pub fn bonus_parameters(&self) -> &BonusParameters {
        &self.bonus
    }

    pub fn ledger(&self) -> &ShareLedger {
        &self.ledger
    }

    fn pool(&self, now: i64) -> u128 {
        self.funding.total_unlocked(now) - self.distributed
    }

    /// Settle `shares` for `user`: burn their lots, weight the burned
    /// share-seconds, and pay the proportional slice of the pool.
    fn settle(
        &mut self,
        user: &Address,
        shares: u128,
        spend: u128,
        now: i64,
    ) -> Result<Settlement, RewardError> {
        // bonus inputs are captured before the withdrawal mutates them
        let user_shares = self.ledger.balance(user);
        let total_shares = self.ledger.total_shares();
        let total_seconds = self.ledger.total_share_seconds(now);
        let usage = self.usage(now);

        let consumed = self.ledger.withdraw(user, shares, now)?;
        let mut raw: u128 = 0;
        let mut weighted: u128 = 0;
        for lot in &consumed {
            let elapsed = (now - lot.staked_at).max(0) as u64;
            let multiplier = time_bonus(&self.bonus, elapsed);
            raw += lot.raw_share_seconds;
            weighted += mul_div(lot.raw_share_seconds, multiplier, UNIT).unwrap_or(0);
        }

        let mut gysr_spent = 0;
        if spend > 0 {
            let multiplier = gysr_bonus(spend, user_shares, total_shares, usage);
            if multiplier == 0 {
                // zero-stake sentinel: the bonus has no basis, so the
                // spend is declined rather than zeroing the reward
                warn!(user = %user, spend, "spend declined, no stake basis for bonus");
            } else {
                // a spend is consumed only when its amplification lands
                match mul_div(weighted, multiplier, UNIT) {
                    Ok(w) => {
                        weighted = w;
                        gysr_spent = spend;
                    }
                    Err(_) => {
                        warn!(user = %user, spend, "spend declined, amplified weight unrepresentable");
                    }
                }
            }
        }

        // the settled raw share-seconds leave the denominator; weighted
        // never exceeds it, so the payout stays inside the pool
        let denom = total_seconds.saturating_sub(raw) + weighted;
        let reward = if denom == 0 {
            0
        } else {
            mul_div(self.pool(now), weighted, denom).unwrap_or(0)
        };
        self.distributed += reward;
        debug!(user = %user, shares, reward, gysr_spent, "competitive settlement");
        Ok(Settlement { reward, gysr_spent })
    }
}

impl RewardModule for CompetitiveRewardModule {
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
        self.ledger.deposit(user, shares, now)?;
        Ok(())
    }

    fn unstake(
        &mut self,
        user: &Address,
        shares: u128,
        data: &[u8],
        now: i64,
    ) -> Result<Settlement, RewardError> {
        let spend = GysrSpend::decode("competitive unstake", data)?.amount;
        self.settle(user, shares, spend, now)
    }

    /// Settle and immediately restake; the time bonus restarts
    fn claim(
        &mut self,
        user: &Address,
        shares: u128,
        data: &[u8],
        now: i64,
    ) -> Result<Settlement, RewardError> {
        let spend = GysrSpend::decode("competitive claim", data)?.amount;
        let settlement = self.settle(user, shares, spend, now)?;
        self.ledger.deposit(user, shares, now)?;
        Ok(settlement)
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
        let Ok((raw, weighted)) =
            self.ledger
                .share_seconds(user, shares, now, |e| time_bonus(&self.bonus, e))
        else {
            return 0;
        };
        let denom = self.ledger.total_share_seconds(now).saturating_sub(raw) + weighted;
        if denom == 0 {
            return 0;
        }
        mul_div(self.pool(now), weighted, denom).unwrap_or(0)
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
    use crate::ledger::LedgerError;
    use proptest::prelude::*;

    const DAY: i64 = 86_400;

    fn user(n: u8) -> Address {
        Address::new([n; 32])
    }

    fn spend(amount: u128) -> Vec<u8> {
        bincode::serialize(&GysrSpend { amount }).unwrap()
    }

    /// 0.5x at stake time rising to 2.0x over 90 days
    fn ramp() -> BonusParameters {
        BonusParameters::new(UNIT / 2, 2 * UNIT, 90 * DAY as u64).unwrap()
    }

    fn module(bonus: BonusParameters) -> CompetitiveRewardModule {
        let token = TokenMetadata::new(Address::new([7; 32]), "Reward", "RWD", 18);
        CompetitiveRewardModule::new(Address::new([4; 32]), token, bonus)
    }

    #[test]
    fn test_time_weighted_distribution() {
        let mut m = module(ramp());
        m.fund(1_000 * UNIT, 200 * DAY as u64, 0, 0).unwrap();

        m.stake(&user(1), 100, &[], 10 * DAY).unwrap();
        m.stake(&user(2), 100, &[], 40 * DAY).unwrap();
        m.stake(&user(1), 100, &[], 70 * DAY).unwrap();

        assert_eq!(m.total_unlocked(100 * DAY), 500 * UNIT);

        // the 90-day lot carries the full 2x bonus, the 30-day lot 1x,
        // so A takes 7/9 of the unlocked pool
        let a = m.unstake(&user(1), 200, &[], 100 * DAY).unwrap();
        assert_eq!(a.reward, 388_888_888_888_888_888_888);
        assert_eq!(a.gysr_spent, 0);

        // B inherits exactly the remainder
        let b = m.unstake(&user(2), 100, &[], 100 * DAY).unwrap();
        assert_eq!(b.reward, 111_111_111_111_111_111_112);
        assert_eq!(m.distributed(), 500 * UNIT);
        assert!(m.distributed() <= m.total_unlocked(100 * DAY));
        assert!(m.total_unlocked(100 * DAY) <= m.total_funded());
    }

    #[test]
    fn test_gysr_spend_amplifies_reward() {
        let setup = || {
            let mut m = module(ramp());
            m.fund(1_000 * UNIT, 200 * DAY as u64, 0, 0).unwrap();
            m.stake(&user(1), 100, &[], 0).unwrap();
            m.stake(&user(2), 100, &[], 0).unwrap();
            m
        };

        let mut plain = setup();
        let without = plain.unstake(&user(1), 100, &[], 90 * DAY).unwrap();
        assert_eq!(without.reward, 300 * UNIT);
        assert_eq!(without.gysr_spent, 0);

        // 1 GYSR against a half-pool stake: multiplier 1 + log10(3)
        let mut boosted = setup();
        let with = boosted.unstake(&user(1), 100, &spend(UNIT), 90 * DAY).unwrap();
        assert_eq!(with.reward, 336_198_178_544_803_600_998);
        assert_eq!(with.gysr_spent, UNIT);
        assert!(with.reward > without.reward);
        assert!(with.reward < boosted.total_unlocked(90 * DAY));
        assert_eq!(boosted.usage(90 * DAY), 747_107_063_432_896_891);
    }

    #[test]
    fn test_claim_restarts_time_bonus() {
        let mut m = module(ramp());
        m.fund(1_000 * UNIT, 200 * DAY as u64, 0, 0).unwrap();
        m.stake(&user(1), 100, &[], 0).unwrap();

        // sole staker claims everything unlocked so far
        let s = m.claim(&user(1), 100, &[], 100 * DAY).unwrap();
        assert_eq!(s.reward, 500 * UNIT);
        assert_eq!(m.ledger().balance(&user(1)), 100);
        assert_eq!(m.ledger().lots(&user(1))[0].staked_at, 100 * DAY);
    }

    #[test]
    fn test_invalid_settlements_rejected() {
        let mut m = module(ramp());
        m.fund(1_000 * UNIT, 200 * DAY as u64, 0, 0).unwrap();
        m.stake(&user(1), 100, &[], 0).unwrap();

        assert_eq!(
            m.unstake(&user(1), 0, &[], DAY),
            Err(RewardError::Ledger(LedgerError::ZeroShares))
        );
        assert!(matches!(
            m.unstake(&user(1), 101, &[], DAY),
            Err(RewardError::Ledger(LedgerError::InsufficientShares { .. }))
        ));
        assert!(matches!(
            m.unstake(&user(1), 50, b"garbage", DAY),
            Err(RewardError::MalformedData { .. })
        ));
        // failed settlements distributed nothing
        assert_eq!(m.distributed(), 0);
    }

    #[test]
    fn test_preview_matches_settlement() {
        let mut m = module(ramp());
        m.fund(1_000 * UNIT, 200 * DAY as u64, 0, 0).unwrap();
        m.stake(&user(1), 100, &[], 0).unwrap();
        m.stake(&user(2), 300, &[], 30 * DAY).unwrap();

        let previewed = m.preview(&user(1), 100, 100 * DAY);
        let settled = m.unstake(&user(1), 100, &[], 100 * DAY).unwrap();
        assert_eq!(previewed, settled.reward);
        // unknown user previews zero
        assert_eq!(m.preview(&user(9), 1, 100 * DAY), 0);
    }

    #[test]
    fn test_nothing_unlocked_pays_nothing() {
        let mut m = module(ramp());
        m.fund(1_000 * UNIT, 200 * DAY as u64, 100 * DAY, 0).unwrap();
        m.stake(&user(1), 100, &[], 0).unwrap();
        let s = m.unstake(&user(1), 100, &[], 50 * DAY).unwrap();
        assert_eq!(s.reward, 0);
        assert_eq!(m.usage(50 * DAY), 0);
    }

    proptest! {
        /// Rewards never outrun the unlock curve, which never outruns
        /// the funded amount, under arbitrary event sequences.
        #[test]
        fn prop_reward_conservation(ops in proptest::collection::vec(
            (0u8..3, 1u8..4, 1u128..500, 1i64..20),
            1..40,
        )) {
            let mut m = module(ramp());
            m.fund(10_000 * UNIT, 400 * DAY as u64, 0, 0).unwrap();
            let mut now = 0i64;
            for (op, who, amount, dt) in ops {
                now += dt * DAY;
                let u = user(who);
                match op {
                    0 => { m.stake(&u, amount, &[], now).unwrap(); }
                    1 => {
                        let bal = m.ledger().balance(&u);
                        if bal > 0 {
                            m.unstake(&u, amount.min(bal), &spend(amount), now).unwrap();
                        }
                    }
                    _ => {
                        let bal = m.ledger().balance(&u);
                        if bal > 0 {
                            m.claim(&u, amount.min(bal), &[], now).unwrap();
                        }
                    }
                }
                prop_assert!(m.distributed() <= m.total_unlocked(now));
                prop_assert!(m.total_unlocked(now) <= m.total_funded());
                prop_assert!(m.usage(now) <= UNIT);
            }
        }
    }
}
