//! Pool: one staking converter bound to one reward distributor
//!
//! The pool is the only caller of its modules' mutating entry points. It
//! routes stake/unstake/claim traffic between them, converting token
//! amounts to shares on the way in, and applies the protocol fee to any
//! utility-token spend a settlement consumed.
//!
//! Call ordering keeps an error from leaving the two modules
//! disagreeing: the amount conversion and every staking-side rejection
//! run read-only first, the reward module settles next, and the staking
//! position mutates last. By the time anything mutates, both modules
//! have accepted the call.

use crate::error::Result;
use chrono::Utc;
use geyser_core::{Address, RewardModule, Settlement, StakingModule, TokenMetadata, UNIT};
use geyser_math::mul_div;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Protocol fee ceiling: 20% of spent GYSR
pub const MAX_FEE_RATE: u128 = UNIT / 5;

/// Pool-level fee policy
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Fee on settled GYSR spend, 1e18-scaled, clamped to [`MAX_FEE_RATE`]
    pub gysr_fee_rate: u128,
    /// Fee recipient
    pub treasury: Address,
}

impl PoolConfig {
    pub fn new(gysr_fee_rate: u128, treasury: Address) -> Self {
        if gysr_fee_rate > MAX_FEE_RATE {
            warn!(requested = gysr_fee_rate, clamped = MAX_FEE_RATE, "fee rate clamped");
        }
        Self {
            gysr_fee_rate: gysr_fee_rate.min(MAX_FEE_RATE),
            treasury,
        }
    }
}

/// A staking converter and reward distributor operating as one product
pub struct Pool {
    address: Address,
    staking: Box<dyn StakingModule>,
    reward: Box<dyn RewardModule>,
    config: PoolConfig,
    /// Spent GYSR retained by the pool after fees
    gysr_vaulted: u128,
    /// Spent GYSR owed to the treasury
    gysr_fees: u128,
}

impl Pool {
    pub fn new(
        address: Address,
        staking: Box<dyn StakingModule>,
        reward: Box<dyn RewardModule>,
        config: PoolConfig,
    ) -> Self {
        Self {
            address,
            staking,
            reward,
            config,
            gysr_vaulted: 0,
            gysr_fees: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn staking(&self) -> &dyn StakingModule {
        self.staking.as_ref()
    }

    pub fn reward(&self) -> &dyn RewardModule {
        self.reward.as_ref()
    }

    pub fn staking_tokens(&self) -> Vec<TokenMetadata> {
        self.staking.tokens()
    }

    pub fn reward_tokens(&self) -> Vec<TokenMetadata> {
        self.reward.tokens()
    }

    pub fn gysr_vaulted(&self) -> u128 {
        self.gysr_vaulted
    }

    pub fn gysr_fees(&self) -> u128 {
        self.gysr_fees
    }

    /// Split a settlement's spend between vault and treasury. The bonus
    /// was computed on the full spend; only the proceeds are divided.
    fn apply_fee(&mut self, settlement: &Settlement) {
        if settlement.gysr_spent == 0 {
            return;
        }
        let fee = mul_div(settlement.gysr_spent, self.config.gysr_fee_rate, UNIT).unwrap_or(0);
        self.gysr_fees += fee;
        self.gysr_vaulted += settlement.gysr_spent - fee;
        debug!(pool = %self.address, spent = settlement.gysr_spent, fee, "gysr spend settled");
    }

    /// Deposit `amount` through the staking module and register the
    /// minted shares with the reward module.
    pub fn stake(
        &mut self,
        user: &Address,
        amount: u128,
        staking_data: &[u8],
        reward_data: &[u8],
        now: i64,
    ) -> Result<u128> {
        let minted = self.staking.stake(user, amount, staking_data, now)?;
        self.reward.stake(user, minted, reward_data, now)?;
        info!(pool = %self.address, user = %user, amount, minted, "stake");
        Ok(minted)
    }

    /// Withdraw `amount` (zero means the full position), settling the
    /// backing shares' reward first.
    pub fn unstake(
        &mut self,
        user: &Address,
        amount: u128,
        staking_data: &[u8],
        reward_data: &[u8],
        now: i64,
    ) -> Result<Settlement> {
        let amount = if amount == 0 {
            self.staking.balance(user)
        } else {
            amount
        };
        let shares = self.staking.amount_to_shares(user, amount, now)?;
        self.staking.validate_unstake(user, amount, staking_data, now)?;
        let settlement = self.reward.unstake(user, shares, reward_data, now)?;
        self.staking.unstake(user, amount, staking_data, now)?;
        self.apply_fee(&settlement);
        info!(
            pool = %self.address,
            user = %user,
            amount,
            reward = settlement.reward,
            "unstake"
        );
        Ok(settlement)
    }

    /// Realize reward on `amount` worth of position without withdrawing.
    pub fn claim(
        &mut self,
        user: &Address,
        amount: u128,
        reward_data: &[u8],
        now: i64,
    ) -> Result<Settlement> {
        let amount = if amount == 0 {
            self.staking.balance(user)
        } else {
            amount
        };
        let shares = self.staking.amount_to_shares(user, amount, now)?;
        let settlement = self.reward.claim(user, shares, reward_data, now)?;
        self.apply_fee(&settlement);
        info!(
            pool = %self.address,
            user = %user,
            amount,
            reward = settlement.reward,
            "claim"
        );
        Ok(settlement)
    }

    /// Add a reward funding schedule.
    pub fn fund(&mut self, amount: u128, duration_secs: u64, start: i64, now: i64) -> Result<()> {
        self.reward.fund(amount, duration_secs, start, now)?;
        info!(pool = %self.address, amount, duration_secs, start, "funded");
        Ok(())
    }

    /// Wall-clock convenience wrappers for callers without their own
    /// notion of time. Everything above takes explicit timestamps.
    pub fn stake_now(
        &mut self,
        user: &Address,
        amount: u128,
        staking_data: &[u8],
        reward_data: &[u8],
    ) -> Result<u128> {
        self.stake(user, amount, staking_data, reward_data, Utc::now().timestamp())
    }

    pub fn unstake_now(
        &mut self,
        user: &Address,
        amount: u128,
        staking_data: &[u8],
        reward_data: &[u8],
    ) -> Result<Settlement> {
        self.unstake(user, amount, staking_data, reward_data, Utc::now().timestamp())
    }

    pub fn claim_now(
        &mut self,
        user: &Address,
        amount: u128,
        reward_data: &[u8],
    ) -> Result<Settlement> {
        self.claim(user, amount, reward_data, Utc::now().timestamp())
    }
}
