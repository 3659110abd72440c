//! Reward distributors: funded token supply out to share holders
//!
//! Each variant streams a funded reward supply to stakers under its own
//! fairness rule. All variants share the funding-schedule layer and the
//! conservation bound: rewards paid never exceed the unlocked amount,
//! which never exceeds the funded amount.
//!
//! As with staking, the variants sit behind the [`RewardModule`]
//! capability trait and expose their concrete type through [`as_any`]
//! for info-library dispatch.
//!
//! [`as_any`]: RewardModule::as_any

pub mod competitive;
pub mod friendly;
pub mod linear;

pub use competitive::CompetitiveRewardModule;
pub use friendly::FriendlyRewardModule;
pub use linear::LinearRewardModule;

use crate::ledger::LedgerError;
use crate::schedule::ScheduleError;
use crate::types::{Address, TokenMetadata};
use serde::{Deserialize, Serialize};
use std::any::Any;
use thiserror::Error;

/// Errors from reward module operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// Variant-specific parameter blob failed to decode
    #[error("malformed {variant} data: {reason}")]
    MalformedData {
        variant: &'static str,
        reason: String,
    },
}

/// Outcome of an unstake or claim settlement
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Settlement {
    /// Reward amount paid out, 1e18-scaled
    pub reward: u128,
    /// Utility-token spend consumed by the bonus, zero when none applied
    pub gysr_spent: u128,
}

impl Settlement {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Parameter blob electing a utility-token spend on settlement
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct GysrSpend {
    pub amount: u128,
}

impl GysrSpend {
    /// Decode an optional spend election; an empty blob means no spend.
    pub fn decode(variant: &'static str, data: &[u8]) -> Result<Self, RewardError> {
        if data.is_empty() {
            return Ok(Self::default());
        }
        bincode::deserialize(data).map_err(|e| RewardError::MalformedData {
            variant,
            reason: e.to_string(),
        })
    }
}

/// Capability interface every reward distributor implements.
///
/// Share amounts arrive from the pool's staking module; `data` is an
/// opaque, variant-specific parameter blob. All calls take an explicit
/// timestamp.
pub trait RewardModule: Send {
    /// Originating factory address; the module's type identifier
    fn factory(&self) -> Address;

    /// Metadata for the distributed reward token
    fn tokens(&self) -> Vec<TokenMetadata>;

    /// Register newly staked shares for `user`
    fn stake(
        &mut self,
        user: &Address,
        shares: u128,
        data: &[u8],
        now: i64,
    ) -> Result<(), RewardError>;

    /// Settle `shares` out of `user`'s position, paying earned reward
    fn unstake(
        &mut self,
        user: &Address,
        shares: u128,
        data: &[u8],
        now: i64,
    ) -> Result<Settlement, RewardError>;

    /// Realize earned reward on `shares` while leaving them staked
    fn claim(
        &mut self,
        user: &Address,
        shares: u128,
        data: &[u8],
        now: i64,
    ) -> Result<Settlement, RewardError>;

    /// Add a funding schedule releasing `amount` over `duration_secs`
    fn fund(
        &mut self,
        amount: u128,
        duration_secs: u64,
        start: i64,
        now: i64,
    ) -> Result<(), RewardError>;

    /// Read-only estimate of the reward a settlement of `shares` would
    /// pay right now, without any spend election
    fn preview(&self, user: &Address, shares: u128, now: i64) -> u128;

    /// Fraction of unlocked reward already distributed, 1e18-scaled
    fn usage(&self, now: i64) -> u128;

    /// Total reward distributed so far
    fn distributed(&self) -> u128;

    /// Total reward unlocked as of `now`
    fn total_unlocked(&self, now: i64) -> u128;

    /// Total reward ever funded
    fn total_funded(&self) -> u128;

    /// Concrete-type access for info-library dispatch
    fn as_any(&self) -> &dyn Any;
}
