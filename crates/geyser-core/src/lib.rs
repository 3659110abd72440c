//! # Geyser Core - Staking & Reward Accounting
//!
//! The accounting engine of the Geyser staking protocol: deposits are
//! converted into an internal share unit by a staking module, while a
//! reward module streams a funded token supply to share holders in
//! proportion to time-weighted participation.
//!
//! ## Components
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `ledger` | Share balances and lazily-accrued share-seconds, per user and global |
//! | `schedule` | Funding schedules: time-gated release curves for funded reward |
//! | `staking` | Share converters: fungible, non-fungible, rate-assignment |
//! | `rewards` | Distributors: competitive, friendly, linear |
//!
//! ## Accounting model
//!
//! Share-seconds (share balance integrated over time) are the fairness
//! currency. Every state-changing call accrues pending share-seconds
//! before applying its balance delta, so cost scales with the number of
//! events rather than wall-clock time. Timestamps are explicit `i64`
//! Unix seconds on every operation; the core never reads ambient time.

pub mod ledger;
pub mod rewards;
pub mod schedule;
pub mod staking;
pub mod types;

pub use ledger::{ConsumedLot, LedgerError, ShareLedger, StakeLot};
pub use rewards::{RewardError, RewardModule, Settlement};
pub use schedule::{FundingSchedule, FundingSet, ScheduleError};
pub use staking::{StakingError, StakingModule};
pub use types::{Address, TokenMetadata};

/// Share and token scale constants
pub mod constants {
    /// 1e18 decimal fixed-point unit, re-exported from the math layer
    pub use geyser_math::UNIT;

    /// Shares minted per token unit by a fresh fungible staking module
    pub const INITIAL_SHARES_PER_TOKEN: u128 = 1_000_000;

    /// Fixed share weight of one staked non-fungible identifier
    pub const SHARES_PER_NFT: u128 = UNIT;

    /// Shares-per-token constant reported by rate-assignment staking:
    /// 1e6 scaled twice, reflecting the two-stage rate-times-time
    /// fixed-point representation
    pub const ASSIGNMENT_SHARES_PER_TOKEN: u128 = INITIAL_SHARES_PER_TOKEN * UNIT;

    /// Seconds per day, the rate-assignment accrual denominator
    pub const SECONDS_PER_DAY: u64 = 86_400;
}

pub use constants::*;
