//! Funding schedules: time-gated release of funded reward
//!
//! A schedule unlocks a fixed amount linearly over a duration, optionally
//! starting in the future. A module's funding set holds any number of
//! concurrent schedules; the total unlocked curve is monotone
//! non-decreasing and never exceeds the total funded amount.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from funding operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("funding amount must be non-zero")]
    ZeroAmount,

    #[error("funding duration must be non-zero")]
    ZeroDuration,

    /// Schedules may start now or in the future, never in the past
    #[error("funding start {start} is before current time {now}")]
    StartInPast { start: i64, now: i64 },
}

/// A single funded amount unlocking linearly over a duration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingSchedule {
    /// Total reward amount, 1e18-scaled
    pub amount: u128,
    /// Unlock start time (Unix seconds)
    pub start: i64,
    /// Unlock duration in seconds
    pub duration_secs: u64,
}

impl FundingSchedule {
    /// Amount unlocked as of `now`: zero before start, linear during the
    /// duration, the full amount after.
    pub fn unlocked(&self, now: i64) -> u128 {
        if now <= self.start {
            return 0;
        }
        let elapsed = (now - self.start) as u128;
        let duration = self.duration_secs as u128;
        if elapsed >= duration {
            self.amount
        } else {
            self.amount * elapsed / duration
        }
    }

    pub fn is_exhausted(&self, now: i64) -> bool {
        self.unlocked(now) == self.amount
    }
}

/// Append-only collection of funding schedules for one reward module
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FundingSet {
    schedules: Vec<FundingSchedule>,
    total_funded: u128,
}

impl FundingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schedule unlocking `amount` over `duration_secs` starting at
    /// `start` (which must not be in the past relative to `now`).
    pub fn fund(
        &mut self,
        amount: u128,
        duration_secs: u64,
        start: i64,
        now: i64,
    ) -> Result<(), ScheduleError> {
        if amount == 0 {
            return Err(ScheduleError::ZeroAmount);
        }
        if duration_secs == 0 {
            return Err(ScheduleError::ZeroDuration);
        }
        if start < now {
            return Err(ScheduleError::StartInPast { start, now });
        }
        self.schedules.push(FundingSchedule {
            amount,
            start,
            duration_secs,
        });
        self.total_funded += amount;
        Ok(())
    }

    /// Total amount unlocked across all schedules as of `now`.
    pub fn total_unlocked(&self, now: i64) -> u128 {
        self.schedules.iter().map(|s| s.unlocked(now)).sum()
    }

    /// Total amount ever funded.
    pub fn total_funded(&self) -> u128 {
        self.total_funded
    }

    /// Amount still locked as of `now`.
    pub fn total_locked(&self, now: i64) -> u128 {
        self.total_funded - self.total_unlocked(now)
    }

    pub fn schedules(&self) -> &[FundingSchedule] {
        &self.schedules
    }
}
