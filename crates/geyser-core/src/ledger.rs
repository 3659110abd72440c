//! Share ledger: balances and time-integrated share-seconds
//!
//! Per-module bookkeeping of user and global share balances plus the
//! accumulated share-seconds (share balance times elapsed time) that
//! reward distribution is weighted by.
//!
//! Every state-changing call first accrues pending share-seconds for the
//! global total using the time elapsed since the last touch, then applies
//! the balance delta. Per-user share-seconds are derived on demand from
//! the user's deposit lots, so the global accumulator is always at least
//! the sum over users.
//!
//! Deposits create ordered lots; withdrawals consume lots newest-first
//! (last-in-first-out), prorating a partial lot while keeping its
//! original timestamp. The lot structure is what lets a time-bonus
//! multiplier attach to each deposit increment without being recomputed
//! retroactively.

use crate::types::Address;
use geyser_math::{mul_div, UNIT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from share ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Zero-share deposits and withdrawals are rejected
    #[error("share amount must be non-zero")]
    ZeroShares,

    /// Withdrawal exceeds the user's share balance
    #[error("insufficient shares: requested {requested}, available {available}")]
    InsufficientShares { requested: u128, available: u128 },
}

/// A single deposit increment: shares plus the time they entered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeLot {
    pub shares: u128,
    pub staked_at: i64,
}

/// A lot (or lot fraction) consumed by a withdrawal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsumedLot {
    pub shares: u128,
    pub staked_at: i64,
    /// Raw share-seconds this portion had accumulated at withdrawal time
    pub raw_share_seconds: u128,
}

/// Share balances and share-seconds for one module
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShareLedger {
    lots: HashMap<Address, Vec<StakeLot>>,
    balances: HashMap<Address, u128>,
    total_shares: u128,
    total_share_seconds: u128,
    last_update: i64,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accrue global share-seconds up to `now`. A timestamp earlier than
    /// the last update is clamped: elapsed time is never negative.
    fn accrue(&mut self, now: i64) {
        if now > self.last_update {
            let dt = (now - self.last_update) as u128;
            self.total_share_seconds += self.total_shares * dt;
            self.last_update = now;
        }
    }

    fn elapsed(staked_at: i64, now: i64) -> u128 {
        (now - staked_at).max(0) as u128
    }

    /// Record a deposit of `shares` for `user` at `now`.
    pub fn deposit(&mut self, user: &Address, shares: u128, now: i64) -> Result<(), LedgerError> {
        if shares == 0 {
            return Err(LedgerError::ZeroShares);
        }
        self.accrue(now);
        // clamp to the ledger clock so no lot predates the accrued total
        let staked_at = self.last_update;
        self.lots.entry(*user).or_default().push(StakeLot {
            shares,
            staked_at,
        });
        *self.balances.entry(*user).or_default() += shares;
        self.total_shares += shares;
        Ok(())
    }

    /// Withdraw `shares` for `user` at `now`, consuming lots newest-first.
    ///
    /// Returns the consumed lots (or fractions) with their accumulated
    /// raw share-seconds; those share-seconds leave the global
    /// accumulator with them.
    pub fn withdraw(
        &mut self,
        user: &Address,
        shares: u128,
        now: i64,
    ) -> Result<Vec<ConsumedLot>, LedgerError> {
        if shares == 0 {
            return Err(LedgerError::ZeroShares);
        }
        let available = self.balance(user);
        if shares > available {
            return Err(LedgerError::InsufficientShares {
                requested: shares,
                available,
            });
        }
        self.accrue(now);

        let lots = self.lots.get_mut(user).expect("balance implies lots");
        let mut consumed = Vec::new();
        let mut remaining = shares;
        let mut burned_seconds: u128 = 0;
        while remaining > 0 {
            let lot = lots.last_mut().expect("balance covers remaining shares");
            let take = lot.shares.min(remaining);
            let raw = take * Self::elapsed(lot.staked_at, now);
            consumed.push(ConsumedLot {
                shares: take,
                staked_at: lot.staked_at,
                raw_share_seconds: raw,
            });
            burned_seconds += raw;
            remaining -= take;
            if take == lot.shares {
                lots.pop();
            } else {
                lot.shares -= take;
            }
        }

        *self.balances.get_mut(user).expect("balance exists") -= shares;
        self.total_shares -= shares;
        self.total_share_seconds = self.total_share_seconds.saturating_sub(burned_seconds);
        Ok(consumed)
    }

    /// Raw and bonus-weighted share-seconds over the lots a withdrawal of
    /// `up_to_shares` would consume (newest-first), without mutating.
    ///
    /// `bonus` maps a lot's age in seconds to its 1e18-scaled time-bonus
    /// multiplier; the ledger itself is bonus-policy agnostic.
    pub fn share_seconds<F>(
        &self,
        user: &Address,
        up_to_shares: u128,
        now: i64,
        bonus: F,
    ) -> Result<(u128, u128), LedgerError>
    where
        F: Fn(u64) -> u128,
    {
        if up_to_shares == 0 {
            return Err(LedgerError::ZeroShares);
        }
        let available = self.balance(user);
        if up_to_shares > available {
            return Err(LedgerError::InsufficientShares {
                requested: up_to_shares,
                available,
            });
        }

        let lots = self.lots.get(user).expect("balance implies lots");
        let mut remaining = up_to_shares;
        let mut raw: u128 = 0;
        let mut weighted: u128 = 0;
        for lot in lots.iter().rev() {
            if remaining == 0 {
                break;
            }
            let take = lot.shares.min(remaining);
            let elapsed = Self::elapsed(lot.staked_at, now);
            let lot_raw = take * elapsed;
            let multiplier = bonus(elapsed as u64);
            raw += lot_raw;
            // weighted term can exceed 128 bits before the scale-down
            weighted += mul_div(lot_raw, multiplier, UNIT).unwrap_or(u128::MAX);
            remaining -= take;
        }
        Ok((raw, weighted))
    }

    /// Total raw share-seconds currently attributable to `user`.
    pub fn user_share_seconds(&self, user: &Address, now: i64) -> u128 {
        self.lots
            .get(user)
            .map(|lots| {
                lots.iter()
                    .map(|lot| lot.shares * Self::elapsed(lot.staked_at, now))
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Global share-seconds as of `now` (read-only projection).
    pub fn total_share_seconds(&self, now: i64) -> u128 {
        let dt = (now - self.last_update).max(0) as u128;
        self.total_share_seconds + self.total_shares * dt
    }

    pub fn balance(&self, user: &Address) -> u128 {
        self.balances.get(user).copied().unwrap_or(0)
    }

    pub fn total_shares(&self) -> u128 {
        self.total_shares
    }

    /// The user's deposit lots, oldest first.
    pub fn lots(&self, user: &Address) -> &[StakeLot] {
        self.lots.get(user).map(Vec::as_slice).unwrap_or(&[])
    }
}
