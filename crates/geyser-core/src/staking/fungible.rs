//! Fungible (ERC20-style) staking converter
//!
//! Shares are minted at a fixed 1e6-per-token-unit ratio while the module
//! is empty. Once shares exist the ratio is recomputed from the actual
//! holdings, so a rebasing deposited asset drifts the ratio rather than
//! breaking proportionality: `shares_per_token = total_shares / held`.

use super::{StakingError, StakingModule};
use crate::constants::{INITIAL_SHARES_PER_TOKEN, UNIT};
use crate::types::{Address, TokenMetadata};
use geyser_math::mul_div;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use tracing::debug;

/// Staking converter for a fungible deposited asset
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FungibleStakingModule {
    factory: Address,
    token: TokenMetadata,
    /// Tokens currently held by the module (tracked; see [`sync`])
    ///
    /// [`sync`]: FungibleStakingModule::sync
    held: u128,
    total_shares: u128,
    shares: HashMap<Address, u128>,
}

impl FungibleStakingModule {
    pub fn new(factory: Address, token: TokenMetadata) -> Self {
        Self {
            factory,
            token,
            held: 0,
            total_shares: 0,
            shares: HashMap::new(),
        }
    }

    /// Reconcile the recorded holdings with the asset's actual balance.
    ///
    /// A rebasing token changes the module's balance without a deposit or
    /// withdrawal; the next conversion then uses the drifted ratio.
    pub fn sync(&mut self, held_balance: u128) {
        if held_balance != self.held {
            debug!(
                token = %self.token.symbol,
                recorded = self.held,
                actual = held_balance,
                "fungible holdings rebased"
            );
            self.held = held_balance;
        }
    }

    fn mint_ratio(&self, amount: u128) -> Result<u128, StakingError> {
        if self.total_shares == 0 || self.held == 0 {
            amount
                .checked_mul(INITIAL_SHARES_PER_TOKEN)
                .ok_or(StakingError::ConversionOverflow)
        } else {
            mul_div(amount, self.total_shares, self.held)
                .map_err(|_| StakingError::ConversionOverflow)
        }
    }
}

impl StakingModule for FungibleStakingModule {
    fn factory(&self) -> Address {
        self.factory
    }

    fn tokens(&self) -> Vec<TokenMetadata> {
        vec![self.token.clone()]
    }

    fn balance(&self, user: &Address) -> u128 {
        let shares = self.shares.get(user).copied().unwrap_or(0);
        if shares == 0 || self.total_shares == 0 {
            return 0;
        }
        mul_div(shares, self.held, self.total_shares).unwrap_or(0)
    }

    fn shares(&self, user: &Address, _now: i64) -> u128 {
        self.shares.get(user).copied().unwrap_or(0)
    }

    fn total_shares(&self, _now: i64) -> u128 {
        self.total_shares
    }

    fn shares_per_token(&self, _now: i64) -> u128 {
        if self.total_shares == 0 || self.held == 0 {
            INITIAL_SHARES_PER_TOKEN * UNIT
        } else {
            mul_div(self.total_shares, UNIT, self.held).unwrap_or(0)
        }
    }

    fn amount_to_shares(
        &self,
        user: &Address,
        amount: u128,
        _now: i64,
    ) -> Result<u128, StakingError> {
        let user_shares = self.shares.get(user).copied().unwrap_or(0);
        if amount == 0 {
            return Ok(user_shares);
        }
        let available = self.balance(user);
        if amount > available {
            return Err(StakingError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        Ok(self.mint_ratio(amount)?.min(user_shares))
    }

    fn validate_unstake(
        &self,
        user: &Address,
        amount: u128,
        _data: &[u8],
        _now: i64,
    ) -> Result<(), StakingError> {
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let available = self.balance(user);
        if amount > available {
            return Err(StakingError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        Ok(())
    }

    fn stake(
        &mut self,
        user: &Address,
        amount: u128,
        _data: &[u8],
        _now: i64,
    ) -> Result<u128, StakingError> {
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let minted = self.mint_ratio(amount)?;
        // a drifted ratio can round a dust deposit down to nothing
        if minted == 0 {
            return Err(StakingError::ZeroAmount);
        }
        self.held += amount;
        self.total_shares += minted;
        *self.shares.entry(*user).or_default() += minted;
        debug!(user = %user, amount, minted, "fungible stake");
        Ok(minted)
    }

    fn unstake(
        &mut self,
        user: &Address,
        amount: u128,
        _data: &[u8],
        _now: i64,
    ) -> Result<u128, StakingError> {
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let available = self.balance(user);
        if amount > available {
            return Err(StakingError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        let user_shares = self.shares.get_mut(user).expect("balance implies shares");
        // truncation burns at most the user's own shares
        let burned = mul_div(amount, self.total_shares, self.held)
            .map_err(|_| StakingError::ConversionOverflow)?
            .min(*user_shares);
        *user_shares -= burned;
        self.total_shares -= burned;
        self.held -= amount;
        debug!(user = %user, amount, burned, "fungible unstake");
        Ok(burned)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> FungibleStakingModule {
        let token = TokenMetadata::new(Address::new([9; 32]), "Stake Token", "STK", 18);
        FungibleStakingModule::new(Address::new([1; 32]), token)
    }

    fn user(n: u8) -> Address {
        Address::new([n; 32])
    }

    #[test]
    fn test_first_stake_uses_initial_ratio() {
        let mut m = module();
        let minted = m.stake(&user(1), 100 * UNIT, &[], 0).unwrap();
        assert_eq!(minted, 100 * UNIT * INITIAL_SHARES_PER_TOKEN);
        assert_eq!(m.shares_per_token(0), INITIAL_SHARES_PER_TOKEN * UNIT);
        assert_eq!(m.balance(&user(1)), 100 * UNIT);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut m = module();
        assert_eq!(m.stake(&user(1), 0, &[], 0), Err(StakingError::ZeroAmount));
        assert_eq!(
            m.unstake(&user(1), 0, &[], 0),
            Err(StakingError::ZeroAmount)
        );
    }

    #[test]
    fn test_unstake_beyond_balance_rejected() {
        let mut m = module();
        m.stake(&user(1), 10 * UNIT, &[], 0).unwrap();
        assert!(matches!(
            m.unstake(&user(1), 11 * UNIT, &[], 0),
            Err(StakingError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_rebase_up_recomputes_ratio() {
        let mut m = module();
        m.stake(&user(1), 100 * UNIT, &[], 0).unwrap();
        // positive rebase doubles holdings without minting shares
        m.sync(200 * UNIT);
        assert_eq!(m.shares_per_token(0), INITIAL_SHARES_PER_TOKEN * UNIT / 2);
        // a new staker gets half the shares per token
        let minted = m.stake(&user(2), 100 * UNIT, &[], 0).unwrap();
        assert_eq!(minted, 100 * UNIT * INITIAL_SHARES_PER_TOKEN / 2);
        // both positions now redeem the same token amount
        assert_eq!(m.balance(&user(1)), 200 * UNIT);
        assert_eq!(m.balance(&user(2)), 100 * UNIT);
    }

    #[test]
    fn test_round_trip_preserves_shares_total() {
        let mut m = module();
        m.stake(&user(1), 70 * UNIT, &[], 0).unwrap();
        m.stake(&user(2), 30 * UNIT, &[], 0).unwrap();
        let burned = m.unstake(&user(1), 70 * UNIT, &[], 0).unwrap();
        assert_eq!(burned, 70 * UNIT * INITIAL_SHARES_PER_TOKEN);
        assert_eq!(m.total_shares(0), 30 * UNIT * INITIAL_SHARES_PER_TOKEN);
        assert_eq!(m.shares(&user(1), 0), 0);
        assert_eq!(m.balance(&user(2)), 30 * UNIT);
    }

    #[test]
    fn test_amount_to_shares_full_and_partial() {
        let mut m = module();
        m.stake(&user(1), 100 * UNIT, &[], 0).unwrap();
        assert_eq!(
            m.amount_to_shares(&user(1), 0, 0).unwrap(),
            100 * UNIT * INITIAL_SHARES_PER_TOKEN
        );
        assert_eq!(
            m.amount_to_shares(&user(1), 40 * UNIT, 0).unwrap(),
            40 * UNIT * INITIAL_SHARES_PER_TOKEN
        );
        assert!(matches!(
            m.amount_to_shares(&user(1), 101 * UNIT, 0),
            Err(StakingError::InsufficientBalance { .. })
        ));
    }
}
