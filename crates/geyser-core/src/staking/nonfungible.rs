//! Non-fungible (per-identifier) staking converter
//!
//! Every staked identifier carries the same fixed share weight. A
//! position is an insertion-ordered list of held identifiers; windowed
//! queries slice that list from the front.
//!
//! Removal of an arbitrary identifier is swap-remove: the list's last
//! entry takes the vacated slot. This keeps removal O(1) at the cost of
//! reordering entries that came after a mid-list removal, and that
//! behavior is part of the module's contract (see the ordering tests).

use super::{decode_data, StakingError, StakingModule};
use crate::constants::SHARES_PER_NFT;
use crate::types::{Address, TokenMetadata};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use tracing::debug;

/// Parameter blob for stake/unstake: the identifiers to move
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenIdList {
    pub ids: Vec<u64>,
}

/// Staking converter for per-identifier assets
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NonFungibleStakingModule {
    factory: Address,
    token: TokenMetadata,
    owners: HashMap<u64, Address>,
    positions: HashMap<Address, Vec<u64>>,
    total_shares: u128,
}

impl NonFungibleStakingModule {
    pub fn new(factory: Address, token: TokenMetadata) -> Self {
        Self {
            factory,
            token,
            owners: HashMap::new(),
            positions: HashMap::new(),
            total_shares: 0,
        }
    }

    /// Window into the user's held identifiers, in position order.
    ///
    /// Returns entries `offset..offset+count`; `count == 0` means
    /// "through the end". Out-of-range indices clamp to an empty or
    /// shortened window.
    pub fn token_ids(&self, user: &Address, count: usize, offset: usize) -> Vec<u64> {
        let held = self
            .positions
            .get(user)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let start = offset.min(held.len());
        let end = if count == 0 {
            held.len()
        } else {
            (offset + count).min(held.len())
        };
        held[start..end].to_vec()
    }

    /// Current owner of a staked identifier, if staked.
    pub fn owner_of(&self, id: u64) -> Option<Address> {
        self.owners.get(&id).copied()
    }

    fn held_count(&self, user: &Address) -> u128 {
        self.positions.get(user).map(|v| v.len() as u128).unwrap_or(0)
    }

    /// Every rejection a removal of `list` could hit, checked without
    /// mutating.
    fn check_removal(
        &self,
        user: &Address,
        amount: u128,
        list: &TokenIdList,
    ) -> Result<(), StakingError> {
        if list.ids.len() as u128 != amount {
            return Err(StakingError::MalformedData {
                variant: "non-fungible unstake",
                reason: format!("amount {} does not match {} ids", amount, list.ids.len()),
            });
        }
        for (i, id) in list.ids.iter().enumerate() {
            if list.ids[..i].contains(id) {
                return Err(StakingError::DuplicateTokenId(*id));
            }
            match self.owners.get(id) {
                None => return Err(StakingError::UnknownTokenId(*id)),
                Some(owner) if owner != user => {
                    return Err(StakingError::NotTokenOwner { id: *id })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl StakingModule for NonFungibleStakingModule {
    fn factory(&self) -> Address {
        self.factory
    }

    fn tokens(&self) -> Vec<TokenMetadata> {
        vec![self.token.clone()]
    }

    fn balance(&self, user: &Address) -> u128 {
        self.held_count(user)
    }

    fn shares(&self, user: &Address, _now: i64) -> u128 {
        self.held_count(user) * SHARES_PER_NFT
    }

    fn total_shares(&self, _now: i64) -> u128 {
        self.total_shares
    }

    fn shares_per_token(&self, _now: i64) -> u128 {
        SHARES_PER_NFT
    }

    fn amount_to_shares(
        &self,
        user: &Address,
        amount: u128,
        _now: i64,
    ) -> Result<u128, StakingError> {
        let held = self.held_count(user);
        if amount == 0 {
            return Ok(held * SHARES_PER_NFT);
        }
        if amount > held {
            return Err(StakingError::InsufficientBalance {
                requested: amount,
                available: held,
            });
        }
        Ok(amount * SHARES_PER_NFT)
    }

    fn validate_unstake(
        &self,
        user: &Address,
        amount: u128,
        data: &[u8],
        _now: i64,
    ) -> Result<(), StakingError> {
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let list: TokenIdList = decode_data("non-fungible unstake", data)?;
        self.check_removal(user, amount, &list)
    }

    /// Stake the identifiers in `data`; `amount` must equal their count.
    fn stake(
        &mut self,
        user: &Address,
        amount: u128,
        data: &[u8],
        _now: i64,
    ) -> Result<u128, StakingError> {
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let list: TokenIdList = decode_data("non-fungible stake", data)?;
        if list.ids.len() as u128 != amount {
            return Err(StakingError::MalformedData {
                variant: "non-fungible stake",
                reason: format!("amount {} does not match {} ids", amount, list.ids.len()),
            });
        }
        // validate before mutating; a failed call must change nothing
        for (i, id) in list.ids.iter().enumerate() {
            if self.owners.contains_key(id) || list.ids[..i].contains(id) {
                return Err(StakingError::DuplicateTokenId(*id));
            }
        }

        let position = self.positions.entry(*user).or_default();
        for id in &list.ids {
            self.owners.insert(*id, *user);
            position.push(*id);
        }
        let minted = amount * SHARES_PER_NFT;
        self.total_shares += minted;
        debug!(user = %user, ids = ?list.ids, "non-fungible stake");
        Ok(minted)
    }

    /// Unstake the identifiers in `data`; `amount` must equal their count.
    fn unstake(
        &mut self,
        user: &Address,
        amount: u128,
        data: &[u8],
        _now: i64,
    ) -> Result<u128, StakingError> {
        if amount == 0 {
            return Err(StakingError::ZeroAmount);
        }
        let list: TokenIdList = decode_data("non-fungible unstake", data)?;
        self.check_removal(user, amount, &list)?;

        let position = self.positions.get_mut(user).expect("owner implies position");
        for id in &list.ids {
            self.owners.remove(id);
            let idx = position
                .iter()
                .position(|held| held == id)
                .expect("owner map and position agree");
            position.swap_remove(idx);
        }
        let burned = amount * SHARES_PER_NFT;
        self.total_shares -= burned;
        debug!(user = %user, ids = ?list.ids, "non-fungible unstake");
        Ok(burned)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> NonFungibleStakingModule {
        let token = TokenMetadata::new(Address::new([9; 32]), "Collectible", "NFT", 0);
        NonFungibleStakingModule::new(Address::new([2; 32]), token)
    }

    fn user(n: u8) -> Address {
        Address::new([n; 32])
    }

    fn ids(v: &[u64]) -> Vec<u8> {
        bincode::serialize(&TokenIdList { ids: v.to_vec() }).unwrap()
    }

    #[test]
    fn test_stake_mints_fixed_share_units() {
        let mut m = module();
        let minted = m.stake(&user(1), 3, &ids(&[1, 2, 8]), 0).unwrap();
        assert_eq!(minted, 3 * SHARES_PER_NFT);
        assert_eq!(m.shares(&user(1), 0), 3 * SHARES_PER_NFT);
        assert_eq!(m.balance(&user(1)), 3);
        assert_eq!(m.owner_of(2), Some(user(1)));
    }

    #[test]
    fn test_token_ids_windowing() {
        let mut m = module();
        m.stake(&user(1), 3, &ids(&[1, 2, 8]), 0).unwrap();
        assert_eq!(m.token_ids(&user(1), 0, 0), vec![1, 2, 8]);
        assert_eq!(m.token_ids(&user(1), 2, 0), vec![1, 2]);
        assert_eq!(m.token_ids(&user(1), 0, 1), vec![2, 8]);
        // clamping
        assert_eq!(m.token_ids(&user(1), 5, 2), vec![8]);
        assert!(m.token_ids(&user(1), 0, 3).is_empty());
        assert!(m.token_ids(&user(2), 0, 0).is_empty());
    }

    #[test]
    fn test_swap_remove_ordering() {
        let mut m = module();
        m.stake(&user(1), 4, &ids(&[1, 2, 8, 9]), 0).unwrap();
        // removing a middle entry moves the last entry into its slot
        m.unstake(&user(1), 1, &ids(&[2]), 0).unwrap();
        assert_eq!(m.token_ids(&user(1), 0, 0), vec![1, 9, 8]);
        // removing the tail entry keeps the rest in place
        m.unstake(&user(1), 1, &ids(&[8]), 0).unwrap();
        assert_eq!(m.token_ids(&user(1), 0, 0), vec![1, 9]);
    }

    #[test]
    fn test_ownership_guards() {
        let mut m = module();
        m.stake(&user(1), 2, &ids(&[1, 2]), 0).unwrap();
        assert_eq!(
            m.stake(&user(2), 1, &ids(&[2]), 0),
            Err(StakingError::DuplicateTokenId(2))
        );
        assert_eq!(
            m.unstake(&user(2), 1, &ids(&[2]), 0),
            Err(StakingError::NotTokenOwner { id: 2 })
        );
        assert_eq!(
            m.unstake(&user(1), 1, &ids(&[42]), 0),
            Err(StakingError::UnknownTokenId(42))
        );
        // failed calls changed nothing
        assert_eq!(m.token_ids(&user(1), 0, 0), vec![1, 2]);
        assert_eq!(m.total_shares(0), 2 * SHARES_PER_NFT);
    }

    #[test]
    fn test_validate_unstake_mirrors_rejections() {
        let mut m = module();
        m.stake(&user(1), 2, &ids(&[1, 2]), 0).unwrap();
        assert_eq!(
            m.validate_unstake(&user(1), 1, &ids(&[99]), 0),
            Err(StakingError::UnknownTokenId(99))
        );
        assert_eq!(
            m.validate_unstake(&user(2), 1, &ids(&[2]), 0),
            Err(StakingError::NotTokenOwner { id: 2 })
        );
        assert!(m.validate_unstake(&user(1), 2, &ids(&[1, 2]), 0).is_ok());
        // the check touched nothing
        assert_eq!(m.token_ids(&user(1), 0, 0), vec![1, 2]);
        assert_eq!(m.total_shares(0), 2 * SHARES_PER_NFT);
    }

    #[test]
    fn test_malformed_data_rejected() {
        let mut m = module();
        assert!(matches!(
            m.stake(&user(1), 1, b"garbage", 0),
            Err(StakingError::MalformedData { .. })
        ));
        // count mismatch is malformed, not silently truncated
        assert!(matches!(
            m.stake(&user(1), 2, &ids(&[7]), 0),
            Err(StakingError::MalformedData { .. })
        ));
    }
}
