//! Info registry: read-only projections over heterogeneous modules
//!
//! Pools hold their modules behind capability traits, so generic code
//! cannot reach variant-specific state like a non-fungible position's
//! identifier list or a competitive distributor's share-seconds. The
//! info registry closes that gap: the controller maps each factory
//! address to an info adapter that knows the concrete type, and queries
//! dispatch through that map using the module's recorded provenance.
//!
//! Adapters recover the concrete type through `as_any` downcasts.
//! Nothing here mutates module state.

use crate::pool::Pool;
use geyser_core::rewards::CompetitiveRewardModule;
use geyser_core::staking::NonFungibleStakingModule;
use geyser_core::{Address, RewardModule, StakingModule, TokenMetadata};
use indexmap::IndexMap;
use thiserror::Error;

/// Errors from info dispatch
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InfoError {
    /// Registry mutation attempted by a non-controller
    #[error("caller is not the registry controller")]
    NotController,

    /// No info adapter registered for this factory
    #[error("no info adapter registered for factory {0}")]
    UnknownFactory(Address),

    /// The adapter does not support this query for its module type
    #[error("{0} is not supported by this module type")]
    Unsupported(&'static str),

    /// The registered adapter does not match the module's concrete type
    #[error("info adapter does not match module type")]
    TypeMismatch,
}

/// Read-only adapter for one staking module type.
///
/// The defaults answer everything the capability trait already exposes;
/// adapters override the queries that need the concrete type.
pub trait StakingInfo: Send {
    fn tokens(&self, module: &dyn StakingModule) -> Vec<TokenMetadata> {
        module.tokens()
    }

    fn shares(&self, module: &dyn StakingModule, user: &Address, now: i64) -> u128 {
        module.shares(user, now)
    }

    fn total_shares(&self, module: &dyn StakingModule, now: i64) -> u128 {
        module.total_shares(now)
    }

    fn shares_per_token(&self, module: &dyn StakingModule, now: i64) -> u128 {
        module.shares_per_token(now)
    }

    /// Windowed identifier list; only meaningful for per-identifier
    /// staking
    fn token_ids(
        &self,
        _module: &dyn StakingModule,
        _user: &Address,
        _count: usize,
        _offset: usize,
    ) -> Result<Vec<u64>, InfoError> {
        Err(InfoError::Unsupported("token_ids"))
    }
}

/// Read-only adapter for one reward module type
pub trait RewardInfo: Send {
    fn tokens(&self, module: &dyn RewardModule) -> Vec<TokenMetadata> {
        module.tokens()
    }

    fn preview(&self, module: &dyn RewardModule, user: &Address, shares: u128, now: i64) -> u128 {
        module.preview(user, shares, now)
    }

    fn unlocked(&self, module: &dyn RewardModule, now: i64) -> u128 {
        module.total_unlocked(now)
    }

    fn usage(&self, module: &dyn RewardModule, now: i64) -> u128 {
        module.usage(now)
    }

    /// Share-seconds projections; only meaningful for share-seconds
    /// distributors
    fn user_share_seconds(
        &self,
        _module: &dyn RewardModule,
        _user: &Address,
        _now: i64,
    ) -> Result<u128, InfoError> {
        Err(InfoError::Unsupported("user_share_seconds"))
    }

    fn total_share_seconds(&self, _module: &dyn RewardModule, _now: i64) -> Result<u128, InfoError> {
        Err(InfoError::Unsupported("total_share_seconds"))
    }
}

/// Adapter for fungible staking; the capability trait covers everything
pub struct FungibleStakingInfo;
impl StakingInfo for FungibleStakingInfo {}

/// Adapter for rate-assignment staking
pub struct AssignmentStakingInfo;
impl StakingInfo for AssignmentStakingInfo {}

/// Adapter for non-fungible staking, with identifier-window queries
pub struct NonFungibleStakingInfo;

impl StakingInfo for NonFungibleStakingInfo {
    fn token_ids(
        &self,
        module: &dyn StakingModule,
        user: &Address,
        count: usize,
        offset: usize,
    ) -> Result<Vec<u64>, InfoError> {
        let concrete = module
            .as_any()
            .downcast_ref::<NonFungibleStakingModule>()
            .ok_or(InfoError::TypeMismatch)?;
        Ok(concrete.token_ids(user, count, offset))
    }
}

/// Adapter for the competitive distributor, with share-seconds queries
pub struct CompetitiveRewardInfo;

impl CompetitiveRewardInfo {
    fn concrete<'a>(
        &self,
        module: &'a dyn RewardModule,
    ) -> Result<&'a CompetitiveRewardModule, InfoError> {
        module
            .as_any()
            .downcast_ref::<CompetitiveRewardModule>()
            .ok_or(InfoError::TypeMismatch)
    }
}

impl RewardInfo for CompetitiveRewardInfo {
    fn user_share_seconds(
        &self,
        module: &dyn RewardModule,
        user: &Address,
        now: i64,
    ) -> Result<u128, InfoError> {
        Ok(self.concrete(module)?.ledger().user_share_seconds(user, now))
    }

    fn total_share_seconds(&self, module: &dyn RewardModule, now: i64) -> Result<u128, InfoError> {
        Ok(self.concrete(module)?.ledger().total_share_seconds(now))
    }
}

/// Adapter for the friendly distributor
pub struct FriendlyRewardInfo;
impl RewardInfo for FriendlyRewardInfo {}

/// Adapter for the linear distributor
pub struct LinearRewardInfo;
impl RewardInfo for LinearRewardInfo {}

/// Uniform metadata snapshot of a pool's two modules
#[derive(Clone, Debug)]
pub struct PoolModules {
    pub staking_factory: Address,
    pub staking_tokens: Vec<TokenMetadata>,
    pub reward_factory: Address,
    pub reward_tokens: Vec<TokenMetadata>,
}

/// Factory-to-adapter dispatch table, controlled by one authority
pub struct InfoRegistry {
    controller: Address,
    staking: IndexMap<Address, Box<dyn StakingInfo>>,
    reward: IndexMap<Address, Box<dyn RewardInfo>>,
}

impl InfoRegistry {
    pub fn new(controller: Address) -> Self {
        Self {
            controller,
            staking: IndexMap::new(),
            reward: IndexMap::new(),
        }
    }

    fn require_controller(&self, caller: &Address) -> Result<(), InfoError> {
        if caller != &self.controller {
            return Err(InfoError::NotController);
        }
        Ok(())
    }

    pub fn register_staking(
        &mut self,
        caller: &Address,
        factory: Address,
        info: Box<dyn StakingInfo>,
    ) -> Result<(), InfoError> {
        self.require_controller(caller)?;
        self.staking.insert(factory, info);
        Ok(())
    }

    pub fn register_reward(
        &mut self,
        caller: &Address,
        factory: Address,
        info: Box<dyn RewardInfo>,
    ) -> Result<(), InfoError> {
        self.require_controller(caller)?;
        self.reward.insert(factory, info);
        Ok(())
    }

    pub fn staking_info(&self, factory: &Address) -> Result<&dyn StakingInfo, InfoError> {
        self.staking
            .get(factory)
            .map(|b| b.as_ref())
            .ok_or(InfoError::UnknownFactory(*factory))
    }

    pub fn reward_info(&self, factory: &Address) -> Result<&dyn RewardInfo, InfoError> {
        self.reward
            .get(factory)
            .map(|b| b.as_ref())
            .ok_or(InfoError::UnknownFactory(*factory))
    }

    /// Metadata for both of a pool's modules, dispatched by provenance.
    pub fn modules(&self, pool: &Pool) -> Result<PoolModules, InfoError> {
        let staking_factory = pool.staking().factory();
        let reward_factory = pool.reward().factory();
        let staking_tokens = self.staking_info(&staking_factory)?.tokens(pool.staking());
        let reward_tokens = self.reward_info(&reward_factory)?.tokens(pool.reward());
        Ok(PoolModules {
            staking_factory,
            staking_tokens,
            reward_factory,
            reward_tokens,
        })
    }

    /// Estimated reward a settlement of `shares` by `user` would pay
    /// right now; zero means the user's full share balance.
    pub fn rewards(
        &self,
        pool: &Pool,
        user: &Address,
        shares: u128,
        now: i64,
    ) -> Result<u128, InfoError> {
        let shares = if shares == 0 {
            pool.staking().shares(user, now)
        } else {
            shares
        };
        if shares == 0 {
            return Ok(0);
        }
        let info = self.reward_info(&pool.reward().factory())?;
        Ok(info.preview(pool.reward(), user, shares, now))
    }

    /// Windowed identifier list for a pool's staking position.
    pub fn token_ids(
        &self,
        pool: &Pool,
        user: &Address,
        count: usize,
        offset: usize,
    ) -> Result<Vec<u64>, InfoError> {
        let info = self.staking_info(&pool.staking().factory())?;
        info.token_ids(pool.staking(), user, count, offset)
    }
}
