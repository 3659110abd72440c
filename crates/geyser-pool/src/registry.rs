//! Module registry: factories, whitelist, and pool assembly
//!
//! Factories are the only way to mint module instances. Each factory
//! registers under a derived address, the controller whitelists it with
//! a type code, and pool creation checks the whitelist before asking the
//! factory to build. The registry also records provenance: which factory
//! created which module, the key the info layer dispatches on.
//!
//! Module and pool addresses are derived deterministically by hashing
//! the factory address with a creation counter, so a registry replayed
//! from the same event sequence reproduces the same addresses.

use crate::error::{PoolError, Result};
use crate::pool::{Pool, PoolConfig};
use geyser_core::rewards::{
    CompetitiveRewardModule, FriendlyRewardModule, LinearRewardModule, RewardModule,
};
use geyser_core::staking::{
    AssignmentStakingModule, FungibleStakingModule, NonFungibleStakingModule, StakingModule,
};
use geyser_core::{Address, TokenMetadata};
use geyser_math::BonusParameters;
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::info;

/// Whitelist type codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ModuleType {
    Staking = 1,
    Reward = 2,
}

/// Builds staking modules from an opaque config blob
pub trait StakingModuleFactory: Send {
    fn create(
        &self,
        factory: Address,
        init_data: &[u8],
        now: i64,
    ) -> Result<Box<dyn StakingModule>>;
}

/// Builds reward modules from an opaque config blob
pub trait RewardModuleFactory: Send {
    fn create(
        &self,
        factory: Address,
        init_data: &[u8],
        now: i64,
    ) -> Result<Box<dyn RewardModule>>;
}

fn decode_config<T: DeserializeOwned>(variant: &'static str, data: &[u8]) -> Result<T> {
    bincode::deserialize(data).map_err(|e| PoolError::MalformedConfig {
        variant,
        reason: e.to_string(),
    })
}

/// Config blob for [`FungibleStakingFactory`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FungibleStakingConfig {
    pub token: TokenMetadata,
}

pub struct FungibleStakingFactory;

impl StakingModuleFactory for FungibleStakingFactory {
    fn create(
        &self,
        factory: Address,
        init_data: &[u8],
        _now: i64,
    ) -> Result<Box<dyn StakingModule>> {
        let config: FungibleStakingConfig = decode_config("fungible staking", init_data)?;
        Ok(Box::new(FungibleStakingModule::new(factory, config.token)))
    }
}

/// Config blob for [`NonFungibleStakingFactory`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NonFungibleStakingConfig {
    pub token: TokenMetadata,
}

pub struct NonFungibleStakingFactory;

impl StakingModuleFactory for NonFungibleStakingFactory {
    fn create(
        &self,
        factory: Address,
        init_data: &[u8],
        _now: i64,
    ) -> Result<Box<dyn StakingModule>> {
        let config: NonFungibleStakingConfig = decode_config("non-fungible staking", init_data)?;
        Ok(Box::new(NonFungibleStakingModule::new(factory, config.token)))
    }
}

/// Config blob for [`AssignmentStakingFactory`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssignmentStakingConfig {
    pub controller: Address,
}

pub struct AssignmentStakingFactory;

impl StakingModuleFactory for AssignmentStakingFactory {
    fn create(
        &self,
        factory: Address,
        init_data: &[u8],
        _now: i64,
    ) -> Result<Box<dyn StakingModule>> {
        let config: AssignmentStakingConfig = decode_config("assignment staking", init_data)?;
        Ok(Box::new(AssignmentStakingModule::new(
            factory,
            config.controller,
        )))
    }
}

/// Config blob for [`CompetitiveRewardFactory`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompetitiveRewardConfig {
    pub token: TokenMetadata,
    pub bonus: BonusParameters,
}

pub struct CompetitiveRewardFactory;

impl RewardModuleFactory for CompetitiveRewardFactory {
    fn create(
        &self,
        factory: Address,
        init_data: &[u8],
        _now: i64,
    ) -> Result<Box<dyn RewardModule>> {
        let config: CompetitiveRewardConfig = decode_config("competitive reward", init_data)?;
        Ok(Box::new(CompetitiveRewardModule::new(
            factory,
            config.token,
            config.bonus,
        )))
    }
}

/// Config blob for [`FriendlyRewardFactory`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FriendlyRewardConfig {
    pub token: TokenMetadata,
    pub vesting_period_secs: u64,
}

pub struct FriendlyRewardFactory;

impl RewardModuleFactory for FriendlyRewardFactory {
    fn create(
        &self,
        factory: Address,
        init_data: &[u8],
        _now: i64,
    ) -> Result<Box<dyn RewardModule>> {
        let config: FriendlyRewardConfig = decode_config("friendly reward", init_data)?;
        Ok(Box::new(FriendlyRewardModule::new(
            factory,
            config.token,
            config.vesting_period_secs,
        )))
    }
}

/// Config blob for [`LinearRewardFactory`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinearRewardConfig {
    pub token: TokenMetadata,
    pub rate: u128,
}

pub struct LinearRewardFactory;

impl RewardModuleFactory for LinearRewardFactory {
    fn create(
        &self,
        factory: Address,
        init_data: &[u8],
        _now: i64,
    ) -> Result<Box<dyn RewardModule>> {
        let config: LinearRewardConfig = decode_config("linear reward", init_data)?;
        Ok(Box::new(LinearRewardModule::new(
            factory,
            config.token,
            config.rate,
        )))
    }
}

/// Factory whitelist and pool assembly, controlled by one authority
pub struct ModuleRegistry {
    controller: Address,
    whitelist: IndexMap<Address, ModuleType>,
    staking_factories: IndexMap<Address, Box<dyn StakingModuleFactory>>,
    reward_factories: IndexMap<Address, Box<dyn RewardModuleFactory>>,
    /// Creation counter feeding address derivation
    created: u64,
}

impl ModuleRegistry {
    pub fn new(controller: Address) -> Self {
        Self {
            controller,
            whitelist: IndexMap::new(),
            staking_factories: IndexMap::new(),
            reward_factories: IndexMap::new(),
            created: 0,
        }
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    pub fn whitelisted(&self, factory: &Address) -> Option<ModuleType> {
        self.whitelist.get(factory).copied()
    }

    fn require_controller(&self, caller: &Address) -> Result<()> {
        if caller != &self.controller {
            return Err(PoolError::NotController);
        }
        Ok(())
    }

    fn derive_address(&mut self, domain: &str, factory: &Address) -> Address {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain.as_bytes());
        hasher.update(factory.as_bytes());
        hasher.update(&self.created.to_le_bytes());
        self.created += 1;
        Address::new(*hasher.finalize().as_bytes())
    }

    /// Register a staking factory and return its derived address. The
    /// factory stays unusable until whitelisted.
    pub fn register_staking_factory(
        &mut self,
        caller: &Address,
        factory: Box<dyn StakingModuleFactory>,
    ) -> Result<Address> {
        self.require_controller(caller)?;
        let controller = self.controller;
        let address = self.derive_address("staking-factory", &controller);
        self.staking_factories.insert(address, factory);
        info!(factory = %address, "staking factory registered");
        Ok(address)
    }

    /// Register a reward factory and return its derived address.
    pub fn register_reward_factory(
        &mut self,
        caller: &Address,
        factory: Box<dyn RewardModuleFactory>,
    ) -> Result<Address> {
        self.require_controller(caller)?;
        let controller = self.controller;
        let address = self.derive_address("reward-factory", &controller);
        self.reward_factories.insert(address, factory);
        info!(factory = %address, "reward factory registered");
        Ok(address)
    }

    /// Whitelist a factory under a type code, or remove it with `None`.
    pub fn set_whitelist(
        &mut self,
        caller: &Address,
        factory: Address,
        module_type: Option<ModuleType>,
    ) -> Result<()> {
        self.require_controller(caller)?;
        match module_type {
            Some(t) => {
                self.whitelist.insert(factory, t);
                info!(factory = %factory, module_type = ?t, "factory whitelisted");
            }
            None => {
                self.whitelist.shift_remove(&factory);
                info!(factory = %factory, "factory removed from whitelist");
            }
        }
        Ok(())
    }

    fn check_whitelist(&self, factory: &Address, expected: ModuleType) -> Result<()> {
        match self.whitelist.get(factory) {
            Some(t) if *t == expected => Ok(()),
            _ => Err(PoolError::NotWhitelisted {
                factory: *factory,
                expected,
            }),
        }
    }

    /// Create a staking module through a whitelisted factory.
    pub fn create_staking_module(
        &mut self,
        user: &Address,
        factory: &Address,
        init_data: &[u8],
        now: i64,
    ) -> Result<(Address, Box<dyn StakingModule>)> {
        self.check_whitelist(factory, ModuleType::Staking)?;
        let builder = self
            .staking_factories
            .get(factory)
            .ok_or(PoolError::UnknownFactory(*factory))?;
        let module = builder.create(*factory, init_data, now)?;
        let address = self.derive_address("staking-module", factory);
        info!(user = %user, module = %address, factory = %factory, "module created");
        Ok((address, module))
    }

    /// Create a reward module through a whitelisted factory.
    pub fn create_reward_module(
        &mut self,
        user: &Address,
        factory: &Address,
        init_data: &[u8],
        now: i64,
    ) -> Result<(Address, Box<dyn RewardModule>)> {
        self.check_whitelist(factory, ModuleType::Reward)?;
        let builder = self
            .reward_factories
            .get(factory)
            .ok_or(PoolError::UnknownFactory(*factory))?;
        let module = builder.create(*factory, init_data, now)?;
        let address = self.derive_address("reward-module", factory);
        info!(user = %user, module = %address, factory = %factory, "module created");
        Ok((address, module))
    }

    /// Create a pool from one staking and one reward factory.
    #[allow(clippy::too_many_arguments)]
    pub fn create_pool(
        &mut self,
        user: &Address,
        staking_factory: &Address,
        staking_data: &[u8],
        reward_factory: &Address,
        reward_data: &[u8],
        config: PoolConfig,
        now: i64,
    ) -> Result<Pool> {
        let (_, staking) = self.create_staking_module(user, staking_factory, staking_data, now)?;
        let (_, reward) = self.create_reward_module(user, reward_factory, reward_data, now)?;
        let address = self.derive_address("pool", staking_factory);
        info!(user = %user, pool = %address, "pool created");
        Ok(Pool::new(address, staking, reward, config))
    }
}
