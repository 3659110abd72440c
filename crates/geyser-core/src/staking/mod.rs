//! Staking converters: deposit assets in, shares out
//!
//! Each variant converts a deposited amount (or identifier set, or
//! assigned rate) into the internal share unit at its own conversion
//! ratio and maintains per-user position records. A pool owns exactly one
//! staking module for its lifetime and is the only caller of its mutating
//! entry points.
//!
//! Variants form a closed set behind the [`StakingModule`] capability
//! trait; info libraries recover the concrete type through [`as_any`]
//! dispatch keyed by the module's originating factory.
//!
//! [`as_any`]: StakingModule::as_any

pub mod assignment;
pub mod fungible;
pub mod nonfungible;

pub use assignment::{AssignmentStakingModule, Beneficiary};
pub use fungible::FungibleStakingModule;
pub use nonfungible::{NonFungibleStakingModule, TokenIdList};

use crate::types::{Address, TokenMetadata};
use serde::de::DeserializeOwned;
use std::any::Any;
use thiserror::Error;

/// Errors from staking module operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    #[error("stake amount must be non-zero")]
    ZeroAmount,

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    /// Identifier never staked into this module
    #[error("unknown token id {0}")]
    UnknownTokenId(u64),

    /// Identifier staked, but by a different user
    #[error("token id {id} is not owned by caller")]
    NotTokenOwner { id: u64 },

    /// Identifier already held by this module
    #[error("token id {0} is already staked")]
    DuplicateTokenId(u64),

    /// Rate assignment is restricted to the module controller
    #[error("caller is not the module controller")]
    NotController,

    /// Variant-specific parameter blob failed to decode
    #[error("malformed {variant} data: {reason}")]
    MalformedData {
        variant: &'static str,
        reason: String,
    },

    #[error("conversion overflow")]
    ConversionOverflow,
}

/// Capability interface every staking converter implements.
///
/// All mutating calls take the acting user and an explicit timestamp;
/// `data` is an opaque, variant-specific parameter blob (bincode-encoded)
/// that variants without extra parameters ignore.
pub trait StakingModule: Send {
    /// Originating factory address; the module's type identifier
    fn factory(&self) -> Address;

    /// Metadata for each underlying asset; empty for assetless variants
    fn tokens(&self) -> Vec<TokenMetadata>;

    /// Token-denominated balance of `user` (whole identifiers for
    /// non-fungible staking, the assigned daily rate for assignment)
    fn balance(&self, user: &Address) -> u128;

    /// Share balance of `user` as of `now`
    fn shares(&self, user: &Address, now: i64) -> u128;

    /// Total shares outstanding as of `now`
    fn total_shares(&self, now: i64) -> u128;

    /// Current conversion ratio, 1e18-scaled shares per token
    fn shares_per_token(&self, now: i64) -> u128;

    /// Convert a token-denominated amount of `user`'s position into
    /// shares at the current ratio; zero means the full position
    fn amount_to_shares(
        &self,
        user: &Address,
        amount: u128,
        now: i64,
    ) -> Result<u128, StakingError>;

    /// Read-only check that [`unstake`] with the same arguments would
    /// succeed. Pools call this before settling reward, so a
    /// staking-side rejection cannot surface after another module has
    /// already mutated.
    ///
    /// [`unstake`]: StakingModule::unstake
    fn validate_unstake(
        &self,
        user: &Address,
        amount: u128,
        data: &[u8],
        now: i64,
    ) -> Result<(), StakingError>;

    /// Deposit: convert `amount` into newly minted shares
    fn stake(
        &mut self,
        user: &Address,
        amount: u128,
        data: &[u8],
        now: i64,
    ) -> Result<u128, StakingError>;

    /// Withdraw: burn the shares backing `amount`
    fn unstake(
        &mut self,
        user: &Address,
        amount: u128,
        data: &[u8],
        now: i64,
    ) -> Result<u128, StakingError>;

    /// Concrete-type access for info-library dispatch
    fn as_any(&self) -> &dyn Any;
}

/// Decode a variant-specific bincode parameter blob, mapping failures to
/// a variant-tagged error rather than a silent mis-parse.
pub(crate) fn decode_data<T: DeserializeOwned>(
    variant: &'static str,
    data: &[u8],
) -> Result<T, StakingError> {
    bincode::deserialize(data).map_err(|e| StakingError::MalformedData {
        variant,
        reason: e.to_string(),
    })
}
