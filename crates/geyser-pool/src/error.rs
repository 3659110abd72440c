//! Pool and registry error types

use crate::registry::ModuleType;
use geyser_core::{Address, RewardError, StakingError};
use thiserror::Error;

/// Errors from pool assembly and operation
#[derive(Error, Debug)]
pub enum PoolError {
    #[error(transparent)]
    Staking(#[from] StakingError),

    #[error(transparent)]
    Reward(#[from] RewardError),

    /// Registry mutation attempted by a non-controller
    #[error("caller is not the registry controller")]
    NotController,

    /// No factory registered under this address
    #[error("unknown factory {0}")]
    UnknownFactory(Address),

    /// Factory exists but is not whitelisted for the required type
    #[error("factory {factory} is not whitelisted as a {expected:?} factory")]
    NotWhitelisted {
        factory: Address,
        expected: ModuleType,
    },

    /// Factory configuration blob failed to decode
    #[error("malformed {variant} config: {reason}")]
    MalformedConfig {
        variant: &'static str,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, PoolError>;
