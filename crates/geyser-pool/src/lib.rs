//! # Geyser Pool - Assembly & Dispatch
//!
//! The wiring layer above the accounting core: factories mint staking
//! and reward modules under a whitelist-controlled registry, a pool
//! binds one of each and routes user traffic between them, and the info
//! registry answers read-only queries across heterogeneous module types
//! by dispatching on factory provenance.
//!
//! ## Components
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `registry` | Factory whitelist, module creation, pool assembly |
//! | `pool` | Stake/unstake/claim routing and the GYSR spend fee |
//! | `info` | Factory-keyed adapters for variant-specific projections |

pub mod error;
pub mod info;
pub mod pool;
pub mod registry;

pub use error::{PoolError, Result};
pub use info::{InfoError, InfoRegistry, PoolModules, RewardInfo, StakingInfo};
pub use pool::{Pool, PoolConfig, MAX_FEE_RATE};
pub use registry::{
    ModuleRegistry, ModuleType, RewardModuleFactory, StakingModuleFactory,
};
