//! Storage Assets
//!
//! - [`resolver`]: asset naming, ownership, reclaim policy and location
//! - [`manager`]: filesystem lifecycle of asset directories

pub mod manager;
pub mod resolver;

pub use manager::AssetManager;
pub use resolver::{
    derive_asset_name, resolve_owner, resolve_reclaim_policy, reuse_requested, volume_local_path,
    AssetLocation, ProvisionPlan, VolumeSource,
};
