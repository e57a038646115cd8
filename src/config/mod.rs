//! Provisioner configuration
//!
//! - [`annotations`]: annotation keys and StorageClass parameter names
//! - [`storage_class`]: served storage classes, resolved once at startup

pub mod annotations;
pub mod storage_class;

pub use storage_class::*;

use std::path::PathBuf;

/// Settings shared by both reconciliation handlers
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Asset root as seen from inside the provisioner's own mount namespace
    pub asset_root: PathBuf,
    /// Permission bits of newly created asset directories
    pub dir_mode: u32,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("/pv-store"),
            dir_mode: 0o755,
        }
    }
}
