//! Annotation keys and StorageClass parameter names
//!
//! These strings are shared with objects already in clusters and must not
//! change.

/// Set on provisioned PersistentVolumes, names the provisioner
pub const PROVISIONED_BY: &str = "pv.kubernetes.io/provisioned-by";

/// Set on provisioned PersistentVolumes, names the storage class
pub const STORAGE_CLASS: &str = "volume.beta.kubernetes.io/storage-class";

/// Set on claims by the cluster, names the provisioner expected to serve them
pub const STORAGE_PROVISIONER: &str = "volume.beta.kubernetes.io/storage-provisioner";

/// Claim override for the uid of a new asset
pub const OWNER_NEW_ASSET_UID: &str = "storage.asset/owner-uid";

/// Claim override for the gid of a new asset
pub const OWNER_NEW_ASSET_GID: &str = "storage.asset/owner-gid";

/// Claim override for the reclaim policy of the provisioned volume
pub const RECLAIM_POLICY_OVERRIDE: &str = "storage.asset/reclaim-policy";

/// Claim marker allowing an already existing asset directory to be reused
pub const USE_EXISTING_ASSET: &str = "storage.asset/use-existing";

/// StorageClass parameter: default uid of new assets
pub const PARAM_DEFAULT_OWNER_UID: &str = "defaultOwnerAssetUid";

/// StorageClass parameter: default gid of new assets
pub const PARAM_DEFAULT_OWNER_GID: &str = "defaultOwnerAssetGid";

/// StorageClass parameter: asset root as seen by volume consumers
pub const PARAM_ASSET_ROOT: &str = "assetRoot";
