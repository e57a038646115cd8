//! Naming & Ownership Resolution
//!
//! Everything a provisioning attempt decides before touching the filesystem:
//! the asset name, its owner, the reclaim policy and where the asset lives,
//! both as this process sees it and as volume consumers will see it.

use crate::config::annotations::{
    OWNER_NEW_ASSET_GID, OWNER_NEW_ASSET_UID, RECLAIM_POLICY_OVERRIDE, USE_EXISTING_ASSET,
};
use crate::config::StorageClassRecord;
use crate::domain::ports::{AssetOwner, ReclaimPolicy};
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::ResourceExt;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Literal appended to every asset name
pub const ASSET_NAME_SUFFIX: &str = "vol";

// =============================================================================
// Naming
// =============================================================================

/// Derive the asset base name from its segments (usually namespace and claim
/// name): each segment loses its leading and trailing dashes, then the
/// segments and the `vol` suffix are joined with single dashes.
///
/// ```
/// use asset_provisioner::asset::derive_asset_name;
///
/// assert_eq!(
///     derive_asset_name(&["sbx-namespace", "-some-app-"]),
///     "sbx-namespace-some-app-vol"
/// );
/// ```
pub fn derive_asset_name<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|segment| segment.as_ref().trim_matches('-'))
        .chain(std::iter::once(ASSET_NAME_SUFFIX))
        .collect::<Vec<_>>()
        .join("-")
}

// =============================================================================
// Ownership & Policy
// =============================================================================

/// Owner of a new asset: claim annotations first, class defaults otherwise.
/// uid and gid are resolved independently.
pub fn resolve_owner(pvc: &PersistentVolumeClaim, class: &StorageClassRecord) -> AssetOwner {
    AssetOwner {
        uid: annotation_id(pvc, OWNER_NEW_ASSET_UID, class.default_owner_uid),
        gid: annotation_id(pvc, OWNER_NEW_ASSET_GID, class.default_owner_gid),
    }
}

fn annotation_id(pvc: &PersistentVolumeClaim, key: &str, default: u32) -> u32 {
    let Some(raw) = pvc.annotations().get(key) else {
        return default;
    };

    match raw.trim().parse::<u32>() {
        Ok(id) => id,
        Err(e) => {
            warn!(
                "PersistentVolumeClaim {} annotation {} has unusable value {:?} ({}), using {}",
                pvc.name_any(),
                key,
                raw,
                e,
                default
            );
            default
        }
    }
}

/// Reclaim policy of the new volume: claim override first, class policy
/// otherwise
pub fn resolve_reclaim_policy(pvc: &PersistentVolumeClaim, class: &StorageClassRecord) -> ReclaimPolicy {
    let Some(raw) = pvc.annotations().get(RECLAIM_POLICY_OVERRIDE) else {
        return class.reclaim_policy;
    };

    match raw.parse::<ReclaimPolicy>() {
        Ok(policy) => policy,
        Err(_) => {
            warn!(
                "PersistentVolumeClaim {} annotation {} names unknown policy {:?}, using {}",
                pvc.name_any(),
                RECLAIM_POLICY_OVERRIDE,
                raw,
                class.reclaim_policy
            );
            class.reclaim_policy
        }
    }
}

/// Whether the claim allows an already existing asset to be taken over
pub fn reuse_requested(pvc: &PersistentVolumeClaim) -> bool {
    pvc.annotations().contains_key(USE_EXISTING_ASSET)
}

// =============================================================================
// Location
// =============================================================================

/// Volume source published on the PersistentVolume
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSource {
    /// Directory on the node (or a share mounted there)
    HostPath { path: String },
    /// NFS export
    Nfs { server: String, path: String },
}

impl VolumeSource {
    pub fn path(&self) -> &str {
        match self {
            VolumeSource::HostPath { path } | VolumeSource::Nfs { path, .. } => path,
        }
    }
}

/// Where an asset lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
    /// Path as seen by this process; all filesystem operations use it
    pub local_path: PathBuf,
    /// Source recorded on the volume, as seen by its consumers
    pub source: VolumeSource,
}

impl AssetLocation {
    /// Resolve the location of asset `name` of `class`.
    ///
    /// The local path is `<asset_root>/<class>/<name>`. The published path is
    /// `<class assetRoot>/<name>`, an NFS coordinate when assetRoot has the
    /// form `server:/export`.
    pub fn resolve(asset_root: &Path, class: &StorageClassRecord, name: &str) -> Result<Self> {
        let local_path = class_dir(asset_root, &class.name).join(name);

        let parts: Vec<&str> = class.asset_root.split(':').collect();
        let source = match parts.as_slice() {
            [root] => VolumeSource::HostPath {
                path: join(root, name),
            },
            [server, export] => VolumeSource::Nfs {
                server: server.to_string(),
                path: join(export, name),
            },
            _ => {
                return Err(Error::MalformedAssetRoot {
                    class: class.name.clone(),
                    asset_root: class.asset_root.clone(),
                })
            }
        };

        Ok(Self { local_path, source })
    }
}

fn class_dir(asset_root: &Path, class_name: &str) -> PathBuf {
    asset_root.join(class_name)
}

fn join(root: &str, name: &str) -> String {
    Path::new(root).join(name).to_string_lossy().into_owned()
}

/// Local path of the asset backing an existing volume: the last segment of
/// its recorded source path under `<asset_root>/<class>`, or the volume name
/// when no usable source path is recorded
pub fn volume_local_path(asset_root: &Path, class_name: &str, pv: &PersistentVolume) -> PathBuf {
    let recorded = pv.spec.as_ref().and_then(|spec| {
        spec.host_path
            .as_ref()
            .map(|h| h.path.as_str())
            .or_else(|| spec.nfs.as_ref().map(|n| n.path.as_str()))
    });

    let base = recorded
        .and_then(|p| Path::new(p).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| pv.name_any());

    class_dir(asset_root, class_name).join(base)
}

// =============================================================================
// Provision Plan
// =============================================================================

/// Everything decided for a claim before any side effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPlan {
    pub name: String,
    pub owner: AssetOwner,
    pub reclaim_policy: ReclaimPolicy,
    pub reuse_existing: bool,
    pub location: AssetLocation,
}

impl ProvisionPlan {
    pub fn for_claim(
        pvc: &PersistentVolumeClaim,
        class: &StorageClassRecord,
        asset_root: &Path,
    ) -> Result<Self> {
        let namespace = pvc.namespace().unwrap_or_default();
        let name = derive_asset_name(&[namespace, pvc.name_any()]);
        let location = AssetLocation::resolve(asset_root, class, &name)?;

        Ok(Self {
            owner: resolve_owner(pvc, class),
            reclaim_policy: resolve_reclaim_policy(pvc, class),
            reuse_existing: reuse_requested(pvc),
            location,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use k8s_openapi::api::core::v1::{HostPathVolumeSource, NFSVolumeSource, PersistentVolumeSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn class(asset_root: &str) -> StorageClassRecord {
        StorageClassRecord {
            name: "nfs-class1".into(),
            provisioner: "some-vendor/some-provisioner1".into(),
            reclaim_policy: ReclaimPolicy::Retain,
            default_owner_uid: 1000,
            default_owner_gid: 1000,
            asset_root: asset_root.into(),
        }
    }

    fn claim(annotations: &[(&str, &str)]) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some("-some-app-".into()),
                namespace: Some("sbx-namespace".into()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_derive_asset_name() {
        assert_eq!(
            derive_asset_name(&["some-namespace", "some-pvc"]),
            "some-namespace-some-pvc-vol"
        );
        assert_eq!(
            derive_asset_name(&["some", "namespace", "some", "pvc"]),
            "some-namespace-some-pvc-vol"
        );
        assert_eq!(
            derive_asset_name(&["some-namespace", "some-pvc-claim"]),
            "some-namespace-some-pvc-claim-vol"
        );
        assert_eq!(
            derive_asset_name(&["sbx-namespace", "-some-app-"]),
            "sbx-namespace-some-app-vol"
        );
    }

    #[test]
    fn test_derive_asset_name_trims_only_edges() {
        assert_eq!(derive_asset_name(&["--a--b--", "c"]), "a--b-c-vol");

        let first = derive_asset_name(&["ns", "app"]);
        let second = derive_asset_name(&["ns".to_string(), "app".to_string()]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_owner_precedence() {
        let sc = class("/mnt/nfs");

        let pvc = claim(&[(OWNER_NEW_ASSET_UID, "2000")]);
        assert_eq!(resolve_owner(&pvc, &sc), AssetOwner::new(2000, 1000));

        let pvc = claim(&[]);
        assert_eq!(resolve_owner(&pvc, &sc), AssetOwner::new(1000, 1000));

        let pvc = claim(&[(OWNER_NEW_ASSET_UID, "10O"), (OWNER_NEW_ASSET_GID, "3000")]);
        assert_eq!(resolve_owner(&pvc, &sc), AssetOwner::new(1000, 3000));

        let pvc = claim(&[(OWNER_NEW_ASSET_UID, "-5"), (OWNER_NEW_ASSET_GID, "FF")]);
        assert_eq!(resolve_owner(&pvc, &sc), AssetOwner::new(1000, 1000));
    }

    #[test]
    fn test_reclaim_policy_precedence() {
        let sc = class("/mnt/nfs");

        assert_eq!(resolve_reclaim_policy(&claim(&[]), &sc), ReclaimPolicy::Retain);
        assert_eq!(
            resolve_reclaim_policy(&claim(&[(RECLAIM_POLICY_OVERRIDE, "Delete")]), &sc),
            ReclaimPolicy::Delete
        );
        assert_eq!(
            resolve_reclaim_policy(&claim(&[(RECLAIM_POLICY_OVERRIDE, "Shred")]), &sc),
            ReclaimPolicy::Retain
        );
    }

    #[test]
    fn test_reuse_marker() {
        assert!(!reuse_requested(&claim(&[])));
        assert!(reuse_requested(&claim(&[(USE_EXISTING_ASSET, "")])));
    }

    #[test]
    fn test_local_location() {
        let location =
            AssetLocation::resolve(Path::new("/pv-store"), &class("/mnt/nfs"), "sbx-namespace-some-app-vol")
                .unwrap();
        assert_eq!(
            location.local_path,
            PathBuf::from("/pv-store/nfs-class1/sbx-namespace-some-app-vol")
        );
        assert_eq!(
            location.source,
            VolumeSource::HostPath {
                path: "/mnt/nfs/sbx-namespace-some-app-vol".into()
            }
        );
    }

    #[test]
    fn test_nfs_location() {
        let location =
            AssetLocation::resolve(Path::new("/pv-store"), &class("nfs.local:/exports/pv"), "a-vol").unwrap();
        assert_eq!(location.local_path, PathBuf::from("/pv-store/nfs-class1/a-vol"));
        assert_eq!(
            location.source,
            VolumeSource::Nfs {
                server: "nfs.local".into(),
                path: "/exports/pv/a-vol".into()
            }
        );
        assert_eq!(location.source.path(), "/exports/pv/a-vol");
    }

    #[test]
    fn test_malformed_asset_root() {
        let err = AssetLocation::resolve(Path::new("/pv-store"), &class("a:b:/c"), "a-vol").unwrap_err();
        assert_matches!(err, Error::MalformedAssetRoot { asset_root, .. } if asset_root == "a:b:/c");
    }

    #[test]
    fn test_provision_plan() {
        let pvc = claim(&[(USE_EXISTING_ASSET, "true"), (OWNER_NEW_ASSET_GID, "42")]);
        let plan = ProvisionPlan::for_claim(&pvc, &class("/mnt/nfs"), Path::new("/pv-store")).unwrap();

        assert_eq!(plan.name, "sbx-namespace-some-app-vol");
        assert_eq!(plan.owner, AssetOwner::new(1000, 42));
        assert_eq!(plan.reclaim_policy, ReclaimPolicy::Retain);
        assert!(plan.reuse_existing);
    }

    #[test]
    fn test_volume_local_path() {
        let root = Path::new("/pv-store");
        let mut pv = PersistentVolume {
            metadata: ObjectMeta {
                name: Some("ns-app-vol".into()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                host_path: Some(HostPathVolumeSource {
                    path: "/mnt/nfs/ns-app-vol".into(),
                    type_: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            volume_local_path(root, "c1", &pv),
            PathBuf::from("/pv-store/c1/ns-app-vol")
        );

        pv.spec = Some(PersistentVolumeSpec {
            nfs: Some(NFSVolumeSource {
                server: "nfs.local".into(),
                path: "/exports/pv/other-vol".into(),
                read_only: None,
            }),
            ..Default::default()
        });
        assert_eq!(
            volume_local_path(root, "c1", &pv),
            PathBuf::from("/pv-store/c1/other-vol")
        );

        pv.spec = Some(PersistentVolumeSpec::default());
        assert_eq!(
            volume_local_path(root, "c1", &pv),
            PathBuf::from("/pv-store/c1/ns-app-vol")
        );
    }
}
