//! Volume-side checks

use crate::config::annotations::PROVISIONED_BY;
use crate::config::StorageClassRecord;
use crate::domain::ports::ReclaimPolicy;
use crate::gate::{Check, Gatekeeper};
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::ResourceExt;
use tracing::debug;

pub const PHASE_RELEASED: &str = "Released";

/// Storage class recorded on a volume
pub fn volume_class_name(pv: &PersistentVolume) -> Option<&str> {
    pv.spec
        .as_ref()
        .and_then(|spec| spec.storage_class_name.as_deref())
}

pub fn released(pv: &PersistentVolume, _: Option<&StorageClassRecord>) -> bool {
    let phase = pv.status.as_ref().and_then(|status| status.phase.as_deref());
    if phase == Some(PHASE_RELEASED) {
        return true;
    }

    debug!("PersistentVolume {} is not released yet ({:?})", pv.name_any(), phase);
    false
}

pub fn known_storage_class(pv: &PersistentVolume, class: Option<&StorageClassRecord>) -> bool {
    if class.is_some() {
        return true;
    }

    debug!(
        "Storage class {:?} of PersistentVolume {} is not served here",
        volume_class_name(pv),
        pv.name_any()
    );
    false
}

pub fn reclaim_policy_delete(pv: &PersistentVolume, _: Option<&StorageClassRecord>) -> bool {
    let policy = pv
        .spec
        .as_ref()
        .and_then(|spec| spec.persistent_volume_reclaim_policy.as_deref());
    if policy == Some(ReclaimPolicy::Delete.as_str()) {
        return true;
    }

    debug!(
        "PersistentVolume {} has reclaim policy {:?}, not Delete",
        pv.name_any(),
        policy
    );
    false
}

pub fn provisioned_by_annotation(pv: &PersistentVolume, class: Option<&StorageClassRecord>) -> bool {
    let provisioned_by = pv.annotations().get(PROVISIONED_BY);
    if let (Some(provisioned_by), Some(class)) = (provisioned_by, class) {
        if *provisioned_by == class.provisioner {
            return true;
        }
    }

    debug!(
        "PersistentVolume {} was not provisioned by {:?}",
        pv.name_any(),
        class.map(|c| c.provisioner.as_str())
    );
    false
}

/// Checks a volume must pass before its asset is reclaimed
pub fn volume_gatekeeper() -> Gatekeeper<PersistentVolume> {
    Gatekeeper::new()
        .check(Check::Released, released)
        .check(Check::KnownStorageClass, known_storage_class)
        .check(Check::ReclaimPolicyDelete, reclaim_policy_delete)
        .check(Check::ProvisionedByAnnotation, provisioned_by_annotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PersistentVolumeSpec, PersistentVolumeStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn class(name: &str, provisioner: &str) -> StorageClassRecord {
        StorageClassRecord {
            name: name.into(),
            provisioner: provisioner.into(),
            reclaim_policy: ReclaimPolicy::Delete,
            default_owner_uid: 1000,
            default_owner_gid: 1000,
            asset_root: "/some/path".into(),
        }
    }

    fn volume(provisioned_by: Option<&str>, policy: &str, class_name: &str, phase: &str) -> PersistentVolume {
        PersistentVolume {
            metadata: ObjectMeta {
                name: Some("test-pv".into()),
                annotations: provisioned_by
                    .map(|p| [(PROVISIONED_BY.to_string(), p.to_string())].into()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                storage_class_name: Some(class_name.into()),
                persistent_volume_reclaim_policy: Some(policy.into()),
                ..Default::default()
            }),
            status: Some(PersistentVolumeStatus {
                phase: Some(phase.into()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_reclaim_policy() {
        assert!(!reclaim_policy_delete(&volume(None, "Retain", "", ""), None));
        assert!(!reclaim_policy_delete(&volume(None, "Recycle", "", ""), None));
        assert!(reclaim_policy_delete(&volume(None, "Delete", "", ""), None));
    }

    #[test]
    fn test_known_storage_class() {
        let sc = class("storageClass1", "some-vendor/some-provisioner1");
        assert!(!known_storage_class(&volume(None, "", "storageClass0", ""), None));
        assert!(known_storage_class(&volume(None, "", "storageClass1", ""), Some(&sc)));
    }

    #[test]
    fn test_provisioned_by_annotation() {
        let sc1 = class("storageClass1", "some-vendor/some-provisioner1");
        let sc2 = class("storageClass2", "some-vendor/some-provisioner2");

        let pv = volume(Some("some-vendor/some-provisioner1"), "", "storageClass1", "");
        assert!(provisioned_by_annotation(&pv, Some(&sc1)));

        let pv = volume(Some("some-vendor/some-provisioner3"), "", "storageClass2", "");
        assert!(!provisioned_by_annotation(&pv, Some(&sc2)));

        let pv = volume(Some("some-vendor/some-provisioner4"), "", "storageClass4", "");
        assert!(!provisioned_by_annotation(&pv, None));
    }

    #[test]
    fn test_released() {
        assert!(!released(&volume(None, "", "", "Bound"), None));
        assert!(released(&volume(None, "", "", "Released"), None));
        assert!(!released(&PersistentVolume::default(), None));
    }

    #[test]
    fn test_volume_gatekeeper() {
        let sc = class("storageClass1", "some-vendor/some-provisioner1");
        let gate = volume_gatekeeper();

        let pv = volume(Some("some-vendor/some-provisioner1"), "Delete", "storageClass1", "Released");
        assert!(gate.evaluate(&pv, Some(&sc)).passed());

        let pv = volume(Some("some-vendor/some-provisioner1"), "Retain", "storageClass1", "Released");
        let verdict = gate.evaluate(&pv, Some(&sc));
        assert!(!verdict.passed());
        assert_eq!(verdict.failed(), vec!["reclaim-policy-delete"]);
    }

    #[test]
    fn test_bound_volume_never_passes() {
        let sc = class("storageClass1", "some-vendor/some-provisioner1");
        let pv = volume(Some("some-vendor/some-provisioner1"), "Delete", "storageClass1", "Bound");
        let verdict = volume_gatekeeper().evaluate(&pv, Some(&sc));
        assert!(!verdict.passed());
        assert!(!verdict.check(Check::Released));
    }
}
