//! Claim-side checks

use crate::config::annotations::{STORAGE_CLASS, STORAGE_PROVISIONER};
use crate::config::StorageClassRecord;
use crate::gate::{Check, Gatekeeper};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use tracing::debug;

/// Storage class a claim asks for: `spec.storageClassName`, else the legacy
/// beta annotation
pub fn claim_class_name(pvc: &PersistentVolumeClaim) -> Option<&str> {
    pvc.spec
        .as_ref()
        .and_then(|spec| spec.storage_class_name.as_deref())
        .or_else(|| pvc.annotations().get(STORAGE_CLASS).map(String::as_str))
}

pub fn not_bound(pvc: &PersistentVolumeClaim, _: Option<&StorageClassRecord>) -> bool {
    let bound_to = pvc
        .spec
        .as_ref()
        .and_then(|spec| spec.volume_name.as_deref())
        .filter(|name| !name.is_empty());

    match bound_to {
        None => true,
        Some(volume) => {
            debug!(
                "PersistentVolumeClaim {} already bound to volume {}",
                pvc.name_any(),
                volume
            );
            false
        }
    }
}

pub fn known_storage_class(pvc: &PersistentVolumeClaim, class: Option<&StorageClassRecord>) -> bool {
    if class.is_some() {
        return true;
    }

    debug!(
        "PersistentVolumeClaim {} asks for storage class {:?} which is not served here",
        pvc.name_any(),
        claim_class_name(pvc)
    );
    false
}

pub fn no_selector(pvc: &PersistentVolumeClaim, _: Option<&StorageClassRecord>) -> bool {
    let selector = pvc.spec.as_ref().and_then(|spec| spec.selector.as_ref());
    let non_empty = selector.is_some_and(|s| {
        s.match_labels.as_ref().is_some_and(|m| !m.is_empty())
            || s.match_expressions.as_ref().is_some_and(|e| !e.is_empty())
    });

    if non_empty {
        debug!(
            "PersistentVolumeClaim {} must not have a selector in order to be provisioned",
            pvc.name_any()
        );
        return false;
    }
    true
}

pub fn provisioner_annotation(pvc: &PersistentVolumeClaim, class: Option<&StorageClassRecord>) -> bool {
    let declared = pvc.annotations().get(STORAGE_PROVISIONER);
    if let (Some(declared), Some(class)) = (declared, class) {
        if *declared == class.provisioner {
            return true;
        }
    }

    debug!(
        "PersistentVolumeClaim {} does not carry annotation {} for this provisioner",
        pvc.name_any(),
        STORAGE_PROVISIONER
    );
    false
}

/// Checks a claim must pass before a volume is provisioned for it
pub fn claim_gatekeeper() -> Gatekeeper<PersistentVolumeClaim> {
    Gatekeeper::new()
        .check(Check::NotBound, not_bound)
        .check(Check::KnownStorageClass, known_storage_class)
        .check(Check::NoSelector, no_selector)
        .check(Check::ProvisionerAnnotation, provisioner_annotation)
}
