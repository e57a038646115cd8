//! Provisioning Handler
//!
//! Turns an eligible PersistentVolumeClaim into a directory on disk plus a
//! PersistentVolume record pointing at it. The directory is always created
//! before the record is submitted.

use crate::asset::{AssetManager, ProvisionPlan, VolumeSource};
use crate::config::annotations::{PROVISIONED_BY, STORAGE_CLASS};
use crate::config::{ClassRegistry, ProvisionerConfig, StorageClassRecord};
use crate::controller::Reconciler;
use crate::domain::ports::{ObjectKey, ObjectSource, Outcome, VolumeStoreRef};
use crate::error::{Error, Result};
use crate::gate::claim::claim_class_name;
use crate::gate::{claim_gatekeeper, Check, Gatekeeper};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    HostPathVolumeSource, NFSVolumeSource, ObjectReference, PersistentVolume,
    PersistentVolumeClaim, PersistentVolumeSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const KIND: &str = "PersistentVolumeClaim";

/// Checks that must pass for a failing claim to still count as ours
const CANDIDATE_CHECKS: &[Check] = &[Check::NotBound, Check::KnownStorageClass];

/// Claim-side reconciliation handler
pub struct ProvisionHandler {
    registry: Arc<ClassRegistry>,
    config: ProvisionerConfig,
    assets: AssetManager,
    claims: Arc<dyn ObjectSource<PersistentVolumeClaim>>,
    volumes: VolumeStoreRef,
    gate: Gatekeeper<PersistentVolumeClaim>,
}

impl ProvisionHandler {
    pub fn new(
        registry: Arc<ClassRegistry>,
        config: ProvisionerConfig,
        claims: Arc<dyn ObjectSource<PersistentVolumeClaim>>,
        volumes: VolumeStoreRef,
    ) -> Self {
        Self {
            assets: AssetManager::new(config.dir_mode),
            registry,
            config,
            claims,
            volumes,
            gate: claim_gatekeeper(),
        }
    }

    /// Reconcile the claim stored under `key`
    pub async fn provision(&self, key: &ObjectKey) -> Result<Outcome> {
        let Some(pvc) = self.claims.get(key) else {
            warn!("PersistentVolumeClaim {} does not exist anymore", key);
            return Ok(Outcome::Ignore);
        };

        let class = claim_class_name(&pvc).and_then(|name| self.registry.get(name));
        let verdict = self.gate.evaluate(&pvc, class);

        if !verdict.passed() {
            if verdict.all_of(CANDIDATE_CHECKS) {
                return Err(Error::CandidateBlocked {
                    kind: KIND,
                    name: key.to_string(),
                    failed: verdict.failed(),
                });
            }
            debug!("PersistentVolumeClaim {} is not a candidate: {:?}", key, verdict.failed());
            return Ok(Outcome::Ignore);
        }

        let class = class.ok_or_else(|| {
            Error::Internal(format!("claim {} passed gating without a storage class", key))
        })?;

        info!("PersistentVolumeClaim {} looks like a candidate for provisioning", key);

        let plan = ProvisionPlan::for_claim(&pvc, class, &self.config.asset_root)?;
        let path = plan.location.local_path.as_path();

        if let Err(e) = self.assets.create(path, plan.owner, plan.reuse_existing).await {
            if matches!(e, Error::AssetOwnership { .. }) && !plan.reuse_existing {
                self.assets.compensate(path).await;
            }
            error!("Provisioning for PersistentVolumeClaim {} failed: {}", key, e);
            return Err(e);
        }

        let volume = build_volume(&pvc, class, &plan);
        if let Err(e) = self.volumes.create_volume(volume).await {
            // The name is held by another record, which may own this directory
            if !plan.reuse_existing && !matches!(e, Error::ResourceExists { .. }) {
                self.assets.compensate(path).await;
            }
            error!("PersistentVolume {} could not be created: {}", plan.name, e);
            return Err(e);
        }

        info!(
            "PersistentVolume {} created for PersistentVolumeClaim {}",
            plan.name, key
        );
        Ok(Outcome::Success)
    }
}

#[async_trait]
impl Reconciler for ProvisionHandler {
    fn controller(&self) -> &'static str {
        KIND
    }

    async fn handle(&self, key: &ObjectKey) -> Result<Outcome> {
        self.provision(key).await
    }
}

/// PersistentVolume record for `plan`, bound to `pvc`
pub fn build_volume(
    pvc: &PersistentVolumeClaim,
    class: &StorageClassRecord,
    plan: &ProvisionPlan,
) -> PersistentVolume {
    let claim_spec = pvc.spec.clone().unwrap_or_default();

    let annotations = BTreeMap::from([
        (PROVISIONED_BY.to_string(), class.provisioner.clone()),
        (STORAGE_CLASS.to_string(), class.name.clone()),
    ]);

    let (host_path, nfs) = match &plan.location.source {
        VolumeSource::HostPath { path } => (
            Some(HostPathVolumeSource {
                path: path.clone(),
                type_: Some("Directory".into()),
            }),
            None,
        ),
        VolumeSource::Nfs { server, path } => (
            None,
            Some(NFSVolumeSource {
                server: server.clone(),
                path: path.clone(),
                read_only: Some(false),
            }),
        ),
    };

    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(plan.name.clone()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(PersistentVolumeSpec {
            storage_class_name: Some(class.name.clone()),
            access_modes: claim_spec.access_modes,
            capacity: claim_spec.resources.and_then(|r| r.requests),
            volume_mode: claim_spec.volume_mode,
            persistent_volume_reclaim_policy: Some(plan.reclaim_policy.to_string()),
            claim_ref: Some(ObjectReference {
                api_version: Some("v1".into()),
                kind: Some(KIND.into()),
                name: pvc.metadata.name.clone(),
                namespace: pvc.metadata.namespace.clone(),
                uid: pvc.metadata.uid.clone(),
                ..Default::default()
            }),
            host_path,
            nfs,
            ..Default::default()
        }),
        status: None,
    }
}
