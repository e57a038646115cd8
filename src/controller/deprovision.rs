//! Deprovisioning Handler
//!
//! Reclaims the directory behind a released PersistentVolume whose reclaim
//! policy is Delete, then removes the volume record. The asset goes first so
//! a record is never dropped while its data is still on disk.

use crate::asset::{volume_local_path, AssetManager};
use crate::config::{ClassRegistry, ProvisionerConfig};
use crate::controller::Reconciler;
use crate::domain::ports::{ObjectKey, ObjectSource, Outcome, VolumeStoreRef};
use crate::error::{Error, Result};
use crate::gate::volume::volume_class_name;
use crate::gate::{volume_gatekeeper, Check, Gatekeeper};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const KIND: &str = "PersistentVolume";

const CANDIDATE_CHECKS: &[Check] = &[
    Check::Released,
    Check::KnownStorageClass,
    Check::ReclaimPolicyDelete,
];

/// Volume-side reconciliation handler
pub struct DeprovisionHandler {
    registry: Arc<ClassRegistry>,
    config: ProvisionerConfig,
    assets: AssetManager,
    volumes_cache: Arc<dyn ObjectSource<PersistentVolume>>,
    volumes: VolumeStoreRef,
    gate: Gatekeeper<PersistentVolume>,
}

impl DeprovisionHandler {
    pub fn new(
        registry: Arc<ClassRegistry>,
        config: ProvisionerConfig,
        volumes_cache: Arc<dyn ObjectSource<PersistentVolume>>,
        volumes: VolumeStoreRef,
    ) -> Self {
        Self {
            assets: AssetManager::new(config.dir_mode),
            registry,
            config,
            volumes_cache,
            volumes,
            gate: volume_gatekeeper(),
        }
    }

    /// Reconcile the volume stored under `key`
    pub async fn deprovision(&self, key: &ObjectKey) -> Result<Outcome> {
        let Some(pv) = self.volumes_cache.get(key) else {
            warn!("PersistentVolume {} does not exist anymore", key);
            return Ok(Outcome::Ignore);
        };

        let class = volume_class_name(&pv).and_then(|name| self.registry.get(name));
        let verdict = self.gate.evaluate(&pv, class);

        if !verdict.passed() {
            if verdict.all_of(CANDIDATE_CHECKS) {
                return Err(Error::CandidateBlocked {
                    kind: KIND,
                    name: key.to_string(),
                    failed: verdict.failed(),
                });
            }
            debug!("PersistentVolume {} is not a candidate: {:?}", key, verdict.failed());
            return Ok(Outcome::Ignore);
        }

        let class = class.ok_or_else(|| {
            Error::Internal(format!("volume {} passed gating without a storage class", key))
        })?;

        info!("PersistentVolume {} looks like a candidate for deletion", key);

        let path = volume_local_path(&self.config.asset_root, &class.name, &pv);
        if let Err(e) = self.assets.delete(&path).await {
            error!("Storage asset of PersistentVolume {} could not be deleted: {}", key, e);
            return Err(e);
        }

        let name = pv.name_any();
        if let Err(e) = self.volumes.delete_volume(&name).await {
            error!("PersistentVolume {} could not be deleted: {}", name, e);
            return Err(e);
        }

        info!("PersistentVolume {} and its storage asset deleted", name);
        Ok(Outcome::Success)
    }
}

#[async_trait]
impl Reconciler for DeprovisionHandler {
    fn controller(&self) -> &'static str {
        KIND
    }

    async fn handle(&self, key: &ObjectKey) -> Result<Outcome> {
        self.deprovision(key).await
    }
}
