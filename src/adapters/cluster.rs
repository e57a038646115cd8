//! Kubernetes adapters for the domain ports

use crate::config::ClassRegistry;
use crate::domain::ports::{ObjectKey, ObjectSource, VolumeStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client, Config, Resource, ResourceExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Client
// =============================================================================

/// Client from an explicit kubeconfig file, or the in-cluster/default
/// configuration when none is given
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        return Ok(Client::try_default().await?);
    };

    info!("Using kubeconfig {}", path.display());
    let kubeconfig = Kubeconfig::read_from(path)?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
    Ok(Client::try_from(config)?)
}

/// Resolve the `wanted` storage classes against the cluster
pub async fn load_class_registry(client: Client, wanted: &[String]) -> Result<ClassRegistry> {
    let api: Api<StorageClass> = Api::all(client);
    let classes = api.list(&ListParams::default()).await?;
    debug!("Found {} storage classes in the cluster", classes.items.len());
    ClassRegistry::from_storage_classes(&classes.items, wanted)
}

// =============================================================================
// Reflector Cache
// =============================================================================

impl<K> ObjectSource<K> for Store<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        let mut obj_ref = ObjectRef::<K>::new(&key.name);
        if let Some(namespace) = &key.namespace {
            obj_ref = obj_ref.within(namespace);
        }
        Store::get(self, &obj_ref)
    }
}

// =============================================================================
// Volume Store
// =============================================================================

/// PersistentVolume records persisted through the API server
#[derive(Clone)]
pub struct KubeVolumeStore {
    api: Api<PersistentVolume>,
}

impl KubeVolumeStore {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl VolumeStore for KubeVolumeStore {
    async fn create_volume(&self, volume: PersistentVolume) -> Result<()> {
        match self.api.create(&PostParams::default(), &volume).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 409 => Err(Error::ResourceExists {
                kind: "PersistentVolume".into(),
                name: volume.name_any(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_volume(&self, name: &str) -> Result<()> {
        match self.api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                debug!("PersistentVolume {} already deleted", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PersistentVolumeClaim;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kube::runtime::reflector::store::Writer;
    use kube::runtime::watcher::Event;

    fn claim(namespace: &str, name: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some(namespace.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_store_lookup_by_key() {
        let mut writer: Writer<PersistentVolumeClaim> = Writer::default();
        writer.apply_watcher_event(&Event::Applied(claim("ns1", "data")));
        let store = writer.as_reader();

        let found = ObjectSource::get(&store, &ObjectKey::namespaced("ns1", "data")).unwrap();
        assert_eq!(found.name_any(), "data");

        assert!(ObjectSource::get(&store, &ObjectKey::namespaced("ns2", "data")).is_none());
        assert!(ObjectSource::get(&store, &ObjectKey::cluster("data")).is_none());
    }

    #[test]
    fn test_store_lookup_cluster_scoped() {
        let mut writer: Writer<PersistentVolume> = Writer::default();
        writer.apply_watcher_event(&Event::Applied(PersistentVolume {
            metadata: ObjectMeta {
                name: Some("pv-1".into()),
                ..Default::default()
            },
            ..Default::default()
        }));
        let store = writer.as_reader();

        assert!(ObjectSource::get(&store, &ObjectKey::cluster("pv-1")).is_some());
    }
}
