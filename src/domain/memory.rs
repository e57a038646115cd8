//! In-memory adapters for the domain ports
//!
//! Used by the handler tests and the benches; they behave like the kube
//! adapters minus the network.

use crate::domain::ports::{ObjectKey, ObjectSource, VolumeStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// Memory Object Source
// =============================================================================

/// Object cache backed by a map
pub struct MemoryObjectSource<K> {
    objects: RwLock<BTreeMap<ObjectKey, Arc<K>>>,
}

impl<K> Default for MemoryObjectSource<K> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K: kube::Resource> MemoryObjectSource<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object under its own key
    pub fn insert(&self, obj: K) -> Result<ObjectKey> {
        let key = ObjectKey::of(&obj)?;
        self.objects.write().insert(key.clone(), Arc::new(obj));
        Ok(key)
    }

    pub fn remove(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.objects.write().remove(key)
    }
}

impl<K: Send + Sync> ObjectSource<K> for MemoryObjectSource<K> {
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.objects.read().get(key).cloned()
    }
}

// =============================================================================
// Memory Volume Store
// =============================================================================

/// Volume store that keeps records in a map and can be told to fail
#[derive(Default)]
pub struct MemoryVolumeStore {
    volumes: RwLock<BTreeMap<String, PersistentVolume>>,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
}

impl MemoryVolumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `create_volume` calls fail
    pub fn fail_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `delete_volume` calls fail
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, name: &str) -> Option<PersistentVolume> {
        self.volumes.read().get(name).cloned()
    }

    pub fn insert(&self, volume: PersistentVolume) {
        let name = volume.metadata.name.clone().unwrap_or_default();
        self.volumes.write().insert(name, volume);
    }

    pub fn len(&self) -> usize {
        self.volumes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.read().is_empty()
    }
}

#[async_trait]
impl VolumeStore for MemoryVolumeStore {
    async fn create_volume(&self, volume: PersistentVolume) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::VolumeStore("injected create failure".into()));
        }

        let name = volume
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::VolumeStore("volume without a name".into()))?;

        let mut volumes = self.volumes.write();
        if volumes.contains_key(&name) {
            return Err(Error::ResourceExists {
                kind: "PersistentVolume".into(),
                name,
            });
        }
        volumes.insert(name, volume);
        Ok(())
    }

    async fn delete_volume(&self, name: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::VolumeStore("injected delete failure".into()));
        }

        self.volumes.write().remove(name);
        Ok(())
    }
}
