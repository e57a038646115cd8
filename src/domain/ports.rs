//! Domain Ports - Core types and trait definitions for the provisioner
//!
//! These traits define the boundaries between the reconciliation logic and the
//! collaborators it does not own: the delivery cache that hands out the
//! current state of an object by key, and the object store that persists
//! PersistentVolume records.

use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Reclaim Policy
// =============================================================================

/// PersistentVolume reclaim policy literals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReclaimPolicy {
    #[default]
    Delete,
    Retain,
    Recycle,
}

impl ReclaimPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReclaimPolicy::Delete => "Delete",
            ReclaimPolicy::Retain => "Retain",
            ReclaimPolicy::Recycle => "Recycle",
        }
    }
}

impl std::fmt::Display for ReclaimPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReclaimPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Delete" => Ok(ReclaimPolicy::Delete),
            "Retain" => Ok(ReclaimPolicy::Retain),
            "Recycle" => Ok(ReclaimPolicy::Recycle),
            other => Err(Error::Configuration(format!(
                "unknown reclaim policy: {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Asset Owner
// =============================================================================

/// Numeric owner applied to a freshly created asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetOwner {
    pub uid: u32,
    pub gid: u32,
}

impl AssetOwner {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }
}

impl std::fmt::Display for AssetOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

// =============================================================================
// Object Keys
// =============================================================================

/// Key of a delivered object: `namespace/name` for namespaced kinds,
/// plain `name` for cluster-scoped ones
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of a kube resource, as the delivery cache indexes it
    pub fn of<K: kube::Resource>(obj: &K) -> Result<Self> {
        let meta = obj.meta();
        let name = meta
            .name
            .clone()
            .ok_or_else(|| Error::InvalidObjectKey("object without a name".into()))?;
        Ok(Self {
            namespace: meta.namespace.clone(),
            name,
        })
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl std::str::FromStr for ObjectKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(ObjectKey::cluster(*name)),
            [ns, name] if !ns.is_empty() && !name.is_empty() => {
                Ok(ObjectKey::namespaced(*ns, *name))
            }
            _ => Err(Error::InvalidObjectKey(s.to_string())),
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Outcome of a reconciliation attempt that did not fail.
///
/// A failed attempt is an `Err`, which the delivery runner retries later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The side effect was performed
    Success,
    /// Not a candidate for this provisioner, or gone; acknowledge and forget
    Ignore,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Ignore => write!(f, "ignore"),
        }
    }
}

// =============================================================================
// Object Source Port
// =============================================================================

/// Port for fetching the current state of an object by key
pub trait ObjectSource<K>: Send + Sync {
    /// Current state of the object, or `None` if it no longer exists
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>>;
}

// =============================================================================
// Volume Store Port
// =============================================================================

/// Port for persisting PersistentVolume records
#[async_trait]
pub trait VolumeStore: Send + Sync {
    /// Create a new PersistentVolume record
    async fn create_volume(&self, volume: PersistentVolume) -> Result<()>;

    /// Delete a PersistentVolume record; an absent record is not an error
    async fn delete_volume(&self, name: &str) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type VolumeStoreRef = Arc<dyn VolumeStore>;
