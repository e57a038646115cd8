//! Storage Class Registry
//!
//! The set of storage classes this provisioner serves, resolved once at
//! startup either from the cluster's StorageClass objects or from a YAML
//! file, and shared read-only between both handlers afterwards.

use crate::config::annotations::{PARAM_ASSET_ROOT, PARAM_DEFAULT_OWNER_GID, PARAM_DEFAULT_OWNER_UID};
use crate::domain::ports::{AssetOwner, ReclaimPolicy};
use crate::error::{Error, Result};
use k8s_openapi::api::storage::v1::StorageClass;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, warn};

// =============================================================================
// Storage Class Record
// =============================================================================

/// Resolved configuration of one served storage class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassRecord {
    /// Storage class name, as referenced by claims and volumes
    pub name: String,
    /// Provisioner id written to `provisioned-by`
    pub provisioner: String,
    /// Reclaim policy applied when a claim does not override it
    #[serde(default)]
    pub reclaim_policy: ReclaimPolicy,
    /// Default uid of new assets
    #[serde(rename = "defaultOwnerAssetUid")]
    pub default_owner_uid: u32,
    /// Default gid of new assets
    #[serde(rename = "defaultOwnerAssetGid")]
    pub default_owner_gid: u32,
    /// Asset root as seen by volume consumers; `server:/export` for NFS
    pub asset_root: String,
}

impl StorageClassRecord {
    /// Parse a cluster StorageClass
    pub fn from_storage_class(class: &StorageClass) -> Result<Self> {
        let name = class
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::Configuration("storage class without a name".into()))?;

        let empty = BTreeMap::new();
        let params = class.parameters.as_ref().unwrap_or(&empty);

        let reclaim_policy = match class.reclaim_policy.as_deref() {
            Some(value) => value.parse()?,
            None => ReclaimPolicy::Delete,
        };

        Ok(Self {
            default_owner_uid: parse_id_parameter(&name, params, PARAM_DEFAULT_OWNER_UID)?,
            default_owner_gid: parse_id_parameter(&name, params, PARAM_DEFAULT_OWNER_GID)?,
            asset_root: required_parameter(&name, params, PARAM_ASSET_ROOT)?.to_string(),
            provisioner: class.provisioner.clone(),
            reclaim_policy,
            name,
        })
    }

    pub fn default_owner(&self) -> AssetOwner {
        AssetOwner::new(self.default_owner_uid, self.default_owner_gid)
    }
}

fn required_parameter<'a>(
    class: &str,
    params: &'a BTreeMap<String, String>,
    key: &str,
) -> Result<&'a str> {
    params.get(key).map(String::as_str).ok_or_else(|| {
        Error::Configuration(format!(
            "parameter '{}' in storage class '{}' must be defined",
            key, class
        ))
    })
}

fn parse_id_parameter(class: &str, params: &BTreeMap<String, String>, key: &str) -> Result<u32> {
    let raw = required_parameter(class, params, key)?;
    raw.parse::<u32>().map_err(|e| {
        Error::Configuration(format!(
            "parameter '{}' in storage class '{}' is not a valid id: {}: {}",
            key, class, raw, e
        ))
    })
}

// =============================================================================
// Class Registry
// =============================================================================

/// Served storage classes keyed by name; immutable once built
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: BTreeMap<String, StorageClassRecord>,
}

impl ClassRegistry {
    pub fn new(records: impl IntoIterator<Item = StorageClassRecord>) -> Self {
        let classes = records
            .into_iter()
            .map(|record| {
                if record.asset_root.matches(':').count() > 1 {
                    warn!(
                        "Storage class {} has malformed assetRoot {}; its claims will not be provisioned",
                        record.name, record.asset_root
                    );
                }
                (record.name.clone(), record)
            })
            .collect();
        Self { classes }
    }

    /// Select the `wanted` classes out of the cluster's list.
    ///
    /// Every wanted name must be present; the error lists all missing ones.
    pub fn from_storage_classes(cluster: &[StorageClass], wanted: &[String]) -> Result<Self> {
        let wanted: BTreeSet<&str> = wanted
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        let mut found = BTreeSet::new();
        let mut records = Vec::new();
        for class in cluster {
            let Some(name) = class.metadata.name.as_deref() else {
                continue;
            };
            if wanted.contains(name) {
                debug!("Selected storage class {}", name);
                found.insert(name);
                records.push(StorageClassRecord::from_storage_class(class)?);
            }
        }

        let missing: Vec<&str> = wanted.difference(&found).copied().collect();
        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "could not find specified storage classes: {}",
                missing.join(", ")
            )));
        }

        Ok(Self::new(records))
    }

    /// Parse a YAML list of class records
    pub fn from_yaml(source: &str) -> Result<Self> {
        let records: Vec<StorageClassRecord> = serde_yaml::from_str(source)?;
        Ok(Self::new(records))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let source = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_yaml(&source)
    }

    pub fn get(&self, name: &str) -> Option<&StorageClassRecord> {
        self.classes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn storage_class(name: &str, policy: Option<&str>, params: &[(&str, &str)]) -> StorageClass {
        StorageClass {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            provisioner: format!("some-vendor/{}", name),
            reclaim_policy: policy.map(String::from),
            parameters: Some(
                params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn full_params() -> Vec<(&'static str, &'static str)> {
        vec![
            ("defaultOwnerAssetUid", "1000"),
            ("defaultOwnerAssetGid", "1001"),
            ("assetRoot", "/mnt/nfs"),
        ]
    }

    #[test]
    fn test_parse_storage_class() {
        let record =
            StorageClassRecord::from_storage_class(&storage_class("sc1", Some("Retain"), &full_params()))
                .unwrap();

        assert_eq!(record.name, "sc1");
        assert_eq!(record.provisioner, "some-vendor/sc1");
        assert_eq!(record.reclaim_policy, ReclaimPolicy::Retain);
        assert_eq!(record.default_owner(), AssetOwner::new(1000, 1001));
        assert_eq!(record.asset_root, "/mnt/nfs");
    }

    #[test]
    fn test_missing_policy_defaults_to_delete() {
        let record =
            StorageClassRecord::from_storage_class(&storage_class("sc1", None, &full_params())).unwrap();
        assert_eq!(record.reclaim_policy, ReclaimPolicy::Delete);
    }

    #[test]
    fn test_missing_or_bad_parameters_rejected() {
        let class = storage_class("sc1", None, &[("defaultOwnerAssetUid", "1000")]);
        assert_matches!(
            StorageClassRecord::from_storage_class(&class),
            Err(Error::Configuration(msg)) if msg.contains("defaultOwnerAssetGid")
        );

        let class = storage_class(
            "sc1",
            None,
            &[
                ("defaultOwnerAssetUid", "FF"),
                ("defaultOwnerAssetGid", "1000"),
                ("assetRoot", "/x"),
            ],
        );
        assert_matches!(
            StorageClassRecord::from_storage_class(&class),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_select_classes() {
        let cluster = vec![
            storage_class("sc1", None, &full_params()),
            storage_class("sc2", None, &full_params()),
            storage_class("sc3", None, &full_params()),
        ];

        let registry =
            ClassRegistry::from_storage_classes(&cluster, &["sc2".into(), "sc1".into(), "".into()])
                .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["sc1", "sc2"]);
        assert!(registry.get("sc3").is_none());

        let err = ClassRegistry::from_storage_classes(
            &cluster,
            &["sc1".into(), "sc_absent".into(), "sc_gone".into()],
        )
        .unwrap_err();
        assert_matches!(err, Error::Configuration(msg) if msg.contains("sc_absent, sc_gone"));
    }

    #[test]
    fn test_registry_from_yaml() {
        let yaml = r#"
- name: local-class
  provisioner: some-vendor/local
  reclaimPolicy: Retain
  defaultOwnerAssetUid: 1000
  defaultOwnerAssetGid: 1000
  assetRoot: /mnt/pv-store
- name: nfs-class
  provisioner: some-vendor/nfs
  defaultOwnerAssetUid: 2000
  defaultOwnerAssetGid: 2000
  assetRoot: "nfs.local:/exports/pv"
"#;
        let registry = ClassRegistry::from_yaml(yaml).unwrap();
        assert_eq!(registry.len(), 2);

        let nfs = registry.get("nfs-class").unwrap();
        assert_eq!(nfs.reclaim_policy, ReclaimPolicy::Delete);
        assert_eq!(nfs.asset_root, "nfs.local:/exports/pv");
        assert_eq!(
            registry.get("local-class").unwrap().reclaim_policy,
            ReclaimPolicy::Retain
        );
    }

    #[tokio::test]
    async fn test_registry_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("classes.yaml");
        tokio::fs::write(
            &path,
            "- {name: c, provisioner: p, defaultOwnerAssetUid: 1, defaultOwnerAssetGid: 2, assetRoot: /r}\n",
        )
        .await
        .unwrap();

        let registry = ClassRegistry::from_file(&path).await.unwrap();
        assert_eq!(registry.get("c").unwrap().default_owner(), AssetOwner::new(1, 2));
    }
}
