//! Asset Provisioner
//!
//! A Kubernetes provisioner that backs PersistentVolumes with plain
//! directories, either on a local hostPath mount or on an NFS export the
//! provisioner has mounted itself.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                    kube-runtime Controllers                           │
//! │   PersistentVolumeClaim watch          PersistentVolume watch         │
//! └───────────────┬───────────────────────────────────┬──────────────────┘
//!                 │ ObjectKey                         │ ObjectKey
//!        ┌────────┴─────────┐                ┌────────┴─────────┐
//!        │ ProvisionHandler │                │DeprovisionHandler│
//!        └────────┬─────────┘                └────────┬─────────┘
//!                 │                                   │
//!        ┌────────┴───────────────────────────────────┴─────────┐
//!        │  Gatekeeper  →  Resolver  →  AssetManager             │
//!        └────────┬───────────────────────────────────┬─────────┘
//!                 │                                   │
//!        ┌────────┴─────────┐                ┌────────┴─────────┐
//!        │  asset directory │                │ PersistentVolume │
//!        │  (hostPath/NFS)  │                │   VolumeStore    │
//!        └──────────────────┘                └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`]: kube-backed implementations of the domain ports
//! - [`asset`]: naming, ownership and filesystem lifecycle of assets
//! - [`config`]: served storage classes and provisioner settings
//! - [`controller`]: reconciliation handlers and their delivery runner
//! - [`domain`]: core types and ports
//! - [`error`]: error types and retry classification
//! - [`gate`]: eligibility checks for claims and volumes

pub mod adapters;
pub mod asset;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod gate;

// Re-export commonly used types
pub use adapters::KubeVolumeStore;

pub use asset::{derive_asset_name, AssetManager, ProvisionPlan};

pub use config::{ClassRegistry, ProvisionerConfig, StorageClassRecord};

pub use controller::{DeprovisionHandler, ProvisionHandler, ReconcileMetrics, Reconciler};

pub use domain::ports::{
    AssetOwner, ObjectKey, ObjectSource, Outcome, ReclaimPolicy, VolumeStore, VolumeStoreRef,
};

pub use error::{Error, ErrorAction, Result};

pub use gate::{claim_gatekeeper, volume_gatekeeper, Check, Gatekeeper, Verdict};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
