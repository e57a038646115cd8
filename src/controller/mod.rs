//! Reconciliation Controllers
//!
//! Two handlers share one shape: take an [`ObjectKey`], look the object up
//! in the delivery cache, gate it, perform the side effects and report an
//! [`Outcome`]. An `Err` means "deliver this key again later".
//!
//! - [`provision`]: PersistentVolumeClaim to asset plus PersistentVolume
//! - [`deprovision`]: released PersistentVolume to nothing
//! - [`runner`]: at-least-once delivery on top of `kube::runtime`
//! - [`metrics`]: Prometheus collectors for the runner

pub mod deprovision;
pub mod metrics;
pub mod provision;
pub mod runner;

pub use deprovision::DeprovisionHandler;
pub use metrics::ReconcileMetrics;
pub use provision::ProvisionHandler;
pub use runner::{run, Context};

use crate::domain::ports::{ObjectKey, Outcome};
use crate::error::Result;
use async_trait::async_trait;

/// A key-driven reconciliation handler
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Name used in logs and metric labels
    fn controller(&self) -> &'static str;

    /// Reconcile the object currently stored under `key`
    async fn handle(&self, key: &ObjectKey) -> Result<Outcome>;
}
