//! Reconciliation metrics

use crate::domain::ports::Outcome;
use crate::error::{Error, Result};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::time::Duration;

/// Per-controller delivery counters and latency
#[derive(Clone)]
pub struct ReconcileMetrics {
    reconciles: IntCounterVec,
    duration: HistogramVec,
}

impl ReconcileMetrics {
    /// Create the collectors and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let reconciles = IntCounterVec::new(
            Opts::new(
                "asset_provisioner_reconcile_total",
                "Reconciliation attempts by controller and outcome",
            ),
            &["controller", "outcome"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "asset_provisioner_reconcile_duration_seconds",
                "Duration of reconciliation attempts",
            ),
            &["controller"],
        )?;

        registry.register(Box::new(reconciles.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            reconciles,
            duration,
        })
    }

    /// Record one attempt of `controller`
    pub fn observe(&self, controller: &str, result: &std::result::Result<Outcome, Error>, elapsed: Duration) {
        let outcome = match result {
            Ok(Outcome::Success) => "success",
            Ok(Outcome::Ignore) => "ignore",
            Err(_) => "retry",
        };
        self.reconciles
            .with_label_values(&[controller, outcome])
            .inc();
        self.duration
            .with_label_values(&[controller])
            .observe(elapsed.as_secs_f64());
    }

    pub fn reconciles(&self, controller: &str, outcome: &str) -> u64 {
        self.reconciles
            .with_label_values(&[controller, outcome])
            .get()
    }
}
