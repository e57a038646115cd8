//! Delivery Runner
//!
//! Wires a [`Reconciler`] to a `kube::runtime` controller. The controller
//! watches one resource kind, keeps the reflector cache the handler reads
//! from, and redelivers keys whose attempt failed. Retry timing comes from
//! [`Error::action`]: a per-key exponential backoff, or a fixed delay.

use crate::controller::{ReconcileMetrics, Reconciler};
use crate::domain::ports::{ObjectKey, ObjectSource, Outcome};
use crate::error::{Error, ErrorAction, Result};
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use dashmap::DashMap;
use futures::StreamExt;
use kube::runtime::controller::{self, Action};
use kube::runtime::{watcher, Controller};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// First retry delay of a failing key
pub const INITIAL_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound of the per-key retry delay
pub const MAX_RETRY_INTERVAL: Duration = Duration::from_secs(300);

// =============================================================================
// Context
// =============================================================================

/// Shared state of one controller: the handler, its metrics and the retry
/// state of every key currently failing
pub struct Context<R> {
    reconciler: R,
    metrics: Arc<ReconcileMetrics>,
    backoffs: DashMap<ObjectKey, ExponentialBackoff>,
}

impl<R: Reconciler> Context<R> {
    pub fn new(reconciler: R, metrics: Arc<ReconcileMetrics>) -> Arc<Self> {
        Arc::new(Self {
            reconciler,
            metrics,
            backoffs: DashMap::new(),
        })
    }

    pub fn reconciler(&self) -> &R {
        &self.reconciler
    }

    /// Run one attempt for `key`; a successful attempt clears its retry state
    pub async fn deliver(&self, key: &ObjectKey) -> Result<Outcome> {
        let controller = self.reconciler.controller();
        let started = Instant::now();
        let result = self.reconciler.handle(key).await;
        self.metrics.observe(controller, &result, started.elapsed());

        match &result {
            Ok(outcome) => {
                self.backoffs.remove(key);
                debug!("{} {} reconciled: {}", controller, key, outcome);
            }
            Err(e) if e.is_transient() => warn!("{} {} will be retried: {}", controller, key, e),
            Err(e) => info!("{} {} is waiting: {}", controller, key, e),
        }
        result
    }

    /// Delay before `key` is delivered again after `error`, or `None` when it
    /// should only come back on its next change
    pub fn retry_delay(&self, key: &ObjectKey, error: &Error) -> Option<Duration> {
        match error.action() {
            ErrorAction::NoRequeue => {
                self.backoffs.remove(key);
                None
            }
            ErrorAction::RequeueAfter(delay) => Some(delay),
            ErrorAction::RequeueWithBackoff => {
                let mut backoff = self.backoffs.entry(key.clone()).or_insert_with(new_backoff);
                Some(backoff.next_backoff().unwrap_or(MAX_RETRY_INTERVAL))
            }
        }
    }

    /// Drop the retry state of a key that will not be delivered again
    pub fn forget(&self, key: &ObjectKey) {
        if self.backoffs.remove(key).is_some() {
            debug!("{} {} is gone, retry state dropped", self.reconciler.controller(), key);
        }
    }

    /// Number of keys currently backing off
    pub fn failing_keys(&self) -> usize {
        self.backoffs.len()
    }
}

fn new_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(INITIAL_RETRY_INTERVAL)
        .with_max_interval(MAX_RETRY_INTERVAL)
        .with_max_elapsed_time(None)
        .build()
}

// =============================================================================
// Controller Wiring
// =============================================================================

/// Watch `api` and feed every changed object to the handler built by
/// `build`, until a termination signal arrives.
///
/// `build` receives the controller's reflector cache as the handler's
/// object source.
pub async fn run<K, R, F>(api: Api<K>, metrics: Arc<ReconcileMetrics>, build: F)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    R: Reconciler,
    F: FnOnce(Arc<dyn ObjectSource<K>>) -> R,
{
    let controller = Controller::new(api, watcher::Config::default());
    let ctx = Context::new(build(Arc::new(controller.store())), metrics);
    let name = ctx.reconciler().controller();

    let tracked = ctx.clone();

    info!("Starting {} controller", name);
    controller
        .shutdown_on_signal()
        .run(reconcile::<K, R>, error_policy::<K, R>, ctx)
        .for_each(|res| {
            if let Err(e) = res {
                if let Some(key) = deleted_key(&e) {
                    tracked.forget(&key);
                }
                debug!("{} delivery failed: {}", name, e);
            }
            futures::future::ready(())
        })
        .await;
    info!("{} controller stopped", name);
}

async fn reconcile<K, R>(obj: Arc<K>, ctx: Arc<Context<R>>) -> Result<Action>
where
    K: Resource,
    R: Reconciler,
{
    let key = ObjectKey::of(obj.as_ref())?;
    ctx.deliver(&key).await?;
    Ok(Action::await_change())
}

fn error_policy<K, R>(obj: Arc<K>, error: &Error, ctx: Arc<Context<R>>) -> Action
where
    K: Resource,
    R: Reconciler,
{
    let delay = ObjectKey::of(obj.as_ref())
        .ok()
        .and_then(|key| ctx.retry_delay(&key, error));

    match delay {
        Some(delay) => Action::requeue(delay),
        None => Action::await_change(),
    }
}

/// Key of an object that vanished from the cache before its redelivery
fn deleted_key<E1, E2>(error: &controller::Error<E1, E2>) -> Option<ObjectKey>
where
    E1: std::error::Error + 'static,
    E2: std::error::Error + 'static,
{
    match error {
        controller::Error::ObjectNotFound(obj_ref) => Some(ObjectKey {
            namespace: obj_ref.namespace.clone(),
            name: obj_ref.name.clone(),
        }),
        _ => None,
    }
}
