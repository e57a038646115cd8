//! Eligibility Gating
//!
//! A [`Gatekeeper`] holds an ordered list of named predicates for one subject
//! kind. Evaluation runs every predicate, even after a failure, so callers can
//! tell "not a candidate at all" apart from "a candidate stuck on one check".
//!
//! - [`claim`]: checks a PersistentVolumeClaim must pass to be provisioned
//! - [`volume`]: checks a PersistentVolume must pass to be reclaimed

pub mod claim;
pub mod volume;

pub use claim::claim_gatekeeper;
pub use volume::volume_gatekeeper;

use crate::config::StorageClassRecord;
use std::collections::BTreeMap;

// =============================================================================
// Check Names
// =============================================================================

/// Name of an individual eligibility check
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Check {
    /// Claim has no bound volume yet
    NotBound,
    /// Subject's storage class is served by this provisioner
    KnownStorageClass,
    /// Claim carries no label selector
    NoSelector,
    /// Claim's storage-provisioner annotation names the class provisioner
    ProvisionerAnnotation,
    /// Volume is in phase Released
    Released,
    /// Volume's reclaim policy is Delete
    ReclaimPolicyDelete,
    /// Volume's provisioned-by annotation names the class provisioner
    ProvisionedByAnnotation,
}

impl Check {
    pub fn name(&self) -> &'static str {
        match self {
            Check::NotBound => "not-bound",
            Check::KnownStorageClass => "known-storage-class",
            Check::NoSelector => "no-selector",
            Check::ProvisionerAnnotation => "provisioner-annotation",
            Check::Released => "released",
            Check::ReclaimPolicyDelete => "reclaim-policy-delete",
            Check::ProvisionedByAnnotation => "provisioned-by-annotation",
        }
    }
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Gatekeeper
// =============================================================================

/// A predicate over a subject and its resolved storage class, if any
pub type Predicate<S> = fn(&S, Option<&StorageClassRecord>) -> bool;

/// Named predicate set for one subject kind
pub struct Gatekeeper<S> {
    checks: Vec<(Check, Predicate<S>)>,
}

impl<S> Default for Gatekeeper<S> {
    fn default() -> Self {
        Self { checks: Vec::new() }
    }
}

impl<S> Gatekeeper<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a named check
    pub fn check(mut self, check: Check, predicate: Predicate<S>) -> Self {
        self.checks.push((check, predicate));
        self
    }

    /// Names of the checks, in evaluation order
    pub fn checks(&self) -> impl Iterator<Item = Check> + '_ {
        self.checks.iter().map(|(check, _)| *check)
    }

    /// Run every predicate and record each result. A check registered more
    /// than once passes only if every one of its predicates passes.
    pub fn evaluate(&self, subject: &S, class: Option<&StorageClassRecord>) -> Verdict {
        let mut results = BTreeMap::new();
        for (check, predicate) in &self.checks {
            let ok = predicate(subject, class);
            results
                .entry(*check)
                .and_modify(|passed: &mut bool| *passed &= ok)
                .or_insert(ok);
        }
        Verdict { results }
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// Per-check results of one evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    results: BTreeMap<Check, bool>,
}

impl Verdict {
    /// AND of every check
    pub fn passed(&self) -> bool {
        self.results.values().all(|ok| *ok)
    }

    /// Result of one check; a check that was not part of the set fails
    pub fn check(&self, check: Check) -> bool {
        self.results.get(&check).copied().unwrap_or(false)
    }

    /// True when every listed check passed
    pub fn all_of(&self, checks: &[Check]) -> bool {
        checks.iter().all(|check| self.check(*check))
    }

    pub fn failed(&self) -> Vec<&'static str> {
        self.results
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(check, _)| check.name())
            .collect()
    }
}
