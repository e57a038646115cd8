//! Error types for the Asset Provisioner
//!
//! Every failure a reconciliation attempt can produce is one of these
//! variants. None of them is fatal to the process: the delivery runner maps
//! each onto an [`ErrorAction`] and redelivers the key later.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage class {class} assetRoot must contain at most one colon, got: {asset_root}")]
    MalformedAssetRoot { class: String, asset_root: String },

    #[error("Invalid object key: {0}")]
    InvalidObjectKey(String),

    // =========================================================================
    // Gating Errors
    // =========================================================================
    #[error("{kind} {name} is a candidate but did not pass checks: {}", .failed.join(", "))]
    CandidateBlocked {
        kind: &'static str,
        name: String,
        failed: Vec<&'static str>,
    },

    // =========================================================================
    // Asset Errors
    // =========================================================================
    #[error("Storage asset {} already exists", .path.display())]
    AssetConflict { path: PathBuf },

    #[error("Storage asset {} {operation} failed: {source}", .path.display())]
    AssetIo {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage asset {} ownership {uid}:{gid} could not be set: {source}", .path.display())]
    AssetOwnership {
        path: PathBuf,
        uid: u32,
        gid: u32,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("Volume store error: {0}")]
    VolumeStore(String),

    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    // =========================================================================
    // Observability Errors
    // =========================================================================
    #[error("Metrics registration error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for changes
    NoRequeue,
}

impl Error {
    /// Build an [`Error::AssetIo`] for `path`
    pub fn asset_io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        Error::AssetIo {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // An existing asset needs an operator or a reuse annotation
            Error::AssetConflict { .. } => ErrorAction::RequeueAfter(Duration::from_secs(120)),

            // Cluster-side configuration may be fixed later
            Error::Configuration(_) | Error::MalformedAssetRoot { .. } => {
                ErrorAction::RequeueAfter(Duration::from_secs(60))
            }

            // The key itself can never resolve
            Error::InvalidObjectKey(_) => ErrorAction::NoRequeue,

            // Candidate waiting for another controller, IO and API failures
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Kube(_)
                | Error::VolumeStore(_)
                | Error::AssetIo { .. }
                | Error::AssetOwnership { .. }
        )
    }
}

/// Result type alias for the provisioner
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::AssetConflict {
            path: PathBuf::from("/pv-store/class/ns-app-vol"),
        };
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(120))
        );

        let err = Error::MalformedAssetRoot {
            class: "nfs".into(),
            asset_root: "a:b:c".into(),
        };
        assert_eq!(
            err.action(),
            ErrorAction::RequeueAfter(Duration::from_secs(60))
        );

        let err = Error::CandidateBlocked {
            kind: "PersistentVolumeClaim",
            name: "ns/app".into(),
            failed: vec!["provisioner-annotation"],
        };
        assert_eq!(err.action(), ErrorAction::RequeueWithBackoff);
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::asset_io(
            "/pv-store/x",
            "remove",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let config_err = Error::Configuration("missing assetRoot".into());
        assert!(config_err.is_retryable());
        assert!(!config_err.is_transient());

        let bad_key = Error::InvalidObjectKey("a/b/c".into());
        assert!(!bad_key.is_retryable());
    }

    #[test]
    fn test_candidate_blocked_message_lists_checks() {
        let err = Error::CandidateBlocked {
            kind: "PersistentVolume",
            name: "ns-app-vol".into(),
            failed: vec!["provisioned-by-annotation", "no-selector"],
        };
        let msg = err.to_string();
        assert!(msg.contains("provisioned-by-annotation, no-selector"));
    }
}
