//! Controller-specific error types.
//!
//! This module defines error types specific to the MinIO Bucket Controller
//! that are not covered by upstream library errors.

use kube::Error as KubeError;
use minio_client::MinIOError;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that can occur in the MinIO Bucket Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Backend call failed while converging the bucket
    #[error("Convergence failed: {0}")]
    ConvergenceFailed(#[from] MinIOError),

    /// Selector matched more than one MinIOInstance
    #[error("Ambiguous backend: {0}")]
    AmbiguousBackend(String),

    /// Backend service, replica or credentials are missing
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Tunnel did not become ready in time
    #[error("Tunnel not ready after {0:?}")]
    ConnectivityTimeout(Duration),

    /// Optimistic write lost against a concurrent update
    #[error("Conflict persisting {0}")]
    PersistConflict(String),

    /// Local socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Queue key is not "namespace/name"
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Informer cache never completed its initial list
    #[error("Cache sync failed: {0}")]
    CacheSync(String),

    /// Shutdown interrupted the operation
    #[error("Cancelled")]
    Cancelled,
}

impl ControllerError {
    /// Errors that will not clear without a human changing something.
    /// These are retried on a slow schedule.
    pub fn is_configuration_defect(&self) -> bool {
        matches!(self, ControllerError::AmbiguousBackend(_))
    }

    /// Log a failed reconcile at the severity of its class
    pub fn log(&self, key: &str) {
        match self {
            ControllerError::AmbiguousBackend(_) | ControllerError::ConvergenceFailed(_) => {
                warn!("Failed to reconcile MinIOBucket {}: {}", key, self);
            }
            ControllerError::BackendUnavailable(_)
            | ControllerError::ConnectivityTimeout(_)
            | ControllerError::PersistConflict(_)
            | ControllerError::Cancelled => {
                info!("Reconcile of MinIOBucket {} deferred: {}", key, self);
            }
            _ => {
                error!("Failed to reconcile MinIOBucket {}: {}", key, self);
            }
        }
    }
}
