//! Reaching a MinIOInstance over the network.
//!
//! In-cluster, the instance's headless service name resolves directly. From
//! outside the cluster, a port-forward tunnel to one running replica is
//! opened for the duration of a single reconcile pass.

use crate::error::ControllerError;
use crate::store::ResourceStore;
use crate::tunnel::{PortForwarder, Tunnel};
use crds::MinIOInstance;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How long a tunnel may take to become ready
pub const TUNNEL_READY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityMode {
    /// Service DNS names resolve; talk to the service directly
    InCluster,
    /// Port-forward to a pod through the API server
    Tunnel,
}

/// A reachable address for a backend, owned by one reconcile pass
pub enum BackendEndpoint {
    Direct { address: String },
    Tunneled(Tunnel),
}

impl BackendEndpoint {
    /// `host:port` to hand to the backend client
    pub fn address(&self) -> String {
        match self {
            BackendEndpoint::Direct { address } => address.clone(),
            BackendEndpoint::Tunneled(tunnel) => tunnel.local_addr().to_string(),
        }
    }

    /// Release the endpoint. Closing a direct endpoint is a no-op.
    pub async fn close(self) {
        if let BackendEndpoint::Tunneled(tunnel) = self {
            tunnel.close().await;
        }
    }
}

/// Produces endpoints for MinIOInstances
pub struct Connectivity {
    mode: ConnectivityMode,
    store: Arc<dyn ResourceStore>,
    forwarder: Arc<dyn PortForwarder>,
    shutdown: CancellationToken,
    ready_timeout: Duration,
}

impl Connectivity {
    pub fn new(
        mode: ConnectivityMode,
        store: Arc<dyn ResourceStore>,
        forwarder: Arc<dyn PortForwarder>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            mode,
            store,
            forwarder,
            shutdown,
            ready_timeout: TUNNEL_READY_TIMEOUT,
        }
    }

    pub fn mode(&self) -> ConnectivityMode {
        self.mode
    }

    pub async fn open(&self, instance: &MinIOInstance) -> Result<BackendEndpoint, ControllerError> {
        let namespace = instance.namespace().unwrap_or_default();
        let service_name = instance.headless_service_name();

        let service = self
            .store
            .get_service(&namespace, &service_name)
            .await?
            .ok_or_else(|| {
                ControllerError::BackendUnavailable(format!(
                    "service {}/{} not found",
                    namespace, service_name
                ))
            })?;
        let spec = service.spec.unwrap_or_default();
        let port = spec
            .ports
            .as_ref()
            .and_then(|ports| ports.first())
            .map(|port| port.port)
            .ok_or_else(|| {
                ControllerError::BackendUnavailable(format!(
                    "service {}/{} exposes no ports",
                    namespace, service_name
                ))
            })?;

        if self.mode == ConnectivityMode::InCluster {
            return Ok(BackendEndpoint::Direct {
                address: format!("{}.{}.svc:{}", service_name, namespace, port),
            });
        }

        let port = u16::try_from(port).map_err(|_| {
            ControllerError::BackendUnavailable(format!(
                "service {}/{} has invalid port {}",
                namespace, service_name, port
            ))
        })?;
        let selector = spec.selector.unwrap_or_default();
        if selector.is_empty() {
            return Err(ControllerError::BackendUnavailable(format!(
                "service {}/{} has no pod selector",
                namespace, service_name
            )));
        }

        let pods = self.store.list_pods(&namespace, &selector).await?;
        let pod = pods
            .iter()
            .find(|pod| {
                pod.status
                    .as_ref()
                    .and_then(|status| status.phase.as_deref())
                    == Some("Running")
            })
            .map(|pod| pod.name_any())
            .ok_or_else(|| {
                ControllerError::BackendUnavailable(format!(
                    "no running replica of MinIOInstance {}/{}",
                    namespace,
                    instance.name_any()
                ))
            })?;

        debug!("Opening tunnel to pod {}/{}:{}", namespace, pod, port);
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(ControllerError::Cancelled),
            opened = tokio::time::timeout(self.ready_timeout, self.forwarder.open(&namespace, &pod, port)) => {
                match opened {
                    Ok(tunnel) => Ok(BackendEndpoint::Tunneled(tunnel?)),
                    Err(_) => Err(ControllerError::ConnectivityTimeout(self.ready_timeout)),
                }
            }
        }
    }
}
