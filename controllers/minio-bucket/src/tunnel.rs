//! Pod port-forward tunnels for running outside the cluster.
//!
//! A tunnel listens on an ephemeral `127.0.0.1` port and forwards every
//! accepted connection to the target pod through the API server. Tunnels
//! belong to a single reconcile pass and are closed when it ends.

use crate::error::ControllerError;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// An open forwarding channel to a pod port
pub struct Tunnel {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Tunnel {
    /// `task` must stop once `shutdown` is cancelled
    pub fn new(local_addr: SocketAddr, shutdown: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            local_addr,
            shutdown,
            task: Some(task),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop forwarding and wait for in-flight connections to be torn down
    pub async fn close(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Tunnel on {} did not shut down cleanly: {}", self.local_addr, e);
            }
        }
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Opens tunnels to pods
#[async_trait::async_trait]
pub trait PortForwarder: Send + Sync {
    /// Open a tunnel to `port` of `pod`. Returns once the tunnel is ready
    /// to accept connections.
    async fn open(&self, namespace: &str, pod: &str, port: u16) -> Result<Tunnel, ControllerError>;
}

/// [`PortForwarder`] using the API server's pods/portforward subresource
pub struct KubePortForwarder {
    client: Client,
}

impl KubePortForwarder {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl PortForwarder for KubePortForwarder {
    async fn open(&self, namespace: &str, pod: &str, port: u16) -> Result<Tunnel, ControllerError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        // The API server accepts the port-forward upgrade only for a pod it
        // can reach; a successful probe session is our readiness signal
        let mut probe = pods.portforward(pod, &[port]).await?;
        let probe_stream = probe.take_stream(port);
        drop(probe_stream);
        probe.abort();

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let local_addr = listener.local_addr()?;
        debug!(
            "Forwarding {} to pod {}/{}:{}",
            local_addr, namespace, pod, port
        );

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            pods,
            pod.to_string(),
            port,
            shutdown.clone(),
        ));

        Ok(Tunnel::new(local_addr, shutdown, task))
    }
}

async fn accept_loop(
    listener: TcpListener,
    pods: Api<Pod>,
    pod: String,
    port: u16,
    shutdown: CancellationToken,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    let pods = pods.clone();
                    let pod = pod.clone();
                    let shutdown = shutdown.clone();
                    connections.spawn(async move {
                        if let Err(e) = forward_connection(socket, &pods, &pod, port, &shutdown).await {
                            debug!("Forwarded connection from {} to {} ended: {}", peer, pod, e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Tunnel listener for pod {} failed: {}", pod, e);
                    break;
                }
            },
        }
    }

    connections.shutdown().await;
}

async fn forward_connection(
    mut socket: TcpStream,
    pods: &Api<Pod>,
    pod: &str,
    port: u16,
    shutdown: &CancellationToken,
) -> Result<(), ControllerError> {
    let mut forwarder = pods.portforward(pod, &[port]).await?;
    let mut upstream = forwarder.take_stream(port).ok_or_else(|| {
        ControllerError::BackendUnavailable(format!("port {} of pod {} not forwarded", port, pod))
    })?;

    let result = tokio::select! {
        _ = shutdown.cancelled() => Ok(()),
        copied = tokio::io::copy_bidirectional(&mut socket, &mut upstream) => copied.map(|_| ()),
    };

    drop(upstream);
    forwarder.abort();
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn idle_tunnel() -> (Tunnel, CancellationToken, Arc<AtomicBool>) {
        let shutdown = CancellationToken::new();
        let stopped = Arc::new(AtomicBool::new(false));
        let task = {
            let shutdown = shutdown.clone();
            let stopped = stopped.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                stopped.store(true, Ordering::SeqCst);
            })
        };
        let addr: SocketAddr = "127.0.0.1:40000".parse().expect("addr");
        (Tunnel::new(addr, shutdown.clone(), task), shutdown, stopped)
    }

    #[tokio::test]
    async fn test_close_stops_task() {
        let (tunnel, shutdown, stopped) = idle_tunnel();
        assert_eq!(tunnel.local_addr().port(), 40000);

        tunnel.close().await;
        assert!(shutdown.is_cancelled());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (tunnel, shutdown, _) = idle_tunnel();
        drop(tunnel);
        assert!(shutdown.is_cancelled());
    }
}
