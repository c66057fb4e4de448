//! In-process gRPC listeners for connection tests.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
};

use meshlink_types::Address;
use tokio::sync::oneshot;
use tonic::transport::Server;
use tonic_health::{ServingStatus, server::HealthReporter};

/// A tonic server exposing `grpc.health.v1.Health` on loopback.
///
/// Shuts down when dropped.
pub struct TestServer {
    local_addr: SocketAddr,
    reporter: HealthReporter,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Starts a server on an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the listener cannot be bound.
    pub async fn start() -> io::Result<Self> {
        Self::start_on_port(0).await
    }

    /// Starts a server on a specific port; 0 lets the OS choose.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the listener cannot be bound.
    pub async fn start_on_port(port: u16) -> io::Result<Self> {
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await?;
        let local_addr = listener.local_addr()?;

        let (mut reporter, health_service) = tonic_health::server::health_reporter();
        reporter.set_service_status("", ServingStatus::Serving).await;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
        tokio::spawn(async move {
            let result = Server::builder()
                .add_service(health_service)
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = shutdown_rx.await;
                })
                .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "test server error");
            }
        });

        Ok(Self { local_addr, reporter, shutdown_tx: Some(shutdown_tx) })
    }

    /// The bound port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// The bound address as `127.0.0.1:port`.
    #[must_use]
    pub fn address(&self) -> Address {
        Address::new(self.local_addr.ip().to_string(), self.port())
    }

    /// The `http://` endpoint URI.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Flips the server-wide health status reported to probes.
    pub async fn set_serving(&self, serving: bool) {
        let status = if serving { ServingStatus::Serving } else { ServingStatus::NotServing };
        let mut reporter = self.reporter.clone();
        reporter.set_service_status("", status).await;
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
