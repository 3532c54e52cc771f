//! TCP listener for networked instruments.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{error, info};

use labwire_model::Device;

use crate::error::{DevSrvError, Result};
use crate::protocols::TcpDeviceHandler;

pub struct TcpDeviceServer {
    device: Device,
    handler: Arc<dyn TcpDeviceHandler>,
    shutdown: watch::Receiver<bool>,
}

impl TcpDeviceServer {
    pub fn new(
        device: Device,
        handler: Arc<dyn TcpDeviceHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        TcpDeviceServer {
            device,
            handler,
            shutdown,
        }
    }

    /// Bind the device's receive port and accept until shutdown.
    pub async fn run(self) -> Result<()> {
        let bind_addr = format!("0.0.0.0:{}", self.device.receive_port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| DevSrvError::connection(format!("failed to bind {bind_addr}: {e}")))?;
        info!(device = %self.device.name, %bind_addr, "device server listening");
        self.accept_loop(listener).await
    }

    /// Accept loop over an already-bound listener.
    ///
    /// Each connection runs in its own supervised task: a handler error or
    /// panic is logged and never takes the listener down.
    pub async fn accept_loop(mut self, listener: TcpListener) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    info!(device = %self.device.name, "device server stopping");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!(device = %self.device.name, %addr, "accepted connection");
                        spawn_supervised(
                            self.device.name.clone(),
                            self.handler.clone(),
                            stream,
                        );
                    }
                    Err(e) => {
                        error!(device = %self.device.name, error = %e, "failed to accept connection");
                    }
                },
            }
        }
    }
}

/// Run one connection to completion, observing the task so a panicking
/// handler surfaces in the log instead of dying silently.
fn spawn_supervised(device: String, handler: Arc<dyn TcpDeviceHandler>, stream: TcpStream) {
    let task = tokio::spawn(async move { handler.handle(stream).await });
    tokio::spawn(async move {
        match task.await {
            Ok(Ok(())) => info!(%device, "connection closed"),
            Ok(Err(e)) => error!(%device, error = %e, "connection handler failed"),
            Err(e) if e.is_panic() => error!(%device, "connection handler panicked"),
            Err(_) => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::CaptureAnalyzer;
    use crate::config::Hl7Identity;
    use crate::protocols::hlseven::HlSevenHandler;
    use async_trait::async_trait;
    use labwire_hl7::MllpConnection;
    use labwire_model::DeviceType;

    fn test_device() -> Device {
        Device {
            id: 1,
            name: "BA400-1".to_owned(),
            device_type: DeviceType::Ba400,
            receive_port: 0,
            serial_port: String::new(),
            baud_rate: 9600,
            send_host: String::new(),
            send_port: 0,
            enabled: true,
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl TcpDeviceHandler for PanickingHandler {
        async fn handle(&self, _stream: TcpStream) -> crate::error::Result<()> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn serves_connections_until_shutdown() {
        let analyzer = Arc::new(CaptureAnalyzer::default());
        let handler = Arc::new(HlSevenHandler::new(analyzer.clone(), Hl7Identity::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = TcpDeviceServer::new(test_device(), handler, shutdown_rx);
        let task = tokio::spawn(server.accept_loop(listener));

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut conn = MllpConnection::new(stream);
        let oul = "MSH|^~\\&|BA400|BioLab|LIS|Lab01|20250310094500||OUL^R22^OUL_R22|C1|P|2.5.1\r\
                   OBX|1|NM|GLU^Glucose||105|mg/dL|70-110|N|||F\r";
        conn.write_message(oul.as_bytes()).await.unwrap();
        let ack = conn.read_message().await.unwrap().unwrap();
        assert!(String::from_utf8(ack).unwrap().contains("MSA|AA|C1"));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(analyzer.oul_count(), 1);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_kill_the_listener() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = TcpDeviceServer::new(test_device(), Arc::new(PanickingHandler), shutdown_rx);
        let task = tokio::spawn(server.accept_loop(listener));

        for _ in 0..2 {
            let stream = TcpStream::connect(addr).await.unwrap();
            drop(stream);
        }
        tokio::task::yield_now().await;

        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
