//! Serial port loop for directly attached instruments.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{error, info};

use labwire_model::Device;

use crate::error::Result;
use crate::protocols::SerialDeviceHandler;

const REOPEN_DELAY: Duration = Duration::from_secs(1);

pub struct SerialDeviceServer {
    device: Device,
    handler: Arc<dyn SerialDeviceHandler>,
    shutdown: watch::Receiver<bool>,
}

impl SerialDeviceServer {
    pub fn new(
        device: Device,
        handler: Arc<dyn SerialDeviceHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        SerialDeviceServer {
            device,
            handler,
            shutdown,
        }
    }

    /// Own the port until shutdown, reopening after failures.
    ///
    /// Instruments get unplugged and power-cycled; a dropped port is an
    /// expected condition, so the loop waits a second and tries again.
    pub async fn run(mut self) -> Result<()> {
        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }
            match self.open() {
                Ok(port) => {
                    info!(
                        device = %self.device.name,
                        port = %self.device.serial_port,
                        baud = self.device.baud_rate,
                        "serial port opened"
                    );
                    let handler = self.handler.clone();
                    let mut session = tokio::spawn(async move { handler.handle(port).await });
                    let name = self.device.name.clone();
                    tokio::select! {
                        _ = self.shutdown.changed() => {
                            session.abort();
                            info!(device = %name, "serial server stopping");
                            return Ok(());
                        }
                        joined = &mut session => Self::log_session_end(&name, joined),
                    }
                }
                Err(e) => {
                    error!(
                        device = %self.device.name,
                        port = %self.device.serial_port,
                        error = %e,
                        "failed to open serial port"
                    );
                }
            }
            tokio::select! {
                _ = self.shutdown.changed() => return Ok(()),
                _ = tokio::time::sleep(REOPEN_DELAY) => {}
            }
        }
    }

    /// A handler panic must end only the session; the reopen loop carries on.
    fn log_session_end(
        device_name: &str,
        joined: std::result::Result<Result<()>, tokio::task::JoinError>,
    ) {
        match joined {
            Ok(Ok(())) => info!(device = %device_name, "serial port closed"),
            Ok(Err(e)) => error!(device = %device_name, error = %e, "serial handler failed"),
            Err(e) if e.is_panic() => {
                error!(device = %device_name, "serial handler panicked");
            }
            Err(_) => {}
        }
    }

    fn open(&self) -> Result<SerialStream> {
        let port = tokio_serial::new(&self.device.serial_port, self.device.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()?;
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use labwire_model::DeviceType;

    struct NoopHandler;

    #[async_trait]
    impl SerialDeviceHandler for NoopHandler {
        async fn handle(&self, _port: SerialStream) -> Result<()> {
            Ok(())
        }
    }

    fn test_device() -> Device {
        Device {
            id: 1,
            name: "DIESTRO-1".to_owned(),
            device_type: DeviceType::Diestro,
            receive_port: 0,
            serial_port: "/dev/does-not-exist".to_owned(),
            baud_rate: 9600,
            send_host: String::new(),
            send_port: 0,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn returns_immediately_when_already_shut_down() {
        let (tx, rx) = watch::channel(true);
        let server = SerialDeviceServer::new(test_device(), Arc::new(NoopHandler), rx);
        server.run().await.unwrap();
        drop(tx);
    }

    #[tokio::test]
    async fn panicking_session_is_contained() {
        let session: tokio::task::JoinHandle<Result<()>> =
            tokio::spawn(async { panic!("handler blew up") });
        SerialDeviceServer::log_session_end("DIESTRO-1", session.await);
    }

    #[tokio::test]
    async fn reopen_loop_exits_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let server = SerialDeviceServer::new(test_device(), Arc::new(NoopHandler), rx);
        let task = tokio::spawn(server.run());

        tokio::task::yield_now().await;
        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
