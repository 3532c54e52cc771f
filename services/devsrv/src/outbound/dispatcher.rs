//! Batched order transmission to a BA400 analyzer.
//!
//! Each specimen's ordered tests are split into 30-request OML_O33 chunks.
//! Chunks are joined with FS + CR + VT and pushed three at a time per MLLP
//! round-trip, trading message size against round-trip count. The reply must
//! be an ORL_O34 whose MSA accepts and whose control ID matches one of the
//! chunks just sent; anything else aborts the whole send. A one second pause
//! between batches keeps the instrument's receive buffer from saturating.

use std::collections::HashSet;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, info};

use labwire_hl7::{Hl7Message, MessageKind, MllpConnection};
use labwire_model::{AckCode, Device, Patient};

use crate::config::Hl7Identity;
use crate::error::{DevSrvError, Result};
use crate::outbound::oml::{encode_oml_o33, OrderMessage};

/// Per-message capacity of the instrument.
const REQUESTS_PER_CHUNK: usize = 30;
/// Chunks pushed per TCP round-trip.
const CHUNKS_PER_BATCH: usize = 3;
const SEND_TIMEOUT: Duration = Duration::from_secs(15);
const INTER_BATCH_PAUSE: Duration = Duration::from_secs(1);

const FILE_SEPARATOR: char = '\x1C';
const CARRIAGE_RETURN: char = '\r';
const VERTICAL_TAB: char = '\x0B';

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchStatus {
    InProgress,
    Completed,
}

/// Progress report emitted after every chunk.
#[derive(Debug, Clone, Copy)]
pub struct DispatchProgress {
    pub percentage: f64,
    pub status: DispatchStatus,
}

pub struct Ba400Dispatcher {
    identity: Hl7Identity,
}

impl Ba400Dispatcher {
    pub fn new(identity: Hl7Identity) -> Self {
        Ba400Dispatcher { identity }
    }

    /// Push all ordered tests for the given patients to the instrument.
    ///
    /// Fails hard on the first rejected or unreadable batch; nothing is
    /// retried.
    pub async fn send(
        &self,
        patients: &[Patient],
        device: &Device,
        progress: Option<mpsc::Sender<DispatchProgress>>,
    ) -> Result<()> {
        let chunks = build_chunks(&self.identity, device, patients);
        if chunks.is_empty() {
            info!(device = %device.name, "no observation requests to dispatch");
            return Ok(());
        }
        report(&progress, 0.0, DispatchStatus::InProgress).await;

        let addr = format!("{}:{}", device.send_host, device.send_port);
        let mut buf = String::new();
        let mut sent_ids = HashSet::new();

        for (i, chunk) in chunks.iter().enumerate() {
            buf.push_str(&chunk.payload);
            buf.push(FILE_SEPARATOR);
            buf.push(CARRIAGE_RETURN);
            buf.push(VERTICAL_TAB);
            sent_ids.insert(chunk.control_id.clone());

            let last = i == chunks.len() - 1;
            if (i + 1) % CHUNKS_PER_BATCH == 0 || last {
                info!(
                    device = %device.name,
                    batch_bytes = buf.len(),
                    chunks = sent_ids.len(),
                    "sending order batch"
                );
                let reply = self.send_raw(&addr, buf.as_bytes()).await?;
                verify_reply(&reply, &sent_ids)?;
                buf.clear();
                sent_ids.clear();
                if !last {
                    tokio::time::sleep(INTER_BATCH_PAUSE).await;
                }
            }

            let percentage = (i + 1) as f64 / chunks.len() as f64 * 100.0;
            let status = if last {
                DispatchStatus::Completed
            } else {
                DispatchStatus::InProgress
            };
            report(&progress, percentage, status).await;
        }
        Ok(())
    }

    /// One MLLP round-trip under the send timeout.
    async fn send_raw(&self, addr: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let stream = timeout(SEND_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| DevSrvError::TimeoutError(format!("connect to {addr}")))?
            .map_err(|e| DevSrvError::connection(format!("connect to {addr}: {e}")))?;

        let mut conn = MllpConnection::new(stream);
        timeout(SEND_TIMEOUT, conn.write_message(payload))
            .await
            .map_err(|_| DevSrvError::TimeoutError(format!("write to {addr}")))??;

        let reply = timeout(SEND_TIMEOUT, conn.read_message())
            .await
            .map_err(|_| DevSrvError::TimeoutError(format!("read reply from {addr}")))??;
        reply.ok_or_else(|| DevSrvError::dispatch("connection closed before acknowledgment"))
    }

    /// Probe the instrument's order port.
    pub async fn check_connection(&self, device: &Device) -> Result<()> {
        let addr = format!("{}:{}", device.send_host, device.send_port);
        let stream = timeout(SEND_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| DevSrvError::TimeoutError(format!("connect to {addr}")))?
            .map_err(|e| DevSrvError::connection(format!("cannot connect to {addr}: {e}")))?;
        drop(stream);
        Ok(())
    }
}

/// Split every specimen's requests into per-message chunks, in order.
pub fn build_chunks(
    identity: &Hl7Identity,
    device: &Device,
    patients: &[Patient],
) -> Vec<OrderMessage> {
    let mut chunks = Vec::new();
    for patient in patients {
        for specimen in &patient.specimens {
            for requests in specimen.observation_requests.chunks(REQUESTS_PER_CHUNK) {
                chunks.push(encode_oml_o33(identity, device, patient, specimen, requests));
            }
        }
    }
    chunks
}

/// The reply must be an accepting ORL_O34 correlated to a sent control ID.
fn verify_reply(reply: &[u8], sent_ids: &HashSet<String>) -> Result<()> {
    let raw = String::from_utf8_lossy(reply);
    let msg = Hl7Message::parse(&raw)?;
    match msg.kind()? {
        MessageKind::OrlO34 => {}
        other => {
            return Err(DevSrvError::dispatch(format!(
                "expected ORL_O34 acknowledgment, got {other:?}"
            )))
        }
    }

    let msa = msg
        .segment("MSA")
        .ok_or_else(|| DevSrvError::dispatch("acknowledgment has no MSA segment"))?;
    let code = msa.field(1);
    let control_id = msa.field(2);
    if !AckCode::from_hl7(code).is_accept() {
        error!(%code, %control_id, "order batch rejected");
        return Err(DevSrvError::dispatch(format!(
            "got failed or reject acknowledgment code: {code}"
        )));
    }
    if !sent_ids.contains(control_id) {
        return Err(DevSrvError::dispatch(format!(
            "acknowledgment control ID {control_id} does not match this batch"
        )));
    }
    Ok(())
}

async fn report(
    progress: &Option<mpsc::Sender<DispatchProgress>>,
    percentage: f64,
    status: DispatchStatus,
) {
    if let Some(tx) = progress {
        let _ = tx.send(DispatchProgress { percentage, status }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labwire_model::{DeviceType, ObservationRequest, Specimen};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn device(send_port: u16) -> Device {
        Device {
            id: 1,
            name: "BA400-1".to_owned(),
            device_type: DeviceType::Ba400,
            receive_port: 0,
            serial_port: String::new(),
            baud_rate: 9600,
            send_host: "127.0.0.1".to_owned(),
            send_port,
            enabled: true,
        }
    }

    fn patient_with_requests(count: usize) -> Patient {
        let requests = (0..count)
            .map(|i| ObservationRequest {
                test_code: format!("T{i:03}"),
                ..Default::default()
            })
            .collect();
        Patient {
            id: 9,
            specimens: vec![Specimen {
                barcode: "BC1".to_owned(),
                observation_requests: requests,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn sixtyfive_requests_split_into_thirty_thirty_five() {
        let chunks = build_chunks(
            &Hl7Identity::default(),
            &device(0),
            &[patient_with_requests(65)],
        );
        assert_eq!(chunks.len(), 3);
        let obr_counts: Vec<usize> = chunks
            .iter()
            .map(|c| c.payload.matches("\rOBR|").count())
            .collect();
        assert_eq!(obr_counts, vec![30, 30, 5]);
    }

    /// Reads one raw MLLP frame, replies with an ORL_O34 carrying the first
    /// control ID found in the frame, using the given acknowledgment code.
    async fn mock_instrument(listener: TcpListener, ack_code: &str) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut data = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            data.extend_from_slice(&chunk[..n]);
            if data.ends_with(&[0x0B, 0x1C, 0x0D]) {
                break;
            }
        }

        let text = String::from_utf8_lossy(&data).into_owned();
        let control_id = text
            .split("OML^O33^OML_O33|")
            .nth(1)
            .and_then(|rest| rest.split('|').next())
            .unwrap()
            .to_owned();

        let reply = format!(
            "MSH|^~\\&|BA200|Biosystems|LIS|Lab01|20250310094500||ORL^O34^ORL_O34|reply-1|P|2.5.1\r\
             MSA|{ack_code}|{control_id}\r"
        );
        socket.write_all(&[0x0B]).await.unwrap();
        socket.write_all(reply.as_bytes()).await.unwrap();
        socket.write_all(&[0x1C, 0x0D]).await.unwrap();
    }

    #[tokio::test]
    async fn accepted_batch_reports_progress_to_completion() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(mock_instrument(listener, "AA"));

        let dispatcher = Ba400Dispatcher::new(Hl7Identity::default());
        let (tx, mut rx) = mpsc::channel(16);
        dispatcher
            .send(&[patient_with_requests(65)], &device(port), Some(tx))
            .await
            .unwrap();
        server.await.unwrap();

        let mut reports = Vec::new();
        while let Some(p) = rx.recv().await {
            reports.push(p);
        }
        assert_eq!(reports.first().map(|p| p.percentage), Some(0.0));
        let last = reports.last().unwrap();
        assert_eq!(last.percentage, 100.0);
        assert_eq!(last.status, DispatchStatus::Completed);
    }

    #[tokio::test]
    async fn rejected_batch_is_a_hard_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(mock_instrument(listener, "AE"));

        let dispatcher = Ba400Dispatcher::new(Hl7Identity::default());
        let err = dispatcher
            .send(&[patient_with_requests(5)], &device(port), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DevSrvError::DispatchError(_)));
        server.await.unwrap();
    }

    #[test]
    fn reply_control_id_must_belong_to_the_batch() {
        let sent: HashSet<String> = ["abc".to_owned()].into_iter().collect();
        let reply =
            b"MSH|^~\\&|BA200|Biosystems|LIS|Lab01|20250310094500||ORL^O34^ORL_O34|r1|P|2.5.1\rMSA|AA|other\r";
        let err = verify_reply(reply, &sent).unwrap_err();
        assert!(matches!(err, DevSrvError::DispatchError(_)));

        let ok = b"MSH|^~\\&|BA200|Biosystems|LIS|Lab01|20250310094500||ORL^O34^ORL_O34|r1|P|2.5.1\rMSA|AA|abc\r";
        verify_reply(ok, &sent).unwrap();
    }
}
