//! Default HL7-over-MLLP handler.
//!
//! Serves the BA400/BA200/A15 family and anything else that frames HL7 v2.x
//! in MLLP. Dispatch is on MSH-9: ORU_R01, OUL_R22, ORM_O01 and QBP_Q11 are
//! mapped and forwarded, each answered with an ACK carrying the inbound
//! control ID. A recognized-but-unrouted type gets no acknowledgment.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, error, info};

use labwire_hl7::{Hl7Message, MessageKind, MllpConnection};

use crate::analyzer::Analyzer;
use crate::config::Hl7Identity;
use crate::error::{DevSrvError, Result};
use crate::hl7::{build_ack, map_orm_o01, map_oru_r01, map_oul_r22, map_qbp_q11};
use crate::protocols::TcpDeviceHandler;

pub struct HlSevenHandler {
    analyzer: Arc<dyn Analyzer>,
    identity: Hl7Identity,
}

impl HlSevenHandler {
    pub fn new(analyzer: Arc<dyn Analyzer>, identity: Hl7Identity) -> Self {
        HlSevenHandler { analyzer, identity }
    }

    pub async fn run<S: AsyncRead + AsyncWrite + Unpin + Send>(&self, stream: S) -> Result<()> {
        let mut conn = MllpConnection::new(stream);
        while let Some(payload) = conn.read_message().await? {
            if payload.is_empty() {
                continue;
            }
            let raw = String::from_utf8_lossy(&payload);
            debug!(message = %raw.replace('\r', "\n"), "received hl7 message");

            match self.dispatch(&raw).await {
                Ok(ack) => conn.write_message(ack.as_bytes()).await?,
                Err(e) => error!(error = %e, "failed to handle hl7 message"),
            }
        }
        Ok(())
    }

    /// Route one message and produce its serialized ACK.
    async fn dispatch(&self, raw: &str) -> Result<String> {
        let msg = Hl7Message::parse(raw)?;
        let kind = msg.kind()?;
        let header = match kind {
            MessageKind::OruR01 => {
                let oru = map_oru_r01(&msg)?;
                let header = oru.header.clone();
                self.analyzer.process_oru_r01(oru).await?;
                header
            }
            MessageKind::OulR22 => {
                let oul = map_oul_r22(&msg)?;
                let header = oul.header.clone();
                self.analyzer.process_oul_r22(oul).await?;
                header
            }
            MessageKind::OrmO01 => {
                let orm = map_orm_o01(&msg)?;
                let header = orm.header.clone();
                self.analyzer.process_orm_o01(orm).await?;
                header
            }
            MessageKind::QbpQ11 => {
                let qbp = map_qbp_q11(&msg)?;
                let header = qbp.header.clone();
                let barcode = qbp.query.barcode.clone();
                match self.analyzer.process_qbp_q11(qbp).await? {
                    Some(specimen) => info!(
                        %barcode,
                        requests = specimen.observation_requests.len(),
                        "barcode query answered"
                    ),
                    None => info!(%barcode, "barcode query had no pending orders"),
                }
                header
            }
            other => {
                return Err(DevSrvError::UnknownMessageType(format!("{other:?}")));
            }
        };
        Ok(build_ack(&self.identity, &header))
    }
}

#[async_trait]
impl TcpDeviceHandler for HlSevenHandler {
    async fn handle(&self, stream: TcpStream) -> Result<()> {
        self.run(stream).await
    }
}
