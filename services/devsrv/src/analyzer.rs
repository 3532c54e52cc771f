//! Downstream boundary for everything the protocol handlers decode.
//!
//! Handlers never act on results themselves; they hand canonical messages or
//! vendor values across this trait. The shipped implementation logs the
//! payload as structured JSON; a storage-backed implementation plugs in
//! without touching any handler.

use async_trait::async_trait;
use tracing::info;

use labwire_model::vendor::{AbbottReport, Cbs400Result, CoaxResult, DiestroResult, VerifyResult};
use labwire_model::{OrmO01, OruR01, OulR22, QbpQ11, Specimen};

use crate::error::Result;

/// Receives decoded instrument traffic.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn process_oru_r01(&self, message: OruR01) -> Result<()>;
    async fn process_oul_r22(&self, message: OulR22) -> Result<()>;
    async fn process_orm_o01(&self, message: OrmO01) -> Result<()>;

    /// Answer a barcode query with the specimen's ordered tests, if known.
    async fn process_qbp_q11(&self, message: QbpQ11) -> Result<Option<Specimen>>;

    async fn process_diestro(&self, result: DiestroResult) -> Result<()>;
    async fn process_cbs400(&self, result: Cbs400Result) -> Result<()>;
    async fn process_verify_u120(&self, result: VerifyResult) -> Result<()>;
    async fn process_coax(&self, result: CoaxResult) -> Result<()>;
    async fn process_abbott(&self, report: AbbottReport) -> Result<()>;
}

/// Analyzer that logs everything it receives and answers queries with
/// "unknown barcode". Used when no result store is wired up.
#[derive(Debug, Default)]
pub struct LogAnalyzer;

fn log_payload<T: serde::Serialize>(kind: &str, payload: &T) {
    match serde_json::to_string(payload) {
        Ok(json) => info!(%kind, %json, "analyzer received payload"),
        Err(e) => info!(%kind, error = %e, "analyzer received unserializable payload"),
    }
}

#[async_trait]
impl Analyzer for LogAnalyzer {
    async fn process_oru_r01(&self, message: OruR01) -> Result<()> {
        log_payload("ORU_R01", &message);
        Ok(())
    }

    async fn process_oul_r22(&self, message: OulR22) -> Result<()> {
        log_payload("OUL_R22", &message);
        Ok(())
    }

    async fn process_orm_o01(&self, message: OrmO01) -> Result<()> {
        log_payload("ORM_O01", &message);
        Ok(())
    }

    async fn process_qbp_q11(&self, message: QbpQ11) -> Result<Option<Specimen>> {
        log_payload("QBP_Q11", &message);
        Ok(None)
    }

    async fn process_diestro(&self, result: DiestroResult) -> Result<()> {
        log_payload("DIESTRO", &result);
        Ok(())
    }

    async fn process_cbs400(&self, result: Cbs400Result) -> Result<()> {
        log_payload("CBS400", &result);
        Ok(())
    }

    async fn process_verify_u120(&self, result: VerifyResult) -> Result<()> {
        log_payload("VERIFY_U120", &result);
        Ok(())
    }

    async fn process_coax(&self, result: CoaxResult) -> Result<()> {
        log_payload("COAX", &result);
        Ok(())
    }

    async fn process_abbott(&self, report: AbbottReport) -> Result<()> {
        log_payload("ABBOTT", &report);
        Ok(())
    }
}
