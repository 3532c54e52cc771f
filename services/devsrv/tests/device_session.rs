//! End-to-end sessions over real TCP sockets: strategy-selected handlers
//! behind the device server, driven like an instrument would.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use labwire_hl7::MllpConnection;
use labwire_model::vendor::{AbbottReport, Cbs400Result, CoaxResult, DiestroResult, VerifyResult};
use labwire_model::{Device, DeviceType, OrmO01, OruR01, OulR22, QbpQ11, Specimen};

use devsrv::aggregate::ResultAggregator;
use devsrv::analyzer::Analyzer;
use devsrv::config::Hl7Identity;
use devsrv::server::TcpDeviceServer;
use devsrv::strategy::{DeviceHandler, DeviceStrategy};
use devsrv::Result;

#[derive(Default)]
struct RecordingAnalyzer {
    orus: Mutex<Vec<OruR01>>,
    ouls: Mutex<Vec<OulR22>>,
}

#[async_trait]
impl Analyzer for RecordingAnalyzer {
    async fn process_oru_r01(&self, message: OruR01) -> Result<()> {
        self.orus.lock().push(message);
        Ok(())
    }

    async fn process_oul_r22(&self, message: OulR22) -> Result<()> {
        self.ouls.lock().push(message);
        Ok(())
    }

    async fn process_orm_o01(&self, _message: OrmO01) -> Result<()> {
        Ok(())
    }

    async fn process_qbp_q11(&self, _message: QbpQ11) -> Result<Option<Specimen>> {
        Ok(None)
    }

    async fn process_diestro(&self, _result: DiestroResult) -> Result<()> {
        Ok(())
    }

    async fn process_cbs400(&self, _result: Cbs400Result) -> Result<()> {
        Ok(())
    }

    async fn process_verify_u120(&self, _result: VerifyResult) -> Result<()> {
        Ok(())
    }

    async fn process_coax(&self, _result: CoaxResult) -> Result<()> {
        Ok(())
    }

    async fn process_abbott(&self, _report: AbbottReport) -> Result<()> {
        Ok(())
    }
}

fn device(device_type: DeviceType) -> Device {
    Device {
        id: 1,
        name: device_type.as_str().to_owned(),
        device_type,
        receive_port: 0,
        serial_port: String::new(),
        baud_rate: 9600,
        send_host: String::new(),
        send_port: 0,
        enabled: true,
    }
}

/// Start a TCP server for the given device type, returning its local address
/// and the shutdown sender keeping it alive.
async fn start_server(
    analyzer: Arc<RecordingAnalyzer>,
    debounce: Duration,
    device_type: DeviceType,
) -> (std::net::SocketAddr, watch::Sender<bool>) {
    let aggregator = ResultAggregator::new(analyzer.clone(), debounce);
    let strategy = DeviceStrategy::new(analyzer, aggregator, Hl7Identity::default());
    let handler = match strategy.choose_device_handler(&device(device_type)).unwrap() {
        DeviceHandler::Tcp(handler) => handler,
        DeviceHandler::Serial(_) => panic!("expected a tcp handler"),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = TcpDeviceServer::new(device(device_type), handler, shutdown_rx);
    tokio::spawn(server.accept_loop(listener));
    (addr, shutdown_tx)
}

#[tokio::test]
async fn hl7_device_session_round_trip() {
    let analyzer = Arc::new(RecordingAnalyzer::default());
    let (addr, shutdown) =
        start_server(analyzer.clone(), Duration::from_millis(50), DeviceType::Ba400).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut conn = MllpConnection::new(stream);

    let oul = "MSH|^~\\&|BA400|BioLab|LIS|Lab01|20250310094500||OUL^R22^OUL_R22|CTRL-77|P|2.5.1\r\
               PID|1||12||DOE^JANE||19900101|F\r\
               SPM|1|BC1001||SER^Serum\r\
               OBX|1|NM|GLU^Glucose||105|mg/dL|70-110|N|||F\r\
               OBX|2|NM|UREA^Urea||32|mg/dL|15-40|N|||F\r";
    conn.write_message(oul.as_bytes()).await.unwrap();

    let ack = conn.read_message().await.unwrap().unwrap();
    let ack = String::from_utf8(ack).unwrap();
    assert!(ack.contains("MSA|AA|CTRL-77"), "{ack}");
    // endpoints swapped relative to the request
    let msh_fields: Vec<&str> = ack.split('\r').next().unwrap().split('|').collect();
    assert_eq!(msh_fields[2], "LIS");
    assert_eq!(msh_fields[4], "BA400");

    drop(conn);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let ouls = analyzer.ouls.lock();
    assert_eq!(ouls.len(), 1);
    let specimen = &ouls[0].specimens[0];
    assert_eq!(specimen.barcode, "BC1001");
    assert_eq!(specimen.observation_results.len(), 2);
    drop(ouls);

    let _ = shutdown.send(true);
}

#[tokio::test]
async fn response911_fragments_merge_into_one_result() {
    let analyzer = Arc::new(RecordingAnalyzer::default());
    let (addr, shutdown) = start_server(
        analyzer.clone(),
        Duration::from_millis(40),
        DeviceType::Response911,
    )
    .await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut ack = [0u8; 1];

    // two complete messages for the same barcode, one test each
    stream
        .write_all(b"\x024O|1|BC1\x03\r\x025R|1|^^^^UREA|32|mg/dL\x03\r\x024L|1|N\x03\r")
        .await
        .unwrap();
    stream.read_exact(&mut ack).await.unwrap();
    assert_eq!(ack[0], 0x06);

    stream
        .write_all(b"\x024O|1|BC1\x03\r\x025R|1|^^^^CREA|1.1|mg/dL\x03\r\x024L|1|N\x03\r")
        .await
        .unwrap();
    stream.read_exact(&mut ack).await.unwrap();
    assert_eq!(ack[0], 0x06);

    // both fragments land within the debounce window, so exactly one flush
    tokio::time::sleep(Duration::from_millis(200)).await;
    let orus = analyzer.orus.lock();
    assert_eq!(orus.len(), 1);
    let specimen = orus[0].first_specimen().unwrap();
    assert_eq!(specimen.barcode, "BC1");
    let mut codes: Vec<&str> = specimen
        .observation_results
        .iter()
        .map(|r| r.test_code.as_str())
        .collect();
    codes.sort_unstable();
    assert_eq!(codes, vec!["CREA", "UREA"]);
    drop(orus);

    let _ = shutdown.send(true);
}
