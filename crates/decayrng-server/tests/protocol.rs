//! Protocol scenarios over real loopback sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use decayrng_core::{EngineConfig, EntropyEngine, ManualClock, ScriptedSource};
use decayrng_server::{ProtocolServer, ServerConfig};

const WAIT: Duration = Duration::from_secs(5);

fn engine() -> Arc<EntropyEngine> {
    Arc::new(EntropyEngine::with_clock(
        EngineConfig {
            debounce_pause: Duration::ZERO,
            ..Default::default()
        },
        Arc::new(ManualClock::new(0)),
    ))
}

/// Run the detection loop until pulses have landed at exactly these registry
/// counter values.
fn detect_at(engine: &EntropyEngine, counters: &[u32]) {
    let mut samples = Vec::new();
    let mut registry = engine.registry_counter();
    for &target in counters {
        samples.extend(std::iter::repeat_n(0u16, (target - registry) as usize));
        samples.extend([3_000u16, 0]);
        registry = target + 1;
    }
    let mut src = ScriptedSource::new(samples, 0);
    while src.remaining() > 0 {
        engine.step(&mut src);
    }
}

async fn start(engine: Arc<EntropyEngine>) -> SocketAddr {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    let server = ProtocolServer::bind(&config, engine).await.expect("bind");
    let addr = server.local_addr();
    tokio::spawn(server.run());
    addr
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = timeout(WAIT, TcpStream::connect(addr))
            .await
            .expect("connect timed out")
            .expect("connect");
        let (r, w) = stream.into_split();
        Self {
            reader: BufReader::new(r),
            writer: w,
        }
    }

    /// Connect and consume the greeting.
    async fn ready(addr: SocketAddr) -> Self {
        let mut client = Self::connect(addr).await;
        assert_eq!(client.line().await, "ready\n");
        client
    }

    async fn send(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write");
    }

    async fn line(&mut self) -> String {
        let mut line = String::new();
        timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("read timed out")
            .expect("read");
        line
    }

    async fn expect_closed(&mut self) {
        let mut buf = [0u8; 64];
        match timeout(WAIT, self.reader.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => {}
            Ok(Ok(n)) => panic!("expected close, got {:?}", String::from_utf8_lossy(&buf[..n])),
            Err(_) => panic!("connection still open"),
        }
    }
}

#[tokio::test]
async fn req_before_any_pulse_returns_sentinel() {
    let addr = start(engine()).await;
    let mut client = Client::ready(addr).await;
    client.send(b"req").await;
    assert_eq!(client.line().await, "256:0:0\n");
}

#[tokio::test]
async fn req_returns_pulses_in_detection_order() {
    let engine = engine();
    detect_at(&engine, &[10, 266, 520]);
    let addr = start(engine).await;

    let mut client = Client::ready(addr).await;
    let mut got = Vec::new();
    for _ in 0..3 {
        client.send(b"req").await;
        got.push(client.line().await);
    }
    assert_eq!(got, vec!["10:10:2\n", "10:266:1\n", "8:520:0\n"]);
}

#[tokio::test]
async fn concatenated_commands_answered_in_order() {
    let engine = engine();
    detect_at(&engine, &[1, 2]);
    let addr = start(engine).await;

    let mut client = Client::ready(addr).await;
    client.send(b"reqreqreq").await;
    assert_eq!(client.line().await, "1:1:1\n");
    assert_eq!(client.line().await, "2:2:0\n");
    assert_eq!(client.line().await, "256:0:0\n");
}

#[tokio::test]
async fn sta_reports_six_integer_fields() {
    let engine = engine();
    detect_at(&engine, &[5]);
    let addr = start(engine).await;

    let mut client = Client::ready(addr).await;
    client.send(b"sta").await;
    let line = client.line().await;
    let body = line.strip_suffix('\n').expect("newline");
    let rest = body.strip_prefix("cpm:").expect("cpm prefix");
    let fields: Vec<&str> = rest.split(':').filter(|f| *f != "loop").collect();
    assert_eq!(fields.len(), 6, "{line}");
    assert!(fields.iter().all(|f| f.parse::<u64>().is_ok()), "{line}");
}

#[tokio::test]
async fn end_closes_and_next_client_connects() {
    let addr = start(engine()).await;

    let mut first = Client::ready(addr).await;
    first.send(b"end").await;
    first.expect_closed().await;

    let mut second = Client::ready(addr).await;
    second.send(b"req").await;
    assert_eq!(second.line().await, "256:0:0\n");
}

#[tokio::test]
async fn unknown_command_closes_without_response() {
    let addr = start(engine()).await;
    let mut client = Client::ready(addr).await;
    client.send(b"xyz").await;
    client.expect_closed().await;
}

#[tokio::test]
async fn second_client_refused_while_first_is_served() {
    let engine = engine();
    detect_at(&engine, &[7]);
    let addr = start(engine).await;

    let mut first = Client::ready(addr).await;
    let mut intruder = Client::connect(addr).await;
    intruder.expect_closed().await;

    first.send(b"req").await;
    assert_eq!(first.line().await, "7:7:0\n");
    first.send(b"end").await;
    first.expect_closed().await;

    let _third = Client::ready(addr).await;
}

#[tokio::test]
async fn client_disconnect_returns_to_listening() {
    let addr = start(engine()).await;
    {
        let first = Client::ready(addr).await;
        drop(first);
    }
    let mut next = Client::ready(addr).await;
    next.send(b"sta").await;
    assert!(next.line().await.starts_with("cpm:"));
}
