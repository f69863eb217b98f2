//! End-to-end tests: TCP producer → relay → WebSocket consumer

use futures_util::StreamExt;
use serde_json::Value;
use spyder::config::Config;
use spyder::ingest::Framing;
use spyder::server::RelayServer;
use spyder::{ClientRegistry, RelayMetrics};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

struct TestRelay {
    ingest: SocketAddr,
    broadcast: SocketAddr,
    registry: Arc<ClientRegistry>,
    metrics: Arc<RelayMetrics>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), spyder::ServerError>>,
}

impl TestRelay {
    async fn start(framing: Framing) -> Self {
        Self::start_with(framing, |_| {}).await
    }

    async fn start_with<F>(framing: Framing, customize: F) -> Self
    where
        F: FnOnce(&mut Config),
    {
        let mut config = Config::default();
        config.ingest.host = "127.0.0.1".to_string();
        config.ingest.port = 0;
        config.ingest.framing = framing;
        config.broadcast.host = "127.0.0.1".to_string();
        config.broadcast.port = 0;
        customize(&mut config);

        let server = RelayServer::bind(&config).await.unwrap();
        let ingest = server.ingest_addr().unwrap();
        let broadcast = server.broadcast_addr().unwrap();
        let registry = server.registry();
        let metrics = server.metrics();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.run_until(cancel.clone().cancelled_owned()));

        Self {
            ingest,
            broadcast,
            registry,
            metrics,
            cancel,
            task,
        }
    }

    async fn consumer(&self, path: &str) -> WsStream {
        let before = self.registry.len().await;
        let url = format!("ws://{}{}", self.broadcast, path);
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        // Registration happens after the upgrade completes
        tokio::time::timeout(TIMEOUT, async {
            while self.registry.len().await <= before {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("consumer never registered");
        ws
    }

    async fn stop(self) {
        self.cancel.cancel();
        let result = tokio::time::timeout(TIMEOUT, self.task)
            .await
            .expect("relay did not shut down");
        assert!(result.unwrap().is_ok());
    }
}

async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Collect frames up to and including the first one matching `last`
async fn frames_until<F>(ws: &mut WsStream, last: F) -> Vec<Value>
where
    F: Fn(&Value) -> bool,
{
    let mut frames = Vec::new();
    loop {
        let frame = next_json(ws).await;
        let done = last(&frame);
        frames.push(frame);
        if done {
            return frames;
        }
    }
}

fn is_warning(frame: &Value) -> bool {
    frame["type"] == "warning"
}

fn is_reading(frame: &Value, timestamp: i64) -> bool {
    !is_warning(frame) && frame["timestamp"] == timestamp
}

async fn send_lines(producer: &mut TcpStream, readings: &[(f64, i64)]) {
    for (temperature, timestamp) in readings {
        let line = format!(
            "{{\"battery_temperature\": {}, \"timestamp\": {}}}\n",
            temperature, timestamp
        );
        producer.write_all(line.as_bytes()).await.unwrap();
    }
}

#[tokio::test]
async fn test_reading_reaches_consumer() {
    let relay = TestRelay::start(Framing::ReadEvent).await;
    let mut ws = relay.consumer("/").await;

    let mut producer = TcpStream::connect(relay.ingest).await.unwrap();
    producer
        .write_all(br#"{"battery_temperature": 25.5, "timestamp": 1700000000000}"#)
        .await
        .unwrap();

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["battery_temperature"], 25.5);
    assert_eq!(frame["timestamp"], 1_700_000_000_000i64);

    relay.stop().await;
}

#[tokio::test]
async fn test_invalid_readings_never_reach_consumers() {
    let relay = TestRelay::start(Framing::Lines).await;
    let mut first = relay.consumer("/ws").await;
    let mut second = relay.consumer("/").await;

    let mut producer = TcpStream::connect(relay.ingest).await.unwrap();
    producer
        .write_all(
            b"{\"battery_temperature\": 30, \"timestamp\": 1}\n\
              {\"battery_temperature\": \"abc\", \"timestamp\": 2}\n\
              not json\n\
              {\"battery_temperature\": 31, \"timestamp\": 3}\n",
        )
        .await
        .unwrap();

    for ws in [&mut first, &mut second] {
        assert_eq!(next_json(ws).await["timestamp"], 1);
        assert_eq!(next_json(ws).await["timestamp"], 3);
    }

    relay.stop().await;
}

#[tokio::test]
async fn test_dropped_consumer_does_not_affect_others() {
    let relay = TestRelay::start(Framing::Lines).await;
    let mut healthy = relay.consumer("/").await;
    let gone = relay.consumer("/").await;
    drop(gone);

    let mut producer = TcpStream::connect(relay.ingest).await.unwrap();
    for ts in 0..5 {
        let line = format!("{{\"battery_temperature\": 30, \"timestamp\": {}}}\n", ts);
        producer.write_all(line.as_bytes()).await.unwrap();
    }

    for ts in 0..5 {
        assert_eq!(next_json(&mut healthy).await["timestamp"], ts);
    }

    relay.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_consumers() {
    let relay = TestRelay::start(Framing::ReadEvent).await;
    let mut ws = relay.consumer("/").await;
    relay.stop().await;

    let end = tokio::time::timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(end.is_ok());
}

#[tokio::test]
async fn test_warning_score_is_per_producer() {
    let relay = TestRelay::start_with(Framing::Lines, |config| {
        config.relay.broadcast_warnings = true;
    })
    .await;
    let mut ws = relay.consumer("/").await;

    // Four out-of-band readings push the first producer over the limit
    let mut hot = TcpStream::connect(relay.ingest).await.unwrap();
    send_lines(&mut hot, &[(50.0, 1), (50.0, 2), (50.0, 3), (50.0, 4)]).await;
    let frames = frames_until(&mut ws, |f| is_warning(f) && f["timestamp"] == 4).await;
    assert_eq!(frames.iter().filter(|f| is_warning(f)).count(), 1);
    assert_eq!(frames.len(), 5);

    // A second producer, connected while the first is still over the limit,
    // starts from zero: three excursions are not enough to warn
    let mut other = TcpStream::connect(relay.ingest).await.unwrap();
    send_lines(&mut other, &[(50.0, 11), (50.0, 12), (50.0, 13), (30.0, 14)]).await;
    let frames = frames_until(&mut ws, |f| is_reading(f, 14)).await;
    assert!(!frames.iter().any(is_warning), "unexpected warning: {:?}", frames);
    assert_eq!(frames.len(), 4);

    // A producer that reconnects after warning does not inherit its score
    drop(hot);
    let mut reconnected = TcpStream::connect(relay.ingest).await.unwrap();
    send_lines(&mut reconnected, &[(50.0, 21), (50.0, 22), (50.0, 23), (30.0, 24)]).await;
    let frames = frames_until(&mut ws, |f| is_reading(f, 24)).await;
    assert!(!frames.iter().any(is_warning), "unexpected warning: {:?}", frames);

    assert_eq!(relay.metrics.snapshot().warnings, 1);
    relay.stop().await;
}

#[tokio::test]
async fn test_non_utf8_line_does_not_end_producer() {
    let relay = TestRelay::start(Framing::Lines).await;
    let mut ws = relay.consumer("/").await;

    let mut producer = TcpStream::connect(relay.ingest).await.unwrap();
    producer
        .write_all(b"{\"battery_temperature\": 30, \"timestamp\": 1}\n\xff\xfe\n")
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws).await["timestamp"], 1);

    producer
        .write_all(b"{\"battery_temperature\": 30, \"timestamp\": 2}\n")
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws).await["timestamp"], 2);

    let snapshot = relay.metrics.snapshot();
    assert_eq!(snapshot.malformed_messages, 1);
    assert_eq!(snapshot.active_producers, 1);

    relay.stop().await;
}
