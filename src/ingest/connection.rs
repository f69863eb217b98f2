//! Producer connection handler
//!
//! One task per accepted producer. The task owns its [`WarningDetector`],
//! frames the byte stream, and hands each frame to the relay coordinator.
//! Dropping out of [`ProducerConnection::run`] on any path releases the
//! socket, the detector and the producer gauge.

use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, BytesCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::relay::{RelayCoordinator, RelayOutcome};

/// How the producer byte stream is split into messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// Each socket read is one JSON message. Segments that TCP splits or
    /// coalesces are not reassembled.
    #[default]
    ReadEvent,
    /// Newline-terminated JSON messages. Lines are split on raw bytes, so a
    /// line that is not UTF-8 is dropped as malformed like any other.
    Lines,
}

/// Errors that end a producer connection
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame exceeds {max} bytes")]
    FrameTooLong { max: usize },
}

impl IngestError {
    /// Frame-level errors drop one message; the rest end the connection
    fn is_recoverable(&self) -> bool {
        matches!(self, IngestError::FrameTooLong { .. })
    }
}

/// Per-connection tallies, logged when the connection ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub frames: u64,
    pub broadcast: u64,
    pub invalid: u64,
    pub malformed: u64,
}

impl ConnectionSummary {
    fn record(&mut self, outcome: &RelayOutcome) {
        self.frames += 1;
        match outcome {
            RelayOutcome::Broadcast { .. } => self.broadcast += 1,
            RelayOutcome::Invalid(_) => self.invalid += 1,
            RelayOutcome::Malformed(_) => self.malformed += 1,
        }
    }
}

/// Handles one producer connection
pub struct ProducerConnection {
    stream: TcpStream,
    peer: SocketAddr,
    coordinator: Arc<RelayCoordinator>,
    framing: Framing,
    max_frame_bytes: usize,
}

impl ProducerConnection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        coordinator: Arc<RelayCoordinator>,
        framing: Framing,
        max_frame_bytes: usize,
    ) -> Self {
        Self {
            stream,
            peer,
            coordinator,
            framing,
            max_frame_bytes,
        }
    }

    /// Run until the producer disconnects, a read fails, or shutdown
    pub async fn run(self, cancel: CancellationToken) -> Result<ConnectionSummary, IngestError> {
        let _guard = self.coordinator.metrics().producer_connected();
        info!(peer = %self.peer, framing = ?self.framing, "Producer connected");

        let coordinator = self.coordinator;
        let max = self.max_frame_bytes;

        let result = match self.framing {
            Framing::ReadEvent => {
                let frames = FramedRead::with_capacity(self.stream, BytesCodec::new(), max);
                pump(frames, &coordinator, cancel).await
            }
            Framing::Lines => {
                let codec = AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max);
                let frames = FramedRead::new(self.stream, codec)
                    .map(move |r| r.map_err(|e| lines_error(e, max)));
                pump(frames, &coordinator, cancel).await
            }
        };

        match &result {
            Ok(summary) => info!(
                peer = %self.peer,
                frames = summary.frames,
                invalid = summary.invalid,
                malformed = summary.malformed,
                "Closing connection with producer"
            ),
            Err(e) => warn!(peer = %self.peer, error = %e, "Producer connection error"),
        }
        result
    }
}

fn lines_error(err: AnyDelimiterCodecError, max: usize) -> IngestError {
    match err {
        AnyDelimiterCodecError::MaxChunkLengthExceeded => IngestError::FrameTooLong { max },
        AnyDelimiterCodecError::Io(e) => IngestError::Io(e),
    }
}

/// Feed every frame of a producer stream through the coordinator
async fn pump<S, T, E>(
    mut frames: S,
    coordinator: &RelayCoordinator,
    cancel: CancellationToken,
) -> Result<ConnectionSummary, IngestError>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    T: AsRef<[u8]>,
    E: Into<IngestError>,
{
    let mut detector = coordinator.detector();
    let mut summary = ConnectionSummary::default();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Producer connection cancelled by shutdown");
                break;
            }
            next = frames.next() => next,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                let err: IngestError = e.into();
                if err.is_recoverable() {
                    coordinator.metrics().record_malformed();
                    summary.malformed += 1;
                    warn!(error = %err, "Dropping oversized frame");
                    continue;
                }
                return Err(err);
            }
            None => break,
        };

        let payload = frame.as_ref();
        if payload.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let outcome = coordinator.handle_payload(&mut detector, payload).await;
        summary.record(&outcome);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClientRegistry;
    use crate::relay::{CoordinatorConfig, RelayMetrics};
    use futures_util::stream;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn coordinator() -> RelayCoordinator {
        RelayCoordinator::new(
            Arc::new(ClientRegistry::default()),
            Arc::new(RelayMetrics::new()),
            CoordinatorConfig::default(),
        )
    }

    #[test]
    fn test_framing_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            framing: Framing,
        }
        let w: Wrapper = toml::from_str(r#"framing = "read-event""#).unwrap();
        assert_eq!(w.framing, Framing::ReadEvent);
        let w: Wrapper = toml::from_str(r#"framing = "lines""#).unwrap();
        assert_eq!(w.framing, Framing::Lines);
    }

    #[tokio::test]
    async fn test_pump_classifies_frames() {
        let coordinator = coordinator();
        let frames = stream::iter(vec![
            Ok::<_, IngestError>(br#"{"battery_temperature": 30, "timestamp": 1}"#.to_vec()),
            Ok(br#"{"battery_temperature": "abc", "timestamp": 2}"#.to_vec()),
            Ok(b"garbage".to_vec()),
            Ok(b"  \n".to_vec()),
            Err(IngestError::FrameTooLong { max: 8 }),
            Ok(br#"{"battery_temperature": 31, "timestamp": 3}"#.to_vec()),
        ]);

        let summary = pump(frames, &coordinator, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            summary,
            ConnectionSummary {
                frames: 4,
                broadcast: 2,
                invalid: 1,
                malformed: 2,
            }
        );
        assert_eq!(coordinator.metrics().snapshot().malformed_messages, 2);
    }

    #[tokio::test]
    async fn test_pump_stops_on_io_error() {
        let coordinator = coordinator();
        let frames = stream::iter(vec![
            Ok::<_, IngestError>(br#"{"battery_temperature": 30, "timestamp": 1}"#.to_vec()),
            Err(IngestError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))),
            Ok(br#"{"battery_temperature": 30, "timestamp": 2}"#.to_vec()),
        ]);

        let result = pump(frames, &coordinator, CancellationToken::new()).await;
        assert!(matches!(result, Err(IngestError::Io(_))));
        assert_eq!(coordinator.metrics().snapshot().readings_received, 1);
    }

    #[tokio::test]
    async fn test_pump_honours_cancellation() {
        let coordinator = coordinator();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let frames = stream::pending::<Result<Vec<u8>, IngestError>>();
        let summary = pump(frames, &coordinator, cancel).await.unwrap();
        assert_eq!(summary, ConnectionSummary::default());
    }

    #[test]
    fn test_lines_error_mapping() {
        assert!(matches!(
            lines_error(AnyDelimiterCodecError::MaxChunkLengthExceeded, 16),
            IngestError::FrameTooLong { max: 16 }
        ));
    }

    /// Run one producer connection over loopback, feeding it `payload`
    async fn run_connection(
        coordinator: Arc<RelayCoordinator>,
        framing: Framing,
        payload: &[u8],
    ) -> Result<ConnectionSummary, IngestError> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut producer = TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        let connection = ProducerConnection::new(stream, peer, coordinator, framing, 1024);
        let task = tokio::spawn(connection.run(CancellationToken::new()));

        producer.write_all(payload).await.unwrap();
        producer.shutdown().await.unwrap();
        drop(producer);

        task.await.unwrap()
    }

    #[tokio::test]
    async fn test_lines_survive_non_utf8_line() {
        let registry = Arc::new(ClientRegistry::default());
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(tx).await.unwrap();
        let coordinator = Arc::new(RelayCoordinator::new(
            registry,
            Arc::new(RelayMetrics::new()),
            CoordinatorConfig::default(),
        ));

        let summary = run_connection(
            Arc::clone(&coordinator),
            Framing::Lines,
            b"{\"battery_temperature\": 30, \"timestamp\": 1}\n\xff\xfe\n{\"battery_temperature\": 30, \"timestamp\": 2}\n",
        )
        .await
        .unwrap();

        assert_eq!(
            summary,
            ConnectionSummary {
                frames: 3,
                broadcast: 2,
                invalid: 0,
                malformed: 1,
            }
        );
        let snapshot = coordinator.metrics().snapshot();
        assert_eq!(snapshot.malformed_messages, 1);
        assert_eq!(snapshot.active_producers, 0);

        let first: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let second: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["timestamp"], 1);
        assert_eq!(second["timestamp"], 2);
    }

    #[tokio::test]
    async fn test_lines_accept_crlf_and_unterminated_tail() {
        let summary = run_connection(
            Arc::new(coordinator()),
            Framing::Lines,
            b"{\"battery_temperature\": 30, \"timestamp\": 1}\r\n{\"battery_temperature\": 31, \"timestamp\": 2}",
        )
        .await
        .unwrap();

        assert_eq!(summary.broadcast, 2);
        assert_eq!(summary.malformed, 0);
    }
}
