//! Serial listener: byte stream in, queued telemetry out
//!
//! The listener is the sole owner of the serial link. It decodes raw
//! lines as latin-1 (total for every byte value, so no input can crash
//! the loop), feeds them through the [`FrameAssembler`], parses flushed
//! event frames with the configured dialect and enqueues the results.
//!
//! [`run_stream`] is generic over [`AsyncRead`] so tests can drive the
//! whole path with `tokio::io::duplex` instead of a physical port.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::{Duration, Instant};

use facp_protocol::{AssemblerConfig, Frame, FrameAssembler, FrameKind, PanelParser, SeverityTable};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::link::ReconnectSupervisor;
use crate::queue::{PersistentQueue, QueueItem};

/// Cap on bytes accumulated without a line terminator before the input is
/// treated as unframeable garbage and discarded (with a log record)
pub const MAX_LINE_LEN: usize = 4096;

/// Decode one raw serial line as latin-1.
///
/// Total over all inputs: each byte maps to the char with the same code
/// point, so undecodable input does not exist and nothing is ever raised
/// at the listener over byte values.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Why [`run_stream`] returned
#[derive(Debug)]
pub enum StreamEnd {
    /// Shutdown was requested
    Shutdown,
    /// The peer closed the stream
    Eof,
    /// A read fault on the open link
    Fault(std::io::Error),
}

/// Framing + parsing + enqueue stage, independent of the byte source
pub struct EventIngest {
    parser: Box<dyn PanelParser>,
    assembler: FrameAssembler,
    queue: Arc<PersistentQueue>,
}

impl EventIngest {
    /// Create the ingest stage for one dialect
    pub fn new(
        parser: Box<dyn PanelParser>,
        assembler: AssemblerConfig,
        queue: Arc<PersistentQueue>,
    ) -> Self {
        Self {
            parser,
            assembler: FrameAssembler::new(assembler),
            queue,
        }
    }

    /// Feed one decoded line
    pub async fn line(&mut self, raw: &[u8], now: Instant) {
        let line = decode_latin1(raw);
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            debug!("Serial data received: {:?}", trimmed);
        }
        if let Some(frame) = self.assembler.feed(&line, now) {
            self.dispatch(frame).await;
        }
    }

    /// Idle tick; flushes a stale buffer past the inactivity window
    pub async fn tick(&mut self, now: Instant) {
        if let Some(frame) = self.assembler.flush_on_timeout(now) {
            self.dispatch(frame).await;
        }
    }

    /// Flush whatever is buffered, regardless of heuristics. Called on
    /// link faults so already-read bytes are never silently lost.
    pub async fn flush_remaining(&mut self) {
        if let Some(frame) = self.assembler.flush_remaining() {
            self.dispatch(frame).await;
        }
    }

    async fn dispatch(&self, frame: Frame) {
        match frame.kind {
            FrameKind::Report => {
                warn!(
                    "Report publishing is not supported, dismissing report ({} bytes)",
                    frame.text.len()
                );
            }
            FrameKind::Event => match self.parser.parse(&frame.text) {
                Ok(event) => {
                    if event.severity == SeverityTable::UNRECOGNIZED {
                        warn!(
                            "Event {:?} is not in the severity table, delivering with severity 0",
                            event.id
                        );
                    }
                    info!("Event queued: {} (severity {})", event.id, event.severity);
                    self.queue.enqueue(QueueItem::Telemetry(event)).await;
                }
                Err(e) => {
                    warn!("Failed to parse event: {}. Buffer was: {:?}", e, frame.text);
                }
            },
        }
    }
}

/// Read lines from an open stream until it faults, the peer closes it, or
/// shutdown is requested.
pub async fn run_stream<R>(
    mut io: R,
    ingest: &mut EventIngest,
    read_timeout: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> StreamEnd
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1024];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        if *shutdown.borrow() {
            return StreamEnd::Shutdown;
        }
        tokio::select! {
            _ = shutdown.changed() => return StreamEnd::Shutdown,

            result = tokio::time::timeout(read_timeout, io.read(&mut buf)) => {
                match result {
                    // No data inside the window: idle tick
                    Err(_) => ingest.tick(Instant::now()).await,

                    Ok(Ok(0)) => {
                        ingest.flush_remaining().await;
                        return StreamEnd::Eof;
                    }

                    Ok(Ok(n)) => {
                        pending.extend_from_slice(&buf[..n]);
                        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                            let line: Vec<u8> = pending.drain(..=pos).collect();
                            if line.len() > MAX_LINE_LEN {
                                error!("Discarding oversize line ({} bytes)", line.len());
                                continue;
                            }
                            ingest.line(&line, Instant::now()).await;
                        }
                        if pending.len() > MAX_LINE_LEN {
                            error!(
                                "Discarding {} unframeable bytes (no line terminator)",
                                pending.len()
                            );
                            ingest.flush_remaining().await;
                            pending.clear();
                        }
                    }

                    Ok(Err(e)) => {
                        if matches!(
                            e.kind(),
                            ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                        ) {
                            ingest.tick(Instant::now()).await;
                            continue;
                        }
                        warn!("Read error on serial link: {}", e);
                        ingest.flush_remaining().await;
                        return StreamEnd::Fault(e);
                    }
                }
            }
        }
    }
}

/// Long-running listener worker: open (or reconnect) the link, run the
/// stream until it faults, re-enter the backoff cycle. Exits only on
/// shutdown.
pub async fn run_serial_listener(
    mut supervisor: ReconnectSupervisor,
    mut ingest: EventIngest,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Serial listener started");
    while !*shutdown.borrow() {
        let Some(stream) = supervisor.reconnect(&mut shutdown).await else {
            break;
        };
        info!("Listening to serial port...");
        let read_timeout = supervisor.settings().read_timeout;
        match run_stream(stream, &mut ingest, read_timeout, &mut shutdown).await {
            StreamEnd::Shutdown => break,
            StreamEnd::Eof => {
                warn!("Serial stream closed by peer, reconnecting");
                supervisor.mark_fault();
            }
            StreamEnd::Fault(e) => {
                error!("Lost serial connection: {}", e);
                supervisor.mark_fault();
            }
        }
    }
    supervisor.close();
    info!("Serial listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use facp_protocol::{create_panel_parser, PanelModel, SeverityTable};
    use tokio::io::AsyncWriteExt;

    use crate::queue::PersistentQueue;

    fn ingest(queue: Arc<PersistentQueue>) -> EventIngest {
        let table: SeverityTable = [("HUMO ACT".to_string(), 3)].into_iter().collect();
        EventIngest::new(
            create_panel_parser(PanelModel::EdwardsIo1000, table),
            AssemblerConfig::default(),
            queue,
        )
    }

    fn shutdown_pair() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[test]
    fn test_decode_latin1_is_total() {
        let all_bytes: Vec<u8> = (0..=255).collect();
        let decoded = decode_latin1(&all_bytes);
        assert_eq!(decoded.chars().count(), 256);
        assert_eq!(decode_latin1(&[0xFF]), "\u{FF}");
    }

    #[tokio::test]
    async fn test_stream_event_reaches_queue() {
        let queue = Arc::new(PersistentQueue::new());
        let mut ingest = ingest(Arc::clone(&queue));
        let (mut tx, rx) = tokio::io::duplex(256);
        let (_sd_tx, mut sd_rx) = shutdown_pair();

        tx.write_all(b"HUMO ACT|12:30P 102325 Detalles\n")
            .await
            .unwrap();
        drop(tx);

        let end = run_stream(rx, &mut ingest, Duration::from_millis(50), &mut sd_rx).await;
        assert!(matches!(end, StreamEnd::Eof));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_non_ascii_bytes_do_not_crash_listener() {
        let queue = Arc::new(PersistentQueue::new());
        let mut ingest = ingest(Arc::clone(&queue));
        let (mut tx, rx) = tokio::io::duplex(256);
        let (_sd_tx, mut sd_rx) = shutdown_pair();

        tx.write_all(b"SE\xD1AL ACT|12:30P 102325 Ba\xF1o\n")
            .await
            .unwrap();
        drop(tx);

        run_stream(rx, &mut ingest, Duration::from_millis(50), &mut sd_rx).await;
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_unrecognized_event_is_still_enqueued() {
        let queue = Arc::new(PersistentQueue::new());
        let mut ingest = ingest(Arc::clone(&queue));
        let (mut tx, rx) = tokio::io::duplex(256);
        let (_sd_tx, mut sd_rx) = shutdown_pair();

        tx.write_all(b"EVENTO DESCONOCIDO|01:00A 102325\n")
            .await
            .unwrap();
        drop(tx);

        run_stream(rx, &mut ingest, Duration::from_millis(50), &mut sd_rx).await;
        let item = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        match item {
            QueueItem::Telemetry(ev) => assert_eq!(ev.severity, 0),
            other => panic!("expected telemetry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_event_is_dropped_not_fatal() {
        let queue = Arc::new(PersistentQueue::new());
        let mut ingest = ingest(Arc::clone(&queue));
        let (mut tx, rx) = tokio::io::duplex(256);
        let (_sd_tx, mut sd_rx) = shutdown_pair();

        // No separator and no timestamp: flushed by the blank line, fails
        // to parse, and the stream keeps running for the next message.
        tx.write_all(b"BASURA\n\nHUMO ACT|12:30P 102325 Detalles\n")
            .await
            .unwrap();
        drop(tx);

        run_stream(rx, &mut ingest, Duration::from_millis(50), &mut sd_rx).await;
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_unframeable_garbage_is_discarded() {
        let queue = Arc::new(PersistentQueue::new());
        let mut ingest = ingest(Arc::clone(&queue));
        let (mut tx, rx) = tokio::io::duplex(MAX_LINE_LEN * 2);
        let (_sd_tx, mut sd_rx) = shutdown_pair();

        let garbage = vec![b'X'; MAX_LINE_LEN + 16];
        tx.write_all(&garbage).await.unwrap();
        tx.write_all(b"\nHUMO ACT|12:30P 102325 Detalles\n")
            .await
            .unwrap();
        drop(tx);

        run_stream(rx, &mut ingest, Duration::from_millis(50), &mut sd_rx).await;
        // The valid event after the garbage still parses
        let item = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        match item {
            QueueItem::Telemetry(ev) => assert_eq!(ev.id, "HUMO ACT"),
            other => panic!("expected telemetry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_idle_timeout_flushes_partial_message() {
        let queue = Arc::new(PersistentQueue::new());
        let table: SeverityTable = SeverityTable::default();
        let mut ingest = EventIngest::new(
            create_panel_parser(PanelModel::EdwardsIo1000, table),
            AssemblerConfig {
                idle_flush: Duration::from_millis(40),
                ..AssemblerConfig::default()
            },
            Arc::clone(&queue),
        );
        let (mut tx, rx) = tokio::io::duplex(256);
        let (sd_tx, mut sd_rx) = shutdown_pair();

        tx.write_all(b"HUMO ACT|12:30P 102325 Sin terminador\n")
            .await
            .unwrap();

        let reader = tokio::spawn(async move {
            run_stream(rx, &mut ingest, Duration::from_millis(10), &mut sd_rx).await
        });

        // Keep the stream open (no EOF) while the idle window elapses
        tokio::time::sleep(Duration::from_millis(150)).await;
        let _ = sd_tx.send(true);
        let end = reader.await.unwrap();
        assert!(matches!(end, StreamEnd::Shutdown));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_stream() {
        let queue = Arc::new(PersistentQueue::new());
        let mut ingest = ingest(Arc::clone(&queue));
        let (_tx, rx) = tokio::io::duplex(256);
        let (sd_tx, mut sd_rx) = shutdown_pair();

        let reader = tokio::spawn(async move {
            run_stream(rx, &mut ingest, Duration::from_millis(20), &mut sd_rx).await
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = sd_tx.send(true);
        let end = reader.await.unwrap();
        assert!(matches!(end, StreamEnd::Shutdown));
    }
}
