//! Daemon-side IPC server
//!
//! Binds the monitor socket, accepts producer and viewer connections, and
//! runs two tasks per connection: a reader that ingests frames into the
//! event bus and ring buffer, and a writer that forwards the live stream to
//! the peer and serves history replay. A malformed or oversized frame closes
//! that one connection; the daemon keeps running.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::frame::{Frame, FrameError, HistoryRequest, read_frame, write_frame};
use crate::events::{EventBus, EventRing, EventStream, KindFilter, MonitorEvent};

/// Default timeout for a single write to a viewer
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-viewer subscription queue capacity
pub const DEFAULT_VIEWER_QUEUE_CAPACITY: usize = 1024;

/// Server lifecycle errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("socket in use: {path} is held by a live monitor")]
    SocketInUse { path: PathBuf },

    #[error("failed to bind socket {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bind the monitor socket
///
/// An existing socket file is only removed when `peer_alive` is false (the
/// pid file holds no live process); otherwise binding fails rather than
/// clobbering a running daemon. The bound socket is chmod'd to 0600.
pub fn bind_socket(socket_path: &Path, peer_alive: bool) -> Result<UnixListener, ServerError> {
    if socket_path.exists() {
        if peer_alive {
            return Err(ServerError::SocketInUse {
                path: socket_path.to_path_buf(),
            });
        }
        debug!(?socket_path, "bind_socket: removing stale socket");
        std::fs::remove_file(socket_path)?;
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path).map_err(|source| ServerError::Bind {
        path: socket_path.to_path_buf(),
        source,
    })?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    info!(?socket_path, "bind_socket: listening");
    Ok(listener)
}

/// Remove the socket file on shutdown
pub fn cleanup_socket(socket_path: &Path) {
    if socket_path.exists() {
        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(?socket_path, error = %e, "cleanup_socket: failed to remove socket file");
        }
    }
}

/// The accept loop plus per-connection tasks
pub struct IpcServer {
    bus: Arc<EventBus>,
    ring: Arc<EventRing>,
    write_timeout: Duration,
    viewer_queue_capacity: usize,
}

impl IpcServer {
    pub fn new(bus: Arc<EventBus>, ring: Arc<EventRing>) -> Self {
        Self {
            bus,
            ring,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            viewer_queue_capacity: DEFAULT_VIEWER_QUEUE_CAPACITY,
        }
    }

    /// Override the viewer write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Override the per-viewer queue capacity
    pub fn with_viewer_queue_capacity(mut self, capacity: usize) -> Self {
        self.viewer_queue_capacity = capacity.max(1);
        self
    }

    /// Accept connections until the shutdown signal flips
    pub async fn run(self: Arc<Self>, listener: UnixListener, mut shutdown: watch::Receiver<bool>) {
        debug!("IpcServer::run: accept loop starting");
        let mut connections: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let server = Arc::clone(&self);
                            connections.spawn(async move {
                                server.handle_connection(stream).await;
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "IpcServer::run: accept failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("IpcServer::run: shutdown signalled");
                        break;
                    }
                }
            }
        }

        // Stop accepting, then tear down in-flight connections
        drop(listener);
        connections.abort_all();
        while connections.join_next().await.is_some() {}
        debug!("IpcServer::run: accept loop finished");
    }

    /// Serve one connection: spawn the writer, run the reader inline
    async fn handle_connection(&self, stream: UnixStream) {
        let (read_half, write_half) = stream.into_split();

        let subscription = self.bus.subscribe_channel(KindFilter::All, self.viewer_queue_capacity);
        let subscription_id = subscription.id;
        debug!(subscription = subscription_id, "IpcServer: connection opened");

        let (replay_tx, replay_rx) = mpsc::channel::<HistoryRequest>(4);
        let writer = ConnectionWriter {
            bus: Arc::clone(&self.bus),
            ring: Arc::clone(&self.ring),
            write_timeout: self.write_timeout,
        };
        let writer_handle = tokio::spawn(async move {
            writer.run(write_half, subscription, replay_rx).await;
        });

        self.run_reader(read_half, replay_tx).await;

        // Reader is done (EOF or ingest error): stop deliveries; the writer
        // drains what is already queued and exits
        self.bus.unsubscribe(subscription_id);
        let _ = writer_handle.await;
        debug!(subscription = subscription_id, "IpcServer: connection closed");
    }

    /// Decode inbound frames until EOF or an ingest error
    async fn run_reader(&self, read_half: OwnedReadHalf, replay_tx: mpsc::Sender<HistoryRequest>) {
        let mut reader = BufReader::new(read_half);
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(Frame::Event(value))) => match MonitorEvent::from_value(&value) {
                    Ok(event) => {
                        // Bus before ring: an event never appears in a
                        // replay snapshot before it is visible to live
                        // subscriptions, which keeps replay duplicate-free
                        self.bus.publish(&event);
                        self.ring.append(event);
                    }
                    Err(e) => {
                        warn!(error = %e, "IpcServer: rejecting event, closing connection");
                        break;
                    }
                },
                Ok(Some(Frame::HistoryRequest(req))) => {
                    debug!(?req, "IpcServer: history request");
                    if replay_tx.send(req).await.is_err() {
                        break;
                    }
                }
                Ok(Some(Frame::Ping {})) => {}
                Ok(Some(other)) => {
                    // history_begin / history_end are daemon-to-viewer only
                    debug!(?other, "IpcServer: ignoring unexpected frame from peer");
                }
                Ok(None) => {
                    debug!("IpcServer: peer closed");
                    break;
                }
                Err(FrameError::Oversized { size, max }) => {
                    warn!(size, max, "IpcServer: oversized frame, closing connection");
                    break;
                }
                Err(FrameError::Malformed(e)) => {
                    warn!(error = %e, "IpcServer: malformed frame, closing connection");
                    break;
                }
                Err(FrameError::Io(e)) => {
                    debug!(error = %e, "IpcServer: read error, closing connection");
                    break;
                }
            }
        }
    }
}

/// Writer half of one connection: live forwarding plus history replay
struct ConnectionWriter {
    bus: Arc<EventBus>,
    ring: Arc<EventRing>,
    write_timeout: Duration,
}

impl ConnectionWriter {
    async fn run(
        &self,
        mut write_half: OwnedWriteHalf,
        mut subscription: EventStream,
        mut replay_rx: mpsc::Receiver<HistoryRequest>,
    ) {
        let mut replay_open = true;
        loop {
            tokio::select! {
                maybe_req = replay_rx.recv(), if replay_open => {
                    match maybe_req {
                        Some(req) => {
                            if self.replay(&mut write_half, &mut subscription, req).await.is_err() {
                                break;
                            }
                        }
                        // Reader is gone; keep draining the live queue
                        None => replay_open = false,
                    }
                }
                maybe_event = subscription.rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            if self.write(&mut write_half, &Frame::event(&event)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        self.bus.unsubscribe(subscription.id);
    }

    /// One frame write under the viewer timeout
    ///
    /// A slow or dead viewer is treated as disconnected: the error
    /// propagates, the caller unsubscribes, and the connection ends.
    async fn write(&self, write_half: &mut OwnedWriteHalf, frame: &Frame) -> Result<(), FrameError> {
        match tokio::time::timeout(self.write_timeout, write_frame(write_half, frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                debug!(error = %e, "ConnectionWriter: write failed");
                Err(e)
            }
            Err(_) => {
                warn!(timeout = ?self.write_timeout, "ConnectionWriter: write timed out");
                Err(FrameError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "viewer write timeout",
                )))
            }
        }
    }

    /// Serve one history request
    ///
    /// Emits `history_begin`, the selected ring contents oldest-first, then
    /// `history_end`. Live events are never interleaved: whatever queued on
    /// the subscription during replay is flushed immediately afterwards,
    /// minus the events the replay already sent.
    async fn replay(
        &self,
        write_half: &mut OwnedWriteHalf,
        subscription: &mut EventStream,
        req: HistoryRequest,
    ) -> Result<(), FrameError> {
        self.write(write_half, &Frame::HistoryBegin {}).await?;

        let snapshot = self.ring.snapshot();
        let start = match &req.since {
            Some(since) => snapshot
                .iter()
                .position(|e| &e.event_id == since)
                .map(|i| i + 1)
                .unwrap_or(0),
            None => 0,
        };

        let mut replayed: std::collections::HashSet<String> = std::collections::HashSet::new();
        for event in snapshot.into_iter().skip(start).take(req.limit) {
            self.write(write_half, &Frame::event(&event)).await?;
            replayed.insert(event.event_id);
        }

        self.write(write_half, &Frame::HistoryEnd {}).await?;

        // Flush events that queued up while the replay was writing
        while let Ok(event) = subscription.rx.try_recv() {
            if replayed.contains(&event.event_id) {
                continue;
            }
            self.write(write_half, &Frame::event(&event)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as TokioBufReader};

    use crate::events::{EventPayload, create_event_bus};
    use crate::ipc::frame::decode_frame;

    fn event(task_id: &str) -> MonitorEvent {
        MonitorEvent::new(task_id, EventPayload::OrchestratorCompleted)
    }

    struct Harness {
        bus: Arc<EventBus>,
        ring: Arc<EventRing>,
        socket_path: PathBuf,
        shutdown_tx: watch::Sender<bool>,
        _temp: tempfile::TempDir,
    }

    async fn start_server() -> Harness {
        let temp = tempfile::tempdir().unwrap();
        let socket_path = temp.path().join("morgana.sock");
        let bus = create_event_bus();
        let ring = Arc::new(EventRing::new(100));
        let listener = bind_socket(&socket_path, false).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let server = Arc::new(
            IpcServer::new(Arc::clone(&bus), Arc::clone(&ring))
                .with_write_timeout(Duration::from_secs(1)),
        );
        tokio::spawn(server.run(listener, shutdown_rx));

        Harness {
            bus,
            ring,
            socket_path,
            shutdown_tx,
            _temp: temp,
        }
    }

    async fn read_one(lines: &mut tokio::io::Lines<TokioBufReader<UnixStream>>) -> Frame {
        let line = lines.next_line().await.unwrap().expect("connection closed early");
        decode_frame(&line).unwrap()
    }

    #[test]
    fn test_bind_refuses_live_peer() {
        let temp = tempfile::tempdir().unwrap();
        let socket_path = temp.path().join("morgana.sock");
        std::fs::write(&socket_path, b"").unwrap();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let err = bind_socket(&socket_path, true).unwrap_err();
        assert!(matches!(err, ServerError::SocketInUse { .. }));
        // The live peer's socket was not clobbered
        assert!(socket_path.exists());
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket_and_sets_permissions() {
        let temp = tempfile::tempdir().unwrap();
        let socket_path = temp.path().join("morgana.sock");
        std::fs::write(&socket_path, b"stale").unwrap();

        let _listener = bind_socket(&socket_path, false).unwrap();
        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_producer_events_reach_bus_and_ring() {
        let harness = start_server().await;
        let mut stream = harness.bus.subscribe_channel(KindFilter::All, 16);

        let client = crate::ipc::ProducerClient::connect(&harness.socket_path).await.unwrap();
        client.publish(&event("T1")).await.unwrap();

        let received = stream.rx.recv().await.unwrap();
        assert_eq!(received.task_id, "T1");

        // Ring append follows the bus publish
        tokio::time::timeout(Duration::from_secs(1), async {
            while harness.ring.len() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(harness.ring.snapshot()[0].task_id, "T1");
        let _ = harness.shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_offender_only() {
        let harness = start_server().await;

        // Offender sends junk
        let mut bad = UnixStream::connect(&harness.socket_path).await.unwrap();
        bad.write_all(b"{not json\n").await.unwrap();
        bad.flush().await.unwrap();

        // Its connection closes (EOF on read)
        let mut lines = TokioBufReader::new(bad).lines();
        assert!(lines.next_line().await.unwrap().is_none());

        // Nothing reached the ring, and a healthy client still works
        assert_eq!(harness.ring.len(), 0);
        let client = crate::ipc::ProducerClient::connect(&harness.socket_path).await.unwrap();
        client.publish(&event("T1")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while harness.ring.len() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let _ = harness.shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn test_unknown_event_kind_closes_connection() {
        let harness = start_server().await;

        let mut stream = UnixStream::connect(&harness.socket_path).await.unwrap();
        stream
            .write_all(b"{\"type\":\"event\",\"payload\":{\"kind\":\"task_exploded\"}}\n")
            .await
            .unwrap();
        stream.flush().await.unwrap();

        let mut lines = TokioBufReader::new(stream).lines();
        assert!(lines.next_line().await.unwrap().is_none());
        assert_eq!(harness.ring.len(), 0);
        let _ = harness.shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn test_history_replay_then_live_stream() {
        let harness = start_server().await;

        // Seed history through a producer connection
        let producer = crate::ipc::ProducerClient::connect(&harness.socket_path).await.unwrap();
        for i in 0..5 {
            producer.publish(&event(&format!("T{i}"))).await.unwrap();
        }
        tokio::time::timeout(Duration::from_secs(1), async {
            while harness.ring.len() < 5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // Late viewer asks for history
        let mut viewer = UnixStream::connect(&harness.socket_path).await.unwrap();
        let request = Frame::HistoryRequest(HistoryRequest {
            since: None,
            limit: 10,
        });
        viewer
            .write_all(format!("{}\n", crate::ipc::encode_frame(&request).unwrap()).as_bytes())
            .await
            .unwrap();
        viewer.flush().await.unwrap();

        let mut lines = TokioBufReader::new(viewer).lines();
        assert_eq!(read_one(&mut lines).await, Frame::HistoryBegin {});
        for i in 0..5 {
            match read_one(&mut lines).await {
                Frame::Event(value) => {
                    let replayed = MonitorEvent::from_value(&value).unwrap();
                    assert_eq!(replayed.task_id, format!("T{i}"));
                }
                other => panic!("expected event during replay, got {other:?}"),
            }
        }
        assert_eq!(read_one(&mut lines).await, Frame::HistoryEnd {});

        // Live events follow after the replay, exactly once
        producer.publish(&event("live")).await.unwrap();
        match read_one(&mut lines).await {
            Frame::Event(value) => {
                assert_eq!(MonitorEvent::from_value(&value).unwrap().task_id, "live");
            }
            other => panic!("expected live event, got {other:?}"),
        }
        let _ = harness.shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn test_history_replay_respects_since_and_limit() {
        let harness = start_server().await;

        let events: Vec<MonitorEvent> = (0..6).map(|i| event(&format!("T{i}"))).collect();
        for e in &events {
            harness.bus.publish(e);
            harness.ring.append(e.clone());
        }

        let mut viewer = UnixStream::connect(&harness.socket_path).await.unwrap();
        let request = Frame::HistoryRequest(HistoryRequest {
            since: Some(events[1].event_id.clone()),
            limit: 3,
        });
        viewer
            .write_all(format!("{}\n", crate::ipc::encode_frame(&request).unwrap()).as_bytes())
            .await
            .unwrap();

        let mut lines = TokioBufReader::new(viewer).lines();
        assert_eq!(read_one(&mut lines).await, Frame::HistoryBegin {});
        for expected in ["T2", "T3", "T4"] {
            match read_one(&mut lines).await {
                Frame::Event(value) => {
                    assert_eq!(MonitorEvent::from_value(&value).unwrap().task_id, expected);
                }
                other => panic!("expected event, got {other:?}"),
            }
        }
        assert_eq!(read_one(&mut lines).await, Frame::HistoryEnd {});
        let _ = harness.shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn test_ping_is_ignored() {
        let harness = start_server().await;
        let client = crate::ipc::ProducerClient::connect(&harness.socket_path).await.unwrap();
        client.ping().await.unwrap();
        client.publish(&event("T1")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while harness.ring.len() < 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(harness.ring.len(), 1);
        let _ = harness.shutdown_tx.send(true);
    }
}
