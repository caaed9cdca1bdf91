//! Producer-side IPC client
//!
//! Short-lived producer processes use this to forward their events to the
//! daemon. Writes are serialized under a mutex so concurrent producers in
//! one process interleave at frame boundaries. On write failure the client
//! does not retry; the caller decides whether to keep emitting locally.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::debug;

use super::frame::{Frame, FrameError, write_frame};
use crate::events::MonitorEvent;

/// Producer client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to monitor socket {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("client disconnected: {0}")]
    Disconnected(String),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A session with the monitor daemon
#[derive(Debug)]
pub struct ProducerClient {
    stream: Mutex<UnixStream>,
    socket_path: PathBuf,
}

impl ProducerClient {
    /// Connect to the daemon socket
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let socket_path = socket_path.as_ref().to_path_buf();
        debug!(?socket_path, "ProducerClient::connect");
        let stream = UnixStream::connect(&socket_path)
            .await
            .map_err(|source| ClientError::Connect {
                path: socket_path.clone(),
                source,
            })?;
        Ok(Self {
            stream: Mutex::new(stream),
            socket_path,
        })
    }

    /// Socket path this session is bound to
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Publish one event
    ///
    /// The server receives an owned copy; nothing is retained here. A write
    /// failure surfaces as `Disconnected` and is not retried.
    pub async fn publish(&self, event: &MonitorEvent) -> Result<(), ClientError> {
        let frame = Frame::event(event);
        let mut stream = self.stream.lock().await;
        match write_frame(&mut *stream, &frame).await {
            Ok(()) => Ok(()),
            Err(FrameError::Io(e)) => Err(ClientError::Disconnected(e.to_string())),
            Err(other) => Err(other.into()),
        }
    }

    /// Send a keep-alive ping
    pub async fn ping(&self) -> Result<(), ClientError> {
        let mut stream = self.stream.lock().await;
        match write_frame(&mut *stream, &Frame::Ping {}).await {
            Ok(()) => Ok(()),
            Err(FrameError::Io(e)) => Err(ClientError::Disconnected(e.to_string())),
            Err(other) => Err(other.into()),
        }
    }

    /// Close the session
    pub async fn close(self) -> Result<(), ClientError> {
        let mut stream = self.stream.into_inner();
        stream
            .shutdown()
            .await
            .map_err(|e| ClientError::Disconnected(e.to_string()))
    }
}
