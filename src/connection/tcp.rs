use super::Transport;
use super::config::ChannelConfig;
use crate::core::{CloneError, Result};
use crate::protocol::{Frame, RpcRequest, RpcResponse, read_frame, write_frame};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Newline-delimited JSON transport over one TCP connection.
///
/// Calls are serialized on the connection; a response is matched to its
/// request by frame id, and responses left over from abandoned calls are
/// skipped.
pub struct TcpTransport {
    config: ChannelConfig,
    stream: Mutex<Option<FramedStream>>,
    next_id: AtomicU64,
}

struct FramedStream {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl FramedStream {
    async fn exchange(
        &mut self,
        id: u64,
        request: RpcRequest,
        max_frame_bytes: usize,
    ) -> Result<RpcResponse> {
        write_frame(&mut self.writer, &Frame::new(id, request)).await?;

        loop {
            let frame: Frame<RpcResponse> = read_frame(&mut self.reader, max_frame_bytes)
                .await?
                .ok_or_else(|| CloneError::Connection("connection closed by peer".into()))?;

            if frame.id == id {
                return Ok(frame.body);
            }
            if frame.id < id {
                debug!(stale_id = frame.id, id, "skipping response to abandoned call");
                continue;
            }
            return Err(CloneError::Rpc(format!(
                "response id {} does not match request {}",
                frame.id, id
            )));
        }
    }
}

impl TcpTransport {
    /// Connect to the configured endpoint
    pub async fn connect(config: ChannelConfig) -> Result<Self> {
        config.validate().map_err(CloneError::Connection)?;
        let stream = Self::open(&config).await?;
        info!(endpoint = %config.to_url(), "connected");

        Ok(Self {
            config,
            stream: Mutex::new(Some(stream)),
            next_id: AtomicU64::new(1),
        })
    }

    async fn open(config: &ChannelConfig) -> Result<FramedStream> {
        let url = config.to_url();
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.address()))
            .await
            .map_err(|_| CloneError::Connection(format!("timed out connecting to {}", url)))?
            .map_err(|e| CloneError::Connection(format!("{}: {}", url, e)))?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        Ok(FramedStream {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        let mut guard = self.stream.lock().await;
        // Held outside the slot while in flight; a call dropped mid-frame
        // drops the stream with it.
        let mut stream = guard
            .take()
            .ok_or_else(|| CloneError::Connection(format!("not connected to {}", self.config.to_url())))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let result = stream
            .exchange(id, request, self.config.max_frame_bytes)
            .await;

        match &result {
            Err(err) if err.is_fatal() => {
                debug!(endpoint = %self.config.to_url(), error = %err, "dropping broken stream");
            }
            _ => *guard = Some(stream),
        }
        result
    }

    async fn reconnect(&self) -> Result<()> {
        let mut guard = self.stream.lock().await;
        if let Some(mut old) = guard.take() {
            let _ = old.writer.shutdown().await;
        }
        *guard = Some(Self::open(&self.config).await?);
        info!(endpoint = %self.config.to_url(), "reconnected");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            stream.writer.shutdown().await?;
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        self.config.to_url()
    }
}
