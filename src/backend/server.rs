use super::conductor::Conductor;
use crate::core::Result;
use crate::protocol::{
    DEFAULT_MAX_FRAME_BYTES, Frame, InterfaceScope, RpcRequest, RpcResponse, read_frame,
    write_frame,
};
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};

/// TCP interface onto a [`Conductor`], one per scope.
pub struct ConductorServer {
    conductor: Arc<Conductor>,
    scope: InterfaceScope,
    host: String,
    port: u16,
    max_frame_bytes: usize,
    metrics: Arc<ServerMetrics>,
}

impl ConductorServer {
    pub fn new(conductor: Arc<Conductor>, scope: InterfaceScope, host: &str, port: u16) -> Self {
        Self {
            conductor,
            scope,
            host: host.to_string(),
            port,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            metrics: Arc::new(ServerMetrics::default()),
        }
    }

    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind((self.host.as_str(), self.port)).await
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections until the listener fails.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        info!("{} interface listening on {}", self.scope, listener.local_addr()?);

        loop {
            let (socket, addr) = listener.accept().await?;
            let count = self.metrics.on_connection();
            debug!("Accepted {} connection #{} from {:?}", self.scope, count, addr);

            let conductor = Arc::clone(&self.conductor);
            let metrics = Arc::clone(&self.metrics);
            let scope = self.scope;
            let max_frame_bytes = self.max_frame_bytes;

            tokio::spawn(async move {
                if let Err(e) =
                    handle_connection(socket, conductor, scope, metrics, max_frame_bytes).await
                {
                    error!("Connection error from {:?}: {}", addr, e);
                }
            });
        }
    }

    pub fn stats(&self) -> ServerStats {
        self.metrics.snapshot()
    }
}

async fn handle_connection(
    socket: TcpStream,
    conductor: Arc<Conductor>,
    scope: InterfaceScope,
    metrics: Arc<ServerMetrics>,
    max_frame_bytes: usize,
) -> Result<()> {
    let peer: Option<SocketAddr> = socket.peer_addr().ok();
    let (read_half, write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    while let Some(frame) = read_frame::<_, RpcRequest>(&mut reader, max_frame_bytes).await? {
        metrics.on_request();
        debug!("{} request {} ({})", scope, frame.id, frame.body.operation());

        let response = conductor.handle(scope, frame.body).await;
        if matches!(response, RpcResponse::Error(_)) {
            metrics.on_request_error();
        }
        write_frame(&mut writer, &Frame::new(frame.id, response)).await?;
    }

    debug!("{} connection from {:?} closed", scope, peer);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerStats {
    pub connections_accepted: u64,
    pub requests_total: u64,
    pub requests_failed: u64,
}

#[derive(Default)]
struct ServerMetrics {
    connections_accepted: AtomicU64,
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
}

impl ServerMetrics {
    fn on_connection(&self) -> u64 {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn on_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn on_request_error(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ServerStats {
        ServerStats {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
        }
    }
}
