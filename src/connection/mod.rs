pub mod admin;
pub mod app;
pub mod config;
pub mod tcp;

use crate::core::{CloneError, Result};
use crate::protocol::{InterfaceScope, RpcRequest, RpcResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

pub use admin::AdminChannel;
pub use app::AppChannel;
pub use config::{ChannelConfig, LifecycleConfig};
pub use tcp::TcpTransport;

/// Request/response transport underneath a channel.
///
/// Implementations must be connected by the time they are constructed;
/// `call` never performs implicit connection setup.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for its response.
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse>;

    /// Re-establish the underlying connection.
    async fn reconnect(&self) -> Result<()> {
        Ok(())
    }

    /// Tear down the underlying connection.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;
}

/// A scoped channel over a [`Transport`].
///
/// Applies the per-call timeout and turns error responses into
/// [`CloneError`] values.
pub struct RpcChannel {
    scope: InterfaceScope,
    transport: Arc<dyn Transport>,
    call_timeout: Option<Duration>,
    closed: AtomicBool,
}

impl RpcChannel {
    pub fn new(
        scope: InterfaceScope,
        transport: Arc<dyn Transport>,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            scope,
            transport,
            call_timeout,
            closed: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> InterfaceScope {
        self.scope
    }

    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Issue a raw request on this channel.
    pub async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        if self.is_closed() {
            return Err(CloneError::Connection(format!(
                "{} channel is closed",
                self.scope
            )));
        }

        let operation = request.operation();
        debug!(scope = %self.scope, operation, "rpc call");

        let response = match self.call_timeout {
            Some(after) => tokio::time::timeout(after, self.transport.call(request))
                .await
                .map_err(|_| CloneError::Timeout {
                    operation: operation.to_string(),
                    after,
                })??,
            None => self.transport.call(request).await?,
        };

        match response {
            RpcResponse::Error(payload) => {
                debug!(scope = %self.scope, operation, kind = %payload.kind, "rpc call rejected");
                Err(payload.into_error())
            }
            other => Ok(other),
        }
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.transport.reconnect().await?;
        self.closed.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.close().await
    }
}

pub(crate) fn unexpected_response(operation: &str, response: &RpcResponse) -> CloneError {
    CloneError::Rpc(format!(
        "unexpected '{}' response to {}",
        response.kind_name(),
        operation
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use crate::protocol::RpcErrorPayload;

    struct Scripted(RpcResponse);

    #[async_trait]
    impl Transport for Scripted {
        async fn call(&self, _request: RpcRequest) -> Result<RpcResponse> {
            Ok(self.0.clone())
        }

        fn endpoint(&self) -> String {
            "scripted".to_string()
        }
    }

    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        async fn call(&self, _request: RpcRequest) -> Result<RpcResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(RpcResponse::CloneCellArchived)
        }

        fn endpoint(&self) -> String {
            "stalled".to_string()
        }
    }

    #[tokio::test]
    async fn test_error_response_becomes_typed_error() {
        let payload = RpcErrorPayload {
            kind: ErrorKind::NotFound,
            message: "Not found: clones.9".into(),
            subject: Some("clones.9".into()),
            limit: None,
        };
        let channel = RpcChannel::new(
            InterfaceScope::App,
            Arc::new(Scripted(RpcResponse::Error(payload))),
            None,
        );

        let err = channel.call(RpcRequest::ListApps).await.unwrap_err();
        assert_eq!(err, CloneError::NotFound("clones.9".into()));
    }

    #[tokio::test]
    async fn test_call_timeout_names_operation() {
        let channel = RpcChannel::new(
            InterfaceScope::App,
            Arc::new(Stalled),
            Some(Duration::from_millis(20)),
        );

        let err = channel
            .call(RpcRequest::AppInfo {
                app_id: "clone-test".into(),
            })
            .await
            .unwrap_err();
        match err {
            CloneError::Timeout { operation, .. } => assert_eq!(operation, "app_info"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_channel_refuses_calls() {
        let channel = RpcChannel::new(
            InterfaceScope::Admin,
            Arc::new(Scripted(RpcResponse::AppsListed(vec![]))),
            None,
        );
        channel.close().await.unwrap();
        assert!(channel.is_closed());

        let err = channel.call(RpcRequest::ListApps).await.unwrap_err();
        assert!(err.is_fatal());

        channel.reconnect().await.unwrap();
        assert!(channel.call(RpcRequest::ListApps).await.is_ok());
    }
}
