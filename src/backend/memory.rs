use super::conductor::Conductor;
use crate::connection::Transport;
use crate::core::{CloneError, Result};
use crate::protocol::{InterfaceScope, RpcRequest, RpcResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-process transport straight into a [`Conductor`].
///
/// Simulates one interface of the given scope without a socket.
pub struct InMemoryTransport {
    conductor: Arc<Conductor>,
    scope: InterfaceScope,
    connected: AtomicBool,
}

impl InMemoryTransport {
    pub fn new(conductor: Arc<Conductor>, scope: InterfaceScope) -> Self {
        Self {
            conductor,
            scope,
            connected: AtomicBool::new(true),
        }
    }

    pub fn app(conductor: &Arc<Conductor>) -> Arc<Self> {
        Arc::new(Self::new(Arc::clone(conductor), InterfaceScope::App))
    }

    pub fn admin(conductor: &Arc<Conductor>) -> Arc<Self> {
        Arc::new(Self::new(Arc::clone(conductor), InterfaceScope::Admin))
    }

    /// Simulate the backend dropping the connection.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(CloneError::Connection(format!(
                "{} is disconnected",
                self.endpoint()
            )));
        }
        Ok(self.conductor.handle(self.scope, request).await)
    }

    async fn reconnect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("memory://{}", self.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RoleManifest;

    #[tokio::test]
    async fn test_disconnect_and_reconnect() {
        let conductor = Arc::new(Conductor::new());
        conductor
            .install_app("clone-test", vec![RoleManifest::new("clones", 1)])
            .await
            .unwrap();
        let transport = InMemoryTransport::admin(&conductor);

        transport.disconnect();
        let err = transport.call(RpcRequest::ListApps).await.unwrap_err();
        assert!(err.is_fatal());

        transport.reconnect().await.unwrap();
        let response = transport.call(RpcRequest::ListApps).await.unwrap();
        assert_eq!(response, RpcResponse::AppsListed(vec!["clone-test".into()]));
    }
}
