use super::config::ChannelConfig;
use super::tcp::TcpTransport;
use super::{RpcChannel, Transport, unexpected_response};
use crate::core::{AppId, CloneId, Result};
use crate::protocol::{InterfaceScope, RpcRequest, RpcResponse};
use std::sync::Arc;
use std::time::Duration;

/// Host-scoped administrative channel
///
/// The only path that can permanently delete archived clones.
pub struct AdminChannel {
    channel: RpcChannel,
}

impl AdminChannel {
    /// Connect over TCP
    pub async fn connect(config: ChannelConfig) -> Result<Self> {
        let call_timeout = config.call_timeout;
        let transport = TcpTransport::connect(config).await?;
        Ok(Self::with_transport(Arc::new(transport), call_timeout))
    }

    /// Wrap an already-connected transport
    pub fn with_transport(transport: Arc<dyn Transport>, call_timeout: Option<Duration>) -> Self {
        Self {
            channel: RpcChannel::new(InterfaceScope::Admin, transport, call_timeout),
        }
    }

    pub fn channel(&self) -> &RpcChannel {
        &self.channel
    }

    /// Delete one archived clone, addressed by its role-scoped id
    pub async fn delete_archived_clone(&self, app_id: &str, clone_id: &CloneId) -> Result<()> {
        let request = RpcRequest::DeleteArchivedClone {
            app_id: app_id.to_string(),
            clone_id: clone_id.clone(),
        };
        match self.channel.call(request).await? {
            RpcResponse::ArchivedClonesDeleted { .. } => Ok(()),
            other => Err(unexpected_response("delete_archived_clone", &other)),
        }
    }

    /// Delete every archived clone of a role, returning how many went
    pub async fn delete_archived_clones(&self, app_id: &str, role_name: &str) -> Result<u32> {
        let request = RpcRequest::DeleteArchivedClones {
            app_id: app_id.to_string(),
            role_name: role_name.to_string(),
        };
        match self.channel.call(request).await? {
            RpcResponse::ArchivedClonesDeleted { count } => Ok(count),
            other => Err(unexpected_response("delete_archived_clones", &other)),
        }
    }

    pub async fn list_apps(&self) -> Result<Vec<AppId>> {
        match self.channel.call(RpcRequest::ListApps).await? {
            RpcResponse::AppsListed(apps) => Ok(apps),
            other => Err(unexpected_response("list_apps", &other)),
        }
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.channel.reconnect().await
    }

    pub async fn close(&self) -> Result<()> {
        self.channel.close().await
    }
}
