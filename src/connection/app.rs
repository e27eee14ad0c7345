use super::config::ChannelConfig;
use super::tcp::TcpTransport;
use super::{RpcChannel, Transport, unexpected_response};
use crate::core::{ApplicationView, CloneCell, CloneCellRef, Modifiers, Result};
use crate::protocol::{InterfaceScope, RpcRequest, RpcResponse};
use std::sync::Arc;
use std::time::Duration;

/// Application-scoped channel
///
/// Can inspect an installed application and create, archive and restore its
/// clones. It cannot delete them.
pub struct AppChannel {
    channel: RpcChannel,
}

impl AppChannel {
    /// Connect over TCP
    pub async fn connect(config: ChannelConfig) -> Result<Self> {
        let call_timeout = config.call_timeout;
        let transport = TcpTransport::connect(config).await?;
        Ok(Self::with_transport(Arc::new(transport), call_timeout))
    }

    /// Wrap an already-connected transport
    pub fn with_transport(transport: Arc<dyn Transport>, call_timeout: Option<Duration>) -> Self {
        Self {
            channel: RpcChannel::new(InterfaceScope::App, transport, call_timeout),
        }
    }

    pub fn channel(&self) -> &RpcChannel {
        &self.channel
    }

    /// Current view of an application, `None` if it is not installed
    pub async fn app_info(&self, app_id: &str) -> Result<Option<ApplicationView>> {
        let request = RpcRequest::AppInfo {
            app_id: app_id.to_string(),
        };
        match self.channel.call(request).await? {
            RpcResponse::AppInfo(view) => Ok(view),
            other => Err(unexpected_response("app_info", &other)),
        }
    }

    pub async fn create_clone_cell(
        &self,
        app_id: &str,
        role_name: &str,
        modifiers: &Modifiers,
        name: Option<&str>,
    ) -> Result<CloneCell> {
        let request = RpcRequest::CreateCloneCell {
            app_id: app_id.to_string(),
            role_name: role_name.to_string(),
            modifiers: modifiers.clone(),
            name: name.map(str::to_string),
        };
        match self.channel.call(request).await? {
            RpcResponse::CloneCellCreated(cell) => Ok(cell),
            other => Err(unexpected_response("create_clone_cell", &other)),
        }
    }

    pub async fn archive_clone_cell(&self, app_id: &str, clone_cell: &CloneCellRef) -> Result<()> {
        let request = RpcRequest::ArchiveCloneCell {
            app_id: app_id.to_string(),
            clone_cell: clone_cell.clone(),
        };
        match self.channel.call(request).await? {
            RpcResponse::CloneCellArchived => Ok(()),
            other => Err(unexpected_response("archive_clone_cell", &other)),
        }
    }

    pub async fn restore_clone_cell(
        &self,
        app_id: &str,
        clone_cell: &CloneCellRef,
    ) -> Result<CloneCell> {
        let request = RpcRequest::RestoreCloneCell {
            app_id: app_id.to_string(),
            clone_cell: clone_cell.clone(),
        };
        match self.channel.call(request).await? {
            RpcResponse::CloneCellRestored(cell) => Ok(cell),
            other => Err(unexpected_response("restore_clone_cell", &other)),
        }
    }

    pub async fn reconnect(&self) -> Result<()> {
        self.channel.reconnect().await
    }

    pub async fn close(&self) -> Result<()> {
        self.channel.close().await
    }
}
