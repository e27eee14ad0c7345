//! Typed messages exchanged over the application and admin interfaces.

pub mod codec;

use crate::core::{
    AppId, ApplicationView, CloneCell, CloneCellRef, CloneError, CloneId, ErrorKind, Modifiers,
    RoleName,
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use codec::{DEFAULT_MAX_FRAME_BYTES, Frame, read_frame, write_frame};

/// Privilege scope of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceScope {
    /// One installed application
    App,
    /// The whole host
    Admin,
}

impl fmt::Display for InterfaceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceScope::App => f.write_str("app"),
            InterfaceScope::Admin => f.write_str("admin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RpcRequest {
    AppInfo {
        app_id: AppId,
    },
    CreateCloneCell {
        app_id: AppId,
        role_name: RoleName,
        modifiers: Modifiers,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    ArchiveCloneCell {
        app_id: AppId,
        clone_cell: CloneCellRef,
    },
    RestoreCloneCell {
        app_id: AppId,
        clone_cell: CloneCellRef,
    },
    DeleteArchivedClone {
        app_id: AppId,
        clone_id: CloneId,
    },
    DeleteArchivedClones {
        app_id: AppId,
        role_name: RoleName,
    },
    ListApps,
}

impl RpcRequest {
    /// Operation name used in logs and timeout errors.
    pub fn operation(&self) -> &'static str {
        match self {
            RpcRequest::AppInfo { .. } => "app_info",
            RpcRequest::CreateCloneCell { .. } => "create_clone_cell",
            RpcRequest::ArchiveCloneCell { .. } => "archive_clone_cell",
            RpcRequest::RestoreCloneCell { .. } => "restore_clone_cell",
            RpcRequest::DeleteArchivedClone { .. } => "delete_archived_clone",
            RpcRequest::DeleteArchivedClones { .. } => "delete_archived_clones",
            RpcRequest::ListApps => "list_apps",
        }
    }

    /// Interface a request must be sent on.
    pub fn scope(&self) -> InterfaceScope {
        match self {
            RpcRequest::AppInfo { .. }
            | RpcRequest::CreateCloneCell { .. }
            | RpcRequest::ArchiveCloneCell { .. }
            | RpcRequest::RestoreCloneCell { .. } => InterfaceScope::App,
            RpcRequest::DeleteArchivedClone { .. }
            | RpcRequest::DeleteArchivedClones { .. }
            | RpcRequest::ListApps => InterfaceScope::Admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RpcResponse {
    AppInfo(Option<ApplicationView>),
    CloneCellCreated(CloneCell),
    CloneCellArchived,
    CloneCellRestored(CloneCell),
    ArchivedClonesDeleted { count: u32 },
    AppsListed(Vec<AppId>),
    Error(RpcErrorPayload),
}

impl RpcResponse {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RpcResponse::AppInfo(_) => "app_info",
            RpcResponse::CloneCellCreated(_) => "clone_cell_created",
            RpcResponse::CloneCellArchived => "clone_cell_archived",
            RpcResponse::CloneCellRestored(_) => "clone_cell_restored",
            RpcResponse::ArchivedClonesDeleted { .. } => "archived_clones_deleted",
            RpcResponse::AppsListed(_) => "apps_listed",
            RpcResponse::Error(_) => "error",
        }
    }
}

/// Error as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl From<&CloneError> for RpcErrorPayload {
    fn from(err: &CloneError) -> Self {
        let (subject, limit) = match err {
            CloneError::CapacityExceeded { role, limit } => (Some(role.clone()), Some(*limit)),
            CloneError::InvalidModifiers(s)
            | CloneError::NotFound(s)
            | CloneError::AlreadyArchived(s)
            | CloneError::NotArchived(s)
            | CloneError::Forbidden(s) => (Some(s.clone()), None),
            CloneError::Timeout { operation, .. } => (Some(operation.clone()), None),
            CloneError::Connection(_) | CloneError::Rpc(_) => (None, None),
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            subject,
            limit,
        }
    }
}

impl RpcErrorPayload {
    /// Rebuild the typed error on the calling side.
    ///
    /// Transport kinds reported by the remote end describe a backend fault,
    /// not a local connection problem, and come back as `Rpc`.
    pub fn into_error(self) -> CloneError {
        let subject = self.subject.unwrap_or_else(|| self.message.clone());
        match self.kind {
            ErrorKind::CapacityExceeded => CloneError::CapacityExceeded {
                role: subject,
                limit: self.limit.unwrap_or_default(),
            },
            ErrorKind::InvalidModifiers => CloneError::InvalidModifiers(subject),
            ErrorKind::NotFound => CloneError::NotFound(subject),
            ErrorKind::AlreadyArchived => CloneError::AlreadyArchived(subject),
            ErrorKind::NotArchived => CloneError::NotArchived(subject),
            ErrorKind::Forbidden => CloneError::Forbidden(subject),
            ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Rpc => {
                CloneError::Rpc(self.message)
            }
        }
    }
}

impl From<CloneError> for RpcResponse {
    fn from(err: CloneError) -> Self {
        RpcResponse::Error(RpcErrorPayload::from(&err))
    }
}
