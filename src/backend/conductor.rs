use crate::core::{
    AppId, ApplicationView, CellId, CloneCell, CloneCellRef, CloneError, CloneId, CloneIndex,
    CloneState, Modifiers, Result, RoleName, RoleView,
};
use crate::protocol::{InterfaceScope, RpcRequest, RpcResponse};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Role declared by an installed application.
#[derive(Debug, Clone)]
pub struct RoleManifest {
    pub role_name: RoleName,
    pub clone_limit: u32,
}

impl RoleManifest {
    pub fn new(role_name: &str, clone_limit: u32) -> Self {
        Self {
            role_name: role_name.to_string(),
            clone_limit,
        }
    }
}

#[derive(Debug)]
struct RoleState {
    clone_limit: u32,
    /// Never decremented, so indices are not reused after deletion
    next_index: CloneIndex,
    clones: BTreeMap<CloneIndex, CloneCell>,
}

#[derive(Debug)]
struct InstalledApp {
    roles: BTreeMap<RoleName, RoleState>,
}

impl InstalledApp {
    fn view(&self, app_id: &str) -> ApplicationView {
        let roles = self
            .roles
            .iter()
            .map(|(name, state)| {
                (
                    name.clone(),
                    RoleView {
                        role_name: name.clone(),
                        clone_limit: state.clone_limit,
                        clones: state.clones.values().cloned().collect(),
                    },
                )
            })
            .collect();
        ApplicationView {
            app_id: app_id.to_string(),
            roles,
        }
    }

    fn find_mut(&mut self, target: &CloneCellRef) -> Result<&mut CloneCell> {
        self.roles
            .values_mut()
            .flat_map(|role| role.clones.values_mut())
            .find(|clone| clone.matches(target))
            .ok_or_else(|| CloneError::NotFound(target.to_string()))
    }
}

/// In-memory backend holding installed applications and their clones.
///
/// Enforces clone limits, the legal state transitions and interface
/// privileges. Used as a test double and as a local development server.
#[derive(Default)]
pub struct Conductor {
    apps: RwLock<HashMap<AppId, InstalledApp>>,
}

impl Conductor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn install_app(&self, app_id: &str, roles: Vec<RoleManifest>) -> Result<()> {
        if app_id.trim().is_empty() {
            return Err(CloneError::Rpc("app_id must not be empty".into()));
        }
        let mut apps = self.apps.write().await;
        if apps.contains_key(app_id) {
            return Err(CloneError::Rpc(format!(
                "app '{}' is already installed",
                app_id
            )));
        }

        let roles = roles
            .into_iter()
            .map(|manifest| {
                (
                    manifest.role_name,
                    RoleState {
                        clone_limit: manifest.clone_limit,
                        next_index: 0,
                        clones: BTreeMap::new(),
                    },
                )
            })
            .collect();
        apps.insert(app_id.to_string(), InstalledApp { roles });
        Ok(())
    }

    /// Serve one request arriving on an interface of the given scope.
    pub async fn handle(&self, scope: InterfaceScope, request: RpcRequest) -> RpcResponse {
        let operation = request.operation();
        if request.scope() != scope {
            return CloneError::Forbidden(format!(
                "{} is not available on the {} interface",
                operation, scope
            ))
            .into();
        }

        let result = match request {
            RpcRequest::AppInfo { app_id } => Ok(RpcResponse::AppInfo(self.app_info(&app_id).await)),
            RpcRequest::CreateCloneCell {
                app_id,
                role_name,
                modifiers,
                name,
            } => self
                .create_clone_cell(&app_id, &role_name, modifiers, name)
                .await
                .map(RpcResponse::CloneCellCreated),
            RpcRequest::ArchiveCloneCell { app_id, clone_cell } => self
                .archive_clone_cell(&app_id, &clone_cell)
                .await
                .map(|_| RpcResponse::CloneCellArchived),
            RpcRequest::RestoreCloneCell { app_id, clone_cell } => self
                .restore_clone_cell(&app_id, &clone_cell)
                .await
                .map(RpcResponse::CloneCellRestored),
            RpcRequest::DeleteArchivedClone { app_id, clone_id } => self
                .delete_archived_clone(&app_id, &clone_id)
                .await
                .map(|_| RpcResponse::ArchivedClonesDeleted { count: 1 }),
            RpcRequest::DeleteArchivedClones { app_id, role_name } => self
                .delete_archived_clones(&app_id, &role_name)
                .await
                .map(|count| RpcResponse::ArchivedClonesDeleted { count }),
            RpcRequest::ListApps => Ok(RpcResponse::AppsListed(self.list_apps().await)),
        };

        match result {
            Ok(response) => response,
            Err(err) => {
                debug!(operation, error = %err, "conductor rejected request");
                err.into()
            }
        }
    }

    pub async fn app_info(&self, app_id: &str) -> Option<ApplicationView> {
        let apps = self.apps.read().await;
        apps.get(app_id).map(|app| app.view(app_id))
    }

    pub async fn list_apps(&self) -> Vec<AppId> {
        let apps = self.apps.read().await;
        let mut ids: Vec<AppId> = apps.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn create_clone_cell(
        &self,
        app_id: &str,
        role_name: &str,
        modifiers: Modifiers,
        name: Option<String>,
    ) -> Result<CloneCell> {
        validate_modifiers(&modifiers)?;

        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(app_id)
            .ok_or_else(|| CloneError::NotFound(format!("app '{}'", app_id)))?;
        let role = app
            .roles
            .get_mut(role_name)
            .ok_or_else(|| CloneError::NotFound(format!("role '{}'", role_name)))?;

        if role.clones.len() >= role.clone_limit as usize {
            return Err(CloneError::CapacityExceeded {
                role: role_name.to_string(),
                limit: role.clone_limit,
            });
        }

        let index = role.next_index;
        role.next_index += 1;

        let clone = CloneCell {
            clone_id: CloneId::compose(role_name, index),
            cell_id: CellId::new(format!("cell-{}", Uuid::new_v4())),
            role_name: role_name.to_string(),
            index,
            modifiers,
            state: CloneState::Active,
            name,
        };
        role.clones.insert(index, clone.clone());
        Ok(clone)
    }

    pub async fn archive_clone_cell(&self, app_id: &str, target: &CloneCellRef) -> Result<()> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(app_id)
            .ok_or_else(|| CloneError::NotFound(format!("app '{}'", app_id)))?;
        let clone = app.find_mut(target)?;

        if clone.state == CloneState::Archived {
            return Err(CloneError::AlreadyArchived(clone.clone_id.to_string()));
        }
        clone.state = CloneState::Archived;
        Ok(())
    }

    pub async fn restore_clone_cell(&self, app_id: &str, target: &CloneCellRef) -> Result<CloneCell> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(app_id)
            .ok_or_else(|| CloneError::NotFound(format!("app '{}'", app_id)))?;
        let clone = app.find_mut(target)?;

        if clone.state == CloneState::Active {
            return Err(CloneError::NotArchived(clone.clone_id.to_string()));
        }
        clone.state = CloneState::Active;
        Ok(clone.clone())
    }

    pub async fn delete_archived_clone(&self, app_id: &str, clone_id: &CloneId) -> Result<()> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(app_id)
            .ok_or_else(|| CloneError::NotFound(format!("app '{}'", app_id)))?;

        for role in app.roles.values_mut() {
            let Some(index) = role
                .clones
                .iter()
                .find(|(_, clone)| &clone.clone_id == clone_id)
                .map(|(index, _)| *index)
            else {
                continue;
            };

            if role.clones[&index].state != CloneState::Archived {
                return Err(CloneError::NotArchived(clone_id.to_string()));
            }
            role.clones.remove(&index);
            return Ok(());
        }

        Err(CloneError::NotFound(clone_id.to_string()))
    }

    pub async fn delete_archived_clones(&self, app_id: &str, role_name: &str) -> Result<u32> {
        let mut apps = self.apps.write().await;
        let app = apps
            .get_mut(app_id)
            .ok_or_else(|| CloneError::NotFound(format!("app '{}'", app_id)))?;
        let role = app
            .roles
            .get_mut(role_name)
            .ok_or_else(|| CloneError::NotFound(format!("role '{}'", role_name)))?;

        let before = role.clones.len();
        role.clones.retain(|_, clone| clone.state != CloneState::Archived);
        Ok((before - role.clones.len()) as u32)
    }
}

fn validate_modifiers(modifiers: &Modifiers) -> Result<()> {
    if modifiers.is_empty() {
        return Err(CloneError::InvalidModifiers(
            "at least one modifier must be set".into(),
        ));
    }

    for (key, value) in modifiers.iter() {
        match key.as_str() {
            Modifiers::NETWORK_SEED => {
                if !value.as_str().is_some_and(|seed| !seed.is_empty()) {
                    return Err(CloneError::InvalidModifiers(
                        "network_seed must be a non-empty string".into(),
                    ));
                }
            }
            Modifiers::ORIGIN_TIME => {
                if !matches!(value, Value::Number(n) if n.is_i64()) {
                    return Err(CloneError::InvalidModifiers(
                        "origin_time must be an integer".into(),
                    ));
                }
            }
            Modifiers::PROPERTIES => {}
            other => {
                return Err(CloneError::InvalidModifiers(format!(
                    "unknown modifier '{}'",
                    other
                )));
            }
        }
    }
    Ok(())
}
