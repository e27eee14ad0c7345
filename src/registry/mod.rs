use crate::connection::{AdminChannel, AppChannel};
use crate::core::{
    AppId, ApplicationView, CloneCell, CloneCellRef, CloneError, CloneId, Modifiers, Result,
    RoleName,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{info, warn};

/// Held for the duration of a lifecycle run on one role.
pub type RoleGuard = OwnedMutexGuard<()>;

/// Session-local view of one application's clones.
///
/// Reads go to the application channel, deletion to the admin channel.
/// After every successful mutation the view is rebuilt from a fresh
/// `app_info` query; if that query fails the view is dropped instead of
/// being patched locally. Other sessions may change clones at any time, so
/// state transitions are always decided by the backend, never by the view.
pub struct CloneRegistry {
    app_id: AppId,
    app: Arc<AppChannel>,
    admin: Arc<AdminChannel>,
    view: RwLock<Option<ApplicationView>>,
    role_locks: Mutex<HashMap<RoleName, Arc<Mutex<()>>>>,
}

impl CloneRegistry {
    pub fn new(app_id: &str, app: Arc<AppChannel>, admin: Arc<AdminChannel>) -> Self {
        Self {
            app_id: app_id.to_string(),
            app,
            admin,
            view: RwLock::new(None),
            role_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn app_channel(&self) -> &Arc<AppChannel> {
        &self.app
    }

    pub fn admin_channel(&self) -> &Arc<AdminChannel> {
        &self.admin
    }

    /// Query the backend and replace the local view.
    pub async fn snapshot(&self) -> Result<ApplicationView> {
        let view = self
            .app
            .app_info(&self.app_id)
            .await?
            .ok_or_else(|| CloneError::NotFound(format!("app '{}'", self.app_id)))?;

        *self.view.write().await = Some(view.clone());
        Ok(view)
    }

    /// Last snapshot, `None` if none was taken or the last refresh failed.
    pub async fn view(&self) -> Option<ApplicationView> {
        self.view.read().await.clone()
    }

    pub async fn instances(&self, role_name: &str) -> Vec<CloneCell> {
        self.view
            .read()
            .await
            .as_ref()
            .and_then(|view| view.role(role_name))
            .map(|role| role.clones.clone())
            .unwrap_or_default()
    }

    pub async fn get(&self, target: &CloneCellRef) -> Option<CloneCell> {
        self.view
            .read()
            .await
            .as_ref()
            .and_then(|view| view.find(target))
            .cloned()
    }

    pub async fn create(&self, role_name: &str, modifiers: &Modifiers) -> Result<CloneCell> {
        self.create_named(role_name, modifiers, None).await
    }

    /// Create a clone; the returned identity is the only valid handle to it.
    pub async fn create_named(
        &self,
        role_name: &str,
        modifiers: &Modifiers,
        name: Option<&str>,
    ) -> Result<CloneCell> {
        if role_name.trim().is_empty() {
            return Err(CloneError::NotFound("role ''".into()));
        }
        if let Some(view) = self.view.read().await.as_ref() {
            if view.role(role_name).is_none() {
                return Err(CloneError::NotFound(format!("role '{}'", role_name)));
            }
        }

        let clone = self
            .app
            .create_clone_cell(&self.app_id, role_name, modifiers, name)
            .await?;
        info!(clone_id = %clone.clone_id, cell_id = %clone.cell_id, "clone created");

        self.refresh_after("create").await;
        Ok(clone)
    }

    /// Archive a clone. A repeat call fails with `AlreadyArchived`.
    pub async fn archive(&self, target: &CloneCellRef) -> Result<()> {
        Self::ensure_ref(target)?;
        self.app.archive_clone_cell(&self.app_id, target).await?;
        info!(clone = %target, "clone archived");

        self.refresh_after("archive").await;
        Ok(())
    }

    /// Bring an archived clone back to active.
    pub async fn restore(&self, target: &CloneCellRef) -> Result<CloneCell> {
        Self::ensure_ref(target)?;
        let clone = self.app.restore_clone_cell(&self.app_id, target).await?;
        info!(clone_id = %clone.clone_id, "clone restored");

        self.refresh_after("restore").await;
        Ok(clone)
    }

    /// Permanently delete an archived clone over the admin channel.
    pub async fn delete(&self, clone_id: &CloneId) -> Result<()> {
        Self::ensure_ref(&CloneCellRef::CloneId(clone_id.clone()))?;
        self.admin
            .delete_archived_clone(&self.app_id, clone_id)
            .await?;
        info!(clone_id = %clone_id, "clone deleted");

        self.refresh_after("delete").await;
        Ok(())
    }

    /// Delete every archived clone of a role.
    pub async fn delete_all_archived(&self, role_name: &str) -> Result<u32> {
        let count = self
            .admin
            .delete_archived_clones(&self.app_id, role_name)
            .await?;
        info!(role = role_name, count, "archived clones deleted");

        self.refresh_after("delete_all_archived").await;
        Ok(count)
    }

    /// Serialize lifecycle runs that target the same role.
    pub async fn lock_role(&self, role_name: &str) -> RoleGuard {
        let lock = {
            let mut locks = self.role_locks.lock().await;
            Arc::clone(
                locks
                    .entry(role_name.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    async fn refresh_after(&self, operation: &str) {
        if let Err(err) = self.snapshot().await {
            warn!(operation, error = %err, "view refresh failed, dropping cached view");
            *self.view.write().await = None;
        }
    }

    fn ensure_ref(target: &CloneCellRef) -> Result<()> {
        if target.is_blank() {
            return Err(CloneError::NotFound("empty clone reference".into()));
        }
        Ok(())
    }
}
