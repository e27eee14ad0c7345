// ============================================================================
// clonecell Library
// ============================================================================

pub mod backend;
pub mod connection;
pub mod core;
pub mod orchestrator;
pub mod prelude;
pub mod protocol;
pub mod registry;

// Re-export main types for convenience
pub use crate::core::{
    AppId, ApplicationView, CellId, CloneCell, CloneCellRef, CloneError, CloneId, CloneState,
    ErrorKind, Modifiers, Result, RoleName, RoleView,
};

pub use connection::{
    AdminChannel, AppChannel, ChannelConfig, LifecycleConfig, RpcChannel, TcpTransport, Transport,
};
pub use orchestrator::{
    InstanceState, LifecycleOrchestrator, LifecyclePlan, LifecycleStep, RunOutcome, RunReport,
    RunStatus, Session, run_session,
};
pub use registry::CloneRegistry;

use std::sync::Arc;
use tokio::sync::watch;

// ============================================================================
// High-level Manager API
// ============================================================================

/// Connected clone lifecycle manager for one application
///
/// Owns both channels, the registry and the orchestrator of one session.
///
/// # Examples
///
/// ```no_run
/// use clonecell::{CloneManager, LifecyclePlan, Modifiers};
///
/// # async fn demo() -> clonecell::Result<()> {
/// let manager = CloneManager::connect_from_env().await?;
///
/// let plan = LifecyclePlan::new("clones", Modifiers::new().network_seed("some_seed"));
/// let report = manager.run(plan).await;
/// println!("{}", report.summary());
///
/// manager.close().await;
/// # Ok(())
/// # }
/// ```
pub struct CloneManager {
    session: Session,
    orchestrator: LifecycleOrchestrator,
}

impl CloneManager {
    /// Connect both channels with explicit configuration
    pub async fn connect(config: &LifecycleConfig) -> Result<Self> {
        let session = Session::open(config).await?;
        Ok(Self::from_session(session, &config.app_id))
    }

    /// Connect using `HC_PORT`, `ADMIN_PORT` and friends
    pub async fn connect_from_env() -> Result<Self> {
        let config = LifecycleConfig::from_env()?;
        Self::connect(&config).await
    }

    /// Build on channels that are already connected
    ///
    /// Useful with in-memory transports in tests.
    pub fn with_channels(app_id: &str, app: AppChannel, admin: AdminChannel) -> Self {
        let session = Session {
            app: Arc::new(app),
            admin: Arc::new(admin),
        };
        Self::from_session(session, app_id)
    }

    fn from_session(session: Session, app_id: &str) -> Self {
        let (status, _) = watch::channel(RunStatus::Idle);
        let orchestrator =
            LifecycleOrchestrator::with_status(session.registry(app_id), Arc::new(status));
        Self {
            session,
            orchestrator,
        }
    }

    /// Registry for direct create/archive/delete calls
    pub fn registry(&self) -> &Arc<CloneRegistry> {
        self.orchestrator.registry()
    }

    /// Fresh view of the application
    pub async fn snapshot(&self) -> Result<ApplicationView> {
        self.registry().snapshot().await
    }

    /// Run create → archive → delete once
    pub async fn run(&self, plan: LifecyclePlan) -> RunReport {
        self.orchestrator.run(plan).await
    }

    /// Observe run progress
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.orchestrator.subscribe()
    }

    /// Close both channels
    pub async fn close(&self) {
        self.session.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Conductor, InMemoryTransport, RoleManifest};

    async fn manager() -> CloneManager {
        let conductor = Arc::new(Conductor::new());
        conductor
            .install_app("clone-test", vec![RoleManifest::new("clones", 2)])
            .await
            .unwrap();
        CloneManager::with_channels(
            "clone-test",
            AppChannel::with_transport(InMemoryTransport::app(&conductor), None),
            AdminChannel::with_transport(InMemoryTransport::admin(&conductor), None),
        )
    }

    #[tokio::test]
    async fn test_manager_run() {
        let manager = manager().await;
        let report = manager
            .run(LifecyclePlan::new(
                "clones",
                Modifiers::new().network_seed("some_seed"),
            ))
            .await;

        assert!(report.is_success(), "{}", report.summary());
        assert_eq!(manager.snapshot().await.unwrap().clone_count("clones"), 0);
    }

    #[tokio::test]
    async fn test_manager_close_ends_session() {
        let manager = manager().await;
        manager.close().await;

        let err = manager.snapshot().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
