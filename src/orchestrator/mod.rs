pub mod report;

use crate::connection::{AdminChannel, AppChannel, LifecycleConfig};
use crate::core::{CloneCellRef, CloneError, Result};
use crate::registry::CloneRegistry;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Instrument, info, info_span, warn};

pub use report::{
    InstanceState, LifecyclePlan, LifecycleStep, RunOutcome, RunReport, RunStatus, StepSnapshot,
};

/// Runs create → archive → delete for one clone, strictly in order.
///
/// A failed step ends the run; nothing is retried. The report says which
/// step failed, with which error, and how far the clone got.
pub struct LifecycleOrchestrator {
    registry: Arc<CloneRegistry>,
    status: Arc<watch::Sender<RunStatus>>,
}

impl LifecycleOrchestrator {
    pub fn new(registry: Arc<CloneRegistry>) -> Self {
        let (status, _) = watch::channel(RunStatus::Idle);
        Self::with_status(registry, Arc::new(status))
    }

    /// Publish status on an existing sender, so subscribers can attach
    /// before the channels are even connected.
    pub fn with_status(registry: Arc<CloneRegistry>, status: Arc<watch::Sender<RunStatus>>) -> Self {
        Self { registry, status }
    }

    pub fn registry(&self) -> &Arc<CloneRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    pub async fn run(&self, plan: LifecyclePlan) -> RunReport {
        let mut report = RunReport::start(self.registry.app_id(), plan);
        let span = info_span!(
            "lifecycle.run",
            run_id = %report.run_id,
            app_id = %report.app_id,
            role = %report.plan.role_name
        );

        self.execute(&mut report).instrument(span).await;
        self.status
            .send_replace(RunStatus::Finished(Box::new(report.clone())));
        report
    }

    async fn execute(&self, report: &mut RunReport) {
        let _role = self.registry.lock_role(&report.plan.role_name).await;

        self.enter(LifecycleStep::Baseline);
        match self.registry.snapshot().await {
            Ok(view) => report.snapshots.push(StepSnapshot {
                after: LifecycleStep::Baseline,
                view,
            }),
            Err(err) => warn!(error = %err, "baseline snapshot failed"),
        }

        self.enter(LifecycleStep::Create);
        let plan = &report.plan;
        let created = self
            .registry
            .create_named(&plan.role_name, &plan.modifiers, plan.name.as_deref())
            .await;
        let clone = match created {
            Ok(clone) => clone,
            Err(err) => return self.abort(report, LifecycleStep::Create, err).await,
        };
        report.clone = Some(clone.clone());
        self.advance(report, LifecycleStep::Create).await;

        // Both later steps address the clone by the id the backend returned.
        let clone_id = clone.clone_id;

        self.enter(LifecycleStep::Archive);
        if let Err(err) = self
            .registry
            .archive(&CloneCellRef::CloneId(clone_id.clone()))
            .await
        {
            return self.abort(report, LifecycleStep::Archive, err).await;
        }
        self.advance(report, LifecycleStep::Archive).await;

        self.enter(LifecycleStep::Delete);
        if let Err(err) = self.registry.delete(&clone_id).await {
            return self.abort(report, LifecycleStep::Delete, err).await;
        }
        self.advance(report, LifecycleStep::Delete).await;

        info!(clone_id = %clone_id, "lifecycle run completed");
        let final_view = report.snapshots.last().map(|s| s.view.clone());
        report.finish(final_view);
    }

    fn enter(&self, step: LifecycleStep) {
        self.status.send_replace(RunStatus::Running(step));
    }

    async fn advance(&self, report: &mut RunReport, step: LifecycleStep) {
        if let Some(state) = InstanceState::after(step) {
            report.reached = state;
        }
        if let Some(view) = self.current_view().await {
            report.snapshots.push(StepSnapshot { after: step, view });
        }
    }

    async fn abort(&self, report: &mut RunReport, step: LifecycleStep, error: CloneError) {
        warn!(%step, kind = %error.kind(), error = %error, "lifecycle run stopped");
        report.fail(step, error);

        // Record what the backend holds now, not what the cache last saw.
        let final_view = match self.registry.snapshot().await {
            Ok(view) => Some(view),
            Err(err) => {
                warn!(error = %err, "final snapshot failed");
                None
            }
        };
        report.finish(final_view);
    }

    /// The registry refreshes after each mutation; only re-query when that
    /// refresh was lost.
    async fn current_view(&self) -> Option<crate::core::ApplicationView> {
        if let Some(view) = self.registry.view().await {
            return Some(view);
        }
        match self.registry.snapshot().await {
            Ok(view) => Some(view),
            Err(err) => {
                warn!(error = %err, "diagnostic snapshot failed");
                None
            }
        }
    }
}

/// Both channels of one session.
pub struct Session {
    pub app: Arc<AppChannel>,
    pub admin: Arc<AdminChannel>,
}

impl Session {
    /// Connect both channels concurrently; either failing fails the session.
    pub async fn open(config: &LifecycleConfig) -> Result<Self> {
        config.validate().map_err(CloneError::Connection)?;
        let (app, admin) = tokio::try_join!(
            AppChannel::connect(config.app.clone()),
            AdminChannel::connect(config.admin.clone())
        )?;
        Ok(Self {
            app: Arc::new(app),
            admin: Arc::new(admin),
        })
    }

    pub fn registry(&self, app_id: &str) -> Arc<CloneRegistry> {
        Arc::new(CloneRegistry::new(
            app_id,
            Arc::clone(&self.app),
            Arc::clone(&self.admin),
        ))
    }

    pub async fn close(&self) {
        if let Err(err) = self.app.close().await {
            warn!(error = %err, "closing app channel failed");
        }
        if let Err(err) = self.admin.close().await {
            warn!(error = %err, "closing admin channel failed");
        }
    }
}

/// Connect, run one lifecycle and tear the session down.
///
/// Status is published on `status` throughout, including the connect phase.
pub async fn run_session(
    config: &LifecycleConfig,
    plan: LifecyclePlan,
    status: Arc<watch::Sender<RunStatus>>,
) -> RunReport {
    status.send_replace(RunStatus::Running(LifecycleStep::Connect));

    let session = match Session::open(config).await {
        Ok(session) => session,
        Err(err) => {
            warn!(error = %err, "could not open session");
            let mut report = RunReport::start(&config.app_id, plan);
            report.fail(LifecycleStep::Connect, err);
            report.finish(None);
            status.send_replace(RunStatus::Finished(Box::new(report.clone())));
            return report;
        }
    };

    let orchestrator = LifecycleOrchestrator::with_status(session.registry(&config.app_id), status);
    let report = orchestrator.run(plan).await;
    session.close().await;
    report
}
