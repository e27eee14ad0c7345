use crate::core::{AppId, ApplicationView, CloneCell, CloneError, Modifiers, RoleName};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use uuid::Uuid;

/// Steps of a lifecycle run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStep {
    Connect,
    Baseline,
    Create,
    Archive,
    Delete,
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleStep::Connect => "connect",
            LifecycleStep::Baseline => "baseline",
            LifecycleStep::Create => "create",
            LifecycleStep::Archive => "archive",
            LifecycleStep::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Where the clone of a run has got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Nonexistent,
    Active,
    Archived,
    Deleted,
}

impl InstanceState {
    /// The state a successful step moves to, if the step is a transition.
    pub fn after(step: LifecycleStep) -> Option<InstanceState> {
        match step {
            LifecycleStep::Create => Some(InstanceState::Active),
            LifecycleStep::Archive => Some(InstanceState::Archived),
            LifecycleStep::Delete => Some(InstanceState::Deleted),
            LifecycleStep::Connect | LifecycleStep::Baseline => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecyclePlan {
    pub role_name: RoleName,
    pub modifiers: Modifiers,
    pub name: Option<String>,
}

impl LifecyclePlan {
    pub fn new(role_name: &str, modifiers: Modifiers) -> Self {
        Self {
            role_name: role_name.to_string(),
            modifiers,
            name: None,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Failed {
        step: LifecycleStep,
        error: CloneError,
    },
}

/// View recorded once a step finished.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSnapshot {
    pub after: LifecycleStep,
    pub view: ApplicationView,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub app_id: AppId,
    pub plan: LifecyclePlan,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub clone: Option<CloneCell>,
    pub reached: InstanceState,
    pub outcome: RunOutcome,
    pub snapshots: Vec<StepSnapshot>,
    pub final_view: Option<ApplicationView>,
}

impl RunReport {
    pub(crate) fn start(app_id: &str, plan: LifecyclePlan) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            app_id: app_id.to_string(),
            plan,
            started_at: Utc::now(),
            finished_at: None,
            clone: None,
            reached: InstanceState::Nonexistent,
            outcome: RunOutcome::Completed,
            snapshots: Vec::new(),
            final_view: None,
        }
    }

    pub(crate) fn fail(&mut self, step: LifecycleStep, error: CloneError) {
        self.outcome = RunOutcome::Failed { step, error };
    }

    pub(crate) fn finish(&mut self, final_view: Option<ApplicationView>) {
        self.final_view = final_view;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn failed_step(&self) -> Option<LifecycleStep> {
        match &self.outcome {
            RunOutcome::Failed { step, .. } => Some(*step),
            RunOutcome::Completed => None,
        }
    }

    pub fn error(&self) -> Option<&CloneError> {
        match &self.outcome {
            RunOutcome::Failed { error, .. } => Some(error),
            RunOutcome::Completed => None,
        }
    }

    /// Snapshot recorded after `step`, if one was taken.
    pub fn snapshot_after(&self, step: LifecycleStep) -> Option<&ApplicationView> {
        self.snapshots
            .iter()
            .find(|snapshot| snapshot.after == step)
            .map(|snapshot| &snapshot.view)
    }

    pub fn summary(&self) -> String {
        let clone = self
            .clone
            .as_ref()
            .map(|c| c.clone_id.to_string())
            .unwrap_or_else(|| "-".to_string());
        match &self.outcome {
            RunOutcome::Completed => format!(
                "run {} completed: clone {} {:?}",
                self.run_id, clone, self.reached
            ),
            RunOutcome::Failed { step, error } => format!(
                "run {} failed at {} ({}): {}; clone {} left {:?}",
                self.run_id,
                step,
                error.kind(),
                error,
                clone,
                self.reached
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        let outcome = match &self.outcome {
            RunOutcome::Completed => json!({"status": "completed"}),
            RunOutcome::Failed { step, error } => json!({
                "status": "failed",
                "step": step,
                "kind": error.kind(),
                "message": error.to_string(),
            }),
        };
        json!({
            "run_id": self.run_id.to_string(),
            "app_id": self.app_id,
            "plan": self.plan,
            "started_at": self.started_at.to_rfc3339(),
            "finished_at": self.finished_at.map(|t| t.to_rfc3339()),
            "clone": self.clone,
            "reached": self.reached,
            "outcome": outcome,
            "final_view": self.final_view,
        })
    }
}

/// What subscribers see while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Idle,
    Running(LifecycleStep),
    Finished(Box<RunReport>),
}

impl RunStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, RunStatus::Running(_))
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunStatus::Finished(report) => Some(report),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_after_step() {
        assert_eq!(
            InstanceState::after(LifecycleStep::Archive),
            Some(InstanceState::Archived)
        );
        assert_eq!(InstanceState::after(LifecycleStep::Baseline), None);
    }

    #[test]
    fn test_failed_report_summary() {
        let mut report = RunReport::start(
            "clone-test",
            LifecyclePlan::new("clones", Modifiers::new().network_seed("s")),
        );
        report.reached = InstanceState::Active;
        report.fail(
            LifecycleStep::Archive,
            CloneError::Rpc("backend hiccup".into()),
        );
        report.finish(None);

        assert!(!report.is_success());
        assert_eq!(report.failed_step(), Some(LifecycleStep::Archive));
        assert!(report.summary().contains("failed at archive (rpc)"));

        let json = report.to_json();
        assert_eq!(json["outcome"]["step"], "archive");
        assert_eq!(json["reached"], "active");
        assert!(json["finished_at"].is_string());
    }
}
