use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{BuildId, BuildStatus};

/// How a lease ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FinishOutcome {
    Success,
    Failure,
    Cancelled,
}

/// Dispatcher-observed lifecycle of a lease.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "outcome")]
pub enum LeaseState {
    Scheduled,
    Started,
    Finished(FinishOutcome),
}

impl LeaseState {
    pub fn is_finished(&self) -> bool {
        matches!(self, LeaseState::Finished(_))
    }
}

impl From<BuildStatus> for LeaseState {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::Scheduled | BuildStatus::Unspecified => LeaseState::Scheduled,
            BuildStatus::Started => LeaseState::Started,
            BuildStatus::Success => LeaseState::Finished(FinishOutcome::Success),
            BuildStatus::Failure | BuildStatus::InfraFailure => {
                LeaseState::Finished(FinishOutcome::Failure)
            }
            BuildStatus::Canceled => LeaseState::Finished(FinishOutcome::Cancelled),
        }
    }
}

/// A dispatched lease, owned and updated by the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseTask {
    id: BuildId,
    state: LeaseState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assigned_host: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    started_at: Option<OffsetDateTime>,
}

impl LeaseTask {
    /// A freshly submitted lease.
    pub fn scheduled(id: BuildId, created_at: OffsetDateTime) -> Self {
        Self {
            id,
            state: LeaseState::Scheduled,
            assigned_host: None,
            created_at,
            started_at: None,
        }
    }

    pub fn id(&self) -> BuildId {
        self.id
    }

    pub fn state(&self) -> LeaseState {
        self.state
    }

    /// Set only once the lease has started.
    pub fn assigned_host(&self) -> Option<&str> {
        self.assigned_host.as_deref()
    }

    pub fn started_at(&self) -> Option<OffsetDateTime> {
        self.started_at
    }

    /// Scheduled -> Started, recording the assigned host.
    ///
    /// Ignored unless the lease is still scheduled.
    pub fn mark_started(&mut self, host: impl Into<String>, at: OffsetDateTime) {
        if self.state == LeaseState::Scheduled {
            self.state = LeaseState::Started;
            self.assigned_host = Some(host.into());
            self.started_at = Some(at);
        }
    }

    /// Any state -> Finished. Finishing twice keeps the first outcome.
    pub fn mark_finished(&mut self, outcome: FinishOutcome) {
        if !self.state.is_finished() {
            self.state = LeaseState::Finished(outcome);
        }
    }
}
