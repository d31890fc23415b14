//! Seams to the remote services the lease core talks to.
//!
//! Concrete HTTP clients live in `skylab-client`; tests plug in-memory fakes.
mod error;
pub use error::ServiceError;

use std::collections::BTreeMap;

use async_trait::async_trait;
use skylab_model::{BotId, BuildId, BuildStatus, Dimensions, TagList, TaskId};

/// Liveness filter applied when listing bots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BotState {
    /// Connected bots, busy or idle.
    Alive,
    /// Connected bots currently running a task.
    Running,
    /// Connected bots that are idle and waiting for work.
    Pending,
    #[default]
    Any,
}

/// One bot as reported by the bot service.
///
/// Dimensions are multi-valued on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BotSummary {
    pub bot_id: BotId,
    pub dimensions: BTreeMap<String, Vec<String>>,
}

impl BotSummary {
    pub fn values(&self, key: &str) -> &[String] {
        self.dimensions.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BotPage {
    pub items: Vec<BotSummary>,
    /// Empty or `None` when this is the last page.
    pub cursor: Option<String>,
}

/// Task states the lease core searches for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStateFilter {
    Running,
    Pending,
}

impl TaskStateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStateFilter::Running => "RUNNING",
            TaskStateFilter::Pending => "PENDING",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub task_id: TaskId,
    /// Set once the task has been assigned to a bot.
    pub bot_id: Option<BotId>,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskPage {
    pub items: Vec<TaskSummary>,
    pub cursor: Option<String>,
}

/// What the builder service needs to run one lease.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub dimensions: Dimensions,
    pub tags: TagList,
    pub lease_minutes: u32,
}

/// Snapshot of a lease build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildInfo {
    pub id: BuildId,
    pub status: BuildStatus,
    /// DUT the build is holding; reported once the build has started.
    pub dut_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub hostname: String,
    pub model: String,
    pub board: String,
}

/// Read-only view of the task scheduler's bots.
#[async_trait]
pub trait BotService: Send + Sync + 'static {
    /// One page of bots matching every dimension in `dimensions`.
    async fn list_bots(
        &self,
        dimensions: &Dimensions,
        state: BotState,
        cursor: Option<&str>,
    ) -> Result<BotPage, ServiceError>;
}

#[async_trait]
pub trait TaskService: Send + Sync + 'static {
    /// One page of tasks carrying all `tags` and in `state`.
    async fn list_tasks(
        &self,
        tags: &[String],
        state: TaskStateFilter,
        cursor: Option<&str>,
    ) -> Result<TaskPage, ServiceError>;

    /// Requests cancellation; returns whether the service accepted it.
    async fn cancel_task(&self, id: &TaskId, kill_running: bool) -> Result<bool, ServiceError>;

    /// Human-facing page of one task.
    fn task_url(&self, id: &TaskId) -> String;
}

#[async_trait]
pub trait BuildService: Send + Sync + 'static {
    async fn schedule_build(&self, request: &ScheduleRequest) -> Result<BuildId, ServiceError>;

    async fn get_build(&self, id: BuildId) -> Result<BuildInfo, ServiceError>;

    async fn cancel_build(&self, id: BuildId, summary: &str) -> Result<(), ServiceError>;

    /// Human-facing page of one build.
    fn build_url(&self, id: BuildId) -> String;
}

#[async_trait]
pub trait InventoryService: Send + Sync + 'static {
    /// Fails with [`ServiceError::Device`] when the device cannot be served.
    async fn get_device(&self, hostname: &str) -> Result<DeviceInfo, ServiceError>;
}
