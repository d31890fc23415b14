//! In-memory service fakes for core tests.
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicI64, AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use skylab_model::{BuildId, BuildStatus, Dimensions, TaskId};

use crate::service::{
    BotPage, BotService, BotState, BotSummary, BuildInfo, BuildService, DeviceInfo,
    InventoryService, ScheduleRequest, ServiceError, TaskPage, TaskService, TaskStateFilter,
    TaskSummary,
};

pub(crate) fn bot(id: &str, dut_name: &str, model: &str) -> BotSummary {
    let mut b = BotSummary {
        bot_id: id.to_string(),
        ..Default::default()
    };
    b.dimensions
        .insert("pool".into(), vec!["ChromeOSSkylab".into()]);
    b.dimensions.insert("dut_name".into(), vec![dut_name.into()]);
    b.dimensions.insert("label-model".into(), vec![model.into()]);
    b
}

fn paginate<T: Clone>(items: &[T], cursor: Option<&str>, page_size: usize) -> (Vec<T>, Option<String>) {
    let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
    let end = (start + page_size).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());
    (items[start.min(end)..end].to_vec(), next)
}

pub(crate) struct FakeBots {
    bots: Vec<BotSummary>,
    page_size: usize,
    failures: Mutex<VecDeque<ServiceError>>,
    queries: Mutex<Vec<Dimensions>>,
    states: Mutex<Vec<BotState>>,
    calls: AtomicU32,
}

impl FakeBots {
    pub fn new(bots: Vec<BotSummary>) -> Self {
        Self {
            bots,
            page_size: 100,
            failures: Mutex::new(VecDeque::new()),
            queries: Mutex::new(Vec::new()),
            states: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }

    /// Errors returned, in order, before any successful page.
    pub fn with_failures(self, errors: Vec<ServiceError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<Dimensions> {
        self.queries.lock().unwrap().last().cloned()
    }

    /// Liveness filter of every call, in order.
    pub fn states(&self) -> Vec<BotState> {
        self.states.lock().unwrap().clone()
    }
}

#[async_trait]
impl BotService for FakeBots {
    async fn list_bots(
        &self,
        dimensions: &Dimensions,
        state: BotState,
        cursor: Option<&str>,
    ) -> Result<BotPage, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(dimensions.clone());
        self.states.lock().unwrap().push(state);
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let matching: Vec<BotSummary> = self
            .bots
            .iter()
            .filter(|b| {
                dimensions
                    .iter()
                    .all(|(k, v)| b.values(k).iter().any(|have| have == v))
            })
            .cloned()
            .collect();
        let (items, cursor) = paginate(&matching, cursor, self.page_size);
        Ok(BotPage { items, cursor })
    }
}

#[derive(Clone, Debug)]
pub(crate) struct FakeTask {
    pub summary: TaskSummary,
    pub state: TaskStateFilter,
}

pub(crate) fn lease_task(id: &str, bot_id: Option<&str>, tags: &[&str], state: TaskStateFilter) -> FakeTask {
    FakeTask {
        summary: TaskSummary {
            task_id: id.to_string(),
            bot_id: bot_id.map(str::to_string),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        },
        state,
    }
}

pub(crate) struct FakeTasks {
    tasks: Mutex<Vec<FakeTask>>,
    page_size: usize,
    cancel_ok: bool,
    cancelled: Mutex<Vec<TaskId>>,
    queries: Mutex<Vec<(Vec<String>, TaskStateFilter)>>,
}

impl FakeTasks {
    pub fn new(tasks: Vec<FakeTask>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            page_size: 100,
            cancel_ok: true,
            cancelled: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }

    /// Makes the service refuse every cancellation.
    pub fn refusing_cancel(mut self) -> Self {
        self.cancel_ok = false;
        self
    }

    pub fn cancelled(&self) -> Vec<TaskId> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<(Vec<String>, TaskStateFilter)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskService for FakeTasks {
    async fn list_tasks(
        &self,
        tags: &[String],
        state: TaskStateFilter,
        cursor: Option<&str>,
    ) -> Result<TaskPage, ServiceError> {
        if cursor.is_none() {
            self.queries.lock().unwrap().push((tags.to_vec(), state));
        }
        let matching: Vec<TaskSummary> = self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.state == state && tags.iter().all(|tag| t.summary.tags.contains(tag)))
            .map(|t| t.summary.clone())
            .collect();
        let (items, cursor) = paginate(&matching, cursor, self.page_size);
        Ok(TaskPage { items, cursor })
    }

    async fn cancel_task(&self, id: &TaskId, kill_running: bool) -> Result<bool, ServiceError> {
        assert!(kill_running, "lease tasks are always killed");
        if !self.cancel_ok {
            return Ok(false);
        }
        self.cancelled.lock().unwrap().push(id.clone());
        self.tasks.lock().unwrap().retain(|t| &t.summary.task_id != id);
        Ok(true)
    }

    fn task_url(&self, id: &TaskId) -> String {
        format!("https://swarming.test/task?id={id}")
    }
}

/// Builder service fake that replays a scripted sequence of build states.
///
/// Once the script runs out the last state is repeated.
pub(crate) struct FakeBuilds {
    next_id: AtomicI64,
    script: Mutex<VecDeque<(BuildStatus, Option<String>)>>,
    last: Mutex<(BuildStatus, Option<String>)>,
    schedule_error: Option<ServiceError>,
    scheduled: Mutex<Vec<ScheduleRequest>>,
    cancelled: Mutex<Vec<BuildId>>,
    polls: AtomicU32,
}

impl FakeBuilds {
    pub fn new(script: Vec<(BuildStatus, Option<&str>)>) -> Self {
        Self {
            next_id: AtomicI64::new(8_800_000_000_001),
            script: Mutex::new(
                script
                    .into_iter()
                    .map(|(s, d)| (s, d.map(str::to_string)))
                    .collect(),
            ),
            last: Mutex::new((BuildStatus::Scheduled, None)),
            schedule_error: None,
            scheduled: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            polls: AtomicU32::new(0),
        }
    }

    pub fn failing_schedule(mut self, err: ServiceError) -> Self {
        self.schedule_error = Some(err);
        self
    }

    pub fn scheduled(&self) -> Vec<ScheduleRequest> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<BuildId> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildService for FakeBuilds {
    async fn schedule_build(&self, request: &ScheduleRequest) -> Result<BuildId, ServiceError> {
        if let Some(err) = &self.schedule_error {
            return Err(err.clone());
        }
        self.scheduled.lock().unwrap().push(request.clone());
        Ok(BuildId::new(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn get_build(&self, id: BuildId) -> Result<BuildInfo, ServiceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(BuildInfo {
            id,
            status: last.0,
            dut_name: last.1.clone(),
        })
    }

    async fn cancel_build(&self, id: BuildId, _summary: &str) -> Result<(), ServiceError> {
        self.cancelled.lock().unwrap().push(id);
        Ok(())
    }

    fn build_url(&self, id: BuildId) -> String {
        format!("https://ci.test/p/chromeos/builders/test_runner/dut_leaser/b{id}")
    }
}

pub(crate) struct FakeInventory {
    devices: HashMap<String, Result<DeviceInfo, ServiceError>>,
    lookups: AtomicU32,
}

impl FakeInventory {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            lookups: AtomicU32::new(0),
        }
    }

    pub fn with_device(mut self, hostname: &str, model: &str, board: &str) -> Self {
        self.devices.insert(
            hostname.to_string(),
            Ok(DeviceInfo {
                hostname: hostname.to_string(),
                model: model.to_string(),
                board: board.to_string(),
            }),
        );
        self
    }

    pub fn with_error(mut self, hostname: &str, err: ServiceError) -> Self {
        self.devices.insert(hostname.to_string(), Err(err));
        self
    }

    pub fn lookups(&self) -> u32 {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventoryService for FakeInventory {
    async fn get_device(&self, hostname: &str) -> Result<DeviceInfo, ServiceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.devices.get(hostname).cloned().unwrap_or_else(|| {
            Err(ServiceError::Device {
                reason: format!("{hostname} is not in the inventory"),
            })
        })
    }
}
