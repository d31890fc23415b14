//! Swarming v1 REST client: bot listing, task search and cancellation.
use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use skylab_core::service::{
    BotPage, BotService, BotState, BotSummary, ServiceError, TaskPage, TaskService,
    TaskStateFilter, TaskSummary,
};
use skylab_model::{Dimensions, TaskId};
use tracing::debug;

use crate::transport::Transport;

const API_SUFFIX: &str = "_ah/api/swarming/v1/";

pub struct SwarmingClient {
    transport: Transport,
    /// Service root ending in `/`, e.g. `https://chromeos-swarming.appspot.com/`.
    service: String,
}

impl SwarmingClient {
    pub fn new(transport: Transport, service: impl Into<String>) -> Self {
        let mut service = service.into();
        if !service.ends_with('/') {
            service.push('/');
        }
        Self { transport, service }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn api(&self, path: &str) -> String {
        format!("{}{API_SUFFIX}{path}", self.service)
    }
}

/// Human-facing page of one task.
pub fn task_url(service: &str, id: &str) -> String {
    format!("{service}task?id={id}")
}

/// Task list page filtered by `tags`, e.g. every task of one session.
pub fn task_list_url(service: &str, tags: &[String]) -> String {
    let host = Url::parse(service)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| service.trim_end_matches('/').to_string());
    let base = format!("https://{host}/tasklist");
    match Url::parse_with_params(&base, tags.iter().map(|t| ("f", t.as_str()))) {
        Ok(url) => url.to_string(),
        Err(_) => base,
    }
}

#[derive(Debug, Default, Deserialize)]
struct BotList {
    #[serde(default)]
    items: Vec<BotInfo>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotInfo {
    bot_id: String,
    #[serde(default)]
    dimensions: Vec<StringListPair>,
}

#[derive(Debug, Deserialize)]
struct StringListPair {
    key: String,
    #[serde(default)]
    value: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TaskList {
    #[serde(default)]
    items: Vec<TaskResult>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskResult {
    task_id: String,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CancelRequest {
    kill_running: bool,
}

#[derive(Debug, Deserialize)]
struct CancelResponse {
    #[serde(default)]
    ok: bool,
}

/// `(is_dead, is_busy)` tri-state filters.
fn state_filters(state: BotState) -> (&'static str, &'static str) {
    match state {
        BotState::Alive => ("FALSE", "NONE"),
        BotState::Running => ("FALSE", "TRUE"),
        BotState::Pending => ("FALSE", "FALSE"),
        BotState::Any => ("NONE", "NONE"),
    }
}

impl From<BotInfo> for BotSummary {
    fn from(bot: BotInfo) -> Self {
        let mut dimensions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for pair in bot.dimensions {
            dimensions.entry(pair.key).or_default().extend(pair.value);
        }
        BotSummary {
            bot_id: bot.bot_id,
            dimensions,
        }
    }
}

impl From<TaskResult> for TaskSummary {
    fn from(t: TaskResult) -> Self {
        TaskSummary {
            task_id: t.task_id,
            bot_id: t.bot_id.filter(|b| !b.is_empty()),
            tags: t.tags,
        }
    }
}

#[async_trait]
impl BotService for SwarmingClient {
    async fn list_bots(
        &self,
        dimensions: &Dimensions,
        state: BotState,
        cursor: Option<&str>,
    ) -> Result<BotPage, ServiceError> {
        let (is_dead, is_busy) = state_filters(state);
        let mut query: Vec<(&str, String)> = dimensions
            .iter()
            .map(|(k, v)| ("dimensions", format!("{k}:{v}")))
            .collect();
        query.push(("is_dead", is_dead.to_string()));
        query.push(("is_busy", is_busy.to_string()));
        if let Some(c) = cursor.filter(|c| !c.is_empty()) {
            query.push(("cursor", c.to_string()));
        }

        let list: BotList = self.transport.get_json(&self.api("bots/list"), &query).await?;
        debug!(count = list.items.len(), "listed bots");
        Ok(BotPage {
            items: list.items.into_iter().map(BotSummary::from).collect(),
            cursor: list.cursor.filter(|c| !c.is_empty()),
        })
    }
}

#[async_trait]
impl TaskService for SwarmingClient {
    async fn list_tasks(
        &self,
        tags: &[String],
        state: TaskStateFilter,
        cursor: Option<&str>,
    ) -> Result<TaskPage, ServiceError> {
        let mut query: Vec<(&str, String)> = tags.iter().map(|t| ("tags", t.clone())).collect();
        query.push(("state", state.as_str().to_string()));
        if let Some(c) = cursor.filter(|c| !c.is_empty()) {
            query.push(("cursor", c.to_string()));
        }

        let list: TaskList = self
            .transport
            .get_json(&self.api("tasks/list"), &query)
            .await?;
        Ok(TaskPage {
            items: list.items.into_iter().map(TaskSummary::from).collect(),
            cursor: list.cursor.filter(|c| !c.is_empty()),
        })
    }

    async fn cancel_task(&self, id: &TaskId, kill_running: bool) -> Result<bool, ServiceError> {
        let resp: CancelResponse = self
            .transport
            .post_json(
                &self.api(&format!("task/{id}/cancel")),
                &CancelRequest { kill_running },
            )
            .await?;
        Ok(resp.ok)
    }

    fn task_url(&self, id: &TaskId) -> String {
        task_url(&self.service, id)
    }
}
