use std::{collections::HashSet, sync::Arc};

use skylab_model::{
    AdmissionSnapshot, Decision, Flag, LeaseCap, LeaseCaps, RetryPolicy, Selector, SelectorKind,
    constants::TAG_LEASE_TOOL,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    error::CoreResult,
    retry::call_with_retries,
    service::{TaskService, TaskStateFilter, TaskSummary},
};

/// States counted as an active lease: scheduled (pending) or started (running).
const ACTIVE_STATES: [TaskStateFilter; 2] = [TaskStateFilter::Running, TaskStateFilter::Pending];

/// Per-selector concurrency caps on active leases.
///
/// The count comes from a query that may lag the scheduler, so the bound is
/// advisory: concurrent clients can briefly exceed it.
pub struct LeaseAdmission {
    tasks: Arc<dyn TaskService>,
    caps: LeaseCaps,
    retry: RetryPolicy,
}

impl LeaseAdmission {
    pub fn new(tasks: Arc<dyn TaskService>, caps: LeaseCaps, retry: RetryPolicy) -> Self {
        Self { tasks, caps, retry }
    }

    /// Decides whether a new lease for `selector` may be dispatched.
    #[instrument(level = "debug", skip(self, cancel), fields(selector = %selector))]
    pub async fn admit(
        &self,
        selector: &Selector,
        allow_bypass: Flag,
        cancel: &CancellationToken,
    ) -> CoreResult<AdmissionSnapshot> {
        let kind = selector.kind();
        let cap = self.caps.for_kind(kind);
        let snapshot = |count, decision| AdmissionSnapshot {
            selector: selector.clone(),
            count,
            cap,
            decision,
        };

        if allow_bypass.is_enabled() && kind != SelectorKind::Hostname {
            debug!("admission bypassed");
            return Ok(snapshot(0, Decision::Admit));
        }
        let limit = match cap {
            LeaseCap::Unlimited => return Ok(snapshot(0, Decision::Admit)),
            LeaseCap::Limited(0) => {
                return Ok(snapshot(
                    0,
                    Decision::Deny(format!("leases by {kind} are disabled")),
                ));
            }
            LeaseCap::Limited(n) => n,
        };

        let active = self.active_leases(selector, cancel).await?.len();
        debug!(active, limit, "counted active leases");
        let decision = if cap.is_exceeded_by(active) {
            Decision::Deny(format!(
                "number of active tasks {active} for {kind} {:?} exceeds global limit for all users {limit}",
                selector.payload()
            ))
        } else {
            Decision::Admit
        };
        Ok(snapshot(active, decision))
    }

    /// Running or pending lease tasks matching the selector's identifying tag.
    pub async fn active_leases(
        &self,
        selector: &Selector,
        cancel: &CancellationToken,
    ) -> CoreResult<Vec<TaskSummary>> {
        self.active_leases_tagged(&selector.identifying_tag(), cancel)
            .await
    }

    /// Running or pending lease tasks carrying `tag`, deduplicated by task id.
    pub async fn active_leases_tagged(
        &self,
        tag: &str,
        cancel: &CancellationToken,
    ) -> CoreResult<Vec<TaskSummary>> {
        let tags = vec![TAG_LEASE_TOOL.to_string(), tag.to_string()];
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for state in ACTIVE_STATES {
            for task in self.list_all(&tags, state, cancel).await? {
                if seen.insert(task.task_id.clone()) {
                    out.push(task);
                }
            }
        }
        Ok(out)
    }

    async fn list_all(
        &self,
        tags: &[String],
        state: TaskStateFilter,
        cancel: &CancellationToken,
    ) -> CoreResult<Vec<TaskSummary>> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = call_with_retries(&self.retry, cancel, "list tasks", || {
                self.tasks.list_tasks(tags, state, cursor.as_deref())
            })
            .await?;
            out.extend(page.items);
            match page.cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => return Ok(out),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTasks, lease_task};

    fn model_leases(n: usize) -> FakeTasks {
        let tasks = (0..n)
            .map(|i| {
                let state = if i % 2 == 0 {
                    TaskStateFilter::Running
                } else {
                    TaskStateFilter::Pending
                };
                let bot = format!("bot-{i}");
                lease_task(
                    &format!("t{i}"),
                    Some(bot.as_str()),
                    &["skylab-tool:lease", "label-model:eve"],
                    state,
                )
            })
            .collect();
        FakeTasks::new(tasks)
    }

    fn caps(model: u32, board: u32) -> LeaseCaps {
        LeaseCaps {
            model: LeaseCap::limited(model).unwrap(),
            board: LeaseCap::limited(board).unwrap(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn at_cap_is_admitted() {
        let admission =
            LeaseAdmission::new(Arc::new(model_leases(2)), caps(2, 0), RetryPolicy::none());
        let snap = admission
            .admit(&Selector::Model("eve".into()), Flag::disabled(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(snap.count, 2);
        assert_eq!(snap.decision, Decision::Admit);
    }

    #[tokio::test]
    async fn over_cap_is_denied() {
        let admission =
            LeaseAdmission::new(Arc::new(model_leases(3)), caps(2, 0), RetryPolicy::none());
        let snap = admission
            .admit(&Selector::Model("eve".into()), Flag::disabled(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(snap.count, 3);
        match snap.decision {
            Decision::Deny(msg) => {
                assert_eq!(
                    msg,
                    r#"number of active tasks 3 for model "eve" exceeds global limit for all users 2"#
                );
            }
            Decision::Admit => panic!("expected deny"),
        }
    }

    #[tokio::test]
    async fn disabled_kind_is_denied_without_query() {
        let tasks = Arc::new(FakeTasks::new(vec![]));
        let admission = LeaseAdmission::new(tasks.clone(), caps(1, 0), RetryPolicy::none());
        let snap = admission
            .admit(&Selector::Board("nami".into()), Flag::disabled(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            snap.decision,
            Decision::Deny("leases by board are disabled".into())
        );
        assert!(tasks.queries().is_empty());
    }

    #[tokio::test]
    async fn bypass_skips_checks() {
        let tasks = Arc::new(model_leases(5));
        let admission = LeaseAdmission::new(tasks.clone(), caps(0, 0), RetryPolicy::none());
        let snap = admission
            .admit(&Selector::Model("eve".into()), Flag::enabled(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(snap.decision.is_admit());
        assert!(tasks.queries().is_empty());
    }

    #[tokio::test]
    async fn hostname_is_unlimited() {
        let tasks = Arc::new(FakeTasks::new(vec![]));
        let admission = LeaseAdmission::new(tasks.clone(), LeaseCaps::default(), RetryPolicy::none());
        let snap = admission
            .admit(&Selector::Hostname("host-1".into()), Flag::disabled(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(snap.decision.is_admit());
        assert_eq!(snap.cap, LeaseCap::Unlimited);
        assert!(tasks.queries().is_empty());
    }

    #[tokio::test]
    async fn queries_running_and_pending_with_lease_tag() {
        let tasks = Arc::new(model_leases(4).with_page_size(1));
        let admission = LeaseAdmission::new(tasks.clone(), caps(2, 0), RetryPolicy::none());
        let active = admission
            .active_leases(&Selector::Model("eve".into()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(active.len(), 4);

        let queries = tasks.queries();
        assert_eq!(queries.len(), 2);
        for (tags, _) in &queries {
            assert_eq!(tags, &vec!["skylab-tool:lease".to_string(), "label-model:eve".to_string()]);
        }
        assert_eq!(queries[0].1, TaskStateFilter::Running);
        assert_eq!(queries[1].1, TaskStateFilter::Pending);
    }
}
