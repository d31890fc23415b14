//! Lease and release orchestration over the four core components.
use std::{collections::HashSet, sync::Arc, time::Duration};

use skylab_model::{
    AdmissionSnapshot, BotId, Decision, LeaseRequest, LeaseTask, RetryPolicy, Selector, TaskId,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    admission::LeaseAdmission,
    directory::BotDirectory,
    dispatch::LeaseDispatcher,
    error::{CoreError, CoreResult},
    inventory::InventoryLookup,
    retry::call_with_retries,
    service::{ServiceError, TaskService, TaskSummary},
};

/// Upper bound on one task cancellation, retries included.
const CANCEL_TIMEOUT: Duration = Duration::from_secs(60);

/// A lease whose build has been submitted.
#[derive(Debug, Clone)]
pub struct SubmittedLease {
    pub request: LeaseRequest,
    pub task: LeaseTask,
    pub build_url: String,
    /// Bot pinned by a hostname lease.
    pub bot_id: Option<BotId>,
    /// Model looked up for a hostname lease, when the inventory had one.
    pub model: Option<String>,
    pub admission: AdmissionSnapshot,
    /// Non-fatal problems met on the way, for the operator.
    pub warnings: Vec<String>,
}

/// Outcome of releasing one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    pub hostname: String,
    pub bot_id: BotId,
    pub cancelled: Vec<TaskId>,
}

/// Outcome of releasing several hosts, in the order they were given.
#[derive(Debug, Default)]
pub struct ReleaseSummary {
    pub reports: Vec<ReleaseReport>,
    /// Hosts that could not be released, with the reason.
    pub failures: Vec<(String, CoreError)>,
}

impl ReleaseSummary {
    /// The error of the first host that failed.
    pub fn into_first_error(self) -> Option<CoreError> {
        self.failures.into_iter().next().map(|(_, e)| e)
    }
}

pub struct Leaser {
    directory: BotDirectory,
    inventory: InventoryLookup,
    admission: LeaseAdmission,
    dispatcher: LeaseDispatcher,
    tasks: Arc<dyn TaskService>,
    retry: RetryPolicy,
}

impl Leaser {
    pub fn new(
        directory: BotDirectory,
        inventory: InventoryLookup,
        admission: LeaseAdmission,
        dispatcher: LeaseDispatcher,
        tasks: Arc<dyn TaskService>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            directory,
            inventory,
            admission,
            dispatcher,
            tasks,
            retry,
        }
    }

    pub fn dispatcher(&self) -> &LeaseDispatcher {
        &self.dispatcher
    }

    /// Resolves, annotates, admits and submits a lease.
    ///
    /// Steps run strictly in sequence: bot lookup, inventory lookup,
    /// admission, then build submission.
    #[instrument(level = "debug", skip_all, fields(selector = %request.selector()))]
    pub async fn submit(
        &self,
        request: LeaseRequest,
        cancel: &CancellationToken,
    ) -> CoreResult<SubmittedLease> {
        let mut warnings = Vec::new();
        let (bot_id, model) = match request.selector() {
            Selector::Hostname(host) => {
                let bot_id = self.directory.resolve_bot_id(host, cancel).await?;
                let model = match self.inventory.model_for(host, cancel).await {
                    Ok(model) if model.is_empty() => None,
                    Ok(model) => Some(model),
                    Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
                    Err(e) => {
                        warn!(hostname = %host, error = %e, "model lookup failed; leasing without model tag");
                        warnings.push(format!("failed to get model for host ({host}): {e}"));
                        None
                    }
                };
                (Some(bot_id), model)
            }
            Selector::Model(_) | Selector::Board(_) => (None, None),
        };

        let admission = self
            .admission
            .admit(request.selector(), request.allow_bypass(), cancel)
            .await?;
        if let Decision::Deny(reason) = &admission.decision {
            return Err(CoreError::AdmissionDenied(reason.clone()));
        }

        let task = self
            .dispatcher
            .submit(&request, bot_id.as_deref(), model.as_deref(), cancel)
            .await?;
        let build_url = self.dispatcher.build_url(task.id());
        Ok(SubmittedLease {
            request,
            task,
            build_url,
            bot_id,
            model,
            admission,
            warnings,
        })
    }

    /// Blocks until the submitted lease starts and returns the assigned DUT.
    pub async fn wait_for_start(
        &self,
        lease: &mut SubmittedLease,
        cancel: &CancellationToken,
    ) -> CoreResult<String> {
        self.dispatcher.wait_for_start(&mut lease.task, cancel).await
    }

    /// Full lease: submit, then wait for the DUT.
    pub async fn lease(
        &self,
        request: LeaseRequest,
        cancel: &CancellationToken,
    ) -> CoreResult<SubmittedLease> {
        let mut lease = self.submit(request, cancel).await?;
        self.wait_for_start(&mut lease, cancel).await?;
        Ok(lease)
    }

    /// Cancels every active lease task running on `hostname`'s bot.
    ///
    /// Candidates come from the model of the host (most leases are tagged
    /// with it) and from the host's own `dut_name` tag; only tasks on the
    /// resolved bot are cancelled. Each task is attempted; the first error
    /// is returned after all attempts.
    #[instrument(level = "debug", skip(self, cancel))]
    pub async fn release(
        &self,
        hostname: &str,
        cancel: &CancellationToken,
    ) -> CoreResult<ReleaseReport> {
        let bot_id = self.directory.resolve_bot_id(hostname, cancel).await?;

        let mut candidates: Vec<TaskSummary> = Vec::new();
        match self.inventory.model_for(hostname, cancel).await {
            Ok(model) if !model.is_empty() => {
                candidates.extend(
                    self.admission
                        .active_leases(&Selector::Model(model), cancel)
                        .await?,
                );
            }
            Ok(_) => debug!(hostname, "no model recorded; searching by host only"),
            Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
            Err(e) => warn!(hostname, error = %e, "model lookup failed; searching by host only"),
        }
        candidates.extend(
            self.admission
                .active_leases(&Selector::Hostname(hostname.to_string()), cancel)
                .await?,
        );

        let mut seen = HashSet::new();
        let targets: Vec<TaskId> = candidates
            .into_iter()
            .filter(|t| t.bot_id.as_deref() == Some(bot_id.as_str()))
            .filter(|t| seen.insert(t.task_id.clone()))
            .map(|t| t.task_id)
            .collect();
        debug!(hostname, bot_id = %bot_id, count = targets.len(), "lease tasks to cancel");

        let mut cancelled = Vec::new();
        let mut first_err = None;
        for id in targets {
            match self.cancel_task(&id, cancel).await {
                Ok(()) => {
                    info!(task_id = %id, hostname, "cancelled lease task");
                    cancelled.push(id);
                }
                Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
                Err(e) => {
                    warn!(task_id = %id, error = %e, "failed to cancel lease task");
                    first_err.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }
        Ok(ReleaseReport {
            hostname: hostname.to_string(),
            bot_id,
            cancelled,
        })
    }

    /// Releases each host in turn.
    ///
    /// A failed host does not stop the others. Only cancellation ends the
    /// run early, and is recorded against the host it interrupted.
    pub async fn release_all(
        &self,
        hostnames: &[String],
        cancel: &CancellationToken,
    ) -> ReleaseSummary {
        let mut summary = ReleaseSummary::default();
        for hostname in hostnames {
            match self.release(hostname, cancel).await {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    let stop = matches!(e, CoreError::Cancelled);
                    warn!(hostname = %hostname, error = %e, "release failed");
                    summary.failures.push((hostname.clone(), e));
                    if stop {
                        break;
                    }
                }
            }
        }
        summary
    }

    /// Swarming page of a task.
    pub fn task_url(&self, id: &TaskId) -> String {
        self.tasks.task_url(id)
    }

    async fn cancel_task(&self, id: &TaskId, cancel: &CancellationToken) -> CoreResult<()> {
        let call = call_with_retries(&self.retry, cancel, "cancel task", || {
            self.tasks.cancel_task(id, true)
        });
        let ok = match tokio::time::timeout(CANCEL_TIMEOUT, call).await {
            Ok(res) => res?,
            Err(_) => {
                return Err(CoreError::Service {
                    op: "cancel task".into(),
                    source: ServiceError::network(
                        false,
                        format!("no confirmation for task {id} within {}s", CANCEL_TIMEOUT.as_secs()),
                    ),
                });
            }
        };
        if !ok {
            return Err(CoreError::Service {
                op: "cancel task".into(),
                source: ServiceError::Rejected(format!("task {id} is not successfully canceled")),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use skylab_model::{
        BuildStatus, Flag, LeaseCap, LeaseCaps, LeaseDuration, LeaseState, PoolPolicy,
        SelectorKind, SessionId, input::parse_dims,
    };

    use super::*;
    use crate::{
        dispatch::DispatchConfig,
        service::TaskStateFilter,
        testing::{FakeBots, FakeBuilds, FakeInventory, FakeTasks, bot, lease_task},
    };

    struct Harness {
        bots: Arc<FakeBots>,
        tasks: Arc<FakeTasks>,
        builds: Arc<FakeBuilds>,
        inventory: Arc<FakeInventory>,
        caps: LeaseCaps,
    }

    impl Harness {
        fn new(tasks: FakeTasks, builds: FakeBuilds) -> Self {
            Self {
                bots: Arc::new(FakeBots::new(vec![
                    bot("bot-42", "chromeos6-rack1-host3", "eve"),
                    bot("bot-7", "host-7", "eve"),
                ])),
                tasks: Arc::new(tasks),
                builds: Arc::new(builds),
                inventory: Arc::new(
                    FakeInventory::new()
                        .with_device("chromeos6-rack1-host3", "eve", "eve")
                        .with_device("host-7", "eve", "eve"),
                ),
                caps: LeaseCaps::default(),
            }
        }

        fn with_caps(mut self, model: u32, board: u32) -> Self {
            self.caps = LeaseCaps {
                hostname: LeaseCap::Unlimited,
                model: LeaseCap::limited(model).unwrap(),
                board: LeaseCap::limited(board).unwrap(),
            };
            self
        }

        fn leaser(&self) -> Leaser {
            let policy = PoolPolicy::default();
            let retry = RetryPolicy::none();
            Leaser::new(
                BotDirectory::new(self.bots.clone(), policy.clone(), retry.clone()),
                InventoryLookup::new(self.inventory.clone(), retry.clone()),
                LeaseAdmission::new(self.tasks.clone(), self.caps, retry.clone()),
                LeaseDispatcher::new(
                    self.builds.clone(),
                    policy,
                    SessionId::new(),
                    retry.clone(),
                    DispatchConfig::default(),
                ),
                self.tasks.clone(),
                retry,
            )
        }
    }

    fn request(kind: SelectorKind, payload: &str, minutes: f64, reason: &str, dims: &str) -> LeaseRequest {
        LeaseRequest::new(
            Selector::new(kind, payload).unwrap(),
            LeaseDuration::from_minutes(minutes).unwrap(),
            reason,
            parse_dims(dims).unwrap(),
            Flag::disabled(),
        )
        .unwrap()
    }

    fn started_after_one_poll(dut: &str) -> FakeBuilds {
        FakeBuilds::new(vec![
            (BuildStatus::Scheduled, None),
            (BuildStatus::Started, Some(dut)),
        ])
    }

    fn eve_leases(n: usize) -> FakeTasks {
        let tasks = (0..n)
            .map(|i| {
                lease_task(
                    &format!("t{i}"),
                    None,
                    &["skylab-tool:lease", "label-model:eve"],
                    TaskStateFilter::Pending,
                )
            })
            .collect();
        FakeTasks::new(tasks)
    }

    #[tokio::test(start_paused = true)]
    async fn hostname_lease_happy_path() {
        let h = Harness::new(FakeTasks::new(vec![]), started_after_one_poll("chromeos6-rack1-host3"));
        let leaser = h.leaser();

        let lease = leaser
            .lease(
                request(SelectorKind::Hostname, "chromeos6-rack1-host3", 30.0, "debug-s3", ""),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(lease.bot_id.as_deref(), Some("bot-42"));
        assert_eq!(lease.model.as_deref(), Some("eve"));
        assert_eq!(lease.task.state(), LeaseState::Started);
        assert_eq!(lease.task.assigned_host(), Some("chromeos6-rack1-host3"));
        assert!(lease.build_url.ends_with(&format!("b{}", lease.task.id())));
        assert_eq!(h.builds.polls(), 2);

        let sent = &h.builds.scheduled()[0];
        assert_eq!(sent.dimensions.len(), 2);
        assert_eq!(sent.dimensions.get("pool"), Some("ChromeOSSkylab"));
        assert_eq!(sent.dimensions.get("id"), Some("bot-42"));
        assert!(sent.tags.contains("dut-name:chromeos6-rack1-host3"));
        assert!(sent.tags.contains("label-model:eve"));
        assert!(sent.tags.contains("lease-by:hostname"));
        assert_eq!(sent.lease_minutes, 30);
        assert!(h.tasks.queries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn model_lease_at_cap_is_admitted() {
        let h = Harness::new(eve_leases(2), started_after_one_poll("host-9")).with_caps(2, 0);
        let lease = h
            .leaser()
            .lease(
                request(SelectorKind::Model, "eve", 60.0, "flaky-test", ""),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(lease.admission.count, 2);
        assert_eq!(lease.task.assigned_host(), Some("host-9"));
        let sent = &h.builds.scheduled()[0];
        assert_eq!(sent.dimensions.get("label-model"), Some("eve"));
        assert_eq!(sent.dimensions.get("label-pool"), Some("DUT_POOL_QUOTA"));
        assert_eq!(sent.dimensions.get("dut_state"), Some("ready"));
        assert!(!sent.dimensions.contains_key("id"));
        assert!(sent.tags.contains("model:eve"));
        assert!(sent.tags.contains("qs_account:leases"));
    }

    #[tokio::test]
    async fn model_lease_over_cap_is_denied() {
        let h = Harness::new(eve_leases(3), FakeBuilds::new(vec![])).with_caps(2, 0);
        let err = h
            .leaser()
            .submit(
                request(SelectorKind::Model, "eve", 60.0, "flaky-test", ""),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(matches!(err, CoreError::AdmissionDenied(_)));
        assert!(msg.contains('3') && msg.contains("eve") && msg.contains('2'), "{msg}");
        assert!(h.builds.scheduled().is_empty());
    }

    #[tokio::test]
    async fn board_lease_disabled() {
        let h = Harness::new(FakeTasks::new(vec![]), FakeBuilds::new(vec![]));
        let err = h
            .leaser()
            .submit(
                request(SelectorKind::Board, "nami", 60.0, "", ""),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "leases by board are disabled");
        assert!(h.builds.scheduled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dims_merge_keeps_required_pool() {
        let h = Harness::new(FakeTasks::new(vec![]), started_after_one_poll("host-7"));
        h.leaser()
            .lease(
                request(SelectorKind::Hostname, "host-7", 30.0, "", "pool=override,extra=1"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let sent = &h.builds.scheduled()[0];
        assert_eq!(sent.dimensions.get("pool"), Some("ChromeOSSkylab"));
        assert_eq!(sent.dimensions.get("extra"), Some("1"));
        let pool_tags = sent.tags.iter().filter(|t| t.starts_with("pool:")).count();
        assert_eq!(pool_tags, 1);
        assert!(sent.tags.contains("pool:ChromeOSSkylab"));
        assert!(sent.tags.contains("extra:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn inventory_failure_is_not_fatal_for_hostname() {
        let mut h = Harness::new(FakeTasks::new(vec![]), started_after_one_poll("host-7"));
        h.inventory = Arc::new(
            FakeInventory::new().with_error("host-7", ServiceError::http(403, "denied")),
        );
        let lease = h
            .leaser()
            .lease(
                request(SelectorKind::Hostname, "host-7", 30.0, "", ""),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(lease.model.is_none());
        assert_eq!(lease.warnings.len(), 1);
        assert!(h.builds.scheduled()[0].tags.get("label-model").is_none());
    }

    #[tokio::test]
    async fn unknown_host_fails_before_admission() {
        let h = Harness::new(FakeTasks::new(vec![]), FakeBuilds::new(vec![]));
        let err = h
            .leaser()
            .submit(
                request(SelectorKind::Hostname, "ghost", 30.0, "", ""),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert_eq!(h.inventory.lookups(), 0);
    }

    #[tokio::test]
    async fn release_cancels_tasks_on_the_host_bot() {
        let tasks = FakeTasks::new(vec![
            lease_task("on-host", Some("bot-7"), &["skylab-tool:lease", "label-model:eve"], TaskStateFilter::Running),
            lease_task("elsewhere", Some("bot-8"), &["skylab-tool:lease", "label-model:eve"], TaskStateFilter::Running),
            lease_task(
                "by-name",
                Some("bot-7"),
                &["skylab-tool:lease", "dut_name:host-7"],
                TaskStateFilter::Running,
            ),
            lease_task(
                "both",
                Some("bot-7"),
                &["skylab-tool:lease", "label-model:eve", "dut_name:host-7"],
                TaskStateFilter::Running,
            ),
        ]);
        let h = Harness::new(tasks, FakeBuilds::new(vec![]));
        let leaser = h.leaser();

        let report = leaser
            .release("host-7", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.bot_id, "bot-7");
        assert_eq!(report.cancelled, vec!["on-host".to_string(), "both".to_string(), "by-name".to_string()]);
        assert_eq!(h.tasks.cancelled().len(), 3);

        let again = leaser
            .release("host-7", &CancellationToken::new())
            .await
            .unwrap();
        assert!(again.cancelled.is_empty());
    }

    #[tokio::test]
    async fn refused_cancel_is_reported() {
        let tasks = FakeTasks::new(vec![lease_task(
            "t1",
            Some("bot-7"),
            &["skylab-tool:lease", "label-model:eve"],
            TaskStateFilter::Running,
        )])
        .refusing_cancel();
        let h = Harness::new(tasks, FakeBuilds::new(vec![]));

        let err = h
            .leaser()
            .release("host-7", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("task t1 is not successfully canceled"));
    }

    #[tokio::test]
    async fn release_all_keeps_going_after_a_failed_host() {
        let tasks = FakeTasks::new(vec![
            lease_task("on-7", Some("bot-7"), &["skylab-tool:lease", "label-model:eve"], TaskStateFilter::Running),
            lease_task("on-42", Some("bot-42"), &["skylab-tool:lease", "label-model:eve"], TaskStateFilter::Pending),
        ]);
        let h = Harness::new(tasks, FakeBuilds::new(vec![]));
        let hosts = ["host-7", "ghost", "chromeos6-rack1-host3"].map(String::from);

        let summary = h.leaser().release_all(&hosts, &CancellationToken::new()).await;

        assert_eq!(h.bots.calls(), 3);
        let released: Vec<(&str, Vec<TaskId>)> = summary
            .reports
            .iter()
            .map(|r| (r.hostname.as_str(), r.cancelled.clone()))
            .collect();
        assert_eq!(
            released,
            vec![
                ("host-7", vec!["on-7".to_string()]),
                ("chromeos6-rack1-host3", vec!["on-42".to_string()]),
            ]
        );
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, "ghost");
        assert!(matches!(summary.into_first_error(), Some(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn release_all_stops_when_cancelled() {
        let h = Harness::new(FakeTasks::new(vec![]), FakeBuilds::new(vec![]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let hosts = ["host-7", "chromeos6-rack1-host3"].map(String::from);

        let summary = h.leaser().release_all(&hosts, &cancel).await;

        assert!(summary.reports.is_empty());
        assert_eq!(summary.failures.len(), 1);
        assert!(matches!(summary.into_first_error(), Some(CoreError::Cancelled)));
    }
}
