//! Submits lease builds and follows them until a DUT is assigned.
mod compose;
pub use compose::{compose_dimensions, compose_tags};

use std::{sync::Arc, time::Duration};

use skylab_model::{
    BuildId, BuildStatus, Dimensions, FinishOutcome, LeaseRequest, LeaseState, LeaseTask,
    PoolPolicy, RetryPolicy, SessionId, TagList,
};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{CoreError, CoreResult},
    retry::call_with_retries,
    service::{BuildService, ScheduleRequest},
};

/// Upper bound on the best-effort cancel sent for an abandoned build.
const ABANDON_GRACE: Duration = Duration::from_secs(30);

/// Wait-for-start tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Delay between two polls of a scheduled build.
    pub poll_interval: Duration,
    /// Overall limit on waiting for a build to start; `None` waits until cancelled.
    pub wait_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            wait_timeout: None,
        }
    }
}

pub struct LeaseDispatcher {
    builds: Arc<dyn BuildService>,
    policy: PoolPolicy,
    session: SessionId,
    retry: RetryPolicy,
    config: DispatchConfig,
}

impl LeaseDispatcher {
    pub fn new(
        builds: Arc<dyn BuildService>,
        policy: PoolPolicy,
        session: SessionId,
        retry: RetryPolicy,
        config: DispatchConfig,
    ) -> Self {
        Self {
            builds,
            policy,
            session,
            retry,
            config,
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn build_url(&self, id: BuildId) -> String {
        self.builds.build_url(id)
    }

    pub fn compose(
        &self,
        request: &LeaseRequest,
        bot_id: Option<&str>,
        model: Option<&str>,
    ) -> CoreResult<(Dimensions, TagList)> {
        let dims = compose_dimensions(&self.policy, request, bot_id)?;
        let tags = compose_tags(&self.policy, &self.session, request, model);
        Ok((dims, tags))
    }

    /// Submits the lease build. The returned task is `Scheduled`.
    #[instrument(level = "debug", skip_all, fields(selector = %request.selector()))]
    pub async fn submit(
        &self,
        request: &LeaseRequest,
        bot_id: Option<&str>,
        model: Option<&str>,
        cancel: &CancellationToken,
    ) -> CoreResult<LeaseTask> {
        let (dimensions, tags) = self.compose(request, bot_id, model)?;
        debug!(dims = %dimensions, tags = ?tags.as_slice(), "composed lease");
        let schedule = ScheduleRequest {
            dimensions,
            tags,
            lease_minutes: request.duration().as_minutes(),
        };

        let id = call_with_retries(&self.retry, cancel, "schedule build", || {
            self.builds.schedule_build(&schedule)
        })
        .await
        .map_err(|e| match e {
            CoreError::Cancelled => CoreError::Cancelled,
            other => CoreError::DispatchFailed {
                build: None,
                reason: other.to_string(),
            },
        })?;

        info!(build_id = %id, "lease build scheduled");
        Ok(LeaseTask::scheduled(id, OffsetDateTime::now_utc()))
    }

    /// Polls until the build leaves `Scheduled` and returns the assigned DUT name.
    ///
    /// On cancellation or timeout a still-scheduled build is cancelled on a
    /// best-effort basis. A started lease is never cancelled here.
    pub async fn wait_for_start(
        &self,
        task: &mut LeaseTask,
        cancel: &CancellationToken,
    ) -> CoreResult<String> {
        let id = task.id();
        let res = match self.config.wait_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.poll_until_started(task, cancel)).await {
                    Ok(res) => res,
                    Err(_) => Err(CoreError::WaitTimeout { build: id }),
                }
            }
            None => self.poll_until_started(task, cancel).await,
        };

        if matches!(res, Err(CoreError::Cancelled | CoreError::WaitTimeout { .. }))
            && task.state() == LeaseState::Scheduled
        {
            self.abandon(task).await;
        }
        res
    }

    /// Submit followed by wait-for-start.
    pub async fn dispatch(
        &self,
        request: &LeaseRequest,
        bot_id: Option<&str>,
        model: Option<&str>,
        cancel: &CancellationToken,
    ) -> CoreResult<LeaseTask> {
        let mut task = self.submit(request, bot_id, model, cancel).await?;
        self.wait_for_start(&mut task, cancel).await?;
        Ok(task)
    }

    /// Cancels a lease build. A build that already ended counts as cancelled.
    pub async fn cancel(&self, task: &mut LeaseTask, cancel: &CancellationToken) -> CoreResult<()> {
        let id = task.id();
        let res = call_with_retries(&self.retry, cancel, "cancel build", || {
            self.builds.cancel_build(id, "lease cancelled by user")
        })
        .await;
        match res {
            Ok(()) => {
                task.mark_finished(FinishOutcome::Cancelled);
                Ok(())
            }
            Err(CoreError::Cancelled) => Err(CoreError::Cancelled),
            Err(e) => {
                let info = call_with_retries(&self.retry, cancel, "get build", || {
                    self.builds.get_build(id)
                })
                .await?;
                match LeaseState::from(info.status) {
                    LeaseState::Finished(outcome) => {
                        debug!(build_id = %id, status = %info.status, "build ended before cancel");
                        task.mark_finished(outcome);
                        Ok(())
                    }
                    _ => Err(e),
                }
            }
        }
    }

    async fn poll_until_started(
        &self,
        task: &mut LeaseTask,
        cancel: &CancellationToken,
    ) -> CoreResult<String> {
        let id = task.id();
        loop {
            let info = call_with_retries(&self.retry, cancel, "get build", || {
                self.builds.get_build(id)
            })
            .await
            .map_err(|e| match e {
                CoreError::Cancelled => CoreError::Cancelled,
                other => CoreError::DispatchFailed {
                    build: Some(id),
                    reason: format!("polling build {id}: {other}"),
                },
            })?;
            debug!(build_id = %id, status = %info.status, "polled build");

            match info.status {
                BuildStatus::Scheduled => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                BuildStatus::Started => {
                    let Some(dut) = info.dut_name.filter(|d| !d.is_empty()) else {
                        task.mark_finished(FinishOutcome::Failure);
                        return Err(CoreError::MissingAssignment { build: id });
                    };
                    task.mark_started(dut.clone(), OffsetDateTime::now_utc());
                    info!(build_id = %id, dut = %dut, "lease started");
                    return Ok(dut);
                }
                status if status.is_terminal() => {
                    if let LeaseState::Finished(outcome) = LeaseState::from(status) {
                        task.mark_finished(outcome);
                    }
                    return Err(CoreError::DispatchFailed {
                        build: Some(id),
                        reason: format!("build {id} ended with {status} before it started"),
                    });
                }
                status => {
                    return Err(CoreError::DispatchFailed {
                        build: Some(id),
                        reason: format!("got unexpected build status {status} for build {id}"),
                    });
                }
            }
        }
    }

    /// Best-effort cancel of a build nobody will wait for. Failures are only logged.
    async fn abandon(&self, task: &mut LeaseTask) {
        let id = task.id();
        let res = tokio::time::timeout(
            ABANDON_GRACE,
            self.builds.cancel_build(id, "lease abandoned before start"),
        )
        .await;
        match res {
            Ok(Ok(())) => {
                info!(build_id = %id, "cancelled scheduled lease build");
                task.mark_finished(FinishOutcome::Cancelled);
            }
            Ok(Err(e)) => warn!(build_id = %id, error = %e, "failed to cancel scheduled lease build"),
            Err(_) => warn!(build_id = %id, "timed out cancelling scheduled lease build"),
        }
    }
}

#[cfg(test)]
mod tests {
    use skylab_model::{Flag, LeaseDuration, Selector, input::parse_dims};

    use super::*;
    use crate::{service::ServiceError, testing::FakeBuilds};

    fn request(selector: Selector) -> LeaseRequest {
        LeaseRequest::new(
            selector,
            LeaseDuration::from_minutes(30.0).unwrap(),
            "debug-s3",
            parse_dims("extra=1").unwrap(),
            Flag::disabled(),
        )
        .unwrap()
    }

    fn dispatcher(builds: Arc<FakeBuilds>, config: DispatchConfig) -> LeaseDispatcher {
        LeaseDispatcher::new(
            builds,
            PoolPolicy::default(),
            SessionId::new(),
            RetryPolicy::none(),
            config,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_start_and_records_host() {
        let builds = Arc::new(FakeBuilds::new(vec![
            (BuildStatus::Scheduled, None),
            (BuildStatus::Started, Some("chromeos6-rack1-host3")),
        ]));
        let d = dispatcher(builds.clone(), DispatchConfig::default());
        let start = tokio::time::Instant::now();

        let task = d
            .dispatch(
                &request(Selector::Hostname("chromeos6-rack1-host3".into())),
                Some("bot-42"),
                Some("eve"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(task.state(), LeaseState::Started);
        assert_eq!(task.assigned_host(), Some("chromeos6-rack1-host3"));
        assert!(task.started_at().is_some());
        assert_eq!(builds.polls(), 2);
        assert!(start.elapsed() >= Duration::from_secs(10));

        let scheduled = builds.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].lease_minutes, 30);
        assert_eq!(scheduled[0].dimensions.get("id"), Some("bot-42"));
        assert!(scheduled[0].tags.contains("label-model:eve"));
    }

    #[tokio::test]
    async fn started_without_dut_is_missing_assignment() {
        let builds = Arc::new(FakeBuilds::new(vec![(BuildStatus::Started, None)]));
        let d = dispatcher(builds, DispatchConfig::default());
        let req = request(Selector::Model("eve".into()));
        let cancel = CancellationToken::new();

        let mut task = d.submit(&req, None, None, &cancel).await.unwrap();
        let err = d.wait_for_start(&mut task, &cancel).await.unwrap_err();
        assert!(matches!(err, CoreError::MissingAssignment { build } if build == task.id()));
        assert!(task.state().is_finished());
    }

    #[tokio::test]
    async fn terminal_status_is_dispatch_failed() {
        let builds = Arc::new(FakeBuilds::new(vec![(BuildStatus::InfraFailure, None)]));
        let d = dispatcher(builds, DispatchConfig::default());
        let req = request(Selector::Model("eve".into()));
        let cancel = CancellationToken::new();

        let mut task = d.submit(&req, None, None, &cancel).await.unwrap();
        let err = d.wait_for_start(&mut task, &cancel).await.unwrap_err();
        assert_eq!(err.build_id(), Some(task.id()));
        assert!(err.to_string().contains("INFRA_FAILURE"));
        assert_eq!(task.state(), LeaseState::Finished(FinishOutcome::Failure));
    }

    #[tokio::test]
    async fn unspecified_status_fails_without_finishing() {
        let builds = Arc::new(FakeBuilds::new(vec![(BuildStatus::Unspecified, None)]));
        let d = dispatcher(builds, DispatchConfig::default());
        let req = request(Selector::Model("eve".into()));
        let cancel = CancellationToken::new();

        let mut task = d.submit(&req, None, None, &cancel).await.unwrap();
        let err = d.wait_for_start(&mut task, &cancel).await.unwrap_err();
        assert!(err.to_string().contains("STATUS_UNSPECIFIED"));
        assert_eq!(task.state(), LeaseState::Scheduled);
    }

    #[tokio::test]
    async fn submit_failure_is_dispatch_failed() {
        let builds = Arc::new(
            FakeBuilds::new(vec![]).failing_schedule(ServiceError::http(400, "bad builder")),
        );
        let d = dispatcher(builds, DispatchConfig::default());
        let err = d
            .submit(&request(Selector::Model("eve".into())), None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DispatchFailed { build: None, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_scheduled_cancels_build() {
        let builds = Arc::new(FakeBuilds::new(vec![(BuildStatus::Scheduled, None)]));
        let d = dispatcher(builds.clone(), DispatchConfig::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            trigger.cancel();
        });

        let mut task = d
            .submit(&request(Selector::Model("eve".into())), None, None, &cancel)
            .await
            .unwrap();
        let err = d.wait_for_start(&mut task, &cancel).await.unwrap_err();

        assert!(matches!(err, CoreError::Cancelled));
        assert_eq!(builds.cancelled(), vec![task.id()]);
        assert_eq!(task.state(), LeaseState::Finished(FinishOutcome::Cancelled));
        assert_eq!(builds.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_timeout_cancels_build() {
        let builds = Arc::new(FakeBuilds::new(vec![(BuildStatus::Scheduled, None)]));
        let config = DispatchConfig {
            wait_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let d = dispatcher(builds.clone(), config);
        let cancel = CancellationToken::new();

        let mut task = d
            .submit(&request(Selector::Model("eve".into())), None, None, &cancel)
            .await
            .unwrap();
        let err = d.wait_for_start(&mut task, &cancel).await.unwrap_err();

        assert!(matches!(err, CoreError::WaitTimeout { .. }));
        assert_eq!(builds.cancelled(), vec![task.id()]);
    }

    #[tokio::test]
    async fn started_lease_is_cancelled_explicitly() {
        let builds = Arc::new(FakeBuilds::new(vec![(BuildStatus::Started, Some("host-1"))]));
        let d = dispatcher(builds.clone(), DispatchConfig::default());
        let cancel = CancellationToken::new();

        let mut task = d
            .dispatch(&request(Selector::Model("eve".into())), None, None, &cancel)
            .await
            .unwrap();
        assert!(builds.cancelled().is_empty());

        d.cancel(&mut task, &cancel).await.unwrap();
        assert_eq!(task.state(), LeaseState::Finished(FinishOutcome::Cancelled));
        assert_eq!(builds.cancelled(), vec![task.id()]);
    }
}
