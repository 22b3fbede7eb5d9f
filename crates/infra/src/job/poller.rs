//! Bounded polling of a job until it reaches a terminal status.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use twinline_domain::{ApiError, Job, JobFailure, JobStatus, PollErrorPolicy, Result};

use super::JobAware;
use crate::endpoint::JobPolicy;
use crate::http::RawResponse;

/// Issues the follow-up "get job" request for a job id.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn fetch(&self, job_id: &str, cancel: &CancellationToken) -> Result<RawResponse>;
}

/// Drives one job from its initial response to a terminal status.
///
/// Polls at a fixed `poll_interval`, at most `floor(timeout / poll_interval)`
/// times, within the caller's task.
pub struct JobPoller<'a, F: JobAware + ?Sized> {
    endpoint: &'a str,
    format: &'a F,
    policy: &'a JobPolicy,
    error_policy: PollErrorPolicy,
}

impl<'a, F: JobAware + ?Sized> JobPoller<'a, F> {
    /// Poller for `endpoint` reading jobs with `format`.
    pub fn new(
        endpoint: &'a str,
        format: &'a F,
        policy: &'a JobPolicy,
        error_policy: PollErrorPolicy,
    ) -> Self {
        Self { endpoint, format, policy, error_policy }
    }

    /// Resolve the job announced by `initial`.
    ///
    /// # Errors
    /// - `ApiError::JobParse` if a response cannot be read as a job
    /// - `ApiError::Job` when the job ends in `Error` or `Aborted`
    /// - `ApiError::JobNotCompleted` when the poll budget runs out
    /// - `ApiError::Cancelled` when `cancel` fires
    /// - fetch errors, unless tolerated by [`PollErrorPolicy::Continue`]
    pub async fn resolve(
        &self,
        initial: &RawResponse,
        source: &dyn JobSource,
        cancel: &CancellationToken,
    ) -> Result<Job> {
        let started = Instant::now();
        let mut job = self.parse(initial)?;
        self.extract(initial, &mut job);
        debug!(endpoint = self.endpoint, job_id = %job.id, status = %job.status, "job accepted");

        if job.is_terminal() {
            return self.finish(job, initial.elapsed() + started.elapsed());
        }
        if job.id.is_empty() {
            return Err(ApiError::JobParse {
                endpoint: self.endpoint.to_string(),
                message: "job has no id to poll".to_string(),
            });
        }

        let max_attempts = self.policy.max_attempts();
        let mut attempts = 0;
        while attempts < max_attempts {
            attempts += 1;

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(self.cancelled()),
                () = tokio::time::sleep(self.policy.poll_interval()) => {}
            }

            let response = match source.fetch(&job.id, cancel).await {
                Ok(response) => response,
                Err(err @ ApiError::Transport { .. })
                    if self.error_policy == PollErrorPolicy::Continue =>
                {
                    warn!(
                        endpoint = self.endpoint,
                        job_id = %job.id,
                        attempt = attempts,
                        error = %err,
                        "job poll failed, continuing"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            let next = self.parse(&response)?;
            job.absorb(next);
            self.extract(&response, &mut job);
            debug!(
                endpoint = self.endpoint,
                job_id = %job.id,
                attempt = attempts,
                status = %job.status,
                "job polled"
            );

            if job.is_terminal() {
                return self.finish(job, initial.elapsed() + started.elapsed());
            }
        }

        warn!(
            endpoint = self.endpoint,
            job_id = %job.id,
            attempts,
            status = %job.status,
            "job did not complete within its timeout"
        );
        Err(ApiError::JobNotCompleted {
            endpoint: self.endpoint.to_string(),
            attempts,
            job: Box::new(job),
        })
    }

    fn parse(&self, response: &RawResponse) -> Result<Job> {
        self.format.parse_job(response).map_err(|message| ApiError::JobParse {
            endpoint: self.endpoint.to_string(),
            message,
        })
    }

    fn extract(&self, response: &RawResponse, job: &mut Job) {
        let Some(extractor) = self.policy.extractor_fn() else {
            return;
        };
        match extractor(response) {
            Ok(values) => job.extracted.extend(values),
            Err(reason) => {
                warn!(endpoint = self.endpoint, job_id = %job.id, %reason, "job extractor failed");
            }
        }
    }

    fn finish(&self, job: Job, duration: Duration) -> Result<Job> {
        if job.status == JobStatus::Success {
            info!(
                endpoint = self.endpoint,
                job_id = %job.id,
                duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                "job succeeded"
            );
            return Ok(job);
        }

        let message = job
            .message
            .clone()
            .unwrap_or_else(|| format!("job {} ended with status {}", job.id, job.status));
        warn!(endpoint = self.endpoint, job_id = %job.id, status = %job.status, %message, "job failed");
        Err(JobFailure {
            endpoint: self.endpoint.to_string(),
            status: job.status,
            message,
            duration,
            job,
        }
        .into())
    }

    fn cancelled(&self) -> ApiError {
        ApiError::Cancelled { endpoint: self.endpoint.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;
    use reqwest::header::{HeaderMap, HeaderValue, LOCATION};
    use reqwest::StatusCode;

    use super::*;
    use crate::partition::{CerberusFormat, VmwareFormat};

    /// Replays scripted poll outcomes and records the ids it was asked for.
    #[derive(Default)]
    struct Script {
        outcomes: Mutex<VecDeque<Result<RawResponse>>>,
        requested: Mutex<Vec<String>>,
    }

    impl Script {
        fn with(outcomes: Vec<Result<RawResponse>>) -> Self {
            Self { outcomes: Mutex::new(outcomes.into()), requested: Mutex::default() }
        }

        fn polls(&self) -> usize {
            self.requested.lock().len()
        }
    }

    #[async_trait]
    impl JobSource for Script {
        async fn fetch(&self, job_id: &str, _cancel: &CancellationToken) -> Result<RawResponse> {
            self.requested.lock().push(job_id.to_string());
            self.outcomes.lock().pop_front().unwrap_or_else(|| Ok(json(r#"{"status":"running"}"#)))
        }
    }

    fn json(body: &str) -> RawResponse {
        RawResponse::new(StatusCode::OK, HeaderMap::new(), body.as_bytes().to_vec(), Duration::ZERO)
    }

    fn accepted(location: &str) -> RawResponse {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_str(location).unwrap());
        RawResponse::new(StatusCode::ACCEPTED, headers, Vec::new(), Duration::ZERO)
    }

    fn transport() -> ApiError {
        ApiError::Transport {
            endpoint: "GetVmwareTask".into(),
            message: "connection reset".into(),
            is_timeout: false,
        }
    }

    fn policy(interval_secs: u64, timeout_secs: u64) -> JobPolicy {
        JobPolicy::new(Duration::from_secs(interval_secs), Duration::from_secs(timeout_secs))
    }

    #[tokio::test(start_paused = true)]
    async fn location_job_resolves_after_two_polls() {
        let script = Script::with(vec![
            Ok(json(r#"{"status":"running"}"#)),
            Ok(json(r#"{"id":"abc123","status":"success"}"#)),
        ]);
        let policy = policy(1, 5);
        let poller = JobPoller::new("CreateFoo", &VmwareFormat, &policy, PollErrorPolicy::Abort);

        let job = poller
            .resolve(&accepted("/job/abc123"), &script, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(job.id, "abc123");
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(script.polls(), 2);
        assert_eq!(*script.requested.lock(), vec!["abc123", "abc123"]);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_initial_response_is_not_polled() {
        let script = Script::default();
        let policy = policy(1, 5);
        let poller = JobPoller::new("CreateEdge", &CerberusFormat, &policy, PollErrorPolicy::Abort);

        let job = poller
            .resolve(&json(r#"[{"jobId":"j1","status":"DONE"}]"#), &script, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(script.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_reports_last_job() {
        let script = Script::default();
        let policy = JobPolicy::new(Duration::from_millis(300), Duration::from_secs(1));
        let poller = JobPoller::new("CreateFoo", &VmwareFormat, &policy, PollErrorPolicy::Abort);

        let err = poller
            .resolve(&accepted("/job/slow"), &script, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ApiError::JobNotCompleted { attempts, job, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(job.id, "slow");
                assert_eq!(job.status, JobStatus::Running);
            }
            other => panic!("expected JobNotCompleted, got {other:?}"),
        }
        assert_eq!(script.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_is_a_job_error() {
        let script = Script::with(vec![Ok(json(
            r#"[{"jobId":"j1","status":"FAILED","actions":[{"name":"ATTACH","status":"FAILED","details":"no VLAN"}]}]"#,
        ))]);
        let policy = policy(1, 5);
        let poller = JobPoller::new("CreateEdge", &CerberusFormat, &policy, PollErrorPolicy::Abort);

        let err = poller
            .resolve(&json(r#"[{"jobId":"j1","status":"PENDING"}]"#), &script, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ApiError::Job(failure) => {
                assert_eq!(failure.status, JobStatus::Error);
                assert_eq!(failure.endpoint, "CreateEdge");
                assert_eq!(failure.message, "ATTACH: no VLAN");
                assert_eq!(failure.job.id, "j1");
            }
            other => panic!("expected job failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_job_without_message_gets_a_default_one() {
        let script = Script::with(vec![Ok(json(r#"{"status":"aborted"}"#))]);
        let policy = policy(1, 5);
        let poller = JobPoller::new("DeleteFoo", &VmwareFormat, &policy, PollErrorPolicy::Abort);

        let err = poller
            .resolve(&accepted("/job/x1"), &script, &CancellationToken::new())
            .await
            .unwrap_err();

        let failure = match err {
            ApiError::Job(failure) => failure,
            other => panic!("expected job failure, got {other:?}"),
        };
        assert_eq!(failure.status, JobStatus::Aborted);
        assert!(failure.message.contains("x1"));
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_initial_response_fails_without_polling() {
        let script = Script::default();
        let policy = policy(1, 5);
        let poller = JobPoller::new("CreateFoo", &VmwareFormat, &policy, PollErrorPolicy::Abort);

        let err = poller
            .resolve(&json(""), &script, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::JobParse { endpoint, .. } if endpoint == "CreateFoo"));
        assert_eq!(script.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_poll_status_is_a_parse_error() {
        let script = Script::with(vec![Ok(json(r#"{"status":"hibernating"}"#))]);
        let policy = policy(1, 5);
        let poller = JobPoller::new("CreateFoo", &VmwareFormat, &policy, PollErrorPolicy::Abort);

        let err = poller
            .resolve(&accepted("/job/a"), &script, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::JobParse { message, .. } if message.contains("hibernating")));
        assert_eq!(script.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_aborts_by_default() {
        let script = Script::with(vec![Err(transport())]);
        let policy = policy(1, 5);
        let poller = JobPoller::new("CreateFoo", &VmwareFormat, &policy, PollErrorPolicy::Abort);

        let err = poller
            .resolve(&accepted("/job/a"), &script, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }));
        assert_eq!(script.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn continue_policy_tolerates_transport_errors() {
        let script = Script::with(vec![
            Err(transport()),
            Ok(json(r#"{"status":"running"}"#)),
            Err(transport()),
            Ok(json(r#"{"status":"success"}"#)),
        ]);
        let policy = policy(1, 5);
        let poller = JobPoller::new("CreateFoo", &VmwareFormat, &policy, PollErrorPolicy::Continue);

        let job = poller
            .resolve(&accepted("/job/a"), &script, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(script.polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn continue_policy_still_respects_budget() {
        let script = Script::with((0..10).map(|_| Err(transport())).collect());
        let policy = policy(1, 3);
        let poller = JobPoller::new("CreateFoo", &VmwareFormat, &policy, PollErrorPolicy::Continue);

        let err = poller
            .resolve(&accepted("/job/a"), &script, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::JobNotCompleted { attempts: 3, .. }));
        assert_eq!(script.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let script = Script::default();
        let policy = policy(1, 60);
        let poller = JobPoller::new("CreateFoo", &VmwareFormat, &policy, PollErrorPolicy::Abort);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let err = poller.resolve(&accepted("/job/a"), &script, &cancel).await.unwrap_err();
        assert!(matches!(err, ApiError::Cancelled { .. }));
        assert_eq!(script.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn extractor_sees_every_response_and_failures_are_ignored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let policy = policy(1, 5).extractor(move |response| {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return Err("nothing to harvest yet".into());
            }
            let body = response.json_value().ok_or("not json")?;
            let vdc = body["owner"]["href"].as_str().ok_or("no owner")?;
            Ok(BTreeMap::from([("vdcHref".to_string(), vdc.to_string())]))
        });
        let script = Script::with(vec![Ok(json(
            r#"{"status":"success","owner":{"href":"https://vcd.example.com/api/vdc/9"}}"#,
        ))]);
        let poller = JobPoller::new("CreateVdc", &VmwareFormat, &policy, PollErrorPolicy::Abort);

        let job = poller
            .resolve(&accepted("/job/a"), &script, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.extracted["vdcHref"], "https://vcd.example.com/api/vdc/9");
    }
}
