use std::time::{Duration, Instant};

use super::job::{TuningApi, TuningJob};
use crate::error::TuningError;

/// Poll `name` every `interval` until the job reaches an ended state.
///
/// Returns the final job whatever its state; the caller decides what a
/// failure means. API errors propagate immediately.
pub async fn poll_until_ended(
    api: &dyn TuningApi,
    name: &str,
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<TuningJob, TuningError> {
    let started = Instant::now();
    loop {
        let job = api.get(name).await?;
        let elapsed = started.elapsed();
        tracing::info!(
            job = name,
            state = %job.state,
            elapsed_min = elapsed.as_secs() / 60,
            "tuning job status"
        );

        if job.state.is_ended() {
            return Ok(job);
        }

        let wait = match timeout {
            Some(limit) if elapsed >= limit => {
                return Err(TuningError::Timeout {
                    name: name.to_string(),
                    elapsed,
                })
            }
            Some(limit) => interval.min(limit - elapsed),
            None => interval,
        };
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::tuning::fakes::FakeTuningApi;
    use crate::tuning::TuningJobState;

    #[tokio::test]
    async fn test_polls_until_ended() {
        let api = FakeTuningApi::with_states(&[
            TuningJobState::Pending,
            TuningJobState::Running,
            TuningJobState::Succeeded,
        ]);

        let job = poll_until_ended(&api, "jobs/1", Duration::from_millis(1), None)
            .await
            .unwrap();

        assert_eq!(job.state, TuningJobState::Succeeded);
        assert_eq!(api.get_calls(), 3);
    }

    #[tokio::test]
    async fn test_failed_job_is_returned_not_raised() {
        let api = FakeTuningApi::with_states(&[TuningJobState::Failed]);
        let job = poll_until_ended(&api, "jobs/1", Duration::from_millis(1), None)
            .await
            .unwrap();
        assert_eq!(job.state, TuningJobState::Failed);
    }

    #[tokio::test]
    async fn test_timeout() {
        let api = FakeTuningApi::with_states(&[TuningJobState::Running]);
        let err = poll_until_ended(
            &api,
            "jobs/1",
            Duration::from_millis(5),
            Some(Duration::from_millis(20)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TuningError::Timeout { .. }));
        assert!(api.get_calls() >= 2);
    }

    #[tokio::test]
    async fn test_api_errors_propagate() {
        let api = FakeTuningApi::with_states(&[]);
        api.fail_next_get(ApiError::Auth("401: expired token".into()));

        let err = poll_until_ended(&api, "jobs/1", Duration::from_millis(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TuningError::Api(ApiError::Auth(_))));
    }
}
