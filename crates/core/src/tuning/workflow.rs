use std::path::Path;
use std::sync::Arc;

use super::job::{HyperParameters, SupervisedTuningSpec, TuningApi, TuningJob, TuningJobRequest};
use super::poll::poll_until_ended;
use super::storage::ObjectStore;
use crate::config::TuningConfig;
use crate::dataset::validate_tuning_file;
use crate::error::{ConfigError, DatasetError, TuningError};
use crate::llm::LlmClient;

/// Questions put to a freshly tuned endpoint
pub const SMOKE_TEST_QUESTIONS: &[&str] = &[
    "如何提高酒店客房清洁效率？",
    "酒店前台如何处理客户投诉？",
    "如何优化酒店的客户体验？",
];

/// Builds a client for a tuned endpoint resource name
pub type EndpointClientFactory =
    dyn Fn(&str) -> Result<Arc<dyn LlmClient>, ConfigError> + Send + Sync;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeTestAnswer {
    pub question: String,
    /// The model's answer or the error it produced
    pub answer: Result<String, String>,
}

#[derive(Debug, Clone)]
pub struct TuningOutcome {
    /// Latest known state; still pending when the workflow did not wait
    pub job: TuningJob,
    pub train_uri: String,
    pub validation_uri: String,
    pub train_records: usize,
    pub validation_records: usize,
    pub smoke_test: Vec<SmokeTestAnswer>,
}

async fn upload_file(
    store: &dyn ObjectStore,
    config: &TuningConfig,
    local: &Path,
) -> Result<String, TuningError> {
    let data = tokio::fs::read(local)
        .await
        .map_err(|source| DatasetError::Read {
            path: local.to_path_buf(),
            source,
        })?;
    let uri = store
        .upload(data, &config.bucket, &config.object_name(local))
        .await?;
    Ok(uri)
}

fn build_request(config: &TuningConfig, train_uri: &str, validation_uri: &str) -> TuningJobRequest {
    TuningJobRequest {
        base_model: config.source_model.clone(),
        tuned_model_display_name: config.display_name.clone(),
        supervised_tuning_spec: SupervisedTuningSpec {
            training_dataset_uri: train_uri.to_string(),
            validation_dataset_uri: Some(validation_uri.to_string()),
            hyper_parameters: HyperParameters {
                epoch_count: config.epochs,
                learning_rate_multiplier: config.learning_rate_multiplier,
            },
        },
    }
}

async fn smoke_test(client: &dyn LlmClient) -> Vec<SmokeTestAnswer> {
    let mut answers = Vec::with_capacity(SMOKE_TEST_QUESTIONS.len());
    for (i, question) in SMOKE_TEST_QUESTIONS.iter().enumerate() {
        let answer = client.generate(question).await.map_err(|e| e.to_string());
        match &answer {
            Ok(text) => tracing::info!(test = i + 1, question, answer = %text, "smoke test"),
            Err(e) => tracing::warn!(test = i + 1, question, error = %e, "smoke test failed"),
        }
        answers.push(SmokeTestAnswer {
            question: question.to_string(),
            answer,
        });
    }
    answers
}

/// Validate, upload, submit and optionally wait for a supervised tuning job.
///
/// A job that ends in any state other than success is a
/// [`TuningError::JobFailed`]. Smoke-test failures are reported in the
/// outcome and do not fail the workflow.
pub async fn run_tuning_workflow(
    config: &TuningConfig,
    store: &dyn ObjectStore,
    api: &dyn TuningApi,
    endpoint_client: &EndpointClientFactory,
) -> Result<TuningOutcome, TuningError> {
    config.validate()?;

    let train_records = validate_tuning_file(&config.train_path).await?;
    let validation_records = validate_tuning_file(&config.validation_path).await?;
    tracing::info!(train_records, validation_records, "datasets validated");

    if !store.bucket_exists(&config.bucket).await? {
        return Err(TuningError::BucketUnavailable(config.bucket.clone()));
    }

    let train_uri = upload_file(store, config, &config.train_path).await?;
    let validation_uri = upload_file(store, config, &config.validation_path).await?;

    let request = build_request(config, &train_uri, &validation_uri);
    let submitted = api.create(&request).await?;
    tracing::info!(
        job = %submitted.name,
        base_model = %config.source_model,
        epochs = config.epochs,
        "tuning job created"
    );

    let mut outcome = TuningOutcome {
        job: submitted,
        train_uri,
        validation_uri,
        train_records,
        validation_records,
        smoke_test: Vec::new(),
    };

    if !config.wait {
        return Ok(outcome);
    }

    let job = poll_until_ended(api, &outcome.job.name, config.poll_interval, config.poll_timeout).await?;
    if !job.state.is_success() {
        return Err(TuningError::JobFailed {
            name: job.name.clone(),
            state: job.state.to_string(),
            message: job.error_message(),
        });
    }
    tracing::info!(job = %job.name, endpoint = job.endpoint().unwrap_or("-"), "tuning job finished");

    if config.smoke_test {
        match job.endpoint() {
            Some(endpoint) => {
                let client = endpoint_client(endpoint)?;
                outcome.smoke_test = smoke_test(client.as_ref()).await;
            }
            None => tracing::warn!(job = %job.name, "no tuned endpoint to smoke-test"),
        }
    }

    outcome.job = job;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{write_jsonl, QaPair, TuningRecord};
    use crate::error::ApiError;
    use crate::llm::ScriptedLlm;
    use crate::tuning::fakes::{FakeStore, FakeTuningApi, FAKE_ENDPOINT, FAKE_JOB};
    use crate::tuning::TuningJobState;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    async fn datasets() -> (TempDir, TuningConfig) {
        let dir = tempdir().unwrap();
        let train = dir.path().join("train.jsonl");
        let validation = dir.path().join("validation.jsonl");
        let record = TuningRecord::new(
            "你是酒店客服助手。",
            &QaPair::new("可以延迟退房吗？", "可以，请提前联系前台。"),
        );
        write_jsonl(&train, [&record, &record]).await.unwrap();
        write_jsonl(&validation, [&record]).await.unwrap();

        let mut config = TuningConfig::new("p", "hotel-data", train, validation);
        config.poll_interval = Duration::from_millis(1);
        (dir, config)
    }

    fn no_client(_: &str) -> Result<Arc<dyn LlmClient>, ConfigError> {
        Err(ConfigError::MissingProject)
    }

    #[tokio::test]
    async fn test_full_workflow() {
        let (_dir, mut config) = datasets().await;
        config.smoke_test = true;
        let store = FakeStore::new(true);
        let api = FakeTuningApi::with_states(&[TuningJobState::Running, TuningJobState::Succeeded]);
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_in_factory = seen.clone();
        let factory = move |endpoint: &str| -> Result<Arc<dyn LlmClient>, ConfigError> {
            *seen_in_factory.lock().unwrap() = endpoint.to_string();
            Ok(Arc::new(ScriptedLlm::responding(|_| Ok("请参考标准流程。".to_string()))))
        };

        let outcome = run_tuning_workflow(&config, &store, &api, &factory)
            .await
            .unwrap();

        assert_eq!(outcome.train_records, 2);
        assert_eq!(outcome.validation_records, 1);
        assert_eq!(outcome.train_uri, "gs://hotel-data/hotel_tuning/train.jsonl");
        assert_eq!(outcome.job.state, TuningJobState::Succeeded);
        assert_eq!(outcome.smoke_test.len(), 3);
        assert!(outcome.smoke_test.iter().all(|a| a.answer.is_ok()));
        assert_eq!(*seen.lock().unwrap(), FAKE_ENDPOINT);

        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[1].1, "hotel_tuning/validation.jsonl");

        let created = api.created.lock().unwrap();
        assert_eq!(created[0].base_model, "gemini-1.5-pro-002");
        assert_eq!(created[0].supervised_tuning_spec.hyper_parameters.epoch_count, 3);
    }

    #[tokio::test]
    async fn test_no_wait_returns_submitted_job() {
        let (_dir, mut config) = datasets().await;
        config.wait = false;
        let api = FakeTuningApi::with_states(&[]);

        let outcome = run_tuning_workflow(&config, &FakeStore::new(true), &api, &no_client)
            .await
            .unwrap();

        assert_eq!(outcome.job.name, FAKE_JOB);
        assert_eq!(outcome.job.state, TuningJobState::Pending);
        assert_eq!(api.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_bucket_stops_before_upload() {
        let (_dir, config) = datasets().await;
        let store = FakeStore::new(false);
        let api = FakeTuningApi::with_states(&[]);

        let err = run_tuning_workflow(&config, &store, &api, &no_client)
            .await
            .unwrap_err();

        assert!(matches!(err, TuningError::BucketUnavailable(ref b) if b == "hotel-data"));
        assert!(store.uploads.lock().unwrap().is_empty());
        assert!(api.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_dataset_stops_workflow() {
        let (dir, mut config) = datasets().await;
        let bad = dir.path().join("bad.jsonl");
        tokio::fs::write(&bad, "{\"contents\":[]}\n").await.unwrap();
        config.validation_path = bad;

        let err = run_tuning_workflow(&config, &FakeStore::new(true), &FakeTuningApi::with_states(&[]), &no_client)
            .await
            .unwrap_err();
        assert!(matches!(err, TuningError::Validation(_)));
    }

    #[tokio::test]
    async fn test_failed_job() {
        let (_dir, config) = datasets().await;
        let api = FakeTuningApi::with_states(&[TuningJobState::Failed]);

        let err = run_tuning_workflow(&config, &FakeStore::new(true), &api, &no_client)
            .await
            .unwrap_err();

        match err {
            TuningError::JobFailed { state, message, .. } => {
                assert_eq!(state, "JOB_STATE_FAILED");
                assert_eq!(message, "dataset rejected");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_smoke_test_errors_are_reported() {
        let client = ScriptedLlm::new(vec![
            Ok("a".to_string()),
            Err(ApiError::Transient("503".into())),
            Ok("c".to_string()),
        ]);
        let answers = smoke_test(&client).await;
        assert_eq!(answers.len(), 3);
        assert!(answers[1].answer.is_err());
        assert_eq!(answers[2].answer.as_deref(), Ok("c"));
    }
}
