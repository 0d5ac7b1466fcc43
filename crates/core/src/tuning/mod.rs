//! # Tuning
//!
//! Supervised fine-tuning on Vertex AI: upload the datasets to Cloud Storage,
//! submit a tuning job, wait for it and optionally talk to the tuned endpoint.
//!
//! The REST surfaces sit behind [`ObjectStore`] and [`TuningApi`] so the
//! workflow can be driven against in-memory fakes.

pub mod job;
pub mod poll;
pub mod storage;
pub mod workflow;

pub use job::{
    TunedModel, TuningApi, TuningJob, TuningJobRequest, TuningJobState, VertexTuningApi,
};
pub use poll::poll_until_ended;
pub use storage::{ObjectStore, StorageClient};
pub use workflow::{run_tuning_workflow, SmokeTestAnswer, TuningOutcome, SMOKE_TEST_QUESTIONS};

#[cfg(test)]
pub(crate) mod fakes {
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::{ObjectStore, TunedModel, TuningApi, TuningJob, TuningJobRequest, TuningJobState};
    use crate::error::ApiError;

    pub const FAKE_JOB: &str = "projects/p/locations/asia-east2/tuningJobs/1";
    pub const FAKE_ENDPOINT: &str = "projects/p/locations/asia-east2/endpoints/9";

    /// Replays a fixed sequence of job states; the last one repeats
    pub struct FakeTuningApi {
        states: Mutex<VecDeque<TuningJobState>>,
        last: Mutex<TuningJobState>,
        get_error: Mutex<Option<ApiError>>,
        pub created: Mutex<Vec<TuningJobRequest>>,
        gets: AtomicUsize,
    }

    impl FakeTuningApi {
        pub fn with_states(states: &[TuningJobState]) -> Self {
            Self {
                states: Mutex::new(states.iter().copied().collect()),
                last: Mutex::new(TuningJobState::Running),
                get_error: Mutex::new(None),
                created: Mutex::new(Vec::new()),
                gets: AtomicUsize::new(0),
            }
        }

        pub fn fail_next_get(&self, error: ApiError) {
            *self.get_error.lock().unwrap() = Some(error);
        }

        pub fn get_calls(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TuningApi for FakeTuningApi {
        async fn create(&self, request: &TuningJobRequest) -> Result<TuningJob, ApiError> {
            self.created.lock().unwrap().push(request.clone());
            Ok(TuningJob {
                name: FAKE_JOB.to_string(),
                state: TuningJobState::Pending,
                tuned_model_display_name: Some(request.tuned_model_display_name.clone()),
                ..TuningJob::default()
            })
        }

        async fn get(&self, name: &str) -> Result<TuningJob, ApiError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = self.get_error.lock().unwrap().take() {
                return Err(error);
            }
            let mut last = self.last.lock().unwrap();
            if let Some(state) = self.states.lock().unwrap().pop_front() {
                *last = state;
            }
            let state = *last;
            Ok(TuningJob {
                name: name.to_string(),
                state,
                tuned_model: state.is_success().then(|| TunedModel {
                    model: "projects/p/locations/asia-east2/models/8".to_string(),
                    endpoint: FAKE_ENDPOINT.to_string(),
                }),
                error: (state == TuningJobState::Failed).then(|| super::job::JobError {
                    code: Some(3),
                    message: "dataset rejected".to_string(),
                }),
                ..TuningJob::default()
            })
        }
    }

    /// Records uploads in memory
    pub struct FakeStore {
        pub bucket_exists: bool,
        pub uploads: Mutex<Vec<(String, String, usize)>>,
    }

    impl FakeStore {
        pub fn new(bucket_exists: bool) -> Self {
            Self {
                bucket_exists,
                uploads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn bucket_exists(&self, _bucket: &str) -> Result<bool, ApiError> {
            Ok(self.bucket_exists)
        }

        async fn upload(&self, data: Vec<u8>, bucket: &str, object: &str) -> Result<String, ApiError> {
            self.uploads
                .lock()
                .unwrap()
                .push((bucket.to_string(), object.to_string(), data.len()));
            Ok(super::storage::gcs_uri(bucket, object))
        }
    }
}
