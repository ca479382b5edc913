use std::sync::Arc;
use std::time::Duration;

use uploader_config::RetryConfig;
use uploader_dispatcher::UploadDispatcher;
use uploader_domain::{RemoteError, TaskRecordRepository, TaskStatus, UploadOutcome};
use uploader_infrastructure::InMemoryTaskRecordRepository;
use uploader_testing_utils::{
    MockRemoteUploadService, MockResourceMaterializer, TestEnv, UploadInputBuilder,
};
use uploader_worker::UploadTaskExecutor;

struct Setup {
    repository: Arc<InMemoryTaskRecordRepository>,
    materializer: Arc<MockResourceMaterializer>,
    remote: Arc<MockRemoteUploadService>,
    dispatcher: Arc<UploadDispatcher>,
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        base_interval_ms: 1,
        max_interval_ms: 5,
        backoff_multiplier: 2.0,
        jitter_factor: 0.1,
        max_attempts,
    }
}

fn setup(remote: MockRemoteUploadService, max_attempts: u32) -> Setup {
    let repository = Arc::new(InMemoryTaskRecordRepository::new());
    let materializer = Arc::new(MockResourceMaterializer::new());
    let remote = Arc::new(remote);
    let executor = Arc::new(UploadTaskExecutor::new(
        repository.clone(),
        materializer.clone(),
        remote.clone(),
    ));
    let dispatcher = Arc::new(UploadDispatcher::new(
        executor,
        repository.clone(),
        fast_retry(max_attempts),
    ));
    Setup {
        repository,
        materializer,
        remote,
        dispatcher,
    }
}

#[tokio::test]
async fn test_simulated_failures_are_retried_until_success() {
    let setup = setup(MockRemoteUploadService::new(), 5);
    let input = UploadInputBuilder::new().with_fail_until_attempt(3).build();

    let outcome = setup.dispatcher.run_to_completion("t1", &input).await;

    assert!(outcome.is_success());
    assert_eq!(setup.remote.call_count(), 1);
    let record = setup.repository.get("t1").await.unwrap().unwrap();
    assert_eq!(record.status, TaskStatus::Succeeded);
}

#[tokio::test]
async fn test_exhausted_retries_become_failed() {
    let setup = setup(
        MockRemoteUploadService::with_results(vec![
            Err(RemoteError::http(503)),
            Err(RemoteError::http(502)),
            Err(RemoteError::Connectivity("reset".to_string())),
        ]),
        3,
    );
    let input = UploadInputBuilder::new().build();

    let outcome = setup.dispatcher.run_to_completion("t1", &input).await;

    assert_eq!(
        outcome,
        UploadOutcome::Failure {
            reason: "Retry limit exceeded: Network error".to_string()
        }
    );
    assert_eq!(setup.remote.call_count(), 3);
    let record = setup.repository.get("t1").await.unwrap().unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(
        record.error_message.as_deref(),
        Some("Retry limit exceeded: Network error")
    );
    assert!(setup.materializer.leftover_files().is_empty());
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let setup = setup(MockRemoteUploadService::failing_with(RemoteError::http(413)), 5);
    let input = UploadInputBuilder::new().build();

    let outcome = setup.dispatcher.run_to_completion("t1", &input).await;

    assert!(outcome.is_failure());
    assert_eq!(setup.remote.call_count(), 1);
}

#[tokio::test]
async fn test_submit_assigns_unique_ids() {
    let setup = setup(MockRemoteUploadService::new(), 1);
    let input = UploadInputBuilder::new().build();

    let first = setup.dispatcher.submit(input.clone());
    let second = setup.dispatcher.submit(input);
    assert_ne!(first.task_id, second.task_id);

    assert!(first.handle.await.unwrap().is_success());
    assert!(second.handle.await.unwrap().is_success());
    assert_eq!(setup.repository.list_all().await.unwrap().len(), 2);
    assert_eq!(setup.dispatcher.running_count(), 0);
}

#[tokio::test]
async fn test_cancel_aborts_attempt_and_deletes_files() {
    let setup = setup(
        MockRemoteUploadService::new().with_delay(Duration::from_secs(30)),
        1,
    );
    let input = UploadInputBuilder::new()
        .with_locators(&["a", "b"])
        .build();

    let submitted = setup.dispatcher.submit(input);
    let remote = setup.remote.clone();
    let started = TestEnv::wait_for(
        || {
            let remote = remote.clone();
            async move { remote.call_count() == 1 }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(started);
    assert!(setup.dispatcher.is_running(&submitted.task_id));

    assert!(setup.dispatcher.cancel(&submitted.task_id));
    let joined = submitted.handle.await;
    assert!(joined.unwrap_err().is_cancelled());

    assert_eq!(setup.materializer.created_paths().len(), 2);
    assert!(setup.materializer.leftover_files().is_empty());
    assert!(!setup.dispatcher.cancel(&submitted.task_id));
}

#[tokio::test]
async fn test_concurrent_runs_of_same_id_are_serialized() {
    let setup = setup(
        MockRemoteUploadService::new().with_delay(Duration::from_millis(50)),
        1,
    );
    let input = UploadInputBuilder::new().build();
    let mut subscription = setup.repository.observe_all().await.unwrap();

    let a = setup.dispatcher.spawn("same".to_string(), input.clone());
    let b = setup.dispatcher.spawn("same-2".to_string(), input.clone());
    let c = tokio::spawn({
        let dispatcher = setup.dispatcher.clone();
        let input = input.clone();
        async move { dispatcher.run_to_completion("same", &input).await }
    });

    assert!(a.await.unwrap().is_success());
    assert!(b.await.unwrap().is_success());
    assert!(c.await.unwrap().is_success());

    // 同一 id 的两次运行不能交错：每次 SUCCEEDED 之后才会出现下一次 RUNNING@0
    let statuses: Vec<(TaskStatus, u8)> = subscription
        .drain()
        .iter()
        .filter_map(|s| s.iter().find(|r| r.id == "same").map(|r| (r.status, r.progress)))
        .collect();
    let mut deduped = statuses.clone();
    deduped.dedup();
    assert_eq!(
        deduped,
        vec![
            (TaskStatus::Running, 0),
            (TaskStatus::Running, 40),
            (TaskStatus::Succeeded, 100),
            (TaskStatus::Running, 0),
            (TaskStatus::Running, 40),
            (TaskStatus::Succeeded, 100),
        ]
    );
}
