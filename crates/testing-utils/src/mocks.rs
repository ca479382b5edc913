//! Mock implementations of the executor's ports
//!
//! Every mock records what it was asked to do so tests can assert on
//! call counts, arguments and file lifecycles.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use uploader_domain::{
    MaterializedFile, ProgressSink, ProgressUpdate, RemoteUploadService, ResourceMaterializer,
    UploadResponse, UploadedItem,
};
use uploader_errors::RemoteError;

/// Snapshot of one call made to [`MockRemoteUploadService`]
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub user_id: i64,
    pub file_paths: Vec<PathBuf>,
    /// Whether each file still existed when the remote call happened
    pub files_existed: Vec<bool>,
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Mock implementation of RemoteUploadService
///
/// Scripted results are consumed in order; once the script is empty every
/// call succeeds with one item per uploaded file.
#[derive(Debug, Default)]
pub struct MockRemoteUploadService {
    script: Mutex<VecDeque<Result<UploadResponse, RemoteError>>>,
    calls: Mutex<Vec<RecordedUpload>>,
    delay: Option<Duration>,
}

impl MockRemoteUploadService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(results: Vec<Result<UploadResponse, RemoteError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    pub fn failing_with(error: RemoteError) -> Self {
        Self::with_results(vec![Err(error)])
    }

    /// Sleep before answering, useful for cancellation tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_result(&self, result: Result<UploadResponse, RemoteError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<RecordedUpload> {
        self.calls.lock().unwrap().clone()
    }

    pub fn success_response(file_count: usize) -> UploadResponse {
        UploadResponse {
            status: "ok".to_string(),
            items: (0..file_count)
                .map(|i| UploadedItem {
                    id: i as i64 + 1,
                    url: format!("https://cdn.example.com/{}.jpg", i + 1),
                    original_name: format!("upload_{}.jpg", i + 1),
                    size: 3,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl RemoteUploadService for MockRemoteUploadService {
    async fn upload(
        &self,
        user_id: i64,
        files: &[MaterializedFile],
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<UploadResponse, RemoteError> {
        self.calls.lock().unwrap().push(RecordedUpload {
            user_id,
            file_paths: files.iter().map(|f| f.path().to_path_buf()).collect(),
            files_existed: files.iter().map(|f| f.path().exists()).collect(),
            title: title.map(str::to_string),
            content: content.map(str::to_string),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(Self::success_response(files.len())))
    }
}

/// Mock implementation of ResourceMaterializer
///
/// Writes a small file into its own temporary directory for every locator
/// except blank ones and those registered with [`fail_on`](Self::fail_on).
#[derive(Debug)]
pub struct MockResourceMaterializer {
    dir: TempDir,
    failing: Mutex<HashSet<String>>,
    requested: Mutex<Vec<String>>,
    created: Mutex<Vec<PathBuf>>,
}

impl MockResourceMaterializer {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            failing: Mutex::new(HashSet::new()),
            requested: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_on(self, locator: &str) -> Self {
        self.failing.lock().unwrap().insert(locator.to_string());
        self
    }

    pub fn fail_all(self, locators: &[&str]) -> Self {
        locators.iter().fold(self, |mock, locator| mock.fail_on(locator))
    }

    pub fn call_count(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    pub fn created_paths(&self) -> Vec<PathBuf> {
        self.created.lock().unwrap().clone()
    }

    /// Files this mock created that are still on disk
    pub fn leftover_files(&self) -> Vec<PathBuf> {
        self.created_paths()
            .into_iter()
            .filter(|path| path.exists())
            .collect()
    }
}

impl Default for MockResourceMaterializer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceMaterializer for MockResourceMaterializer {
    async fn materialize(&self, locator: &str) -> Option<MaterializedFile> {
        self.requested.lock().unwrap().push(locator.to_string());
        if locator.trim().is_empty() || self.failing.lock().unwrap().contains(locator) {
            return None;
        }

        let mut temp = tempfile::Builder::new()
            .prefix("upload_")
            .suffix(".jpg")
            .tempfile_in(self.dir.path())
            .ok()?;
        temp.write_all(&[0xFF, 0xD8, 0xFF]).ok()?;
        self.created.lock().unwrap().push(temp.path().to_path_buf());
        Some(MaterializedFile::new(locator, temp))
    }
}

/// ProgressSink that keeps every update in memory
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn progress_values(&self) -> Vec<u8> {
        self.updates().into_iter().map(|u| u.progress).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.updates().into_iter().map(|u| u.message).collect()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn publish(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_materializer_creates_and_tracks_files() {
        let materializer = MockResourceMaterializer::new().fail_on("bad");

        let file = materializer.materialize("good").await.unwrap();
        assert!(materializer.materialize("bad").await.is_none());
        assert!(materializer.materialize(" ").await.is_none());
        assert_eq!(materializer.call_count(), 3);
        assert_eq!(materializer.leftover_files().len(), 1);

        file.delete().unwrap();
        assert!(materializer.leftover_files().is_empty());
    }

    #[tokio::test]
    async fn test_mock_remote_consumes_script_then_succeeds() {
        let remote = MockRemoteUploadService::with_results(vec![Err(RemoteError::http(503))]);

        assert_eq!(
            remote.upload(1, &[], None, None).await.unwrap_err(),
            RemoteError::http(503)
        );
        assert!(remote.upload(1, &[], Some("t"), None).await.is_ok());
        assert_eq!(remote.call_count(), 2);
        assert_eq!(remote.calls()[1].title.as_deref(), Some("t"));
    }
}
