//! Sequential multi-file transfers over one session.
//!
//! A batch filters its input through the caller's rules, then transfers the
//! accepted files strictly in input order. How a failing file affects the
//! rest of the batch is governed by [`BatchErrorPolicy`]:
//!
//! - no flag: record the failure and continue
//! - `stop`: end the batch quietly at the first failure
//! - `throw`: end the batch with an error
//! - `delete_processed`: when the batch ends early, delete what it already
//!   transferred
//!
//! Cancellation is never converted into a recorded failure.

use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::sync::Arc;

use ftpflow_protocol::{BatchErrorPolicy, ExistsMode, LocalExistsMode, TransferStatus, VerifyPolicy};
use ftpflow_transfer::{
    BatchContext, DownloadOptions, FtpSession, ProgressCallback, TransferClient, TransferError,
    UploadOptions, normalize_directory, remote_file_name, validate_file_name,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BatchError;
use crate::rules::{Rule, RuleCandidate, passes};
use crate::types::{BatchSummary, TransferResult, TransferTarget};

/// Settings for [`BatchTransfer::download_files`].
#[derive(Clone, Default)]
pub struct DownloadBatchOptions {
    pub exists_mode: LocalExistsMode,
    pub verify: VerifyPolicy,
    pub error_policy: BatchErrorPolicy,
    pub cancel: CancellationToken,
    pub progress: Option<ProgressCallback>,
    /// Every rule must pass a file for it to be attempted.
    pub rules: Vec<Arc<dyn Rule>>,
}

/// Settings for [`BatchTransfer::upload_files`].
#[derive(Clone, Default)]
pub struct UploadBatchOptions {
    pub exists_mode: ExistsMode,
    /// Create the remote directory when it is missing.
    pub create_remote_dir: bool,
    pub verify: VerifyPolicy,
    pub error_policy: BatchErrorPolicy,
    pub cancel: CancellationToken,
    pub progress: Option<ProgressCallback>,
    pub rules: Vec<Arc<dyn Rule>>,
}

#[derive(Clone, Copy)]
enum Job<'a> {
    Download(&'a DownloadBatchOptions),
    Upload(&'a UploadBatchOptions),
}

impl Job<'_> {
    fn error_policy(&self) -> BatchErrorPolicy {
        match self {
            Self::Download(options) => options.error_policy,
            Self::Upload(options) => options.error_policy,
        }
    }

    fn cancel(&self) -> &CancellationToken {
        match self {
            Self::Download(options) => &options.cancel,
            Self::Upload(options) => &options.cancel,
        }
    }

    fn direction(&self) -> &'static str {
        match self {
            Self::Download(_) => "download",
            Self::Upload(_) => "upload",
        }
    }
}

/// Runs batches of transfers through one [`TransferClient`].
pub struct BatchTransfer<S> {
    client: TransferClient<S>,
}

impl<S: FtpSession> BatchTransfer<S> {
    pub fn new(client: TransferClient<S>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &TransferClient<S> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut TransferClient<S> {
        &mut self.client
    }

    pub fn into_client(self) -> TransferClient<S> {
        self.client
    }

    /// Downloads `remote_paths` into `local_dir`, each under its remote file
    /// name.
    ///
    /// Returns one result per input path, in input order. Fails before any
    /// I/O when the error policy combines `stop` with `throw` or when
    /// `local_dir` is blank.
    pub async fn download_files<P: AsRef<str>>(
        &mut self,
        local_dir: &Path,
        remote_paths: &[P],
        options: &DownloadBatchOptions,
    ) -> Result<Vec<TransferResult>, BatchError> {
        options.error_policy.validate()?;
        let dir = local_dir.to_str().ok_or_else(|| {
            BatchError::Argument(format!("directory is not UTF-8: {}", local_dir.display()))
        })?;
        let dir = normalize_directory(dir, MAIN_SEPARATOR).map_err(argument)?;

        let mut targets = Vec::new();
        let mut results = Vec::with_capacity(remote_paths.len());
        for (index, remote_path) in remote_paths.iter().enumerate() {
            let remote_path = remote_path.as_ref();
            let name = remote_file_name(remote_path);
            let local_path = PathBuf::from(format!("{dir}{name}"));
            let candidate = RuleCandidate {
                path: remote_path,
                name,
            };

            if passes(&options.rules, &candidate) {
                targets.push(TransferTarget {
                    local_path: local_path.clone(),
                    remote_path: remote_path.to_string(),
                    index,
                });
                results.push(TransferResult::pending(local_path, remote_path.to_string()));
            } else {
                debug!(path = remote_path, "filtered out");
                results.push(TransferResult::filtered(local_path, remote_path.to_string()));
            }
        }

        self.run(Job::Download(options), targets, results).await
    }

    /// Uploads `local_paths` into `remote_dir`, each under its local file
    /// name.
    pub async fn upload_files<P: AsRef<Path>>(
        &mut self,
        remote_dir: &str,
        local_paths: &[P],
        options: &UploadBatchOptions,
    ) -> Result<Vec<TransferResult>, BatchError> {
        options.error_policy.validate()?;
        let dir = normalize_directory(remote_dir, '/').map_err(argument)?;

        let mut targets = Vec::new();
        let mut results = Vec::with_capacity(local_paths.len());
        for (index, local_path) in local_paths.iter().enumerate() {
            let local_path = local_path.as_ref();
            let path = local_path.to_string_lossy();
            let name = local_path
                .file_name()
                .map(|name| name.to_string_lossy())
                .unwrap_or_default();
            let remote_path = format!("{dir}{name}");
            let candidate = RuleCandidate {
                path: &path,
                name: &name,
            };

            if passes(&options.rules, &candidate) {
                targets.push(TransferTarget {
                    local_path: local_path.to_path_buf(),
                    remote_path: remote_path.clone(),
                    index,
                });
                results.push(TransferResult::pending(local_path.to_path_buf(), remote_path));
            } else {
                debug!(path = %path, "filtered out");
                results.push(TransferResult::filtered(local_path.to_path_buf(), remote_path));
            }
        }

        self.run(Job::Upload(options), targets, results).await
    }

    async fn run(
        &mut self,
        job: Job<'_>,
        targets: Vec<TransferTarget>,
        mut results: Vec<TransferResult>,
    ) -> Result<Vec<TransferResult>, BatchError> {
        let policy = job.error_policy();
        let count = results.len();
        let mut aborted = false;

        for target in targets {
            if job.cancel().is_cancelled() {
                return Err(BatchError::Cancelled);
            }

            let batch = BatchContext {
                index: target.index,
                count,
            };
            let outcome = self.transfer(job, &target, batch).await;
            let result = &mut results[target.index];

            match outcome {
                Ok(status) => {
                    result.record(status);
                    if status.is_success() {
                        result.size = local_size(&target.local_path).await;
                    }
                    if status.is_failed() && policy.aborts_on_failure() {
                        warn!(path = %target.remote_path, "transfer failed, stopping batch");
                        aborted = true;
                        break;
                    }
                }
                Err(e) if e.is_cancelled() => return Err(BatchError::Cancelled),
                Err(e) => {
                    warn!(path = %target.remote_path, error = %e, "transfer failed");
                    result.fail(e.to_string());
                    if policy.stop {
                        aborted = true;
                        break;
                    }
                    if policy.throw {
                        if policy.delete_processed {
                            self.purge(job, &mut results).await;
                        }
                        return Err(BatchError::Transfer {
                            path: target.remote_path,
                            source: e,
                        });
                    }
                }
            }
        }

        if aborted {
            if policy.delete_processed {
                self.purge(job, &mut results).await;
            }
            if policy.throw {
                let failed = results.iter().filter(|result| result.is_failed).count();
                return Err(BatchError::Aborted { failed, results });
            }
        }

        let summary = BatchSummary::from_results(&results);
        info!(
            direction = job.direction(),
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            filtered = summary.filtered,
            purged = summary.purged,
            not_attempted = summary.not_attempted,
            bytes = summary.bytes,
            "batch finished"
        );
        Ok(results)
    }

    async fn transfer(
        &mut self,
        job: Job<'_>,
        target: &TransferTarget,
        batch: BatchContext,
    ) -> Result<TransferStatus, TransferError> {
        match job {
            Job::Download(options) => {
                validate_file_name(remote_file_name(&target.remote_path))?;
                let options = DownloadOptions {
                    exists_mode: options.exists_mode,
                    verify: options.verify,
                    progress: options.progress.clone(),
                    cancel: options.cancel.clone(),
                    batch: Some(batch),
                };
                self.client
                    .download_file(&target.local_path, &target.remote_path, &options)
                    .await
            }
            Job::Upload(options) => {
                let name = target
                    .local_path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or_default();
                validate_file_name(name)?;
                let options = UploadOptions {
                    exists_mode: options.exists_mode,
                    create_remote_dir: options.create_remote_dir,
                    known_exists: None,
                    verify: options.verify,
                    progress: options.progress.clone(),
                    cancel: options.cancel.clone(),
                    batch: Some(batch),
                };
                self.client
                    .upload_file(&target.local_path, &target.remote_path, &options)
                    .await
            }
        }
    }

    /// Deletes the destination of every successful entry. A failed delete is
    /// logged and leaves the entry marked successful.
    async fn purge(&mut self, job: Job<'_>, results: &mut [TransferResult]) {
        for result in results.iter_mut().filter(|result| result.is_success) {
            let deleted = match job {
                Job::Download(_) => tokio::fs::remove_file(&result.local_path)
                    .await
                    .map_err(TransferError::from),
                Job::Upload(_) => self.client.delete_remote(&result.remote_path).await,
            };
            match deleted {
                Ok(()) => {
                    info!(path = %result.remote_path, direction = job.direction(), "purged");
                    result.purge();
                }
                Err(e) => {
                    warn!(path = %result.remote_path, error = %e, "purge failed");
                }
            }
        }
    }
}

fn argument(error: TransferError) -> BatchError {
    match error {
        TransferError::Argument(message) => BatchError::Argument(message),
        other => BatchError::Argument(other.to_string()),
    }
}

async fn local_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|meta| meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ExtensionRule, ListMode};
    use ftpflow_protocol::FtpReply;
    use ftpflow_transfer::testing::{MockSession, SessionCall};
    use ftpflow_transfer::{ProgressSnapshot, TransferConfig};
    use std::sync::Mutex;

    fn batch(session: MockSession) -> BatchTransfer<MockSession> {
        BatchTransfer::new(TransferClient::new(
            session,
            TransferConfig {
                chunk_size: 64,
                ..TransferConfig::default()
            },
        ))
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 7) as u8).collect()
    }

    fn reads(session: &MockSession, path: &str) -> usize {
        session
            .calls()
            .iter()
            .filter(|call| matches!(call, SessionCall::OpenRead(p, _) if p == path))
            .count()
    }

    #[tokio::test]
    async fn stop_policy_leaves_rest_unattempted() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MockSession::new();
        session.add_file("/in/a.tmp", payload(10));
        session.add_file("/in/b.bin", payload(100));
        session.add_file("/in/c.bin", payload(100));
        session.reply_for("/in/b.bin", FtpReply::new("451", "Local error"));

        let options = DownloadBatchOptions {
            error_policy: BatchErrorPolicy::stop(),
            rules: vec![Arc::new(ExtensionRule::new(ListMode::Blacklist, ["tmp"]))],
            ..DownloadBatchOptions::default()
        };
        let mut batch = batch(session);
        let results = batch
            .download_files(dir.path(), &["/in/a.tmp", "/in/b.bin", "/in/c.bin"], &options)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_filtered && results[0].is_skipped);
        assert!(results[1].is_failed);
        assert!(results[2].not_attempted());
        assert_eq!(results[2].remote_path, "/in/c.bin");

        let session = batch.client().session();
        assert_eq!(reads(session, "/in/a.tmp"), 0);
        assert_eq!(reads(session, "/in/c.bin"), 0);
        assert!(!dir.path().join("a.tmp").exists());
    }

    #[tokio::test]
    async fn stop_with_throw_is_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MockSession::new();
        session.add_file("/a.bin", payload(10));
        let options = DownloadBatchOptions {
            error_policy: BatchErrorPolicy {
                stop: true,
                throw: true,
                delete_processed: false,
            },
            ..DownloadBatchOptions::default()
        };

        let mut batch = batch(session);
        let err = batch
            .download_files(dir.path(), &["/a.bin"], &options)
            .await
            .unwrap_err();
        assert!(err.is_argument());
        assert!(batch.client().session().calls().is_empty());
    }

    #[tokio::test]
    async fn blank_directory_is_rejected() {
        let mut batch = batch(MockSession::new());
        let err = batch
            .download_files(Path::new("  "), &["/a.bin"], &DownloadBatchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Argument(_)));

        let err = batch
            .upload_files("", &[Path::new("a.bin")], &UploadBatchOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_argument());
        assert!(batch.client().session().calls().is_empty());
    }

    #[tokio::test]
    async fn failures_are_recorded_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MockSession::new();
        session.add_file("/b.bin", payload(150));

        let mut batch = batch(session);
        let results = batch
            .download_files(
                dir.path(),
                &["/missing.bin", "/b.bin"],
                &DownloadBatchOptions::default(),
            )
            .await
            .unwrap();

        assert!(results[0].is_failed);
        assert!(results[0].error.as_deref().unwrap().contains("550"));
        assert!(results[1].is_success);
        assert_eq!(results[1].size, Some(150));
        assert_eq!(std::fs::read(dir.path().join("b.bin")).unwrap(), payload(150));

        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.bytes, 150);
    }

    #[tokio::test]
    async fn throw_purges_processed_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MockSession::new();
        session.add_file("/a.bin", payload(50));

        let options = DownloadBatchOptions {
            error_policy: BatchErrorPolicy::throw().with_delete_processed(),
            ..DownloadBatchOptions::default()
        };
        let mut batch = batch(session);
        let err = batch
            .download_files(dir.path(), &["/a.bin", "/missing.bin"], &options)
            .await
            .unwrap_err();

        match err {
            BatchError::Transfer { path, source } => {
                assert_eq!(path, "/missing.bin");
                assert!(matches!(source, TransferError::Reply(ref reply) if reply.code == "550"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dir.path().join("a.bin").exists());
    }

    #[tokio::test]
    async fn stop_on_error_purges_and_returns_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MockSession::new();
        session.add_file("/a.bin", payload(50));
        session.add_file("/c.bin", payload(50));

        let options = DownloadBatchOptions {
            error_policy: BatchErrorPolicy::stop().with_delete_processed(),
            ..DownloadBatchOptions::default()
        };
        let mut batch = batch(session);
        let results = batch
            .download_files(dir.path(), &["/a.bin", "/missing.bin", "/c.bin"], &options)
            .await
            .unwrap();

        assert!(results[0].is_purged && !results[0].is_success);
        assert!(results[1].is_failed);
        assert!(results[1].error.as_deref().unwrap().contains("550"));
        assert!(results[2].not_attempted());
        assert!(!dir.path().join("a.bin").exists());
        assert!(!dir.path().join("c.bin").exists());
        assert_eq!(reads(batch.client().session(), "/c.bin"), 0);
    }

    #[tokio::test]
    async fn throw_on_failed_status_reports_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MockSession::new();
        session.add_file("/a.bin", payload(50));
        session.add_file("/b.bin", payload(50));
        session.add_file("/c.bin", payload(50));
        session.reply_for("/b.bin", FtpReply::new("426", "Connection closed"));

        let options = DownloadBatchOptions {
            error_policy: BatchErrorPolicy::throw().with_delete_processed(),
            ..DownloadBatchOptions::default()
        };
        let mut batch = batch(session);
        let err = batch
            .download_files(dir.path(), &["/a.bin", "/b.bin", "/c.bin"], &options)
            .await
            .unwrap_err();

        let BatchError::Aborted { failed, results } = err else {
            panic!("expected an aborted batch");
        };
        assert_eq!(failed, 1);
        assert!(results[0].is_purged && !results[0].is_success);
        assert!(results[1].is_failed);
        assert!(results[2].not_attempted());
        assert!(!dir.path().join("a.bin").exists());
        assert_eq!(reads(batch.client().session(), "/c.bin"), 0);
    }

    #[tokio::test]
    async fn cancellation_is_never_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MockSession::new();
        session.add_file("/a.bin", payload(50));
        session.add_file("/b.bin", payload(50));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let progress: ProgressCallback = Arc::new(move |snapshot: ProgressSnapshot| {
            if snapshot.percent >= 100.0 {
                trigger.cancel();
            }
        });
        let options = DownloadBatchOptions {
            cancel,
            progress: Some(progress),
            ..DownloadBatchOptions::default()
        };

        let mut batch = batch(session);
        let err = batch
            .download_files(dir.path(), &["/a.bin", "/b.bin"], &options)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(reads(batch.client().session(), "/b.bin"), 0);
    }

    #[tokio::test]
    async fn traversal_names_fail_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MockSession::new();
        session.add_file("/ok.bin", payload(20));

        let mut batch = batch(session);
        let results = batch
            .download_files(
                dir.path(),
                &["/etc/..", "/ok.bin"],
                &DownloadBatchOptions::default(),
            )
            .await
            .unwrap();
        assert!(results[0].is_failed);
        assert!(results[1].is_success);
        assert_eq!(reads(batch.client().session(), "/etc/.."), 0);
    }

    #[tokio::test]
    async fn progress_carries_batch_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = MockSession::new();
        session.add_file("/a.bin", payload(10));
        session.add_file("/b.bin", payload(10));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressCallback = Arc::new(move |snapshot: ProgressSnapshot| {
            if let Some(batch) = snapshot.batch {
                sink.lock().unwrap().push((batch.index, batch.count));
            }
        });
        let options = DownloadBatchOptions {
            progress: Some(progress),
            rules: vec![Arc::new(|c: &RuleCandidate<'_>| c.name != "skip.bin")],
            ..DownloadBatchOptions::default()
        };

        let mut batch = batch(session);
        batch
            .download_files(dir.path(), &["/skip.bin", "/a.bin", "/b.bin"], &options)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.contains(&(1, 3)));
        assert!(seen.contains(&(2, 3)));
        assert!(!seen.iter().any(|(index, _)| *index == 0));
    }

    #[tokio::test]
    async fn upload_batch_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, payload(70)).unwrap();
        std::fs::write(&b, payload(30)).unwrap();

        let options = UploadBatchOptions {
            create_remote_dir: true,
            ..UploadBatchOptions::default()
        };
        let mut batch = batch(MockSession::new());
        let results = batch.upload_files("/up", &[&a, &b], &options).await.unwrap();

        assert!(results.iter().all(|result| result.is_success));
        assert_eq!(results[0].remote_path, "/up/a.txt");
        let session = batch.client().session();
        assert!(session.has_directory("/up"));
        assert_eq!(session.file("/up/a.txt").unwrap(), payload(70));
        assert_eq!(session.file("/up/b.txt").unwrap(), payload(30));
    }

    #[tokio::test]
    async fn upload_stop_purges_remote_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, payload(40)).unwrap();
        std::fs::write(&b, payload(40)).unwrap();

        let mut session = MockSession::new();
        session.add_directory("/up");
        session.reply_for("/up/b.txt", FtpReply::new("552", "Quota exceeded"));
        let options = UploadBatchOptions {
            error_policy: BatchErrorPolicy::stop().with_delete_processed(),
            ..UploadBatchOptions::default()
        };

        let mut batch = batch(session);
        let results = batch.upload_files("/up/", &[&a, &b], &options).await.unwrap();

        assert!(results[0].is_purged);
        assert!(results[1].is_failed);
        let session = batch.client().session();
        assert!(session.file("/up/a.txt").is_none());
        assert!(session.calls().contains(&SessionCall::Delete("/up/a.txt".into())));
        assert!(a.exists());
    }
}
