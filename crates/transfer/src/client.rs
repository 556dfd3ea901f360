//! Public single-file surface.

use std::path::Path;

use ftpflow_protocol::{ExistsMode, LocalExistsMode, TransferStatus, VerifyPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, info, info_span, warn};

use crate::TransferError;
use crate::config::TransferConfig;
use crate::download::{DownloadJob, download_attempt};
use crate::progress::{BatchContext, ProgressCallback};
use crate::session::FtpSession;
use crate::source::LocalSource;
use crate::upload::{UploadJob, upload_attempt};
use crate::validation::validate_remote_path;
use crate::verify::{LocalContent, VerifyAction, next_action, verify_transfer};

/// Per-call upload settings.
#[derive(Clone, Default)]
pub struct UploadOptions {
    pub exists_mode: ExistsMode,
    /// Create the remote parent directory when it is missing.
    pub create_remote_dir: bool,
    /// Whether the remote target is already known to exist, saving a query.
    pub known_exists: Option<bool>,
    pub verify: VerifyPolicy,
    pub progress: Option<ProgressCallback>,
    pub cancel: CancellationToken,
    pub batch: Option<BatchContext>,
}

/// Per-call download settings.
#[derive(Clone, Default)]
pub struct DownloadOptions {
    pub exists_mode: LocalExistsMode,
    pub verify: VerifyPolicy,
    pub progress: Option<ProgressCallback>,
    pub cancel: CancellationToken,
    pub batch: Option<BatchContext>,
}

/// Moves files over one [`FtpSession`], one at a time.
///
/// Every operation runs inside the client's span, so log lines from
/// concurrent clients stay apart without any global logging state.
pub struct TransferClient<S> {
    session: S,
    config: TransferConfig,
    span: Span,
}

impl<S: FtpSession> TransferClient<S> {
    pub fn new(session: S, config: TransferConfig) -> Self {
        Self {
            session,
            config,
            span: info_span!("ftp_session"),
        }
    }

    /// Replaces the span that scopes this client's log output.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Uploads `length` bytes read from `source` to `remote_path`.
    ///
    /// `local_label` names the source in progress reports.
    pub async fn upload_stream(
        &mut self,
        source: &mut dyn LocalSource,
        length: u64,
        local_label: &str,
        remote_path: &str,
        options: &UploadOptions,
    ) -> Result<TransferStatus, TransferError> {
        let span = self.span.clone();
        self.upload_verified(source, length, local_label, remote_path, options)
            .instrument(span)
            .await
    }

    /// Uploads the local file at `local_path`.
    pub async fn upload_file(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        options: &UploadOptions,
    ) -> Result<TransferStatus, TransferError> {
        let span = self.span.clone();
        async {
            let mut file = tokio::fs::File::open(local_path).await?;
            let length = file.metadata().await?.len();
            let label = local_path.display().to_string();
            self.upload_verified(&mut file, length, &label, remote_path, options)
                .await
        }
        .instrument(span)
        .await
    }

    /// Downloads `remote_path` into `local_path`.
    pub async fn download_file(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        options: &DownloadOptions,
    ) -> Result<TransferStatus, TransferError> {
        let span = self.span.clone();
        self.download_verified(local_path, remote_path, options)
            .instrument(span)
            .await
    }

    /// Deletes a remote file, as the batch purge does.
    pub async fn delete_remote(&mut self, remote_path: &str) -> Result<(), TransferError> {
        let span = self.span.clone();
        self.session.delete_file(remote_path).instrument(span).await
    }

    async fn upload_verified(
        &mut self,
        source: &mut dyn LocalSource,
        length: u64,
        local_label: &str,
        remote_path: &str,
        options: &UploadOptions,
    ) -> Result<TransferStatus, TransferError> {
        validate_remote_path(remote_path)?;
        self.config.validate()?;

        let mut job = UploadJob {
            remote_path,
            local_label,
            length,
            exists_mode: options.exists_mode,
            known_exists: options.known_exists,
            create_remote_dir: options.create_remote_dir,
            progress: options.progress.as_ref(),
            batch: options.batch,
            cancel: &options.cancel,
        };

        let mut attempt = 1;
        loop {
            let status = upload_attempt(&mut self.session, &self.config, source, &job).await?;
            if options.verify.is_none() || status.is_skipped() {
                return Ok(status);
            }

            let verified = verify_transfer(
                &mut self.session,
                LocalContent::Source {
                    source: &mut *source,
                    length,
                },
                remote_path,
                options.verify,
            )
            .await?;

            match next_action(options.verify, verified, attempt, self.config.retry_attempts) {
                VerifyAction::Accept => return Ok(status),
                VerifyAction::Retry => {
                    warn!(path = remote_path, attempt, "verification failed, uploading again");
                    attempt += 1;
                    job.exists_mode = ExistsMode::Overwrite;
                    job.known_exists = None;
                }
                VerifyAction::Reject { delete, throw } => {
                    warn!(path = remote_path, attempt, "verification failed");
                    if delete {
                        info!(path = remote_path, "deleting unverified upload");
                        self.session.delete_file(remote_path).await?;
                    }
                    if throw {
                        return Err(TransferError::Verification {
                            path: remote_path.to_string(),
                        });
                    }
                    return Ok(TransferStatus::Failed);
                }
            }
        }
    }

    async fn download_verified(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        options: &DownloadOptions,
    ) -> Result<TransferStatus, TransferError> {
        validate_remote_path(remote_path)?;
        self.config.validate()?;

        let label = local_path.display().to_string();
        let mut job = DownloadJob {
            local_path,
            local_label: &label,
            remote_path,
            exists_mode: options.exists_mode,
            progress: options.progress.as_ref(),
            batch: options.batch,
            cancel: &options.cancel,
        };

        let mut attempt = 1;
        loop {
            let status = download_attempt(&mut self.session, &self.config, &job).await?;
            if options.verify.is_none() || status.is_skipped() {
                return Ok(status);
            }

            let verified = verify_transfer(
                &mut self.session,
                LocalContent::File(local_path),
                remote_path,
                options.verify,
            )
            .await?;

            match next_action(options.verify, verified, attempt, self.config.retry_attempts) {
                VerifyAction::Accept => return Ok(status),
                VerifyAction::Retry => {
                    warn!(path = remote_path, attempt, "verification failed, downloading again");
                    attempt += 1;
                    job.exists_mode = LocalExistsMode::Overwrite;
                }
                VerifyAction::Reject { delete, throw } => {
                    warn!(path = remote_path, attempt, "verification failed");
                    if delete {
                        info!(path = %local_path.display(), "deleting unverified download");
                        tokio::fs::remove_file(local_path).await?;
                    }
                    if throw {
                        return Err(TransferError::Verification {
                            path: remote_path.to_string(),
                        });
                    }
                    return Ok(TransferStatus::Failed);
                }
            }
        }
    }
}
