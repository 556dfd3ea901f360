//! One download attempt, the mirror of [`upload`](crate::upload).

use std::path::Path;

use ftpflow_protocol::{LocalExistsMode, TransferStatus};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::TransferError;
use crate::completion::finish;
use crate::config::TransferConfig;
use crate::existence::{DownloadPlan, resolve_download};
use crate::keepalive::KeepAlive;
use crate::progress::{BatchContext, ProgressCallback, ProgressReporter};
use crate::resume::{FaultOutcome, Reopen, handle_fault};
use crate::session::FtpSession;
use crate::throttle::Throttle;

pub(crate) struct DownloadJob<'a> {
    pub local_path: &'a Path,
    pub local_label: &'a str,
    pub remote_path: &'a str,
    pub exists_mode: LocalExistsMode,
    pub progress: Option<&'a ProgressCallback>,
    pub batch: Option<BatchContext>,
    pub cancel: &'a CancellationToken,
}

pub(crate) async fn download_attempt<S: FtpSession + ?Sized>(
    session: &mut S,
    config: &TransferConfig,
    job: &DownloadJob<'_>,
) -> Result<TransferStatus, TransferError> {
    if job.cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }

    let remote_length = match session.file_size(job.remote_path).await {
        Ok(size) => size,
        Err(e) => {
            warn!(path = job.remote_path, error = %e, "remote size unknown");
            None
        }
    };

    let mut reporter =
        ProgressReporter::new(job.progress, job.local_label, job.remote_path, job.batch);

    let offset = match resolve_download(job.local_path, job.exists_mode, remote_length).await? {
        DownloadPlan::Skip(reason) => {
            debug!(path = job.remote_path, ?reason, "download skipped");
            let length = match remote_length {
                Some(length) => length,
                None => tokio::fs::metadata(job.local_path).await?.len(),
            };
            reporter.complete(length);
            return Ok(TransferStatus::Skipped);
        }
        DownloadPlan::Transfer { offset } => offset,
    };

    let mut stream = session.open_read(job.remote_path, offset).await?;
    stream.set_position(offset);

    if let Some(parent) = job.local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(offset == 0)
        .open(job.local_path)
        .await?;
    if offset > 0 {
        file.set_len(offset).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
    }

    let chunk_size = Throttle::chunk_size(config.download_rate_limit, config.chunk_size);
    debug!(
        path = job.remote_path,
        offset,
        length = ?remote_length,
        chunk_size,
        "download started"
    );

    let mut throttle = Throttle::new(config.download_rate_limit);
    let mut keepalive = KeepAlive::new(config.noop_interval());
    let mut buf = vec![0u8; chunk_size];
    let mut position = offset;
    let mut reported = false;
    reporter.start_at(position);

    while remote_length.is_none_or(|length| position < length) {
        if job.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let want = match remote_length {
            Some(length) => chunk_size.min(usize::try_from(length - position).unwrap_or(chunk_size)),
            None => chunk_size,
        };
        let step = match stream.read(&mut buf[..want]).await {
            Ok(0) => break,
            Ok(n) => {
                file.write_all(&buf[..n]).await?;
                position += n as u64;
                throttle.pace(n as u64, job.cancel).await?;
                reporter.report(position, remote_length, throttle.window_bytes());
                reported = true;
                trace!(position, bytes = n, "chunk received");
                keepalive.tick(session).await
            }
            Err(e) => Err(TransferError::from_data(e)),
        };

        if let Err(error) = step {
            let complete = remote_length.is_some_and(|length| position >= length);
            match handle_fault(
                session,
                stream,
                Reopen::ReadFrom(job.remote_path),
                position,
                complete,
                error,
            )
            .await
            {
                FaultOutcome::Continue(kept) | FaultOutcome::ResumeWith(kept) => stream = kept,
                FaultOutcome::Fatal(e) => return Err(e),
            }
        }
    }

    file.flush().await?;
    drop(file);

    if !reported {
        // Unknown length: whatever arrived is the whole file.
        reporter.report(
            position,
            Some(remote_length.unwrap_or(position)),
            throttle.window_bytes(),
        );
    }

    if let Some(length) = remote_length {
        if position < length {
            debug!(position, length, "remote stream ended early");
        }
    }

    finish(
        session,
        config,
        stream,
        keepalive.sent(),
        remote_length.is_none_or(|length| position >= length),
        job.remote_path,
    )
    .await
}
