//! One upload attempt: resolve, open, chunk loop, completion.

use ftpflow_data_channel::DataStream;
use ftpflow_protocol::{ExistsMode, TransferStatus};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::TransferError;
use crate::completion::finish;
use crate::config::TransferConfig;
use crate::existence::{UploadPlan, resolve_upload};
use crate::keepalive::KeepAlive;
use crate::progress::{BatchContext, ProgressCallback, ProgressReporter};
use crate::resume::{FaultOutcome, Reopen, handle_fault};
use crate::session::FtpSession;
use crate::source::LocalSource;
use crate::throttle::Throttle;
use crate::validation::remote_parent;

/// Everything one upload attempt needs besides the session and the source.
pub(crate) struct UploadJob<'a> {
    pub remote_path: &'a str,
    pub local_label: &'a str,
    pub length: u64,
    pub exists_mode: ExistsMode,
    pub known_exists: Option<bool>,
    pub create_remote_dir: bool,
    pub progress: Option<&'a ProgressCallback>,
    pub batch: Option<BatchContext>,
    pub cancel: &'a CancellationToken,
}

pub(crate) async fn upload_attempt<S: FtpSession + ?Sized>(
    session: &mut S,
    config: &TransferConfig,
    source: &mut dyn LocalSource,
    job: &UploadJob<'_>,
) -> Result<TransferStatus, TransferError> {
    if job.cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }
    if job.exists_mode.is_resume() && !source.can_seek() {
        return Err(TransferError::Argument(
            "resume requires a seekable source".into(),
        ));
    }
    if job.create_remote_dir {
        ensure_remote_dir(session, job.remote_path).await?;
    }

    let mut reporter =
        ProgressReporter::new(job.progress, job.local_label, job.remote_path, job.batch);

    let start = match resolve_upload(
        session,
        job.remote_path,
        job.exists_mode,
        job.known_exists,
        job.length,
    )
    .await?
    {
        UploadPlan::Skip(reason) => {
            debug!(path = job.remote_path, ?reason, "upload skipped");
            reporter.complete(job.length);
            return Ok(TransferStatus::Skipped);
        }
        UploadPlan::Transfer(start) => start,
    };

    if source.can_seek() {
        if let Err(e) = source.seek_to(start.local_offset).await {
            warn!(offset = start.local_offset, error = %e, "could not position source");
        }
    }

    let chunk_size = Throttle::chunk_size(config.upload_rate_limit, config.chunk_size);
    let desired_length = start.remote_offset + job.length.saturating_sub(start.local_offset);

    let mut stream = if start.append {
        session
            .open_append(job.remote_path, Some(desired_length))
            .await?
    } else {
        session
            .open_write(job.remote_path, Some(desired_length))
            .await?
    };
    stream.set_position(start.remote_offset);
    if let Err(e) = stream.set_length_hint(desired_length) {
        warn!(length = desired_length, error = %e, "could not pre-size remote file");
    }

    debug!(
        path = job.remote_path,
        local_offset = start.local_offset,
        remote_offset = start.remote_offset,
        append = start.append,
        chunk_size,
        "upload started"
    );

    let mut throttle = Throttle::new(config.upload_rate_limit);
    let mut keepalive = KeepAlive::new(config.noop_interval());
    let mut buf = vec![0u8; chunk_size];
    let mut local_pos = start.local_offset;
    let mut remote_pos = start.remote_offset;
    let mut reported = false;
    reporter.start_at(local_pos);

    while local_pos < job.length {
        if job.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let want = chunk_size.min(usize::try_from(job.length - local_pos).unwrap_or(chunk_size));
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            debug!(position = local_pos, length = job.length, "source ended early");
            break;
        }

        let step = match write_chunk(&mut stream, &buf[..n]).await {
            Ok(()) => {
                local_pos += n as u64;
                remote_pos += n as u64;
                throttle.pace(n as u64, job.cancel).await?;
                reporter.report(local_pos, Some(job.length), throttle.window_bytes());
                reported = true;
                trace!(position = local_pos, bytes = n, "chunk written");
                keepalive.tick(session).await
            }
            Err(e) => Err(e),
        };

        if let Err(error) = step {
            let complete = local_pos >= job.length;
            match handle_fault(
                session,
                stream,
                Reopen::Append(job.remote_path),
                remote_pos,
                complete,
                error,
            )
            .await
            {
                FaultOutcome::Continue(kept) => stream = kept,
                FaultOutcome::ResumeWith(fresh) => {
                    stream = fresh;
                    if !source.can_seek() {
                        return Err(TransferError::Argument(
                            "cannot resume from a source that cannot be repositioned".into(),
                        ));
                    }
                    source.seek_to(local_pos).await?;
                }
                FaultOutcome::Fatal(e) => return Err(e),
            }
        }
    }

    if !reported {
        reporter.report(local_pos, Some(job.length), throttle.window_bytes());
    }

    finish(
        session,
        config,
        stream,
        keepalive.sent(),
        local_pos >= job.length,
        job.remote_path,
    )
    .await
}

async fn write_chunk(stream: &mut Box<dyn DataStream>, chunk: &[u8]) -> Result<(), TransferError> {
    stream.write_all(chunk).await.map_err(TransferError::from_data)?;
    stream.flush().await.map_err(TransferError::from_data)?;
    Ok(())
}

/// Creates the parent directory of `remote_path` if the server lacks it.
async fn ensure_remote_dir<S: FtpSession + ?Sized>(
    session: &mut S,
    remote_path: &str,
) -> Result<(), TransferError> {
    let Some(parent) = remote_parent(remote_path) else {
        return Ok(());
    };
    if !session.directory_exists(parent).await? {
        debug!(path = parent, "creating remote directory");
        session.create_directory(parent).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSession, SessionCall};
    use crate::progress::ProgressSnapshot;
    use crate::source::Forward;
    use ftpflow_data_channel::MemoryFault;
    use ftpflow_protocol::FtpReply;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn config(chunk_size: usize) -> TransferConfig {
        TransferConfig {
            chunk_size,
            ..TransferConfig::default()
        }
    }

    fn job<'a>(mode: ExistsMode, length: u64, cancel: &'a CancellationToken) -> UploadJob<'a> {
        UploadJob {
            remote_path: "/up/data.bin",
            local_label: "data.bin",
            length,
            exists_mode: mode,
            known_exists: None,
            create_remote_dir: false,
            progress: None,
            batch: None,
            cancel,
        }
    }

    #[tokio::test]
    async fn overwrite_absent_remote() {
        let data = payload(1000);
        let mut session = MockSession::new();
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(data.clone());

        let status = upload_attempt(
            &mut session,
            &config(100),
            &mut source,
            &job(ExistsMode::Overwrite, 1000, &cancel),
        )
        .await
        .unwrap();

        assert_eq!(status, TransferStatus::Success);
        assert_eq!(session.file("/up/data.bin").unwrap(), data);
        assert_eq!(session.bytes_written("/up/data.bin"), 1000);
        assert!(
            !session
                .calls()
                .iter()
                .any(|call| matches!(call, SessionCall::Delete(_)))
        );
        assert!(session.calls().contains(&SessionCall::OpenWrite("/up/data.bin".into())));
    }

    #[tokio::test]
    async fn resume_complete_target_twice() {
        let data = payload(1000);
        let mut session = MockSession::new();
        session.add_file("/up/data.bin", data.clone());
        let cancel = CancellationToken::new();

        for _ in 0..2 {
            let mut source = Cursor::new(data.clone());
            let status = upload_attempt(
                &mut session,
                &config(100),
                &mut source,
                &job(ExistsMode::Resume, 1000, &cancel),
            )
            .await
            .unwrap();
            assert_eq!(status, TransferStatus::Skipped);
        }
        assert_eq!(session.bytes_written("/up/data.bin"), 0);
        assert!(
            !session
                .calls()
                .iter()
                .any(|call| matches!(call, SessionCall::OpenWrite(_) | SessionCall::OpenAppend(_)))
        );
    }

    #[tokio::test]
    async fn resume_partial_appends_remainder() {
        let data = payload(1000);
        let mut session = MockSession::new();
        session.add_file("/up/data.bin", data[..400].to_vec());
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(data.clone());

        let status = upload_attempt(
            &mut session,
            &config(100),
            &mut source,
            &job(ExistsMode::Resume, 1000, &cancel),
        )
        .await
        .unwrap();

        assert_eq!(status, TransferStatus::Success);
        assert_eq!(session.bytes_written("/up/data.bin"), 600);
        assert_eq!(session.file("/up/data.bin").unwrap(), data);
        assert!(session.calls().contains(&SessionCall::OpenAppend("/up/data.bin".into())));
    }

    #[tokio::test]
    async fn reset_mid_resume_reopens_append() {
        let data = payload(1000);
        let mut session = MockSession::new();
        session.add_file("/up/data.bin", data[..400].to_vec());
        session.inject_fault("/up/data.bin", MemoryFault::ResetAt(650));
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(data.clone());

        let status = upload_attempt(
            &mut session,
            &config(100),
            &mut source,
            &job(ExistsMode::Resume, 1000, &cancel),
        )
        .await
        .unwrap();

        assert_eq!(status, TransferStatus::Success);
        assert_eq!(session.file("/up/data.bin").unwrap(), data);
        // The chunk that hit the reset moved nothing, so the total matches
        // an undisturbed resume.
        assert_eq!(session.bytes_written("/up/data.bin"), 600);
        let appends = session
            .calls()
            .iter()
            .filter(|call| matches!(call, SessionCall::OpenAppend(_)))
            .count();
        assert_eq!(appends, 2);
    }

    #[tokio::test]
    async fn reset_on_fresh_upload_resumes_at_confirmed_offset() {
        let data = payload(1000);
        let mut session = MockSession::new();
        session.inject_fault("/up/data.bin", MemoryFault::ResetAt(250));
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(data.clone());

        let status = upload_attempt(
            &mut session,
            &config(250),
            &mut source,
            &job(ExistsMode::Overwrite, 1000, &cancel),
        )
        .await
        .unwrap();

        assert_eq!(status, TransferStatus::Success);
        assert_eq!(session.file("/up/data.bin").unwrap(), data);
        assert!(session.calls().contains(&SessionCall::OpenAppend("/up/data.bin".into())));
    }

    #[tokio::test]
    async fn failed_reopen_is_compound() {
        let mut session = MockSession::new();
        session.inject_fault("/up/data.bin", MemoryFault::ResetAt(100));
        session.fail_append("/up/data.bin");
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(payload(300));

        let err = upload_attempt(
            &mut session,
            &config(100),
            &mut source,
            &job(ExistsMode::Overwrite, 300, &cancel),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::Resume { .. }));
    }

    #[tokio::test]
    async fn resume_needs_seekable_source() {
        let mut session = MockSession::new();
        let cancel = CancellationToken::new();
        let mut source = Forward(&b"abc"[..]);

        let err = upload_attempt(
            &mut session,
            &config(100),
            &mut source,
            &job(ExistsMode::Resume, 3, &cancel),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::Argument(_)));
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn reset_with_forward_source_is_fatal() {
        let data = payload(300);
        let mut session = MockSession::new();
        session.inject_fault("/up/data.bin", MemoryFault::ResetAt(100));
        let cancel = CancellationToken::new();
        let mut source = Forward(&data[..]);

        let err = upload_attempt(
            &mut session,
            &config(100),
            &mut source,
            &job(ExistsMode::Overwrite, 300, &cancel),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::Argument(_)));
    }

    #[tokio::test]
    async fn add_to_end_appends_whole_source() {
        let mut session = MockSession::new();
        session.add_file("/up/data.bin", b"head-".to_vec());
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(b"tail".to_vec());

        let status = upload_attempt(
            &mut session,
            &config(100),
            &mut source,
            &job(ExistsMode::AddToEnd, 4, &cancel),
        )
        .await
        .unwrap();
        assert_eq!(status, TransferStatus::Success);
        assert_eq!(session.file("/up/data.bin").unwrap(), b"head-tail");
    }

    #[tokio::test]
    async fn failure_reply_marks_failed() {
        let mut session = MockSession::new();
        session.push_reply(FtpReply::new("451", "Local error in processing"));
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(payload(10));

        let status = upload_attempt(
            &mut session,
            &config(100),
            &mut source,
            &job(ExistsMode::Overwrite, 10, &cancel),
        )
        .await
        .unwrap();
        assert_eq!(status, TransferStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_timeout_after_last_chunk_is_absorbed() {
        let mut session = MockSession::new();
        session.noop_times_out();
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(payload(100));
        let config = TransferConfig {
            chunk_size: 100,
            upload_rate_limit: 1000,
            noop_interval_ms: 50,
            ..TransferConfig::default()
        };

        let status = upload_attempt(
            &mut session,
            &config,
            &mut source,
            &job(ExistsMode::Overwrite, 100, &cancel),
        )
        .await
        .unwrap();
        assert_eq!(status, TransferStatus::Success);
        assert!(session.calls().contains(&SessionCall::Noop));
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_timeout_mid_transfer_propagates() {
        let mut session = MockSession::new();
        session.noop_times_out();
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(payload(300));
        let config = TransferConfig {
            chunk_size: 100,
            upload_rate_limit: 1000,
            noop_interval_ms: 50,
            ..TransferConfig::default()
        };

        let err = upload_attempt(
            &mut session,
            &config,
            &mut source,
            &job(ExistsMode::Overwrite, 300, &cancel),
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_replies_are_drained() {
        let mut session = MockSession::new();
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(payload(300));
        let config = TransferConfig {
            chunk_size: 100,
            upload_rate_limit: 1000,
            noop_interval_ms: 50,
            ..TransferConfig::default()
        };

        let status = upload_attempt(
            &mut session,
            &config,
            &mut source,
            &job(ExistsMode::Overwrite, 300, &cancel),
        )
        .await
        .unwrap();
        assert_eq!(status, TransferStatus::Success);
        assert!(session.calls().contains(&SessionCall::Reply { drain_noops: true }));
        assert_eq!(session.pending_noop_replies(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_paces_chunks() {
        let mut session = MockSession::new();
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(payload(1000));
        let config = TransferConfig {
            upload_rate_limit: 1000,
            ..TransferConfig::default()
        };

        let started = tokio::time::Instant::now();
        upload_attempt(
            &mut session,
            &config,
            &mut source,
            &job(ExistsMode::Overwrite, 1000, &cancel),
        )
        .await
        .unwrap();
        // 10 chunks of 100 bytes at 1000 B/s.
        assert!(started.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn progress_reaches_full() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |snapshot: ProgressSnapshot| {
            sink.lock().unwrap().push(snapshot.percent);
        });
        let mut session = MockSession::new();
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(payload(1000));
        let mut upload = job(ExistsMode::Overwrite, 1000, &cancel);
        upload.progress = Some(&callback);

        upload_attempt(&mut session, &config(250), &mut source, &upload)
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![25.0, 50.0, 75.0, 100.0]);
    }

    #[tokio::test]
    async fn skipped_upload_reports_full_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |snapshot: ProgressSnapshot| {
            sink.lock().unwrap().push(snapshot.percent);
        });
        let mut session = MockSession::new();
        session.add_file("/up/data.bin", vec![1]);
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(payload(10));
        let mut upload = job(ExistsMode::Skip, 10, &cancel);
        upload.progress = Some(&callback);

        let status = upload_attempt(&mut session, &config(100), &mut source, &upload)
            .await
            .unwrap();
        assert_eq!(status, TransferStatus::Skipped);
        assert_eq!(*seen.lock().unwrap(), vec![100.0]);
    }

    #[tokio::test]
    async fn creates_missing_remote_dir() {
        let mut session = MockSession::new();
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(payload(10));
        let mut upload = job(ExistsMode::Overwrite, 10, &cancel);
        upload.create_remote_dir = true;

        upload_attempt(&mut session, &config(100), &mut source, &upload)
            .await
            .unwrap();
        assert!(session.calls().contains(&SessionCall::CreateDir("/up".into())));
        assert!(session.has_directory("/up"));
    }

    /// Claims to be seekable but fails every seek.
    struct BrokenSeek(Cursor<Vec<u8>>);

    impl tokio::io::AsyncRead for BrokenSeek {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            tokio::io::AsyncRead::poll_read(std::pin::Pin::new(&mut self.0), cx, buf)
        }
    }

    impl LocalSource for BrokenSeek {
        fn can_seek(&self) -> bool {
            true
        }

        fn seek_to(&mut self, _offset: u64) -> crate::source::SeekFuture<'_> {
            Box::pin(async {
                Err(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "illegal seek",
                ))
            })
        }
    }

    #[tokio::test]
    async fn setup_seek_failure_is_ignored() {
        let data = payload(100);
        let mut session = MockSession::new();
        let cancel = CancellationToken::new();
        let mut source = BrokenSeek(Cursor::new(data.clone()));

        let status = upload_attempt(
            &mut session,
            &config(50),
            &mut source,
            &job(ExistsMode::Overwrite, 100, &cancel),
        )
        .await
        .unwrap();
        assert_eq!(status, TransferStatus::Success);
        assert_eq!(session.file("/up/data.bin").unwrap(), data);
    }

    #[tokio::test]
    async fn reseek_failure_after_reset_is_fatal() {
        let mut session = MockSession::new();
        session.inject_fault("/up/data.bin", MemoryFault::ResetAt(50));
        let cancel = CancellationToken::new();
        let mut source = BrokenSeek(Cursor::new(payload(100)));

        let err = upload_attempt(
            &mut session,
            &config(50),
            &mut source,
            &job(ExistsMode::Overwrite, 100, &cancel),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransferError::Io(ref e) if e.kind() == std::io::ErrorKind::Unsupported));
    }

    #[tokio::test]
    async fn empty_source_reports_completion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |snapshot: ProgressSnapshot| {
            sink.lock().unwrap().push(snapshot.percent);
        });
        let mut session = MockSession::new();
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(Vec::new());
        let mut upload = job(ExistsMode::Overwrite, 0, &cancel);
        upload.progress = Some(&callback);

        let status = upload_attempt(&mut session, &config(100), &mut source, &upload)
            .await
            .unwrap();
        assert_eq!(status, TransferStatus::Success);
        assert_eq!(*seen.lock().unwrap(), vec![100.0]);
        assert_eq!(session.file("/up/data.bin").unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn resume_against_longer_remote_opens_nothing() {
        let mut session = MockSession::new();
        session.add_file("/up/data.bin", payload(1200));
        let cancel = CancellationToken::new();
        let mut source = Cursor::new(payload(1000));

        let status = upload_attempt(
            &mut session,
            &config(100),
            &mut source,
            &job(ExistsMode::Resume, 1000, &cancel),
        )
        .await
        .unwrap();
        assert_eq!(status, TransferStatus::Skipped);
        assert_eq!(session.bytes_written("/up/data.bin"), 0);
        assert!(
            !session
                .calls()
                .iter()
                .any(|call| matches!(call, SessionCall::OpenWrite(_) | SessionCall::OpenAppend(_)))
        );
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let mut session = MockSession::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut source = Cursor::new(payload(10));

        let err = upload_attempt(
            &mut session,
            &config(100),
            &mut source,
            &job(ExistsMode::Overwrite, 10, &cancel),
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
        assert!(session.calls().is_empty());
    }
}
