//! Closing a data connection and reading the transfer's final reply.

use ftpflow_data_channel::DataStream;
use ftpflow_protocol::TransferStatus;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::TransferError;
use crate::config::TransferConfig;
use crate::session::FtpSession;

/// Waits for the drain acknowledgment, closes `stream` and reads the reply
/// that tells whether the server accepted the transfer.
///
/// Keep-alive replies queued during the transfer are drained first when
/// `noop_sent`. A timeout waiting for the reply is treated as success, the
/// bytes having already been confirmed by the data connection.
pub(crate) async fn finish<S: FtpSession + ?Sized>(
    session: &mut S,
    config: &TransferConfig,
    mut stream: Box<dyn DataStream>,
    noop_sent: bool,
    complete: bool,
    path: &str,
) -> Result<TransferStatus, TransferError> {
    let position = stream.position();
    match tokio::time::timeout(config.drain_timeout(), stream.drain()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_timeout() && complete => {
            warn!(path, error = %e, "drain timed out after the last byte");
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => warn!(path, position, "no drain acknowledgment"),
    }
    if let Err(e) = stream.shutdown().await {
        debug!(path, error = %e, "closing data connection");
    }
    drop(stream);

    let reply = match tokio::time::timeout(config.reply_timeout(), session.get_reply(noop_sent)).await
    {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) if e.is_timeout() => {
            warn!(path, "transfer reply timed out");
            return Ok(TransferStatus::Success);
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            warn!(path, "no transfer reply");
            return Ok(TransferStatus::Success);
        }
    };

    if !reply.success() {
        warn!(path, %reply, "server rejected transfer");
        return Ok(TransferStatus::Failed);
    }
    info!(path, bytes = position, %reply, "transfer complete");
    Ok(TransferStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSession;
    use ftpflow_data_channel::{MemoryFile, MemoryStream};
    use ftpflow_protocol::FtpReply;
    use std::sync::{Arc, Mutex};

    fn stream() -> Box<dyn DataStream> {
        Box::new(MemoryStream::new(
            Arc::new(Mutex::new(MemoryFile::default())),
            0,
        ))
    }

    #[tokio::test]
    async fn success_reply() {
        let mut session = MockSession::new();
        let status = finish(
            &mut session,
            &TransferConfig::default(),
            stream(),
            false,
            true,
            "/a",
        )
        .await
        .unwrap();
        assert_eq!(status, TransferStatus::Success);
    }

    #[tokio::test]
    async fn failure_reply() {
        let mut session = MockSession::new();
        session.push_reply(FtpReply::new("552", "Quota exceeded"));
        let status = finish(
            &mut session,
            &TransferConfig::default(),
            stream(),
            false,
            true,
            "/a",
        )
        .await
        .unwrap();
        assert_eq!(status, TransferStatus::Failed);
    }

    #[tokio::test]
    async fn reply_timeout_is_benign() {
        let mut session = MockSession::new();
        session.reply_times_out();
        let status = finish(
            &mut session,
            &TransferConfig::default(),
            stream(),
            false,
            true,
            "/a",
        )
        .await
        .unwrap();
        assert_eq!(status, TransferStatus::Success);
    }

    #[tokio::test]
    async fn drains_queued_keepalive_replies() {
        let mut session = MockSession::new();
        session.queue_noop_reply();
        session.queue_noop_reply();
        let status = finish(
            &mut session,
            &TransferConfig::default(),
            stream(),
            true,
            true,
            "/a",
        )
        .await
        .unwrap();
        assert_eq!(status, TransferStatus::Success);
        assert_eq!(session.pending_noop_replies(), 0);
    }
}
