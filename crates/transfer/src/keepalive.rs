use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::TransferError;
use crate::session::FtpSession;

/// Sends keep-alives on the control channel while a transfer runs and
/// remembers whether any went out, so the final reply read can drain them.
#[derive(Debug)]
pub(crate) struct KeepAlive {
    interval: Option<Duration>,
    last: Instant,
    sent: bool,
}

impl KeepAlive {
    pub(crate) fn new(interval: Option<Duration>) -> Self {
        Self {
            interval,
            last: Instant::now(),
            sent: false,
        }
    }

    /// Sends a keep-alive when the interval has passed since the last one.
    pub(crate) async fn tick<S: FtpSession + ?Sized>(
        &mut self,
        session: &mut S,
    ) -> Result<(), TransferError> {
        let Some(interval) = self.interval else {
            return Ok(());
        };
        if self.last.elapsed() < interval {
            return Ok(());
        }
        self.last = Instant::now();
        if session.noop().await? {
            trace!("keep-alive sent");
            self.sent = true;
        }
        Ok(())
    }

    pub(crate) fn sent(&self) -> bool {
        self.sent
    }
}
