use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Position of the current file within a multi-file call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchContext {
    /// Zero-based index of the file in the batch input.
    pub index: usize,
    pub count: usize,
}

/// One progress notification. Emitted at chunk boundaries, on skip and on
/// completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// 0.0 to 100.0.
    pub percent: f64,
    /// Bytes of the file present at the destination, including any resumed prefix.
    pub transferred_bytes: u64,
    /// Bytes counted in the current rate-limit window.
    pub window_bytes: u64,
    pub elapsed: Duration,
    /// Bytes per second moved by this attempt.
    pub transfer_speed: f64,
    pub eta: Option<Duration>,
    pub local_path: String,
    pub remote_path: String,
    pub batch: Option<BatchContext>,
}

/// Callback invoked with progress snapshots. Fire-and-forget.
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Builds snapshots for one transfer attempt and forwards them to an
/// optional callback.
pub(crate) struct ProgressReporter<'a> {
    callback: Option<&'a ProgressCallback>,
    local_path: &'a str,
    remote_path: &'a str,
    batch: Option<BatchContext>,
    started: Instant,
    /// Offset the attempt started at; bytes before it do not count toward speed.
    base: u64,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(
        callback: Option<&'a ProgressCallback>,
        local_path: &'a str,
        remote_path: &'a str,
        batch: Option<BatchContext>,
    ) -> Self {
        Self {
            callback,
            local_path,
            remote_path,
            batch,
            started: Instant::now(),
            base: 0,
        }
    }

    /// Restarts the speed clock at `offset`.
    pub(crate) fn start_at(&mut self, offset: u64) {
        self.started = Instant::now();
        self.base = offset;
    }

    /// Reports `position` of `length` bytes. An unknown length reports 0 %.
    pub(crate) fn report(&self, position: u64, length: Option<u64>, window_bytes: u64) {
        let Some(callback) = self.callback else {
            return;
        };
        let elapsed = self.started.elapsed();
        let moved = position.saturating_sub(self.base);
        let transfer_speed = if elapsed.is_zero() {
            0.0
        } else {
            moved as f64 / elapsed.as_secs_f64()
        };
        let (percent, eta) = match length {
            Some(0) => (100.0, Some(Duration::ZERO)),
            Some(length) => {
                let remaining = length.saturating_sub(position);
                let eta = (transfer_speed > 0.0)
                    .then(|| Duration::try_from_secs_f64(remaining as f64 / transfer_speed).ok())
                    .flatten();
                (position as f64 * 100.0 / length as f64, eta)
            }
            None => (0.0, None),
        };
        callback(ProgressSnapshot {
            percent,
            transferred_bytes: position,
            window_bytes,
            elapsed,
            transfer_speed,
            eta,
            local_path: self.local_path.to_string(),
            remote_path: self.remote_path.to_string(),
            batch: self.batch,
        });
    }

    /// Reports a finished (or skipped) file at 100 %.
    pub(crate) fn complete(&self, length: u64) {
        self.report(length, Some(length), 0);
    }
}
