//! Bandwidth pacing over a sliding resolution window.

use std::time::Duration;

use ftpflow_protocol::constants::RESOLUTION_WINDOW;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::TransferError;

/// Paces one transfer attempt to a byte rate. A fresh throttle is built per
/// attempt; the clock is never shared across files.
#[derive(Debug)]
pub struct Throttle {
    limit: u64,
    window_start: Instant,
    window_bytes: u64,
}

impl Throttle {
    /// `limit` in bytes per second, 0 for unlimited.
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            window_start: Instant::now(),
            window_bytes: 0,
        }
    }

    /// Chunk size for a rate: what the limit allows per resolution window,
    /// capped at `default` and never below one byte.
    pub fn chunk_size(limit: u64, default: usize) -> usize {
        if limit == 0 {
            return default;
        }
        let per_window = limit.saturating_mul(RESOLUTION_WINDOW.as_millis() as u64) / 1000;
        usize::try_from(per_window)
            .unwrap_or(usize::MAX)
            .min(default)
            .max(1)
    }

    /// Bytes counted since the window last reset.
    pub fn window_bytes(&self) -> u64 {
        self.window_bytes
    }

    /// Accounts for `bytes` just moved and sleeps if the attempt runs ahead
    /// of the limit. A transfer that fell behind by more than one window
    /// starts a fresh window instead of bursting to catch up.
    pub async fn pace(
        &mut self,
        bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        self.window_bytes += bytes;
        if self.limit == 0 {
            return Ok(());
        }

        let should_take = Duration::from_secs_f64(self.window_bytes as f64 / self.limit as f64);
        let elapsed = self.window_start.elapsed();
        if should_take > elapsed {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                _ = tokio::time::sleep(should_take - elapsed) => {}
            }
        } else if elapsed > should_take + RESOLUTION_WINDOW {
            self.window_start = Instant::now();
            self.window_bytes = 0;
        }
        Ok(())
    }
}
