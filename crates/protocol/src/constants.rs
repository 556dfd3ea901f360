//! Engine-wide constants.

use std::time::Duration;

/// Time slice used to pace rate-limited transfers.
pub const RESOLUTION_WINDOW: Duration = Duration::from_millis(100);

/// Chunk size for unlimited transfers: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// How many times a single file is attempted when verification asks for retries.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Upper bound on the drain acknowledgment wait after the last chunk.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on waiting for the final transfer reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Reply code a server sends back for a no-op command.
pub const NOOP_REPLY_CODE: &str = "200";
