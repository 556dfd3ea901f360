//! Data connections for file transfers.
//!
//! The control channel negotiates a data connection and the transfer engine
//! moves bytes over it. This crate provides the stream abstraction the
//! engine consumes ([`DataStream`]), a TCP implementation for passive and
//! active mode ([`TcpDataStream`]), and an in-memory one ([`MemoryStream`])
//! used for loopback sessions and tests.

pub mod error;
pub mod memory;
pub mod stream;
pub mod tcp;

pub use error::DataChannelError;
pub use memory::{MemoryFault, MemoryFile, MemoryStream, SharedFile};
pub use stream::DataStream;
pub use tcp::TcpDataStream;

use std::time::Duration;

/// TCP read/write buffer size (256 KB).
pub const TCP_BUFFER_SIZE: usize = 256 * 1024;

/// Timeout for opening the data connection.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the server to connect back in active mode.
pub const TCP_ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);
