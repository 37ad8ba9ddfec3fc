//! Core components of the AESM broker bridge. This contains the
//! request/response model shared by the service and its clients, the wire
//! codec, the socket plumbing and the service side dispatcher.
//!
//! # Maintainers Notes
//!
//! Everything that crosses the socket comes from an untrusted local process.
//! Sizes are bounded before anything is allocated on behalf of a caller, and
//! every buffer that may carry secret material zeroes itself on drop.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod buffer;
#[cfg(feature = "cli")]
pub mod cli;
pub mod client;
pub mod io;
#[cfg(any(feature = "mock", test))]
pub mod mock;
pub mod protocol;
pub mod server;
pub mod status;

/// Default directory the service socket is created in.
pub const DEFAULT_SOCKET_BASE: &str = "/var/run/aesmd";

/// File name of the service socket inside the socket base directory.
pub const SOCKET_NAME: &str = "aesm.socket";

/// Default ceiling, in bytes, for any single request buffer and for the sum
/// of all buffers of one request.
pub const DEFAULT_CEILING: u32 = 256 * 1024;

/// Default maximum number of requests the service executes concurrently.
/// Requests beyond this are answered with a busy envelope.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Default maximum number of open platform service sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 64;
