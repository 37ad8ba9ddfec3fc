//! Abstractions for low level I/O.
//!
//! NOTE TO MAINTAINERS: Interaction with any sys calls should be contained
//! within this module.

use std::path::{Path, PathBuf};

mod stream;

pub use stream::{Listener, PeerCredentials, Stream, MAX_PAYLOAD_SIZE};

/// Broker I/O error
#[derive(Debug)]
pub enum IOError {
	/// `std::io::Error` wrapper.
	StdIoError(std::io::Error),
	/// Arithmetic operation saturated.
	ArithmeticSaturation,
	/// Connect address invalid
	ConnectAddressInvalid,
	/// Timed out while connecting to the socket.
	ConnectTimeout,
	/// Timed out while sending or waiting for the reply.
	RecvTimeout,
	/// Receive was called on a closed connection.
	RecvConnectionClosed,
	/// The stream is not connected.
	DisconnectedStream,
	/// A frame announced a payload larger than the receiving stream accepts,
	/// never more than [`MAX_PAYLOAD_SIZE`].
	OversizedPayload(usize),
	/// Memory for a frame could not be reserved.
	OutOfMemory,
}

impl From<std::io::Error> for IOError {
	fn from(err: std::io::Error) -> Self {
		Self::StdIoError(err)
	}
}

/// Address of the broker's unix socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketAddress {
	path: PathBuf,
}

impl SocketAddress {
	/// Address of the socket file at `path`.
	pub fn new_unix(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// Address of the broker socket inside the directory `base`.
	pub fn from_base(base: impl AsRef<Path>) -> Self {
		Self::new_unix(base.as_ref().join(crate::SOCKET_NAME))
	}

	/// Path of the socket file.
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl Default for SocketAddress {
	fn default() -> Self {
		Self::from_base(crate::DEFAULT_SOCKET_BASE)
	}
}
