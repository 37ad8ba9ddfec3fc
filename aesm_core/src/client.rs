//! Streaming socket based client to connect with
//! [`crate::server::SocketServer`].

use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

use crate::io::{IOError, SocketAddress, Stream};

/// Client for the broker's socket.
///
/// The connection is opened on the first call and kept for the next ones, so
/// the service can tie sessions to it. Any failure drops the connection and the
/// next call connects again.
#[derive(Debug)]
pub struct SocketClient {
	stream: Mutex<Stream>,
}

impl SocketClient {
	/// Create a new client. Nothing is connected yet.
	#[must_use]
	pub fn new(addr: &SocketAddress) -> Self {
		Self { stream: Mutex::new(Stream::new(addr)) }
	}

	/// Send `request` and wait for the reply. `timeout` bounds the whole
	/// attempt: connect, send and receive. A zero timeout expires right away.
	pub async fn call(
		&self,
		request: &[u8],
		timeout: Duration,
	) -> Result<Vec<u8>, IOError> {
		if timeout.is_zero() {
			return Err(IOError::ConnectTimeout);
		}
		let deadline = Instant::now() + timeout;
		// calls sharing this client queue here, inside their own deadline
		let mut stream = tokio::time::timeout_at(deadline, self.stream.lock())
			.await
			.map_err(|_| IOError::ConnectTimeout)?;

		if !stream.is_connected() {
			let connected =
				tokio::time::timeout_at(deadline, stream.connect()).await;
			match connected {
				Ok(Ok(())) => {}
				Ok(Err(err)) => {
					stream.reset();
					return Err(err);
				}
				Err(_) => {
					stream.reset();
					return Err(IOError::ConnectTimeout);
				}
			}
		}

		let replied =
			tokio::time::timeout_at(deadline, stream.call(request)).await;
		let result = replied.unwrap_or(Err(IOError::RecvTimeout));
		// a late reply would be read as the answer to the next request
		if result.is_err() {
			stream.reset();
		}

		result
	}

	/// True if the client currently holds a connection.
	pub async fn is_connected(&self) -> bool {
		self.stream.lock().await.is_connected()
	}
}
