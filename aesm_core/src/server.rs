//! Streaming socket based server for the broker. Listens for connections from
//! [`crate::client::SocketClient`].

use std::{path::PathBuf, sync::Arc, time::Duration};

use tokio::task::JoinHandle;

use crate::{
	io::{IOError, Listener, SocketAddress, Stream, MAX_PAYLOAD_SIZE},
	protocol::RequestLimits,
};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Error variants for [`SocketServer`]
#[derive(Debug)]
pub enum SocketServerError {
	/// `io::IOError` wrapper.
	IOError(IOError),
}

impl From<IOError> for SocketServerError {
	fn from(err: IOError) -> Self {
		Self::IOError(err)
	}
}

/// Identifies one accepted connection for the lifetime of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Service side configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
	/// Directory the socket is created in.
	pub socket_base: PathBuf,
	/// Limits applied to every decoded request.
	pub limits: RequestLimits,
	/// Requests executed concurrently before new ones are answered busy.
	pub max_in_flight: usize,
	/// Maximum number of open platform service sessions.
	pub max_sessions: usize,
}

impl Default for ServiceConfig {
	fn default() -> Self {
		Self {
			socket_base: PathBuf::from(crate::DEFAULT_SOCKET_BASE),
			limits: RequestLimits::default(),
			max_in_flight: crate::DEFAULT_MAX_IN_FLIGHT,
			max_sessions: crate::DEFAULT_MAX_SESSIONS,
		}
	}
}

impl ServiceConfig {
	/// Address of the service socket.
	#[must_use]
	pub fn address(&self) -> SocketAddress {
		SocketAddress::from_base(&self.socket_base)
	}
}

/// Something that can process requests.
pub trait RequestProcessor: Send + Sync + 'static {
	/// Process an incoming request and return a response.
	///
	/// The request and response are raw bytes. Logic inside of this function
	/// takes care of decoding the request and encoding a response.
	fn process(
		&self,
		connection: ConnectionId,
		request: &[u8],
	) -> impl std::future::Future<Output = Vec<u8>> + Send;

	/// Called once after `connection` is gone.
	fn connection_closed(
		&self,
		connection: ConnectionId,
	) -> impl std::future::Future<Output = ()> + Send;

	/// Largest request frame the server reads on behalf of this processor.
	fn max_request_len(&self) -> usize {
		MAX_PAYLOAD_SIZE
	}

	/// Reply to a frame that announced `len` bytes, more than
	/// [`Self::max_request_len`]. Its payload is skipped without being
	/// buffered. `None` drops the connection instead.
	fn oversized_request(
		&self,
		_connection: ConnectionId,
		_len: usize,
	) -> Option<Vec<u8>> {
		None
	}
}

/// A bare bones, socket based server. Dropping it stops accepting and aborts
/// every connection task.
#[derive(Debug)]
pub struct SocketServer {
	accept: JoinHandle<()>,
	address: SocketAddress,
}

impl SocketServer {
	/// Listen on `addr` and answer requests with `processor`.
	///
	/// Must be called from within a tokio runtime.
	pub fn listen<P: RequestProcessor>(
		addr: SocketAddress,
		processor: Arc<P>,
	) -> Result<Self, SocketServerError> {
		let max_request_len = processor.max_request_len();
		let listener =
			Listener::listen(&addr)?.with_max_payload(max_request_len);
		tracing::info!(
			path = ?addr.path(),
			max_request_len,
			"`SocketServer` listening"
		);

		let accept = tokio::spawn(accept_loop(listener, processor));

		Ok(Self { accept, address: addr })
	}

	/// Address the server listens on.
	#[must_use]
	pub fn address(&self) -> &SocketAddress {
		&self.address
	}
}

impl Drop for SocketServer {
	fn drop(&mut self) {
		self.accept.abort();
	}
}

async fn accept_loop<P: RequestProcessor>(
	listener: Listener,
	processor: Arc<P>,
) {
	let mut next_id = 0u64;
	let mut connections = tokio::task::JoinSet::new();

	loop {
		let stream = match listener.accept().await {
			Ok(stream) => stream,
			Err(err) => {
				tracing::error!(?err, "accept failed");
				tokio::time::sleep(ACCEPT_BACKOFF).await;
				continue;
			}
		};

		let id = ConnectionId(next_id);
		next_id = next_id.wrapping_add(1);
		match stream.peer_credentials() {
			Ok(cred) => tracing::debug!(
				?id,
				pid = cred.pid,
				uid = cred.uid,
				gid = cred.gid,
				"accepted connection"
			),
			Err(err) => tracing::warn!(?id, ?err, "no peer credentials"),
		}

		// reap finished connections so the set does not grow
		while connections.try_join_next().is_some() {}
		connections.spawn(serve(stream, id, Arc::clone(&processor)));
	}
}

async fn serve<P: RequestProcessor>(
	mut stream: Stream,
	id: ConnectionId,
	processor: Arc<P>,
) {
	loop {
		let response = match stream.recv().await {
			Ok(payload) => processor.process(id, &payload).await,
			Err(IOError::OversizedPayload(len)) => {
				tracing::warn!(?id, len, "refusing oversized request");
				let Some(reply) = processor.oversized_request(id, len) else {
					break;
				};
				if let Err(err) = stream.discard(len).await {
					tracing::warn!(?id, ?err, "dropping connection");
					break;
				}
				reply
			}
			Err(IOError::RecvConnectionClosed) => break,
			Err(err) => {
				tracing::warn!(?id, ?err, "dropping connection");
				break;
			}
		};

		if let Err(err) = stream.send(&response).await {
			tracing::warn!(?id, ?err, "failed to send response");
			break;
		}
	}

	tracing::debug!(?id, "connection closed");
	processor.connection_closed(id).await;
}
