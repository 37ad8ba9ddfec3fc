//! Abstractions to handle connection based socket streams.
//!
//! Every payload is framed with its length as a little endian `u64`.

use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::{UnixListener, UnixStream},
};

use super::{IOError, SocketAddress};

const MEGABYTE: usize = 1024 * 1024;
/// Largest payload a frame may carry.
pub const MAX_PAYLOAD_SIZE: usize = 128 * MEGABYTE;

/// Credentials of the process on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
	/// Process id, if the platform reports one.
	pub pid: Option<i32>,
	/// User id.
	pub uid: u32,
	/// Group id.
	pub gid: u32,
}

/// Handle on a stream
#[derive(Debug)]
pub struct Stream {
	address: Option<SocketAddress>,
	inner: Option<UnixStream>,
	max_payload: usize,
}

impl Stream {
	// accept a new connection, used by server side
	fn accepted(stream: UnixStream, max_payload: usize) -> Self {
		Self { address: None, inner: Some(stream), max_payload }
	}

	/// Create a new `Stream` for `address`. The stream starts disconnected
	/// and connects on the first `call`.
	#[must_use]
	pub fn new(address: &SocketAddress) -> Self {
		Self {
			address: Some(address.clone()),
			inner: None,
			max_payload: MAX_PAYLOAD_SIZE,
		}
	}

	/// Connect to the stream's address.
	pub async fn connect(&mut self) -> Result<(), IOError> {
		let path = self.address()?.path().to_path_buf();
		tracing::trace!(?path, "connecting");
		let inner = UnixStream::connect(&path).await?;
		self.inner = Some(inner);

		Ok(())
	}

	/// True if the stream holds a connection.
	#[must_use]
	pub fn is_connected(&self) -> bool {
		self.inner.is_some()
	}

	/// Drop the connection, if any. The next `call` connects again.
	pub fn reset(&mut self) {
		self.inner = None;
	}

	/// Send one frame.
	pub async fn send(&mut self, buf: &[u8]) -> Result<(), IOError> {
		send(self.inner_mut()?, buf).await
	}

	/// Receive one frame.
	///
	/// A frame announcing more than the stream's payload limit fails with
	/// [`IOError::OversizedPayload`] before its payload is read. The payload
	/// is still pending on the stream; see [`Self::discard`].
	pub async fn recv(&mut self) -> Result<Vec<u8>, IOError> {
		let max_payload = self.max_payload;
		recv(self.inner_mut()?, max_payload).await
	}

	/// Read and drop `len` payload bytes of a refused frame without buffering
	/// them.
	pub async fn discard(&mut self, len: usize) -> Result<(), IOError> {
		discard(self.inner_mut()?, len).await
	}

	/// Perform a "call" by sending the `req_buf` bytes and waiting for reply
	/// on the same socket.
	pub async fn call(&mut self, req_buf: &[u8]) -> Result<Vec<u8>, IOError> {
		// first time? connect
		if self.inner.is_none() {
			self.connect().await?;
		}
		self.send(req_buf).await?;
		self.recv().await
	}

	/// Credentials of the connected peer.
	pub fn peer_credentials(&self) -> Result<PeerCredentials, IOError> {
		let inner = self.inner.as_ref().ok_or(IOError::DisconnectedStream)?;
		let cred = inner.peer_cred()?;

		Ok(PeerCredentials {
			pid: cred.pid(),
			uid: cred.uid(),
			gid: cred.gid(),
		})
	}

	fn address(&self) -> Result<&SocketAddress, IOError> {
		self.address.as_ref().ok_or(IOError::ConnectAddressInvalid)
	}

	fn inner_mut(&mut self) -> Result<&mut UnixStream, IOError> {
		self.inner.as_mut().ok_or(IOError::DisconnectedStream)
	}
}

async fn send<S: AsyncWriteExt + Unpin>(
	stream: &mut S,
	buf: &[u8],
) -> Result<(), IOError> {
	if buf.len() > MAX_PAYLOAD_SIZE {
		return Err(IOError::OversizedPayload(buf.len()));
	}
	let len =
		u64::try_from(buf.len()).map_err(|_| IOError::ArithmeticSaturation)?;
	// First, send the length of the buffer
	stream.write_all(&len.to_le_bytes()).await?;
	// Send the actual contents of the buffer
	stream.write_all(buf).await?;
	stream.flush().await?;

	Ok(())
}

async fn recv<S: AsyncReadExt + Unpin>(
	stream: &mut S,
	max_payload: usize,
) -> Result<Vec<u8>, IOError> {
	let length: usize = {
		let mut buf = [0u8; std::mem::size_of::<u64>()];
		stream.read_exact(&mut buf).await.map_err(closed_on_eof)?;
		u64::from_le_bytes(buf)
			.try_into()
			// Should only be possible if we are on 32bit architecture
			.map_err(|_| IOError::ArithmeticSaturation)?
	};
	if length > max_payload.min(MAX_PAYLOAD_SIZE) {
		return Err(IOError::OversizedPayload(length));
	}

	let mut buf = Vec::new();
	buf.try_reserve_exact(length).map_err(|_| IOError::OutOfMemory)?;
	buf.resize(length, 0);
	stream.read_exact(&mut buf).await.map_err(closed_on_eof)?;

	Ok(buf)
}

async fn discard<S: AsyncReadExt + Unpin>(
	stream: &mut S,
	len: usize,
) -> Result<(), IOError> {
	if len > MAX_PAYLOAD_SIZE {
		return Err(IOError::OversizedPayload(len));
	}
	let expected =
		u64::try_from(len).map_err(|_| IOError::ArithmeticSaturation)?;

	let mut payload = stream.take(expected);
	let read = tokio::io::copy(&mut payload, &mut tokio::io::sink()).await?;
	if read < expected {
		return Err(IOError::RecvConnectionClosed);
	}

	Ok(())
}

fn closed_on_eof(err: std::io::Error) -> IOError {
	if err.kind() == std::io::ErrorKind::UnexpectedEof {
		IOError::RecvConnectionClosed
	} else {
		IOError::StdIoError(err)
	}
}

/// Abstraction to listen for incoming stream connections.
#[derive(Debug)]
pub struct Listener {
	inner: UnixListener,
	addr: SocketAddress,
	max_payload: usize,
}

impl Listener {
	/// Bind and listen on the given address. A stale socket file left behind
	/// by a previous run is removed first.
	pub fn listen(addr: &SocketAddress) -> Result<Self, IOError> {
		let path = addr.path();
		if path.exists() {
			std::fs::remove_file(path)?;
		}
		let inner = UnixListener::bind(path)?;

		Ok(Self { inner, addr: addr.clone(), max_payload: MAX_PAYLOAD_SIZE })
	}

	/// Limit the payload of frames received on accepted streams to
	/// `max_payload` bytes, never more than [`MAX_PAYLOAD_SIZE`].
	#[must_use]
	pub fn with_max_payload(mut self, max_payload: usize) -> Self {
		self.max_payload = max_payload.min(MAX_PAYLOAD_SIZE);
		self
	}

	/// Accept a new connection.
	pub async fn accept(&self) -> Result<Stream, IOError> {
		let (stream, _) = self.inner.accept().await?;
		Ok(Stream::accepted(stream, self.max_payload))
	}
}

impl Drop for Listener {
	fn drop(&mut self) {
		// do not crash in Drop
		let _ = std::fs::remove_file(self.addr.path());
	}
}
