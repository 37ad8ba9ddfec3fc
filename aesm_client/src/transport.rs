//! One request, one response: the client's round trip and its retry loop.

use std::{future::Future, time::Duration};

use aesm_core::{
	client::SocketClient,
	io::IOError,
	protocol::{
		AesmMsg, BorshCodec, ProtocolError, Request, Response, WireCodec,
	},
	status::TransportStatus,
};
use zeroize::Zeroizing;

/// Default number of attempts made while the service answers busy.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default wait between two attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Moves one encoded envelope to the service and brings the reply back.
pub trait Transport: Send + Sync {
	/// Send `envelope` and wait at most `timeout` for the reply envelope.
	fn round_trip(
		&self,
		envelope: &[u8],
		timeout: Duration,
	) -> impl Future<Output = Result<Vec<u8>, TransportStatus>> + Send;
}

impl Transport for SocketClient {
	async fn round_trip(
		&self,
		envelope: &[u8],
		timeout: Duration,
	) -> Result<Vec<u8>, TransportStatus> {
		self.call(envelope, timeout).await.map_err(|err| {
			tracing::debug!(?err, "round trip failed");
			transport_status(&err)
		})
	}
}

fn transport_status(err: &IOError) -> TransportStatus {
	match err {
		IOError::ConnectTimeout | IOError::RecvTimeout => {
			TransportStatus::Timeout
		}
		IOError::ConnectAddressInvalid => TransportStatus::ServiceUnavailable,
		IOError::StdIoError(err) => match err.kind() {
			std::io::ErrorKind::NotFound
			| std::io::ErrorKind::ConnectionRefused
			| std::io::ErrorKind::PermissionDenied => {
				TransportStatus::ServiceUnavailable
			}
			_ => TransportStatus::Unexpected,
		},
		IOError::OutOfMemory => TransportStatus::OutOfMemory,
		_ => TransportStatus::Unexpected,
	}
}

/// How often, and how far apart, a call is repeated while the service is
/// busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total number of attempts, the first one included. Zero is treated as
	/// one.
	pub max_attempts: u32,
	/// Wait between two attempts.
	pub interval: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			interval: DEFAULT_RETRY_INTERVAL,
		}
	}
}

/// Convert a microsecond timeout to whole milliseconds, rounding down.
#[must_use]
pub const fn usec_to_msec(timeout_usec: u32) -> u32 {
	timeout_usec / 1000
}

/// Encodes requests, drives a [`Transport`] and decodes the responses.
#[derive(Debug)]
pub struct Transporter<T, C = BorshCodec> {
	transport: T,
	codec: C,
	retry: RetryPolicy,
}

impl<T: Transport> Transporter<T> {
	/// Create a new `Self` with the canonical codec.
	pub fn new(transport: T, retry: RetryPolicy) -> Self {
		Self::with_codec(transport, BorshCodec, retry)
	}
}

impl<T: Transport, C: WireCodec> Transporter<T, C> {
	/// Create a new `Self` with a custom codec. It must match the service's.
	pub fn with_codec(transport: T, codec: C, retry: RetryPolicy) -> Self {
		Self { transport, codec, retry }
	}

	/// The underlying transport.
	pub fn transport(&self) -> &T {
		&self.transport
	}

	/// Send `request` and return the service's response to it.
	///
	/// `timeout_usec` bounds every single attempt. Only a busy service is
	/// retried; any other failure is returned right away.
	pub async fn transact(
		&self,
		request: Request,
		timeout_usec: u32,
	) -> Result<Response, TransportStatus> {
		let capability = request.capability();
		let envelope = Zeroizing::new(
			self.codec.encode(&AesmMsg::Request(request)).map_err(|err| {
				tracing::warn!(?capability, ?err, "failed to encode request");
				match err {
					ProtocolError::OutOfMemory => TransportStatus::OutOfMemory,
					_ => TransportStatus::Unexpected,
				}
			})?,
		);
		let timeout =
			Duration::from_millis(u64::from(usec_to_msec(timeout_usec)));
		let max_attempts = self.retry.max_attempts.max(1);

		let mut attempts = 0;
		loop {
			attempts += 1;
			match self.attempt(&envelope, timeout).await {
				Ok(response) if response.capability() != capability => {
					tracing::warn!(
						?capability,
						answered = ?response.capability(),
						"response does not match the request"
					);
					return Err(TransportStatus::Unexpected);
				}
				Err(TransportStatus::Busy) if attempts < max_attempts => {
					tracing::debug!(
						?capability,
						attempts,
						"service busy, retrying"
					);
					tokio::time::sleep(self.retry.interval).await;
				}
				result => return result,
			}
		}
	}

	async fn attempt(
		&self,
		envelope: &[u8],
		timeout: Duration,
	) -> Result<Response, TransportStatus> {
		let reply =
			Zeroizing::new(self.transport.round_trip(envelope, timeout).await?);

		match self.codec.decode(&reply) {
			Ok(AesmMsg::Response(response)) => Ok(response),
			Ok(AesmMsg::Busy) => Err(TransportStatus::Busy),
			Ok(AesmMsg::ProtocolErrorResponse(err)) => {
				tracing::warn!(?err, "service rejected the envelope");
				Err(TransportStatus::Invalid)
			}
			Ok(AesmMsg::Request(_)) => Err(TransportStatus::Unexpected),
			Err(err) => {
				tracing::warn!(?err, "failed to decode reply");
				Err(TransportStatus::Unexpected)
			}
		}
	}
}
