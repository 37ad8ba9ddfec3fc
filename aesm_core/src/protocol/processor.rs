//! Service side dispatcher.
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use super::{
	AesmLogic, AesmMsg, BorshCodec, CapabilityClass, ProtocolError,
	RequestLimits, Response, SessionTable, WireCodec,
};
use crate::{
	server::{ConnectionId, RequestProcessor, ServiceConfig},
	status::{AesmResult, ServiceStatus},
};

/// Decodes envelopes, gates and executes the requests inside them and encodes
/// the responses.
///
/// At most `max_in_flight` envelopes are handled at once; any more are
/// answered with [`AesmMsg::Busy`] straight away. Execution is serialized per
/// [`CapabilityClass`] and runs on blocking threads.
pub struct Processor<L, C = BorshCodec> {
	logic: Arc<L>,
	sessions: Arc<SessionTable>,
	admission: Semaphore,
	class_locks: [Mutex<()>; 3],
	limits: RequestLimits,
	codec: C,
}

impl<L: AesmLogic + 'static> Processor<L> {
	/// Create a new `Self` with the canonical codec.
	#[must_use]
	pub fn new(logic: Arc<L>, config: &ServiceConfig) -> Self {
		Self::with_codec(logic, config, BorshCodec)
	}
}

impl<L: AesmLogic + 'static, C: WireCodec> Processor<L, C> {
	/// Create a new `Self` with a custom codec.
	#[must_use]
	pub fn with_codec(logic: Arc<L>, config: &ServiceConfig, codec: C) -> Self {
		Self {
			logic,
			sessions: Arc::new(SessionTable::new(config.max_sessions)),
			admission: Semaphore::new(config.max_in_flight),
			class_locks: [Mutex::new(()), Mutex::new(()), Mutex::new(())],
			limits: config.limits,
			codec,
		}
	}

	/// Open sessions of this service.
	#[must_use]
	pub fn sessions(&self) -> &SessionTable {
		&self.sessions
	}

	fn error(&self, err: ProtocolError) -> Vec<u8> {
		tracing::warn!(?err, "protocol error");
		self.codec
			.encode(&AesmMsg::ProtocolErrorResponse(err))
			.unwrap_or_default()
	}
}

impl<L: AesmLogic + 'static, C: WireCodec + 'static> RequestProcessor
	for Processor<L, C>
{
	async fn process(
		&self,
		connection: ConnectionId,
		envelope: &[u8],
	) -> Vec<u8> {
		let Ok(_permit) = self.admission.try_acquire() else {
			tracing::debug!(?connection, "not admitted, answering busy");
			return self.codec.encode(&AesmMsg::Busy).unwrap_or_default();
		};

		let request = match self.codec.decode(envelope) {
			Ok(AesmMsg::Request(request)) => request,
			Ok(_) => return self.error(ProtocolError::UnexpectedMsg),
			Err(err) => return self.error(err),
		};

		let request = request.limited(&self.limits);
		let capability = request.capability();
		let response = if request.check() {
			let _class = self.class_locks[request.class().index()].lock().await;
			let logic = Arc::clone(&self.logic);
			let sessions = Arc::clone(&self.sessions);
			let executed = tokio::task::spawn_blocking(move || {
				request.execute(&*logic, &sessions, connection)
			})
			.await;

			match executed {
				Ok(response) => response,
				Err(err) => {
					tracing::error!(
						?connection,
						?capability,
						?err,
						"execution failed"
					);
					Response::failure(
						capability,
						ServiceStatus::failure(AesmResult::UNEXPECTED_ERROR),
					)
				}
			}
		} else {
			tracing::warn!(
				?connection,
				?capability,
				"rejected invalid request"
			);
			Response::failure(
				capability,
				ServiceStatus::failure(AesmResult::PARAMETER_ERROR),
			)
		};

		tracing::debug!(
			?connection,
			?capability,
			result = %response.status().result,
			"request handled"
		);
		match self.codec.encode(&AesmMsg::Response(response)) {
			Ok(envelope) => envelope,
			Err(err) => self.error(err),
		}
	}

	async fn connection_closed(&self, connection: ConnectionId) {
		let _class = self.class_locks[CapabilityClass::PlatformService.index()]
			.lock()
			.await;
		let logic = Arc::clone(&self.logic);
		let sessions = Arc::clone(&self.sessions);
		let reclaimed = tokio::task::spawn_blocking(move || {
			for material in sessions.reclaim(connection) {
				if let Err(status) = logic.close_session(material.as_slice()) {
					tracing::warn!(
						?connection,
						result = %status.result,
						"failed to tear down reclaimed session"
					);
				}
			}
		})
		.await;

		if let Err(err) = reclaimed {
			tracing::error!(?connection, ?err, "session reclaim failed");
		}
	}

	fn max_request_len(&self) -> usize {
		self.limits.max_envelope_len()
	}

	fn oversized_request(
		&self,
		connection: ConnectionId,
		len: usize,
	) -> Option<Vec<u8>> {
		tracing::warn!(?connection, len, "request exceeds the ceiling");
		Some(self.error(ProtocolError::OversizedPayload))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		mock::MockLogic,
		protocol::{
			CreateSessionRequest, GetQuoteRequest, InitQuoteRequest, Request,
		},
	};

	fn config(max_in_flight: usize) -> ServiceConfig {
		ServiceConfig {
			limits: RequestLimits::new(2048),
			max_in_flight,
			max_sessions: 4,
			..Default::default()
		}
	}

	fn envelope(request: Request) -> Vec<u8> {
		BorshCodec.encode(&AesmMsg::Request(request)).unwrap()
	}

	fn reply(bytes: &[u8]) -> AesmMsg {
		BorshCodec.decode(bytes).unwrap()
	}

	#[tokio::test]
	async fn executes_valid_request() {
		let logic = Arc::new(MockLogic::default());
		let processor = Processor::new(Arc::clone(&logic), &config(4));

		let init = envelope(Request::InitQuote(InitQuoteRequest::new(0)));
		let bytes = processor.process(ConnectionId(0), &init).await;
		let AesmMsg::Response(Response::InitQuote(response)) = reply(&bytes)
		else {
			panic!("unexpected reply")
		};
		assert!(response.status().is_success());
		assert_eq!(response.target_info_len(), 512);
		assert_eq!(logic.calls(), 1);
	}

	#[tokio::test]
	async fn service_ceiling_applies_to_decoded_requests() {
		let logic = Arc::new(MockLogic::default());
		let processor = Processor::new(Arc::clone(&logic), &config(4));

		// built under a looser ceiling than the service's
		let loose = RequestLimits::new(1 << 20);
		let request = GetQuoteRequest::new(
			&loose, &[1; 4096], 0, &[2; 16], &[], &[], 64, false, 0,
		)
		.unwrap();
		assert!(request.check());

		let bytes = processor
			.process(ConnectionId(0), &envelope(Request::GetQuote(request)))
			.await;
		let AesmMsg::Response(response) = reply(&bytes) else {
			panic!("unexpected reply")
		};
		assert_eq!(
			response.status(),
			ServiceStatus::failure(AesmResult::PARAMETER_ERROR)
		);
		assert_eq!(logic.calls(), 0);
	}

	#[tokio::test]
	async fn answers_busy_when_saturated() {
		let logic = Arc::new(MockLogic::default());
		let processor = Processor::new(Arc::clone(&logic), &config(0));

		let init = envelope(Request::InitQuote(InitQuoteRequest::new(0)));
		let bytes = processor.process(ConnectionId(0), &init).await;
		assert_eq!(reply(&bytes), AesmMsg::Busy);
		assert_eq!(logic.calls(), 0);
	}

	#[test]
	fn frames_are_limited_by_the_service_ceiling() {
		let processor =
			Processor::new(Arc::new(MockLogic::default()), &config(4));
		assert_eq!(
			processor.max_request_len(),
			RequestLimits::new(2048).max_envelope_len()
		);

		let reply_bytes = processor
			.oversized_request(ConnectionId(0), 64 << 20)
			.expect("oversized requests are answered");
		assert_eq!(
			reply(&reply_bytes),
			AesmMsg::ProtocolErrorResponse(ProtocolError::OversizedPayload)
		);
	}

	#[tokio::test]
	async fn garbage_gets_protocol_error() {
		let processor =
			Processor::new(Arc::new(MockLogic::default()), &config(4));

		let bytes = processor.process(ConnectionId(0), &[0xde, 0xad]).await;
		assert_eq!(
			reply(&bytes),
			AesmMsg::ProtocolErrorResponse(
				ProtocolError::ProtocolMsgDeserialization
			)
		);

		let busy = BorshCodec.encode(&AesmMsg::Busy).unwrap();
		let bytes = processor.process(ConnectionId(0), &busy).await;
		assert_eq!(
			reply(&bytes),
			AesmMsg::ProtocolErrorResponse(ProtocolError::UnexpectedMsg)
		);
	}

	#[tokio::test]
	async fn dropped_connection_releases_its_sessions() {
		let logic = Arc::new(MockLogic::default());
		let processor = Processor::new(Arc::clone(&logic), &config(4));
		let limits = RequestLimits::new(2048);

		for connection in [ConnectionId(1), ConnectionId(1), ConnectionId(2)] {
			let request = Request::CreateSession(CreateSessionRequest::new(
				&limits, 16, 0,
			));
			let bytes = processor.process(connection, &envelope(request)).await;
			let AesmMsg::Response(response) = reply(&bytes) else {
				panic!("unexpected reply")
			};
			assert!(response.status().is_success());
		}
		assert_eq!(processor.sessions().len(), 3);

		processor.connection_closed(ConnectionId(1)).await;
		assert_eq!(processor.sessions().len(), 1);
		assert_eq!(logic.closed_sessions(), 2);
	}
}
