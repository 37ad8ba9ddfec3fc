//! Envelope encoding.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{AesmMsg, ProtocolError};

/// Upper bound on the size of one encoded envelope. Anything larger is
/// refused before it is allocated or sent.
pub const MAX_ENCODED_MSG_LEN: usize = crate::io::MAX_PAYLOAD_SIZE;

/// Turns messages into envelopes and back.
///
/// Any serialization technology can sit behind this trait as long as
/// `decode(encode(msg)) == msg` holds for every message the codec accepts.
pub trait WireCodec: Send + Sync {
	/// Encode `msg` into one envelope.
	fn encode(&self, msg: &AesmMsg) -> Result<Vec<u8>, ProtocolError>;

	/// Decode one envelope.
	fn decode(&self, envelope: &[u8]) -> Result<AesmMsg, ProtocolError>;
}

/// Canonical codec, backed by borsh.
#[derive(Debug, Clone, Copy, Default)]
pub struct BorshCodec;

impl WireCodec for BorshCodec {
	fn encode(&self, msg: &AesmMsg) -> Result<Vec<u8>, ProtocolError> {
		let len = borsh::object_length(msg)
			.map_err(|_| ProtocolError::ProtocolMsgSerialization)?;
		if len > MAX_ENCODED_MSG_LEN {
			return Err(ProtocolError::OversizedPayload);
		}

		let mut envelope = Vec::new();
		envelope
			.try_reserve_exact(len)
			.map_err(|_| ProtocolError::OutOfMemory)?;
		msg.serialize(&mut envelope)
			.map_err(|_| ProtocolError::ProtocolMsgSerialization)?;

		Ok(envelope)
	}

	fn decode(&self, envelope: &[u8]) -> Result<AesmMsg, ProtocolError> {
		if envelope.len() > MAX_ENCODED_MSG_LEN {
			return Err(ProtocolError::OversizedPayload);
		}

		AesmMsg::try_from_slice(envelope)
			.map_err(|_| ProtocolError::ProtocolMsgDeserialization)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		buffer::Buffer,
		protocol::{
			CloseSessionRequest, CreateSessionRequest, CreateSessionResponse,
			ExchangeReportRequest, GetExtendedGroupIdRequest,
			GetLaunchTokenRequest, GetPsCapRequest, GetQuoteRequest,
			GetQuoteResponse, GetWhiteListRequest, GetWhiteListSizeRequest,
			GetWhiteListSizeResponse, InitQuoteRequest, InitQuoteResponse,
			InvokeServiceRequest, InvokeServiceResponse,
			ReportAttestationStatusRequest, ReportAttestationStatusResponse,
			Request, RequestLimits, Response, SwitchExtendedGroupRequest,
		},
		status::{AesmResult, ServiceStatus},
	};

	#[test]
	fn get_quote_request_survives_the_wire() {
		let limits = RequestLimits::default();
		let request = GetQuoteRequest::new(
			&limits,
			&[7; 64],
			1,
			&[3; 16],
			&[],
			&[9; 40],
			1116,
			true,
			5000,
		)
		.unwrap();
		let msg = AesmMsg::Request(Request::GetQuote(request.clone()));

		let envelope = BorshCodec.encode(&msg).unwrap();
		let AesmMsg::Request(Request::GetQuote(decoded)) =
			BorshCodec.decode(&envelope).unwrap()
		else {
			panic!("wrong variant")
		};

		// validity is recomputed by the receiver, never trusted from the wire
		assert!(!decoded.check());
		let decoded = decoded.limited(&limits);
		assert!(decoded.check());
		assert_eq!(decoded, request);
	}

	fn every_request(limits: &RequestLimits) -> Vec<Request> {
		vec![
			Request::InitQuote(InitQuoteRequest::new(10)),
			Request::GetQuote(
				GetQuoteRequest::new(
					limits, &[7; 64], 1, &[3; 16], &[4; 16], &[9; 40], 1116,
					true, 20,
				)
				.unwrap(),
			),
			Request::GetLaunchToken(
				GetLaunchTokenRequest::new(
					limits, &[1; 32], &[2; 32], &[3; 16], 30,
				)
				.unwrap(),
			),
			Request::CreateSession(CreateSessionRequest::new(limits, 64, 40)),
			Request::ExchangeReport(
				ExchangeReportRequest::new(limits, 77, &[5; 128], 64, 50)
					.unwrap(),
			),
			Request::InvokeService(
				InvokeServiceRequest::new(limits, &[77, 0, 0, 0, 1, 2], 256, 60)
					.unwrap(),
			),
			Request::CloseSession(CloseSessionRequest::new(77, 70)),
			Request::GetPsCap(GetPsCapRequest::new(80)),
			Request::ReportAttestationStatus(
				ReportAttestationStatusRequest::new(
					limits, &[6; 105], 1, 64, 90,
				)
				.unwrap(),
			),
			Request::GetWhiteListSize(GetWhiteListSizeRequest::new(100)),
			Request::GetWhiteList(GetWhiteListRequest::new(limits, 64, 110)),
			Request::GetExtendedGroupId(GetExtendedGroupIdRequest::new(120)),
			Request::SwitchExtendedGroup(SwitchExtendedGroupRequest::new(
				2, 130,
			)),
		]
	}

	#[test]
	fn every_request_survives_the_wire() {
		let limits = RequestLimits::default();
		let requests = every_request(&limits);
		assert_eq!(requests.len(), 13);

		for request in requests {
			assert!(request.check(), "{:?}", request.capability());
			let envelope =
				BorshCodec.encode(&AesmMsg::Request(request.clone())).unwrap();
			let AesmMsg::Request(decoded) =
				BorshCodec.decode(&envelope).unwrap()
			else {
				panic!("wrong message")
			};

			let decoded = decoded.limited(&limits);
			assert!(decoded.check());
			assert_eq!(decoded, request);
		}
	}

	#[test]
	fn success_responses_survive_the_wire() {
		fn buffer(byte: u8, len: usize) -> Option<Buffer> {
			Some(Buffer::copy_from_slice(&vec![byte; len]).unwrap())
		}
		let ok = ServiceStatus::SUCCESS;

		let responses = [
			Response::InitQuote(InitQuoteResponse {
				status: ok,
				target_info: buffer(0x11, 512),
				gid: buffer(0x01, 4),
			}),
			Response::GetQuote(GetQuoteResponse {
				status: ok,
				quote: buffer(0xa5, 1116),
				qe_report: buffer(0x5a, 432),
			}),
			Response::CreateSession(CreateSessionResponse {
				status: ok,
				session_id: Some(77),
				dh_msg1: buffer(0x01, 64),
			}),
			Response::InvokeService(InvokeServiceResponse {
				status: ok,
				pse_message: buffer(0x0f, 32),
			}),
			Response::GetWhiteListSize(GetWhiteListSizeResponse {
				status: ok,
				white_list_size: Some(64),
			}),
			Response::ReportAttestationStatus(
				ReportAttestationStatusResponse {
					status: ok,
					update_info: buffer(0x55, 12),
				},
			),
		];

		for response in responses {
			let msg = AesmMsg::Response(response);
			let envelope = BorshCodec.encode(&msg).unwrap();
			assert_eq!(BorshCodec.decode(&envelope).unwrap(), msg);
		}
	}

	#[test]
	fn failure_response_survives_the_wire() {
		let msg = AesmMsg::Response(crate::protocol::Response::failure(
			crate::protocol::Capability::CloseSession,
			ServiceStatus::failure(AesmResult::SESSION_INVALID),
		));
		let envelope = BorshCodec.encode(&msg).unwrap();
		assert_eq!(BorshCodec.decode(&envelope).unwrap(), msg);
	}

	#[test]
	fn garbage_is_rejected() {
		assert_eq!(
			BorshCodec.decode(&[0xff, 0xff, 0xff]),
			Err(ProtocolError::ProtocolMsgDeserialization)
		);
		assert_eq!(
			BorshCodec.decode(&[]),
			Err(ProtocolError::ProtocolMsgDeserialization)
		);
	}

	#[test]
	fn oversized_envelope_is_refused() {
		let big = vec![0u8; MAX_ENCODED_MSG_LEN + 1];
		assert_eq!(
			BorshCodec.decode(&big),
			Err(ProtocolError::OversizedPayload)
		);
	}
}
