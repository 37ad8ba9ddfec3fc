//! Broker message types.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{ProtocolError, Request, Response};

/// Everything that travels between a client and the service. One envelope
/// carries exactly one message.
#[derive(Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum AesmMsg {
	/// A request from a client.
	Request(Request),
	/// The service's answer to a [`Self::Request`].
	Response(Response),
	/// The service did not admit the request; the client may retry.
	Busy,
	/// The service could not handle the envelope at all.
	ProtocolErrorResponse(ProtocolError),
}
