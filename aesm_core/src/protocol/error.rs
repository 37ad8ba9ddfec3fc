//! Envelope level errors.
use borsh::{BorshDeserialize, BorshSerialize};

/// An error handling an envelope, as opposed to executing a request.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ProtocolError {
	/// Payload is too big. See `MAX_ENCODED_MSG_LEN` for the upper bound on
	/// envelope size.
	OversizedPayload,
	/// The envelope could not be decoded.
	ProtocolMsgDeserialization,
	/// The message could not be encoded.
	ProtocolMsgSerialization,
	/// Memory for the envelope could not be reserved.
	OutOfMemory,
	/// The envelope decoded to a message the receiver does not accept, e.g. a
	/// response sent to the service.
	UnexpectedMsg,
}
