//! Request/response model of the broker and the service side dispatcher.
//!
//! Every privileged operation is a [`Capability`]. A caller builds a
//! [`Request`] for it, the [`codec`] turns that into one envelope, and the
//! [`Processor`] on the service side decodes it, gates it, executes it against
//! an [`AesmLogic`] and answers with the matching [`Response`].

use borsh::{BorshDeserialize, BorshSerialize};

mod codec;
mod error;
mod logic;
mod msg;
mod processor;
mod request;
mod response;
mod session;

pub use codec::{BorshCodec, WireCodec, MAX_ENCODED_MSG_LEN};
pub use error::ProtocolError;
pub use logic::{
	AesmLogic, CreatedSession, ExchangedReport, InitQuoteOutput, LogicResult,
	QuoteInput, QuoteOutput,
};
pub use msg::AesmMsg;
pub use processor::Processor;
pub use request::{
	CloseSessionRequest, CreateSessionRequest, ExchangeReportRequest,
	GetExtendedGroupIdRequest, GetLaunchTokenRequest, GetPsCapRequest,
	GetQuoteRequest, GetWhiteListRequest, GetWhiteListSizeRequest,
	InitQuoteRequest, InvokeServiceRequest, ReportAttestationStatusRequest,
	Request, SwitchExtendedGroupRequest,
};
pub use response::{
	CloseSessionResponse, CreateSessionResponse, ExchangeReportResponse,
	GetExtendedGroupIdResponse, GetLaunchTokenResponse, GetPsCapResponse,
	GetQuoteResponse, GetWhiteListResponse, GetWhiteListSizeResponse,
	InitQuoteResponse, InvokeServiceResponse, ReportAttestationStatusResponse,
	Response, SwitchExtendedGroupResponse,
};
pub use session::{SessionTable, SESSION_ID_LEN};

/// Size of the target info returned by `InitQuote`.
pub const TARGET_INFO_SIZE: usize = 512;
/// Size of the group id returned by `InitQuote`.
pub const GID_SIZE: usize = 4;
/// Size of a launch token.
pub const LAUNCH_TOKEN_SIZE: usize = 1024;
/// Size of an enclave report, including the optional QE report of a quote.
pub const REPORT_SIZE: usize = 432;

/// Bytes an envelope may add on top of the buffers and capacities of the
/// request it carries: message and variant tags, length fields and scalars.
pub const ENVELOPE_OVERHEAD: usize = 256;

/// The privileged operations the broker exposes.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize,
)]
pub enum Capability {
	/// Get the quoting enclave target info and the platform group id.
	InitQuote,
	/// Turn a report into a quote.
	GetQuote,
	/// Get a launch token for an enclave.
	GetLaunchToken,
	/// Open a platform service session.
	CreateSession,
	/// Advance the key exchange of a session.
	ExchangeReport,
	/// Send a message to the platform service over a session.
	InvokeService,
	/// Close a platform service session.
	CloseSession,
	/// Get the platform service capability bits.
	GetPsCap,
	/// Report the outcome of a remote attestation.
	ReportAttestationStatus,
	/// Get the size of the launch whitelist.
	GetWhiteListSize,
	/// Get the launch whitelist.
	GetWhiteList,
	/// Get the active extended group id.
	GetExtendedGroupId,
	/// Switch the active extended group.
	SwitchExtendedGroup,
}

/// Coarse routing tag of a capability. The service serializes execution per
/// class. It is never used for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityClass {
	/// Quote generation and group management.
	Quoting,
	/// Launch tokens and the launch whitelist.
	LaunchControl,
	/// Platform service sessions.
	PlatformService,
}

impl CapabilityClass {
	/// Every class, in index order.
	pub const ALL: [Self; 3] =
		[Self::Quoting, Self::LaunchControl, Self::PlatformService];

	/// Position of the class in [`Self::ALL`].
	#[must_use]
	pub fn index(self) -> usize {
		match self {
			Self::Quoting => 0,
			Self::LaunchControl => 1,
			Self::PlatformService => 2,
		}
	}
}

impl Capability {
	/// The routing class of this capability.
	#[must_use]
	pub fn class(self) -> CapabilityClass {
		match self {
			Self::InitQuote
			| Self::GetQuote
			| Self::ReportAttestationStatus
			| Self::GetExtendedGroupId
			| Self::SwitchExtendedGroup => CapabilityClass::Quoting,
			Self::GetLaunchToken
			| Self::GetWhiteListSize
			| Self::GetWhiteList => CapabilityClass::LaunchControl,
			Self::CreateSession
			| Self::ExchangeReport
			| Self::InvokeService
			| Self::CloseSession
			| Self::GetPsCap => CapabilityClass::PlatformService,
		}
	}
}

/// Size limits applied to every request before anything is copied or
/// allocated on its behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
	/// Maximum size of any single buffer, and of the sum of all buffers and
	/// requested output capacities of one request.
	pub ceiling: u32,
}

impl Default for RequestLimits {
	fn default() -> Self {
		Self { ceiling: crate::DEFAULT_CEILING }
	}
}

impl RequestLimits {
	/// Create limits with the given ceiling.
	#[must_use]
	pub fn new(ceiling: u32) -> Self {
		Self { ceiling }
	}

	/// True if each size and the sum of all sizes fit under the ceiling.
	#[must_use]
	pub fn admits(&self, sizes: &[u64]) -> bool {
		let ceiling = u64::from(self.ceiling);
		let mut total = 0u64;
		for size in sizes {
			if *size > ceiling {
				return false;
			}
			total = match total.checked_add(*size) {
				Some(total) => total,
				None => return false,
			};
		}

		total <= ceiling
	}

	/// Largest envelope a request within these limits can encode to. The
	/// service refuses longer frames without reading them.
	#[must_use]
	pub fn max_envelope_len(&self) -> usize {
		usize::try_from(self.ceiling)
			.unwrap_or(usize::MAX)
			.saturating_add(ENVELOPE_OVERHEAD)
			.min(crate::io::MAX_PAYLOAD_SIZE)
	}
}

/// Length of a slice for ceiling accounting.
pub(crate) fn len64(data: &[u8]) -> u64 {
	u64::try_from(data.len()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn admits_checks_each_size_and_the_sum() {
		let limits = RequestLimits::new(100);
		assert!(limits.admits(&[]));
		assert!(limits.admits(&[100]));
		assert!(limits.admits(&[40, 60]));
		assert!(!limits.admits(&[101]));
		assert!(!limits.admits(&[50, 51]));
		assert!(!limits.admits(&[u64::MAX, u64::MAX]));
	}

	#[test]
	fn largest_admitted_request_fits_the_envelope_limit() {
		let limits = RequestLimits::new(4096);
		assert_eq!(limits.max_envelope_len(), 4096 + ENVELOPE_OVERHEAD);

		// every buffer present, buffers plus capacities exactly at the ceiling
		let request = GetQuoteRequest::new(
			&limits,
			&[1; 2000],
			1,
			&[2; 16],
			&[3; 16],
			&[4; 1000],
			632,
			true,
			u32::MAX,
		)
		.unwrap();
		assert!(request.check());
		let envelope = BorshCodec
			.encode(&AesmMsg::Request(Request::GetQuote(request)))
			.unwrap();
		assert!(envelope.len() <= limits.max_envelope_len());

		let huge = RequestLimits::new(u32::MAX);
		assert_eq!(huge.max_envelope_len(), crate::io::MAX_PAYLOAD_SIZE);
	}

	#[test]
	fn classes_cover_every_capability() {
		use Capability::*;
		let quoting = [
			InitQuote,
			GetQuote,
			ReportAttestationStatus,
			GetExtendedGroupId,
			SwitchExtendedGroup,
		];
		let launch = [GetLaunchToken, GetWhiteListSize, GetWhiteList];
		let platform = [
			CreateSession,
			ExchangeReport,
			InvokeService,
			CloseSession,
			GetPsCap,
		];

		for c in quoting {
			assert_eq!(c.class(), CapabilityClass::Quoting);
		}
		for c in launch {
			assert_eq!(c.class(), CapabilityClass::LaunchControl);
		}
		for c in platform {
			assert_eq!(c.class(), CapabilityClass::PlatformService);
		}
		for (i, class) in CapabilityClass::ALL.iter().enumerate() {
			assert_eq!(class.index(), i);
		}
	}
}
