//! Responses, one per capability.
//!
//! Outputs only leave a response through its `get_values` accessor, which
//! writes into caller owned destinations. The accessor refuses, without
//! writing anything, when the service did not succeed or when a destination is
//! smaller than the output it would receive.

use borsh::{BorshDeserialize, BorshSerialize};

use super::Capability;
use crate::{buffer::Buffer, status::ServiceStatus};

fn len(buffer: Option<&Buffer>) -> usize {
	buffer.map_or(0, Buffer::len)
}

/// True if `buffer` is present and fits in `dest`.
fn fits(buffer: Option<&Buffer>, dest: &[u8]) -> bool {
	buffer.is_some_and(|b| b.len() <= dest.len())
}

fn write(buffer: Option<&Buffer>, dest: &mut [u8]) -> bool {
	buffer.and_then(|b| b.copy_to(dest)).is_some()
}

/// Outputs of `InitQuote`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct InitQuoteResponse {
	pub(crate) status: ServiceStatus,
	pub(crate) target_info: Option<Buffer>,
	pub(crate) gid: Option<Buffer>,
}

impl InitQuoteResponse {
	pub(crate) fn failed(status: ServiceStatus) -> Self {
		Self { status, ..Default::default() }
	}

	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}

	/// Length of the target info.
	#[must_use]
	pub fn target_info_len(&self) -> usize {
		len(self.target_info.as_ref())
	}

	/// Length of the group id.
	#[must_use]
	pub fn gid_len(&self) -> usize {
		len(self.gid.as_ref())
	}

	/// Copy the target info and the group id out.
	#[must_use]
	pub fn get_values(&self, target_info: &mut [u8], gid: &mut [u8]) -> bool {
		if !self.status.is_success()
			|| !fits(self.target_info.as_ref(), target_info)
			|| !fits(self.gid.as_ref(), gid)
		{
			return false;
		}

		write(self.target_info.as_ref(), target_info)
			&& write(self.gid.as_ref(), gid)
	}
}

/// Outputs of `GetQuote`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetQuoteResponse {
	pub(crate) status: ServiceStatus,
	pub(crate) quote: Option<Buffer>,
	pub(crate) qe_report: Option<Buffer>,
}

impl GetQuoteResponse {
	pub(crate) fn failed(status: ServiceStatus) -> Self {
		Self { status, ..Default::default() }
	}

	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}

	/// Length of the quote.
	#[must_use]
	pub fn quote_len(&self) -> usize {
		len(self.quote.as_ref())
	}

	/// Length of the quoting enclave report, zero if there is none.
	#[must_use]
	pub fn qe_report_len(&self) -> usize {
		len(self.qe_report.as_ref())
	}

	/// Copy the quote, and the quoting enclave report if there is one and
	/// `qe_report` is given, out. Both capacities are checked before either
	/// destination is written.
	#[must_use]
	pub fn get_values(
		&self,
		quote: &mut [u8],
		qe_report: Option<&mut [u8]>,
	) -> bool {
		if !self.status.is_success() || !fits(self.quote.as_ref(), quote) {
			return false;
		}
		let qe_report = match (self.qe_report.as_ref(), qe_report) {
			(Some(report), Some(dest)) => {
				if report.len() > dest.len() {
					return false;
				}
				Some((report, dest))
			}
			_ => None,
		};

		if !write(self.quote.as_ref(), quote) {
			return false;
		}
		match qe_report {
			Some((report, dest)) => report.copy_to(dest).is_some(),
			None => true,
		}
	}
}

/// Outputs of `GetLaunchToken`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetLaunchTokenResponse {
	pub(crate) status: ServiceStatus,
	pub(crate) token: Option<Buffer>,
}

impl GetLaunchTokenResponse {
	pub(crate) fn failed(status: ServiceStatus) -> Self {
		Self { status, ..Default::default() }
	}

	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}

	/// Length of the launch token.
	#[must_use]
	pub fn token_len(&self) -> usize {
		len(self.token.as_ref())
	}

	/// Copy the launch token out.
	#[must_use]
	pub fn get_values(&self, token: &mut [u8]) -> bool {
		self.status.is_success() && write(self.token.as_ref(), token)
	}
}

/// Outputs of `CreateSession`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct CreateSessionResponse {
	pub(crate) status: ServiceStatus,
	pub(crate) session_id: Option<u32>,
	pub(crate) dh_msg1: Option<Buffer>,
}

impl CreateSessionResponse {
	pub(crate) fn failed(status: ServiceStatus) -> Self {
		Self { status, ..Default::default() }
	}

	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}

	/// Id of the new session, if one was opened.
	#[must_use]
	pub fn session_id(&self) -> Option<u32> {
		self.session_id.filter(|_| self.status.is_success())
	}

	/// Length of the first key exchange message.
	#[must_use]
	pub fn dh_msg1_len(&self) -> usize {
		len(self.dh_msg1.as_ref())
	}

	/// Copy the session id and the first key exchange message out.
	#[must_use]
	pub fn get_values(&self, session_id: &mut u32, dh_msg1: &mut [u8]) -> bool {
		let Some(id) = self.session_id() else {
			return false;
		};
		if !fits(self.dh_msg1.as_ref(), dh_msg1) {
			return false;
		}

		*session_id = id;
		write(self.dh_msg1.as_ref(), dh_msg1)
	}
}

/// Outputs of `ExchangeReport`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct ExchangeReportResponse {
	pub(crate) status: ServiceStatus,
	pub(crate) dh_msg3: Option<Buffer>,
}

impl ExchangeReportResponse {
	pub(crate) fn failed(status: ServiceStatus) -> Self {
		Self { status, ..Default::default() }
	}

	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}

	/// Length of the third key exchange message.
	#[must_use]
	pub fn dh_msg3_len(&self) -> usize {
		len(self.dh_msg3.as_ref())
	}

	/// Copy the third key exchange message out.
	#[must_use]
	pub fn get_values(&self, dh_msg3: &mut [u8]) -> bool {
		self.status.is_success() && write(self.dh_msg3.as_ref(), dh_msg3)
	}
}

/// Outputs of `InvokeService`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct InvokeServiceResponse {
	pub(crate) status: ServiceStatus,
	pub(crate) pse_message: Option<Buffer>,
}

impl InvokeServiceResponse {
	pub(crate) fn failed(status: ServiceStatus) -> Self {
		Self { status, ..Default::default() }
	}

	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}

	/// Length of the platform service's reply.
	#[must_use]
	pub fn pse_message_len(&self) -> usize {
		len(self.pse_message.as_ref())
	}

	/// Copy the platform service's reply out.
	#[must_use]
	pub fn get_values(&self, pse_message: &mut [u8]) -> bool {
		self.status.is_success()
			&& write(self.pse_message.as_ref(), pse_message)
	}
}

/// Outcome of `CloseSession`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct CloseSessionResponse {
	pub(crate) status: ServiceStatus,
}

impl CloseSessionResponse {
	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}
}

/// Outputs of `GetPsCap`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetPsCapResponse {
	pub(crate) status: ServiceStatus,
	pub(crate) ps_cap: Option<u64>,
}

impl GetPsCapResponse {
	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}

	/// Capability bits, if the service succeeded.
	#[must_use]
	pub fn ps_cap(&self) -> Option<u64> {
		self.ps_cap.filter(|_| self.status.is_success())
	}
}

/// Outputs of `ReportAttestationStatus`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct ReportAttestationStatusResponse {
	pub(crate) status: ServiceStatus,
	pub(crate) update_info: Option<Buffer>,
}

impl ReportAttestationStatusResponse {
	pub(crate) fn failed(status: ServiceStatus) -> Self {
		Self { status, ..Default::default() }
	}

	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}

	/// Length of the update info.
	#[must_use]
	pub fn update_info_len(&self) -> usize {
		len(self.update_info.as_ref())
	}

	/// Copy the platform update info out.
	///
	/// The service may fail with an update available and still attach the
	/// update info; the info is only handed out on success.
	#[must_use]
	pub fn get_values(&self, update_info: &mut [u8]) -> bool {
		self.status.is_success()
			&& write(self.update_info.as_ref(), update_info)
	}
}

/// Outputs of `GetWhiteListSize`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetWhiteListSizeResponse {
	pub(crate) status: ServiceStatus,
	pub(crate) white_list_size: Option<u32>,
}

impl GetWhiteListSizeResponse {
	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}

	/// Size of the whitelist, if the service succeeded.
	#[must_use]
	pub fn white_list_size(&self) -> Option<u32> {
		self.white_list_size.filter(|_| self.status.is_success())
	}
}

/// Outputs of `GetWhiteList`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetWhiteListResponse {
	pub(crate) status: ServiceStatus,
	pub(crate) white_list: Option<Buffer>,
}

impl GetWhiteListResponse {
	pub(crate) fn failed(status: ServiceStatus) -> Self {
		Self { status, ..Default::default() }
	}

	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}

	/// Length of the whitelist.
	#[must_use]
	pub fn white_list_len(&self) -> usize {
		len(self.white_list.as_ref())
	}

	/// Copy the whitelist out.
	#[must_use]
	pub fn get_values(&self, white_list: &mut [u8]) -> bool {
		self.status.is_success() && write(self.white_list.as_ref(), white_list)
	}
}

/// Outputs of `GetExtendedGroupId`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetExtendedGroupIdResponse {
	pub(crate) status: ServiceStatus,
	pub(crate) x_group_id: Option<u32>,
}

impl GetExtendedGroupIdResponse {
	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}

	/// Active extended group id, if the service succeeded.
	#[must_use]
	pub fn x_group_id(&self) -> Option<u32> {
		self.x_group_id.filter(|_| self.status.is_success())
	}
}

/// Outcome of `SwitchExtendedGroup`.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct SwitchExtendedGroupResponse {
	pub(crate) status: ServiceStatus,
}

impl SwitchExtendedGroupResponse {
	/// Service status.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		self.status
	}
}

/// A response for one of the broker's capabilities.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
#[allow(missing_docs)]
pub enum Response {
	InitQuote(InitQuoteResponse),
	GetQuote(GetQuoteResponse),
	GetLaunchToken(GetLaunchTokenResponse),
	CreateSession(CreateSessionResponse),
	ExchangeReport(ExchangeReportResponse),
	InvokeService(InvokeServiceResponse),
	CloseSession(CloseSessionResponse),
	GetPsCap(GetPsCapResponse),
	ReportAttestationStatus(ReportAttestationStatusResponse),
	GetWhiteListSize(GetWhiteListSizeResponse),
	GetWhiteList(GetWhiteListResponse),
	GetExtendedGroupId(GetExtendedGroupIdResponse),
	SwitchExtendedGroup(SwitchExtendedGroupResponse),
}

impl Response {
	/// A response for `capability` that carries no outputs, only `status`.
	#[must_use]
	pub fn failure(capability: Capability, status: ServiceStatus) -> Self {
		match capability {
			Capability::InitQuote => {
				Self::InitQuote(InitQuoteResponse::failed(status))
			}
			Capability::GetQuote => {
				Self::GetQuote(GetQuoteResponse::failed(status))
			}
			Capability::GetLaunchToken => {
				Self::GetLaunchToken(GetLaunchTokenResponse::failed(status))
			}
			Capability::CreateSession => {
				Self::CreateSession(CreateSessionResponse::failed(status))
			}
			Capability::ExchangeReport => {
				Self::ExchangeReport(ExchangeReportResponse::failed(status))
			}
			Capability::InvokeService => {
				Self::InvokeService(InvokeServiceResponse::failed(status))
			}
			Capability::CloseSession => {
				Self::CloseSession(CloseSessionResponse { status })
			}
			Capability::GetPsCap => {
				Self::GetPsCap(GetPsCapResponse { status, ps_cap: None })
			}
			Capability::ReportAttestationStatus => {
				Self::ReportAttestationStatus(
					ReportAttestationStatusResponse::failed(status),
				)
			}
			Capability::GetWhiteListSize => {
				Self::GetWhiteListSize(GetWhiteListSizeResponse {
					status,
					white_list_size: None,
				})
			}
			Capability::GetWhiteList => {
				Self::GetWhiteList(GetWhiteListResponse::failed(status))
			}
			Capability::GetExtendedGroupId => {
				Self::GetExtendedGroupId(GetExtendedGroupIdResponse {
					status,
					x_group_id: None,
				})
			}
			Capability::SwitchExtendedGroup => {
				Self::SwitchExtendedGroup(SwitchExtendedGroupResponse {
					status,
				})
			}
		}
	}

	/// The capability this response answers.
	#[must_use]
	pub fn capability(&self) -> Capability {
		match self {
			Self::InitQuote(_) => Capability::InitQuote,
			Self::GetQuote(_) => Capability::GetQuote,
			Self::GetLaunchToken(_) => Capability::GetLaunchToken,
			Self::CreateSession(_) => Capability::CreateSession,
			Self::ExchangeReport(_) => Capability::ExchangeReport,
			Self::InvokeService(_) => Capability::InvokeService,
			Self::CloseSession(_) => Capability::CloseSession,
			Self::GetPsCap(_) => Capability::GetPsCap,
			Self::ReportAttestationStatus(_) => {
				Capability::ReportAttestationStatus
			}
			Self::GetWhiteListSize(_) => Capability::GetWhiteListSize,
			Self::GetWhiteList(_) => Capability::GetWhiteList,
			Self::GetExtendedGroupId(_) => Capability::GetExtendedGroupId,
			Self::SwitchExtendedGroup(_) => Capability::SwitchExtendedGroup,
		}
	}

	/// Service status carried by the response.
	#[must_use]
	pub fn status(&self) -> ServiceStatus {
		match self {
			Self::InitQuote(r) => r.status,
			Self::GetQuote(r) => r.status,
			Self::GetLaunchToken(r) => r.status,
			Self::CreateSession(r) => r.status,
			Self::ExchangeReport(r) => r.status,
			Self::InvokeService(r) => r.status,
			Self::CloseSession(r) => r.status,
			Self::GetPsCap(r) => r.status,
			Self::ReportAttestationStatus(r) => r.status,
			Self::GetWhiteListSize(r) => r.status,
			Self::GetWhiteList(r) => r.status,
			Self::GetExtendedGroupId(r) => r.status,
			Self::SwitchExtendedGroup(r) => r.status,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::status::AesmResult;

	fn buffer(byte: u8, len: usize) -> Option<Buffer> {
		Some(Buffer::copy_from_slice(&vec![byte; len]).unwrap())
	}

	#[test]
	fn small_destination_is_never_written() {
		let response = GetWhiteListResponse {
			status: ServiceStatus::SUCCESS,
			white_list: buffer(0x77, 64),
		};

		let mut small = [0u8; 63];
		assert!(!response.get_values(&mut small));
		assert_eq!(small, [0u8; 63]);

		let mut exact = [0u8; 64];
		assert!(response.get_values(&mut exact));
		assert_eq!(exact, [0x77; 64]);
	}

	#[test]
	fn failed_status_hands_out_nothing() {
		let response = ReportAttestationStatusResponse {
			status: ServiceStatus::failure(AesmResult::UPDATE_AVAILABLE),
			update_info: buffer(0x55, 16),
		};

		let mut dest = [0u8; 16];
		assert!(!response.get_values(&mut dest));
		assert_eq!(dest, [0u8; 16]);

		let created = CreateSessionResponse {
			status: ServiceStatus::failure(AesmResult::BUSY),
			session_id: Some(9),
			dh_msg1: buffer(1, 4),
		};
		assert_eq!(created.session_id(), None);
		let mut id = 0;
		assert!(!created.get_values(&mut id, &mut [0u8; 4]));
		assert_eq!(id, 0);
	}

	#[test]
	fn quote_checks_both_capacities_before_writing() {
		let response = GetQuoteResponse {
			status: ServiceStatus::SUCCESS,
			quote: buffer(0xa5, 32),
			qe_report: buffer(0x5a, 16),
		};

		let mut quote = [0u8; 32];
		let mut qe_report = [0u8; 15];
		assert!(!response.get_values(&mut quote, Some(&mut qe_report)));
		assert_eq!(quote, [0u8; 32]);

		let mut qe_report = [0u8; 16];
		assert!(response.get_values(&mut quote, Some(&mut qe_report)));
		assert_eq!(quote, [0xa5; 32]);
		assert_eq!(qe_report, [0x5a; 16]);

		// the report is optional for the caller
		let mut quote = [0u8; 32];
		assert!(response.get_values(&mut quote, None));
	}

	#[test]
	fn failure_matches_capability() {
		let status = ServiceStatus::failure(AesmResult::NO_DEVICE_ERROR);
		let response = Response::failure(Capability::GetLaunchToken, status);
		assert_eq!(response.capability(), Capability::GetLaunchToken);
		assert_eq!(response.status(), status);
	}
}
