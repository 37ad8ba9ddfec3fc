//! Requests, one per capability.
//!
//! A request is built either from typed arguments on the client side or by
//! decoding an envelope on the service side. Both paths apply the same
//! ceiling before anything else: a request whose buffers, or requested output
//! capacities, exceed it comes out with every field cleared and `check()`
//! false. Construction itself never fails on size.
//!
//! Validity is never taken from the wire. A decoded request is invalid until
//! [`Request::limited`] re-applies the receiver's own ceiling.

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
	len64, session::session_id_of, AesmLogic, Capability, CapabilityClass,
	CloseSessionResponse, CreateSessionResponse, ExchangeReportResponse,
	GetExtendedGroupIdResponse, GetLaunchTokenResponse, GetPsCapResponse,
	GetQuoteResponse, GetWhiteListResponse, GetWhiteListSizeResponse,
	InitQuoteResponse, InvokeServiceResponse, LogicResult, QuoteInput,
	ReportAttestationStatusResponse, RequestLimits, Response, SessionTable,
	SwitchExtendedGroupResponse, GID_SIZE, LAUNCH_TOKEN_SIZE, REPORT_SIZE,
	TARGET_INFO_SIZE,
};
use crate::{
	buffer::{copy_optional, optional_len, Buffer, BufferError},
	server::ConnectionId,
	status::{AesmResult, ServiceStatus},
};

const PARAMETER: ServiceStatus =
	ServiceStatus::failure(AesmResult::PARAMETER_ERROR);
const UNEXPECTED: ServiceStatus =
	ServiceStatus::failure(AesmResult::UNEXPECTED_ERROR);

/// Shared ceiling gate of every request type.
trait Bounded: Default {
	/// Sizes counted against the ceiling: buffer lengths and requested output
	/// capacities.
	fn sizes(&self) -> Vec<u64>;

	fn set_valid(&mut self);

	fn bounded(mut self, limits: &RequestLimits) -> Self {
		if limits.admits(&self.sizes()) {
			self.set_valid();
			self
		} else {
			Self::default()
		}
	}
}

/// Wrap a logic output, refusing it if it is larger than `capacity`.
fn output(data: Vec<u8>, capacity: u64) -> LogicResult<Buffer> {
	// Take ownership first so the data is zeroed on every path.
	let buffer = Buffer::from_vec(data).map_err(|_| UNEXPECTED)?;
	if u64::from(buffer.length()) > capacity {
		tracing::warn!(
			len = buffer.length(),
			capacity,
			"logic output exceeds requested capacity"
		);
		return Err(UNEXPECTED);
	}

	Ok(buffer)
}

/// Close a session that never made it into the session table.
fn tear_down<L: AesmLogic + ?Sized>(logic: &L, material: &Buffer) {
	if let Err(status) = logic.close_session(material.as_slice()) {
		tracing::warn!(
			result = %status.result,
			"failed to tear down unregistered session"
		);
	}
}

fn as_slice(buffer: Option<&Buffer>) -> Option<&[u8]> {
	buffer.map(Buffer::as_slice)
}

/// Get the quoting enclave target info and the platform group id.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct InitQuoteRequest {
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl InitQuoteRequest {
	/// Create the request.
	#[must_use]
	pub fn new(timeout_msec: u32) -> Self {
		Self { timeout_msec, valid: true }
	}

	/// True if the request may be executed.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
	) -> InitQuoteResponse {
		let run = || -> LogicResult<InitQuoteResponse> {
			let out = logic.init_quote()?;
			Ok(InitQuoteResponse {
				status: ServiceStatus::SUCCESS,
				target_info: Some(output(
					out.target_info,
					TARGET_INFO_SIZE as u64,
				)?),
				gid: Some(output(out.gid, GID_SIZE as u64)?),
			})
		};

		run().unwrap_or_else(InitQuoteResponse::failed)
	}
}

impl Bounded for InitQuoteRequest {
	fn sizes(&self) -> Vec<u64> {
		Vec::new()
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Turn a report into a quote.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetQuoteRequest {
	report: Option<Buffer>,
	quote_type: u32,
	spid: Option<Buffer>,
	nonce: Option<Buffer>,
	sig_rl: Option<Buffer>,
	quote_size: u32,
	qe_report: bool,
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl GetQuoteRequest {
	/// Create the request. `nonce` and `sig_rl` may be empty, meaning absent.
	/// `qe_report` asks for the quoting enclave's report alongside the quote.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		limits: &RequestLimits,
		report: &[u8],
		quote_type: u32,
		spid: &[u8],
		nonce: &[u8],
		sig_rl: &[u8],
		quote_size: u32,
		qe_report: bool,
		timeout_msec: u32,
	) -> Result<Self, BufferError> {
		let qe_capacity = if qe_report { REPORT_SIZE as u64 } else { 0 };
		if !limits.admits(&[
			len64(report),
			len64(spid),
			len64(nonce),
			len64(sig_rl),
			u64::from(quote_size),
			qe_capacity,
		]) {
			return Ok(Self::default());
		}

		Ok(Self {
			report: copy_optional(report)?,
			quote_type,
			spid: copy_optional(spid)?,
			nonce: copy_optional(nonce)?,
			sig_rl: copy_optional(sig_rl)?,
			quote_size,
			qe_report,
			timeout_msec,
			valid: true,
		})
	}

	/// True if the request may be executed: it passed the ceiling and carries
	/// a report, a spid and a non-zero quote size.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid
			&& self.report.is_some()
			&& self.spid.is_some()
			&& self.quote_size != 0
	}

	/// Requested quote size.
	#[must_use]
	pub fn quote_size(&self) -> u32 {
		self.quote_size
	}

	/// Applies the receiver's ceiling to a decoded request.
	#[must_use]
	pub fn limited(self, limits: &RequestLimits) -> Self {
		self.bounded(limits)
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
	) -> GetQuoteResponse {
		let run = || -> LogicResult<GetQuoteResponse> {
			let (Some(report), Some(spid)) = (&self.report, &self.spid) else {
				return Err(PARAMETER);
			};
			let out = logic.get_quote(QuoteInput {
				report: report.as_slice(),
				quote_type: self.quote_type,
				spid: spid.as_slice(),
				nonce: as_slice(self.nonce.as_ref()),
				sig_rl: as_slice(self.sig_rl.as_ref()),
				quote_size: self.quote_size,
				qe_report: self.qe_report,
			})?;

			let quote = output(out.quote, u64::from(self.quote_size))?;
			let qe_report = match out.qe_report {
				Some(r) if self.qe_report => {
					Some(output(r, REPORT_SIZE as u64)?)
				}
				_ => None,
			};

			Ok(GetQuoteResponse {
				status: ServiceStatus::SUCCESS,
				quote: Some(quote),
				qe_report,
			})
		};

		run().unwrap_or_else(GetQuoteResponse::failed)
	}
}

impl Bounded for GetQuoteRequest {
	fn sizes(&self) -> Vec<u64> {
		let qe_capacity = if self.qe_report { REPORT_SIZE as u64 } else { 0 };
		vec![
			optional_len(self.report.as_ref()),
			optional_len(self.spid.as_ref()),
			optional_len(self.nonce.as_ref()),
			optional_len(self.sig_rl.as_ref()),
			u64::from(self.quote_size),
			qe_capacity,
		]
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Get a launch token for an enclave.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetLaunchTokenRequest {
	enclave_measurement: Option<Buffer>,
	signer: Option<Buffer>,
	se_attributes: Option<Buffer>,
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl GetLaunchTokenRequest {
	/// Create the request.
	pub fn new(
		limits: &RequestLimits,
		enclave_measurement: &[u8],
		signer: &[u8],
		se_attributes: &[u8],
		timeout_msec: u32,
	) -> Result<Self, BufferError> {
		if !limits.admits(&[
			len64(enclave_measurement),
			len64(signer),
			len64(se_attributes),
		]) {
			return Ok(Self::default());
		}

		Ok(Self {
			enclave_measurement: copy_optional(enclave_measurement)?,
			signer: copy_optional(signer)?,
			se_attributes: copy_optional(se_attributes)?,
			timeout_msec,
			valid: true,
		})
	}

	/// True if the request passed the ceiling and carries all three inputs.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid
			&& self.enclave_measurement.is_some()
			&& self.signer.is_some()
			&& self.se_attributes.is_some()
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
	) -> GetLaunchTokenResponse {
		let run = || -> LogicResult<GetLaunchTokenResponse> {
			let (Some(mr_enclave), Some(signer), Some(attributes)) =
				(&self.enclave_measurement, &self.signer, &self.se_attributes)
			else {
				return Err(PARAMETER);
			};
			let token = logic.get_launch_token(
				mr_enclave.as_slice(),
				signer.as_slice(),
				attributes.as_slice(),
			)?;

			Ok(GetLaunchTokenResponse {
				status: ServiceStatus::SUCCESS,
				token: Some(output(token, LAUNCH_TOKEN_SIZE as u64)?),
			})
		};

		run().unwrap_or_else(GetLaunchTokenResponse::failed)
	}
}

impl Bounded for GetLaunchTokenRequest {
	fn sizes(&self) -> Vec<u64> {
		vec![
			optional_len(self.enclave_measurement.as_ref()),
			optional_len(self.signer.as_ref()),
			optional_len(self.se_attributes.as_ref()),
		]
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Open a platform service session.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct CreateSessionRequest {
	dh_msg1_size: u32,
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl CreateSessionRequest {
	/// Create the request.
	#[must_use]
	pub fn new(
		limits: &RequestLimits,
		dh_msg1_size: u32,
		timeout_msec: u32,
	) -> Self {
		Self { dh_msg1_size, timeout_msec, valid: false }.bounded(limits)
	}

	/// True if the request passed the ceiling and asks for a non-empty
	/// first key exchange message.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid && self.dh_msg1_size != 0
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
		sessions: &SessionTable,
		owner: ConnectionId,
	) -> CreateSessionResponse {
		let run = || -> LogicResult<CreateSessionResponse> {
			if !sessions.has_capacity() {
				return Err(ServiceStatus::failure(
					AesmResult::MAX_NUM_SESSION_REACHED,
				));
			}

			let mut created = logic.create_session(self.dh_msg1_size)?;
			let material =
				Buffer::from_vec(std::mem::take(&mut created.material))
					.map_err(|_| UNEXPECTED)?;
			let dh_msg1 = match output(
				std::mem::take(&mut created.dh_msg1),
				u64::from(self.dh_msg1_size),
			) {
				Ok(dh_msg1) => dh_msg1,
				Err(status) => {
					tear_down(logic, &material);
					return Err(status);
				}
			};

			let session_id = match sessions.insert(owner, material) {
				Ok(id) => id,
				Err((status, material)) => {
					tear_down(logic, &material);
					return Err(status);
				}
			};

			Ok(CreateSessionResponse {
				status: ServiceStatus::SUCCESS,
				session_id: Some(session_id),
				dh_msg1: Some(dh_msg1),
			})
		};

		run().unwrap_or_else(CreateSessionResponse::failed)
	}
}

impl Bounded for CreateSessionRequest {
	fn sizes(&self) -> Vec<u64> {
		vec![u64::from(self.dh_msg1_size)]
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Advance the key exchange of an open session.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct ExchangeReportRequest {
	session_id: u32,
	dh_msg2: Option<Buffer>,
	response_size: u32,
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl ExchangeReportRequest {
	/// Create the request. `response_size` is the capacity for the third key
	/// exchange message.
	pub fn new(
		limits: &RequestLimits,
		session_id: u32,
		dh_msg2: &[u8],
		response_size: u32,
		timeout_msec: u32,
	) -> Result<Self, BufferError> {
		if !limits.admits(&[len64(dh_msg2), u64::from(response_size)]) {
			return Ok(Self::default());
		}

		Ok(Self {
			session_id,
			dh_msg2: copy_optional(dh_msg2)?,
			response_size,
			timeout_msec,
			valid: true,
		})
	}

	/// True if the request passed the ceiling, carries the second key exchange
	/// message and asks for a non-empty response.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid && self.dh_msg2.is_some() && self.response_size != 0
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
		sessions: &SessionTable,
	) -> ExchangeReportResponse {
		let run = || -> LogicResult<ExchangeReportResponse> {
			let Some(dh_msg2) = &self.dh_msg2 else {
				return Err(PARAMETER);
			};

			let dh_msg3 = sessions.with_session(self.session_id, |session| {
				let mut exchanged = logic.exchange_report(
					session.material().as_slice(),
					dh_msg2.as_slice(),
					self.response_size,
				)?;
				let dh_msg3 = output(
					std::mem::take(&mut exchanged.dh_msg3),
					u64::from(self.response_size),
				)?;
				let material =
					Buffer::from_vec(std::mem::take(&mut exchanged.material))
						.map_err(|_| UNEXPECTED)?;
				session.set_material(material);

				Ok(dh_msg3)
			})?;

			Ok(ExchangeReportResponse {
				status: ServiceStatus::SUCCESS,
				dh_msg3: Some(dh_msg3),
			})
		};

		run().unwrap_or_else(ExchangeReportResponse::failed)
	}
}

impl Bounded for ExchangeReportRequest {
	fn sizes(&self) -> Vec<u64> {
		vec![optional_len(self.dh_msg2.as_ref()), u64::from(self.response_size)]
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Send a message to the platform service over an open session. The session
/// id is carried in the first four bytes of the message, little endian.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct InvokeServiceRequest {
	pse_message: Option<Buffer>,
	response_size: u32,
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl InvokeServiceRequest {
	/// Create the request.
	pub fn new(
		limits: &RequestLimits,
		pse_message: &[u8],
		response_size: u32,
		timeout_msec: u32,
	) -> Result<Self, BufferError> {
		if !limits.admits(&[len64(pse_message), u64::from(response_size)]) {
			return Ok(Self::default());
		}

		Ok(Self {
			pse_message: copy_optional(pse_message)?,
			response_size,
			timeout_msec,
			valid: true,
		})
	}

	/// True if the request passed the ceiling, carries a message and asks for
	/// a non-empty response.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid && self.pse_message.is_some() && self.response_size != 0
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
		sessions: &SessionTable,
	) -> InvokeServiceResponse {
		let run = || -> LogicResult<InvokeServiceResponse> {
			let Some(message) = &self.pse_message else {
				return Err(PARAMETER);
			};
			let session_id =
				session_id_of(message.as_slice()).ok_or(PARAMETER)?;

			let response = sessions.with_session(session_id, |session| {
				let response = logic.invoke_service(
					session.material().as_slice(),
					message.as_slice(),
					self.response_size,
				)?;
				output(response, u64::from(self.response_size))
			})?;

			Ok(InvokeServiceResponse {
				status: ServiceStatus::SUCCESS,
				pse_message: Some(response),
			})
		};

		run().unwrap_or_else(InvokeServiceResponse::failed)
	}
}

impl Bounded for InvokeServiceRequest {
	fn sizes(&self) -> Vec<u64> {
		vec![
			optional_len(self.pse_message.as_ref()),
			u64::from(self.response_size),
		]
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Close an open session.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct CloseSessionRequest {
	session_id: u32,
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl CloseSessionRequest {
	/// Create the request.
	#[must_use]
	pub fn new(session_id: u32, timeout_msec: u32) -> Self {
		Self { session_id, timeout_msec, valid: true }
	}

	/// True if the request may be executed.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
		sessions: &SessionTable,
	) -> CloseSessionResponse {
		let run = || -> LogicResult<()> {
			let material = sessions.close(self.session_id)?;
			logic.close_session(material.as_slice())
		};

		match run() {
			Ok(()) => CloseSessionResponse { status: ServiceStatus::SUCCESS },
			Err(status) => CloseSessionResponse { status },
		}
	}
}

impl Bounded for CloseSessionRequest {
	fn sizes(&self) -> Vec<u64> {
		Vec::new()
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Get the platform service capability bits.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetPsCapRequest {
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl GetPsCapRequest {
	/// Create the request.
	#[must_use]
	pub fn new(timeout_msec: u32) -> Self {
		Self { timeout_msec, valid: true }
	}

	/// True if the request may be executed.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
	) -> GetPsCapResponse {
		match logic.get_ps_cap() {
			Ok(ps_cap) => GetPsCapResponse {
				status: ServiceStatus::SUCCESS,
				ps_cap: Some(ps_cap),
			},
			Err(status) => GetPsCapResponse { status, ps_cap: None },
		}
	}
}

impl Bounded for GetPsCapRequest {
	fn sizes(&self) -> Vec<u64> {
		Vec::new()
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Report the outcome of a remote attestation.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct ReportAttestationStatusRequest {
	platform_info: Option<Buffer>,
	attestation_status: u32,
	update_info_size: u32,
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl ReportAttestationStatusRequest {
	/// Create the request.
	pub fn new(
		limits: &RequestLimits,
		platform_info: &[u8],
		attestation_status: u32,
		update_info_size: u32,
		timeout_msec: u32,
	) -> Result<Self, BufferError> {
		if !limits.admits(&[len64(platform_info), u64::from(update_info_size)])
		{
			return Ok(Self::default());
		}

		Ok(Self {
			platform_info: copy_optional(platform_info)?,
			attestation_status,
			update_info_size,
			timeout_msec,
			valid: true,
		})
	}

	/// True if the request passed the ceiling, carries the platform info and
	/// asks for non-empty update info.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid && self.platform_info.is_some() && self.update_info_size != 0
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
	) -> ReportAttestationStatusResponse {
		let run = || -> LogicResult<ReportAttestationStatusResponse> {
			let Some(platform_info) = &self.platform_info else {
				return Err(PARAMETER);
			};
			let update_info = logic.report_attestation_status(
				platform_info.as_slice(),
				self.attestation_status,
				self.update_info_size,
			)?;

			Ok(ReportAttestationStatusResponse {
				status: ServiceStatus::SUCCESS,
				update_info: Some(output(
					update_info,
					u64::from(self.update_info_size),
				)?),
			})
		};

		run().unwrap_or_else(ReportAttestationStatusResponse::failed)
	}
}

impl Bounded for ReportAttestationStatusRequest {
	fn sizes(&self) -> Vec<u64> {
		vec![
			optional_len(self.platform_info.as_ref()),
			u64::from(self.update_info_size),
		]
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Get the size of the launch whitelist.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetWhiteListSizeRequest {
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl GetWhiteListSizeRequest {
	/// Create the request.
	#[must_use]
	pub fn new(timeout_msec: u32) -> Self {
		Self { timeout_msec, valid: true }
	}

	/// True if the request may be executed.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
	) -> GetWhiteListSizeResponse {
		match logic.get_white_list_size() {
			Ok(size) => GetWhiteListSizeResponse {
				status: ServiceStatus::SUCCESS,
				white_list_size: Some(size),
			},
			Err(status) => {
				GetWhiteListSizeResponse { status, white_list_size: None }
			}
		}
	}
}

impl Bounded for GetWhiteListSizeRequest {
	fn sizes(&self) -> Vec<u64> {
		Vec::new()
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Get the launch whitelist.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetWhiteListRequest {
	white_list_size: u32,
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl GetWhiteListRequest {
	/// Create the request.
	#[must_use]
	pub fn new(
		limits: &RequestLimits,
		white_list_size: u32,
		timeout_msec: u32,
	) -> Self {
		Self { white_list_size, timeout_msec, valid: false }.bounded(limits)
	}

	/// True if the request passed the ceiling and asks for a non-empty list.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid && self.white_list_size != 0
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
	) -> GetWhiteListResponse {
		let run = || -> LogicResult<GetWhiteListResponse> {
			let list = logic.get_white_list(self.white_list_size)?;
			Ok(GetWhiteListResponse {
				status: ServiceStatus::SUCCESS,
				white_list: Some(output(
					list,
					u64::from(self.white_list_size),
				)?),
			})
		};

		run().unwrap_or_else(GetWhiteListResponse::failed)
	}
}

impl Bounded for GetWhiteListRequest {
	fn sizes(&self) -> Vec<u64> {
		vec![u64::from(self.white_list_size)]
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Get the active extended group id.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct GetExtendedGroupIdRequest {
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl GetExtendedGroupIdRequest {
	/// Create the request.
	#[must_use]
	pub fn new(timeout_msec: u32) -> Self {
		Self { timeout_msec, valid: true }
	}

	/// True if the request may be executed.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
	) -> GetExtendedGroupIdResponse {
		match logic.get_extended_group_id() {
			Ok(id) => GetExtendedGroupIdResponse {
				status: ServiceStatus::SUCCESS,
				x_group_id: Some(id),
			},
			Err(status) => {
				GetExtendedGroupIdResponse { status, x_group_id: None }
			}
		}
	}
}

impl Bounded for GetExtendedGroupIdRequest {
	fn sizes(&self) -> Vec<u64> {
		Vec::new()
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// Switch the active extended group.
#[derive(
	Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize,
)]
pub struct SwitchExtendedGroupRequest {
	x_group_id: u32,
	timeout_msec: u32,
	#[borsh(skip)]
	valid: bool,
}

impl SwitchExtendedGroupRequest {
	/// Create the request.
	#[must_use]
	pub fn new(x_group_id: u32, timeout_msec: u32) -> Self {
		Self { x_group_id, timeout_msec, valid: true }
	}

	/// True if the request may be executed.
	#[must_use]
	pub fn check(&self) -> bool {
		self.valid
	}

	pub(crate) fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
	) -> SwitchExtendedGroupResponse {
		let status = match logic.switch_extended_group(self.x_group_id) {
			Ok(()) => ServiceStatus::SUCCESS,
			Err(status) => status,
		};

		SwitchExtendedGroupResponse { status }
	}
}

impl Bounded for SwitchExtendedGroupRequest {
	fn sizes(&self) -> Vec<u64> {
		Vec::new()
	}

	fn set_valid(&mut self) {
		self.valid = true;
	}
}

/// A request for one of the broker's capabilities.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
#[allow(missing_docs)]
pub enum Request {
	InitQuote(InitQuoteRequest),
	GetQuote(GetQuoteRequest),
	GetLaunchToken(GetLaunchTokenRequest),
	CreateSession(CreateSessionRequest),
	ExchangeReport(ExchangeReportRequest),
	InvokeService(InvokeServiceRequest),
	CloseSession(CloseSessionRequest),
	GetPsCap(GetPsCapRequest),
	ReportAttestationStatus(ReportAttestationStatusRequest),
	GetWhiteListSize(GetWhiteListSizeRequest),
	GetWhiteList(GetWhiteListRequest),
	GetExtendedGroupId(GetExtendedGroupIdRequest),
	SwitchExtendedGroup(SwitchExtendedGroupRequest),
}

impl Request {
	/// The capability this request is for.
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

	/// Routing class of the request.
	#[must_use]
	pub fn class(&self) -> CapabilityClass {
		self.capability().class()
	}

	/// The single authoritative gate: true only if the request passed the
	/// ceiling and carries every field its capability requires.
	#[must_use]
	pub fn check(&self) -> bool {
		match self {
			Self::InitQuote(r) => r.check(),
			Self::GetQuote(r) => r.check(),
			Self::GetLaunchToken(r) => r.check(),
			Self::CreateSession(r) => r.check(),
			Self::ExchangeReport(r) => r.check(),
			Self::InvokeService(r) => r.check(),
			Self::CloseSession(r) => r.check(),
			Self::GetPsCap(r) => r.check(),
			Self::ReportAttestationStatus(r) => r.check(),
			Self::GetWhiteListSize(r) => r.check(),
			Self::GetWhiteList(r) => r.check(),
			Self::GetExtendedGroupId(r) => r.check(),
			Self::SwitchExtendedGroup(r) => r.check(),
		}
	}

	/// Timeout the caller set for the request, in milliseconds.
	#[must_use]
	pub fn timeout_msec(&self) -> u32 {
		match self {
			Self::InitQuote(r) => r.timeout_msec,
			Self::GetQuote(r) => r.timeout_msec,
			Self::GetLaunchToken(r) => r.timeout_msec,
			Self::CreateSession(r) => r.timeout_msec,
			Self::ExchangeReport(r) => r.timeout_msec,
			Self::InvokeService(r) => r.timeout_msec,
			Self::CloseSession(r) => r.timeout_msec,
			Self::GetPsCap(r) => r.timeout_msec,
			Self::ReportAttestationStatus(r) => r.timeout_msec,
			Self::GetWhiteListSize(r) => r.timeout_msec,
			Self::GetWhiteList(r) => r.timeout_msec,
			Self::GetExtendedGroupId(r) => r.timeout_msec,
			Self::SwitchExtendedGroup(r) => r.timeout_msec,
		}
	}

	/// Apply `limits` to a decoded request. A request over the ceiling comes
	/// back with every field cleared and fails [`Self::check`].
	#[must_use]
	pub fn limited(self, limits: &RequestLimits) -> Self {
		match self {
			Self::InitQuote(r) => Self::InitQuote(r.bounded(limits)),
			Self::GetQuote(r) => Self::GetQuote(r.bounded(limits)),
			Self::GetLaunchToken(r) => Self::GetLaunchToken(r.bounded(limits)),
			Self::CreateSession(r) => Self::CreateSession(r.bounded(limits)),
			Self::ExchangeReport(r) => Self::ExchangeReport(r.bounded(limits)),
			Self::InvokeService(r) => Self::InvokeService(r.bounded(limits)),
			Self::CloseSession(r) => Self::CloseSession(r.bounded(limits)),
			Self::GetPsCap(r) => Self::GetPsCap(r.bounded(limits)),
			Self::ReportAttestationStatus(r) => {
				Self::ReportAttestationStatus(r.bounded(limits))
			}
			Self::GetWhiteListSize(r) => {
				Self::GetWhiteListSize(r.bounded(limits))
			}
			Self::GetWhiteList(r) => Self::GetWhiteList(r.bounded(limits)),
			Self::GetExtendedGroupId(r) => {
				Self::GetExtendedGroupId(r.bounded(limits))
			}
			Self::SwitchExtendedGroup(r) => {
				Self::SwitchExtendedGroup(r.bounded(limits))
			}
		}
	}

	/// Execute the request against `logic`, making at most one logic call.
	///
	/// A request that fails [`Self::check`] is answered with
	/// `PARAMETER_ERROR` and the logic is not called.
	pub fn execute<L: AesmLogic + ?Sized>(
		&self,
		logic: &L,
		sessions: &SessionTable,
		connection: ConnectionId,
	) -> Response {
		if !self.check() {
			return Response::failure(self.capability(), PARAMETER);
		}

		match self {
			Self::InitQuote(r) => Response::InitQuote(r.execute(logic)),
			Self::GetQuote(r) => Response::GetQuote(r.execute(logic)),
			Self::GetLaunchToken(r) => {
				Response::GetLaunchToken(r.execute(logic))
			}
			Self::CreateSession(r) => {
				Response::CreateSession(r.execute(logic, sessions, connection))
			}
			Self::ExchangeReport(r) => {
				Response::ExchangeReport(r.execute(logic, sessions))
			}
			Self::InvokeService(r) => {
				Response::InvokeService(r.execute(logic, sessions))
			}
			Self::CloseSession(r) => {
				Response::CloseSession(r.execute(logic, sessions))
			}
			Self::GetPsCap(r) => Response::GetPsCap(r.execute(logic)),
			Self::ReportAttestationStatus(r) => {
				Response::ReportAttestationStatus(r.execute(logic))
			}
			Self::GetWhiteListSize(r) => {
				Response::GetWhiteListSize(r.execute(logic))
			}
			Self::GetWhiteList(r) => Response::GetWhiteList(r.execute(logic)),
			Self::GetExtendedGroupId(r) => {
				Response::GetExtendedGroupId(r.execute(logic))
			}
			Self::SwitchExtendedGroup(r) => {
				Response::SwitchExtendedGroup(r.execute(logic))
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::mock::MockLogic;

	fn limits() -> RequestLimits {
		RequestLimits::new(4096)
	}

	fn quote(report: &[u8], quote_size: u32) -> GetQuoteRequest {
		GetQuoteRequest::new(
			&limits(),
			report,
			0,
			&[1; 16],
			&[],
			&[],
			quote_size,
			false,
			1000,
		)
		.unwrap()
	}

	#[test]
	fn over_ceiling_request_is_cleared() {
		let request = quote(&[7; 4097], 16);
		assert!(!request.check());
		assert_eq!(request, GetQuoteRequest::default());

		// the sum counts, not just each buffer
		let request = quote(&[7; 2048], 2049);
		assert!(!request.check());

		// requested output capacities count
		let request = quote(&[7; 64], 4096);
		assert!(!request.check());

		let request = GetWhiteListRequest::new(&limits(), 4097, 10);
		assert!(!request.check());
	}

	#[test]
	fn required_fields_are_enforced() {
		assert!(quote(&[7; 64], 1116).check());
		assert!(!quote(&[], 1116).check());
		assert!(!quote(&[7; 64], 0).check());

		let no_spid = GetQuoteRequest::new(
			&limits(),
			&[7; 64],
			0,
			&[],
			&[],
			&[],
			16,
			false,
			0,
		)
		.unwrap();
		assert!(!no_spid.check());

		let token =
			GetLaunchTokenRequest::new(&limits(), &[1; 32], &[2; 32], &[], 0)
				.unwrap();
		assert!(!token.check());

		assert!(!CreateSessionRequest::new(&limits(), 0, 0).check());
		assert!(CreateSessionRequest::new(&limits(), 64, 0).check());

		let exchange =
			ExchangeReportRequest::new(&limits(), 1, &[], 64, 0).unwrap();
		assert!(!exchange.check());

		let invoke =
			InvokeServiceRequest::new(&limits(), &[1; 8], 0, 0).unwrap();
		assert!(!invoke.check());

		let report =
			ReportAttestationStatusRequest::new(&limits(), &[1; 105], 0, 0, 0)
				.unwrap();
		assert!(!report.check());

		assert!(!GetWhiteListRequest::new(&limits(), 0, 0).check());
		assert!(InitQuoteRequest::new(0).check());
		assert!(CloseSessionRequest::new(0, 0).check());
		assert!(SwitchExtendedGroupRequest::new(0, 0).check());
	}

	#[test]
	fn decoded_request_is_gated_by_the_receivers_ceiling() {
		let request = Request::GetQuote(quote(&[7; 1024], 1116));
		let bytes = borsh::to_vec(&request).unwrap();
		let decoded = Request::try_from_slice(&bytes).unwrap();
		assert!(!decoded.check());

		assert!(decoded.clone().limited(&limits()).check());

		let tight = decoded.limited(&RequestLimits::new(1000));
		assert!(!tight.check());
		assert_eq!(tight, Request::GetQuote(GetQuoteRequest::default()));
	}

	#[test]
	fn invalid_request_never_reaches_the_logic() {
		let logic = MockLogic::default();
		let sessions = SessionTable::new(4);
		let request = Request::GetQuote(quote(&[7; 5000], 1116));

		let response = request.execute(&logic, &sessions, ConnectionId(0));
		assert_eq!(response.status(), PARAMETER);
		assert_eq!(response.capability(), Capability::GetQuote);
		assert_eq!(logic.calls(), 0);
	}

	#[test]
	fn get_quote_executes_once() {
		let logic = MockLogic::default();
		let sessions = SessionTable::new(4);
		let request = Request::GetQuote(quote(&[7; 64], 1116));

		let Response::GetQuote(response) =
			request.execute(&logic, &sessions, ConnectionId(0))
		else {
			panic!("wrong response variant")
		};
		assert!(response.status().is_success());
		assert_eq!(response.quote_len(), 1116);
		assert_eq!(response.qe_report_len(), 0);
		assert_eq!(logic.calls(), 1);
	}

	#[test]
	fn oversized_logic_output_is_unexpected() {
		let logic = MockLogic::default();
		let sessions = SessionTable::new(4);

		// the mock echoes the message back, which does not fit in 4 bytes
		let id = sessions
			.insert(ConnectionId(0), Buffer::copy_from_slice(&[1]).unwrap())
			.unwrap();
		let mut message = id.to_le_bytes().to_vec();
		message.extend_from_slice(&[0xee; 12]);
		let request = Request::InvokeService(
			InvokeServiceRequest::new(&limits(), &message, 4, 0).unwrap(),
		);

		let response = request.execute(&logic, &sessions, ConnectionId(0));
		assert_eq!(response.status(), UNEXPECTED);
		assert_eq!(logic.calls(), 1);
	}

	#[test]
	fn session_lifecycle() {
		let logic = MockLogic::default();
		let sessions = SessionTable::new(4);
		let owner = ConnectionId(3);

		let create = Request::CreateSession(CreateSessionRequest::new(
			&limits(),
			32,
			0,
		));
		let Response::CreateSession(created) =
			create.execute(&logic, &sessions, owner)
		else {
			panic!("wrong response variant")
		};
		let id = created.session_id().unwrap();
		assert_eq!(created.dh_msg1_len(), 32);

		let exchange = Request::ExchangeReport(
			ExchangeReportRequest::new(&limits(), id, &[2; 32], 64, 0)
				.unwrap(),
		);
		let exchanged = exchange.execute(&logic, &sessions, owner);
		assert!(exchanged.status().is_success());

		let mut message = id.to_le_bytes().to_vec();
		message.extend_from_slice(b"ping");
		let invoke = Request::InvokeService(
			InvokeServiceRequest::new(&limits(), &message, 64, 0).unwrap(),
		);
		assert!(invoke.execute(&logic, &sessions, owner).status().is_success());

		let close = Request::CloseSession(CloseSessionRequest::new(id, 0));
		assert!(close.execute(&logic, &sessions, owner).status().is_success());

		let invalid = ServiceStatus::failure(AesmResult::SESSION_INVALID);
		for request in [&exchange, &invoke, &close] {
			let response = request.execute(&logic, &sessions, owner);
			assert_eq!(response.status(), invalid);
		}
	}

	#[test]
	fn refused_session_is_torn_down() {
		let logic = MockLogic::default();
		let sessions = SessionTable::new(4);
		logic.set_overshoot(1);

		let create = Request::CreateSession(CreateSessionRequest::new(
			&limits(),
			32,
			0,
		));
		let response = create.execute(&logic, &sessions, ConnectionId(0));
		assert_eq!(response.status(), UNEXPECTED);
		assert!(sessions.is_empty());
		// created, then closed because its first message did not fit
		assert_eq!(logic.calls(), 2);
		assert_eq!(logic.closed_sessions(), 1);
	}
}
