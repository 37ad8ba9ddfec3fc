//! The call surface applications use: one async function per capability.
//!
//! Every function builds its request under the configured ceiling, refuses
//! locally what would never pass the service's gate, drives the
//! [`Transporter`] and, only when both the transport and the service
//! succeeded, copies the outputs out of the response. Any failure comes back
//! as the full [`LayeredError`] and no outputs.

use std::path::PathBuf;

use aesm_core::{
	buffer::BufferError,
	client::SocketClient,
	io::SocketAddress,
	protocol::{
		BorshCodec, CloseSessionRequest, CreateSessionRequest,
		ExchangeReportRequest, GetExtendedGroupIdRequest,
		GetLaunchTokenRequest, GetPsCapRequest, GetQuoteRequest,
		GetWhiteListRequest, GetWhiteListSizeRequest, InitQuoteOutput,
		InitQuoteRequest, InvokeServiceRequest, QuoteOutput,
		ReportAttestationStatusRequest, Request, RequestLimits, Response,
		SwitchExtendedGroupRequest, WireCodec,
	},
	status::{LayeredError, TransportStatus},
	DEFAULT_SOCKET_BASE,
};

use crate::{
	timeouts::get_quote_timeout_usec,
	transport::{usec_to_msec, RetryPolicy, Transport, Transporter},
};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
	/// Directory holding the service's `aesm.socket`.
	pub socket_base: PathBuf,
	/// Ceiling applied to requests before they are sent.
	pub limits: RequestLimits,
	/// Retry behavior while the service is busy.
	pub retry: RetryPolicy,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			socket_base: PathBuf::from(DEFAULT_SOCKET_BASE),
			limits: RequestLimits::default(),
			retry: RetryPolicy::default(),
		}
	}
}

impl ClientConfig {
	/// Address of the service socket.
	#[must_use]
	pub fn address(&self) -> SocketAddress {
		SocketAddress::from_base(&self.socket_base)
	}
}

/// An open platform service session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedSession {
	/// Id to name the session by in later calls.
	pub session_id: u32,
	/// First message of the key exchange.
	pub dh_msg1: Vec<u8>,
}

fn building(err: BufferError) -> LayeredError {
	match err {
		BufferError::OutOfMemory(_) => {
			LayeredError::transport(TransportStatus::OutOfMemory)
		}
		BufferError::TooLarge(_) => LayeredError::validation(),
	}
}

/// A response whose outputs could not be handed out.
fn malformed() -> LayeredError {
	LayeredError::transport(TransportStatus::Unexpected)
}

/// Zeroed destination of `len` bytes.
fn destination(len: usize) -> Result<Vec<u8>, LayeredError> {
	let mut dest = Vec::new();
	dest.try_reserve_exact(len)
		.map_err(|_| LayeredError::transport(TransportStatus::OutOfMemory))?;
	dest.resize(len, 0);

	Ok(dest)
}

/// Copy one output of at most `capacity` bytes out through `get_values`.
fn extract(
	len: usize,
	capacity: u32,
	get_values: impl FnOnce(&mut [u8]) -> bool,
) -> Result<Vec<u8>, LayeredError> {
	// a too small destination makes `get_values` refuse an oversized output
	let capacity = usize::try_from(capacity).unwrap_or(usize::MAX);
	let mut dest = destination(len.min(capacity))?;
	if !get_values(&mut dest) {
		return Err(malformed());
	}

	Ok(dest)
}

macro_rules! expect_response {
	($response:expr, $variant:ident) => {
		match $response {
			Response::$variant(response) => response,
			_ => return Err(malformed()),
		}
	};
}

/// Client side façade of the broker.
#[derive(Debug)]
pub struct AeServices<T = SocketClient, C = BorshCodec> {
	transporter: Transporter<T, C>,
	limits: RequestLimits,
}

impl AeServices {
	/// Create a client for the service described by `config`. The connection
	/// is opened by the first call.
	#[must_use]
	pub fn new(config: &ClientConfig) -> Self {
		Self::with_transport(SocketClient::new(&config.address()), config)
	}
}

impl<T: Transport> AeServices<T> {
	/// Create a client over a custom transport.
	pub fn with_transport(transport: T, config: &ClientConfig) -> Self {
		Self {
			transporter: Transporter::new(transport, config.retry),
			limits: config.limits,
		}
	}
}

impl<T: Transport, C: WireCodec> AeServices<T, C> {
	/// Create a client over a custom transport and codec.
	pub fn with_transporter(
		transporter: Transporter<T, C>,
		limits: RequestLimits,
	) -> Self {
		Self { transporter, limits }
	}

	/// The underlying transport.
	pub fn transport(&self) -> &T {
		self.transporter.transport()
	}

	async fn call(
		&self,
		request: Request,
		timeout_usec: u32,
	) -> Result<Response, LayeredError> {
		if !request.check() {
			tracing::debug!(
				capability = ?request.capability(),
				"request refused locally"
			);
			return Err(LayeredError::validation());
		}

		let response = self
			.transporter
			.transact(request, timeout_usec)
			.await
			.map_err(LayeredError::transport)?;
		let status = response.status();
		if !status.is_success() {
			return Err(LayeredError::service(status));
		}

		Ok(response)
	}

	/// Get the quoting enclave's target info and the platform group id.
	pub async fn init_quote(
		&self,
		timeout_usec: u32,
	) -> Result<InitQuoteOutput, LayeredError> {
		let request = InitQuoteRequest::new(usec_to_msec(timeout_usec));
		let response =
			self.call(Request::InitQuote(request), timeout_usec).await?;
		let response = expect_response!(response, InitQuote);

		let mut target_info = destination(response.target_info_len())?;
		let mut gid = destination(response.gid_len())?;
		if !response.get_values(&mut target_info, &mut gid) {
			return Err(malformed());
		}

		Ok(InitQuoteOutput { target_info, gid })
	}

	/// Turn `report` into a quote of at most `quote_size` bytes. `nonce` and
	/// `sig_rl` may be empty. With `qe_report` set the quoting enclave's own
	/// report is returned too.
	#[allow(clippy::too_many_arguments)]
	pub async fn get_quote(
		&self,
		report: &[u8],
		quote_type: u32,
		spid: &[u8],
		nonce: &[u8],
		sig_rl: &[u8],
		quote_size: u32,
		qe_report: bool,
		timeout_usec: u32,
	) -> Result<QuoteOutput, LayeredError> {
		let request = GetQuoteRequest::new(
			&self.limits,
			report,
			quote_type,
			spid,
			nonce,
			sig_rl,
			quote_size,
			qe_report,
			usec_to_msec(timeout_usec),
		)
		.map_err(building)?;
		let response =
			self.call(Request::GetQuote(request), timeout_usec).await?;
		let response = expect_response!(response, GetQuote);

		let capacity = usize::try_from(quote_size).unwrap_or(usize::MAX);
		let mut quote = destination(response.quote_len().min(capacity))?;
		let mut qe = if qe_report && response.qe_report_len() > 0 {
			Some(destination(response.qe_report_len())?)
		} else {
			None
		};
		if !response.get_values(&mut quote, qe.as_deref_mut()) {
			return Err(malformed());
		}

		Ok(QuoteOutput { quote, qe_report: qe })
	}

	/// [`Self::get_quote`] with the default timeout of the legacy call
	/// surface, which grows with the number of entries in `sig_rl`.
	#[allow(clippy::too_many_arguments)]
	pub async fn get_quote_default_timeout(
		&self,
		report: &[u8],
		quote_type: u32,
		spid: &[u8],
		nonce: &[u8],
		sig_rl: &[u8],
		quote_size: u32,
		qe_report: bool,
	) -> Result<QuoteOutput, LayeredError> {
		let timeout_usec = get_quote_timeout_usec(sig_rl);
		self.get_quote(
			report,
			quote_type,
			spid,
			nonce,
			sig_rl,
			quote_size,
			qe_report,
			timeout_usec,
		)
		.await
	}

	/// Get a launch token for the enclave with the given measurement, signer
	/// and attributes.
	pub async fn get_launch_token(
		&self,
		enclave_measurement: &[u8],
		signer: &[u8],
		se_attributes: &[u8],
		timeout_usec: u32,
	) -> Result<Vec<u8>, LayeredError> {
		let request = GetLaunchTokenRequest::new(
			&self.limits,
			enclave_measurement,
			signer,
			se_attributes,
			usec_to_msec(timeout_usec),
		)
		.map_err(building)?;
		let response =
			self.call(Request::GetLaunchToken(request), timeout_usec).await?;
		let response = expect_response!(response, GetLaunchToken);

		let mut token = destination(response.token_len())?;
		if !response.get_values(&mut token) {
			return Err(malformed());
		}

		Ok(token)
	}

	/// Open a platform service session, asking for a first key exchange
	/// message of at most `dh_msg1_size` bytes.
	pub async fn create_session(
		&self,
		dh_msg1_size: u32,
		timeout_usec: u32,
	) -> Result<OpenedSession, LayeredError> {
		let request = CreateSessionRequest::new(
			&self.limits,
			dh_msg1_size,
			usec_to_msec(timeout_usec),
		);
		let response =
			self.call(Request::CreateSession(request), timeout_usec).await?;
		let response = expect_response!(response, CreateSession);

		let mut session_id = 0;
		let dh_msg1 =
			extract(response.dh_msg1_len(), dh_msg1_size, |dh_msg1| {
				response.get_values(&mut session_id, dh_msg1)
			})?;

		Ok(OpenedSession { session_id, dh_msg1 })
	}

	/// Advance the key exchange of `session_id` with `dh_msg2`, returning a
	/// third message of at most `dh_msg3_size` bytes.
	pub async fn exchange_report(
		&self,
		session_id: u32,
		dh_msg2: &[u8],
		dh_msg3_size: u32,
		timeout_usec: u32,
	) -> Result<Vec<u8>, LayeredError> {
		let request = ExchangeReportRequest::new(
			&self.limits,
			session_id,
			dh_msg2,
			dh_msg3_size,
			usec_to_msec(timeout_usec),
		)
		.map_err(building)?;
		let response =
			self.call(Request::ExchangeReport(request), timeout_usec).await?;
		let response = expect_response!(response, ExchangeReport);

		extract(response.dh_msg3_len(), dh_msg3_size, |dh_msg3| {
			response.get_values(dh_msg3)
		})
	}

	/// Send `pse_message` through the session named in its first four bytes,
	/// returning a reply of at most `response_size` bytes.
	pub async fn invoke_service(
		&self,
		pse_message: &[u8],
		response_size: u32,
		timeout_usec: u32,
	) -> Result<Vec<u8>, LayeredError> {
		let request = InvokeServiceRequest::new(
			&self.limits,
			pse_message,
			response_size,
			usec_to_msec(timeout_usec),
		)
		.map_err(building)?;
		let response =
			self.call(Request::InvokeService(request), timeout_usec).await?;
		let response = expect_response!(response, InvokeService);

		extract(response.pse_message_len(), response_size, |message| {
			response.get_values(message)
		})
	}

	/// Close `session_id`. The id is never valid again.
	pub async fn close_session(
		&self,
		session_id: u32,
		timeout_usec: u32,
	) -> Result<(), LayeredError> {
		let request =
			CloseSessionRequest::new(session_id, usec_to_msec(timeout_usec));
		let response =
			self.call(Request::CloseSession(request), timeout_usec).await?;
		expect_response!(response, CloseSession);

		Ok(())
	}

	/// Get the platform service capability bits.
	pub async fn get_ps_cap(
		&self,
		timeout_usec: u32,
	) -> Result<u64, LayeredError> {
		let request = GetPsCapRequest::new(usec_to_msec(timeout_usec));
		let response =
			self.call(Request::GetPsCap(request), timeout_usec).await?;

		expect_response!(response, GetPsCap).ps_cap().ok_or_else(malformed)
	}

	/// Report the outcome of a remote attestation, returning update info of at
	/// most `update_info_size` bytes.
	pub async fn report_attestation_status(
		&self,
		platform_info: &[u8],
		attestation_status: u32,
		update_info_size: u32,
		timeout_usec: u32,
	) -> Result<Vec<u8>, LayeredError> {
		let request = ReportAttestationStatusRequest::new(
			&self.limits,
			platform_info,
			attestation_status,
			update_info_size,
			usec_to_msec(timeout_usec),
		)
		.map_err(building)?;
		let response = self
			.call(Request::ReportAttestationStatus(request), timeout_usec)
			.await?;
		let response = expect_response!(response, ReportAttestationStatus);

		extract(response.update_info_len(), update_info_size, |update_info| {
			response.get_values(update_info)
		})
	}

	/// Get the size of the launch whitelist.
	pub async fn get_white_list_size(
		&self,
		timeout_usec: u32,
	) -> Result<u32, LayeredError> {
		let request = GetWhiteListSizeRequest::new(usec_to_msec(timeout_usec));
		let response =
			self.call(Request::GetWhiteListSize(request), timeout_usec).await?;

		expect_response!(response, GetWhiteListSize)
			.white_list_size()
			.ok_or_else(malformed)
	}

	/// Get the launch whitelist, at most `white_list_size` bytes of it.
	pub async fn get_white_list(
		&self,
		white_list_size: u32,
		timeout_usec: u32,
	) -> Result<Vec<u8>, LayeredError> {
		let request = GetWhiteListRequest::new(
			&self.limits,
			white_list_size,
			usec_to_msec(timeout_usec),
		);
		let response =
			self.call(Request::GetWhiteList(request), timeout_usec).await?;
		let response = expect_response!(response, GetWhiteList);

		extract(response.white_list_len(), white_list_size, |white_list| {
			response.get_values(white_list)
		})
	}

	/// Get the active extended group id.
	pub async fn get_extended_group_id(
		&self,
		timeout_usec: u32,
	) -> Result<u32, LayeredError> {
		let request =
			Request::GetExtendedGroupId(GetExtendedGroupIdRequest::new(
				usec_to_msec(timeout_usec),
			));
		let response = self.call(request, timeout_usec).await?;

		expect_response!(response, GetExtendedGroupId)
			.x_group_id()
			.ok_or_else(malformed)
	}

	/// Switch the platform to another extended group.
	pub async fn switch_extended_group(
		&self,
		x_group_id: u32,
		timeout_usec: u32,
	) -> Result<(), LayeredError> {
		let request =
			Request::SwitchExtendedGroup(SwitchExtendedGroupRequest::new(
				x_group_id,
				usec_to_msec(timeout_usec),
			));
		let response = self.call(request, timeout_usec).await?;
		expect_response!(response, SwitchExtendedGroup);

		Ok(())
	}
}

#[cfg(test)]
mod test {
	use std::{
		sync::{
			atomic::{AtomicUsize, Ordering},
			Arc, Mutex,
		},
		time::Duration,
	};

	use aesm_core::{
		mock::{MockLogic, MOCK_PS_CAP, MOCK_WHITE_LIST_SIZE},
		protocol::{AesmMsg, Processor, TARGET_INFO_SIZE},
		server::{ConnectionId, RequestProcessor, ServiceConfig},
		status::AesmResult,
	};

	use super::*;
	use crate::timeouts::DEFAULT_TIMEOUT_USEC;

	const CEILING: u32 = 4096;

	/// Hands envelopes straight to a dispatcher, answering busy first when
	/// asked to.
	struct Loopback {
		processor: Processor<MockLogic>,
		busy_replies: usize,
		round_trips: AtomicUsize,
		last_timeout: Mutex<Option<Duration>>,
	}

	impl Transport for Loopback {
		async fn round_trip(
			&self,
			envelope: &[u8],
			timeout: Duration,
		) -> Result<Vec<u8>, TransportStatus> {
			*self.last_timeout.lock().unwrap() = Some(timeout);
			let previous = self.round_trips.fetch_add(1, Ordering::SeqCst);
			if previous < self.busy_replies {
				return Ok(BorshCodec.encode(&AesmMsg::Busy).unwrap());
			}
			Ok(self.processor.process(ConnectionId(1), envelope).await)
		}
	}

	fn services(
		logic: &Arc<MockLogic>,
		busy_replies: usize,
	) -> AeServices<Loopback> {
		let limits = RequestLimits::new(CEILING);
		let processor = Processor::new(
			Arc::clone(logic),
			&ServiceConfig { limits, ..Default::default() },
		);
		let config = ClientConfig {
			limits,
			retry: RetryPolicy {
				max_attempts: 3,
				interval: Duration::from_millis(1),
			},
			..Default::default()
		};

		let loopback = Loopback {
			processor,
			busy_replies,
			round_trips: AtomicUsize::new(0),
			last_timeout: Mutex::new(None),
		};

		AeServices::with_transport(loopback, &config)
	}

	fn round_trips(services: &AeServices<Loopback>) -> usize {
		services.transport().round_trips.load(Ordering::SeqCst)
	}

	#[tokio::test]
	async fn get_quote_returns_requested_quote() {
		let logic = Arc::new(MockLogic::default());
		let services = services(&logic, 0);

		let output = services
			.get_quote(&[0; 64], 0, &[9; 16], &[], &[], 1116, false, 1000)
			.await
			.unwrap();
		assert_eq!(output.quote, vec![0xa5; 1116]);
		assert_eq!(output.qe_report, None);

		let output = services
			.get_quote(
				&[7; 64],
				0,
				&[9; 16],
				&[1; 16],
				&[],
				64,
				true,
				1_000_000,
			)
			.await
			.unwrap();
		assert_eq!(output.quote.len(), 64);
		assert_eq!(output.qe_report.unwrap().len(), 432);
	}

	#[tokio::test]
	async fn default_quote_timeout_counts_revocation_entries() {
		let logic = Arc::new(MockLogic::default());
		let services = services(&logic, 0);

		// header announcing 100 entries
		let mut sig_rl = vec![2, 14, 0, 0, 0, 1, 0, 0, 0, 1];
		sig_rl.extend_from_slice(&100u32.to_be_bytes());
		let output = services
			.get_quote_default_timeout(
				&[7; 64], 0, &[9; 16], &[], &sig_rl, 128, false,
			)
			.await
			.unwrap();
		assert_eq!(output.quote.len(), 128);

		let timeout = *services.transport().last_timeout.lock().unwrap();
		assert_eq!(timeout, Some(Duration::from_millis(20_300)));
	}

	#[test]
	fn allocation_failure_is_a_transport_failure() {
		let exhausted = Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err();
		assert_eq!(
			building(BufferError::OutOfMemory(exhausted)),
			LayeredError::transport(TransportStatus::OutOfMemory)
		);
		assert_eq!(
			building(BufferError::TooLarge(usize::MAX)),
			LayeredError::validation()
		);
	}

	#[tokio::test]
	async fn over_ceiling_never_leaves_the_client() {
		let logic = Arc::new(MockLogic::default());
		let services = services(&logic, 0);

		let report = vec![7; CEILING as usize + 1];
		let err = services
			.get_quote(&report, 0, &[9; 16], &[], &[], 1116, false, 1_000_000)
			.await
			.unwrap_err();
		assert_eq!(err, LayeredError::validation());
		assert_eq!(round_trips(&services), 0);
		assert_eq!(logic.calls(), 0);

		// missing required fields are refused the same way
		let err = services
			.get_launch_token(&[], &[1; 32], &[2; 16], 1_000_000)
			.await
			.unwrap_err();
		assert_eq!(err, LayeredError::validation());
		assert_eq!(round_trips(&services), 0);
	}

	#[tokio::test]
	async fn busy_is_retried_until_admitted() {
		let logic = Arc::new(MockLogic::default());
		let services = services(&logic, 2);

		assert_eq!(services.get_ps_cap(1_000_000).await.unwrap(), MOCK_PS_CAP);
		assert_eq!(round_trips(&services), 3);
		assert_eq!(logic.calls(), 1);
	}

	#[tokio::test]
	async fn busy_past_max_attempts_fails() {
		let logic = Arc::new(MockLogic::default());
		let services = services(&logic, 3);

		let err = services.get_ps_cap(1_000_000).await.unwrap_err();
		assert_eq!(err, LayeredError::transport(TransportStatus::Busy));
		assert_eq!(round_trips(&services), 3);
		assert_eq!(logic.calls(), 0);
	}

	#[tokio::test]
	async fn session_lifecycle() {
		let logic = Arc::new(MockLogic::default());
		let services = services(&logic, 0);

		let session = services.create_session(16, 1_000_000).await.unwrap();
		assert_eq!(session.dh_msg1, vec![0x01; 16]);

		let dh_msg3 = services
			.exchange_report(session.session_id, &[2; 32], 24, 1_000_000)
			.await
			.unwrap();
		assert_eq!(dh_msg3, vec![0x03; 24]);

		let mut message = session.session_id.to_le_bytes().to_vec();
		message.extend_from_slice(&[0xab; 12]);
		let reply =
			services.invoke_service(&message, 64, 1_000_000).await.unwrap();
		assert_eq!(reply, message);

		services.close_session(session.session_id, 1_000_000).await.unwrap();

		let invalid = LayeredError::service(
			aesm_core::status::ServiceStatus::failure(
				AesmResult::SESSION_INVALID,
			),
		);
		assert_eq!(
			services
				.exchange_report(session.session_id, &[2; 32], 24, 1_000_000)
				.await,
			Err(invalid)
		);
		assert_eq!(
			services.invoke_service(&message, 64, 1_000_000).await,
			Err(invalid)
		);
		assert_eq!(
			services.close_session(session.session_id, 1_000_000).await,
			Err(invalid)
		);
	}

	#[tokio::test]
	async fn oversized_output_is_not_handed_out() {
		let logic = Arc::new(MockLogic::default());
		let services = services(&logic, 0);

		// the mock echoes, so the reply is longer than the space asked for
		let session = services.create_session(16, 1_000_000).await.unwrap();
		let mut message = session.session_id.to_le_bytes().to_vec();
		message.extend_from_slice(&[0xab; 60]);

		let err =
			services.invoke_service(&message, 8, 1_000_000).await.unwrap_err();
		assert_eq!(err.transport, TransportStatus::Success);
		assert_eq!(err.service, AesmResult::UNEXPECTED_ERROR);
	}

	#[tokio::test]
	async fn platform_queries() {
		let logic = Arc::new(MockLogic::default());
		let services = services(&logic, 0);

		let init = services.init_quote(DEFAULT_TIMEOUT_USEC).await.unwrap();
		assert_eq!(init.target_info.len(), TARGET_INFO_SIZE);
		assert_eq!(init.gid, vec![0, 0, 0, 1]);

		let token = services
			.get_launch_token(&[1; 32], &[2; 32], &[3; 16], 1_000_000)
			.await
			.unwrap();
		assert_eq!(token.len(), 1024);

		assert_eq!(
			services.get_white_list_size(1_000_000).await.unwrap(),
			MOCK_WHITE_LIST_SIZE
		);
		let white_list = services.get_white_list(128, 1_000_000).await.unwrap();
		assert_eq!(white_list, vec![0x77; MOCK_WHITE_LIST_SIZE as usize]);

		let update_info = services
			.report_attestation_status(&[4; 101], 1, 8, 1_000_000)
			.await
			.unwrap();
		assert_eq!(update_info, vec![0x55; 8]);

		assert_eq!(services.get_extended_group_id(1_000_000).await.unwrap(), 0);
		services.switch_extended_group(5, 1_000_000).await.unwrap();
		assert_eq!(services.get_extended_group_id(1_000_000).await.unwrap(), 5);
	}
}
