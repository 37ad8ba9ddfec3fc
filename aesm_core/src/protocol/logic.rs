//! The privileged logic the dispatcher executes requests against.
//!
//! Implementations own the real work: quoting enclaves, launch policy,
//! platform service sessions. The broker only hands them validated raw
//! inputs and wraps whatever they return.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::status::ServiceStatus;

/// Result of one logic call. The error side is the service result plus, when
/// available, the hardware status behind it.
pub type LogicResult<T> = Result<T, ServiceStatus>;

/// Outputs of [`AesmLogic::init_quote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitQuoteOutput {
	/// Target info of the quoting enclave.
	pub target_info: Vec<u8>,
	/// Platform group id.
	pub gid: Vec<u8>,
}

/// Inputs of [`AesmLogic::get_quote`].
#[derive(Debug, Clone, Copy)]
pub struct QuoteInput<'a> {
	/// Report of the enclave being quoted.
	pub report: &'a [u8],
	/// Linkable or unlinkable signature.
	pub quote_type: u32,
	/// Service provider id.
	pub spid: &'a [u8],
	/// Optional nonce.
	pub nonce: Option<&'a [u8]>,
	/// Optional signature revocation list.
	pub sig_rl: Option<&'a [u8]>,
	/// Size of the quote the caller expects.
	pub quote_size: u32,
	/// Whether the caller wants the quoting enclave's report too.
	pub qe_report: bool,
}

/// Outputs of [`AesmLogic::get_quote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteOutput {
	/// The quote.
	pub quote: Vec<u8>,
	/// Report of the quoting enclave, if it was asked for.
	pub qe_report: Option<Vec<u8>>,
}

/// Outputs of [`AesmLogic::create_session`].
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CreatedSession {
	/// Opaque key material the logic needs to continue the session.
	pub material: Vec<u8>,
	/// First message of the key exchange.
	pub dh_msg1: Vec<u8>,
}

/// Outputs of [`AesmLogic::exchange_report`].
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ExchangedReport {
	/// Updated key material of the session.
	pub material: Vec<u8>,
	/// Third message of the key exchange.
	pub dh_msg3: Vec<u8>,
}

/// One method per capability.
///
/// Calls are made from blocking threads, at most one at a time per
/// [`super::CapabilityClass`].
pub trait AesmLogic: Send + Sync {
	/// Get the quoting enclave target info and the group id.
	fn init_quote(&self) -> LogicResult<InitQuoteOutput>;

	/// Produce a quote for a report.
	fn get_quote(&self, input: QuoteInput<'_>) -> LogicResult<QuoteOutput>;

	/// Produce a launch token.
	fn get_launch_token(
		&self,
		enclave_measurement: &[u8],
		signer: &[u8],
		se_attributes: &[u8],
	) -> LogicResult<Vec<u8>>;

	/// Start a platform service session.
	fn create_session(&self, dh_msg1_size: u32) -> LogicResult<CreatedSession>;

	/// Advance the key exchange of the session holding `material`.
	fn exchange_report(
		&self,
		material: &[u8],
		dh_msg2: &[u8],
		dh_msg3_size: u32,
	) -> LogicResult<ExchangedReport>;

	/// Forward a message to the platform service over an established session.
	fn invoke_service(
		&self,
		material: &[u8],
		pse_message: &[u8],
		response_size: u32,
	) -> LogicResult<Vec<u8>>;

	/// Tear down the session holding `material`.
	fn close_session(&self, material: &[u8]) -> LogicResult<()>;

	/// Platform service capability bits.
	fn get_ps_cap(&self) -> LogicResult<u64>;

	/// Report an attestation outcome and get platform update info back.
	fn report_attestation_status(
		&self,
		platform_info: &[u8],
		attestation_status: u32,
		update_info_size: u32,
	) -> LogicResult<Vec<u8>>;

	/// Size of the launch whitelist.
	fn get_white_list_size(&self) -> LogicResult<u32>;

	/// The launch whitelist.
	fn get_white_list(&self, white_list_size: u32) -> LogicResult<Vec<u8>>;

	/// Active extended group id.
	fn get_extended_group_id(&self) -> LogicResult<u32>;

	/// Switch the active extended group.
	fn switch_extended_group(&self, x_group_id: u32) -> LogicResult<()>;
}
