//! Deterministic stand-in for the enclave logic. Never use in production.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::{
	protocol::{
		AesmLogic, CreatedSession, ExchangedReport, InitQuoteOutput,
		LogicResult, QuoteInput, QuoteOutput, GID_SIZE, LAUNCH_TOKEN_SIZE,
		REPORT_SIZE, TARGET_INFO_SIZE,
	},
	status::{AesmResult, ServiceStatus},
};

/// Capability bits reported by [`MockLogic`].
pub const MOCK_PS_CAP: u64 = 3;
/// Whitelist size reported by [`MockLogic`].
pub const MOCK_WHITE_LIST_SIZE: u32 = 64;
/// Session key material handed out by [`MockLogic`].
pub const MOCK_SESSION_MATERIAL: [u8; 32] = [0x33; 32];

/// Logic that always succeeds with fixed byte patterns and counts how often it
/// was called.
///
/// `invoke_service` echoes the message back, without checking it against the
/// requested response size.
#[derive(Debug, Default)]
pub struct MockLogic {
	calls: AtomicUsize,
	closed_sessions: AtomicUsize,
	x_group_id: AtomicU32,
	overshoot: AtomicU32,
}

impl MockLogic {
	/// Number of logic calls made so far.
	#[must_use]
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Number of sessions torn down so far.
	#[must_use]
	pub fn closed_sessions(&self) -> usize {
		self.closed_sessions.load(Ordering::SeqCst)
	}

	/// Make every sized output `extra` bytes longer than the caller asked
	/// for.
	pub fn set_overshoot(&self, extra: u32) {
		self.overshoot.store(extra, Ordering::SeqCst);
	}

	fn called(&self) {
		self.calls.fetch_add(1, Ordering::SeqCst);
	}

	fn pattern(&self, byte: u8, size: u32) -> LogicResult<Vec<u8>> {
		let size = size.saturating_add(self.overshoot.load(Ordering::SeqCst));
		let size = usize::try_from(size).map_err(|_| {
			ServiceStatus::failure(AesmResult::OUT_OF_MEMORY_ERROR)
		})?;
		Ok(vec![byte; size])
	}
}

impl AesmLogic for MockLogic {
	fn init_quote(&self) -> LogicResult<InitQuoteOutput> {
		self.called();
		let mut gid = vec![0; GID_SIZE];
		gid[GID_SIZE - 1] = 1;

		Ok(InitQuoteOutput { target_info: vec![0x11; TARGET_INFO_SIZE], gid })
	}

	fn get_quote(&self, input: QuoteInput<'_>) -> LogicResult<QuoteOutput> {
		self.called();
		let qe_report = input.qe_report.then(|| vec![0x5a; REPORT_SIZE]);

		let quote = self.pattern(0xa5, input.quote_size)?;

		Ok(QuoteOutput { quote, qe_report })
	}

	fn get_launch_token(
		&self,
		_enclave_measurement: &[u8],
		_signer: &[u8],
		_se_attributes: &[u8],
	) -> LogicResult<Vec<u8>> {
		self.called();
		Ok(vec![0x4c; LAUNCH_TOKEN_SIZE])
	}

	fn create_session(&self, dh_msg1_size: u32) -> LogicResult<CreatedSession> {
		self.called();
		Ok(CreatedSession {
			material: MOCK_SESSION_MATERIAL.to_vec(),
			dh_msg1: self.pattern(0x01, dh_msg1_size)?,
		})
	}

	fn exchange_report(
		&self,
		material: &[u8],
		_dh_msg2: &[u8],
		dh_msg3_size: u32,
	) -> LogicResult<ExchangedReport> {
		self.called();
		Ok(ExchangedReport {
			material: material.to_vec(),
			dh_msg3: self.pattern(0x03, dh_msg3_size)?,
		})
	}

	fn invoke_service(
		&self,
		_material: &[u8],
		pse_message: &[u8],
		_response_size: u32,
	) -> LogicResult<Vec<u8>> {
		self.called();
		Ok(pse_message.to_vec())
	}

	fn close_session(&self, _material: &[u8]) -> LogicResult<()> {
		self.called();
		self.closed_sessions.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn get_ps_cap(&self) -> LogicResult<u64> {
		self.called();
		Ok(MOCK_PS_CAP)
	}

	fn report_attestation_status(
		&self,
		_platform_info: &[u8],
		_attestation_status: u32,
		update_info_size: u32,
	) -> LogicResult<Vec<u8>> {
		self.called();
		self.pattern(0x55, update_info_size)
	}

	fn get_white_list_size(&self) -> LogicResult<u32> {
		self.called();
		Ok(MOCK_WHITE_LIST_SIZE)
	}

	fn get_white_list(&self, white_list_size: u32) -> LogicResult<Vec<u8>> {
		self.called();
		self.pattern(0x77, white_list_size.min(MOCK_WHITE_LIST_SIZE))
	}

	fn get_extended_group_id(&self) -> LogicResult<u32> {
		self.called();
		Ok(self.x_group_id.load(Ordering::SeqCst))
	}

	fn switch_extended_group(&self, x_group_id: u32) -> LogicResult<()> {
		self.called();
		self.x_group_id.store(x_group_id, Ordering::SeqCst);
		Ok(())
	}
}
