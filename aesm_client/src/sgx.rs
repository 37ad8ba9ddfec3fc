//! Folding a composite error into the platform's single legacy status code.
//!
//! Applications written against the legacy C surface expect one status per
//! call. The transport outcome is mapped first; a transport failure is all
//! such a caller gets to see. A hardware status reported by the service wins
//! over the service result. Otherwise the service result goes through a
//! mapping shared by all capabilities, and results that mapping only knows as
//! "unexpected" get a second, capability specific look.

use aesm_core::{
	protocol::Capability,
	status::{AesmResult, LayeredError, SgxStatus, TransportStatus},
};

/// Legacy status of a call that ended in `err`.
#[must_use]
pub fn legacy_status(capability: Capability, err: &LayeredError) -> SgxStatus {
	let mapped = transport_status(err.transport);
	if mapped != SgxStatus::SUCCESS {
		return mapped;
	}
	if err.service.is_success() {
		return SgxStatus::SUCCESS;
	}
	if let Some(legacy) = err.legacy {
		return legacy;
	}

	let mapped = service_result(err.service);
	if mapped == SgxStatus::ERROR_UNEXPECTED
		&& err.service != AesmResult::UNEXPECTED_ERROR
	{
		return capability_result(capability, err.service);
	}

	mapped
}

/// Legacy status of a whole call, [`SgxStatus::SUCCESS`] when it returned
/// outputs.
#[must_use]
pub fn legacy_status_of<T>(
	capability: Capability,
	result: &Result<T, LayeredError>,
) -> SgxStatus {
	match result {
		Ok(_) => SgxStatus::SUCCESS,
		Err(err) => legacy_status(capability, err),
	}
}

fn transport_status(status: TransportStatus) -> SgxStatus {
	match status {
		TransportStatus::Success => SgxStatus::SUCCESS,
		TransportStatus::Unexpected => SgxStatus::ERROR_UNEXPECTED,
		TransportStatus::ServiceUnavailable => {
			SgxStatus::ERROR_SERVICE_UNAVAILABLE
		}
		TransportStatus::Timeout => SgxStatus::ERROR_SERVICE_TIMEOUT,
		TransportStatus::Invalid => SgxStatus::ERROR_INVALID_PARAMETER,
		TransportStatus::Busy => SgxStatus::ERROR_BUSY,
		TransportStatus::OutOfMemory => SgxStatus::ERROR_OUT_OF_MEMORY,
	}
}

fn service_result(result: AesmResult) -> SgxStatus {
	match result {
		AesmResult::SUCCESS => SgxStatus::SUCCESS,
		AesmResult::UPDATE_AVAILABLE => SgxStatus::ERROR_UPDATE_NEEDED,
		AesmResult::PARAMETER_ERROR => SgxStatus::ERROR_INVALID_PARAMETER,
		AesmResult::SERVICE_STOPPED | AesmResult::SERVICE_UNAVAILABLE => {
			SgxStatus::ERROR_SERVICE_UNAVAILABLE
		}
		AesmResult::OUT_OF_MEMORY_ERROR => SgxStatus::ERROR_OUT_OF_MEMORY,
		AesmResult::BUSY => SgxStatus::ERROR_BUSY,
		AesmResult::UNRECOGNIZED_PLATFORM => {
			SgxStatus::ERROR_UNRECOGNIZED_PLATFORM
		}
		AesmResult::NETWORK_ERROR
		| AesmResult::NETWORK_BUSY_ERROR
		| AesmResult::PROXY_SETTING_ASSIST => SgxStatus::ERROR_NETWORK_FAILURE,
		AesmResult::NO_DEVICE_ERROR => SgxStatus::ERROR_NO_DEVICE,
		_ => SgxStatus::ERROR_UNEXPECTED,
	}
}

fn capability_result(capability: Capability, result: AesmResult) -> SgxStatus {
	match (capability, result) {
		(
			Capability::GetLaunchToken
			| Capability::InitQuote
			| Capability::GetQuote
			| Capability::ReportAttestationStatus
			| Capability::CreateSession
			| Capability::ExchangeReport
			| Capability::InvokeService
			| Capability::CloseSession,
			AesmResult::OUT_OF_EPC,
		) => SgxStatus::ERROR_OUT_OF_EPC,
		(Capability::GetLaunchToken, AesmResult::GET_LICENSETOKEN_ERROR) => {
			SgxStatus::ERROR_SERVICE_INVALID_PRIVILEGE
		}

		(
			Capability::InitQuote
			| Capability::GetQuote
			| Capability::ReportAttestationStatus,
			AesmResult::EPIDBLOB_ERROR,
		) => SgxStatus::ERROR_AE_INVALID_EPIDBLOB,
		(
			Capability::InitQuote | Capability::GetQuote,
			AesmResult::EPID_REVOKED_ERROR,
		) => SgxStatus::ERROR_EPID_MEMBER_REVOKED,
		(
			Capability::InitQuote
			| Capability::GetQuote
			| Capability::ReportAttestationStatus,
			AesmResult::BACKEND_SERVER_BUSY,
		) => SgxStatus::ERROR_BUSY,
		(
			Capability::ReportAttestationStatus,
			AesmResult::PLATFORM_INFO_BLOB_INVALID_SIG,
		) => SgxStatus::ERROR_INVALID_PARAMETER,

		(Capability::CreateSession, AesmResult::MAX_NUM_SESSION_REACHED) => {
			SgxStatus::ERROR_BUSY
		}
		(
			Capability::ExchangeReport
			| Capability::InvokeService
			| Capability::CloseSession,
			AesmResult::SESSION_INVALID,
		) => SgxStatus::ERROR_AE_SESSION_INVALID,
		(Capability::ExchangeReport, AesmResult::KDF_MISMATCH) => {
			SgxStatus::ERROR_KDF_MISMATCH
		}
		(
			Capability::GetPsCap,
			AesmResult::EPH_SESSION_FAILED
			| AesmResult::LONG_TERM_PAIRING_FAILED
			| AesmResult::PSDA_UNAVAILABLE,
		)
		| (
			Capability::CreateSession
			| Capability::ExchangeReport
			| Capability::InvokeService,
			AesmResult::EPH_SESSION_FAILED
			| AesmResult::LONG_TERM_PAIRING_FAILED
			| AesmResult::PSDA_UNAVAILABLE
			| AesmResult::SERVICE_NOT_AVAILABLE,
		)
		| (
			Capability::CloseSession,
			AesmResult::EPH_SESSION_FAILED
			| AesmResult::LONG_TERM_PAIRING_FAILED
			| AesmResult::SERVICE_NOT_AVAILABLE,
		) => SgxStatus::ERROR_SERVICE_UNAVAILABLE,

		_ => SgxStatus::ERROR_UNEXPECTED,
	}
}
