//! Layered status taxonomy.
//!
//! A round trip can fail in three stacked domains: the local transport, the
//! service, and the hardware/enclave underneath the service. Each domain has
//! its own code space. They are kept side by side in [`LayeredError`] and
//! compared field by field; codes from different domains are never mixed.

use borsh::{BorshDeserialize, BorshSerialize};

/// Outcome of the local transport for one call.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize,
)]
pub enum TransportStatus {
	/// The round trip completed and a response was decoded.
	Success,
	/// Something unexpected happened, including local validation failures.
	Unexpected,
	/// The service could not be reached.
	ServiceUnavailable,
	/// No reply arrived before the timeout. The effect of the call on the
	/// service is unknown.
	Timeout,
	/// The service could not decode the envelope it was sent.
	Invalid,
	/// The service could not admit the request right now.
	Busy,
	/// A local allocation failed while preparing the call.
	OutOfMemory,
}

impl TransportStatus {
	/// True for [`Self::Success`].
	#[must_use]
	pub fn is_success(self) -> bool {
		self == Self::Success
	}
}

/// Service level result code.
///
/// This is an open code space: values the broker does not know by name are
/// carried verbatim. The core never interprets or remaps these codes.
#[derive(
	Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct AesmResult(pub u32);

impl AesmResult {
	/// Success sentinel.
	pub const SUCCESS: Self = Self(0);
	/// Unexpected error.
	pub const UNEXPECTED_ERROR: Self = Self(1);
	/// The platform has no device.
	pub const NO_DEVICE_ERROR: Self = Self(2);
	/// A request parameter was invalid.
	pub const PARAMETER_ERROR: Self = Self(3);
	/// The group signing blob is corrupt or missing.
	pub const EPIDBLOB_ERROR: Self = Self(4);
	/// The platform's group membership was revoked.
	pub const EPID_REVOKED_ERROR: Self = Self(5);
	/// Could not get a license token.
	pub const GET_LICENSETOKEN_ERROR: Self = Self(6);
	/// The session id does not name an open session.
	pub const SESSION_INVALID: Self = Self(7);
	/// No more sessions can be opened.
	pub const MAX_NUM_SESSION_REACHED: Self = Self(8);
	/// The platform services dynamic application is unavailable.
	pub const PSDA_UNAVAILABLE: Self = Self(9);
	/// Establishing the ephemeral session failed.
	pub const EPH_SESSION_FAILED: Self = Self(10);
	/// Long term pairing failed.
	pub const LONG_TERM_PAIRING_FAILED: Self = Self(11);
	/// Network error.
	pub const NETWORK_ERROR: Self = Self(12);
	/// The network is busy.
	pub const NETWORK_BUSY_ERROR: Self = Self(13);
	/// Proxy settings need attention.
	pub const PROXY_SETTING_ASSIST: Self = Self(14);
	/// Persistent storage could not be accessed.
	pub const FILE_ACCESS_ERROR: Self = Self(15);
	/// Provisioning failed.
	pub const SGX_PROVISION_FAILED: Self = Self(16);
	/// The service has stopped.
	pub const SERVICE_STOPPED: Self = Self(17);
	/// The service is busy.
	pub const BUSY: Self = Self(18);
	/// The backend server is busy.
	pub const BACKEND_SERVER_BUSY: Self = Self(19);
	/// A platform update is available.
	pub const UPDATE_AVAILABLE: Self = Self(20);
	/// The service ran out of memory.
	pub const OUT_OF_MEMORY_ERROR: Self = Self(21);
	/// A message was malformed.
	pub const MSG_ERROR: Self = Self(22);
	/// A service thread failed.
	pub const THREAD_ERROR: Self = Self(23);
	/// The device is not available.
	pub const SGX_DEVICE_NOT_AVAILABLE: Self = Self(24);
	/// Enabling the device failed.
	pub const ENABLE_SGX_DEVICE_FAILED: Self = Self(25);
	/// The platform info blob has an invalid signature.
	pub const PLATFORM_INFO_BLOB_INVALID_SIG: Self = Self(26);
	/// The requested service is not available.
	pub const SERVICE_NOT_AVAILABLE: Self = Self(27);
	/// Key derivation function mismatch.
	pub const KDF_MISMATCH: Self = Self(28);
	/// Out of enclave page cache.
	pub const OUT_OF_EPC: Self = Self(29);
	/// The service is unavailable.
	pub const SERVICE_UNAVAILABLE: Self = Self(30);
	/// The platform is not recognized.
	pub const UNRECOGNIZED_PLATFORM: Self = Self(31);

	/// True for [`Self::SUCCESS`].
	#[must_use]
	pub fn is_success(self) -> bool {
		self == Self::SUCCESS
	}

	/// Symbolic name, if the code is known.
	#[must_use]
	pub fn name(self) -> Option<&'static str> {
		let name = match self.0 {
			0 => "AESM_SUCCESS",
			1 => "AESM_UNEXPECTED_ERROR",
			2 => "AESM_NO_DEVICE_ERROR",
			3 => "AESM_PARAMETER_ERROR",
			4 => "AESM_EPIDBLOB_ERROR",
			5 => "AESM_EPID_REVOKED_ERROR",
			6 => "AESM_GET_LICENSETOKEN_ERROR",
			7 => "AESM_SESSION_INVALID",
			8 => "AESM_MAX_NUM_SESSION_REACHED",
			9 => "AESM_PSDA_UNAVAILABLE",
			10 => "AESM_EPH_SESSION_FAILED",
			11 => "AESM_LONG_TERM_PAIRING_FAILED",
			12 => "AESM_NETWORK_ERROR",
			13 => "AESM_NETWORK_BUSY_ERROR",
			14 => "AESM_PROXY_SETTING_ASSIST",
			15 => "AESM_FILE_ACCESS_ERROR",
			16 => "AESM_SGX_PROVISION_FAILED",
			17 => "AESM_SERVICE_STOPPED",
			18 => "AESM_BUSY",
			19 => "AESM_BACKEND_SERVER_BUSY",
			20 => "AESM_UPDATE_AVAILABLE",
			21 => "AESM_OUT_OF_MEMORY_ERROR",
			22 => "AESM_MSG_ERROR",
			23 => "AESM_THREAD_ERROR",
			24 => "AESM_SGX_DEVICE_NOT_AVAILABLE",
			25 => "AESM_ENABLE_SGX_DEVICE_FAILED",
			26 => "AESM_PLATFORM_INFO_BLOB_INVALID_SIG",
			27 => "AESM_SERVICE_NOT_AVAILABLE",
			28 => "AESM_KDF_MISMATCH",
			29 => "AESM_OUT_OF_EPC",
			30 => "AESM_SERVICE_UNAVAILABLE",
			31 => "AESM_UNRECOGNIZED_PLATFORM",
			_ => return None,
		};

		Some(name)
	}
}

impl Default for AesmResult {
	fn default() -> Self {
		Self::UNEXPECTED_ERROR
	}
}

impl std::fmt::Debug for AesmResult {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.name() {
			Some(name) => write!(f, "{name}"),
			None => write!(f, "AesmResult({})", self.0),
		}
	}
}

impl std::fmt::Display for AesmResult {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		std::fmt::Debug::fmt(self, f)
	}
}

/// Legacy platform status code, as produced by the hardware/enclave layer.
///
/// Like [`AesmResult`] this is an open code space carried verbatim.
#[derive(
	Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct SgxStatus(pub u32);

impl SgxStatus {
	/// Success.
	pub const SUCCESS: Self = Self(0x0000);
	/// Unexpected error.
	pub const ERROR_UNEXPECTED: Self = Self(0x0001);
	/// A parameter was invalid.
	pub const ERROR_INVALID_PARAMETER: Self = Self(0x0002);
	/// Out of memory.
	pub const ERROR_OUT_OF_MEMORY: Self = Self(0x0003);
	/// The enclave was lost after a power transition.
	pub const ERROR_ENCLAVE_LOST: Self = Self(0x0004);
	/// Invalid state.
	pub const ERROR_INVALID_STATE: Self = Self(0x0005);
	/// Invalid enclave image.
	pub const ERROR_INVALID_ENCLAVE: Self = Self(0x2001);
	/// Invalid enclave signature.
	pub const ERROR_INVALID_SIGNATURE: Self = Self(0x2003);
	/// Out of enclave page cache.
	pub const ERROR_OUT_OF_EPC: Self = Self(0x2005);
	/// No device.
	pub const ERROR_NO_DEVICE: Self = Self(0x2006);
	/// The device is busy.
	pub const ERROR_DEVICE_BUSY: Self = Self(0x200c);
	/// MAC mismatch.
	pub const ERROR_MAC_MISMATCH: Self = Self(0x3001);
	/// Invalid enclave attributes.
	pub const ERROR_INVALID_ATTRIBUTE: Self = Self(0x3002);
	/// Service unavailable.
	pub const ERROR_SERVICE_UNAVAILABLE: Self = Self(0x4001);
	/// Service timed out.
	pub const ERROR_SERVICE_TIMEOUT: Self = Self(0x4002);
	/// Invalid group signing blob.
	pub const ERROR_AE_INVALID_EPIDBLOB: Self = Self(0x4003);
	/// Caller lacks the privilege for the service.
	pub const ERROR_SERVICE_INVALID_PRIVILEGE: Self = Self(0x4004);
	/// Group membership revoked.
	pub const ERROR_EPID_MEMBER_REVOKED: Self = Self(0x4005);
	/// A platform update is needed.
	pub const ERROR_UPDATE_NEEDED: Self = Self(0x4006);
	/// Network failure.
	pub const ERROR_NETWORK_FAILURE: Self = Self(0x4007);
	/// Invalid session.
	pub const ERROR_AE_SESSION_INVALID: Self = Self(0x4008);
	/// Busy.
	pub const ERROR_BUSY: Self = Self(0x400a);
	/// Key derivation function mismatch.
	pub const ERROR_KDF_MISMATCH: Self = Self(0x4011);
	/// The platform is not recognized.
	pub const ERROR_UNRECOGNIZED_PLATFORM: Self = Self(0x4012);

	/// True for [`Self::SUCCESS`].
	#[must_use]
	pub fn is_success(self) -> bool {
		self == Self::SUCCESS
	}
}

impl std::fmt::Debug for SgxStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "SgxStatus({:#06x})", self.0)
	}
}

/// Status reported by the service for one executed request: the service
/// result and, when the logic produced one, the underlying hardware status.
#[derive(
	Debug,
	Clone,
	Copy,
	Default,
	PartialEq,
	Eq,
	BorshSerialize,
	BorshDeserialize,
)]
pub struct ServiceStatus {
	/// Service level result.
	pub result: AesmResult,
	/// Hardware/enclave status, if any.
	pub legacy: Option<SgxStatus>,
}

impl ServiceStatus {
	/// Successful execution.
	pub const SUCCESS: Self =
		Self { result: AesmResult::SUCCESS, legacy: None };

	/// A failure with only a service level result.
	#[must_use]
	pub const fn failure(result: AesmResult) -> Self {
		Self { result, legacy: None }
	}

	/// A failure that also carries the hardware status behind it.
	#[must_use]
	pub const fn with_legacy(result: AesmResult, legacy: SgxStatus) -> Self {
		Self { result, legacy: Some(legacy) }
	}

	/// True if the service result is its success sentinel.
	#[must_use]
	pub fn is_success(&self) -> bool {
		self.result.is_success()
	}
}

/// Composite status of one call across all three failure domains.
///
/// Output of a call is trustworthy only when [`Self::is_success`] holds,
/// i.e. the transport succeeded *and* the service returned its success
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayeredError {
	/// Local transport outcome.
	pub transport: TransportStatus,
	/// Service level result. Only meaningful when the transport succeeded;
	/// otherwise it is [`AesmResult::UNEXPECTED_ERROR`], or
	/// [`AesmResult::PARAMETER_ERROR`] for a request refused locally.
	pub service: AesmResult,
	/// Hardware/enclave status reported by the service, if any.
	pub legacy: Option<SgxStatus>,
}

impl LayeredError {
	/// A failure in the transport domain; the service was never heard from.
	#[must_use]
	pub const fn transport(transport: TransportStatus) -> Self {
		Self { transport, service: AesmResult::UNEXPECTED_ERROR, legacy: None }
	}

	/// A request that failed local validation and was never sent.
	#[must_use]
	pub const fn validation() -> Self {
		Self {
			transport: TransportStatus::Unexpected,
			service: AesmResult::PARAMETER_ERROR,
			legacy: None,
		}
	}

	/// A failure reported by the service after a successful round trip.
	#[must_use]
	pub const fn service(status: ServiceStatus) -> Self {
		Self {
			transport: TransportStatus::Success,
			service: status.result,
			legacy: status.legacy,
		}
	}

	/// True only if both the transport and the service succeeded.
	#[must_use]
	pub fn is_success(&self) -> bool {
		self.transport.is_success() && self.service.is_success()
	}
}

impl std::fmt::Display for LayeredError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"transport: {:?}, service: {}",
			self.transport, self.service
		)?;
		if let Some(legacy) = self.legacy {
			write!(f, ", legacy: {legacy:?}")?;
		}

		Ok(())
	}
}

impl std::error::Error for LayeredError {}
