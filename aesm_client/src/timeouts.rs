//! Default timeouts of the legacy call surface.

/// Time allowed for one request to cross to the service and back, in
/// milliseconds. Every capability defaults to this.
pub const IPC_LATENCY_MSEC: u32 = 20_000;

/// Extra time a quote needs per signature revocation list entry.
pub const SIG_RL_ENTRY_MSEC: u32 = 3;

/// [`IPC_LATENCY_MSEC`] in microseconds.
pub const DEFAULT_TIMEOUT_USEC: u32 = msec_to_usec(IPC_LATENCY_MSEC);

// version (1) | type (1) | gid (4) | rl version (4) | entry count (4, BE)
const SIG_RL_COUNT_OFFSET: usize = 10;

/// Convert milliseconds to microseconds, saturating at `u32::MAX`.
#[must_use]
pub const fn msec_to_usec(msec: u32) -> u32 {
	msec.saturating_mul(1000)
}

/// Number of entries announced by a signature revocation list header, zero
/// if `sig_rl` is too short to carry one.
#[must_use]
pub fn sig_rl_entries(sig_rl: &[u8]) -> u32 {
	sig_rl
		.get(SIG_RL_COUNT_OFFSET..SIG_RL_COUNT_OFFSET + 4)
		.and_then(|count| count.try_into().ok())
		.map_or(0, u32::from_be_bytes)
}

/// Timeout for a quote over `sig_rl`, in milliseconds: the IPC latency plus
/// [`SIG_RL_ENTRY_MSEC`] for every revocation list entry.
#[must_use]
pub fn get_quote_timeout_msec(sig_rl: &[u8]) -> u32 {
	let entries = sig_rl_entries(sig_rl);
	IPC_LATENCY_MSEC.saturating_add(entries.saturating_mul(SIG_RL_ENTRY_MSEC))
}

/// [`get_quote_timeout_msec`] in microseconds.
#[must_use]
pub fn get_quote_timeout_usec(sig_rl: &[u8]) -> u32 {
	msec_to_usec(get_quote_timeout_msec(sig_rl))
}
