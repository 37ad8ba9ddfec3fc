//! Integration tests.
//!
//! Runs the broker on a real unix socket in a scratch directory, executing
//! against [`MockLogic`], and hands out clients for it.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(missing_docs)]

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use aesm_client::{AeServices, ClientConfig, RetryPolicy};
use aesm_core::{
	io::IOError,
	mock::MockLogic,
	protocol::{Processor, RequestLimits},
	server::{ServiceConfig, SocketServer, SocketServerError},
};

/// Ceiling used by both ends in tests.
pub const TEST_CEILING: u32 = 4096;

/// Timeout for calls in tests, in microseconds.
pub const TEST_TIMEOUT_USEC: u32 = 5_000_000;

/// Directory removed, with everything in it, on drop.
#[derive(Debug)]
pub struct ScratchDir(PathBuf);

impl ScratchDir {
	/// Create a fresh directory for the test `name`.
	pub fn new(name: &str) -> std::io::Result<Self> {
		let path = std::env::temp_dir()
			.join(format!("aesm-{name}-{}", std::process::id()));
		drop(std::fs::remove_dir_all(&path));
		std::fs::create_dir_all(&path)?;

		Ok(Self(path))
	}

	/// Path of the directory.
	#[must_use]
	pub fn path(&self) -> &Path {
		&self.0
	}
}

impl Drop for ScratchDir {
	fn drop(&mut self) {
		drop(std::fs::remove_dir_all(&self.0));
	}
}

/// A running broker backed by [`MockLogic`].
pub struct TestService {
	/// The logic requests are executed against.
	pub logic: Arc<MockLogic>,
	processor: Arc<Processor<MockLogic>>,
	// dropped before the directory it listens in
	server: SocketServer,
	dir: ScratchDir,
}

impl TestService {
	/// Start a broker for the test `name` with the test ceiling.
	pub fn start(name: &str) -> Result<Self, SocketServerError> {
		Self::start_with(name, |_| {})
	}

	/// Start a broker for the test `name`, letting `adjust` change the
	/// configuration first.
	pub fn start_with(
		name: &str,
		adjust: impl FnOnce(&mut ServiceConfig),
	) -> Result<Self, SocketServerError> {
		let dir = ScratchDir::new(name).map_err(IOError::from)?;
		let mut config = ServiceConfig {
			socket_base: dir.path().to_path_buf(),
			limits: RequestLimits::new(TEST_CEILING),
			..Default::default()
		};
		adjust(&mut config);

		let logic = Arc::new(MockLogic::default());
		let processor = Arc::new(Processor::new(Arc::clone(&logic), &config));
		let server =
			SocketServer::listen(config.address(), Arc::clone(&processor))?;

		Ok(Self { logic, processor, server, dir })
	}

	/// Client configuration pointing at this broker.
	#[must_use]
	pub fn client_config(&self) -> ClientConfig {
		ClientConfig {
			socket_base: self.dir.path().to_path_buf(),
			limits: RequestLimits::new(TEST_CEILING),
			retry: RetryPolicy::default(),
		}
	}

	/// A new client, with its own connection.
	#[must_use]
	pub fn client(&self) -> AeServices {
		AeServices::new(&self.client_config())
	}

	/// Number of sessions currently open on the broker.
	#[must_use]
	pub fn open_sessions(&self) -> usize {
		self.processor.sessions().len()
	}

	/// Path of the socket the broker listens on.
	#[must_use]
	pub fn socket_path(&self) -> &Path {
		self.server.address().path()
	}
}
