//! CLI for running the broker service.

use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use crate::{
	protocol::{AesmLogic, Processor, RequestLimits},
	server::{ServiceConfig, SocketServer, SocketServerError},
	DEFAULT_CEILING, DEFAULT_MAX_IN_FLIGHT, DEFAULT_MAX_SESSIONS,
	DEFAULT_SOCKET_BASE,
};

/// Errors running the service.
#[derive(Debug)]
pub enum CliError {
	/// The server could not start.
	Server(SocketServerError),
	/// Waiting for the shutdown signal failed.
	Signal(std::io::Error),
	/// No logic is available to execute requests with.
	NoLogic,
}

impl From<SocketServerError> for CliError {
	fn from(err: SocketServerError) -> Self {
		Self::Server(err)
	}
}

/// CLI options for starting up the service.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
	name = "aesm_service",
	about = "Broker for privileged platform operations"
)]
pub struct ServiceOpts {
	/// Directory the `aesm.socket` file is created in.
	#[arg(long, default_value = DEFAULT_SOCKET_BASE)]
	pub socket_base: PathBuf,
	/// Maximum size in bytes of any request buffer, and of all buffers of one
	/// request together.
	#[arg(long, default_value_t = DEFAULT_CEILING)]
	pub ceiling: u32,
	/// Requests executed at once before new ones are answered busy.
	#[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
	pub max_in_flight: usize,
	/// Maximum number of open platform service sessions.
	#[arg(long, default_value_t = DEFAULT_MAX_SESSIONS)]
	pub max_sessions: usize,
	/// Execute requests against the deterministic mock logic.
	#[arg(long)]
	pub mock: bool,
}

impl ServiceOpts {
	/// The service configuration these options describe.
	#[must_use]
	pub fn config(&self) -> ServiceConfig {
		ServiceConfig {
			socket_base: self.socket_base.clone(),
			limits: RequestLimits::new(self.ceiling),
			max_in_flight: self.max_in_flight,
			max_sessions: self.max_sessions,
		}
	}
}

/// Service CLI.
pub struct CLI;

impl CLI {
	/// Parse the process arguments and run the service until ctrl-c.
	pub async fn execute() -> Result<(), CliError> {
		let opts = ServiceOpts::parse();
		init_tracing();

		if !opts.mock {
			tracing::error!("no production logic is linked into this binary");
			return Err(CliError::NoLogic);
		}

		#[cfg(feature = "mock")]
		{
			let logic = Arc::new(crate::mock::MockLogic::default());
			run(logic, &opts.config()).await
		}
		#[cfg(not(feature = "mock"))]
		{
			tracing::error!("the \"mock\" feature is required for `--mock`");
			Err(CliError::NoLogic)
		}
	}
}

/// Serve `logic` with `config` until ctrl-c.
pub async fn run<L: AesmLogic + 'static>(
	logic: Arc<L>,
	config: &ServiceConfig,
) -> Result<(), CliError> {
	let processor = Arc::new(Processor::new(logic, config));
	let server = SocketServer::listen(config.address(), processor)?;
	tracing::info!(?config, "service started");

	tokio::signal::ctrl_c().await.map_err(CliError::Signal)?;
	tracing::info!("shutting down");
	drop(server);

	Ok(())
}

fn init_tracing() {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
	// a subscriber may already be installed by an embedding program
	let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
