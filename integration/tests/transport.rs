use std::time::Duration;

use aesm_client::{sgx::legacy_status_of, AeServices, ClientConfig, RetryPolicy};
use aesm_core::{
	io::{Listener, SocketAddress},
	protocol::Capability,
	status::{LayeredError, SgxStatus, TransportStatus},
};
use integration::{ScratchDir, TestService, TEST_TIMEOUT_USEC};

#[tokio::test]
async fn saturated_service_answers_busy_until_attempts_run_out() {
	let service = TestService::start_with("busy", |config| {
		config.max_in_flight = 0;
	})
	.unwrap();
	let client = AeServices::new(&ClientConfig {
		retry: RetryPolicy {
			max_attempts: 3,
			interval: Duration::from_millis(5),
		},
		..service.client_config()
	});

	let result = client.get_ps_cap(TEST_TIMEOUT_USEC).await;
	assert_eq!(result, Err(LayeredError::transport(TransportStatus::Busy)));
	assert_eq!(
		legacy_status_of(Capability::GetPsCap, &result),
		SgxStatus::ERROR_BUSY
	);
	assert_eq!(service.logic.calls(), 0);
}

#[tokio::test]
async fn missing_service_is_unavailable() {
	let dir = ScratchDir::new("unavailable").unwrap();
	let client = AeServices::new(&ClientConfig {
		socket_base: dir.path().to_path_buf(),
		..Default::default()
	});

	let result = client.get_extended_group_id(TEST_TIMEOUT_USEC).await;
	assert_eq!(
		result,
		Err(LayeredError::transport(TransportStatus::ServiceUnavailable))
	);
	assert_eq!(
		legacy_status_of(Capability::GetExtendedGroupId, &result),
		SgxStatus::ERROR_SERVICE_UNAVAILABLE
	);
}

#[tokio::test]
async fn silent_service_times_out() {
	let dir = ScratchDir::new("silent").unwrap();
	let listener =
		Listener::listen(&SocketAddress::from_base(dir.path())).unwrap();
	let silent = tokio::spawn(async move {
		let mut stream = listener.accept().await.unwrap();
		let _ = stream.recv().await;
		tokio::time::sleep(Duration::from_secs(3600)).await;
	});

	let client = AeServices::new(&ClientConfig {
		socket_base: dir.path().to_path_buf(),
		..Default::default()
	});
	let result = client.get_ps_cap(100_000).await;
	assert_eq!(result, Err(LayeredError::transport(TransportStatus::Timeout)));
	assert_eq!(
		legacy_status_of(Capability::GetPsCap, &result),
		SgxStatus::ERROR_SERVICE_TIMEOUT
	);

	silent.abort();
}

#[tokio::test]
async fn sub_millisecond_timeout_expires_immediately() {
	let service = TestService::start("sub-ms").unwrap();
	let client = service.client();

	assert_eq!(
		client.get_ps_cap(999).await,
		Err(LayeredError::transport(TransportStatus::Timeout))
	);
	assert_eq!(service.logic.calls(), 0);
}

#[tokio::test]
async fn client_survives_service_restart() {
	let service = TestService::start("restart").unwrap();
	let config = service.client_config();
	let client = AeServices::new(&config);
	client.get_ps_cap(TEST_TIMEOUT_USEC).await.unwrap();
	drop(service);
	// let the aborted server tasks unwind before the socket path is reused
	tokio::time::sleep(Duration::from_millis(100)).await;

	// the old connection is gone; the first call notices, the next reconnects
	let service = TestService::start("restart").unwrap();
	assert!(client.get_ps_cap(TEST_TIMEOUT_USEC).await.is_err());
	client.get_ps_cap(TEST_TIMEOUT_USEC).await.unwrap();
	assert_eq!(service.logic.calls(), 1);
}
