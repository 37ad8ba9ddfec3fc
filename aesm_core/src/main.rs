use aesm_core::cli::CLI;

#[tokio::main]
async fn main() {
	if let Err(err) = CLI::execute().await {
		eprintln!("aesm_service: {err:?}");
		std::process::exit(1);
	}
}
