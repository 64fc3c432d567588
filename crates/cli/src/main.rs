#![deny(rust_2018_idioms)]

#[tokio::main]
async fn main() {
	let code = match guidedog_cli::run().await {
		Ok(code) => code,
		Err(report) => {
			eprintln!("{report:?}");
			guidedog_cli::FATAL_EXIT_CODE
		}
	};

	// blocking stdin reads from the pty pump may still be parked; don't wait for them
	std::process::exit(code);
}
