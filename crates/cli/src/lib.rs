#![deny(rust_2018_idioms)]
#![allow(clippy::missing_const_for_fn, clippy::future_not_send)]

use miette::Result;
use tracing::{debug, warn};

pub mod args;

/// Exit code when supervision itself fails (`EX_OSERR`).
pub const FATAL_EXIT_CODE: i32 = 71;

/// Parses arguments, sets up logging, and supervises the command.
///
/// Returns the exit code guide-dog should exit with. Errors are fatal: the caller reports them
/// and exits with [`FATAL_EXIT_CODE`].
pub async fn run() -> Result<i32> {
	let log_on = args::logging::preargs();
	let args = args::get_args();

	// dropped at the end of this function, which flushes the log writer
	let _guard = if log_on {
		warn!("ignoring logging options from args");
		None
	} else {
		args::logging::postargs(&args.logging).await?
	};

	debug!(version=%env!("CARGO_PKG_VERSION"), ?args, "building config from CLI");
	let config = args.to_config();

	let code = guidedog::execute(config).await?;
	debug!(code, "exiting with the command's code");
	Ok(code)
}
