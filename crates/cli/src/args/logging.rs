use std::{env::var, io::stderr, path::PathBuf, time::SystemTime};

use clap::{ArgAction, Parser, ValueHint};
use miette::{bail, Result};
use tokio::fs::metadata;
use tracing::{info, warn};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};

#[derive(Debug, Clone, Parser)]
pub struct LoggingArgs {
	/// Set diagnostic log level
	///
	/// This enables diagnostic logging, which is useful for investigating why a command was
	/// restarted or stopped. Use multiple times to increase verbosity.
	///
	/// Goes up to '-vvvv'. When submitting bug reports, default to a '-vvv' log level.
	///
	/// You may want to use with '--log-file' to avoid mixing logs with the command's output.
	///
	/// Setting $RUST_LOG also works, and takes precedence, but is not recommended. However, using
	/// $RUST_LOG is the only way to get logs from before these options are parsed.
	#[arg(
		long,
		short,
		help_heading = super::OPTSET_DEBUGGING,
		action = ArgAction::Count,
		default_value = "0",
		num_args = 0,
	)]
	pub verbose: u8,

	/// Same as '-vvv'
	#[arg(
		long,
		help_heading = super::OPTSET_DEBUGGING,
	)]
	pub debug: bool,

	/// Write diagnostic logs to a file
	///
	/// This writes diagnostic logs to a file, instead of the terminal, in JSON format. If a log
	/// level was not already specified, this will set it to '-vvv'.
	///
	/// If a path is not provided, the default is the working directory. If the path provided is a
	/// directory, a file will be created in that directory, named after the current date and time:
	/// 'guide-dog.YYYY-MM-DDTHH-MM-SSZ.log'.
	#[arg(
		long,
		help_heading = super::OPTSET_DEBUGGING,
		num_args = 0..=1,
		default_missing_value = ".",
		value_hint = ValueHint::AnyPath,
		value_name = "PATH",
	)]
	pub log_file: Option<PathBuf>,
}

impl LoggingArgs {
	/// The effective verbosity, folding in '--debug' and '--log-file'.
	pub fn verbosity(&self) -> u8 {
		let floor = if self.debug || self.log_file.is_some() {
			3
		} else {
			0
		};
		self.verbose.max(floor)
	}
}

pub fn preargs() -> bool {
	let mut log_on = false;

	if let Ok(filter) = var("RUST_LOG") {
		match tracing_subscriber::fmt::try_init() {
			Ok(()) => {
				warn!(RUST_LOG=%filter, "logging configured from RUST_LOG");
				log_on = true;
			}
			Err(e) => eprintln!("Failed to initialise logging with RUST_LOG, falling back\n{e}"),
		}
	}

	log_on
}

pub async fn postargs(args: &LoggingArgs) -> Result<Option<WorkerGuard>> {
	let verbosity = args.verbosity();
	if verbosity == 0 {
		return Ok(None);
	}

	let (log_writer, guard) = if let Some(file) = &args.log_file {
		let is_dir = metadata(&file).await.is_ok_and(|info| info.is_dir());
		let (dir, filename) = if is_dir {
			let now = humantime::format_rfc3339_seconds(SystemTime::now())
				.to_string()
				.replace(':', "-");
			(file.to_owned(), PathBuf::from(format!("guide-dog.{now}.log")))
		} else if let (Some(parent), Some(file_name)) = (file.parent(), file.file_name()) {
			(parent.into(), PathBuf::from(file_name))
		} else {
			bail!("Failed to determine log file name");
		};

		non_blocking(rolling::never(dir, filename))
	} else {
		non_blocking(stderr())
	};

	let mut builder = tracing_subscriber::fmt().with_env_filter(match verbosity {
		0 => unreachable!("checked by if earlier"),
		1 => "warn",
		2 => "info",
		3 => "debug",
		_ => "trace",
	});

	if verbosity > 2 {
		use tracing_subscriber::fmt::format::FmtSpan;
		builder = builder.with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);
	}

	match if args.log_file.is_some() {
		builder.json().with_writer(log_writer).try_init()
	} else if verbosity > 3 {
		builder.pretty().with_writer(log_writer).try_init()
	} else {
		builder.with_writer(log_writer).try_init()
	} {
		Ok(()) => info!("logging initialised"),
		Err(e) => eprintln!("Failed to initialise logging, continuing with none\n{e}"),
	}

	Ok(Some(guard))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn logging(verbose: u8, debug: bool, log_file: Option<&str>) -> LoggingArgs {
		LoggingArgs {
			verbose,
			debug,
			log_file: log_file.map(PathBuf::from),
		}
	}

	#[test]
	fn verbosity_floors() {
		assert_eq!(logging(0, false, None).verbosity(), 0);
		assert_eq!(logging(2, false, None).verbosity(), 2);
		assert_eq!(logging(0, true, None).verbosity(), 3);
		assert_eq!(logging(0, false, Some(".")).verbosity(), 3);
		assert_eq!(logging(4, true, None).verbosity(), 4);
	}
}
